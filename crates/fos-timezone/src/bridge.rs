//! Cross-context bridge
//!
//! Live broadcast half: background code publishes the effective zone to
//! every open page through per-tab `crossbeam` channels. Delivery is
//! fire-and-forget; a page whose receiver is gone is dropped from the
//! registry and never retried.
//!
//! The navigation hand-off half lives in [`crate::token`].

use crate::spoofer::SpoofState;
use crate::state::SharedState;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Global tab ID counter
static NEXT_TAB_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u64);

impl TabId {
    /// Create a new tab ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate a fresh, process-unique tab ID.
    pub fn next() -> Self {
        Self(NEXT_TAB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tab({})", self.0)
    }
}

/// Messages delivered to a page's isolated context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMessage {
    /// New effective zone, `None` turns spoofing off
    TimezoneUpdate(Option<String>),
}

/// Open pages that can receive live updates
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: Mutex<HashMap<TabId, Sender<PageMessage>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TabId, Sender<PageMessage>>> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the page now loaded in `tab`, replacing any previous
    /// document's channel.
    pub fn register(&self, tab: TabId) -> Receiver<PageMessage> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().insert(tab, tx);
        trace!("{} registered for timezone updates", tab);
        rx
    }

    /// Forget `tab`
    pub fn unregister(&self, tab: TabId) {
        self.lock().remove(&tab);
    }

    /// Number of registered pages
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send `zone` to every open page. Returns how many pages accepted it.
    pub fn broadcast(&self, zone: Option<&str>) -> usize {
        let message = PageMessage::TimezoneUpdate(zone.map(str::to_string));
        let mut pages = self.lock();
        let before = pages.len();

        pages.retain(|tab, tx| match tx.send(message.clone()) {
            Ok(()) => true,
            Err(_) => {
                trace!("{} is gone, skipping", tab);
                false
            }
        });

        let delivered = pages.len();
        debug!(
            "Broadcast {:?} to {} page(s) ({} pruned)",
            zone,
            delivered,
            before - delivered
        );
        delivered
    }

    /// Broadcast the zone pages should currently use: the stored zone when
    /// spoofing is on, otherwise `None`.
    pub fn sync_with(&self, state: &SharedState) -> usize {
        self.broadcast(effective_zone(state).as_deref())
    }
}

/// Zone pages should use given the current state
pub fn effective_zone(state: &SharedState) -> Option<String> {
    if state.settings().spoofing_active() {
        state.zone()
    } else {
        None
    }
}

/// Page-side end of the live channel.
///
/// Forwards updates from the isolated context into the page's own
/// spoofer state.
#[derive(Debug)]
pub struct PageListener {
    rx: Receiver<PageMessage>,
    spoof: SpoofState,
}

impl PageListener {
    pub fn new(rx: Receiver<PageMessage>, spoof: SpoofState) -> Self {
        Self { rx, spoof }
    }

    /// Apply every pending update. Returns how many were applied and
    /// whether the background end is still connected.
    pub fn pump(&self) -> (usize, bool) {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    self.apply(message);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => return (applied, true),
                Err(TryRecvError::Disconnected) => return (applied, false),
            }
        }
    }

    /// Block applying updates until the background end disconnects.
    pub fn run(self) {
        for message in self.rx.iter() {
            self.apply(message);
        }
    }

    fn apply(&self, message: PageMessage) {
        match message {
            PageMessage::TimezoneUpdate(zone) => self.spoof.update(zone.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::state::DetectionResult;

    #[test]
    fn test_tab_ids_are_unique() {
        assert_ne!(TabId::next(), TabId::next());
        assert_eq!(TabId::new(7).to_string(), "Tab(7)");
    }

    #[test]
    fn test_broadcast_reaches_all_pages() {
        let registry = PageRegistry::new();
        let a = registry.register(TabId::new(1));
        let b = registry.register(TabId::new(2));

        assert_eq!(registry.broadcast(Some("Europe/Rome")), 2);
        let expected = PageMessage::TimezoneUpdate(Some("Europe/Rome".into()));
        assert_eq!(a.try_recv().unwrap(), expected);
        assert_eq!(b.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_dead_pages_are_pruned_silently() {
        let registry = PageRegistry::new();
        let alive = registry.register(TabId::new(1));
        drop(registry.register(TabId::new(2)));

        assert_eq!(registry.broadcast(None), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(alive.try_recv().unwrap(), PageMessage::TimezoneUpdate(None));
    }

    #[test]
    fn test_reregister_replaces_old_document() {
        let registry = PageRegistry::new();
        let old = registry.register(TabId::new(1));
        let new = registry.register(TabId::new(1));

        registry.broadcast(Some("Asia/Seoul"));
        assert!(old.try_recv().is_err());
        assert!(new.try_recv().is_ok());
    }

    #[test]
    fn test_listener_updates_spoof_state() {
        let registry = PageRegistry::new();
        let spoof = SpoofState::new();
        let listener = PageListener::new(registry.register(TabId::new(1)), spoof.clone());

        registry.broadcast(Some("America/Denver"));
        assert_eq!(listener.pump(), (1, true));
        assert_eq!(spoof.zone().as_deref(), Some("America/Denver"));

        registry.broadcast(None);
        listener.pump();
        assert!(!spoof.is_active());

        registry.unregister(TabId::new(1));
        assert_eq!(listener.pump(), (0, false));
    }

    #[test]
    fn test_sync_respects_settings() {
        let state = SharedState::in_memory(Settings::spoofing(Vec::new()));
        state
            .set_detection(Some(DetectionResult::new("Europe/Oslo", "ipwho.is")))
            .unwrap();

        let registry = PageRegistry::new();
        let rx = registry.register(TabId::new(1));

        registry.sync_with(&state);
        assert_eq!(
            rx.try_recv().unwrap(),
            PageMessage::TimezoneUpdate(Some("Europe/Oslo".into()))
        );

        state.set_settings(Settings::default()).unwrap();
        registry.sync_with(&state);
        assert_eq!(rx.try_recv().unwrap(), PageMessage::TimezoneUpdate(None));
    }
}
