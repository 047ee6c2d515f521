//! Page render gate
//!
//! Runs before a document renders and settles on exactly one terminal
//! state:
//!
//! ```text
//!            ┌─ token in slot ──────────────▶ ShowSpoofed
//!            ├─ override flag ──────────────▶ ShowImmediate
//!   Start ───┼─ disabled / whitelisted ─────▶ ShowImmediate
//!            ├─ zone already known ─────────▶ ShowSpoofed
//!            └─ otherwise (http/https) ─────▶ Blocked → interstitial
//! ```
//!
//! The document is hidden on entry and only unhidden by the show states.

use crate::spoofer::SpoofState;
use crate::state::SharedState;
use crate::token::{self, NavigationSlot};
use crate::whitelist::SpoofConfig;
use tracing::{debug, info};
use url::Url;

/// Reserved query parameter that suspends spoofing for one load
pub const OVERRIDE_PARAM: &str = "z_override";

/// Value the override parameter must carry
pub const OVERRIDE_VALUE: &str = "true";

/// Query parameter carrying the original URL to the interstitial
pub const TARGET_PARAM: &str = "target";

/// Document-level effects the gate needs from its host
pub trait PageHost {
    /// Hide the document before first paint
    fn hide(&mut self);
    /// Reveal the document
    fn unhide(&mut self);
    /// Replace the visible URL without navigating
    fn replace_url(&mut self, url: &str);
    /// Halt any further loading of the document
    fn stop(&mut self);
    /// Navigate the tab, replacing the current history entry
    fn redirect(&mut self, url: &str);
}

/// Why a page was shown without spoofing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowReason {
    /// Per-request override flag
    Override,
    /// Spoofing switched off
    Disabled,
    /// Host matched the whitelist
    Whitelisted,
    /// Not an http(s) page
    NotWeb,
}

/// Terminal gate states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    ShowImmediate(ShowReason),
    ShowSpoofed { zone: String },
    Blocked { interstitial: String },
}

/// One gate evaluation's inputs, snapshotted per navigation.
#[derive(Debug, Clone)]
pub struct PageRenderGate {
    config: SpoofConfig,
    stored_zone: Option<String>,
    interstitial_base: Url,
}

impl PageRenderGate {
    pub fn new(config: SpoofConfig, stored_zone: Option<String>, interstitial_base: Url) -> Self {
        Self {
            config,
            stored_zone,
            interstitial_base,
        }
    }

    /// Snapshot the current shared state
    pub fn from_state(state: &SharedState, interstitial_base: Url) -> Self {
        Self::new(state.settings().spoof_config(), state.zone(), interstitial_base)
    }

    /// Decide for a page about to load `page_url` in a tab.
    ///
    /// Any zone to spoof is installed into `spoof` before the page is
    /// revealed.
    pub fn evaluate(
        &self,
        page_url: &str,
        slot: &mut impl NavigationSlot,
        host: &mut impl PageHost,
        spoof: &SpoofState,
    ) -> GateState {
        host.hide();
        spoof.update(None);

        let state = self.decide(page_url, slot, host);
        match &state {
            GateState::ShowImmediate(reason) => {
                debug!("Showing {} unspoofed ({:?})", page_url, reason);
                host.unhide();
            }
            GateState::ShowSpoofed { zone } => {
                spoof.update(Some(zone));
                host.unhide();
            }
            GateState::Blocked { interstitial } => {
                info!("No timezone yet, holding page for interstitial");
                host.stop();
                host.redirect(interstitial);
            }
        }
        state
    }

    fn decide(
        &self,
        page_url: &str,
        slot: &mut impl NavigationSlot,
        host: &mut impl PageHost,
    ) -> GateState {
        if let Some(zone) = token::take(slot) {
            return GateState::ShowSpoofed { zone };
        }

        let parsed = Url::parse(page_url).ok();

        if let Some(url) = &parsed {
            if let Some(cleaned) = strip_override(url) {
                host.replace_url(cleaned.as_str());
                return GateState::ShowImmediate(ShowReason::Override);
            }
        }

        let hostname = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or_default();

        if !self.config.enabled {
            return GateState::ShowImmediate(ShowReason::Disabled);
        }
        if self.config.is_whitelisted(hostname) {
            return GateState::ShowImmediate(ShowReason::Whitelisted);
        }

        if let Some(zone) = &self.stored_zone {
            return GateState::ShowSpoofed { zone: zone.clone() };
        }

        match &parsed {
            Some(url) if is_web(url) => GateState::Blocked {
                interstitial: interstitial_url(&self.interstitial_base, page_url).into(),
            },
            _ => GateState::ShowImmediate(ShowReason::NotWeb),
        }
    }
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// `url` without the override flag, or `None` if the flag is absent.
///
/// Other query parameters keep their order; an emptied query leaves no
/// trailing `?`.
pub fn strip_override(url: &Url) -> Option<Url> {
    let is_flag = |(k, v): &(std::borrow::Cow<'_, str>, std::borrow::Cow<'_, str>)| {
        k == OVERRIDE_PARAM && v == OVERRIDE_VALUE
    };

    if !url.query_pairs().any(|pair| is_flag(&pair)) {
        return None;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|pair| !is_flag(pair))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(cleaned)
}

/// `target` with the override flag appended
pub fn with_override(target: &str) -> String {
    match Url::parse(target) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(OVERRIDE_PARAM, OVERRIDE_VALUE);
            url.into()
        }
        Err(_) => {
            let joiner = if target.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", target, joiner, OVERRIDE_PARAM, OVERRIDE_VALUE)
        }
    }
}

/// Interstitial entry URL for `target`
pub fn interstitial_url(base: &Url, target: &str) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.query_pairs_mut().append_pair(TARGET_PARAM, target);
    url
}
