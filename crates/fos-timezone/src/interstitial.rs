//! Interstitial controller
//!
//! The holding page shown while detection is pending. It waits for a
//! detection result (up to a fixed ceiling), then hands the zone to the
//! target page through the tab's navigation slot and navigates there.

use crate::gate::{self, TARGET_PARAM};
use crate::state::SharedState;
use crate::token::{self, NavigationSlot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How long to wait for detection before giving up
pub const DETECTION_CEILING: Duration = Duration::from_secs(10);

/// How long the detected zone stays on screen before navigating
pub const DETECTED_DISPLAY: Duration = Duration::from_millis(500);

pub const STATUS_DETECTING: &str = "Detecting timezone from proxy...";
pub const STATUS_FAILED: &str = "Error: Failed to detect timezone from proxy.";
pub const STATUS_INVALID_TARGET: &str = "Error: Invalid or missing target URL.";

/// Interstitial entry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterstitialError {
    #[error("Missing target URL")]
    MissingTarget,

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),
}

/// Manual actions offered after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Reload the interstitial and wait again
    Retry,
    /// Open the target once without spoofing
    Proceed { url: String },
}

impl FailureAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Retry => "Retry",
            Self::Proceed { .. } => "Proceed without spoofing",
        }
    }
}

/// How an interstitial load ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Navigated to the target, carrying `zone` if one was handed off
    Navigated { url: String, zone: Option<String> },
    /// Gave up waiting; the user must pick an action
    Failed { actions: Vec<FailureAction> },
    /// Bad entry URL; nothing else happened
    Invalid(InterstitialError),
}

/// The tab hosting the interstitial
pub trait InterstitialTab: NavigationSlot {
    /// Replace the status line
    fn show_status(&mut self, text: &str);
    /// Offer manual actions
    fn show_actions(&mut self, actions: &[FailureAction]);
    /// Navigate the tab
    fn navigate(&mut self, url: &str);
    /// Reload the current page
    fn reload(&mut self);
}

/// Extract and validate the `target` parameter of an interstitial URL.
pub fn validate_target(interstitial_url: &str) -> Result<Url, InterstitialError> {
    let page = Url::parse(interstitial_url).map_err(|_| InterstitialError::MissingTarget)?;
    let target = page
        .query_pairs()
        .find(|(k, _)| k == TARGET_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or(InterstitialError::MissingTarget)?;

    match Url::parse(&target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
        _ => Err(InterstitialError::InvalidTarget(target)),
    }
}

/// Drives one interstitial load
#[derive(Debug, Clone)]
pub struct InterstitialController {
    state: Arc<SharedState>,
    ceiling: Duration,
    display: Duration,
}

impl InterstitialController {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self {
            state,
            ceiling: DETECTION_CEILING,
            display: DETECTED_DISPLAY,
        }
    }

    /// Override the wait ceiling
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Run the interstitial loaded at `page_url` in `tab`
    pub async fn run(&self, page_url: &str, tab: &mut impl InterstitialTab) -> Outcome {
        let target = match validate_target(page_url) {
            Ok(target) => target,
            Err(e) => {
                warn!("Interstitial refused: {}", e);
                tab.show_status(STATUS_INVALID_TARGET);
                return Outcome::Invalid(e);
            }
        };
        let target = String::from(target);

        let mut detection = self.state.subscribe_detection();
        let mut settings = self.state.subscribe_settings();
        tab.show_status(STATUS_DETECTING);

        let deadline = tokio::time::sleep(self.ceiling);
        tokio::pin!(deadline);

        loop {
            if !settings.borrow_and_update().spoofing_active() {
                debug!("Spoofing off, going straight to target");
                tab.navigate(&target);
                return Outcome::Navigated { url: target, zone: None };
            }

            let zone = detection
                .borrow_and_update()
                .as_ref()
                .map(|d| d.timezone_id.clone());
            if let Some(zone) = zone {
                return self.hand_off(tab, target, zone).await;
            }

            tokio::select! {
                Ok(()) = detection.changed() => {}
                Ok(()) = settings.changed() => {}
                _ = &mut deadline => break,
            }
        }

        warn!("No timezone within {:?}", self.ceiling);
        let actions = vec![
            FailureAction::Retry,
            FailureAction::Proceed {
                url: gate::with_override(&target),
            },
        ];
        tab.show_status(STATUS_FAILED);
        tab.show_actions(&actions);
        Outcome::Failed { actions }
    }

    async fn hand_off(&self, tab: &mut impl InterstitialTab, target: String, zone: String) -> Outcome {
        tab.show_status(&format!("Timezone detected: {}", zone));
        tokio::time::sleep(self.display).await;

        info!("Handing {} to target page", zone);
        token::stash(tab, &zone);
        tab.navigate(&target);
        Outcome::Navigated {
            url: target,
            zone: Some(zone),
        }
    }
}

/// Carry out a user's choice after a failure
pub fn perform(action: &FailureAction, tab: &mut impl InterstitialTab) {
    match action {
        FailureAction::Retry => tab.reload(),
        FailureAction::Proceed { url } => tab.navigate(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::state::DetectionResult;
    use crate::token::TabSlot;

    #[derive(Debug, Default)]
    struct FakeTab {
        slot: TabSlot,
        statuses: Vec<String>,
        actions: Vec<FailureAction>,
        navigations: Vec<String>,
        reloads: usize,
    }

    impl NavigationSlot for FakeTab {
        fn read(&self) -> String {
            self.slot.read()
        }
        fn write(&mut self, value: String) {
            self.slot.write(value);
        }
    }

    impl InterstitialTab for FakeTab {
        fn show_status(&mut self, text: &str) {
            self.statuses.push(text.to_string());
        }
        fn show_actions(&mut self, actions: &[FailureAction]) {
            self.actions = actions.to_vec();
        }
        fn navigate(&mut self, url: &str) {
            self.navigations.push(url.to_string());
        }
        fn reload(&mut self) {
            self.reloads += 1;
        }
    }

    const PAGE: &str = "fos://tzguard/interstitial.html?target=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1";

    fn spoofing_state() -> Arc<SharedState> {
        Arc::new(SharedState::in_memory(Settings::spoofing(Vec::new())))
    }

    #[test]
    fn test_validate_target() {
        assert_eq!(validate_target(PAGE).unwrap().as_str(), "https://example.com/a?b=1");
        assert_eq!(
            validate_target("fos://tzguard/interstitial.html"),
            Err(InterstitialError::MissingTarget)
        );
        assert_eq!(
            validate_target("fos://tzguard/i.html?target="),
            Err(InterstitialError::MissingTarget)
        );
        assert!(matches!(
            validate_target("fos://tzguard/i.html?target=javascript%3Aalert(1)"),
            Err(InterstitialError::InvalidTarget(_))
        ));
        assert!(matches!(
            validate_target("fos://tzguard/i.html?target=%2Frelative"),
            Err(InterstitialError::InvalidTarget(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_target_has_no_side_effects() {
        let controller = InterstitialController::new(spoofing_state());
        let mut tab = FakeTab::default();

        let outcome = controller.run("fos://tzguard/i.html?target=ftp%3A%2F%2Fx", &mut tab).await;
        assert!(matches!(outcome, Outcome::Invalid(_)));
        assert_eq!(tab.statuses, vec![STATUS_INVALID_TARGET]);
        assert!(tab.navigations.is_empty());
        assert_eq!(tab.slot.read(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_result_is_handed_off() {
        let state = spoofing_state();
        state
            .set_detection(Some(DetectionResult::new("Europe/Lisbon", "ipwho.is")))
            .unwrap();

        let mut tab = FakeTab {
            slot: TabSlot::new("keep"),
            ..FakeTab::default()
        };
        let outcome = InterstitialController::new(state).run(PAGE, &mut tab).await;

        assert_eq!(
            outcome,
            Outcome::Navigated {
                url: "https://example.com/a?b=1".into(),
                zone: Some("Europe/Lisbon".into()),
            }
        );
        assert!(tab.statuses.contains(&"Timezone detected: Europe/Lisbon".to_string()));
        assert_eq!(tab.slot.read(), "Z_TZ_MARKER:Europe/Lisbon::keep");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_navigates_directly() {
        let state = Arc::new(SharedState::in_memory(Settings::default()));
        let mut tab = FakeTab::default();

        let outcome = InterstitialController::new(state).run(PAGE, &mut tab).await;
        assert_eq!(
            outcome,
            Outcome::Navigated {
                url: "https://example.com/a?b=1".into(),
                zone: None
            }
        );
        assert_eq!(tab.slot.read(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_while_waiting() {
        let state = spoofing_state();
        let controller = InterstitialController::new(state.clone());

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            state.set_settings(Settings::default()).unwrap();
        });

        let mut tab = FakeTab::default();
        let outcome = controller.run(PAGE, &mut tab).await;
        writer.await.unwrap();

        assert!(matches!(outcome, Outcome::Navigated { zone: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_offers_actions() {
        let controller = InterstitialController::new(spoofing_state());
        let mut tab = FakeTab::default();

        let outcome = controller.run(PAGE, &mut tab).await;
        let Outcome::Failed { actions } = outcome else {
            panic!("expected failure");
        };

        assert!(tab.navigations.is_empty());
        assert_eq!(tab.statuses.last().map(String::as_str), Some(STATUS_FAILED));
        assert_eq!(tab.actions, actions);
        assert_eq!(
            actions[1],
            FailureAction::Proceed {
                url: "https://example.com/a?b=1&z_override=true".into()
            }
        );

        perform(&actions[0], &mut tab);
        assert_eq!(tab.reloads, 1);
        perform(&actions[1], &mut tab);
        assert_eq!(tab.navigations, vec!["https://example.com/a?b=1&z_override=true"]);
    }
}
