//! End-to-end page load scenarios: gate, interstitial, detection and the
//! spoofed time surface working together.

use chrono::{TimeZone, Utc};
use fos_network::{Fetch, HttpError, Method, Response, StatusCode};
use fos_timezone::format::FormatOptions;
use fos_timezone::interstitial::{STATUS_DETECTING, STATUS_FAILED};
use fos_timezone::whitelist::parse_whitelist;
use fos_timezone::{
    DetectionMode, DetectionResult, FailureAction, GateState, InterstitialController,
    InterstitialTab, NativeTime, NavigationSlot, Outcome, PageHost, PageRegistry, PageRenderGate,
    ProviderDescriptor, Settings, SharedState, ShowReason, SpoofState, SpoofedTime, TabSlot,
    TimeSurface, TimezoneDetector,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const PAGE: &str = "https://news.example/story?id=7";

/// A browser tab as seen by every component
#[derive(Debug, Default)]
struct BrowserTab {
    slot: TabSlot,
    hidden: bool,
    stopped: bool,
    redirects: Vec<String>,
    navigations: Vec<String>,
    statuses: Vec<String>,
    actions: Vec<FailureAction>,
}

impl NavigationSlot for BrowserTab {
    fn read(&self) -> String {
        self.slot.read()
    }
    fn write(&mut self, value: String) {
        self.slot.write(value);
    }
}

impl PageHost for BrowserTab {
    fn hide(&mut self) {
        self.hidden = true;
    }
    fn unhide(&mut self) {
        self.hidden = false;
    }
    fn replace_url(&mut self, _url: &str) {}
    fn stop(&mut self) {
        self.stopped = true;
    }
    fn redirect(&mut self, url: &str) {
        self.redirects.push(url.to_string());
    }
}

impl InterstitialTab for BrowserTab {
    fn show_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }
    fn show_actions(&mut self, actions: &[FailureAction]) {
        self.actions = actions.to_vec();
    }
    fn navigate(&mut self, url: &str) {
        self.navigations.push(url.to_string());
    }
    fn reload(&mut self) {}
}

/// Geolocation endpoint answering after a fixed delay
struct SlowGeo {
    delay: Duration,
    body: &'static str,
}

impl Fetch for SlowGeo {
    fn fetch(
        &self,
        _method: Method,
        url: &str,
    ) -> impl Future<Output = Result<Response, HttpError>> + Send {
        let (delay, body, url) = (self.delay, self.body, url.to_string());
        async move {
            tokio::time::sleep(delay).await;
            Ok(Response::new(StatusCode::OK, body, &url))
        }
    }
}

fn interstitial_base() -> Url {
    Url::parse("fos://tzguard/interstitial.html").unwrap()
}

fn load(state: &SharedState, url: &str, tab: &mut BrowserTab, spoof: &SpoofState) -> GateState {
    let gate = PageRenderGate::from_state(state, interstitial_base());
    let mut slot = std::mem::take(&mut tab.slot);
    let outcome = gate.evaluate(url, &mut slot, tab, spoof);
    tab.slot = slot;
    outcome
}

fn target_of(interstitial: &str) -> Option<String> {
    Url::parse(interstitial)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "target")
        .map(|(_, v)| v.into_owned())
}

#[test]
fn scenario_a_first_load_redirects_to_interstitial() {
    let state = SharedState::in_memory(Settings::spoofing(parse_whitelist("bank.example")));
    let mut tab = BrowserTab::default();

    let outcome = load(&state, PAGE, &mut tab, &SpoofState::new());

    let GateState::Blocked { interstitial } = outcome else {
        panic!("expected the page to be held, got {:?}", outcome);
    };
    assert!(tab.hidden && tab.stopped);
    assert_eq!(tab.redirects, vec![interstitial.clone()]);
    assert!(interstitial.starts_with("fos://tzguard/interstitial.html?target="));
    assert_eq!(target_of(&interstitial).as_deref(), Some(PAGE));
}

#[tokio::test(start_paused = true)]
async fn scenario_b_detection_while_waiting_hands_zone_to_target() {
    let state = Arc::new(SharedState::in_memory(Settings::spoofing(Vec::new())));
    let pages = Arc::new(PageRegistry::new());
    let detector = TimezoneDetector::new(
        SlowGeo {
            delay: Duration::from_secs(2),
            body: r#"{"timezone":"America/New_York"}"#,
        },
        Arc::clone(&state),
        pages,
    )
    .with_providers(vec![ProviderDescriptor::new("geo", "https://geo.example/", |b| {
        b.get("timezone").and_then(|v| v.as_str()).map(str::to_string)
    })]);

    let mut tab = BrowserTab {
        slot: TabSlot::new("site-owned-name"),
        ..BrowserTab::default()
    };

    let GateState::Blocked { interstitial } = load(&state, PAGE, &mut tab, &SpoofState::new()) else {
        panic!("page should wait for detection");
    };

    let controller = InterstitialController::new(Arc::clone(&state));
    let (outcome, detected) = tokio::join!(
        controller.run(&interstitial, &mut tab),
        detector.detect(DetectionMode::Invalidate),
    );

    assert_eq!(
        detected.unwrap(),
        DetectionResult::new("America/New_York", "geo")
    );
    assert_eq!(
        outcome,
        Outcome::Navigated {
            url: PAGE.to_string(),
            zone: Some("America/New_York".to_string()),
        }
    );
    assert_eq!(tab.statuses[0], STATUS_DETECTING);
    assert_eq!(tab.navigations, vec![PAGE.to_string()]);

    // The target page picks the zone up from the slot before anything else
    let spoof = SpoofState::new();
    let outcome = load(&state, PAGE, &mut tab, &spoof);
    assert_eq!(
        outcome,
        GateState::ShowSpoofed {
            zone: "America/New_York".to_string()
        }
    );
    assert!(!tab.hidden);
    assert_eq!(tab.slot.read(), "site-owned-name");

    let time = SpoofedTime::new(NativeTime::new(chrono_tz::UTC), spoof);
    let winter = Utc.with_ymd_and_hms(2025, 1, 15, 15, 0, 0).unwrap();

    assert_eq!(time.timezone_offset(winter), 300);
    assert_eq!(
        time.to_string(winter),
        "Wed Jan 15 2025 10:00:01 GMT-0500 (Eastern Standard Time)"
    );

    let formatter = time.date_time_format(None, FormatOptions::default()).unwrap();
    assert_eq!(time.resolved_options(&formatter).time_zone, "America/New_York");
    assert_eq!(time.format(&formatter, winter), "1/15/2025");
}

#[test]
fn scenario_c_disabled_always_shows_immediately() {
    let disabled = Settings {
        enabled: true,
        timezone_enabled: false,
        whitelist: parse_whitelist("news.example"),
    };

    for stored in [None, Some("Europe/Warsaw")] {
        let state = SharedState::in_memory(disabled.clone());
        if let Some(zone) = stored {
            state
                .set_detection(Some(DetectionResult::new(zone, "ipwho.is")))
                .unwrap();
        }

        for url in [PAGE, "https://other.example/", "http://plain.example/x"] {
            let mut tab = BrowserTab::default();
            let spoof = SpoofState::new();
            let outcome = load(&state, url, &mut tab, &spoof);

            assert_eq!(outcome, GateState::ShowImmediate(ShowReason::Disabled), "{}", url);
            assert!(!tab.hidden);
            assert!(tab.redirects.is_empty());
            assert!(!spoof.is_active());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_d_no_result_within_ceiling() {
    let state = Arc::new(SharedState::in_memory(Settings::spoofing(Vec::new())));
    let mut tab = BrowserTab::default();

    let GateState::Blocked { interstitial } = load(&state, PAGE, &mut tab, &SpoofState::new()) else {
        panic!("page should wait for detection");
    };

    let started = tokio::time::Instant::now();
    let outcome = InterstitialController::new(Arc::clone(&state))
        .run(&interstitial, &mut tab)
        .await;

    assert!(started.elapsed() >= Duration::from_secs(10));
    let Outcome::Failed { actions } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(tab.navigations.is_empty());
    assert_eq!(tab.statuses.last().map(String::as_str), Some(STATUS_FAILED));
    assert_eq!(tab.actions, actions);
    assert!(actions.contains(&FailureAction::Retry));
    assert!(actions.contains(&FailureAction::Proceed {
        url: format!("{}&z_override=true", PAGE),
    }));
}
