//! fOS Timezone Guard
//!
//! Keeps the time a page can observe consistent with the proxy's exit
//! location.
//!
//! Architecture:
//! 1. `detect` races IP-geolocation providers and commits the first
//!    well-formed zone to `state`
//! 2. `bridge` pushes zone changes to every open page, `token` carries a
//!    zone across one full navigation
//! 3. `gate` decides per page load: show, show spoofed, or hold for the
//!    `interstitial` until a zone is known
//! 4. `spoofer` rewrites every time read of a page coherently; `script`
//!    renders the same overrides for a browser main world

pub mod bridge;
pub mod detect;
pub mod format;
pub mod gate;
pub mod interstitial;
pub mod provider;
pub mod script;
pub mod settings;
pub mod spoofer;
pub mod state;
pub mod token;
pub mod whitelist;
pub mod zone;

pub use bridge::{PageListener, PageMessage, PageRegistry, TabId};
pub use detect::{DetectionError, DetectionMode, DetectionTrigger, TimezoneDetector};
pub use gate::{GateState, PageHost, PageRenderGate, ShowReason};
pub use interstitial::{FailureAction, InterstitialController, InterstitialError, InterstitialTab, Outcome};
pub use provider::{ProviderDescriptor, ProviderFailure};
pub use settings::{Settings, SettingsError};
pub use spoofer::{NativeTime, SpoofState, SpoofedTime, TimeSurface};
pub use state::{DetectionResult, RetrySchedule, SharedState, StoreError};
pub use token::{NavigationSlot, NavigationToken, TabSlot};
pub use whitelist::{Pattern, SpoofConfig};
