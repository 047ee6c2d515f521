//! Navigation token carried in a tab-scoped opaque slot.
//!
//! Format: `Z_TZ_MARKER:<zone>::<original slot value>`. The slot survives
//! exactly one navigation and is restored to its original value as soon
//! as the next document reads it.

use crate::zone;
use std::fmt;

/// Prefix identifying a token in the slot
pub const TOKEN_MARKER: &str = "Z_TZ_MARKER:";

const SEPARATOR: &str = "::";

/// Decoded navigation token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationToken {
    zone_id: String,
    original: String,
}

impl NavigationToken {
    /// Token for `zone_id`, preserving the slot's current value
    pub fn new(zone_id: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            original: original.into(),
        }
    }

    /// Zone carried across the navigation
    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    /// Slot value before the token was written
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Encoded slot value
    pub fn encode(&self) -> String {
        format!("{}{}{}{}", TOKEN_MARKER, self.zone_id, SEPARATOR, self.original)
    }

    /// Decode a slot value.
    ///
    /// Returns `None` for anything that is not a well-formed token with a
    /// usable zone. The original state may itself contain `::`.
    pub fn decode(slot: &str) -> Option<Self> {
        let (zone_id, original) = split(slot)?;
        if !zone::is_valid_zone(zone_id) {
            return None;
        }
        Some(Self::new(zone_id, original))
    }
}

impl fmt::Display for NavigationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Marker and separator present: `(zone, original)`, zone unchecked
fn split(slot: &str) -> Option<(&str, &str)> {
    slot.strip_prefix(TOKEN_MARKER)?.split_once(SEPARATOR)
}

/// A tab-scoped string that survives one navigation (window.name in a
/// browser host).
pub trait NavigationSlot {
    /// Current value
    fn read(&self) -> String;

    /// Replace the value
    fn write(&mut self, value: String);
}

/// Write a token for `zone_id` into the slot, keeping its current value
/// recoverable.
pub fn stash(slot: &mut impl NavigationSlot, zone_id: &str) {
    let token = NavigationToken::new(zone_id, slot.read());
    slot.write(token.encode());
}

/// Read and clear a token from the slot.
///
/// Any marked value is consumed and the slot restored to its pre-token
/// value, even when the zone is unusable; only a valid zone is returned.
/// A value without the marker leaves the slot untouched.
pub fn take(slot: &mut impl NavigationSlot) -> Option<String> {
    let value = slot.read();
    let (zone_id, original) = split(&value)?;
    let zone_id = zone::is_valid_zone(zone_id).then(|| zone_id.to_string());
    slot.write(original.to_string());
    zone_id
}

/// In-memory slot, one per tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabSlot(String);

impl TabSlot {
    /// Slot holding `value`
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl NavigationSlot for TabSlot {
    fn read(&self) -> String {
        self.0.clone()
    }

    fn write(&mut self, value: String) {
        self.0 = value;
    }
}
