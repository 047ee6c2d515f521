//! Page-context payload
//!
//! The spoofing math in [`crate::spoofer`] is host-agnostic. In a real
//! browser the same overrides have to be installed into the page's main
//! world before any page script runs; this module generates that script
//! and the relay message the isolated context posts on live updates.

use crate::spoofer::{Builtin, TIME_SKEW_MS};
use crate::token::TOKEN_MARKER;
use serde_json::json;

/// `postMessage` type used for live zone updates
pub const UPDATE_MESSAGE_TYPE: &str = "TIMEZONE_UPDATE";

const TEMPLATE: &str = r#"(() => {
  'use strict';
  const INITIAL = __INITIAL__;
  const SKEW = __SKEW__;
  const MARKER = __MARKER__;
  const UPDATE = __UPDATE__;

  let zone = INITIAL;

  // Navigation hand-off: consume the token and restore window.name
  try {
    const name = window.name;
    if (typeof name === 'string' && name.startsWith(MARKER)) {
      const rest = name.slice(MARKER.length);
      const cut = rest.indexOf('::');
      if (cut >= 0) {
        window.name = rest.slice(cut + 2);
        const carried = rest.slice(0, cut);
        try {
          new Intl.DateTimeFormat('en-US', { timeZone: carried });
          zone = carried;
        } catch (_) {}
      }
    }
  } catch (_) {}

  window.addEventListener('message', (event) => {
    if (event.source === window && event.data && event.data.type === UPDATE) {
      zone = typeof event.data.timezone === 'string' ? event.data.timezone : null;
    }
  });

  const NativeDate = Date;
  const NativeDTF = Intl.DateTimeFormat;
  const proto = NativeDate.prototype;
  const dtfProto = NativeDTF.prototype;
  const native = {
    format: Object.getOwnPropertyDescriptor(dtfProto, 'format').get,
    formatToParts: dtfProto.formatToParts,
    resolvedOptions: dtfProto.resolvedOptions,
    getTimezoneOffset: proto.getTimezoneOffset,
    toString: proto.toString,
    toLocaleString: proto.toLocaleString,
    toLocaleDateString: proto.toLocaleDateString,
    toLocaleTimeString: proto.toLocaleTimeString,
    fnToString: Function.prototype.toString,
  };

  const disguised = new WeakMap();
  const disguise = (fn, name, length) => {
    disguised.set(fn, name);
    if (length !== undefined) Object.defineProperty(fn, 'length', { value: length, configurable: true });
    return fn;
  };

  const skewed = (d) => new NativeDate(NativeDate.prototype.valueOf.call(d) + SKEW);
  const hasZone = (opts) => opts !== null && typeof opts === 'object' && opts.timeZone !== undefined;
  const explicit = new WeakSet();

  const fields = (instant) => {
    const parts = native.formatToParts.call(new NativeDTF('en-US', {
      timeZone: zone, hourCycle: 'h23',
      year: 'numeric', month: 'numeric', day: 'numeric',
      hour: 'numeric', minute: 'numeric', second: 'numeric',
    }), instant);
    const f = {};
    for (const p of parts) if (p.type !== 'literal') f[p.type] = Number(p.value);
    return f;
  };

  const minutesWest = (instant) => {
    const f = fields(instant);
    const wall = NativeDate.UTC(f.year, f.month - 1, f.day, f.hour, f.minute, f.second);
    const exact = instant.getTime() - instant.getMilliseconds();
    return Math.round((exact - wall) / 60000);
  };

  function DateTimeFormat(locales, options) {
    let opts = options;
    if (zone && !hasZone(options)) opts = Object.assign({}, options, { timeZone: zone });
    const inst = new NativeDTF(locales, opts);
    if (hasZone(options)) explicit.add(inst);
    return inst;
  }
  DateTimeFormat.prototype = dtfProto;
  DateTimeFormat.supportedLocalesOf = NativeDTF.supportedLocalesOf.bind(NativeDTF);
  Object.setPrototypeOf(DateTimeFormat, NativeDTF);
  Object.defineProperty(dtfProto, 'constructor', { value: DateTimeFormat, writable: true, configurable: true });
  Intl.DateTimeFormat = disguise(DateTimeFormat, 'DateTimeFormat', 0);

  // One bound format function per formatter, like the native getter
  const boundFormats = new WeakMap();
  Object.defineProperty(dtfProto, 'format', {
    configurable: true,
    get: disguise(function () {
      let wrapper = boundFormats.get(this);
      if (wrapper) return wrapper;
      const bound = native.format.call(this);
      wrapper = disguise(function (date) {
        const d = date === undefined ? new NativeDate() : new NativeDate(date);
        return zone ? bound(skewed(d)) : bound(d);
      }, '');
      boundFormats.set(this, wrapper);
      return wrapper;
    }, 'get format'),
  });

  dtfProto.formatToParts = disguise(function (date) {
    const d = date === undefined ? new NativeDate() : new NativeDate(date);
    return native.formatToParts.call(this, zone ? skewed(d) : d);
  }, 'formatToParts');

  dtfProto.resolvedOptions = disguise(function () {
    const resolved = native.resolvedOptions.call(this);
    if (zone && !explicit.has(this)) resolved.timeZone = zone;
    return resolved;
  }, 'resolvedOptions');

  proto.getTimezoneOffset = disguise(function () {
    if (!zone) return native.getTimezoneOffset.call(this);
    try {
      return minutesWest(skewed(this));
    } catch (_) {
      return native.getTimezoneOffset.call(this);
    }
  }, 'getTimezoneOffset');

  proto.toString = disguise(function () {
    if (!zone) return native.toString.call(this);
    try {
      const d = skewed(this);
      const west = minutesWest(d);
      const east = Math.abs(west);
      const pad = (n, w) => String(n).padStart(w || 2, '0');
      const gmt = 'GMT' + (west <= 0 ? '+' : '-') + pad(Math.floor(east / 60)) + pad(east % 60);
      const text = native.formatToParts.call(new NativeDTF('en-US', {
        timeZone: zone, hourCycle: 'h23', weekday: 'short', month: 'short',
        day: '2-digit', year: 'numeric', hour: '2-digit', minute: '2-digit', second: '2-digit',
        timeZoneName: 'long',
      }), d).reduce((acc, p) => { acc[p.type] = p.value; return acc; }, {});
      return `${text.weekday} ${text.month} ${text.day} ${text.year} ` +
        `${text.hour}:${text.minute}:${text.second} ${gmt} (${text.timeZoneName || zone})`;
    } catch (_) {
      return native.toString.call(this);
    }
  }, 'toString');

  for (const name of ['toLocaleString', 'toLocaleDateString', 'toLocaleTimeString']) {
    const original = native[name];
    proto[name] = disguise(function (locales, options) {
      if (!zone) return original.call(this, locales, options);
      const opts = hasZone(options) ? options : Object.assign({}, options, { timeZone: zone });
      return original.call(skewed(this), locales, opts);
    }, name, 0);
  }

  const fnToString = disguise(function toString() {
    if (disguised.has(this)) return `function ${disguised.get(this)}() { [native code] }`;
    return native.fnToString.call(this);
  }, __TO_STRING__);
  Function.prototype.toString = fnToString;
})();
"#;

/// Main-world payload for a page starting with `zone` (or none) and the
/// given skew in milliseconds.
pub fn page_script(zone: Option<&str>, skew_ms: i64) -> String {
    TEMPLATE
        .replace("__INITIAL__", &json!(zone).to_string())
        .replace("__SKEW__", &skew_ms.to_string())
        .replace("__MARKER__", &json!(TOKEN_MARKER).to_string())
        .replace("__UPDATE__", &json!(UPDATE_MESSAGE_TYPE).to_string())
        .replace("__TO_STRING__", &json!(Builtin::FunctionToString.name()).to_string())
}

/// Payload with the standard skew
pub fn default_page_script(zone: Option<&str>) -> String {
    page_script(zone, TIME_SKEW_MS)
}

/// Message the isolated context posts to the main world on a live update
pub fn update_message(zone: Option<&str>) -> String {
    json!({ "type": UPDATE_MESSAGE_TYPE, "timezone": zone }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_filled() {
        let script = page_script(Some("America/New_York"), 1000);
        assert!(!script.contains("__"));
        assert!(script.contains(r#"const INITIAL = "America/New_York";"#));
        assert!(script.contains("const SKEW = 1000;"));
        assert!(script.contains(r#"const MARKER = "Z_TZ_MARKER:";"#));
    }

    #[test]
    fn test_no_zone_is_null() {
        let script = default_page_script(None);
        assert!(script.contains("const INITIAL = null;"));
        assert!(script.contains(&format!("const SKEW = {};", TIME_SKEW_MS)));
    }

    #[test]
    fn test_zone_is_escaped() {
        let script = page_script(Some(r#"x";alert(1);""#), 0);
        assert!(script.contains(r#"const INITIAL = "x\";alert(1);\"";"#));
    }

    #[test]
    fn test_covers_every_builtin() {
        let script = default_page_script(None);
        for builtin in Builtin::ALL {
            assert!(script.contains(builtin.name()), "{} not overridden", builtin.name());
        }
    }

    #[test]
    fn test_format_getter_is_stable() {
        let script = default_page_script(None);
        assert!(script.contains("boundFormats.get(this)"));
        assert!(script.contains("boundFormats.set(this, wrapper)"));
        assert!(script.contains("disguise(DateTimeFormat, 'DateTimeFormat', 0)"));
    }

    #[test]
    fn test_handoff_validates_carried_zone() {
        let script = default_page_script(None);
        let restore = script.find("window.name = rest.slice(cut + 2)").unwrap();
        let adopt = script.find("zone = carried").unwrap();
        assert!(restore < adopt);
        assert!(script.contains("timeZone: carried"));
    }

    #[test]
    fn test_update_message() {
        let msg: serde_json::Value = serde_json::from_str(&update_message(Some("Asia/Dubai"))).unwrap();
        assert_eq!(msg["type"], "TIMEZONE_UPDATE");
        assert_eq!(msg["timezone"], "Asia/Dubai");

        let cleared: serde_json::Value = serde_json::from_str(&update_message(None)).unwrap();
        assert!(cleared["timezone"].is_null());
    }
}
