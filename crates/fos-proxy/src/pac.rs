//! PAC script generation
//!
//! Whitelisted hosts go `DIRECT`, everything else through the SOCKS5
//! endpoint.

use crate::config::Endpoint;
use fos_timezone::Pattern;

/// Build the `FindProxyForURL` script for `endpoint` and `whitelist`
pub fn pac_script(endpoint: &Endpoint, whitelist: &[Pattern]) -> String {
    let mut script = String::from("function FindProxyForURL(url, host) {\n");

    for pattern in whitelist {
        let p = js_escape(pattern.as_str());
        let rule = if pattern.is_glob() {
            format!("  if (shExpMatch(host, \"{}\")) return \"DIRECT\";\n", p)
        } else {
            format!(
                "  if (dnsDomainIs(host, \"{p}\") || shExpMatch(host, \"*.{p}\")) return \"DIRECT\";\n"
            )
        };
        script.push_str(&rule);
    }

    script.push_str(&format!(
        "  return \"SOCKS5 {}:{}\";\n}}\n",
        js_escape(&endpoint.host),
        endpoint.port
    ));
    script
}

fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
