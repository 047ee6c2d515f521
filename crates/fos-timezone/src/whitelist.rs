//! Hostname whitelist
//!
//! Entries containing `*` are anchored globs over the whole hostname.
//! Anything else matches the hostname itself or any subdomain of it.
//! Matching is ASCII case-insensitive and evaluated per navigation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single whitelist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pattern {
    /// Wildcard pattern, e.g. `*.example.*`
    Glob(String),
    /// Domain, e.g. `example.com` (covers `www.example.com`)
    Domain(String),
}

impl Pattern {
    /// Classify an entry
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim().to_ascii_lowercase();
        if entry.contains('*') {
            Self::Glob(entry)
        } else {
            Self::Domain(entry)
        }
    }

    /// Entry text as written
    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob(p) | Self::Domain(p) => p,
        }
    }

    /// Whether this entry is a glob
    pub fn is_glob(&self) -> bool {
        matches!(self, Self::Glob(_))
    }

    /// Whether `hostname` is covered by this entry
    pub fn matches(&self, hostname: &str) -> bool {
        let host = hostname.to_ascii_lowercase();
        match self {
            Self::Glob(p) => glob_match(p.as_bytes(), host.as_bytes()),
            Self::Domain(d) => {
                if d.is_empty() {
                    return false;
                }
                host == *d
                    || host
                        .strip_suffix(d.as_str())
                        .is_some_and(|head| head.ends_with('.'))
            }
        }
    }
}

impl From<String> for Pattern {
    fn from(entry: String) -> Self {
        Self::parse(&entry)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Glob(p) | Pattern::Domain(p) => p,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchored `*` wildcard match (no other metacharacters)
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            // Let the last star swallow one more byte
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// Read-only view of the spoofing switches the gate consults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpoofConfig {
    pub enabled: bool,
    pub whitelist: Vec<Pattern>,
}

impl SpoofConfig {
    /// Whether any whitelist entry covers `hostname`
    pub fn is_whitelisted(&self, hostname: &str) -> bool {
        !hostname.is_empty() && self.whitelist.iter().any(|p| p.matches(hostname))
    }

    /// Whether pages on `hostname` should be spoofed
    pub fn applies_to(&self, hostname: &str) -> bool {
        self.enabled && !self.is_whitelisted(hostname)
    }
}

/// Parse whitelist text: one entry per line, blank lines and `#`/`//`
/// comments skipped.
pub fn parse_whitelist(text: &str) -> Vec<Pattern> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"))
        .map(Pattern::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_matches_subdomains() {
        let p = Pattern::parse("example.com");
        assert!(!p.is_glob());
        assert!(p.matches("example.com"));
        assert!(p.matches("www.example.com"));
        assert!(p.matches("a.b.example.com"));
        assert!(!p.matches("notexample.com"));
        assert!(!p.matches("example.com.evil.net"));
    }

    #[test]
    fn test_glob_is_anchored() {
        let p = Pattern::parse("*.bank.*");
        assert!(p.is_glob());
        assert!(p.matches("www.bank.de"));
        assert!(p.matches("online.bank.co.uk"));
        assert!(!p.matches("bank.de"));
        assert!(!p.matches("www.banking.de"));

        let exact = Pattern::parse("mail.*");
        assert!(exact.matches("mail.google.com"));
        assert!(!exact.matches("gmail.com"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(Pattern::parse("Example.COM").matches("WWW.example.com"));
        assert!(Pattern::parse("*.Example.com").matches("api.EXAMPLE.com"));
    }

    #[test]
    fn test_parse_whitelist_text() {
        let text = "\n# banks\nexample.com\n  // legacy\n  *.local  \n\n";
        let list = parse_whitelist(text);
        assert_eq!(
            list,
            vec![Pattern::Domain("example.com".into()), Pattern::Glob("*.local".into())]
        );
    }

    #[test]
    fn test_spoof_config() {
        let config = SpoofConfig {
            enabled: true,
            whitelist: parse_whitelist("example.com"),
        };
        assert!(!config.applies_to("shop.example.com"));
        assert!(config.applies_to("other.org"));

        let disabled = SpoofConfig { enabled: false, ..config };
        assert!(!disabled.applies_to("other.org"));
    }

    #[test]
    fn test_pattern_serde_as_string() {
        let json = serde_json::to_string(&vec![Pattern::parse("*.a.com"), Pattern::parse("b.com")]).unwrap();
        assert_eq!(json, r#"["*.a.com","b.com"]"#);
        let back: Vec<Pattern> = serde_json::from_str(&json).unwrap();
        assert!(back[0].is_glob());
    }
}
