//! Recursive redaction of secret-shaped data
//!
//! A [`Redactor`] walks a `serde_json::Value` and replaces
//! - the value of any object key whose name contains a denied fragment
//!   (`token`, `secret`, `password`, `authorization`, ...), and
//! - any bearer-style credential embedded in a string value
//!
//! with [`REDACTION_MARKER`]. Nested objects and arrays are visited at every
//! depth. Applying the redactor twice yields the same output as applying it
//! once.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Fixed marker substituted for every redacted value
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Key fragments denied by default (matched case-insensitively)
const DEFAULT_DENIED_KEY_FRAGMENTS: &[&str] = &[
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "api_key",
    "apikey",
    "cookie",
];

// Authorization-header shaped credentials, including the scheme some
// providers use in place of "Bearer".
static BEARER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:bearer|zoho-oauthtoken)\s+[A-Za-z0-9\-._~+/]+=*")
        .expect("BEARER_REGEX should compile - this is a bug")
});

/// Structural redactor for log and audit context
#[derive(Clone)]
pub struct Redactor {
    denied_fragments: Vec<String>,
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor").field("denied_fragments", &self.denied_fragments.len()).finish()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Redactor {
    /// Create a redactor with the default denied key fragments
    pub fn new() -> Self {
        Self {
            denied_fragments: DEFAULT_DENIED_KEY_FRAGMENTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Add more denied key fragments on top of the defaults
    #[must_use]
    pub fn with_denied_keys<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for fragment in fragments {
            let fragment = fragment.as_ref().trim().to_ascii_lowercase();
            if !fragment.is_empty() && !self.denied_fragments.contains(&fragment) {
                self.denied_fragments.push(fragment);
            }
        }
        self
    }

    /// Whether a mapping key names a secret
    pub fn is_denied_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.denied_fragments.iter().any(|fragment| key.contains(fragment.as_str()))
    }

    /// Scrub bearer-style credentials out of free text
    pub fn redact_str<'a>(&self, input: &'a str) -> Cow<'a, str> {
        BEARER_REGEX.replace_all(input, REDACTION_MARKER)
    }

    /// Return a redacted copy of `value`
    pub fn redact(&self, value: &Value) -> Value {
        let mut copy = value.clone();
        self.redact_in_place(&mut copy);
        copy
    }

    /// Redact `value` without copying it
    pub fn redact_in_place(&self, value: &mut Value) {
        match value {
            Value::Object(map) => self.redact_map(map),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_in_place(item);
                }
            }
            Value::String(text) => {
                let scrubbed = match self.redact_str(text) {
                    Cow::Owned(scrubbed) => Some(scrubbed),
                    Cow::Borrowed(_) => None,
                };
                if let Some(scrubbed) = scrubbed {
                    *text = scrubbed;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    fn redact_map(&self, map: &mut Map<String, Value>) {
        for (key, entry) in map.iter_mut() {
            if self.is_denied_key(key) {
                *entry = Value::String(REDACTION_MARKER.to_string());
            } else {
                self.redact_in_place(entry);
            }
        }
    }
}
