use std::time::Duration;

use serde_json::Value;

/// Keys whose values never reach the log.
pub const DEFAULT_REDACT_FIELDS: &[&str] = &[
    "password",
    "secret",
    "nodeSecret",
    "api_key",
    "apiKey",
    "authorization",
    "token",
];

const MASK: &str = "[REDACTED]";

/// Masks JSON values stored under sensitive keys, at any depth.
///
/// Keys match case-insensitively when they contain one of the configured
/// needles, so `accessSecret` is caught by `secret`.
#[derive(Debug, Clone)]
pub struct Redactor {
    needles: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: fields
                .into_iter()
                .map(|field| field.as_ref().to_ascii_lowercase())
                .filter(|field| !field.is_empty())
                .collect(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.needles.iter().any(|needle| key.contains(needle.as_str()))
    }

    /// Mask `value` in place.
    pub fn redact_in_place(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        *inner = Value::String(MASK.to_string());
                    } else {
                        self.redact_in_place(inner);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.redact_in_place(item)),
            _ => {}
        }
    }

    #[must_use]
    pub fn redact(&self, value: &Value) -> Value {
        let mut copy = value.clone();
        self.redact_in_place(&mut copy);
        copy
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_REDACT_FIELDS)
    }
}

/// Copy of `value` with every key matching `fields` masked.
#[must_use]
pub fn redact_sensitive(value: &Value, fields: &[&str]) -> Value {
    Redactor::new(fields).redact(value)
}

/// [`redact_sensitive`] with [`DEFAULT_REDACT_FIELDS`].
#[must_use]
pub fn redact_default(value: &Value) -> Value {
    Redactor::default().redact(value)
}

/// Log one control-plane exchange at debug, or warn when `status` is not 2xx.
///
/// Both bodies are redacted first.
pub fn log_exchange(
    endpoint: &str,
    status: u16,
    elapsed: Duration,
    request: &Value,
    response: &Value,
) {
    let redactor = Redactor::default();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let request = redactor.redact(request);
    let response = redactor.redact(response);

    if (200..300).contains(&status) {
        tracing::debug!(endpoint, status, elapsed_ms, %request, %response, "Control plane call");
    } else {
        tracing::warn!(endpoint, status, elapsed_ms, %request, %response, "Control plane call failed");
    }
}
