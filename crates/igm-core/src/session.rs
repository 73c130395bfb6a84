//! Session events as delivered by the pub/sub feed or the webhook feed.
//!
//! Field names vary between feeds, so records stay as JSON objects and are
//! read through accessors that take the field name.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the session list in a pub/sub payload.
pub const SESSIONS_KEY: &str = "sessions";

/// Key holding the session state in every record.
pub const STATE_KEY: &str = "state";

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Session started.
    Started,
    /// Session authenticated.
    Authenticated,
    /// Any other state (disconnected, postured, ...). Never actionable.
    Other(String),
}

impl SessionState {
    /// Parse a state string as sent by the feed.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STARTED" => Self::Started,
            "AUTHENTICATED" => Self::Authenticated,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only started and authenticated sessions are mapped.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        matches!(self, Self::Started | Self::Authenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("STARTED"),
            Self::Authenticated => f.write_str("AUTHENTICATED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// One session record inside an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRecord {
    fields: Map<String, Value>,
}

impl SessionRecord {
    /// Wrap a JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Session state; a missing state is treated as an unknown one.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.fields
            .get(STATE_KEY)
            .and_then(Value::as_str)
            .map_or_else(|| SessionState::Other(String::new()), SessionState::parse)
    }

    /// Whether the record carries the given field at all.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field rendered as text. Strings are returned as-is, other scalars via
    /// their JSON form, and `null`/missing as `None`.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Addresses held in `field`. A list yields its string members in order;
    /// a single non-empty string yields a one-element list.
    #[must_use]
    pub fn addresses(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, Value>> for SessionRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// One decoded notification holding zero or more session records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionEvent {
    sessions: Vec<SessionRecord>,
}

impl SessionEvent {
    /// Build an event from a pub/sub payload.
    ///
    /// Returns `None` when the payload has no `sessions` key. Non-object
    /// entries in the list are dropped.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let sessions = payload.get(SESSIONS_KEY)?;
        let sessions = sessions
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .cloned()
                    .map(SessionRecord::new)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { sessions })
    }

    /// Build a single-session event (webhook feeds post one record per call).
    #[must_use]
    pub fn single(record: SessionRecord) -> Self {
        Self {
            sessions: vec![record],
        }
    }

    /// Session records in feed order.
    #[must_use]
    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    /// Whether the event carries no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
