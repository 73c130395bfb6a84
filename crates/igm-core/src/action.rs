//! Mapping decisions and their cached form.

use serde::{Deserialize, Serialize};

/// Prefix of the per-client dedup cache key.
pub const CLIENT_KEY_PREFIX: &str = "client.";

/// Normalize a MAC address for provisioning: upper-case, surrounding
/// whitespace trimmed.
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_uppercase()
}

/// Cache key for a normalized MAC: `client.<mac without colons>`.
#[must_use]
pub fn client_cache_key(mac: &str) -> String {
    format!("{CLIENT_KEY_PREFIX}{}", mac.replace(':', ""))
}

/// The decision for one session: provision `mac` as `name` into `group` on
/// `network`.
///
/// `network` is `None` when the client's address matched no known subnet and
/// `group` is `None` when no profile mapped to a group; the provisioner
/// decides what either means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedAction {
    /// Controller network identifier.
    pub network: Option<String>,
    /// Normalized MAC address.
    pub mac: String,
    /// Identity (user) name.
    pub name: String,
    /// Target group identifier.
    pub group: Option<String>,
}

impl MappedAction {
    /// Dedup cache key for this action's client.
    #[must_use]
    pub fn cache_key(&self) -> String {
        client_cache_key(&self.mac)
    }
}

/// Last-applied mapping for a client, as stored in the cache.
///
/// Field order is part of the format: two mappings are identical exactly
/// when their canonical serializations are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMapping {
    pub network_id: Option<String>,
    pub mac: String,
    pub ip: String,
    pub name: String,
    pub group: Option<String>,
}

impl CachedMapping {
    /// Record an action together with the address it was resolved from.
    #[must_use]
    pub fn new(action: &MappedAction, ip: impl Into<String>) -> Self {
        Self {
            network_id: action.network.clone(),
            mac: action.mac.clone(),
            ip: ip.into(),
            name: action.name.clone(),
            group: action.group.clone(),
        }
    }

    /// Canonical flat JSON form.
    #[must_use]
    pub fn to_canonical(&self) -> String {
        // Only strings and options of strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The action this record stands for.
    #[must_use]
    pub fn action(&self) -> MappedAction {
        MappedAction {
            network: self.network_id.clone(),
            mac: self.mac.clone(),
            name: self.name.clone(),
            group: self.group.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> MappedAction {
        MappedAction {
            network: Some("N1".into()),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            name: "alice".into(),
            group: Some("100".into()),
        }
    }

    #[test]
    fn test_cache_key_strips_colons() {
        assert_eq!(action().cache_key(), "client.AABBCCDDEEFF");
        assert_eq!(client_cache_key(&normalize_mac(" aa:bb:cc:dd:ee:ff ")), "client.AABBCCDDEEFF");
    }

    #[test]
    fn test_canonical_field_order() {
        let cached = CachedMapping::new(&action(), "10.0.0.5");
        assert_eq!(
            cached.to_canonical(),
            r#"{"network_id":"N1","mac":"AA:BB:CC:DD:EE:FF","ip":"10.0.0.5","name":"alice","group":"100"}"#
        );
    }

    #[test]
    fn test_canonical_nulls() {
        let mut a = action();
        a.network = None;
        a.group = None;
        let cached = CachedMapping::new(&a, "10.0.2.5");
        assert_eq!(
            cached.to_canonical(),
            r#"{"network_id":null,"mac":"AA:BB:CC:DD:EE:FF","ip":"10.0.2.5","name":"alice","group":null}"#
        );
        assert_eq!(cached.action(), a);
    }
}
