//! Which session field carries the profile, and how to read it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use igm_core::SessionRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape of the profile attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileShape {
    /// One string, e.g. `endpointProfile`.
    Single,
    /// A list of strings, e.g. `selectedAuthzProfiles`.
    #[default]
    List,
    /// One string of comma-separated values, e.g. the webhook `role`.
    CommaSeparated,
}

impl FromStr for ProfileShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single" => Ok(Self::Single),
            "list" => Ok(Self::List),
            "comma_separated" | "csv" => Ok(Self::CommaSeparated),
            other => Err(format!("unknown profile shape {other:?}")),
        }
    }
}

impl fmt::Display for ProfileShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::List => "list",
            Self::CommaSeparated => "comma_separated",
        })
    }
}

/// Names the profile field and its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSelector {
    pub field: String,
    pub shape: ProfileShape,
}

impl ProfileSelector {
    #[must_use]
    pub fn new(field: impl Into<String>, shape: ProfileShape) -> Self {
        Self {
            field: field.into(),
            shape,
        }
    }

    /// `endpointProfile`, a single string.
    #[must_use]
    pub fn endpoint_profile() -> Self {
        Self::new("endpointProfile", ProfileShape::Single)
    }

    /// `selectedAuthzProfiles`, a list.
    #[must_use]
    pub fn authz_profiles() -> Self {
        Self::new("selectedAuthzProfiles", ProfileShape::List)
    }

    /// `role`, comma-separated.
    #[must_use]
    pub fn roles() -> Self {
        Self::new("role", ProfileShape::CommaSeparated)
    }

    /// Profiles carried by a record in feed order, or `None` when the field
    /// is absent. A string where a list is expected counts as one profile,
    /// and the other way round.
    #[must_use]
    pub fn profiles(&self, record: &SessionRecord) -> Option<Vec<String>> {
        let value = record.get(&self.field)?;
        let profiles = match (self.shape, value) {
            (ProfileShape::CommaSeparated, Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            (_, Value::String(s)) => vec![s.clone()],
            (_, Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            (_, Value::Null) => Vec::new(),
            (_, other) => vec![other.to_string()],
        };
        Some(profiles)
    }
}

impl Default for ProfileSelector {
    fn default() -> Self {
        Self::authz_profiles()
    }
}

/// Field names for identity, MAC and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFields {
    pub name: String,
    pub mac: String,
    pub ip: String,
}

impl SessionFields {
    /// Pub/sub session feed.
    #[must_use]
    pub fn pubsub() -> Self {
        Self {
            name: "userName".into(),
            mac: "macAddress".into(),
            ip: "ipAddresses".into(),
        }
    }

    /// Webhook feed (one address per record).
    #[must_use]
    pub fn webhook() -> Self {
        Self {
            ip: "ipAddress".into(),
            ..Self::pubsub()
        }
    }
}

impl Default for SessionFields {
    fn default() -> Self {
        Self::pubsub()
    }
}

/// Case-insensitive profile → group table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileMap {
    groups: HashMap<String, String>,
}

impl ProfileMap {
    /// Build from (profile, group) pairs. Profile names are folded to lower
    /// case; a later pair overrides an earlier one with the same folded name.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            groups: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Group for one profile name.
    #[must_use]
    pub fn get(&self, profile: &str) -> Option<&str> {
        self.groups.get(&profile.to_lowercase()).map(String::as_str)
    }

    /// First group matched by `profiles`, in order.
    #[must_use]
    pub fn resolve(&self, profiles: &[String]) -> Option<String> {
        profiles
            .iter()
            .find_map(|p| self.get(p))
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SessionRecord {
        SessionRecord::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_single_shape() {
        let r = record(json!({"endpointProfile": "Guest"}));
        assert_eq!(
            ProfileSelector::endpoint_profile().profiles(&r),
            Some(vec!["Guest".to_string()])
        );
    }

    #[test]
    fn test_list_shape() {
        let r = record(json!({"selectedAuthzProfiles": ["PermitAccess", "Staff"]}));
        assert_eq!(
            ProfileSelector::authz_profiles().profiles(&r),
            Some(vec!["PermitAccess".to_string(), "Staff".to_string()])
        );
    }

    #[test]
    fn test_comma_separated_shape_trims() {
        let r = record(json!({"role": " Employees ,Contractors,, "}));
        assert_eq!(
            ProfileSelector::roles().profiles(&r),
            Some(vec!["Employees".to_string(), "Contractors".to_string()])
        );
    }

    #[test]
    fn test_missing_field() {
        let r = record(json!({"userName": "alice"}));
        assert_eq!(ProfileSelector::authz_profiles().profiles(&r), None);
    }

    #[test]
    fn test_profile_map_case_insensitive_first_match() {
        let map = ProfileMap::from_pairs([("Guest", "100"), ("STAFF", "200")]);
        assert_eq!(map.get("guest"), Some("100"));
        assert_eq!(
            map.resolve(&["unknown".into(), "staff".into(), "Guest".into()]),
            Some("200".to_string())
        );
        assert_eq!(map.resolve(&["unknown".into()]), None);
        assert_eq!(map.resolve(&[]), None);
    }

    #[test]
    fn test_shape_parse() {
        assert_eq!("single".parse::<ProfileShape>(), Ok(ProfileShape::Single));
        assert_eq!(
            "comma-separated".parse::<ProfileShape>(),
            Ok(ProfileShape::CommaSeparated)
        );
        assert!("tree".parse::<ProfileShape>().is_err());
        assert_eq!(ProfileShape::CommaSeparated.to_string(), "comma_separated");
    }
}
