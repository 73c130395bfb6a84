//! Subnet → network inventory.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{MapperError, MapperResult};

/// One inventory row. Serialized with the exporter's column names so a
/// cached table reads like the CSV it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub subnet: IpNet,
    #[serde(rename = "Network ID")]
    pub network_id: String,
}

impl NetworkEntry {
    #[must_use]
    pub fn new(subnet: IpNet, network_id: impl Into<String>) -> Self {
        Self {
            subnet,
            network_id: network_id.into(),
        }
    }
}

/// Ordered subnet table; the first containing entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkTable {
    entries: Vec<NetworkEntry>,
}

impl NetworkTable {
    #[must_use]
    pub const fn new(entries: Vec<NetworkEntry>) -> Self {
        Self { entries }
    }

    /// Network containing `ip`.
    #[must_use]
    pub fn resolve(&self, ip: IpAddr) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.subnet.contains(&ip))
            .map(|e| e.network_id.as_str())
    }

    #[must_use]
    pub fn entries(&self) -> &[NetworkEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON form stored in the cache.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the cached JSON form. `None` if it is corrupt.
    #[must_use]
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

impl FromIterator<NetworkEntry> for NetworkTable {
    fn from_iter<T: IntoIterator<Item = NetworkEntry>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Source of the inventory table.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Load the full table.
    async fn load(&self) -> MapperResult<NetworkTable>;
}

#[async_trait]
impl InventorySource for NetworkTable {
    async fn load(&self) -> MapperResult<NetworkTable> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Network ID")]
    network_id: String,
    subnet: String,
}

/// Inventory exported as CSV with `Network ID` and `subnet` columns. Other
/// columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvInventory {
    path: PathBuf,
}

impl CsvInventory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse CSV text. Rows with an unparsable subnet are skipped.
    ///
    /// # Errors
    /// Fails when the header row lacks a required column or a record cannot
    /// be read.
    pub fn parse(&self, data: &[u8]) -> MapperResult<NetworkTable> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data);
        let mut entries = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| self.error(e))?;
            match parse_subnet(&row.subnet) {
                Some(subnet) => entries.push(NetworkEntry::new(subnet, row.network_id)),
                None => warn!(
                    path = %self.path.display(),
                    row = index + 1,
                    subnet = %row.subnet,
                    "Skipping inventory row with invalid subnet"
                ),
            }
        }
        debug!(path = %self.path.display(), entries = entries.len(), "Inventory parsed");
        Ok(NetworkTable::new(entries))
    }

    fn error(&self, err: impl ToString) -> MapperError {
        MapperError::Inventory {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl InventorySource for CsvInventory {
    async fn load(&self) -> MapperResult<NetworkTable> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        self.parse(&data)
    }
}

/// CIDR, or a bare address as a host route. Host bits are cleared.
fn parse_subnet(raw: &str) -> Option<IpNet> {
    if let Ok(net) = raw.parse::<IpNet>() {
        return Some(net.trunc());
    }
    let addr = raw.parse::<IpAddr>().ok()?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NetworkTable {
        NetworkTable::new(vec![
            NetworkEntry::new("10.0.0.0/24".parse().unwrap(), "N1"),
            NetworkEntry::new("10.0.1.0/24".parse().unwrap(), "N2"),
        ])
    }

    #[test]
    fn resolve_first_match() {
        let t = table();
        assert_eq!(t.resolve("10.0.0.5".parse().unwrap()), Some("N1"));
        assert_eq!(t.resolve("10.0.1.200".parse().unwrap()), Some("N2"));
        assert_eq!(t.resolve("10.0.2.5".parse().unwrap()), None);

        let overlapping: NetworkTable = [
            NetworkEntry::new("10.0.0.0/16".parse().unwrap(), "WIDE"),
            NetworkEntry::new("10.0.0.0/24".parse().unwrap(), "NARROW"),
        ]
        .into_iter()
        .collect();
        assert_eq!(overlapping.resolve("10.0.0.1".parse().unwrap()), Some("WIDE"));
    }

    #[test]
    fn json_uses_exporter_column_names() {
        let json = table().to_json();
        assert!(json.starts_with(r#"[{"subnet":"10.0.0.0/24","Network ID":"N1"}"#));
        assert_eq!(NetworkTable::from_json(&json), Some(table()));
        assert_eq!(NetworkTable::from_json("{not json"), None);
    }

    #[test]
    fn parse_exporter_csv() {
        let csv = "\"Network ID\",\"VLID\",\"VLAN Name\",\"subnet\"\n\
                   \"N1\",\"1\",\"Data\",\"10.0.0.0/24\"\n\
                   \"N2\",\"2\",\"Voice\",\"10.0.1.0/24\"\n\
                   \"N3\",\"3\",\"Broken\",\"not-a-subnet\"\n\
                   \"N4\",\"4\",\"Host\",\"192.168.1.7\"\n";
        let t = CsvInventory::new("networks.csv").parse(csv.as_bytes()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.resolve("10.0.1.9".parse().unwrap()), Some("N2"));
        assert_eq!(t.resolve("192.168.1.7".parse().unwrap()), Some("N4"));
    }

    #[test]
    fn parse_missing_column_fails() {
        let err = CsvInventory::new("bad.csv")
            .parse(b"Network ID,VLID\nN1,1\n")
            .unwrap_err();
        assert!(matches!(err, MapperError::Inventory { .. }));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("networks.csv");
        std::fs::write(&path, "Network ID,subnet\nL_1,172.16.0.0/12\n").unwrap();

        let t = CsvInventory::new(&path).load().await.unwrap();
        assert_eq!(t.resolve("172.20.1.1".parse().unwrap()), Some("L_1"));

        let missing = CsvInventory::new(dir.path().join("absent.csv")).load().await;
        assert!(matches!(missing, Err(MapperError::Inventory { .. })));
    }
}
