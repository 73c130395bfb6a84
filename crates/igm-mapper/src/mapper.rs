//! Session → action decisions with cache-backed dedup.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use igm_core::{
    CachedMapping, MappedAction, SessionEvent, SessionRecord, client_cache_key, normalize_mac,
};
use tracing::{debug, error, instrument};

use crate::{
    CacheStore, DEFAULT_CACHE_EXPIRE, InventorySource, MapperResult, NETWORKS_CACHE_KEY,
    NetworkTable, ProfileMap, ProfileSelector, SessionFields,
};

/// Maps session events to provisioning actions.
///
/// A candidate action is emitted only when its canonical record differs from
/// the one cached for the client; the cache is updated before the action is
/// returned.
pub struct IdentityGroupMapper {
    cache: Arc<dyn CacheStore>,
    inventory: Arc<dyn InventorySource>,
    profile_map: ProfileMap,
    selector: ProfileSelector,
    fields: SessionFields,
    expire: Duration,
}

impl IdentityGroupMapper {
    /// Mapper for the pub/sub feed with `selectedAuthzProfiles` profiles.
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheStore>,
        inventory: Arc<dyn InventorySource>,
        profile_map: ProfileMap,
    ) -> Self {
        Self {
            cache,
            inventory,
            profile_map,
            selector: ProfileSelector::default(),
            fields: SessionFields::default(),
            expire: DEFAULT_CACHE_EXPIRE,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: ProfileSelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: SessionFields) -> Self {
        self.fields = fields;
        self
    }

    /// Lifetime of client mappings and the cached network table.
    #[must_use]
    pub const fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    #[must_use]
    pub const fn selector(&self) -> &ProfileSelector {
        &self.selector
    }

    /// Decide the actions for one event, in session order.
    ///
    /// Sessions that are not started or authenticated are skipped, as are
    /// sessions without an identity, a MAC or the profile field. A session
    /// with no IP address empties the result for the whole event.
    ///
    /// # Errors
    /// Fails when the cache store or the inventory source fails.
    #[instrument(skip_all, fields(sessions = event.sessions().len()))]
    pub async fn map(&self, event: &SessionEvent) -> MapperResult<Vec<MappedAction>> {
        if event.is_empty() {
            debug!("Mapper called with an empty session list");
            return Ok(Vec::new());
        }

        // Nothing is read from or written to the cache until every
        // actionable session has an address.
        let mut candidates = Vec::new();
        for record in event.sessions() {
            let state = record.state();
            if !state.is_actionable() {
                debug!(%state, "Skipping session");
                continue;
            }

            let (Some(name), Some(mac)) = (
                record.text(&self.fields.name),
                record.text(&self.fields.mac).map(|m| normalize_mac(&m)),
            ) else {
                error!(
                    name_field = %self.fields.name,
                    mac_field = %self.fields.mac,
                    "Session lacks identity or MAC; skipping"
                );
                continue;
            };

            let Some(ip) = record.addresses(&self.fields.ip).into_iter().next() else {
                error!(%name, %mac, "Client has no IP addresses; dropping event");
                return Ok(Vec::new());
            };
            candidates.push((record, name, mac, ip));
        }

        let mut actions = Vec::new();
        for (record, name, mac, ip) in candidates {
            let network = self.resolve_network(&ip).await?;
            debug!(%name, %mac, network = ?network, "Client mapped to network");

            let Some(group) = self.resolve_group(record) else {
                error!(
                    %name,
                    %mac,
                    field = %self.selector.field,
                    "Client has no profile attribute; cannot map to group"
                );
                continue;
            };

            let action = MappedAction {
                network,
                mac,
                name,
                group,
            };
            if self.record_if_changed(&action, &ip).await? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    /// Network for `ip`, via the cached table. An unparsable address or no
    /// match yields `None`.
    ///
    /// # Errors
    /// Fails when the table must be loaded and the inventory or cache fails.
    pub async fn resolve_network(&self, ip: &str) -> MapperResult<Option<String>> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            error!(%ip, "Unparsable client address; cannot map to network");
            return Ok(None);
        };
        let table = self.network_table().await?;
        let network = table.resolve(addr).map(str::to_string);
        if network.is_none() {
            error!(%ip, "Unable to map address to an existing network");
        }
        Ok(network)
    }

    /// Group for a record. Outer `None`: the profile field is missing.
    /// Inner `None`: no profile maps to a group.
    #[must_use]
    pub fn resolve_group(&self, record: &SessionRecord) -> Option<Option<String>> {
        let profiles = self.selector.profiles(record)?;
        debug!(?profiles, "Resolving group");
        Some(self.profile_map.resolve(&profiles))
    }

    /// Cached table, or a fresh load written back to the cache.
    async fn network_table(&self) -> MapperResult<NetworkTable> {
        if let Some(raw) = self.cache.get(NETWORKS_CACHE_KEY).await? {
            if let Some(table) = NetworkTable::from_json(&raw) {
                return Ok(table);
            }
            error!("Cached network table is corrupt; reloading inventory");
        }
        let table = self.inventory.load().await?;
        self.cache
            .set_ex(NETWORKS_CACHE_KEY, &table.to_json(), self.expire)
            .await?;
        debug!(entries = table.len(), "Network table cached");
        Ok(table)
    }

    /// Write the canonical record unless the cache already holds it.
    /// Returns whether the action is new.
    async fn record_if_changed(&self, action: &MappedAction, ip: &str) -> MapperResult<bool> {
        let key = client_cache_key(&action.mac);
        let candidate = CachedMapping::new(action, ip).to_canonical();
        match self.cache.get(&key).await? {
            Some(cached) if cached == candidate => {
                debug!(name = %action.name, mac = %action.mac, "Identical mapping cached");
                return Ok(false);
            }
            Some(cached) => {
                debug!(name = %action.name, mac = %action.mac, %cached, "Cached mapping differs");
            }
            None => {}
        }
        self.cache.set_ex(&key, &candidate, self.expire).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::{MapperError, MemoryCacheStore, NetworkEntry, ProfileShape};

    struct CountingInventory {
        table: NetworkTable,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl InventorySource for CountingInventory {
        async fn load(&self) -> MapperResult<NetworkTable> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.clone())
        }
    }

    struct FailingInventory;

    #[async_trait]
    impl InventorySource for FailingInventory {
        async fn load(&self) -> MapperResult<NetworkTable> {
            Err(MapperError::Inventory {
                path: "networks.csv".into(),
                message: "missing".into(),
            })
        }
    }

    fn table() -> NetworkTable {
        NetworkTable::new(vec![
            NetworkEntry::new("10.0.0.0/24".parse().unwrap(), "N1"),
            NetworkEntry::new("10.0.1.0/24".parse().unwrap(), "N2"),
        ])
    }

    fn inventory() -> Arc<CountingInventory> {
        Arc::new(CountingInventory {
            table: table(),
            loads: AtomicUsize::new(0),
        })
    }

    fn mapper_with(cache: Arc<MemoryCacheStore>, inv: Arc<CountingInventory>) -> IdentityGroupMapper {
        IdentityGroupMapper::new(cache, inv, ProfileMap::from_pairs([("guest", "100")]))
            .with_selector(ProfileSelector::endpoint_profile())
    }

    fn mapper() -> (IdentityGroupMapper, Arc<MemoryCacheStore>) {
        let cache = Arc::new(MemoryCacheStore::new());
        (mapper_with(cache.clone(), inventory()), cache)
    }

    fn event(value: Value) -> SessionEvent {
        SessionEvent::from_payload(&value).unwrap()
    }

    fn alice() -> Value {
        json!({"sessions": [{
            "state": "STARTED",
            "userName": "alice",
            "macAddress": "AA:BB:CC:DD:EE:FF",
            "ipAddresses": ["10.0.0.5"],
            "endpointProfile": "Guest"
        }]})
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let (mapper, cache) = mapper();
        let actions = mapper.map(&event(alice())).await.unwrap();
        assert_eq!(
            actions,
            vec![MappedAction {
                network: Some("N1".into()),
                mac: "AA:BB:CC:DD:EE:FF".into(),
                name: "alice".into(),
                group: Some("100".into()),
            }]
        );
        assert_eq!(
            cache.get("client.AABBCCDDEEFF").await.unwrap().as_deref(),
            Some(r#"{"network_id":"N1","mac":"AA:BB:CC:DD:EE:FF","ip":"10.0.0.5","name":"alice","group":"100"}"#)
        );
    }

    #[tokio::test]
    async fn second_identical_event_is_suppressed() {
        let (mapper, _) = mapper();
        assert_eq!(mapper.map(&event(alice())).await.unwrap().len(), 1);
        assert!(mapper.map(&event(alice())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changed_mapping_is_emitted_and_cached() {
        let (mapper, cache) = mapper();
        mapper.map(&event(alice())).await.unwrap();

        let mut moved = alice();
        moved["sessions"][0]["ipAddresses"] = json!(["10.0.1.7"]);
        let actions = mapper.map(&event(moved)).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].network.as_deref(), Some("N2"));

        let cached = cache.get("client.AABBCCDDEEFF").await.unwrap().unwrap();
        assert!(cached.contains(r#""ip":"10.0.1.7""#));
        assert!(mapper.map(&event({
            let mut again = alice();
            again["sessions"][0]["ipAddresses"] = json!(["10.0.1.7"]);
            again
        })).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_actionable_states_are_skipped() {
        let (mapper, cache) = mapper();
        for state in ["DISCONNECTED", "POSTURED", ""] {
            let mut e = alice();
            e["sessions"][0]["state"] = json!(state);
            assert!(mapper.map(&event(e)).await.unwrap().is_empty());
        }
        assert!(!cache.exists("client.AABBCCDDEEFF").await.unwrap());
    }

    #[tokio::test]
    async fn authenticated_is_actionable() {
        let (mapper, _) = mapper();
        let mut e = alice();
        e["sessions"][0]["state"] = json!("AUTHENTICATED");
        assert_eq!(mapper.map(&event(e)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_addresses_drop_the_whole_event() {
        let (mapper, _) = mapper();
        let e = json!({"sessions": [
            {
                "state": "STARTED", "userName": "bob", "macAddress": "11:22:33:44:55:66",
                "ipAddresses": ["10.0.0.9"], "endpointProfile": "Guest"
            },
            {
                "state": "STARTED", "userName": "alice", "macAddress": "AA:BB:CC:DD:EE:FF",
                "ipAddresses": [], "endpointProfile": "Guest"
            }
        ]});
        assert!(mapper.map(&event(e)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_event_leaves_earlier_sessions_uncached() {
        let (mapper, cache) = mapper();
        let bob = json!({
            "state": "STARTED", "userName": "bob", "macAddress": "11:22:33:44:55:66",
            "ipAddresses": ["10.0.0.9"], "endpointProfile": "Guest"
        });
        let dropped = json!({"sessions": [
            bob.clone(),
            {
                "state": "STARTED", "userName": "alice", "macAddress": "AA:BB:CC:DD:EE:FF",
                "ipAddresses": [], "endpointProfile": "Guest"
            }
        ]});
        assert!(mapper.map(&event(dropped)).await.unwrap().is_empty());
        assert!(!cache.exists("client.112233445566").await.unwrap());

        let actions = mapper.map(&event(json!({"sessions": [bob]}))).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "bob");
    }

    #[tokio::test]
    async fn unmatched_address_yields_no_network() {
        let (mapper, _) = mapper();
        let mut e = alice();
        e["sessions"][0]["ipAddresses"] = json!(["10.0.2.5"]);
        let actions = mapper.map(&event(e)).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].network, None);

        assert_eq!(mapper.resolve_network("not-an-ip").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unmapped_profile_yields_no_group() {
        let (mapper, cache) = mapper();
        let mut e = alice();
        e["sessions"][0]["endpointProfile"] = json!("Printer");
        let actions = mapper.map(&event(e)).await.unwrap();
        assert_eq!(actions[0].group, None);
        let cached = cache.get("client.AABBCCDDEEFF").await.unwrap().unwrap();
        assert!(cached.ends_with(r#""group":null}"#));
    }

    #[tokio::test]
    async fn missing_profile_field_skips_only_that_session() {
        let (mapper, _) = mapper();
        let e = json!({"sessions": [
            {"state": "STARTED", "userName": "bob", "macAddress": "11:22:33:44:55:66",
             "ipAddresses": ["10.0.0.9"]},
            {"state": "STARTED", "userName": "alice", "macAddress": "aa:bb:cc:dd:ee:ff",
             "ipAddresses": ["10.0.0.5"], "endpointProfile": "GUEST"}
        ]});
        let actions = mapper.map(&event(e)).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "alice");
        assert_eq!(actions[0].mac, "AA:BB:CC:DD:EE:FF");
    }

    #[tokio::test]
    async fn list_profiles_first_match_wins() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mapper = IdentityGroupMapper::new(
            cache,
            inventory(),
            ProfileMap::from_pairs([("Staff", "200"), ("PermitAccess", "300")]),
        );
        let e = json!({"sessions": [{
            "state": "STARTED", "userName": "carol", "macAddress": "00:11:22:33:44:55",
            "ipAddresses": ["10.0.1.1"], "selectedAuthzProfiles": ["unknown", "permitaccess", "staff"]
        }]});
        let actions = mapper.map(&event(e)).await.unwrap();
        assert_eq!(actions[0].group.as_deref(), Some("300"));
    }

    #[tokio::test]
    async fn webhook_fields_and_roles() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mapper = IdentityGroupMapper::new(cache, inventory(), ProfileMap::from_pairs([("contractors", "7")]))
            .with_selector(ProfileSelector::new("role", ProfileShape::CommaSeparated))
            .with_fields(SessionFields::webhook());
        let record = SessionRecord::new(
            json!({
                "state": "STARTED", "userName": "dave", "macAddress": "de:ad:be:ef:00:01",
                "ipAddress": "10.0.0.77", "role": "Employees, Contractors"
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let actions = mapper.map(&SessionEvent::single(record)).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].group.as_deref(), Some("7"));
        assert_eq!(actions[0].mac, "DE:AD:BE:EF:00:01");
    }

    #[tokio::test]
    async fn network_table_is_loaded_once_and_cached() {
        let cache = Arc::new(MemoryCacheStore::new());
        let inv = inventory();
        let mapper = mapper_with(cache.clone(), inv.clone());
        mapper.resolve_network("10.0.0.1").await.unwrap();
        mapper.resolve_network("10.0.1.1").await.unwrap();
        assert_eq!(inv.loads.load(Ordering::SeqCst), 1);
        assert!(cache.exists(NETWORKS_CACHE_KEY).await.unwrap());

        cache
            .set_ex(NETWORKS_CACHE_KEY, "garbage", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            mapper.resolve_network("10.0.1.1").await.unwrap().as_deref(),
            Some("N2")
        );
        assert_eq!(inv.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_mapping_is_reapplied() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mapper = mapper_with(cache, inventory()).with_expire(Duration::from_secs(60));
        assert_eq!(mapper.map(&event(alice())).await.unwrap().len(), 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(mapper.map(&event(alice())).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inventory_failure_propagates() {
        let mapper = IdentityGroupMapper::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(FailingInventory),
            ProfileMap::default(),
        )
        .with_selector(ProfileSelector::endpoint_profile());
        let err = mapper.map(&event(alice())).await.unwrap_err();
        assert!(matches!(err, MapperError::Inventory { .. }));
    }
}
