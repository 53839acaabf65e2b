//! Plugin lifecycle management.
//!
//! [`PluginRegistry`] is the central owner of all registered plugin
//! declarations. It:
//!
//! - Accepts [`PluginDeclaration`]s, rejecting empty and duplicate names
//!   before anything is indexed.
//! - Drives the per-plugin state machine
//!   `Registered -> Initialized -> Active` during [`activate`].
//! - Runs each plugin's one-shot init hook exactly once, strictly before the
//!   dispatch engine processes its first event; the executed-flag lives here,
//!   not in the plugin, and a second initialisation attempt is a
//!   [`RegistryError::LifecycleViolation`].
//! - Reconciles mapping fragments and builds the handler index at
//!   activation. Startup errors halt bring-up entirely — no partial schema,
//!   index, or route table is ever published.
//! - Collects route declarations from plugins with the `api` capability into
//!   one ordered route table, following plugin registration order.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = PluginRegistry::new();
//! registry.register(token_plugin)?;
//! registry.register(oracle_plugin)?;
//!
//! let engine = registry.activate().await?;
//! for block in feed {
//!     engine.process_block(&block).await;
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use strata_core::{
    MergedSchema, PluginDeclaration, RegistryError, RegistryResult, RouteEntry,
};

use crate::dispatch::{DispatchEngine, FaultLog};
use crate::index::HandlerIndex;
use crate::reconciler::reconcile;
use crate::tracker::{ContractSink, ContractTracker};

/// Lifecycle state of a registered plugin.
///
/// ```text
/// register() ──► Registered
/// activate() ──► Initialized (init hook completed)
///            ──► Active      (participating in dispatch)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Registered but not yet initialised.
    Registered,
    /// Init hook has run; activation still in progress.
    Initialized,
    /// Participating in dispatch and schema/route provision.
    Active,
}

struct PluginEntry {
    declaration: Arc<PluginDeclaration>,
    state: PluginState,
    /// One-shot guard for the plugin's init hook, owned here by design of
    /// the lifecycle contract — never by the plugin itself.
    init_done: bool,
}

/// Central manager for plugin registration, activation, and the artifacts
/// published to external collaborators.
///
/// Registration is a single-owner bootstrap phase (`&mut self`); the values
/// handed out by [`activate`](Self::activate) and the accessors are the
/// shareable, frozen results.
pub struct PluginRegistry {
    plugins: Vec<PluginEntry>,
    sink: Option<Arc<dyn ContractSink>>,
    faults: Arc<FaultLog>,
    /// First fatal registration error; activation refuses while set.
    poisoned: Option<RegistryError>,
    activated: bool,
    schema: Option<MergedSchema>,
    index: Option<Arc<HandlerIndex>>,
    tracker: Option<Arc<ContractTracker>>,
    routes: Vec<RouteEntry>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            sink: None,
            faults: Arc::new(FaultLog::new()),
            poisoned: None,
            activated: false,
            schema: None,
            index: None,
            tracker: None,
            routes: Vec::new(),
        }
    }

    /// Sets the collaborator notified about dynamically tracked contracts.
    pub fn with_contract_sink(mut self, sink: Arc<dyn ContractSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a plugin declaration.
    ///
    /// Fails with [`RegistryError::InvalidDeclaration`] on an empty name and
    /// [`RegistryError::DuplicatePlugin`] on a name collision. Either
    /// failure poisons the registry: [`activate`](Self::activate) will
    /// refuse, so no handler from any involved plugin is ever indexed.
    pub fn register(&mut self, declaration: PluginDeclaration) -> RegistryResult<()> {
        if self.activated {
            return Err(RegistryError::InvalidDeclaration {
                reason: format!(
                    "plugin '{}' registered after activation",
                    declaration.name
                ),
            });
        }

        if declaration.name.is_empty() {
            let err = RegistryError::InvalidDeclaration {
                reason: "plugin name must not be empty".to_string(),
            };
            self.poisoned = Some(err.clone());
            return Err(err);
        }

        if self
            .plugins
            .iter()
            .any(|entry| entry.declaration.name == declaration.name)
        {
            let err = RegistryError::DuplicatePlugin {
                name: declaration.name.clone(),
            };
            self.poisoned = Some(err.clone());
            return Err(err);
        }

        info!(
            plugin = %declaration.name,
            chain = %declaration.chain,
            indexer = declaration.indexer,
            api = declaration.api,
            "Plugin registered"
        );
        self.plugins.push(PluginEntry {
            declaration: Arc::new(declaration),
            state: PluginState::Registered,
            init_done: false,
        });
        Ok(())
    }

    /// Removes a plugin by name before activation.
    ///
    /// Returns `true` when a plugin was removed. The handler index is only
    /// ever built from the current declaration list at activation, so a
    /// removed plugin leaves no stale entries behind. After activation the
    /// plugin set is frozen and removal is refused.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.activated {
            warn!(plugin = %name, "Plugin removal refused after activation");
            return false;
        }
        if let Some(pos) = self
            .plugins
            .iter()
            .position(|entry| entry.declaration.name == name)
        {
            self.plugins.remove(pos);
            info!(plugin = %name, "Plugin removed");
            true
        } else {
            false
        }
    }

    /// Number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Lifecycle state of the named plugin, or `None` when not registered.
    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.plugins
            .iter()
            .find(|entry| entry.declaration.name == name)
            .map(|entry| entry.state)
    }

    // ─── Activation ──────────────────────────────────────────────────────────

    /// Brings the registry up and returns the dispatch engine.
    ///
    /// Runs, in order: mapping reconciliation (fatal on conflict), handler
    /// index build, contract tracker seeding, every plugin's one-shot init
    /// hook (in registration order, each awaited), and route table
    /// collection. Only when every step succeeds are the schema, route
    /// table, and tracker published through the accessors.
    pub async fn activate(&mut self) -> RegistryResult<DispatchEngine> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }

        let declarations: Vec<Arc<PluginDeclaration>> = self
            .plugins
            .iter()
            .map(|entry| Arc::clone(&entry.declaration))
            .collect();

        let schema = reconcile(&declarations)?;
        let index = Arc::new(HandlerIndex::build(&declarations));
        let tracker = Arc::new(ContractTracker::seed(
            &declarations,
            &index,
            self.sink.clone(),
        ));

        // One-shot init hooks, strictly before the first dispatched event.
        for entry in &mut self.plugins {
            let name = entry.declaration.name.clone();
            if entry.init_done {
                return Err(RegistryError::LifecycleViolation { plugin: name });
            }
            if let Some(init) = &entry.declaration.init {
                init(Arc::clone(&entry.declaration.config))
                    .await
                    .map_err(|err| RegistryError::PluginInit {
                        plugin: name.clone(),
                        message: err.to_string(),
                    })?;
            }
            entry.init_done = true;
            entry.state = PluginState::Initialized;
            debug!(plugin = %name, "Plugin initialised");
        }

        // Route table follows plugin registration order; declarations
        // without the api capability contribute nothing.
        let mut routes = Vec::new();
        for entry in &self.plugins {
            if entry.declaration.api {
                routes.extend(entry.declaration.routes.iter().cloned());
            }
        }

        for entry in &mut self.plugins {
            entry.state = PluginState::Active;
        }

        info!(
            plugins = self.plugins.len(),
            schema_entries = schema.len(),
            routes = routes.len(),
            tracked_contracts = tracker.len(),
            "Registry active"
        );

        self.schema = Some(schema);
        self.index = Some(Arc::clone(&index));
        self.tracker = Some(Arc::clone(&tracker));
        self.routes = routes;
        self.activated = true;

        Ok(DispatchEngine::new(index, Arc::clone(&self.faults)))
    }

    // ─── Published artifacts ─────────────────────────────────────────────────

    /// `true` once [`activate`](Self::activate) has succeeded.
    pub fn is_active(&self) -> bool {
        self.activated
    }

    /// The reconciled schema, available after activation.
    pub fn merged_schema(&self) -> Option<&MergedSchema> {
        self.schema.as_ref()
    }

    /// The ordered route table for the external HTTP transport.
    pub fn route_table(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// The dynamic contract tracker, available after activation.
    pub fn tracker(&self) -> Option<Arc<ContractTracker>> {
        self.tracker.clone()
    }

    /// The fault log dispatch failures are recorded into.
    pub fn fault_log(&self) -> Arc<FaultLog> {
        Arc::clone(&self.faults)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.len())
            .field("activated", &self.activated)
            .field("poisoned", &self.poisoned.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use strata_core::{
        ActionData, ActionHandlerEntry, Block, FieldType, RouteMethod, SchemaKey,
    };

    fn transfer_block() -> Block {
        Block {
            block_num: 1,
            block_id: "b1".to_string(),
            timestamp: String::new(),
            actions: vec![strata_core::Action {
                action_ordinal: 1,
                creator_action_ordinal: 0,
                receiver: "eosio.token".to_string(),
                act: ActionData {
                    account: "eosio.token".to_string(),
                    name: "transfer".to_string(),
                    authorization: Value::Null,
                    data: Value::Null,
                },
                context_free: false,
                console: String::new(),
                receipt: Value::Null,
            }],
            deltas: vec![],
        }
    }

    fn counting_plugin(name: &str, counter: Arc<AtomicUsize>) -> PluginDeclaration {
        PluginDeclaration::new(name).action_handler(ActionHandlerEntry::new(
            "eosio.token",
            "transfer",
            move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ))
    }

    #[tokio::test]
    async fn duplicate_name_poisons_the_registry() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new();

        registry
            .register(counting_plugin("token", Arc::clone(&counter)))
            .unwrap();
        let err = registry
            .register(counting_plugin("token", Arc::clone(&counter)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePlugin { ref name } if name == "token"));

        // Bring-up halts entirely: no handlers from either plugin are indexed.
        let err = registry.activate().await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePlugin { .. }));
        assert!(registry.merged_schema().is_none());
        assert!(!registry.is_active());
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let mut registry = PluginRegistry::new();
        let err = registry.register(PluginDeclaration::new("")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDeclaration { .. }));
        assert!(registry.activate().await.is_err());
    }

    #[tokio::test]
    async fn init_runs_exactly_once_with_the_plugin_config() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_init = Arc::clone(&seen);
        let plugin = PluginDeclaration::new("token")
            .config(json!({ "contract": "eosio.token" }))
            .init(move |config| {
                let seen = Arc::clone(&seen_init);
                async move {
                    seen.lock().push(config.as_ref().clone());
                    Ok(())
                }
            });

        let mut registry = PluginRegistry::new();
        registry.register(plugin).unwrap();
        assert_eq!(registry.plugin_state("token"), Some(PluginState::Registered));

        registry.activate().await.unwrap();
        assert_eq!(registry.plugin_state("token"), Some(PluginState::Active));
        assert_eq!(seen.lock().as_slice(), [json!({ "contract": "eosio.token" })]);
    }

    #[tokio::test]
    async fn second_activation_is_a_lifecycle_violation() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginDeclaration::new("token")).unwrap();

        registry.activate().await.unwrap();
        let err = registry.activate().await.unwrap_err();
        assert!(matches!(err, RegistryError::LifecycleViolation { ref plugin } if plugin == "token"));
    }

    #[tokio::test]
    async fn init_failure_halts_bring_up() {
        let plugin = PluginDeclaration::new("broken")
            .init(|_| async { Err("no database".into()) });

        let mut registry = PluginRegistry::new();
        registry.register(plugin).unwrap();

        let err = registry.activate().await.unwrap_err();
        assert!(matches!(err, RegistryError::PluginInit { ref plugin, .. } if plugin == "broken"));
        assert!(registry.merged_schema().is_none());
        assert!(!registry.is_active());
    }

    #[tokio::test]
    async fn schema_conflict_is_fatal_and_publishes_nothing() {
        let a = PluginDeclaration::new("a").action_handler(
            ActionHandlerEntry::new("eosio.token", "transfer", |_| async { Ok(()) })
                .mappings([("amount".to_string(), FieldType::Double)].into()),
        );
        let b = PluginDeclaration::new("b").action_handler(
            ActionHandlerEntry::new("eosio.token", "transfer", |_| async { Ok(()) })
                .mappings([("amount".to_string(), FieldType::Keyword)].into()),
        );

        let mut registry = PluginRegistry::new();
        registry.register(a).unwrap();
        registry.register(b).unwrap();

        let err = registry.activate().await.unwrap_err();
        assert!(matches!(err, RegistryError::SchemaConflict { ref field, .. } if field == "amount"));
        assert!(registry.merged_schema().is_none());
        assert!(registry.route_table().is_empty());
    }

    #[tokio::test]
    async fn merged_schema_is_published_after_activation() {
        let plugin = PluginDeclaration::new("token").action_handler(
            ActionHandlerEntry::new("eosio.token", "transfer", |_| async { Ok(()) })
                .mappings([("memo".to_string(), FieldType::Text)].into()),
        );

        let mut registry = PluginRegistry::new();
        registry.register(plugin).unwrap();
        registry.activate().await.unwrap();

        let schema = registry.merged_schema().unwrap();
        assert_eq!(
            schema[&SchemaKey::action("eosio.token", "transfer")]["memo"],
            FieldType::Text
        );
    }

    #[tokio::test]
    async fn route_table_follows_registration_order_and_api_flag() {
        let route = |path: &str| {
            strata_core::RouteEntry::new(RouteMethod::Get, path, |_| async {
                Ok(Value::Null)
            })
        };

        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDeclaration::new("a").api(true).route(route("/a")))
            .unwrap();
        registry
            .register(PluginDeclaration::new("b").route(route("/b")))
            .unwrap();
        registry
            .register(PluginDeclaration::new("c").api(true).route(route("/c")))
            .unwrap();

        registry.activate().await.unwrap();

        let paths: Vec<&str> = registry
            .route_table()
            .iter()
            .map(|entry| entry.path.as_str())
            .collect();
        assert_eq!(paths, vec!["/a", "/c"]);
    }

    #[tokio::test]
    async fn removal_before_activation_leaves_no_stale_handlers() {
        let kept = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        let mut registry = PluginRegistry::new();
        registry
            .register(counting_plugin("kept", Arc::clone(&kept)))
            .unwrap();
        registry
            .register(counting_plugin("removed", Arc::clone(&removed)))
            .unwrap();
        assert!(registry.remove("removed"));
        assert_eq!(registry.plugin_count(), 1);

        let engine = registry.activate().await.unwrap();
        engine.process_block(&transfer_block()).await;

        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registration_and_removal_are_refused_after_activation() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginDeclaration::new("token")).unwrap();
        registry.activate().await.unwrap();

        let err = registry
            .register(PluginDeclaration::new("late"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDeclaration { .. }));
        assert!(!registry.remove("token"));
    }

    #[tokio::test]
    async fn tracker_initial_set_covers_declared_and_indexed_contracts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new();
        registry
            .register(
                counting_plugin("token", counter).dynamic_contract("delphioracle"),
            )
            .unwrap();
        registry.activate().await.unwrap();

        let tracker = registry.tracker().unwrap();
        assert!(tracker.contains("eosio.token"));
        assert!(tracker.contains("delphioracle"));
        assert_eq!(tracker.len(), 2);
    }
}
