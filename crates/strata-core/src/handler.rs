//! Handler declarations and the plugin declaration they belong to.
//!
//! A plugin is not a trait object with overridable hooks — it is a
//! [`PluginDeclaration`]: a record of ordered handler lists, capability
//! flags, dynamically tracked contracts, declared routes, and an optional
//! one-shot init hook. Declarations are data; all behaviour lives in the
//! type-erased async closures they carry.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::{ActionHandlerEntry, PluginDeclaration};
//!
//! let decl = PluginDeclaration::new("token-index")
//!     .indexer(true)
//!     .action_handler(ActionHandlerEntry::new(
//!         "eosio.token",
//!         "transfer",
//!         |action| async move {
//!             // index the transfer…
//!             Ok(())
//!         },
//!     ))
//!     .dynamic_contract("eosio.token");
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::HandlerError;
use crate::event::{Action, Delta, StreamEvent, StreamEventKind};
use crate::mapping::MappingFragment;
use crate::route::RouteEntry;

// ============================================================================
// Handler function types
// ============================================================================

/// Type-erased async action handler.
pub type ActionHandlerFn =
    Arc<dyn Fn(Arc<Action>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Type-erased async delta handler.
pub type DeltaHandlerFn =
    Arc<dyn Fn(Arc<Delta>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Type-erased async stream handler.
pub type StreamHandlerFn =
    Arc<dyn Fn(Arc<StreamEvent>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Type of the one-shot async init hook stored inside a [`PluginDeclaration`].
///
/// Receives the plugin's opaque config section. The registry guarantees the
/// hook runs exactly once, strictly before the first event is dispatched.
pub type InitFn =
    Arc<dyn Fn(Arc<Value>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Boxes an async closure into an [`ActionHandlerFn`].
pub fn into_action_handler<F, Fut>(f: F) -> ActionHandlerFn
where
    F: Fn(Arc<Action>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |action| Box::pin(f(action)))
}

/// Boxes an async closure into a [`DeltaHandlerFn`].
pub fn into_delta_handler<F, Fut>(f: F) -> DeltaHandlerFn
where
    F: Fn(Arc<Delta>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |delta| Box::pin(f(delta)))
}

/// Boxes an async closure into a [`StreamHandlerFn`].
pub fn into_stream_handler<F, Fut>(f: F) -> StreamHandlerFn
where
    F: Fn(Arc<StreamEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

// ============================================================================
// Handler entries
// ============================================================================

/// Declares a handler for an exact `(contract, action)` key.
///
/// Multiple plugins may declare entries for the same key; all of them are
/// invoked for every occurrence, in registration order.
#[derive(Clone)]
pub struct ActionHandlerEntry {
    /// Contract account that defines the action.
    pub contract: String,
    /// Name of the action.
    pub action: String,
    /// Optional index-mapping fragment for this action's data.
    pub mappings: Option<MappingFragment>,
    /// The handler itself.
    pub handler: ActionHandlerFn,
}

impl ActionHandlerEntry {
    /// Creates an entry from an async closure.
    pub fn new<F, Fut>(contract: impl Into<String>, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Action>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            contract: contract.into(),
            action: action.into(),
            mappings: None,
            handler: into_action_handler(handler),
        }
    }

    /// Attaches an index-mapping fragment.
    pub fn mappings(mut self, fragment: MappingFragment) -> Self {
        self.mappings = Some(fragment);
        self
    }
}

impl std::fmt::Debug for ActionHandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandlerEntry")
            .field("contract", &self.contract)
            .field("action", &self.action)
            .field("mappings", &self.mappings)
            .finish()
    }
}

/// Declares a handler for an exact `(contract, table)` key.
#[derive(Clone)]
pub struct DeltaHandlerEntry {
    /// Contract account that owns the table.
    pub contract: String,
    /// Name of the table.
    pub table: String,
    /// Optional index-mapping fragment for the table's rows.
    pub mappings: Option<MappingFragment>,
    /// The handler itself.
    pub handler: DeltaHandlerFn,
}

impl DeltaHandlerEntry {
    /// Creates an entry from an async closure.
    pub fn new<F, Fut>(contract: impl Into<String>, table: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Delta>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            contract: contract.into(),
            table: table.into(),
            mappings: None,
            handler: into_delta_handler(handler),
        }
    }

    /// Attaches an index-mapping fragment.
    pub fn mappings(mut self, fragment: MappingFragment) -> Self {
        self.mappings = Some(fragment);
        self
    }
}

impl std::fmt::Debug for DeltaHandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaHandlerEntry")
            .field("contract", &self.contract)
            .field("table", &self.table)
            .field("mappings", &self.mappings)
            .finish()
    }
}

/// Declares a handler for live stream events.
///
/// Unlike action/delta entries the filter is partial: every field left as
/// `None` matches anything, and a handler receives an event only when all
/// *present* fields equal the event's corresponding fields.
#[derive(Clone)]
pub struct StreamHandlerEntry {
    /// Event kind this handler subscribes to.
    pub event: StreamEventKind,
    /// Optional contract code filter.
    pub code: Option<String>,
    /// Optional account filter.
    pub account: Option<String>,
    /// Optional action name filter.
    pub name: Option<String>,
    /// Optional table name filter.
    pub table: Option<String>,
    /// The handler itself.
    pub handler: StreamHandlerFn,
}

impl StreamHandlerEntry {
    /// Creates a filter that matches every event of `event` kind.
    pub fn new<F, Fut>(event: StreamEventKind, handler: F) -> Self
    where
        F: Fn(Arc<StreamEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            event,
            code: None,
            account: None,
            name: None,
            table: None,
            handler: into_stream_handler(handler),
        }
    }

    /// Filters on contract code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Filters on account.
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Filters on action name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Filters on table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Returns `true` when every present filter field equals the event's
    /// corresponding field.
    pub fn matches(&self, event: &StreamEvent) -> bool {
        fn field_matches(filter: &Option<String>, value: &Option<String>) -> bool {
            match filter {
                Some(expected) => value.as_deref() == Some(expected.as_str()),
                None => true,
            }
        }

        self.event == event.kind
            && field_matches(&self.code, &event.code)
            && field_matches(&self.account, &event.account)
            && field_matches(&self.name, &event.name)
            && field_matches(&self.table, &event.table)
    }
}

impl std::fmt::Debug for StreamHandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandlerEntry")
            .field("event", &self.event)
            .field("code", &self.code)
            .field("account", &self.account)
            .field("name", &self.name)
            .field("table", &self.table)
            .finish()
    }
}

// ============================================================================
// PluginDeclaration
// ============================================================================

/// Everything one plugin contributes to the pipeline.
///
/// Owned by the registry for its process lifetime and immutable after
/// registration completes (the registry stores declarations behind `Arc`).
/// The `config` section is handed over at construction time and passed to
/// the init hook; it is never mutated afterwards.
#[derive(Clone)]
pub struct PluginDeclaration {
    /// Unique plugin name; non-empty, unique across the registry.
    pub name: String,
    /// Name of the chain this plugin targets.
    pub chain: String,
    /// Whether the plugin participates in indexing.
    pub indexer: bool,
    /// Whether the plugin exposes API routes.
    pub api: bool,
    /// Action handlers in declaration order.
    pub action_handlers: Vec<ActionHandlerEntry>,
    /// Delta handlers in declaration order.
    pub delta_handlers: Vec<DeltaHandlerEntry>,
    /// Stream handlers in declaration order.
    pub stream_handlers: Vec<StreamHandlerEntry>,
    /// Contracts whose raw data should be made available even without an
    /// explicit handler.
    pub dynamic_contracts: Vec<String>,
    /// Routes to collect when the `api` flag is set.
    pub routes: Vec<RouteEntry>,
    /// Opaque configuration section for this plugin.
    pub config: Arc<Value>,
    /// Optional one-shot init hook.
    pub init: Option<InitFn>,
}

impl PluginDeclaration {
    /// Creates an empty declaration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: String::new(),
            indexer: false,
            api: false,
            action_handlers: Vec::new(),
            delta_handlers: Vec::new(),
            stream_handlers: Vec::new(),
            dynamic_contracts: Vec::new(),
            routes: Vec::new(),
            config: Arc::new(Value::Null),
            init: None,
        }
    }

    /// Sets the target chain name.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = chain.into();
        self
    }

    /// Sets the indexer capability flag.
    pub fn indexer(mut self, indexer: bool) -> Self {
        self.indexer = indexer;
        self
    }

    /// Sets the API-route capability flag.
    pub fn api(mut self, api: bool) -> Self {
        self.api = api;
        self
    }

    /// Sets the opaque configuration section.
    pub fn config(mut self, config: Value) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Appends an action handler.
    pub fn action_handler(mut self, entry: ActionHandlerEntry) -> Self {
        self.action_handlers.push(entry);
        self
    }

    /// Appends a delta handler.
    pub fn delta_handler(mut self, entry: DeltaHandlerEntry) -> Self {
        self.delta_handlers.push(entry);
        self
    }

    /// Appends a stream handler.
    pub fn stream_handler(mut self, entry: StreamHandlerEntry) -> Self {
        self.stream_handlers.push(entry);
        self
    }

    /// Requests dynamic tracking of a contract.
    pub fn dynamic_contract(mut self, contract: impl Into<String>) -> Self {
        self.dynamic_contracts.push(contract.into());
        self
    }

    /// Appends a route declaration.
    pub fn route(mut self, route: RouteEntry) -> Self {
        self.routes.push(route);
        self
    }

    /// Sets the one-shot init hook.
    pub fn init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.init = Some(Arc::new(move |config| Box::pin(f(config))));
        self
    }

    /// Deserialises the plugin's config section into `T`.
    ///
    /// Use `#[serde(default)]` on the target struct to make fields optional.
    pub fn get_config<T>(&self) -> serde_json::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        T::deserialize(self.config.as_ref())
    }
}

impl std::fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("name", &self.name)
            .field("chain", &self.chain)
            .field("indexer", &self.indexer)
            .field("api", &self.api)
            .field("action_handlers", &self.action_handlers.len())
            .field("delta_handlers", &self.delta_handlers.len())
            .field("stream_handlers", &self.stream_handlers.len())
            .field("dynamic_contracts", &self.dynamic_contracts)
            .field("routes", &self.routes.len())
            .finish()
    }
}
