//! The handler index: lookup structures derived from plugin declarations.
//!
//! Exact-key lookups for actions and deltas are hash-map based; stream
//! handlers keep their declaration order in a flat list and are evaluated
//! one by one against each incoming event, with absent filter fields acting
//! as wildcards.
//!
//! The index is derived and rebuildable: whenever the plugin set changes it
//! is rebuilt from scratch with [`HandlerIndex::build`], never patched in
//! place, so no stale entry can survive a plugin's removal. Bindings within
//! one key keep registration order (plugin registration order first, then
//! declaration order inside a plugin), which makes fan-out deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use strata_core::{
    ActionHandlerFn, DeltaHandlerFn, PluginDeclaration, StreamEvent, StreamHandlerEntry,
    StreamHandlerFn,
};

/// One indexed action handler: the handler plus the plugin it came from.
#[derive(Clone)]
pub struct ActionBinding {
    /// Owning plugin name, carried for fault attribution.
    pub plugin: Arc<str>,
    /// The handler itself.
    pub handler: ActionHandlerFn,
}

/// One indexed delta handler.
#[derive(Clone)]
pub struct DeltaBinding {
    /// Owning plugin name.
    pub plugin: Arc<str>,
    /// The handler itself.
    pub handler: DeltaHandlerFn,
}

/// One indexed stream handler with its wildcard filter.
#[derive(Clone)]
pub struct StreamBinding {
    /// Owning plugin name.
    pub plugin: Arc<str>,
    /// The full declared filter.
    pub entry: StreamHandlerEntry,
}

impl StreamBinding {
    /// The handler inside the filter entry.
    pub fn handler(&self) -> &StreamHandlerFn {
        &self.entry.handler
    }
}

/// Lookup structures over the union of all registered declarations.
#[derive(Default)]
pub struct HandlerIndex {
    /// contract → action name → bindings.
    actions: HashMap<String, HashMap<String, Vec<ActionBinding>>>,
    /// contract → table name → bindings.
    deltas: HashMap<String, HashMap<String, Vec<DeltaBinding>>>,
    streams: Vec<StreamBinding>,
}

impl HandlerIndex {
    /// Builds the index from the full declaration list.
    ///
    /// Declarations are visited in registration order, so bindings sharing a
    /// key end up first-registered-first.
    pub fn build(declarations: &[Arc<PluginDeclaration>]) -> Self {
        let mut index = Self::default();

        for decl in declarations {
            let plugin: Arc<str> = Arc::from(decl.name.as_str());

            for entry in &decl.action_handlers {
                index
                    .actions
                    .entry(entry.contract.clone())
                    .or_default()
                    .entry(entry.action.clone())
                    .or_default()
                    .push(ActionBinding {
                        plugin: Arc::clone(&plugin),
                        handler: Arc::clone(&entry.handler),
                    });
            }

            for entry in &decl.delta_handlers {
                index
                    .deltas
                    .entry(entry.contract.clone())
                    .or_default()
                    .entry(entry.table.clone())
                    .or_default()
                    .push(DeltaBinding {
                        plugin: Arc::clone(&plugin),
                        handler: Arc::clone(&entry.handler),
                    });
            }

            for entry in &decl.stream_handlers {
                index.streams.push(StreamBinding {
                    plugin: Arc::clone(&plugin),
                    entry: entry.clone(),
                });
            }
        }

        debug!(
            action_contracts = index.actions.len(),
            delta_contracts = index.deltas.len(),
            stream_filters = index.streams.len(),
            "Handler index built"
        );
        index
    }

    /// Handlers registered for the exact `(contract, action)` key, in
    /// registration order. Empty when no plugin claimed the key.
    pub fn lookup_action(&self, contract: &str, action: &str) -> &[ActionBinding] {
        self.actions
            .get(contract)
            .and_then(|by_name| by_name.get(action))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handlers registered for the exact `(code, table)` key.
    pub fn lookup_delta(&self, code: &str, table: &str) -> &[DeltaBinding] {
        self.deltas
            .get(code)
            .and_then(|by_table| by_table.get(table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All stream handlers whose filter matches `event`, in registration
    /// order. Every match is included — there is no most-specific-wins
    /// suppression.
    pub fn lookup_stream(&self, event: &StreamEvent) -> Vec<&StreamBinding> {
        self.streams
            .iter()
            .filter(|binding| binding.entry.matches(event))
            .collect()
    }

    /// Every contract appearing as an action or delta key.
    ///
    /// Feeds the dynamic contract tracker's initial set.
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.actions
            .keys()
            .chain(self.deltas.keys())
            .map(String::as_str)
    }

    /// `true` when the index holds no handlers at all.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.deltas.is_empty() && self.streams.is_empty()
    }
}

impl std::fmt::Debug for HandlerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerIndex")
            .field("action_contracts", &self.actions.len())
            .field("delta_contracts", &self.deltas.len())
            .field("stream_filters", &self.streams.len())
            .finish()
    }
}
