//! Dynamic contract tracking.
//!
//! Some plugins want raw data for a contract made available before they
//! commit to specific action or table handlers. The tracker owns the set of
//! such contracts: seeded at activation from every declaration's
//! `dynamic_contracts` plus every contract keyed in the handler index, and
//! grown monotonically at runtime through [`ContractTracker::track`]. The
//! set never shrinks during a process lifetime.
//!
//! Each *newly* tracked contract is announced once to the [`ContractSink`]
//! collaborator — the external raw-decoding side that must start making the
//! contract's data available to the dispatch engine.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use strata_core::PluginDeclaration;

use crate::index::HandlerIndex;

/// Collaborator notified when a contract becomes tracked.
#[async_trait]
pub trait ContractSink: Send + Sync {
    /// Called exactly once per newly tracked contract.
    async fn contract_tracked(&self, contract: &str);
}

/// Thread-safe, monotonically growing set of tracked contracts.
pub struct ContractTracker {
    contracts: RwLock<HashSet<String>>,
    sink: Option<Arc<dyn ContractSink>>,
}

impl ContractTracker {
    /// Derives the initial set from the declarations and the handler index.
    ///
    /// Seeding does not notify the sink — the collaborator receives the
    /// initial set wholesale via [`snapshot`](Self::snapshot) at startup;
    /// notifications are reserved for contracts added afterwards.
    pub fn seed(
        declarations: &[Arc<PluginDeclaration>],
        index: &HandlerIndex,
        sink: Option<Arc<dyn ContractSink>>,
    ) -> Self {
        let mut contracts: HashSet<String> = declarations
            .iter()
            .flat_map(|decl| decl.dynamic_contracts.iter().cloned())
            .collect();
        contracts.extend(index.contracts().map(str::to_string));

        info!(contracts = contracts.len(), "Contract tracker seeded");
        Self {
            contracts: RwLock::new(contracts),
            sink,
        }
    }

    /// Adds a contract to the tracked set.
    ///
    /// Idempotent: tracking an already-tracked contract is a no-op and does
    /// not re-notify the sink. Returns `true` when the contract was newly
    /// added.
    pub async fn track(&self, contract: &str) -> bool {
        let inserted = {
            let mut set = self.contracts.write();
            set.insert(contract.to_string())
        };

        if inserted {
            info!(contract = %contract, "Contract tracked");
            if let Some(sink) = &self.sink {
                sink.contract_tracked(contract).await;
            }
        }
        inserted
    }

    /// Whether `contract` is currently tracked.
    pub fn contains(&self, contract: &str) -> bool {
        self.contracts.read().contains(contract)
    }

    /// Number of tracked contracts.
    pub fn len(&self) -> usize {
        self.contracts.read().len()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.contracts.read().is_empty()
    }

    /// A sorted copy of the tracked set, for the external collaborator.
    pub fn snapshot(&self) -> Vec<String> {
        let mut contracts: Vec<String> = self.contracts.read().iter().cloned().collect();
        contracts.sort_unstable();
        contracts
    }
}

impl std::fmt::Debug for ContractTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractTracker")
            .field("contracts", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use strata_core::ActionHandlerEntry;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContractSink for RecordingSink {
        async fn contract_tracked(&self, contract: &str) {
            self.seen.lock().push(contract.to_string());
        }
    }

    fn empty_tracker(sink: Option<Arc<dyn ContractSink>>) -> ContractTracker {
        ContractTracker::seed(&[], &HandlerIndex::default(), sink)
    }

    #[tokio::test]
    async fn track_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = empty_tracker(Some(Arc::clone(&sink) as Arc<dyn ContractSink>));

        assert!(tracker.track("delphioracle").await);
        assert!(!tracker.track("delphioracle").await);

        assert_eq!(tracker.len(), 1);
        assert_eq!(sink.seen.lock().as_slice(), ["delphioracle".to_string()]);
    }

    #[test]
    fn initial_set_unions_declarations_and_index_keys() {
        let with_dynamic = Arc::new(PluginDeclaration::new("oracle").dynamic_contract("delphioracle"));
        let with_handler = Arc::new(PluginDeclaration::new("token").action_handler(
            ActionHandlerEntry::new("eosio.token", "transfer", |_| async { Ok(()) }),
        ));
        let declarations = vec![with_dynamic, with_handler];
        let index = HandlerIndex::build(&declarations);

        let tracker = ContractTracker::seed(&declarations, &index, None);
        assert_eq!(
            tracker.snapshot(),
            vec!["delphioracle".to_string(), "eosio.token".to_string()]
        );
    }

    #[tokio::test]
    async fn seeding_does_not_notify_but_growth_does() {
        let sink = Arc::new(RecordingSink::default());
        let decl = Arc::new(PluginDeclaration::new("oracle").dynamic_contract("delphioracle"));
        let declarations = vec![decl];
        let index = HandlerIndex::build(&declarations);

        let tracker = ContractTracker::seed(
            &declarations,
            &index,
            Some(Arc::clone(&sink) as Arc<dyn ContractSink>),
        );
        assert!(sink.seen.lock().is_empty());

        tracker.track("eosio.token").await;
        assert_eq!(sink.seen.lock().as_slice(), ["eosio.token".to_string()]);
        assert_eq!(tracker.len(), 2);
    }
}
