//! The dispatch engine: routes block events and stream events to handlers.
//!
//! Block-bound dispatch runs two phases per block — actions, then deltas.
//! The block feed is strictly sequential, so one block completes before the
//! next is offered; inside a block, events are grouped by lookup key and the
//! groups run concurrently, while invocations *within* a key keep
//! action-ordinal order first and registration order second. Stream dispatch
//! is an always-on loop with no coupling to block processing; cancelling it
//! never affects an in-flight block and vice versa.
//!
//! # Fault isolation
//!
//! Every handler invocation is awaited to completion. A handler that returns
//! an error is isolated: the failure is recorded in the [`FaultLog`] with
//! the plugin name, event key, and cause, and dispatch continues with the
//! remaining handlers for that event and the remaining events in the block.
//! Nothing a handler does at runtime can abort block processing.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info, span, warn};

use strata_core::{Action, Block, Delta, DispatchKind, DispatchOutcome, StreamEvent};

use crate::index::HandlerIndex;

// ============================================================================
// FaultLog
// ============================================================================

/// Append-only log of failed handler invocations.
///
/// Consumed by the external observability collaborator; the engine only ever
/// appends. Successful invocations leave no trace here.
#[derive(Default)]
pub struct FaultLog {
    entries: Mutex<Vec<DispatchOutcome>>,
}

impl FaultLog {
    /// Creates an empty fault log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one failure record.
    pub fn record(&self, outcome: DispatchOutcome) {
        warn!(
            plugin = %outcome.plugin,
            kind = %outcome.kind,
            key = %outcome.key,
            error = %outcome.error,
            "Handler invocation failed"
        );
        self.entries.lock().push(outcome);
    }

    /// A copy of all recorded failures, oldest first.
    pub fn entries(&self) -> Vec<DispatchOutcome> {
        self.entries.lock().clone()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` when no failure has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for FaultLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultLog").field("len", &self.len()).finish()
    }
}

// ============================================================================
// DispatchEngine
// ============================================================================

/// Routes decoded block and stream events through a [`HandlerIndex`].
///
/// Cheap to clone (both fields are `Arc`s), which is how the stream loop is
/// usually run: clone the engine into a spawned task and keep the original
/// for the sequential block feed.
#[derive(Clone)]
pub struct DispatchEngine {
    index: Arc<HandlerIndex>,
    faults: Arc<FaultLog>,
}

impl DispatchEngine {
    /// Creates an engine over a built index.
    pub fn new(index: Arc<HandlerIndex>, faults: Arc<FaultLog>) -> Self {
        Self { index, faults }
    }

    /// The fault log failures are recorded into.
    pub fn fault_log(&self) -> Arc<FaultLog> {
        Arc::clone(&self.faults)
    }

    /// Processes one block to completion: actions phase, then deltas phase.
    ///
    /// The caller drives blocks strictly in chain order and awaits each call
    /// before offering the next block; the engine itself never overlaps two
    /// blocks.
    pub async fn process_block(&self, block: &Block) {
        let span = span!(
            Level::DEBUG,
            "block",
            block_num = block.block_num,
            actions = block.actions.len(),
            deltas = block.deltas.len()
        );
        async {
            self.run_actions(block).await;
            self.run_deltas(block).await;
        }
        .instrument(span)
        .await;
    }

    /// Actions phase: dispatch every action of the block.
    ///
    /// The feed delivers actions already in `action_ordinal` order. Matched
    /// actions are grouped by `(contract, action)` key; groups run
    /// concurrently, invocations inside a group stay sequential so same-key
    /// handlers observe ordinal order and registration order. A parent
    /// action's failure never blocks its children — `creator_action_ordinal`
    /// is informational, not a dependency.
    async fn run_actions(&self, block: &Block) {
        let mut groups: HashMap<(&str, &str), Vec<Arc<Action>>> = HashMap::new();
        for action in &block.actions {
            let (contract, name) = action.key();
            if self.index.lookup_action(contract, name).is_empty() {
                continue;
            }
            groups
                .entry((contract, name))
                .or_default()
                .push(Arc::new(action.clone()));
        }

        future::join_all(groups.into_iter().map(|((contract, name), actions)| {
            let bindings = self.index.lookup_action(contract, name);
            let key = format!("{contract}::{name}");
            let faults = Arc::clone(&self.faults);
            async move {
                for action in actions {
                    for binding in bindings {
                        if let Err(err) = (binding.handler)(Arc::clone(&action)).await {
                            faults.record(DispatchOutcome {
                                plugin: binding.plugin.to_string(),
                                kind: DispatchKind::Action,
                                key: key.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
            }
        }))
        .await;
    }

    /// Deltas phase: dispatch every table delta of the block.
    ///
    /// Same grouping scheme as the actions phase, keyed by `(code, table)`.
    /// The delta's `present` flag travels with it, distinguishing
    /// insert/update from delete.
    async fn run_deltas(&self, block: &Block) {
        let mut groups: HashMap<(&str, &str), Vec<Arc<Delta>>> = HashMap::new();
        for delta in &block.deltas {
            let (code, table) = delta.key();
            if self.index.lookup_delta(code, table).is_empty() {
                continue;
            }
            groups
                .entry((code, table))
                .or_default()
                .push(Arc::new(delta.clone()));
        }

        future::join_all(groups.into_iter().map(|((code, table), deltas)| {
            let bindings = self.index.lookup_delta(code, table);
            let key = format!("{code}/{table}");
            let faults = Arc::clone(&self.faults);
            async move {
                for delta in deltas {
                    for binding in bindings {
                        if let Err(err) = (binding.handler)(Arc::clone(&delta)).await {
                            faults.record(DispatchOutcome {
                                plugin: binding.plugin.to_string(),
                                kind: DispatchKind::Delta,
                                key: key.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
            }
        }))
        .await;
    }

    /// Dispatches one live stream event to every matching filter.
    ///
    /// All matches are invoked in registration order; there is no
    /// most-specific-wins suppression and no block-ordering obligation.
    pub async fn handle_stream_event(&self, event: StreamEvent) {
        let matches = self.index.lookup_stream(&event);
        if matches.is_empty() {
            debug!(key = %event.describe(), "Stream event matched no filters");
            return;
        }

        let key = event.describe();
        let event = Arc::new(event);
        for binding in matches {
            if let Err(err) = (binding.handler())(Arc::clone(&event)).await {
                self.faults.record(DispatchOutcome {
                    plugin: binding.plugin.to_string(),
                    kind: DispatchKind::Stream,
                    key: key.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    /// Runs the always-on stream phase until the feed closes or `shutdown`
    /// is cancelled.
    ///
    /// Runs on its own concurrency path: cancelling it leaves in-flight
    /// block processing untouched, and block processing never delays this
    /// loop beyond handler execution time.
    pub async fn run_stream(
        &self,
        mut events: mpsc::Receiver<StreamEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Stream dispatch started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stream dispatch cancelled");
                    break;
                }
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.handle_stream_event(event).await,
                    None => {
                        info!("Stream feed closed");
                        break;
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("index", &self.index)
            .field("faults", &self.faults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use strata_core::{
        ActionData, ActionHandlerEntry, DeltaHandlerEntry, PluginDeclaration, StreamEventKind,
        StreamHandlerEntry,
    };

    fn action(ordinal: u32, creator: u32, contract: &str, name: &str) -> Action {
        Action {
            action_ordinal: ordinal,
            creator_action_ordinal: creator,
            receiver: contract.to_string(),
            act: ActionData {
                account: contract.to_string(),
                name: name.to_string(),
                authorization: Value::Null,
                data: Value::Null,
            },
            context_free: false,
            console: String::new(),
            receipt: Value::Null,
        }
    }

    fn delta(code: &str, table: &str, present: bool) -> Delta {
        Delta {
            code: code.to_string(),
            scope: code.to_string(),
            table: table.to_string(),
            primary_key: "0".to_string(),
            payer: code.to_string(),
            present,
            block_num: 1,
            block_id: "b1".to_string(),
            data: Value::Null,
        }
    }

    fn block(actions: Vec<Action>, deltas: Vec<Delta>) -> Block {
        Block {
            block_num: 1,
            block_id: "b1".to_string(),
            timestamp: String::new(),
            actions,
            deltas,
        }
    }

    fn engine_for(declarations: Vec<PluginDeclaration>) -> DispatchEngine {
        let declarations: Vec<Arc<PluginDeclaration>> =
            declarations.into_iter().map(Arc::new).collect();
        let index = Arc::new(HandlerIndex::build(&declarations));
        DispatchEngine::new(index, Arc::new(FaultLog::new()))
    }

    fn recording_plugin(
        name: &str,
        contract: &str,
        action_name: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> PluginDeclaration {
        let tag = name.to_string();
        PluginDeclaration::new(name).action_handler(ActionHandlerEntry::new(
            contract,
            action_name,
            move |_| {
                let log = Arc::clone(&log);
                let tag = tag.clone();
                async move {
                    log.lock().push(tag);
                    Ok(())
                }
            },
        ))
    }

    #[tokio::test]
    async fn same_key_fan_out_invokes_both_once_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_for(vec![
            recording_plugin("first", "eosio.token", "transfer", Arc::clone(&log)),
            recording_plugin("second", "eosio.token", "transfer", Arc::clone(&log)),
        ]);

        engine
            .process_block(&block(vec![action(1, 0, "eosio.token", "transfer")], vec![]))
            .await;

        assert_eq!(log.lock().as_slice(), ["first", "second"]);
        assert!(engine.fault_log().is_empty());
    }

    #[tokio::test]
    async fn failing_handler_is_isolated_and_logged_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = PluginDeclaration::new("broken").action_handler(ActionHandlerEntry::new(
            "eosio.token",
            "transfer",
            |_| async { Err("boom".into()) },
        ));
        let counting = recording_plugin("counting", "eosio.msig", "exec", Arc::clone(&log));

        let engine = engine_for(vec![failing, counting]);
        engine
            .process_block(&block(
                vec![
                    action(1, 0, "eosio.token", "transfer"),
                    action(2, 0, "eosio.msig", "exec"),
                ],
                vec![],
            ))
            .await;

        let faults = engine.fault_log().entries();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].plugin, "broken");
        assert_eq!(faults[0].kind, DispatchKind::Action);
        assert_eq!(faults[0].key, "eosio.token::transfer");
        assert_eq!(faults[0].error, "boom");

        // The unrelated action in the same block was still dispatched.
        assert_eq!(log.lock().as_slice(), ["counting"]);
    }

    #[tokio::test]
    async fn parent_failure_does_not_block_child_action() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let parent = PluginDeclaration::new("parent").action_handler(ActionHandlerEntry::new(
            "eosio.token",
            "transfer",
            |_| async { Err("parent failed".into()) },
        ));
        let child = recording_plugin("child", "eosio.token", "logtransfer", Arc::clone(&log));

        let engine = engine_for(vec![parent, child]);
        engine
            .process_block(&block(
                vec![
                    action(1, 0, "eosio.token", "transfer"),
                    // Nested action created by ordinal 1.
                    action(2, 1, "eosio.token", "logtransfer"),
                ],
                vec![],
            ))
            .await;

        assert_eq!(log.lock().as_slice(), ["child"]);
        assert_eq!(engine.fault_log().len(), 1);
    }

    #[tokio::test]
    async fn repeated_key_dispatches_every_occurrence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_for(vec![recording_plugin(
            "counter",
            "eosio.token",
            "transfer",
            Arc::clone(&log),
        )]);

        engine
            .process_block(&block(
                vec![
                    action(1, 0, "eosio.token", "transfer"),
                    action(2, 0, "eosio.token", "transfer"),
                ],
                vec![],
            ))
            .await;

        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn delta_phase_passes_present_flag_through() {
        let presents = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&presents);
        let plugin = PluginDeclaration::new("balances").delta_handler(DeltaHandlerEntry::new(
            "eosio.token",
            "accounts",
            move |delta| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(delta.present);
                    Ok(())
                }
            },
        ));

        let engine = engine_for(vec![plugin]);
        engine
            .process_block(&block(
                vec![],
                vec![
                    delta("eosio.token", "accounts", true),
                    delta("eosio.token", "accounts", false),
                ],
            ))
            .await;

        assert_eq!(presents.lock().as_slice(), [true, false]);
    }

    #[tokio::test]
    async fn stream_event_reaches_all_matching_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &str, entry: StreamHandlerEntry| {
            PluginDeclaration::new(name).stream_handler(entry)
        };
        let log_a = Arc::clone(&log);
        let log_b = Arc::clone(&log);

        let broad = make(
            "broad",
            StreamHandlerEntry::new(StreamEventKind::TableDelta, move |_| {
                let log = Arc::clone(&log_a);
                async move {
                    log.lock().push("broad".to_string());
                    Ok(())
                }
            }),
        );
        let narrow = make(
            "narrow",
            StreamHandlerEntry::new(StreamEventKind::TableDelta, move |_| {
                let log = Arc::clone(&log_b);
                async move {
                    log.lock().push("narrow".to_string());
                    Ok(())
                }
            })
            .code("eosio.token")
            .table("accounts"),
        );

        let engine = engine_for(vec![broad, narrow]);

        engine
            .handle_stream_event(StreamEvent::table_delta().code("eosio.token").table("accounts"))
            .await;
        assert_eq!(log.lock().as_slice(), ["broad", "narrow"]);

        log.lock().clear();
        engine
            .handle_stream_event(StreamEvent::table_delta().code("eosio.token").table("stat"))
            .await;
        assert_eq!(log.lock().as_slice(), ["broad"]);
    }

    #[tokio::test]
    async fn stream_failure_is_recorded_and_dispatch_continues() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_ok = Arc::clone(&log);

        let failing = PluginDeclaration::new("broken").stream_handler(StreamHandlerEntry::new(
            StreamEventKind::Action,
            |_| async { Err("stream boom".into()) },
        ));
        let healthy = PluginDeclaration::new("healthy").stream_handler(StreamHandlerEntry::new(
            StreamEventKind::Action,
            move |_| {
                let log = Arc::clone(&log_ok);
                async move {
                    log.lock().push("healthy".to_string());
                    Ok(())
                }
            },
        ));

        let engine = engine_for(vec![failing, healthy]);
        engine.handle_stream_event(StreamEvent::action()).await;

        assert_eq!(log.lock().as_slice(), ["healthy"]);
        let faults = engine.fault_log().entries();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].kind, DispatchKind::Stream);
        assert_eq!(faults[0].plugin, "broken");
    }

    #[tokio::test]
    async fn stream_loop_processes_until_cancelled() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_for(vec![{
            let log = Arc::clone(&log);
            PluginDeclaration::new("watcher").stream_handler(StreamHandlerEntry::new(
                StreamEventKind::TableDelta,
                move |event| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(event.describe());
                        Ok(())
                    }
                },
            ))
        }]);

        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let loop_engine = engine.clone();
        let loop_shutdown = shutdown.clone();
        let handle =
            tokio::spawn(async move { loop_engine.run_stream(rx, loop_shutdown).await });

        tx.send(StreamEvent::table_delta().code("eosio.token").table("stat"))
            .await
            .unwrap();

        // Wait for the loop to drain the event before cancelling.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while log.lock().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("stream event was not processed");

        // Block processing stays available while the stream loop runs.
        engine.process_block(&block(vec![], vec![])).await;

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(log.lock().as_slice(), ["table_delta:eosio.token/stat"]);
    }
}
