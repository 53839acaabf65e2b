//! # Strata Registry
//!
//! The event routing and dispatch core of the Strata history-indexing
//! pipeline.
//!
//! Independently authored plugins declare handlers for on-chain actions,
//! table deltas, and live stream events (see `strata-core`). This crate
//! makes those declarations meaningful:
//!
//! - **Reconciler** ([`reconciler`]) — merges per-plugin mapping fragments
//!   into one [`MergedSchema`](strata_core::MergedSchema), order-independent,
//!   failing fast on conflicting field types
//! - **Handler index** ([`index`]) — exact-key lookups for actions/deltas
//!   and ordered wildcard filters for stream events, rebuilt wholesale when
//!   the plugin set changes
//! - **Contract tracker** ([`tracker`]) — the monotonically growing set of
//!   contracts whose raw data must be made available, with idempotent
//!   runtime additions
//! - **Dispatch engine** ([`dispatch`]) — strictly block-ordered
//!   action/delta phases plus an independent stream loop, with per-handler
//!   fault isolation into an append-only [`FaultLog`]
//! - **Plugin registry** ([`registry`]) — registration, one-shot init
//!   hooks, and the published schema/route-table/tracker artifacts
//!
//! # Control flow
//!
//! ```text
//! ┌──────────┐ register ┌────────────────┐ activate ┌─────────────────┐
//! │ plugins  │─────────▶│ PluginRegistry │─────────▶│ DispatchEngine  │
//! └──────────┘          └────────────────┘          └─────────────────┘
//!                        reconcile + index            blocks → handlers
//!                        tracker + routes             stream → handlers
//!                                                     faults → FaultLog
//! ```

pub mod dispatch;
pub mod index;
pub mod reconciler;
pub mod registry;
pub mod tracker;

pub use dispatch::{DispatchEngine, FaultLog};
pub use index::{ActionBinding, DeltaBinding, HandlerIndex, StreamBinding};
pub use reconciler::reconcile;
pub use registry::{PluginRegistry, PluginState};
pub use tracker::{ContractSink, ContractTracker};
