//! # Strata Core
//!
//! Foundation types for the Strata dispatch core — the event routing layer
//! of a blockchain history-indexing pipeline.
//!
//! This crate defines the data the pipeline moves, not the machinery that
//! moves it:
//!
//! - **Events** ([`event`]) — decoded [`Action`]s, [`Delta`]s, [`Block`]s,
//!   and live [`StreamEvent`]s
//! - **Handler declarations** ([`handler`]) — type-erased async handlers,
//!   the three entry kinds, and [`PluginDeclaration`]
//! - **Mappings** ([`mapping`]) — per-plugin [`MappingFragment`]s and the
//!   reconciled [`MergedSchema`]
//! - **Routes** ([`route`]) — the (path, method, handler) tuples collected
//!   for the external HTTP transport
//! - **Errors** ([`error`]) — the fatal startup taxonomy; runtime handler
//!   failures are [`DispatchOutcome`] records instead
//!
//! The routing machinery itself (reconciler, handler index, contract
//! tracker, dispatch engine, plugin registry) lives in `strata-registry`.

pub mod error;
pub mod event;
pub mod handler;
pub mod mapping;
pub mod outcome;
pub mod route;

pub use error::{HandlerError, RegistryError, RegistryResult};
pub use event::{Action, ActionData, Block, Delta, StreamEvent, StreamEventKind};
pub use handler::{
    ActionHandlerEntry, ActionHandlerFn, DeltaHandlerEntry, DeltaHandlerFn, InitFn,
    PluginDeclaration, StreamHandlerEntry, StreamHandlerFn, into_action_handler,
    into_delta_handler, into_stream_handler,
};
pub use mapping::{FieldType, MappingFragment, MergedSchema, SchemaKey, SchemaTarget};
pub use outcome::{DispatchKind, DispatchOutcome};
pub use route::{RouteEntry, RouteHandlerFn, RouteMethod};
