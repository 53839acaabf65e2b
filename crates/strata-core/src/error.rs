//! Unified error types for the Strata dispatch core.
//!
//! Everything here is a *startup* error: it halts registry bring-up before
//! any event is dispatched. Runtime handler failures are never errors in
//! this taxonomy — they are recorded as
//! [`DispatchOutcome`](crate::outcome::DispatchOutcome)s and dispatch
//! continues.

use thiserror::Error;

use crate::mapping::{FieldType, SchemaKey};

/// Type-erased error returned by plugin handlers and init hooks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Fatal errors raised during registry bring-up.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Two plugins declared the same name.
    #[error("plugin '{name}' is already registered")]
    DuplicatePlugin {
        /// The colliding plugin name.
        name: String,
    },

    /// A declaration failed basic validation.
    #[error("invalid plugin declaration: {reason}")]
    InvalidDeclaration {
        /// Why the declaration was rejected.
        reason: String,
    },

    /// Two plugins declared incompatible types for the same mapped field.
    #[error(
        "schema conflict on {key}: field '{field}' declared as both {existing} and {conflicting}"
    )]
    SchemaConflict {
        /// The (contract, action|table) key the fragments belong to.
        key: SchemaKey,
        /// The field with disagreeing types.
        field: String,
        /// Type already reconciled for the field.
        existing: FieldType,
        /// The incompatible type a later fragment declared.
        conflicting: FieldType,
    },

    /// A plugin's one-shot initializer was driven more than once.
    ///
    /// This is a programming error in the embedding process, not something
    /// a correct bring-up sequence can produce.
    #[error("lifecycle violation: plugin '{plugin}' was initialised more than once")]
    LifecycleViolation {
        /// The plugin whose initializer would have re-run.
        plugin: String,
    },

    /// A plugin's init hook returned an error.
    #[error("plugin '{plugin}' failed to initialise: {message}")]
    PluginInit {
        /// The failing plugin.
        plugin: String,
        /// Rendered cause.
        message: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
