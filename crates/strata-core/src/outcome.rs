//! Per-invocation dispatch outcomes.

/// Which dispatch path an outcome originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Block-bound action dispatch.
    Action,
    /// Block-bound table-delta dispatch.
    Delta,
    /// Live stream dispatch.
    Stream,
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DispatchKind::Action => "action",
            DispatchKind::Delta => "delta",
            DispatchKind::Stream => "stream",
        })
    }
}

/// Record of one failed handler invocation.
///
/// Successful invocations leave no record; the fault log is an append-only
/// sequence of failures for the external observability collaborator. A
/// failure never aborts dispatch of the remaining handlers or events.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Name of the plugin whose handler failed.
    pub plugin: String,
    /// Dispatch path the failure occurred on.
    pub kind: DispatchKind,
    /// Human-readable event key, e.g. `eosio.token::transfer`.
    pub key: String,
    /// Rendered failure cause.
    pub error: String,
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} handler of '{}' failed on {}: {}",
            self.kind, self.plugin, self.key, self.error
        )
    }
}
