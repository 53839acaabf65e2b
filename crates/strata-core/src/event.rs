//! Event data model for the Strata dispatch core.
//!
//! Three kinds of events flow through the dispatcher:
//!
//! - [`Action`] — a single contract entry-point invocation, bundled in chain
//!   order inside a [`Block`]
//! - [`Delta`] — a recorded insert/update/delete of a contract table row
//! - [`StreamEvent`] — a live notification that is not tied to block
//!   boundaries and is matched against subscriber filters
//!
//! The chain node connection and raw decoding live outside this crate; every
//! event arrives here already decoded, with contract-specific data preserved
//! as opaque [`serde_json::Value`] payloads.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Actions
// ============================================================================

/// The `act` portion of an action: which contract entry point was called,
/// by whom, and with what data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionData {
    /// Contract account that defines the action.
    pub account: String,
    /// Name of the action.
    pub name: String,
    /// Authorization array with actor and permission.
    #[serde(default)]
    pub authorization: Value,
    /// Parsed action data.
    #[serde(default)]
    pub data: Value,
}

/// A blockchain action as delivered by the (external) block feed.
///
/// `creator_action_ordinal` links a nested action to its parent. The link is
/// informational only: the dispatcher never treats it as a dependency, so a
/// parent's handler failure does not block the child's dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Position of this action within its block's execution order.
    pub action_ordinal: u32,
    /// Ordinal of the parent action, or 0 for top-level actions.
    #[serde(default)]
    pub creator_action_ordinal: u32,
    /// Account that received this action.
    pub receiver: String,
    /// The action call itself.
    pub act: ActionData,
    /// Whether this is a context-free action.
    #[serde(default)]
    pub context_free: bool,
    /// Console output from action execution.
    #[serde(default)]
    pub console: String,
    /// Receipt information, passed through unmodified.
    #[serde(default)]
    pub receipt: Value,
}

impl Action {
    /// The `(contract, action)` lookup key for this action.
    pub fn key(&self) -> (&str, &str) {
        (&self.act.account, &self.act.name)
    }
}

// ============================================================================
// Table deltas
// ============================================================================

/// A table-row change associated with a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    /// Contract account that owns the table.
    pub code: String,
    /// Scope of the table.
    pub scope: String,
    /// Name of the table.
    pub table: String,
    /// Primary key of the row.
    pub primary_key: String,
    /// Account that pays for RAM storage.
    pub payer: String,
    /// `true` for insert/update, `false` for delete.
    pub present: bool,
    /// Block number where this delta occurred.
    pub block_num: u64,
    /// Block ID where this delta occurred.
    pub block_id: String,
    /// Parsed table row data.
    #[serde(default)]
    pub data: Value,
}

impl Delta {
    /// The `(code, table)` lookup key for this delta.
    pub fn key(&self) -> (&str, &str) {
        (&self.code, &self.table)
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// One fully decoded block: an ordered action list followed by a delta list.
///
/// The block feed is strictly sequential; the dispatch engine finishes one
/// block before the next is offered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Height of this block.
    pub block_num: u64,
    /// Chain-assigned block ID.
    pub block_id: String,
    /// Block timestamp as delivered by the feed.
    #[serde(default)]
    pub timestamp: String,
    /// Actions in `action_ordinal` order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Table deltas recorded for this block.
    #[serde(default)]
    pub deltas: Vec<Delta>,
}

// ============================================================================
// Stream events
// ============================================================================

/// Classification of live stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    /// A live action notification.
    Action,
    /// A live table-delta notification.
    TableDelta,
}

impl StreamEventKind {
    /// Returns the wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Action => "action",
            StreamEventKind::TableDelta => "table_delta",
        }
    }
}

impl FromStr for StreamEventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "action" => Ok(StreamEventKind::Action),
            "delta" | "table_delta" => Ok(StreamEventKind::TableDelta),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live event from the stream feed, not aligned to block boundaries.
///
/// The optional attributes are what stream handler filters match against;
/// an absent attribute on a *filter* acts as a wildcard, an absent attribute
/// on an *event* only matches filters that leave that field unset too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event classification tag.
    pub kind: StreamEventKind,
    /// Contract code the event originated from.
    #[serde(default)]
    pub code: Option<String>,
    /// Account associated with the event.
    #[serde(default)]
    pub account: Option<String>,
    /// Action name, for action-derived events.
    #[serde(default)]
    pub name: Option<String>,
    /// Table name, for delta-derived events.
    #[serde(default)]
    pub table: Option<String>,
    /// Contract-specific payload, passed through unmodified.
    #[serde(default)]
    pub payload: Value,
}

impl StreamEvent {
    /// Creates an event of the given kind with no attributes set.
    pub fn new(kind: StreamEventKind) -> Self {
        Self {
            kind,
            code: None,
            account: None,
            name: None,
            table: None,
            payload: Value::Null,
        }
    }

    /// Creates an action-derived stream event.
    pub fn action() -> Self {
        Self::new(StreamEventKind::Action)
    }

    /// Creates a delta-derived stream event.
    pub fn table_delta() -> Self {
        Self::new(StreamEventKind::TableDelta)
    }

    /// Sets the contract code attribute.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the account attribute.
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the action name attribute.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the table attribute.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the opaque payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// A short human-readable key for logs and fault records.
    pub fn describe(&self) -> String {
        format!(
            "{}:{}/{}",
            self.kind,
            self.code.as_deref().unwrap_or("*"),
            match self.kind {
                StreamEventKind::Action => self.name.as_deref().unwrap_or("*"),
                StreamEventKind::TableDelta => self.table.as_deref().unwrap_or("*"),
            }
        )
    }
}
