//! Index-mapping fragments and the reconciled schema.
//!
//! Plugins may attach a [`MappingFragment`] to each action or delta handler
//! they declare: a partial description of how that action/table should be
//! represented in the search index. The registry reconciles all fragments
//! into one [`MergedSchema`] before dispatch begins; the merged result is
//! what the external search-index backend provisions from.
//!
//! Fragments are keyed with [`BTreeMap`]s so reconciliation is independent
//! of plugin registration order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field type of an indexed value, mirroring the search backend's type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Exact-match string.
    Keyword,
    /// Analyzed full-text string.
    Text,
    /// 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean flag.
    Boolean,
    /// Date/timestamp.
    Date,
    /// Nested object.
    Object,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// A partial schema contributed by one plugin: field name → field type.
pub type MappingFragment = BTreeMap<String, FieldType>;

/// What a schema entry describes: the indexed shape of an action's data or
/// of a table's rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaTarget {
    /// Mapping for an action's `data` field.
    Action(String),
    /// Mapping for a table's rows.
    Table(String),
}

/// Key of one [`MergedSchema`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    /// Contract account the mapping belongs to.
    pub contract: String,
    /// Action or table the mapping describes.
    pub target: SchemaTarget,
}

impl SchemaKey {
    /// Key for an action mapping.
    pub fn action(contract: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            target: SchemaTarget::Action(name.into()),
        }
    }

    /// Key for a table mapping.
    pub fn table(contract: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            target: SchemaTarget::Table(table.into()),
        }
    }
}

impl std::fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            SchemaTarget::Action(name) => write!(f, "{}::{}", self.contract, name),
            SchemaTarget::Table(table) => write!(f, "{}/{}", self.contract, table),
        }
    }
}

/// The reconciled schema: one agreed fragment per (contract, action|table)
/// key, consumed by the external search-index backend.
///
/// Frozen once the registry activates; only built by reconciliation, never
/// patched afterwards.
pub type MergedSchema = BTreeMap<SchemaKey, MappingFragment>;
