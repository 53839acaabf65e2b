//! Mapping reconciliation.
//!
//! Before dispatch begins, every mapping fragment contributed by every
//! registered plugin is folded into one [`MergedSchema`]. Reconciliation is
//! pure and order-independent: the same set of fragments always produces the
//! same result regardless of plugin registration sequence, and any two
//! fragments that disagree on a field's type fail with
//! [`RegistryError::SchemaConflict`].
//!
//! A conflict is fatal at startup — the registry never comes up with an
//! ambiguous schema — and cannot occur later, because reconciliation runs
//! exactly once, before the dispatch engine accepts any events.

use std::sync::Arc;

use tracing::debug;

use strata_core::{
    MappingFragment, MergedSchema, PluginDeclaration, RegistryError, RegistryResult, SchemaKey,
};

/// Folds one fragment into the schema entry for `key`.
fn merge_fragment(
    schema: &mut MergedSchema,
    key: SchemaKey,
    fragment: &MappingFragment,
) -> RegistryResult<()> {
    let entry = schema.entry(key.clone()).or_default();
    for (field, field_type) in fragment {
        match entry.get(field) {
            Some(existing) if existing != field_type => {
                return Err(RegistryError::SchemaConflict {
                    key,
                    field: field.clone(),
                    existing: *existing,
                    conflicting: *field_type,
                });
            }
            Some(_) => {}
            None => {
                entry.insert(field.clone(), *field_type);
            }
        }
    }
    Ok(())
}

/// Reconciles the mapping fragments of all declarations into one schema.
///
/// Fragments attached to action handlers merge under the `(contract,
/// action)` key, delta fragments under `(contract, table)`. Keys and fields
/// live in `BTreeMap`s, so iteration and the merged result are deterministic.
pub fn reconcile(declarations: &[Arc<PluginDeclaration>]) -> RegistryResult<MergedSchema> {
    let mut schema = MergedSchema::new();

    for decl in declarations {
        for entry in &decl.action_handlers {
            if let Some(fragment) = &entry.mappings {
                let key = SchemaKey::action(&entry.contract, &entry.action);
                merge_fragment(&mut schema, key, fragment)?;
            }
        }
        for entry in &decl.delta_handlers {
            if let Some(fragment) = &entry.mappings {
                let key = SchemaKey::table(&entry.contract, &entry.table);
                merge_fragment(&mut schema, key, fragment)?;
            }
        }
    }

    debug!(entries = schema.len(), "Mapping reconciliation complete");
    Ok(schema)
}
