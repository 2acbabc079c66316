//! Resource metadata types
//!
//! Describes how each resource type is updated and imported.

use serde::Serialize;

/// How a changed resource is brought in line with its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// `PUT` to the object's own endpoint; the identifier is stable.
    InPlace,
    /// Delete, then create again. The identifier changes on every update.
    Recreate,
    /// Partial enrichment call carrying only the mutable fields.
    Enrich,
}

/// Which attribute an import identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKey {
    Id,
    Fingerprint,
}

/// Metadata about a resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMetadata {
    /// Resource type name, e.g. `keep_mapping_rule`
    pub type_name: &'static str,
    pub update_strategy: UpdateStrategy,
    pub import_key: ImportKey,
}

impl ResourceMetadata {
    pub const fn new(
        type_name: &'static str,
        update_strategy: UpdateStrategy,
        import_key: ImportKey,
    ) -> Self {
        Self {
            type_name,
            update_strategy,
            import_key,
        }
    }
}
