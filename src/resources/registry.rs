//! Resource registry
//!
//! In-memory registry of resource types keyed by type name, for callers that
//! work with JSON state documents rather than typed models.

use std::collections::HashMap;
use std::sync::Arc;

use super::{DynResource, ResourceMetadata};

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Resource type '{name}' not found")]
    ResourceNotFound { name: String },
}

#[derive(Clone, Default)]
pub struct Registry {
    resources: HashMap<&'static str, Arc<dyn DynResource>>,
    metadata: HashMap<&'static str, ResourceMetadata>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type under the name its metadata declares.
    pub fn register(&mut self, resource: Arc<dyn DynResource>) {
        let metadata = resource.metadata();
        let name = metadata.type_name;
        self.resources.insert(name, resource);
        self.metadata.insert(name, metadata);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DynResource>, RegistryError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ResourceNotFound {
                name: name.to_string(),
            })
    }

    pub fn get_metadata(&self, name: &str) -> Result<&ResourceMetadata, RegistryError> {
        self.metadata
            .get(name)
            .ok_or_else(|| RegistryError::ResourceNotFound {
                name: name.to_string(),
            })
    }

    /// Metadata for all resource types, sorted by name for stable ordering
    pub fn list_metadata(&self) -> Vec<ResourceMetadata> {
        let mut metadata: Vec<_> = self.metadata.values().cloned().collect();
        metadata.sort_by(|a, b| a.type_name.cmp(b.type_name));
        metadata
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.list_metadata()
            .into_iter()
            .map(|metadata| metadata.type_name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::client::{HttpTransport, Transport};
    use crate::resources::{
        AlertResource, ExtractionRuleResource, ImportKey, MappingRuleResource, ProviderResource,
        UpdateStrategy,
    };

    fn transport() -> Arc<dyn Transport> {
        Arc::new(
            HttpTransport::new(
                Url::parse("http://localhost:8080").unwrap(),
                None,
                Duration::from_secs(1),
            )
            .unwrap(),
        )
    }

    fn registry() -> Registry {
        let transport = transport();
        let mut registry = Registry::new();
        registry.register(Arc::new(MappingRuleResource::new(transport.clone())));
        registry.register(Arc::new(ExtractionRuleResource::new(transport.clone())));
        registry.register(Arc::new(ProviderResource::new(transport.clone())));
        registry.register(Arc::new(AlertResource::new(transport)));
        registry
    }

    #[test]
    fn test_registry_unknown_resource() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        match registry.get("keep_workflow") {
            Err(RegistryError::ResourceNotFound { name }) => assert_eq!(name, "keep_workflow"),
            _ => panic!("Expected ResourceNotFound error"),
        }
        assert!(registry.get_metadata("keep_workflow").is_err());
    }

    #[test]
    fn test_registry_lists_sorted_metadata() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.type_names(),
            vec![
                "keep_alert",
                "keep_extraction_rule",
                "keep_mapping_rule",
                "keep_provider"
            ]
        );
    }

    #[test]
    fn test_registry_update_strategies_differ() {
        let registry = registry();
        let strategy = |name: &str| registry.get_metadata(name).unwrap().update_strategy;
        assert_eq!(strategy("keep_mapping_rule"), UpdateStrategy::Recreate);
        assert_eq!(strategy("keep_extraction_rule"), UpdateStrategy::InPlace);
        assert_eq!(strategy("keep_provider"), UpdateStrategy::InPlace);
        assert_eq!(strategy("keep_alert"), UpdateStrategy::Enrich);
        assert_eq!(
            registry.get_metadata("keep_alert").unwrap().import_key,
            ImportKey::Fingerprint
        );
    }

    #[test]
    fn test_registry_plans_through_json_state() {
        let registry = registry();
        let provider = registry.get("keep_provider").unwrap();
        let prior = serde_json::json!({
            "id": "p1", "name": "dd", "type": "datadog", "config": {"api_key": "k"}, "installed": true
        });
        let renamed = serde_json::json!({
            "name": "dd-prod", "type": "datadog", "config": {"api_key": "k"}
        });
        let retyped = serde_json::json!({
            "name": "dd", "type": "grafana", "config": {"api_key": "k"}
        });
        assert_eq!(
            provider.plan(&prior, &renamed).unwrap(),
            crate::resources::PlanAction::Update
        );
        assert_eq!(
            provider.plan(&prior, &retyped).unwrap(),
            crate::resources::PlanAction::Replace
        );
    }
}
