//! Provider entry point
//!
//! [`KeepProvider`] turns the `provider "keep"` block into one shared HTTP
//! transport and hands it to every resource type.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{HttpTransport, Transport};
use crate::config::{ConfigLoader, ProviderConfig, ProviderSettings};
use crate::error::ProviderError;
use crate::resources::{
    AlertResource, Attribute, AttributeType, ExtractionRuleResource, MappingRuleResource,
    ProviderResource, Registry, ResourceContext, Schema, alert, extraction_rule, mapping_rule,
    provider,
};
use crate::telemetry;

/// Name under which the provider is addressed in configuration.
pub const PROVIDER_NAME: &str = "keep";

pub struct KeepProvider {
    config: ProviderConfig,
    mapping_rules: Arc<MappingRuleResource>,
    extraction_rules: Arc<ExtractionRuleResource>,
    providers: Arc<ProviderResource>,
    alerts: Arc<AlertResource>,
    registry: Registry,
}

impl KeepProvider {
    /// Schema of the provider block itself.
    pub fn schema() -> Schema {
        Schema::new(
            "Manages mapping rules, extraction rules, providers and alerts of a Keep installation.",
            vec![
                Attribute::optional("api_key", AttributeType::String)
                    .sensitive()
                    .describe("Keep API key. Falls back to `KEEP_API_KEY`."),
                Attribute::optional("api_url", AttributeType::String).describe(
                    "Base URL of the Keep backend. Falls back to `KEEP_API_URL`, then `http://localhost:8080`.",
                ),
            ],
        )
    }

    /// Resolve settings against the current working directory's environment.
    pub fn configure(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Self::configure_with(&ConfigLoader::new(), settings)
    }

    pub fn configure_with(
        loader: &ConfigLoader,
        settings: &ProviderSettings,
    ) -> Result<Self, ProviderError> {
        let config = loader.resolve(settings)?;

        if let Err(err) = telemetry::init_tracing(&config) {
            eprintln!("Warning: failed to initialize tracing: {err}");
        }
        if let Ok(redacted) = config.redacted_json() {
            debug!(config = %redacted, "resolved provider configuration");
        }

        let transport = HttpTransport::from_config(&config)?;
        info!(
            api_url = %transport.base_url(),
            authenticated = config.api_key.is_some(),
            timeout_secs = config.timeout_secs,
            "configured Keep provider"
        );
        if config.api_key.is_none() {
            warn!("no API key configured; requests are sent unauthenticated");
        }

        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build the provider around an existing transport.
    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn Transport>) -> Self {
        let context =
            |type_name: &'static str| ResourceContext::for_type(transport.clone(), type_name);

        let mapping_rules = Arc::new(MappingRuleResource::with_context(context(
            mapping_rule::TYPE_NAME,
        )));
        let extraction_rules = Arc::new(ExtractionRuleResource::with_context(context(
            extraction_rule::TYPE_NAME,
        )));
        let providers = Arc::new(ProviderResource::with_context(context(provider::TYPE_NAME)));
        let alerts = Arc::new(AlertResource::with_context(context(alert::TYPE_NAME)));

        let mut registry = Registry::new();
        registry.register(mapping_rules.clone());
        registry.register(extraction_rules.clone());
        registry.register(providers.clone());
        registry.register(alerts.clone());

        Self {
            config,
            mapping_rules,
            extraction_rules,
            providers,
            alerts,
            registry,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn mapping_rules(&self) -> &MappingRuleResource {
        &self.mapping_rules
    }

    pub fn extraction_rules(&self) -> &ExtractionRuleResource {
        &self.extraction_rules
    }

    pub fn providers(&self) -> &ProviderResource {
        &self.providers
    }

    pub fn alerts(&self) -> &AlertResource {
        &self.alerts
    }

    /// Type-erased view keyed by resource type name.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::error::ErrorCategory;

    #[test]
    fn test_provider_schema_marks_key_sensitive() {
        let schema = KeepProvider::schema();
        assert_eq!(
            schema.sensitive_attributes().collect::<Vec<_>>(),
            vec!["api_key"]
        );
        assert!(schema.attribute("api_url").is_some());
    }

    #[test]
    fn test_unknown_api_url_fails_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
        let settings = ProviderSettings {
            api_url: ConfigValue::Unknown,
            ..ProviderSettings::default()
        };
        let err = KeepProvider::configure_with(&loader, &settings)
            .err()
            .expect("configuration must fail");
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_configure_registers_every_resource_type() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
        let settings = ProviderSettings::default()
            .with_api_url("http://127.0.0.1:9")
            .with_api_key("k");
        let provider = KeepProvider::configure_with(&loader, &settings).unwrap();

        assert_eq!(provider.config().api_url, "http://127.0.0.1:9");
        assert_eq!(provider.registry().len(), 4);
        assert!(provider.registry().get(alert::TYPE_NAME).is_ok());
    }
}
