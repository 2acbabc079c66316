//! `keep_provider`: an installed Keep integration (Datadog, Grafana, ...).
//!
//! `type` can never change in place: the plan classifies a type change as a
//! replacement and the update body carries only `name` and `config`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, info};

use super::{
    Attribute, AttributeType, ImportKey, Resource, ResourceContext, ResourceMetadata, Schema,
    UpdateStrategy, ignore_missing_on_delete, require_id,
};
use crate::client::Transport;
use crate::client::decode::{self, Object};
use crate::error::ProviderError;
use crate::lookup::{ListSource, Lookup};

pub const TYPE_NAME: &str = "keep_provider";
const COLLECTION: &str = "providers";
const ENVELOPE: &str = "provider";

const LOOKUP: Lookup = Lookup {
    resource: TYPE_NAME,
    direct: Some(COLLECTION),
    envelope: Some(ENVELOPE),
    list: Some(ListSource {
        segments: &[COLLECTION],
        collections: &["installed_providers", "providers"],
    }),
    id_field: "id",
};

/// Keys the install endpoint reserves; config entries may not override them.
const INSTALL_KEYS: [&str; 4] = [
    "provider_id",
    "provider_name",
    "provider_type",
    "pulling_enabled",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstalledProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alert_received: Option<String>,
}

pub struct ProviderResource {
    ctx: ResourceContext,
}

impl ProviderResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_context(ResourceContext::for_type(transport, TYPE_NAME))
    }

    pub fn with_context(ctx: ResourceContext) -> Self {
        Self { ctx }
    }

    async fn install(&self, plan: &InstalledProvider) -> Result<InstalledProvider, ProviderError> {
        self.validate(plan)?;
        let bytes = self
            .ctx
            .transport()
            .post(&[COLLECTION, "install"], &install_payload(plan))
            .await?;
        let object = decode::unwrap_envelope(decode::parse_object(TYPE_NAME, &bytes)?, ENVELOPE);
        if decode::id_field(&object, "id").is_none() {
            return Err(ProviderError::decode(TYPE_NAME, "response lacks field 'id'", &bytes));
        }
        let installed = decode_provider(&object)?;
        info!(
            resource_id = ?installed.id,
            provider_type = %installed.provider_type,
            config_keys = installed.config.len(),
            "installed provider"
        );
        Ok(installed)
    }

    async fn read_provider(&self, id: &str) -> Result<InstalledProvider, ProviderError> {
        let object = LOOKUP.find(self.ctx.transport(), id).await?;
        let mut provider = decode_provider(&object)?;
        provider.id.get_or_insert_with(|| id.to_string());
        Ok(provider)
    }

    async fn update_provider(
        &self,
        state: &InstalledProvider,
        plan: &InstalledProvider,
    ) -> Result<InstalledProvider, ProviderError> {
        self.validate(plan)?;
        if state.provider_type != plan.provider_type {
            return Err(ProviderError::invalid_state(
                TYPE_NAME,
                format!(
                    "type cannot change from '{}' to '{}' in place; the provider must be replaced",
                    state.provider_type, plan.provider_type
                ),
            ));
        }
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        let bytes = self
            .ctx
            .transport()
            .put(&[COLLECTION, id], &update_payload(plan))
            .await?;
        let object = decode::unwrap_envelope(decode::parse_object(TYPE_NAME, &bytes)?, ENVELOPE);
        let mut updated = decode_provider(&object)?;
        updated.id.get_or_insert_with(|| id.to_string());
        info!(resource_id = id, "updated provider");
        Ok(updated)
    }

    async fn uninstall(&self, state: &InstalledProvider) -> Result<(), ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        ignore_missing_on_delete(
            TYPE_NAME,
            id,
            self.ctx.transport().delete(&[COLLECTION, id]).await,
        )?;
        info!(resource_id = id, "deleted provider");
        Ok(())
    }
}

/// Install body: fixed identification keys plus every config entry at the top level.
fn install_payload(provider: &InstalledProvider) -> Value {
    let mut body = Map::new();
    for (key, value) in &provider.config {
        if INSTALL_KEYS.contains(&key.as_str()) {
            debug!(key = %key, "config key shadowed by install field");
            continue;
        }
        body.insert(key.clone(), json!(value));
    }
    body.insert("provider_id".into(), json!(provider.provider_type));
    body.insert("provider_name".into(), json!(provider.name));
    body.insert("provider_type".into(), json!(provider.provider_type));
    body.insert("pulling_enabled".into(), json!(true));
    Value::Object(body)
}

fn update_payload(provider: &InstalledProvider) -> Value {
    json!({
        "name": provider.name,
        "config": provider.config,
    })
}

fn decode_provider(object: &Object) -> Result<InstalledProvider, ProviderError> {
    let details = match object.get("details") {
        Some(Value::Object(details)) => Some(details),
        _ => None,
    };

    let name = decode::string_field(object, "name")
        .or_else(|| decode::string_field(object, "provider_name"))
        .or_else(|| details.and_then(|d| decode::string_field(d, "name")));
    let provider_type = decode::string_field(object, "type")
        .or_else(|| decode::string_field(object, "provider_type"));

    let (Some(name), Some(provider_type)) = (name, provider_type) else {
        return Err(ProviderError::Decode {
            resource: TYPE_NAME,
            detail: "response lacks provider name or type".to_string(),
            body: Value::Object(object.clone()).to_string(),
        });
    };

    let config = decode::string_map(object, "config")
        .or_else(|| details.and_then(|d| decode::string_map(d, "authentication")))
        .unwrap_or_default();

    Ok(InstalledProvider {
        id: decode::id_field(object, "id"),
        name,
        provider_type,
        config,
        installed: decode::bool_field(object, "installed"),
        last_alert_received: decode::string_field(object, "last_alert_received"),
    })
}

#[async_trait]
impl Resource for ProviderResource {
    type Model = InstalledProvider;

    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new(TYPE_NAME, UpdateStrategy::InPlace, ImportKey::Id)
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "Keep provider installation.",
            vec![
                Attribute::computed("id", AttributeType::String),
                Attribute::required("name", AttributeType::String),
                Attribute::required("type", AttributeType::String)
                    .requires_replace()
                    .describe("Provider type, e.g. `datadog`. Changing it replaces the provider."),
                Attribute::required("config", AttributeType::StringMap)
                    .sensitive()
                    .describe("Type-specific settings; keys are not validated locally."),
                Attribute::computed("installed", AttributeType::Bool),
                Attribute::computed("last_alert_received", AttributeType::String),
            ],
        )
    }

    fn validate(&self, provider: &InstalledProvider) -> Result<(), ProviderError> {
        if provider.name.is_empty() {
            return Err(ProviderError::validation(TYPE_NAME, "name must not be empty"));
        }
        if provider.provider_type.is_empty() {
            return Err(ProviderError::validation(TYPE_NAME, "type must not be empty"));
        }
        Ok(())
    }

    async fn create(&self, plan: &InstalledProvider) -> Result<InstalledProvider, ProviderError> {
        self.install(plan)
            .instrument(self.ctx.operation("create"))
            .await
    }

    async fn read(&self, state: &InstalledProvider) -> Result<InstalledProvider, ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        self.read_provider(id)
            .instrument(self.ctx.operation("read"))
            .await
    }

    async fn update(
        &self,
        state: &InstalledProvider,
        plan: &InstalledProvider,
    ) -> Result<InstalledProvider, ProviderError> {
        self.update_provider(state, plan)
            .instrument(self.ctx.operation("update"))
            .await
    }

    async fn delete(&self, state: &InstalledProvider) -> Result<(), ProviderError> {
        self.uninstall(state)
            .instrument(self.ctx.operation("delete"))
            .await
    }

    async fn import(&self, id: &str) -> Result<InstalledProvider, ProviderError> {
        self.read_provider(id)
            .instrument(self.ctx.operation("import"))
            .await
    }
}
