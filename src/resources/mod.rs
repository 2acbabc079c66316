//! Resource SDK
//!
//! This module provides:
//! - The [`Resource`] trait every Keep resource type implements
//! - Schema declarations and metadata used for planning and discovery
//! - A JSON-state view of any resource ([`DynResource`]) and a registry keyed by type name
//! - The four Keep resource types

pub mod alert;
pub mod extraction_rule;
pub mod mapping_rule;
pub mod metadata;
pub mod provider;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{Span, warn};

use crate::client::{ClientError, Transport};
use crate::error::ProviderError;
use crate::telemetry;

pub use alert::{Alert, AlertResource, AlertSeverity, AlertStatus};
pub use extraction_rule::{ExtractionRule, ExtractionRuleResource};
pub use mapping_rule::{MappingRule, MappingRuleResource, Matcher};
pub use metadata::{ImportKey, ResourceMetadata, UpdateStrategy};
pub use provider::{InstalledProvider, ProviderResource};
pub use registry::{Registry, RegistryError};
pub use schema::{Attribute, AttributeType, Presence, Schema};

/// Outcome of comparing prior state with desired configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    NoOp,
    Update,
    /// Delete and create; never sent as an update.
    Replace,
}

/// Dependencies handed to every resource at construction.
#[derive(Clone)]
pub struct ResourceContext {
    transport: Arc<dyn Transport>,
    span: Span,
}

impl ResourceContext {
    pub fn new(transport: Arc<dyn Transport>, span: Span) -> Self {
        Self { transport, span }
    }

    /// Context with the default per-type span.
    pub fn for_type(transport: Arc<dyn Transport>, type_name: &'static str) -> Self {
        Self::new(transport, telemetry::resource_span(type_name))
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span for one CRUD operation.
    pub fn operation(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "keep_operation", operation = name)
    }
}

/// A Keep resource type: typed model, wire codec and CRUD calls.
#[async_trait]
pub trait Resource: Send + Sync {
    type Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    fn metadata(&self) -> ResourceMetadata;

    fn schema(&self) -> Schema;

    /// Local checks run before any request is sent.
    fn validate(&self, _model: &Self::Model) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Attribute equality used by [`Resource::plan`].
    fn attribute_equal(&self, _name: &str, prior: &Value, desired: &Value) -> bool {
        prior == desired
    }

    fn plan(&self, prior: &Self::Model, desired: &Self::Model) -> Result<PlanAction, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let schema = Resource::schema(self);
        let prior = to_state(type_name, prior)?;
        let desired = to_state(type_name, desired)?;

        let changed = schema
            .attributes
            .iter()
            .filter(|attr| attr.is_configurable())
            .filter(|attr| {
                let wanted = desired.get(attr.name).unwrap_or(&Value::Null);
                if wanted.is_null() && attr.presence == Presence::OptionalComputed {
                    return false;
                }
                let current = prior.get(attr.name).unwrap_or(&Value::Null);
                !self.attribute_equal(attr.name, current, wanted)
            })
            .map(|attr| attr.name);

        Ok(schema.classify(changed))
    }

    async fn create(&self, plan: &Self::Model) -> Result<Self::Model, ProviderError>;

    async fn read(&self, state: &Self::Model) -> Result<Self::Model, ProviderError>;

    async fn update(
        &self,
        state: &Self::Model,
        plan: &Self::Model,
    ) -> Result<Self::Model, ProviderError>;

    async fn delete(&self, state: &Self::Model) -> Result<(), ProviderError>;

    async fn import(&self, id: &str) -> Result<Self::Model, ProviderError>;
}

/// Any [`Resource`] viewed through JSON state documents.
#[async_trait]
pub trait DynResource: Send + Sync {
    fn metadata(&self) -> ResourceMetadata;
    fn schema(&self) -> Schema;
    fn plan(&self, prior: &Value, desired: &Value) -> Result<PlanAction, ProviderError>;
    async fn create(&self, plan: Value) -> Result<Value, ProviderError>;
    async fn read(&self, state: Value) -> Result<Value, ProviderError>;
    async fn update(&self, state: Value, plan: Value) -> Result<Value, ProviderError>;
    async fn delete(&self, state: Value) -> Result<(), ProviderError>;
    async fn import(&self, id: &str) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<R: Resource> DynResource for R {
    fn metadata(&self) -> ResourceMetadata {
        Resource::metadata(self)
    }

    fn schema(&self) -> Schema {
        Resource::schema(self)
    }

    fn plan(&self, prior: &Value, desired: &Value) -> Result<PlanAction, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let prior: R::Model = from_state(type_name, prior.clone())?;
        let desired: R::Model = from_state(type_name, desired.clone())?;
        Resource::plan(self, &prior, &desired)
    }

    async fn create(&self, plan: Value) -> Result<Value, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let plan: R::Model = from_state(type_name, plan)?;
        let created = Resource::create(self, &plan).await?;
        to_state(type_name, &created)
    }

    async fn read(&self, state: Value) -> Result<Value, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let state: R::Model = from_state(type_name, state)?;
        let refreshed = Resource::read(self, &state).await?;
        to_state(type_name, &refreshed)
    }

    async fn update(&self, state: Value, plan: Value) -> Result<Value, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let state: R::Model = from_state(type_name, state)?;
        let plan: R::Model = from_state(type_name, plan)?;
        let updated = Resource::update(self, &state, &plan).await?;
        to_state(type_name, &updated)
    }

    async fn delete(&self, state: Value) -> Result<(), ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let state: R::Model = from_state(type_name, state)?;
        Resource::delete(self, &state).await
    }

    async fn import(&self, id: &str) -> Result<Value, ProviderError> {
        let type_name = Resource::metadata(self).type_name;
        let imported = Resource::import(self, id).await?;
        to_state(type_name, &imported)
    }
}

pub fn to_state<M: Serialize>(type_name: &'static str, model: &M) -> Result<Value, ProviderError> {
    serde_json::to_value(model).map_err(|err| ProviderError::invalid_state(type_name, err))
}

pub fn from_state<M: DeserializeOwned>(
    type_name: &'static str,
    state: Value,
) -> Result<M, ProviderError> {
    serde_json::from_value(state).map_err(|err| ProviderError::invalid_state(type_name, err))
}

/// Identifier a stored model must carry before it can be read, updated or deleted.
pub(crate) fn require_id<'a>(
    type_name: &'static str,
    attribute: &str,
    id: Option<&'a String>,
) -> Result<&'a str, ProviderError> {
    id.map(String::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::invalid_state(type_name, format!("{attribute} is not set")))
}

/// Treats a 404 on delete as the object already being gone.
pub(crate) fn ignore_missing_on_delete(
    type_name: &'static str,
    id: &str,
    result: Result<Vec<u8>, ClientError>,
) -> Result<(), ProviderError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            warn!(resource_type = type_name, resource_id = id, "object already deleted");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
