//! `keep_extraction_rule`: regex extraction of alert attributes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{Instrument, info, warn};

use super::{
    Attribute, AttributeType, ImportKey, Resource, ResourceContext, ResourceMetadata, Schema,
    UpdateStrategy, ignore_missing_on_delete, require_id,
};
use crate::client::Transport;
use crate::client::decode::{self, Object};
use crate::error::ProviderError;
use crate::lookup::{ListSource, Lookup};

pub const TYPE_NAME: &str = "keep_extraction_rule";
const COLLECTION: &str = "extraction";

// Keep has no `GET /extraction/{id}`.
const LOOKUP: Lookup = Lookup {
    resource: TYPE_NAME,
    direct: None,
    envelope: None,
    list: Some(ListSource::bare(&[COLLECTION])),
    id_field: "id",
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub disabled: bool,
    /// Run before alert formatting instead of after.
    #[serde(default)]
    pub pre: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub attribute: String,
    pub regex: String,
}

pub struct ExtractionRuleResource {
    ctx: ResourceContext,
}

impl ExtractionRuleResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_context(ResourceContext::for_type(transport, TYPE_NAME))
    }

    pub fn with_context(ctx: ResourceContext) -> Self {
        Self { ctx }
    }

    async fn create_rule(&self, plan: &ExtractionRule) -> Result<ExtractionRule, ProviderError> {
        self.validate(plan)?;
        let bytes = self
            .ctx
            .transport()
            .post(&[COLLECTION], &payload(plan))
            .await?;
        let object = decode::parse_object(TYPE_NAME, &bytes)?;
        if decode::id_field(&object, "id").is_none() {
            return Err(ProviderError::decode(TYPE_NAME, "response lacks field 'id'", &bytes));
        }
        let created = decode_rule(&object)?;
        info!(resource_id = ?created.id, name = %created.name, "created extraction rule");
        Ok(created)
    }

    async fn read_rule(&self, id: &str) -> Result<ExtractionRule, ProviderError> {
        let object = LOOKUP.find(self.ctx.transport(), id).await?;
        let mut rule = decode_rule(&object)?;
        rule.id.get_or_insert_with(|| id.to_string());
        Ok(rule)
    }

    async fn update_rule(
        &self,
        state: &ExtractionRule,
        plan: &ExtractionRule,
    ) -> Result<ExtractionRule, ProviderError> {
        self.validate(plan)?;
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        let bytes = self
            .ctx
            .transport()
            .put(&[COLLECTION, id], &payload(plan))
            .await?;
        let object = decode::parse_object(TYPE_NAME, &bytes)?;
        let mut updated = decode_rule(&object)?;
        match updated.id.as_deref() {
            None => updated.id = Some(id.to_string()),
            Some(returned) if returned != id => {
                warn!(resource_id = id, returned_id = returned, "update returned a different id");
            }
            Some(_) => {}
        }
        info!(resource_id = id, "updated extraction rule");
        Ok(updated)
    }

    async fn delete_rule(&self, state: &ExtractionRule) -> Result<(), ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        ignore_missing_on_delete(
            TYPE_NAME,
            id,
            self.ctx.transport().delete(&[COLLECTION, id]).await,
        )?;
        info!(resource_id = id, "deleted extraction rule");
        Ok(())
    }
}

fn payload(rule: &ExtractionRule) -> Value {
    let mut body = Map::new();
    body.insert("name".into(), json!(rule.name));
    if let Some(description) = &rule.description {
        body.insert("description".into(), json!(description));
    }
    body.insert("priority".into(), json!(rule.priority));
    body.insert("disabled".into(), json!(rule.disabled));
    body.insert("pre".into(), json!(rule.pre));
    if let Some(condition) = rule.condition.as_deref().filter(|c| !c.is_empty()) {
        body.insert("condition".into(), json!(condition));
    }
    body.insert("attribute".into(), json!(rule.attribute));
    body.insert("regex".into(), json!(rule.regex));
    Value::Object(body)
}

fn decode_rule(object: &Object) -> Result<ExtractionRule, ProviderError> {
    Ok(ExtractionRule {
        id: decode::id_field(object, "id"),
        name: decode::required_string(TYPE_NAME, object, "name")?,
        description: decode::string_field(object, "description"),
        priority: decode::int_field(object, "priority").unwrap_or_default(),
        disabled: decode::bool_field(object, "disabled").unwrap_or_default(),
        pre: decode::bool_field(object, "pre").unwrap_or_default(),
        condition: decode::string_field(object, "condition").filter(|c| !c.is_empty()),
        attribute: decode::string_field(object, "attribute").unwrap_or_default(),
        regex: decode::string_field(object, "regex").unwrap_or_default(),
    })
}

#[async_trait]
impl Resource for ExtractionRuleResource {
    type Model = ExtractionRule;

    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new(TYPE_NAME, UpdateStrategy::InPlace, ImportKey::Id)
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "Keep extraction rule.",
            vec![
                Attribute::computed("id", AttributeType::String),
                Attribute::required("name", AttributeType::String),
                Attribute::optional("description", AttributeType::String),
                Attribute::optional("priority", AttributeType::Int).with_default(0),
                Attribute::optional("disabled", AttributeType::Bool).with_default(false),
                Attribute::optional("pre", AttributeType::Bool)
                    .with_default(false)
                    .describe("Apply before alert formatting."),
                Attribute::optional("condition", AttributeType::String)
                    .describe("CEL expression selecting the alerts to process."),
                Attribute::required("attribute", AttributeType::String)
                    .describe("Alert attribute the regex is applied to."),
                Attribute::required("regex", AttributeType::String)
                    .describe("Regex with named groups; evaluated by Keep."),
            ],
        )
    }

    fn validate(&self, rule: &ExtractionRule) -> Result<(), ProviderError> {
        for (field, value) in [
            ("name", &rule.name),
            ("attribute", &rule.attribute),
            ("regex", &rule.regex),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::validation(
                    TYPE_NAME,
                    format!("{field} must not be empty"),
                ));
            }
        }
        Ok(())
    }

    async fn create(&self, plan: &ExtractionRule) -> Result<ExtractionRule, ProviderError> {
        self.create_rule(plan)
            .instrument(self.ctx.operation("create"))
            .await
    }

    async fn read(&self, state: &ExtractionRule) -> Result<ExtractionRule, ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        self.read_rule(id)
            .instrument(self.ctx.operation("read"))
            .await
    }

    async fn update(
        &self,
        state: &ExtractionRule,
        plan: &ExtractionRule,
    ) -> Result<ExtractionRule, ProviderError> {
        self.update_rule(state, plan)
            .instrument(self.ctx.operation("update"))
            .await
    }

    async fn delete(&self, state: &ExtractionRule) -> Result<(), ProviderError> {
        self.delete_rule(state)
            .instrument(self.ctx.operation("delete"))
            .await
    }

    async fn import(&self, id: &str) -> Result<ExtractionRule, ProviderError> {
        self.read_rule(id)
            .instrument(self.ctx.operation("import"))
            .await
    }
}
