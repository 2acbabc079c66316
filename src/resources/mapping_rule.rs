//! `keep_mapping_rule`: enrichment lookup tables.
//!
//! Keep has no update endpoint for mapping rules, so an update deletes the
//! rule and creates it again. The server assigns a fresh identifier each
//! time; callers must take the identifier from the returned model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, info, warn};

use super::{
    Attribute, AttributeType, ImportKey, Resource, ResourceContext, ResourceMetadata, Schema,
    UpdateStrategy, ignore_missing_on_delete, require_id,
};
use crate::client::Transport;
use crate::client::decode::{self, Object};
use crate::error::ProviderError;
use crate::lookup::{ListSource, Lookup};
use crate::normalization;

pub const TYPE_NAME: &str = "keep_mapping_rule";
const COLLECTION: &str = "mapping";

const LOOKUP: Lookup = Lookup {
    resource: TYPE_NAME,
    direct: Some(COLLECTION),
    envelope: None,
    list: Some(ListSource::bare(&[COLLECTION])),
    id_field: "id",
};

/// One `key == value` condition. Serialized as `[key, value]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Matcher {
    pub key: String,
    pub value: String,
}

impl Matcher {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String)> for Matcher {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

impl From<Matcher> for (String, String) {
    fn from(matcher: Matcher) -> Self {
        (matcher.key, matcher.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    /// Accepted for compatibility; Keep ignores it.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchers: Option<Vec<Matcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<String>,
}

impl MappingRule {
    /// CSV text that carries data, if any.
    fn csv(&self) -> Option<&str> {
        self.csv_data
            .as_deref()
            .filter(|csv| !normalization::is_blank(csv))
    }
}

pub struct MappingRuleResource {
    ctx: ResourceContext,
}

impl MappingRuleResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_context(ResourceContext::for_type(transport, TYPE_NAME))
    }

    pub fn with_context(ctx: ResourceContext) -> Self {
        Self { ctx }
    }

    fn payload(&self, rule: &MappingRule) -> Result<Value, ProviderError> {
        let mut body = Map::new();
        body.insert("name".into(), json!(rule.name));
        if let Some(description) = &rule.description {
            body.insert("description".into(), json!(description));
        }
        body.insert("priority".into(), json!(rule.priority));
        if let Some(matchers) = &rule.matchers {
            body.insert("matchers".into(), json!(matchers));
        }
        if let Some(csv) = rule.csv() {
            let rows = normalization::parse(csv).map_err(|err| ProviderError::csv(TYPE_NAME, err))?;
            debug!(csv = %normalization::preview(csv), rows = rows.len(), "attaching csv rows");
            body.insert("csv_data".into(), json!(csv));
            body.insert("type".into(), json!("csv"));
            body.insert("rows".into(), json!(rows));
        }
        Ok(Value::Object(body))
    }

    async fn post(&self, rule: &MappingRule) -> Result<MappingRule, ProviderError> {
        let body = self.payload(rule)?;
        let bytes = self.ctx.transport().post(&[COLLECTION], &body).await?;
        let object = decode::parse_object(TYPE_NAME, &bytes)?;
        if decode::id_field(&object, "id").is_none() {
            return Err(ProviderError::decode(TYPE_NAME, "response lacks field 'id'", &bytes));
        }
        let mut created = decode_rule(&object, rule.csv_data.as_ref())?;
        created.disabled = rule.disabled;
        Ok(created)
    }

    async fn create_rule(&self, plan: &MappingRule) -> Result<MappingRule, ProviderError> {
        self.validate(plan)?;
        let created = self.post(plan).await?;
        info!(resource_id = ?created.id, name = %created.name, "created mapping rule");
        Ok(created)
    }

    async fn read_rule(&self, state: &MappingRule) -> Result<MappingRule, ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        let object = LOOKUP.find(self.ctx.transport(), id).await?;
        let mut rule = decode_rule(&object, state.csv_data.as_ref())?;
        rule.id.get_or_insert_with(|| id.to_string());
        // Keep neither stores nor echoes the flag.
        rule.disabled = state.disabled;
        Ok(rule)
    }

    async fn recreate_rule(
        &self,
        state: &MappingRule,
        plan: &MappingRule,
    ) -> Result<MappingRule, ProviderError> {
        self.validate(plan)?;
        let old_id = require_id(TYPE_NAME, "id", state.id.as_ref())?;

        ignore_missing_on_delete(
            TYPE_NAME,
            old_id,
            self.ctx.transport().delete(&[COLLECTION, old_id]).await,
        )?;
        debug!(resource_id = old_id, "deleted mapping rule before recreating it");

        let created = self.post(plan).await.inspect_err(|err| {
            warn!(
                resource_id = old_id,
                error = %err,
                "mapping rule was deleted but could not be recreated"
            );
        })?;
        info!(old_id = old_id, new_id = ?created.id, "recreated mapping rule");
        Ok(created)
    }

    async fn delete_rule(&self, state: &MappingRule) -> Result<(), ProviderError> {
        let id = require_id(TYPE_NAME, "id", state.id.as_ref())?;
        ignore_missing_on_delete(
            TYPE_NAME,
            id,
            self.ctx.transport().delete(&[COLLECTION, id]).await,
        )?;
        info!(resource_id = id, "deleted mapping rule");
        Ok(())
    }

    async fn import_rule(&self, id: &str) -> Result<MappingRule, ProviderError> {
        let object = LOOKUP.find(self.ctx.transport(), id).await?;
        let mut rule = decode_rule(&object, None)?;
        rule.id.get_or_insert_with(|| id.to_string());
        rule.disabled = false;
        Ok(rule)
    }
}

/// Builds the model from a server object. `prior_csv` is kept when the
/// server omits `csv_data` entirely.
fn decode_rule(object: &Object, prior_csv: Option<&String>) -> Result<MappingRule, ProviderError> {
    let csv_data = match object.get("csv_data") {
        None => prior_csv.cloned(),
        Some(value) => decode::value_to_string(value)
            .filter(|csv| !normalization::is_blank(csv))
            .map(|csv| match prior_csv {
                Some(prior) if normalization::equivalent(prior, &csv) => prior.clone(),
                _ => csv,
            }),
    };

    Ok(MappingRule {
        id: decode::id_field(object, "id"),
        name: decode::required_string(TYPE_NAME, object, "name")?,
        description: decode::string_field(object, "description"),
        priority: decode::int_field(object, "priority").unwrap_or_default(),
        disabled: decode::bool_field(object, "disabled").unwrap_or_default(),
        matchers: decode_matchers(object.get("matchers")),
        csv_data,
    })
}

/// Accepts `[[key, value], ...]` or `{key: value, ...}`.
fn decode_matchers(value: Option<&Value>) -> Option<Vec<Matcher>> {
    let matchers: Vec<Matcher> = match value? {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.as_array().map(Vec::as_slice) {
                Some([key, value]) => Some(Matcher::new(
                    decode::value_to_string(key)?,
                    decode::value_to_string(value).unwrap_or_default(),
                )),
                _ => {
                    warn!(kind = decode::kind_of(item), "skipping matcher that is not a [key, value] pair");
                    None
                }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                Matcher::new(key.clone(), decode::value_to_string(value).unwrap_or_default())
            })
            .collect(),
        Value::Null => return None,
        other => {
            warn!(kind = decode::kind_of(other), "ignoring matchers with unexpected shape");
            return None;
        }
    };
    (!matchers.is_empty()).then_some(matchers)
}

/// An absent matcher list and an empty one mean the same thing to Keep.
fn is_empty_list(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl Resource for MappingRuleResource {
    type Model = MappingRule;

    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new(TYPE_NAME, UpdateStrategy::Recreate, ImportKey::Id)
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "Keep mapping rule. Every update deletes and recreates the rule, which changes its id.",
            vec![
                Attribute::computed("id", AttributeType::String)
                    .describe("Server-assigned identifier; changes on every update."),
                Attribute::required("name", AttributeType::String),
                Attribute::optional("description", AttributeType::String),
                Attribute::optional("priority", AttributeType::Int)
                    .with_default(0)
                    .describe("Lower values take precedence."),
                Attribute::optional("disabled", AttributeType::Bool)
                    .with_default(false)
                    .describe("Ignored by Keep."),
                Attribute::optional("matchers", AttributeType::PairList)
                    .describe("Alert attributes to match, as [key, value] pairs."),
                Attribute::optional("csv_data", AttributeType::String)
                    .describe("CSV lookup table; the first line is the header."),
            ],
        )
    }

    fn validate(&self, rule: &MappingRule) -> Result<(), ProviderError> {
        if rule.name.trim().is_empty() {
            return Err(ProviderError::validation(TYPE_NAME, "name must not be empty"));
        }
        if let Some(csv) = &rule.csv_data {
            normalization::parse(csv).map_err(|err| ProviderError::csv(TYPE_NAME, err))?;
        }
        Ok(())
    }

    fn attribute_equal(&self, name: &str, prior: &Value, desired: &Value) -> bool {
        match name {
            "csv_data" => match (prior.as_str(), desired.as_str()) {
                (Some(prior), Some(desired)) => normalization::equivalent(prior, desired),
                _ => prior == desired,
            },
            "matchers" => (is_empty_list(prior) && is_empty_list(desired)) || prior == desired,
            _ => prior == desired,
        }
    }

    async fn create(&self, plan: &MappingRule) -> Result<MappingRule, ProviderError> {
        self.create_rule(plan)
            .instrument(self.ctx.operation("create"))
            .await
    }

    async fn read(&self, state: &MappingRule) -> Result<MappingRule, ProviderError> {
        self.read_rule(state)
            .instrument(self.ctx.operation("read"))
            .await
    }

    async fn update(
        &self,
        state: &MappingRule,
        plan: &MappingRule,
    ) -> Result<MappingRule, ProviderError> {
        self.recreate_rule(state, plan)
            .instrument(self.ctx.operation("update"))
            .await
    }

    async fn delete(&self, state: &MappingRule) -> Result<(), ProviderError> {
        self.delete_rule(state)
            .instrument(self.ctx.operation("delete"))
            .await
    }

    async fn import(&self, id: &str) -> Result<MappingRule, ProviderError> {
        self.import_rule(id)
            .instrument(self.ctx.operation("import"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Object {
        match value {
            Value::Object(o) => o,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_matcher_serializes_as_pair() {
        let encoded = serde_json::to_value(vec![Matcher::new("service", "api")]).unwrap();
        assert_eq!(encoded, json!([["service", "api"]]));
        let decoded: Vec<Matcher> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded[0].key, "service");
    }

    #[test]
    fn test_decode_matchers_from_both_shapes() {
        let pairs = decode_matchers(Some(&json!([["env", "prod"], ["tier", 1.0], ["bad"]])));
        assert_eq!(
            pairs,
            Some(vec![Matcher::new("env", "prod"), Matcher::new("tier", "1")])
        );

        let map = decode_matchers(Some(&json!({"env": "prod"})));
        assert_eq!(map, Some(vec![Matcher::new("env", "prod")]));

        assert_eq!(decode_matchers(Some(&json!([]))), None);
        assert_eq!(decode_matchers(None), None);
    }

    #[test]
    fn test_decode_rule_with_float_id_and_string_disabled() {
        let rule = decode_rule(
            &object(json!({
                "id": 12.0,
                "name": "owners",
                "priority": 3.0,
                "disabled": "false",
                "csv_data": "a,b\r\n1,2\r\n"
            })),
            None,
        )
        .unwrap();
        assert_eq!(rule.id.as_deref(), Some("12"));
        assert_eq!(rule.priority, 3);
        assert!(!rule.disabled);
        assert_eq!(rule.csv_data.as_deref(), Some("a,b\r\n1,2\r\n"));
    }

    #[test]
    fn test_decode_rule_csv_rules() {
        let prior = "a,b\n1,2".to_string();

        let omitted = decode_rule(&object(json!({"id": "1", "name": "r"})), Some(&prior)).unwrap();
        assert_eq!(omitted.csv_data, Some(prior.clone()));

        let equivalent = decode_rule(
            &object(json!({"id": "1", "name": "r", "csv_data": "a,b\r\n1,2\r\n"})),
            Some(&prior),
        )
        .unwrap();
        assert_eq!(equivalent.csv_data, Some(prior.clone()));

        let emptied = decode_rule(
            &object(json!({"id": "1", "name": "r", "csv_data": "  "})),
            Some(&prior),
        )
        .unwrap();
        assert_eq!(emptied.csv_data, None);

        let changed = decode_rule(
            &object(json!({"id": "1", "name": "r", "csv_data": "a,b\n9,9"})),
            Some(&prior),
        )
        .unwrap();
        assert_eq!(changed.csv_data.as_deref(), Some("a,b\n9,9"));
    }

    fn resource() -> MappingRuleResource {
        let transport = crate::client::HttpTransport::new(
            url::Url::parse("http://localhost:8080").unwrap(),
            None,
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        MappingRuleResource::new(Arc::new(transport))
    }

    #[test]
    fn test_validate_rejects_blank_csv() {
        let rule = MappingRule {
            name: "owners".into(),
            csv_data: Some("  \n ".into()),
            ..MappingRule::default()
        };
        let err = resource().validate(&rule).unwrap_err();
        assert!(matches!(err, ProviderError::Validation { .. }));
        assert!(err.to_string().contains("no header row"));
    }

    #[test]
    fn test_empty_matchers_plan_like_absent() {
        let resource = resource();
        let prior = MappingRule {
            id: Some("1".into()),
            name: "owners".into(),
            ..MappingRule::default()
        };
        let desired = MappingRule {
            matchers: Some(Vec::new()),
            ..prior.clone()
        };
        assert_eq!(
            resource.plan(&prior, &desired).unwrap(),
            crate::resources::PlanAction::NoOp
        );

        let matched = MappingRule {
            matchers: Some(vec![Matcher::new("env", "prod")]),
            ..prior.clone()
        };
        assert_eq!(
            resource.plan(&prior, &matched).unwrap(),
            crate::resources::PlanAction::Update
        );
    }

    #[test]
    fn test_decode_rule_requires_name() {
        let err = decode_rule(&object(json!({"id": "1"})), None).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }
}
