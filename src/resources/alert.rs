//! `keep_alert`: alerts pushed into Keep as events.
//!
//! Alerts are addressed by fingerprint, not by id. An update is an
//! enrichment: only status, severity, message, description and labels are
//! sent, so every other attribute forces a replacement.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
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
use crate::lookup::Lookup;

pub const TYPE_NAME: &str = "keep_alert";
const COLLECTION: &str = "alerts";

const LOOKUP: Lookup = Lookup {
    resource: TYPE_NAME,
    direct: Some(COLLECTION),
    envelope: None,
    list: None,
    id_field: "fingerprint",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
    Acknowledged,
    Suppressed,
    Pending,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 5] = [
        AlertStatus::Firing,
        AlertStatus::Resolved,
        AlertStatus::Acknowledged,
        AlertStatus::Suppressed,
        AlertStatus::Pending,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Suppressed => "suppressed",
            AlertStatus::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an alert. New alerts default to `critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[default]
    Critical,
    High,
    Warning,
    Info,
    Low,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 5] = [
        AlertSeverity::Critical,
        AlertSeverity::High,
        AlertSeverity::Warning,
        AlertSeverity::Info,
        AlertSeverity::Low,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
            AlertSeverity::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Deduplication key; generated by Keep when not supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// RFC 3339 timestamp of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_received: Option<String>,
}

pub struct AlertResource {
    ctx: ResourceContext,
}

impl AlertResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_context(ResourceContext::for_type(transport, TYPE_NAME))
    }

    pub fn with_context(ctx: ResourceContext) -> Self {
        Self { ctx }
    }

    async fn post_event(&self, plan: &Alert) -> Result<Alert, ProviderError> {
        self.validate(plan)?;
        let bytes = self
            .ctx
            .transport()
            .post(&[COLLECTION, "event"], &event_payload(plan))
            .await?;

        let object = match decode::parse_body(TYPE_NAME, &bytes)? {
            Value::Object(object) => object,
            Value::Array(items) => match items.into_iter().next() {
                Some(Value::Object(object)) => object,
                _ => {
                    return Err(ProviderError::decode(
                        TYPE_NAME,
                        "event response holds no alert",
                        &bytes,
                    ));
                }
            },
            other => {
                return Err(ProviderError::decode(
                    TYPE_NAME,
                    format!("expected an alert object, got {}", decode::kind_of(&other)),
                    &bytes,
                ));
            }
        };
        if decode::string_field(&object, "fingerprint").is_none() {
            return Err(ProviderError::decode(
                TYPE_NAME,
                "response lacks field 'fingerprint'",
                &bytes,
            ));
        }

        let created = decode_alert(&object)?;
        info!(
            fingerprint = ?created.fingerprint,
            status = %created.status,
            severity = %created.severity,
            "posted alert event"
        );
        Ok(created)
    }

    async fn fetch(&self, fingerprint: &str) -> Result<Alert, ProviderError> {
        let object = LOOKUP.find(self.ctx.transport(), fingerprint).await?;
        let mut alert = decode_alert(&object)?;
        alert.fingerprint.get_or_insert_with(|| fingerprint.to_string());
        Ok(alert)
    }

    async fn enrich(&self, state: &Alert, plan: &Alert) -> Result<Alert, ProviderError> {
        self.validate(plan)?;
        let fingerprint = require_id(TYPE_NAME, "fingerprint", state.fingerprint.as_ref())?;
        self.ctx
            .transport()
            .post(&[COLLECTION, "enrich"], &enrich_payload(fingerprint, plan))
            .await?;
        debug!(fingerprint = fingerprint, "enriched alert; reading it back");

        // The enrich endpoint answers with a status document, not the alert.
        let enriched = self.fetch(fingerprint).await?;
        info!(fingerprint = fingerprint, status = %enriched.status, "updated alert");
        Ok(enriched)
    }

    async fn remove(&self, state: &Alert) -> Result<(), ProviderError> {
        let fingerprint = require_id(TYPE_NAME, "fingerprint", state.fingerprint.as_ref())?;
        ignore_missing_on_delete(
            TYPE_NAME,
            fingerprint,
            self.ctx.transport().delete(&[COLLECTION, fingerprint]).await,
        )?;
        info!(fingerprint = fingerprint, "deleted alert");
        Ok(())
    }
}

fn event_payload(alert: &Alert) -> Value {
    let mut body = Map::new();
    body.insert("name".into(), json!(alert.name));
    body.insert("status".into(), json!(alert.status));
    body.insert("severity".into(), json!(alert.severity));
    let last_received = alert
        .last_received
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    body.insert("lastReceived".into(), json!(last_received));

    let optional = [
        ("fingerprint", &alert.fingerprint),
        ("environment", &alert.environment),
        ("service", &alert.service),
        ("message", &alert.message),
        ("description", &alert.description),
        ("url", &alert.url),
        ("image_url", &alert.image_url),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            body.insert(key.into(), json!(value));
        }
    }
    if let Some(source) = &alert.source {
        body.insert("source".into(), json!(source));
    }
    if let Some(labels) = &alert.labels {
        body.insert("labels".into(), json!(labels));
    }
    Value::Object(body)
}

fn enrich_payload(fingerprint: &str, alert: &Alert) -> Value {
    let mut body = Map::new();
    body.insert("fingerprint".into(), json!(fingerprint));
    body.insert("status".into(), json!(alert.status));
    body.insert("severity".into(), json!(alert.severity));
    if let Some(message) = &alert.message {
        body.insert("message".into(), json!(message));
    }
    if let Some(description) = &alert.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(labels) = &alert.labels {
        body.insert("labels".into(), json!(labels));
    }
    Value::Object(body)
}

fn decode_alert(object: &Object) -> Result<Alert, ProviderError> {
    let status = decode::string_field(object, "status").and_then(|raw| {
        AlertStatus::parse(&raw).or_else(|| {
            warn!(status = %raw, "unknown alert status from Keep");
            None
        })
    });
    let severity = decode::string_field(object, "severity").and_then(|raw| {
        AlertSeverity::parse(&raw).or_else(|| {
            warn!(severity = %raw, "unknown alert severity from Keep");
            None
        })
    });

    Ok(Alert {
        id: decode::id_field(object, "id"),
        fingerprint: decode::string_field(object, "fingerprint"),
        name: decode::required_string(TYPE_NAME, object, "name")?,
        status: status.unwrap_or_default(),
        severity: severity.unwrap_or_default(),
        environment: decode::string_field(object, "environment"),
        service: decode::string_field(object, "service"),
        source: decode::string_list(object, "source"),
        message: decode::string_field(object, "message"),
        description: decode::string_field(object, "description"),
        url: decode::string_field(object, "url"),
        image_url: decode::string_field(object, "image_url")
            .or_else(|| decode::string_field(object, "imageUrl")),
        labels: decode::string_map(object, "labels"),
        last_received: decode::string_field(object, "lastReceived")
            .or_else(|| decode::string_field(object, "last_received")),
    })
}

#[async_trait]
impl Resource for AlertResource {
    type Model = Alert;

    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new(TYPE_NAME, UpdateStrategy::Enrich, ImportKey::Fingerprint)
    }

    fn schema(&self) -> Schema {
        let replace = |attr: Attribute| attr.requires_replace();
        Schema::new(
            "Keep alert. Updates are sent as enrichments.",
            vec![
                Attribute::computed("id", AttributeType::String),
                replace(Attribute::optional_computed("fingerprint", AttributeType::String))
                    .describe("Deduplication key; generated by Keep when omitted."),
                replace(Attribute::required("name", AttributeType::String)),
                Attribute::optional("status", AttributeType::String)
                    .with_default(AlertStatus::default().as_str()),
                Attribute::optional("severity", AttributeType::String)
                    .with_default(AlertSeverity::default().as_str()),
                replace(Attribute::optional("environment", AttributeType::String)),
                replace(Attribute::optional("service", AttributeType::String)),
                replace(Attribute::optional("source", AttributeType::StringList)),
                Attribute::optional("message", AttributeType::String),
                Attribute::optional("description", AttributeType::String),
                replace(Attribute::optional("url", AttributeType::String)),
                replace(Attribute::optional("image_url", AttributeType::String)),
                Attribute::optional("labels", AttributeType::StringMap),
                replace(Attribute::optional_computed("last_received", AttributeType::String)),
            ],
        )
    }

    fn validate(&self, alert: &Alert) -> Result<(), ProviderError> {
        if alert.name.trim().is_empty() {
            return Err(ProviderError::validation(TYPE_NAME, "name must not be empty"));
        }
        Ok(())
    }

    async fn create(&self, plan: &Alert) -> Result<Alert, ProviderError> {
        self.post_event(plan)
            .instrument(self.ctx.operation("create"))
            .await
    }

    async fn read(&self, state: &Alert) -> Result<Alert, ProviderError> {
        let fingerprint = require_id(TYPE_NAME, "fingerprint", state.fingerprint.as_ref())?;
        self.fetch(fingerprint)
            .instrument(self.ctx.operation("read"))
            .await
    }

    async fn update(&self, state: &Alert, plan: &Alert) -> Result<Alert, ProviderError> {
        self.enrich(state, plan)
            .instrument(self.ctx.operation("update"))
            .await
    }

    async fn delete(&self, state: &Alert) -> Result<(), ProviderError> {
        self.remove(state)
            .instrument(self.ctx.operation("delete"))
            .await
    }

    async fn import(&self, fingerprint: &str) -> Result<Alert, ProviderError> {
        self.fetch(fingerprint)
            .instrument(self.ctx.operation("import"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            name: "disk full".into(),
            ..Alert::default()
        }
    }

    #[test]
    fn test_defaults() {
        let parsed: Alert = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(parsed.status, AlertStatus::Firing);
        assert_eq!(parsed.severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_event_payload_fills_defaults_and_timestamp() {
        let body = event_payload(&alert());
        assert_eq!(body["status"], json!("firing"));
        assert_eq!(body["severity"], json!("critical"));
        let stamp = body["lastReceived"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert!(body.get("fingerprint").is_none());
        assert!(body.get("labels").is_none());
    }

    #[test]
    fn test_enrich_payload_carries_only_mutable_fields() {
        let mut plan = alert();
        plan.status = AlertStatus::Resolved;
        plan.service = Some("db".into());
        plan.labels = Some(BTreeMap::from([("team".to_string(), "core".to_string())]));
        let body = enrich_payload("fp-1", &plan);
        let mut keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["fingerprint", "labels", "severity", "status"]);
        assert_eq!(body["status"], json!("resolved"));
    }

    #[test]
    fn test_decode_alert_tolerates_unknown_enums() {
        let object = json!({
            "id": "a-1",
            "fingerprint": "fp-1",
            "name": "disk full",
            "status": "RESOLVED",
            "severity": "catastrophic",
            "source": "prometheus",
            "imageUrl": "https://img",
            "lastReceived": "2024-05-01T10:00:00.000Z"
        });
        let decoded = decode_alert(object.as_object().unwrap()).unwrap();
        assert_eq!(decoded.status, AlertStatus::Resolved);
        assert_eq!(decoded.severity, AlertSeverity::Critical);
        assert_eq!(decoded.source, Some(vec!["prometheus".to_string()]));
        assert_eq!(decoded.image_url.as_deref(), Some("https://img"));
        assert_eq!(
            decoded.last_received.as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );
    }
}
