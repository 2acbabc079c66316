use std::collections::BTreeMap;

use keep_provider::ProviderError;
use keep_provider::resources::{InstalledProvider, PlanAction, Resource};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

mod test_utils;
use test_utils::{provider_for, sent_bodies};

fn datadog(name: &str) -> InstalledProvider {
    InstalledProvider {
        name: name.to_string(),
        provider_type: "datadog".to_string(),
        config: BTreeMap::from([
            ("api_key".to_string(), "dd-key".to_string()),
            ("app_key".to_string(), "dd-app".to_string()),
        ]),
        ..InstalledProvider::default()
    }
}

#[tokio::test]
async fn test_install_flattens_config_into_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/providers/install"))
        .and(body_partial_json(json!({
            "provider_id": "datadog",
            "provider_name": "dd-prod",
            "provider_type": "datadog",
            "pulling_enabled": true,
            "api_key": "dd-key",
            "app_key": "dd-app"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "datadog",
            "id": "0b1c",
            "details": {
                "name": "dd-prod",
                "authentication": {"api_key": "dd-key", "app_key": "dd-app"}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let installed = provider.providers().create(&datadog("dd-prod")).await.unwrap();

    assert_eq!(installed.id.as_deref(), Some("0b1c"));
    assert_eq!(installed.name, "dd-prod");
    assert_eq!(installed.config, datadog("dd-prod").config);
}

#[tokio::test]
async fn test_type_change_plans_replace_and_never_puts() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = InstalledProvider {
        id: Some("0b1c".to_string()),
        ..datadog("dd-prod")
    };
    let plan = InstalledProvider {
        provider_type: "grafana".to_string(),
        ..datadog("dd-prod")
    };

    assert_eq!(
        provider.providers().plan(&state, &plan).unwrap(),
        PlanAction::Replace
    );
    let err = provider.providers().update(&state, &plan).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidState { .. }));
}

#[tokio::test]
async fn test_update_body_omits_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/providers/0b1c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "0b1c",
            "name": "dd-renamed",
            "type": "datadog",
            "config": {"api_key": "dd-key", "app_key": "dd-app"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = InstalledProvider {
        id: Some("0b1c".to_string()),
        ..datadog("dd-prod")
    };
    let plan = datadog("dd-renamed");
    assert_eq!(
        provider.providers().plan(&state, &plan).unwrap(),
        PlanAction::Update
    );

    let updated = provider.providers().update(&state, &plan).await.unwrap();
    assert_eq!(updated.id.as_deref(), Some("0b1c"));
    assert_eq!(updated.name, "dd-renamed");

    let bodies = sent_bodies(&server, "PUT", "/providers/0b1c").await;
    let body = bodies[0].as_object().unwrap();
    assert!(!body.contains_key("type"));
    assert!(!body.contains_key("provider_type"));
    assert_eq!(body["name"], json!("dd-renamed"));
    assert_eq!(body["config"]["app_key"], json!("dd-app"));
}

#[tokio::test]
async fn test_read_unwraps_provider_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/providers/0b1c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "provider": {
                "id": "0b1c",
                "name": "dd-prod",
                "type": "datadog",
                "installed": true,
                "last_alert_received": "2024-05-01T10:00:00Z"
            }
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = InstalledProvider {
        id: Some("0b1c".to_string()),
        ..datadog("dd-prod")
    };
    let refreshed = provider.providers().read(&state).await.unwrap();

    assert_eq!(refreshed.installed, Some(true));
    assert_eq!(
        refreshed.last_alert_received.as_deref(),
        Some("2024-05-01T10:00:00Z")
    );
    assert!(refreshed.config.is_empty());
}

#[tokio::test]
async fn test_import_falls_back_to_installed_providers_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/providers/9f"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "providers": [{"id": "aa", "type": "slack", "details": {"name": "chat"}}],
            "installed_providers": [
                {"id": "9f", "type": "grafana", "details": {"name": "graf", "authentication": {"token": "t"}}}
            ]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let imported = provider.providers().import("9f").await.unwrap();

    assert_eq!(imported.id.as_deref(), Some("9f"));
    assert_eq!(imported.provider_type, "grafana");
    assert_eq!(imported.name, "graf");
    assert_eq!(imported.config["token"], "t");
}

#[tokio::test]
async fn test_uninstall_tolerates_missing_provider() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/providers/0b1c"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = InstalledProvider {
        id: Some("0b1c".to_string()),
        ..datadog("dd-prod")
    };
    provider.providers().delete(&state).await.unwrap();
}
