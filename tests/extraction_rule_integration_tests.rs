use keep_provider::ProviderError;
use keep_provider::resources::{ExtractionRule, Resource};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

mod test_utils;
use test_utils::{provider_for, sent_bodies};

fn rule() -> ExtractionRule {
    ExtractionRule {
        name: "r1".to_string(),
        attribute: "service".to_string(),
        regex: "(?P<team>[a-z]+)-(?P<svc>.*)".to_string(),
        priority: 5,
        ..ExtractionRule::default()
    }
}

fn stored(id: u64, regex: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "r1",
        "priority": 5,
        "disabled": false,
        "pre": false,
        "condition": null,
        "attribute": "service",
        "regex": regex
    })
}

#[tokio::test]
async fn test_create_applies_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extraction"))
        .and(body_partial_json(json!({
            "name": "r1",
            "attribute": "service",
            "priority": 5,
            "disabled": false,
            "pre": false
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stored(11, "(?P<team>[a-z]+)-(?P<svc>.*)")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let created = provider.extraction_rules().create(&rule()).await.unwrap();

    assert_eq!(created.id.as_deref(), Some("11"));
    assert!(!created.disabled);
    assert!(!created.pre);
    assert_eq!(created.priority, 5);
    assert_eq!(created.condition, None);

    let bodies = sent_bodies(&server, "POST", "/extraction").await;
    assert!(bodies[0].get("condition").is_none());
}

#[tokio::test]
async fn test_update_keeps_id_stable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/extraction/11"))
        .and(body_partial_json(json!({"regex": "(?P<svc>.*)"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored(11, "(?P<svc>.*)")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = ExtractionRule {
        id: Some("11".to_string()),
        ..rule()
    };
    let plan = ExtractionRule {
        regex: "(?P<svc>.*)".to_string(),
        ..rule()
    };
    let updated = provider
        .extraction_rules()
        .update(&state, &plan)
        .await
        .unwrap();

    assert_eq!(updated.id.as_deref(), Some("11"));
    assert_eq!(updated.regex, "(?P<svc>.*)");
}

#[tokio::test]
async fn test_read_scans_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extraction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            stored(10, "x"),
            stored(11, "(?P<svc>.*)")
        ])))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let state = ExtractionRule {
        id: Some("11".to_string()),
        ..rule()
    };
    let refreshed = provider.extraction_rules().read(&state).await.unwrap();
    assert_eq!(refreshed.regex, "(?P<svc>.*)");

    let err = provider.extraction_rules().import("12").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotFound { .. }));
}

#[tokio::test]
async fn test_create_without_id_in_response_surfaces_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extraction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "r1"})))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider.extraction_rules().create(&rule()).await.unwrap_err();

    assert!(matches!(err, ProviderError::Decode { .. }));
    assert!(err.raw_body().unwrap().contains("\"name\":\"r1\""));
}

#[tokio::test]
async fn test_empty_regex_is_rejected_locally() {
    let server = MockServer::start().await;
    let provider = provider_for(&server);

    let invalid = ExtractionRule {
        regex: "  ".to_string(),
        ..rule()
    };
    let err = provider.extraction_rules().create(&invalid).await.unwrap_err();

    assert!(matches!(err, ProviderError::Validation { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}
