use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use kube::api::ObjectMeta;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::types::Credential;
use super::{convert_object, crds, router, v2beta1, v2beta2, WebhookService, CONVERT_PATH};

fn metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        resource_version: Some("42".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_receiver_converts_up() {
    let mut receiver = v2beta1::Receiver::new(
        "global-email",
        v2beta1::ReceiverSpec {
            email: Some(v2beta1::EmailReceiver {
                enabled: Some(true),
                to: vec!["ops@example.com".to_string()],
                email_config_selector: None,
            }),
            ..Default::default()
        },
    );
    receiver.metadata = metadata("global-email");

    let converted = v2beta2::Receiver::from(receiver);
    assert_eq!(converted.metadata, metadata("global-email"));
    let email = converted.spec.email.unwrap();
    assert_eq!(email.to, vec!["ops@example.com".to_string()]);
    assert_eq!(email.enabled, Some(true));
    assert_eq!(email.alert_selector, None);
    assert_eq!(email.template, None);
    assert!(converted.spec.dingtalk.is_none());
    assert!(converted.spec.feishu.is_none());
}

#[test]
fn test_receiver_converts_down() {
    let receiver = v2beta2::Receiver::new(
        "chatops",
        v2beta2::ReceiverSpec {
            dingtalk: Some(v2beta2::DingTalkReceiver {
                chatbot: Some(v2beta2::DingTalkChatBot {
                    webhook: Credential {
                        value: Some("https://oapi.dingtalk.com/robot/send".to_string()),
                        value_from: None,
                    },
                    keywords: vec!["kubesphere".to_string()],
                    at_all: Some(true),
                    ..Default::default()
                }),
                tmpl_type: Some("markdown".to_string()),
                ..Default::default()
            }),
            feishu: Some(v2beta2::FeishuReceiver {
                user: vec!["ou_1".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        },
    );

    let converted = v2beta1::Receiver::from(receiver);
    let chatbot = converted.spec.dingtalk.unwrap().chatbot.unwrap();
    assert_eq!(chatbot.keywords, vec!["kubesphere".to_string()]);
    assert_eq!(
        chatbot.webhook.value.as_deref(),
        Some("https://oapi.dingtalk.com/robot/send")
    );
    assert!(converted.spec.email.is_none());
}

#[test]
fn test_config_round_trip_keeps_shared_fields() {
    let config = v2beta1::Config::new(
        "default-wechat",
        v2beta1::ConfigSpec {
            wechat: Some(v2beta1::WechatConfig {
                wechat_api_corp_id: "corp".to_string(),
                wechat_api_agent_id: "1000002".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    );

    let back = v2beta1::Config::from(v2beta2::Config::from(config.clone()));
    assert_eq!(back, config);
}

#[test]
fn test_convert_object() {
    let object = json!({
        "apiVersion": "notification.kubesphere.io/v2beta1",
        "kind": "Config",
        "metadata": {"name": "default-slack"},
        "spec": {"slack": {"slackTokenSecret": {"value": "xoxb"}}}
    });

    struct TestCase {
        name: &'static str,
        object: Value,
        desired: &'static str,
        want_api_version: Option<&'static str>,
    }

    let mut unknown = object.clone();
    unknown["kind"] = json!("Router");
    let mut no_version = object.clone();
    no_version.as_object_mut().unwrap().remove("apiVersion");

    let cases = vec![
        TestCase {
            name: "up",
            object: object.clone(),
            desired: v2beta2::API_VERSION,
            want_api_version: Some(v2beta2::API_VERSION),
        },
        TestCase {
            name: "same version",
            object: object.clone(),
            desired: v2beta1::API_VERSION,
            want_api_version: Some(v2beta1::API_VERSION),
        },
        TestCase {
            name: "unknown version",
            object: object.clone(),
            desired: "notification.kubesphere.io/v1",
            want_api_version: None,
        },
        TestCase {
            name: "unknown kind",
            object: unknown,
            desired: v2beta2::API_VERSION,
            want_api_version: None,
        },
        TestCase {
            name: "missing apiVersion",
            object: no_version,
            desired: v2beta2::API_VERSION,
            want_api_version: None,
        },
    ];

    for case in cases {
        let result = convert_object(&case.object, case.desired);
        match case.want_api_version {
            Some(want) => {
                let converted = result.unwrap_or_else(|e| panic!("{}: {}", case.name, e));
                assert_eq!(converted["apiVersion"], want, "{}", case.name);
                assert_eq!(converted["metadata"]["name"], "default-slack", "{}", case.name);
                assert_eq!(
                    converted["spec"]["slack"]["slackTokenSecret"]["value"],
                    "xoxb",
                    "{}",
                    case.name
                );
            }
            None => assert!(result.is_err(), "{}: expected an error", case.name),
        }
    }
}

async fn review(body: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri(CONVERT_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_conversion_review() {
    let body = review(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "desiredAPIVersion": "notification.kubesphere.io/v2beta2",
            "objects": [{
                "apiVersion": "notification.kubesphere.io/v2beta1",
                "kind": "Receiver",
                "metadata": {"name": "global-webhook"},
                "spec": {"webhook": {"url": "http://alerts.example.com/hook"}}
            }]
        }
    }))
    .await;

    let response = &body["response"];
    assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(response["result"]["status"], "Success");
    let converted = &response["convertedObjects"][0];
    assert_eq!(converted["apiVersion"], "notification.kubesphere.io/v2beta2");
    assert_eq!(converted["kind"], "Receiver");
    assert_eq!(converted["spec"]["webhook"]["url"], "http://alerts.example.com/hook");
}

#[tokio::test]
async fn test_conversion_review_failure() {
    let body = review(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "b1a4c2f0-0000-4000-8000-000000000001",
            "desiredAPIVersion": "notification.kubesphere.io/v2beta2",
            "objects": [{
                "apiVersion": "notification.kubesphere.io/v1alpha1",
                "kind": "Receiver",
                "metadata": {"name": "legacy"}
            }]
        }
    }))
    .await;

    let response = &body["response"];
    assert_eq!(response["uid"], "b1a4c2f0-0000-4000-8000-000000000001");
    assert_eq!(response["result"]["status"], "Failure");
    assert!(response["result"]["message"]
        .as_str()
        .unwrap()
        .starts_with("cannot convert Receiver"));
}

#[test]
fn test_crds_convert_through_the_webhook() {
    let service = WebhookService {
        namespace: "kubesphere-monitoring-system".to_string(),
        name: "notification-manager-webhook".to_string(),
        port: Some(443),
    };
    let crds = crds(&service).unwrap();

    let names: Vec<&str> = crds
        .iter()
        .map(|crd| crd.metadata.name.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(
        names,
        vec![
            "configs.notification.kubesphere.io",
            "receivers.notification.kubesphere.io"
        ]
    );

    for crd in &crds {
        let name = crd.metadata.name.clone().unwrap_or_default();
        let versions: Vec<(&str, bool)> = crd
            .spec
            .versions
            .iter()
            .map(|v| (v.name.as_str(), v.storage))
            .collect();
        assert_eq!(versions, vec![("v2beta1", false), ("v2beta2", true)], "{}", name);

        let conversion = crd.spec.conversion.as_ref().unwrap();
        assert_eq!(conversion.strategy, "Webhook", "{}", name);
        let webhook = conversion.webhook.as_ref().unwrap();
        assert_eq!(webhook.conversion_review_versions, vec!["v1"], "{}", name);
        let reference = webhook
            .client_config
            .as_ref()
            .and_then(|config| config.service.as_ref())
            .unwrap();
        assert_eq!(reference.namespace, "kubesphere-monitoring-system", "{}", name);
        assert_eq!(reference.name, "notification-manager-webhook", "{}", name);
        assert_eq!(reference.path.as_deref(), Some(CONVERT_PATH), "{}", name);
        assert_eq!(reference.port, Some(443), "{}", name);
    }
}
