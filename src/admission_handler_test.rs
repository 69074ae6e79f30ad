use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::admission_handler::{AdmissionHandler, API_PREFIX};
use crate::models::models_test::{Fixture, REGO};

fn router(fixture: &Fixture) -> Router {
    AdmissionHandler::new(&fixture.stores).router()
}

async fn call(router: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    call_raw(router, method, path, body.map(|body| body.to_string())).await
}

async fn call_raw(
    router: &Router,
    method: Method,
    path: &str,
    body: Option<String>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(format!("{}{}", API_PREFIX, path));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_policy_templates_routes() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, body) = call(&router, Method::GET, "/policytemplates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["items"][0]["name"], "k8s-required-labels");

    let (status, body) = call(&router, Method::GET, "/policytemplates/k8s-required-labels", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targets"][0]["provider"], "gatekeeper");

    let (status, body) = call(&router, Method::GET, "/policytemplates/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "policy template missing not found");

    let template = json!({
        "name": "k8s-allowed-repos",
        "description": "Only allow images from trusted registries",
        "targets": [{
            "target": "admission.k8s.gatekeeper.sh",
            "expression": "package k8sallowedrepos\nviolation[{\"msg\": \"no\"}] { true }",
            "provider": "gatekeeper"
        }]
    });
    let (status, _) = call(&router, Method::POST, "/policytemplates", Some(template.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&router, Method::POST, "/policytemplates", Some(template)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &router,
        Method::GET,
        "/policytemplates?name=allowed&limit=10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["items"][0]["name"], "k8s-allowed-repos");

    let (status, _) = call(&router, Method::DELETE, "/policytemplates/k8s-allowed-repos", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_policy_and_rule_routes() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, body) = call(
        &router,
        Method::POST,
        "/policies",
        Some(json!({"name": "required-labels", "policyTemplate": "k8s-required-labels"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["targets"][0]["expression"], REGO);

    let (status, body) = call(
        &router,
        Method::POST,
        "/policies",
        Some(json!({"name": "other", "policyTemplate": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "policy template missing not found");

    let (status, body) = call(
        &router,
        Method::POST,
        "/policies/required-labels/rules",
        Some(json!({
            "name": "ns-must-have-owner",
            "match": {"kinds": [{"apiGroups": [""], "kinds": ["Namespace"]}]},
            "parameters": {"labels": ["owner"]},
            "enforcementAction": "warn"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["policy"], "required-labels");
    assert_eq!(body["enforcementAction"], "warn");

    let (status, body) = call(&router, Method::GET, "/policies/required-labels/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 1);

    let (status, body) = call(
        &router,
        Method::PUT,
        "/policies/required-labels/rules/ns-must-have-owner",
        Some(json!({"name": "ns-must-have-owner", "enforcementAction": "dryrun"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enforcementAction"], "dryrun");

    let (status, _) = call(&router, Method::GET, "/policies/missing/rules", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &router,
        Method::GET,
        "/policies/required-labels/rules/missing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&router, Method::DELETE, "/policies/required-labels", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) = call(&router, Method::GET, "/policies/required-labels", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call(&router, Method::GET, "/policies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 0);
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, body) = call(
        &router,
        Method::POST,
        "/policies",
        Some(json!({"name": "Required_Labels", "policyTemplate": "k8s-required-labels"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("invalid: name Required_Labels"));
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    struct TestCase {
        name: &'static str,
        method: Method,
        path: &'static str,
        body: Option<&'static str>,
    }

    let test_cases = vec![
        TestCase {
            name: "truncated policy body",
            method: Method::POST,
            path: "/policies",
            body: Some(r#"{"name": "required-labels", "policyTemplate": "#),
        },
        TestCase {
            name: "wrong field type",
            method: Method::PUT,
            path: "/policytemplates/k8s-required-labels",
            body: Some(r#"{"name": "k8s-required-labels", "targets": "gatekeeper"}"#),
        },
        TestCase {
            name: "unknown sort field",
            method: Method::GET,
            path: "/policies?sortBy=bogus",
            body: None,
        },
        TestCase {
            name: "page is not a number",
            method: Method::GET,
            path: "/policytemplates?page=first",
            body: None,
        },
    ];

    let fixture = Fixture::new();
    let router = router(&fixture);
    for tc in test_cases {
        let (status, body) =
            call_raw(&router, tc.method, tc.path, tc.body.map(str::to_string)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "Failed test case: {}", tc.name);
        let message = body["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("invalid: "), "Failed test case: {} ({})", tc.name, body);
    }
    assert!(fixture.gatekeeper.ops.lock().is_empty());
}

#[tokio::test]
async fn test_page_zero_lists_the_first_page() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, body) = call(&router, Method::GET, "/policytemplates?page=0&limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["items"][0]["name"], "k8s-required-labels");
}
