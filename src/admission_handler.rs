use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use log::*;
use serde_json::{json, Value};

use crate::api::v1alpha1::{
    Policy, PolicyList, PolicyTemplate, PolicyTemplateList, Rule, RuleList,
};
use crate::errors::Result;
use crate::models::{PolicyManager, PolicyTemplateManager, RuleManager, Stores};
use crate::query::ListQuery;

pub const API_PREFIX: &str = "/kapis/admission.kubesphere.io/v1alpha1";

#[derive(Clone)]
pub struct AdmissionHandler {
    templates: PolicyTemplateManager,
    policies: PolicyManager,
    rules: RuleManager,
}

impl AdmissionHandler {
    pub fn new(stores: &Stores) -> Self {
        Self {
            templates: PolicyTemplateManager::new(stores),
            policies: PolicyManager::new(stores),
            rules: RuleManager::new(stores),
        }
    }

    /// Routes for policy templates, policies and their rules
    pub fn router(self) -> Router {
        Router::new()
            .route(
                &format!("{}/policytemplates", API_PREFIX),
                get(list_policy_templates).post(create_policy_template),
            )
            .route(
                &format!("{}/policytemplates/:template", API_PREFIX),
                get(get_policy_template)
                    .put(update_policy_template)
                    .delete(delete_policy_template),
            )
            .route(
                &format!("{}/policies", API_PREFIX),
                get(list_policies).post(create_policy),
            )
            .route(
                &format!("{}/policies/:policy", API_PREFIX),
                get(get_policy).put(update_policy).delete(delete_policy),
            )
            .route(
                &format!("{}/policies/:policy/rules", API_PREFIX),
                get(list_rules).post(create_rule),
            )
            .route(
                &format!("{}/policies/:policy/rules/:rule", API_PREFIX),
                get(get_rule).put(update_rule).delete(delete_rule),
            )
            .layer(middleware::from_fn(with_logging))
            .with_state(self)
    }
}

// Wrapper that tags each request with an id and logs its outcome
async fn with_logging(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    debug!("Processing admission request {} {} {}", request_id, method, path);
    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        error!("Admission request {}: {} {} -> {}", request_id, method, path, status);
    } else if status.is_client_error() {
        warn!("Admission request {}: {} {} -> {}", request_id, method, path, status);
    } else {
        info!("Admission request {}: {} {} -> {}", request_id, method, path, status);
    }
    response
}

async fn list_policy_templates(
    State(handler): State<AdmissionHandler>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<PolicyTemplateList>> {
    let Query(query) = query?;
    Ok(Json(handler.templates.list(&query)))
}

async fn get_policy_template(
    State(handler): State<AdmissionHandler>,
    Path(template): Path<String>,
) -> Result<Json<PolicyTemplate>> {
    Ok(Json(handler.templates.get(&template)?))
}

async fn create_policy_template(
    State(handler): State<AdmissionHandler>,
    payload: Result<Json<PolicyTemplate>, JsonRejection>,
) -> Result<(StatusCode, Json<PolicyTemplate>)> {
    let Json(template) = payload?;
    let created = handler.templates.create(template).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_policy_template(
    State(handler): State<AdmissionHandler>,
    Path(name): Path<String>,
    payload: Result<Json<PolicyTemplate>, JsonRejection>,
) -> Result<Json<PolicyTemplate>> {
    let Json(template) = payload?;
    Ok(Json(handler.templates.update(&name, template).await?))
}

async fn delete_policy_template(
    State(handler): State<AdmissionHandler>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    handler.templates.delete(&name).await?;
    Ok(Json(json!({})))
}

async fn list_policies(
    State(handler): State<AdmissionHandler>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<PolicyList>> {
    let Query(query) = query?;
    Ok(Json(handler.policies.list(&query)))
}

async fn get_policy(
    State(handler): State<AdmissionHandler>,
    Path(policy): Path<String>,
) -> Result<Json<Policy>> {
    Ok(Json(handler.policies.get(&policy)?))
}

async fn create_policy(
    State(handler): State<AdmissionHandler>,
    payload: Result<Json<Policy>, JsonRejection>,
) -> Result<(StatusCode, Json<Policy>)> {
    let Json(policy) = payload?;
    let created = handler.policies.create(policy).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_policy(
    State(handler): State<AdmissionHandler>,
    Path(name): Path<String>,
    payload: Result<Json<Policy>, JsonRejection>,
) -> Result<Json<Policy>> {
    let Json(policy) = payload?;
    Ok(Json(handler.policies.update(&name, policy).await?))
}

async fn delete_policy(
    State(handler): State<AdmissionHandler>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    handler.policies.delete(&name).await?;
    Ok(Json(json!({})))
}

async fn list_rules(
    State(handler): State<AdmissionHandler>,
    Path(policy): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<RuleList>> {
    let Query(query) = query?;
    Ok(Json(handler.rules.list(&policy, &query)?))
}

async fn get_rule(
    State(handler): State<AdmissionHandler>,
    Path((policy, rule)): Path<(String, String)>,
) -> Result<Json<Rule>> {
    Ok(Json(handler.rules.get(&policy, &rule)?))
}

async fn create_rule(
    State(handler): State<AdmissionHandler>,
    Path(policy): Path<String>,
    payload: Result<Json<Rule>, JsonRejection>,
) -> Result<(StatusCode, Json<Rule>)> {
    let Json(rule) = payload?;
    let created = handler.rules.create(&policy, rule).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_rule(
    State(handler): State<AdmissionHandler>,
    Path((policy, name)): Path<(String, String)>,
    payload: Result<Json<Rule>, JsonRejection>,
) -> Result<Json<Rule>> {
    let Json(rule) = payload?;
    Ok(Json(handler.rules.update(&policy, &name, rule).await?))
}

async fn delete_rule(
    State(handler): State<AdmissionHandler>,
    Path((policy, name)): Path<(String, String)>,
) -> Result<Json<Value>> {
    handler.rules.delete(&policy, &name).await?;
    Ok(Json(json!({})))
}
