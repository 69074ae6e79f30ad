use anyhow::{anyhow, Context, Result};
use axum::routing::post;
use axum::{Json, Router};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceConversion, CustomResourceDefinition,
    ServiceReference as WebhookServiceReference, WebhookClientConfig, WebhookConversion,
};
use kube::core::conversion::{ConversionRequest, ConversionResponse, ConversionReview};
use kube::core::crd::merge_crds;
use kube::core::Status;
use kube::CustomResourceExt;
use log::*;
use serde_json::Value;

use super::{v2beta1, v2beta2};

pub const CONVERT_PATH: &str = "/notification/convert";
pub const STORED_VERSION: &str = "v2beta2";

/// Where the apiserver reaches this conversion webhook
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookService {
    pub namespace: String,
    pub name: String,
    pub port: Option<i32>,
}

impl WebhookService {
    /// Points the apiserver at `CONVERT_PATH` on this service
    pub fn conversion(&self) -> CustomResourceConversion {
        CustomResourceConversion {
            strategy: "Webhook".to_string(),
            webhook: Some(WebhookConversion {
                client_config: Some(WebhookClientConfig {
                    service: Some(WebhookServiceReference {
                        namespace: self.namespace.clone(),
                        name: self.name.clone(),
                        path: Some(CONVERT_PATH.to_string()),
                        port: self.port,
                    }),
                    ..Default::default()
                }),
                conversion_review_versions: vec!["v1".to_string()],
            }),
        }
    }
}

/// The `Config` and `Receiver` CRDs with both versions, stored as v2beta2
/// and converted by the webhook behind `service`.
pub fn crds(service: &WebhookService) -> Result<Vec<CustomResourceDefinition>> {
    let mut config = merge_crds(
        vec![v2beta1::Config::crd(), v2beta2::Config::crd()],
        STORED_VERSION,
    )
    .context("Failed to merge Config versions")?;
    let mut receiver = merge_crds(
        vec![v2beta1::Receiver::crd(), v2beta2::Receiver::crd()],
        STORED_VERSION,
    )
    .context("Failed to merge Receiver versions")?;

    config.spec.conversion = Some(service.conversion());
    receiver.spec.conversion = Some(service.conversion());
    Ok(vec![config, receiver])
}

pub fn router() -> Router {
    Router::new().route(CONVERT_PATH, post(convert))
}

async fn convert(Json(review): Json<ConversionReview>) -> Json<ConversionReview> {
    let request = match ConversionRequest::from_review(review) {
        Ok(request) => request,
        Err(err) => {
            warn!("Invalid conversion review: {}", err);
            let status = Status::failure(&err.to_string(), "InvalidRequest");
            return Json(ConversionResponse::invalid(status).into_review());
        }
    };

    let desired = request.desired_api_version.clone();
    let converted: Result<Vec<Value>> = request
        .objects
        .iter()
        .map(|object| convert_object(object, &desired))
        .collect();

    let response = ConversionResponse::for_request(request);
    let response = match converted {
        Ok(objects) => {
            debug!("Converted {} objects to {}", objects.len(), desired);
            response.success(objects)
        }
        Err(err) => {
            error!("Conversion to {} failed: {}", desired, err);
            response.failure(Status::failure(&err.to_string(), "ConversionFailed"))
        }
    };
    Json(response.into_review())
}

/// Converts one notification object to `desired`
pub fn convert_object(object: &Value, desired: &str) -> Result<Value> {
    let api_version = object
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("object has no apiVersion"))?;
    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("object has no kind"))?;

    if api_version == desired {
        return Ok(object.clone());
    }

    let converted = match (kind, api_version, desired) {
        ("Config", v2beta1::API_VERSION, v2beta2::API_VERSION) => {
            let src: v2beta1::Config = serde_json::from_value(object.clone())?;
            serde_json::to_value(v2beta2::Config::from(src))?
        }
        ("Config", v2beta2::API_VERSION, v2beta1::API_VERSION) => {
            let src: v2beta2::Config = serde_json::from_value(object.clone())?;
            serde_json::to_value(v2beta1::Config::from(src))?
        }
        ("Receiver", v2beta1::API_VERSION, v2beta2::API_VERSION) => {
            let src: v2beta1::Receiver = serde_json::from_value(object.clone())?;
            serde_json::to_value(v2beta2::Receiver::from(src))?
        }
        ("Receiver", v2beta2::API_VERSION, v2beta1::API_VERSION) => {
            let src: v2beta2::Receiver = serde_json::from_value(object.clone())?;
            serde_json::to_value(v2beta1::Receiver::from(src))?
        }
        _ => {
            return Err(anyhow!(
                "cannot convert {} from {} to {}",
                kind,
                api_version,
                desired
            ))
        }
    };
    Ok(converted)
}
