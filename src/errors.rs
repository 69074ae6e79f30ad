use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = AdmissionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("provider {0} not found")]
    ProviderNotFound(String),

    #[error("policy template {0} not found")]
    PolicyTemplateNotFound(String),

    #[error("policy {0} not found")]
    PolicyNotFound(String),

    #[error("policy {0} already exists")]
    PolicyAlreadyExists(String),

    #[error("rule {0} not found")]
    RuleNotFound(String),

    #[error("rule {0} already exists")]
    RuleAlreadyExists(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// A 404 from the apiserver, carrying its message
    #[error("{0}")]
    ApiNotFound(String),

    /// A 409 AlreadyExists from the apiserver, carrying its message
    #[error("{0}")]
    ApiAlreadyExists(String),

    /// The object changed since the resourceVersion it was read at
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("kubernetes api error: {0}")]
    Kube(#[source] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdmissionError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        AdmissionError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        AdmissionError::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Whether this is any flavour of "object does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AdmissionError::ProviderNotFound(_)
                | AdmissionError::PolicyTemplateNotFound(_)
                | AdmissionError::PolicyNotFound(_)
                | AdmissionError::RuleNotFound(_)
                | AdmissionError::NotFound { .. }
                | AdmissionError::ApiNotFound(_)
        )
    }

    /// Whether this is any flavour of "object already exists"
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            AdmissionError::PolicyAlreadyExists(_)
                | AdmissionError::RuleAlreadyExists(_)
                | AdmissionError::AlreadyExists { .. }
                | AdmissionError::ApiAlreadyExists(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            return StatusCode::NOT_FOUND;
        }
        if self.is_already_exists() {
            return StatusCode::CONFLICT;
        }
        match self {
            AdmissionError::Conflict(_) => StatusCode::CONFLICT,
            AdmissionError::Invalid(_) | AdmissionError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// The apiserver reports missing objects, duplicate creates and stale
// resourceVersions through ErrorResponse; its message already names the object.
impl From<kube::Error> for AdmissionError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => {
                AdmissionError::ApiNotFound(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                AdmissionError::ApiAlreadyExists(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                AdmissionError::Conflict(resp.message.clone())
            }
            _ => AdmissionError::Kube(err),
        }
    }
}

// Malformed bodies and query strings get the same `{"message"}` body as
// every other client error.
impl From<JsonRejection> for AdmissionError {
    fn from(rejection: JsonRejection) -> Self {
        AdmissionError::Invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for AdmissionError {
    fn from(rejection: QueryRejection) -> Self {
        AdmissionError::Invalid(rejection.body_text())
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn test_status_codes() {
        let test_cases = vec![
            ("provider", AdmissionError::ProviderNotFound("x".into()), 404),
            ("template", AdmissionError::PolicyTemplateNotFound("x".into()), 404),
            ("policy", AdmissionError::PolicyNotFound("x".into()), 404),
            ("rule", AdmissionError::RuleNotFound("x".into()), 404),
            ("generic not found", AdmissionError::not_found("Policy", "x"), 404),
            ("policy exists", AdmissionError::PolicyAlreadyExists("x".into()), 409),
            ("rule exists", AdmissionError::RuleAlreadyExists("x".into()), 409),
            ("generic exists", AdmissionError::already_exists("Rule", "x"), 409),
            ("invalid", AdmissionError::Invalid("bad".into()), 400),
        ];

        for (name, err, expected) in test_cases {
            assert_eq!(err.status_code().as_u16(), expected, "Failed test case: {}", name);
        }
    }

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_kube_api_errors_are_normalised() {
        struct TestCase {
            name: &'static str,
            err: kube::Error,
            not_found: bool,
            already_exists: bool,
            status: StatusCode,
            message: &'static str,
        }

        let test_cases = vec![
            TestCase {
                name: "not found",
                err: api_error(404, "NotFound", "policies.admission.kubesphere.io \"p\" not found"),
                not_found: true,
                already_exists: false,
                status: StatusCode::NOT_FOUND,
                message: "policies.admission.kubesphere.io \"p\" not found",
            },
            TestCase {
                name: "already exists",
                err: api_error(409, "AlreadyExists", "rules.admission.kubesphere.io \"r\" already exists"),
                not_found: false,
                already_exists: true,
                status: StatusCode::CONFLICT,
                message: "rules.admission.kubesphere.io \"r\" already exists",
            },
            TestCase {
                name: "stale resourceVersion",
                err: api_error(
                    409,
                    "Conflict",
                    "Operation cannot be fulfilled on policies.admission.kubesphere.io \"p\": the object has been modified; please apply your changes to the latest version and try again",
                ),
                not_found: false,
                already_exists: false,
                status: StatusCode::CONFLICT,
                message: "conflict: Operation cannot be fulfilled on policies.admission.kubesphere.io \"p\": the object has been modified; please apply your changes to the latest version and try again",
            },
            TestCase {
                name: "forbidden",
                err: api_error(403, "Forbidden", "forbidden"),
                not_found: false,
                already_exists: false,
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "",
            },
        ];

        for tc in test_cases {
            let err = AdmissionError::from(tc.err);
            assert_eq!(err.is_not_found(), tc.not_found, "Failed test case: {}", tc.name);
            assert_eq!(err.is_already_exists(), tc.already_exists, "Failed test case: {}", tc.name);
            assert_eq!(err.status_code(), tc.status, "Failed test case: {}", tc.name);
            if tc.status != StatusCode::INTERNAL_SERVER_ERROR {
                assert_eq!(err.to_string(), tc.message, "Failed test case: {}", tc.name);
            }
        }
    }
}
