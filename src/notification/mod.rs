//! notification-manager `Config` and `Receiver` resources and the
//! conversion webhook between their versions.

mod conversion;
pub mod types;
pub mod v2beta1;
pub mod v2beta2;
pub mod webhook;

#[cfg(test)]
mod conversion_test;

pub use webhook::{convert_object, crds, router, WebhookService, CONVERT_PATH};
