pub mod admission_handler;
pub mod api;
pub mod crd;
pub mod errors;
pub mod models;
pub mod name_transform;
pub mod notification;
pub mod options;
pub mod provider;
pub mod query;
pub mod resource_store;

#[cfg(test)]
mod admission_handler_test;
