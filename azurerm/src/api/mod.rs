//! Azure Resource Manager API client and service models

pub mod analysis_services;
pub mod api_management;
pub mod auth;
pub mod client;
pub mod cosmos;
pub mod dns;
pub mod environment;
pub mod error;
pub mod network;
pub mod poller;
pub mod resources;
pub mod storage;

pub use auth::{AzureCliCredential, ClientSecretCredential, StaticTokenCredential, TokenCredential};
pub use client::{Client, RawResponse, RetryConfig};
pub use environment::Environment;
pub use error::ApiError;
