//! Provider data structure passed to resources and data sources

use crate::api::{Client, Environment};

/// Toggles from the provider's `features` block
#[derive(Debug, Clone)]
pub struct Features {
    pub resource_group_prevent_deletion_if_contains_resources: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            resource_group_prevent_deletion_if_contains_resources: true,
        }
    }
}

#[derive(Clone)]
pub struct AzureRmProviderData {
    pub client: Client,
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub environment: Environment,
    pub features: Features,
}

impl AzureRmProviderData {
    pub fn new(client: Client, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
            tenant_id: None,
            client_id: None,
            environment: Environment::default(),
            features: Features::default(),
        }
    }
}
