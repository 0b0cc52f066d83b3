//! Microsoft.Storage accounts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const API_VERSION: &str = "2023-01-01";

/// Create and update share one shape. `location` and `kind` may only be sent
/// on create; updates go out as PATCH without them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<StorageAccountProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub name: String,
    #[serde(default, skip_serializing)]
    pub tier: Option<String>,
}

impl Sku {
    /// `Standard_LRS` from tier `Standard` and replication `LRS`
    pub fn from_parts(tier: &str, replication: &str) -> Self {
        Self {
            name: format!("{}_{}", tier, replication),
            tier: None,
        }
    }

    pub fn parts(&self) -> (String, String) {
        match self.name.split_once('_') {
            Some((tier, replication)) => (tier.to_string(), replication.to_string()),
            None => (self.name.clone(), String::new()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_https_traffic_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_blob_public_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hns_enabled: Option<bool>,
    #[serde(default, skip_serializing)]
    pub primary_endpoints: Option<Endpoints>,
    #[serde(default, skip_serializing)]
    pub primary_location: Option<String>,
    #[serde(default, skip_serializing)]
    pub secondary_location: Option<String>,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub blob: Option<String>,
    pub queue: Option<String>,
    pub table: Option<String>,
    pub file: Option<String>,
    pub web: Option<String>,
    pub dfs: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListKeysResult {
    #[serde(default)]
    pub keys: Vec<StorageAccountKey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountKey {
    pub key_name: String,
    pub value: String,
}

impl ListKeysResult {
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.key_name.eq_ignore_ascii_case(name))
            .map(|k| k.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_names_split_into_tier_and_replication() {
        let sku = Sku::from_parts("Standard", "GRS");
        assert_eq!(sku.name, "Standard_GRS");
        assert_eq!(sku.parts(), ("Standard".to_string(), "GRS".to_string()));
    }

    #[test]
    fn update_body_omits_location() {
        let body = StorageAccount {
            tags: Some(HashMap::new()),
            ..Default::default()
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("location").is_none());
        assert!(json.get("kind").is_none());
    }
}
