//! Microsoft.AnalysisServices servers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const API_VERSION: &str = "2017-08-01";

/// Shape of both the PUT body and the PATCH body. `location` is only sent on create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<ServerSku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: ServerProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSku {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_administrators: Option<ServerAdministrators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_blob_container_uri: Option<String>,
    #[serde(rename = "ipV4FirewallSettings", skip_serializing_if = "Option::is_none")]
    pub ipv4_firewall_settings: Option<FirewallSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub querypool_connection_mode: Option<String>,
    #[serde(default, skip_serializing)]
    pub server_full_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub state: Option<String>,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerAdministrators {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallSettings {
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(rename = "enablePowerBIService", skip_serializing_if = "Option::is_none")]
    pub enable_power_bi_service: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub firewall_rule_name: String,
    pub range_start: String,
    pub range_end: String,
}
