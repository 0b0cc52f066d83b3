//! Microsoft.ApiManagement backends

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First version with circuit breakers and load-balanced pools
pub const API_VERSION: &str = "2024-05-01";

pub const BACKEND_TYPE_SINGLE: &str = "Single";
pub const BACKEND_TYPE_POOL: &str = "Pool";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: BackendProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProperties {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub backend_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BackendCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<BackendProxy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<BackendTls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreaker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<BackendPool>,
    /// Holds the Service Fabric cluster settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BackendTypeProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreaker {
    #[serde(default)]
    pub rules: Vec<CircuitBreakerRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_retry_after: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<FailureCondition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reasons: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code_ranges: Option<Vec<StatusCodeRange>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCodeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendPool {
    #[serde(default)]
    pub services: Vec<BackendPoolItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendPoolItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<BackendAuthorization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendAuthorization {
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub scheme: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendProxy {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_certificate_chain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_certificate_name: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTypeProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_fabric_cluster: Option<ServiceFabricCluster>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFabricCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate_id: Option<String>,
    /// ARM spells this with a lower-case `t`
    #[serde(rename = "clientCertificatethumbprint", skip_serializing_if = "Option::is_none")]
    pub client_certificate_thumbprint: Option<String>,
    #[serde(default)]
    pub management_endpoints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_partition_resolution_retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_certificate_thumbprints: Option<Vec<String>>,
    #[serde(rename = "serverX509Names", skip_serializing_if = "Option::is_none")]
    pub server_x509_names: Option<Vec<X509CertificateName>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509CertificateName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_certificate_thumbprint: Option<String>,
}
