//! Microsoft.DocumentDB MongoDB collections and their throughput

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const API_VERSION: &str = "2023-04-15";

/// Index key that carries the collection-wide TTL
pub const TTL_INDEX_KEY: &str = "_ts";

/// Index ARM creates on every collection
pub const ID_INDEX_KEY: &str = "_id";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoCollection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: MongoCollectionProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoCollectionProperties {
    pub resource: MongoCollectionResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<CreateUpdateOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoCollectionResource {
    pub id: String,
    /// Shard key paths to their kind, always `Hash`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<MongoIndex>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytical_storage_ttl: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongoIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<MongoIndexKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<MongoIndexOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongoIndexKeys {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoIndexOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

impl MongoIndex {
    pub fn keys(&self) -> &[String] {
        self.key.as_ref().map(|k| k.keys.as_slice()).unwrap_or(&[])
    }

    pub fn is_single(&self, key: &str) -> bool {
        matches!(self.keys(), [only] if only == key)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale_settings: Option<AutoscaleSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleSettings {
    pub max_throughput: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThroughputSettings {
    #[serde(default)]
    pub properties: ThroughputSettingsProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThroughputSettingsProperties {
    pub resource: ThroughputResource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<i64>,
    #[serde(rename = "autoscaleSettings", skip_serializing_if = "Option::is_none")]
    pub autoscale_settings: Option<AutoscaleSettings>,
    #[serde(default, skip_serializing)]
    pub minimum_throughput: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_collection_with_system_fields() {
        let body = json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/a/mongodbDatabases/d/collections/c",
            "name": "c",
            "properties": {
                "resource": {
                    "id": "c",
                    "shardKey": {"region": "Hash"},
                    "indexes": [
                        {"key": {"keys": ["_id"]}},
                        {"key": {"keys": ["_ts"]}, "options": {"expireAfterSeconds": 3600}}
                    ],
                    "_rid": "abc",
                    "_ts": 1700000000
                }
            }
        });
        let collection: MongoCollection = serde_json::from_value(body).unwrap();
        let indexes = collection.properties.resource.indexes.unwrap();
        assert!(indexes[0].is_single(ID_INDEX_KEY));
        assert_eq!(
            indexes[1].options.as_ref().and_then(|o| o.expire_after_seconds),
            Some(3600)
        );
    }
}
