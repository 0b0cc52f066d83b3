//! `azurerm_storage_account`
//!
//! Created with PUT, updated with PATCH: `location` and the hierarchical
//! namespace flag are fixed once the account exists, and `kind` only moves
//! from Storage to StorageV2 in place. Access
//! keys come from the `listKeys` action and are refreshed on every read.

use super::required;
use crate::api::storage::{self as api, Endpoints, ListKeysResult, Sku, StorageAccount, StorageAccountProperties};
use crate::arm::{ArmResource, ResourceError, UpdateMethod};
use crate::helpers::timeouts::{Operation, Timeouts};
use crate::helpers::values::{self, Attributes};
use crate::helpers::{location, schema, tags};
use crate::locks::LockName;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::StorageAccountId;
use crate::validate;
use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplaceIf, UseStateForUnknown};
use tfplug::schema::PlanModifierRequest;
use tfplug::validator::OneOfValidator;
use tfplug::{AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, Schema, SchemaBuilder};

const LOCK_KIND: &str = "azurerm_storage_account";

const ACCOUNT_KINDS: &[&str] = &["Storage", "StorageV2", "BlobStorage", "FileStorage", "BlockBlobStorage"];
const REPLICATION_TYPES: &[&str] = &["LRS", "GRS", "RAGRS", "ZRS", "GZRS", "RAGZRS"];

const ENDPOINT_ATTRIBUTES: [&str; 6] = [
    "primary_blob_endpoint",
    "primary_queue_endpoint",
    "primary_table_endpoint",
    "primary_file_endpoint",
    "primary_web_endpoint",
    "primary_dfs_endpoint",
];

fn endpoint_values(e: &Endpoints) -> [Option<&String>; 6] {
    [
        e.blob.as_ref(),
        e.queue.as_ref(),
        e.table.as_ref(),
        e.file.as_ref(),
        e.web.as_ref(),
        e.dfs.as_ref(),
    ]
}

/// Prior and planned values of a string attribute whose value is changing
fn changed(req: &PlanModifierRequest) -> Option<(&str, &str)> {
    let old = req.state_value.value.as_str()?;
    let new = req.plan_value.value.as_str()?;
    (old != new).then_some((old, new))
}

fn kind_upgrades_in_place(old: &str, new: &str) -> bool {
    old == "Storage" && new == "StorageV2"
}

fn zone_redundant(replication: &str) -> bool {
    matches!(replication.to_ascii_uppercase().as_str(), "ZRS" | "GZRS" | "RAGZRS")
}

#[derive(Default)]
pub struct StorageAccountResource;

impl StorageAccountResource {
    pub fn new() -> Self {
        Self
    }
}

fn secret(name: &str) -> tfplug::schema::Attribute {
    AttributeBuilder::new(name, AttributeType::String)
        .computed()
        .sensitive()
        .plan_modifier(UseStateForUnknown)
        .build()
}

#[async_trait]
impl ArmResource for StorageAccountResource {
    type Id = StorageAccountId;
    type Model = StorageAccount;

    const TYPE_NAME: &'static str = "azurerm_storage_account";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description("Manages an Azure Storage Account.")
            .attribute(schema::name_matching(
                "Specifies the name of the storage account. Changing this forces a new resource to be created.",
                &validate::STORAGE_ACCOUNT_NAME,
            ))
            .attribute(schema::resource_group_name())
            .attribute(location::schema())
            .attribute(
                AttributeBuilder::new("account_kind", AttributeType::String)
                    .optional()
                    .default(StaticDefault::string("StorageV2"))
                    .plan_modifier(RequiresReplaceIf::new(
                        |req: &PlanModifierRequest| changed(req).is_some_and(|(old, new)| !kind_upgrades_in_place(old, new)),
                        "only Storage accounts can be upgraded to StorageV2 in place",
                    ))
                    .validator(OneOfValidator::new(ACCOUNT_KINDS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("account_tier", AttributeType::String)
                    .required()
                    .force_new()
                    .validator(OneOfValidator::new(&["Standard", "Premium"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("account_replication_type", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplaceIf::new(
                        |req: &PlanModifierRequest| {
                            changed(req).is_some_and(|(old, new)| zone_redundant(old) != zone_redundant(new))
                        },
                        "moving between zone-redundant and locally or geo-redundant replication recreates the account",
                    ))
                    .validator(OneOfValidator::new(REPLICATION_TYPES))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("access_tier", AttributeType::String)
                    .optional()
                    .computed()
                    .validator(OneOfValidator::new(&["Hot", "Cool"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_https_traffic_only", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(true))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("min_tls_version", AttributeType::String)
                    .optional()
                    .default(StaticDefault::string("TLS1_2"))
                    .validator(OneOfValidator::new(&["TLS1_0", "TLS1_1", "TLS1_2"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("allow_nested_items_to_be_public", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(true))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_hns_enabled", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(false))
                    .force_new()
                    .build(),
            )
            .attribute(schema::computed("primary_location", AttributeType::String))
            .attribute(schema::computed("secondary_location", AttributeType::String))
            .attribute(secret("primary_access_key"))
            .attribute(secret("secondary_access_key"))
            .attribute(tags::schema());
        for name in ENDPOINT_ATTRIBUTES {
            builder = builder.attribute(schema::computed(name, AttributeType::String));
        }
        builder.build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<StorageAccountId, ResourceError> {
        Ok(StorageAccountId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: Duration::from_secs(60 * 60),
            update: Duration::from_secs(60 * 60),
            delete: Duration::from_secs(60 * 60),
            ..Timeouts::default()
        }
    }

    fn update_method(&self) -> UpdateMethod {
        UpdateMethod::Patch
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        let kind = values::string(config, "account_kind").unwrap_or_else(|| "StorageV2".to_string());
        let tier = values::string(config, "account_tier");
        let premium_only = matches!(kind.as_str(), "FileStorage" | "BlockBlobStorage");
        if premium_only && tier.as_deref().is_some_and(|t| t != "Premium") {
            return vec![Diagnostic::error(
                "Invalid account tier",
                format!("`account_tier` must be `Premium` when `account_kind` is `{}`", kind),
            )
            .with_attribute(AttributePath::new("account_tier"))];
        }
        Vec::new()
    }

    fn expand(&self, _id: &StorageAccountId, config: &Dynamic, op: Operation) -> Result<StorageAccount, ResourceError> {
        let tier = values::string(config, "account_tier").unwrap_or_default();
        let replication = values::string(config, "account_replication_type").unwrap_or_default();
        let creating = op == Operation::Create;

        Ok(StorageAccount {
            location: values::string(config, "location").filter(|_| creating),
            // Sent on update too so Storage accounts can be upgraded to StorageV2.
            kind: values::string(config, "account_kind"),
            sku: Some(Sku::from_parts(&tier, &replication)),
            tags: Some(tags::expand(config).unwrap_or_default()),
            properties: Some(StorageAccountProperties {
                access_tier: values::non_empty_string(config, "access_tier"),
                supports_https_traffic_only: values::bool(config, "enable_https_traffic_only"),
                minimum_tls_version: values::string(config, "min_tls_version"),
                allow_blob_public_access: values::bool(config, "allow_nested_items_to_be_public"),
                is_hns_enabled: values::bool(config, "is_hns_enabled").filter(|_| creating),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(&self, id: &StorageAccountId, model: StorageAccount, _prior: &Dynamic) -> Attributes {
        let (tier, replication) = model.sku.as_ref().map(Sku::parts).unwrap_or_default();
        let props = model.properties.unwrap_or_default();
        let endpoints = props.primary_endpoints.clone().unwrap_or_default();

        let mut attrs = HashMap::from([
            ("name".to_string(), Dynamic::String(id.storage_account_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            (
                "location".to_string(),
                Dynamic::String(location::normalize(model.location.as_deref().unwrap_or_default())),
            ),
            ("account_kind".to_string(), values::opt_string(model.kind.as_ref())),
            ("account_tier".to_string(), Dynamic::String(tier)),
            ("account_replication_type".to_string(), Dynamic::String(replication)),
            ("access_tier".to_string(), values::opt_string(props.access_tier.as_ref())),
            (
                "enable_https_traffic_only".to_string(),
                values::opt_bool(props.supports_https_traffic_only),
            ),
            ("min_tls_version".to_string(), values::opt_string(props.minimum_tls_version.as_ref())),
            (
                "allow_nested_items_to_be_public".to_string(),
                values::opt_bool(props.allow_blob_public_access),
            ),
            ("is_hns_enabled".to_string(), values::opt_bool(props.is_hns_enabled)),
            ("primary_location".to_string(), values::opt_string(props.primary_location.as_ref())),
            ("secondary_location".to_string(), values::opt_string(props.secondary_location.as_ref())),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ]);
        for (name, value) in ENDPOINT_ATTRIBUTES.iter().zip(endpoint_values(&endpoints)) {
            attrs.insert(name.to_string(), values::opt_string(value));
        }
        attrs
    }

    fn lock_names(&self, id: &StorageAccountId, _config: &Dynamic) -> Vec<LockName> {
        vec![LockName::new(id.storage_account_name.clone(), LOCK_KIND)]
    }

    async fn after_read(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &StorageAccountId,
        attributes: &mut Attributes,
    ) -> Result<(), ResourceError> {
        let keys: ListKeysResult = data
            .client
            .send(Method::POST, &format!("{}/listKeys", id), Some(api::API_VERSION), None::<&()>)
            .await?
            .json()?;
        for (attribute, key_name) in [("primary_access_key", "key1"), ("secondary_access_key", "key2")] {
            let value = keys.key(key_name).unwrap_or_default().to_string();
            attributes.insert(attribute.to_string(), Dynamic::String(value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object, provider_data};
    use crate::arm::ArmResourceHandler;
    use mockito::{Matcher, Server};
    use tfplug::resource::{Resource, UpdateResourceRequest};
    use tfplug::schema::PlanModifier;
    use tfplug::DynamicValue;

    const PATH: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct";

    fn config() -> Dynamic {
        object(vec![
            ("id", PATH.into()),
            ("name", "acct".into()),
            ("resource_group_name", "rg".into()),
            ("location", "westeurope".into()),
            ("account_kind", "StorageV2".into()),
            ("account_tier", "Standard".into()),
            ("account_replication_type", "GRS".into()),
            ("access_tier", Dynamic::Unknown),
            ("enable_https_traffic_only", true.into()),
            ("min_tls_version", "TLS1_2".into()),
            ("allow_nested_items_to_be_public", false.into()),
            ("is_hns_enabled", false.into()),
            ("tags", Dynamic::Null),
            ("timeouts", Dynamic::Null),
        ])
    }

    #[test]
    fn create_sends_location_and_kind() {
        let id = StorageAccountResource.id_from_config("sub", &config()).unwrap();
        let body = serde_json::to_value(StorageAccountResource.expand(&id, &config(), Operation::Create).unwrap()).unwrap();
        assert_eq!(body["location"], "westeurope");
        assert_eq!(body["kind"], "StorageV2");
        assert_eq!(body["sku"]["name"], "Standard_GRS");
        assert_eq!(body["properties"]["allowBlobPublicAccess"], false);
    }

    #[test]
    fn configured_fields_round_trip() {
        let mut cfg = config();
        if let Dynamic::Map(fields) = &mut cfg {
            fields.insert("access_tier".into(), "Cool".into());
            fields.insert("is_hns_enabled".into(), true.into());
            fields.insert(
                "tags".into(),
                Dynamic::Map(HashMap::from([("env".to_string(), "prod".into())])),
            );
        }
        assert_round_trips(&StorageAccountResource, &cfg);
    }

    fn replaces(attribute: &str, old: &str, new: &str) -> bool {
        let schema = StorageAccountResource.schema();
        let attr = schema.block.attributes.iter().find(|a| a.name == attribute).unwrap();
        attr.plan_modifiers.iter().any(|modifier| {
            modifier
                .modify(PlanModifierRequest {
                    config_value: DynamicValue::new(new.into()),
                    state_value: DynamicValue::new(old.into()),
                    plan_value: DynamicValue::new(new.into()),
                    path: AttributePath::new(attribute),
                    resource_is_new: false,
                })
                .requires_replace
        })
    }

    #[test]
    fn kind_upgrade_to_v2_is_in_place() {
        assert!(!replaces("account_kind", "Storage", "StorageV2"));
        assert!(!replaces("account_kind", "StorageV2", "StorageV2"));
        assert!(replaces("account_kind", "StorageV2", "BlobStorage"));
        assert!(replaces("account_kind", "StorageV2", "Storage"));
    }

    #[test]
    fn zone_redundancy_changes_recreate_the_account() {
        assert!(!replaces("account_replication_type", "LRS", "GRS"));
        assert!(!replaces("account_replication_type", "ZRS", "GZRS"));
        assert!(replaces("account_replication_type", "LRS", "ZRS"));
        assert!(replaces("account_replication_type", "RAGZRS", "GRS"));
    }

    #[test]
    fn premium_only_kinds_reject_standard_tier() {
        let mut cfg = config();
        if let Dynamic::Map(m) = &mut cfg {
            m.insert("account_kind".into(), "FileStorage".into());
        }
        assert_eq!(StorageAccountResource.validate(&cfg).len(), 1);
        assert!(StorageAccountResource.validate(&config()).is_empty());
    }

    #[tokio::test]
    async fn update_patches_and_reads_keys() {
        let mut server = Server::new_async().await;
        let patch = server
            .mock("PATCH", PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({"sku": {"name": "Standard_GRS"}})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _get = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"location":"westeurope","kind":"StorageV2","sku":{"name":"Standard_GRS","tier":"Standard"},
                    "properties":{"accessTier":"Hot","supportsHttpsTrafficOnly":true,"minimumTlsVersion":"TLS1_2",
                    "allowBlobPublicAccess":false,"isHnsEnabled":false,"primaryLocation":"westeurope",
                    "secondaryLocation":"northeurope","primaryEndpoints":{"blob":"https://acct.blob.core.windows.net/"}}}"#,
            )
            .create_async()
            .await;
        let keys = server
            .mock("POST", format!("{}/listKeys", PATH).as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"keys":[{"keyName":"key1","value":"one"},{"keyName":"key2","value":"two"}]}"#)
            .create_async()
            .await;

        let handler = ArmResourceHandler::new(StorageAccountResource).with_provider_data(provider_data(&server.url()));
        let response = handler
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "azurerm_storage_account".into(),
                    prior_state: DynamicValue::new(config()),
                    planned_state: DynamicValue::new(config()),
                    config: DynamicValue::new(config()),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state.value;
        assert_eq!(state.attr("primary_access_key").and_then(Dynamic::as_str), Some("one"));
        assert_eq!(state.attr("secondary_access_key").and_then(Dynamic::as_str), Some("two"));
        assert_eq!(state.attr("access_tier").and_then(Dynamic::as_str), Some("Hot"));
        assert_eq!(
            state.attr("primary_blob_endpoint").and_then(Dynamic::as_str),
            Some("https://acct.blob.core.windows.net/")
        );
        patch.assert_async().await;
        keys.assert_async().await;
    }
}
