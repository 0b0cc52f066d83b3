//! `azurerm_cosmosdb_mongo_collection`
//!
//! Throughput is a child object (`throughputSettings/default`): it rides in
//! the create options, and afterwards is read and written separately.

use super::required;
use crate::api::cosmos::{
    self as api, AutoscaleSettings, CreateUpdateOptions, MongoCollection, MongoCollectionProperties,
    MongoCollectionResource, MongoIndex, MongoIndexKeys, MongoIndexOptions, ThroughputResource, ThroughputSettings,
    ThroughputSettingsProperties,
};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::schema;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::CosmosMongoCollectionId;
use crate::validate;
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::schema::NestedBlock;
use tfplug::validator::{IntegerValidator, ListLengthValidator, NumberRangeValidator};
use tfplug::{
    AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode, Schema,
    SchemaBuilder,
};

#[derive(Default)]
pub struct CosmosDbMongoCollectionResource;

impl CosmosDbMongoCollectionResource {
    pub fn new() -> Self {
        Self
    }
}

fn throughput_path(id: &CosmosMongoCollectionId) -> String {
    format!("{}/throughputSettings/default", id)
}

fn index_block() -> NestedBlock {
    NestedBlockBuilder::new("index", NestingMode::Set)
        .attribute(
            AttributeBuilder::new("keys", AttributeType::list_of(AttributeType::String))
                .required()
                .validator(ListLengthValidator { min: Some(1), max: None })
                .build(),
        )
        .attribute(
            AttributeBuilder::new("unique", AttributeType::Bool)
                .optional()
                .default(StaticDefault::bool(false))
                .build(),
        )
        .build()
}

fn autoscale_settings_block() -> NestedBlock {
    NestedBlockBuilder::new("autoscale_settings", NestingMode::List)
        .max_items(1)
        .attribute(
            AttributeBuilder::new("max_throughput", AttributeType::Number)
                .optional()
                .computed()
                .validator(NumberRangeValidator { min: Some(1000.0), max: None })
                .validator(IntegerValidator)
                .build(),
        )
        .build()
}

fn expand_autoscale(config: &Dynamic) -> Option<AutoscaleSettings> {
    values::single_block(config, "autoscale_settings")
        .and_then(|b| values::int(b, "max_throughput"))
        .map(|max_throughput| AutoscaleSettings { max_throughput })
}

fn expand_indexes(config: &Dynamic) -> Vec<MongoIndex> {
    let mut indexes: Vec<MongoIndex> = values::list(config, "index")
        .iter()
        .map(|block| MongoIndex {
            key: Some(MongoIndexKeys {
                keys: values::string_list(block, "keys"),
            }),
            options: Some(MongoIndexOptions {
                expire_after_seconds: None,
                unique: values::bool(block, "unique"),
            }),
        })
        .collect();
    if let Some(ttl) = values::int(config, "default_ttl_seconds") {
        indexes.push(MongoIndex {
            key: Some(MongoIndexKeys {
                keys: vec![api::TTL_INDEX_KEY.to_string()],
            }),
            options: Some(MongoIndexOptions {
                expire_after_seconds: Some(ttl),
                unique: None,
            }),
        });
    }
    indexes
}

#[async_trait]
impl ArmResource for CosmosDbMongoCollectionResource {
    type Id = CosmosMongoCollectionId;
    type Model = MongoCollection;

    const TYPE_NAME: &'static str = "azurerm_cosmosdb_mongo_collection";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a Mongo Collection within a Cosmos DB Account.")
            .attribute(schema::name(
                "Specifies the name of the Cosmos DB Mongo Collection. Changing this forces a new resource to be created.",
                validate::cosmos_entity_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(schema::parent_name(
                "account_name",
                "The name of the Cosmos DB Account. Changing this forces a new resource to be created.",
                validate::cosmos_account_name,
            ))
            .attribute(schema::parent_name(
                "database_name",
                "The name of the Cosmos DB Mongo Database in which the collection is created. Changing this forces a new resource to be created.",
                validate::cosmos_entity_name,
            ))
            .attribute(
                AttributeBuilder::new("shard_key", AttributeType::String)
                    .optional()
                    .force_new()
                    .description("The name of the key to partition on for sharding.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("default_ttl_seconds", AttributeType::Number)
                    .optional()
                    .description("The default Time To Live in seconds. If the value is `-1`, items are not automatically expired.")
                    .validator(NumberRangeValidator { min: Some(-1.0), max: None })
                    .validator(IntegerValidator)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("analytical_storage_ttl", AttributeType::Number)
                    .optional()
                    .validator(NumberRangeValidator { min: Some(-1.0), max: Some(2147483647.0) })
                    .validator(IntegerValidator)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("throughput", AttributeType::Number)
                    .optional()
                    .computed()
                    .validator(NumberRangeValidator { min: Some(400.0), max: None })
                    .validator(IntegerValidator)
                    .build(),
            )
            .block(autoscale_settings_block())
            .block(index_block())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<CosmosMongoCollectionId, ResourceError> {
        Ok(CosmosMongoCollectionId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "account_name")?,
            required(config, "database_name")?,
            required(config, "name")?,
        ))
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        let has_throughput = matches!(config.attr("throughput"), Some(Dynamic::Number(_)));
        let has_autoscale = !values::list(config, "autoscale_settings").is_empty();
        if has_throughput && has_autoscale {
            return vec![Diagnostic::error(
                "Conflicting configuration arguments",
                "`throughput` and `autoscale_settings` cannot both be set",
            )
            .with_attribute(AttributePath::new("throughput"))];
        }
        Vec::new()
    }

    fn expand(&self, id: &CosmosMongoCollectionId, config: &Dynamic, op: Operation) -> Result<MongoCollection, ResourceError> {
        let options = (op == Operation::Create).then(|| CreateUpdateOptions {
            throughput: values::int(config, "throughput"),
            autoscale_settings: expand_autoscale(config),
        });

        Ok(MongoCollection {
            properties: MongoCollectionProperties {
                resource: MongoCollectionResource {
                    id: id.collection_name.clone(),
                    shard_key: values::non_empty_string(config, "shard_key")
                        .map(|key| HashMap::from([(key, "Hash".to_string())])),
                    indexes: Some(expand_indexes(config)),
                    analytical_storage_ttl: values::int(config, "analytical_storage_ttl"),
                },
                options,
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &CosmosMongoCollectionId, model: MongoCollection, _prior: &Dynamic) -> Attributes {
        let resource = model.properties.resource;
        let indexes = resource.indexes.unwrap_or_default();

        let default_ttl = indexes
            .iter()
            .find(|i| i.is_single(api::TTL_INDEX_KEY))
            .and_then(|i| i.options.as_ref())
            .and_then(|o| o.expire_after_seconds);
        let user_indexes = indexes
            .iter()
            .filter(|i| !i.is_single(api::TTL_INDEX_KEY) && !i.is_single(api::ID_INDEX_KEY))
            .map(|i| {
                Dynamic::Map(HashMap::from([
                    ("keys".to_string(), values::strings_to_dynamic(i.keys().to_vec())),
                    (
                        "unique".to_string(),
                        values::opt_bool(i.options.as_ref().and_then(|o| o.unique)),
                    ),
                ]))
            })
            .collect();

        // ARM reports one key; the first in order keeps the value stable.
        let shard_key = resource
            .shard_key
            .and_then(|keys| keys.into_keys().min());

        HashMap::from([
            ("name".to_string(), Dynamic::String(id.collection_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("account_name".to_string(), Dynamic::String(id.database_account_name.clone())),
            ("database_name".to_string(), Dynamic::String(id.mongodb_database_name.clone())),
            ("shard_key".to_string(), values::opt_string(shard_key.as_ref())),
            (
                "default_ttl_seconds".to_string(),
                default_ttl.map_or(Dynamic::Null, |t| Dynamic::Number(t as f64)),
            ),
            (
                "analytical_storage_ttl".to_string(),
                resource
                    .analytical_storage_ttl
                    .map_or(Dynamic::Null, |t| Dynamic::Number(t as f64)),
            ),
            ("index".to_string(), Dynamic::List(user_indexes)),
        ])
    }

    async fn after_write(
        &self,
        ctx: &Context,
        data: &AzureRmProviderData,
        id: &CosmosMongoCollectionId,
        config: &Dynamic,
        op: Operation,
    ) -> Result<(), ResourceError> {
        if op != Operation::Update {
            return Ok(());
        }
        let throughput = values::int(config, "throughput");
        let autoscale_settings = expand_autoscale(config);
        if throughput.is_none() && autoscale_settings.is_none() {
            return Ok(());
        }
        let body = ThroughputSettings {
            properties: ThroughputSettingsProperties {
                resource: ThroughputResource {
                    throughput,
                    autoscale_settings,
                    minimum_throughput: None,
                },
            },
        };
        data.client
            .put_and_wait(ctx, &throughput_path(id), api::API_VERSION, &body)
            .await?;
        Ok(())
    }

    /// Collections in a database with shared throughput have no settings
    /// of their own; ARM answers 404 for those.
    async fn after_read(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &CosmosMongoCollectionId,
        attributes: &mut Attributes,
    ) -> Result<(), ResourceError> {
        let settings = match data
            .client
            .get::<ThroughputSettings>(&throughput_path(id), api::API_VERSION)
            .await
        {
            Ok(settings) => settings.properties.resource,
            Err(e) if e.is_not_found() => ThroughputResource::default(),
            Err(e) => return Err(e.into()),
        };

        attributes.insert(
            "throughput".to_string(),
            settings.throughput.map_or(Dynamic::Null, |t| Dynamic::Number(t as f64)),
        );
        let autoscale = settings.autoscale_settings.map(|a| {
            HashMap::from([("max_throughput".to_string(), Dynamic::Number(a.max_throughput as f64))])
        });
        attributes.insert("autoscale_settings".to_string(), values::block_list(autoscale));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object, provider_data};
    use mockito::{Matcher, Server};

    const PATH: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/acct/mongodbDatabases/db/collections/items";

    fn config(throughput: Dynamic) -> Dynamic {
        object(vec![
            ("name", "items".into()),
            ("resource_group_name", "rg".into()),
            ("account_name", "acct".into()),
            ("database_name", "db".into()),
            ("shard_key", "tenant".into()),
            ("default_ttl_seconds", Dynamic::Number(3600.0)),
            ("analytical_storage_ttl", Dynamic::Null),
            ("throughput", throughput),
            ("autoscale_settings", Dynamic::List(vec![])),
            (
                "index",
                Dynamic::List(vec![object(vec![
                    ("keys", Dynamic::List(vec!["email".into()])),
                    ("unique", true.into()),
                ])]),
            ),
        ])
    }

    fn id() -> CosmosMongoCollectionId {
        CosmosMongoCollectionId::new("sub", "rg", "acct", "db", "items")
    }

    #[test]
    fn expand_adds_ttl_index_and_shard_key() {
        let body = serde_json::to_value(
            CosmosDbMongoCollectionResource
                .expand(&id(), &config(Dynamic::Number(400.0)), Operation::Create)
                .unwrap(),
        )
        .unwrap();
        let resource = &body["properties"]["resource"];
        assert_eq!(resource["id"], "items");
        assert_eq!(resource["shardKey"]["tenant"], "Hash");
        assert_eq!(resource["indexes"][1]["key"]["keys"][0], "_ts");
        assert_eq!(resource["indexes"][1]["options"]["expireAfterSeconds"], 3600);
        assert_eq!(body["properties"]["options"]["throughput"], 400);
    }

    #[test]
    fn update_leaves_out_create_options() {
        let model = CosmosDbMongoCollectionResource
            .expand(&id(), &config(Dynamic::Number(400.0)), Operation::Update)
            .unwrap();
        assert!(model.properties.options.is_none());
    }

    #[test]
    fn flatten_hides_system_indexes() {
        let model: MongoCollection = serde_json::from_str(
            r#"{"properties":{"resource":{"id":"items","shardKey":{"tenant":"Hash"},"indexes":[
                {"key":{"keys":["_id"]},"options":{}},
                {"key":{"keys":["_ts"]},"options":{"expireAfterSeconds":3600}},
                {"key":{"keys":["email"]},"options":{"unique":true}}
            ]}}}"#,
        )
        .unwrap();
        let attrs = CosmosDbMongoCollectionResource.flatten(&id(), model, &Dynamic::Null);
        assert_eq!(attrs["default_ttl_seconds"], Dynamic::Number(3600.0));
        assert_eq!(attrs["shard_key"], Dynamic::String("tenant".into()));
        let indexes = attrs["index"].as_list().unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].attr("keys"), Some(&Dynamic::List(vec!["email".into()])));
    }

    #[test]
    fn configured_fields_round_trip() {
        // Throughput lives behind its own endpoint and is filled in by after_read.
        let mut cfg = config(Dynamic::Null);
        if let Dynamic::Map(m) = &mut cfg {
            m.insert("autoscale_settings".into(), Dynamic::Null);
            m.insert("analytical_storage_ttl".into(), Dynamic::Number(-1.0));
            m.insert(
                "index".into(),
                Dynamic::List(vec![
                    object(vec![
                        ("keys", Dynamic::List(vec!["email".into()])),
                        ("unique", true.into()),
                    ]),
                    object(vec![
                        ("keys", Dynamic::List(vec!["tenant".into(), "created".into()])),
                        ("unique", false.into()),
                    ]),
                ]),
            );
        }
        assert_round_trips(&CosmosDbMongoCollectionResource, &cfg);
    }

    #[test]
    fn throughput_conflicts_with_autoscale() {
        let mut cfg = config(Dynamic::Number(400.0));
        if let Dynamic::Map(m) = &mut cfg {
            m.insert(
                "autoscale_settings".into(),
                Dynamic::List(vec![object(vec![("max_throughput", Dynamic::Number(4000.0))])]),
            );
        }
        assert_eq!(CosmosDbMongoCollectionResource.validate(&cfg).len(), 1);
    }

    #[tokio::test]
    async fn read_treats_missing_throughput_settings_as_shared() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", format!("{}/throughputSettings/default", PATH).as_str())
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let mut attrs = Attributes::new();
        CosmosDbMongoCollectionResource
            .after_read(&Context::new(), &provider_data(&server.url()), &id(), &mut attrs)
            .await
            .unwrap();
        assert_eq!(attrs["throughput"], Dynamic::Null);
        assert_eq!(attrs["autoscale_settings"], Dynamic::List(vec![]));
    }

    #[tokio::test]
    async fn update_writes_throughput_settings() {
        let mut server = Server::new_async().await;
        let put = server
            .mock("PUT", format!("{}/throughputSettings/default", PATH).as_str())
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({"properties": {"resource": {"throughput": 800}}})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        CosmosDbMongoCollectionResource
            .after_write(
                &Context::new(),
                &provider_data(&server.url()),
                &id(),
                &config(Dynamic::Number(800.0)),
                Operation::Update,
            )
            .await
            .unwrap();
        put.assert_async().await;
    }
}
