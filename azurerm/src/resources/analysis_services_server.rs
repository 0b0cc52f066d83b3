//! `azurerm_analysis_services_server`

use super::required;
use crate::api::analysis_services::{self as api, FirewallRule, FirewallSettings, Server, ServerAdministrators, ServerProperties, ServerSku};
use crate::arm::{ArmResource, ResourceError, UpdateMethod};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{location, schema, tags};
use crate::resource_id::AnalysisServicesServerId;
use crate::validate;
use std::collections::HashMap;
use tfplug::schema::NestedBlock;
use tfplug::validator::OneOfValidator;
use tfplug::{AttributeBuilder, AttributeType, Dynamic, NestedBlockBuilder, NestingMode, Schema, SchemaBuilder};

const SKUS: &[&str] = &["D1", "B1", "B2", "S0", "S1", "S2", "S4", "S8", "S9", "S8v2", "S9v2"];

#[derive(Default)]
pub struct AnalysisServicesServerResource;

impl AnalysisServicesServerResource {
    pub fn new() -> Self {
        Self
    }
}

fn firewall_rule_block() -> NestedBlock {
    let address = |name: &str| {
        AttributeBuilder::new(name, AttributeType::String)
            .required()
            .validator(validate::func("an IPv4 address", validate::ipv4_address))
            .build()
    };
    NestedBlockBuilder::new("ipv4_firewall_rule", NestingMode::Set)
        .attribute(AttributeBuilder::new("name", AttributeType::String).required().build())
        .attribute(address("range_start"))
        .attribute(address("range_end"))
        .build()
}

impl ArmResource for AnalysisServicesServerResource {
    type Id = AnalysisServicesServerId;
    type Model = Server;

    const TYPE_NAME: &'static str = "azurerm_analysis_services_server";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages an Analysis Services Server.")
            .attribute(schema::name_matching(
                "The name of the Analysis Services Server. Only lowercase Alphanumeric characters allowed, starting with a letter. Changing this forces a new resource to be created.",
                &validate::ANALYSIS_SERVICES_SERVER_NAME,
            ))
            .attribute(schema::resource_group_name())
            .attribute(location::schema())
            .attribute(
                AttributeBuilder::new("sku", AttributeType::String)
                    .required()
                    .description("SKU for the Analysis Services Server.")
                    .validator(OneOfValidator::new(SKUS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("admin_users", AttributeType::set_of(AttributeType::String))
                    .optional()
                    .description("List of email addresses of admin users.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("querypool_connection_mode", AttributeType::String)
                    .optional()
                    .computed()
                    .validator(OneOfValidator::new(&["All", "ReadOnly"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("backup_blob_container_uri", AttributeType::String)
                    .optional()
                    .sensitive()
                    .description("URI and SAS token for a blob container to store backups.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_power_bi_service", AttributeType::Bool)
                    .optional()
                    .description("Indicates if the Power BI service is allowed to access or not.")
                    .build(),
            )
            .attribute(schema::computed("server_full_name", AttributeType::String))
            .attribute(tags::schema())
            .block(firewall_rule_block())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<AnalysisServicesServerId, ResourceError> {
        Ok(AnalysisServicesServerId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn update_method(&self) -> UpdateMethod {
        UpdateMethod::Patch
    }

    fn expand(&self, _id: &AnalysisServicesServerId, config: &Dynamic, op: Operation) -> Result<Server, ResourceError> {
        let rules = values::list(config, "ipv4_firewall_rule")
            .iter()
            .map(|rule| FirewallRule {
                firewall_rule_name: values::string(rule, "name").unwrap_or_default(),
                range_start: values::string(rule, "range_start").unwrap_or_default(),
                range_end: values::string(rule, "range_end").unwrap_or_default(),
            })
            .collect();

        Ok(Server {
            location: values::string(config, "location").filter(|_| op == Operation::Create),
            sku: Some(ServerSku {
                name: values::string(config, "sku").unwrap_or_default(),
                ..Default::default()
            }),
            tags: Some(tags::expand(config).unwrap_or_default()),
            properties: ServerProperties {
                as_administrators: Some(ServerAdministrators {
                    members: values::string_list(config, "admin_users"),
                }),
                backup_blob_container_uri: values::non_empty_string(config, "backup_blob_container_uri"),
                ipv4_firewall_settings: Some(FirewallSettings {
                    firewall_rules: rules,
                    enable_power_bi_service: Some(values::bool(config, "enable_power_bi_service").unwrap_or(false)),
                }),
                querypool_connection_mode: values::non_empty_string(config, "querypool_connection_mode"),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// `backup_blob_container_uri` holds a SAS token ARM never echoes, so
    /// the value from `prior` is kept.
    fn flatten(&self, id: &AnalysisServicesServerId, model: Server, prior: &Dynamic) -> Attributes {
        let props = model.properties;
        let firewall = props.ipv4_firewall_settings.unwrap_or_default();
        let rules = firewall
            .firewall_rules
            .into_iter()
            .map(|rule| {
                Dynamic::Map(HashMap::from([
                    ("name".to_string(), Dynamic::String(rule.firewall_rule_name)),
                    ("range_start".to_string(), Dynamic::String(rule.range_start)),
                    ("range_end".to_string(), Dynamic::String(rule.range_end)),
                ]))
            })
            .collect();
        let admins = props.as_administrators.map(|a| a.members).unwrap_or_default();

        HashMap::from([
            ("name".to_string(), Dynamic::String(id.server_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            (
                "location".to_string(),
                Dynamic::String(location::normalize(model.location.as_deref().unwrap_or_default())),
            ),
            ("sku".to_string(), values::opt_string(model.sku.as_ref().map(|s| &s.name))),
            ("admin_users".to_string(), values::strings_to_dynamic(admins)),
            (
                "querypool_connection_mode".to_string(),
                values::opt_string(props.querypool_connection_mode.as_ref()),
            ),
            (
                "backup_blob_container_uri".to_string(),
                prior.attr("backup_blob_container_uri").cloned().unwrap_or(Dynamic::Null),
            ),
            ("enable_power_bi_service".to_string(), values::opt_bool(firewall.enable_power_bi_service)),
            ("ipv4_firewall_rule".to_string(), Dynamic::List(rules)),
            ("server_full_name".to_string(), values::opt_string(props.server_full_name.as_ref())),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ])
    }
}
