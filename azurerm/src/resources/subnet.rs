//! `azurerm_subnet`
//!
//! A subnet is a child of its virtual network, so writes hold the parent's
//! lock. Associations set by other resources (security group, route table)
//! are carried over on update.

use super::required;
use super::virtual_network;
use crate::api::network::{self as api, ServiceEndpoint, Subnet, SubnetProperties};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::schema;
use crate::locks::LockName;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::SubnetId;
use crate::validate;
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::validator::ListLengthValidator;
use tfplug::{AttributeBuilder, AttributeType, Dynamic, Schema, SchemaBuilder};

const LOCK_KIND: &str = "azurerm_subnet";

#[derive(Default)]
pub struct SubnetResource;

impl SubnetResource {
    pub fn new() -> Self {
        Self
    }
}

fn policy(enabled: bool) -> String {
    if enabled { "Enabled" } else { "Disabled" }.to_string()
}

fn policy_enabled(value: Option<&String>) -> Dynamic {
    Dynamic::Bool(value.map_or(true, |v| v.eq_ignore_ascii_case("Enabled")))
}

#[async_trait]
impl ArmResource for SubnetResource {
    type Id = SubnetId;
    type Model = Subnet;

    const TYPE_NAME: &'static str = "azurerm_subnet";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a subnet. Subnets represent network segments within the IP space defined by the virtual network.")
            .attribute(schema::name(
                "The name of the subnet. Changing this forces a new resource to be created.",
                validate::network_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(schema::parent_name(
                "virtual_network_name",
                "The name of the virtual network to which to attach the subnet. Changing this forces a new resource to be created.",
                validate::network_name,
            ))
            .attribute(
                AttributeBuilder::new("address_prefixes", AttributeType::list_of(AttributeType::String))
                    .required()
                    .description("The address prefixes to use for the subnet.")
                    .validator(ListLengthValidator { min: Some(1), max: None })
                    .validator(validate::each("a CIDR block", validate::cidr))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("service_endpoints", AttributeType::set_of(AttributeType::String))
                    .optional()
                    .description("The list of Service endpoints to associate with the subnet.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("private_endpoint_network_policies_enabled", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(true))
                    .description("Enable or Disable network policies for the private endpoint on the subnet.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("private_link_service_network_policies_enabled", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(true))
                    .description("Enable or Disable network policies for the private link service on the subnet.")
                    .build(),
            )
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<SubnetId, ResourceError> {
        Ok(SubnetId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "virtual_network_name")?,
            required(config, "name")?,
        ))
    }

    fn expand(&self, _id: &SubnetId, config: &Dynamic, _op: Operation) -> Result<Subnet, ResourceError> {
        let prefixes = values::string_list(config, "address_prefixes");
        let (address_prefix, address_prefixes) = match prefixes.as_slice() {
            [single] => (Some(single.clone()), None),
            _ => (None, Some(prefixes)),
        };
        let service_endpoints = values::string_list(config, "service_endpoints")
            .into_iter()
            .map(|service| ServiceEndpoint { service, locations: None })
            .collect();

        Ok(Subnet {
            properties: SubnetProperties {
                address_prefix,
                address_prefixes,
                service_endpoints: Some(service_endpoints),
                private_endpoint_network_policies: Some(policy(
                    values::bool(config, "private_endpoint_network_policies_enabled").unwrap_or(true),
                )),
                private_link_service_network_policies: Some(policy(
                    values::bool(config, "private_link_service_network_policies_enabled").unwrap_or(true),
                )),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &SubnetId, model: Subnet, _prior: &Dynamic) -> Attributes {
        let props = model.properties;
        let endpoints: Vec<String> = props
            .service_endpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.service)
            .collect();
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.subnet_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("virtual_network_name".to_string(), Dynamic::String(id.virtual_network_name.clone())),
            ("address_prefixes".to_string(), values::strings_to_dynamic(props.prefixes())),
            ("service_endpoints".to_string(), values::strings_to_dynamic(endpoints)),
            (
                "private_endpoint_network_policies_enabled".to_string(),
                policy_enabled(props.private_endpoint_network_policies.as_ref()),
            ),
            (
                "private_link_service_network_policies_enabled".to_string(),
                policy_enabled(props.private_link_service_network_policies.as_ref()),
            ),
        ])
    }

    fn lock_names(&self, id: &SubnetId, _config: &Dynamic) -> Vec<LockName> {
        vec![
            LockName::new(id.virtual_network_name.clone(), virtual_network::LOCK_KIND),
            LockName::new(id.subnet_name.clone(), LOCK_KIND),
        ]
    }

    async fn before_write(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &SubnetId,
        model: &mut Subnet,
        op: Operation,
    ) -> Result<(), ResourceError> {
        if op != Operation::Update {
            return Ok(());
        }
        match data.client.get::<Subnet>(&id.to_string(), api::API_VERSION).await {
            Ok(existing) => {
                model.properties.network_security_group = existing.properties.network_security_group;
                model.properties.route_table = existing.properties.route_table;
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object, provider_data};
    use crate::arm::ArmResourceHandler;
    use mockito::{Matcher, Server};
    use tfplug::resource::{CreateResourceRequest, Resource};
    use tfplug::DynamicValue;

    const SUBNET_PATH: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/internal";

    fn config() -> Dynamic {
        object(vec![
            ("name", "internal".into()),
            ("resource_group_name", "rg".into()),
            ("virtual_network_name", "vnet".into()),
            ("address_prefixes", Dynamic::List(vec!["10.0.1.0/24".into()])),
            ("service_endpoints", Dynamic::Null),
            ("private_endpoint_network_policies_enabled", true.into()),
            ("private_link_service_network_policies_enabled", false.into()),
            ("id", Dynamic::Unknown),
            ("timeouts", Dynamic::Null),
        ])
    }

    #[test]
    fn single_prefix_uses_address_prefix() {
        let id = SubnetResource.id_from_config("sub", &config()).unwrap();
        let body = serde_json::to_value(SubnetResource.expand(&id, &config(), Operation::Create).unwrap()).unwrap();
        assert_eq!(body["properties"]["addressPrefix"], "10.0.1.0/24");
        assert!(body["properties"].get("addressPrefixes").is_none());
        assert_eq!(body["properties"]["privateLinkServiceNetworkPolicies"], "Disabled");
    }

    #[test]
    fn configured_fields_round_trip() {
        let mut config = config();
        if let Dynamic::Map(fields) = &mut config {
            fields.insert(
                "service_endpoints".into(),
                Dynamic::List(vec!["Microsoft.Storage".into(), "Microsoft.Sql".into()]),
            );
        }
        assert_round_trips(&SubnetResource, &config);

        if let Dynamic::Map(fields) = &mut config {
            fields.insert(
                "address_prefixes".into(),
                Dynamic::List(vec!["10.0.1.0/24".into(), "10.0.2.0/24".into()]),
            );
        }
        assert_round_trips(&SubnetResource, &config);
    }

    #[test]
    fn locks_parent_network() {
        let id = SubnetResource.id_from_config("sub", &config()).unwrap();
        let names = SubnetResource.lock_names(&id, &config());
        assert!(names.contains(&LockName::new("vnet", "azurerm_virtual_network")));
    }

    #[tokio::test]
    async fn create_reports_wrapped_error_with_subnet_context() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", SUBNET_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let _put = server
            .mock("PUT", SUBNET_PATH)
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":"NetcfgInvalidSubnet","message":"Subnet is not valid in virtual network"}}"#)
            .create_async()
            .await;

        let handler = ArmResourceHandler::new(SubnetResource).with_provider_data(provider_data(&server.url()));
        let response = handler
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "azurerm_subnet".into(),
                    planned_state: DynamicValue::new(config()),
                    config: DynamicValue::new(config()),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert_eq!(
            response.diagnostics[0].summary,
            "creating Subnet (Subscription: \"sub\" / Resource Group Name: \"rg\" / Virtual Network Name: \"vnet\" / Subnet Name: \"internal\"): unexpected status 400 with error: NetcfgInvalidSubnet: Subnet is not valid in virtual network"
        );
    }
}
