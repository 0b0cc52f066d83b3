//! `azurerm_virtual_network`
//!
//! Subnets are managed by `azurerm_subnet`, so an update carries the
//! subnets ARM already has instead of replacing them with none.

use crate::api::network::{self as api, AddressSpace, DhcpOptions, VirtualNetwork, VirtualNetworkProperties};
use super::required;
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{location, schema, tags};
use crate::locks::LockName;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::VirtualNetworkId;
use crate::validate;
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::validator::ListLengthValidator;
use tfplug::{AttributeBuilder, AttributeType, Dynamic, Schema, SchemaBuilder};

pub const LOCK_KIND: &str = "azurerm_virtual_network";

#[derive(Default)]
pub struct VirtualNetworkResource;

impl VirtualNetworkResource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArmResource for VirtualNetworkResource {
    type Id = VirtualNetworkId;
    type Model = VirtualNetwork;

    const TYPE_NAME: &'static str = "azurerm_virtual_network";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a virtual network.")
            .attribute(schema::name(
                "The name of the virtual network. Changing this forces a new resource to be created.",
                validate::network_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(location::schema())
            .attribute(
                AttributeBuilder::new("address_space", AttributeType::list_of(AttributeType::String))
                    .required()
                    .description("The address space that is used the virtual network.")
                    .validator(ListLengthValidator { min: Some(1), max: None })
                    .validator(validate::each("a CIDR block", validate::cidr))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("dns_servers", AttributeType::list_of(AttributeType::String))
                    .optional()
                    .description("List of IP addresses of DNS servers.")
                    .validator(validate::each("an IPv4 address", validate::ipv4_address))
                    .build(),
            )
            .attribute(schema::computed("guid", AttributeType::String))
            .attribute(tags::schema())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<VirtualNetworkId, ResourceError> {
        Ok(VirtualNetworkId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn expand(&self, _id: &VirtualNetworkId, config: &Dynamic, _op: Operation) -> Result<VirtualNetwork, ResourceError> {
        let dns_servers = values::string_list(config, "dns_servers");
        Ok(VirtualNetwork {
            location: values::string(config, "location").unwrap_or_default(),
            tags: tags::expand(config),
            properties: VirtualNetworkProperties {
                address_space: Some(AddressSpace {
                    address_prefixes: values::string_list(config, "address_space"),
                }),
                dhcp_options: Some(DhcpOptions { dns_servers }),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &VirtualNetworkId, model: VirtualNetwork, _prior: &Dynamic) -> Attributes {
        let props = model.properties;
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.virtual_network_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("location".to_string(), Dynamic::String(location::normalize(&model.location))),
            (
                "address_space".to_string(),
                values::strings_to_dynamic(props.address_space.map(|a| a.address_prefixes).unwrap_or_default()),
            ),
            (
                "dns_servers".to_string(),
                values::strings_to_dynamic(props.dhcp_options.map(|d| d.dns_servers).unwrap_or_default()),
            ),
            ("guid".to_string(), values::opt_string(props.resource_guid.as_ref())),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ])
    }

    fn lock_names(&self, id: &VirtualNetworkId, _config: &Dynamic) -> Vec<LockName> {
        vec![LockName::new(id.virtual_network_name.clone(), LOCK_KIND)]
    }

    async fn before_write(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &VirtualNetworkId,
        model: &mut VirtualNetwork,
        op: Operation,
    ) -> Result<(), ResourceError> {
        if op != Operation::Update {
            return Ok(());
        }
        match data.client.get::<VirtualNetwork>(&id.to_string(), api::API_VERSION).await {
            Ok(existing) => {
                model.properties.subnets = existing.properties.subnets;
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
    use mockito::{Matcher, Server};

    fn config() -> Dynamic {
        object(vec![
            ("name", "vnet".into()),
            ("resource_group_name", "rg".into()),
            ("location", "westeurope".into()),
            ("address_space", Dynamic::List(vec!["10.0.0.0/16".into()])),
            ("dns_servers", Dynamic::Null),
            ("tags", Dynamic::Null),
        ])
    }

    #[test]
    fn builds_id_from_config() {
        let id = VirtualNetworkResource.id_from_config("sub", &config()).unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet"
        );
    }

    #[test]
    fn configured_fields_round_trip() {
        let config = object(vec![
            ("name", "vnet".into()),
            ("resource_group_name", "rg".into()),
            ("location", "West Europe".into()),
            (
                "address_space",
                Dynamic::List(vec!["10.0.0.0/16".into(), "10.1.0.0/16".into()]),
            ),
            ("dns_servers", Dynamic::List(vec!["10.0.0.4".into(), "10.0.0.5".into()])),
            ("guid", Dynamic::Unknown),
            ("tags", Dynamic::Map(HashMap::from([("env".to_string(), "dev".into())]))),
        ]);
        assert_round_trips(&VirtualNetworkResource, &config);
    }

    #[tokio::test]
    async fn update_keeps_existing_subnets() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"location":"westeurope","properties":{"subnets":[{"name":"internal","properties":{"addressPrefix":"10.0.1.0/24"}}]}}"#,
            )
            .create_async()
            .await;

        let data = provider_data(&server.url());
        let id = VirtualNetworkResource.id_from_config("sub", &config()).unwrap();
        let mut model = VirtualNetworkResource.expand(&id, &config(), Operation::Update).unwrap();
        VirtualNetworkResource
            .before_write(&Context::new(), &data, &id, &mut model, Operation::Update)
            .await
            .unwrap();

        let subnets = model.properties.subnets.unwrap();
        assert_eq!(subnets[0].name.as_deref(), Some("internal"));
    }
}
