//! `azurerm_network_interface`

use super::required;
use super::virtual_network;
use crate::api::network::{
    self as api, IpConfiguration, IpConfigurationProperties, NetworkInterface, NetworkInterfaceDnsSettings,
    NetworkInterfaceProperties, SubResource,
};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{location, schema, tags};
use crate::locks::LockName;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::{NetworkInterfaceId, ResourceIdentity, SubnetId};
use crate::validate::{self, ResourceIdValidator};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::schema::NestedBlock;
use tfplug::validator::OneOfValidator;
use tfplug::{
    AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode, Schema,
    SchemaBuilder,
};

pub const LOCK_KIND: &str = "azurerm_network_interface";

#[derive(Default)]
pub struct NetworkInterfaceResource;

impl NetworkInterfaceResource {
    pub fn new() -> Self {
        Self
    }
}

fn ip_configuration_block() -> NestedBlock {
    NestedBlockBuilder::new("ip_configuration", NestingMode::List)
        .min_items(1)
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .required()
                .validator(validate::func("a valid name", validate::network_name))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("subnet_id", AttributeType::String)
                .optional()
                .validator(ResourceIdValidator::<SubnetId>::new())
                .build(),
        )
        .attribute(
            AttributeBuilder::new("private_ip_address_allocation", AttributeType::String)
                .required()
                .description("The allocation method used for the Private IP Address. Possible values are `Dynamic` and `Static`.")
                .validator(OneOfValidator::new(&["Dynamic", "Static"]).ignoring_case())
                .build(),
        )
        .attribute(
            AttributeBuilder::new("private_ip_address", AttributeType::String)
                .optional()
                .computed()
                .validator(validate::func("an IPv4 address", validate::ipv4_address))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("private_ip_address_version", AttributeType::String)
                .optional()
                .default(StaticDefault::string("IPv4"))
                .validator(OneOfValidator::new(&["IPv4", "IPv6"]))
                .build(),
        )
        .attribute(AttributeBuilder::new("public_ip_address_id", AttributeType::String).optional().build())
        .attribute(AttributeBuilder::new("primary", AttributeType::Bool).optional().computed().build())
        .build()
}

fn expand_ip_configurations(config: &Dynamic) -> Vec<IpConfiguration> {
    let blocks = values::list(config, "ip_configuration");
    let any_primary = blocks.iter().any(|b| values::bool(b, "primary") == Some(true));
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let allocation = values::string(block, "private_ip_address_allocation").unwrap_or_default();
            let is_static = allocation.eq_ignore_ascii_case("Static");
            IpConfiguration {
                id: None,
                name: values::string(block, "name").unwrap_or_default(),
                properties: IpConfigurationProperties {
                    subnet: values::non_empty_string(block, "subnet_id").map(SubResource::new),
                    private_ip_address: values::non_empty_string(block, "private_ip_address").filter(|_| is_static),
                    private_ip_allocation_method: Some(allocation),
                    private_ip_address_version: values::non_empty_string(block, "private_ip_address_version"),
                    public_ip_address: values::non_empty_string(block, "public_ip_address_id").map(SubResource::new),
                    primary: Some(values::bool(block, "primary").unwrap_or(!any_primary && i == 0)),
                    extra: Default::default(),
                },
            }
        })
        .collect()
}

fn flatten_ip_configuration(c: &IpConfiguration) -> Dynamic {
    let p = &c.properties;
    Dynamic::Map(HashMap::from([
        ("name".to_string(), Dynamic::String(c.name.clone())),
        ("subnet_id".to_string(), values::opt_string(p.subnet.as_ref().map(|s| &s.id))),
        (
            "private_ip_address_allocation".to_string(),
            values::opt_string(p.private_ip_allocation_method.as_ref()),
        ),
        ("private_ip_address".to_string(), values::opt_string(p.private_ip_address.as_ref())),
        (
            "private_ip_address_version".to_string(),
            Dynamic::String(p.private_ip_address_version.clone().unwrap_or_else(|| "IPv4".to_string())),
        ),
        (
            "public_ip_address_id".to_string(),
            values::opt_string(p.public_ip_address.as_ref().map(|s| &s.id)),
        ),
        ("primary".to_string(), values::opt_bool(p.primary)),
    ]))
}

#[async_trait]
impl ArmResource for NetworkInterfaceResource {
    type Id = NetworkInterfaceId;
    type Model = NetworkInterface;

    const TYPE_NAME: &'static str = "azurerm_network_interface";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a network interface.")
            .attribute(schema::name(
                "The name of the network interface. Changing this forces a new resource to be created.",
                validate::network_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(location::schema())
            .attribute(
                AttributeBuilder::new("dns_servers", AttributeType::list_of(AttributeType::String))
                    .optional()
                    .validator(validate::each("an IPv4 address", validate::ipv4_address))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_accelerated_networking", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(false))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_ip_forwarding", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(false))
                    .build(),
            )
            .attribute(AttributeBuilder::new("internal_dns_name_label", AttributeType::String).optional().build())
            .attribute(schema::computed("applied_dns_servers", AttributeType::list_of(AttributeType::String)))
            .attribute(schema::computed("mac_address", AttributeType::String))
            .attribute(schema::computed("private_ip_address", AttributeType::String))
            .attribute(schema::computed("private_ip_addresses", AttributeType::list_of(AttributeType::String)))
            .attribute(tags::schema())
            .block(ip_configuration_block())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<NetworkInterfaceId, ResourceError> {
        Ok(NetworkInterfaceId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        values::list(config, "ip_configuration")
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                let is_static = values::string(block, "private_ip_address_allocation")
                    .is_some_and(|a| a.eq_ignore_ascii_case("Static"));
                let address = block.attr("private_ip_address");
                is_static && matches!(address, None | Some(Dynamic::Null))
            })
            .map(|(i, _)| {
                Diagnostic::error(
                    "Missing required argument",
                    "`private_ip_address` must be set when `private_ip_address_allocation` is `Static`",
                )
                .with_attribute(AttributePath::new("ip_configuration").index(i as i64).attribute("private_ip_address"))
            })
            .collect()
    }

    fn expand(&self, _id: &NetworkInterfaceId, config: &Dynamic, _op: Operation) -> Result<NetworkInterface, ResourceError> {
        Ok(NetworkInterface {
            location: values::string(config, "location").unwrap_or_default(),
            tags: tags::expand(config),
            properties: NetworkInterfaceProperties {
                ip_configurations: expand_ip_configurations(config),
                dns_settings: Some(NetworkInterfaceDnsSettings {
                    dns_servers: values::string_list(config, "dns_servers"),
                    internal_dns_name_label: values::non_empty_string(config, "internal_dns_name_label"),
                    applied_dns_servers: Vec::new(),
                }),
                enable_accelerated_networking: values::bool(config, "enable_accelerated_networking"),
                enable_ip_forwarding: values::bool(config, "enable_ip_forwarding"),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &NetworkInterfaceId, model: NetworkInterface, _prior: &Dynamic) -> Attributes {
        let props = model.properties;
        let dns = props.dns_settings.clone().unwrap_or_default();
        let addresses: Vec<String> = props
            .ip_configurations
            .iter()
            .filter_map(|c| c.properties.private_ip_address.clone())
            .collect();
        let primary_address = props
            .primary_ip_configuration()
            .and_then(|c| c.properties.private_ip_address.clone());

        HashMap::from([
            ("name".to_string(), Dynamic::String(id.network_interface_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("location".to_string(), Dynamic::String(location::normalize(&model.location))),
            ("dns_servers".to_string(), values::strings_to_dynamic(dns.dns_servers)),
            ("internal_dns_name_label".to_string(), values::opt_string(dns.internal_dns_name_label.as_ref())),
            ("applied_dns_servers".to_string(), values::strings_to_dynamic(dns.applied_dns_servers)),
            (
                "enable_accelerated_networking".to_string(),
                values::opt_bool(props.enable_accelerated_networking),
            ),
            ("enable_ip_forwarding".to_string(), values::opt_bool(props.enable_ip_forwarding)),
            ("mac_address".to_string(), values::opt_string(props.mac_address.as_ref())),
            ("private_ip_address".to_string(), values::opt_string(primary_address.as_ref())),
            ("private_ip_addresses".to_string(), values::strings_to_dynamic(addresses)),
            (
                "ip_configuration".to_string(),
                Dynamic::List(props.ip_configurations.iter().map(flatten_ip_configuration).collect()),
            ),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ])
    }

    /// The interface plus the virtual network of every subnet it joins
    fn lock_names(&self, id: &NetworkInterfaceId, config: &Dynamic) -> Vec<LockName> {
        let mut names = vec![LockName::new(id.network_interface_name.clone(), LOCK_KIND)];
        for block in values::list(config, "ip_configuration") {
            let Some(subnet) = values::non_empty_string(block, "subnet_id") else {
                continue;
            };
            if let Ok(subnet) = SubnetId::parse_insensitively(&subnet) {
                names.push(LockName::new(subnet.virtual_network_name, virtual_network::LOCK_KIND));
            }
        }
        names
    }

    async fn before_write(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &NetworkInterfaceId,
        model: &mut NetworkInterface,
        op: Operation,
    ) -> Result<(), ResourceError> {
        if op != Operation::Update {
            return Ok(());
        }
        // The security group is owned by the association resource.
        match data.client.get::<NetworkInterface>(&id.to_string(), api::API_VERSION).await {
            Ok(existing) => {
                model.properties.network_security_group = existing.properties.network_security_group;
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

    const SUBNET: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/internal";

    fn ip_configuration(name: &str, allocation: &str, address: Dynamic) -> Dynamic {
        object(vec![
            ("name", name.into()),
            ("subnet_id", SUBNET.into()),
            ("private_ip_address_allocation", allocation.into()),
            ("private_ip_address", address),
            ("private_ip_address_version", "IPv4".into()),
            ("public_ip_address_id", Dynamic::Null),
            ("primary", Dynamic::Null),
        ])
    }

    fn config(ip_configurations: Vec<Dynamic>) -> Dynamic {
        object(vec![
            ("name", "nic".into()),
            ("resource_group_name", "rg".into()),
            ("location", "westeurope".into()),
            ("dns_servers", Dynamic::Null),
            ("enable_accelerated_networking", false.into()),
            ("enable_ip_forwarding", false.into()),
            ("internal_dns_name_label", Dynamic::Null),
            ("tags", Dynamic::Null),
            ("ip_configuration", Dynamic::List(ip_configurations)),
        ])
    }

    #[test]
    fn configured_fields_round_trip() {
        let mut primary = ip_configuration("primary", "Static", "10.0.1.10".into());
        let mut secondary = ip_configuration("secondary", "Dynamic", Dynamic::Null);
        if let (Dynamic::Map(first), Dynamic::Map(second)) = (&mut primary, &mut secondary) {
            first.insert("primary".into(), true.into());
            second.insert("primary".into(), false.into());
            second.insert(
                "public_ip_address_id".into(),
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/pip".into(),
            );
        }
        let mut cfg = config(vec![primary, secondary]);
        if let Dynamic::Map(fields) = &mut cfg {
            fields.insert("dns_servers".into(), Dynamic::List(vec!["10.0.0.4".into()]));
            fields.insert("enable_ip_forwarding".into(), true.into());
            fields.insert("internal_dns_name_label".into(), "nic-internal".into());
            fields.insert(
                "tags".into(),
                Dynamic::Map(HashMap::from([("role".to_string(), "web".into())])),
            );
        }
        assert_round_trips(&NetworkInterfaceResource, &cfg);
    }

    #[test]
    fn first_ip_configuration_is_primary_by_default() {
        let cfg = config(vec![
            ip_configuration("one", "Dynamic", Dynamic::Unknown),
            ip_configuration("two", "Dynamic", Dynamic::Unknown),
        ]);
        let id = NetworkInterfaceResource.id_from_config("sub", &cfg).unwrap();
        let model = NetworkInterfaceResource.expand(&id, &cfg, Operation::Create).unwrap();
        let configs = &model.properties.ip_configurations;
        assert_eq!(configs[0].properties.primary, Some(true));
        assert_eq!(configs[1].properties.primary, Some(false));
        assert_eq!(configs[0].properties.subnet, Some(SubResource::new(SUBNET)));
    }

    #[test]
    fn static_allocation_needs_an_address() {
        let cfg = config(vec![ip_configuration("one", "Static", Dynamic::Null)]);
        assert_eq!(NetworkInterfaceResource.validate(&cfg).len(), 1);

        let cfg = config(vec![ip_configuration("one", "Static", "10.0.1.4".into())]);
        assert!(NetworkInterfaceResource.validate(&cfg).is_empty());
    }

    #[test]
    fn locks_the_virtual_network_of_each_subnet() {
        let cfg = config(vec![ip_configuration("one", "Dynamic", Dynamic::Unknown)]);
        let id = NetworkInterfaceResource.id_from_config("sub", &cfg).unwrap();
        assert_eq!(
            NetworkInterfaceResource.lock_names(&id, &cfg),
            vec![
                LockName::new("nic", "azurerm_network_interface"),
                LockName::new("vnet", "azurerm_virtual_network"),
            ]
        );
    }

    #[test]
    fn flattens_primary_private_address() {
        let body = r#"{
            "location": "westeurope",
            "properties": {
                "macAddress": "00-0D-3A-2B-3C-4D",
                "ipConfigurations": [
                    {"name": "two", "properties": {"privateIPAddress": "10.0.1.5", "primary": false}},
                    {"name": "one", "properties": {"privateIPAddress": "10.0.1.4", "primary": true}}
                ]
            }
        }"#;
        let model: NetworkInterface = serde_json::from_str(body).unwrap();
        let id = NetworkInterfaceId::new("sub", "rg", "nic");
        let attrs = NetworkInterfaceResource.flatten(&id, model, &Dynamic::Null);
        assert_eq!(attrs["private_ip_address"], Dynamic::String("10.0.1.4".into()));
        assert_eq!(attrs["mac_address"], Dynamic::String("00-0D-3A-2B-3C-4D".into()));
        assert_eq!(
            attrs["private_ip_addresses"],
            Dynamic::List(vec!["10.0.1.5".into(), "10.0.1.4".into()])
        );
    }

    #[tokio::test]
    async fn update_keeps_associated_security_group() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":"westeurope","properties":{"networkSecurityGroup":{"id":"nsg-id"}}}"#)
            .create_async()
            .await;

        let cfg = config(vec![ip_configuration("one", "Dynamic", Dynamic::Unknown)]);
        let id = NetworkInterfaceResource.id_from_config("sub", &cfg).unwrap();
        let mut model = NetworkInterfaceResource.expand(&id, &cfg, Operation::Update).unwrap();
        NetworkInterfaceResource
            .before_write(&Context::new(), &provider_data(&server.url()), &id, &mut model, Operation::Update)
            .await
            .unwrap();

        assert_eq!(model.properties.network_security_group, Some(SubResource::new("nsg-id")));
    }
}
