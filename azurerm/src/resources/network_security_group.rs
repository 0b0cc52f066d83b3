//! `azurerm_network_security_group`

use super::required;
use crate::api::network::{self as api, NetworkSecurityGroup, NetworkSecurityGroupProperties, SecurityRule, SecurityRuleProperties};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{expand, location, schema, tags};
use crate::locks::LockName;
use crate::resource_id::NetworkSecurityGroupId;
use crate::validate;
use std::collections::HashMap;
use tfplug::schema::NestedBlock;
use tfplug::validator::{IntegerValidator, NumberRangeValidator, OneOfValidator, StringLengthValidator};
use tfplug::{
    AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode, Schema,
    SchemaBuilder,
};

pub const LOCK_KIND: &str = "azurerm_network_security_group";

const PROTOCOLS: &[&str] = &["Tcp", "Udp", "Icmp", "Esp", "Ah", "*"];

/// Singular and plural spellings of the same rule field
const PAIRS: &[(&str, &str)] = &[
    ("source_port_range", "source_port_ranges"),
    ("destination_port_range", "destination_port_ranges"),
    ("source_address_prefix", "source_address_prefixes"),
    ("destination_address_prefix", "destination_address_prefixes"),
];

#[derive(Default)]
pub struct NetworkSecurityGroupResource;

impl NetworkSecurityGroupResource {
    pub fn new() -> Self {
        Self
    }
}

fn string_attr(name: &str) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::String).optional()
}

fn set_attr(name: &str) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::set_of(AttributeType::String)).optional()
}

fn security_rule_block() -> NestedBlock {
    NestedBlockBuilder::new("security_rule", NestingMode::Set)
        .description("List of security rules. Rules may also be managed with separate rule resources.")
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .required()
                .validator(StringLengthValidator::not_empty())
                .build(),
        )
        .attribute(string_attr("description").validator(StringLengthValidator::at_most(140)).build())
        .attribute(
            AttributeBuilder::new("protocol", AttributeType::String)
                .required()
                .validator(OneOfValidator::new(PROTOCOLS).ignoring_case())
                .build(),
        )
        .attribute(string_attr("source_port_range").validator(validate::func("a port or range", validate::port_or_range)).build())
        .attribute(set_attr("source_port_ranges").validator(validate::each("a port or range", validate::port_or_range)).build())
        .attribute(string_attr("destination_port_range").validator(validate::func("a port or range", validate::port_or_range)).build())
        .attribute(set_attr("destination_port_ranges").validator(validate::each("a port or range", validate::port_or_range)).build())
        .attribute(string_attr("source_address_prefix").build())
        .attribute(set_attr("source_address_prefixes").build())
        .attribute(string_attr("destination_address_prefix").build())
        .attribute(set_attr("destination_address_prefixes").build())
        .attribute(
            AttributeBuilder::new("access", AttributeType::String)
                .required()
                .validator(OneOfValidator::new(&["Allow", "Deny"]).ignoring_case())
                .build(),
        )
        .attribute(
            AttributeBuilder::new("priority", AttributeType::Number)
                .required()
                .validator(NumberRangeValidator { min: Some(100.0), max: Some(4096.0) })
                .validator(IntegerValidator)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("direction", AttributeType::String)
                .required()
                .validator(OneOfValidator::new(&["Inbound", "Outbound"]).ignoring_case())
                .build(),
        )
        .build()
}

fn expand_rule(rule: &Dynamic) -> SecurityRule {
    let plural = |name: &str| expand::optional_list(values::string_list(rule, name));
    SecurityRule {
        id: None,
        name: values::string(rule, "name").unwrap_or_default(),
        properties: SecurityRuleProperties {
            description: values::non_empty_string(rule, "description"),
            protocol: values::string(rule, "protocol").unwrap_or_default(),
            source_port_range: values::non_empty_string(rule, "source_port_range"),
            source_port_ranges: plural("source_port_ranges"),
            destination_port_range: values::non_empty_string(rule, "destination_port_range"),
            destination_port_ranges: plural("destination_port_ranges"),
            source_address_prefix: values::non_empty_string(rule, "source_address_prefix"),
            source_address_prefixes: plural("source_address_prefixes"),
            destination_address_prefix: values::non_empty_string(rule, "destination_address_prefix"),
            destination_address_prefixes: plural("destination_address_prefixes"),
            access: values::string(rule, "access").unwrap_or_default(),
            priority: values::int(rule, "priority").unwrap_or_default(),
            direction: values::string(rule, "direction").unwrap_or_default(),
        },
    }
}

fn flatten_rule(rule: SecurityRule) -> Dynamic {
    let p = rule.properties;
    let many = |v: Option<Vec<String>>| values::strings_to_dynamic(v.unwrap_or_default());
    Dynamic::Map(HashMap::from([
        ("name".to_string(), Dynamic::String(rule.name)),
        ("description".to_string(), values::opt_string(p.description.as_ref())),
        ("protocol".to_string(), Dynamic::String(p.protocol)),
        ("source_port_range".to_string(), values::opt_string(p.source_port_range.as_ref())),
        ("source_port_ranges".to_string(), many(p.source_port_ranges)),
        ("destination_port_range".to_string(), values::opt_string(p.destination_port_range.as_ref())),
        ("destination_port_ranges".to_string(), many(p.destination_port_ranges)),
        ("source_address_prefix".to_string(), values::opt_string(p.source_address_prefix.as_ref())),
        ("source_address_prefixes".to_string(), many(p.source_address_prefixes)),
        ("destination_address_prefix".to_string(), values::opt_string(p.destination_address_prefix.as_ref())),
        ("destination_address_prefixes".to_string(), many(p.destination_address_prefixes)),
        ("access".to_string(), Dynamic::String(p.access)),
        ("priority".to_string(), Dynamic::Number(p.priority as f64)),
        ("direction".to_string(), Dynamic::String(p.direction)),
    ]))
}

impl ArmResource for NetworkSecurityGroupResource {
    type Id = NetworkSecurityGroupId;
    type Model = NetworkSecurityGroup;

    const TYPE_NAME: &'static str = "azurerm_network_security_group";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a network security group that contains a list of network security rules.")
            .attribute(schema::name(
                "Specifies the name of the network security group. Changing this forces a new resource to be created.",
                validate::network_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(location::schema())
            .attribute(tags::schema())
            .block(security_rule_block())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<NetworkSecurityGroupId, ResourceError> {
        Ok(NetworkSecurityGroupId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (index, rule) in values::list(config, "security_rule").iter().enumerate() {
            for (single, plural) in PAIRS {
                let has_single = values::non_empty_string(rule, single).is_some();
                let has_plural = !values::list(rule, plural).is_empty();
                if has_single && has_plural {
                    diagnostics.push(
                        Diagnostic::error(
                            "Conflicting configuration arguments",
                            format!("only one of `{}` and `{}` can be set", single, plural),
                        )
                        .with_attribute(AttributePath::new("security_rule").index(index as i64).attribute(single)),
                    );
                }
            }
        }
        diagnostics
    }

    fn expand(&self, _id: &NetworkSecurityGroupId, config: &Dynamic, _op: Operation) -> Result<NetworkSecurityGroup, ResourceError> {
        Ok(NetworkSecurityGroup {
            location: values::string(config, "location").unwrap_or_default(),
            tags: tags::expand(config),
            properties: NetworkSecurityGroupProperties {
                security_rules: values::list(config, "security_rule").iter().map(expand_rule).collect(),
                provisioning_state: None,
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &NetworkSecurityGroupId, model: NetworkSecurityGroup, _prior: &Dynamic) -> Attributes {
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.network_security_group_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("location".to_string(), Dynamic::String(location::normalize(&model.location))),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
            (
                "security_rule".to_string(),
                Dynamic::List(model.properties.security_rules.into_iter().map(flatten_rule).collect()),
            ),
        ])
    }

    fn lock_names(&self, id: &NetworkSecurityGroupId, _config: &Dynamic) -> Vec<LockName> {
        vec![LockName::new(id.network_security_group_name.clone(), LOCK_KIND)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object};

    fn rule(extra: Vec<(&str, Dynamic)>) -> Dynamic {
        let mut pairs = vec![
            ("name", "ssh".into()),
            ("protocol", "Tcp".into()),
            ("access", "Allow".into()),
            ("priority", Dynamic::Number(100.0)),
            ("direction", "Inbound".into()),
            ("source_port_range", "*".into()),
            ("destination_port_range", "22".into()),
            ("source_address_prefix", "*".into()),
            ("destination_address_prefix", "*".into()),
        ];
        pairs.extend(extra);
        object(pairs)
    }

    fn config(rules: Vec<Dynamic>) -> Dynamic {
        object(vec![
            ("name", "nsg".into()),
            ("resource_group_name", "rg".into()),
            ("location", "westeurope".into()),
            ("tags", Dynamic::Null),
            ("security_rule", Dynamic::List(rules)),
        ])
    }

    #[test]
    fn expands_rules_with_singular_fields() {
        let cfg = config(vec![rule(vec![])]);
        let id = NetworkSecurityGroupResource.id_from_config("sub", &cfg).unwrap();
        let body = serde_json::to_value(NetworkSecurityGroupResource.expand(&id, &cfg, Operation::Create).unwrap()).unwrap();
        let rule = &body["properties"]["securityRules"][0];
        assert_eq!(rule["name"], "ssh");
        assert_eq!(rule["properties"]["destinationPortRange"], "22");
        assert_eq!(rule["properties"]["priority"], 100);
        assert!(rule["properties"].get("destinationPortRanges").is_none());
    }

    #[test]
    fn configured_fields_round_trip() {
        let web = object(vec![
            ("name", "web".into()),
            ("description", "allow web traffic".into()),
            ("protocol", "Tcp".into()),
            ("access", "Allow".into()),
            ("priority", Dynamic::Number(200.0)),
            ("direction", "Inbound".into()),
            ("source_port_range", "*".into()),
            ("destination_port_ranges", Dynamic::List(vec!["80".into(), "443".into()])),
            ("source_address_prefixes", Dynamic::List(vec!["10.0.0.0/24".into(), "10.0.1.0/24".into()])),
            ("destination_address_prefix", "VirtualNetwork".into()),
            ("source_port_ranges", Dynamic::Null),
            ("destination_port_range", Dynamic::Null),
        ]);
        let mut cfg = config(vec![rule(vec![]), web]);
        if let Dynamic::Map(fields) = &mut cfg {
            fields.insert(
                "tags".into(),
                Dynamic::Map(HashMap::from([("team".to_string(), "net".into())])),
            );
        }
        assert_round_trips(&NetworkSecurityGroupResource, &cfg);
    }

    #[test]
    fn rejects_singular_and_plural_together() {
        let cfg = config(vec![rule(vec![(
            "destination_port_ranges",
            Dynamic::List(vec!["80".into(), "443".into()]),
        )])]);
        let diagnostics = NetworkSecurityGroupResource.validate(&cfg);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].detail.contains("destination_port_range"));
    }

    #[test]
    fn flattens_rules_from_arm() {
        let body = r#"{
            "location": "westeurope",
            "properties": {"securityRules": [{
                "name": "web",
                "properties": {
                    "protocol": "Tcp", "access": "Allow", "priority": 200, "direction": "Inbound",
                    "sourcePortRange": "*", "destinationPortRanges": ["80", "443"],
                    "sourceAddressPrefix": "*", "destinationAddressPrefix": "*"
                }
            }]}
        }"#;
        let model: NetworkSecurityGroup = serde_json::from_str(body).unwrap();
        let id = NetworkSecurityGroupId::new("sub", "rg", "nsg");
        let attrs = NetworkSecurityGroupResource.flatten(&id, model, &Dynamic::Null);
        let rules = attrs["security_rule"].as_list().unwrap();
        assert_eq!(
            rules[0].attr("destination_port_ranges"),
            Some(&Dynamic::List(vec!["80".into(), "443".into()]))
        );
        assert_eq!(rules[0].attr("priority"), Some(&Dynamic::Number(200.0)));
    }
}
