//! `azurerm_dns_a_record`
//!
//! A record set holds either literal addresses or an alias to another
//! Azure resource, never both.

use super::required;
use crate::api::dns::{self as api, ARecord, RecordSet, RecordSetProperties};
use crate::api::network::SubResource;
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{schema, tags};
use crate::resource_id::DnsARecordId;
use crate::validate;
use std::collections::HashMap;
use tfplug::validator::{IntegerValidator, NumberRangeValidator};
use tfplug::{AttributeBuilder, AttributeType, Diagnostic, Dynamic, Schema, SchemaBuilder};

#[derive(Default)]
pub struct DnsARecordResource;

impl DnsARecordResource {
    pub fn new() -> Self {
        Self
    }
}

impl ArmResource for DnsARecordResource {
    type Id = DnsARecordId;
    type Model = RecordSet;

    const TYPE_NAME: &'static str = "azurerm_dns_a_record";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Enables you to manage DNS A Records within Azure DNS.")
            .attribute(schema::name(
                "The name of the DNS A Record. Changing this forces a new resource to be created.",
                validate::dns_record_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(schema::parent_name(
                "zone_name",
                "Specifies the DNS Zone where the resource exists. Changing this forces a new resource to be created.",
                validate::dns_zone_name,
            ))
            .attribute(
                AttributeBuilder::new("ttl", AttributeType::Number)
                    .required()
                    .description("The Time To Live (TTL) of the DNS record in seconds.")
                    .validator(NumberRangeValidator { min: Some(0.0), max: Some(2147483647.0) })
                    .validator(IntegerValidator)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("records", AttributeType::set_of(AttributeType::String))
                    .optional()
                    .description("List of IPv4 Addresses. Conflicts with `target_resource_id`.")
                    .validator(validate::each("an IPv4 address", validate::ipv4_address))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("target_resource_id", AttributeType::String)
                    .optional()
                    .description("The Azure resource id of the target object. Conflicts with `records`.")
                    .build(),
            )
            .attribute(schema::computed("fqdn", AttributeType::String))
            .attribute(tags::schema())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<DnsARecordId, ResourceError> {
        Ok(DnsARecordId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "zone_name")?,
            required(config, "name")?,
        ))
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        let records = config.attr("records").unwrap_or(&Dynamic::Null);
        let target = config.attr("target_resource_id").unwrap_or(&Dynamic::Null);
        if records.is_unknown() || target.is_unknown() {
            return Vec::new();
        }
        let has_records = records.as_list().is_some_and(|r| !r.is_empty());
        let has_target = target.as_str().is_some_and(|t| !t.is_empty());
        match (has_records, has_target) {
            (true, false) | (false, true) => Vec::new(),
            _ => vec![Diagnostic::error(
                "Invalid combination of arguments",
                "exactly one of `records` or `target_resource_id` must be specified",
            )],
        }
    }

    fn expand(&self, _id: &DnsARecordId, config: &Dynamic, _op: Operation) -> Result<RecordSet, ResourceError> {
        let records: Vec<ARecord> = values::string_list(config, "records")
            .into_iter()
            .map(|ipv4_address| ARecord { ipv4_address })
            .collect();
        let target_resource = values::non_empty_string(config, "target_resource_id").map(SubResource::new);
        Ok(RecordSet {
            properties: RecordSetProperties {
                ttl: values::int(config, "ttl"),
                metadata: tags::expand(config),
                fqdn: None,
                // ARM rejects an empty record list next to an alias target.
                a_records: if target_resource.is_some() { None } else { Some(records) },
                target_resource,
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &DnsARecordId, model: RecordSet, _prior: &Dynamic) -> Attributes {
        let props = model.properties;
        let records: Vec<String> = props
            .a_records
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.ipv4_address)
            .collect();
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.record_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("zone_name".to_string(), Dynamic::String(id.dns_zone_name.clone())),
            ("ttl".to_string(), values::opt_int(props.ttl)),
            ("records".to_string(), values::strings_to_dynamic(records)),
            (
                "target_resource_id".to_string(),
                values::opt_string(props.target_resource.as_ref().map(|t| &t.id)),
            ),
            ("fqdn".to_string(), values::opt_string(props.fqdn.as_ref())),
            ("tags".to_string(), tags::flatten(props.metadata.as_ref())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object};

    fn config(records: Dynamic, target: Dynamic) -> Dynamic {
        object(vec![
            ("name", "www".into()),
            ("zone_name", "example.com".into()),
            ("resource_group_name", "rg".into()),
            ("ttl", Dynamic::Number(300.0)),
            ("records", records),
            ("target_resource_id", target),
            ("tags", Dynamic::Map(HashMap::from([("env".to_string(), "prod".into())]))),
        ])
    }

    #[test]
    fn requires_exactly_one_of_records_and_target() {
        let both = config(Dynamic::List(vec!["10.0.0.1".into()]), "/subscriptions/sub/x".into());
        assert_eq!(DnsARecordResource.validate(&both).len(), 1);

        let neither = config(Dynamic::Null, Dynamic::Null);
        assert_eq!(DnsARecordResource.validate(&neither).len(), 1);

        let records = config(Dynamic::List(vec!["10.0.0.1".into()]), Dynamic::Null);
        assert!(DnsARecordResource.validate(&records).is_empty());

        let pending = config(Dynamic::Unknown, Dynamic::Null);
        assert!(DnsARecordResource.validate(&pending).is_empty());
    }

    #[test]
    fn tags_travel_as_metadata() {
        let cfg = config(Dynamic::List(vec!["10.0.0.1".into()]), Dynamic::Null);
        let id = DnsARecordResource.id_from_config("sub", &cfg).unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/A/www"
        );
        let body = serde_json::to_value(DnsARecordResource.expand(&id, &cfg, Operation::Create).unwrap()).unwrap();
        assert_eq!(body["properties"]["TTL"], 300);
        assert_eq!(body["properties"]["metadata"]["env"], "prod");
        assert_eq!(body["properties"]["ARecords"][0]["ipv4Address"], "10.0.0.1");
    }

    #[test]
    fn records_and_alias_targets_round_trip() {
        let records = config(
            Dynamic::List(vec!["10.0.0.1".into(), "10.0.0.2".into()]),
            Dynamic::Null,
        );
        assert_round_trips(&DnsARecordResource, &records);

        let alias = config(
            Dynamic::Null,
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/pip".into(),
        );
        assert_round_trips(&DnsARecordResource, &alias);
    }

    #[test]
    fn flattens_fqdn_and_records() {
        let model: RecordSet = serde_json::from_str(
            r#"{"name":"www","properties":{"TTL":300,"fqdn":"www.example.com.","ARecords":[{"ipv4Address":"10.0.0.1"}]}}"#,
        )
        .unwrap();
        let id = DnsARecordId::new("sub", "rg", "example.com", "www");
        let attrs = DnsARecordResource.flatten(&id, model, &Dynamic::Null);
        assert_eq!(attrs["fqdn"], Dynamic::String("www.example.com.".into()));
        assert_eq!(attrs["records"], Dynamic::List(vec!["10.0.0.1".into()]));
        assert_eq!(attrs["ttl"], Dynamic::Number(300.0));
    }
}
