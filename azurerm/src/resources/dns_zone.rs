//! `azurerm_dns_zone`

use super::required;
use crate::api::dns::{self as api, DnsZone, DnsZoneProperties};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::{schema, tags};
use crate::resource_id::DnsZoneId;
use crate::validate;
use std::collections::HashMap;
use tfplug::{AttributeType, Dynamic, Schema, SchemaBuilder};

#[derive(Default)]
pub struct DnsZoneResource;

impl DnsZoneResource {
    pub fn new() -> Self {
        Self
    }
}

impl ArmResource for DnsZoneResource {
    type Id = DnsZoneId;
    type Model = DnsZone;

    const TYPE_NAME: &'static str = "azurerm_dns_zone";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Enables you to manage DNS zones within Azure DNS.")
            .attribute(schema::name(
                "The name of the DNS Zone. Must be a valid domain name. Changing this forces a new resource to be created.",
                validate::dns_zone_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(schema::computed("number_of_record_sets", AttributeType::Number))
            .attribute(schema::computed("max_number_of_record_sets", AttributeType::Number))
            .attribute(schema::computed("name_servers", AttributeType::set_of(AttributeType::String)))
            .attribute(tags::schema())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<DnsZoneId, ResourceError> {
        Ok(DnsZoneId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "name")?,
        ))
    }

    fn expand(&self, _id: &DnsZoneId, config: &Dynamic, _op: Operation) -> Result<DnsZone, ResourceError> {
        Ok(DnsZone {
            location: api::ZONE_LOCATION.to_string(),
            tags: tags::expand(config),
            properties: Some(DnsZoneProperties {
                zone_type: Some("Public".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(&self, id: &DnsZoneId, model: DnsZone, _prior: &Dynamic) -> Attributes {
        let props = model.properties.unwrap_or_default();
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.dns_zone_name.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("number_of_record_sets".to_string(), values::opt_int(props.number_of_record_sets)),
            ("max_number_of_record_sets".to_string(), values::opt_int(props.max_number_of_record_sets)),
            (
                "name_servers".to_string(),
                values::strings_to_dynamic(props.name_servers.unwrap_or_default()),
            ),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_round_trips, object};

    #[test]
    fn zones_are_global_and_public() {
        let cfg = object(vec![
            ("name", "example.com".into()),
            ("resource_group_name", "rg".into()),
            ("tags", Dynamic::Null),
        ]);
        let id = DnsZoneResource.id_from_config("sub", &cfg).unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com"
        );
        let body = serde_json::to_value(DnsZoneResource.expand(&id, &cfg, Operation::Create).unwrap()).unwrap();
        assert_eq!(body["location"], "global");
        assert_eq!(body["properties"]["zoneType"], "Public");
        assert!(body["properties"].get("nameServers").is_none());
    }

    #[test]
    fn configured_fields_round_trip() {
        let cfg = object(vec![
            ("name", "example.com".into()),
            ("resource_group_name", "rg".into()),
            ("name_servers", Dynamic::Unknown),
            ("number_of_record_sets", Dynamic::Unknown),
            (
                "tags",
                Dynamic::Map(HashMap::from([("zone".to_string(), "public".into())])),
            ),
        ]);
        assert_round_trips(&DnsZoneResource, &cfg);
    }

    #[test]
    fn flattens_name_servers() {
        let model: DnsZone = serde_json::from_str(
            r#"{"location":"global","properties":{"maxNumberOfRecordSets":10000,"numberOfRecordSets":2,"nameServers":["ns1-01.azure-dns.com."]}}"#,
        )
        .unwrap();
        let attrs = DnsZoneResource.flatten(&DnsZoneId::new("sub", "rg", "example.com"), model, &Dynamic::Null);
        assert_eq!(attrs["number_of_record_sets"], Dynamic::Number(2.0));
        assert_eq!(attrs["name_servers"], Dynamic::List(vec!["ns1-01.azure-dns.com.".into()]));
    }
}
