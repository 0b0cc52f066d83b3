//! Azure Resource Manager resource IDs
//!
//! An ID is `/subscriptions/{sub}[/resourceGroups/{rg}][/providers/{ns}]`
//! followed by ordered `{type}/{name}` pairs. [`ResourceId`] is the untyped
//! form; the typed IDs below declare exactly which segments they carry.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIdError {
    #[error("ID was empty")]
    Empty,

    #[error("ID {0:?} must start with a '/'")]
    MissingLeadingSlash(String),

    #[error("ID {0:?} contains an empty segment")]
    EmptySegment(String),

    #[error("ID {0:?} has an odd number of segments")]
    OddSegments(String),

    #[error("ID {0:?} does not begin with a subscriptions segment")]
    MissingSubscription(String),

    #[error("ID {id:?} is missing the {segment:?} segment")]
    MissingSegment { id: String, segment: String },

    #[error("ID {id:?} expected provider {expected:?} but found {actual:?}")]
    WrongProvider {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("ID {id:?} expected segment {expected:?} but found {actual:?}")]
    UnexpectedSegment {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("ID {id:?} has unexpected trailing segments starting at {segment:?}")]
    ExtraSegments { id: String, segment: String },

    #[error("ID {id:?} is not a composite of two IDs separated by '|'")]
    InvalidComposite { id: String },
}

/// Untyped ARM resource ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub provider: Option<String>,
    /// Ordered `(type, name)` pairs after the provider namespace
    pub segments: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self, ResourceIdError> {
        Self::parse_with(id, false)
    }

    /// Accepts `resourcegroups`, `Providers` and similar casing from ARM
    pub fn parse_insensitively(id: &str) -> Result<Self, ResourceIdError> {
        Self::parse_with(id, true)
    }

    fn parse_with(id: &str, insensitive: bool) -> Result<Self, ResourceIdError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ResourceIdError::Empty);
        }
        let rest = trimmed
            .strip_prefix('/')
            .ok_or_else(|| ResourceIdError::MissingLeadingSlash(id.to_string()))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ResourceIdError::EmptySegment(id.to_string()));
        }
        if parts.len() % 2 != 0 {
            return Err(ResourceIdError::OddSegments(id.to_string()));
        }

        let key_is = |key: &str, expected: &str| {
            if insensitive {
                key.eq_ignore_ascii_case(expected)
            } else {
                key == expected
            }
        };

        let mut pairs = parts.chunks(2).map(|c| (c[0], c[1])).peekable();

        let subscription_id = match pairs.next() {
            Some((key, value)) if key_is(key, "subscriptions") => value.to_string(),
            _ => return Err(ResourceIdError::MissingSubscription(id.to_string())),
        };

        let resource_group = match pairs.peek() {
            Some((key, value)) if key_is(key, "resourceGroups") => {
                let value = value.to_string();
                pairs.next();
                Some(value)
            }
            _ => None,
        };

        let provider = match pairs.peek() {
            Some((key, value)) if key_is(key, "providers") => {
                let value = value.to_string();
                pairs.next();
                Some(value)
            }
            _ => None,
        };

        let segments = pairs
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            segments,
        })
    }

    /// Name of the last segment, e.g. the subnet name of a subnet ID
    pub fn name(&self) -> Option<&str> {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .or(self.resource_group.as_deref())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/resourceGroups/{}", rg)?;
        }
        if let Some(provider) = &self.provider {
            write!(f, "/providers/{}", provider)?;
        }
        for (key, value) in &self.segments {
            write!(f, "/{}/{}", key, value)?;
        }
        Ok(())
    }
}

/// Behaviour shared by every typed ID
pub trait ResourceIdentity: fmt::Display + Clone + Send + Sync + Sized + 'static {
    /// Human name used in messages, e.g. "Subnet"
    const DISPLAY_NAME: &'static str;

    fn parse(id: &str) -> Result<Self, ResourceIdError>;

    fn parse_insensitively(id: &str) -> Result<Self, ResourceIdError>;

    /// `Subnet (Subscription: "..." / Resource Group Name: "..." / ...)`
    fn describe(&self) -> String;
}

/// Checks the untyped `parsed` form against a typed layout
fn match_layout(
    id: &str,
    parsed: ResourceId,
    with_group: bool,
    provider: Option<&str>,
    keys: &[&str],
    insensitive: bool,
) -> Result<Vec<String>, ResourceIdError> {
    let eq = |a: &str, b: &str| {
        if insensitive {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    };

    if with_group && parsed.resource_group.is_none() {
        return Err(ResourceIdError::MissingSegment {
            id: id.to_string(),
            segment: "resourceGroups".to_string(),
        });
    }

    match (provider, parsed.provider.as_deref()) {
        (Some(expected), Some(actual)) if !eq(expected, actual) => {
            return Err(ResourceIdError::WrongProvider {
                id: id.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
        (Some(_), None) => {
            return Err(ResourceIdError::MissingSegment {
                id: id.to_string(),
                segment: "providers".to_string(),
            })
        }
        (None, Some(actual)) => {
            return Err(ResourceIdError::ExtraSegments {
                id: id.to_string(),
                segment: format!("providers/{}", actual),
            })
        }
        _ => {}
    }

    let mut names = Vec::with_capacity(keys.len());
    let mut segments = parsed.segments.into_iter();
    for key in keys {
        match segments.next() {
            Some((actual, value)) if eq(key, &actual) => names.push(value),
            Some((actual, _)) => {
                return Err(ResourceIdError::UnexpectedSegment {
                    id: id.to_string(),
                    expected: key.to_string(),
                    actual,
                })
            }
            None => {
                return Err(ResourceIdError::MissingSegment {
                    id: id.to_string(),
                    segment: key.to_string(),
                })
            }
        }
    }
    if let Some((extra, _)) = segments.next() {
        return Err(ResourceIdError::ExtraSegments {
            id: id.to_string(),
            segment: extra,
        });
    }
    Ok(names)
}

/// Declares a typed resource ID. Every segment field is a `String`.
macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        $name:ident, $display:literal,
        provider: $provider:expr,
        segments: [$(($field:ident, $key:literal, $label:literal)),* $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub subscription_id: String,
            pub resource_group_name: String,
            $(pub $field: String,)*
        }

        impl $name {
            const PROVIDER: Option<&'static str> = $provider;

            pub fn new(
                subscription_id: impl Into<String>,
                resource_group_name: impl Into<String>,
                $($field: impl Into<String>,)*
            ) -> Self {
                Self {
                    subscription_id: subscription_id.into(),
                    resource_group_name: resource_group_name.into(),
                    $($field: $field.into(),)*
                }
            }

            fn parse_with(id: &str, insensitive: bool) -> Result<Self, ResourceIdError> {
                let parsed = if insensitive {
                    ResourceId::parse_insensitively(id)?
                } else {
                    ResourceId::parse(id)?
                };
                let subscription_id = parsed.subscription_id.clone();
                let resource_group_name = parsed.resource_group.clone().unwrap_or_default();
                #[allow(unused_mut, unused_variables)]
                let mut names = match_layout(
                    id,
                    parsed,
                    true,
                    Self::PROVIDER,
                    &[$($key),*],
                    insensitive,
                )?
                .into_iter();
                Ok(Self {
                    subscription_id,
                    resource_group_name,
                    $($field: names.next().unwrap_or_default(),)*
                })
            }
        }

        impl ResourceIdentity for $name {
            const DISPLAY_NAME: &'static str = $display;

            fn parse(id: &str) -> Result<Self, ResourceIdError> {
                Self::parse_with(id, false)
            }

            fn parse_insensitively(id: &str) -> Result<Self, ResourceIdError> {
                Self::parse_with(id, true)
            }

            fn describe(&self) -> String {
                #[allow(unused_mut)]
                let mut parts = vec![
                    format!("Subscription: {:?}", self.subscription_id),
                    format!("Resource Group Name: {:?}", self.resource_group_name),
                ];
                $(parts.push(format!("{}: {:?}", $label, self.$field));)*
                format!("{} ({})", $display, parts.join(" / "))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "/subscriptions/{}/resourceGroups/{}",
                    self.subscription_id, self.resource_group_name
                )?;
                if let Some(provider) = Self::PROVIDER {
                    write!(f, "/providers/{}", provider)?;
                }
                $(write!(f, "/{}/{}", $key, self.$field)?;)*
                Ok(())
            }
        }
    };
}

resource_id!(
    ResourceGroupId, "Resource Group",
    provider: None,
    segments: []
);

resource_id!(
    VirtualNetworkId, "Virtual Network",
    provider: Some("Microsoft.Network"),
    segments: [(virtual_network_name, "virtualNetworks", "Virtual Network Name")]
);

resource_id!(
    SubnetId, "Subnet",
    provider: Some("Microsoft.Network"),
    segments: [
        (virtual_network_name, "virtualNetworks", "Virtual Network Name"),
        (subnet_name, "subnets", "Subnet Name"),
    ]
);

resource_id!(
    NetworkSecurityGroupId, "Network Security Group",
    provider: Some("Microsoft.Network"),
    segments: [(network_security_group_name, "networkSecurityGroups", "Network Security Group Name")]
);

resource_id!(
    NetworkInterfaceId, "Network Interface",
    provider: Some("Microsoft.Network"),
    segments: [(network_interface_name, "networkInterfaces", "Network Interface Name")]
);

resource_id!(
    DnsZoneId, "DNS Zone",
    provider: Some("Microsoft.Network"),
    segments: [(dns_zone_name, "dnsZones", "Dns Zone Name")]
);

resource_id!(
    DnsARecordId, "DNS A Record",
    provider: Some("Microsoft.Network"),
    segments: [
        (dns_zone_name, "dnsZones", "Dns Zone Name"),
        (record_name, "A", "Relative Record Set Name"),
    ]
);

resource_id!(
    StorageAccountId, "Storage Account",
    provider: Some("Microsoft.Storage"),
    segments: [(storage_account_name, "storageAccounts", "Storage Account Name")]
);

resource_id!(
    ApiManagementServiceId, "API Management Service",
    provider: Some("Microsoft.ApiManagement"),
    segments: [(service_name, "service", "Service Name")]
);

resource_id!(
    ApiManagementBackendId, "API Management Backend",
    provider: Some("Microsoft.ApiManagement"),
    segments: [
        (service_name, "service", "Service Name"),
        (backend_id, "backends", "Backend Id"),
    ]
);

resource_id!(
    AnalysisServicesServerId, "Analysis Services Server",
    provider: Some("Microsoft.AnalysisServices"),
    segments: [(server_name, "servers", "Server Name")]
);

resource_id!(
    CosmosMongoCollectionId, "Mongo Collection",
    provider: Some("Microsoft.DocumentDB"),
    segments: [
        (database_account_name, "databaseAccounts", "Database Account Name"),
        (mongodb_database_name, "mongodbDatabases", "Mongodb Database Name"),
        (collection_name, "collections", "Collection Name"),
    ]
);

/// `{networkInterfaceId}|{networkSecurityGroupId}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceSecurityGroupAssociationId {
    pub network_interface: NetworkInterfaceId,
    pub network_security_group: NetworkSecurityGroupId,
}

impl NetworkInterfaceSecurityGroupAssociationId {
    pub fn new(network_interface: NetworkInterfaceId, network_security_group: NetworkSecurityGroupId) -> Self {
        Self {
            network_interface,
            network_security_group,
        }
    }

    fn parse_with(id: &str, insensitive: bool) -> Result<Self, ResourceIdError> {
        let (nic, nsg) = id.split_once('|').ok_or_else(|| ResourceIdError::InvalidComposite {
            id: id.to_string(),
        })?;
        if nsg.contains('|') {
            return Err(ResourceIdError::InvalidComposite { id: id.to_string() });
        }
        let (network_interface, network_security_group) = if insensitive {
            (
                NetworkInterfaceId::parse_insensitively(nic)?,
                NetworkSecurityGroupId::parse_insensitively(nsg)?,
            )
        } else {
            (NetworkInterfaceId::parse(nic)?, NetworkSecurityGroupId::parse(nsg)?)
        };
        Ok(Self::new(network_interface, network_security_group))
    }
}

impl ResourceIdentity for NetworkInterfaceSecurityGroupAssociationId {
    const DISPLAY_NAME: &'static str = "Network Interface Security Group Association";

    fn parse(id: &str) -> Result<Self, ResourceIdError> {
        Self::parse_with(id, false)
    }

    fn parse_insensitively(id: &str) -> Result<Self, ResourceIdError> {
        Self::parse_with(id, true)
    }

    fn describe(&self) -> String {
        format!(
            "{} (Network Interface: {:?} / Network Security Group: {:?})",
            Self::DISPLAY_NAME,
            self.network_interface.to_string(),
            self.network_security_group.to_string()
        )
    }
}

impl fmt::Display for NetworkInterfaceSecurityGroupAssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.network_interface, self.network_security_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1";

    #[test]
    fn parses_and_rebuilds_untyped_id() {
        let id = ResourceId::parse(SUBNET).unwrap();
        assert_eq!(id.subscription_id, "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.resource_group.as_deref(), Some("rg1"));
        assert_eq!(id.provider.as_deref(), Some("Microsoft.Network"));
        assert_eq!(id.segments.len(), 2);
        assert_eq!(id.name(), Some("subnet1"));
        assert_eq!(id.to_string(), SUBNET);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(ResourceId::parse(""), Err(ResourceIdError::Empty));
        assert!(matches!(
            ResourceId::parse("subscriptions/s"),
            Err(ResourceIdError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            ResourceId::parse("/subscriptions/s/resourceGroups"),
            Err(ResourceIdError::OddSegments(_))
        ));
        assert!(matches!(
            ResourceId::parse("/subscriptions//resourceGroups/rg"),
            Err(ResourceIdError::EmptySegment(_))
        ));
        assert!(matches!(
            ResourceId::parse("/tenants/t/resourceGroups/rg"),
            Err(ResourceIdError::MissingSubscription(_))
        ));
    }

    #[test]
    fn typed_id_round_trips() {
        let id = SubnetId::parse(SUBNET).unwrap();
        assert_eq!(id.resource_group_name, "rg1");
        assert_eq!(id.virtual_network_name, "vnet1");
        assert_eq!(id.subnet_name, "subnet1");
        assert_eq!(id.to_string(), SUBNET);
        assert_eq!(
            id,
            SubnetId::new("00000000-0000-0000-0000-000000000000", "rg1", "vnet1", "subnet1")
        );
    }

    #[test]
    fn typed_id_rejects_missing_segments() {
        let vnet = "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1";
        assert!(matches!(
            SubnetId::parse(vnet),
            Err(ResourceIdError::MissingSegment { segment, .. }) if segment == "subnets"
        ));
        assert!(matches!(
            VirtualNetworkId::parse(SUBNET),
            Err(ResourceIdError::ExtraSegments { segment, .. }) if segment == "subnets"
        ));
        assert!(matches!(
            ResourceGroupId::parse("/subscriptions/s"),
            Err(ResourceIdError::MissingSegment { .. })
        ));
        assert!(matches!(
            StorageAccountId::parse(
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/storageAccounts/a"
            ),
            Err(ResourceIdError::WrongProvider { .. })
        ));
    }

    #[test]
    fn strict_parse_is_case_sensitive() {
        let lower = "/subscriptions/s/resourcegroups/rg1/providers/Microsoft.Network/virtualnetworks/vnet1";
        assert!(VirtualNetworkId::parse(lower).is_err());

        let id = VirtualNetworkId::parse_insensitively(lower).unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1"
        );
    }

    #[test]
    fn resource_group_id_has_no_provider() {
        let id = ResourceGroupId::parse("/subscriptions/s/resourceGroups/rg1").unwrap();
        assert_eq!(id.resource_group_name, "rg1");
        assert_eq!(id.to_string(), "/subscriptions/s/resourceGroups/rg1");
        assert!(ResourceGroupId::parse(SUBNET).is_err());
    }

    #[test]
    fn describe_lists_every_segment() {
        let id = SubnetId::new("s", "rg", "vnet", "sub");
        assert_eq!(
            id.describe(),
            r#"Subnet (Subscription: "s" / Resource Group Name: "rg" / Virtual Network Name: "vnet" / Subnet Name: "sub")"#
        );
    }

    #[test]
    fn dns_record_and_cosmos_ids_parse() {
        let record = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/A/www";
        let id = DnsARecordId::parse(record).unwrap();
        assert_eq!(id.dns_zone_name, "example.com");
        assert_eq!(id.record_name, "www");
        assert_eq!(id.to_string(), record);

        let coll = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DocumentDB/databaseAccounts/acc/mongodbDatabases/db/collections/c";
        let id = CosmosMongoCollectionId::parse(coll).unwrap();
        assert_eq!(id.mongodb_database_name, "db");
        assert_eq!(id.collection_name, "c");
    }

    #[test]
    fn association_id_is_pipe_separated() {
        let nic = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1";
        let nsg = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg1";
        let raw = format!("{}|{}", nic, nsg);

        let id = NetworkInterfaceSecurityGroupAssociationId::parse(&raw).unwrap();
        assert_eq!(id.network_interface.network_interface_name, "nic1");
        assert_eq!(id.network_security_group.network_security_group_name, "nsg1");
        assert_eq!(id.to_string(), raw);

        assert!(matches!(
            NetworkInterfaceSecurityGroupAssociationId::parse(nic),
            Err(ResourceIdError::InvalidComposite { .. })
        ));
    }
}
