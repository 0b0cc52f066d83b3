//! Managed resource types

mod analysis_services_server;
mod api_management_backend;
mod cosmosdb_mongo_collection;
mod dns_a_record;
mod dns_zone;
mod network_interface;
mod network_interface_security_group_association;
mod network_security_group;
mod resource_group;
mod storage_account;
mod subnet;
mod virtual_network;

pub use analysis_services_server::AnalysisServicesServerResource;
pub use api_management_backend::ApiManagementBackendResource;
pub use cosmosdb_mongo_collection::CosmosDbMongoCollectionResource;
pub use dns_a_record::DnsARecordResource;
pub use dns_zone::DnsZoneResource;
pub use network_interface::NetworkInterfaceResource;
pub use network_interface_security_group_association::NetworkInterfaceSecurityGroupAssociationResource;
pub use network_security_group::NetworkSecurityGroupResource;
pub use resource_group::ResourceGroupResource;
pub use storage_account::StorageAccountResource;
pub use subnet::SubnetResource;
pub use virtual_network::VirtualNetworkResource;

use crate::arm::ResourceError;
use crate::helpers::values;
use tfplug::Dynamic;

/// Known string attribute needed to build an ID
fn required(config: &Dynamic, name: &str) -> Result<String, ResourceError> {
    values::string(config, name).ok_or_else(|| ResourceError::invalid(format!("`{}` must be known", name)))
}
