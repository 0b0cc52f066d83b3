//! `azurerm_network_interface_security_group_association`
//!
//! Not an ARM object of its own: the association is the
//! `networkSecurityGroup` reference on a network interface, so every
//! operation is a read-modify-write of the interface under its lock.

use super::network_interface::LOCK_KIND;
use crate::api::network::{self as api, NetworkInterface, SubResource};
use crate::api::poller;
use crate::arm::{self, ResourceError};
use crate::helpers::{expand, schema};
use crate::helpers::timeouts::{self, Operation, Timeouts};
use crate::helpers::values;
use crate::locks;
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::{
    NetworkInterfaceId, NetworkInterfaceSecurityGroupAssociationId, NetworkSecurityGroupId, ResourceIdentity,
};
use crate::validate::ResourceIdValidator;
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest, CreateResourceResponse,
    DeleteResourceRequest, DeleteResourceResponse, ImportResourceStateRequest, ImportResourceStateResponse,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse, ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::{
    import_state_passthrough_id, AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, DynamicValue,
    Schema, SchemaBuilder,
};

const TYPE_NAME: &str = "azurerm_network_interface_security_group_association";

#[derive(Default)]
pub struct NetworkInterfaceSecurityGroupAssociationResource {
    provider_data: Option<AzureRmProviderData>,
}

impl NetworkInterfaceSecurityGroupAssociationResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_data(mut self, data: AzureRmProviderData) -> Self {
        self.provider_data = Some(data);
        self
    }

    fn id_from_config(config: &Dynamic) -> Result<NetworkInterfaceSecurityGroupAssociationId, ResourceError> {
        let nic = values::string(config, "network_interface_id").unwrap_or_default();
        let nsg = values::string(config, "network_security_group_id").unwrap_or_default();
        Ok(NetworkInterfaceSecurityGroupAssociationId::new(
            NetworkInterfaceId::parse_insensitively(&nic)?,
            NetworkSecurityGroupId::parse_insensitively(&nsg)?,
        ))
    }

    async fn get_interface(
        data: &AzureRmProviderData,
        id: &NetworkInterfaceId,
    ) -> Result<Option<NetworkInterface>, ResourceError> {
        match data.client.get(&id.to_string(), api::API_VERSION).await {
            Ok(nic) => Ok(Some(nic)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn associate(
        ctx: &Context,
        data: &AzureRmProviderData,
        id: &NetworkInterfaceSecurityGroupAssociationId,
    ) -> Result<(), ResourceError> {
        let nic_id = &id.network_interface;
        let _lock = locks::by_name(&nic_id.network_interface_name, LOCK_KIND).await;

        let mut nic = Self::get_interface(data, nic_id)
            .await?
            .ok_or_else(|| ResourceError::invalid(format!("{} was not found", nic_id.describe())))?;
        if nic.properties.network_security_group.is_some() {
            return Err(ResourceError::AlreadyExists {
                id: id.to_string(),
                resource_type: TYPE_NAME.to_string(),
            });
        }

        nic.properties.network_security_group = Some(SubResource::new(id.network_security_group.to_string()));
        data.client
            .put_and_wait(ctx, &nic_id.to_string(), api::API_VERSION, &nic)
            .await?;
        Ok(())
    }

    /// The security group ARM reports for the interface, `None` when the
    /// interface is gone or has no group
    async fn associated(
        data: &AzureRmProviderData,
        nic_id: &NetworkInterfaceId,
    ) -> Result<Option<String>, ResourceError> {
        Ok(Self::get_interface(data, nic_id)
            .await?
            .and_then(|nic| nic.properties.network_security_group)
            .map(|nsg| nsg.id))
    }

    async fn dissociate(
        ctx: &Context,
        data: &AzureRmProviderData,
        nic_id: &NetworkInterfaceId,
    ) -> Result<(), ResourceError> {
        let _lock = locks::by_name(&nic_id.network_interface_name, LOCK_KIND).await;
        let Some(mut nic) = Self::get_interface(data, nic_id).await? else {
            return Ok(());
        };
        if nic.properties.network_security_group.take().is_none() {
            return Ok(());
        }
        data.client
            .put_and_wait(ctx, &nic_id.to_string(), api::API_VERSION, &nic)
            .await?;
        Ok(())
    }

    fn state(id: &NetworkInterfaceSecurityGroupAssociationId, nsg_id: String, prior: &Dynamic) -> Dynamic {
        Dynamic::Map(HashMap::from([
            ("id".to_string(), Dynamic::String(id.to_string())),
            ("network_interface_id".to_string(), Dynamic::String(id.network_interface.to_string())),
            ("network_security_group_id".to_string(), Dynamic::String(nsg_id)),
            (
                timeouts::BLOCK_NAME.to_string(),
                prior.attr(timeouts::BLOCK_NAME).cloned().unwrap_or(Dynamic::Null),
            ),
        ]))
    }
}

#[async_trait]
impl Resource for NetworkInterfaceSecurityGroupAssociationResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn metadata(&self, _ctx: Context, _request: ResourceMetadataRequest) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: TYPE_NAME.to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let schema: Schema = SchemaBuilder::new()
            .version(0)
            .description("Manages the association between a network interface and a network security group.")
            .attribute(schema::id())
            .attribute(
                AttributeBuilder::new("network_interface_id", AttributeType::String)
                    .required()
                    .force_new()
                    .description("The ID of the network interface. Changing this forces a new resource to be created.")
                    .validator(ResourceIdValidator::<NetworkInterfaceId>::new())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("network_security_group_id", AttributeType::String)
                    .required()
                    .force_new()
                    .description("The ID of the network security group. Changing this forces a new resource to be created.")
                    .validator(ResourceIdValidator::<NetworkSecurityGroupId>::new())
                    .build(),
            )
            .block(timeouts::schema())
            .build();
        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(&self, _ctx: Context, _request: ValidateResourceConfigRequest) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse { diagnostics: vec![] }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let response = CreateResourceResponse::planned(&request);
        let Some(data) = &self.provider_data else {
            return response.failed(arm::not_configured());
        };
        let id = match Self::id_from_config(&request.config.value) {
            Ok(id) => id,
            Err(e) => {
                return response.failed(e.to_diagnostic("parsing", NetworkInterfaceSecurityGroupAssociationId::DISPLAY_NAME))
            }
        };

        let planned = &request.planned_state.value;
        let ctx = ctx.with_timeout(Timeouts::default().for_operation(planned, Operation::Create));
        match poller::with_context(&ctx, Self::associate(&ctx, data, &id)).await {
            Ok(()) => {
                tracing::info!("created {}", id);
                let nsg = id.network_security_group.to_string();
                CreateResourceResponse {
                    new_state: DynamicValue::new(Self::state(&id, nsg, planned)),
                    ..response
                }
            }
            Err(e) => response.failed(e.to_diagnostic("creating", &id.describe())),
        }
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut response = ReadResourceResponse::current(&request);
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(arm::not_configured());
            return response;
        };
        let prior = &request.current_state.value;
        let id: NetworkInterfaceSecurityGroupAssociationId = match arm::id_from_state(prior) {
            Ok(id) => id,
            Err(diagnostic) => {
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let ctx = ctx.with_timeout(Timeouts::default().for_operation(prior, Operation::Read));
        match poller::with_context(&ctx, Self::associated(data, &id.network_interface)).await {
            Ok(Some(nsg)) => {
                // ARM may report the group with different casing.
                let nsg = match values::string(prior, "network_security_group_id") {
                    Some(configured) if expand::ids_equal(&configured, &nsg) => configured,
                    _ => nsg,
                };
                response.new_state = Some(DynamicValue::new(Self::state(&id, nsg, prior)));
            }
            Ok(None) => {
                tracing::info!("{} was not found - removing from state", id);
                response.new_state = None;
            }
            Err(e) => response.diagnostics.push(e.to_diagnostic("retrieving", &id.describe())),
        }
        response
    }

    /// Both attributes force replacement, so only `timeouts` can change here
    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse::planned(&request)
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut response = DeleteResourceResponse::default();
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(arm::not_configured());
            return response;
        };
        let prior = &request.prior_state.value;
        let id: NetworkInterfaceSecurityGroupAssociationId = match arm::id_from_state(prior) {
            Ok(id) => id,
            Err(diagnostic) => {
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let ctx = ctx.with_timeout(Timeouts::default().for_operation(prior, Operation::Delete));
        match poller::with_context(&ctx, Self::dissociate(&ctx, data, &id.network_interface)).await {
            Ok(()) => tracing::info!("deleted {}", id),
            Err(e) => response.diagnostics.push(e.to_diagnostic("deleting", &id.describe())),
        }
        response
    }
}

#[async_trait]
impl ResourceWithConfigure for NetworkInterfaceSecurityGroupAssociationResource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureResourceRequest) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];
        match arm::provider_data_from(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithImportState for NetworkInterfaceSecurityGroupAssociationResource {
    async fn import_state(&self, ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };
        let id = match NetworkInterfaceSecurityGroupAssociationId::parse(&request.id) {
            Ok(id) => id,
            Err(e) => {
                response.diagnostics.push(
                    Diagnostic::error(
                        format!(
                            "parsing {} ID for import",
                            NetworkInterfaceSecurityGroupAssociationId::DISPLAY_NAME
                        ),
                        e.to_string(),
                    )
                    .with_attribute(AttributePath::new("id")),
                );
                return response;
            }
        };
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(arm::not_configured());
            return response;
        };

        let ctx = ctx.with_timeout(Timeouts::default().read);
        match poller::with_context(&ctx, Self::associated(data, &id.network_interface)).await {
            Ok(Some(_)) => import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response),
            Ok(None) => response.diagnostics.push(arm::import_not_found(TYPE_NAME)),
            Err(e) => response.diagnostics.push(e.to_diagnostic("retrieving", &id.describe())),
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::{assert_covers, object, provider_data};
    use mockito::{Matcher, Server};
    use tfplug::types::ClientCapabilities;

    const NIC: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic";
    const NSG: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg";

    fn resource(url: &str) -> NetworkInterfaceSecurityGroupAssociationResource {
        NetworkInterfaceSecurityGroupAssociationResource::new().with_provider_data(provider_data(url))
    }

    fn planned() -> Dynamic {
        object(vec![
            ("id", Dynamic::Unknown),
            ("network_interface_id", NIC.into()),
            ("network_security_group_id", NSG.into()),
            ("timeouts", Dynamic::Null),
        ])
    }

    fn create_request() -> CreateResourceRequest {
        CreateResourceRequest {
            type_name: TYPE_NAME.into(),
            planned_state: DynamicValue::new(planned()),
            config: DynamicValue::new(planned()),
            planned_private: vec![],
            provider_meta: None,
        }
    }

    fn state() -> Dynamic {
        object(vec![
            ("id", format!("{}|{}", NIC, NSG).into()),
            ("network_interface_id", NIC.into()),
            ("network_security_group_id", NSG.into()),
            ("timeouts", Dynamic::Null),
        ])
    }

    #[tokio::test]
    async fn create_sets_group_on_interface() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":"westeurope","etag":"W/\"1\"","properties":{"ipConfigurations":[{"name":"internal","properties":{}}]}}"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", NIC)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "etag": "W/\"1\"",
                "properties": {"networkSecurityGroup": {"id": NSG}}
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let response = resource(&server.url()).create(Context::new(), create_request()).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.value.attr("id").and_then(Dynamic::as_str),
            Some(format!("{}|{}", NIC, NSG).as_str())
        );
        put.assert_async().await;
    }

    #[tokio::test]
    async fn created_association_reads_back_as_configured() {
        let mut writes = Server::new_async().await;
        let _get = writes
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":"westeurope","properties":{}}"#)
            .create_async()
            .await;
        let _put = writes
            .mock("PUT", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let created = resource(&writes.url()).create(Context::new(), create_request()).await;
        assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);

        let mut reads = Server::new_async().await;
        let _get = reads
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"location":"westeurope","properties":{{"networkSecurityGroup":{{"id":"{}"}}}}}}"#,
                NSG.to_uppercase()
            ))
            .create_async()
            .await;
        let refreshed = resource(&reads.url())
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: TYPE_NAME.into(),
                    current_state: created.new_state.clone(),
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;

        assert!(refreshed.diagnostics.is_empty(), "{:?}", refreshed.diagnostics);
        let state = refreshed.new_state.unwrap().value;
        assert_covers(&state, &planned(), TYPE_NAME);
        assert_eq!(state, created.new_state.value);
    }

    #[tokio::test]
    async fn create_refuses_interface_with_a_group() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":"westeurope","properties":{"networkSecurityGroup":{"id":"other"}}}"#)
            .create_async()
            .await;

        let response = resource(&server.url()).create(Context::new(), create_request()).await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("already exists"));
    }

    #[tokio::test]
    async fn read_without_group_clears_state() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"location":"westeurope","properties":{}}"#)
            .create_async()
            .await;

        let response = resource(&server.url())
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: TYPE_NAME.into(),
                    current_state: DynamicValue::new(state()),
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_interface_succeeds() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", NIC)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let response = resource(&server.url())
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: TYPE_NAME.into(),
                    prior_state: DynamicValue::new(state()),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
    }
}
