pub mod api;
pub mod arm;
pub mod data_sources;
pub mod helpers;
pub mod locks;
pub mod provider_data;
pub mod resource_id;
pub mod resources;
pub mod validate;

pub use provider_data::AzureRmProviderData;

use api::{AzureCliCredential, ClientSecretCredential, Environment, TokenCredential};
use arm::{ArmResource, ArmResourceHandler};
use async_trait::async_trait;
use helpers::values;
use provider_data::Features;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::types::ServerCapabilities;
use tfplug::{
    AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode,
    SchemaBuilder,
};

pub struct AzureRmProvider {
    provider_data: Option<AzureRmProviderData>,
}

impl Default for AzureRmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureRmProvider {
    pub fn new() -> Self {
        Self { provider_data: None }
    }
}

/// A provider setting from config, else from its environment variable
fn setting(config: &Dynamic, name: &str, env: &str) -> Option<String> {
    values::non_empty_string(config, name).or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
}

fn bool_setting(config: &Dynamic, name: &str, env: &str) -> Option<bool> {
    values::bool(config, name).or_else(|| std::env::var(env).ok().and_then(|v| v.parse::<bool>().ok()))
}

fn missing(name: &str, env: &str) -> Diagnostic {
    Diagnostic::error(
        format!("{} is required (set in provider config or {} env var)", name, env),
        "",
    )
    .with_attribute(AttributePath::new(name))
}

fn features(config: &Dynamic) -> Features {
    let mut features = Features::default();
    let resource_group = values::single_block(config, "features")
        .and_then(|block| values::single_block(block, "resource_group"));
    if let Some(prevent) = resource_group.and_then(|rg| values::bool(rg, "prevent_deletion_if_contains_resources")) {
        features.resource_group_prevent_deletion_if_contains_resources = prevent;
    }
    features
}

struct Credentials {
    credential: Arc<dyn TokenCredential>,
    tenant_id: Option<String>,
    client_id: Option<String>,
}

fn credentials(config: &Dynamic, environment: &Environment) -> Result<Credentials, Vec<Diagnostic>> {
    let tenant_id = setting(config, "tenant_id", "ARM_TENANT_ID");
    let client_id = setting(config, "client_id", "ARM_CLIENT_ID");

    if let Some(secret) = setting(config, "client_secret", "ARM_CLIENT_SECRET") {
        let (tenant, client) = match (&tenant_id, &client_id) {
            (Some(tenant), Some(client)) => (tenant, client),
            (tenant, client) => {
                let mut diags = vec![];
                if tenant.is_none() {
                    diags.push(missing("tenant_id", "ARM_TENANT_ID"));
                }
                if client.is_none() {
                    diags.push(missing("client_id", "ARM_CLIENT_ID"));
                }
                return Err(diags);
            }
        };
        tracing::debug!("authenticating as service principal {}", client);
        let credential = ClientSecretCredential::new(environment, tenant, client, &secret).map_err(|e| {
            vec![Diagnostic::error(
                format!("Failed to build client secret credential: {}", e),
                "",
            )]
        })?;
        return Ok(Credentials {
            credential: Arc::new(credential),
            tenant_id,
            client_id,
        });
    }

    if bool_setting(config, "use_cli", "ARM_USE_CLI").unwrap_or(true) {
        tracing::debug!("authenticating with the Azure CLI");
        return Ok(Credentials {
            credential: Arc::new(AzureCliCredential::new(environment, tenant_id.as_deref())),
            tenant_id,
            client_id: None,
        });
    }

    Err(vec![Diagnostic::error(
        "client_secret is required (set in provider config or ARM_CLIENT_SECRET env var) when use_cli is false",
        "",
    )
    .with_attribute(AttributePath::new("client_secret"))])
}

fn arm_resource<R: ArmResource + Default>() -> (String, ResourceFactory) {
    let factory: ResourceFactory = Box::new(|| Box::new(ArmResourceHandler::new(R::default())));
    (R::TYPE_NAME.to_string(), factory)
}

#[async_trait]
impl Provider for AzureRmProvider {
    fn type_name(&self) -> &str {
        "azurerm"
    }

    async fn metadata(&self, _ctx: Context, _request: ProviderMetadataRequest) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "azurerm".to_string(),
            server_capabilities: ServerCapabilities {
                plan_destroy: true,
                get_provider_schema_optional: false,
                move_resource_state: false,
            },
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let resource_group = NestedBlockBuilder::new("resource_group", NestingMode::List)
            .max_items(1)
            .attribute(
                AttributeBuilder::new("prevent_deletion_if_contains_resources", AttributeType::Bool)
                    .optional()
                    .default(StaticDefault::bool(true))
                    .description("Refuse to delete a Resource Group that still contains Resources.")
                    .build(),
            )
            .build();

        let schema = SchemaBuilder::new()
            .version(0)
            .description("The Azure Resource Manager provider.")
            .attribute(
                AttributeBuilder::new("subscription_id", AttributeType::String)
                    .optional()
                    .description("The Subscription ID which should be used. Can also be sourced from ARM_SUBSCRIPTION_ID.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("tenant_id", AttributeType::String)
                    .optional()
                    .description("The Tenant ID which should be used. Can also be sourced from ARM_TENANT_ID.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("client_id", AttributeType::String)
                    .optional()
                    .description("The Client ID of the Service Principal. Can also be sourced from ARM_CLIENT_ID.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("client_secret", AttributeType::String)
                    .optional()
                    .sensitive()
                    .description("The Client Secret of the Service Principal. Can also be sourced from ARM_CLIENT_SECRET.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("environment", AttributeType::String)
                    .optional()
                    .description("The Cloud Environment: public, usgovernment or china. Can also be sourced from ARM_ENVIRONMENT.")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("use_cli", AttributeType::Bool)
                    .optional()
                    .description("Allow the Azure CLI to be used for authentication. Can also be sourced from ARM_USE_CLI.")
                    .build(),
            )
            .block(
                NestedBlockBuilder::new("features", NestingMode::List)
                    .max_items(1)
                    .block(resource_group)
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(&mut self, _ctx: Context, request: ConfigureProviderRequest) -> ConfigureProviderResponse {
        let config = &request.config.value;
        let mut response = ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: None,
        };

        let environment_name = setting(config, "environment", "ARM_ENVIRONMENT").unwrap_or_else(|| "public".to_string());
        let Some(environment) = Environment::from_name(&environment_name) else {
            response.diagnostics.push(
                Diagnostic::error(
                    format!("unknown environment {:?}", environment_name),
                    "expected one of public, usgovernment or china",
                )
                .with_attribute(AttributePath::new("environment")),
            );
            return response;
        };

        let subscription_id = setting(config, "subscription_id", "ARM_SUBSCRIPTION_ID");
        if subscription_id.is_none() {
            response
                .diagnostics
                .push(missing("subscription_id", "ARM_SUBSCRIPTION_ID"));
        }
        let credentials = match credentials(config, &environment) {
            Ok(credentials) => Some(credentials),
            Err(diags) => {
                response.diagnostics.extend(diags);
                None
            }
        };
        let (Some(subscription_id), Some(credentials)) = (subscription_id, credentials) else {
            return response;
        };

        let client = match api::Client::new(&environment.resource_manager, credentials.credential) {
            Ok(client) => client,
            Err(e) => {
                response
                    .diagnostics
                    .push(Diagnostic::error(format!("Failed to create API client: {}", e), ""));
                return response;
            }
        };

        let mut data = AzureRmProviderData::new(client, subscription_id);
        data.tenant_id = credentials.tenant_id;
        data.client_id = credentials.client_id;
        data.environment = environment;
        data.features = features(config);

        tracing::info!(
            "configured for subscription {} in the {} cloud",
            data.subscription_id,
            data.environment.name
        );
        response.provider_data = Some(Arc::new(data.clone()));
        self.provider_data = Some(data);
        response
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let association: ResourceFactory =
            Box::new(|| Box::new(resources::NetworkInterfaceSecurityGroupAssociationResource::new()));
        HashMap::from([
            arm_resource::<resources::ResourceGroupResource>(),
            arm_resource::<resources::VirtualNetworkResource>(),
            arm_resource::<resources::SubnetResource>(),
            arm_resource::<resources::NetworkSecurityGroupResource>(),
            arm_resource::<resources::NetworkInterfaceResource>(),
            (
                "azurerm_network_interface_security_group_association".to_string(),
                association,
            ),
            arm_resource::<resources::DnsZoneResource>(),
            arm_resource::<resources::DnsARecordResource>(),
            arm_resource::<resources::StorageAccountResource>(),
            arm_resource::<resources::ApiManagementBackendResource>(),
            arm_resource::<resources::AnalysisServicesServerResource>(),
            arm_resource::<resources::CosmosDbMongoCollectionResource>(),
        ])
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let resource_group: DataSourceFactory = Box::new(|| Box::new(data_sources::ResourceGroupDataSource::new()));
        let client_config: DataSourceFactory = Box::new(|| Box::new(data_sources::ClientConfigDataSource::new()));
        HashMap::from([
            ("azurerm_resource_group".to_string(), resource_group),
            ("azurerm_client_config".to_string(), client_config),
        ])
    }
}
