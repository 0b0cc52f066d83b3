//! gRPC service implementation
//!
//! Bridges Terraform Plugin Protocol v6 calls onto the [`Provider`] trait.
//! Resources and data sources are built fresh from their factories for every
//! call and configured with the provider data captured in ConfigureProvider.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::proto;
use crate::proto::tfplugin6::provider_server::Provider as ProtoProvider;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderMetaSchemaRequest,
    ProviderMetadataRequest, ProviderSchemaRequest, ResourceFactory, StopProviderRequest,
    ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigurableResource, ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest,
    UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    Attribute, Block, DefaultRequest, NestedBlock, NestingMode, PlanModifierRequest, Schema,
    StringKind, ValidatorRequest,
};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, Diagnostic,
    DiagnosticSeverity, Dynamic, DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tonic::{Request, Response, Status};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

pub struct ProviderService<P: Provider> {
    provider: Arc<RwLock<P>>,
    resources: Arc<HashMap<String, ResourceFactory>>,
    data_sources: Arc<HashMap<String, DataSourceFactory>>,
    provider_data: Arc<RwLock<ProviderData>>,
    resource_schemas: Arc<RwLock<HashMap<String, Schema>>>,
    data_source_schemas: Arc<RwLock<HashMap<String, Schema>>>,
    root: Context,
}

impl<P: Provider + 'static> ProviderService<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();
        Self {
            provider: Arc::new(RwLock::new(provider)),
            resources: Arc::new(resources),
            data_sources: Arc::new(data_sources),
            provider_data: Arc::new(RwLock::new(None)),
            resource_schemas: Arc::new(RwLock::new(HashMap::new())),
            data_source_schemas: Arc::new(RwLock::new(HashMap::new())),
            root: Context::new(),
        }
    }

    /// Context handed to resources; cancelled by StopProvider.
    fn context(&self) -> Context {
        self.root.clone()
    }

    async fn configured_resource(
        &self,
        type_name: &str,
    ) -> std::result::Result<Box<dyn ConfigurableResource>, Vec<Diagnostic>> {
        let factory = self.resources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                format!("Unknown resource type: {}", type_name),
                "The provider does not implement this resource type",
            )]
        })?;

        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(self.context(), ConfigureResourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    async fn configured_data_source(
        &self,
        type_name: &str,
    ) -> std::result::Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                format!("Unknown data source type: {}", type_name),
                "The provider does not implement this data source type",
            )]
        })?;

        let mut data_source = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(self.context(), ConfigureDataSourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }

    async fn resource_schema(&self, type_name: &str) -> std::result::Result<Schema, Vec<Diagnostic>> {
        if let Some(schema) = self.resource_schemas.read().await.get(type_name) {
            return Ok(schema.clone());
        }
        let factory = self.resources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                format!("Unknown resource type: {}", type_name),
                "The provider does not implement this resource type",
            )]
        })?;
        let response = factory()
            .schema(self.context(), ResourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        self.resource_schemas
            .write()
            .await
            .insert(type_name.to_string(), response.schema.clone());
        Ok(response.schema)
    }

    async fn data_source_schema(
        &self,
        type_name: &str,
    ) -> std::result::Result<Schema, Vec<Diagnostic>> {
        if let Some(schema) = self.data_source_schemas.read().await.get(type_name) {
            return Ok(schema.clone());
        }
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                format!("Unknown data source type: {}", type_name),
                "The provider does not implement this data source type",
            )]
        })?;
        let response = factory()
            .schema(self.context(), DataSourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        self.data_source_schemas
            .write()
            .await
            .insert(type_name.to_string(), response.schema.clone());
        Ok(response.schema)
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> ProtoProvider for ProviderService<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> std::result::Result<Response<proto::get_metadata::Response>, Status> {
        let metadata = self
            .provider
            .read()
            .await
            .metadata(self.context(), ProviderMetadataRequest)
            .await;

        let mut resources: Vec<_> = self.resources.keys().cloned().collect();
        resources.sort();
        let mut data_sources: Vec<_> = self.data_sources.keys().cloned().collect();
        data_sources.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities_to_proto(
                &metadata.server_capabilities,
            )),
            diagnostics: vec![],
            data_sources: data_sources
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: resources
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> std::result::Result<Response<proto::get_provider_schema::Response>, Status> {
        let provider = self.provider.read().await;
        let metadata = provider
            .metadata(self.context(), ProviderMetadataRequest)
            .await;
        let provider_schema = provider
            .schema(self.context(), ProviderSchemaRequest)
            .await;
        let meta_schema = provider
            .meta_schema(self.context(), ProviderMetaSchemaRequest)
            .await;
        drop(provider);

        let mut diagnostics = provider_schema.diagnostics;
        diagnostics.extend(meta_schema.diagnostics);

        let mut resource_schemas = HashMap::new();
        for type_name in self.resources.keys() {
            match self.resource_schema(type_name).await {
                Ok(schema) => {
                    resource_schemas.insert(type_name.clone(), schema_to_proto(&schema));
                }
                Err(diags) => diagnostics.extend(diags),
            }
        }

        let mut data_source_schemas = HashMap::new();
        for type_name in self.data_sources.keys() {
            match self.data_source_schema(type_name).await {
                Ok(schema) => {
                    data_source_schemas.insert(type_name.clone(), schema_to_proto(&schema));
                }
                Err(diags) => diagnostics.extend(diags),
            }
        }

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&provider_schema.schema)),
            resource_schemas,
            data_source_schemas,
            diagnostics: diagnostics_to_proto(&diagnostics),
            provider_meta: meta_schema.schema.as_ref().map(schema_to_proto),
            server_capabilities: Some(server_capabilities_to_proto(
                &metadata.server_capabilities,
            )),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> std::result::Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        let provider = self.provider.read().await;
        let schema = provider
            .schema(self.context(), ProviderSchemaRequest)
            .await
            .schema;
        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        let response = provider
            .validate(self.context(), ValidateProviderConfigRequest { config })
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> std::result::Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        let schema = match self.resource_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diags) => {
                return Ok(Response::new(proto::validate_resource_config::Response {
                    diagnostics: diagnostics_to_proto(&diags),
                }))
            }
        };

        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        // Validation runs before ConfigureProvider, so use an unconfigured instance.
        if let Some(factory) = self.resources.get(&req.type_name) {
            let response = factory()
                .validate(
                    self.context(),
                    ValidateResourceConfigRequest {
                        type_name: req.type_name.clone(),
                        config,
                        client_capabilities: client_capabilities_from_proto(
                            req.client_capabilities.as_ref(),
                        ),
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> std::result::Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        let schema = match self.data_source_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diags) => {
                return Ok(Response::new(
                    proto::validate_data_resource_config::Response {
                        diagnostics: diagnostics_to_proto(&diags),
                    },
                ))
            }
        };

        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        if let Some(factory) = self.data_sources.get(&req.type_name) {
            let response = factory()
                .validate(
                    self.context(),
                    ValidateDataSourceConfigRequest {
                        type_name: req.type_name.clone(),
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(
            proto::validate_data_resource_config::Response {
                diagnostics: diagnostics_to_proto(&diagnostics),
            },
        ))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> std::result::Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();

        let schema = match self.resource_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diags) => {
                return Ok(Response::new(proto::upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: diagnostics_to_proto(&diags),
                }))
            }
        };

        if req.version > schema.version {
            let diag = Diagnostic::error(
                "Unable to upgrade resource state",
                format!(
                    "State for {} was written by a newer provider (schema version {}, this provider supports {})",
                    req.type_name, req.version, schema.version
                ),
            );
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(&[diag]),
            }));
        }

        let raw_json = req
            .raw_state
            .as_ref()
            .map(|raw| raw.json.as_slice())
            .unwrap_or_default();
        let state = DynamicValue::decode_json(raw_json)?;
        let upgraded = DynamicValue::new(schema.block.conform(&state.value));

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_value(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> std::result::Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        tracing::debug!(terraform_version = %req.terraform_version, "configuring provider");

        let mut provider = self.provider.write().await;
        let response = provider
            .configure(
                self.context(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> std::result::Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let current_state = decode_value(req.current_state.as_ref())?;

        let (schema, resource) = match self.schema_and_resource(&req.type_name).await {
            Ok(pair) => pair,
            Err(diags) => {
                return Ok(Response::new(proto::read_resource::Response {
                    new_state: req.current_state,
                    diagnostics: diagnostics_to_proto(&diags),
                    private: req.private,
                    deferred: None,
                }))
            }
        };

        let response = resource
            .read(
                self.context(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private,
                    provider_meta: optional_value(req.provider_meta.as_ref())?,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        let new_state = if has_errors(&response.diagnostics) {
            current_state
        } else {
            match response.new_state {
                Some(state) => DynamicValue::new(schema.block.conform(&state.value)),
                None => DynamicValue::null(),
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_value(&new_state)?),
            diagnostics: diagnostics_to_proto(&response.diagnostics),
            private: response.private,
            deferred: None,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> std::result::Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();

        let schema = match self.resource_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diags) => {
                return Ok(Response::new(proto::plan_resource_change::Response {
                    planned_state: req.proposed_new_state,
                    requires_replace: vec![],
                    planned_private: req.prior_private,
                    diagnostics: diagnostics_to_proto(&diags),
                    legacy_type_system: false,
                    deferred: None,
                }))
            }
        };

        let prior_state = decode_value(req.prior_state.as_ref())?;
        let proposed = decode_value(req.proposed_new_state.as_ref())?;
        let config = decode_value(req.config.as_ref())?;

        tracing::debug!(type_name = %req.type_name, "planning resource change");

        let plan = plan_resource(&schema, &config.value, &prior_state.value, &proposed.value);

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_value(&DynamicValue::new(plan.planned_state))?),
            requires_replace: plan.requires_replace.iter().map(path_to_proto).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(&plan.diagnostics),
            legacy_type_system: false,
            deferred: None,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> std::result::Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_value(req.prior_state.as_ref())?;
        let planned_state = decode_value(req.planned_state.as_ref())?;
        let config = decode_value(req.config.as_ref())?;
        let provider_meta = optional_value(req.provider_meta.as_ref())?;

        let (schema, resource) = match self.schema_and_resource(&req.type_name).await {
            Ok(pair) => pair,
            Err(diags) => {
                return Ok(Response::new(proto::apply_resource_change::Response {
                    new_state: req.prior_state,
                    private: req.planned_private,
                    diagnostics: diagnostics_to_proto(&diags),
                    legacy_type_system: false,
                }))
            }
        };

        let (new_state, private, diagnostics) = if prior_state.is_null() {
            tracing::debug!(type_name = %req.type_name, "applying create");
            let response = resource
                .create(
                    self.context(),
                    CreateResourceRequest {
                        type_name: req.type_name.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                        provider_meta,
                    },
                )
                .await;
            // A failed create records nothing; the next plan starts from scratch.
            let state = if has_errors(&response.diagnostics) {
                DynamicValue::null()
            } else {
                response.new_state
            };
            (state, response.private, response.diagnostics)
        } else if planned_state.is_null() {
            tracing::debug!(type_name = %req.type_name, "applying delete");
            let response = resource
                .delete(
                    self.context(),
                    DeleteResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            let state = if has_errors(&response.diagnostics) {
                prior_state
            } else {
                DynamicValue::null()
            };
            (state, req.planned_private, response.diagnostics)
        } else {
            tracing::debug!(type_name = %req.type_name, "applying update");
            let response = resource
                .update(
                    self.context(),
                    UpdateResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                        provider_meta,
                    },
                )
                .await;
            let state = if has_errors(&response.diagnostics) {
                prior_state
            } else {
                response.new_state
            };
            (state, response.private, response.diagnostics)
        };

        let new_state = if new_state.is_null() {
            new_state
        } else {
            DynamicValue::new(schema.block.conform(&new_state.value))
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> std::result::Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();

        let (schema, resource) = match self.schema_and_resource(&req.type_name).await {
            Ok(pair) => pair,
            Err(diags) => {
                return Ok(Response::new(proto::import_resource_state::Response {
                    imported_resources: vec![],
                    diagnostics: diagnostics_to_proto(&diags),
                    deferred: None,
                }))
            }
        };

        let response = resource
            .import_state(
                self.context(),
                ImportResourceStateRequest {
                    type_name: req.type_name.clone(),
                    id: req.id,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = DynamicValue::new(schema.block.conform(&imported.state.value));
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_value(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(&response.diagnostics),
            deferred: None,
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> std::result::Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        let schema = match self.data_source_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diags) => {
                return Ok(Response::new(proto::read_data_source::Response {
                    state: None,
                    diagnostics: diagnostics_to_proto(&diags),
                    deferred: None,
                }))
            }
        };
        let data_source = match self.configured_data_source(&req.type_name).await {
            Ok(data_source) => data_source,
            Err(diags) => {
                return Ok(Response::new(proto::read_data_source::Response {
                    state: None,
                    diagnostics: diagnostics_to_proto(&diags),
                    deferred: None,
                }))
            }
        };

        let response = data_source
            .read(
                self.context(),
                ReadDataSourceRequest {
                    type_name: req.type_name.clone(),
                    config,
                    provider_meta: optional_value(req.provider_meta.as_ref())?,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        let state = if has_errors(&response.diagnostics) {
            None
        } else {
            let state = DynamicValue::new(schema.block.conform(&response.state.value));
            Some(encode_value(&state)?)
        };

        Ok(Response::new(proto::read_data_source::Response {
            state,
            diagnostics: diagnostics_to_proto(&response.diagnostics),
            deferred: None,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> std::result::Result<Response<proto::stop_provider::Response>, Status> {
        self.root.cancel();
        let response = self
            .provider
            .read()
            .await
            .stop(Context::new(), StopProviderRequest)
            .await;
        Ok(Response::new(proto::stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }))
    }
}

impl<P: Provider + 'static> ProviderService<P> {
    async fn schema_and_resource(
        &self,
        type_name: &str,
    ) -> std::result::Result<(Schema, Box<dyn ConfigurableResource>), Vec<Diagnostic>> {
        let schema = self.resource_schema(type_name).await?;
        let resource = self.configured_resource(type_name).await?;
        Ok((schema, resource))
    }
}

/// Answers go-plugin's health check for the "plugin" service.
pub struct HealthService;

#[tonic::async_trait]
impl proto::health::health_server::Health for HealthService {
    async fn check(
        &self,
        _request: Request<proto::health::HealthCheckRequest>,
    ) -> std::result::Result<Response<proto::health::HealthCheckResponse>, Status> {
        Ok(Response::new(proto::health::HealthCheckResponse {
            status: proto::health::health_check_response::ServingStatus::Serving as i32,
        }))
    }
}

/// Lets Terraform shut the plugin down over gRPC.
pub struct ControllerService {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ControllerService {
    pub fn new(shutdown: Arc<watch::Sender<bool>>) -> Self {
        Self { shutdown }
    }
}

#[tonic::async_trait]
impl proto::plugin::grpc_controller_server::GrpcController for ControllerService {
    async fn shutdown(
        &self,
        _request: Request<proto::plugin::Empty>,
    ) -> std::result::Result<Response<proto::plugin::Empty>, Status> {
        tracing::info!("shutdown requested by terraform");
        self.shutdown.send_replace(true);
        Ok(Response::new(proto::plugin::Empty {}))
    }
}

/// Result of planning one resource
pub struct PlannedChange {
    pub planned_state: Dynamic,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Computes the planned state for a resource change.
///
/// Defaults fill optional+computed attributes that are null in config.
/// Remaining computed attributes with null config become unknown when the
/// object is new or differs from its prior value. Plan modifiers then run
/// and may restore prior values or request replacement. Replacement is only
/// reported for top-level attributes and never on create.
pub fn plan_resource(
    schema: &Schema,
    config: &Dynamic,
    prior: &Dynamic,
    proposed: &Dynamic,
) -> PlannedChange {
    let mut change = PlannedChange {
        planned_state: proposed.clone(),
        requires_replace: Vec::new(),
        diagnostics: Vec::new(),
    };

    if proposed.is_null() {
        return change;
    }

    let resource_is_new = prior.is_null();
    let mut planner = Planner {
        resource_is_new,
        requires_replace: Vec::new(),
        diagnostics: Vec::new(),
    };
    let planned = planner.plan_block(
        &schema.block,
        config,
        prior,
        &schema.block.conform(proposed),
        &AttributePath::root(),
        true,
    );

    change.planned_state = planned;
    change.requires_replace = planner.requires_replace;
    change.diagnostics = planner.diagnostics;
    change
}

struct Planner {
    resource_is_new: bool,
    requires_replace: Vec<AttributePath>,
    diagnostics: Vec<Diagnostic>,
}

impl Planner {
    fn plan_block(
        &mut self,
        block: &Block,
        config: &Dynamic,
        prior: &Dynamic,
        proposed: &Dynamic,
        path: &AttributePath,
        top_level: bool,
    ) -> Dynamic {
        let Dynamic::Map(proposed_map) = proposed else {
            return proposed.clone();
        };
        let object_changed = prior.is_null() || proposed != prior;
        let mut planned = proposed_map.clone();

        for attr in &block.attributes {
            let attr_path = child_path(path, &attr.name);
            let config_value = field(config, &attr.name);
            let prior_value = field(prior, &attr.name);
            let mut value = field(proposed, &attr.name).clone();

            if config_value.is_null() && attr.computed {
                value = match &attr.default {
                    Some(default) if attr.optional => {
                        default
                            .default_value(DefaultRequest {
                                path: attr_path.clone(),
                            })
                            .value
                            .value
                    }
                    _ if object_changed => Dynamic::Unknown,
                    _ => value,
                };
            }

            value = self.run_plan_modifiers(
                attr,
                config_value,
                prior_value,
                value,
                &attr_path,
                top_level,
            );
            planned.insert(attr.name.clone(), value);
        }

        for nested in &block.block_types {
            let nested_path = child_path(path, &nested.type_name);
            let value = self.plan_nested_block(
                nested,
                field(config, &nested.type_name),
                field(prior, &nested.type_name),
                field(proposed, &nested.type_name),
                &nested_path,
            );
            planned.insert(nested.type_name.clone(), value);
        }

        Dynamic::Map(planned)
    }

    fn plan_nested_block(
        &mut self,
        nested: &NestedBlock,
        config: &Dynamic,
        prior: &Dynamic,
        proposed: &Dynamic,
        path: &AttributePath,
    ) -> Dynamic {
        match (nested.nesting, proposed) {
            (NestingMode::List, Dynamic::List(items)) => Dynamic::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.plan_block(
                            &nested.block,
                            index(config, i),
                            index(prior, i),
                            item,
                            &path.clone().index(i as i64),
                            false,
                        )
                    })
                    .collect(),
            ),
            (NestingMode::Set, Dynamic::List(items)) => {
                let config_items = config.as_list().map(Vec::as_slice).unwrap_or_default();
                let prior_items = prior.as_list().map(Vec::as_slice).unwrap_or_default();
                Dynamic::List(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let config_item = config_items.get(i).unwrap_or(&Dynamic::Null);
                            let prior_item = matching_set_element(&nested.block, item, prior_items);
                            // Set elements are not addressable by index; modifiers see the block path.
                            self.plan_block(&nested.block, config_item, prior_item, item, path, false)
                        })
                        .collect(),
                )
            }
            (NestingMode::Map, Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .iter()
                    .map(|(key, item)| {
                        let planned = self.plan_block(
                            &nested.block,
                            field(config, key),
                            field(prior, key),
                            item,
                            &path.clone().key(key),
                            false,
                        );
                        (key.clone(), planned)
                    })
                    .collect(),
            ),
            (NestingMode::Single | NestingMode::Group, Dynamic::Map(_)) => {
                self.plan_block(&nested.block, config, prior, proposed, path, false)
            }
            _ => proposed.clone(),
        }
    }

    fn run_plan_modifiers(
        &mut self,
        attr: &Attribute,
        config_value: &Dynamic,
        prior_value: &Dynamic,
        mut value: Dynamic,
        path: &AttributePath,
        top_level: bool,
    ) -> Dynamic {
        for modifier in &attr.plan_modifiers {
            let response = modifier.modify(PlanModifierRequest {
                config_value: DynamicValue::new(config_value.clone()),
                state_value: DynamicValue::new(prior_value.clone()),
                plan_value: DynamicValue::new(value),
                path: path.clone(),
                resource_is_new: self.resource_is_new,
            });
            value = response.plan_value.value;
            if response.requires_replace
                && top_level
                && !self.resource_is_new
                && !self.requires_replace.contains(path)
            {
                self.requires_replace.push(path.clone());
            }
            self.diagnostics.extend(response.diagnostics);
        }
        value
    }
}

/// Finds the prior set element whose configurable attributes match `item`.
fn matching_set_element<'a>(block: &Block, item: &Dynamic, prior: &'a [Dynamic]) -> &'a Dynamic {
    prior
        .iter()
        .find(|candidate| {
            block
                .attributes
                .iter()
                .filter(|a| !a.computed || a.optional)
                .all(|a| {
                    let want = field(item, &a.name);
                    want.is_unknown() || (a.computed && want.is_null()) || field(candidate, &a.name) == want
                })
        })
        .unwrap_or(&Dynamic::Null)
}

fn field<'a>(value: &'a Dynamic, name: &str) -> &'a Dynamic {
    value
        .as_map()
        .and_then(|m| m.get(name))
        .unwrap_or(&Dynamic::Null)
}

fn index(value: &Dynamic, i: usize) -> &Dynamic {
    value
        .as_list()
        .and_then(|l| l.get(i))
        .unwrap_or(&Dynamic::Null)
}

fn child_path(parent: &AttributePath, name: &str) -> AttributePath {
    parent.clone().attribute(name)
}

/// Runs attribute validators across a block and its nested blocks.
pub fn validate_block(
    block: &Block,
    config: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if config.is_unknown() {
        return;
    }

    for attr in &block.attributes {
        let attr_path = child_path(path, &attr.name);
        let value = field(config, &attr.name);
        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: DynamicValue::new(value.clone()),
                path: attr_path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    for nested in &block.block_types {
        let nested_path = child_path(path, &nested.type_name);
        match field(config, &nested.type_name) {
            Dynamic::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = if nested.nesting == NestingMode::Set {
                        nested_path.clone()
                    } else {
                        nested_path.clone().index(i as i64)
                    };
                    validate_block(&nested.block, item, &item_path, diagnostics);
                }
            }
            Dynamic::Map(entries) if nested.nesting == NestingMode::Map => {
                for (key, item) in entries {
                    validate_block(&nested.block, item, &nested_path.clone().key(key), diagnostics);
                }
            }
            item @ Dynamic::Map(_) => validate_block(&nested.block, item, &nested_path, diagnostics),
            _ => {}
        }
    }
}

fn decode_value(value: Option<&proto::DynamicValue>) -> std::result::Result<DynamicValue, Status> {
    match value {
        Some(v) if !v.msgpack.is_empty() => Ok(DynamicValue::decode_msgpack(&v.msgpack)?),
        Some(v) if !v.json.is_empty() => Ok(DynamicValue::decode_json(&v.json)?),
        _ => Ok(DynamicValue::null()),
    }
}

fn optional_value(
    value: Option<&proto::DynamicValue>,
) -> std::result::Result<Option<DynamicValue>, Status> {
    let decoded = decode_value(value)?;
    Ok((!decoded.is_null()).then_some(decoded))
}

fn encode_value(value: &DynamicValue) -> std::result::Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn client_capabilities_from_proto(caps: Option<&proto::ClientCapabilities>) -> ClientCapabilities {
    caps.map(|c| ClientCapabilities {
        deferral_allowed: c.deferral_allowed,
        write_only_attributes_allowed: c.write_only_attributes_allowed,
    })
    .unwrap_or_default()
}

fn server_capabilities_to_proto(
    caps: &crate::types::ServerCapabilities,
) -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: caps.plan_destroy,
        get_provider_schema_optional: caps.get_provider_schema_optional,
        move_resource_state: caps.move_resource_state,
    }
}

fn diagnostics_to_proto(diagnostics: &[Diagnostic]) -> Vec<proto::Diagnostic> {
    diagnostics
        .iter()
        .map(|d| proto::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            } as i32,
            summary: d.summary.clone(),
            detail: d.detail.clone(),
            attribute: d.attribute.as_ref().map(path_to_proto),
        })
        .collect()
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;
    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

fn string_kind_to_proto(kind: StringKind) -> i32 {
    match kind {
        StringKind::Plain => proto::StringKind::Plain as i32,
        StringKind::Markdown => proto::StringKind::Markdown as i32,
    }
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> proto::schema::Block {
    proto::schema::Block {
        version: block.version,
        attributes: block.attributes.iter().map(attribute_to_proto).collect(),
        block_types: block
            .block_types
            .iter()
            .map(|nested| {
                use proto::schema::nested_block::NestingMode as ProtoNesting;
                proto::schema::NestedBlock {
                    type_name: nested.type_name.clone(),
                    block: Some(block_to_proto(&nested.block)),
                    nesting: match nested.nesting {
                        NestingMode::Invalid => ProtoNesting::Invalid,
                        NestingMode::Single => ProtoNesting::Single,
                        NestingMode::List => ProtoNesting::List,
                        NestingMode::Set => ProtoNesting::Set,
                        NestingMode::Map => ProtoNesting::Map,
                        NestingMode::Group => ProtoNesting::Group,
                    } as i32,
                    min_items: nested.min_items,
                    max_items: nested.max_items,
                }
            })
            .collect(),
        description: block.description.clone(),
        description_kind: string_kind_to_proto(block.description_kind),
        deprecated: block.deprecated,
    }
}

fn attribute_to_proto(attr: &Attribute) -> proto::schema::Attribute {
    proto::schema::Attribute {
        name: attr.name.clone(),
        r#type: serde_json::to_vec(&attr.r#type.to_type_json()).unwrap_or_default(),
        nested_type: None,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: attr.sensitive,
        description_kind: string_kind_to_proto(StringKind::Plain),
        deprecated: attr.deprecated,
        write_only: false,
    }
}
