//! Generic create/read/update/delete over Azure Resource Manager
//!
//! Most resources in this provider are a single ARM object addressed by a
//! typed ID. They describe themselves through [`ArmResource`] and get their
//! Terraform lifecycle from [`ArmResourceHandler`]:
//!
//! - create checks for an existing object first and refuses to adopt it
//! - read treats 404 as "gone" and clears the state
//! - delete treats 404 as success
//! - every operation runs under the deadline from the `timeouts` block

use crate::api::{poller, ApiError};
use crate::helpers::state;
use crate::helpers::timeouts::{self, Operation, Timeouts};
use crate::helpers::values::Attributes;
use crate::locks::{self, LockName};
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::{ResourceIdError, ResourceIdentity};
use crate::helpers;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tfplug::context::Context;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::{import_state_passthrough_id, AttributePath, Diagnostic, Dynamic, DynamicValue, Schema};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Id(#[from] ResourceIdError),

    #[error("checking for presence of existing resource: {0}")]
    ExistenceCheck(ApiError),

    #[error("a resource with the ID {id:?} already exists")]
    AlreadyExists { id: String, resource_type: String },

    #[error("{0}")]
    Invalid(String),
}

impl ResourceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ResourceError::Invalid(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::Api(e) if e.is_not_found())
    }

    /// Turns the error into a diagnostic. `verb` and `subject` give context,
    /// e.g. `creating` and `Subnet (Subscription: ...)`.
    pub fn to_diagnostic(&self, verb: &str, subject: &str) -> Diagnostic {
        match self {
            ResourceError::AlreadyExists { id, resource_type } => already_exists(id, resource_type),
            other => Diagnostic::error(format!("{} {}: {}", verb, subject, other), ""),
        }
    }
}

/// The diagnostic raised when create finds the object already present
pub fn already_exists(id: &str, resource_type: &str) -> Diagnostic {
    Diagnostic::error(
        format!(
            "A resource with the ID {:?} already exists - to be managed via Terraform this resource needs to be imported into the State.",
            id
        ),
        format!(
            "Please see the documentation for {:?} for more information.",
            resource_type
        ),
    )
}

pub fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

pub fn import_not_found(resource_type: &str) -> Diagnostic {
    Diagnostic::error(
        "Cannot import non-existent remote object",
        format!(
            "While attempting to import an existing object to {:?}, the provider detected that no object exists with the given id. Only pre-existing objects can be imported; check that the id is correct and that it is associated with the provider's configured subscription, or use \"terraform apply\" to create a new remote object for this resource.",
            resource_type
        ),
    )
}

/// Extracts provider data from a configure request the way every resource
/// and data source in this crate does.
pub fn provider_data_from(
    provider_data: Option<std::sync::Arc<dyn std::any::Any + Send + Sync>>,
) -> Result<AzureRmProviderData, Diagnostic> {
    match provider_data {
        Some(data) => data
            .downcast_ref::<AzureRmProviderData>()
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract AzureRmProviderData from provider data",
                )
            }),
        None => Err(Diagnostic::error(
            "No provider data",
            "No provider data was provided to the resource",
        )),
    }
}

/// Reads `id` from a state object and parses it, accepting ARM's casing
pub fn id_from_state<T: ResourceIdentity>(state: &Dynamic) -> Result<T, Diagnostic> {
    let raw = state.attr("id").and_then(Dynamic::as_str).unwrap_or_default();
    T::parse_insensitively(raw).map_err(|e| {
        Diagnostic::error(format!("parsing {} ID {:?}: {}", T::DISPLAY_NAME, raw, e), "")
            .with_attribute(AttributePath::new("id"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Put,
    Patch,
}

/// Description of one ARM-backed resource type
#[async_trait]
pub trait ArmResource: Send + Sync + 'static {
    type Id: ResourceIdentity;
    type Model: Serialize + DeserializeOwned + Send + Sync;

    const TYPE_NAME: &'static str;
    const API_VERSION: &'static str;

    /// Schema without `id` and `timeouts`; the handler adds both
    fn schema(&self) -> Schema;

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<Self::Id, ResourceError>;

    fn expand(&self, id: &Self::Id, config: &Dynamic, op: Operation) -> Result<Self::Model, ResourceError>;

    /// State attributes from the ARM model. `prior` is the planned or
    /// current state and holds values ARM never returns, such as secrets.
    fn flatten(&self, id: &Self::Id, model: Self::Model, prior: &Dynamic) -> Attributes;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    fn update_method(&self) -> UpdateMethod {
        UpdateMethod::Put
    }

    /// Cross-attribute checks the schema cannot express
    fn validate(&self, _config: &Dynamic) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn lock_names(&self, _id: &Self::Id, _config: &Dynamic) -> Vec<LockName> {
        Vec::new()
    }

    async fn before_write(
        &self,
        _ctx: &Context,
        _data: &AzureRmProviderData,
        _id: &Self::Id,
        _model: &mut Self::Model,
        _op: Operation,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn after_write(
        &self,
        _ctx: &Context,
        _data: &AzureRmProviderData,
        _id: &Self::Id,
        _config: &Dynamic,
        _op: Operation,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn after_read(
        &self,
        _ctx: &Context,
        _data: &AzureRmProviderData,
        _id: &Self::Id,
        _attributes: &mut Attributes,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn before_delete(
        &self,
        _ctx: &Context,
        _data: &AzureRmProviderData,
        _id: &Self::Id,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Adapts an [`ArmResource`] to tfplug's resource traits
pub struct ArmResourceHandler<R: ArmResource> {
    resource: R,
    provider_data: Option<AzureRmProviderData>,
}

impl<R: ArmResource> ArmResourceHandler<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource,
            provider_data: None,
        }
    }

    pub fn with_provider_data(mut self, data: AzureRmProviderData) -> Self {
        self.provider_data = Some(data);
        self
    }

    fn full_schema(&self) -> Schema {
        let mut schema = self.resource.schema();
        if schema.block.attribute("id").is_none() {
            schema.block.attributes.insert(0, helpers::schema::id());
        }
        if schema.block.nested_block(timeouts::BLOCK_NAME).is_none() {
            schema.block.block_types.push(timeouts::schema());
        }
        schema
    }

    fn deadline(&self, ctx: &Context, state: &Dynamic, op: Operation) -> Context {
        ctx.with_timeout(self.resource.timeouts().for_operation(state, op))
    }

    /// GETs the object and builds its state, `None` when ARM answers 404
    async fn read_state(
        &self,
        ctx: &Context,
        data: &AzureRmProviderData,
        id: &R::Id,
        prior: &Dynamic,
    ) -> Result<Option<Dynamic>, ResourceError> {
        let model: R::Model = match data.client.get(&id.to_string(), R::API_VERSION).await {
            Ok(model) => model,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut attributes = self.resource.flatten(id, model, prior);
        self.resource
            .after_read(ctx, data, id, &mut attributes)
            .await?;
        attributes.insert("id".to_string(), Dynamic::String(id.to_string()));
        attributes.insert(
            timeouts::BLOCK_NAME.to_string(),
            prior.attr(timeouts::BLOCK_NAME).cloned().unwrap_or(Dynamic::Null),
        );
        Ok(Some(state::reconcile_resource(Dynamic::Map(attributes), prior)))
    }

    async fn write(
        &self,
        ctx: &Context,
        data: &AzureRmProviderData,
        id: &R::Id,
        config: &Dynamic,
        planned: &Dynamic,
        op: Operation,
    ) -> Result<Dynamic, ResourceError> {
        let _locks = locks::by_names(&self.resource.lock_names(id, config)).await;
        let path = id.to_string();

        if op == Operation::Create {
            match data.client.get::<serde_json::Value>(&path, R::API_VERSION).await {
                Ok(_) => {
                    return Err(ResourceError::AlreadyExists {
                        id: path,
                        resource_type: R::TYPE_NAME.to_string(),
                    })
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(ResourceError::ExistenceCheck(e)),
            }
        }

        let mut model = self.resource.expand(id, config, op)?;
        self.resource
            .before_write(ctx, data, id, &mut model, op)
            .await?;

        match (op, self.resource.update_method()) {
            (Operation::Update, UpdateMethod::Patch) => {
                data.client
                    .patch_and_wait(ctx, &path, R::API_VERSION, &model)
                    .await?
            }
            _ => {
                data.client
                    .put_and_wait(ctx, &path, R::API_VERSION, &model)
                    .await?
            }
        };

        self.resource
            .after_write(ctx, data, id, config, op)
            .await?;

        self.read_state(ctx, data, id, planned)
            .await?
            .ok_or_else(|| ResourceError::invalid(format!("{} was not found after it was written", path)))
    }

    async fn remove(
        &self,
        ctx: &Context,
        data: &AzureRmProviderData,
        id: &R::Id,
        prior: &Dynamic,
    ) -> Result<(), ResourceError> {
        let _locks = locks::by_names(&self.resource.lock_names(id, prior)).await;
        self.resource.before_delete(ctx, data, id).await?;
        match data
            .client
            .delete_and_wait(ctx, &id.to_string(), R::API_VERSION)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<R: ArmResource> Resource for ArmResourceHandler<R> {
    fn type_name(&self) -> &str {
        R::TYPE_NAME
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: self.full_schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: self.resource.validate(&request.config.value),
        }
    }

    async fn create(
        &self,
        ctx: Context,
        request: CreateResourceRequest,
    ) -> CreateResourceResponse {
        let response = CreateResourceResponse::planned(&request);
        let Some(data) = &self.provider_data else {
            return response.failed(not_configured());
        };

        let config = &request.config.value;
        let id = match self.resource.id_from_config(&data.subscription_id, config) {
            Ok(id) => id,
            Err(e) => return response.failed(e.to_diagnostic("building ID for", R::Id::DISPLAY_NAME)),
        };

        let planned = &request.planned_state.value;
        let ctx = self.deadline(&ctx, planned, Operation::Create);
        match poller::with_context(&ctx, self.write(&ctx, data, &id, config, planned, Operation::Create)).await {
            Ok(state) => {
                tracing::info!("created {}", id);
                CreateResourceResponse {
                    new_state: DynamicValue::new(state),
                    ..response
                }
            }
            Err(e) => response.failed(e.to_diagnostic("creating", &id.describe())),
        }
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut response = ReadResourceResponse::current(&request);
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };

        let prior = &request.current_state.value;
        let id: R::Id = match id_from_state(prior) {
            Ok(id) => id,
            Err(diagnostic) => {
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let ctx = self.deadline(&ctx, prior, Operation::Read);
        match poller::with_context(&ctx, self.read_state(&ctx, data, &id, prior)).await {
            Ok(Some(state)) => response.new_state = Some(DynamicValue::new(state)),
            Ok(None) => {
                tracing::info!("{} was not found - removing from state", id);
                response.new_state = None;
            }
            Err(e) => response.diagnostics.push(e.to_diagnostic("retrieving", &id.describe())),
        }
        response
    }

    async fn update(
        &self,
        ctx: Context,
        request: UpdateResourceRequest,
    ) -> UpdateResourceResponse {
        let mut response = UpdateResourceResponse::planned(&request);
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };

        let id: R::Id = match id_from_state(&request.prior_state.value) {
            Ok(id) => id,
            Err(diagnostic) => {
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let planned = &request.planned_state.value;
        let ctx = self.deadline(&ctx, planned, Operation::Update);
        let write = self.write(&ctx, data, &id, &request.config.value, planned, Operation::Update);
        match poller::with_context(&ctx, write).await {
            Ok(state) => response.new_state = DynamicValue::new(state),
            Err(e) => {
                response.new_state = request.prior_state.clone();
                response.diagnostics.push(e.to_diagnostic("updating", &id.describe()));
            }
        }
        response
    }

    async fn delete(
        &self,
        ctx: Context,
        request: DeleteResourceRequest,
    ) -> DeleteResourceResponse {
        let mut response = DeleteResourceResponse::default();
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };

        let prior = &request.prior_state.value;
        let id: R::Id = match id_from_state(prior) {
            Ok(id) => id,
            Err(diagnostic) => {
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let ctx = self.deadline(&ctx, prior, Operation::Delete);
        match poller::with_context(&ctx, self.remove(&ctx, data, &id, prior)).await {
            Ok(()) => tracing::info!("deleted {}", id),
            Err(e) => response.diagnostics.push(e.to_diagnostic("deleting", &id.describe())),
        }
        response
    }
}

#[async_trait]
impl<R: ArmResource> ResourceWithConfigure for ArmResourceHandler<R> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];
        match provider_data_from(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl<R: ArmResource> ResourceWithImportState for ArmResourceHandler<R> {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };

        let id = match R::Id::parse(&request.id) {
            Ok(id) => id,
            Err(e) => {
                response.diagnostics.push(
                    Diagnostic::error(
                        format!("parsing {} ID for import", R::Id::DISPLAY_NAME),
                        e.to_string(),
                    )
                    .with_attribute(AttributePath::new("id")),
                );
                return response;
            }
        };
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(not_configured());
            return response;
        };

        let ctx = self.deadline(&ctx, &Dynamic::Null, Operation::Read);
        let path = id.to_string();
        let exists = data.client.get::<serde_json::Value>(&path, R::API_VERSION);
        match poller::with_context(&ctx, exists).await {
            Ok(_) => import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response),
            Err(e) if e.is_not_found() => response.diagnostics.push(import_not_found(R::TYPE_NAME)),
            Err(e) => response
                .diagnostics
                .push(ResourceError::from(e).to_diagnostic("retrieving", &id.describe())),
        }
        response
    }
}
