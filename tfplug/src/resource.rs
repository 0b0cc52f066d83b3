//! Managed resources
//!
//! The gRPC bridge builds a fresh resource from its factory for every call,
//! hands it the provider data through [`ResourceWithConfigure::configure`],
//! then runs exactly one lifecycle method. Resources therefore keep no
//! per-call state of their own.
//!
//! Every lifecycle response carries its own diagnostics. Terraform treats an
//! error diagnostic as a failed operation but still records `new_state`, so
//! a failed create should leave it null and a failed update should leave the
//! prior state in place.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Deferred, Diagnostic, Dynamic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

#[async_trait]
pub trait Resource: Send + Sync {
    /// Full type name such as `azurerm_resource_group`; the same string the
    /// provider registers the factory under
    fn type_name(&self) -> &str;

    async fn metadata(&self, ctx: Context, request: ResourceMetadataRequest) -> ResourceMetadataResponse;

    async fn schema(&self, ctx: Context, request: ResourceSchemaRequest) -> ResourceSchemaResponse;

    /// Checks across attributes that single-attribute validators cannot
    /// express. Values may still be unknown at this point.
    async fn validate(&self, ctx: Context, request: ValidateResourceConfigRequest) -> ValidateResourceConfigResponse;

    /// The new state must have every computed attribute known.
    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse;

    /// Refresh. A `None` state tells Terraform the object is gone.
    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse;

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse;

    /// Nothing of the object may remain once this succeeds.
    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse;
}

/// Receives the provider data, right after the factory runs
#[async_trait]
pub trait ResourceWithConfigure: Resource {
    async fn configure(&mut self, ctx: Context, request: ConfigureResourceRequest) -> ConfigureResourceResponse;
}

/// `terraform import`: turn a user-supplied ID into a state to refresh
#[async_trait]
pub trait ResourceWithImportState: Resource {
    async fn import_state(&self, ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse;
}

/// Everything the gRPC bridge needs from a resource. Blanket-implemented, so
/// implementing the component traits is enough.
pub trait ConfigurableResource: ResourceWithConfigure + ResourceWithImportState {}

impl<T: ResourceWithConfigure + ResourceWithImportState> ConfigurableResource for T {}

pub struct ResourceMetadataRequest;

pub struct ResourceMetadataResponse {
    pub type_name: String,
}

pub struct ResourceSchemaRequest;

pub struct ResourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateResourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
    pub client_capabilities: ClientCapabilities,
}

pub struct ValidateResourceConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureResourceRequest {
    /// Whatever the provider returned from configure; downcast it
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct ConfigureResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct CreateResourceRequest {
    pub type_name: String,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
    pub planned_private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
}

pub struct CreateResourceResponse {
    pub new_state: DynamicValue,
    pub private: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CreateResourceResponse {
    /// Starts from the plan so validation failures echo it back unchanged
    pub fn planned(request: &CreateResourceRequest) -> Self {
        Self {
            new_state: request.planned_state.clone(),
            private: vec![],
            diagnostics: vec![],
        }
    }

    /// Records `diagnostic` and drops the planned state: nothing was created
    pub fn failed(mut self, diagnostic: Diagnostic) -> Self {
        self.new_state = DynamicValue::new(Dynamic::Null);
        self.diagnostics.push(diagnostic);
        self
    }
}

pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: DynamicValue,
    pub private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
    pub client_capabilities: ClientCapabilities,
}

pub struct ReadResourceResponse {
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
    pub private: Vec<u8>,
    pub deferred: Option<Deferred>,
}

impl ReadResourceResponse {
    /// Keeps the current state and private data until a refresh replaces them
    pub fn current(request: &ReadResourceRequest) -> Self {
        Self {
            new_state: Some(request.current_state.clone()),
            diagnostics: vec![],
            private: request.private.clone(),
            deferred: None,
        }
    }
}

pub struct UpdateResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
    pub planned_private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
}

pub struct UpdateResourceResponse {
    pub new_state: DynamicValue,
    pub private: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl UpdateResourceResponse {
    pub fn planned(request: &UpdateResourceRequest) -> Self {
        Self {
            new_state: request.planned_state.clone(),
            private: request.planned_private.clone(),
            diagnostics: vec![],
        }
    }
}

pub struct DeleteResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_private: Vec<u8>,
    pub provider_meta: Option<DynamicValue>,
}

#[derive(Default)]
pub struct DeleteResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
    pub client_capabilities: ClientCapabilities,
}

pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Vec<Diagnostic>,
    pub deferred: Option<Deferred>,
}

pub struct ImportedResource {
    pub type_name: String,
    pub state: DynamicValue,
    pub private: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn planned() -> DynamicValue {
        DynamicValue::new(Dynamic::Map(HashMap::from([(
            "name".to_string(),
            Dynamic::String("rg".to_string()),
        )])))
    }

    #[test]
    fn failed_create_leaves_no_state() {
        let request = CreateResourceRequest {
            type_name: "azurerm_resource_group".to_string(),
            planned_state: planned(),
            config: planned(),
            planned_private: vec![],
            provider_meta: None,
        };
        let response = CreateResourceResponse::planned(&request);
        assert_eq!(response.new_state.value, planned().value);

        let response = response.failed(Diagnostic::error("creating", "boom"));
        assert!(response.new_state.value.is_null());
        assert_eq!(response.diagnostics.len(), 1);
    }

    #[test]
    fn read_starts_from_current_state() {
        let request = ReadResourceRequest {
            type_name: "azurerm_resource_group".to_string(),
            current_state: planned(),
            private: b"p".to_vec(),
            provider_meta: None,
            client_capabilities: ClientCapabilities {
                deferral_allowed: false,
                write_only_attributes_allowed: false,
            },
        };
        let response = ReadResourceResponse::current(&request);
        assert_eq!(response.new_state.map(|s| s.value), Some(planned().value));
        assert_eq!(response.private, b"p".to_vec());
    }
}
