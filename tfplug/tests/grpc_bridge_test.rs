//! Drives the gRPC bridge with an in-memory provider

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tfplug::context::Context;
use tfplug::grpc::ProviderService;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::proto;
use tfplug::proto::provider_server::Provider as _;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::{
    ConfigurableResource, ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue, ServerCapabilities};
use tonic::Request;

type Store = Arc<Mutex<HashMap<String, String>>>;

struct MemoryProvider {
    store: Store,
}

#[async_trait]
impl Provider for MemoryProvider {
    fn type_name(&self) -> &str {
        "memory"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "memory".to_string(),
            server_capabilities: ServerCapabilities::default(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new().build(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(self.store.clone()) as Arc<dyn Any + Send + Sync>),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "memory_value".to_string(),
            Box::new(|| Box::new(MemoryValue { store: None }) as Box<dyn ConfigurableResource>),
        );
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        HashMap::new()
    }
}

struct MemoryValue {
    store: Option<Store>,
}

impl MemoryValue {
    fn state(name: &str, value: &str) -> DynamicValue {
        let mut state = DynamicValue::object();
        state.set_string(&AttributePath::new("id"), name).unwrap();
        state.set_string(&AttributePath::new("name"), name).unwrap();
        state.set_string(&AttributePath::new("value"), value).unwrap();
        state
    }

    fn put(&self, planned: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| Diagnostic::error("Provider not configured", ""))?;
        let name = planned.get_string(&AttributePath::new("name")).unwrap();
        let value = planned.get_string(&AttributePath::new("value")).unwrap();
        store.lock().unwrap().insert(name.clone(), value.clone());
        Ok(Self::state(&name, &value))
    }
}

#[async_trait]
impl Resource for MemoryValue {
    fn type_name(&self) -> &str {
        "memory_value"
    }

    async fn metadata(&self, _ctx: Context, _request: ResourceMetadataRequest) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: "memory_value".to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("id", AttributeType::String)
                        .computed()
                        .plan_modifier(UseStateForUnknown)
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("name", AttributeType::String)
                        .required()
                        .force_new()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("value", AttributeType::String)
                        .required()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("tags", AttributeType::map_of(AttributeType::String))
                        .optional()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse { diagnostics: vec![] }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        match self.put(&request.planned_state) {
            Ok(new_state) => CreateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![],
            },
            Err(diag) => CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics: vec![diag],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let name = request
            .current_state
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default();
        let stored = self
            .store
            .as_ref()
            .and_then(|s| s.lock().unwrap().get(&name).cloned());
        ReadResourceResponse {
            new_state: stored.map(|value| Self::state(&name, &value)),
            diagnostics: vec![],
            private: vec![],
            deferred: None,
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let new_state = self.put(&request.planned_state).unwrap();
        UpdateResourceResponse {
            new_state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let name = request
            .prior_state
            .get_string(&AttributePath::new("name"))
            .unwrap();
        if let Some(store) = &self.store {
            store.lock().unwrap().remove(&name);
        }
        DeleteResourceResponse { diagnostics: vec![] }
    }
}

#[async_trait]
impl ResourceWithConfigure for MemoryValue {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        self.store = request
            .provider_data
            .and_then(|data| data.downcast_ref::<Store>().cloned());
        ConfigureResourceResponse { diagnostics: vec![] }
    }
}

#[async_trait]
impl ResourceWithImportState for MemoryValue {
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
        tfplug::import_state_passthrough_id(&ctx, AttributePath::new("name"), &request, &mut response);
        response
    }
}

fn service() -> (ProviderService<MemoryProvider>, Store) {
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    (
        ProviderService::new(MemoryProvider {
            store: store.clone(),
        }),
        store,
    )
}

fn encode(value: &DynamicValue) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: value.encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn decode(value: Option<proto::DynamicValue>) -> DynamicValue {
    DynamicValue::decode_msgpack(&value.unwrap().msgpack).unwrap()
}

fn config(name: &str, value: &str) -> DynamicValue {
    let mut config = DynamicValue::object();
    config.set_string(&AttributePath::new("name"), name).unwrap();
    config.set_string(&AttributePath::new("value"), value).unwrap();
    config
}

async fn configure(service: &ProviderService<MemoryProvider>) {
    service
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: encode(&DynamicValue::object()),
            client_capabilities: None,
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn schema_lists_resources_with_json_types() {
    let (service, _) = service();

    let response = service
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();

    let schema = response.resource_schemas.get("memory_value").unwrap();
    let block = schema.block.as_ref().unwrap();
    let tags = block.attributes.iter().find(|a| a.name == "tags").unwrap();
    assert_eq!(tags.r#type, br#"["map","string"]"#.to_vec());
    assert!(response.diagnostics.is_empty());
}

#[tokio::test]
async fn plan_then_apply_create_stores_conformed_state() {
    let (service, store) = service();
    configure(&service).await;
    let config = config("greeting", "hello");

    let plan = service
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "memory_value".to_string(),
            prior_state: encode(&DynamicValue::null()),
            proposed_new_state: encode(&config),
            config: encode(&config),
            prior_private: vec![],
            provider_meta: None,
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();
    let planned = decode(plan.planned_state.clone());
    assert!(planned.value.attr("id").unwrap().is_unknown());

    let apply = service
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "memory_value".to_string(),
            prior_state: encode(&DynamicValue::null()),
            planned_state: plan.planned_state,
            config: encode(&config),
            planned_private: vec![],
            provider_meta: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(apply.diagnostics.is_empty());
    let new_state = decode(apply.new_state);
    assert_eq!(new_state.get_string(&AttributePath::new("id")).unwrap(), "greeting");
    // Not set by the resource, but present as null after conforming.
    assert_eq!(new_state.value.as_map().unwrap().get("tags"), Some(&Dynamic::Null));
    assert_eq!(store.lock().unwrap().get("greeting").unwrap(), "hello");
}

#[tokio::test]
async fn read_of_missing_object_returns_null_state() {
    let (service, _) = service();
    configure(&service).await;

    let response = service
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "memory_value".to_string(),
            current_state: encode(&MemoryValue::state("gone", "x")),
            private: vec![],
            provider_meta: None,
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(decode(response.new_state).is_null());
}

#[tokio::test]
async fn failed_create_records_no_state() {
    let (service, _) = service();
    // Not configured: the resource has no store and reports an error.
    let config = config("greeting", "hello");

    let apply = service
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "memory_value".to_string(),
            prior_state: None,
            planned_state: encode(&config),
            config: encode(&config),
            planned_private: vec![],
            provider_meta: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(apply.diagnostics.len(), 1);
    assert!(decode(apply.new_state).is_null());
}

#[tokio::test]
async fn unknown_resource_type_is_a_diagnostic() {
    let (service, _) = service();

    let response = service
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "memory_nothing".to_string(),
            current_state: None,
            private: vec![],
            provider_meta: None,
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert!(response.diagnostics[0].summary.contains("memory_nothing"));
}

#[tokio::test]
async fn import_returns_conformed_partial_state() {
    let (service, _) = service();
    configure(&service).await;

    let response = service
        .import_resource_state(Request::new(proto::import_resource_state::Request {
            type_name: "memory_value".to_string(),
            id: "greeting".to_string(),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    let imported = &response.imported_resources[0];
    let state = decode(imported.state.clone());
    let map = state.value.as_map().unwrap();
    assert_eq!(map.get("name"), Some(&Dynamic::from("greeting")));
    assert_eq!(map.get("value"), Some(&Dynamic::Null));
    assert_eq!(map.len(), 4);
}

#[tokio::test]
async fn upgrade_conforms_json_state() {
    let (service, _) = service();

    let response = service
        .upgrade_resource_state(Request::new(proto::upgrade_resource_state::Request {
            type_name: "memory_value".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: br#"{"id":"greeting","name":"greeting","value":"hi","legacy":"drop me"}"#
                    .to_vec(),
                flatmap: HashMap::new(),
            }),
        }))
        .await
        .unwrap()
        .into_inner();

    let state = decode(response.upgraded_state);
    let map = state.value.as_map().unwrap();
    assert!(!map.contains_key("legacy"));
    assert_eq!(map.get("tags"), Some(&Dynamic::Null));
}
