//! `azurerm_client_config`: the identity the provider authenticated as

use crate::arm;
use crate::helpers::{schema, values};
use crate::provider_data::AzureRmProviderData;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse, DataSourceWithConfigure,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
    ValidateDataSourceConfigResponse,
};
use tfplug::{AttributeType, Dynamic, DynamicValue, SchemaBuilder};

const TYPE_NAME: &str = "azurerm_client_config";

#[derive(Default)]
pub struct ClientConfigDataSource {
    provider_data: Option<AzureRmProviderData>,
}

impl ClientConfigDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_data(mut self, data: AzureRmProviderData) -> Self {
        self.provider_data = Some(data);
        self
    }

    fn state(data: &AzureRmProviderData) -> Dynamic {
        Dynamic::Map(HashMap::from([
            // Nothing on the remote side to key on, so every read is unique.
            ("id".to_string(), Dynamic::String(Utc::now().to_rfc3339())),
            ("client_id".to_string(), values::opt_string(data.client_id.as_ref())),
            ("tenant_id".to_string(), values::opt_string(data.tenant_id.as_ref())),
            ("subscription_id".to_string(), Dynamic::String(data.subscription_id.clone())),
        ]))
    }
}

#[async_trait]
impl DataSource for ClientConfigDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn metadata(&self, _ctx: Context, _request: DataSourceMetadataRequest) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: TYPE_NAME.to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: DataSourceSchemaRequest) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Use this data source to access the configuration of the AzureRM provider.")
            .attribute(schema::computed("id", AttributeType::String))
            .attribute(schema::computed("client_id", AttributeType::String))
            .attribute(schema::computed("tenant_id", AttributeType::String))
            .attribute(schema::computed("subscription_id", AttributeType::String))
            .build();
        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse::default()
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut response = ReadDataSourceResponse::from_config(&request);
        match &self.provider_data {
            Some(data) => response.state = DynamicValue::new(Self::state(data)),
            None => response.diagnostics.push(arm::not_configured()),
        }
        response
    }
}

#[async_trait]
impl DataSourceWithConfigure for ClientConfigDataSource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];
        match arm::provider_data_from(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
        ConfigureDataSourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::tests::provider_data;
    use std::sync::Arc;
    use tfplug::types::ClientCapabilities;

    fn request() -> ReadDataSourceRequest {
        ReadDataSourceRequest {
            type_name: TYPE_NAME.to_string(),
            config: DynamicValue::new(Dynamic::Map(HashMap::new())),
            provider_meta: None,
            client_capabilities: ClientCapabilities {
                deferral_allowed: false,
                write_only_attributes_allowed: false,
            },
        }
    }

    #[tokio::test]
    async fn reports_configured_identity() {
        let mut data = provider_data("http://127.0.0.1:1");
        data.tenant_id = Some("tenant".to_string());
        data.client_id = Some("client".to_string());

        let mut source = ClientConfigDataSource::new();
        let configured = source
            .configure(
                Context::new(),
                ConfigureDataSourceRequest {
                    provider_data: Some(Arc::new(data)),
                },
            )
            .await;
        assert!(configured.diagnostics.is_empty());

        let response = source.read(Context::new(), request()).await;
        assert!(response.diagnostics.is_empty());
        let state = &response.state.value;
        assert_eq!(state.attr("subscription_id").and_then(Dynamic::as_str), Some("sub"));
        assert_eq!(state.attr("tenant_id").and_then(Dynamic::as_str), Some("tenant"));
        assert_eq!(state.attr("client_id").and_then(Dynamic::as_str), Some("client"));
        assert!(state.attr("id").and_then(Dynamic::as_str).is_some());
    }

    #[tokio::test]
    async fn cli_login_leaves_client_id_empty() {
        let source = ClientConfigDataSource::new().with_provider_data(provider_data("http://127.0.0.1:1"));
        let response = source.read(Context::new(), request()).await;
        assert_eq!(response.state.value.attr("client_id").and_then(Dynamic::as_str), Some(""));
    }

    #[tokio::test]
    async fn configure_rejects_missing_provider_data() {
        let mut source = ClientConfigDataSource::new();
        let response = source
            .configure(Context::new(), ConfigureDataSourceRequest { provider_data: None })
            .await;
        assert_eq!(response.diagnostics[0].summary, "No provider data");
    }
}
