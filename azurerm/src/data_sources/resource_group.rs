//! `azurerm_resource_group` data source

use crate::api::poller;
use crate::api::resources::{self as api, ResourceGroup};
use crate::arm::{self, ResourceError};
use crate::helpers::timeouts::{Operation, Timeouts};
use crate::helpers::{location, schema, tags, values};
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::{ResourceGroupId, ResourceIdentity};
use crate::validate;
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse, DataSourceWithConfigure,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
    ValidateDataSourceConfigResponse,
};
use tfplug::{AttributeBuilder, AttributeType, Dynamic, DynamicValue, SchemaBuilder};

const TYPE_NAME: &str = "azurerm_resource_group";

#[derive(Default)]
pub struct ResourceGroupDataSource {
    provider_data: Option<AzureRmProviderData>,
}

impl ResourceGroupDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_data(mut self, data: AzureRmProviderData) -> Self {
        self.provider_data = Some(data);
        self
    }

    async fn fetch(data: &AzureRmProviderData, id: &ResourceGroupId) -> Result<ResourceGroup, ResourceError> {
        match data.client.get(&id.to_string(), api::API_VERSION).await {
            Ok(group) => Ok(group),
            Err(e) if e.is_not_found() => Err(ResourceError::invalid(format!("{} was not found", id.describe()))),
            Err(e) => Err(e.into()),
        }
    }

    fn state(id: &ResourceGroupId, group: ResourceGroup) -> Dynamic {
        Dynamic::Map(HashMap::from([
            ("id".to_string(), Dynamic::String(id.to_string())),
            ("name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("location".to_string(), Dynamic::String(location::normalize(&group.location))),
            ("managed_by".to_string(), values::opt_string(group.managed_by.as_ref())),
            ("tags".to_string(), tags::flatten(group.tags.as_ref())),
        ]))
    }
}

#[async_trait]
impl DataSource for ResourceGroupDataSource {
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
            .description("Use this data source to access information about an existing Resource Group.")
            .attribute(schema::computed("id", AttributeType::String))
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .description("The Name of this Resource Group.")
                    .validator(validate::func("a valid resource group name", validate::resource_group_name))
                    .build(),
            )
            .attribute(location::schema_computed())
            .attribute(schema::computed("managed_by", AttributeType::String))
            .attribute(schema::computed("tags", AttributeType::map_of(AttributeType::String)))
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

    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut response = ReadDataSourceResponse::from_config(&request);
        let Some(data) = &self.provider_data else {
            response.diagnostics.push(arm::not_configured());
            return response;
        };

        let name = values::string(&request.config.value, "name").unwrap_or_default();
        let id = ResourceGroupId::new(&data.subscription_id, name);
        let ctx = ctx.with_timeout(Timeouts::default().default_for(Operation::Read));
        match poller::with_context(&ctx, Self::fetch(data, &id)).await {
            Ok(group) => response.state = DynamicValue::new(Self::state(&id, group)),
            Err(e) => response.diagnostics.push(e.to_diagnostic("retrieving", &id.describe())),
        }
        response
    }
}

#[async_trait]
impl DataSourceWithConfigure for ResourceGroupDataSource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];
        match arm::provider_data_from(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
        ConfigureDataSourceResponse { diagnostics }
    }
}
