//! `azurerm_resource_group`

use crate::api::resources::{self as api, GenericResource, ResourceGroup};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::timeouts::{Operation, Timeouts};
use crate::helpers::values::{self, Attributes};
use crate::helpers::{location, tags};
use crate::provider_data::AzureRmProviderData;
use crate::resource_id::ResourceGroupId;
use crate::validate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::{AttributeBuilder, AttributeType, Dynamic, Schema, SchemaBuilder};

#[derive(Default)]
pub struct ResourceGroupResource;

impl ResourceGroupResource {
    pub fn new() -> Self {
        Self
    }
}

fn contains_resources_error(id: &ResourceGroupId, nested: &[GenericResource]) -> ResourceError {
    let listing: Vec<String> = nested.iter().map(|r| format!("* `{}`", r.id)).collect();
    ResourceError::invalid(format!(
        "the Resource Group still contains Resources.

Terraform is configured to check for Resources within the Resource Group when deleting the Resource Group - and raise an error if nested Resources still exist to avoid unintentionally deleting these Resources.

Terraform has detected that the following Resources still exist within the Resource Group {:?}:

{}

This feature is intended to avoid the unintentional destruction of nested Resources provisioned through some other means (for example, an ARM Template Deployment) - as such you must either remove these Resources, or disable this behaviour using the feature flag `prevent_deletion_if_contains_resources` within the `features` block when configuring the Provider, for example:

provider \"azurerm\" {{
  features {{
    resource_group {{
      prevent_deletion_if_contains_resources = false
    }}
  }}
}}",
        id.resource_group_name,
        listing.join("\n")
    ))
}

#[async_trait]
impl ArmResource for ResourceGroupResource {
    type Id = ResourceGroupId;
    type Model = ResourceGroup;

    const TYPE_NAME: &'static str = "azurerm_resource_group";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a Resource Group.")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .description("The Name which should be used for this Resource Group. Changing this forces a new Resource Group to be created.")
                    .validator(validate::func("a valid resource group name", validate::resource_group_name))
                    .build(),
            )
            .attribute(location::schema())
            .attribute(
                AttributeBuilder::new("managed_by", AttributeType::String)
                    .optional()
                    .description("The ID of the resource or application that manages this Resource Group.")
                    .validator(tfplug::validator::StringLengthValidator::not_empty())
                    .build(),
            )
            .attribute(tags::schema())
            .build()
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: Duration::from_secs(90 * 60),
            update: Duration::from_secs(90 * 60),
            delete: Duration::from_secs(90 * 60),
            ..Timeouts::default()
        }
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<ResourceGroupId, ResourceError> {
        let name = values::string(config, "name")
            .ok_or_else(|| ResourceError::invalid("`name` must be known"))?;
        Ok(ResourceGroupId::new(subscription_id, name))
    }

    fn expand(&self, _id: &ResourceGroupId, config: &Dynamic, _op: Operation) -> Result<ResourceGroup, ResourceError> {
        Ok(ResourceGroup {
            location: values::string(config, "location").unwrap_or_default(),
            managed_by: values::non_empty_string(config, "managed_by"),
            tags: tags::expand(config),
            ..Default::default()
        })
    }

    fn flatten(&self, id: &ResourceGroupId, model: ResourceGroup, _prior: &Dynamic) -> Attributes {
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("location".to_string(), Dynamic::String(location::normalize(&model.location))),
            ("managed_by".to_string(), values::opt_string(model.managed_by.as_ref())),
            ("tags".to_string(), tags::flatten(model.tags.as_ref())),
        ])
    }

    async fn before_delete(
        &self,
        _ctx: &Context,
        data: &AzureRmProviderData,
        id: &ResourceGroupId,
    ) -> Result<(), ResourceError> {
        if !data.features.resource_group_prevent_deletion_if_contains_resources {
            return Ok(());
        }
        let path = format!("{}/resources", id);
        let nested: Vec<GenericResource> = match data.client.list(&path, api::API_VERSION).await {
            Ok(nested) => nested,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if nested.is_empty() {
            Ok(())
        } else {
            Err(contains_resources_error(id, &nested))
        }
    }
}
