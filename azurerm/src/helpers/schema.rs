//! Attributes shared across resource schemas

use crate::validate;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::schema::Attribute;
use tfplug::{AttributeBuilder, AttributeType};

pub fn id() -> Attribute {
    AttributeBuilder::new("id", AttributeType::String)
        .computed()
        .description("The ID of the resource.")
        .plan_modifier(UseStateForUnknown)
        .build()
}

/// Required, force-new `name` checked by `check`
pub fn name(description: &str, check: fn(&str) -> Result<(), String>) -> Attribute {
    AttributeBuilder::new("name", AttributeType::String)
        .required()
        .force_new()
        .description(description)
        .validator(validate::func("a valid name", check))
        .build()
}

/// Required, force-new `name` whose rule is a single regular expression
pub fn name_matching(description: &str, pattern: &validate::NamePattern) -> Attribute {
    let builder = AttributeBuilder::new("name", AttributeType::String)
        .required()
        .force_new()
        .description(description);
    match pattern.validator() {
        Ok(validator) => builder.validator(validator),
        Err(e) => {
            tracing::error!("name pattern {:?} does not compile: {}", pattern.pattern, e);
            builder
        }
    }
    .build()
}

pub fn resource_group_name() -> Attribute {
    AttributeBuilder::new("resource_group_name", AttributeType::String)
        .required()
        .force_new()
        .description("The name of the Resource Group where the resource should exist. Changing this forces a new resource to be created.")
        .validator(validate::func("a valid resource group name", validate::resource_group_name))
        .build()
}

/// Required, force-new reference to a parent by name
pub fn parent_name(attribute: &str, description: &str, check: fn(&str) -> Result<(), String>) -> Attribute {
    AttributeBuilder::new(attribute, AttributeType::String)
        .required()
        .force_new()
        .description(description)
        .validator(validate::func("a valid name", check))
        .build()
}

/// Computed attribute that keeps its prior value across plans
pub fn computed(name: &str, type_: AttributeType) -> Attribute {
    AttributeBuilder::new(name, type_)
        .computed()
        .plan_modifier(UseStateForUnknown)
        .build()
}
