//! Schema types and builders for tfplug
//!
//! This module provides the schema system for defining resource and data source
//! schemas, including attribute types, blocks, and validation.

use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    pub fn list_of(element: AttributeType) -> Self {
        AttributeType::List(Box::new(element))
    }

    pub fn set_of(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn map_of(element: AttributeType) -> Self {
        AttributeType::Map(Box::new(element))
    }

    /// JSON type expression Terraform expects in schema responses,
    /// e.g. `"string"` or `["set","string"]`.
    pub fn to_type_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::List(inner) => json!(["list", inner.to_type_json()]),
            AttributeType::Set(inner) => json!(["set", inner.to_type_json()]),
            AttributeType::Map(inner) => json!(["map", inner.to_type_json()]),
            AttributeType::Object(fields) => {
                let fields: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_type_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    /// Fills missing object fields with null. Terraform rejects objects that
    /// omit declared fields.
    pub fn conform(&self, value: &Dynamic) -> Dynamic {
        match (self, value) {
            (AttributeType::Object(fields), Dynamic::Map(entries)) => Dynamic::Map(
                fields
                    .iter()
                    .map(|(name, ty)| {
                        let v = entries.get(name).unwrap_or(&Dynamic::Null);
                        (name.clone(), ty.conform(v))
                    })
                    .collect(),
            ),
            (AttributeType::List(inner), Dynamic::List(items))
            | (AttributeType::Set(inner), Dynamic::List(items)) => {
                Dynamic::List(items.iter().map(|v| inner.conform(v)).collect())
            }
            (AttributeType::Map(inner), Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), inner.conform(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64, // Increment when schema changes require migration
    pub block: Block, // Root block containing all attributes
}

/// Block represents a configuration block
#[derive(Debug, Clone)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub block_types: Vec<NestedBlock>,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

impl Block {
    fn empty() -> Self {
        Self {
            version: 0,
            attributes: Vec::new(),
            block_types: Vec::new(),
            description: String::new(),
            description_kind: StringKind::Plain,
            deprecated: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn nested_block(&self, type_name: &str) -> Option<&NestedBlock> {
        self.block_types.iter().find(|b| b.type_name == type_name)
    }

    /// Shapes `value` into an object carrying exactly this block's attributes
    /// and nested blocks. Missing attributes become null, absent list and set
    /// blocks become empty lists and unknown keys are dropped.
    pub fn conform(&self, value: &Dynamic) -> Dynamic {
        let empty = HashMap::new();
        let entries = match value {
            Dynamic::Map(m) => m,
            Dynamic::Unknown => return Dynamic::Unknown,
            _ => &empty,
        };

        let mut out = HashMap::with_capacity(self.attributes.len() + self.block_types.len());
        for attr in &self.attributes {
            let v = entries.get(&attr.name).unwrap_or(&Dynamic::Null);
            out.insert(attr.name.clone(), attr.r#type.conform(v));
        }

        for nested in &self.block_types {
            let v = entries.get(&nested.type_name).unwrap_or(&Dynamic::Null);
            out.insert(nested.type_name.clone(), nested.conform(v));
        }

        Dynamic::Map(out)
    }
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    pub default: Option<Arc<dyn Default>>,
    pub deprecated: bool,
}

// Manual Debug implementation since validators/modifiers don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field(
                "plan_modifiers",
                &format!("{} plan modifiers", self.plan_modifiers.len()),
            )
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// NestedBlock represents a nested configuration block
#[derive(Debug, Clone)]
pub struct NestedBlock {
    pub type_name: String,
    pub block: Block,
    pub nesting: NestingMode,
    pub min_items: i64,
    pub max_items: i64,
}

impl NestedBlock {
    fn conform(&self, value: &Dynamic) -> Dynamic {
        match (self.nesting, value) {
            (_, Dynamic::Unknown) => Dynamic::Unknown,
            (NestingMode::List | NestingMode::Set, Dynamic::List(items)) => {
                Dynamic::List(items.iter().map(|v| self.block.conform(v)).collect())
            }
            (NestingMode::List | NestingMode::Set, _) => Dynamic::List(Vec::new()),
            (NestingMode::Map, Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.block.conform(v)))
                    .collect(),
            ),
            (NestingMode::Map, _) => Dynamic::Map(HashMap::new()),
            (NestingMode::Group, v) => self.block.conform(v),
            (_, Dynamic::Null) => Dynamic::Null,
            (_, v) => self.block.conform(v),
        }
    }
}

/// NestingMode defines how nested blocks are structured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NestingMode {
    Invalid,
    Single,
    List,
    Set,
    Map,
    Group,
}

/// StringKind represents the format of string values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StringKind {
    Plain,
    Markdown,
}

/// Validator performs validation on attribute values during planning
/// Implement this for custom validation logic
pub trait Validator: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Perform validation
    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse;
}

/// Request for validators
pub struct ValidatorRequest {
    pub config_value: DynamicValue,
    pub path: AttributePath,
}

/// Response from validators
#[derive(Default)]
pub struct ValidatorResponse {
    pub diagnostics: Vec<Diagnostic>,
}

/// PlanModifier modifies planned values during planning
/// Common uses: RequiresReplace, UseStateForUnknown
pub trait PlanModifier: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Modify the planned value
    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse;
}

/// Request for plan modifiers
pub struct PlanModifierRequest {
    pub config_value: DynamicValue,
    /// Prior value of the attribute; null when the resource is being created.
    pub state_value: DynamicValue,
    pub plan_value: DynamicValue,
    pub path: AttributePath,
    pub resource_is_new: bool,
}

/// Response from plan modifiers
pub struct PlanModifierResponse {
    pub plan_value: DynamicValue,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifierResponse {
    pub fn unchanged(request: &PlanModifierRequest) -> Self {
        Self {
            plan_value: request.plan_value.clone(),
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Default provides default values for optional attributes
/// Called when attribute is not set in configuration
pub trait Default: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Provide default value
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

/// Request for default values
pub struct DefaultRequest {
    pub path: AttributePath,
}

/// Response with default value
pub struct DefaultResponse {
    pub value: DynamicValue,
}

/// AttributeBuilder provides fluent API for building attributes
/// ALWAYS use this instead of constructing Attribute directly
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Create a new attribute builder
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
                deprecated: false,
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.attribute.validators.push(Arc::new(validator));
        self
    }

    pub fn plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.attribute.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Changing this attribute destroys and recreates the resource.
    pub fn force_new(self) -> Self {
        self.plan_modifier(crate::plan_modifier::RequiresReplaceIfChanged)
    }

    /// Set default. Terraform only accepts provider-supplied values for
    /// computed attributes, so this also marks the attribute computed.
    pub fn default(mut self, default: impl Default + 'static) -> Self {
        self.attribute.default = Some(Arc::new(default));
        self.attribute.computed = true;
        self
    }

    /// Finalize the attribute
    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// NestedBlockBuilder builds repeated or single configuration blocks
pub struct NestedBlockBuilder {
    nested: NestedBlock,
}

impl NestedBlockBuilder {
    pub fn new(type_name: &str, nesting: NestingMode) -> Self {
        Self {
            nested: NestedBlock {
                type_name: type_name.to_string(),
                block: Block::empty(),
                nesting,
                min_items: 0,
                max_items: 0,
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.nested.block.description = desc.to_string();
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.nested.block.attributes.push(attr);
        self
    }

    pub fn block(mut self, block: NestedBlock) -> Self {
        self.nested.block.block_types.push(block);
        self
    }

    pub fn min_items(mut self, min: i64) -> Self {
        self.nested.min_items = min;
        self
    }

    pub fn max_items(mut self, max: i64) -> Self {
        self.nested.max_items = max;
        self
    }

    pub fn build(self) -> NestedBlock {
        self.nested
    }
}

/// SchemaBuilder provides fluent API for building schemas
/// ALWAYS use this for consistency
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block::empty(),
            },
        }
    }

    /// Set schema version
    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self.schema.block.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    /// Add nested block
    pub fn block(mut self, block: NestedBlock) -> Self {
        self.schema.block.block_types.push(block);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn description_kind(mut self, kind: StringKind) -> Self {
        self.schema.block.description_kind = kind;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    /// Finalize the schema
    pub fn build(self) -> Schema {
        self.schema
    }
}

impl std::default::Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_builder_creates_required_string() {
        let attr = AttributeBuilder::new("name", AttributeType::String)
            .description("The name of the resource group")
            .required()
            .force_new()
            .build();

        assert_eq!(attr.name, "name");
        assert!(attr.required);
        assert!(!attr.optional);
        assert_eq!(attr.plan_modifiers.len(), 1);
    }

    #[test]
    fn cloned_attribute_keeps_validators() {
        let attr = AttributeBuilder::new("name", AttributeType::String)
            .required()
            .validator(crate::validator::StringLengthValidator::between(1, 90))
            .build();

        assert_eq!(attr.clone().validators.len(), 1);
    }

    #[test]
    fn type_json_matches_terraform_encoding() {
        assert_eq!(AttributeType::String.to_type_json(), serde_json::json!("string"));
        assert_eq!(
            AttributeType::set_of(AttributeType::String).to_type_json(),
            serde_json::json!(["set", "string"])
        );
        assert_eq!(
            AttributeType::map_of(AttributeType::String).to_type_json(),
            serde_json::json!(["map", "string"])
        );
    }

    #[test]
    fn conform_fills_missing_attributes_and_blocks() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .block(
                NestedBlockBuilder::new("subnet", NestingMode::Set)
                    .attribute(
                        AttributeBuilder::new("name", AttributeType::String)
                            .required()
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("security_group", AttributeType::String)
                            .optional()
                            .build(),
                    )
                    .build(),
            )
            .block(
                NestedBlockBuilder::new("timeouts", NestingMode::Single)
                    .attribute(
                        AttributeBuilder::new("create", AttributeType::String)
                            .optional()
                            .build(),
                    )
                    .build(),
            )
            .build();

        let mut input = HashMap::new();
        input.insert("name".to_string(), Dynamic::from("vnet1"));
        input.insert("stray".to_string(), Dynamic::from("dropped"));

        let out = schema.block.conform(&Dynamic::Map(input));
        let map = out.as_map().unwrap();

        assert_eq!(map.len(), 4);
        assert_eq!(map["id"], Dynamic::Null);
        assert_eq!(map["subnet"], Dynamic::List(vec![]));
        assert_eq!(map["timeouts"], Dynamic::Null);
        assert!(!map.contains_key("stray"));

        let mut subnet = HashMap::new();
        subnet.insert("name".to_string(), Dynamic::from("s1"));
        let mut with_subnet = HashMap::new();
        with_subnet.insert("subnet".to_string(), Dynamic::List(vec![Dynamic::Map(subnet)]));

        let out = schema.block.conform(&Dynamic::Map(with_subnet));
        let subnets = out.attr("subnet").unwrap().as_list().unwrap();
        assert_eq!(subnets[0].as_map().unwrap()["security_group"], Dynamic::Null);
    }

    #[test]
    fn default_marks_attribute_computed() {
        let attr = AttributeBuilder::new("protocol", AttributeType::String)
            .optional()
            .default(crate::defaults::StaticDefault::string("http"))
            .build();

        assert!(attr.optional);
        assert!(attr.computed);
    }
}
