//! Default value providers for attributes
//!
//! Defaults are evaluated during planning when an optional attribute is null
//! in configuration.

use crate::schema::{Default, DefaultRequest, DefaultResponse};
use crate::types::{Dynamic, DynamicValue};
use std::collections::HashMap;

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn string(value: &str) -> Self {
        Self::new(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Self {
        Self::new(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Dynamic::Bool(value))
    }

    pub fn list(values: Vec<Dynamic>) -> Self {
        Self::new(Dynamic::List(values))
    }

    pub fn empty_map() -> Self {
        Self::new(Dynamic::Map(HashMap::new()))
    }
}

impl Default for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: DynamicValue::new(self.value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;

    fn request() -> DefaultRequest {
        DefaultRequest {
            path: AttributePath::new("test"),
        }
    }

    #[test]
    fn static_default_string() {
        let default = StaticDefault::string("Standard");
        let response = default.default_value(request());

        assert_eq!(response.value.value, Dynamic::from("Standard"));
        assert!(default.description().contains("Standard"));
    }

    #[test]
    fn static_default_bool() {
        let response = StaticDefault::bool(true).default_value(request());
        assert_eq!(response.value.value, Dynamic::Bool(true));
    }

    #[test]
    fn static_default_empty_map() {
        let response = StaticDefault::empty_map().default_value(request());
        assert_eq!(response.value.value, Dynamic::Map(HashMap::new()));
    }
}
