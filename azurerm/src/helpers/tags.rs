//! The `tags` attribute shared by most resources

use super::values::{string_map, string_map_to_dynamic};
use std::collections::HashMap;
use tfplug::schema::{Attribute, Validator, ValidatorRequest, ValidatorResponse};
use tfplug::{AttributeBuilder, AttributeType, Diagnostic, Dynamic};

pub const MAX_TAGS: usize = 50;
pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_LENGTH: usize = 256;

pub fn schema() -> Attribute {
    AttributeBuilder::new("tags", AttributeType::map_of(AttributeType::String))
        .optional()
        .description("A mapping of tags to assign to the resource.")
        .validator(TagsValidator)
        .build()
}

pub fn expand(config: &Dynamic) -> Option<HashMap<String, String>> {
    let tags = string_map(config, "tags");
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// ARM omits `tags` when there are none; state keeps an empty map
pub fn flatten(tags: Option<&HashMap<String, String>>) -> Dynamic {
    match tags {
        Some(tags) => string_map_to_dynamic(tags),
        None => Dynamic::Map(HashMap::new()),
    }
}

pub fn check(tags: &HashMap<String, String>) -> Vec<String> {
    let mut problems = Vec::new();
    if tags.len() > MAX_TAGS {
        problems.push(format!(
            "a maximum of {} tags can be applied to each ARM resource, got {}",
            MAX_TAGS,
            tags.len()
        ));
    }
    let mut keys: Vec<_> = tags.keys().collect();
    keys.sort();
    for key in keys {
        if key.chars().count() > MAX_KEY_LENGTH {
            problems.push(format!(
                "the maximum length for a tag key is {} characters: {:?}",
                MAX_KEY_LENGTH, key
            ));
        }
        if tags[key].chars().count() > MAX_VALUE_LENGTH {
            problems.push(format!(
                "the maximum length for a tag value is {} characters: the value for {:?} is {} characters",
                MAX_VALUE_LENGTH,
                key,
                tags[key].chars().count()
            ));
        }
    }
    problems
}

pub struct TagsValidator;

impl Validator for TagsValidator {
    fn description(&self) -> String {
        format!(
            "at most {} tags, keys up to {} and values up to {} characters",
            MAX_TAGS, MAX_KEY_LENGTH, MAX_VALUE_LENGTH
        )
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let tags: HashMap<String, String> = match request.config_value.value.as_map() {
            Some(m) => m
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            None => return ValidatorResponse::default(),
        };
        ValidatorResponse {
            diagnostics: check(&tags)
                .into_iter()
                .map(|p| {
                    Diagnostic::error("Invalid tags", p).with_attribute(request.path.clone())
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfplug::{AttributePath, DynamicValue};

    fn validate(tags: HashMap<String, String>) -> Vec<Diagnostic> {
        TagsValidator
            .validate(ValidatorRequest {
                config_value: DynamicValue::new(string_map_to_dynamic(&tags)),
                path: AttributePath::new("tags"),
            })
            .diagnostics
    }

    #[test]
    fn accepts_reasonable_tags() {
        assert!(validate(HashMap::from([("env".into(), "prod".into())])).is_empty());
    }

    #[test]
    fn rejects_too_many_tags() {
        let tags = (0..51).map(|i| (format!("k{}", i), "v".to_string())).collect();
        assert_eq!(validate(tags).len(), 1);
    }

    #[test]
    fn rejects_long_keys_and_values() {
        let tags = HashMap::from([
            ("k".repeat(513), "v".to_string()),
            ("short".to_string(), "v".repeat(257)),
        ]);
        assert_eq!(validate(tags).len(), 2);
    }

    #[test]
    fn empty_tags_expand_to_none() {
        let config = Dynamic::Map(HashMap::from([(
            "tags".to_string(),
            Dynamic::Map(HashMap::new()),
        )]));
        assert_eq!(expand(&config), None);
        assert_eq!(flatten(None), Dynamic::Map(HashMap::new()));
    }
}
