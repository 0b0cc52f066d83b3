//! Attribute validators
//!
//! Validators only look at known, non-null values. Unknown values are checked
//! again once Terraform resolves them during apply.

use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{Diagnostic, Dynamic};

fn known_value(request: &ValidatorRequest) -> Option<&Dynamic> {
    match &request.config_value.value {
        Dynamic::Null | Dynamic::Unknown => None,
        v => Some(v),
    }
}

fn error(request: &ValidatorRequest, summary: String, detail: String) -> ValidatorResponse {
    ValidatorResponse {
        diagnostics: vec![Diagnostic::error(summary, detail).with_attribute(request.path.clone())],
    }
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLengthValidator {
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_most(max: usize) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn not_empty() -> Self {
        Self {
            min: Some(1),
            max: None,
        }
    }
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("length must be between {} and {}", min, max),
            (Some(min), None) => format!("length must be at least {}", min),
            (None, Some(max)) => format!("length must be at most {}", max),
            (None, None) => "any length".to_string(),
        }
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(s) = known_value(&request).and_then(Dynamic::as_str) else {
            return ValidatorResponse::default();
        };
        let len = s.chars().count();

        if let Some(min) = self.min {
            if len < min {
                return error(
                    &request,
                    format!("{} must have minimum length of {}", request.path, min),
                    format!("Got length {}", len),
                );
            }
        }
        if let Some(max) = self.max {
            if len > max {
                return error(
                    &request,
                    format!("{} must have maximum length of {}", request.path, max),
                    format!("Got length {}", len),
                );
            }
        }
        ValidatorResponse::default()
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl StringPatternValidator {
    pub fn new(pattern: regex::Regex, description: impl Into<String>) -> Self {
        Self {
            pattern,
            description: description.into(),
        }
    }
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match known_value(&request).and_then(Dynamic::as_str) {
            Some(s) if !self.pattern.is_match(s) => error(
                &request,
                format!("{} must match {}", request.path, self.description),
                format!("Value '{}' does not match pattern", s),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

/// Accepts only one of a fixed set of strings.
pub struct OneOfValidator {
    pub values: Vec<String>,
    pub ignore_case: bool,
}

impl OneOfValidator {
    pub fn new(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| v.to_string()).collect(),
            ignore_case: false,
        }
    }

    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }
}

impl Validator for OneOfValidator {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.values.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(s) = known_value(&request).and_then(Dynamic::as_str) else {
            return ValidatorResponse::default();
        };
        let matched = self.values.iter().any(|v| {
            if self.ignore_case {
                v.eq_ignore_ascii_case(s)
            } else {
                v == s
            }
        });
        if matched {
            ValidatorResponse::default()
        } else {
            error(
                &request,
                format!("{} has an unsupported value", request.path),
                format!("expected one of [{}], got {:?}", self.values.join(", "), s),
            )
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        format!("number must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(n) = known_value(&request).and_then(Dynamic::as_number) else {
            return ValidatorResponse::default();
        };
        if let Some(min) = self.min {
            if n < min {
                return error(
                    &request,
                    format!("{} must be at least {}", request.path, min),
                    format!("Got {}", n),
                );
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return error(
                    &request,
                    format!("{} must be at most {}", request.path, max),
                    format!("Got {}", n),
                );
            }
        }
        ValidatorResponse::default()
    }
}

/// Whole numbers only. Terraform numbers are arbitrary precision, so `400.5`
/// passes the schema type check unless an attribute asks for integers.
pub struct IntegerValidator;

impl Validator for IntegerValidator {
    fn description(&self) -> String {
        "number must be a whole number".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match known_value(&request).and_then(Dynamic::as_number) {
            Some(n) if !is_integer(n) => error(
                &request,
                format!("{} must be a whole number", request.path),
                format!("Got {}", n),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

/// True for finite values without a fractional part that fit in an `i64`
pub fn is_integer(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        format!("list length must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(items) = known_value(&request).and_then(Dynamic::as_list) else {
            return ValidatorResponse::default();
        };
        if let Some(min) = self.min {
            if items.len() < min {
                return error(
                    &request,
                    format!("{} must have at least {} items", request.path, min),
                    format!("Got {} items", items.len()),
                );
            }
        }
        if let Some(max) = self.max {
            if items.len() > max {
                return error(
                    &request,
                    format!("{} must have at most {} items", request.path, max),
                    format!("Got {} items", items.len()),
                );
            }
        }
        ValidatorResponse::default()
    }
}

/// Wraps a plain function that checks a string and describes what's wrong.
pub struct StringFuncValidator {
    description: String,
    func: fn(&str) -> std::result::Result<(), String>,
}

impl StringFuncValidator {
    pub fn new(description: impl Into<String>, func: fn(&str) -> std::result::Result<(), String>) -> Self {
        Self {
            description: description.into(),
            func,
        }
    }
}

impl Validator for StringFuncValidator {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(s) = known_value(&request).and_then(Dynamic::as_str) else {
            return ValidatorResponse::default();
        };
        match (self.func)(s) {
            Ok(()) => ValidatorResponse::default(),
            Err(detail) => error(
                &request,
                format!("Invalid value for {}", request.path),
                detail,
            ),
        }
    }
}
