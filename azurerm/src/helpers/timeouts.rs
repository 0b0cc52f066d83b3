//! The `timeouts` block and per-operation deadlines

use std::time::Duration;
use tfplug::schema::{NestedBlock, Validator, ValidatorRequest, ValidatorResponse};
use tfplug::{AttributeBuilder, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode};

pub const BLOCK_NAME: &str = "timeouts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    fn attribute(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    pub fn default_for(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Deadline for `op`, taken from the `timeouts` block of `state` when set
    pub fn for_operation(&self, state: &Dynamic, op: Operation) -> Duration {
        state
            .attr(BLOCK_NAME)
            .and_then(|block| block.attr(op.attribute()))
            .and_then(Dynamic::as_str)
            .and_then(|raw| parse_duration(raw).ok())
            .unwrap_or_else(|| self.default_for(op))
    }
}

pub fn schema() -> NestedBlock {
    let mut block = NestedBlockBuilder::new(BLOCK_NAME, NestingMode::Single);
    for op in [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ] {
        block = block.attribute(
            AttributeBuilder::new(op.attribute(), AttributeType::String)
                .optional()
                .validator(DurationValidator)
                .build(),
        );
    }
    block.build()
}

/// Parses durations such as `30m`, `1h30m`, `90s` or `1.5h`
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration is empty".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
        if digits == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration {:?}", input))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };
        rest = &rest[unit_len..];
        total += value * seconds;
    }
    Duration::try_from_secs_f64(total).map_err(|e| format!("duration {:?} out of range: {}", input, e))
}

pub struct DurationValidator;

impl Validator for DurationValidator {
    fn description(&self) -> String {
        "a duration such as 30m or 1h30m".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(raw) = request.config_value.value.as_str() else {
            return ValidatorResponse::default();
        };
        match parse_duration(raw) {
            Ok(_) => ValidatorResponse::default(),
            Err(e) => ValidatorResponse {
                diagnostics: vec![Diagnostic::error("Invalid timeout", e).with_attribute(request.path)],
            },
        }
    }
}
