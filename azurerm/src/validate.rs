//! Value validators for ARM names and addresses
//!
//! Each check is a plain `fn(&str) -> Result<(), String>` so it can be used
//! with [`tfplug::validator::StringFuncValidator`].

use crate::resource_id::ResourceIdentity;
use regex::Regex;
use std::marker::PhantomData;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;
use tfplug::schema::{Validator, ValidatorRequest, ValidatorResponse};
use tfplug::validator::{StringFuncValidator, StringPatternValidator};
use tfplug::Diagnostic;

fn is_match(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

pub fn resource_group_name(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    if value.is_empty() || value.chars().count() > 90 {
        return Err("resource group name must be between 1 and 90 characters".to_string());
    }
    if !is_match(&RE, r"^[-\w._()]+$", value) {
        return Err(
            "resource group name may only contain alphanumerics, underscores, parentheses, hyphens and periods"
                .to_string(),
        );
    }
    if value.ends_with('.') {
        return Err("resource group name cannot end with a period".to_string());
    }
    Ok(())
}

/// Names of virtual networks, subnets, NSGs and NICs
pub fn network_name(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    if value.is_empty() || value.len() > 80 {
        return Err("name must be between 1 and 80 characters".to_string());
    }
    if !is_match(&RE, r"^[a-zA-Z0-9]([a-zA-Z0-9._-]*[a-zA-Z0-9_])?$", value) {
        return Err(
            "name must begin with a letter or number, end with a letter, number or underscore, and may contain only letters, numbers, underscores, periods or hyphens"
                .to_string(),
        );
    }
    Ok(())
}

pub fn dns_zone_name(value: &str) -> Result<(), String> {
    let labels: Vec<&str> = value.trim_end_matches('.').split('.').collect();
    if value.len() > 253 || labels.len() < 2 {
        return Err(format!("{:?} is not a valid DNS zone name", value));
    }
    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(format!("{:?} is not a valid DNS zone name", value));
        }
    }
    Ok(())
}

pub fn dns_record_name(value: &str) -> Result<(), String> {
    if value.is_empty() || value.len() > 253 {
        return Err("record name must be between 1 and 253 characters".to_string());
    }
    if value
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '*' | '@')))
    {
        return Err(format!("{:?} is not a valid record name", value));
    }
    Ok(())
}

pub fn api_management_backend_name(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    if value.is_empty() || value.chars().count() > 80 {
        return Err("backend name must be between 1 and 80 characters".to_string());
    }
    if !is_match(&RE, r"^[^*#&+:<>?]+$", value) {
        return Err("backend name cannot contain any of *#&+:<>?".to_string());
    }
    Ok(())
}

pub fn api_management_service_name(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    if !is_match(&RE, r"^[a-zA-Z](?:[a-zA-Z0-9-]{0,48}[a-zA-Z0-9])?$", value) {
        return Err(
            "the API Management service name must be 1 to 50 characters, start with a letter and contain only letters, numbers and hyphens"
                .to_string(),
        );
    }
    Ok(())
}

pub fn cosmos_entity_name(value: &str) -> Result<(), String> {
    if value.is_empty() || value.chars().count() > 255 {
        return Err("name must be between 1 and 255 characters".to_string());
    }
    if value.contains(['/', '\\', '#', '?']) || value.ends_with(' ') {
        return Err("name may not contain /, \\, #, ? or end with a space".to_string());
    }
    Ok(())
}

pub fn cosmos_account_name(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    if !is_match(&RE, r"^[a-z0-9]([a-z0-9-]{1,42}[a-z0-9])$", value) {
        return Err(
            "account name must be 3 to 44 lowercase letters, numbers or hyphens and cannot start or end with a hyphen"
                .to_string(),
        );
    }
    Ok(())
}

pub fn uuid(value: &str) -> Result<(), String> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| format!("{:?} is not a valid UUID", value))
}

pub fn ipv4_address(value: &str) -> Result<(), String> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| format!("{:?} is not a valid IPv4 address", value))
}

/// IPv4 or IPv6 network in CIDR notation
pub fn cidr(value: &str) -> Result<(), String> {
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| format!("{:?} is not in CIDR notation", value))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| format!("{:?} does not contain a valid IP address", value))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    match prefix.parse::<u8>() {
        Ok(p) if p <= max => Ok(()),
        _ => Err(format!(
            "{:?} has an invalid prefix length; expected 0 to {}",
            value, max
        )),
    }
}

/// Port, `*` or a `low-high` range
pub fn port_or_range(value: &str) -> Result<(), String> {
    if value == "*" {
        return Ok(());
    }
    let port = |p: &str| p.parse::<u16>().ok().filter(|p| *p >= 1);
    let valid = match value.split_once('-') {
        Some((low, high)) => matches!((port(low), port(high)), (Some(l), Some(h)) if l <= h),
        None => port(value).is_some(),
    };
    if valid {
        Ok(())
    } else {
        Err(format!("{:?} is not a port, port range or *", value))
    }
}

/// ISO 8601 duration such as `PT1M` or `P1DT12H`
pub fn iso8601_duration(value: &str) -> Result<(), String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = r"^P([0-9]+Y)?([0-9]+M)?([0-9]+W)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$";
    if value.len() < 2 || value.ends_with('T') || !is_match(&RE, pattern, value) {
        return Err(format!("{:?} is not a valid ISO 8601 duration", value));
    }
    Ok(())
}

/// A name rule that is fully described by one regular expression
pub struct NamePattern {
    pub pattern: &'static str,
    pub rule: &'static str,
}

pub const STORAGE_ACCOUNT_NAME: NamePattern = NamePattern {
    pattern: r"^[a-z0-9]{3,24}$",
    rule: "3 to 24 lowercase letters and numbers",
};

pub const ANALYSIS_SERVICES_SERVER_NAME: NamePattern = NamePattern {
    pattern: r"^[a-z][0-9a-z]{2,62}$",
    rule: "3 to 63 lowercase letters and numbers, starting with a letter",
};

impl NamePattern {
    pub fn validator(&self) -> Result<StringPatternValidator, regex::Error> {
        Ok(StringPatternValidator::new(Regex::new(self.pattern)?, self.rule))
    }
}

pub fn func(description: &str, check: fn(&str) -> Result<(), String>) -> StringFuncValidator {
    StringFuncValidator::new(description, check)
}

/// Runs `check` on every known string element of a list or set
pub struct EachString {
    description: String,
    check: fn(&str) -> Result<(), String>,
}

pub fn each(description: &str, check: fn(&str) -> Result<(), String>) -> EachString {
    EachString {
        description: description.to_string(),
        check,
    }
}

impl Validator for EachString {
    fn description(&self) -> String {
        format!("each element must be {}", self.description)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(items) = request.config_value.value.as_list() else {
            return ValidatorResponse::default();
        };
        let diagnostics = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let value = item.as_str()?;
                (self.check)(value).err().map(|detail| {
                    Diagnostic::error(format!("Invalid value for {}", request.path), detail)
                        .with_attribute(request.path.clone().index(i as i64))
                })
            })
            .collect();
        ValidatorResponse { diagnostics }
    }
}

/// Accepts strings that parse as the typed ID `T`
pub struct ResourceIdValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceIdValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ResourceIdValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ResourceIdentity> Validator for ResourceIdValidator<T> {
    fn description(&self) -> String {
        format!("a {} ID", T::DISPLAY_NAME)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(raw) = request.config_value.value.as_str() else {
            return ValidatorResponse::default();
        };
        match T::parse(raw) {
            Ok(_) => ValidatorResponse::default(),
            Err(e) => ValidatorResponse {
                diagnostics: vec![Diagnostic::error(
                    format!("Invalid {} ID", T::DISPLAY_NAME),
                    e.to_string(),
                )
                .with_attribute(request.path)],
            },
        }
    }
}
