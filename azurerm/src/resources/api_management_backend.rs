//! `azurerm_api_management_backend`

use super::required;
use crate::api::api_management::{
    self as api, Backend, BackendAuthorization, BackendCredentials, BackendPool, BackendPoolItem, BackendProperties,
    BackendProxy, BackendTls, BackendTypeProperties, CircuitBreaker, CircuitBreakerRule, FailureCondition,
    ServiceFabricCluster, StatusCodeRange, X509CertificateName,
};
use crate::arm::{ArmResource, ResourceError};
use crate::helpers::expand::{comma_separated_map, join_comma_separated_map, optional_list};
use crate::helpers::timeouts::Operation;
use crate::helpers::values::{self, Attributes};
use crate::helpers::schema;
use crate::resource_id::ApiManagementBackendId;
use crate::validate::{self, ResourceIdValidator};
use std::collections::HashMap;
use tfplug::schema::NestedBlock;
use tfplug::validator::{IntegerValidator, ListLengthValidator, NumberRangeValidator, OneOfValidator, StringLengthValidator};
use tfplug::{
    AttributeBuilder, AttributePath, AttributeType, Diagnostic, Dynamic, NestedBlockBuilder, NestingMode, Schema,
    SchemaBuilder,
};

/// Arguments that only apply to single backends
const POOL_CONFLICTS: &[&str] = &[
    "circuit_breaker_rule",
    "credentials",
    "protocol",
    "proxy",
    "resource_id",
    "service_fabric_cluster",
    "tls",
    "url",
];

const ERROR_REASONS: &[&str] = &[
    "OperationNotFound",
    "SubscriptionKeyNotFound",
    "SubscriptionKeyInvalid",
    "ClientConnectionFailure",
    "BackendConnectionFailure",
    "ExpressionValueEvaluationFailure",
];

#[derive(Default)]
pub struct ApiManagementBackendResource;

impl ApiManagementBackendResource {
    pub fn new() -> Self {
        Self
    }
}

fn optional(name: &str, type_: AttributeType) -> AttributeBuilder {
    AttributeBuilder::new(name, type_).optional()
}

fn single_block(name: &str) -> NestedBlockBuilder {
    NestedBlockBuilder::new(name, NestingMode::List).max_items(1)
}

fn credentials_block() -> NestedBlock {
    single_block("credentials")
        .attribute(optional("certificate", AttributeType::list_of(AttributeType::String)).build())
        .attribute(optional("header", AttributeType::map_of(AttributeType::String)).build())
        .attribute(optional("query", AttributeType::map_of(AttributeType::String)).build())
        .block(
            single_block("authorization")
                .attribute(optional("parameter", AttributeType::String).build())
                .attribute(optional("scheme", AttributeType::String).build())
                .build(),
        )
        .build()
}

fn proxy_block() -> NestedBlock {
    single_block("proxy")
        .attribute(AttributeBuilder::new("url", AttributeType::String).required().build())
        .attribute(AttributeBuilder::new("username", AttributeType::String).required().build())
        .attribute(optional("password", AttributeType::String).sensitive().build())
        .build()
}

fn tls_block() -> NestedBlock {
    single_block("tls")
        .attribute(optional("validate_certificate_chain", AttributeType::Bool).build())
        .attribute(optional("validate_certificate_name", AttributeType::Bool).build())
        .build()
}

fn service_fabric_cluster_block() -> NestedBlock {
    single_block("service_fabric_cluster")
        .attribute(optional("client_certificate_id", AttributeType::String).build())
        .attribute(optional("client_certificate_thumbprint", AttributeType::String).build())
        .attribute(
            AttributeBuilder::new("management_endpoints", AttributeType::set_of(AttributeType::String))
                .required()
                .validator(ListLengthValidator { min: Some(1), max: None })
                .build(),
        )
        .attribute(
            AttributeBuilder::new("max_partition_resolution_retries", AttributeType::Number)
                .required()
                .validator(NumberRangeValidator { min: Some(0.0), max: None })
                .validator(IntegerValidator)
                .build(),
        )
        .attribute(optional("server_certificate_thumbprints", AttributeType::set_of(AttributeType::String)).build())
        .block(
            NestedBlockBuilder::new("server_x509_name", NestingMode::Set)
                .attribute(AttributeBuilder::new("name", AttributeType::String).required().build())
                .attribute(
                    AttributeBuilder::new("issuer_certificate_thumbprint", AttributeType::String)
                        .required()
                        .build(),
                )
                .build(),
        )
        .build()
}

fn whole_number(name: &str, min: f64, max: Option<f64>) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::Number)
        .validator(NumberRangeValidator { min: Some(min), max })
        .validator(IntegerValidator)
}

fn error_reason(value: &str) -> Result<(), String> {
    if ERROR_REASONS.contains(&value) {
        Ok(())
    } else {
        Err(format!("{:?} must be one of {}", value, ERROR_REASONS.join(", ")))
    }
}

/// ARM nests rules under `circuitBreaker.rules`; the schema holds the one rule directly.
fn circuit_breaker_rule_block() -> NestedBlock {
    let status_code_range = NestedBlockBuilder::new("status_code_range", NestingMode::List)
        .min_items(1)
        .attribute(whole_number("min", 200.0, Some(599.0)).required().build())
        .attribute(whole_number("max", 200.0, Some(599.0)).required().build())
        .build();
    let failure_condition = single_block("failure_condition")
        .min_items(1)
        .attribute(
            whole_number("count", 1.0, None)
                .optional()
                .description("Exactly one of `count` or `percentage` must be set.")
                .build(),
        )
        .attribute(
            whole_number("percentage", 1.0, Some(100.0))
                .optional()
                .description("Exactly one of `count` or `percentage` must be set.")
                .build(),
        )
        .attribute(
            optional("error_reasons", AttributeType::list_of(AttributeType::String))
                .validator(validate::each("a known error reason", error_reason))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("interval", AttributeType::String)
                .required()
                .validator(validate::func("an ISO 8601 duration", validate::iso8601_duration))
                .build(),
        )
        .block(status_code_range)
        .build();

    single_block("circuit_breaker_rule")
        .description("Conflicts with `pool`.")
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .required()
                .validator(StringLengthValidator::between(1, 2000))
                .build(),
        )
        .attribute(optional("accept_retry_after", AttributeType::Bool).build())
        .attribute(
            AttributeBuilder::new("trip_duration", AttributeType::String)
                .required()
                .validator(validate::func("an ISO 8601 duration", validate::iso8601_duration))
                .build(),
        )
        .block(failure_condition)
        .build()
}

fn pool_block() -> NestedBlock {
    single_block("pool")
        .description("Makes this a load-balanced pool of other backends. Conflicts with every single-backend argument.")
        .block(
            NestedBlockBuilder::new("service", NestingMode::List)
                .min_items(1)
                .max_items(30)
                .attribute(
                    AttributeBuilder::new("id", AttributeType::String)
                        .required()
                        .validator(ResourceIdValidator::<ApiManagementBackendId>::new())
                        .build(),
                )
                .attribute(whole_number("priority", 1.0, None).optional().build())
                .attribute(whole_number("weight", 1.0, None).optional().build())
                .build(),
        )
        .build()
}

fn expand_circuit_breaker(block: &Dynamic) -> CircuitBreaker {
    let failure_condition = values::single_block(block, "failure_condition").map(|condition| FailureCondition {
        count: values::int(condition, "count").filter(|n| *n != 0),
        percentage: values::int(condition, "percentage").filter(|n| *n != 0),
        error_reasons: optional_list(values::string_list(condition, "error_reasons")),
        interval: values::non_empty_string(condition, "interval"),
        status_code_ranges: optional_list(
            values::list(condition, "status_code_range")
                .iter()
                .map(|range| StatusCodeRange {
                    min: values::int(range, "min"),
                    max: values::int(range, "max"),
                })
                .collect(),
        ),
    });
    CircuitBreaker {
        rules: vec![CircuitBreakerRule {
            name: values::string(block, "name"),
            accept_retry_after: Some(values::bool(block, "accept_retry_after").unwrap_or(false)),
            trip_duration: values::string(block, "trip_duration"),
            failure_condition,
        }],
    }
}

fn expand_pool(block: &Dynamic) -> BackendPool {
    BackendPool {
        services: values::list(block, "service")
            .iter()
            .map(|service| BackendPoolItem {
                id: values::string(service, "id").unwrap_or_default(),
                priority: values::int(service, "priority"),
                weight: values::int(service, "weight"),
            })
            .collect(),
    }
}

/// Null and empty blocks count as unset; unknown values will be set at apply.
fn is_set(config: &Dynamic, name: &str) -> bool {
    match config.attr(name) {
        None | Some(Dynamic::Null) => false,
        Some(Dynamic::List(items)) => !items.is_empty(),
        Some(Dynamic::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn expand_credentials(block: &Dynamic) -> BackendCredentials {
    let map = |name: &str| {
        let m = values::string_map(block, name);
        (!m.is_empty()).then(|| comma_separated_map(&m))
    };
    BackendCredentials {
        authorization: values::single_block(block, "authorization").map(|auth| BackendAuthorization {
            parameter: values::string(auth, "parameter").unwrap_or_default(),
            scheme: values::string(auth, "scheme").unwrap_or_default(),
        }),
        certificate: optional_list(values::string_list(block, "certificate")),
        header: map("header"),
        query: map("query"),
    }
}

fn expand_service_fabric_cluster(block: &Dynamic) -> Result<ServiceFabricCluster, ResourceError> {
    let client_certificate_id = values::non_empty_string(block, "client_certificate_id");
    let client_certificate_thumbprint = values::non_empty_string(block, "client_certificate_thumbprint");
    if client_certificate_id.is_none() && client_certificate_thumbprint.is_none() {
        return Err(ResourceError::invalid(
            "at least one of `client_certificate_thumbprint` and `client_certificate_id` must be set",
        ));
    }

    let server_certificate_thumbprints = optional_list(values::string_list(block, "server_certificate_thumbprints"));
    let server_x509_names = optional_list(
        values::list(block, "server_x509_name")
            .iter()
            .map(|n| X509CertificateName {
                name: values::string(n, "name"),
                issuer_certificate_thumbprint: values::string(n, "issuer_certificate_thumbprint"),
            })
            .collect(),
    );
    if server_certificate_thumbprints.is_none() && server_x509_names.is_none() {
        return Err(ResourceError::invalid(
            "one of `server_certificate_thumbprints` or `server_x509_name` must be set",
        ));
    }

    Ok(ServiceFabricCluster {
        client_certificate_id,
        client_certificate_thumbprint,
        management_endpoints: values::string_list(block, "management_endpoints"),
        max_partition_resolution_retries: values::int(block, "max_partition_resolution_retries"),
        server_certificate_thumbprints,
        server_x509_names,
    })
}

fn flatten_credentials(credentials: Option<BackendCredentials>) -> Dynamic {
    values::block_list(credentials.map(|c| {
        let authorization = c.authorization.map(|a| {
            HashMap::from([
                ("parameter".to_string(), Dynamic::String(a.parameter)),
                ("scheme".to_string(), Dynamic::String(a.scheme)),
            ])
        });
        HashMap::from([
            ("authorization".to_string(), values::block_list(authorization)),
            ("certificate".to_string(), values::strings_to_dynamic(c.certificate.unwrap_or_default())),
            (
                "header".to_string(),
                values::string_map_to_dynamic(&join_comma_separated_map(c.header.as_ref())),
            ),
            (
                "query".to_string(),
                values::string_map_to_dynamic(&join_comma_separated_map(c.query.as_ref())),
            ),
        ])
    }))
}

/// ARM does not return the proxy password, so it is carried from `prior`
fn flatten_proxy(proxy: Option<BackendProxy>, prior: &Dynamic) -> Dynamic {
    let prior_password = values::single_block(prior, "proxy").and_then(|p| values::string(p, "password"));
    values::block_list(proxy.map(|p| {
        HashMap::from([
            ("url".to_string(), Dynamic::String(p.url)),
            ("username".to_string(), values::opt_string(p.username.as_ref())),
            (
                "password".to_string(),
                values::opt_string(p.password.or(prior_password).as_ref()),
            ),
        ])
    }))
}

fn flatten_tls(tls: Option<BackendTls>) -> Dynamic {
    values::block_list(tls.map(|t| {
        HashMap::from([
            ("validate_certificate_chain".to_string(), values::opt_bool(t.validate_certificate_chain)),
            ("validate_certificate_name".to_string(), values::opt_bool(t.validate_certificate_name)),
        ])
    }))
}

/// Only the first rule is kept; the schema allows one.
fn flatten_circuit_breaker(circuit_breaker: Option<CircuitBreaker>) -> Dynamic {
    let rule = circuit_breaker.and_then(|c| c.rules.into_iter().next());
    values::block_list(rule.map(|rule| {
        let condition = rule.failure_condition.map(|c| {
            let ranges = c
                .status_code_ranges
                .unwrap_or_default()
                .into_iter()
                .map(|range| {
                    Dynamic::Map(HashMap::from([
                        ("min".to_string(), values::opt_int(range.min)),
                        ("max".to_string(), values::opt_int(range.max)),
                    ]))
                })
                .collect();
            HashMap::from([
                ("count".to_string(), values::opt_int(c.count.filter(|n| *n != 0))),
                ("percentage".to_string(), values::opt_int(c.percentage.filter(|n| *n != 0))),
                (
                    "error_reasons".to_string(),
                    values::strings_to_dynamic(c.error_reasons.unwrap_or_default()),
                ),
                ("interval".to_string(), values::opt_string(c.interval.as_ref())),
                ("status_code_range".to_string(), Dynamic::List(ranges)),
            ])
        });
        HashMap::from([
            ("name".to_string(), values::opt_string(rule.name.as_ref())),
            ("accept_retry_after".to_string(), values::opt_bool(rule.accept_retry_after)),
            ("trip_duration".to_string(), values::opt_string(rule.trip_duration.as_ref())),
            ("failure_condition".to_string(), values::block_list(condition)),
        ])
    }))
}

fn flatten_pool(pool: Option<BackendPool>) -> Dynamic {
    values::block_list(pool.map(|pool| {
        let services = pool
            .services
            .into_iter()
            .map(|service| {
                Dynamic::Map(HashMap::from([
                    ("id".to_string(), Dynamic::String(service.id)),
                    ("priority".to_string(), values::opt_int(service.priority)),
                    ("weight".to_string(), values::opt_int(service.weight)),
                ]))
            })
            .collect();
        HashMap::from([("service".to_string(), Dynamic::List(services))])
    }))
}

fn flatten_service_fabric_cluster(cluster: Option<ServiceFabricCluster>) -> Dynamic {
    values::block_list(cluster.map(|c| {
        let names = c
            .server_x509_names
            .unwrap_or_default()
            .into_iter()
            .map(|n| {
                Dynamic::Map(HashMap::from([
                    ("name".to_string(), values::opt_string(n.name.as_ref())),
                    (
                        "issuer_certificate_thumbprint".to_string(),
                        values::opt_string(n.issuer_certificate_thumbprint.as_ref()),
                    ),
                ]))
            })
            .collect();
        HashMap::from([
            ("client_certificate_id".to_string(), values::opt_string(c.client_certificate_id.as_ref())),
            (
                "client_certificate_thumbprint".to_string(),
                values::opt_string(c.client_certificate_thumbprint.as_ref()),
            ),
            ("management_endpoints".to_string(), values::strings_to_dynamic(c.management_endpoints)),
            (
                "max_partition_resolution_retries".to_string(),
                values::opt_int(c.max_partition_resolution_retries),
            ),
            (
                "server_certificate_thumbprints".to_string(),
                values::strings_to_dynamic(c.server_certificate_thumbprints.unwrap_or_default()),
            ),
            ("server_x509_name".to_string(), Dynamic::List(names)),
        ])
    }))
}

impl ArmResource for ApiManagementBackendResource {
    type Id = ApiManagementBackendId;
    type Model = Backend;

    const TYPE_NAME: &'static str = "azurerm_api_management_backend";
    const API_VERSION: &'static str = api::API_VERSION;

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Manages a backend within an API Management Service.")
            .attribute(schema::name(
                "The name of the API Management backend. Changing this forces a new resource to be created.",
                validate::api_management_backend_name,
            ))
            .attribute(schema::resource_group_name())
            .attribute(schema::parent_name(
                "api_management_name",
                "The Name of the API Management Service where this backend should be created. Changing this forces a new resource to be created.",
                validate::api_management_service_name,
            ))
            .attribute(
                AttributeBuilder::new("protocol", AttributeType::String)
                    .optional()
                    .description("The protocol used by the backend host. Possible values are `http` or `soap`. Conflicts with `pool`.")
                    .validator(OneOfValidator::new(&["http", "soap"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("url", AttributeType::String)
                    .optional()
                    .description("The URL of the backend host. Conflicts with `pool`.")
                    .validator(StringLengthValidator::between(1, 2000))
                    .build(),
            )
            .attribute(optional("description", AttributeType::String).validator(StringLengthValidator::between(1, 2000)).build())
            .attribute(optional("title", AttributeType::String).validator(StringLengthValidator::between(1, 300)).build())
            .attribute(optional("resource_id", AttributeType::String).validator(StringLengthValidator::between(1, 2000)).build())
            .block(credentials_block())
            .block(proxy_block())
            .block(service_fabric_cluster_block())
            .block(tls_block())
            .block(circuit_breaker_rule_block())
            .block(pool_block())
            .build()
    }

    fn id_from_config(&self, subscription_id: &str, config: &Dynamic) -> Result<ApiManagementBackendId, ResourceError> {
        Ok(ApiManagementBackendId::new(
            subscription_id,
            required(config, "resource_group_name")?,
            required(config, "api_management_name")?,
            required(config, "name")?,
        ))
    }

    fn validate(&self, config: &Dynamic) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if is_set(config, "pool") {
            diagnostics.extend(POOL_CONFLICTS.iter().filter(|name| is_set(config, name)).map(|name| {
                Diagnostic::error(
                    "Conflicting configuration arguments",
                    format!("`{}` cannot be specified when `pool` is specified", name),
                )
                .with_attribute(AttributePath::new(name))
            }));
        }

        let condition = values::single_block(config, "circuit_breaker_rule")
            .and_then(|rule| values::single_block(rule, "failure_condition"));
        if let Some(condition) = condition {
            let count = condition.attr("count").unwrap_or(&Dynamic::Null);
            let percentage = condition.attr("percentage").unwrap_or(&Dynamic::Null);
            if !count.is_unknown() && !percentage.is_unknown() && count.is_null() == percentage.is_null() {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid combination of arguments",
                        "exactly one of `count` or `percentage` must be specified",
                    )
                    .with_attribute(
                        AttributePath::new("circuit_breaker_rule")
                            .index(0)
                            .attribute("failure_condition")
                            .index(0),
                    ),
                );
            }
        }
        diagnostics
    }

    fn expand(&self, _id: &ApiManagementBackendId, config: &Dynamic, _op: Operation) -> Result<Backend, ResourceError> {
        // Pool backends accept none of the single-backend arguments.
        if let Some(pool) = values::single_block(config, "pool") {
            return Ok(Backend {
                properties: BackendProperties {
                    backend_type: Some(api::BACKEND_TYPE_POOL.to_string()),
                    description: values::non_empty_string(config, "description"),
                    title: values::non_empty_string(config, "title"),
                    pool: Some(expand_pool(pool)),
                    ..Default::default()
                },
                ..Default::default()
            });
        }

        let service_fabric_cluster = values::single_block(config, "service_fabric_cluster")
            .map(expand_service_fabric_cluster)
            .transpose()?;

        Ok(Backend {
            properties: BackendProperties {
                backend_type: Some(api::BACKEND_TYPE_SINGLE.to_string()),
                protocol: values::non_empty_string(config, "protocol"),
                url: values::non_empty_string(config, "url"),
                description: values::non_empty_string(config, "description"),
                title: values::non_empty_string(config, "title"),
                resource_id: values::non_empty_string(config, "resource_id"),
                credentials: values::single_block(config, "credentials").map(expand_credentials),
                proxy: values::single_block(config, "proxy").map(|p| BackendProxy {
                    url: values::string(p, "url").unwrap_or_default(),
                    username: values::non_empty_string(p, "username"),
                    password: values::non_empty_string(p, "password"),
                }),
                tls: values::single_block(config, "tls").map(|t| BackendTls {
                    validate_certificate_chain: values::bool(t, "validate_certificate_chain"),
                    validate_certificate_name: values::bool(t, "validate_certificate_name"),
                }),
                circuit_breaker: values::single_block(config, "circuit_breaker_rule").map(expand_circuit_breaker),
                pool: None,
                properties: service_fabric_cluster.map(|cluster| BackendTypeProperties {
                    service_fabric_cluster: Some(cluster),
                }),
            },
            ..Default::default()
        })
    }

    fn flatten(&self, id: &ApiManagementBackendId, model: Backend, prior: &Dynamic) -> Attributes {
        let props = model.properties;
        HashMap::from([
            ("name".to_string(), Dynamic::String(id.backend_id.clone())),
            ("resource_group_name".to_string(), Dynamic::String(id.resource_group_name.clone())),
            ("api_management_name".to_string(), Dynamic::String(id.service_name.clone())),
            ("protocol".to_string(), values::opt_string(props.protocol.as_ref())),
            ("url".to_string(), values::opt_string(props.url.as_ref())),
            ("description".to_string(), values::opt_string(props.description.as_ref())),
            ("title".to_string(), values::opt_string(props.title.as_ref())),
            ("resource_id".to_string(), values::opt_string(props.resource_id.as_ref())),
            ("credentials".to_string(), flatten_credentials(props.credentials)),
            ("proxy".to_string(), flatten_proxy(props.proxy, prior)),
            ("tls".to_string(), flatten_tls(props.tls)),
            ("circuit_breaker_rule".to_string(), flatten_circuit_breaker(props.circuit_breaker)),
            ("pool".to_string(), flatten_pool(props.pool)),
            (
                "service_fabric_cluster".to_string(),
                flatten_service_fabric_cluster(props.properties.and_then(|p| p.service_fabric_cluster)),
            ),
        ])
    }
}
