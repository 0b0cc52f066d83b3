//! Azure region names
//!
//! ARM accepts `West Europe`, `west europe` and `westeurope` alike and
//! answers with the compact form, so comparisons go through [`normalize`].

use tfplug::plan_modifier::RequiresReplaceIfChanged;
use tfplug::schema::{Attribute, PlanModifier, PlanModifierRequest, PlanModifierResponse};
use tfplug::{AttributeBuilder, AttributeType};

pub fn normalize(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

pub fn schema() -> Attribute {
    AttributeBuilder::new("location", AttributeType::String)
        .required()
        .description("The Azure Region where the resource should exist. Changing this forces a new resource to be created.")
        .plan_modifier(LocationModifier)
        .build()
}

/// Computed location for resources that inherit theirs from a parent
pub fn schema_computed() -> Attribute {
    AttributeBuilder::new("location", AttributeType::String)
        .computed()
        .build()
}

/// Prefer the spelling already in state when `new` is the same region.
/// Terraform requires applied values to match what was configured.
pub fn keep_prior_spelling(new: &str, prior: Option<&str>) -> String {
    match prior {
        Some(prior) if equivalent(prior, new) => prior.to_string(),
        _ => new.to_string(),
    }
}

/// Replaces the resource only when the region really changes. A spelling
/// change plans as an in-place update that ARM treats as a no-op.
pub struct LocationModifier;

impl PlanModifier for LocationModifier {
    fn description(&self) -> String {
        "requires replacement when the normalized location changes".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let regions = match (
            request.state_value.value.as_str(),
            request.plan_value.value.as_str(),
        ) {
            (Some(state), Some(plan)) => Some(equivalent(state, plan)),
            _ => None,
        };

        match regions {
            None => RequiresReplaceIfChanged.modify(request),
            Some(_) if request.resource_is_new => PlanModifierResponse::unchanged(&request),
            Some(same_region) => PlanModifierResponse {
                plan_value: request.plan_value,
                requires_replace: !same_region,
                diagnostics: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfplug::{AttributePath, DynamicValue};

    fn request(state: &str, plan: &str) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: DynamicValue::new(plan.into()),
            state_value: DynamicValue::new(state.into()),
            plan_value: DynamicValue::new(plan.into()),
            path: AttributePath::new("location"),
            resource_is_new: false,
        }
    }

    #[test]
    fn normalizes_display_names() {
        assert_eq!(normalize("West Europe"), "westeurope");
        assert!(equivalent("East US 2", "eastus2"));
        assert!(!equivalent("eastus", "eastus2"));
    }

    #[test]
    fn spelling_change_is_not_a_replacement() {
        let response = LocationModifier.modify(request("westeurope", "West Europe"));
        assert!(!response.requires_replace);
        assert_eq!(response.plan_value.value.as_str(), Some("West Europe"));
    }

    #[test]
    fn region_change_forces_replacement() {
        let response = LocationModifier.modify(request("westeurope", "northeurope"));
        assert!(response.requires_replace);
    }

    #[test]
    fn prior_spelling_is_kept_when_equivalent() {
        assert_eq!(keep_prior_spelling("westeurope", Some("West Europe")), "West Europe");
        assert_eq!(keep_prior_spelling("northeurope", Some("West Europe")), "northeurope");
        assert_eq!(keep_prior_spelling("westeurope", None), "westeurope");
    }
}
