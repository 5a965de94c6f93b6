//! Custom checks available to `custom_check` requirements from the CLI.

use serde_json::Value;

use stagegate_core::config::requirements::RequirementDefinition;
use stagegate_core::errors::{ConfigError, SubjectError};
use stagegate_core::traits::{RequirementCheckResult, Subject};
use stagegate_core::value;
use stagegate_engine::requirements::registry::CustomCheckRegistry;

pub fn registry() -> Result<CustomCheckRegistry, ConfigError> {
    let mut registry = CustomCheckRegistry::new();
    registry.register("business_id_assigned", business_id_assigned)?;
    registry.register("partner_contact_complete", partner_contact_complete)?;
    Ok(registry)
}

fn business_id_assigned(
    subject: &dyn Subject,
    _: &RequirementDefinition,
) -> RequirementCheckResult {
    match subject.business_id().filter(|id| !id.trim().is_empty()) {
        Some(id) => RequirementCheckResult::pass(format!("Business id '{id}' assigned"))
            .with_detail("business_id", id),
        None => RequirementCheckResult::fail("No business id assigned")
            .with_detail("business_id", Value::Null),
    }
}

/// Partner has an email or a phone number.
fn partner_contact_complete(
    subject: &dyn Subject,
    _: &RequirementDefinition,
) -> RequirementCheckResult {
    partner_contact(subject).unwrap_or_else(|e| {
        RequirementCheckResult::fail(format!("Partner unreadable: {e}"))
            .with_detail("exception", e.to_string())
    })
}

fn partner_contact(subject: &dyn Subject) -> Result<RequirementCheckResult, SubjectError> {
    let Some(partner) = subject.related("Partner")? else {
        return Ok(RequirementCheckResult::fail("No partner linked"));
    };
    let email = partner.field("email")?;
    let phone = partner.field("phone")?;
    let complete = !value::is_blank(&email) || !value::is_blank(&phone);
    let message = if complete {
        "Partner contact details present"
    } else {
        "Partner has no email or phone"
    };
    Ok(RequirementCheckResult::new(complete, message)
        .with_detail("email", email)
        .with_detail("phone", phone))
}
