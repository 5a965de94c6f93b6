use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::{json, Value};
use tracing::{debug, error};

use stagegate_core::config::requirements::{RequirementDefinition, Target};
use stagegate_core::errors::SubjectError;
use stagegate_core::traits::{FieldAccess, RequirementCheckResult, Subject};
use stagegate_core::types::{CompareOp, RequirementType};
use stagegate_core::value;

use super::registry::CustomCheckRegistry;

const SALES_ORDER_MODEL: &str = "SalesOrder";
const TASKS_RELATION: &str = "tasks";
const TASK_DONE_STATE: &str = "done";

/// Failures inside a single check. Never escapes [`RequirementChecker::check`].
#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error("requirement has no {0}")]
    MissingParameter(&'static str),
    #[error("expected value '{0}' is not numeric")]
    NonNumericExpected(String),
    #[error("{requirement_type} check panicked: {reason}")]
    Panicked {
        requirement_type: String,
        reason: String,
    },
}

/// Strategy dispatcher: evaluates one requirement against one subject.
///
/// Misconfiguration, subject errors and panics (in custom checks or in the
/// subject's own accessors) degrade to a failing result with a diagnostic
/// message; `check` itself never fails.
#[derive(Debug, Default)]
pub struct RequirementChecker {
    registry: CustomCheckRegistry,
}

impl RequirementChecker {
    pub fn new(registry: CustomCheckRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CustomCheckRegistry {
        &self.registry
    }

    pub fn check(
        &self,
        subject: &dyn Subject,
        requirement: &RequirementDefinition,
    ) -> RequirementCheckResult {
        let dispatched = AssertUnwindSafe(|| self.dispatch(subject, requirement));
        let outcome = panic::catch_unwind(dispatched).unwrap_or_else(|payload| {
            Err(CheckError::Panicked {
                requirement_type: requirement.requirement_type.to_string(),
                reason: panic_reason(payload.as_ref()),
            })
        });
        match outcome {
            Ok(result) => {
                debug!(
                    requirement_id = requirement.id,
                    requirement_type = %requirement.requirement_type,
                    passed = result.passed,
                    "requirement checked"
                );
                result
            }
            Err(e) => {
                error!(
                    requirement_id = requirement.id,
                    subject_id = subject.subject_id(),
                    error = %e,
                    "gate requirement check failed"
                );
                RequirementCheckResult::fail(format!("Error checking requirement: {e}"))
                    .with_detail("exception", e.to_string())
            }
        }
    }

    fn dispatch(
        &self,
        subject: &dyn Subject,
        req: &RequirementDefinition,
    ) -> Result<RequirementCheckResult, CheckError> {
        match &req.requirement_type {
            RequirementType::FieldNotNull => field_not_null(subject, req),
            RequirementType::FieldEquals => field_equals(subject, req),
            RequirementType::FieldGreaterThan => field_greater_than(subject, req),
            RequirementType::RelationExists => relation_exists(subject, req),
            RequirementType::RelationCount => relation_count(subject, req),
            RequirementType::AllChildrenPass => all_children_pass(subject, req),
            RequirementType::DocumentUploaded => document_uploaded(subject, req),
            RequirementType::PaymentReceived => payment_received(subject, req),
            RequirementType::TaskCompleted => task_completed(subject, req),
            RequirementType::CustomCheck => self.custom_check(subject, req),
            RequirementType::Other(name) => Ok(RequirementCheckResult::fail(format!(
                "Unknown requirement type: {name}"
            ))
            .with_detail("requirement_type", name.as_str())),
        }
    }

    fn custom_check(
        &self,
        subject: &dyn Subject,
        req: &RequirementDefinition,
    ) -> Result<RequirementCheckResult, CheckError> {
        let name = req.custom_check.as_deref().unwrap_or("").trim();
        let Some(check) = self.registry.get(name) else {
            return Ok(
                RequirementCheckResult::fail(format!("Custom check '{name}' not found"))
                    .with_detail("custom_check", name),
            );
        };

        Ok(check.check(subject, req))
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn param<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, CheckError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(CheckError::MissingParameter(name))
}

fn expected_text(req: &RequirementDefinition) -> Result<String, CheckError> {
    req.expected_text()
        .ok_or(CheckError::MissingParameter("expected_value"))
}

/// Read `target_field` from the subject or its one-hop related model.
///
/// `None` means the related model could not be resolved.
fn read_target_field(
    subject: &dyn Subject,
    req: &RequirementDefinition,
    field: &str,
) -> Result<Option<Value>, SubjectError> {
    match req.target(subject.model_name()) {
        Target::Subject => subject.field(field).map(Some),
        Target::Related(model) => match subject.related(model)? {
            Some(target) => target.field(field).map(Some),
            None => Ok(None),
        },
    }
}

fn target_not_found(req: &RequirementDefinition) -> RequirementCheckResult {
    RequirementCheckResult::fail("Target model not found")
        .with_detail("target_model", req.target_model.clone())
}

fn missing_relation(subject: &dyn Subject, relation: &str) -> RequirementCheckResult {
    RequirementCheckResult::fail(format!(
        "Relation '{relation}' does not exist on {} model",
        subject.model_name()
    ))
    .with_detail("relation", relation)
    .with_detail("exists", false)
}

fn field_not_null(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let field = param(&req.target_field, "target_field")?;
    let Some(current) = read_target_field(subject, req, field)? else {
        return Ok(target_not_found(req));
    };

    let passed = !value::is_blank(&current);
    let message = if passed {
        format!("Field '{field}' has value")
    } else {
        format!("Field '{field}' is empty")
    };
    Ok(RequirementCheckResult::new(passed, message)
        .with_detail("field", field)
        .with_detail("value", current))
}

fn field_equals(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let field = param(&req.target_field, "target_field")?;
    let expected = expected_text(req)?;
    let Some(actual) = read_target_field(subject, req, field)? else {
        return Ok(target_not_found(req));
    };

    let passed = value::loosely_equals(&actual, &expected);
    let message = if passed {
        format!("Field '{field}' equals expected value")
    } else {
        format!("Field '{field}' does not equal expected value")
    };
    Ok(RequirementCheckResult::new(passed, message)
        .with_detail("field", field)
        .with_detail("expected", expected)
        .with_detail("actual", actual))
}

fn field_greater_than(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let field = param(&req.target_field, "target_field")?;
    let expected = req.expected_number().ok_or_else(|| {
        CheckError::NonNumericExpected(req.expected_text().unwrap_or_default())
    })?;
    let Some(raw) = read_target_field(subject, req, field)? else {
        return Ok(target_not_found(req));
    };
    let actual = value::as_number(&raw).ok_or_else(|| SubjectError::TypeMismatch {
        field: field.to_string(),
        expected: "numeric".to_string(),
    })?;

    let passed = actual > expected;
    let message = if passed {
        format!("Field '{field}' is greater than {expected}")
    } else {
        format!("Field '{field}' ({actual}) is not greater than {expected}")
    };
    Ok(RequirementCheckResult::new(passed, message)
        .with_detail("field", field)
        .with_detail("expected", expected)
        .with_detail("actual", actual))
}

fn relation_exists(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let relation = param(&req.target_relation, "target_relation")?;
    if !subject.has_relation(relation) {
        return Ok(missing_relation(subject, relation));
    }

    let exists = subject.relation_count(relation)? > 0;
    let message = if exists {
        format!("Relation '{relation}' has records")
    } else {
        format!("Relation '{relation}' is empty")
    };
    Ok(RequirementCheckResult::new(exists, message)
        .with_detail("relation", relation)
        .with_detail("exists", exists))
}

fn relation_count(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let relation = param(&req.target_relation, "target_relation")?;
    let expected = req.expected_number().ok_or_else(|| {
        CheckError::NonNumericExpected(req.expected_text().unwrap_or_default())
    })?;
    // Whole counts only; a fractional threshold truncates.
    let expected = expected.trunc() as i64;
    let operator = req.operator.as_deref().unwrap_or("").trim();

    if !subject.has_relation(relation) {
        return Ok(missing_relation(subject, relation));
    }
    let count = subject.relation_count(relation)?;

    let details = |result: RequirementCheckResult| {
        result
            .with_detail("relation", relation)
            .with_detail("count", count)
            .with_detail("expected", expected)
            .with_detail("operator", operator)
    };

    let Ok(op) = operator.parse::<CompareOp>() else {
        return Ok(details(RequirementCheckResult::fail(format!(
            "Relation '{relation}' count ({count}) cannot be compared: unknown operator '{operator}'"
        ))));
    };

    let passed = op.compare(count as i64, expected);
    let message = if passed {
        format!("Relation '{relation}' count ({count}) {op} {expected}")
    } else {
        format!("Relation '{relation}' count ({count}) does not satisfy {op} {expected}")
    };
    Ok(details(RequirementCheckResult::new(passed, message)))
}

fn all_children_pass(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let relation = param(&req.target_relation, "target_relation")?;
    let field = param(&req.target_field, "target_field")?;
    let expected = expected_text(req)?;

    if !subject.has_relation(relation) {
        return Ok(missing_relation(subject, relation));
    }

    let children = subject.children(relation)?;
    let total = children.len();
    if total == 0 {
        return Ok(
            RequirementCheckResult::fail(format!("No {relation} found to check"))
                .with_detail("relation", relation)
                .with_detail("field", field)
                .with_detail("passing", 0)
                .with_detail("total", 0),
        );
    }

    let mut passing = 0usize;
    for child in &children {
        if value::loosely_equals(&child.field(field)?, &expected) {
            passing += 1;
        }
    }
    let passed = passing == total;
    let message = if passed {
        format!("All {total} {relation} have {field} = {expected}")
    } else {
        format!("{passing}/{total} {relation} have {field} = {expected}")
    };
    Ok(RequirementCheckResult::new(passed, message)
        .with_detail("relation", relation)
        .with_detail("field", field)
        .with_detail("expected", expected)
        .with_detail("passing", passing)
        .with_detail("total", total))
}

fn document_uploaded(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let document_type = expected_text(req)?;
    let found = subject.has_document(&document_type);
    let message = if found {
        format!("Document type '{document_type}' is uploaded")
    } else {
        format!("Document type '{document_type}' not found")
    };
    Ok(RequirementCheckResult::new(found, message)
        .with_detail("document_type", document_type)
        .with_detail("found", found))
}

fn payment_received(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let payment_type = expected_text(req)?;
    let Some(order) = subject.related(SALES_ORDER_MODEL)? else {
        return Ok(RequirementCheckResult::fail("No sales order found")
            .with_detail("payment_type", payment_type));
    };

    let paid_field = match payment_type.as_str() {
        "deposit" => Some("deposit_paid_at"),
        "final" => Some("final_paid_at"),
        _ => None,
    };
    let received = match paid_field {
        Some(f) => !value::is_blank(&order.field(f)?),
        None => false,
    };
    let message = if received {
        format!("Payment '{payment_type}' received")
    } else {
        format!("Payment '{payment_type}' not received")
    };
    Ok(RequirementCheckResult::new(received, message)
        .with_detail("payment_type", payment_type)
        .with_detail("received", received))
}

fn task_completed(
    subject: &dyn Subject,
    req: &RequirementDefinition,
) -> Result<RequirementCheckResult, CheckError> {
    let task_type = expected_text(req)?;
    let relation = req
        .target_relation
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(TASKS_RELATION);

    let mut completed = false;
    if subject.has_relation(relation) {
        for task in subject.children(relation)? {
            if value::loosely_equals(&task.field("task_type")?, &task_type)
                && value::loosely_equals(&task.field("state")?, TASK_DONE_STATE)
            {
                completed = true;
                break;
            }
        }
    }
    let message = if completed {
        format!("Task type '{task_type}' is completed")
    } else {
        format!("Task type '{task_type}' not completed")
    };
    Ok(RequirementCheckResult::new(completed, message)
        .with_detail("task_type", task_type)
        .with_detail("completed", completed)
        .with_detail("relation", json!(relation)))
}
