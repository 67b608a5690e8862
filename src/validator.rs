//! One-call validation facade.

use serde_json::Value;

use crate::compiler::{compile, CompiledSchema};
use crate::error::ValidateError;
use crate::types::EvaluationOptions;

/// Compile `schema` and validate `instance` against it.
///
/// # Errors
///
/// Returns `ValidateError::Compile` if the schema doesn't compile,
/// `ValidateError::Evaluation` if a guard limit was hit, or
/// `ValidateError::Invalid` with every located failure otherwise.
pub fn validate(
    schema: &Value,
    instance: &Value,
    options: &EvaluationOptions,
) -> Result<(), ValidateError> {
    let compiled = compile(schema, options)?;
    validate_compiled(&compiled, instance)
}

/// Validate against an already-compiled schema.
///
/// Use this when validating many instances against one schema. Messages
/// come from the templates in the schema's options.
pub fn validate_compiled(compiled: &CompiledSchema, instance: &Value) -> Result<(), ValidateError> {
    let results = compiled.evaluate_constraint(compiled.root(), instance)?;
    if results.is_valid() {
        return Ok(());
    }
    Err(ValidateError::Invalid {
        errors: results.collect_errors(compiled.options().messages()),
    })
}
