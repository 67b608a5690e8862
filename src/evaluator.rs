//! Walks a [`CompiledSchema`] against an instance.
//!
//! Per node, keyword constraints run in their compiled order. Each keyword's
//! child schemas are evaluated first at the locations its locator picks,
//! then its evaluation function sees those results plus whatever earlier
//! siblings recorded. The dynamic scope for `$dynamicRef`/`$recursiveRef`
//! lives here, per call, never in the compiled schema.

use serde_json::Value;

use crate::compiler::{CompiledSchema, ConstraintId, SchemaConstraint};
use crate::error::{AbortReason, EvaluationError};
use crate::keyword::{ChildEvaluation, KeywordEvaluation, Outcome, SchemaTarget};
use crate::pointer::JsonPointer;
use crate::results::EvaluationResults;
use crate::types::EvaluationOptions;

impl CompiledSchema {
    /// Evaluate `instance` against the root schema.
    ///
    /// The whole tree is evaluated before the configured output format is
    /// applied.
    pub fn evaluate(&self, instance: &Value) -> Result<EvaluationResults, EvaluationError> {
        self.evaluate_at(instance, JsonPointer::root())
    }

    /// Evaluate `instance` as if it sat at `instance_location` in a larger
    /// document. Reported locations are prefixed accordingly.
    pub fn evaluate_at(
        &self,
        instance: &Value,
        instance_location: JsonPointer,
    ) -> Result<EvaluationResults, EvaluationError> {
        let results = Evaluator::new(self).node(self.root(), instance, instance_location, JsonPointer::root())?;
        Ok(results.into_format(self.options().output_format))
    }

    /// Evaluate `instance` against one compiled node, e.g. a definition.
    /// The result keeps the full tree whatever the output format.
    pub fn evaluate_constraint(
        &self,
        id: ConstraintId,
        instance: &Value,
    ) -> Result<EvaluationResults, EvaluationError> {
        Evaluator::new(self).node(id, instance, JsonPointer::root(), JsonPointer::root())
    }

    /// Whether `instance` is valid. An aborted evaluation counts as invalid.
    pub fn is_valid(&self, instance: &Value) -> bool {
        match Evaluator::new(self).node(self.root(), instance, JsonPointer::root(), JsonPointer::root()) {
            Ok(results) => results.is_valid(),
            Err(err) => {
                tracing::debug!(error = %err, "treating aborted evaluation as invalid");
                false
            }
        }
    }
}

/// State of one evaluation call.
struct Evaluator<'s> {
    schema: &'s CompiledSchema,
    options: &'s EvaluationOptions,
    /// Resource roots entered so far, outermost first.
    scope: Vec<ConstraintId>,
    depth: usize,
    steps: usize,
}

impl<'s> Evaluator<'s> {
    fn new(schema: &'s CompiledSchema) -> Self {
        Self {
            schema,
            options: schema.options(),
            scope: Vec::new(),
            depth: 0,
            steps: 0,
        }
    }

    fn abort(&self, reason: AbortReason, instance_location: JsonPointer) -> EvaluationError {
        tracing::warn!(%reason, location = %instance_location, "evaluation aborted");
        EvaluationError::Aborted {
            reason,
            instance_location,
        }
    }

    fn node(
        &mut self,
        id: ConstraintId,
        instance: &Value,
        instance_location: JsonPointer,
        evaluation_path: JsonPointer,
    ) -> Result<EvaluationResults, EvaluationError> {
        self.steps += 1;
        if let Some(limit) = self.options.max_steps {
            if self.steps > limit {
                return Err(self.abort(AbortReason::MaxSteps(limit), instance_location));
            }
        }
        if self.depth >= self.options.max_depth {
            return Err(self.abort(AbortReason::MaxDepth(self.options.max_depth), instance_location));
        }

        let schema = self.schema;
        let constraint = schema.constraint(id);
        let mut results = EvaluationResults::new(evaluation_path, constraint.schema_location(), instance_location);
        let entered = constraint.is_resource_root();
        if entered {
            self.scope.push(id);
        }
        self.depth += 1;
        let outcome = self.keywords(constraint, instance, &mut results);
        self.depth -= 1;
        if entered {
            self.scope.pop();
        }
        outcome?;

        if !results.valid {
            results.annotations.clear();
        }
        tracing::trace!(
            location = %results.schema_location,
            instance = %results.instance_location,
            valid = results.valid,
            "evaluated schema node"
        );
        Ok(results)
    }

    fn keywords(
        &mut self,
        constraint: &SchemaConstraint,
        instance: &Value,
        results: &mut EvaluationResults,
    ) -> Result<(), EvaluationError> {
        let instance_location = results.instance_location.clone();
        let mut outcomes: Vec<Outcome> = Vec::with_capacity(constraint.keywords().len());
        for keyword in constraint.keywords() {
            let Some(evaluate) = keyword.evaluator() else {
                outcomes.push(Outcome::Skipped);
                continue;
            };
            let siblings = &keyword.resolved_siblings;
            if !siblings.is_empty() && siblings.iter().all(|&i| outcomes[i] == Outcome::Skipped) {
                outcomes.push(Outcome::Skipped);
                continue;
            }

            let mut children = Vec::new();
            for (index, dependency) in keyword.child_dependencies().iter().enumerate() {
                let target = self.select(&dependency.target);
                let path = results.evaluation_path.concat(&dependency.relative_path);
                for located in dependency.locator.locate(instance, results) {
                    let location = match &located.segment {
                        Some(segment) => instance_location.join(segment.clone()),
                        None => instance_location.clone(),
                    };
                    let child = self.node(target, &located.value, location, path.clone())?;
                    children.push(ChildEvaluation {
                        dependency: index,
                        segment: located.segment,
                        results: child,
                    });
                }
            }

            let mut evaluation = KeywordEvaluation::new(
                keyword.keyword(),
                instance,
                &instance_location,
                &mut *results,
                &children,
                self.options,
            );
            evaluate(&mut evaluation);
            outcomes.push(evaluation.outcome());
            results.details.extend(children.into_iter().map(|child| child.results));
        }
        results.valid = !outcomes.contains(&Outcome::Failed);
        Ok(())
    }

    /// The schema a child dependency evaluates right now.
    ///
    /// A dynamic target goes to the outermost resource in scope declaring
    /// the anchor, else to its static fallback.
    fn select(&self, target: &SchemaTarget) -> ConstraintId {
        match target {
            SchemaTarget::Static(id) => *id,
            SchemaTarget::Dynamic { anchor, fallback } => self
                .scope
                .iter()
                .find_map(|&resource| self.schema.constraint(resource).dynamic_anchor(anchor))
                .unwrap_or(*fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::types::OutputFormat;
    use serde_json::json;

    fn evaluate(schema: Value, instance: Value) -> EvaluationResults {
        compile(&schema, &EvaluationOptions::default())
            .unwrap()
            .evaluate(&instance)
            .unwrap()
    }

    #[test]
    fn failures_carry_key_and_substitutions() {
        let results = evaluate(json!({ "minimum": 5 }), json!(3));
        assert!(!results.is_valid());
        let failure = results.error("minimum").unwrap();
        assert_eq!(failure.substitution("received"), Some(&json!(3)));
        assert_eq!(failure.substitution("limit"), Some(&json!(5)));

        let results = evaluate(json!({ "minimum": 5 }), json!(7));
        assert!(results.is_valid());
        assert!(results.errors.is_empty());
    }

    #[test]
    fn invalid_nodes_drop_annotations() {
        let results = evaluate(json!({ "title": "x", "type": "string" }), json!(1));
        assert!(!results.is_valid());
        assert!(results.annotations.is_empty());

        let results = evaluate(json!({ "title": "x", "type": "string" }), json!("a"));
        assert_eq!(results.annotation("title"), Some(&json!("x")));
    }

    #[test]
    fn child_paths_and_locations() {
        let results = evaluate(
            json!({ "properties": { "a": { "minimum": 5 } } }),
            json!({ "a": 1 }),
        );
        let child = &results.details[0];
        assert_eq!(child.evaluation_path.to_string(), "/properties/a");
        assert_eq!(child.instance_location.to_string(), "/a");
        assert!(child.schema_location.ends_with("#/properties/a"));
    }

    #[test]
    fn depth_guard_aborts() {
        let options = EvaluationOptions::default().max_depth(3);
        let schema = json!({ "items": { "items": { "items": { "items": {} } } } });
        let compiled = compile(&schema, &options).unwrap();
        let err = compiled.evaluate(&json!([[[[1]]]])).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Aborted {
                reason: AbortReason::MaxDepth(3),
                ..
            }
        ));
        assert!(!compiled.is_valid(&json!([[[[1]]]])));
        assert!(compiled.is_valid(&json!([])));
    }

    #[test]
    fn step_guard_aborts() {
        let options = EvaluationOptions::default().max_steps(4);
        let compiled = compile(&json!({ "items": { "type": "integer" } }), &options).unwrap();
        assert!(compiled.evaluate(&json!([1, 2, 3])).is_ok());
        let err = compiled.evaluate(&json!([1, 2, 3, 4])).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Aborted {
                reason: AbortReason::MaxSteps(4),
                ..
            }
        ));
    }

    #[test]
    fn flag_format_is_applied_after_evaluation() {
        let options = EvaluationOptions::default().output_format(OutputFormat::Flag);
        let compiled = compile(&json!({ "properties": { "a": false } }), &options).unwrap();
        let results = compiled.evaluate(&json!({ "a": 1 })).unwrap();
        assert!(!results.is_valid());
        assert!(results.details.is_empty());
    }

    #[test]
    fn evaluate_at_prefixes_locations() {
        let compiled = compile(&json!({ "type": "string" }), &EvaluationOptions::default()).unwrap();
        let results = compiled
            .evaluate_at(&json!(1), JsonPointer::from_segments(["order", "id"]))
            .unwrap();
        let errors = results.collect_errors(compiled.options().messages());
        assert_eq!(errors[0].instance_location.to_string(), "/order/id");
    }
}
