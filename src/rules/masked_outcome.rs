use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::engine::AnalysisContext;
use crate::ir::Finding;
use crate::rules::{Rule, RuleMetadata, method_location, result_message, tagged_result};

/// Rule that reports finally blocks discarding a pending return or
/// in-flight exception. This is the principal defect class the analyzer
/// exists to surface.
pub(crate) struct MaskedOutcomeRule;

impl Rule for MaskedOutcomeRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "MASKED_OUTCOME",
            name: "Outcome masked by finally",
            description: "A finally block replaces the guarded region's return value or exception",
        }
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>> {
        let mut results = Vec::new();
        for analysis in &context.methods {
            for finding in &analysis.verification.findings {
                let Finding::MaskedOutcome {
                    delivered,
                    discarded,
                    path,
                    ..
                } = finding
                else {
                    continue;
                };
                let message = result_message(format!(
                    "finally block discards a pending outcome: path {} blocks long exits with `{}` instead of `{}`",
                    path.steps.len(),
                    delivered,
                    discarded
                ));
                let location = method_location(&analysis.unit, &analysis.method.name);
                results.push(tagged_result(self.metadata().id, message, location));
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompilationUnit, validate_unit};
    use crate::engine::build_context;

    fn context_for(json: &str) -> AnalysisContext {
        let mut unit: CompilationUnit = serde_json::from_str(json).expect("parse unit");
        validate_unit(&mut unit).expect("validate unit");
        build_context(&[unit])
    }

    #[test]
    fn reports_a_returning_finally_over_a_guarded_return() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "body": [
                {"try": {
                    "body": [{"return": {"value": {"const": 2}}}],
                    "finally": [{"return": {"value": {"const": 1}}}]
                }}
            ]}]}"#,
        );

        let results = MaskedOutcomeRule.run(&context).expect("rule run");

        assert_eq!(results.len(), 1);
        let message = results[0].message.text.as_deref().unwrap_or("");
        assert!(message.contains("returns 1"));
        assert!(message.contains("returns 2"));
    }

    #[test]
    fn silent_on_a_well_behaved_finally() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "body": [
                {"try": {
                    "body": [{"return": {"value": {"const": 2}}}],
                    "finally": [{"assign": {"target": "done", "value": {"const": 1}}}]
                }}
            ]}]}"#,
        );

        let results = MaskedOutcomeRule.run(&context).expect("rule run");

        assert!(results.is_empty());
    }
}
