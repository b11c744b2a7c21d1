use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::engine::AnalysisContext;
use crate::ir::Outcome;
use crate::rules::{Rule, RuleMetadata, method_location, result_message, tagged_result};

/// Rule that checks unhandled-exception outcomes against the method's
/// declared throws list. An exception satisfies the declaration when any of
/// its type tags is declared.
pub(crate) struct UndeclaredThrowRule;

impl Rule for UndeclaredThrowRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "UNDECLARED_THROW",
            name: "Undeclared exception propagation",
            description: "Method exits with an exception its throws list does not declare",
        }
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>> {
        let mut results = Vec::new();
        for analysis in &context.methods {
            let declared = &analysis.method.throws;
            for (outcome, _) in analysis
                .verification
                .outcomes_at(analysis.cfg.throw_exit)
            {
                let Outcome::Throws(exception) = outcome else {
                    continue;
                };
                if declared.iter().any(|tag| exception.satisfies(tag)) {
                    continue;
                }
                let message = result_message(format!(
                    "method {}.{} may exit with undeclared exception {}",
                    analysis.unit, analysis.method.name, exception
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
    fn reports_an_exception_missing_from_the_throws_list() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "throws": ["A"], "body": [
                {"throw": {"exception": {"name": "B"}}}
            ]}]}"#,
        );

        let results = UndeclaredThrowRule.run(&context).expect("rule run");

        assert_eq!(results.len(), 1);
        let message = results[0].message.text.as_deref().unwrap_or("");
        assert!(message.contains("undeclared exception B"));
    }

    #[test]
    fn accepts_a_declared_supertype_tag() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "throws": ["Base"], "body": [
                {"throw": {"exception": {"name": "E", "tags": ["Base"]}}}
            ]}]}"#,
        );

        let results = UndeclaredThrowRule.run(&context).expect("rule run");

        assert!(results.is_empty());
    }

    #[test]
    fn caught_exceptions_are_not_reported() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "body": [
                {"try": {
                    "body": [{"throw": {"exception": {"name": "E"}}}],
                    "catches": [{"catches": "E", "body": []}]
                }}
            ]}]}"#,
        );

        let results = UndeclaredThrowRule.run(&context).expect("rule run");

        assert!(results.is_empty());
    }
}
