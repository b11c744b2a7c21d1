use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::engine::AnalysisContext;
use crate::ir::{Finding, UnreachableReason};
use crate::rules::{Rule, RuleMetadata, method_location, result_message, tagged_result};

/// Rule that reports blocks no path from entry can reach, including catch
/// clauses whose type tag matches no throw site in their guarded region.
pub(crate) struct UnreachableCodeRule;

impl Rule for UnreachableCodeRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "UNREACHABLE_CODE",
            name: "Unreachable code",
            description: "Blocks or catch clauses that no execution path reaches",
        }
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>> {
        let mut results = Vec::new();
        for analysis in &context.methods {
            for finding in &analysis.verification.findings {
                let Finding::UnreachableBlock { block, reason } = finding else {
                    continue;
                };
                let message = match reason {
                    UnreachableReason::UnmatchedCatch { catches } => result_message(format!(
                        "catch clause for `{catches}` matches no throw site in its guarded region"
                    )),
                    UnreachableReason::DeadCode => {
                        result_message(format!("block {} is unreachable", block.0))
                    }
                };
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
    fn reports_a_catch_clause_that_never_matches() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "body": [
                {"try": {
                    "body": [{"call": {"name": "f", "may_throw": [{"name": "A"}]}}],
                    "catches": [{"catches": "B", "body": []}]
                }}
            ]}]}"#,
        );

        let results = UnreachableCodeRule.run(&context).expect("rule run");

        assert!(
            results.iter().any(|result| {
                result
                    .message
                    .text
                    .as_deref()
                    .is_some_and(|text| text.contains("catch clause for `B`"))
            })
        );
    }

    #[test]
    fn silent_when_every_block_is_reachable() {
        let context = context_for(
            r#"{"name": "u", "methods": [{"name": "m", "body": [
                {"assign": {"target": "a", "value": {"const": 1}}},
                {"return": {"value": {"var": "a"}}}
            ]}]}"#,
        );

        let results = UnreachableCodeRule.run(&context).expect("rule run");

        assert!(results.is_empty());
    }
}
