use anyhow::Result;
use serde_sarif::sarif::Result as SarifResult;

use crate::ast::{CompilationUnit, Method};
use crate::cfg::build_cfg;
use crate::ir::ControlFlowGraph;
use crate::rules::{Rule, masked_outcome, unreachable_code, undeclared_throw};
use crate::verify::{Verification, verify};

/// One analyzed method: its graph and the verifier's output, kept together
/// for the rules layer.
#[derive(Clone, Debug)]
pub(crate) struct MethodAnalysis {
    pub(crate) unit: String,
    pub(crate) method: Method,
    pub(crate) cfg: ControlFlowGraph,
    pub(crate) verification: Verification,
}

/// Shared input for rule execution.
#[derive(Clone, Debug)]
pub(crate) struct AnalysisContext {
    pub(crate) methods: Vec<MethodAnalysis>,
}

/// Build and verify a graph per method. Units must already be validated;
/// construction and verification themselves are total.
pub(crate) fn build_context(units: &[CompilationUnit]) -> AnalysisContext {
    let mut methods = Vec::new();
    for unit in units {
        for method in &unit.methods {
            let cfg = build_cfg(method);
            let verification = verify(&cfg);
            methods.push(MethodAnalysis {
                unit: unit.name.clone(),
                method: method.clone(),
                cfg,
                verification,
            });
        }
    }
    AnalysisContext { methods }
}

pub(crate) fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(masked_outcome::MaskedOutcomeRule),
        Box::new(unreachable_code::UnreachableCodeRule),
        Box::new(undeclared_throw::UndeclaredThrowRule),
    ]
}

pub(crate) fn run_rules(context: &AnalysisContext) -> Result<Vec<SarifResult>> {
    let mut results = Vec::new();
    for rule in all_rules() {
        results.extend(rule.run(context)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::validate_unit;

    #[test]
    fn build_context_analyzes_every_method() {
        let mut unit: CompilationUnit = serde_json::from_str(
            r#"{"name": "u", "methods": [
                {"name": "a", "body": [{"return": {}}]},
                {"name": "b", "body": [{"throw": {"exception": {"name": "E"}}}]}
            ]}"#,
        )
        .expect("parse unit");
        validate_unit(&mut unit).expect("validate");

        let context = build_context(&[unit]);

        assert_eq!(context.methods.len(), 2);
        assert!(
            context.methods[0]
                .verification
                .outcomes_at(context.methods[0].cfg.return_exit)
                .len()
                == 1
        );
        assert!(
            context.methods[1]
                .verification
                .outcomes_at(context.methods[1].cfg.throw_exit)
                .len()
                == 1
        );
    }
}
