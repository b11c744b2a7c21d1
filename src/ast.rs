use std::collections::BTreeSet;

use anyhow::Result;
use serde::Deserialize;

/// One JSON input file: a named set of methods to analyze.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CompilationUnit {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) methods: Vec<Method>,
}

/// A single method body in the fixed statement vocabulary.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Method {
    pub(crate) name: String,
    /// Exception tags the method declares it may propagate.
    #[serde(default)]
    pub(crate) throws: Vec<String>,
    #[serde(default)]
    pub(crate) body: Vec<Statement>,
}

/// Statement vocabulary consumed by the CFG builder.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Statement {
    Assign(Assign),
    Call(CallSite),
    Return(Return),
    Throw(Throw),
    Try(TryStatement),
    If(IfStatement),
    Loop(LoopStatement),
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Assign {
    pub(crate) target: String,
    pub(crate) value: Expr,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Return {
    #[serde(default)]
    pub(crate) value: Option<Expr>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Throw {
    pub(crate) exception: ExceptionValue,
}

/// `try` owns the guarded body, ordered catch clauses, and an optional finally.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TryStatement {
    #[serde(default)]
    pub(crate) body: Vec<Statement>,
    #[serde(default)]
    pub(crate) catches: Vec<CatchClause>,
    #[serde(default, rename = "finally")]
    pub(crate) finally_block: Option<Vec<Statement>>,
}

/// Catch clause keyed by one exception type tag; first matching clause wins.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CatchClause {
    pub(crate) catches: String,
    #[serde(default)]
    pub(crate) body: Vec<Statement>,
}

/// Condition is symbolic; both arms are explored.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct IfStatement {
    #[serde(default)]
    pub(crate) then_branch: Vec<Statement>,
    #[serde(default)]
    pub(crate) else_branch: Vec<Statement>,
}

/// Loops are abstracted to zero or one symbolic pass.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct LoopStatement {
    #[serde(default)]
    pub(crate) body: Vec<Statement>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Expr {
    Const(i64),
    Var(String),
    Call(CallSite),
}

/// Call site with the exception specs it may raise.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CallSite {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) may_throw: Vec<ExceptionValue>,
}

/// Exception modeled as a capability set: the tags the value satisfies.
/// Catch matching checks tag membership, not an inheritance hierarchy.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ExceptionValue {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) tags: BTreeSet<String>,
}

impl ExceptionValue {
    pub(crate) fn satisfies(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

impl std::fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Validate and normalize one unit before graph construction.
///
/// Rejection here is the MalformedInput class: vocabulary violations are
/// surfaced as errors, never silently ignored. Normalization inserts each
/// exception's own name into its tag set so a bare name matches itself.
pub(crate) fn validate_unit(unit: &mut CompilationUnit) -> Result<()> {
    if unit.name.is_empty() {
        anyhow::bail!("malformed input: compilation unit has an empty name");
    }
    for method in &mut unit.methods {
        if method.name.is_empty() {
            anyhow::bail!(
                "malformed input: method with empty name in unit {}",
                unit.name
            );
        }
        for tag in &method.throws {
            if tag.is_empty() {
                anyhow::bail!(
                    "malformed input: empty throws tag on {}.{}",
                    unit.name,
                    method.name
                );
            }
        }
        validate_stmts(&mut method.body, &unit.name, &method.name)?;
    }
    Ok(())
}

fn validate_stmts(stmts: &mut [Statement], unit: &str, method: &str) -> Result<()> {
    for stmt in stmts {
        match stmt {
            Statement::Assign(assign) => {
                if assign.target.is_empty() {
                    anyhow::bail!("malformed input: empty assignment target in {unit}.{method}");
                }
                validate_expr(&mut assign.value, unit, method)?;
            }
            Statement::Call(call) => validate_call(call, unit, method)?,
            Statement::Return(ret) => {
                if let Some(value) = &mut ret.value {
                    validate_expr(value, unit, method)?;
                }
            }
            Statement::Throw(throw) => validate_exception(&mut throw.exception, unit, method)?,
            Statement::Try(try_stmt) => {
                if try_stmt.catches.is_empty() && try_stmt.finally_block.is_none() {
                    anyhow::bail!(
                        "malformed input: try without catch or finally in {unit}.{method}"
                    );
                }
                validate_stmts(&mut try_stmt.body, unit, method)?;
                for clause in &mut try_stmt.catches {
                    if clause.catches.is_empty() {
                        anyhow::bail!(
                            "malformed input: catch clause with empty type tag in {unit}.{method}"
                        );
                    }
                    validate_stmts(&mut clause.body, unit, method)?;
                }
                if let Some(finally_block) = &mut try_stmt.finally_block {
                    validate_stmts(finally_block, unit, method)?;
                }
            }
            Statement::If(if_stmt) => {
                validate_stmts(&mut if_stmt.then_branch, unit, method)?;
                validate_stmts(&mut if_stmt.else_branch, unit, method)?;
            }
            Statement::Loop(loop_stmt) => validate_stmts(&mut loop_stmt.body, unit, method)?,
        }
    }
    Ok(())
}

fn validate_expr(expr: &mut Expr, unit: &str, method: &str) -> Result<()> {
    match expr {
        Expr::Const(_) => Ok(()),
        Expr::Var(name) => {
            if name.is_empty() {
                anyhow::bail!("malformed input: empty variable reference in {unit}.{method}");
            }
            Ok(())
        }
        Expr::Call(call) => validate_call(call, unit, method),
    }
}

fn validate_call(call: &mut CallSite, unit: &str, method: &str) -> Result<()> {
    if call.name.is_empty() {
        anyhow::bail!("malformed input: call with empty name in {unit}.{method}");
    }
    for exception in &mut call.may_throw {
        validate_exception(exception, unit, method)?;
    }
    Ok(())
}

fn validate_exception(exception: &mut ExceptionValue, unit: &str, method: &str) -> Result<()> {
    if exception.name.is_empty() {
        anyhow::bail!("malformed input: exception with empty name in {unit}.{method}");
    }
    exception.tags.insert(exception.name.clone());
    Ok(())
}
