use anyhow::Result;
use serde_sarif::sarif::{Location, LogicalLocation, Message, Result as SarifResult};

use crate::engine::AnalysisContext;

pub(crate) mod masked_outcome;
pub(crate) mod undeclared_throw;
pub(crate) mod unreachable_code;

/// Metadata describing an analysis rule.
#[derive(Clone, Debug)]
pub(crate) struct RuleMetadata {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
}

/// Rule interface for analysis execution.
pub(crate) trait Rule {
    fn metadata(&self) -> RuleMetadata;
    fn run(&self, context: &AnalysisContext) -> Result<Vec<SarifResult>>;
}

pub(crate) fn method_location(unit_name: &str, method_name: &str) -> Location {
    let logical = method_logical_location(unit_name, method_name);
    Location::builder().logical_locations(vec![logical]).build()
}

pub(crate) fn method_logical_location(unit_name: &str, method_name: &str) -> LogicalLocation {
    LogicalLocation::builder()
        .name(format!("{unit_name}.{method_name}"))
        .kind("function")
        .build()
}

pub(crate) fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

pub(crate) fn tagged_result(
    rule_id: &str,
    message: Message,
    location: Location,
) -> SarifResult {
    SarifResult::builder()
        .rule_id(rule_id)
        .message(message)
        .locations(vec![location])
        .build()
}
