mod ast;
mod cfg;
mod engine;
mod ir;
mod rules;
mod scan;
mod verify;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use serde_sarif::sarif::{
    Artifact, Invocation, ReportingDescriptor, Result as SarifResult, Run, Sarif, Tool,
    ToolComponent, SCHEMA_URL,
};

use crate::engine::{all_rules, build_context, run_rules};
use crate::scan::scan_inputs;

/// CLI arguments for tryvet execution.
#[derive(Parser, Debug)]
#[command(
    name = "tryvet",
    about = "Deterministic SARIF output for exception-path analysis of method ASTs.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let scan = scan_inputs(&cli.input)?;
    let context = build_context(&scan.units);
    let results = run_rules(&context)?;
    let method_count = scan.method_count;
    let artifact_count = scan.artifacts.len();
    let invocation = build_invocation();
    let sarif = build_sarif(scan.artifacts, results, invocation);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} methods={} artifacts={}",
            started_at.elapsed().as_millis(),
            method_count,
            artifact_count
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

fn rule_descriptors() -> Vec<ReportingDescriptor> {
    all_rules()
        .iter()
        .map(|rule| {
            let metadata = rule.metadata();
            ReportingDescriptor::builder()
                .id(metadata.id)
                .name(metadata.name)
                .short_description(
                    serde_sarif::sarif::MultiformatMessageString::builder()
                        .text(metadata.description)
                        .build(),
                )
                .build()
        })
        .collect()
}

fn build_sarif(
    artifacts: Vec<Artifact>,
    results: Vec<SarifResult>,
    invocation: Invocation,
) -> Sarif {
    let driver = ToolComponent::builder()
        .name("tryvet")
        .rules(rule_descriptors())
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let invocation = Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build();
        let sarif = build_sarif(Vec::new(), Vec::new(), invocation);
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "tryvet");
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
        let rules = value["runs"][0]["tool"]["driver"]["rules"]
            .as_array()
            .expect("rules array");
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn fixture_unit_yields_a_clean_sarif_run() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/test_finally.json");
        let scan = scan_inputs(&fixture).expect("scan fixture");
        let context = build_context(&scan.units);
        let results = run_rules(&context).expect("run rules");
        let sarif = build_sarif(scan.artifacts, results, build_invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        let artifacts = value["runs"][0]["artifacts"]
            .as_array()
            .expect("artifacts array");
        assert_eq!(artifacts.len(), 1);
        let uri = artifacts[0]["location"]["uri"].as_str().expect("artifact uri");
        assert!(uri.ends_with("test_finally.json"));
    }

    #[test]
    fn sarif_carries_rule_results() {
        let invocation = Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build();
        let result = crate::rules::tagged_result(
            "MASKED_OUTCOME",
            crate::rules::result_message("finally block discards a pending outcome"),
            crate::rules::method_location("u", "m"),
        );
        let sarif = build_sarif(Vec::new(), vec![result], invocation);
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(
            value["runs"][0]["results"][0]["ruleId"],
            "MASKED_OUTCOME"
        );
    }
}
