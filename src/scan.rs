use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};

use crate::ast::{CompilationUnit, validate_unit};

/// Snapshot of parsed units and method counts for a scan.
#[derive(Debug)]
pub(crate) struct ScanOutput {
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) units: Vec<CompilationUnit>,
    pub(crate) method_count: usize,
}

/// Scan a JSON unit file or a directory of them. Ordering is deterministic:
/// directory listings are sorted before traversal.
pub(crate) fn scan_inputs(input: &Path) -> Result<ScanOutput> {
    let mut output = ScanOutput {
        artifacts: Vec::new(),
        units: Vec::new(),
        method_count: 0,
    };
    scan_path(input, true, true, &mut output)?;
    Ok(output)
}

fn scan_path(path: &Path, is_input: bool, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, output)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if extension != "json" {
        if strict {
            anyhow::bail!("unsupported input file: {}", path.display());
        }
        return Ok(());
    }

    let roles = if is_input {
        Some(vec![
            serde_json::to_value(ArtifactRoles::AnalysisTarget).expect("serialize artifact role"),
        ])
    } else {
        None
    };
    scan_unit_file(path, roles, output)
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(path).with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, output)?;
        } else {
            scan_path(&entry, false, false, output)?;
        }
    }

    Ok(())
}

fn scan_unit_file(path: &Path, roles: Option<Vec<Value>>, output: &mut ScanOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut unit: CompilationUnit = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    validate_unit(&mut unit).with_context(|| format!("rejected {}", path.display()))?;

    output.method_count += unit.methods.len();
    output.units.push(unit);
    push_artifact(path_to_uri(path), data.len() as u64, roles, &mut output.artifacts);
    Ok(())
}

fn push_artifact(uri: String, len: u64, roles: Option<Vec<Value>>, artifacts: &mut Vec<Artifact>) {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match roles {
        Some(roles) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        None => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    artifacts.push(artifact);
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_JSON: &str = r#"{"name": "test_finally", "methods": [
        {"name": "m", "throws": ["java.io.IOException"], "body": [
            {"return": {}}
        ]}
    ]}"#;

    #[test]
    fn scan_inputs_accepts_a_valid_unit_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let unit_path = dir.path().join("test_finally.json");
        fs::write(&unit_path, UNIT_JSON).expect("write unit file");

        let output = scan_inputs(&unit_path).expect("scan unit");

        assert_eq!(output.units.len(), 1);
        assert_eq!(output.method_count, 1);
        assert_eq!(output.artifacts.len(), 1);
        let uri = output
            .artifacts
            .first()
            .and_then(|artifact| artifact.location.as_ref())
            .and_then(|location| location.uri.as_ref())
            .cloned()
            .expect("artifact uri");
        assert!(uri.ends_with("test_finally.json"));
    }

    #[test]
    fn scan_inputs_rejects_invalid_json() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let unit_path = dir.path().join("bad.json");
        fs::write(&unit_path, b"nope").expect("write bad unit");

        let result = scan_inputs(&unit_path);

        assert!(result.is_err());
    }

    #[test]
    fn scan_inputs_rejects_malformed_vocabulary() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let unit_path = dir.path().join("malformed.json");
        fs::write(
            &unit_path,
            r#"{"name": "u", "methods": [{"name": "m", "body": [{"try": {"body": []}}]}]}"#,
        )
        .expect("write malformed unit");

        let err = scan_inputs(&unit_path).expect_err("must reject");

        assert!(format!("{err:#}").contains("malformed input"));
    }

    #[test]
    fn scan_inputs_walks_directories_in_sorted_order() {
        let dir = tempfile::tempdir().expect("create temp dir");
        for name in ["b.json", "a.json"] {
            fs::write(dir.path().join(name), UNIT_JSON).expect("write unit file");
        }
        fs::write(dir.path().join("notes.txt"), b"ignored").expect("write stray file");

        let output = scan_inputs(dir.path()).expect("scan directory");

        assert_eq!(output.units.len(), 2);
        let uris: Vec<_> = output
            .artifacts
            .iter()
            .filter_map(|artifact| artifact.location.as_ref())
            .filter_map(|location| location.uri.clone())
            .collect();
        assert!(uris[0].ends_with("a.json"));
        assert!(uris[1].ends_with("b.json"));
    }

    #[test]
    fn scan_inputs_rejects_unsupported_top_level_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let stray = dir.path().join("notes.txt");
        fs::write(&stray, b"nope").expect("write stray file");

        assert!(scan_inputs(&stray).is_err());
    }
}
