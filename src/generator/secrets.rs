use anyhow::Result;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::metadata::HistoryEntry;
use crate::script_writer::ScriptSink;

static BUILD_SECRET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/run/secrets/[\w.\\/_\-]*)").unwrap());

/// What a pass over the whole history found about buildkit secret mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSecretReport {
    pub build_kit_detected: bool,
    pub secret_paths: BTreeSet<String>,
}

pub fn is_build_kit_entry(entry: &HistoryEntry) -> bool {
    entry
        .comment
        .as_deref()
        .is_some_and(|comment| comment.starts_with("buildkit"))
        || entry
            .created_by
            .as_deref()
            .is_some_and(|line| line.ends_with("# buildkit"))
}

/// Every `/run/secrets/...` path mentioned in `line`.
pub fn find_secret_paths(line: &str) -> impl Iterator<Item = &str> {
    BUILD_SECRET_RE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

pub fn scan_build_secrets(history: &[HistoryEntry]) -> BuildSecretReport {
    let mut report = BuildSecretReport::default();
    for entry in history.iter().filter(|entry| is_build_kit_entry(entry)) {
        report.build_kit_detected = true;
        if let Some(line) = entry.created_by.as_deref() {
            report
                .secret_paths
                .extend(find_secret_paths(line).map(str::to_string));
        }
    }
    report
}

/// Warn about buildkit secrets and guard each detected path with an existence check.
pub fn write_secret_checks<S: ScriptSink + ?Sized>(
    sink: &mut S,
    report: &BuildSecretReport,
) -> Result<()> {
    if !report.build_kit_detected {
        return Ok(());
    }

    if report.secret_paths.is_empty() {
        return sink.write_message(
            "WARN: The image could be generated with docker build secrets. Default paths for \
             Docker build secrets were not found. If the secret files used during the image \
             build do not exist on this host, the script will fail.",
        );
    }

    sink.write_message("WARN: The image could be generated with docker build secrets.")?;
    for path in &report.secret_paths {
        sink.write_message(&format!(
            "Docker build secret detected: {} -> make sure the file exists at that location",
            path
        ))?;
        sink.write_file_exists(path, &format!("secret file '{}' not found!", path))?;
    }
    Ok(())
}
