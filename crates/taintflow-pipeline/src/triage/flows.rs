//! Flow reconstruction from SARIF thread flows.
//!
//! Locations are materialized with their real line numbers, import-only
//! lines are filtered out as noise, and interior steps are grouped into
//! contiguous blocks bounded by the configured gap limit.

use crate::triage::paths::resolve_artifact_uri;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use taintflow_core::{Result, TaintFlowError};

/// One SARIF location materialized against the local tree.
#[derive(Debug, Clone)]
pub struct FlowLocation {
    pub uri: String,
    pub path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

// Matches numbered snippet lines like `1: import os` or
// `12: import mypkg.submod, otherpkg  # comment`.
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*\d+:\s*import\s+[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)*\s*(?:#.*)?$",
    )
    .expect("valid regex")
});

// Matches numbered snippet lines like `1: from flask import Flask, request`.
static FROM_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*\d+:\s*from\s+[A-Za-z_.][A-Za-z0-9_.]*\s+import\s+[A-Za-z_*][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*\s*(?:#.*)?$",
    )
    .expect("valid regex")
});

/// True when a numbered snippet line is an import statement.
pub fn is_import_line(line: &str) -> bool {
    IMPORT_RE.is_match(line) || FROM_IMPORT_RE.is_match(line)
}

/// Materialize the ordered locations of one threadFlow.
pub fn parse_thread_flow(thread_flow: &Value, root: &Path) -> Result<Vec<FlowLocation>> {
    let locations = thread_flow
        .get("locations")
        .and_then(Value::as_array)
        .ok_or_else(|| TaintFlowError::Sarif("threadFlow without locations".to_string()))?;

    let mut out = Vec::with_capacity(locations.len());
    for entry in locations {
        let phys = entry
            .pointer("/location/physicalLocation")
            .ok_or_else(|| TaintFlowError::Sarif("location without physicalLocation".to_string()))?;
        let uri = phys
            .pointer("/artifactLocation/uri")
            .and_then(Value::as_str)
            .ok_or_else(|| TaintFlowError::Sarif("location without artifact uri".to_string()))?;
        let start_line = phys
            .pointer("/region/startLine")
            .and_then(Value::as_u64)
            .ok_or_else(|| TaintFlowError::Sarif("location without startLine".to_string()))?
            as usize;
        let end_line = phys
            .pointer("/region/endLine")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(start_line);

        out.push(FlowLocation {
            uri: uri.to_string(),
            path: resolve_artifact_uri(root, uri),
            start_line,
            end_line,
        });
    }
    Ok(out)
}

/// Numbered snippet around a location. Read failures become a marker line
/// instead of aborting the triage.
pub fn extract_snippet(loc: &FlowLocation, context_top: usize, context_bottom: usize) -> String {
    let text = match fs::read_to_string(&loc.path) {
        Ok(text) => text,
        Err(_) => return format!("# Unable to read file: {}\n", loc.uri),
    };
    let lines: Vec<&str> = text.lines().collect();
    let start = loc.start_line.saturating_sub(context_top).max(1);
    let end = (loc.end_line + context_bottom).min(lines.len());

    let mut out = String::new();
    for lineno in start..=end {
        if let Some(line) = lines.get(lineno - 1) {
            out.push_str(&format!("{}: {}\n", lineno, line));
        }
    }
    out
}

/// First non-blank numbered line of the location's own region.
pub fn primary_line(loc: &FlowLocation) -> String {
    extract_snippet(loc, 0, 0)
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Group interior step locations into blocks: two consecutive steps share a
/// block iff they are in the same file and no further apart than the gap
/// limit.
pub fn find_blocks(steps: &[FlowLocation], gap_limit: usize) -> Vec<Vec<FlowLocation>> {
    let mut blocks: Vec<Vec<FlowLocation>> = Vec::new();
    let mut current: Vec<FlowLocation> = Vec::new();
    for loc in steps {
        match current.last() {
            None => current.push(loc.clone()),
            Some(prev) => {
                if prev.uri == loc.uri && loc.start_line <= prev.start_line + gap_limit {
                    current.push(loc.clone());
                } else {
                    blocks.push(std::mem::take(&mut current));
                    current.push(loc.clone());
                }
            }
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Render one block as a numbered snippet: the first location carries the
/// block's top context, later locations contribute only their own lines,
/// and repeated lines collapse.
pub fn render_block(block: &[FlowLocation], context_top: usize) -> String {
    let mut out = String::new();
    let mut last_line = 0usize;
    for (idx, loc) in block.iter().enumerate() {
        if loc.start_line == last_line {
            continue;
        }
        last_line = loc.start_line;
        let top = if idx == 0 { context_top } else { 0 };
        out.push_str(&extract_snippet(loc, top, 0));
    }
    out
}
