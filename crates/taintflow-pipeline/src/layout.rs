//! Canonical on-disk layout for one (project, model, weakness) run.
//!
//! Everything a stage writes lives under `projects/<proj>/`, partitioned by
//! model so that runs against different models never collide.

use std::fs;
use std::path::{Path, PathBuf};
use taintflow_core::{Result, Weakness};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub project_dir: PathBuf,

    pub package_analysis_dir: PathBuf,
    pub origin_jsonl: PathBuf,
    pub usages_raw_jsonl: PathBuf,
    pub usages_external_jsonl: PathBuf,

    pub usage_prompts_dir: PathBuf,
    pub spesification_results_dir: PathBuf,
    pub sources_jsonl: PathBuf,
    pub sinks_jsonl: PathBuf,
    pub sources_qll: PathBuf,
    pub sinks_qll: PathBuf,
    pub reasoning_log: PathBuf,

    pub codeql_runs_dir: PathBuf,
    pub query_sarif: PathBuf,
    pub query_csv: PathBuf,

    pub triage_prompts_dir: PathBuf,
    pub triage_results_dir: PathBuf,
    pub triaged_flows_dir: PathBuf,
    pub filtered_sarif: PathBuf,
}

impl ProjectLayout {
    pub fn new(output_root: &Path, project_name: &str, model: &str, weakness: Weakness) -> Self {
        let project_dir = output_root.join("projects").join(project_name);
        let package_analysis_dir = project_dir.join("package_analysis");
        let llm_results_dir = project_dir.join("llm_results").join(model);
        let usage_prompts_dir = llm_results_dir.join("usage_prompts");
        let spesification_results_dir = llm_results_dir.join("spesification_results");
        let codeql_runs_dir = llm_results_dir.join("codeQL_runs");
        let triage_prompts_dir = llm_results_dir.join("triage_prompts");
        let triage_results_dir = llm_results_dir.join("triage_results");
        let triaged_flows_dir = llm_results_dir.join("triaged_flows");

        Self {
            origin_jsonl: package_analysis_dir.join("origin.jsonl"),
            usages_raw_jsonl: package_analysis_dir.join("usages_raw.jsonl"),
            usages_external_jsonl: package_analysis_dir.join("usages_external.jsonl"),
            sources_jsonl: spesification_results_dir.join("sources.jsonl"),
            sinks_jsonl: spesification_results_dir.join("sinks.jsonl"),
            sources_qll: spesification_results_dir.join("TestSources.qll"),
            sinks_qll: spesification_results_dir.join("TestSinks.qll"),
            reasoning_log: usage_prompts_dir.join("reasoning.txt"),
            query_sarif: codeql_runs_dir.join(format!("{}-query.sarif", weakness)),
            query_csv: codeql_runs_dir.join(format!("{}-query.csv", weakness)),
            filtered_sarif: triaged_flows_dir.join(format!("filtered-{}-query.sarif", weakness)),
            project_dir,
            package_analysis_dir,
            usage_prompts_dir,
            spesification_results_dir,
            codeql_runs_dir,
            triage_prompts_dir,
            triage_results_dir,
            triaged_flows_dir,
        }
    }

    /// Create every directory of the layout.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.package_analysis_dir,
            &self.usage_prompts_dir,
            &self.spesification_results_dir,
            &self.codeql_runs_dir,
            &self.triage_prompts_dir,
            &self.triage_results_dir,
            &self.triaged_flows_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Artifacts downstream of the specification stage. Cleared before the
    /// stage reruns so partial outputs never poison gating.
    pub fn specification_downstream(&self) -> Vec<&Path> {
        vec![
            self.codeql_runs_dir.as_path(),
            self.usage_prompts_dir.as_path(),
            self.spesification_results_dir.as_path(),
            self.triage_prompts_dir.as_path(),
            self.triage_results_dir.as_path(),
            self.triaged_flows_dir.as_path(),
        ]
    }

    pub fn triage_dirs(&self) -> Vec<&Path> {
        vec![
            self.triage_prompts_dir.as_path(),
            self.triage_results_dir.as_path(),
            self.triaged_flows_dir.as_path(),
        ]
    }
}

/// Remove the contents of a directory without removing the directory.
pub fn clear_directory(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    debug!("Cleared {}", dir.display());
    Ok(())
}

/// Copy a prior run directory into the current layout so gating can pick up
/// its artifacts.
pub fn copy_run_artifacts(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        warn!("Resume directory {} does not exist; ignoring", from.display());
        return Ok(());
    }
    copy_recursive(from, to)
}

fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_recursive(&src, &dst)?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}
