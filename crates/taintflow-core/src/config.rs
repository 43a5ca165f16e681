use crate::weakness::Weakness;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_GAP_LIMIT: usize = 1;
pub const DEFAULT_CONTEXT_LINES: usize = 2;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Everything the orchestrator needs to run the pipeline for one
/// (project, model, weakness) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the Python source tree under analysis.
    pub project_root: PathBuf,
    /// Name under which artifacts are laid out below the output root.
    pub project_name: String,
    /// Pre-built CodeQL database for the project.
    pub db_path: PathBuf,
    /// Directory of the query pack the predicate files are copied into.
    pub query_pack_dir: PathBuf,
    pub weakness: Weakness,
    /// Model identifier, resolved to a provider by the factory.
    pub model: String,
    /// Root under which `projects/<name>/...` is materialized.
    pub output_root: PathBuf,
    /// Prior run directory whose artifacts are copied in before gating.
    #[serde(default)]
    pub resume_from: Option<PathBuf>,

    /// Maximum line distance between adjacent step locations in one block.
    #[serde(default = "default_gap_limit")]
    pub gap_limit: usize,
    /// Context lines read above and below a flow location.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    /// Retries for LLM transport and parse failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// In-flight request cap for specification prompts.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default)]
    pub rerun_usage_prompting: bool,
    #[serde(default)]
    pub rerun_triage_prompting: bool,
    #[serde(default)]
    pub stop_after_usage_prompting: bool,
    /// Skip all external calls (LLM and CodeQL) and only report the plan.
    #[serde(default)]
    pub simulate_runs: bool,
    /// Invoke `codeql database create` when the database is absent.
    #[serde(default)]
    pub create_missing_dbs: bool,
}

fn default_gap_limit() -> usize {
    DEFAULT_GAP_LIMIT
}

fn default_context_lines() -> usize {
    DEFAULT_CONTEXT_LINES
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunables_default_when_absent() {
        let json = r#"{
            "project_root": "/tmp/proj",
            "project_name": "proj",
            "db_path": "/tmp/db",
            "query_pack_dir": "/tmp/queries",
            "weakness": "cwe89",
            "model": "deepseek-chat",
            "output_root": "/tmp/out"
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gap_limit, DEFAULT_GAP_LIMIT);
        assert_eq!(config.context_lines, DEFAULT_CONTEXT_LINES);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!config.simulate_runs);
        assert_eq!(config.weakness, Weakness::Cwe89);
    }
}
