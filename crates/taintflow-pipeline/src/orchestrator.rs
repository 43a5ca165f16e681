//! Stage sequencing for one (project, model, weakness) tuple.
//!
//! Each stage is gated on the presence of its primary output plus an
//! explicit rerun flag; re-executing a stage first clears everything
//! downstream of it so partial outputs never poison a later run. Stop-after
//! flags return control immediately after the named stage.

use crate::codeql::CodeQlRunner;
use crate::layout::{clear_directory, copy_run_artifacts, ProjectLayout};
use crate::spec::synthesizer::read_specified_records;
use crate::spec::{write_predicate_files, SpecificationSynthesizer};
use crate::triage::FlowTriager;
use std::sync::Arc;
use taintflow_ai::LlmProvider;
use taintflow_core::{jsonl, PipelineConfig, Result, TaintFlowError, UsageRecord};
use taintflow_tracker::{analyze_project_to_file, write_external_usages, write_origin_file};
use tracing::{info, warn};

pub struct Orchestrator {
    config: PipelineConfig,
    layout: ProjectLayout,
    provider: Arc<dyn LlmProvider>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let layout = ProjectLayout::new(
            &config.output_root,
            &config.project_name,
            &config.model,
            config.weakness,
        );
        Self {
            config,
            layout,
            provider,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub async fn run(&self) -> Result<()> {
        if self.config.simulate_runs {
            info!(
                "Pretending to run pipeline for project {} ...",
                self.config.project_name
            );
            return Ok(());
        }
        if !self.config.project_root.is_dir() {
            return Err(TaintFlowError::Configuration(format!(
                "project root not found at {}",
                self.config.project_root.display()
            )));
        }
        self.layout.ensure_dirs()?;

        if let Some(prior) = &self.config.resume_from {
            info!("Resuming from prior run at {}", prior.display());
            copy_run_artifacts(prior, &self.layout.project_dir)?;
        }

        self.run_package_analysis()?;
        self.run_specification().await?;
        if self.config.stop_after_usage_prompting {
            info!("stop_after_usage_prompting is set; returning after the specification stage");
            return Ok(());
        }

        // Specification emptiness: without both sources and sinks there is
        // nothing for the structural engine to connect.
        if !jsonl::is_non_empty_file(&self.layout.sources_jsonl)
            || !jsonl::is_non_empty_file(&self.layout.sinks_jsonl)
        {
            info!(
                "Specification for {} has no sources or no sinks; terminating cleanly",
                self.config.project_name
            );
            return Ok(());
        }

        if !self.run_dataflow_query()? {
            return Ok(());
        }
        self.run_triage().await
    }

    /// P0 origin, P1 usage tracking, P2 external filter. Each gated on its
    /// primary output.
    fn run_package_analysis(&self) -> Result<()> {
        if !self.layout.origin_jsonl.is_file() {
            info!("Analyzing package origin ...");
            write_origin_file(&self.config.project_root, &self.layout.origin_jsonl)?;
        }
        if !self.layout.usages_raw_jsonl.is_file() {
            info!("Analyzing package usages ...");
            analyze_project_to_file(&self.config.project_root, &self.layout.usages_raw_jsonl)?;
        }
        if !self.layout.usages_external_jsonl.is_file() {
            write_external_usages(
                &self.layout.usages_raw_jsonl,
                &self.layout.origin_jsonl,
                &self.layout.usages_external_jsonl,
            )?;
        }
        Ok(())
    }

    /// P3: prompts → model → sources/sinks → predicate files.
    async fn run_specification(&self) -> Result<()> {
        if self.config.rerun_usage_prompting {
            for dir in self.layout.specification_downstream() {
                clear_directory(dir)?;
            }
        }

        let specification_exists = jsonl::is_non_empty_file(&self.layout.sources_jsonl)
            || jsonl::is_non_empty_file(&self.layout.sinks_jsonl);
        if specification_exists && !self.config.rerun_usage_prompting {
            info!("LLM-specified sources and sinks already exist");
            return Ok(());
        }

        let records: Vec<UsageRecord> = jsonl::read_jsonl(&self.layout.usages_external_jsonl)?;
        let synthesizer = SpecificationSynthesizer::new(
            self.provider.clone(),
            self.layout.clone(),
            self.config.weakness,
            self.config.max_retries,
            self.config.max_concurrent_requests,
        );
        synthesizer.run(&records).await?;
        info!("Finished running prompts");

        let source_records = read_specified_records(&self.layout.sources_jsonl)?;
        let sink_records = read_specified_records(&self.layout.sinks_jsonl)?;
        write_predicate_files(
            &source_records,
            &sink_records,
            &self.layout.sources_qll,
            &self.layout.sinks_qll,
        )?;
        info!("Finished writing predicates");
        Ok(())
    }

    /// P4: invoke the structural engine. Returns false when the project is
    /// skipped because its database is missing.
    fn run_dataflow_query(&self) -> Result<bool> {
        if self.layout.query_sarif.is_file() {
            info!("CodeQL-discovered dataflows exist");
            return Ok(true);
        }

        let runner = CodeQlRunner::new(
            self.config.db_path.clone(),
            self.config.query_pack_dir.clone(),
        );
        if !runner.database_exists() {
            if self.config.create_missing_dbs {
                runner.create_database(&self.config.project_root)?;
            } else {
                warn!(
                    "CodeQL database missing at {}; skipping the rest of project {}",
                    self.config.db_path.display(),
                    self.config.project_name
                );
                return Ok(false);
            }
        }

        info!("Starting CodeQL run");
        runner.install_predicates(&self.layout.sources_qll, &self.layout.sinks_qll)?;
        runner.run_query(&self.layout.query_sarif, &self.layout.query_csv)?;
        info!("Finished running CodeQL");
        Ok(true)
    }

    /// P5: judge each flow and rewrite the SARIF.
    async fn run_triage(&self) -> Result<()> {
        if self.layout.filtered_sarif.is_file() && !self.config.rerun_triage_prompting {
            info!(
                "{}-triaged dataflows already exist",
                self.config.model
            );
            return Ok(());
        }
        for dir in self.layout.triage_dirs() {
            clear_directory(dir)?;
        }

        let triager = FlowTriager::new(
            self.config.project_root.clone(),
            self.layout.query_sarif.clone(),
            self.layout.filtered_sarif.clone(),
            self.layout.triage_prompts_dir.clone(),
            self.layout.triage_results_dir.clone(),
            self.config.weakness,
            self.config.gap_limit,
            self.config.context_lines,
            self.config.max_retries,
            self.provider.clone(),
        );
        let summary = triager.triage().await?;
        info!(
            "Triage finished: kept {}/{} flows",
            summary.kept_flows, summary.total_flows
        );
        Ok(())
    }
}
