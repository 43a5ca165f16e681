//! Specification synthesis: dispatch per-package prompts to the model,
//! parse the returned classifications and reconcile them against the usage
//! records into `sources.jsonl` / `sinks.jsonl`.

use crate::layout::ProjectLayout;
use crate::spec::prompts::{build_prompts, PACKAGE_SYSTEM_PROMPT};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use taintflow_ai::{GenerationConfig, LlmProvider, Message};
use taintflow_core::{jsonl, Result, SpecLabel, TaintFlowError, UsageRecord, Weakness};
use tracing::{info, warn};

pub struct SpecificationSynthesizer {
    provider: Arc<dyn LlmProvider>,
    layout: ProjectLayout,
    weakness: Weakness,
    max_retries: u32,
    max_concurrent: usize,
}

impl SpecificationSynthesizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        layout: ProjectLayout,
        weakness: Weakness,
        max_retries: u32,
        max_concurrent: usize,
    ) -> Self {
        Self {
            provider,
            layout,
            weakness,
            max_retries,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Build, persist and dispatch the per-package prompts, then write the
    /// reconciled `sources.jsonl` and `sinks.jsonl`.
    pub async fn run(&self, records: &[UsageRecord]) -> Result<()> {
        let prompts = build_prompts(records, self.weakness);
        if prompts.is_empty() {
            warn!("No external usage records; writing empty specifications");
            jsonl::write_jsonl::<UsageRecord>(&self.layout.sources_jsonl, &[])?;
            jsonl::write_jsonl::<UsageRecord>(&self.layout.sinks_jsonl, &[])?;
            return Ok(());
        }

        // Prompts land on disk before any network call.
        fs::create_dir_all(&self.layout.usage_prompts_dir)?;
        fs::create_dir_all(&self.layout.spesification_results_dir)?;
        for (idx, prompt) in prompts.iter().enumerate() {
            let path = self
                .layout
                .usage_prompts_dir
                .join(format!("pre_chain_prompt_{}.txt", idx + 1));
            fs::write(path, prompt)?;
        }
        info!(
            "Saved {} prompts to {}",
            prompts.len(),
            self.layout.usage_prompts_dir.display()
        );

        // Bounded-parallel dispatch; response order is irrelevant because
        // every classification carries its chain key.
        let classifications: Vec<Option<HashMap<String, SpecLabel>>> =
            stream::iter(prompts.iter().enumerate())
                .map(|(idx, prompt)| self.classify_prompt(idx + 1, prompt))
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        let mut sources: HashSet<String> = HashSet::new();
        let mut sinks: HashSet<String> = HashSet::new();
        for map in classifications.into_iter().flatten() {
            for (chain, label) in map {
                match label {
                    SpecLabel::Source => {
                        sources.insert(chain);
                    }
                    SpecLabel::Sink => {
                        sinks.insert(chain);
                    }
                    SpecLabel::None => {}
                }
            }
        }

        // Reconcile: unlabeled chains are treated as `none` and dropped.
        let source_records: Vec<UsageRecord> = records
            .iter()
            .filter(|r| sources.contains(&r.chain_text()))
            .cloned()
            .collect();
        let sink_records: Vec<UsageRecord> = records
            .iter()
            .filter(|r| sinks.contains(&r.chain_text()))
            .cloned()
            .collect();

        jsonl::write_jsonl(&self.layout.sources_jsonl, &source_records)?;
        jsonl::write_jsonl(&self.layout.sinks_jsonl, &sink_records)?;
        info!(
            "Wrote {} source and {} sink records",
            source_records.len(),
            sink_records.len()
        );
        Ok(())
    }

    /// Classify one package prompt, retrying on transport and parse
    /// failures. Exhausted retries skip the package with a diagnostic.
    async fn classify_prompt(
        &self,
        index: usize,
        prompt: &str,
    ) -> Option<HashMap<String, SpecLabel>> {
        for attempt in 1..=self.max_retries.max(1) {
            match self.try_classify(prompt).await {
                Ok((map, reasoning)) => {
                    if let Err(e) = self.persist_result(index, &map) {
                        warn!("Failed to persist result for prompt {}: {}", index, e);
                    }
                    if let Some(reasoning) = reasoning {
                        self.append_reasoning(&reasoning);
                    }
                    return Some(map);
                }
                Err(e) => {
                    warn!(
                        "Prompt {} attempt {}/{} failed: {}",
                        index,
                        attempt,
                        self.max_retries.max(1),
                        e
                    );
                    if attempt < self.max_retries.max(1) {
                        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }
        warn!("Skipping prompt {} after exhausted retries", index);
        None
    }

    async fn try_classify(
        &self,
        prompt: &str,
    ) -> anyhow::Result<(HashMap<String, SpecLabel>, Option<String>)> {
        let messages = vec![
            Message::system(PACKAGE_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let response = self
            .provider
            .generate_chat(&messages, &GenerationConfig::json())
            .await?;
        let content = response.content.trim();
        if content.is_empty() {
            anyhow::bail!("empty response");
        }
        let map: HashMap<String, SpecLabel> = serde_json::from_str(content)?;
        Ok((map, response.reasoning))
    }

    /// One JSON object per line, keyed by the exact chain string.
    fn persist_result(&self, index: usize, map: &HashMap<String, SpecLabel>) -> Result<()> {
        let path = self
            .layout
            .spesification_results_dir
            .join(format!("pre_chain_prompt_{}_result.jsonl", index));
        let mut out = fs::File::create(&path)?;
        let mut chains: Vec<&String> = map.keys().collect();
        chains.sort();
        for chain in chains {
            let mut line = serde_json::Map::new();
            line.insert(chain.clone(), serde_json::to_value(map[chain])?);
            serde_json::to_writer(&mut out, &serde_json::Value::Object(line))?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Reasoning text is informational only; failures to log it are not
    /// failures of the stage.
    fn append_reasoning(&self, reasoning: &str) {
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.layout.reasoning_log)
            .and_then(|mut f| {
                let mut text = reasoning.to_string();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                f.write_all(text.as_bytes())
            });
        if let Err(e) = result {
            warn!("Failed to append reasoning log: {}", e);
        }
    }
}

/// Read back the reconciled record files for the predicate writer.
pub fn read_specified_records(path: &std::path::Path) -> Result<Vec<UsageRecord>> {
    if !path.is_file() {
        return Err(TaintFlowError::MissingArtifact(format!(
            "specification file not found: {}",
            path.display()
        )));
    }
    jsonl::read_jsonl(path)
}
