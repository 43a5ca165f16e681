//! Flow triage.
//!
//! Reconstructs a readable source → steps → sink narrative for every SARIF
//! thread flow, asks the model once per flow whether the flow is truly
//! vulnerable, and rewrites the SARIF keeping only the flows judged
//! vulnerable. Results whose codeFlows become empty stay in the output with
//! empty thread flows so SARIF structure is preserved.

use crate::triage::flows::{
    extract_snippet, find_blocks, is_import_line, parse_thread_flow, primary_line, render_block,
    FlowLocation,
};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taintflow_ai::{GenerationConfig, LlmProvider, Message};
use taintflow_core::{Result, TaintFlowError, Weakness};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
struct FlowJudgement {
    judgement: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TriageSummary {
    pub total_flows: usize,
    pub kept_flows: usize,
}

pub struct FlowTriager {
    project_root: PathBuf,
    sarif_path: PathBuf,
    output_path: PathBuf,
    prompt_dir: PathBuf,
    results_dir: PathBuf,
    weakness: Weakness,
    gap_limit: usize,
    context_lines: usize,
    max_retries: u32,
    provider: Arc<dyn LlmProvider>,
}

fn flow_system_prompt(weakness: Weakness) -> String {
    format!(
        "You are an application security assistant. Help the user decide whether this dataflow \
         is truly vulnerable to {cwe} ({title}) or not.\n\
         Look for possible sanitizers on the dataflow. {cwe} is commonly prevented by {hint}.\n\
         Reply with yes if the dataflow is vulnerable and no if it is not, provide a reason for \
         your judgement, and output them in JSON format.\n\n\
         EXAMPLE JSON OUTPUT:\n\
         {{\n  \"judgement\": \"yes\",\n  \"reason\": \"Malicious input can reach the sink \
         without being neutralized; no instance of {hint} takes place on this dataflow.\"\n}}\n",
        cwe = weakness,
        title = weakness.title(),
        hint = weakness.sanitizer_hint(),
    )
}

impl FlowTriager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_root: PathBuf,
        sarif_path: PathBuf,
        output_path: PathBuf,
        prompt_dir: PathBuf,
        results_dir: PathBuf,
        weakness: Weakness,
        gap_limit: usize,
        context_lines: usize,
        max_retries: u32,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            project_root,
            sarif_path,
            output_path,
            prompt_dir,
            results_dir,
            weakness,
            gap_limit,
            context_lines,
            max_retries,
            provider,
        }
    }

    /// Judge every thread flow and write the filtered SARIF. Flows are
    /// processed sequentially to bound request concurrency and keep
    /// on-disk prompt/result filenames deterministic.
    pub async fn triage(&self) -> Result<TriageSummary> {
        let text = fs::read_to_string(&self.sarif_path)?;
        let mut data: Value = serde_json::from_str(&text)
            .map_err(|e| TaintFlowError::Sarif(format!("malformed SARIF: {}", e)))?;

        fs::create_dir_all(&self.prompt_dir)?;
        fs::create_dir_all(&self.results_dir)?;

        let run = data
            .get_mut("runs")
            .and_then(Value::as_array_mut)
            .and_then(|runs| runs.first_mut())
            .ok_or_else(|| TaintFlowError::Sarif("SARIF has no runs".to_string()))?;

        let mut summary = TriageSummary::default();
        let mut flow_counter = 0usize;

        let results = run
            .get_mut("results")
            .and_then(Value::as_array_mut)
            .map(std::mem::take)
            .unwrap_or_default();

        let mut rewritten_results = Vec::with_capacity(results.len());
        for mut result in results {
            if let Some(code_flows) = result.get_mut("codeFlows").and_then(Value::as_array_mut) {
                for code_flow in code_flows.iter_mut() {
                    let thread_flows = code_flow
                        .get_mut("threadFlows")
                        .and_then(Value::as_array_mut)
                        .map(std::mem::take)
                        .unwrap_or_default();

                    let mut kept = Vec::new();
                    for thread_flow in thread_flows {
                        let verdict = self.judge_thread_flow(flow_counter, &thread_flow).await?;
                        summary.total_flows += 1;
                        if verdict {
                            summary.kept_flows += 1;
                            kept.push(thread_flow);
                        }
                        flow_counter += 1;
                    }
                    code_flow["threadFlows"] = Value::Array(kept);
                }
            }
            rewritten_results.push(result);
        }
        if let Some(slot) = run.get_mut("results") {
            *slot = Value::Array(rewritten_results);
        }

        fs::write(&self.output_path, serde_json::to_string_pretty(&data)?)?;
        info!(
            "Kept {}/{} flows; wrote {}",
            summary.kept_flows,
            summary.total_flows,
            self.output_path.display()
        );
        Ok(summary)
    }

    async fn judge_thread_flow(&self, flow_id: usize, thread_flow: &Value) -> Result<bool> {
        let locations = parse_thread_flow(thread_flow, &self.project_root)?;
        if locations.is_empty() {
            warn!("flow_{} has no locations; dropping", flow_id);
            return Ok(false);
        }
        let prompt = self.build_prompt(&locations);

        let prompt_path = self.prompt_dir.join(format!("flow_{}.txt", flow_id));
        if let Err(e) = fs::write(&prompt_path, &prompt) {
            warn!("Failed to save prompt {}: {}", prompt_path.display(), e);
        }

        let judgement = self.ask_model(flow_id, &prompt).await;
        self.persist_judgement(flow_id, &judgement);
        Ok(judgement.judgement.eq_ignore_ascii_case("yes"))
    }

    /// Assemble `[SOURCE] ... [STEP i] ... [SINK] ...` plus the question.
    fn build_prompt(&self, locations: &[FlowLocation]) -> String {
        // Import statements contribute noise without semantic value; if
        // filtering empties the flow, fall back to the unfiltered list.
        let filtered: Vec<&FlowLocation> = locations
            .iter()
            .filter(|loc| !is_import_line(&primary_line(loc)))
            .collect();
        let filtered: Vec<&FlowLocation> = if filtered.is_empty() {
            debug!("flow contained only import lines; keeping them");
            locations.iter().collect()
        } else {
            filtered
        };

        let mut parts: Vec<String> = Vec::new();

        let source = filtered[0];
        parts.push(format!(
            "[SOURCE] {}:{}\n{}",
            source.uri,
            source.start_line,
            extract_snippet(source, self.context_lines, self.context_lines)
        ));

        if filtered.len() > 2 {
            let steps: Vec<FlowLocation> = filtered[1..filtered.len() - 1]
                .iter()
                .map(|loc| (*loc).clone())
                .collect();
            for (idx, block) in find_blocks(&steps, self.gap_limit).iter().enumerate() {
                if let Some(first) = block.first() {
                    parts.push(format!(
                        "[STEP {}] {}:{}\n{}",
                        idx + 1,
                        first.uri,
                        first.start_line,
                        render_block(block, 1)
                    ));
                }
            }
        }

        let sink = filtered[filtered.len() - 1];
        parts.push(format!(
            "[SINK] {}:{}\n{}",
            sink.uri,
            sink.start_line,
            extract_snippet(sink, self.context_lines, self.context_lines)
        ));

        let mut prompt = parts.join("\n");
        prompt.push_str(&format!(
            "\nQuestion: Is this dataflow vulnerable to {} ({})? Answer yes or no.\n",
            self.weakness,
            self.weakness.title()
        ));
        prompt
    }

    /// One model call per flow, retrying parse failures; exhausted retries
    /// drop the flow with a `none` judgement.
    async fn ask_model(&self, flow_id: usize, prompt: &str) -> FlowJudgement {
        let system = flow_system_prompt(self.weakness);
        let messages = vec![Message::system(system), Message::user(prompt)];

        for attempt in 1..=self.max_retries.max(1) {
            let response = self
                .provider
                .generate_chat(&messages, &GenerationConfig::json())
                .await;
            match response {
                Ok(response) => {
                    let content = response.content.trim();
                    if content.is_empty() {
                        warn!("flow_{} attempt {}: empty response", flow_id, attempt);
                    } else {
                        match serde_json::from_str::<FlowJudgement>(content) {
                            Ok(judgement) => return judgement,
                            Err(e) => {
                                warn!("flow_{} attempt {}: bad judgement JSON: {}", flow_id, attempt, e)
                            }
                        }
                    }
                }
                Err(e) => warn!("flow_{} attempt {}: {}", flow_id, attempt, e),
            }
            if attempt < self.max_retries.max(1) {
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }
        }
        warn!("flow_{}: exhausted retries; dropping flow", flow_id);
        FlowJudgement {
            judgement: "none".to_string(),
            reason: Some("no parseable judgement from the model".to_string()),
        }
    }

    /// One raw judgement JSON line per flow.
    fn persist_judgement(&self, flow_id: usize, judgement: &FlowJudgement) {
        let path = self.results_dir.join(format!("flow_{}.txt", flow_id));
        let line = serde_json::json!({
            "judgement": judgement.judgement,
            "reason": judgement.reason,
        });
        let result = fs::File::create(&path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!("Failed to persist judgement {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taintflow_ai::{LlmResponse, LlmResult};

    #[derive(Debug)]
    struct FixedProvider {
        content: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                content: self.content.clone(),
                reasoning: None,
                model: "fixed".to_string(),
                total_tokens: None,
                finish_reason: Some("stop".to_string()),
            })
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn sarif_with_one_flow(uri: &str) -> Value {
        serde_json::json!({
            "version": "2.1.0",
            "runs": [{
                "results": [{
                    "ruleId": "llm-taint-flow",
                    "codeFlows": [{
                        "threadFlows": [{
                            "locations": [
                                {"location": {"physicalLocation": {
                                    "artifactLocation": {"uri": uri},
                                    "region": {"startLine": 2}
                                }}},
                                {"location": {"physicalLocation": {
                                    "artifactLocation": {"uri": uri},
                                    "region": {"startLine": 4}
                                }}}
                            ]
                        }]
                    }]
                }]
            }]
        })
    }

    fn triager_in(dir: &std::path::Path, content: &str) -> FlowTriager {
        FlowTriager::new(
            dir.to_path_buf(),
            dir.join("query.sarif"),
            dir.join("filtered.sarif"),
            dir.join("prompts"),
            dir.join("results"),
            Weakness::Cwe89,
            1,
            2,
            1,
            Arc::new(FixedProvider {
                content: content.to_string(),
            }),
        )
    }

    fn write_fixture(dir: &std::path::Path) {
        fs::write(
            dir.join("app.py"),
            "import sqlite3\nname = input()\nconn = sqlite3.connect('db')\nconn.execute(name)\n",
        )
        .unwrap();
        fs::write(
            dir.join("query.sarif"),
            serde_json::to_string_pretty(&sarif_with_one_flow("app.py")).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn vulnerable_flows_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let triager = triager_in(
            dir.path(),
            r#"{"judgement": "yes", "reason": "no sanitizer on the path"}"#,
        );

        let summary = triager.triage().await.unwrap();
        assert_eq!(summary.total_flows, 1);
        assert_eq!(summary.kept_flows, 1);

        let filtered: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("filtered.sarif")).unwrap())
                .unwrap();
        let flows = filtered
            .pointer("/runs/0/results/0/codeFlows/0/threadFlows")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(flows.len(), 1);

        assert!(dir.path().join("prompts/flow_0.txt").is_file());
        let raw = fs::read_to_string(dir.path().join("results/flow_0.txt")).unwrap();
        assert!(raw.contains("\"judgement\":\"yes\""));
    }

    #[tokio::test]
    async fn benign_flows_are_dropped_but_results_remain() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let triager = triager_in(
            dir.path(),
            r#"{"judgement": "no", "reason": "parameterized query"}"#,
        );

        let summary = triager.triage().await.unwrap();
        assert_eq!(summary.kept_flows, 0);

        let filtered: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("filtered.sarif")).unwrap())
                .unwrap();
        // The result survives with an emptied threadFlows array.
        let results = filtered
            .pointer("/runs/0/results")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(results.len(), 1);
        let flows = filtered
            .pointer("/runs/0/results/0/codeFlows/0/threadFlows")
            .and_then(Value::as_array)
            .unwrap();
        assert!(flows.is_empty());
    }

    #[tokio::test]
    async fn triage_is_idempotent_on_an_already_filtered_sarif() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let triager = triager_in(
            dir.path(),
            r#"{"judgement": "no", "reason": "sanitized"}"#,
        );
        triager.triage().await.unwrap();

        // Re-run the triager on its own output.
        let once = fs::read_to_string(dir.path().join("filtered.sarif")).unwrap();
        fs::copy(
            dir.path().join("filtered.sarif"),
            dir.path().join("query.sarif"),
        )
        .unwrap();
        triager.triage().await.unwrap();
        let twice = fs::read_to_string(dir.path().join("filtered.sarif")).unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn unparseable_judgements_drop_the_flow() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let triager = triager_in(dir.path(), "maybe?");

        let summary = triager.triage().await.unwrap();
        assert_eq!(summary.kept_flows, 0);
        let raw = fs::read_to_string(dir.path().join("results/flow_0.txt")).unwrap();
        assert!(raw.contains("\"judgement\":\"none\""));
    }

    #[tokio::test]
    async fn malformed_sarif_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("query.sarif"), "not json at all").unwrap();
        let triager = triager_in(dir.path(), r#"{"judgement": "yes"}"#);
        let err = triager.triage().await.unwrap_err();
        assert!(matches!(err, TaintFlowError::Sarif(_)));
    }

    #[test]
    fn prompt_labels_source_steps_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app.py"),
            (1..=30)
                .map(|i| format!("line_{} = {}\n", i, i))
                .collect::<String>(),
        )
        .unwrap();
        let triager = triager_in(dir.path(), "{}");
        let mk = |line: usize| FlowLocation {
            uri: "app.py".to_string(),
            path: dir.path().join("app.py"),
            start_line: line,
            end_line: line,
        };
        let locations: Vec<FlowLocation> =
            [2, 10, 11, 20, 21, 22, 28].iter().map(|&l| mk(l)).collect();
        let prompt = triager.build_prompt(&locations);

        assert!(prompt.contains("[SOURCE] app.py:2"));
        // gap_limit 1 keeps 10,11 together and 20,21,22 together.
        assert!(prompt.contains("[STEP 1] app.py:10"));
        assert!(prompt.contains("[STEP 2] app.py:20"));
        assert!(prompt.contains("[SINK] app.py:28"));
        assert!(prompt.contains("Question: Is this dataflow vulnerable to cwe89"));
    }
}
