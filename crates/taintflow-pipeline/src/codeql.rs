//! Thin surface over the external CodeQL CLI.
//!
//! The pipeline never computes dataflows itself; it stages the predicate
//! files beside the query pack and shells out to `codeql database analyze`
//! (and optionally `codeql database create`). The engine is an external
//! collaborator and its absence is reported, never fatal for the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use taintflow_core::{Result, TaintFlowError};
use tracing::{info, warn};

const CODEQL_BINARY: &str = "codeql";
const SOURCES_QLL_NAME: &str = "TestSources.qll";
const SINKS_QLL_NAME: &str = "TestSinks.qll";

pub struct CodeQlRunner {
    pub db_path: PathBuf,
    pub query_pack_dir: PathBuf,
}

impl CodeQlRunner {
    pub fn new(db_path: PathBuf, query_pack_dir: PathBuf) -> Self {
        Self {
            db_path,
            query_pack_dir,
        }
    }

    pub fn database_exists(&self) -> bool {
        self.db_path.exists()
    }

    /// `codeql database create --language=python`.
    pub fn create_database(&self, project_root: &Path) -> Result<()> {
        info!(
            "Creating CodeQL database at {} from {}",
            self.db_path.display(),
            project_root.display()
        );
        let status = Command::new(CODEQL_BINARY)
            .arg("database")
            .arg("create")
            .arg(&self.db_path)
            .arg("--language=python")
            .arg(format!("--source-root={}", project_root.display()))
            .arg("--overwrite")
            .status()?;
        if !status.success() {
            return Err(TaintFlowError::ExternalTool(format!(
                "codeql database create exited with {}",
                status
            )));
        }
        Ok(())
    }

    /// Stage fresh predicate files beside the query pack, replacing any
    /// stale copies from a previous project.
    pub fn install_predicates(&self, sources_qll: &Path, sinks_qll: &Path) -> Result<()> {
        for (input, name) in [(sources_qll, SOURCES_QLL_NAME), (sinks_qll, SINKS_QLL_NAME)] {
            if !input.is_file() {
                return Err(TaintFlowError::MissingArtifact(format!(
                    "{} not found at {}",
                    name,
                    input.display()
                )));
            }
        }
        for name in [SOURCES_QLL_NAME, SINKS_QLL_NAME] {
            let stale = self.query_pack_dir.join(name);
            if stale.exists() {
                if let Err(e) = fs::remove_file(&stale) {
                    warn!("Failed to delete stale {}: {}", stale.display(), e);
                }
            }
        }
        fs::copy(sources_qll, self.query_pack_dir.join(SOURCES_QLL_NAME))?;
        fs::copy(sinks_qll, self.query_pack_dir.join(SINKS_QLL_NAME))?;
        Ok(())
    }

    /// `codeql database analyze`, once for SARIF and once for CSV.
    pub fn run_query(&self, sarif_out: &Path, csv_out: &Path) -> Result<()> {
        self.analyze("sarif-latest", sarif_out)?;
        self.analyze("csv", csv_out)?;
        Ok(())
    }

    fn analyze(&self, format: &str, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(
            "Running codeql database analyze ({}) into {}",
            format,
            output.display()
        );
        let status = Command::new(CODEQL_BINARY)
            .arg("database")
            .arg("analyze")
            .arg(&self.db_path)
            .arg(&self.query_pack_dir)
            .arg(format!("--format={}", format))
            .arg(format!("--output={}", output.display()))
            .arg("--rerun")
            .status()?;
        if !status.success() {
            return Err(TaintFlowError::ExternalTool(format!(
                "codeql database analyze exited with {}",
                status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_requires_both_predicate_files() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CodeQlRunner::new(dir.path().join("db"), dir.path().to_path_buf());
        let sources = dir.path().join("TestSources.src.qll");
        let sinks = dir.path().join("TestSinks.src.qll");
        fs::write(&sources, "import python\n").unwrap();

        let err = runner.install_predicates(&sources, &sinks).unwrap_err();
        assert!(matches!(err, TaintFlowError::MissingArtifact(_)));

        fs::write(&sinks, "import python\n").unwrap();
        runner.install_predicates(&sources, &sinks).unwrap();
        assert!(dir.path().join("TestSources.qll").is_file());
        assert!(dir.path().join("TestSinks.qll").is_file());
    }

    #[test]
    fn database_existence_probe() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CodeQlRunner::new(dir.path().join("missing-db"), dir.path().to_path_buf());
        assert!(!runner.database_exists());
    }
}
