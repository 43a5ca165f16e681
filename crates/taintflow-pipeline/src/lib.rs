pub mod codeql;
pub mod layout;
pub mod orchestrator;
pub mod spec;
pub mod triage;

pub use codeql::CodeQlRunner;
pub use layout::{clear_directory, copy_run_artifacts, ProjectLayout};
pub use orchestrator::Orchestrator;
pub use spec::SpecificationSynthesizer;
pub use triage::{FlowTriager, TriageSummary};
