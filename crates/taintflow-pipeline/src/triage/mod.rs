pub mod flows;
pub mod paths;
pub mod triager;

pub use flows::{find_blocks, is_import_line, parse_thread_flow, FlowLocation};
pub use paths::resolve_artifact_uri;
pub use triager::{FlowTriager, TriageSummary};
