pub mod predicates;
pub mod prompts;
pub mod synthesizer;

pub use predicates::{create_sink_predicates, create_source_predicates, write_predicate_files};
pub use prompts::{build_prompts, group_chains};
pub use synthesizer::SpecificationSynthesizer;
