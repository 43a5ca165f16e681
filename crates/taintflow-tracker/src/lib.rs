pub mod builtins;
pub mod file_collect;
pub mod origin;
pub mod parser;
pub mod tracker;

pub use file_collect::{collect_python_files, read_lossy, relative_slash_path};
pub use origin::{
    discover_internal_modules, filter_external_records, find_imports, load_internal_set,
    write_external_usages, write_origin_file,
};
pub use tracker::{analyze_project, analyze_project_to_file, track_file};

#[cfg(test)]
mod tests;
