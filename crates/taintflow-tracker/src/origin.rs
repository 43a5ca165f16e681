//! Package origin classification.
//!
//! Decides, for each top-level name imported anywhere in the project,
//! whether it is internal (lives under the project root) or external. The
//! internal set feeds the filter that keeps only externally-rooted usage
//! records.

use crate::file_collect::{collect_python_files, read_lossy, relative_slash_path};
use crate::parser::parse_python;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use taintflow_core::{jsonl, Result, UsageRecord};
use tracing::{info, warn};
use tree_sitter::Node;

#[derive(Debug, Serialize, Deserialize)]
struct OriginLine {
    #[serde(rename = "type")]
    kind: String,
    imports: Vec<String>,
}

/// First path segment of every `.py` file under the root; these names can
/// never be external.
pub fn discover_internal_modules(root: &Path) -> Result<BTreeSet<String>> {
    let mut internal = BTreeSet::new();
    for path in collect_python_files(root)? {
        let rel = relative_slash_path(root, &path);
        let first = rel.split('/').next().unwrap_or(&rel);
        let module = first.strip_suffix(".py").unwrap_or(first);
        if !module.is_empty() {
            internal.insert(module.to_string());
        }
    }
    Ok(internal)
}

fn classify(top: &str, internal_modules: &BTreeSet<String>, root: &Path) -> bool {
    if internal_modules.contains(top) {
        return true;
    }
    // Resolver probe: a module that resolves to a file under the project
    // root is internal even when the path-segment scan missed it.
    root.join(format!("{}.py", top)).is_file() || root.join(top).join("__init__.py").is_file()
}

/// Scan every import statement under `root` and split the top-level names
/// into internal and external sets.
pub fn find_imports(root: &Path) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
    let internal_modules = discover_internal_modules(root)?;
    let mut internal = BTreeSet::new();
    let mut external = BTreeSet::new();

    for path in collect_python_files(root)? {
        let source = match read_lossy(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };
        let tree = match parse_python(&source) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping unparseable file {}: {}", path.display(), e);
                continue;
            }
        };
        scan_imports(
            tree.root_node(),
            &source,
            &internal_modules,
            root,
            &mut internal,
            &mut external,
        );
    }
    Ok((internal, external))
}

fn scan_imports(
    node: Node,
    source: &str,
    internal_modules: &BTreeSet<String>,
    root: &Path,
    internal: &mut BTreeSet<String>,
    external: &mut BTreeSet<String>,
) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name_node in node.children_by_field_name("name", &mut cursor) {
                let dotted = match name_node.kind() {
                    "dotted_name" => Some(name_node),
                    "aliased_import" => name_node.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(dotted) = dotted {
                    let text = dotted.utf8_text(source.as_bytes()).unwrap_or("");
                    if let Some(top) = text.split('.').next().filter(|t| !t.is_empty()) {
                        if classify(top, internal_modules, root) {
                            internal.insert(top.to_string());
                        } else {
                            external.insert(top.to_string());
                        }
                    }
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                match module.kind() {
                    "relative_import" => {
                        // Relative imports are internal regardless of what
                        // the resolver would say.
                        let mut cursor = module.walk();
                        for child in module.named_children(&mut cursor) {
                            if child.kind() == "dotted_name" {
                                let text = child.utf8_text(source.as_bytes()).unwrap_or("");
                                if let Some(top) =
                                    text.split('.').next().filter(|t| !t.is_empty())
                                {
                                    internal.insert(top.to_string());
                                }
                            }
                        }
                    }
                    "dotted_name" => {
                        let text = module.utf8_text(source.as_bytes()).unwrap_or("");
                        if let Some(top) = text.split('.').next().filter(|t| !t.is_empty()) {
                            if classify(top, internal_modules, root) {
                                internal.insert(top.to_string());
                            } else {
                                external.insert(top.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        scan_imports(child, source, internal_modules, root, internal, external);
    }
}

/// Write the two-line origin report: one line of internal names, one of
/// external names, each sorted.
pub fn write_origin_file(root: &Path, output: &Path) -> Result<()> {
    let (internal, external) = find_imports(root)?;
    let lines = vec![
        OriginLine {
            kind: "internal".to_string(),
            imports: internal.into_iter().collect(),
        },
        OriginLine {
            kind: "external".to_string(),
            imports: external.into_iter().collect(),
        },
    ];
    jsonl::write_jsonl(output, &lines)?;
    info!("Wrote package origin report to {}", output.display());
    Ok(())
}

/// Internal package names recorded in an origin report.
pub fn load_internal_set(origin_path: &Path) -> Result<HashSet<String>> {
    let lines: Vec<OriginLine> = jsonl::read_jsonl(origin_path)?;
    let mut internal = HashSet::new();
    for line in lines {
        if line.kind == "internal" {
            internal.extend(line.imports);
        }
    }
    Ok(internal)
}

/// Drop records whose package is internal; the remainder is the
/// specification input.
pub fn filter_external_records(
    records: Vec<UsageRecord>,
    internal: &HashSet<String>,
) -> Vec<UsageRecord> {
    records
        .into_iter()
        .filter(|r| !internal.contains(&r.package))
        .collect()
}

/// Read raw usage records, drop internal packages, write the external set.
pub fn write_external_usages(
    raw_path: &Path,
    origin_path: &Path,
    output: &Path,
) -> Result<usize> {
    let internal = load_internal_set(origin_path)?;
    let records: Vec<UsageRecord> = jsonl::read_jsonl(raw_path)?;
    let external = filter_external_records(records, &internal);
    jsonl::write_jsonl(output, &external)?;
    info!(
        "Wrote {} externally-rooted usage records to {}",
        external.len(),
        output.display()
    );
    Ok(external.len())
}
