//! Predicate materialization.
//!
//! Turns the reconciled source/sink records into two CodeQL library files
//! the structural engine imports. Each predicate body is a disjunction of
//! concrete location fragments in input order; an empty list reduces to a
//! tautologically-false body so downstream parsing never fails.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use taintflow_core::{Result, UsageKind, UsageRecord};
use tracing::{info, warn};

/// Escape a string that will be embedded inside a `.matches("%...%")`
/// wildcard pattern: `%` and `_` are wildcards there, and the string itself
/// is quoted.
fn escape_match_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

fn call_fragment(var: &str, file: &str, line: usize, name: &str) -> String {
    format!(
        "  (\n    {var}.getLocation().getFile().getAbsolutePath().matches(\"%{file}%\") and\n    \
         {var}.getLocation().getStartLine() = {line} and\n    \
         {var}.getFunc() instanceof Attribute and\n    \
         {var}.getFunc().(Attribute).getName().matches(\"{name}\")\n  )",
        var = var,
        file = escape_match_pattern(file),
        line = line,
        name = escape_match_pattern(name),
    )
}

fn attr_fragment(file: &str, line: usize, name: &str) -> String {
    format!(
        "  (\n    attr.getLocation().getFile().getAbsolutePath().matches(\"%{file}%\") and\n    \
         attr.getLocation().getStartLine() = {line} and\n    \
         attr.(Attribute).getName().matches(\"{name}\")\n  )",
        file = escape_match_pattern(file),
        line = line,
        name = escape_match_pattern(name),
    )
}

fn param_fragment(file: &str, line: usize, name: &str) -> String {
    format!(
        "  (\n    param.getLocation().getFile().getAbsolutePath().matches(\"%{file}%\") and\n    \
         param.getLocation().getStartLine() = {line} and\n    \
         param.getName().matches(\"{name}\")\n  )",
        file = escape_match_pattern(file),
        line = line,
        name = escape_match_pattern(name),
    )
}

fn arg_fragment(
    file: &str,
    line: usize,
    call_line: usize,
    call_name: &str,
    arg_pos: usize,
) -> String {
    let file = escape_match_pattern(file);
    format!(
        "  (\n    expr.getLocation().getFile().getAbsolutePath().matches(\"%{file}%\") and\n    \
         expr.getLocation().getStartLine() = {line} and\n    \
         exists(Call call |\n      \
         call.getLocation().getFile().getAbsolutePath().matches(\"%{file}%\") and\n      \
         call.getLocation().getStartLine() = {call_line} and\n      \
         call.getFunc().(Attribute).getName().matches(\"{call_name}\") and\n      \
         expr = call.getArg({arg_pos})\n    )\n  )",
        file = file,
        line = line,
        call_line = call_line,
        call_name = escape_match_pattern(call_name),
        arg_pos = arg_pos,
    )
}

fn join_or(fragments: Vec<String>) -> String {
    if fragments.is_empty() {
        "  1 = 0".to_string()
    } else {
        fragments.join(" or\n")
    }
}

/// Render the three source predicates over call sites, attribute reads and
/// parameter definitions.
pub fn create_source_predicates(records: &[UsageRecord]) -> String {
    let mut call_fragments = Vec::new();
    let mut attr_fragments = Vec::new();
    let mut param_fragments = Vec::new();

    for record in records {
        match record.node_type {
            UsageKind::Call => call_fragments.push(call_fragment(
                "call",
                &record.file,
                record.lineno,
                record.terminal_name(),
            )),
            UsageKind::Attribute => attr_fragments.push(attr_fragment(
                &record.file,
                record.lineno,
                record.terminal_name(),
            )),
            UsageKind::Param => {
                if let Some(name) = record.name.as_deref() {
                    param_fragments.push(param_fragment(&record.file, record.lineno, name));
                }
            }
            _ => {}
        }
    }

    format!(
        "import python\n\n\
         predicate isLLMDetectedAttrSource(Attribute attr) {{\n{attrs}\n}}\n\n\
         predicate isLLMDetectedCallSource(Call call) {{\n{calls}\n}}\n\n\
         predicate isLLMDetectedParamSource(Parameter param) {{\n{params}\n}}\n",
        attrs = join_or(attr_fragments),
        calls = join_or(call_fragments),
        params = join_or(param_fragments),
    )
}

/// Render the two sink predicates over call sites and argument expressions.
/// The argument predicate binds the owning call by its `(file, call_id)`
/// record so the fragment matches both the argument's line and its position
/// within a named call at a specific line.
pub fn create_sink_predicates(records: &[UsageRecord]) -> String {
    let calls_by_id: HashMap<(&str, u64), &UsageRecord> = records
        .iter()
        .filter(|r| r.node_type == UsageKind::Call)
        .filter_map(|r| r.call_id.map(|id| ((r.file.as_str(), id), r)))
        .collect();

    let mut call_fragments = Vec::new();
    let mut arg_fragments = Vec::new();

    for record in records {
        match record.node_type {
            UsageKind::Call => call_fragments.push(call_fragment(
                "call",
                &record.file,
                record.lineno,
                record.terminal_name(),
            )),
            UsageKind::Arg => {
                let (Some(call_id), Some(arg_pos)) = (record.call_id, record.arg_pos) else {
                    continue;
                };
                let Some(owner) = calls_by_id.get(&(record.file.as_str(), call_id)) else {
                    warn!(
                        "No owning call record for arg at {}:{} (call_id {})",
                        record.file, record.lineno, call_id
                    );
                    continue;
                };
                arg_fragments.push(arg_fragment(
                    &record.file,
                    record.lineno,
                    owner.lineno,
                    owner.terminal_name(),
                    arg_pos,
                ));
            }
            _ => {}
        }
    }

    format!(
        "import python\n\n\
         predicate isLLMDetectedSinkFunctionCall(Call call) {{\n{calls}\n}}\n\n\
         predicate isLLMDetectedSinkFunctionArg(Expr expr) {{\n{args}\n}}\n",
        calls = join_or(call_fragments),
        args = join_or(arg_fragments),
    )
}

/// Write both predicate files.
pub fn write_predicate_files(
    source_records: &[UsageRecord],
    sink_records: &[UsageRecord],
    sources_qll: &Path,
    sinks_qll: &Path,
) -> Result<()> {
    if let Some(parent) = sources_qll.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(sources_qll, create_source_predicates(source_records))?;
    fs::write(sinks_qll, create_sink_predicates(sink_records))?;
    info!(
        "Wrote predicate files {} and {}",
        sources_qll.display(),
        sinks_qll.display()
    );
    Ok(())
}
