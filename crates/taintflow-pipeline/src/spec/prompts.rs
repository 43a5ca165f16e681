//! Prompt construction for the specification stage.
//!
//! Usage records are grouped by package; each package gets one prompt
//! listing its unique chains, one per line, space-joined. The `built_in`
//! pseudo-package uses a distinct template that tells the model to classify
//! unfamiliar names as `none`.

use std::collections::HashMap;
use taintflow_core::{UsageRecord, Weakness, BUILT_IN_PACKAGE};

pub const PACKAGE_SYSTEM_PROMPT: &str = r#"You are an application security assistant. Help the user identify which of these library usages are potential sources and sinks in vulnerable dataflows, and output them in JSON format.

EXAMPLE INPUT:
You are going to analyze the usage of the package foo.
Define which of the following nodes can be a Source, Sink or none for the weakness CWE 89 (SQL injection):
foo bar
foo baz
foo qux

EXAMPLE JSON OUTPUT:
{
  "foo bar": "none",
  "foo baz": "sink",
  "foo qux": "source"
}
"#;

fn package_prompt(package: &str, weakness: Weakness, body: &str) -> String {
    format!(
        "You are going to analyze the usage of the package {package}.\n\
         You will be supplied with function calls, arguments and attributes that were imported \
         from the {package} library and used in a program.\n\
         Your job is to decide which of these nodes can be a Source, a Sink or none for the \
         weakness {cwe} ({title}).\n\
         A source is a place where malicious data can enter the program.\n\
         A sink is a dangerous operation that, when executed with malicious data, makes the \
         vulnerability present.\n\n\
         Reply in JSON with either source, sink or none for each of these usages:\n\
         {body}\n",
        package = package,
        cwe = weakness,
        title = weakness.title(),
        body = body
    )
}

fn builtin_prompt(weakness: Weakness, body: &str) -> String {
    format!(
        "You are going to analyze the usage of built-in Python functions and other built-in nodes.\n\
         You will be supplied with function calls, arguments and attributes that were never \
         imported but are used in a Python program.\n\
         Keep in mind that there may have been errors upstream: if you see a node you do not \
         recognize as a built-in Python node, it likely comes from another part of the system, \
         and you can safely classify it as \"none\".\n\
         Your job is to decide which of these nodes can be a Source, a Sink or none for the \
         weakness {cwe} ({title}).\n\
         A source is a place where malicious data can enter the program.\n\
         A sink is a dangerous operation that, when executed with malicious data, makes the \
         vulnerability present.\n\n\
         Reply in JSON with either source, sink or none for each of these usages:\n\
         {body}\n",
        cwe = weakness,
        title = weakness.title(),
        body = body
    )
}

/// Unique space-joined chains per package, both in first-seen order.
pub fn group_chains(records: &[UsageRecord]) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_package: HashMap<String, Vec<String>> = HashMap::new();
    for record in records {
        let chains = match by_package.get_mut(&record.package) {
            Some(chains) => chains,
            None => {
                order.push(record.package.clone());
                by_package.entry(record.package.clone()).or_default()
            }
        };
        let chain_text = record.chain_text();
        if !chains.contains(&chain_text) {
            chains.push(chain_text);
        }
    }
    order
        .into_iter()
        .map(|pkg| {
            let chains = by_package.remove(&pkg).unwrap_or_default();
            (pkg, chains)
        })
        .collect()
}

/// One rendered prompt per package.
pub fn build_prompts(records: &[UsageRecord], weakness: Weakness) -> Vec<String> {
    group_chains(records)
        .into_iter()
        .map(|(package, chains)| {
            let body = chains.join("\n");
            if package == BUILT_IN_PACKAGE {
                builtin_prompt(weakness, &body)
            } else {
                package_prompt(&package, weakness, &body)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taintflow_core::UsageKind;

    fn record(package: &str, chain: &[&str]) -> UsageRecord {
        UsageRecord {
            file: "app.py".into(),
            lineno: 1,
            col: 0,
            node_type: UsageKind::Call,
            chain: chain.iter().map(|s| s.to_string()).collect(),
            package: package.into(),
            code: String::new(),
            tags: vec![package.into()],
            call_id: Some(1),
            arg_pos: None,
            kw_name: None,
            expr_chain: None,
            name: None,
        }
    }

    #[test]
    fn grouping_preserves_insertion_order_and_dedups() {
        let records = vec![
            record("flask", &["flask", "request", "form"]),
            record("sqlite3", &["sqlite3", "connect"]),
            record("flask", &["flask", "request", "form"]),
            record("flask", &["flask", "Flask"]),
        ];
        let grouped = group_chains(&records);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "flask");
        assert_eq!(
            grouped[0].1,
            vec!["flask request form".to_string(), "flask Flask".to_string()]
        );
        assert_eq!(grouped[1].0, "sqlite3");
    }

    #[test]
    fn builtin_package_uses_the_dedicated_template() {
        let records = vec![
            record("built_in", &["built_in", "eval"]),
            record("sqlite3", &["sqlite3", "connect"]),
        ];
        let prompts = build_prompts(&records, Weakness::Cwe94);
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("built-in Python functions"));
        assert!(prompts[0].contains("built_in eval"));
        assert!(prompts[1].contains("the package sqlite3"));
    }

    #[test]
    fn prompt_names_the_weakness() {
        let records = vec![record("sqlite3", &["sqlite3", "connect"])];
        let prompts = build_prompts(&records, Weakness::Cwe89);
        assert!(prompts[0].contains("cwe89"));
        assert!(prompts[0].contains("SQL injection"));
    }
}
