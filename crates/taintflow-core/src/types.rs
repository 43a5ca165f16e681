use serde::{Deserialize, Serialize};
use std::fmt;

/// Package label used for records whose chain is rooted at a Python builtin
/// rather than an imported package.
pub const BUILT_IN_PACKAGE: &str = "built_in";

/// Syntactic shape of an observed use of an externally-rooted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageKind {
    Call,
    Attribute,
    #[serde(rename = "param")]
    Param,
    #[serde(rename = "arg")]
    Arg,
    #[serde(rename = "arg_starred")]
    ArgStarred,
    #[serde(rename = "kwarg")]
    Kwarg,
    #[serde(rename = "kwarg_doublestar")]
    KwargDoublestar,
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UsageKind::Call => "Call",
            UsageKind::Attribute => "Attribute",
            UsageKind::Param => "param",
            UsageKind::Arg => "arg",
            UsageKind::ArgStarred => "arg_starred",
            UsageKind::Kwarg => "kwarg",
            UsageKind::KwargDoublestar => "kwarg_doublestar",
        };
        write!(f, "{}", s)
    }
}

/// One observed use of an externally-rooted name: a call site, an attribute
/// read, a decorated-handler parameter, or a call argument/keyword.
///
/// Lines are 1-based, columns 0-based. `chain` is rooted at the originating
/// package (or `built_in`), and `tags` always contains `package`. Argument
/// and keyword records carry the `call_id` of the owning call record in the
/// same file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub file: String,
    pub lineno: usize,
    pub col: usize,
    pub node_type: UsageKind,
    pub chain: Vec<String>,
    pub package: String,
    pub code: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_pos: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kw_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr_chain: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UsageRecord {
    /// Space-joined chain, the key under which this record is issued to and
    /// classified by the model.
    pub fn chain_text(&self) -> String {
        self.chain.join(" ")
    }

    /// Terminal identifier of the chain.
    pub fn terminal_name(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or_default()
    }
}

/// Sort records into their canonical on-disk order.
pub fn sort_records(records: &mut [UsageRecord]) {
    records.sort_by(|a, b| {
        (&a.package, &a.chain, a.lineno).cmp(&(&b.package, &b.chain, b.lineno))
    });
}

/// Classification of a chain returned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecLabel {
    Source,
    Sink,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(package: &str, chain: &[&str], lineno: usize) -> UsageRecord {
        UsageRecord {
            file: "app.py".into(),
            lineno,
            col: 0,
            node_type: UsageKind::Call,
            chain: chain.iter().map(|s| s.to_string()).collect(),
            package: package.into(),
            code: String::new(),
            tags: vec![package.into()],
            call_id: None,
            arg_pos: None,
            kw_name: None,
            expr_chain: None,
            name: None,
        }
    }

    #[test]
    fn usage_kind_serializes_to_wire_names() {
        assert_eq!(serde_json::to_string(&UsageKind::Call).unwrap(), "\"Call\"");
        assert_eq!(
            serde_json::to_string(&UsageKind::KwargDoublestar).unwrap(),
            "\"kwarg_doublestar\""
        );
        assert_eq!(serde_json::to_string(&UsageKind::Param).unwrap(), "\"param\"");
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let json = serde_json::to_string(&record("flask", &["flask", "request"], 3)).unwrap();
        assert!(!json.contains("call_id"));
        assert!(!json.contains("arg_pos"));
        assert!(!json.contains("kw_name"));
    }

    #[test]
    fn sort_key_is_package_chain_lineno() {
        let mut records = vec![
            record("sqlite3", &["sqlite3", "connect"], 9),
            record("flask", &["flask", "request"], 20),
            record("flask", &["flask", "Flask"], 4),
            record("flask", &["flask", "Flask"], 2),
        ];
        sort_records(&mut records);
        let keys: Vec<(String, usize)> = records
            .iter()
            .map(|r| (r.chain_text(), r.lineno))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("flask Flask".to_string(), 2),
                ("flask Flask".to_string(), 4),
                ("flask request".to_string(), 20),
                ("sqlite3 connect".to_string(), 9),
            ]
        );
    }

    #[test]
    fn spec_label_round_trips_lowercase() {
        assert_eq!(serde_json::to_string(&SpecLabel::None).unwrap(), "\"none\"");
        let label: SpecLabel = serde_json::from_str("\"sink\"").unwrap();
        assert_eq!(label, SpecLabel::Sink);
    }
}
