use crate::error::TaintFlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weakness classes the pipeline knows how to triage. Each maps to a
/// sanitizer hint string that is injected verbatim into the triage prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weakness {
    Cwe78,
    Cwe79,
    Cwe89,
    Cwe94,
}

impl Weakness {
    pub fn title(&self) -> &'static str {
        match self {
            Weakness::Cwe78 => "OS command injection",
            Weakness::Cwe79 => "cross-site scripting",
            Weakness::Cwe89 => "SQL injection",
            Weakness::Cwe94 => "code injection",
        }
    }

    /// How this weakness is commonly prevented; quoted to the triage model.
    pub fn sanitizer_hint(&self) -> &'static str {
        match self {
            Weakness::Cwe78 => {
                "whitelisting of inputs, restricting inputs to only safe inputs with regex, \
                 using an argument list instead of shell=True in the method subprocess.run"
            }
            Weakness::Cwe79 => {
                "context-aware output encoding/escaping, using template engines with \
                 autoescape enabled, sanitizing/allowlisting HTML (e.g., bleach)"
            }
            Weakness::Cwe89 => "parameterized queries",
            Weakness::Cwe94 => {
                "strict allowlisting/parsing instead of eval/exec, using ast.literal_eval \
                 or json.loads for data, executing only in a restricted/sandboxed \
                 environment (e.g., RestrictedPython)"
            }
        }
    }
}

impl fmt::Display for Weakness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Weakness::Cwe78 => "cwe78",
            Weakness::Cwe79 => "cwe79",
            Weakness::Cwe89 => "cwe89",
            Weakness::Cwe94 => "cwe94",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Weakness {
    type Err = TaintFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cwe78" | "cwe-78" => Ok(Weakness::Cwe78),
            "cwe79" | "cwe-79" => Ok(Weakness::Cwe79),
            "cwe89" | "cwe-89" => Ok(Weakness::Cwe89),
            "cwe94" | "cwe-94" => Ok(Weakness::Cwe94),
            other => Err(TaintFlowError::Configuration(format!(
                "unsupported weakness identifier: {} (expected one of cwe78, cwe79, cwe89, cwe94)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_dash() {
        assert_eq!("cwe89".parse::<Weakness>().unwrap(), Weakness::Cwe89);
        assert_eq!("CWE-94".parse::<Weakness>().unwrap(), Weakness::Cwe94);
        assert!("cwe22".parse::<Weakness>().is_err());
    }

    #[test]
    fn display_is_the_canonical_identifier() {
        assert_eq!(Weakness::Cwe78.to_string(), "cwe78");
    }
}
