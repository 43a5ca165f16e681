use taintflow_core::{Result, TaintFlowError};
use tree_sitter::{Parser, Tree};

/// Parse a Python source file into a tree-sitter tree.
pub fn parse_python(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TaintFlowError::Parse(format!("failed to load Python grammar: {}", e)))?;
    parser
        .parse(source, None)
        .ok_or_else(|| TaintFlowError::Parse("tree-sitter returned no tree".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_module() {
        let tree = parse_python("import os\n\nprint(os.getcwd())\n").unwrap();
        assert_eq!(tree.root_node().kind(), "module");
        assert!(!tree.root_node().has_error());
    }
}
