//! Symbolic import/use tracking.
//!
//! Walks each file's AST with scoped environments, propagating "where did
//! this value originate?" tags and full attribute chains across imports,
//! aliases, assignments, attribute access, calls, boolean short-circuits,
//! decorator-bound parameters and pass-through wrapper functions. Emits one
//! normalized [`UsageRecord`] per observable use of an externally-rooted
//! name.

use crate::builtins::is_builtin;
use crate::file_collect::{collect_python_files, read_lossy, relative_slash_path};
use crate::parser::parse_python;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use taintflow_core::{
    jsonl, sort_records, Result, UsageKind, UsageRecord, BUILT_IN_PACKAGE,
};
use tracing::{debug, info, warn};
use tree_sitter::Node;

/// How a chain reached a variable binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Var,
    Attr,
    Call,
    Name,
    Param,
    Wrapper,
}

#[derive(Debug, Clone)]
struct TrackedChain {
    parts: Vec<String>,
    kind: ChainKind,
}

type Env = HashMap<String, BTreeSet<String>>;
type Chains = HashMap<String, Vec<TrackedChain>>;

/// Per-file tracker state. Function frames copy the module frame on entry;
/// import chains stay module-scoped and are visible from every frame.
struct UsageTracker<'s> {
    file: String,
    source: &'s str,
    lines: Vec<&'s str>,
    env_stack: Vec<Env>,
    chains_stack: Vec<Chains>,
    import_chains: HashMap<String, Vec<Vec<String>>>,
    /// Attribute nodes already consumed as the callee of a surrounding call.
    skip_attrs: HashSet<usize>,
    call_counter: u64,
    records: Vec<UsageRecord>,
}

/// Track a single file and return its records in AST traversal order.
pub fn track_file(file: &str, source: &str) -> Result<Vec<UsageRecord>> {
    let tree = parse_python(source)?;
    let mut tracker = UsageTracker::new(file.to_string(), source);
    tracker.visit(tree.root_node());
    Ok(tracker.records)
}

/// Scan every Python file under `root` and return all records sorted by
/// `(package, chain, lineno)`. Unparseable and unreadable files are skipped
/// with a diagnostic; they never abort the scan.
pub fn analyze_project(root: &Path) -> Result<Vec<UsageRecord>> {
    let files = collect_python_files(root)?;
    let mut records = Vec::new();
    for path in files {
        let rel = relative_slash_path(root, &path);
        let source = match read_lossy(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", rel, e);
                continue;
            }
        };
        match track_file(&rel, &source) {
            Ok(mut recs) => records.append(&mut recs),
            Err(e) => warn!("Skipping unparseable file {}: {}", rel, e),
        }
    }
    sort_records(&mut records);
    Ok(records)
}

/// Scan a project and write the sorted records as JSONL.
pub fn analyze_project_to_file(root: &Path, output: &Path) -> Result<usize> {
    let records = analyze_project(root)?;
    jsonl::write_jsonl(output, &records)?;
    info!(
        "Analyzed {} and wrote {} usage records to {}",
        root.display(),
        records.len(),
        output.display()
    );
    Ok(records.len())
}

impl<'s> UsageTracker<'s> {
    fn new(file: String, source: &'s str) -> Self {
        Self {
            file,
            source,
            lines: source.lines().collect(),
            env_stack: vec![Env::default()],
            chains_stack: vec![Chains::default()],
            import_chains: HashMap::new(),
            skip_attrs: HashSet::new(),
            call_counter: 0,
            records: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Scope and lookup helpers
    // ------------------------------------------------------------------

    fn env_mut(&mut self) -> &mut Env {
        if self.env_stack.is_empty() {
            self.env_stack.push(Env::default());
        }
        let idx = self.env_stack.len() - 1;
        &mut self.env_stack[idx]
    }

    fn chains_mut(&mut self) -> &mut Chains {
        if self.chains_stack.is_empty() {
            self.chains_stack.push(Chains::default());
        }
        let idx = self.chains_stack.len() - 1;
        &mut self.chains_stack[idx]
    }

    fn env_tags(&self, name: &str) -> BTreeSet<String> {
        self.env_stack
            .last()
            .and_then(|env| env.get(name))
            .cloned()
            .unwrap_or_default()
    }

    fn has_project(&self, name: &str) -> bool {
        self.chains_stack
            .last()
            .and_then(|chains| chains.get(name))
            .map(|list| !list.is_empty())
            .unwrap_or(false)
    }

    fn project_chains(&self, name: &str) -> Vec<TrackedChain> {
        self.chains_stack
            .last()
            .and_then(|chains| chains.get(name))
            .cloned()
            .unwrap_or_default()
    }

    fn add_tags<I: IntoIterator<Item = String>>(&mut self, name: &str, tags: I) {
        self.env_mut()
            .entry(name.to_string())
            .or_default()
            .extend(tags);
    }

    fn push_chain(&mut self, name: &str, parts: Vec<String>, kind: ChainKind) {
        if parts.is_empty() {
            return;
        }
        debug!(name, ?kind, chain = ?parts, "propagating chain");
        self.chains_mut()
            .entry(name.to_string())
            .or_default()
            .push(TrackedChain { parts, kind });
    }

    /// Entering a function copies the module frame; assignments inside the
    /// function mutate the copy only.
    fn push_scope(&mut self) {
        let base_env = self.env_stack.first().cloned().unwrap_or_default();
        let base_chains = self.chains_stack.first().cloned().unwrap_or_default();
        self.env_stack.push(base_env);
        self.chains_stack.push(base_chains);
    }

    fn pop_scope(&mut self) {
        if self.env_stack.len() > 1 {
            self.env_stack.pop();
        }
        if self.chains_stack.len() > 1 {
            self.chains_stack.pop();
        }
    }

    // ------------------------------------------------------------------
    // Source helpers
    // ------------------------------------------------------------------

    fn node_text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn line_of(&self, node: Node) -> usize {
        node.start_position().row + 1
    }

    fn col_of(&self, node: Node) -> usize {
        node.start_position().column
    }

    fn code_line(&self, lineno: usize) -> String {
        self.lines
            .get(lineno.saturating_sub(1))
            .map(|l| l.trim().to_string())
            .unwrap_or_default()
    }

    /// Extract the dotted chain of `a.b.c` or `a.b.c()` as `[a, b, c]`.
    ///
    /// Chains only start at name nodes; expressions rooted in subscripts,
    /// literals or comprehensions yield empty chains. Call expressions are
    /// seen through so `get_db().cursor()` extracts `[get_db, cursor]`, and
    /// an f-string yields the chain of its first resolvable interpolation.
    fn extract_chain(&self, node: Node) -> Vec<String> {
        let mut rev: Vec<String> = Vec::new();
        let mut cur = Some(node);
        while let Some(n) = cur {
            match n.kind() {
                "call" => {
                    cur = n.child_by_field_name("function");
                }
                "attribute" => {
                    if let Some(attr) = n.child_by_field_name("attribute") {
                        rev.push(self.node_text(attr).to_string());
                    }
                    cur = n.child_by_field_name("object");
                }
                "parenthesized_expression" => {
                    cur = n.named_child(0);
                }
                "identifier" => {
                    rev.push(self.node_text(n).to_string());
                    rev.reverse();
                    return rev;
                }
                "string" => {
                    if rev.is_empty() {
                        return self.fstring_chain(n);
                    }
                    return Vec::new();
                }
                _ => break,
            }
        }
        Vec::new()
    }

    fn fstring_chain(&self, string_node: Node) -> Vec<String> {
        let mut cursor = string_node.walk();
        for child in string_node.named_children(&mut cursor) {
            if child.kind() != "interpolation" {
                continue;
            }
            if let Some(expr) = child.named_child(0) {
                let chain = self.extract_chain(expr);
                if !chain.is_empty() {
                    return chain;
                }
            }
        }
        Vec::new()
    }

    /// Root name of an attribute/call chain, if the chain starts at one.
    fn extract_base(&self, node: Node) -> Option<String> {
        self.extract_chain(node).into_iter().next()
    }

    fn children_of(node: Node) -> Vec<Node> {
        let mut cursor = node.walk();
        node.children(&mut cursor).collect()
    }

    fn named_children_of(node: Node) -> Vec<Node> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor).collect()
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => {
                self.handle_import(node);
                return;
            }
            "import_from_statement" => {
                self.handle_import_from(node);
                return;
            }
            "decorated_definition" => {
                self.handle_decorated(node);
                return;
            }
            "function_definition" => {
                self.handle_function(node, &[]);
                return;
            }
            "assignment" => self.handle_assign(node),
            "call" => self.handle_call(node),
            "attribute" => {
                if !self.skip_attrs.contains(&node.id()) {
                    self.handle_attribute(node);
                }
            }
            _ => {}
        }
        for child in Self::children_of(node) {
            self.visit(child);
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn handle_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name_node in names {
            match name_node.kind() {
                "dotted_name" => {
                    let full = self.node_text(name_node);
                    if let Some(pkg) = full.split('.').next() {
                        let pkg = pkg.to_string();
                        self.add_tags(&pkg, [pkg.clone()]);
                        self.import_chains
                            .entry(pkg.clone())
                            .or_default()
                            .push(vec![pkg]);
                    }
                }
                "aliased_import" => {
                    let dotted = name_node
                        .child_by_field_name("name")
                        .map(|n| self.node_text(n).to_string())
                        .unwrap_or_default();
                    let alias = name_node
                        .child_by_field_name("alias")
                        .map(|n| self.node_text(n).to_string())
                        .unwrap_or_default();
                    if let (Some(pkg), false) = (dotted.split('.').next(), alias.is_empty()) {
                        let pkg = pkg.to_string();
                        self.add_tags(&alias, [pkg.clone()]);
                        self.import_chains.entry(alias).or_default().push(vec![pkg]);
                    }
                }
                _ => {}
            }
        }
    }

    fn handle_import_from(&mut self, node: Node) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module_text = match module_node.kind() {
            "dotted_name" => self.node_text(module_node).to_string(),
            "relative_import" => {
                // `from .m import x` tracks m; `from . import x` registers
                // nothing here (it is handled by the origin classifier).
                let mut dotted = None;
                for child in Self::named_children_of(module_node) {
                    if child.kind() == "dotted_name" {
                        dotted = Some(self.node_text(child).to_string());
                        break;
                    }
                }
                match dotted {
                    Some(d) => d,
                    None => return,
                }
            }
            _ => return,
        };
        let Some(pkg) = module_text.split('.').next().map(str::to_string) else {
            return;
        };

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name_node in names {
            let (orig, bound) = match name_node.kind() {
                "dotted_name" => {
                    let text = self.node_text(name_node).to_string();
                    (text.clone(), text)
                }
                "aliased_import" => {
                    let orig = name_node
                        .child_by_field_name("name")
                        .map(|n| self.node_text(n).to_string())
                        .unwrap_or_default();
                    let alias = name_node
                        .child_by_field_name("alias")
                        .map(|n| self.node_text(n).to_string())
                        .unwrap_or_default();
                    (orig, alias)
                }
                _ => continue,
            };
            if orig.is_empty() || bound.is_empty() {
                continue;
            }
            self.add_tags(&bound, [pkg.clone()]);
            self.import_chains
                .entry(bound)
                .or_default()
                .push(vec![pkg.clone(), orig]);
        }
    }

    // ------------------------------------------------------------------
    // Functions, decorators, wrappers
    // ------------------------------------------------------------------

    fn handle_decorated(&mut self, node: Node) {
        let mut decorator_exprs = Vec::new();
        for child in Self::children_of(node) {
            if child.kind() == "decorator" {
                if let Some(expr) = child.named_child(0) {
                    decorator_exprs.push(expr);
                }
            }
        }
        let Some(definition) = node.child_by_field_name("definition") else {
            return;
        };
        if definition.kind() == "function_definition" {
            self.handle_function(definition, &decorator_exprs);
        } else {
            for expr in decorator_exprs {
                self.visit(expr);
            }
            self.visit(definition);
        }
    }

    fn handle_function<'t>(&mut self, def: Node<'t>, decorators: &[Node<'t>]) {
        let params = self.parameter_identifiers(def);
        let def_line = self.line_of(def);

        // Decorator-bound parameters: a tracked decorator forwards its chain
        // onto every parameter of the decorated handler.
        for deco in decorators {
            let deco_chain = self.extract_chain(*deco);
            let Some(base_deco) = deco_chain.first().cloned() else {
                continue;
            };
            let base_chains: Vec<Vec<String>> = if self.has_project(&base_deco) {
                self.project_chains(&base_deco)
                    .into_iter()
                    .map(|tc| tc.parts)
                    .collect()
            } else if let Some(chains) = self.import_chains.get(&base_deco) {
                chains.clone()
            } else {
                continue;
            };
            let base_tags = self.env_tags(&base_deco);

            for &(param_node, ref pname) in &params {
                for base_chain in &base_chains {
                    let mut fullchain = base_chain.clone();
                    fullchain.extend(deco_chain[1..].iter().cloned());
                    let Some(package) = fullchain.first().cloned() else {
                        continue;
                    };
                    self.add_tags(pname, [package.clone()]);
                    self.push_chain(pname, fullchain.clone(), ChainKind::Param);

                    let mut tags = base_tags.clone();
                    tags.insert(package.clone());
                    let record = UsageRecord {
                        file: self.file.clone(),
                        lineno: self.line_of(param_node),
                        col: self.col_of(param_node),
                        node_type: UsageKind::Param,
                        chain: fullchain,
                        package,
                        code: self.code_line(def_line),
                        tags: tags.into_iter().collect(),
                        call_id: None,
                        arg_pos: None,
                        kw_name: None,
                        expr_chain: None,
                        name: Some(pname.clone()),
                    };
                    self.records.push(record);
                }
            }
        }

        // Wrapper detection: a straight pass-through of an imported symbol
        // makes later calls behave like calls to the wrapped symbol.
        if let Some(chain) = self.wrapper_chain(def) {
            if let Some(fn_name) = def
                .child_by_field_name("name")
                .map(|n| self.node_text(n).to_string())
            {
                if let Some(pkg) = chain.first().cloned() {
                    self.add_tags(&fn_name, [pkg]);
                    self.push_chain(&fn_name, chain, ChainKind::Wrapper);
                }
            }
        }

        self.push_scope();
        for deco in decorators {
            self.visit(*deco);
        }
        for child in Self::children_of(def) {
            self.visit(child);
        }
        self.pop_scope();
    }

    fn parameter_identifiers<'t>(&self, def: Node<'t>) -> Vec<(Node<'t>, String)> {
        let mut out = Vec::new();
        let Some(params) = def.child_by_field_name("parameters") else {
            return out;
        };
        for child in Self::named_children_of(params) {
            let ident = match child.kind() {
                "identifier" => Some(child),
                "typed_parameter" => child
                    .named_child(0)
                    .filter(|n| n.kind() == "identifier"),
                "default_parameter" | "typed_default_parameter" => child
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier"),
                _ => None,
            };
            if let Some(ident) = ident {
                out.push((ident, self.node_text(ident).to_string()));
            }
        }
        out
    }

    fn wrapper_chain(&self, def: Node) -> Option<Vec<String>> {
        let body = def.child_by_field_name("body")?;
        let stmts: Vec<Node> = Self::named_children_of(body)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect();

        if stmts.len() == 1 && stmts[0].kind() == "return_statement" {
            let rv = stmts[0].named_child(0)?;
            return self.wrapper_chain_from_value(rv);
        }

        if stmts.len() == 2 {
            let assign = match stmts[0].kind() {
                "expression_statement" => stmts[0]
                    .named_child(0)
                    .filter(|n| n.kind() == "assignment"),
                _ => None,
            }?;
            let target = assign
                .child_by_field_name("left")
                .filter(|n| n.kind() == "identifier")?;
            if stmts[1].kind() != "return_statement" {
                return None;
            }
            let returned = stmts[1]
                .named_child(0)
                .filter(|n| n.kind() == "identifier")?;
            if self.node_text(returned) != self.node_text(target) {
                return None;
            }
            let value = assign.child_by_field_name("right")?;
            return self.wrapper_chain_from_value(value);
        }

        None
    }

    fn wrapper_chain_from_value(&self, value: Node) -> Option<Vec<String>> {
        match value.kind() {
            "identifier" => {
                let name = self.node_text(value);
                self.import_chains
                    .get(name)
                    .and_then(|chains| chains.first())
                    .cloned()
            }
            "call" => {
                let func = value.child_by_field_name("function")?;
                if func.kind() != "attribute" {
                    return None;
                }
                let base = self.extract_base(func)?;
                let attr = func.child_by_field_name("attribute")?;
                let mut chain = self.import_chains.get(&base)?.first()?.clone();
                chain.push(self.node_text(attr).to_string());
                Some(chain)
            }
            "attribute" => {
                let base = self.extract_base(value)?;
                let attr = value.child_by_field_name("attribute")?;
                let mut chain = self.import_chains.get(&base)?.first()?.clone();
                chain.push(self.node_text(attr).to_string());
                Some(chain)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    fn handle_assign(&mut self, node: Node) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let Some(right) = node.child_by_field_name("right") else {
            return;
        };
        if right.kind() == "assignment" {
            // `x = y = rhs` chains are handled when the inner assignment is
            // visited.
            return;
        }
        let tgt = self.node_text(left).to_string();

        // Assignments are overwrites, not unions.
        self.env_mut().entry(tgt.clone()).or_default().clear();
        self.chains_mut().entry(tgt.clone()).or_default().clear();

        match right.kind() {
            "identifier" => {
                let src = self.node_text(right).to_string();
                if self.has_project(&src) {
                    let tags = self.env_tags(&src);
                    self.add_tags(&tgt, tags);
                    for tc in self.project_chains(&src) {
                        self.push_chain(&tgt, tc.parts, ChainKind::Var);
                    }
                }
                if let Some(chains) = self.import_chains.get(&src).cloned() {
                    let tags = self.env_tags(&src);
                    self.add_tags(&tgt, tags);
                    for chain in chains {
                        self.push_chain(&tgt, chain, ChainKind::Var);
                    }
                }
            }
            "attribute" => {
                self.assign_extended(&tgt, right, ChainKind::Attr);
            }
            "call" => {
                let Some(func) = right.child_by_field_name("function") else {
                    return;
                };
                match func.kind() {
                    "attribute" => self.assign_extended(&tgt, right, ChainKind::Call),
                    "identifier" => {
                        let f = self.node_text(func).to_string();
                        if self.has_project(&f) {
                            // Calls to project wrappers copy the wrapped
                            // chain without inserting the wrapper's name.
                            let tags = self.env_tags(&f);
                            self.add_tags(&tgt, tags);
                            for tc in self.project_chains(&f) {
                                self.push_chain(&tgt, tc.parts, ChainKind::Call);
                            }
                        } else if let Some(chains) = self.import_chains.get(&f).cloned() {
                            let tags = self.env_tags(&f);
                            self.add_tags(&tgt, tags);
                            for chain in chains {
                                if chain.last() == Some(&f) {
                                    self.push_chain(&tgt, chain, ChainKind::Call);
                                } else {
                                    warn!(
                                        "direct call to imported '{}' whose chain {:?} does not \
                                         end in the call name; appending",
                                        f, chain
                                    );
                                    let mut extended = chain;
                                    extended.push(f.clone());
                                    self.push_chain(&tgt, extended, ChainKind::Call);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            "boolean_operator" => self.assign_boolop(&tgt, right),
            _ => {}
        }
    }

    /// `x = y.attr` and `x = y.attr(...)`: extend every chain of the base
    /// with the extracted segment past the base name.
    fn assign_extended(&mut self, tgt: &str, rhs: Node, kind: ChainKind) {
        let chain = self.extract_chain(rhs);
        let Some(base) = chain.first().cloned() else {
            return;
        };
        let tail: Vec<String> = chain[1..].to_vec();

        if self.has_project(&base) {
            let tags = self.env_tags(&base);
            self.add_tags(tgt, tags);
            for tc in self.project_chains(&base) {
                let mut new_chain = tc.parts;
                new_chain.extend(tail.iter().cloned());
                self.push_chain(tgt, new_chain, kind);
            }
        }
        if let Some(chains) = self.import_chains.get(&base).cloned() {
            let tags = self.env_tags(&base);
            self.add_tags(tgt, tags);
            for base_chain in chains {
                let mut new_chain = base_chain;
                new_chain.extend(tail.iter().cloned());
                self.push_chain(tgt, new_chain, kind);
            }
        }
    }

    /// `x = a or b`: union the chains reachable from every operand.
    fn assign_boolop(&mut self, tgt: &str, node: Node) {
        let mut operands = Vec::new();
        collect_bool_operands(node, &mut operands);
        for val in operands {
            let (base, tail, kind) = match val.kind() {
                "identifier" => (
                    Some(self.node_text(val).to_string()),
                    Vec::new(),
                    ChainKind::Name,
                ),
                "attribute" => {
                    let chain = self.extract_chain(val);
                    match chain.first().cloned() {
                        Some(base) => (Some(base), chain[1..].to_vec(), ChainKind::Attr),
                        None => (None, Vec::new(), ChainKind::Attr),
                    }
                }
                _ => (None, Vec::new(), ChainKind::Name),
            };
            let Some(base) = base else { continue };

            if self.has_project(&base) {
                for tc in self.project_chains(&base) {
                    let mut new_chain = tc.parts;
                    new_chain.extend(tail.iter().cloned());
                    self.push_chain(tgt, new_chain, kind);
                }
            } else if let Some(chains) = self.import_chains.get(&base).cloned() {
                for base_chain in chains {
                    let mut new_chain = base_chain;
                    new_chain.extend(tail.iter().cloned());
                    self.push_chain(tgt, new_chain, kind);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls and attribute reads
    // ------------------------------------------------------------------

    fn handle_call(&mut self, node: Node) {
        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        match func.kind() {
            "attribute" => {
                self.skip_attrs.insert(func.id());
                let node_chain = self.extract_chain(func);
                let Some(base) = node_chain.first().cloned() else {
                    return;
                };
                if self.has_project(&base) {
                    for tc in self.project_chains(&base) {
                        debug!(base = %base, kind = ?tc.kind, "resolving callee through tracked chain");
                        let mut full = tc.parts;
                        full.extend(node_chain[1..].iter().cloned());
                        let Some(pkg) = full.first().cloned() else {
                            continue;
                        };
                        self.record_call(node, full, &pkg, &base);
                    }
                } else if let Some(chains) = self.import_chains.get(&base).cloned() {
                    for base_chain in chains {
                        let Some(pkg) = base_chain.first().cloned() else {
                            continue;
                        };
                        // A base that is itself the package name keeps the
                        // extracted chain; anything else would duplicate the
                        // joint token.
                        let full = if base_chain.first() == Some(&base) {
                            node_chain.clone()
                        } else {
                            let mut full = base_chain;
                            full.extend(node_chain[1..].iter().cloned());
                            full
                        };
                        self.record_call(node, full, &pkg, &base);
                    }
                }
            }
            "identifier" => {
                let fid = self.node_text(func).to_string();
                if self.has_project(&fid) {
                    for tc in self.project_chains(&fid) {
                        let Some(pkg) = tc.parts.first().cloned() else {
                            continue;
                        };
                        self.record_call(node, tc.parts, &pkg, &fid);
                    }
                } else if let Some(chains) = self.import_chains.get(&fid).cloned() {
                    for base_chain in chains {
                        let Some(pkg) = base_chain.first().cloned() else {
                            continue;
                        };
                        self.record_call(node, base_chain, &pkg, &fid);
                    }
                } else if is_builtin(&fid) {
                    let chain = vec![BUILT_IN_PACKAGE.to_string(), fid.clone()];
                    self.record_call(node, chain, BUILT_IN_PACKAGE, &fid);
                }
            }
            _ => {}
        }
    }

    fn handle_attribute(&mut self, node: Node) {
        let node_chain = self.extract_chain(node);
        let Some(base) = node_chain.first().cloned() else {
            return;
        };
        if self.has_project(&base) {
            for tc in self.project_chains(&base) {
                let mut full = tc.parts;
                full.extend(node_chain[1..].iter().cloned());
                let Some(pkg) = full.first().cloned() else {
                    continue;
                };
                self.record_attribute(node, full, &pkg, &base);
            }
        } else if let Some(chains) = self.import_chains.get(&base).cloned() {
            for base_chain in chains {
                let Some(pkg) = base_chain.first().cloned() else {
                    continue;
                };
                let full = if base_chain.first() == Some(&base) {
                    node_chain.clone()
                } else {
                    let mut full = base_chain;
                    full.extend(node_chain[1..].iter().cloned());
                    full
                };
                self.record_attribute(node, full, &pkg, &base);
            }
        } else if is_builtin(&base) {
            let mut full = vec![BUILT_IN_PACKAGE.to_string()];
            full.extend(node_chain[1..].iter().cloned());
            self.record_attribute(node, full, BUILT_IN_PACKAGE, &base);
        }
    }

    fn record_attribute(&mut self, node: Node, chain: Vec<String>, package: &str, base: &str) {
        let lineno = self.line_of(node);
        let mut tags = self.env_tags(base);
        tags.insert(package.to_string());
        self.records.push(UsageRecord {
            file: self.file.clone(),
            lineno,
            col: self.col_of(node),
            node_type: UsageKind::Attribute,
            chain,
            package: package.to_string(),
            code: self.code_line(lineno),
            tags: tags.into_iter().collect(),
            call_id: None,
            arg_pos: None,
            kw_name: None,
            expr_chain: None,
            name: None,
        });
    }

    /// Emit one Call record plus one record per positional argument and
    /// keyword, all sharing a fresh call id.
    fn record_call(&mut self, call: Node, full_chain: Vec<String>, package: &str, base: &str) {
        self.call_counter += 1;
        let call_id = self.call_counter;

        let lineno = self.line_of(call);
        let mut tags = self.env_tags(base);
        tags.insert(package.to_string());
        let tags: Vec<String> = tags.into_iter().collect();

        self.records.push(UsageRecord {
            file: self.file.clone(),
            lineno,
            col: self.col_of(call),
            node_type: UsageKind::Call,
            chain: full_chain.clone(),
            package: package.to_string(),
            code: self.code_line(lineno),
            tags: tags.clone(),
            call_id: Some(call_id),
            arg_pos: None,
            kw_name: None,
            expr_chain: None,
            name: None,
        });

        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };
        if args.kind() != "argument_list" {
            return;
        }

        let mut positional: Vec<(Node, UsageKind)> = Vec::new();
        let mut keywords: Vec<(Node, UsageKind)> = Vec::new();
        for child in Self::named_children_of(args) {
            match child.kind() {
                "comment" => {}
                "keyword_argument" => keywords.push((child, UsageKind::Kwarg)),
                "dictionary_splat" => keywords.push((child, UsageKind::KwargDoublestar)),
                "list_splat" => positional.push((child, UsageKind::ArgStarred)),
                _ => positional.push((child, UsageKind::Arg)),
            }
        }

        for (idx, (arg_node, kind)) in positional.iter().enumerate() {
            let expr = match kind {
                UsageKind::ArgStarred => arg_node.named_child(0),
                _ => Some(*arg_node),
            };
            let expr_chain = expr.map(|e| self.extract_chain(e)).unwrap_or_default();
            let arg_line = self.line_of(*arg_node);
            self.records.push(UsageRecord {
                file: self.file.clone(),
                lineno: arg_line,
                col: self.col_of(*arg_node),
                node_type: *kind,
                chain: full_chain.clone(),
                package: package.to_string(),
                code: self.code_line(arg_line),
                tags: tags.clone(),
                call_id: Some(call_id),
                arg_pos: Some(idx),
                kw_name: None,
                expr_chain: Some(expr_chain),
                name: None,
            });
        }

        for (kw_node, kind) in keywords {
            let (kw_name, value) = match kind {
                UsageKind::Kwarg => (
                    kw_node
                        .child_by_field_name("name")
                        .map(|n| self.node_text(n).to_string()),
                    kw_node.child_by_field_name("value"),
                ),
                _ => (None, kw_node.named_child(0)),
            };
            let expr_chain = value.map(|v| self.extract_chain(v)).unwrap_or_default();
            let kw_line = self.line_of(kw_node);
            self.records.push(UsageRecord {
                file: self.file.clone(),
                lineno: kw_line,
                col: self.col_of(kw_node),
                node_type: kind,
                chain: full_chain.clone(),
                package: package.to_string(),
                code: self.code_line(kw_line),
                tags: tags.clone(),
                call_id: Some(call_id),
                arg_pos: None,
                kw_name,
                expr_chain: Some(expr_chain),
                name: None,
            });
        }
    }
}

fn collect_bool_operands<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    if node.kind() == "boolean_operator" {
        if let Some(left) = node.child_by_field_name("left") {
            collect_bool_operands(left, out);
        }
        if let Some(right) = node.child_by_field_name("right") {
            collect_bool_operands(right, out);
        }
    } else {
        out.push(node);
    }
}
