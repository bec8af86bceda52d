//! Reader for the decompiler's call-graph DOT output (`<obj>.c.cg.dot`).
//!
//! Only the subset needed for structural call edges is understood: node and
//! edge statements (including chains `a -> b -> c`), attribute lists, default
//! attribute statements and nested subgraphs, which are flattened.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::facts::FactsError;
use crate::model::{canonical_name, StructuralEdge};

/// How a DOT edge contributes to the merged edge frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyMode {
    /// Each edge contributes the callee's in-degree within its module graph.
    #[default]
    CalleeInDegree,
    /// Each edge contributes its `weight`/`count` attribute, or 1.
    Occurrence,
}

/// One edge as written in the DOT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub caller: String,
    pub callee: String,
    pub count: Option<u64>,
}

/// Parsed call graph of a single module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraphDot {
    /// Canonical node names in first-seen order.
    pub nodes: Vec<String>,
    pub edges: Vec<DotEdge>,
}

impl CallGraphDot {
    /// Turn the parsed edges into structural observations.
    pub fn structural_edges(&self, mode: FrequencyMode) -> Vec<StructuralEdge> {
        match mode {
            FrequencyMode::Occurrence => self
                .edges
                .iter()
                .map(|e| StructuralEdge::new(&e.caller, &e.callee, e.count.unwrap_or(1).max(1)))
                .collect(),
            FrequencyMode::CalleeInDegree => {
                let mut in_degree: BTreeMap<&str, u64> = BTreeMap::new();
                for e in &self.edges {
                    *in_degree.entry(e.callee.as_str()).or_insert(0) += 1;
                }
                self.edges
                    .iter()
                    .map(|e| {
                        let freq = in_degree.get(e.callee.as_str()).copied().unwrap_or(1);
                        StructuralEdge::new(&e.caller, &e.callee, freq)
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Id(String),
    Arrow,
    Line,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eq,
    Semi,
    Comma,
    Colon,
}

fn dot_error(line: usize, message: impl Into<String>) -> FactsError {
    FactsError::Dot { line, message: message.into() }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '@' | '%')
}

fn lex(source: &str) -> Result<Vec<(Tok, usize)>, FactsError> {
    let mut out = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        line += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(dot_error(line, "unterminated comment"));
                }
                i += 2;
            }
            '-' if chars.get(i + 1) == Some(&'>') => {
                out.push((Tok::Arrow, line));
                i += 2;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                out.push((Tok::Line, line));
                i += 2;
            }
            '[' | ']' | '{' | '}' | '=' | ';' | ',' | ':' => {
                let tok = match c {
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '=' => Tok::Eq,
                    ';' => Tok::Semi,
                    ',' => Tok::Comma,
                    _ => Tok::Colon,
                };
                out.push((tok, line));
                i += 1;
            }
            '"' => {
                let start_line = line;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(dot_error(start_line, "unterminated string")),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if chars.get(i + 1) == Some(&'"') => {
                            value.push('"');
                            i += 2;
                        }
                        Some(&ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                out.push((Tok::Id(value), start_line));
            }
            c if is_id_char(c) || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && is_id_char(chars[i]) {
                    i += 1;
                }
                out.push((Tok::Id(chars[start..i].iter().collect()), line));
            }
            other => return Err(dot_error(line, format!("unexpected character `{other}`"))),
        }
    }

    Ok(out)
}

struct DotParser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    nodes: Vec<String>,
    seen: BTreeSet<String>,
    edges: Vec<DotEdge>,
}

impl DotParser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.toks.get(self.pos).or_else(|| self.toks.last()).map(|(_, l)| *l).unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        tok
    }

    fn expect_id(&mut self) -> Result<String, FactsError> {
        let line = self.line();
        match self.bump() {
            Some(Tok::Id(id)) => Ok(id),
            Some(other) => Err(dot_error(line, format!("expected identifier, found {other:?}"))),
            None => Err(dot_error(line, "unexpected end of input")),
        }
    }

    fn add_node(&mut self, raw: &str) -> String {
        let name = canonical_name(raw).to_string();
        if self.seen.insert(name.clone()) {
            self.nodes.push(name.clone());
        }
        name
    }

    fn parse(mut self) -> Result<CallGraphDot, FactsError> {
        // Header: [strict] (graph|digraph) [id] '{'
        if matches!(self.peek(), Some(Tok::Id(s)) if s.eq_ignore_ascii_case("strict")) {
            self.pos += 1;
        }
        match self.bump() {
            Some(Tok::Id(s)) if s.eq_ignore_ascii_case("digraph") || s.eq_ignore_ascii_case("graph") => {}
            _ => return Err(dot_error(self.line(), "expected `digraph` header")),
        }
        if matches!(self.peek(), Some(Tok::Id(_))) {
            self.pos += 1;
        }
        if self.bump() != Some(Tok::LBrace) {
            return Err(dot_error(self.line(), "expected `{` after graph header"));
        }

        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(dot_error(self.line(), "missing closing `}`")),
                Some(Tok::RBrace) => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(Tok::LBrace) => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(Tok::Semi) | Some(Tok::Comma) => self.pos += 1,
                Some(Tok::Id(s)) if s.eq_ignore_ascii_case("subgraph") => {
                    self.pos += 1;
                    if matches!(self.peek(), Some(Tok::Id(_))) {
                        self.pos += 1;
                    }
                }
                Some(Tok::Id(_)) => self.parse_statement()?,
                Some(other) => {
                    return Err(dot_error(self.line(), format!("unexpected token {other:?}")))
                }
            }
        }

        if let Some(tok) = self.peek() {
            return Err(dot_error(self.line(), format!("trailing content after graph: {tok:?}")));
        }

        Ok(CallGraphDot { nodes: self.nodes, edges: self.edges })
    }

    fn parse_statement(&mut self) -> Result<(), FactsError> {
        let first = self.expect_id()?;

        // `graph|node|edge [..]` default attribute statements.
        let lowered = first.to_ascii_lowercase();
        if matches!(lowered.as_str(), "graph" | "node" | "edge") && self.peek() == Some(&Tok::LBracket) {
            self.parse_attributes()?;
            return Ok(());
        }

        // `id = id` graph attribute.
        if self.peek() == Some(&Tok::Eq) {
            self.pos += 1;
            self.expect_id()?;
            return Ok(());
        }

        self.skip_port()?;
        let mut chain = vec![self.add_node(&first)];
        while matches!(self.peek(), Some(Tok::Arrow) | Some(Tok::Line)) {
            self.pos += 1;
            if self.peek() == Some(&Tok::LBrace) {
                return Err(dot_error(self.line(), "subgraph edge targets are not supported"));
            }
            let next = self.expect_id()?;
            self.skip_port()?;
            chain.push(self.add_node(&next));
        }

        let attrs = if self.peek() == Some(&Tok::LBracket) {
            self.parse_attributes()?
        } else {
            BTreeMap::new()
        };

        if chain.len() > 1 {
            let count = attrs
                .get("weight")
                .or_else(|| attrs.get("count"))
                .and_then(|v| v.trim().parse::<u64>().ok());
            for pair in chain.windows(2) {
                self.edges.push(DotEdge { caller: pair[0].clone(), callee: pair[1].clone(), count });
            }
        }
        Ok(())
    }

    fn skip_port(&mut self) -> Result<(), FactsError> {
        while self.peek() == Some(&Tok::Colon) {
            self.pos += 1;
            self.expect_id()?;
        }
        Ok(())
    }

    fn parse_attributes(&mut self) -> Result<BTreeMap<String, String>, FactsError> {
        let mut attrs = BTreeMap::new();
        // Consecutive lists (`[a=1][b=2]`) are legal.
        while self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Tok::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(Tok::Comma) | Some(Tok::Semi) => self.pos += 1,
                    Some(Tok::Id(_)) => {
                        let key = self.expect_id()?;
                        if self.peek() == Some(&Tok::Eq) {
                            self.pos += 1;
                            let value = self.expect_id()?;
                            attrs.insert(key, value);
                        } else {
                            attrs.insert(key, String::from("true"));
                        }
                    }
                    None => return Err(dot_error(self.line(), "unterminated attribute list")),
                    Some(other) => {
                        return Err(dot_error(
                            self.line(),
                            format!("unexpected token {other:?} in attribute list"),
                        ))
                    }
                }
            }
        }
        Ok(attrs)
    }
}

/// Parse DOT source into a [`CallGraphDot`].
pub fn parse_call_graph_dot(source: &str) -> Result<CallGraphDot, FactsError> {
    let toks = lex(source)?;
    DotParser { toks, pos: 0, nodes: Vec::new(), seen: BTreeSet::new(), edges: Vec::new() }.parse()
}
