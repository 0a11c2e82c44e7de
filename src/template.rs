//! Command pattern compilation and structural matching.
//!
//! A pattern is a whitespace-separated list of nodes:
//!
//! - `word` - a literal token, matched case-insensitively
//! - `:name` - a parameter that binds exactly one token
//! - `*name` - a greedy parameter that binds one or more remaining tokens
//! - `[` .. `]` - an optional group of nodes
//!
//! All bound values stay strings; any conversion is the handler's job.

use std::collections::HashMap;
use std::fmt;

use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a command pattern.
#[derive(Error, Debug, Diagnostic)]
pub enum PatternError {
    /// The pattern string contains no nodes.
    #[error("pattern is empty")]
    Empty,
    /// An optional group was opened but never closed, or closed twice.
    #[error("unbalanced brackets in pattern")]
    UnbalancedBracket,
    /// Optional groups cannot contain other optional groups.
    #[error("nested optional group in pattern")]
    NestedOptional,
    /// An optional group with no nodes inside.
    #[error("empty optional group in pattern")]
    EmptyOptional,
    /// A parameter token without a name, e.g. a bare `:` or `*`.
    #[error("parameter is missing a name")]
    UnnamedParameter,
    /// The same parameter name appears twice.
    #[error("duplicate parameter `{0}`")]
    DuplicateParameter(String),
    /// A greedy parameter must be the last node of its group; at the top
    /// level it may only be followed by literals.
    #[error("greedy parameter `{0}` must be in final position")]
    GreedyNotLast(String),
    /// A requirement or default refers to a parameter the pattern does not
    /// declare.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    /// A requirement regex failed to compile.
    #[error("invalid requirement for parameter `{name}`")]
    Requirement {
        /// The parameter the requirement was attached to.
        name: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// A single node of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    /// Fixed token, matched case-insensitively.
    Literal(String),
    /// Named capture.
    Param {
        name: String,
        /// Greedy parameters bind one or more remaining tokens.
        greedy: bool,
    },
    /// Group of nodes that may be absent entirely.
    Optional(Vec<Node>),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(word) => write!(f, "{word}"),
            Node::Param { name, greedy: false } => write!(f, ":{name}"),
            Node::Param { name, greedy: true } => write!(f, "*{name}"),
            Node::Optional(nodes) => {
                write!(f, "[")?;
                for (i, node) in nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{node}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A value bound to a parameter during matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A single token.
    Single(String),
    /// The tokens consumed by a greedy parameter, in order.
    Rest(Vec<String>),
}

impl Value {
    /// Returns the value as a single space-joined string.
    #[must_use]
    pub fn joined(&self) -> String {
        match self {
            Value::Single(s) => s.clone(),
            Value::Rest(parts) => parts.join(" "),
        }
    }
}

/// Parameter bindings produced by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(HashMap<String, Value>);

impl Bindings {
    /// Returns the single-token value bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Value::Single(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the token list bound to a greedy parameter `name`, if any.
    #[must_use]
    pub fn rest(&self, name: &str) -> Option<&[String]> {
        match self.0.get(name) {
            Some(Value::Rest(parts)) => Some(parts),
            _ => None,
        }
    }

    /// Returns the value bound to `name` as a space-joined string.
    #[must_use]
    pub fn joined(&self, name: &str) -> Option<String> {
        self.0.get(name).map(Value::joined)
    }

    /// Returns true when no parameter is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all bound parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, name: String, value: Value) {
        self.0.insert(name, value);
    }

    fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

/// One compiled command pattern.
///
/// Immutable once compiled; requirements and defaults are attached at
/// registration time through [`Template::with_requirement`] and
/// [`Template::with_default`].
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
    requirements: Vec<(String, Regex)>,
    defaults: Vec<(String, String)>,
}

impl Template {
    /// Compiles a pattern string.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] when the pattern is empty, has unbalanced
    /// or nested brackets, declares a parameter twice, or places a greedy
    /// parameter anywhere but the final position of its group.
    pub fn compile(pattern: &str) -> Result<Template, PatternError> {
        let mut top = Vec::new();
        let mut group: Option<Vec<Node>> = None;

        for raw in pattern.split_whitespace() {
            let mut token = raw;

            if let Some(rest) = token.strip_prefix('[') {
                if group.is_some() {
                    return Err(PatternError::NestedOptional);
                }
                group = Some(Vec::new());
                token = rest;
            }

            let closes = if let Some(rest) = token.strip_suffix(']') {
                if group.is_none() {
                    return Err(PatternError::UnbalancedBracket);
                }
                token = rest;
                true
            } else {
                false
            };

            if !token.is_empty() {
                let node = parse_node(token)?;
                match group.as_mut() {
                    Some(nodes) => nodes.push(node),
                    None => top.push(node),
                }
            }

            if closes {
                // `group` is always present here, checked above.
                let nodes = group.take().unwrap_or_default();
                if nodes.is_empty() {
                    return Err(PatternError::EmptyOptional);
                }
                top.push(Node::Optional(nodes));
            }
        }

        if group.is_some() {
            return Err(PatternError::UnbalancedBracket);
        }

        if top.is_empty() {
            return Err(PatternError::Empty);
        }

        validate(&top)?;

        Ok(Template {
            source: pattern.to_string(),
            nodes: top,
            requirements: Vec::new(),
            defaults: Vec::new(),
        })
    }

    /// Attaches a regex requirement to the named parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::UnknownParameter`] when the pattern does not
    /// declare `name`, or [`PatternError::Requirement`] when the regex does
    /// not compile.
    pub fn with_requirement(mut self, name: &str, pattern: &str) -> Result<Template, PatternError> {
        if !self.declares(name) {
            return Err(PatternError::UnknownParameter(name.to_string()));
        }

        let regex = Regex::new(pattern).map_err(|source| PatternError::Requirement {
            name: name.to_string(),
            source,
        })?;

        self.requirements.push((name.to_string(), regex));

        Ok(self)
    }

    /// Attaches a default value used when the named optional parameter is
    /// absent from the input.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::UnknownParameter`] when the pattern does not
    /// declare `name`.
    pub fn with_default(mut self, name: &str, value: &str) -> Result<Template, PatternError> {
        if !self.declares(name) {
            return Err(PatternError::UnknownParameter(name.to_string()));
        }

        self.defaults.push((name.to_string(), value.to_string()));

        Ok(self)
    }

    /// Attempts to align `tokens` against the pattern structure.
    ///
    /// Optional groups are tried present-first and greedy parameters consume
    /// longest-first, so the alignment consuming the most concrete tokens
    /// wins. Returns `None` when no alignment exists. Requirements are not
    /// checked here; that is the matcher's job.
    #[must_use]
    pub fn try_match(&self, tokens: &[&str]) -> Option<Bindings> {
        let nodes: Vec<&Node> = self.nodes.iter().collect();
        let mut bound = Vec::new();

        if !match_seq(&nodes, tokens, &mut bound) {
            return None;
        }

        let mut bindings = Bindings::default();
        for (name, value) in bound {
            bindings.insert(name, value);
        }

        // Absent optional parameters fall back to their declared defaults.
        for (name, value) in &self.defaults {
            if !bindings.contains(name) {
                bindings.insert(name.clone(), Value::Single(value.clone()));
            }
        }

        Some(bindings)
    }

    /// Checks every requirement against the given bindings, returning the
    /// name of the first parameter whose bound value is rejected.
    #[must_use]
    pub fn unmet_requirement(&self, bindings: &Bindings) -> Option<&str> {
        for (name, regex) in &self.requirements {
            if let Some(value) = bindings.joined(name) {
                if !regex.is_match(&value) {
                    return Some(name);
                }
            }
        }

        None
    }

    /// The literal tokens of the pattern, in order, excluding optional
    /// groups. Used to derive authorization paths.
    #[must_use]
    pub fn literals(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Literal(word) => Some(word.as_str()),
                _ => None,
            })
            .collect()
    }

    /// A canonical skeleton with parameter names elided, used to detect
    /// ambiguous registrations.
    #[must_use]
    pub fn skeleton(&self) -> String {
        fn push(out: &mut String, node: &Node) {
            match node {
                Node::Literal(word) => out.push_str(&word.to_lowercase()),
                Node::Param { greedy: false, .. } => out.push(':'),
                Node::Param { greedy: true, .. } => out.push('*'),
                Node::Optional(nodes) => {
                    out.push('[');
                    for node in nodes {
                        push(out, node);
                        out.push(' ');
                    }
                    out.push(']');
                }
            }
        }

        let mut out = String::new();
        for node in &self.nodes {
            push(&mut out, node);
            out.push(' ');
        }
        out
    }

    /// The requirement set as (parameter, regex source) pairs, used to
    /// decide whether two identical skeletons are distinguishable.
    #[must_use]
    pub fn requirement_keys(&self) -> Vec<(&str, &str)> {
        let mut keys: Vec<_> = self
            .requirements
            .iter()
            .map(|(name, regex)| (name.as_str(), regex.as_str()))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// The original pattern string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    fn declares(&self, name: &str) -> bool {
        fn walk(nodes: &[Node], name: &str) -> bool {
            nodes.iter().any(|node| match node {
                Node::Param { name: n, .. } => n == name,
                Node::Optional(inner) => walk(inner, name),
                Node::Literal(_) => false,
            })
        }

        walk(&self.nodes, name)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn parse_node(token: &str) -> Result<Node, PatternError> {
    if let Some(name) = token.strip_prefix(':') {
        if name.is_empty() {
            return Err(PatternError::UnnamedParameter);
        }
        Ok(Node::Param {
            name: name.to_string(),
            greedy: false,
        })
    } else if let Some(name) = token.strip_prefix('*') {
        if name.is_empty() {
            return Err(PatternError::UnnamedParameter);
        }
        Ok(Node::Param {
            name: name.to_string(),
            greedy: true,
        })
    } else {
        Ok(Node::Literal(token.to_string()))
    }
}

fn validate(nodes: &[Node]) -> Result<(), PatternError> {
    let mut names = Vec::new();
    collect_names(nodes, &mut names)?;

    // A greedy inside an optional group must close the group; a top-level
    // greedy may only be followed by literals.
    for (i, node) in nodes.iter().enumerate() {
        match node {
            Node::Param { name, greedy: true } => {
                let tail_ok = nodes[i + 1..]
                    .iter()
                    .all(|n| matches!(n, Node::Literal(_)));
                if !tail_ok {
                    return Err(PatternError::GreedyNotLast(name.clone()));
                }
            }
            Node::Optional(inner) => {
                for (j, inner_node) in inner.iter().enumerate() {
                    if let Node::Param { name, greedy: true } = inner_node {
                        if j + 1 != inner.len() {
                            return Err(PatternError::GreedyNotLast(name.clone()));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn collect_names(nodes: &[Node], names: &mut Vec<String>) -> Result<(), PatternError> {
    for node in nodes {
        match node {
            Node::Param { name, .. } => {
                if names.iter().any(|n| n == name) {
                    return Err(PatternError::DuplicateParameter(name.clone()));
                }
                names.push(name.clone());
            }
            Node::Optional(inner) => collect_names(inner, names)?,
            Node::Literal(_) => {}
        }
    }

    Ok(())
}

/// Backtracking alignment of a node sequence against a token slice.
///
/// Bindings accumulate in `bound`; failed branches truncate back to their
/// checkpoint before returning.
fn match_seq(nodes: &[&Node], tokens: &[&str], bound: &mut Vec<(String, Value)>) -> bool {
    let Some((head, rest)) = nodes.split_first() else {
        return tokens.is_empty();
    };

    match head {
        Node::Literal(word) => match tokens.split_first() {
            Some((token, remaining)) if word.eq_ignore_ascii_case(token) => {
                match_seq(rest, remaining, bound)
            }
            _ => false,
        },
        Node::Param { name, greedy: false } => {
            let Some((token, remaining)) = tokens.split_first() else {
                return false;
            };

            let checkpoint = bound.len();
            bound.push((name.clone(), Value::Single((*token).to_string())));
            if match_seq(rest, remaining, bound) {
                return true;
            }
            bound.truncate(checkpoint);

            false
        }
        Node::Param { name, greedy: true } => {
            // Longest-first: a greedy prefers to swallow everything it can.
            for take in (1..=tokens.len()).rev() {
                let checkpoint = bound.len();
                let consumed = tokens[..take].iter().map(ToString::to_string).collect();
                bound.push((name.clone(), Value::Rest(consumed)));
                if match_seq(rest, &tokens[take..], bound) {
                    return true;
                }
                bound.truncate(checkpoint);
            }

            false
        }
        Node::Optional(group) => {
            // Present-first, so the alignment consuming more tokens wins.
            let mut with: Vec<&Node> = group.iter().collect();
            with.extend_from_slice(rest);

            let checkpoint = bound.len();
            if match_seq(&with, tokens, bound) {
                return true;
            }
            bound.truncate(checkpoint);

            match_seq(rest, tokens, bound)
        }
    }
}
