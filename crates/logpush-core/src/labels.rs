//! Stream label sets and label selectors.
//!
//! Label sets use the `{name="value", ...}` syntax. Selectors use the same
//! syntax with `=` and `!=` matchers and are used by retention, policy and
//! drop rules.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelsError {
    #[error("label set must be wrapped in braces: {0}")]
    MissingBraces(String),
    #[error("invalid label name '{name}' in {input}")]
    InvalidName { name: String, input: String },
    #[error("expected {expected} at offset {offset} in {input}")]
    Unexpected {
        expected: &'static str,
        offset: usize,
        input: String,
    },
    #[error("unterminated quoted value in {0}")]
    Unterminated(String),
    #[error("duplicate label name '{name}' in {input}")]
    Duplicate { name: String, input: String },
    #[error("label set must not be empty")]
    Empty,
}

/// Sorted, duplicate-free set of stream labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    /// Build a label set from pairs; pairs are sorted by name.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, LabelsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        labels.sort();
        for pair in labels.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(LabelsError::Duplicate {
                    name: pair[0].0.clone(),
                    input: format!("{:?}", labels),
                });
            }
        }
        for (name, _) in &labels {
            if !is_valid_label_name(name) {
                return Err(LabelsError::InvalidName {
                    name: name.clone(),
                    input: format!("{:?}", labels),
                });
            }
        }
        Ok(Self(labels))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromStr for Labels {
    type Err = LabelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let matchers = parse_matchers(s, false)?;
        if matchers.is_empty() {
            return Err(LabelsError::Empty);
        }
        Labels::from_pairs(matchers.into_iter().map(|m| (m.name, m.value)))
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"{}\"", name, escape(value))?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

impl Matcher {
    /// A missing label matches as the empty string
    pub fn matches(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.name).unwrap_or("");
        match self.op {
            MatchOp::Equal => actual == self.value,
            MatchOp::NotEqual => actual != self.value,
        }
    }
}

/// Conjunction of label matchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    matchers: Vec<Matcher>,
}

impl Selector {
    pub fn matches(&self, labels: &Labels) -> bool {
        self.matchers.iter().all(|m| m.matches(labels))
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = LabelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let matchers = parse_matchers(s, true)?;
        if matchers.is_empty() {
            return Err(LabelsError::Empty);
        }
        Ok(Self {
            source: s.trim().to_string(),
            matchers,
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn parse_matchers(input: &str, allow_negation: bool) -> Result<Vec<Matcher>, LabelsError> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| LabelsError::MissingBraces(input.to_string()))?;

    let unexpected = |expected: &'static str, offset: usize| LabelsError::Unexpected {
        expected,
        offset: offset + 1,
        input: input.to_string(),
    };

    let bytes: Vec<char> = body.chars().collect();
    let mut pos = 0;
    let mut matchers = Vec::new();

    let skip_ws = |pos: &mut usize| {
        while *pos < bytes.len() && bytes[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    loop {
        skip_ws(&mut pos);
        if pos >= bytes.len() {
            break;
        }

        let start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == '_') {
            pos += 1;
        }
        let name: String = bytes[start..pos].iter().collect();
        if !is_valid_label_name(&name) {
            return Err(LabelsError::InvalidName {
                name,
                input: input.to_string(),
            });
        }

        skip_ws(&mut pos);
        let op = match (bytes.get(pos), bytes.get(pos + 1)) {
            (Some('!'), Some('=')) if allow_negation => {
                pos += 2;
                MatchOp::NotEqual
            }
            (Some('='), _) => {
                pos += 1;
                MatchOp::Equal
            }
            _ => return Err(unexpected("'='", pos)),
        };

        skip_ws(&mut pos);
        if bytes.get(pos) != Some(&'"') {
            return Err(unexpected("'\"'", pos));
        }
        pos += 1;

        let mut value = String::new();
        loop {
            match bytes.get(pos) {
                None => return Err(LabelsError::Unterminated(input.to_string())),
                Some('"') => {
                    pos += 1;
                    break;
                }
                Some('\\') => {
                    match bytes.get(pos + 1) {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(c) => value.push(*c),
                        None => return Err(LabelsError::Unterminated(input.to_string())),
                    }
                    pos += 2;
                }
                Some(c) => {
                    value.push(*c);
                    pos += 1;
                }
            }
        }

        matchers.push(Matcher { name, op, value });

        skip_ws(&mut pos);
        match bytes.get(pos) {
            None => break,
            Some(',') => pos += 1,
            Some(_) => return Err(unexpected("',' or '}'", pos)),
        }
    }

    Ok(matchers)
}
