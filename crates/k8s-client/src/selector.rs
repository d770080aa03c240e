//! Label and field selectors
//!
//! Selectors are built clause by clause and rendered in call order using the
//! Kubernetes selector grammar:
//!
//! - `key=value`, `key!=value`
//! - `key` (exists), `!key` (does not exist)
//! - `key in (a,b)`, `key notin (a,b)`
//!
//! Field selectors only support `=` and `!=`.

use crate::error::Error;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One clause of a label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value`
    Equals {
        /// Label key
        key: String,
        /// Required value
        value: String,
    },
    /// `key!=value`
    NotEquals {
        /// Label key
        key: String,
        /// Excluded value
        value: String,
    },
    /// `key`
    Exists {
        /// Label key
        key: String,
    },
    /// `!key`
    NotExists {
        /// Label key
        key: String,
    },
    /// `key in (v1,v2)`
    In {
        /// Label key
        key: String,
        /// Accepted values
        values: Vec<String>,
    },
    /// `key notin (v1,v2)`
    NotIn {
        /// Label key
        key: String,
        /// Excluded values
        values: Vec<String>,
    },
}

impl Requirement {
    /// Label key this clause tests
    pub fn key(&self) -> &str {
        match self {
            Requirement::Equals { key, .. }
            | Requirement::NotEquals { key, .. }
            | Requirement::Exists { key }
            | Requirement::NotExists { key }
            | Requirement::In { key, .. }
            | Requirement::NotIn { key, .. } => key,
        }
    }

    /// Evaluate the clause against a label set
    ///
    /// Negative clauses (`!=`, `notin`) match objects that lack the key.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(self.key());
        match self {
            Requirement::Equals { value, .. } => actual == Some(value),
            Requirement::NotEquals { value, .. } => actual != Some(value),
            Requirement::Exists { .. } => actual.is_some(),
            Requirement::NotExists { .. } => actual.is_none(),
            Requirement::In { values, .. } => actual.is_some_and(|v| values.contains(v)),
            Requirement::NotIn { values, .. } => !actual.is_some_and(|v| values.contains(v)),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals { key, value } => write!(f, "{}={}", key, value),
            Requirement::NotEquals { key, value } => write!(f, "{}!={}", key, value),
            Requirement::Exists { key } => write!(f, "{}", key),
            Requirement::NotExists { key } => write!(f, "!{}", key),
            Requirement::In { key, values } => write!(f, "{} in ({})", key, values.join(",")),
            Requirement::NotIn { key, values } => write!(f, "{} notin ({})", key, values.join(",")),
        }
    }
}

/// Ordered conjunction of label requirements
///
/// Builder methods check keys and values against the label syntax. An invalid
/// clause is left out of the selector and the first such error is kept;
/// [`LabelSelector::validate`] reports it and list/watch refuse the selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
    invalid: Option<String>,
}

impl LabelSelector {
    /// Empty selector (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key=value`
    #[must_use]
    pub fn eq(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Requirement::Equals {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Require `key!=value`
    #[must_use]
    pub fn not_eq(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Requirement::NotEquals {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Require that `key` is present
    #[must_use]
    pub fn exists(self, key: impl Into<String>) -> Self {
        self.push(Requirement::Exists { key: key.into() })
    }

    /// Require that `key` is absent
    #[must_use]
    pub fn not_exists(self, key: impl Into<String>) -> Self {
        self.push(Requirement::NotExists { key: key.into() })
    }

    /// Require that `key` has one of `values`
    #[must_use]
    pub fn in_values<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Requirement::In {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Require that `key` has none of `values`
    #[must_use]
    pub fn not_in_values<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Requirement::NotIn {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    fn push(mut self, requirement: Requirement) -> Self {
        match check_requirement(&requirement) {
            Ok(()) => self.requirements.push(requirement),
            Err(reason) => {
                self.invalid.get_or_insert(reason);
            }
        }
        self
    }

    /// Clauses in the order they were added
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether the selector has no clauses
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// First invalid key or value passed to the builder
    pub fn validate(&self) -> Result<(), Error> {
        match &self.invalid {
            Some(reason) => Err(Error::InvalidArgument(reason.clone())),
            None => Ok(()),
        }
    }

    /// Whether every clause holds for `labels`
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::new();
        for clause in split_clauses(s)? {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let requirement = parse_requirement(clause)?;
            check_requirement(&requirement)
                .map_err(|reason| Error::InvalidArgument(format!("{} in clause {:?}", reason, clause)))?;
            selector.requirements.push(requirement);
        }
        Ok(selector)
    }
}

/// Split on commas that are not inside a value set
fn split_clauses(s: &str) -> Result<Vec<&str>, Error> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::InvalidArgument(format!("unbalanced ')' in selector {:?}", s))
                })?;
            }
            ',' if depth == 0 => {
                clauses.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::InvalidArgument(format!(
            "unbalanced '(' in selector {:?}",
            s
        )));
    }
    clauses.push(&s[start..]);
    Ok(clauses)
}

fn parse_requirement(clause: &str) -> Result<Requirement, Error> {
    if let Some(open) = clause.find('(') {
        let mut head = clause[..open].split_whitespace();
        let (Some(key), Some(op), None) = (head.next(), head.next(), head.next()) else {
            return Err(invalid_clause(clause));
        };
        let set = clause[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| invalid_clause(clause))?;
        let values: Vec<String> = if set.trim().is_empty() {
            Vec::new()
        } else {
            set.split(',').map(|v| v.trim().to_string()).collect()
        };
        let key = checked_key(key, clause)?;
        return match op {
            "in" => Ok(Requirement::In { key, values }),
            "notin" => Ok(Requirement::NotIn { key, values }),
            _ => Err(invalid_clause(clause)),
        };
    }

    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement::NotExists {
            key: checked_key(key.trim(), clause)?,
        });
    }

    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement::NotEquals {
            key: checked_key(key.trim(), clause)?,
            value: value.trim().to_string(),
        });
    }

    let pair = clause.split_once("==").or_else(|| clause.split_once('='));
    match pair {
        Some((key, value)) => Ok(Requirement::Equals {
            key: checked_key(key.trim(), clause)?,
            value: value.trim().to_string(),
        }),
        None => Ok(Requirement::Exists {
            key: checked_key(clause, clause)?,
        }),
    }
}

fn checked_key(key: &str, clause: &str) -> Result<String, Error> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(invalid_clause(clause));
    }
    Ok(key.to_string())
}

/// Check a clause against label key/value syntax
fn check_requirement(requirement: &Requirement) -> Result<(), String> {
    check_label_key(requirement.key())?;
    match requirement {
        Requirement::Equals { value, .. } | Requirement::NotEquals { value, .. } => {
            check_label_value(requirement.key(), value)
        }
        Requirement::In { key, values } | Requirement::NotIn { key, values } => {
            if values.is_empty() {
                return Err(format!("label {:?}: value set must not be empty", key));
            }
            for value in values {
                if value.is_empty() {
                    return Err(format!("label {:?}: value set must not contain empty values", key));
                }
                check_label_value(key, value)?;
            }
            Ok(())
        }
        Requirement::Exists { .. } | Requirement::NotExists { .. } => Ok(()),
    }
}

/// `[prefix/]name`: prefix a DNS subdomain, name at most 63 characters
fn check_label_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(format!("invalid label key {:?}: prefix must be a DNS subdomain", key));
        }
    }
    if !is_label_name(name) {
        return Err(format!(
            "invalid label key {:?}: name must be 1-63 characters of [A-Za-z0-9._-], starting and ending with an alphanumeric",
            key
        ));
    }
    Ok(())
}

fn check_label_value(key: &str, value: &str) -> Result<(), String> {
    if value.is_empty() || is_label_name(value) {
        Ok(())
    } else {
        Err(format!(
            "invalid value {:?} for label {:?}: must be empty or 1-63 characters of [A-Za-z0-9._-], starting and ending with an alphanumeric",
            value, key
        ))
    }
}

fn is_label_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}

fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|part| {
            let bytes = part.as_bytes();
            match (bytes.first(), bytes.last()) {
                (Some(first), Some(last)) => {
                    first.is_ascii_alphanumeric()
                        && last.is_ascii_alphanumeric()
                        && bytes
                            .iter()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
                }
                _ => false,
            }
        })
}

fn invalid_clause(clause: &str) -> Error {
    Error::InvalidArgument(format!("invalid selector clause {:?}", clause))
}

/// Field selector operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
}

/// One clause of a field selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    /// Dotted field path, e.g. `metadata.name`
    pub path: String,
    /// Comparison applied to the field
    pub operator: FieldOperator,
    /// Unescaped value to compare against
    pub value: String,
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operator {
            FieldOperator::Equals => "=",
            FieldOperator::NotEquals => "!=",
        };
        write!(f, "{}{}{}", self.path, op, escape_field_value(&self.value))
    }
}

/// Ordered conjunction of field requirements
///
/// Values may hold any text; `\`, `,` and `=` are escaped with a backslash
/// on the wire. Paths are checked by the builder the same way label keys are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
    invalid: Option<String>,
}

impl FieldSelector {
    /// Empty selector (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `path=value`
    #[must_use]
    pub fn eq(self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(path.into(), FieldOperator::Equals, value.into())
    }

    /// Require `path!=value`
    #[must_use]
    pub fn not_eq(self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(path.into(), FieldOperator::NotEquals, value.into())
    }

    fn push(mut self, path: String, operator: FieldOperator, value: String) -> Self {
        if is_field_path(&path) {
            self.requirements.push(FieldRequirement { path, operator, value });
        } else {
            self.invalid
                .get_or_insert_with(|| format!("invalid field path {:?}", path));
        }
        self
    }

    /// Clauses in the order they were added
    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    /// Whether the selector has no clauses
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// First invalid path passed to the builder
    pub fn validate(&self) -> Result<(), Error> {
        match &self.invalid {
            Some(reason) => Err(Error::InvalidArgument(reason.clone())),
            None => Ok(()),
        }
    }

    /// Evaluate against a JSON object, resolving dotted paths
    ///
    /// Missing fields compare as the empty string, as the API server does.
    pub fn matches(&self, object: &serde_json::Value) -> bool {
        self.requirements.iter().all(|r| {
            let pointer = format!("/{}", r.path.replace('.', "/"));
            let actual = match object.pointer(&pointer) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            match r.operator {
                FieldOperator::Equals => actual == r.value,
                FieldOperator::NotEquals => actual != r.value,
            }
        })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&clauses.join(","))
    }
}

impl FromStr for FieldSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = FieldSelector::new();
        for clause in split_unescaped(s).into_iter().map(str::trim).filter(|c| !c.is_empty()) {
            let (path, operator, raw) = split_field_clause(clause).ok_or_else(|| invalid_clause(clause))?;
            let path = path.trim();
            if !is_field_path(path) {
                return Err(invalid_clause(clause));
            }
            let value = unescape_field_value(raw.trim()).ok_or_else(|| invalid_clause(clause))?;
            selector.requirements.push(FieldRequirement {
                path: path.to_string(),
                operator,
                value,
            });
        }
        Ok(selector)
    }
}

fn is_field_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
}

fn escape_field_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Undo `escape_field_value`; `None` on a dangling or unknown escape or a bare `,`/`=`
fn unescape_field_value(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('\\' | ',' | '=')) => out.push(escaped),
                _ => return None,
            },
            ',' | '=' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Split on commas not preceded by a backslash escape
fn split_unescaped(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split `path<op>value` at the first operator
fn split_field_clause(clause: &str) -> Option<(&str, FieldOperator, &str)> {
    let eq = clause.find('=')?;
    let path = &clause[..eq];
    let rest = &clause[eq + 1..];
    if let Some(path) = path.strip_suffix('!') {
        return Some((path, FieldOperator::NotEquals, rest));
    }
    Some((path, FieldOperator::Equals, rest.strip_prefix('=').unwrap_or(rest)))
}
