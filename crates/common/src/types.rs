use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered string key/value list.
///
/// Iteration follows insertion order. Inserting an existing key replaces its
/// value in place, so a bag never holds the same key twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBag(Vec<(String, String)>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Copy of this bag with keys in lexicographic order.
    pub fn sorted(&self) -> Self {
        let mut entries = self.0.clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self(entries)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

impl<'a> IntoIterator for &'a PropertyBag {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// What a restored algorithm should do once it is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmAction {
    /// Recreate the algorithm's editor and wait for the user.
    #[default]
    Load,
    /// Recreate and run immediately (batch files).
    Execute,
}

impl AlgorithmAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for AlgorithmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown algorithm action: {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for AlgorithmAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(Self::Load),
            "execute" => Ok(Self::Execute),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

/// Messages accumulated while a model validates itself.
///
/// Only `Error` messages make a model unfit for restoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    messages: Vec<ValidationMessage>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Info, field, message);
    }

    pub fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, field, message);
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, field, message);
    }

    fn push(&mut self, severity: Severity, field: impl Into<String>, message: impl Into<String>) {
        self.messages.push(ValidationMessage {
            severity,
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn contains_error(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn messages(&self) -> &[ValidationMessage] {
        &self.messages
    }

    /// The error messages joined into one line, for logging.
    pub fn error_summary(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .map(|m| format!("{}: {}", m.field, m.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
