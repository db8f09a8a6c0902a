//! Field names, field groups and per-table field presence.
//!
//! Field names are compared in canonical form (trimmed, lower-case) so that
//! a cached column written as `PE_TTM` satisfies a request for `pe_ttm`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical factor name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldName(String);

impl FieldName {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FieldName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<FieldName> for String {
    fn from(f: FieldName) -> Self {
        f.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A static partition of the field set sharing one options string.
///
/// The provider needs different supplemental parameters for different
/// factor families, so each group is fetched with its own call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub name: String,
    /// Supplemental request parameters passed through verbatim.
    #[serde(default)]
    pub options: String,
    pub fields: Vec<FieldName>,
}

impl FieldGroup {
    pub fn new(name: &str, options: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            options: options.to_string(),
            fields: fields.iter().map(|f| FieldName::new(f)).collect(),
        }
    }

    /// Fields of this group not flagged present, in group order.
    pub fn missing(&self, presence: &FieldPresence) -> Vec<FieldName> {
        self.fields
            .iter()
            .filter(|f| !presence.is_present(f))
            .cloned()
            .collect()
    }
}

/// Presence flag per catalog field for one cached table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPresence {
    flags: BTreeMap<FieldName, bool>,
}

impl FieldPresence {
    /// Flag each group field according to whether `columns` contains it.
    pub fn evaluate<'a>(
        groups: &[FieldGroup],
        columns: impl IntoIterator<Item = &'a FieldName>,
    ) -> Self {
        let mut flags: BTreeMap<FieldName, bool> = groups
            .iter()
            .flat_map(|g| g.fields.iter().cloned())
            .map(|f| (f, false))
            .collect();
        for column in columns {
            if let Some(flag) = flags.get_mut(column) {
                *flag = true;
            }
        }
        Self { flags }
    }

    /// Unknown fields count as absent.
    pub fn is_present(&self, field: &FieldName) -> bool {
        self.flags.get(field).copied().unwrap_or(false)
    }

    pub fn missing_count(&self) -> usize {
        self.flags.values().filter(|p| !**p).count()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, bool)> {
        self.flags.iter().map(|(f, p)| (f, *p))
    }
}
