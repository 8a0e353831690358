//! Plugin applicability filters.
//!
//! A filter selects the requests a plugin applies to by resource kind, and
//! excludes whole namespaces. `"*"` (or an empty kind) stands for every kind.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespaces skipped when a plugin config does not name its own list.
pub const DEFAULT_IGNORED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-admission"];

/// Wire form of [`FilterKind::All`].
pub const FILTER_ALL: &str = "*";

/// Resource kind a filter applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterKind {
    #[default]
    All,
    Kind(String),
}

impl From<String> for FilterKind {
    fn from(s: String) -> Self {
        if s.is_empty() || s == FILTER_ALL {
            FilterKind::All
        } else {
            FilterKind::Kind(s)
        }
    }
}

impl From<&str> for FilterKind {
    fn from(s: &str) -> Self {
        FilterKind::from(s.to_string())
    }
}

impl From<FilterKind> for String {
    fn from(k: FilterKind) -> Self {
        match k {
            FilterKind::All => FILTER_ALL.to_string(),
            FilterKind::Kind(s) => s,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::All => f.write_str(FILTER_ALL),
            FilterKind::Kind(k) => f.write_str(k),
        }
    }
}

/// Applicability predicate of a plugin. Immutable once the plugin is built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub kind: FilterKind,
    pub ignored_namespaces: BTreeSet<String>,
}

impl Filter {
    pub fn new<I, S>(kind: impl Into<FilterKind>, ignored_namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: kind.into(),
            ignored_namespaces: ignored_namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Filter on `kind` with the default ignored namespaces.
    pub fn with_default_ignores(kind: impl Into<FilterKind>) -> Self {
        Self::new(kind, DEFAULT_IGNORED_NAMESPACES)
    }

    /// Decide whether a request in `namespace` for `kind` is subject to the plugin.
    ///
    /// An ignored namespace never matches, whatever the kind. An empty
    /// namespace (cluster-scoped object) is never considered ignored.
    pub fn matches(&self, namespace: &str, kind: &str) -> bool {
        if !namespace.is_empty() && self.ignored_namespaces.contains(namespace) {
            return false;
        }
        match &self.kind {
            FilterKind::All => true,
            FilterKind::Kind(k) => k == kind,
        }
    }
}
