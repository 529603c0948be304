//! Value types describing where a file lives now and where it will live.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel repo/package name meaning "no destination": the file stays in
/// the originating repository.
pub const NOT_APPLICABLE: &str = "N/A";

/// Destination of a file after the split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    pub repo: String,
    pub package: String,
    /// Destination-relative file path.
    pub path: String,
    /// Tie-breaker between overlapping rules (lower sorts first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl Location {
    pub fn new(repo: impl Into<String>, package: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            package: package.into(),
            path: path.into(),
            order: None,
        }
    }

    /// Package name used for package-level grouping: the package, or the
    /// repo when the package is the `N/A` sentinel.
    pub fn package_or_repo(&self) -> &str {
        if self.package == NOT_APPLICABLE {
            &self.repo
        } else {
            &self.package
        }
    }

    /// `repo:path`, as shown in exports.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.repo, self.path)
    }

    pub fn is_sentinel_repo(&self) -> bool {
        self.repo == NOT_APPLICABLE
    }
}

/// Classification of a single old path.
///
/// `old_name` never changes after construction. The result is either mapped
/// (`new` present) or unmapped (no rule matched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapResult {
    old_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    new: Option<Location>,
}

impl MapResult {
    pub fn new(old_name: impl Into<String>, new: Option<Location>) -> Self {
        Self {
            old_name: old_name.into(),
            new,
        }
    }

    pub fn old_name(&self) -> &str {
        &self.old_name
    }

    pub fn location(&self) -> Option<&Location> {
        self.new.as_ref()
    }

    pub fn is_mapped(&self) -> bool {
        self.new.is_some()
    }

    pub fn is_unmapped(&self) -> bool {
        self.new.is_none()
    }

    /// True when the file is mapped and its destination path differs from
    /// the old one.
    pub fn moves(&self) -> bool {
        self.new
            .as_ref()
            .is_some_and(|location| location.path != self.old_name)
    }
}

impl fmt::Display for MapResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.new {
            Some(location) => write!(f, "{} -> {}", self.old_name, location.qualified_name()),
            None => write!(f, "{} (unmapped)", self.old_name),
        }
    }
}
