//! Read-only projections of a [`PackageMapping`] for reporting.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::location::MapResult;
use crate::core::mapping::PackageMapping;

/// Token standing in for a file no rule matched.
pub const UNMAPPED: &str = "(unmapped)";

/// One row of [`PackageMapping::export`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    #[serde(rename = "OldName")]
    pub old_name: String,
    #[serde(rename = "NewRepo", skip_serializing_if = "Option::is_none")]
    pub new_repo: Option<String>,
    #[serde(rename = "NewPackage", skip_serializing_if = "Option::is_none")]
    pub new_package: Option<String>,
    #[serde(rename = "NewName", skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(rename = "Dependency Count")]
    pub dependency_count: usize,
    /// Distinct destination packages depended upon, own package excluded.
    #[serde(rename = "Package Dependencies")]
    pub package_dependencies: Vec<String>,
    /// `repo:path` per dependency, or the old name when unmapped.
    pub dependencies: Vec<String>,
}

/// Package -> other packages its files depend on.
pub type PackageChart = BTreeMap<String, Vec<String>>;

impl PackageMapping {
    /// One record per graph node, sorted by destination repo then path
    /// (old name when unmapped).
    pub fn export(&self) -> Vec<ExportRecord> {
        let mut records: Vec<ExportRecord> = self
            .dep_map()
            .iter()
            .map(|entry| {
                let own = entry.name.location();
                let mut package_dependencies = Vec::new();
                for dep in entry.dependency_map.iter().filter_map(MapResult::location) {
                    if own.is_some_and(|own| own.package == dep.package) {
                        continue;
                    }
                    push_unique(&mut package_dependencies, &dep.package);
                }
                ExportRecord {
                    old_name: entry.name.old_name().to_string(),
                    new_repo: own.map(|l| l.repo.clone()),
                    new_package: own.map(|l| l.package.clone()),
                    new_name: own.map(|l| l.path.clone()),
                    dependency_count: entry.dependency_map.len(),
                    package_dependencies,
                    dependencies: entry.dependency_map.iter().map(qualified).collect(),
                }
            })
            .collect();
        records.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        records
    }

    /// Package-level adjacency list. Files are grouped by package (repo when
    /// the package is `N/A`); unmapped files are grouped under `(unmapped)`.
    /// Each list is deduplicated in first-seen order and has no self-edges.
    pub fn export_package_dependencies_chart(&self) -> PackageChart {
        let mut chart = PackageChart::new();
        for entry in self.dep_map() {
            let key = entry
                .name
                .location()
                .map_or(UNMAPPED, |l| l.package_or_repo())
                .to_string();
            let deps = chart.entry(key.clone()).or_default();
            for dep in &entry.dependency_map {
                let name = dep.location().map_or(UNMAPPED, |l| l.package_or_repo());
                if name != key {
                    push_unique(deps, name);
                }
            }
        }
        chart
    }
}

fn qualified(result: &MapResult) -> String {
    result
        .location()
        .map_or_else(|| result.old_name().to_string(), |l| l.qualified_name())
}

fn sort_key(record: &ExportRecord) -> (&str, &str) {
    (
        record.new_repo.as_deref().unwrap_or(""),
        record.new_name.as_deref().unwrap_or(&record.old_name),
    )
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}
