//! Load the mapping config and dependency graph from disk.

use std::fs;
use std::path::Path;

use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::graph::{DependencyGraph, GraphFilter};
use crate::core::mapping::{MappingConfig, MappingConfigJson, PackageMapping};
use crate::error::MappingError;

pub const PACKAGE_MAP_SCHEMA: &str = include_str!("../../schemas/package_map.schema.json");

/// Read, schema-validate and compile a `PackageMap.json`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_mapping_config(path: &Path) -> Result<MappingConfig, MappingError> {
    let config_load = |reason: String| MappingError::ConfigLoad {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|err| config_load(err.to_string()))?;
    let value: Value = serde_json::from_str(&raw).map_err(|err| config_load(err.to_string()))?;
    validate_package_map(&value).map_err(config_load)?;
    let json: MappingConfigJson =
        serde_json::from_value(value).map_err(|err| config_load(err.to_string()))?;
    let config = MappingConfig::from_json(json)?;
    debug!(rules = config.rules().len(), "loaded mapping config");
    Ok(config)
}

/// Read a dependency graph in either encoding.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_dependency_graph(
    path: &Path,
    filter: &GraphFilter,
) -> Result<DependencyGraph, MappingError> {
    let graph_load = |reason: String| MappingError::GraphLoad {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|err| graph_load(err.to_string()))?;
    let graph = DependencyGraph::from_json(&raw, filter).map_err(|err| graph_load(err.to_string()))?;
    debug!(nodes = graph.len(), "loaded dependency graph");
    Ok(graph)
}

fn validate_package_map(instance: &Value) -> Result<(), String> {
    let schema: Value = serde_json::from_str(PACKAGE_MAP_SCHEMA)
        .map_err(|err| format!("parse package map schema: {err}"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile package map schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}

impl PackageMapping {
    /// Load both inputs and build the mapping. Nothing in the repository is
    /// touched.
    pub fn load(graph_path: &Path, config_path: &Path) -> Result<Self, MappingError> {
        Self::load_with_filter(graph_path, config_path, &GraphFilter::default())
    }

    pub fn load_with_filter(
        graph_path: &Path,
        config_path: &Path,
        filter: &GraphFilter,
    ) -> Result<Self, MappingError> {
        let config = load_mapping_config(config_path)?;
        let graph = load_dependency_graph(graph_path, filter)?;
        Ok(Self::new(config, &graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn loads_flat_graph_and_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = write(
            temp.path(),
            "graph.json",
            r#"{"lib/index.ts": ["lib/mapping.ts"], "lib/mapping.ts": []}"#,
        );
        let config = write(
            temp.path(),
            "map.json",
            r#"{"OldPatterns": {"^lib/mapping\\.ts$": {"Repo": "new", "Package": "new", "Path": "src/mapping.ts"}}}"#,
        );
        let mapping = PackageMapping::load(&graph, &config).expect("load");
        assert_eq!(mapping.dep_map().len(), 2);
        assert!(mapping.dep_map()[1].name.is_mapped());
    }

    #[test]
    fn missing_config_is_config_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = write(temp.path(), "graph.json", "{}");
        let err = PackageMapping::load(&graph, &temp.path().join("absent.json"))
            .expect_err("missing");
        assert!(matches!(err, MappingError::ConfigLoad { .. }));
    }

    #[test]
    fn malformed_graph_is_graph_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = write(temp.path(), "graph.json", "[1, 2");
        let config = write(temp.path(), "map.json", r#"{"OldPatterns": {}}"#);
        let err = PackageMapping::load(&graph, &config).expect_err("malformed");
        assert!(matches!(err, MappingError::GraphLoad { .. }));
    }

    #[test]
    fn schema_rejects_location_without_repo() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = write(
            temp.path(),
            "map.json",
            r#"{"OldPatterns": {"^a$": {"Package": "p", "Path": "b"}}}"#,
        );
        let err = load_mapping_config(&config).expect_err("invalid");
        match err {
            MappingError::ConfigLoad { reason, .. } => {
                assert!(reason.contains("schema validation failed"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_regex_is_invalid_pattern() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = write(
            temp.path(),
            "map.json",
            r#"{"OldPatterns": {"lib/(": {"Repo": "r", "Package": "p", "Path": "x"}}}"#,
        );
        let err = load_mapping_config(&config).expect_err("bad regex");
        assert!(matches!(err, MappingError::InvalidPattern { .. }));
    }

    #[test]
    fn module_list_graph_is_filtered() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = write(
            temp.path(),
            "graph.json",
            r#"{
                "modules": [
                    {"source": "lib/index.ts", "dependencies": [
                        {"resolved": "lib/git.ts"},
                        {"resolved": "node_modules/lodash/index.js"},
                        {"resolved": "fs", "coreModule": true},
                        {"resolved": "lib/theme.css"}
                    ]},
                    {"source": "node_modules/lodash/index.js", "dependencies": []}
                ],
                "summary": {}
            }"#,
        );
        let graph = load_dependency_graph(&graph, &GraphFilter::default()).expect("load");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edges()["lib/index.ts"], vec!["lib/git.ts".to_string()]);
    }
}
