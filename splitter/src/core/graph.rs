//! Dependency-graph normalization and inversion.
//!
//! Two encodings are accepted: a flat adjacency list (madge style) and a
//! module list (dependency-cruiser style). The shape is decided once, at
//! deserialization, and immediately normalized to [`DependencyGraph`].

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Normalized `old path -> [old path]` adjacency list, in source key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: IndexMap<String, Vec<String>>,
}

/// Graph file contents before normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawGraph {
    ModuleList(ModuleListGraph),
    Flat(IndexMap<String, Vec<String>>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleListGraph {
    pub modules: Vec<GraphModule>,
    /// Only its presence matters for shape detection.
    pub summary: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphModule {
    pub source: String,
    #[serde(default)]
    pub dependencies: Vec<GraphDependency>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDependency {
    pub resolved: String,
    #[serde(default)]
    pub core_module: bool,
    #[serde(default)]
    pub could_not_resolve: bool,
}

/// Paths dropped while flattening the module-list form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFilter {
    pub vendor_dir: String,
    pub asset_extensions: Vec<String>,
}

impl Default for GraphFilter {
    fn default() -> Self {
        Self {
            vendor_dir: "node_modules".to_string(),
            asset_extensions: ["css", "scss", "sass", "less", "styl"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl GraphFilter {
    /// True for paths that belong in the graph.
    pub fn keeps(&self, path: &str) -> bool {
        if path.starts_with('@') {
            return false;
        }
        if path
            .split(['/', '\\'])
            .any(|segment| segment == self.vendor_dir)
        {
            return false;
        }
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((_, ext)) => !self
                .asset_extensions
                .iter()
                .any(|asset| asset.eq_ignore_ascii_case(ext)),
            None => true,
        }
    }
}

impl RawGraph {
    pub fn normalize(self, filter: &GraphFilter) -> DependencyGraph {
        match self {
            RawGraph::Flat(edges) => DependencyGraph { edges },
            RawGraph::ModuleList(list) => {
                let edges = list
                    .modules
                    .into_iter()
                    .filter(|module| filter.keeps(&module.source))
                    .map(|module| {
                        let deps = module
                            .dependencies
                            .into_iter()
                            .filter(|dep| !dep.core_module && !dep.could_not_resolve)
                            .map(|dep| dep.resolved)
                            .filter(|resolved| filter.keeps(resolved))
                            .collect();
                        (module.source, deps)
                    })
                    .collect();
                DependencyGraph { edges }
            }
        }
    }
}

impl DependencyGraph {
    pub fn from_edges<K, V, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            edges: edges
                .into_iter()
                .map(|(k, deps)| (k.into(), deps.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Parse either graph encoding from JSON text.
    pub fn from_json(raw: &str, filter: &GraphFilter) -> serde_json::Result<Self> {
        let raw: RawGraph = serde_json::from_str(raw)?;
        Ok(raw.normalize(filter))
    }

    pub fn edges(&self) -> &IndexMap<String, Vec<String>> {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn inverse(&self) -> IndexMap<String, Vec<String>> {
        inverse_dependencies(&self.edges)
    }
}

/// Reverse adjacency list: for every edge `A -> B`, `B -> A`.
///
/// Nodes nothing depends on are absent from the result.
pub fn inverse_dependencies(graph: &IndexMap<String, Vec<String>>) -> IndexMap<String, Vec<String>> {
    let mut dependents: IndexMap<String, Vec<String>> = IndexMap::new();
    for (source, targets) in graph {
        for target in targets {
            dependents
                .entry(target.clone())
                .or_default()
                .push(source.clone());
        }
    }
    dependents
}
