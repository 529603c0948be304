//! Package mapping: ordered regex rules classifying every old path into a
//! destination [`Location`], applied over a dependency graph.

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::core::graph::DependencyGraph;
use crate::core::location::{Location, MapResult};
use crate::error::MappingError;

pub const DEFAULT_BRANCH_PREFIX: &str = "split/";

/// Mapping config file contents (`PackageMap.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MappingConfigJson {
    pub old_patterns: IndexMap<String, Location>,
    #[serde(default)]
    pub branch_prefix: Option<String>,
}

/// One compiled classification rule.
#[derive(Debug, Clone)]
pub struct PackageRule {
    pattern: Regex,
    template: Location,
    replacement: Vec<Piece>,
}

impl PackageRule {
    pub fn new(pattern: &str, template: Location) -> Result<Self, MappingError> {
        let regex = Regex::new(pattern).map_err(|source| MappingError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let replacement = parse_replacement(&template.path, &regex);
        Ok(Self {
            pattern: regex,
            template,
            replacement,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn apply(&self, old_path: &str) -> Option<Location> {
        let caps = self.pattern.captures(old_path)?;
        let matched = caps.get(0)?;
        let mut path = String::with_capacity(old_path.len() + 16);
        path.push_str(&old_path[..matched.start()]);
        for piece in &self.replacement {
            piece.expand(&caps, old_path, &mut path);
        }
        path.push_str(&old_path[matched.end()..]);
        Some(Location {
            path,
            ..self.template.clone()
        })
    }
}

/// Ordered rules plus the split branch prefix.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    rules: Vec<PackageRule>,
    branch_prefix: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        }
    }
}

impl MappingConfig {
    /// Compile rules in evaluation order: ascending `Order` (missing = 0),
    /// ties keep declaration order.
    pub fn from_rules<I, P>(rules: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (P, Location)>,
        P: AsRef<str>,
    {
        let mut compiled = rules
            .into_iter()
            .map(|(pattern, template)| PackageRule::new(pattern.as_ref(), template))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.sort_by_key(|rule| rule.template.order.unwrap_or(0));
        Ok(Self {
            rules: compiled,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        })
    }

    pub fn from_json(json: MappingConfigJson) -> Result<Self, MappingError> {
        let config = Self::from_rules(json.old_patterns)?;
        Ok(match json.branch_prefix {
            Some(prefix) => config.with_branch_prefix(prefix),
            None => config,
        })
    }

    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = prefix.into();
        self
    }

    pub fn rules(&self) -> &[PackageRule] {
        &self.rules
    }

    pub fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    /// Branch holding the files destined for `target_repo`.
    pub fn branch_name(&self, target_repo: &str) -> String {
        format!("{}{}", self.branch_prefix, target_repo)
    }

    /// First matching rule wins; `None` means unmapped.
    pub fn map_package(&self, old_path: &str) -> Option<Location> {
        self.rules.iter().find_map(|rule| rule.apply(old_path))
    }
}

/// Forward edges of one graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub name: MapResult,
    pub dependency_map: Vec<MapResult>,
}

/// Inverse edges of one graph node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentEntry {
    pub name: MapResult,
    pub dependent_map: Vec<MapResult>,
}

/// Mapping config applied to a dependency graph. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct PackageMapping {
    config: MappingConfig,
    dep_map: Vec<DependencyEntry>,
    inv_dep_map: Vec<DependentEntry>,
}

impl PackageMapping {
    pub fn new(config: MappingConfig, graph: &DependencyGraph) -> Self {
        let classify = |old: &String| MapResult::new(old.clone(), config.map_package(old));
        let dep_map = graph
            .edges()
            .iter()
            .map(|(name, deps)| DependencyEntry {
                name: classify(name),
                dependency_map: deps.iter().map(classify).collect(),
            })
            .collect();
        let inv_dep_map = graph
            .inverse()
            .iter()
            .map(|(name, dependents)| DependentEntry {
                name: classify(name),
                dependent_map: dependents.iter().map(classify).collect(),
            })
            .collect();
        Self {
            config,
            dep_map,
            inv_dep_map,
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn dep_map(&self) -> &[DependencyEntry] {
        &self.dep_map
    }

    pub fn inv_dep_map(&self) -> &[DependentEntry] {
        &self.inv_dep_map
    }

    pub fn map_package(&self, old_path: &str) -> Option<Location> {
        self.config.map_package(old_path)
    }

    /// Every old path named by the graph, as a node or as an edge target.
    pub fn old_names(&self) -> impl Iterator<Item = &str> {
        self.dep_map.iter().flat_map(|entry| {
            std::iter::once(entry.name.old_name())
                .chain(entry.dependency_map.iter().map(MapResult::old_name))
        })
    }

    /// Files that depend on `old_path`, empty when nothing does.
    pub fn dependents_of(&self, old_path: &str) -> &[MapResult] {
        self.inv_dep_map
            .iter()
            .find(|entry| entry.name.old_name() == old_path)
            .map(|entry| entry.dependent_map.as_slice())
            .unwrap_or_default()
    }
}

/// One segment of a parsed replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Group(usize),
    Named(String),
    /// Input before the match (`` $` ``).
    Prefix,
    /// Input after the match (`$'`).
    Suffix,
}

impl Piece {
    fn expand(&self, caps: &Captures<'_>, input: &str, out: &mut String) {
        match self {
            Piece::Literal(text) => out.push_str(text),
            Piece::Group(index) => out.push_str(caps.get(*index).map_or("", |m| m.as_str())),
            Piece::Named(name) => out.push_str(caps.name(name).map_or("", |m| m.as_str())),
            Piece::Prefix => {
                if let Some(m) = caps.get(0) {
                    out.push_str(&input[..m.start()]);
                }
            }
            Piece::Suffix => {
                if let Some(m) = caps.get(0) {
                    out.push_str(&input[m.end()..]);
                }
            }
        }
    }
}

/// Parse a JavaScript `String.prototype.replace` template against the
/// groups of `pattern`.
///
/// `$$` is a dollar, `$&` the match, `` $` ``/`$'` the text before/after it.
/// `$n`/`$nn` name a group only when it exists: two digits are tried first,
/// then one digit followed by a literal digit. `$0` is literal. `$<name>`
/// is a named group when the pattern has any; a missing name expands to
/// nothing. Any other `$` is literal.
fn parse_replacement(template: &str, pattern: &Regex) -> Vec<Piece> {
    let groups = pattern.captures_len() - 1;
    let has_names = pattern.capture_names().flatten().next().is_some();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < template.len() {
        let Some(offset) = template[i..].find('$') else {
            literal.push_str(&template[i..]);
            break;
        };
        literal.push_str(&template[i..i + offset]);
        i += offset;
        match bytes.get(i + 1).copied() {
            Some(b'$') => {
                literal.push('$');
                i += 2;
            }
            Some(b'&') => {
                push_piece(&mut pieces, &mut literal, Piece::Group(0));
                i += 2;
            }
            Some(b'`') => {
                push_piece(&mut pieces, &mut literal, Piece::Prefix);
                i += 2;
            }
            Some(b'\'') => {
                push_piece(&mut pieces, &mut literal, Piece::Suffix);
                i += 2;
            }
            Some(d) if d.is_ascii_digit() => {
                let one = usize::from(d - b'0');
                let two = bytes
                    .get(i + 2)
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| one * 10 + usize::from(b - b'0'));
                match two {
                    Some(index) if (1..=groups).contains(&index) => {
                        push_piece(&mut pieces, &mut literal, Piece::Group(index));
                        i += 3;
                    }
                    _ if (1..=groups).contains(&one) => {
                        push_piece(&mut pieces, &mut literal, Piece::Group(one));
                        i += 2;
                    }
                    _ => {
                        literal.push('$');
                        i += 1;
                    }
                }
            }
            Some(b'<') if has_names => match template[i + 2..].find('>') {
                Some(end) => {
                    let name = template[i + 2..i + 2 + end].to_string();
                    push_piece(&mut pieces, &mut literal, Piece::Named(name));
                    i += end + 3;
                }
                None => {
                    literal.push('$');
                    i += 1;
                }
            },
            _ => {
                literal.push('$');
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

fn push_piece(pieces: &mut Vec<Piece>, literal: &mut String, piece: Piece) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
    pieces.push(piece);
}
