//! String path arithmetic for module specifiers.
//!
//! Paths are treated as `/`-separated strings (backslashes are standardized)
//! so results do not depend on the host platform or on files existing.

/// Extensions a module specifier may omit, longest first so `.d.ts` wins
/// over `.ts`.
const MODULE_EXTENSIONS: [&str; 9] = [
    ".d.ts", ".ts", ".tsx", ".mts", ".cts", ".js", ".jsx", ".mjs", ".cjs",
];

pub fn standardize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Resolve `.` and `..` segments and drop empty ones. Leading `..` that
/// cannot be resolved are kept.
pub fn normalize(path: &str) -> String {
    let standardized = standardize_slashes(path);
    let absolute = standardized.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in standardized.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Directory part of a `/`-separated path (empty for a bare file name).
pub fn dirname(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// Join a directory and a relative path, then normalize.
pub fn join(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        normalize(relative)
    } else {
        normalize(&format!("{dir}/{relative}"))
    }
}

/// Strip what a module specifier leaves implicit: a trailing `index` file
/// becomes its directory, any other file loses its extension.
pub fn strip_module_suffix(path: &str) -> String {
    let path = standardize_slashes(path);
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path.as_str()),
    };
    let stem = strip_extension(file);
    if stem.eq_ignore_ascii_case("index") {
        return dir.map(str::to_string).unwrap_or_else(|| ".".to_string());
    }
    match dir {
        Some(dir) => format!("{dir}/{stem}"),
        None => stem.to_string(),
    }
}

fn strip_extension(file: &str) -> &str {
    let lower = file.to_ascii_lowercase();
    MODULE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
        .map_or(file, |ext| &file[..file.len() - ext.len()])
}

/// Ensure a relative specifier starts with `./` or `../` so it is never
/// mistaken for a bare package name.
pub fn ensure_relative_prefix(specifier: &str) -> String {
    match specifier {
        "" | "." => ".".to_string(),
        ".." => "..".to_string(),
        s if s.starts_with("./") || s.starts_with("../") => s.to_string(),
        s => format!("./{s}"),
    }
}

/// Relative module specifier from directory `from_dir` to file `to_file`,
/// with `index`/extension suffixes stripped and a leading `./` or `../`.
pub fn relative_module_specifier(from_dir: &str, to_file: &str) -> String {
    let from = normalize(from_dir);
    let to = normalize(&strip_module_suffix(&normalize(to_file)));
    let from_segments: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_segments: Vec<&str> = to.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let common = from_segments
        .iter()
        .zip(&to_segments)
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; from_segments.len() - common];
    parts.extend(&to_segments[common..]);
    ensure_relative_prefix(&parts.join("/"))
}

/// True for specifiers that point into the project rather than at a package.
pub fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}
