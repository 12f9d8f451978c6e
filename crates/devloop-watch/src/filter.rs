//! Path predicates for scanning and event classification.
//!
//! Exclusions are plain substrings matched against the root-relative path
//! (forward slashes on every platform). There is no glob or segment
//! anchoring: excluding `build` also hides `rebuild-assets/`.

use std::path::{Path, PathBuf};

/// Ordered set of exclusion substrings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    patterns: Vec<String>,
}

impl ExclusionSet {
    /// Create an exclusion set, preserving pattern order.
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Return the first pattern contained in `candidate`, if any.
    ///
    /// Matching is case-sensitive.
    #[must_use]
    pub fn first_match(&self, candidate: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| candidate.contains(pattern.as_str()))
            .map(String::as_str)
    }

    /// Check whether any pattern matches `candidate`.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.first_match(candidate).is_some()
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check whether the set has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Check whether `path` ends in one of `extensions`.
///
/// Extensions are compared exactly, without the leading dot.
#[must_use]
pub fn has_tracked_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy();
    extensions.iter().any(|tracked| *tracked == ext)
}

/// Combined exclusion and extension filter for one watch root.
#[derive(Clone, Debug)]
pub struct PathFilter {
    root: PathBuf,
    extensions: Vec<String>,
    exclusions: ExclusionSet,
}

impl PathFilter {
    /// Create a filter for paths under `root`.
    #[must_use]
    pub fn new(root: PathBuf, extensions: Vec<String>, exclusions: Vec<String>) -> Self {
        Self {
            root,
            extensions,
            exclusions: ExclusionSet::new(exclusions),
        }
    }

    /// Watch root the filter is relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tracked extensions.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Root-relative form of `path` used for exclusion matching.
    ///
    /// Paths outside the root are matched in full.
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Check whether `path` is hidden by an exclusion pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclusions.is_empty() {
            return false;
        }
        let relative = self.relative(path);
        if let Some(pattern) = self.exclusions.first_match(&relative) {
            tracing::trace!(path = %relative, pattern, "Path excluded");
            return true;
        }
        false
    }

    /// Check whether `path` is a file the watcher tracks.
    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        has_tracked_extension(path, &self.extensions) && !self.is_excluded(path)
    }
}
