//! Filename extension filter.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// Suffix-based inclusion rule, shared between the watcher and its loop.
///
/// Cloning yields another handle to the same filter, so a change made
/// through the watcher is seen by the next event the loop dispatches.
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    suffix: Arc<RwLock<Option<String>>>,
}

impl ExtensionFilter {
    /// Create a filter with an optional initial suffix.
    pub fn new(suffix: Option<String>) -> Self {
        Self {
            suffix: Arc::new(RwLock::new(suffix)),
        }
    }

    /// The configured suffix, if any.
    pub fn suffix(&self) -> Option<String> {
        self.suffix.read().clone()
    }

    /// Set or clear the suffix.
    pub fn set_suffix(&self, suffix: Option<String>) {
        *self.suffix.write() = suffix;
    }

    /// Whether `file_name` passes the filter.
    ///
    /// Matching is an exact, case-sensitive suffix comparison.
    pub fn matches(&self, file_name: &Path) -> bool {
        match self.suffix.read().as_deref() {
            None => true,
            Some(suffix) => file_name.to_string_lossy().ends_with(suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_filter_passes_everything() {
        let filter = ExtensionFilter::default();
        assert!(filter.matches(Path::new("testCreate")));
        assert!(filter.matches(Path::new("b.json")));
    }

    #[test]
    fn test_suffix_match_is_exact_and_case_sensitive() {
        let filter = ExtensionFilter::new(Some(".json".to_string()));

        assert!(filter.matches(Path::new("b.json")));
        assert!(!filter.matches(Path::new("a")));
        assert!(!filter.matches(Path::new("b.JSON")));
        assert!(!filter.matches(Path::new("b.json5")));
        assert!(!filter.matches(Path::new("*.json.bak")));
    }

    #[test]
    fn test_clones_share_suffix() {
        let filter = ExtensionFilter::default();
        let loop_side = filter.clone();

        filter.set_suffix(Some(".json".to_string()));
        assert!(!loop_side.matches(Path::new("a")));

        filter.set_suffix(None);
        assert!(loop_side.matches(Path::new("a")));
    }
}
