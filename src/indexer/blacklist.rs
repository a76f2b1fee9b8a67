//! Folder exclusion rules for the indexer.
//!
//! A rule is either a bare folder name (excludes any folder with that
//! name, anywhere) or a root-relative path (excludes exactly that
//! subtree). Matching is case-sensitive and exact-segment: `Archive`
//! never matches `Archived`, and `School/Highschool` never matches
//! `School/Highschool2`.

#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    rules: Vec<String>,
}

impl BlacklistFilter {
    pub fn new(rules: Vec<String>) -> Self {
        Self { rules }
    }

    /// Whether a folder (and therefore its whole subtree) is excluded.
    ///
    /// `path` is the folder's absolute path with a leading slash.
    pub fn is_excluded(&self, name: &str, path: &str) -> bool {
        let relative = path.strip_prefix('/').unwrap_or(path);
        self.rules.iter().any(|rule| {
            name == rule
                || relative == rule
                || relative.starts_with(&format!("{}/", rule))
        })
    }
}
