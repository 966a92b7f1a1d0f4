use crate::error::{Result, ScanError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static MODULE_DETAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/modules/[^/]+@").expect("module detail pattern is valid"));

/// A site-relative path plus optional query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(String);

impl Route {
    /// Wraps an href or path that is already known to be site-relative.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Validating constructor for user-supplied routes (seed files, CLI).
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Err(ScanError::InvalidRoute(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The route with its query string removed.
    pub fn base_path(&self) -> &str {
        match self.0.find('?') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn has_query(&self) -> bool {
        self.0.contains('?')
    }

    pub fn category(&self) -> Category {
        Category::classify(self.base_path())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Route {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Coarse classification of a route by path shape, used for per-category caps.
///
/// Ordering follows declaration order so reports list categories stably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Search,
    ModuleDetail,
    UserProfile,
    Collection,
    Settings,
    Auth,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Search,
        Category::ModuleDetail,
        Category::UserProfile,
        Category::Collection,
        Category::Settings,
        Category::Auth,
        Category::Other,
    ];

    /// Classify a base path. First matching rule wins.
    pub fn classify(base_path: &str) -> Self {
        if base_path.starts_with("/modules/search") {
            Category::Search
        } else if MODULE_DETAIL.is_match(base_path) {
            Category::ModuleDetail
        } else if base_path.starts_with("/users/") {
            Category::UserProfile
        } else if base_path.starts_with("/collections/") {
            Category::Collection
        } else if base_path.starts_with("/settings/") {
            Category::Settings
        } else if base_path.starts_with("/login") {
            Category::Auth
        } else {
            Category::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Search => "search",
            Category::ModuleDetail => "module-detail",
            Category::UserProfile => "user-profile",
            Category::Collection => "collection",
            Category::Settings => "settings",
            Category::Auth => "auth",
            Category::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s.trim().to_lowercase())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
