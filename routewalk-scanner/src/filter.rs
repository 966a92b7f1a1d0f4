use crate::error::Result;
use regex::Regex;

pub const DEFAULT_IGNORED_PREFIXES: [&str; 4] = ["/assets/", "/static/", "/build/", "/favicon"];
pub const DEFAULT_STATIC_ASSET_PATTERN: &str =
    r"(?i)\.(png|jpe?g|gif|svg|webp|avif|ico|css|js|map|json|woff2?|ttf)$";
pub const DEFAULT_API_PREFIX: &str = "/api/";

pub const DEFAULT_SUPPRESSED_CONSOLE: [&str; 4] = [
    "net::ERR_FAILED",
    "net::ERR_ABORTED",
    "fonts.gstatic.com",
    "downloadable font",
];

/// Decides which discovered hrefs are crawlable site routes.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    ignored_prefixes: Vec<String>,
    static_asset: Regex,
    api_prefix: String,
}

impl RouteFilter {
    pub fn new() -> Self {
        Self {
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            static_asset: Regex::new(DEFAULT_STATIC_ASSET_PATTERN)
                .expect("default static asset pattern is valid"),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }

    pub fn with_ignored_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_prefixes.push(prefix.into());
        self
    }

    pub fn with_static_asset_pattern(mut self, pattern: &str) -> Result<Self> {
        self.static_asset = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn ignored_prefixes(&self) -> &[String] {
        &self.ignored_prefixes
    }

    /// True when `href` is a site-internal path worth visiting.
    pub fn accepts(&self, href: &str) -> bool {
        if !href.starts_with('/') || href.starts_with("//") {
            return false;
        }
        if self
            .ignored_prefixes
            .iter()
            .any(|prefix| href.starts_with(prefix.as_str()))
        {
            return false;
        }
        if self.static_asset.is_match(href) {
            return false;
        }
        !href.starts_with(&self.api_prefix)
    }
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Known-benign console noise (aborted requests, third-party font warnings).
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    suppressed: Vec<String>,
}

impl NoiseFilter {
    pub fn new() -> Self {
        Self {
            suppressed: DEFAULT_SUPPRESSED_CONSOLE
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// A filter that lets every console message through.
    pub fn none() -> Self {
        Self {
            suppressed: Vec::new(),
        }
    }

    pub fn with_suppressed(mut self, substring: impl Into<String>) -> Self {
        self.suppressed.push(substring.into());
        self
    }

    pub fn is_noise(&self, text: &str) -> bool {
        self.suppressed
            .iter()
            .any(|needle| text.contains(needle.as_str()))
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new()
    }
}
