use routewalk_scanner::{Category, Route};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Routes the marketplace crawl starts from.
pub const DEFAULT_SEED_ROUTES: [&str; 28] = [
    "/",
    "/modules",
    "/modules/search",
    "/modules/search?q=clock",
    "/modules/search?sort=popular",
    "/modules/search?sort=recent",
    "/modules/search?sort=trending",
    "/modules/search?sort=downloads",
    "/modules/search?sort=alpha",
    "/modules/search?category=weather",
    "/modules/search?page=2",
    "/modules/weather-wttr@barforge",
    "/modules/clock-time@barforge",
    "/modules/cpu-monitor@barforge",
    "/users/barforge",
    "/login",
    "/dashboard",
    "/stars",
    "/collections/ops-essentials",
    "/upload",
    "/admin",
    "/barforge",
    "/terms",
    "/privacy",
    "/settings",
    "/settings/profile",
    "/settings/notifications",
    "/settings/security",
];

pub const DEFAULT_MAX_ROUTES: usize = 200;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_VARIANTS_PER_PATH: usize = 3;
pub const DEFAULT_CATEGORY_CAP: usize = 20;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// Per-category quotas, with a fallback for categories that have no entry.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryCaps {
    caps: BTreeMap<Category, usize>,
    default_cap: usize,
}

impl CategoryCaps {
    /// Caps with no per-category entries; every category gets `default_cap`.
    pub fn uniform(default_cap: usize) -> Self {
        Self {
            caps: BTreeMap::new(),
            default_cap,
        }
    }

    pub fn with_cap(mut self, category: Category, cap: usize) -> Self {
        self.caps.insert(category, cap);
        self
    }

    pub fn with_default_cap(mut self, cap: usize) -> Self {
        self.default_cap = cap;
        self
    }

    pub fn cap_for(&self, category: Category) -> usize {
        self.caps.get(&category).copied().unwrap_or(self.default_cap)
    }

    pub fn default_cap(&self) -> usize {
        self.default_cap
    }
}

impl Default for CategoryCaps {
    fn default() -> Self {
        Self::uniform(DEFAULT_CATEGORY_CAP)
            .with_cap(Category::Search, 8)
            .with_cap(Category::ModuleDetail, 20)
            .with_cap(Category::UserProfile, 10)
            .with_cap(Category::Collection, 10)
            .with_cap(Category::Settings, 10)
            .with_cap(Category::Auth, 8)
            .with_cap(Category::Other, 100)
    }
}

/// Immutable crawl configuration. Build it once, hand it to a session.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlPolicy {
    pub seeds: Vec<Route>,
    pub max_routes: usize,
    pub concurrency: usize,
    pub max_variants_per_path: usize,
    pub category_caps: CategoryCaps,
    pub probe_timeout: Duration,
    pub run_timeout: Duration,
}

impl CrawlPolicy {
    pub fn new() -> Self {
        Self {
            seeds: DEFAULT_SEED_ROUTES.iter().map(|r| Route::new(*r)).collect(),
            max_routes: DEFAULT_MAX_ROUTES,
            concurrency: DEFAULT_CONCURRENCY,
            max_variants_per_path: DEFAULT_MAX_VARIANTS_PER_PATH,
            category_caps: CategoryCaps::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<Route>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_max_routes(mut self, max_routes: usize) -> Self {
        self.max_routes = max_routes;
        self
    }

    /// Batch size. Zero is treated as one so a crawl always makes progress.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_variants_per_path(mut self, max_variants: usize) -> Self {
        self.max_variants_per_path = max_variants;
        self
    }

    pub fn with_category_caps(mut self, caps: CategoryCaps) -> Self {
        self.category_caps = caps;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let caps = CategoryCaps::default();
        assert_eq!(caps.cap_for(Category::Search), 8);
        assert_eq!(caps.cap_for(Category::Auth), 8);
        assert_eq!(caps.cap_for(Category::Other), 100);
        assert_eq!(caps.default_cap(), 20);
    }

    #[test]
    fn test_unlisted_category_uses_default() {
        let caps = CategoryCaps::uniform(5).with_cap(Category::Search, 2);
        assert_eq!(caps.cap_for(Category::Search), 2);
        assert_eq!(caps.cap_for(Category::Collection), 5);
    }

    #[test]
    fn test_default_policy_seeds() {
        let policy = CrawlPolicy::new();
        assert_eq!(policy.seeds.len(), 28);
        assert_eq!(policy.seeds[0], Route::new("/"));
        assert_eq!(policy.max_routes, 200);
        assert_eq!(policy.concurrency, 8);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(CrawlPolicy::new().with_concurrency(0).concurrency, 1);
    }
}
