use crate::policy::CrawlPolicy;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use routewalk_scanner::{Category, PageMetrics, PageProber, ProbeStatus, Route, RouteResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROGRESS_LOG_INTERVAL: usize = 50;

/// A visited route whose probe result was unacceptable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub route: Route,
    pub status: ProbeStatus,
    pub errors: Vec<String>,
    pub console_errors: Vec<String>,
}

impl From<&RouteResult> for FailureRecord {
    fn from(result: &RouteResult) -> Self {
        Self {
            route: result.route.clone(),
            status: result.status,
            errors: result.errors.clone(),
            console_errors: result.console_errors.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalLinks {
    pub route: Route,
    pub links: Vec<String>,
}

/// Snapshot handed to the batch callback after each batch is absorbed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch: usize,
    pub size: usize,
    pub visited: usize,
    pub queued: usize,
    pub discovered: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

/// Callback for reporting progress after every batch
pub type BatchCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Everything a finished crawl session knows.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub visited: Vec<Route>,
    pub discovered: usize,
    pub category_counts: BTreeMap<Category, usize>,
    pub metrics: PageMetrics,
    pub failures: Vec<FailureRecord>,
    pub external_links: Vec<ExternalLinks>,
    pub batches: usize,
    pub timed_out: bool,
}

impl CrawlOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }
}

/// One breadth-first crawl: queue, visited/discovered sets and quota counters.
///
/// State is only mutated between batches, never while probes are in flight.
pub struct CrawlSession {
    id: Uuid,
    policy: CrawlPolicy,
    queue: VecDeque<Route>,
    visited: HashSet<Route>,
    visit_order: Vec<Route>,
    discovered: HashSet<Route>,
    path_variants: HashMap<String, usize>,
    categories: BTreeMap<Category, usize>,
    metrics: PageMetrics,
    failures: Vec<FailureRecord>,
    external_links: Vec<ExternalLinks>,
    batches: usize,
    started_at: DateTime<Utc>,
    batch_callback: Option<BatchCallback>,
}

impl CrawlSession {
    pub fn new(policy: CrawlPolicy) -> Self {
        let queue: VecDeque<Route> = policy.seeds.iter().cloned().collect();
        let discovered: HashSet<Route> = policy.seeds.iter().cloned().collect();

        Self {
            id: Uuid::new_v4(),
            policy,
            queue,
            visited: HashSet::new(),
            visit_order: Vec::new(),
            discovered,
            path_variants: HashMap::new(),
            categories: BTreeMap::new(),
            metrics: PageMetrics::default(),
            failures: Vec::new(),
            external_links: Vec::new(),
            batches: 0,
            started_at: Utc::now(),
            batch_callback: None,
        }
    }

    pub fn with_batch_callback(mut self, callback: BatchCallback) -> Self {
        self.batch_callback = Some(callback);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn policy(&self) -> &CrawlPolicy {
        &self.policy
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_visited(&self, route: &Route) -> bool {
        self.visited.contains(route)
    }

    pub fn is_discovered(&self, route: &Route) -> bool {
        self.discovered.contains(route)
    }

    /// Pop routes off the queue until a full batch is accepted.
    ///
    /// Routes over their path-variant or category quota are dropped, not
    /// requeued. A route without a query string is never refused by the
    /// path-variant quota, but still counts toward it.
    pub fn next_batch(&mut self) -> Vec<Route> {
        let mut batch = Vec::new();

        while batch.len() < self.policy.concurrency && self.visited.len() < self.policy.max_routes
        {
            let Some(route) = self.queue.pop_front() else {
                break;
            };
            if self.visited.contains(&route) {
                continue;
            }

            let base_path = route.base_path().to_string();
            let category = route.category();
            let path_count = self.path_variants.get(&base_path).copied().unwrap_or(0);
            let category_count = self.categories.get(&category).copied().unwrap_or(0);

            if route.has_query() && path_count >= self.policy.max_variants_per_path {
                debug!("Dropping {}: {} variants of {} already accepted", route, path_count, base_path);
                continue;
            }
            if category_count >= self.policy.category_caps.cap_for(category) {
                debug!("Dropping {}: category {} is full", route, category);
                continue;
            }

            *self.path_variants.entry(base_path).or_insert(0) += 1;
            *self.categories.entry(category).or_insert(0) += 1;
            self.visited.insert(route.clone());
            self.visit_order.push(route.clone());
            batch.push(route);
        }

        batch
    }

    /// Fold one batch of probe results into the session.
    pub fn absorb(&mut self, results: Vec<RouteResult>) {
        for result in results {
            self.metrics += result.metrics;

            if !result.external_links.is_empty() {
                self.external_links.push(ExternalLinks {
                    route: result.route.clone(),
                    links: result.external_links.clone(),
                });
            }

            for link in &result.internal_links {
                if self.discovered.insert(link.clone()) {
                    debug!("Discovered {} on {}", link, result.route);
                    self.queue.push_back(link.clone());
                }
            }

            if result.is_failure() {
                warn!(
                    "{} failed (status: {}, {} errors, {} console errors)",
                    result.route,
                    result.status,
                    result.errors.len(),
                    result.console_errors.len()
                );
                self.failures.push(FailureRecord::from(&result));
            }
        }
    }

    /// Crawl until the queue drains, the ceiling is hit, or the run deadline passes.
    pub async fn run<P: PageProber>(&mut self, prober: &P) -> CrawlOutcome {
        let start = Instant::now();
        let deadline = start + self.policy.run_timeout;
        let probe_timeout = self.policy.probe_timeout;
        let mut timed_out = false;

        info!(
            "Starting crawl session {} with {} seeds (max {} routes, batches of {})",
            self.id,
            self.queue.len(),
            self.policy.max_routes,
            self.policy.concurrency
        );

        while !self.queue.is_empty() && self.visited.len() < self.policy.max_routes {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let batch = self.next_batch();
            if batch.is_empty() {
                break;
            }
            self.batches += 1;
            info!(
                "Batch {}: {} routes (visited={}, queued={})",
                self.batches,
                batch.len(),
                self.visited.len(),
                self.queue.len()
            );

            let batch_start = Instant::now();
            let probes = join_all(
                batch
                    .iter()
                    .map(|route| probe_with_timeout(prober, route, probe_timeout)),
            );
            let results = match timeout_at(deadline, probes).await {
                Ok(results) => results,
                Err(_) => {
                    warn!("Run deadline reached while batch {} was in flight", self.batches);
                    timed_out = true;
                    break;
                }
            };
            debug!(
                "Batch {} done in {:.1}s",
                self.batches,
                batch_start.elapsed().as_secs_f64()
            );

            let visited_before = self.visited.len() - batch.len();
            self.absorb(results);

            if visited_before / PROGRESS_LOG_INTERVAL != self.visited.len() / PROGRESS_LOG_INTERVAL {
                info!(
                    "Crawl progress: visited={} queued={} discovered={}",
                    self.visited.len(),
                    self.queue.len(),
                    self.discovered.len()
                );
            }

            if let Some(ref callback) = self.batch_callback {
                callback(&BatchProgress {
                    batch: self.batches,
                    size: batch.len(),
                    visited: self.visited.len(),
                    queued: self.queue.len(),
                    discovered: self.discovered.len(),
                    failures: self.failures.len(),
                    elapsed: start.elapsed(),
                });
            }
        }

        let outcome = self.outcome(timed_out);
        info!(
            "Crawl complete: visited={} discovered={} failures={}{}",
            outcome.visited.len(),
            outcome.discovered,
            outcome.failures.len(),
            if timed_out { " (timed out)" } else { "" }
        );
        outcome
    }

    pub fn outcome(&self, timed_out: bool) -> CrawlOutcome {
        CrawlOutcome {
            session_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            visited: self.visit_order.clone(),
            discovered: self.discovered.len(),
            category_counts: self.categories.clone(),
            metrics: self.metrics,
            failures: self.failures.clone(),
            external_links: self.external_links.clone(),
            batches: self.batches,
            timed_out,
        }
    }
}

async fn probe_with_timeout<P: PageProber>(prober: &P, route: &Route, limit: Duration) -> RouteResult {
    match timeout(limit, prober.probe(route)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Probe of {} exceeded {}ms", route, limit.as_millis());
            RouteResult::no_response(
                route.clone(),
                format!("timeout: probe exceeded {}ms", limit.as_millis()),
            )
        }
    }
}
