// Tests for crawl session behaviour

use routewalk_core::routewalk_scanner::{
    Category, ConsoleLevel, HttpProber, NoiseFilter, PageMetrics, PageProber, ProbeDiagnostics,
    ProbeStatus, Route, RouteResult,
};
use routewalk_core::{BatchProgress, CategoryCaps, CrawlPolicy, CrawlSession};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

// ============================================================================
// Scripted prober
// ============================================================================

enum Reply {
    Page(RouteResult),
    Hang,
}

type Script = Box<dyn Fn(&Route) -> Reply + Send + Sync>;

/// Prober that answers from a closure and records how it was driven.
struct ScriptedProber {
    script: Script,
    calls: Mutex<Vec<Route>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    fn new(script: impl Fn(&Route) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> Vec<Route> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageProber for ScriptedProber {
    async fn probe(&self, route: &Route) -> RouteResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(route.clone());

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reply = (self.script)(route);
        if let Reply::Hang = reply {
            std::future::pending::<()>().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match reply {
            Reply::Page(result) => result,
            Reply::Hang => unreachable!(),
        }
    }
}

fn page(route: &Route, links: &[String]) -> RouteResult {
    let mut result = RouteResult::new(route.clone(), ProbeStatus::Code(200));
    result.internal_links = links.iter().map(|l| Route::new(l.as_str())).collect();
    result.metrics = PageMetrics {
        buttons: 1,
        inputs: 1,
        links: links.len(),
        images: 0,
        headings: 1,
    };
    result
}

/// Every page links to two children, so the site never runs out of routes.
fn endless_site(route: &Route) -> Reply {
    let base = route.as_str().trim_end_matches('/');
    Reply::Page(page(route, &[format!("{}/a", base), format!("{}/b", base)]))
}

fn routes(paths: &[&str]) -> Vec<Route> {
    paths.iter().map(|p| Route::new(*p)).collect()
}

// ============================================================================
// Traversal
// ============================================================================

#[tokio::test]
async fn test_seed_batch_then_discovery_until_ceiling() {
    let prober = ScriptedProber::new(endless_site);
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/", "/modules"]))
            .with_max_routes(10)
            .with_concurrency(2),
    );

    let outcome = session.run(&prober).await;
    let calls = prober.calls();

    assert_eq!(calls[..2], routes(&["/", "/modules"])[..]);
    assert_eq!(outcome.visited.len(), 10);
    assert_eq!(calls.len(), 10);
    assert_eq!(outcome.batches, 5);
    assert!(prober.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(outcome.passed());
}

#[tokio::test]
async fn test_breadth_first_order() {
    let prober = ScriptedProber::new(endless_site);
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_max_routes(7)
            .with_concurrency(1),
    );

    let outcome = session.run(&prober).await;

    assert_eq!(
        outcome.visited,
        routes(&["/", "/a", "/b", "/a/a", "/a/b", "/b/a", "/b/b"])
    );
}

#[tokio::test]
async fn test_visited_is_unique_and_within_discovered() {
    // Pages link back to the root and to each other.
    let prober = ScriptedProber::new(|route| {
        let links: Vec<String> = ["/", "/terms", "/privacy", "/stars", "/modules"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Reply::Page(page(route, &links))
    });
    let mut session = CrawlSession::new(CrawlPolicy::new().with_seeds(routes(&["/", "/"])));

    let outcome = session.run(&prober).await;

    let unique: HashSet<&Route> = outcome.visited.iter().collect();
    assert_eq!(unique.len(), outcome.visited.len());
    assert_eq!(outcome.visited.len(), 5);
    assert_eq!(outcome.discovered, 5);
    assert!(outcome.visited.iter().all(|r| session.is_discovered(r)));
    assert_eq!(session.queued_count(), 0);
}

#[tokio::test]
async fn test_discovered_grows_monotonically() {
    let prober = ScriptedProber::new(endless_site);
    let seen: Arc<Mutex<Vec<BatchProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_max_routes(30)
            .with_concurrency(4),
    )
    .with_batch_callback(Arc::new(move |progress: &BatchProgress| {
        seen_clone.lock().unwrap().push(progress.clone());
    }));

    let outcome = session.run(&prober).await;
    let progress = seen.lock().unwrap();

    assert_eq!(progress.len(), outcome.batches);
    for pair in progress.windows(2) {
        assert!(pair[1].discovered >= pair[0].discovered);
        assert!(pair[1].visited >= pair[0].visited);
    }
    for step in progress.iter() {
        assert!(step.discovered >= step.visited);
        assert!(step.size <= 4);
    }
}

#[tokio::test]
async fn test_queue_exhaustion_stops_before_ceiling() {
    let prober = ScriptedProber::new(|route| {
        let links = match route.as_str() {
            "/" => vec!["/modules".to_string(), "/login".to_string()],
            _ => Vec::new(),
        };
        Reply::Page(page(route, &links))
    });
    let mut session = CrawlSession::new(CrawlPolicy::new().with_seeds(routes(&["/"])));

    let outcome = session.run(&prober).await;

    assert_eq!(outcome.visited, routes(&["/", "/modules", "/login"]));
    assert_eq!(outcome.metrics.buttons, 3);
    assert_eq!(outcome.metrics.links, 2);
}

// ============================================================================
// Quotas
// ============================================================================

#[tokio::test]
async fn test_path_variant_cap_during_crawl() {
    let prober = ScriptedProber::new(|route| {
        let links: Vec<String> = if route.as_str() == "/" {
            (1..=5).map(|n| format!("/modules/search?page={}", n)).collect()
        } else {
            Vec::new()
        };
        Reply::Page(page(route, &links))
    });
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_max_variants_per_path(3),
    );

    let outcome = session.run(&prober).await;

    let searches = outcome
        .visited
        .iter()
        .filter(|r| r.base_path() == "/modules/search")
        .count();
    assert_eq!(searches, 3);
    assert_eq!(outcome.discovered, 6);
    assert!(!session.is_visited(&Route::new("/modules/search?page=4")));
}

#[tokio::test]
async fn test_category_cap_during_crawl() {
    let prober = ScriptedProber::new(|route| {
        let links: Vec<String> = if route.as_str() == "/" {
            (0..10).map(|n| format!("/login/step-{}", n)).collect()
        } else {
            Vec::new()
        };
        Reply::Page(page(route, &links))
    });
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_category_caps(CategoryCaps::default().with_cap(Category::Auth, 8)),
    );

    let outcome = session.run(&prober).await;

    assert_eq!(outcome.category_counts.get(&Category::Auth), Some(&8));
    assert_eq!(outcome.category_counts.get(&Category::Other), Some(&1));
    assert_eq!(outcome.visited.len(), 9);
}

// ============================================================================
// Verdicts
// ============================================================================

#[tokio::test]
async fn test_failure_classification() {
    let prober = ScriptedProber::new(|route| {
        let result = match route.as_str() {
            "/" => page(route, &["/missing".into(), "/broken".into(), "/noisy".into(), "/ok".into()]),
            "/missing" => RouteResult::new(route.clone(), ProbeStatus::Code(404)),
            "/broken" => RouteResult::new(route.clone(), ProbeStatus::Code(500)),
            "/noisy" => {
                let mut result = page(route, &[]);
                let mut diagnostics = ProbeDiagnostics::new(NoiseFilter::new());
                diagnostics.console(ConsoleLevel::Error, "GET /x net::ERR_ABORTED");
                diagnostics.console(ConsoleLevel::Error, "fonts.gstatic.com blocked");
                diagnostics.apply(&mut result);
                result
            }
            _ => page(route, &[]),
        };
        Reply::Page(result)
    });
    let mut session = CrawlSession::new(CrawlPolicy::new().with_seeds(routes(&["/"])));

    let outcome = session.run(&prober).await;

    let failed: Vec<&str> = outcome.failures.iter().map(|f| f.route.as_str()).collect();
    assert_eq!(failed, vec!["/missing", "/broken"]);
    assert_eq!(outcome.failures[0].status, ProbeStatus::Code(404));
    assert!(outcome.failures[0].errors.is_empty());
    assert!(!outcome.passed());
}

#[tokio::test]
async fn test_unfiltered_console_error_fails_route() {
    let prober = ScriptedProber::new(|route| {
        let mut result = page(route, &[]);
        let mut diagnostics = ProbeDiagnostics::new(NoiseFilter::new());
        diagnostics.console(ConsoleLevel::Error, "Uncaught ReferenceError: x is not defined");
        diagnostics.apply(&mut result);
        Reply::Page(result)
    });
    let mut session = CrawlSession::new(CrawlPolicy::new().with_seeds(routes(&["/"])));

    let outcome = session.run(&prober).await;

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(
        outcome.failures[0].console_errors,
        vec!["console.error: Uncaught ReferenceError: x is not defined"]
    );
}

#[tokio::test]
async fn test_off_site_route_is_external_only() {
    let prober = ScriptedProber::new(|route| {
        let result = match route.as_str() {
            "/barforge" => RouteResult::off_site(
                route.clone(),
                ProbeStatus::Code(200),
                "https://github.com/barforge".into(),
            ),
            "/discord" => RouteResult::off_site(
                route.clone(),
                ProbeStatus::Code(404),
                "https://discord.gg/expired".into(),
            ),
            _ => RouteResult::new(route.clone(), ProbeStatus::Code(200)),
        };
        Reply::Page(result)
    });
    let mut session = CrawlSession::new(
        CrawlPolicy::new().with_seeds(routes(&["/barforge", "/discord"])),
    );

    let outcome = session.run(&prober).await;

    assert!(outcome.passed());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.metrics, PageMetrics::default());
    assert_eq!(outcome.external_links.len(), 2);
    assert_eq!(
        outcome.external_links[0].links,
        vec!["https://github.com/barforge"]
    );
    assert_eq!(
        outcome.external_links[1].links,
        vec!["https://discord.gg/expired"]
    );
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_stuck_probe_becomes_no_response() {
    let prober = ScriptedProber::new(|route| match route.as_str() {
        "/stuck" => Reply::Hang,
        _ => Reply::Page(page(route, &[])),
    });
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/stuck", "/terms"]))
            .with_probe_timeout(Duration::from_millis(100)),
    );

    let outcome = session.run(&prober).await;

    assert_eq!(outcome.visited.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].route, Route::new("/stuck"));
    assert_eq!(outcome.failures[0].status, ProbeStatus::NoResponse);
    assert!(outcome.failures[0].errors[0].starts_with("timeout:"));
    assert!(!outcome.timed_out);
}

#[tokio::test]
async fn test_run_deadline_fails_the_run() {
    let prober = ScriptedProber::new(|route| match route.as_str() {
        "/" => Reply::Page(page(route, &["/stuck".into()])),
        _ => Reply::Hang,
    });
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_probe_timeout(Duration::from_secs(60))
            .with_run_timeout(Duration::from_millis(200)),
    );

    let outcome = session.run(&prober).await;

    assert!(outcome.timed_out);
    assert!(outcome.failures.is_empty());
    assert!(!outcome.passed());
}

// ============================================================================
// End to end over HTTP
// ============================================================================

#[tokio::test]
async fn test_http_crawl_of_mock_site() {
    let mock_server = MockServer::start().await;

    let home = r#"<html><body>
        <h1>Barforge</h1>
        <a href="/modules">Browse</a>
        <a href="/missing">Broken</a>
        <a href="/assets/logo.png">Logo</a>
        <a href="https://github.com/barforge">GitHub</a>
    </body></html>"#;
    let modules = r#"<html><body>
        <a href="/">Home</a>
        <a href="/modules/clock-time@barforge#readme">Clock</a>
        <button>Grid</button><button>List</button>
    </body></html>"#;

    for (route, body) in [
        ("/", home),
        ("/modules", modules),
        ("/modules/clock-time@barforge", "<html><h1>Clock</h1></html>"),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let prober = HttpProber::new(&mock_server.uri()).unwrap();
    let mut session = CrawlSession::new(
        CrawlPolicy::new()
            .with_seeds(routes(&["/"]))
            .with_concurrency(2),
    );

    let outcome = session.run(&prober).await;

    assert_eq!(outcome.visited.len(), 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].route, Route::new("/missing"));
    assert_eq!(outcome.metrics.buttons, 2);
    assert_eq!(outcome.metrics.headings, 2);
    assert_eq!(outcome.external_links.len(), 1);
    assert_eq!(
        outcome.category_counts.get(&Category::ModuleDetail),
        Some(&1)
    );
}
