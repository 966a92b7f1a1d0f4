use crate::server::{DEFAULT_SERVER_TIMEOUT, ServerSettings, WebServer};
use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use routewalk_core::policy::DEFAULT_CATEGORY_CAP;
use routewalk_core::report::{self, ReportFormat};
use routewalk_core::{
    BatchCallback, BatchProgress, CategoryCaps, CrawlOutcome, CrawlPolicy, CrawlSession,
};
use routewalk_scanner::{Category, HttpProber, NoiseFilter, Route, RouteFilter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const CI_RETRIES: usize = 2;

/// Install the fmt subscriber on stderr; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_banner() {
    println!(
        "{} {}",
        "routewalk".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{}", "breadth-first route crawler".dimmed());
}

// Helpers for the crawl handler

/// Base URLs from the hosts file when one is given, otherwise from `--base-url`.
pub fn load_urls_from_source(urls: &[Url], hosts_file: Option<&PathBuf>) -> Result<Vec<String>> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if !urls.is_empty() {
        Ok(urls.iter().map(|url| url.as_str().to_string()).collect())
    } else {
        bail!("Either --base-url or --hosts-file must be provided")
    }
}

/// Load and parse base URLs from a file. Blank lines and `#` comments are skipped.
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosts file {}", path.display()))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed.
///
/// `localhost:8080` parses with `localhost` as its scheme, so an as-is parse
/// only counts when it yields a host.
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line) {
        if !url.cannot_be_a_base() && url.host_str().is_some() {
            return Some(line.to_string());
        }
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Seed routes from a file, one per line.
pub fn load_routes_from_file(path: &Path) -> Result<Vec<Route>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seeds file {}", path.display()))?;

    let mut routes = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let route = Route::parse(line)
            .with_context(|| format!("{}:{}", path.display(), number + 1))?;
        routes.push(route);
    }

    if routes.is_empty() {
        bail!("No seed routes found in {}", path.display());
    }

    Ok(routes)
}

/// Parse a `category=N` quota override, e.g. `auth=4`.
pub fn parse_category_cap(raw: &str) -> Result<(Category, usize)> {
    let (name, cap) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected CATEGORY=N, got '{}'", raw))?;
    let category = Category::from_str(name.trim())
        .ok_or_else(|| anyhow!("unknown category '{}'", name.trim()))?;
    let cap = cap
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid cap in '{}'", raw))?;
    Ok((category, cap))
}

/// Retry and parallelism settings for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMode {
    pub retries: usize,
    pub workers: usize,
}

impl RunMode {
    /// CI gets two retries and a single worker. Local runs get no retries and
    /// one worker per site, capped by available parallelism.
    pub fn derive(
        ci: bool,
        retries: Option<usize>,
        workers: Option<usize>,
        site_count: usize,
    ) -> Self {
        let default_workers = if ci {
            1
        } else {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            site_count.min(cpus)
        };
        Self {
            retries: retries.unwrap_or(if ci { CI_RETRIES } else { 0 }),
            workers: workers.unwrap_or(default_workers).max(1),
        }
    }
}

/// Everything `crawl` needs, resolved from arguments and environment.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_urls: Vec<String>,
    pub policy: CrawlPolicy,
    pub route_filter: RouteFilter,
    pub navigation_timeout: Duration,
    pub mode: RunMode,
    pub ci: bool,
    pub server: Option<ServerSettings>,
    pub output_dir: Option<PathBuf>,
    pub format: ReportFormat,
}

pub fn crawl_settings(sub_matches: &ArgMatches) -> Result<CrawlSettings> {
    let url_args: Vec<Url> = sub_matches
        .get_many::<Url>("base-url")
        .map(|urls| urls.cloned().collect())
        .unwrap_or_default();
    let base_urls =
        load_urls_from_source(&url_args, sub_matches.get_one::<PathBuf>("hosts-file"))?;

    let mut policy = CrawlPolicy::new();

    let mut seeds = Vec::new();
    for raw in sub_matches.get_many::<String>("seed").into_iter().flatten() {
        seeds.push(Route::parse(raw)?);
    }
    if let Some(path) = sub_matches.get_one::<PathBuf>("seeds-file") {
        seeds.extend(load_routes_from_file(path)?);
    }
    if !seeds.is_empty() {
        policy = policy.with_seeds(seeds);
    }

    let default_cap = sub_matches
        .get_one::<usize>("default-category-cap")
        .copied()
        .unwrap_or(DEFAULT_CATEGORY_CAP);
    let mut caps = CategoryCaps::default().with_default_cap(default_cap);
    for raw in sub_matches
        .get_many::<String>("category-cap")
        .into_iter()
        .flatten()
    {
        let (category, cap) = parse_category_cap(raw)?;
        caps = caps.with_cap(category, cap);
    }
    policy = policy.with_category_caps(caps);

    if let Some(max_routes) = sub_matches.get_one::<usize>("max-routes") {
        policy = policy.with_max_routes(*max_routes);
    }
    if let Some(concurrency) = sub_matches.get_one::<usize>("concurrency") {
        policy = policy.with_concurrency(*concurrency);
    }
    if let Some(max_variants) = sub_matches.get_one::<usize>("max-variants") {
        policy = policy.with_max_variants_per_path(*max_variants);
    }
    if let Some(secs) = sub_matches.get_one::<u64>("probe-timeout") {
        policy = policy.with_probe_timeout(Duration::from_secs(*secs));
    }
    if let Some(secs) = sub_matches.get_one::<u64>("run-timeout") {
        policy = policy.with_run_timeout(Duration::from_secs(*secs));
    }

    let mut route_filter = RouteFilter::new();
    for prefix in sub_matches
        .get_many::<String>("ignore-prefix")
        .into_iter()
        .flatten()
    {
        route_filter = route_filter.with_ignored_prefix(prefix.clone());
    }

    let navigation_timeout = Duration::from_secs(
        sub_matches
            .get_one::<u64>("nav-timeout")
            .copied()
            .unwrap_or(5),
    );

    let ci = sub_matches.get_flag("ci");
    let mode = RunMode::derive(
        ci,
        sub_matches.get_one::<usize>("retries").copied(),
        sub_matches.get_one::<usize>("workers").copied(),
        base_urls.len(),
    );

    let server = match sub_matches.get_one::<String>("server-command") {
        Some(command) if !sub_matches.get_flag("skip-web-server") => Some(ServerSettings {
            command: command.clone(),
            timeout: sub_matches
                .get_one::<u64>("server-timeout")
                .map(|secs| Duration::from_secs(*secs))
                .unwrap_or(DEFAULT_SERVER_TIMEOUT),
            reuse_existing: !ci,
        }),
        _ => None,
    };

    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    Ok(CrawlSettings {
        base_urls,
        policy,
        route_filter,
        navigation_timeout,
        mode,
        ci,
        server,
        output_dir: sub_matches.get_one::<PathBuf>("output-dir").cloned(),
        format,
    })
}

/// All attempts made against one base URL. Only the last one decides.
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub base_url: String,
    pub attempts: Vec<CrawlOutcome>,
}

impl SiteReport {
    pub fn final_outcome(&self) -> Option<&CrawlOutcome> {
        self.attempts.last()
    }

    pub fn passed(&self) -> bool {
        self.final_outcome().is_some_and(CrawlOutcome::passed)
    }

    /// Passed, but only after at least one failed attempt.
    pub fn flaky(&self) -> bool {
        self.passed() && self.attempts.len() > 1
    }
}

/// Crawl one base URL, starting a fresh session for every retry.
pub async fn crawl_site(
    base_url: String,
    settings: &CrawlSettings,
    spinner: &ProgressBar,
) -> Result<SiteReport> {
    let prober = HttpProber::new(&base_url)
        .with_context(|| format!("cannot crawl {}", base_url))?
        .with_navigation_timeout(settings.navigation_timeout)
        .with_route_filter(settings.route_filter.clone())
        .with_noise_filter(NoiseFilter::new());

    let mut attempts = Vec::new();
    for attempt in 0..=settings.mode.retries {
        if attempt > 0 {
            warn!(
                "Retrying {} (attempt {} of {})",
                base_url,
                attempt + 1,
                settings.mode.retries + 1
            );
        }

        let bar = spinner.clone();
        let label = base_url.clone();
        let callback: BatchCallback = Arc::new(move |progress: &BatchProgress| {
            bar.set_message(format!(
                "{} | batch {} | visited {} | queued {} | failures {}",
                label, progress.batch, progress.visited, progress.queued, progress.failures
            ));
        });

        let mut session = CrawlSession::new(settings.policy.clone()).with_batch_callback(callback);
        let outcome = session.run(&prober).await;
        let passed = outcome.passed();
        attempts.push(outcome);
        if passed {
            break;
        }
    }

    Ok(SiteReport { base_url, attempts })
}

/// Directory name for one site's attachments, e.g. `127.0.0.1_8080`.
pub fn site_dir_name(base_url: &str) -> String {
    let name = match Url::parse(base_url) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}_{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => base_url.to_string(),
        },
        Err(_) => base_url.to_string(),
    };
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn print_site_report(report: &SiteReport) {
    let Some(outcome) = report.final_outcome() else {
        return;
    };

    println!();
    println!("{} {}", "→".blue(), report.base_url.bright_white().bold());
    println!("  {}", report::summary_line(outcome));
    println!("  Categories: {}", report::category_breakdown(outcome));

    if outcome.timed_out {
        println!("  {} run deadline reached", "⚠".yellow());
    }

    if let Some(failures) = report::generate_failures(outcome) {
        // Skip the three summary lines already printed above
        for line in failures.lines().skip(3) {
            println!("  {}", line.red());
        }
    }

    if report.passed() {
        if report.flaky() {
            println!(
                "  {} passed on attempt {}",
                "⚠ flaky".yellow().bold(),
                report.attempts.len()
            );
        } else {
            println!("  {} passed", "✓".green().bold());
        }
    } else {
        println!(
            "  {} failed after {} attempt(s)",
            "✗".red().bold(),
            report.attempts.len()
        );
    }
}

fn write_site_report(report: &SiteReport, dir: &Path, format: ReportFormat) -> Result<()> {
    let Some(outcome) = report.final_outcome() else {
        return Ok(());
    };
    let attachments = report::build_attachments(outcome, format)?;
    let written = report::write_attachments(dir, &attachments)
        .with_context(|| format!("Failed to write reports to {}", dir.display()))?;
    for path in written {
        println!("  {} {}", "✓".green(), path.display());
    }
    Ok(())
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> i32 {
    match run_crawl(sub_matches, quiet).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            1
        }
    }
}

async fn run_crawl(sub_matches: &ArgMatches, quiet: bool) -> Result<bool> {
    let settings = crawl_settings(sub_matches)?;

    if !quiet {
        println!(
            "\nCrawling {} site(s) | workers: {} | retries: {} | max routes: {} | concurrency: {}",
            settings.base_urls.len(),
            settings.mode.workers,
            settings.mode.retries,
            settings.policy.max_routes,
            settings.policy.concurrency
        );
        if settings.ci {
            println!("{}", "CI mode".dimmed());
        }
    }

    // The dev server serves the first base URL
    let server = match (&settings.server, settings.base_urls.first()) {
        (Some(server_settings), Some(url)) => Some(WebServer::ensure(url, server_settings).await?),
        _ => None,
    };

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };

    let reports: Vec<Result<SiteReport>> = stream::iter(settings.base_urls.clone())
        .map(|url| crawl_site(url, &settings, &spinner))
        .buffered(settings.mode.workers)
        .collect()
        .await;

    spinner.finish_and_clear();
    if let Some(server) = server {
        server.shutdown().await;
    }

    let per_site_dirs = settings.base_urls.len() > 1;
    let mut all_passed = true;
    for report in reports {
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {:#}", "✗".red().bold(), e);
                all_passed = false;
                continue;
            }
        };

        print_site_report(&report);
        if let Some(dir) = &settings.output_dir {
            let dir = if per_site_dirs {
                dir.join(site_dir_name(&report.base_url))
            } else {
                dir.clone()
            };
            if let Err(e) = write_site_report(&report, &dir, settings.format) {
                eprintln!("{} {:#}", "✗".red().bold(), e);
                all_passed = false;
            }
        }
        all_passed &= report.passed();
    }

    info!(
        "Crawl finished: {}",
        if all_passed { "passed" } else { "failed" }
    );
    Ok(all_passed)
}

/// One line describing how a route or href would be treated by a crawl.
pub fn classify_line(raw: &str, filter: &RouteFilter) -> String {
    let raw = raw.trim();
    let route = Route::new(raw);
    let verdict = if filter.accepts(raw) { "crawl" } else { "skip" };
    format!(
        "{}  base={}  category={}  {}",
        route,
        route.base_path(),
        route.category(),
        verdict
    )
}

pub fn handle_classify(sub_matches: &ArgMatches) -> i32 {
    let filter = RouteFilter::new();
    for raw in sub_matches
        .get_many::<String>("ROUTE")
        .into_iter()
        .flatten()
    {
        let line = classify_line(raw, &filter);
        if filter.accepts(raw.trim()) {
            println!("{} {}", "✓".green(), line);
        } else {
            println!("{} {}", "·".dimmed(), line);
        }
    }
    0
}
