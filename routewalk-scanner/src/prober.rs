use crate::error::{Result, ScanError};
use crate::filter::{NoiseFilter, RouteFilter};
use crate::result::{PageMetrics, ProbeDiagnostics, ProbeStatus, RouteResult};
use crate::route::Route;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(5);

/// One page visit. Implementations never fail: every problem is reported as
/// data on the returned [`RouteResult`].
pub trait PageProber: Send + Sync {
    fn probe(&self, route: &Route) -> impl Future<Output = RouteResult> + Send;
}

/// Probes pages with plain HTTP requests and static HTML parsing.
///
/// Script errors only surface through a browser backend, so this prober
/// reports navigation failures, HTTP status, links and element counts.
pub struct HttpProber {
    client: Client,
    base_url: Url,
    route_filter: RouteFilter,
    noise: NoiseFilter,
    navigation_timeout: Duration,
}

impl HttpProber {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(ScanError::InvalidUrl(format!(
                "{}: base URL needs a host",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("Routewalk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(DEFAULT_NAVIGATION_TIMEOUT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            route_filter: RouteFilter::new(),
            noise: NoiseFilter::new(),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        })
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_route_filter(mut self, filter: RouteFilter) -> Self {
        self.route_filter = filter;
        self
    }

    pub fn with_noise_filter(mut self, noise: NoiseFilter) -> Self {
        self.noise = noise;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a route: the base URL without its trailing slash, then the route.
    pub fn resolve(&self, route: &Route) -> Result<Url> {
        let joined = format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            route.as_str()
        );
        Url::parse(&joined).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", joined, e)))
    }

    async fn visit(&self, route: &Route) -> RouteResult {
        let mut diagnostics = ProbeDiagnostics::new(self.noise.clone());

        let url = match self.resolve(route) {
            Ok(url) => url,
            Err(e) => {
                diagnostics.navigation_error(&e.to_string());
                let mut result = RouteResult::new(route.clone(), ProbeStatus::NoResponse);
                diagnostics.apply(&mut result);
                return result;
            }
        };

        debug!("Probing {}", url);
        let response = match self
            .client
            .get(url.clone())
            .timeout(self.navigation_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Navigation to {} failed: {}", url, e);
                diagnostics.navigation_error(&e.to_string());
                let mut result = RouteResult::new(route.clone(), ProbeStatus::NoResponse);
                diagnostics.apply(&mut result);
                return result;
            }
        };

        let status = ProbeStatus::Code(response.status().as_u16());
        let final_url = response.url().clone();

        if final_url.origin() != self.base_url.origin() {
            debug!("{} left the site for {}", route, final_url);
            return RouteResult::off_site(route.clone(), status, final_url.to_string());
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);

        let mut result = RouteResult::new(route.clone(), status);
        result.final_url = Some(final_url.to_string());

        match response.text().await {
            Ok(body) if is_html => {
                let page = extract_page(&body, &self.route_filter);
                debug!(
                    "{}: {} internal, {} external links",
                    route,
                    page.internal_links.len(),
                    page.external_links.len()
                );
                result.internal_links = page.internal_links;
                result.external_links = page.external_links;
                result.metrics = page.metrics;
            }
            Ok(_) => {}
            Err(e) => diagnostics.navigation_error(&format!("reading body: {}", e)),
        }

        diagnostics.apply(&mut result);
        result
    }
}

impl PageProber for HttpProber {
    async fn probe(&self, route: &Route) -> RouteResult {
        let start = Instant::now();
        let mut result = self.visit(route).await;
        result.elapsed = start.elapsed();
        result
    }
}

/// Links and element counts scraped from one HTML document.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub internal_links: Vec<Route>,
    pub external_links: Vec<String>,
    pub metrics: PageMetrics,
}

/// Parse `html`, classify every anchor href and count interactive elements.
///
/// Hrefs are taken verbatim from the attribute, cut at `#`, and deduplicated
/// by exact string within the page.
pub fn extract_page(html: &str, filter: &RouteFilter) -> ExtractedPage {
    let document = Html::parse_document(html);

    let link_selector = Selector::parse("a[href]").unwrap();
    let mut seen = HashSet::new();
    let mut page = ExtractedPage::default();

    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.split('#').next().unwrap_or_default();
        if href.is_empty() || !seen.insert(href.to_string()) {
            continue;
        }

        if filter.accepts(href) {
            page.internal_links.push(Route::new(href));
        } else if href.starts_with("http://") || href.starts_with("https://") {
            page.external_links.push(href.to_string());
        }
    }

    page.metrics = PageMetrics {
        buttons: count(&document, "button"),
        inputs: count(&document, "input, textarea, select"),
        links: count(&document, "a[href]"),
        images: count(&document, "img"),
        headings: count(&document, "h1, h2, h3, h4, h5, h6"),
    };

    page
}

fn count(document: &Html, css: &str) -> usize {
    Selector::parse(css)
        .map(|selector| document.select(&selector).count())
        .unwrap_or(0)
}
