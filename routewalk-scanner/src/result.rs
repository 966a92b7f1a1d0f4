use crate::filter::NoiseFilter;
use crate::route::Route;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

/// Final navigation status of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStatus {
    Code(u16),
    /// Navigation never produced a response (network failure, timeout).
    NoResponse,
}

impl ProbeStatus {
    pub fn is_http_failure(&self) -> bool {
        matches!(self, ProbeStatus::Code(code) if *code >= 400)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Code(code) => write!(f, "{}", code),
            ProbeStatus::NoResponse => f.write_str("no-response"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub buttons: usize,
    pub inputs: usize,
    pub links: usize,
    pub images: usize,
    pub headings: usize,
}

impl AddAssign for PageMetrics {
    fn add_assign(&mut self, other: Self) {
        self.buttons += other.buttons;
        self.inputs += other.inputs;
        self.links += other.links;
        self.images += other.images;
        self.headings += other.headings;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub route: Route,
    pub status: ProbeStatus,
    pub errors: Vec<String>,
    pub console_errors: Vec<String>,
    pub internal_links: Vec<Route>,
    pub external_links: Vec<String>,
    pub metrics: PageMetrics,
    pub final_url: Option<String>,
    /// Final location is on another origin; never a failure.
    #[serde(default)]
    pub off_site: bool,
    pub elapsed: Duration,
}

impl RouteResult {
    pub fn new(route: Route, status: ProbeStatus) -> Self {
        Self {
            route,
            status,
            errors: Vec::new(),
            console_errors: Vec::new(),
            internal_links: Vec::new(),
            external_links: Vec::new(),
            metrics: PageMetrics::default(),
            final_url: None,
            off_site: false,
            elapsed: Duration::ZERO,
        }
    }

    /// A probe that never got a response.
    pub fn no_response(route: Route, error: String) -> Self {
        let mut result = Self::new(route, ProbeStatus::NoResponse);
        result.errors.push(error);
        result
    }

    /// The route navigated off-site: recorded as an external link, nothing else.
    pub fn off_site(route: Route, status: ProbeStatus, final_url: String) -> Self {
        let mut result = Self::new(route, status);
        result.external_links.push(final_url.clone());
        result.final_url = Some(final_url);
        result.off_site = true;
        result
    }

    pub fn is_failure(&self) -> bool {
        if self.off_site {
            return false;
        }
        self.status == ProbeStatus::NoResponse
            || self.status.is_http_failure()
            || !self.errors.is_empty()
            || !self.console_errors.is_empty()
    }
}

/// Collects page-level errors and console output for one probe.
///
/// Backends feed raw events in; the noise filter drops known-benign console
/// messages before they are recorded.
#[derive(Debug, Clone)]
pub struct ProbeDiagnostics {
    noise: NoiseFilter,
    errors: Vec<String>,
    console_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ProbeDiagnostics {
    pub fn new(noise: NoiseFilter) -> Self {
        Self {
            noise,
            errors: Vec::new(),
            console_errors: Vec::new(),
        }
    }

    pub fn page_error(&mut self, message: &str) {
        self.errors.push(format!("pageerror: {}", message));
    }

    pub fn navigation_error(&mut self, message: &str) {
        self.errors.push(format!("navigation: {}", message));
    }

    pub fn console(&mut self, level: ConsoleLevel, text: &str) {
        if level != ConsoleLevel::Error || self.noise.is_noise(text) {
            return;
        }
        self.console_errors.push(format!("console.error: {}", text));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.console_errors.is_empty()
    }

    /// Moves the collected diagnostics into `result`.
    pub fn apply(self, result: &mut RouteResult) {
        result.errors.extend(self.errors);
        result.console_errors.extend(self.console_errors);
    }
}
