pub mod error;
pub mod filter;
pub mod prober;
pub mod result;
pub mod route;

pub use error::ScanError;
pub use filter::{NoiseFilter, RouteFilter};
pub use prober::{HttpProber, PageProber};
pub use result::{ConsoleLevel, PageMetrics, ProbeDiagnostics, ProbeStatus, RouteResult};
pub use route::{Category, Route};
