pub mod crawl;
pub mod policy;
pub mod report;

pub use crawl::{BatchCallback, BatchProgress, CrawlOutcome, CrawlSession, FailureRecord};
pub use policy::{CategoryCaps, CrawlPolicy};
pub use report::{Attachment, ReportFormat};

// Scanner types show up in every public signature here
pub use routewalk_scanner;
