//! Scheduled scraping of UpCloud managed services
//!
//! [`Scraper`] runs one cycle: resolve targets per enabled resource type,
//! fetch them on a bounded worker pool, normalize and emit. [`MetricsReceiver`]
//! owns the lifecycle and the timing loop that drives those cycles.

mod r#loop;
mod scrape;


pub use r#loop::{
    CycleReport, LoopSettings, MetricsReceiver, MetricsReceiverBuilder, ReceiverState,
};
pub use scrape::{ScrapeOutcome, Scraper};
