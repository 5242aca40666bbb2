//! Scraping sources: job boards and career pages exposed as JSON feeds.

pub mod activities;
pub mod models;

pub use activities::{scrape_source, ScrapeReport};
pub use models::{NewScrapeSource, ScrapeSource, ScrapeSourceData};
