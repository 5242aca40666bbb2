pub mod scrape_source;

pub use scrape_source::{NewScrapeSource, ScrapeSource, ScrapeSourceData};
