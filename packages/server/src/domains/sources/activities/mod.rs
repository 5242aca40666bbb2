pub mod scrape;

pub use scrape::{scrape_source, ScrapeReport};
