pub mod scrape;
pub mod sign;
