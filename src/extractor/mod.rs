pub mod page_extractor;
pub mod sitemap;

pub use page_extractor::PageExtractor;
pub use sitemap::{validate_sitemap, SitemapValidation};
