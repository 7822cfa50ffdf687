pub mod api;
pub mod extract;


pub use api::{build_search_query, looks_like_challenge, search_params, JobFeed, MarketplaceClient};
pub use extract::JobExtractor;
