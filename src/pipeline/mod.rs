pub mod aggregator;
pub mod merger;
pub mod ranking;
pub mod status;

pub use aggregator::{Aggregator, ChainSources};
pub use merger::merge;
pub use ranking::sort_markets;
pub use status::market_status;
