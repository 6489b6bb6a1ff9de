pub mod client;
pub mod markets;

pub use client::SubgraphClient;
pub use markets::{read_all_markets, IndexPage, MarketFilter, MarketIndex, SubgraphMarketIndex};
