//! Polymarket API clients: the fill feed and CLOB order mirroring.

mod clob_client;
mod data_client;
mod types;

pub use clob_client::{ClobClient, OrderResponse, OrderSide, OrderType};
pub use data_client::FeedClient;
pub use types::ActivityResponse;
