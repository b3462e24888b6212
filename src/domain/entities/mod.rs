pub mod lot;
pub mod market_data;
pub mod order;
pub mod position;
pub mod signal;
