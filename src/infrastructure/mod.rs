pub mod binance_client;
pub mod retry;
