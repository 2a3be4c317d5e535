pub mod rest;
pub mod ws;

pub use ws::BinanceTrades;
