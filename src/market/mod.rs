pub mod snapshot;
pub mod types;

pub use snapshot::{kimchi_premium, MarketSnapshot, PerCurrency, Reading, SharedSnapshot};
pub use types::{
    Candle, Currency, FearGreed, MaCross, MaPeriod, RsiInterval, RsiReading, RsiSignal,
    VolumeBucket,
};
