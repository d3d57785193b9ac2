//! Market Data Bounded Context
//!
//! Completed OHLCV bars and the bar-size enumeration the scheduler works with.

mod bar;
mod timeframe;

pub use bar::{Bar, BarError};
pub use timeframe::{Timeframe, TimeframeParseError};
