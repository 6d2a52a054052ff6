//! Stream name builders
//!
//! Pure formatting of Binance stream names. Symbols are lower-cased;
//! nothing here touches the registry.

use crate::core::stream_id::StreamId;

/// Default update period for the all-market mini ticker stream
pub const DEFAULT_MINI_TICKER_MS: u64 = 1000;

/// Partial book depth levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthLevel {
    Five,
    Ten,
    Twenty,
}

impl DepthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepthLevel::Five => "5",
            DepthLevel::Ten => "10",
            DepthLevel::Twenty => "20",
        }
    }
}

/// Kline/candlestick intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KlineInterval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
    ThreeDays,
    OneWeek,
    OneMonth,
}

impl KlineInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            KlineInterval::OneMinute => "1m",
            KlineInterval::ThreeMinutes => "3m",
            KlineInterval::FiveMinutes => "5m",
            KlineInterval::FifteenMinutes => "15m",
            KlineInterval::ThirtyMinutes => "30m",
            KlineInterval::OneHour => "1h",
            KlineInterval::TwoHours => "2h",
            KlineInterval::FourHours => "4h",
            KlineInterval::SixHours => "6h",
            KlineInterval::EightHours => "8h",
            KlineInterval::TwelveHours => "12h",
            KlineInterval::OneDay => "1d",
            KlineInterval::ThreeDays => "3d",
            KlineInterval::OneWeek => "1w",
            KlineInterval::OneMonth => "1M",
        }
    }
}

impl Default for KlineInterval {
    fn default() -> Self {
        KlineInterval::OneMinute
    }
}

fn symbol_stream(symbol: &str, suffix: &str) -> StreamId {
    let mut name = symbol.to_lowercase();
    name.push_str(suffix);
    StreamId::new(name)
}

/// `<symbol>@trade`
pub fn trade(symbol: &str) -> StreamId {
    symbol_stream(symbol, "@trade")
}

/// `<symbol>@aggTrade`
pub fn agg_trade(symbol: &str) -> StreamId {
    symbol_stream(symbol, "@aggTrade")
}

/// Diff depth (`<symbol>@depth`) or partial book (`<symbol>@depth<levels>`)
pub fn depth(symbol: &str, levels: Option<DepthLevel>) -> StreamId {
    match levels {
        Some(level) => symbol_stream(symbol, &format!("@depth{}", level.as_str())),
        None => symbol_stream(symbol, "@depth"),
    }
}

/// `<symbol>@kline_<interval>`
pub fn kline(symbol: &str, interval: KlineInterval) -> StreamId {
    symbol_stream(symbol, &format!("@kline_{}", interval.as_str()))
}

/// `<symbol>@ticker`
pub fn symbol_ticker(symbol: &str) -> StreamId {
    symbol_stream(symbol, "@ticker")
}

/// All-market 24h tickers
pub fn all_tickers() -> StreamId {
    StreamId::new("!ticker@arr")
}

/// All-market mini tickers pushed every `update_ms`
pub fn all_mini_tickers(update_ms: u64) -> StreamId {
    StreamId::new(format!("!miniTicker@arr@{}ms", update_ms))
}

/// Combined stream over several single-stream names.
///
/// User-data listen keys cannot be multiplexed on Binance; callers must
/// only pass market-data streams.
pub fn multiplex(streams: &[StreamId]) -> StreamId {
    let names: Vec<&str> = streams.iter().map(StreamId::name).collect();
    StreamId::combined(format!("streams={}", names.join("/")))
}
