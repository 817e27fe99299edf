//! Binance Stream Clients
//!
//! One client per stream kind. Each owns its callback registry and decodes
//! combined-stream frames into typed events; connection handling lives in
//! the client adapter.

use crate::application::ports::{CodecError, StreamClient};
use crate::domain::streaming::{
    AggregateTrade, CandlestickEvent, CandlestickInterval, DepthEvent, SymbolStatistics, Trade,
    UserDataEvent,
};
use crate::domain::subscription::{StreamKey, StreamKind, SubscriptionRegistry, SymbolError};

use super::codec::{
    StreamFrame, decode_aggregate_trade, decode_candlestick, decode_depth, decode_frame,
    decode_statistics, decode_trade, decode_user_data,
};

fn decode_with<E>(
    raw: &str,
    decode: impl FnOnce(StreamFrame) -> Result<E, CodecError>,
) -> Result<Option<(String, E)>, CodecError> {
    let Some(frame) = decode_frame(raw)? else {
        return Ok(None);
    };
    let stream = frame.stream.clone();
    decode(frame).map(|event| Some((stream, event)))
}

macro_rules! stream_client {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, $event:ty, $parameter:ty,
        |$symbol:ident, $param:ident| $key:expr,
        $decode:path
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            registry: SubscriptionRegistry<$event>,
        }

        impl $name {
            /// Create a client with no subscriptions.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl StreamClient for $name {
            type Event = $event;
            type Parameter = $parameter;

            const NAME: &'static str = $label;

            fn stream_key(
                $symbol: &str,
                $param: &Self::Parameter,
            ) -> Result<StreamKey, SymbolError> {
                $key
            }

            fn registry(&self) -> &SubscriptionRegistry<Self::Event> {
                &self.registry
            }

            fn decode(&self, raw: &str) -> Result<Option<(String, Self::Event)>, CodecError> {
                decode_with(raw, $decode)
            }
        }
    };
}

stream_client!(
    /// Raw trade streams (`<symbol>@trade`).
    TradeClient, "trades", Trade, (),
    |symbol, _parameter| StreamKey::new(symbol, StreamKind::Trade),
    decode_trade
);

stream_client!(
    /// Aggregate trade streams (`<symbol>@aggTrade`).
    AggregateTradeClient, "aggregate_trades", AggregateTrade, (),
    |symbol, _parameter| StreamKey::new(symbol, StreamKind::AggregateTrade),
    decode_aggregate_trade
);

stream_client!(
    /// Candlestick streams (`<symbol>@kline_<interval>`).
    CandlestickClient, "candlesticks", CandlestickEvent, CandlestickInterval,
    |symbol, interval| StreamKey::new(symbol, StreamKind::Candlestick(*interval)),
    decode_candlestick
);

stream_client!(
    /// Depth streams: diff depth (`<symbol>@depth`) for `None`, partial
    /// depth (`<symbol>@depth<levels>`) for 5, 10 or 20 levels.
    DepthClient, "depth", DepthEvent, Option<u32>,
    |symbol, levels| StreamKey::new(symbol, StreamKind::depth(*levels)?),
    decode_depth
);

stream_client!(
    /// Rolling 24h statistics streams (`<symbol>@ticker`).
    StatisticsClient, "statistics", SymbolStatistics, (),
    |symbol, _parameter| StreamKey::new(symbol, StreamKind::Statistics),
    decode_statistics
);

stream_client!(
    /// User-data streams, addressed by listen key instead of symbol.
    UserDataClient, "user_data", UserDataEvent, (),
    |listen_key, _parameter| StreamKey::new(listen_key, StreamKind::UserData),
    decode_user_data
);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::domain::subscription::Callback;

    const AGG_TRADE: &str = r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1,
        "s":"BTCUSDT","a":5,"p":"1","q":"1","f":1,"l":1,"T":1,"m":false,"M":true}}"#;

    #[test]
    fn dispatches_to_matching_stream_only() {
        let client = AggregateTradeClient::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback<AggregateTrade> = Arc::new(move |trade: &AggregateTrade| sink.lock().push(trade.id));
        let other: Callback<AggregateTrade> = Arc::new(|_: &AggregateTrade| panic!("wrong stream"));

        client.subscribe("BTCUSDT", &(), callback).unwrap();
        client.subscribe("ETHUSDT", &(), other).unwrap();

        assert_eq!(client.handle_message(AGG_TRADE).unwrap(), 1);
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[test]
    fn unsubscribed_stream_invokes_nothing() {
        let client = AggregateTradeClient::new();
        assert_eq!(client.handle_message(AGG_TRADE).unwrap(), 0);
    }

    #[test]
    fn control_frames_are_ignored() {
        let client = TradeClient::new();
        assert_eq!(client.handle_message(r#"{"result":null,"id":7}"#).unwrap(), 0);
    }

    #[test]
    fn depth_levels_are_validated() {
        assert_eq!(
            DepthClient::stream_key("BTCUSDT", &Some(15)),
            Err(SymbolError::InvalidDepthLimit(15))
        );
        assert_eq!(
            DepthClient::stream_key("BTCUSDT", &Some(20))
                .unwrap()
                .stream_name(),
            "btcusdt@depth20"
        );
    }

    #[test]
    fn observed_streams_follow_subscriptions() {
        let client = CandlestickClient::new();
        let callback: Callback<CandlestickEvent> = Arc::new(|_: &CandlestickEvent| {});

        client
            .subscribe("BTCUSDT", &CandlestickInterval::Minute, Arc::clone(&callback))
            .unwrap();
        client
            .subscribe("BTCUSDT", &CandlestickInterval::Hour, Arc::clone(&callback))
            .unwrap();
        assert_eq!(
            client.observed_streams(),
            vec!["btcusdt@kline_1h".to_string(), "btcusdt@kline_1m".to_string()]
        );

        client
            .unsubscribe("BTCUSDT", &CandlestickInterval::Hour, &callback)
            .unwrap();
        assert_eq!(client.observed_streams(), vec!["btcusdt@kline_1m".to_string()]);
    }
}
