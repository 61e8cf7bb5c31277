//! Binance Frame Codec
//!
//! Implements [`FrameDecoder`] for Binance spot stream frames. Combined-stream
//! envelopes are unwrapped first; control responses are recognised by their
//! `result`/`error` keys; everything else must be an aggregate trade.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::application::ports::{DecodeError, FrameDecoder, InboundFrame};
use crate::domain::tick::Tick;
use crate::infrastructure::binance::messages::{
    AGG_TRADE_EVENT, AggTradeMessage, CombinedStreamMessage, ControlErrorMessage,
    ControlResultMessage,
};

/// JSON codec for the Binance aggregate trade stream.
#[derive(Debug, Default, Clone)]
pub struct BinanceCodec;

impl BinanceCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn classify(value: Value) -> Result<InboundFrame, DecodeError> {
        let Value::Object(object) = &value else {
            return Err(DecodeError::InvalidFormat(format!(
                "expected JSON object, got {}",
                type_name(&value)
            )));
        };

        if object.contains_key("stream") && object.contains_key("data") {
            let envelope: CombinedStreamMessage = serde_json::from_value(value)?;
            return Self::classify(envelope.data);
        }

        if object.contains_key("error") {
            let rejected: ControlErrorMessage = serde_json::from_value(value)?;
            return Ok(InboundFrame::Rejected {
                id: rejected.id,
                code: rejected.error.code,
                msg: rejected.error.msg,
            });
        }

        if object.contains_key("result") {
            let ack: ControlResultMessage = serde_json::from_value(value)?;
            return Ok(InboundFrame::Ack { id: ack.id });
        }

        let trade: AggTradeMessage = serde_json::from_value(value)?;
        Ok(InboundFrame::Tick(Self::to_tick(trade)?))
    }

    /// Map an aggregate trade payload to a [`Tick`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for another event type, a missing `s`, `p`,
    /// `q` or `T`, an unparseable decimal, or a blank symbol.
    pub fn to_tick(trade: AggTradeMessage) -> Result<Tick, DecodeError> {
        match trade.event_type.as_deref() {
            Some(event) if event != AGG_TRADE_EVENT => {
                return Err(DecodeError::InvalidFormat(format!(
                    "unexpected event type '{event}'"
                )));
            }
            _ => {}
        }

        let symbol = trade.symbol.ok_or(DecodeError::MissingField("s"))?;
        let price = parse_decimal("p", trade.price)?;
        let quantity = parse_decimal("q", trade.quantity)?;
        let trade_time = trade.trade_time.ok_or(DecodeError::MissingField("T"))?;

        Ok(Tick::new(&symbol, price, quantity, trade_time)?
            .with_trade_ids(
                trade.aggregate_trade_id,
                trade.first_trade_id,
                trade.last_trade_id,
            )
            .with_buyer_is_maker(trade.buyer_is_maker)
            .with_event_time_reported(trade.event_time))
    }
}

impl FrameDecoder for BinanceCodec {
    fn decode(&self, text: &str) -> Result<InboundFrame, DecodeError> {
        let value: Value = serde_json::from_str(text.trim())?;
        Self::classify(value)
    }
}

fn parse_decimal(field: &'static str, raw: Option<String>) -> Result<Decimal, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingField(field))?;
    Decimal::from_str(raw.trim()).map_err(|e| DecodeError::InvalidField {
        field,
        reason: format!("'{raw}' is not a decimal: {e}"),
    })
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;
    use crate::domain::tick::TopicTemplate;

    fn decode(text: &str) -> Result<InboundFrame, DecodeError> {
        BinanceCodec::new().decode(text)
    }

    fn tick(text: &str) -> Tick {
        match decode(text).unwrap() {
            InboundFrame::Tick(tick) => tick,
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn reference_frame_to_record() {
        let tick = tick(r#"{"s":"BTCUSDT","p":"61234.50","q":"0.015","T":1700000000000}"#);

        assert_eq!(tick.symbol(), "BTCUSDT");
        assert_eq!(tick.price().to_string(), "61234.50");
        assert_eq!(tick.quantity().to_string(), "0.015");
        assert_eq!(tick.event_time_millis(), 1_700_000_000_000);

        let record = tick.to_publish_record(&TopicTemplate::default());
        assert_eq!(record.key_str(), "BTCUSDT-1700000000000");
        assert_eq!(record.topic, "trades-btcusdt");
        let value: Value = serde_json::from_slice(&record.value).unwrap();
        assert_eq!(value["price"], "61234.50");
        assert_eq!(value["quantity"], "0.015");
    }

    #[test]
    fn full_payload_carries_pass_through_fields() {
        let tick = tick(
            r#"{"e":"aggTrade","E":1700000000005,"s":"btcusdt","a":26129,"p":"1.0","q":"2.0","f":100,"l":105,"T":1700000000000,"m":true}"#,
        );
        assert_eq!(tick.symbol(), "BTCUSDT");
        assert_eq!(tick.aggregate_trade_id(), Some(26129));

        let value = tick.canonical_value();
        assert_eq!(value["firstTradeId"], 100);
        assert_eq!(value["lastTradeId"], 105);
        assert_eq!(value["buyerIsMaker"], true);
        assert_eq!(value["eventTimeReported"], 1_700_000_000_005_i64);
    }

    #[test]
    fn combined_stream_envelope_is_unwrapped() {
        let tick = tick(
            r#"{"stream":"ethusdt@aggTrade","data":{"s":"ETHUSDT","p":"3000.1","q":"5","T":42}}"#,
        );
        assert_eq!(tick.symbol(), "ETHUSDT");
        assert_eq!(tick.event_time_millis(), 42);
    }

    #[test_case(r#"{"p":"1","q":"1","T":1}"#, "s" ; "symbol")]
    #[test_case(r#"{"s":"BTCUSDT","q":"1","T":1}"#, "p" ; "price")]
    #[test_case(r#"{"s":"BTCUSDT","p":"1","T":1}"#, "q" ; "quantity")]
    #[test_case(r#"{"s":"BTCUSDT","p":"1","q":"1"}"#, "T" ; "trade time")]
    fn missing_required_field(json: &str, field: &str) {
        match decode(json) {
            Err(DecodeError::MissingField(missing)) => assert_eq!(missing, field),
            other => panic!("expected missing field {field}, got {other:?}"),
        }
    }

    #[test_case(r#"{"s":"BTCUSDT","p":61234.5,"q":"1","T":1}"# ; "numeric price")]
    #[test_case(r#"{"s":"BTCUSDT","p":"1","q":0.5,"T":1}"# ; "numeric quantity")]
    #[test_case(r#"{"s":"BTCUSDT","p":"1","q":"1","T":"1"}"# ; "string trade time")]
    #[test_case(r#"{"s":42,"p":"1","q":"1","T":1}"# ; "numeric symbol")]
    fn wrong_typed_field_is_json_error(json: &str) {
        assert!(matches!(decode(json), Err(DecodeError::Json(_))));
    }

    #[test]
    fn unparseable_decimal() {
        assert!(matches!(
            decode(r#"{"s":"BTCUSDT","p":"abc","q":"1","T":1}"#),
            Err(DecodeError::InvalidField { field: "p", .. })
        ));
    }

    #[test]
    fn blank_symbol_is_rejected() {
        assert!(matches!(
            decode(r#"{"s":"  ","p":"1","q":"1","T":1}"#),
            Err(DecodeError::Tick(_))
        ));
    }

    #[test]
    fn other_event_types_are_rejected() {
        assert!(matches!(
            decode(r#"{"e":"trade","s":"BTCUSDT","p":"1","q":"1","T":1}"#),
            Err(DecodeError::InvalidFormat(_))
        ));
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("[1,2]" ; "array")]
    #[test_case("\"text\"" ; "string")]
    fn malformed_frames(text: &str) {
        assert!(decode(text).is_err());
    }

    #[test]
    fn control_acknowledgement() {
        assert_eq!(
            decode(r#"{"result":null,"id":1}"#).unwrap(),
            InboundFrame::Ack { id: Some(1) }
        );
    }

    #[test]
    fn control_error() {
        assert_eq!(
            decode(r#"{"error":{"code":-1121,"msg":"Invalid symbol."},"id":1}"#).unwrap(),
            InboundFrame::Rejected {
                id: Some(1),
                code: -1121,
                msg: "Invalid symbol.".to_string(),
            }
        );
    }

    proptest! {
        #[test]
        fn symbol_case_does_not_change_record(
            symbol in "[a-zA-Z]{3,10}",
            time in 0_i64..4_000_000_000_000,
        ) {
            let json = format!(r#"{{"s":"{symbol}","p":"1.5","q":"2","T":{time}}}"#);
            let record = tick(&json).to_publish_record(&TopicTemplate::default());

            prop_assert_eq!(record.key_str(), format!("{}-{time}", symbol.to_uppercase()));
            prop_assert_eq!(record.topic, format!("trades-{}", symbol.to_lowercase()));
        }

        #[test]
        fn missing_symbol_is_always_decode_error(price in "[0-9]{1,6}\\.[0-9]{1,4}") {
            let json = format!(r#"{{"p":"{price}","q":"1","T":1}}"#);
            prop_assert!(matches!(decode(&json), Err(DecodeError::MissingField("s"))));
        }
    }
}
