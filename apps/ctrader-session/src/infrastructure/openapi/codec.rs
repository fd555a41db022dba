//! Open API Codec
//!
//! Translates between typed session requests/responses and protobuf
//! envelopes.
//!
//! # Framing
//!
//! Every frame is one serialized `ProtoMessage`. The inner payload is the
//! serialized message named by `payloadType`; correlation ids travel in
//! `clientMsgId`.

use prost::Message;

use super::messages::{
    ProtoErrorRes, ProtoHeartbeatEvent, ProtoMessage, ProtoOaAccountAuthReq, ProtoOaAccountAuthRes,
    ProtoOaApplicationAuthReq, ProtoOaClientDisconnectEvent, ProtoOaErrorRes,
    ProtoOaGetTrendbarsReq, ProtoOaGetTrendbarsRes, ProtoOaSpotEvent, ProtoOaSubscribeSpotsReq,
    ProtoOaSymbolsListReq, ProtoOaSymbolsListRes, ProtoOaTrendbar, ProtoOaUnsubscribeSpotsReq,
    payload_type,
};
use crate::application::ports::Envelope;
use crate::application::session::{VenueError, VenueRequest, VenueResponse};
use crate::domain::market::{RawTrendbar, SpotTick};
use crate::domain::session::AppCredentials;
use crate::domain::symbols::SymbolListing;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The outer `ProtoMessage` frame could not be decoded.
    #[error("invalid frame: {0}")]
    Frame(#[source] prost::DecodeError),

    /// The payload of a known message type could not be decoded.
    #[error("invalid payload for message type {payload_type}: {source}")]
    Payload {
        /// Payload type of the envelope.
        payload_type: u32,
        /// Decoder error.
        #[source]
        source: prost::DecodeError,
    },
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Keep-alive from the venue.
    Heartbeat,
    /// Application auth succeeded.
    ApplicationAuthorized,
    /// Account auth succeeded.
    AccountAuthorized {
        /// Account id echoed by the venue.
        account_id: i64,
    },
    /// Response to a [`VenueRequest`].
    Response(VenueResponse),
    /// Structured error response.
    Error(VenueError),
    /// Spot price push.
    Spot(SpotTick),
    /// The venue is about to close the connection.
    ClientDisconnect {
        /// Reason given by the venue.
        reason: Option<String>,
    },
    /// A payload type this service does not handle.
    Unknown(u32),
}

// =============================================================================
// Framing
// =============================================================================

/// Serialize an envelope as a `ProtoMessage` frame.
#[must_use]
pub fn encode_frame(envelope: &Envelope) -> Vec<u8> {
    ProtoMessage {
        payload_type: envelope.payload_type,
        payload: Some(envelope.payload.clone()),
        client_msg_id: envelope.client_msg_id.clone(),
    }
    .encode_to_vec()
}

/// Parse a `ProtoMessage` frame into an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Frame`] if the bytes are not a valid `ProtoMessage`.
pub fn decode_frame(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let message = ProtoMessage::decode(bytes).map_err(CodecError::Frame)?;
    Ok(Envelope {
        payload_type: message.payload_type,
        payload: message.payload.unwrap_or_default(),
        client_msg_id: message.client_msg_id,
    })
}

/// Wrap a protobuf message in an envelope.
#[must_use]
pub fn envelope<M: Message>(payload_type: u32, message: &M) -> Envelope {
    Envelope::new(payload_type, message.encode_to_vec())
}

// =============================================================================
// Outbound
// =============================================================================

/// Heartbeat event.
#[must_use]
pub fn heartbeat() -> Envelope {
    envelope(
        payload_type::HEARTBEAT_EVENT,
        &ProtoHeartbeatEvent {
            payload_type: Some(payload_type::HEARTBEAT_EVENT),
        },
    )
}

/// Application auth request.
#[must_use]
pub fn application_auth(credentials: &AppCredentials) -> Envelope {
    envelope(
        payload_type::APPLICATION_AUTH_REQ,
        &ProtoOaApplicationAuthReq {
            payload_type: Some(payload_type::APPLICATION_AUTH_REQ),
            client_id: credentials.client_id().to_string(),
            client_secret: credentials.client_secret().to_string(),
        },
    )
}

/// Account auth request.
#[must_use]
pub fn account_auth(account_id: i64, access_token: &str) -> Envelope {
    envelope(
        payload_type::ACCOUNT_AUTH_REQ,
        &ProtoOaAccountAuthReq {
            payload_type: Some(payload_type::ACCOUNT_AUTH_REQ),
            ctid_trader_account_id: account_id,
            access_token: access_token.to_string(),
        },
    )
}

/// Encode a typed request for `account_id`.
#[must_use]
pub fn request(request: &VenueRequest, account_id: i64) -> Envelope {
    match request {
        VenueRequest::SymbolsList { include_archived } => envelope(
            payload_type::SYMBOLS_LIST_REQ,
            &ProtoOaSymbolsListReq {
                payload_type: Some(payload_type::SYMBOLS_LIST_REQ),
                ctid_trader_account_id: account_id,
                include_archived_symbols: Some(*include_archived),
            },
        ),
        VenueRequest::SubscribeSpots { symbol_ids } => envelope(
            payload_type::SUBSCRIBE_SPOTS_REQ,
            &ProtoOaSubscribeSpotsReq {
                payload_type: Some(payload_type::SUBSCRIBE_SPOTS_REQ),
                ctid_trader_account_id: account_id,
                symbol_id: symbol_ids.clone(),
                subscribe_to_spot_timestamp: Some(true),
            },
        ),
        VenueRequest::UnsubscribeSpots { symbol_ids } => envelope(
            payload_type::UNSUBSCRIBE_SPOTS_REQ,
            &ProtoOaUnsubscribeSpotsReq {
                payload_type: Some(payload_type::UNSUBSCRIBE_SPOTS_REQ),
                ctid_trader_account_id: account_id,
                symbol_id: symbol_ids.clone(),
            },
        ),
        VenueRequest::Trendbars {
            symbol_id,
            period,
            from_ms,
            to_ms,
            count,
        } => envelope(
            payload_type::GET_TRENDBARS_REQ,
            &ProtoOaGetTrendbarsReq {
                payload_type: Some(payload_type::GET_TRENDBARS_REQ),
                ctid_trader_account_id: account_id,
                from_timestamp: Some(*from_ms),
                to_timestamp: Some(*to_ms),
                period: period.wire_value(),
                symbol_id: *symbol_id,
                count: *count,
            },
        ),
    }
}

// =============================================================================
// Inbound
// =============================================================================

fn payload<M: Message + Default>(envelope: &Envelope) -> Result<M, CodecError> {
    M::decode(envelope.payload.as_slice()).map_err(|source| CodecError::Payload {
        payload_type: envelope.payload_type,
        source,
    })
}

fn raw_trendbar(bar: &ProtoOaTrendbar) -> RawTrendbar {
    RawTrendbar {
        low: bar.low(),
        delta_open: bar.delta_open(),
        delta_high: bar.delta_high(),
        delta_close: bar.delta_close(),
        volume: bar.volume(),
        utc_timestamp_minutes: bar.utc_timestamp_in_minutes(),
    }
}

/// Decode an inbound envelope.
///
/// # Errors
///
/// Returns [`CodecError::Payload`] if the payload of a known message type
/// is malformed. Unknown message types are not an error.
pub fn decode(envelope: &Envelope) -> Result<Inbound, CodecError> {
    let inbound = match envelope.payload_type {
        payload_type::HEARTBEAT_EVENT => Inbound::Heartbeat,
        payload_type::APPLICATION_AUTH_RES => Inbound::ApplicationAuthorized,
        payload_type::ACCOUNT_AUTH_RES => {
            let res: ProtoOaAccountAuthRes = payload(envelope)?;
            Inbound::AccountAuthorized {
                account_id: res.ctid_trader_account_id,
            }
        }
        payload_type::SYMBOLS_LIST_RES => {
            let res: ProtoOaSymbolsListRes = payload(envelope)?;
            let listings = res
                .symbol
                .iter()
                .map(|s| SymbolListing {
                    symbol_id: s.symbol_id,
                    name: s.symbol_name().to_string(),
                    enabled: s.enabled.unwrap_or(true),
                    description: s.description.clone(),
                })
                .collect();
            Inbound::Response(VenueResponse::SymbolsList(listings))
        }
        payload_type::SUBSCRIBE_SPOTS_RES => Inbound::Response(VenueResponse::SubscribeSpots),
        payload_type::UNSUBSCRIBE_SPOTS_RES => Inbound::Response(VenueResponse::UnsubscribeSpots),
        payload_type::GET_TRENDBARS_RES => {
            let res: ProtoOaGetTrendbarsRes = payload(envelope)?;
            Inbound::Response(VenueResponse::Trendbars {
                symbol_id: res.symbol_id,
                period: res.period,
                bars: res.trendbar.iter().map(raw_trendbar).collect(),
            })
        }
        payload_type::SPOT_EVENT => {
            let event: ProtoOaSpotEvent = payload(envelope)?;
            Inbound::Spot(SpotTick {
                symbol_id: event.symbol_id,
                bid: event.bid,
                ask: event.ask,
                timestamp_ms: event.timestamp,
            })
        }
        payload_type::OA_ERROR_RES => {
            let res: ProtoOaErrorRes = payload(envelope)?;
            Inbound::Error(VenueError {
                code: res.error_code,
                description: res.description,
                account_id: res.ctid_trader_account_id,
            })
        }
        payload_type::ERROR_RES => {
            let res: ProtoErrorRes = payload(envelope)?;
            Inbound::Error(VenueError {
                code: res.error_code,
                description: res.description,
                account_id: None,
            })
        }
        payload_type::CLIENT_DISCONNECT_EVENT => {
            let event: ProtoOaClientDisconnectEvent = payload(envelope)?;
            Inbound::ClientDisconnect {
                reason: event.reason,
            }
        }
        other => Inbound::Unknown(other),
    };
    Ok(inbound)
}
