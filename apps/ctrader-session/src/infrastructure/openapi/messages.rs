//! cTrader Open API message definitions.
//!
//! Hand-maintained `prost` structs for the subset of `OpenApiCommonMessages`
//! and `OpenApiMessages` this service speaks. Field numbers and labels
//! follow the published `.proto` files.

/// Payload type numbers carried in `ProtoMessage.payloadType`.
pub mod payload_type {
    pub const ERROR_RES: u32 = 50;
    pub const HEARTBEAT_EVENT: u32 = 51;
    pub const APPLICATION_AUTH_REQ: u32 = 2100;
    pub const APPLICATION_AUTH_RES: u32 = 2101;
    pub const ACCOUNT_AUTH_REQ: u32 = 2102;
    pub const ACCOUNT_AUTH_RES: u32 = 2103;
    pub const SYMBOLS_LIST_REQ: u32 = 2114;
    pub const SYMBOLS_LIST_RES: u32 = 2115;
    pub const SUBSCRIBE_SPOTS_REQ: u32 = 2127;
    pub const SUBSCRIBE_SPOTS_RES: u32 = 2128;
    pub const UNSUBSCRIBE_SPOTS_REQ: u32 = 2129;
    pub const UNSUBSCRIBE_SPOTS_RES: u32 = 2130;
    pub const SPOT_EVENT: u32 = 2131;
    pub const GET_TRENDBARS_REQ: u32 = 2137;
    pub const GET_TRENDBARS_RES: u32 = 2138;
    pub const OA_ERROR_RES: u32 = 2142;
    pub const CLIENT_DISCONNECT_EVENT: u32 = 2148;
}

// =============================================================================
// OpenApiCommonMessages
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoMessage {
    #[prost(uint32, required, tag = "1")]
    pub payload_type: u32,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub payload: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub client_msg_id: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoErrorRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(string, required, tag = "2")]
    pub error_code: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "3")]
    pub description: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(uint64, optional, tag = "4")]
    pub maintenance_end_timestamp: ::core::option::Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatEvent {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
}

// =============================================================================
// Authentication
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaApplicationAuthReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(string, required, tag = "2")]
    pub client_id: ::prost::alloc::string::String,
    #[prost(string, required, tag = "3")]
    pub client_secret: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaApplicationAuthRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaAccountAuthReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(string, required, tag = "3")]
    pub access_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaAccountAuthRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaErrorRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, optional, tag = "2")]
    pub ctid_trader_account_id: ::core::option::Option<i64>,
    #[prost(string, required, tag = "3")]
    pub error_code: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "4")]
    pub description: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(int64, optional, tag = "5")]
    pub maintenance_end_timestamp: ::core::option::Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaClientDisconnectEvent {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub reason: ::core::option::Option<::prost::alloc::string::String>,
}

// =============================================================================
// Symbols
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaSymbolsListReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(bool, optional, tag = "3")]
    pub include_archived_symbols: ::core::option::Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaLightSymbol {
    #[prost(int64, required, tag = "1")]
    pub symbol_id: i64,
    #[prost(string, optional, tag = "2")]
    pub symbol_name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(bool, optional, tag = "3")]
    pub enabled: ::core::option::Option<bool>,
    #[prost(int64, optional, tag = "4")]
    pub base_asset_id: ::core::option::Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub quote_asset_id: ::core::option::Option<i64>,
    #[prost(int64, optional, tag = "6")]
    pub symbol_category_id: ::core::option::Option<i64>,
    #[prost(string, optional, tag = "7")]
    pub description: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaSymbolsListRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(message, repeated, tag = "3")]
    pub symbol: ::prost::alloc::vec::Vec<ProtoOaLightSymbol>,
}

// =============================================================================
// Spot subscriptions
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaSubscribeSpotsReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(int64, repeated, packed = "false", tag = "3")]
    pub symbol_id: ::prost::alloc::vec::Vec<i64>,
    #[prost(bool, optional, tag = "4")]
    pub subscribe_to_spot_timestamp: ::core::option::Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaSubscribeSpotsRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaUnsubscribeSpotsReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(int64, repeated, packed = "false", tag = "3")]
    pub symbol_id: ::prost::alloc::vec::Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaUnsubscribeSpotsRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaSpotEvent {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(int64, required, tag = "3")]
    pub symbol_id: i64,
    #[prost(uint64, optional, tag = "4")]
    pub bid: ::core::option::Option<u64>,
    #[prost(uint64, optional, tag = "5")]
    pub ask: ::core::option::Option<u64>,
    #[prost(message, repeated, tag = "6")]
    pub trendbar: ::prost::alloc::vec::Vec<ProtoOaTrendbar>,
    #[prost(uint64, optional, tag = "7")]
    pub session_close: ::core::option::Option<u64>,
    #[prost(int64, optional, tag = "8")]
    pub timestamp: ::core::option::Option<i64>,
}

// =============================================================================
// Trendbars
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaTrendbar {
    #[prost(int64, optional, tag = "3")]
    pub volume: ::core::option::Option<i64>,
    #[prost(int32, optional, tag = "4")]
    pub period: ::core::option::Option<i32>,
    #[prost(int64, optional, tag = "5")]
    pub low: ::core::option::Option<i64>,
    #[prost(uint64, optional, tag = "6")]
    pub delta_open: ::core::option::Option<u64>,
    #[prost(uint64, optional, tag = "7")]
    pub delta_close: ::core::option::Option<u64>,
    #[prost(uint64, optional, tag = "8")]
    pub delta_high: ::core::option::Option<u64>,
    #[prost(uint32, optional, tag = "9")]
    pub utc_timestamp_in_minutes: ::core::option::Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaGetTrendbarsReq {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(int64, optional, tag = "3")]
    pub from_timestamp: ::core::option::Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub to_timestamp: ::core::option::Option<i64>,
    #[prost(int32, required, tag = "5")]
    pub period: i32,
    #[prost(int64, required, tag = "6")]
    pub symbol_id: i64,
    #[prost(uint32, optional, tag = "7")]
    pub count: ::core::option::Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoOaGetTrendbarsRes {
    #[prost(uint32, optional, tag = "1")]
    pub payload_type: ::core::option::Option<u32>,
    #[prost(int64, required, tag = "2")]
    pub ctid_trader_account_id: i64,
    #[prost(int32, required, tag = "3")]
    pub period: i32,
    #[prost(int64, optional, tag = "4")]
    pub timestamp: ::core::option::Option<i64>,
    #[prost(message, repeated, tag = "5")]
    pub trendbar: ::prost::alloc::vec::Vec<ProtoOaTrendbar>,
    #[prost(int64, optional, tag = "6")]
    pub symbol_id: ::core::option::Option<i64>,
}
