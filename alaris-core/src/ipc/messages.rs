//! Wire record types for the shared-memory channels
//!
//! Every record is exactly 128 bytes, `#[repr(C)]` with explicit trailing
//! padding and no interior gaps, so the byte image written by the
//! producer is the byte image observed by the consumer. Fields are
//! ordered widest-first to keep the layout free of implicit padding;
//! `bytemuck::Pod` enforces that at compile time.

use crate::core::time::now_ns;
use bytemuck::{Pod, Zeroable};

/// Record size shared by all three channel types.
pub const RECORD_SIZE: usize = 128;

/// Top-of-book quote for one option symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MarketDataMessage {
    /// Wall-clock capture time, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    pub bid: f64,
    pub ask: f64,
    pub underlying_price: f64,
    pub bid_iv: f64,
    pub ask_iv: f64,
    pub symbol_id: u32,
    pub bid_size: u32,
    pub ask_size: u32,
    /// Monotone per-producer sequence, for gap detection downstream.
    pub processing_sequence: u32,
    pub source_pid: u32,
    _pad: [u8; 60],
}

impl MarketDataMessage {
    pub fn new(symbol_id: u32) -> Self {
        Self {
            timestamp_ns: now_ns(),
            symbol_id,
            ..Zeroable::zeroed()
        }
    }

    /// Publish/consume gate: a quote is usable only when its book is
    /// coherent and the underlying trades at a positive price.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.timestamp_ns > 0
            && self.symbol_id > 0
            && self.bid >= 0.0
            && self.ask >= 0.0
            && self.bid <= self.ask
            && self.underlying_price > 0.0
    }

    #[inline(always)]
    pub fn stamp_now(&mut self) {
        self.timestamp_ns = now_ns();
    }
}

/// Actionable signal emitted by the strategy toward the execution side.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TradingSignalMessage {
    pub timestamp_ns: u64,
    /// Absolute expiry; a non-zero value in the past marks the signal
    /// expired.
    pub expiry_timestamp_ns: u64,
    pub theoretical_price: f64,
    pub market_price: f64,
    pub implied_volatility: f64,
    pub forecast_volatility: f64,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    pub expected_profit: f64,
    pub symbol_id: u32,
    /// Signed contracts; never zero for a valid signal.
    pub quantity: i32,
    pub sequence_number: u32,
    pub processing_deadline_us: u32,
    /// 0 = buy, 1 = sell.
    pub side: u8,
    pub urgency: u8,
    pub signal_type: u8,
    pub model_source: u8,
    _pad: [u8; 44],
}

impl TradingSignalMessage {
    pub fn new(symbol_id: u32) -> Self {
        Self {
            timestamp_ns: now_ns(),
            symbol_id,
            ..Zeroable::zeroed()
        }
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.timestamp_ns > 0
            && self.symbol_id > 0
            && self.confidence >= 0.0
            && self.confidence <= 1.0
            && (self.side == 0 || self.side == 1)
            && self.quantity != 0
    }

    /// True when the signal carries an expiry that has already passed.
    #[inline(always)]
    pub fn is_expired(&self) -> bool {
        self.expiry_timestamp_ns > 0 && now_ns() > self.expiry_timestamp_ns
    }

    #[inline(always)]
    pub fn stamp_now(&mut self) {
        self.timestamp_ns = now_ns();
    }
}

/// Cross-process coordination message.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ControlMessage {
    pub timestamp_ns: u64,
    pub sequence_number: u64,
    pub value1: f64,
    pub value2: f64,
    pub parameter1: u64,
    pub parameter2: u64,
    /// Discriminant from [`ControlKind`]; zero is invalid.
    pub message_type: u32,
    pub source_pid: u32,
    pub target_pid: u32,
    pub priority: u32,
    /// Opaque payload interpreted by the addressed process.
    pub data: [u8; 8],
    _pad: [u8; 56],
}

impl ControlMessage {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            timestamp_ns: now_ns(),
            message_type: kind as u32,
            ..Zeroable::zeroed()
        }
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.message_type > 0 && self.timestamp_ns > 0
    }

    #[inline(always)]
    pub fn kind(&self) -> ControlKind {
        ControlKind::from_raw(self.message_type)
    }

    #[inline(always)]
    pub fn stamp_now(&mut self) {
        self.timestamp_ns = now_ns();
    }
}

/// Control-channel operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlKind {
    Unknown = 0,

    // System control
    StartTrading = 1,
    StopTrading = 2,
    EmergencyStop = 3,
    SystemShutdown = 4,

    // Configuration control
    UpdateParameters = 10,
    ResetModels = 11,
    ReloadConfig = 12,
    SetLogLevel = 13,

    // Monitoring and status
    SystemStatus = 20,
    Heartbeat = 21,
    PerformanceRequest = 22,
    HealthCheck = 23,

    // Schedule coordination
    ScheduleUpdate = 30,
    TimingSync = 31,
    PerformanceReport = 32,
    DeadlineWarning = 33,
}

impl ControlKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::StartTrading,
            2 => Self::StopTrading,
            3 => Self::EmergencyStop,
            4 => Self::SystemShutdown,
            10 => Self::UpdateParameters,
            11 => Self::ResetModels,
            12 => Self::ReloadConfig,
            13 => Self::SetLogLevel,
            20 => Self::SystemStatus,
            21 => Self::Heartbeat,
            22 => Self::PerformanceRequest,
            23 => Self::HealthCheck,
            30 => Self::ScheduleUpdate,
            31 => Self::TimingSync,
            32 => Self::PerformanceReport,
            33 => Self::DeadlineWarning,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_records_are_exactly_128_bytes() {
        assert_eq!(size_of::<MarketDataMessage>(), RECORD_SIZE);
        assert_eq!(size_of::<TradingSignalMessage>(), RECORD_SIZE);
        assert_eq!(size_of::<ControlMessage>(), RECORD_SIZE);
    }

    #[test]
    fn test_market_data_layout_is_stable() {
        assert_eq!(offset_of!(MarketDataMessage, timestamp_ns), 0);
        assert_eq!(offset_of!(MarketDataMessage, bid), 8);
        assert_eq!(offset_of!(MarketDataMessage, ask_iv), 40);
        assert_eq!(offset_of!(MarketDataMessage, symbol_id), 48);
        assert_eq!(offset_of!(MarketDataMessage, source_pid), 64);
    }

    #[test]
    fn test_signal_layout_is_stable() {
        assert_eq!(offset_of!(TradingSignalMessage, timestamp_ns), 0);
        assert_eq!(offset_of!(TradingSignalMessage, expected_profit), 56);
        assert_eq!(offset_of!(TradingSignalMessage, symbol_id), 64);
        assert_eq!(offset_of!(TradingSignalMessage, quantity), 68);
        assert_eq!(offset_of!(TradingSignalMessage, side), 80);
        assert_eq!(offset_of!(TradingSignalMessage, model_source), 83);
    }

    #[test]
    fn test_control_layout_is_stable() {
        assert_eq!(offset_of!(ControlMessage, sequence_number), 8);
        assert_eq!(offset_of!(ControlMessage, message_type), 48);
        assert_eq!(offset_of!(ControlMessage, data), 64);
    }

    #[test]
    fn test_market_data_validity() {
        let mut msg = MarketDataMessage::new(42);
        msg.bid = 100.0;
        msg.ask = 101.0;
        msg.underlying_price = 100.5;
        assert!(msg.is_valid());

        msg.bid = 102.0; // crossed book
        assert!(!msg.is_valid());

        msg.bid = 100.0;
        msg.underlying_price = 0.0;
        assert!(!msg.is_valid());

        let zero = MarketDataMessage::zeroed();
        assert!(!zero.is_valid());
    }

    #[test]
    fn test_signal_validity_and_expiry() {
        let mut sig = TradingSignalMessage::new(7);
        sig.quantity = 10;
        sig.confidence = 0.9;
        sig.side = 0;
        assert!(sig.is_valid());
        assert!(!sig.is_expired());

        sig.side = 2;
        assert!(!sig.is_valid());
        sig.side = 1;

        sig.quantity = 0;
        assert!(!sig.is_valid());
        sig.quantity = -5;
        assert!(sig.is_valid());

        sig.confidence = 1.5;
        assert!(!sig.is_valid());
        sig.confidence = 1.0;

        sig.expiry_timestamp_ns = 1; // long past
        assert!(sig.is_expired());
        sig.expiry_timestamp_ns = now_ns() + 1_000_000_000;
        assert!(!sig.is_expired());
    }

    #[test]
    fn test_control_validity_and_kind_roundtrip() {
        let msg = ControlMessage::new(ControlKind::Heartbeat);
        assert!(msg.is_valid());
        assert_eq!(msg.kind(), ControlKind::Heartbeat);

        let mut unknown = msg;
        unknown.message_type = 9999;
        assert!(unknown.is_valid());
        assert_eq!(unknown.kind(), ControlKind::Unknown);

        let zero = ControlMessage::zeroed();
        assert!(!zero.is_valid());
    }

    #[test]
    fn test_byte_image_roundtrip() {
        let mut msg = MarketDataMessage::new(3);
        msg.bid = 1.25;
        msg.ask = 1.50;
        msg.underlying_price = 10.0;
        msg.processing_sequence = 77;

        let bytes = bytemuck::bytes_of(&msg);
        assert_eq!(bytes.len(), RECORD_SIZE);
        let back: MarketDataMessage = *bytemuck::from_bytes(bytes);
        assert_eq!(back, msg);
    }
}
