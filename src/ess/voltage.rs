//! Voltage channels and raw-sample calibration.
//!
//! Two firmware generations report voltages differently: the shipped firmware
//! sends millivolts, an older one sent raw 12-bit ADC counts taken behind a 5:1
//! divider. The two are not wire-compatible, so the scale is configuration.

use crate::constants::{ADC_DIVIDER_GAIN, ADC_FULL_SCALE, ADC_REFERENCE_VOLTS, MILLIVOLT_FACTOR};
use serde::Serialize;
use std::fmt;

/// The four measured voltage channels, in wire order (`V1`..`V4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Load,
    Charge,
    BankA,
    BankB,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Load, Channel::Charge, Channel::BankA, Channel::BankB];

    /// Position of the channel in wire order.
    pub fn index(self) -> usize {
        match self {
            Channel::Load => 0,
            Channel::Charge => 1,
            Channel::BankA => 2,
            Channel::BankB => 3,
        }
    }

    /// The status frame key carrying this channel.
    pub fn key(self) -> &'static str {
        match self {
            Channel::Load => "V1",
            Channel::Charge => "V2",
            Channel::BankA => "V3",
            Channel::BankB => "V4",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Load => "Load",
            Channel::Charge => "Charge",
            Channel::BankA => "Bank A",
            Channel::BankB => "Bank B",
        };
        f.write_str(name)
    }
}

/// Linear calibration from raw sample to volts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoltageScale {
    factor: f64,
}

impl VoltageScale {
    /// Samples are millivolts.
    pub const MILLIVOLTS: VoltageScale = VoltageScale {
        factor: MILLIVOLT_FACTOR,
    };

    /// An arbitrary volts-per-count factor. Non-finite or negative factors are rejected.
    pub fn new(factor: f64) -> Option<Self> {
        (factor.is_finite() && factor >= 0.0).then_some(VoltageScale { factor })
    }

    /// Samples are raw ADC counts: `raw * reference / full_scale * gain`.
    pub fn adc(reference: f64, full_scale: f64, gain: f64) -> Option<Self> {
        if full_scale <= 0.0 {
            return None;
        }
        Self::new(reference / full_scale * gain)
    }

    /// The stock ADC preset (3.3 V reference, 12-bit converter, 5:1 divider).
    pub fn stock_adc() -> Self {
        VoltageScale {
            factor: ADC_REFERENCE_VOLTS / ADC_FULL_SCALE * ADC_DIVIDER_GAIN,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Converts a raw sample, rounded to 2 decimals for storage.
    pub fn to_volts(&self, raw: u32) -> f64 {
        let volts = f64::from(raw) * self.factor;
        (volts * 100.0).round() / 100.0
    }
}

impl Default for VoltageScale {
    fn default() -> Self {
        VoltageScale::MILLIVOLTS
    }
}

/// Display form of a stored voltage: one decimal and a unit, e.g. `12.3V`.
pub fn format_volts(volts: f64) -> String {
    format!("{volts:.1}V")
}
