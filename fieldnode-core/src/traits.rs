//! Hardware seams of the acquisition engine
//!
//! The engine talks to hardware through two small traits. Keep them thin:
//! all state (availability, error counts, calibration) lives above them.

use serde::Deserialize;

use crate::errors::{BusResult, OutputFault};

/// Programmable gain (full-scale range) of an ADC front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gain {
    /// ±6.144 V
    TwoThirds,
    /// ±4.096 V
    One,
    /// ±2.048 V
    Two,
    /// ±1.024 V
    Four,
    /// ±0.512 V
    Eight,
    /// ±0.256 V
    Sixteen,
}

impl Gain {
    /// PGA field value (3 bits)
    pub const fn bits(self) -> u16 {
        match self {
            Gain::TwoThirds => 0b000,
            Gain::One => 0b001,
            Gain::Two => 0b010,
            Gain::Four => 0b011,
            Gain::Eight => 0b100,
            Gain::Sixteen => 0b101,
        }
    }
}

/// Conversion rate in samples per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRate {
    Sps8,
    Sps16,
    Sps32,
    Sps64,
    Sps128,
    Sps250,
    Sps475,
    Sps860,
}

impl DataRate {
    /// DR field value (3 bits)
    pub const fn bits(self) -> u16 {
        match self {
            DataRate::Sps8 => 0b000,
            DataRate::Sps16 => 0b001,
            DataRate::Sps32 => 0b010,
            DataRate::Sps64 => 0b011,
            DataRate::Sps128 => 0b100,
            DataRate::Sps250 => 0b101,
            DataRate::Sps475 => 0b110,
            DataRate::Sps860 => 0b111,
        }
    }
}

/// Analog input selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMux {
    /// AIN0 - AIN1
    Differential01,
    /// AIN0 - AIN3
    Differential03,
    /// AIN1 - AIN3
    Differential13,
    /// AIN2 - AIN3
    Differential23,
    /// AIN0 - GND
    SingleEnded0,
    /// AIN1 - GND
    SingleEnded1,
    /// AIN2 - GND
    SingleEnded2,
    /// AIN3 - GND
    SingleEnded3,
}

impl InputMux {
    /// MUX field value (3 bits)
    pub const fn bits(self) -> u16 {
        match self {
            InputMux::Differential01 => 0b000,
            InputMux::Differential03 => 0b001,
            InputMux::Differential13 => 0b010,
            InputMux::Differential23 => 0b011,
            InputMux::SingleEnded0 => 0b100,
            InputMux::SingleEnded1 => 0b101,
            InputMux::SingleEnded2 => 0b110,
            InputMux::SingleEnded3 => 0b111,
        }
    }
}

/// One analog front end on the shared bus
///
/// Implementations hold nothing beyond the bus handle, address and the last
/// applied configuration. Availability tracking belongs to
/// [`SensorHealthTracker`](crate::sensor::SensorHealthTracker).
pub trait BusDevice: Send {
    /// 7-bit bus address
    fn address(&self) -> u8;

    /// Check that the device acknowledges on the bus
    fn probe(&mut self) -> BusResult<()>;

    /// Apply gain and conversion rate
    fn configure(&mut self, gain: Gain, rate: DataRate) -> BusResult<()>;

    /// Perform one conversion on the configured input
    fn read_channel(&mut self) -> BusResult<i16>;
}

impl<T: BusDevice + ?Sized> BusDevice for Box<T> {
    fn address(&self) -> u8 {
        (**self).address()
    }

    fn probe(&mut self) -> BusResult<()> {
        (**self).probe()
    }

    fn configure(&mut self, gain: Gain, rate: DataRate) -> BusResult<()> {
        (**self).configure(gain, rate)
    }

    fn read_channel(&mut self) -> BusResult<i16> {
        (**self).read_channel()
    }
}

/// A single digital output driving a relay coil
pub trait OutputDriver: Send {
    /// Drive the output high (`true`) or low
    fn drive(&mut self, high: bool) -> Result<(), OutputFault>;
}

/// Adapter from any `embedded-hal` output pin to [`OutputDriver`]
pub struct HalOutput<P> {
    pin: P,
}

impl<P> HalOutput<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    /// Release the wrapped pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> OutputDriver for HalOutput<P>
where
    P: embedded_hal::digital::OutputPin + Send,
{
    fn drive(&mut self, high: bool) -> Result<(), OutputFault> {
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|_| OutputFault)
    }
}
