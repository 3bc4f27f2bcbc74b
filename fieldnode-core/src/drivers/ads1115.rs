//! ADS1115 16-bit ADC Driver
//!
//! Driver for the Texas Instruments ADS1115, a 16-bit, 4-input delta-sigma ADC
//! with a programmable gain amplifier, on an `embedded-hal` 1.0 I2C bus.
//!
//! # Operation
//!
//! The device is used in single-shot mode: every read writes the config
//! register with the OS bit set, polls until the OS bit reads back as 1
//! (conversion finished), then reads the conversion register.
//!
//! ```text
//! Config register (0x01)
//! ┌────┬───────┬───────┬──────┬───────┬──────────────┐
//! │ OS │  MUX  │  PGA  │ MODE │  DR   │  COMP (0b11) │
//! │ 15 │ 14:12 │ 11:9  │  8   │  7:5  │  4:0         │
//! └────┴───────┴───────┴──────┴───────┴──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut adc = Ads1115::new(i2c, 0x48, InputMux::Differential01);
//! adc.probe()?;
//! adc.configure(Gain::Eight, DataRate::Sps860)?;
//! let raw = adc.read_channel()?;
//! ```

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::errors::{BusError, BusResult};
use crate::traits::{BusDevice, DataRate, Gain, InputMux};

/// ADS1115 register pointers
mod regs {
    pub const CONVERSION: u8 = 0x00;
    pub const CONFIG: u8 = 0x01;
}

/// Config register bits
mod cfg {
    /// Write: start a conversion. Read: 1 when no conversion is in progress.
    pub const OS: u16 = 1 << 15;
    pub const MUX_SHIFT: u16 = 12;
    pub const PGA_SHIFT: u16 = 9;
    /// Single-shot / power-down mode
    pub const MODE_SINGLE: u16 = 1 << 8;
    pub const DR_SHIFT: u16 = 5;
    /// Comparator disabled
    pub const COMP_DISABLE: u16 = 0b11;
}

/// Status polls before a conversion is declared lost.
///
/// At 860 SPS a conversion takes ~1.2 ms and a poll ~0.3 ms at 100 kHz.
const MAX_CONVERSION_POLLS: usize = 16;

/// ADS1115 on a shared I2C bus
pub struct Ads1115<I> {
    i2c: I,
    address: u8,
    input: InputMux,
    settings: Option<(Gain, DataRate)>,
}

impl<I: I2c> Ads1115<I> {
    /// Create a driver for the device at `address` reading `input`
    pub fn new(i2c: I, address: u8, input: InputMux) -> Self {
        Self {
            i2c,
            address,
            input,
            settings: None,
        }
    }

    /// Release the bus handle
    pub fn release(self) -> I {
        self.i2c
    }

    fn config_word(&self, gain: Gain, rate: DataRate, start: bool) -> u16 {
        let os = if start { cfg::OS } else { 0 };
        os | (self.input.bits() << cfg::MUX_SHIFT)
            | (gain.bits() << cfg::PGA_SHIFT)
            | cfg::MODE_SINGLE
            | (rate.bits() << cfg::DR_SHIFT)
            | cfg::COMP_DISABLE
    }

    fn read_register(&mut self, register: u8) -> BusResult<u16> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| bus_error(self.address, e.kind()))?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write_register(&mut self, register: u8, value: u16) -> BusResult<()> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register, hi, lo])
            .map_err(|e| bus_error(self.address, e.kind()))
    }

    /// Kick off a single-shot conversion with the applied settings
    pub fn start_conversion(&mut self) -> BusResult<()> {
        let (gain, rate) = self.settings.ok_or(BusError::NotConfigured)?;
        let word = self.config_word(gain, rate, true);
        self.write_register(regs::CONFIG, word)
    }

    /// Poll for the result of the conversion started last
    pub fn poll_conversion(&mut self) -> nb::Result<i16, BusError> {
        let status = self.read_register(regs::CONFIG)?;
        if status & cfg::OS == 0 {
            return Err(nb::Error::WouldBlock);
        }
        let raw = self.read_register(regs::CONVERSION)?;
        Ok(raw as i16)
    }
}

impl<I: I2c + Send> BusDevice for Ads1115<I> {
    fn address(&self) -> u8 {
        self.address
    }

    fn probe(&mut self) -> BusResult<()> {
        self.read_register(regs::CONFIG).map(|_| ())
    }

    fn configure(&mut self, gain: Gain, rate: DataRate) -> BusResult<()> {
        let word = self.config_word(gain, rate, false);
        self.write_register(regs::CONFIG, word)?;
        self.settings = Some((gain, rate));
        Ok(())
    }

    fn read_channel(&mut self) -> BusResult<i16> {
        self.start_conversion()?;
        for _ in 0..MAX_CONVERSION_POLLS {
            match self.poll_conversion() {
                Ok(value) => return Ok(value),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
        Err(BusError::Timeout)
    }
}

fn bus_error(address: u8, kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusError::Nack { address },
        _ => BusError::Bus,
    }
}
