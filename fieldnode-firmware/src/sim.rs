//! Simulated board peripherals for host runs
//!
//! The host has no I2C bus, relay GPIOs, radio or Wi-Fi driver. These stand-ins
//! implement the same seams the hardware drivers do, so the node runs the
//! production code paths unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use fieldnode_core::{BusDevice, BusError, BusResult, DataRate, Gain, OutputDriver, OutputFault};
use fieldnode_link::{LinkError, LinkInfo, LinkStatus, NetworkControl, ScanEntry, UpdateTransport};

/// Shared presence switch of a [`SimulatedAdc`]
#[derive(Debug, Clone)]
pub struct BusSwitch(Arc<AtomicBool>);

impl BusSwitch {
    pub fn set(&self, present: bool) {
        self.0.store(present, Ordering::SeqCst);
    }

    pub fn is_present(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// ADC producing a slow triangle wave around a baseline
pub struct SimulatedAdc {
    address: u8,
    baseline: i16,
    swing: i16,
    step: u32,
    configured: bool,
    present: BusSwitch,
}

impl SimulatedAdc {
    pub fn new(address: u8, baseline: i16, swing: i16, present: bool) -> (Self, BusSwitch) {
        let switch = BusSwitch(Arc::new(AtomicBool::new(present)));
        (
            Self {
                address,
                baseline,
                swing: swing.max(1),
                step: 0,
                configured: false,
                present: switch.clone(),
            },
            switch,
        )
    }

    fn ack(&self) -> BusResult<()> {
        if self.present.is_present() {
            Ok(())
        } else {
            Err(BusError::Nack {
                address: self.address,
            })
        }
    }
}

impl BusDevice for SimulatedAdc {
    fn address(&self) -> u8 {
        self.address
    }

    fn probe(&mut self) -> BusResult<()> {
        self.ack()
    }

    fn configure(&mut self, gain: Gain, rate: DataRate) -> BusResult<()> {
        self.ack()?;
        debug!("sim adc 0x{:02x}: gain {:?}, rate {:?}", self.address, gain, rate);
        self.configured = true;
        Ok(())
    }

    fn read_channel(&mut self) -> BusResult<i16> {
        self.ack()?;
        if !self.configured {
            return Err(BusError::NotConfigured);
        }
        let period = 4 * self.swing as u32;
        let phase = (self.step % period) as i32;
        self.step = self.step.wrapping_add(1);
        let swing = self.swing as i32;
        let offset = if phase < 2 * swing {
            phase - swing
        } else {
            3 * swing - phase
        };
        Ok((self.baseline as i32 + offset).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
    }
}

/// Relay output that only logs
pub struct SimOutput {
    pin: u8,
}

impl SimOutput {
    pub fn new(pin: u8) -> Self {
        Self { pin }
    }
}

impl OutputDriver for SimOutput {
    fn drive(&mut self, high: bool) -> Result<(), OutputFault> {
        debug!("gpio {} -> {}", self.pin, if high { "high" } else { "low" });
        Ok(())
    }
}

/// Network stack with a fixed set of visible networks
///
/// Joining succeeds for any visible SSID after a short delay. The link can be
/// dropped and restored from the console to exercise the server lifecycle.
pub struct SimulatedNetwork {
    visible: Vec<ScanEntry>,
    status: Mutex<LinkStatus>,
    join_delay: Duration,
}

impl SimulatedNetwork {
    pub fn new(visible: Vec<ScanEntry>) -> Self {
        Self {
            visible,
            status: Mutex::new(LinkStatus::Idle),
            join_delay: Duration::from_millis(300),
        }
    }

    fn set_status(&self, status: LinkStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Drop the link without a disconnect request
    pub fn drop_link(&self) {
        info!("sim network: link lost");
        self.set_status(LinkStatus::Disconnected);
    }
}

#[async_trait]
impl NetworkControl for SimulatedNetwork {
    async fn scan(&self) -> Result<Vec<ScanEntry>, LinkError> {
        tokio::time::sleep(self.join_delay).await;
        Ok(self.visible.clone())
    }

    async fn connect(&self, ssid: &str, _password: &str) -> Result<LinkInfo, LinkError> {
        tokio::time::sleep(self.join_delay).await;
        match self.visible.iter().find(|n| n.ssid == ssid) {
            Some(network) => {
                self.set_status(LinkStatus::Connected {
                    ssid: network.ssid.clone(),
                    rssi: network.rssi,
                });
                Ok(LinkInfo {
                    ssid: network.ssid.clone(),
                    rssi: network.rssi,
                })
            }
            None => {
                self.set_status(LinkStatus::ConnectionFailed);
                Err(LinkError::JoinFailed {
                    ssid: ssid.to_owned(),
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.set_status(LinkStatus::Disconnected);
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or(LinkStatus::Unknown)
    }
}

/// Update transport that just records being armed
#[derive(Debug, Default)]
pub struct SimUpdateTransport {
    armed: AtomicBool,
}

impl UpdateTransport for SimUpdateTransport {
    fn arm(&self) -> Result<(), LinkError> {
        if !self.armed.swap(true, Ordering::SeqCst) {
            info!("sim update transport armed");
        }
        Ok(())
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc_wave_stays_within_swing() {
        let (mut adc, _) = SimulatedAdc::new(0x48, 100, 5, true);
        adc.configure(Gain::Eight, DataRate::Sps860).unwrap();
        let values: Vec<i16> = (0..40).map(|_| adc.read_channel().unwrap()).collect();
        assert!(values.iter().all(|v| (95..=105).contains(v)));
        assert_eq!(values[0], 95);
        assert_eq!(values[10], 105);
    }

    #[test]
    fn absent_adc_nacks_until_switched_on() {
        let (mut adc, switch) = SimulatedAdc::new(0x49, 0, 10, false);
        assert_eq!(adc.probe(), Err(BusError::Nack { address: 0x49 }));
        switch.set(true);
        assert!(adc.probe().is_ok());
        assert_eq!(adc.read_channel(), Err(BusError::NotConfigured));
    }

    #[tokio::test(start_paused = true)]
    async fn network_joins_visible_ssids_only() {
        let network = SimulatedNetwork::new(vec![ScanEntry {
            ssid: "barn".into(),
            rssi: -60,
        }]);
        assert!(network.connect("attic", "pw").await.is_err());
        assert_eq!(network.status(), LinkStatus::ConnectionFailed);

        let link = network.connect("barn", "pw").await.unwrap();
        assert_eq!(link.rssi, -60);
        assert!(network.is_link_up());

        network.drop_link();
        assert!(!network.is_link_up());
    }
}
