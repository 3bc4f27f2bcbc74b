//! Shared handles passed to both dispatchers

use std::sync::Arc;

use log::warn;

use fieldnode_core::constants::RELAY_COUNT;
use fieldnode_core::{
    CalibrationEngine, CalibrationError, Channel, KeyValueStore, SamplingPeriod,
    SharedTelemetryState,
};

use crate::error::LinkError;
use crate::network::{join_network, LinkInfo, NetworkControl, UpdateTransport};

/// Everything a dispatcher may read or change
pub struct NodeContext {
    pub device_name: String,
    /// Relay pins in logical order, for validation without the telemetry lock
    pub relay_pins: [u8; RELAY_COUNT],
    pub telemetry: SharedTelemetryState,
    pub primary: Arc<Channel>,
    pub secondary: Arc<Channel>,
    pub calibration: CalibrationEngine,
    pub sampling: SamplingPeriod,
    pub store: Arc<dyn KeyValueStore>,
    pub network: Arc<dyn NetworkControl>,
    pub updates: Arc<dyn UpdateTransport>,
}

impl NodeContext {
    /// Calibrate both channels in turn. Failures keep the previous offset
    /// and are logged.
    pub async fn calibrate_all(&self) -> [Result<f32, CalibrationError>; 2] {
        let mut results = [Ok(0.0), Ok(0.0)];
        for (slot, channel) in [&self.primary, &self.secondary].into_iter().enumerate() {
            let result = self.calibration.calibrate(channel).await;
            if let Err(e) = &result {
                warn!("calibration: {}", e);
            }
            results[slot] = result;
        }
        results
    }

    /// Calibrate both channels and name the ones that failed, comma
    /// separated. `None` when every channel produced a new offset.
    pub async fn calibrate_reporting(&self) -> Option<String> {
        let failed: Vec<String> = self
            .calibrate_all()
            .await
            .iter()
            .filter_map(|result| result.as_ref().err())
            .map(|e| e.channel().to_string())
            .collect();
        (!failed.is_empty()).then(|| failed.join(","))
    }

    /// Join a network, persist the credentials and arm updates
    pub async fn join_network(&self, ssid: &str, password: &str) -> Result<LinkInfo, LinkError> {
        join_network(
            self.network.as_ref(),
            self.store.as_ref(),
            self.updates.as_ref(),
            ssid,
            password,
        )
        .await
    }
}
