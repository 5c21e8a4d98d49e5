//! Device bring-up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use duplex_core::config::DeviceConfig;
use duplex_core::DeviceTime;
use duplex_services::{Radio, SimConfig, SimRadio};

/// Settle time after arming the PPS time load.
const PPS_SETTLE: Duration = Duration::from_secs(1);

/// Build the configured backend, zero its clock on the next PPS edge and
/// wait for the edge to pass.
pub async fn bring_up(device: &DeviceConfig, rate: f64) -> Result<Arc<dyn Radio>> {
    tracing::info!(
        args = %device.args,
        backend = %device.backend,
        rate,
        freq = ?device.freq,
        lo_offset = device.lo_offset,
        rx_gain = ?device.rx_gain,
        tx_gain = ?device.tx_gain,
        bw = ?device.bw,
        reference = %device.reference,
        otw = %device.otw,
        subdev = ?device.subdev,
        channels = ?device.channels,
        rx_antenna = %device.rx_antenna,
        tx_antenna = ?device.tx_antenna,
        "device settings"
    );

    let radio: Arc<dyn Radio> = match device.backend.as_str() {
        "sim" => Arc::new(SimRadio::new(SimConfig {
            sample_rate: rate,
            ..SimConfig::default()
        })),
        other => bail!("unsupported radio backend {other:?} (available: sim)"),
    };

    tracing::info!("setting device timestamp to 0 at next PPS");
    radio.set_time_next_pps(DeviceTime::ZERO);
    tokio::time::sleep(PPS_SETTLE).await;

    tracing::info!(
        now = %radio.now(),
        max_rx = radio.max_rx_samples(),
        max_tx = radio.max_tx_samples(),
        "device ready"
    );
    Ok(radio)
}
