//! FieldNode host firmware
//!
//! Boots a complete node on a development host: the acquisition engine, both
//! control protocols and the server lifecycle run unchanged, while the ADCs,
//! relay GPIOs, radio and Wi-Fi driver are simulated. Radio notifications are
//! printed to stdout and radio writes are typed on stdin (see [`console`]).
//!
//! # Usage
//!
//! ```bash
//! # Default board, RPC on 0.0.0.0:9000
//! fieldnode
//!
//! # Custom board description and listen address
//! FIELDNODE_CONFIG=board.json fieldnode --rpc-address 127.0.0.1:9100
//!
//! # Auxiliary ADC not fitted; it is reported unavailable until `bus 2 up`
//! fieldnode --without-aux
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

mod console;
mod file_store;
mod sim;

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use fieldnode_core::constants::{KEY_PASSWORD, KEY_SSID};
use fieldnode_core::{
    AcquisitionLoop, AcquisitionStats, CalibrationEngine, Channel, ChannelConfig, KeyValueStore,
    MemoryStore, MonotonicClock, NodeConfig, OutputDriver, RelayBank, SamplingPeriod,
    SensorHealthTracker, SharedTelemetryState, TimeSource, VERSION,
};
use fieldnode_link::{
    Characteristic, LifecycleCoordinator, LinkSupervisor, NodeContext, Notification,
    RadioCommandDispatcher, ScanEntry, TelemetryPublisher,
};

use console::ConsoleCommand;
use file_store::JsonFileStore;
use sim::{BusSwitch, SimOutput, SimUpdateTransport, SimulatedAdc, SimulatedNetwork};

/// FieldNode data-acquisition node (host build)
#[derive(Parser, Debug)]
#[command(name = "fieldnode", version, about, long_about = None)]
struct Cli {
    /// JSON board description; defaults apply when absent
    #[arg(short, long, env = "FIELDNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the RPC listen address
    #[arg(long)]
    rpc_address: Option<String>,

    /// Simulate a board without the auxiliary ADC
    #[arg(long)]
    without_aux: bool,

    /// Network visible to the simulated radio, as `ssid:rssi`
    #[arg(long = "network", value_parser = parse_network, default_values = ["fieldlab:-48", "barn:-71"])]
    networks: Vec<ScanEntry>,
}

fn parse_network(text: &str) -> Result<ScanEntry, String> {
    let (ssid, rssi) = text
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ssid:rssi, got {:?}", text))?;
    let rssi = rssi
        .parse::<i32>()
        .map_err(|e| format!("bad rssi {:?}: {}", rssi, e))?;
    if ssid.is_empty() {
        return Err("empty ssid".to_owned());
    }
    Ok(ScanEntry {
        ssid: ssid.to_owned(),
        rssi,
    })
}

fn load_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    let Some(path) = path else {
        info!("no board configuration given, using defaults");
        return Ok(NodeConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading board configuration {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parsing board configuration {}", path.display()))?;
    info!("board configuration loaded from {}", path.display());
    Ok(config)
}

fn open_store(path: &str) -> Arc<dyn KeyValueStore> {
    match JsonFileStore::open(path) {
        Ok(store) => {
            info!("settings store: {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("settings store {} unusable ({}), settings will not persist", path, e);
            Arc::new(MemoryStore::new())
        }
    }
}

/// Simulated waveform per channel: (baseline, swing) in counts
const SIM_WAVES: [(i16, i16); 2] = [(180, 40), (1_200, 15)];

fn channel(
    id: u8,
    config: &ChannelConfig,
    present: bool,
    clock: Arc<dyn TimeSource>,
) -> (Arc<Channel>, BusSwitch) {
    let (baseline, swing) = SIM_WAVES[usize::from(id.saturating_sub(1)).min(1)];
    let (adc, switch) = SimulatedAdc::new(config.address, baseline, swing, present);
    info!(
        "channel {}: adc 0x{:02x}, {:?}, gain {:?}, {:?}",
        id, config.address, config.input, config.gain, config.data_rate
    );
    let tracker =
        SensorHealthTracker::new(id, Box::new(adc), config.gain, config.data_rate, clock);
    (Arc::new(Channel::new(tracker)), switch)
}

fn spawn_radio_printer(mut inbox: UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = inbox.recv().await {
            let tag = match notification.characteristic {
                Characteristic::Data => "data",
                Characteristic::Relay => "relay",
                Characteristic::Wifi => "wifi",
            };
            println!("[{}] {}", tag, notification.payload);
        }
    })
}

/// Join the stored network, if credentials were saved
async fn join_stored_network(ctx: &NodeContext) {
    let ssid = match ctx.store.get_string(KEY_SSID) {
        Ok(Some(ssid)) if !ssid.is_empty() => ssid,
        Ok(_) => {
            info!("no stored network credentials");
            return;
        }
        Err(e) => {
            warn!("could not read stored ssid: {}", e);
            return;
        }
    };
    let password = ctx
        .store
        .get_string(KEY_PASSWORD)
        .ok()
        .flatten()
        .unwrap_or_default();
    if let Err(e) = ctx.join_network(&ssid, &password).await {
        warn!("joining stored network {} failed: {}", ssid, e);
    }
}

async fn console(
    radio: Arc<RadioCommandDispatcher>,
    network: Arc<SimulatedNetwork>,
    buses: [BusSwitch; 2],
    stats: Arc<AcquisitionStats>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("console closed, running until interrupted");
                std::future::pending::<()>().await;
                return;
            }
            Err(e) => {
                warn!("console read failed: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Connect { version }) => {
                radio.on_connect();
                if let Some(version) = version {
                    let _ = radio.handshake(&version);
                }
            }
            Ok(ConsoleCommand::Disconnect) => radio.on_disconnect(),
            Ok(ConsoleCommand::Write {
                characteristic,
                payload,
            }) => {
                // Failures were already sent back as notifications
                let _ = radio.handle_write(characteristic, &payload).await;
            }
            Ok(ConsoleCommand::Link { up: false }) => network.drop_link(),
            Ok(ConsoleCommand::Link { up: true }) => join_stored_network(radio.context()).await,
            Ok(ConsoleCommand::Bus { channel, present }) => {
                buses[usize::from(channel - 1)].set(present);
                info!("sim adc {} {}", channel, if present { "attached" } else { "detached" });
            }
            Ok(ConsoleCommand::Stats) => println!(
                "acquisition: {} ticks, {} skipped",
                stats.completed(),
                stats.skipped()
            ),
            Ok(ConsoleCommand::Quit) => return,
            Err(e) => warn!("{}", e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(address) = cli.rpc_address {
        config.rpc_address = address;
    }
    config.validate().context("invalid board configuration")?;
    info!("{} v{} booting", config.device_name, VERSION);

    let clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock::new());
    let store = open_store(&config.store_path);

    // Outputs take their persisted state before anything can command them
    let outputs = config
        .relay_pins
        .map(|pin| Box::new(SimOutput::new(pin)) as Box<dyn OutputDriver>);
    let mut relays = RelayBank::new(config.relay_pins, outputs, store.clone())
        .context("building relay bank")?;
    relays.restore();
    let telemetry = SharedTelemetryState::new(relays);
    let sampling = SamplingPeriod::restore(store.clone());

    let (primary, bus1) = channel(1, &config.shunt, true, clock.clone());
    let (secondary, bus2) = channel(2, &config.auxiliary, !cli.without_aux, clock.clone());

    let network = Arc::new(SimulatedNetwork::new(cli.networks));
    let updates = Arc::new(SimUpdateTransport::default());

    let ctx = Arc::new(NodeContext {
        device_name: config.device_name.clone(),
        relay_pins: config.relay_pins,
        telemetry: telemetry.clone(),
        primary: primary.clone(),
        secondary: secondary.clone(),
        calibration: CalibrationEngine::new(),
        sampling: sampling.clone(),
        store: store.clone(),
        network: network.clone(),
        updates: updates.clone(),
    });

    let (outbox, inbox) = mpsc::unbounded_channel();
    let printer = spawn_radio_printer(inbox);
    let radio = Arc::new(RadioCommandDispatcher::new(
        ctx.clone(),
        outbox,
        clock.clone(),
    ));

    for (adc, adc_config) in [(&primary, &config.shunt), (&secondary, &config.auxiliary)] {
        let initialized = adc.tracker().await.initialize();
        match initialized {
            Ok(()) => info!("channel {}: initialised", adc.id()),
            Err(e) if adc_config.required => {
                error!("channel {}: {}", adc.id(), e);
                radio.notify_relay(format!("ERROR:ADC:ADS1115_{}_INIT_FAIL", adc.id()));
                // Closing the outbox lets the printer flush the failure
                drop(radio);
                let _ = printer.await;
                bail!("required ADC channel {} failed to initialise: {}", adc.id(), e);
            }
            Err(e) => warn!(
                "channel {}: {}; continuing, it will be retried in the background",
                adc.id(),
                e
            ),
        }
    }

    for result in ctx.calibrate_all().await {
        match result {
            Ok(offset) => info!("boot calibration: offset {:.2}", offset),
            Err(e) => warn!("boot calibration: {}", e),
        }
    }

    let acquisition = AcquisitionLoop::new(primary, secondary, telemetry, sampling);
    let stats = acquisition.stats();
    tokio::spawn(acquisition.run());
    tokio::spawn(TelemetryPublisher::new(radio.clone(), clock.clone()).run());
    tokio::spawn(
        Arc::new(LifecycleCoordinator::new(
            ctx.clone(),
            clock.clone(),
            config.rpc_address.clone(),
        ))
        .run(),
    );
    tokio::spawn(LinkSupervisor::new(network.clone(), store.clone(), updates).run());

    let boot_ctx = ctx.clone();
    tokio::spawn(async move { join_stored_network(&boot_ctx).await });

    info!("{} up; type radio events on stdin", config.device_name);

    tokio::select! {
        _ = console(radio, network, [bus1, bus2], stats) => info!("shutdown requested"),
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("waiting for interrupt")?;
            info!("interrupted");
        }
    }
    Ok(())
}
