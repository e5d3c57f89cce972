//! Greenhouse controller firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin controller`
//! - **ESP32**: `cargo espflash flash --bin controller --features esp32 --release`
//!
//! ## Host mode
//!
//! The host build stores its identity under `~/.greenhouse-controller/`, treats the OS
//! network as the station link, simulates the sensors and logs the outputs.
//! Broker and cadence are taken from `GREENHOUSE_*` environment variables.
//! Ctrl+C stops the loop, including a broker reconnect wait.
//!
//! ## Restarts
//!
//! A newly applied identity ends the loop with [`Tick::Restart`]. The device
//! performs a chip restart; the host rebuilds every component and boots
//! again in-process.

use greenhouse_controller::{DeviceConfig, Tick};
use log::{error, info};

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn log_config(config: &DeviceConfig) {
    info!("Broker: {} as '{}'", config.broker.url(), config.broker.client_id);
    info!(
        "Poll period {:?}, irrigation band {}..{} %",
        config.poll_period, config.thresholds.low, config.thresholds.high
    );
}

#[cfg(not(feature = "esp32"))]
mod host {
    use super::*;
    use greenhouse_controller::messaging::RumqttTransport;
    use greenhouse_controller::sensors::SimulatedSensors;
    use greenhouse_controller::storage::FileStore;
    use greenhouse_controller::wifi::HostWifi;
    use greenhouse_controller::{
        Controller, CredentialStore, LogActuators, LogDisplay, NetworkManager, PortalServer,
    };
    use std::error::Error;
    use tokio_util::sync::CancellationToken;

    /// Starting soil moisture of the simulated bed.
    const SIMULATED_SOIL: f32 = 55.0;

    pub type HostError = Box<dyn Error + Send + Sync>;

    /// Build, boot and run the controller until cancelled.
    ///
    /// Each restart rebuilds the components from the persisted identity.
    pub fn run(config: DeviceConfig, cancel: CancellationToken) -> Result<(), HostError> {
        let mut boots = 0u32;
        loop {
            boots += 1;
            let store = CredentialStore::new(FileStore::open_default()?)?;
            let network = NetworkManager::new(
                HostWifi::new(),
                store,
                PortalServer::new(),
                config.join,
                config.access_point.clone(),
            );
            let sensors = SimulatedSensors::new(SIMULATED_SOIL);
            let actuators = sensors.with_feedback(LogActuators::new());
            let mut controller = Controller::new(
                &config,
                network,
                RumqttTransport::new(config.broker.clone()),
                sensors,
                actuators,
                LogDisplay::new(),
                cancel.clone(),
            );

            info!("Boot #{}", boots);
            controller.boot()?;
            match controller.run() {
                Tick::Restart => info!("Restarting with the new identity"),
                Tick::Cancelled | Tick::Continue => return Ok(()),
            }
        }
    }
}

#[cfg(not(feature = "esp32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    use std::process::ExitCode;
    use tokio_util::sync::CancellationToken;

    platform_init();
    info!("=== Greenhouse controller starting ===");
    info!("Platform: Host");

    let config = DeviceConfig::from_env();
    log_config(&config);

    let cancel = CancellationToken::new();
    let finished = CancellationToken::new();

    // The rumqttc blocking client drives its own runtime, so the loop gets a
    // plain thread rather than a blocking task on this one.
    let worker = {
        let cancel = cancel.clone();
        let finished = finished.clone();
        std::thread::spawn(move || {
            let result = host::run(config, cancel);
            finished.cancel();
            result
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            cancel.cancel();
        }
        _ = finished.cancelled() => {}
    }

    let code = match worker.join() {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("Controller stopped: {}", e);
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("Controller thread panicked");
            ExitCode::FAILURE
        }
    };
    info!("=== Greenhouse controller stopped ===");
    code
}

#[cfg(feature = "esp32")]
mod device {
    use super::*;
    use esp_idf_hal::gpio::AnyOutputPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use greenhouse_controller::device::GpioActuators;
    use greenhouse_controller::messaging::EspMqttTransport;
    use greenhouse_controller::sensors::AdcSensors;
    use greenhouse_controller::storage::NvsByteStore;
    use greenhouse_controller::wifi::EspWifiDriver;
    use greenhouse_controller::{Controller, CredentialStore, LogDisplay, NetworkManager, PortalServer};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Pause before restarting so the log reaches the serial monitor.
    const RESTART_PAUSE: Duration = Duration::from_secs(2);

    /// Board wiring: pump relay, alert LED, connected LED, provisioning LED.
    ///
    /// Sensors: soil on GPIO34, water level on GPIO35, light on GPIO32.
    pub fn run(config: DeviceConfig) -> Result<Tick, Box<dyn std::error::Error>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        let store = CredentialStore::new(NvsByteStore::open(nvs.clone())?)?;
        let wifi = EspWifiDriver::new(peripherals.modem, sysloop, Some(nvs))?;
        let network = NetworkManager::new(
            wifi,
            store,
            PortalServer::new(),
            config.join,
            config.access_point.clone(),
        );

        let pins = peripherals.pins;
        let actuators = GpioActuators::new(
            AnyOutputPin::from(pins.gpio26),
            AnyOutputPin::from(pins.gpio27),
            AnyOutputPin::from(pins.gpio2),
            AnyOutputPin::from(pins.gpio4),
        )?;
        let sensors = AdcSensors::new(peripherals.adc1, pins.gpio34, pins.gpio35, pins.gpio32)?;

        let mut controller = Controller::new(
            &config,
            network,
            EspMqttTransport::new(config.broker.clone()),
            sensors,
            actuators,
            LogDisplay::new(),
            CancellationToken::new(),
        );
        controller.boot()?;
        Ok(controller.run())
    }

    pub fn restart() -> ! {
        std::thread::sleep(RESTART_PAUSE);
        esp_idf_hal::reset::restart();
    }
}

#[cfg(feature = "esp32")]
fn main() {
    platform_init();
    info!("=== Greenhouse controller starting ===");
    info!("Platform: ESP32");

    let config = DeviceConfig::new();
    log_config(&config);

    match device::run(config) {
        Ok(Tick::Restart) => info!("New identity stored, restarting"),
        Ok(other) => info!("Controller loop ended ({:?}), restarting", other),
        Err(e) => error!("Fatal: {}, restarting", e),
    }
    device::restart();
}
