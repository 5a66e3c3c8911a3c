//! Puts the pieces together: one state store, one valve, one serial device.

use std::sync::Arc;

use tracing::info;

use crate::{
    air::{pin::OutputPin, AirAssist},
    config::Config,
    error::Error,
    relay::{self, Relay},
    serial::serial_port::{SerialPortBuilder, SerialPortHandle},
    server,
    state::{RuntimeState, StateStore},
};

/// A bridge ready to run.
#[derive(Debug)]
pub struct Bridge {
    config: Config,
    store: StateStore,
    air: AirAssist,
    serial: Arc<SerialPortHandle>,
}

impl Bridge {
    /// Open the serial device and the air-assist pin named in `config`.
    ///
    /// Failing to open the serial device is an error.
    /// Failing to set up the pin only disables air assist.
    pub async fn open(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let serial = SerialPortBuilder::new(&config.grbl.device)
            .set_baud(config.grbl.baud)
            .set_flow_control(config.grbl.flow_control.into())
            .build()?;
        info!("GRBL connected: {}", config.grbl.device);

        let store = StateStore::new(RuntimeState::new(
            &config.grbl.device,
            config.air.override_force,
        ));
        let air = AirAssist::from_config(&config.air, store.clone()).await;

        Ok(Self {
            config,
            store,
            air,
            serial: Arc::new(serial),
        })
    }

    /// Build a bridge on an already open serial device and, if air assist is enabled, a pin.
    pub async fn with_parts(
        config: Config,
        serial: SerialPortHandle,
        pin: Option<Box<dyn OutputPin>>,
    ) -> Self {
        let store = StateStore::new(RuntimeState::new(
            serial.device(),
            config.air.override_force,
        ));

        let air = match pin {
            Some(pin) if config.air.enable => AirAssist::new(&config.air, pin, store.clone()).await,
            _ => AirAssist::disabled(&config.air, store.clone()),
        };

        Self {
            config,
            store,
            air,
            serial: Arc::new(serial),
        }
    }

    /// The configuration this bridge was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The state store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The air-assist valve.
    pub fn air(&self) -> &AirAssist {
        &self.air
    }

    /// A relay for this bridge.
    pub fn relay(&self) -> Relay {
        Relay::new(self.serial.clone(), self.store.clone(), self.air.clone())
    }

    /// The status API for this bridge.
    pub fn api(&self) -> axum::Router {
        server::app(self.config.clone(), self.store.clone())
    }

    /// Run the relay and the status API on their configured ports.
    ///
    /// Only returns if one of them fails.
    pub async fn run(&self) -> Result<(), Error> {
        info!(air_override_force = %self.config.air.override_force, "Bridge started");

        tokio::try_join!(
            relay::run_on_port(self.relay(), self.config.bridge.tcp_port),
            server::run_on_port(self.api(), self.config.api.port),
        )?;

        Ok(())
    }

    /// Report everything as stopped and close the valve.
    pub async fn shutdown(&self) {
        info!("Shutdown, AIR OFF");

        self.store
            .update(|state| {
                state.client_connected = false;
                state.streaming = false;
            })
            .await;

        self.air.shutdown().await;
    }
}
