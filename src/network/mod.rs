//! Network identity state machine.
//!
//! [`NetworkManager`] decides at boot whether the device joins a station
//! network with its stored identity or falls back to hosting the
//! provisioning access point:
//!
//! ```text
//! Disconnected ──(identity stored)──▶ StationConnecting ──(link up)──▶ StationConnected
//!      │                                     │
//!      │ (no identity)                       │ (attempts exhausted)
//!      ▼                                     ▼
//!  ProvisioningAP ◀──────────────────────────┘
//! ```
//!
//! `StationConnected` and `ProvisioningAP` are terminal until the next
//! restart; a new identity is applied by persisting it and restarting.

use crate::config::{AccessPointConfig, IdentityError, JoinPolicy, NetworkIdentity};
use crate::device::DeviceContext;
use crate::messaging::topics::{Outbound, SCAN_RESULTS};
use crate::provisioning::{PortalError, ProvisioningEndpoint};
use crate::storage::{ByteStore, CredentialStore, StorageError};
use crate::wifi::{WifiDriver, WifiError};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::IpAddr;
use std::thread;

/// Status published when no identity is stored.
pub const STATUS_NO_CREDENTIALS: &str = "NO CREDENCIALES - MODO CONFIGURACION AP";

/// Status published when the join attempts are exhausted.
pub const STATUS_JOIN_FAILED: &str = "FALLO CONEXION";

/// Status published after a new identity is stored.
pub const STATUS_IDENTITY_RECEIVED: &str = "CREDENCIALES RECIBIDAS - REINICIANDO";

/// Status published after a successful join.
pub fn connected_status(address: Option<IpAddr>) -> String {
    match address {
        Some(ip) => format!("CONECTADO OK: {}", ip),
        None => "CONECTADO OK".to_string(),
    }
}

/// Status published once the access point is up.
pub fn provisioning_status(address: IpAddr) -> String {
    format!("MODO CONFIGURACION AP: {}", address)
}

/// Network identity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Nothing attempted yet.
    #[default]
    Disconnected,
    /// Station join in progress.
    StationConnecting,
    /// Joined to a station network.
    StationConnected,
    /// Hosting the provisioning access point.
    ProvisioningAP,
}

/// Connection indicator outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicators {
    /// Steady on while joined.
    pub connected: bool,
    /// Steady on in every other mode.
    pub provisioning: bool,
}

impl ConnectionMode {
    /// Indicator outputs for this mode. Exactly one is on.
    pub fn indicators(&self) -> Indicators {
        let connected = *self == Self::StationConnected;
        Indicators {
            connected,
            provisioning: !connected,
        }
    }
}

/// Network manager errors.
#[derive(Debug)]
pub enum NetworkError {
    /// Access point could not be started.
    AccessPoint(WifiError),
    /// Provisioning portal could not be started.
    Portal(PortalError),
    /// Identity rejected.
    Identity(IdentityError),
    /// Credential storage failure.
    Storage(StorageError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint(e) => write!(f, "access point failed to start: {}", e),
            Self::Portal(e) => write!(f, "portal failed to start: {}", e),
            Self::Identity(e) => write!(f, "invalid identity: {}", e),
            Self::Storage(e) => write!(f, "credential storage: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AccessPoint(e) => Some(e),
            Self::Portal(e) => Some(e),
            Self::Identity(e) => Some(e),
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<PortalError> for NetworkError {
    fn from(e: PortalError) -> Self {
        Self::Portal(e)
    }
}

impl From<IdentityError> for NetworkError {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

impl From<StorageError> for NetworkError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Owns the radio, the credential store and the provisioning endpoint.
pub struct NetworkManager<W, B, P>
where
    W: WifiDriver,
    B: ByteStore,
    P: ProvisioningEndpoint,
{
    wifi: W,
    store: CredentialStore<B>,
    portal: P,
    join: JoinPolicy,
    access_point: AccessPointConfig,
    identity: Option<NetworkIdentity>,
}

impl<W, B, P> NetworkManager<W, B, P>
where
    W: WifiDriver,
    B: ByteStore,
    P: ProvisioningEndpoint,
{
    /// Create a manager.
    pub fn new(
        wifi: W,
        store: CredentialStore<B>,
        portal: P,
        join: JoinPolicy,
        access_point: AccessPointConfig,
    ) -> Self {
        Self {
            wifi,
            store,
            portal,
            join,
            access_point,
            identity: None,
        }
    }

    /// Identity loaded at boot.
    pub fn identity(&self) -> Option<&NetworkIdentity> {
        self.identity.as_ref()
    }

    /// Radio driver.
    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    /// Credential store.
    pub fn store(&self) -> &CredentialStore<B> {
        &self.store
    }

    /// Provisioning endpoint.
    pub fn portal(&self) -> &P {
        &self.portal
    }

    /// Provisioning endpoint, mutably.
    pub fn portal_mut(&mut self) -> &mut P {
        &mut self.portal
    }

    /// Take the components back, e.g. to rebuild after a restart.
    pub fn into_parts(self) -> (W, CredentialStore<B>, P) {
        (self.wifi, self.store, self.portal)
    }

    /// Bring the network up from the stored identity.
    ///
    /// Ends in either [`ConnectionMode::StationConnected`] or
    /// [`ConnectionMode::ProvisioningAP`]. Only an access point or portal
    /// startup failure is an error. Returns the status messages to publish.
    pub fn initialize(&mut self, ctx: &mut DeviceContext) -> Result<Vec<Outbound>, NetworkError> {
        ctx.mode = ConnectionMode::Disconnected;
        self.identity = self.store.load();

        let mut statuses = Vec::new();
        let Some(identity) = self.identity.clone() else {
            info!("No stored network identity");
            statuses.push(set_status(ctx, STATUS_NO_CREDENTIALS));
            statuses.extend(self.enter_provisioning(ctx)?);
            return Ok(statuses);
        };

        ctx.mode = ConnectionMode::StationConnecting;
        if self.join_station(&identity) {
            ctx.mode = ConnectionMode::StationConnected;
            let address = self.wifi.station_address();
            info!("Joined '{}' with address {:?}", identity.name(), address);
            statuses.push(set_status(ctx, connected_status(address)));
            return Ok(statuses);
        }

        warn!(
            "Could not join '{}' within {:?}, falling back to provisioning",
            identity.name(),
            self.join.timeout()
        );
        if let Err(e) = self.wifi.stop_station() {
            warn!("Failed to stop station: {}", e);
        }
        statuses.push(set_status(ctx, STATUS_JOIN_FAILED));
        statuses.extend(self.enter_provisioning(ctx)?);
        Ok(statuses)
    }

    /// Start the join and poll the link up to the attempt budget.
    fn join_station(&mut self, identity: &NetworkIdentity) -> bool {
        if let Err(e) = self.wifi.begin_station(identity) {
            warn!("Station join rejected: {}", e);
            return false;
        }

        for attempt in 1..=self.join.attempts {
            if self.wifi.is_connected() {
                debug!("Link up after {} polls", attempt);
                return true;
            }
            thread::sleep(self.join.interval);
        }
        false
    }

    /// Host the provisioning access point and start the portal.
    ///
    /// A failure here is fatal; there is no retry policy.
    pub fn enter_provisioning(
        &mut self,
        ctx: &mut DeviceContext,
    ) -> Result<Vec<Outbound>, NetworkError> {
        let address = self.wifi.start_access_point(&self.access_point).map_err(|e| {
            error!("Access point '{}' failed: {}", self.access_point.name, e);
            NetworkError::AccessPoint(e)
        })?;
        self.portal.start(address, self.access_point.portal_port)?;

        ctx.mode = ConnectionMode::ProvisioningAP;
        info!(
            "Provisioning mode: join '{}' and open http://{}/",
            self.access_point.name, address
        );
        Ok(vec![set_status(ctx, provisioning_status(address))])
    }

    /// Persist a new identity. The caller restarts afterwards.
    pub fn apply_new_identity(
        &mut self,
        identity: &NetworkIdentity,
        ctx: &mut DeviceContext,
    ) -> Result<Vec<Outbound>, NetworkError> {
        identity.validate()?;
        self.store.save(identity)?;
        info!("Stored identity for '{}', restart required", identity.name());
        Ok(vec![set_status(ctx, STATUS_IDENTITY_RECEIVED)])
    }

    /// Service the portal while in provisioning mode.
    ///
    /// Returns true when an accepted identity was stored and a restart is due.
    /// The submitting client is answered only after the store attempt.
    pub fn service_portal(&mut self, ctx: &mut DeviceContext) -> Result<bool, NetworkError> {
        if ctx.mode != ConnectionMode::ProvisioningAP {
            return Ok(false);
        }
        let Some(identity) = self.portal.service() else {
            return Ok(false);
        };
        let stored = self.apply_new_identity(&identity, ctx);
        self.portal.acknowledge(stored.is_ok());
        stored.map(|_| true)
    }

    /// Scan for networks and build the results message.
    ///
    /// A failed scan is reported as an empty list.
    pub fn scan(&mut self) -> Outbound {
        let entries = match self.wifi.scan() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Network scan failed: {}", e);
                Vec::new()
            }
        };
        info!("Scan found {} networks", entries.len());
        let payload = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string());
        Outbound::new(SCAN_RESULTS, payload)
    }
}

fn set_status(ctx: &mut DeviceContext, text: impl Into<String>) -> Outbound {
    ctx.connection_status = text.into();
    Outbound::status(ctx.connection_status.clone())
}
