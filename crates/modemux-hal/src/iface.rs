// ── Interface identity and event types ──
//
// IfaceHandle and MacAddress form the foundation of every lifecycle
// operation. A handle is minted by the radio layer on creation and is
// dead once an `InterfaceEventKind::Destroyed` is observed for it.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── IfaceHandle ─────────────────────────────────────────────────────

/// Kind of hardware interface a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum IfaceKind {
    /// Station (client) interface.
    #[strum(serialize = "station")]
    Station,
    /// Access-point interface.
    #[strum(serialize = "ap")]
    Ap,
}

/// Handle to one hardware interface, unique for the life of the radio
/// process. The `name` is the OS-visible interface name (e.g. `wlan1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IfaceHandle {
    pub id: u32,
    pub name: String,
    pub kind: IfaceKind,
}

impl fmt::Display for IfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format
/// (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a normalized MAC address from any common format.
    /// Accepts colon-separated, dash-separated, or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().to_lowercase().replace('-', ":");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Requestor ───────────────────────────────────────────────────────

/// Priority class attached to a [`Requestor`]. Only the HAL capability
/// queries interpret this; the core treats the whole token as opaque.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
pub enum RequestorPriority {
    Background,
    ForegroundService,
    Foreground,
    Internal,
}

/// Opaque identity + priority token attached to every external request.
///
/// The capability layer uses it to decide whether a new interface may be
/// created without evicting an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestor {
    pub uid: u32,
    pub tag: String,
    pub priority: RequestorPriority,
}

impl Requestor {
    pub fn new(uid: u32, tag: impl Into<String>, priority: RequestorPriority) -> Self {
        Self {
            uid,
            tag: tag.into(),
            priority,
        }
    }

    /// Token used by the platform itself (settings toggle, recovery).
    pub fn internal(tag: impl Into<String>) -> Self {
        Self::new(0, tag, RequestorPriority::Internal)
    }
}

// ── Capability report ───────────────────────────────────────────────

/// Radio band tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Band {
    #[strum(serialize = "2.4GHz")]
    Band2GHz,
    #[strum(serialize = "5GHz")]
    Band5GHz,
    #[strum(serialize = "6GHz")]
    Band6GHz,
}

/// Security modes an AP interface may be asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum SecurityType {
    Open,
    Wpa2Psk,
    Wpa3Sae,
    Wpa3SaeTransition,
}

/// Capabilities reported for a freshly created AP interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApCapabilities {
    /// Hard limit on simultaneously associated stations.
    pub max_clients: u16,
    pub supported_security: Vec<SecurityType>,
    pub supports_hidden_ssid: bool,
    /// Whether the driver can run automatic channel selection.
    pub supports_acs: bool,
    pub bands: Vec<Band>,
}

// ── Events ──────────────────────────────────────────────────────────

/// Per-interface link events delivered by the radio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum InterfaceEventKind {
    Up,
    Down,
    /// The interface no longer exists; the handle is dead.
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEvent {
    pub handle: IfaceHandle,
    pub kind: InterfaceEventKind,
}

/// Everything the radio layer can report asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalEvent {
    Interface(InterfaceEvent),
    /// A station associated with (or left) an AP interface.
    ApStation {
        handle: IfaceHandle,
        mac: MacAddress,
        connected: bool,
    },
    /// The lower-layer daemon died; every handle must be assumed dead.
    DaemonDeath,
}

/// Reason passed to [`force_client_disconnect`](crate::RadioHal::force_client_disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DisconnectReason {
    Unspecified,
    /// The AP cannot accept more stations.
    NoMoreStations,
}
