//! Vendor device drivers and their registry.
//!
//! A driver owns one transport session and translates the abstract
//! operations (route lookup, context listing, interface detail, firewall
//! queries) into vendor commands, handing the replies to the matching
//! parser. Firewall-only operations live in the separate [`FirewallOps`]
//! capability; the tracer tests for its presence before calling.

pub mod arista_eos;
pub mod aruba_os;
pub mod cisco_asa;
pub mod cisco_ftd;
pub mod cisco_ios;
pub mod juniper_junos;
pub mod paloalto;

pub use self::arista_eos::AristaEosDriver;
pub use self::aruba_os::ArubaOsDriver;
pub use self::cisco_asa::CiscoAsaDriver;
pub use self::cisco_ftd::CiscoFtdDriver;
pub use self::cisco_ios::CiscoIosDriver;
pub use self::juniper_junos::JuniperJunosDriver;
pub use self::paloalto::PaloAltoDriver;

use crate::credentials::CredentialSet;
use crate::error::{Result, TraceError};
use crate::model::{
    ConnectionConfig, Device, DeviceInfo, Flow, InterfaceDetail, NatResult, PolicyResult,
    RouteEntry,
};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// One device session. `connect` / `disconnect` bracket every use; the
/// tracer releases the session on every exit path of a hop.
#[async_trait]
pub trait DeviceDriver: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self);

    /// Best route towards `destination` in the given logical context, or
    /// `None` when the device has no route.
    async fn get_route(
        &mut self,
        destination: Ipv4Addr,
        context: &str,
    ) -> Result<Option<RouteEntry>>;

    async fn get_routing_table(&mut self, context: &str) -> Result<Vec<RouteEntry>>;

    /// All logical contexts; the device's default context is always part
    /// of the result.
    async fn list_logical_contexts(&mut self) -> Result<Vec<String>>;

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>>;

    async fn detect_device_info(&mut self) -> Result<DeviceInfo>;

    /// Best-effort interface detail; failures are logged by the driver
    /// and never abort a trace.
    async fn get_interface_detail(&mut self, interface: &str) -> Option<InterfaceDetail>;

    /// Firewall capability, when this driver has one.
    fn firewall_ops(&mut self) -> Option<&mut dyn FirewallOps> {
        None
    }
}

/// Firewall-only operations. All are best-effort: a failed or
/// unparseable lookup is logged and answered with `None`.
#[async_trait]
pub trait FirewallOps: Send {
    async fn zone_for_interface(&mut self, interface: &str) -> Option<String>;

    async fn lookup_security_policy(
        &mut self,
        flow: &Flow,
        source_zone: &str,
        dest_zone: &str,
    ) -> Option<PolicyResult>;

    async fn lookup_nat(&mut self, flow: &Flow) -> Option<NatResult>;
}

/// Session state shared by all drivers: device identity, credentials,
/// timeouts and the transport itself.
pub(crate) struct DriverCore {
    pub device: Arc<Device>,
    #[allow(dead_code)]
    pub credentials: CredentialSet,
    #[allow(dead_code)]
    pub config: ConnectionConfig,
    transport: Box<dyn Transport>,
    connected: bool,
}

impl DriverCore {
    pub fn new(
        device: Arc<Device>,
        credentials: CredentialSet,
        config: ConnectionConfig,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            device,
            credentials,
            config,
            transport,
            connected: false,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.transport.open().await?;
        self.connected = true;
        tracing::info!(host = %self.device.hostname, "connected");
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if self.connected {
            self.transport.close().await;
            tracing::debug!(host = %self.device.hostname, "disconnected");
        }
        self.connected = false;
    }

    pub async fn command(&mut self, command: &str) -> Result<String> {
        if !self.connected {
            return Err(TraceError::Connection {
                host: self.device.hostname.clone(),
                reason: "not connected".to_string(),
            });
        }
        self.transport.send_command(command).await
    }

    /// Run a command whose failure must not fail the caller; the error is
    /// logged and turned into `None`.
    pub async fn try_command(&mut self, command: &str) -> Option<String> {
        match self.command(command).await {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(host = %self.device.hostname, %command, error = %e, "command failed");
                None
            }
        }
    }
}

/// Constructor signature every vendor driver exposes through the registry.
pub type DriverFactory = fn(
    Arc<Device>,
    CredentialSet,
    ConnectionConfig,
    Box<dyn Transport>,
) -> Box<dyn DeviceDriver>;

pub const SUPPORTED_VENDORS: &[&str] = &[
    "cisco_ios",
    "cisco_iosxe",
    "cisco_nxos",
    "cisco_asa",
    "cisco_ftd",
    "arista_eos",
    "paloalto",
    "paloalto_panos",
    "aruba",
    "aruba_os",
    "juniper_srx",
    "juniper_junos",
];

/// Resolve a vendor tag (including aliases) to its driver factory.
pub fn driver_for(vendor: &str) -> Result<DriverFactory> {
    match vendor {
        "cisco_ios" | "cisco_iosxe" | "cisco_nxos" => Ok(CiscoIosDriver::boxed),
        "arista_eos" => Ok(AristaEosDriver::boxed),
        "aruba" | "aruba_os" => Ok(ArubaOsDriver::boxed),
        "paloalto" | "paloalto_panos" => Ok(PaloAltoDriver::boxed),
        "cisco_asa" => Ok(CiscoAsaDriver::boxed),
        "cisco_ftd" => Ok(CiscoFtdDriver::boxed),
        "juniper_srx" | "juniper_junos" => Ok(JuniperJunosDriver::boxed),
        other => Err(TraceError::Config(format!(
            "unsupported vendor {:?}; supported: {}",
            other,
            SUPPORTED_VENDORS.join(", ")
        ))),
    }
}
