//! Cisco FTD stub. Managed FTD boxes only answer through the FMC REST
//! API, which this driver does not speak yet; every operation fails with
//! a clear not-implemented error.

use super::{DeviceDriver, DriverCore};
use crate::credentials::CredentialSet;
use crate::error::{Result, TraceError};
use crate::model::{ConnectionConfig, Device, DeviceInfo, InterfaceDetail, RouteEntry};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

const NOT_IMPLEMENTED: &str = "Cisco FTD requires FMC API integration (not yet implemented)";

pub struct CiscoFtdDriver {
    #[allow(dead_code)]
    core: DriverCore,
}

impl CiscoFtdDriver {
    pub fn new(
        device: Arc<Device>,
        credentials: CredentialSet,
        config: ConnectionConfig,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            core: DriverCore::new(device, credentials, config, transport),
        }
    }

    pub fn boxed(
        device: Arc<Device>,
        credentials: CredentialSet,
        config: ConnectionConfig,
        transport: Box<dyn Transport>,
    ) -> Box<dyn DeviceDriver> {
        Box::new(Self::new(device, credentials, config, transport))
    }
}

#[async_trait]
impl DeviceDriver for CiscoFtdDriver {
    async fn connect(&mut self) -> Result<()> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn disconnect(&mut self) {}

    async fn get_route(
        &mut self,
        _destination: Ipv4Addr,
        _context: &str,
    ) -> Result<Option<RouteEntry>> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn get_routing_table(&mut self, _context: &str) -> Result<Vec<RouteEntry>> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn detect_device_info(&mut self) -> Result<DeviceInfo> {
        Err(TraceError::NotImplemented(NOT_IMPLEMENTED))
    }

    async fn get_interface_detail(&mut self, _interface: &str) -> Option<InterfaceDetail> {
        None
    }
}
