//! Driver for Cisco IOS, IOS-XE and NX-OS devices.

use super::{DeviceDriver, DriverCore};
use crate::credentials::CredentialSet;
use crate::error::Result;
use crate::model::{ConnectionConfig, Device, DeviceInfo, InterfaceDetail, RouteEntry};
use crate::parsers::cisco_ios as parser;
use crate::parsers::grammar;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct CiscoIosDriver {
    core: DriverCore,
}

impl CiscoIosDriver {
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

    fn route_command(destination: Ipv4Addr, context: &str) -> String {
        if context.is_empty() || context == "global" {
            format!("show ip route {}", destination)
        } else {
            format!("show ip route vrf {} {}", context, destination)
        }
    }
}

#[async_trait]
impl DeviceDriver for CiscoIosDriver {
    async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    async fn disconnect(&mut self) {
        self.core.disconnect().await;
    }

    async fn get_route(
        &mut self,
        destination: Ipv4Addr,
        context: &str,
    ) -> Result<Option<RouteEntry>> {
        let output = self
            .core
            .command(&Self::route_command(destination, context))
            .await?;
        Ok(parser::route_entry(&output, context))
    }

    async fn get_routing_table(&mut self, context: &str) -> Result<Vec<RouteEntry>> {
        let command = if context.is_empty() || context == "global" {
            "show ip route".to_string()
        } else {
            format!("show ip route vrf {}", context)
        };
        let output = self.core.command(&command).await?;
        Ok(parser::routing_table(&output, context))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        // IOS-XE answers `show vrf`; classic IOS wants `show ip vrf`.
        let output = match self.core.command("show vrf").await {
            Ok(output) => Some(output),
            Err(_) => self.core.try_command("show ip vrf").await,
        };

        let mut contexts = output
            .map(|o| parser::vrf_list(&o))
            .unwrap_or_default();
        let default = self.core.device.default_context.clone();
        if !contexts.iter().any(|c| c == &default) {
            contexts.insert(0, default);
        }
        Ok(contexts)
    }

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>> {
        let output = self.core.command("show ip interface brief").await?;
        let interfaces = parser::interface_brief(&output);

        let mut mapping = HashMap::new();
        for name in interfaces.keys() {
            let command = format!("show run interface {} | include vrf", name);
            let vrf = self
                .core
                .try_command(&command)
                .await
                .and_then(|o| {
                    grammar::after(&o, "ip vrf forwarding")
                        .and_then(|rest| rest.split_whitespace().next().map(str::to_string))
                })
                .unwrap_or_else(|| "global".to_string());
            mapping.insert(name.clone(), vrf);
        }
        Ok(mapping)
    }

    async fn detect_device_info(&mut self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo {
            hostname: self.core.device.hostname.clone(),
            ..DeviceInfo::default()
        };

        if let Some(output) = self.core.try_command("show run | include hostname").await {
            if let Some(name) = grammar::after(&output, "hostname ")
                .and_then(|rest| rest.split_whitespace().next())
            {
                info.hostname = name.to_string();
            }
        }
        if let Some(output) = self.core.try_command("show version | include Version").await {
            if let Some(line) = output.lines().find(|l| !l.trim().is_empty()) {
                info.version = line.trim().to_string();
            }
        }
        if let Some(output) = self.core.try_command("show inventory").await {
            if let Some(line) = output.lines().find(|l| l.contains("PID:")) {
                for part in line.split(',') {
                    if let Some(v) = grammar::after(part, "PID:") {
                        info.model = v.split_whitespace().next().unwrap_or("").to_string();
                    }
                    if let Some(v) = grammar::after(part, "SN:") {
                        info.serial = v.split_whitespace().next().unwrap_or("").to_string();
                    }
                }
            }
        }
        Ok(info)
    }

    async fn get_interface_detail(&mut self, interface: &str) -> Option<InterfaceDetail> {
        let command = format!("show interfaces {}", interface);
        let output = self.core.try_command(&command).await?;
        parser::interface_detail(&output)
    }
}
