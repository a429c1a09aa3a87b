//! Driver for Aruba AOS-CX switches.

use super::{DeviceDriver, DriverCore};
use crate::credentials::CredentialSet;
use crate::error::Result;
use crate::model::{ConnectionConfig, Device, DeviceInfo, InterfaceDetail, RouteEntry};
use crate::parsers::aruba_os as parser;
use crate::parsers::grammar;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct ArubaOsDriver {
    core: DriverCore,
}

impl ArubaOsDriver {
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

fn is_default_context(context: &str) -> bool {
    context.is_empty() || context == "default"
}

#[async_trait]
impl DeviceDriver for ArubaOsDriver {
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
        let command = if is_default_context(context) {
            format!("show ip route {}", destination)
        } else {
            format!("show ip route vrf {} {}", context, destination)
        };
        let output = self.core.command(&command).await?;
        Ok(parser::route_entry(&output, context))
    }

    async fn get_routing_table(&mut self, context: &str) -> Result<Vec<RouteEntry>> {
        let command = if is_default_context(context) {
            "show ip route".to_string()
        } else {
            format!("show ip route vrf {}", context)
        };
        let output = self.core.command(&command).await?;
        Ok(parser::routing_table(&output, context))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        let mut contexts = self
            .core
            .try_command("show vrf")
            .await
            .map(|o| parser::vrf_list(&o))
            .unwrap_or_else(|| vec!["default".to_string()]);
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
                    grammar::after(&o, "vrf attach ")
                        .or_else(|| grammar::after(&o, "vrf "))
                        .and_then(|rest| rest.split_whitespace().next().map(str::to_string))
                })
                .unwrap_or_else(|| "default".to_string());
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
        if let Some(output) = self.core.try_command("show system information").await {
            for line in output.lines() {
                let line = line.trim();
                if let Some(v) = grammar::after(line, "Product Name") {
                    info.model = v.trim_start_matches(':').trim().to_string();
                } else if let Some(v) = grammar::after(line, "Serial Number") {
                    info.serial = v.trim_start_matches(':').trim().to_string();
                }
            }
        }
        Ok(info)
    }

    async fn get_interface_detail(&mut self, interface: &str) -> Option<InterfaceDetail> {
        let command = format!("show interface {}", interface);
        let output = self.core.try_command(&command).await?;
        parser::interface_detail(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, NextHop};
    use crate::transport::ReplayTransport;
    use serde_json::Map;

    fn driver(transport: ReplayTransport) -> ArubaOsDriver {
        ArubaOsDriver::new(
            Arc::new(Device {
                hostname: "acc1".into(),
                management_ip: "10.0.0.8".parse().unwrap(),
                vendor: "aruba_os".into(),
                site: None,
                kind: DeviceKind::L3Switch,
                credentials_ref: "default".into(),
                logical_contexts: vec!["default".into()],
                default_context: "default".into(),
                subnets: vec![],
                metadata: Map::new(),
            }),
            CredentialSet {
                username: "netops".into(),
                password: Some("secret".into()),
                secret: None,
                ssh_key_file: None,
                api_token: None,
            },
            ConnectionConfig::default(),
            Box::new(transport),
        )
    }

    #[tokio::test]
    async fn routes_via_vlan_interfaces() {
        let transport = ReplayTransport::new("acc1").when(
            "show ip route 192.168.1.5",
            "S    192.168.1.0/24 [1/0] via 10.1.1.2, vlan20\n",
        );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let route = driver
            .get_route("192.168.1.5".parse().unwrap(), "default")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.next_hop, NextHop::Ip("10.1.1.2".parse().unwrap()));
        assert_eq!(route.outgoing_interface.as_deref(), Some("vlan20"));
    }
}
