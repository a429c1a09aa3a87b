//! Driver for Juniper SRX / Junos devices.

use super::{DeviceDriver, DriverCore, FirewallOps};
use crate::credentials::CredentialSet;
use crate::error::Result;
use crate::model::{
    ConnectionConfig, Device, DeviceInfo, Flow, InterfaceDetail, NatResult, PolicyResult,
    RouteEntry,
};
use crate::parsers::grammar;
use crate::parsers::juniper_junos as parser;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct JuniperJunosDriver {
    core: DriverCore,
}

impl JuniperJunosDriver {
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

/// The master instance goes by several names in inventories.
fn is_master_context(context: &str) -> bool {
    matches!(context, "" | "global" | "master" | "default")
}

#[async_trait]
impl DeviceDriver for JuniperJunosDriver {
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
        let command = if is_master_context(context) {
            format!("show route {}", destination)
        } else {
            format!("show route {} table {}.inet.0", destination, context)
        };
        let output = self.core.command(&command).await?;
        Ok(parser::route_entry(&output, context))
    }

    async fn get_routing_table(&mut self, context: &str) -> Result<Vec<RouteEntry>> {
        let command = if is_master_context(context) {
            "show route".to_string()
        } else {
            format!("show route table {}.inet.0", context)
        };
        let output = self.core.command(&command).await?;
        Ok(parser::routing_table(&output, context))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        let mut contexts = self
            .core
            .try_command("show routing-instances")
            .await
            .map(|o| parser::routing_instance_list(&o))
            .unwrap_or_default();
        let default = self.core.device.default_context.clone();
        if !contexts.iter().any(|c| c == &default) {
            contexts.insert(0, default);
        }
        Ok(contexts)
    }

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>> {
        let output = self.core.command("show routing-instances").await?;
        Ok(parser::instance_interfaces(&output))
    }

    async fn detect_device_info(&mut self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo {
            hostname: self.core.device.hostname.clone(),
            ..DeviceInfo::default()
        };
        if let Some(output) = self.core.try_command("show version").await {
            for line in output.lines() {
                let line = line.trim();
                if let Some(v) = grammar::after(line, "Hostname:") {
                    info.hostname = v.trim().to_string();
                } else if let Some(v) = grammar::after(line, "Model:") {
                    info.model = v.trim().to_string();
                } else if let Some(v) = grammar::after(line, "Junos:") {
                    info.version = v.trim().to_string();
                }
            }
        }
        Ok(info)
    }

    async fn get_interface_detail(&mut self, interface: &str) -> Option<InterfaceDetail> {
        let command = format!("show interfaces {} extensive", interface);
        let output = self.core.try_command(&command).await?;
        parser::interface_detail(&output)
    }

    fn firewall_ops(&mut self) -> Option<&mut dyn FirewallOps> {
        Some(self)
    }
}

#[async_trait]
impl FirewallOps for JuniperJunosDriver {
    async fn zone_for_interface(&mut self, interface: &str) -> Option<String> {
        let output = self.core.try_command("show security zones").await?;
        let zones = parser::security_zones(&output);
        if let Some(zone) = zones.get(interface) {
            return Some(zone.clone());
        }
        // Zones bind logical units; retry a bare physical name as unit 0.
        zones.get(&format!("{}.0", interface)).cloned()
    }

    async fn lookup_security_policy(
        &mut self,
        flow: &Flow,
        source_zone: &str,
        dest_zone: &str,
    ) -> Option<PolicyResult> {
        let command = format!(
            "show security match-policies from-zone {} to-zone {} source-ip {} destination-ip {} source-port {} destination-port {} protocol {}",
            source_zone,
            dest_zone,
            flow.source_ip,
            flow.destination_ip,
            flow.destination_port,
            flow.destination_port,
            flow.protocol.to_ascii_lowercase(),
        );
        let output = self.core.try_command(&command).await?;
        parser::security_policy_match(&output)
    }

    async fn lookup_nat(&mut self, flow: &Flow) -> Option<NatResult> {
        let source_output = self
            .core
            .try_command("show security nat source rule all")
            .await?;
        let dest_output = self
            .core
            .try_command("show security nat destination rule all")
            .await?;
        parser::nat_rules(
            &source_output,
            &dest_output,
            flow.source_ip,
            flow.destination_ip,
            flow.destination_port,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, NextHop};
    use crate::transport::ReplayTransport;
    use serde_json::Map;

    fn device() -> Arc<Device> {
        Arc::new(Device {
            hostname: "srx1".into(),
            management_ip: "10.0.0.6".parse().unwrap(),
            vendor: "juniper_srx".into(),
            site: None,
            kind: DeviceKind::Firewall,
            credentials_ref: "default".into(),
            logical_contexts: vec!["global".into()],
            default_context: "global".into(),
            subnets: vec![],
            metadata: Map::new(),
        })
    }

    fn driver(transport: ReplayTransport) -> JuniperJunosDriver {
        JuniperJunosDriver::new(
            device(),
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
    async fn master_context_uses_plain_show_route() {
        let transport = ReplayTransport::new("srx1").when(
            "show route 10.2.2.20",
            "0.0.0.0/0          *[Static/5] 30d 12:45:00\n                    >  to 10.0.0.1 via ge-0/0/0.0\n",
        );
        let log = transport.command_log();
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let route = driver
            .get_route("10.2.2.20".parse().unwrap(), "global")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.next_hop, NextHop::Ip("10.0.0.1".parse().unwrap()));
        assert_eq!(*log.lock().unwrap(), vec!["show route 10.2.2.20"]);
    }

    #[tokio::test]
    async fn named_instance_scopes_the_route_table() {
        let transport = ReplayTransport::new("srx1").when(
            "show route 10.2.2.20 table CORP-VR.inet.0",
            "10.2.0.0/16        *[OSPF/10] 1d 02:03:04, metric 20\n                    >  to 10.1.1.3 via ge-0/0/2.0\n",
        );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let route = driver
            .get_route("10.2.2.20".parse().unwrap(), "CORP-VR")
            .await
            .unwrap();
        assert!(route.is_some());
    }

    #[tokio::test]
    async fn zone_lookup_retries_with_unit_zero() {
        let zones = "\
Security zone: untrust
  Interfaces bound: 1
    ge-0/0/0.0
";
        let transport = ReplayTransport::new("srx1").when("show security zones", zones);
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        assert_eq!(
            driver.zone_for_interface("ge-0/0/0").await.as_deref(),
            Some("untrust")
        );
    }
}
