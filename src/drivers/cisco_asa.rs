//! Driver for Cisco ASA firewalls. Policy and NAT questions go through
//! `packet-tracer`; zones are the interface nameifs.

use super::{DeviceDriver, DriverCore, FirewallOps};
use crate::credentials::CredentialSet;
use crate::error::Result;
use crate::model::{
    ConnectionConfig, Device, DeviceInfo, Flow, InterfaceDetail, NatResult, PolicyResult,
    RouteEntry,
};
use crate::parsers::cisco_asa as parser;
use crate::parsers::grammar;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct CiscoAsaDriver {
    core: DriverCore,
}

impl CiscoAsaDriver {
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

    fn packet_tracer_command(input_interface: &str, flow: &Flow) -> String {
        format!(
            "packet-tracer input {} {} {} {} {} {} detailed",
            input_interface,
            flow.protocol.to_ascii_lowercase(),
            flow.source_ip,
            flow.destination_port,
            flow.destination_ip,
            flow.destination_port,
        )
    }

    /// Input nameif for packet-tracer, resolved from the route back to
    /// the source; falls back to the first configured nameif.
    async fn resolve_input_interface(&mut self, source_ip: Ipv4Addr) -> Option<String> {
        if let Some(output) = self
            .core
            .try_command(&format!("show route {}", source_ip))
            .await
        {
            if let Some(route) = parser::route_entry(&output, "system") {
                if let Some(interface) = route.outgoing_interface {
                    return Some(interface);
                }
            }
        }

        let output = self.core.try_command("show nameif").await?;
        let mapping = parser::nameif_mapping(&output);
        mapping.values().next().cloned()
    }
}

#[async_trait]
impl DeviceDriver for CiscoAsaDriver {
    async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    async fn disconnect(&mut self) {
        self.core.disconnect().await;
    }

    async fn get_route(
        &mut self,
        destination: Ipv4Addr,
        _context: &str,
    ) -> Result<Option<RouteEntry>> {
        let output = self
            .core
            .command(&format!("show route {}", destination))
            .await?;
        Ok(parser::route_entry(&output, "system"))
    }

    async fn get_routing_table(&mut self, _context: &str) -> Result<Vec<RouteEntry>> {
        let output = self.core.command("show route").await?;
        Ok(parser::routing_table(&output, "system"))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        // Single-mode appliances reject `show context`.
        let mut contexts = self
            .core
            .try_command("show context")
            .await
            .map(|o| parser::context_list(&o))
            .unwrap_or_default();
        let default = self.core.device.default_context.clone();
        if !contexts.iter().any(|c| c == &default) {
            contexts.insert(0, default);
        }
        Ok(contexts)
    }

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>> {
        let output = self.core.command("show nameif").await?;
        Ok(parser::nameif_mapping(&output))
    }

    async fn detect_device_info(&mut self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo {
            hostname: self.core.device.hostname.clone(),
            ..DeviceInfo::default()
        };
        if let Some(output) = self.core.try_command("show version").await {
            for line in output.lines() {
                let line = line.trim();
                if line.contains("Software Version") {
                    info.version = line.to_string();
                } else if let Some(v) = grammar::after(line, "Hardware:") {
                    info.model = v
                        .split(',')
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                } else if let Some(v) = grammar::after(line, "Serial Number:") {
                    info.serial = v.trim().to_string();
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

    fn firewall_ops(&mut self) -> Option<&mut dyn FirewallOps> {
        Some(self)
    }
}

#[async_trait]
impl FirewallOps for CiscoAsaDriver {
    async fn zone_for_interface(&mut self, interface: &str) -> Option<String> {
        let output = self.core.try_command("show nameif").await?;
        let mapping = parser::nameif_mapping(&output);
        if let Some(nameif) = mapping.get(interface) {
            return Some(nameif.clone());
        }
        // Routes already name interfaces by nameif.
        if mapping.values().any(|v| v == interface) {
            return Some(interface.to_string());
        }
        None
    }

    async fn lookup_security_policy(
        &mut self,
        flow: &Flow,
        source_zone: &str,
        _dest_zone: &str,
    ) -> Option<PolicyResult> {
        let command = Self::packet_tracer_command(source_zone, flow);
        let output = self.core.try_command(&command).await?;
        let (policy, _nat) = parser::packet_tracer(&output);
        policy
    }

    async fn lookup_nat(&mut self, flow: &Flow) -> Option<NatResult> {
        let input_interface = self.resolve_input_interface(flow.source_ip).await?;
        let command = Self::packet_tracer_command(&input_interface, flow);
        let output = self.core.try_command(&command).await?;
        let (_policy, nat) = parser::packet_tracer(&output);
        nat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, NextHop, PolicyAction};
    use crate::transport::ReplayTransport;
    use serde_json::Map;

    const PACKET_TRACER: &str = "\
Phase: 1
Type: ACCESS-LIST
Subtype: log
Result: ALLOW
Config:
access-group outside_in in interface outside
access-list outside_in extended permit tcp any host 203.0.113.10 eq https

Phase: 2
Type: UN-NAT
Subtype: static
Result: ALLOW
Config:
nat (inside,outside) source static web-servers public-web
Additional Information:
Untranslate 203.0.113.10/443 to 10.1.1.50/443

Result:
input-interface: outside
Action: allow
";

    fn device() -> Arc<Device> {
        Arc::new(Device {
            hostname: "asa1".into(),
            management_ip: "10.0.0.7".parse().unwrap(),
            vendor: "cisco_asa".into(),
            site: None,
            kind: DeviceKind::Firewall,
            credentials_ref: "default".into(),
            logical_contexts: vec!["system".into()],
            default_context: "system".into(),
            subnets: vec![],
            metadata: Map::new(),
        })
    }

    fn driver(transport: ReplayTransport) -> CiscoAsaDriver {
        CiscoAsaDriver::new(
            device(),
            CredentialSet {
                username: "netops".into(),
                password: Some("secret".into()),
                secret: Some("enable".into()),
                ssh_key_file: None,
                api_token: None,
            },
            ConnectionConfig::default(),
            Box::new(transport),
        )
    }

    #[tokio::test]
    async fn route_lookup_converts_masks() {
        let transport = ReplayTransport::new("asa1").when(
            "show route 10.1.1.50",
            "Routing entry for 10.1.1.0 255.255.255.0\n  Known via \"connected\", distance 0, metric 0\n  Routing Descriptor Blocks:\n  * directly connected, via inside\n",
        );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let route = driver
            .get_route("10.1.1.50".parse().unwrap(), "system")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.destination.to_string(), "10.1.1.0/24");
        assert_eq!(route.next_hop, NextHop::Connected);
    }

    #[tokio::test]
    async fn nat_lookup_resolves_input_interface_from_source_route() {
        let transport = ReplayTransport::new("asa1")
            .when(
                "show route 192.168.1.100",
                "Routing entry for 192.168.1.0 255.255.255.0\n  Known via \"connected\", distance 0, metric 0\n  Routing Descriptor Blocks:\n  * directly connected, via outside\n",
            )
            .when(
                "packet-tracer input outside tcp 192.168.1.100 443 203.0.113.10 443 detailed",
                PACKET_TRACER,
            );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let flow = Flow {
            source_ip: "192.168.1.100".parse().unwrap(),
            destination_ip: "203.0.113.10".parse().unwrap(),
            protocol: "tcp".into(),
            destination_port: 443,
        };
        let nat = driver.lookup_nat(&flow).await.unwrap();
        let dnat = nat.dnat.unwrap();
        assert_eq!(dnat.translated_ip, "10.1.1.50".parse::<Ipv4Addr>().unwrap());
    }

    #[tokio::test]
    async fn policy_lookup_uses_source_zone_as_input() {
        let transport = ReplayTransport::new("asa1").when(
            "packet-tracer input outside tcp 192.168.1.100 443 203.0.113.10 443 detailed",
            PACKET_TRACER,
        );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let flow = Flow {
            source_ip: "192.168.1.100".parse().unwrap(),
            destination_ip: "203.0.113.10".parse().unwrap(),
            protocol: "tcp".into(),
            destination_port: 443,
        };
        let policy = driver
            .lookup_security_policy(&flow, "outside", "inside")
            .await
            .unwrap();
        assert_eq!(policy.action, PolicyAction::Permit);
        assert_eq!(policy.rule_name, "outside_in");
    }

    #[tokio::test]
    async fn zone_is_the_nameif() {
        let transport = ReplayTransport::new("asa1").when(
            "show nameif",
            "Interface                  Name                     Security\nGigabitEthernet0/0         outside                       0\nGigabitEthernet0/1         inside                      100\n",
        );
        let mut asa = driver(transport);
        asa.connect().await.unwrap();
        assert_eq!(
            asa.zone_for_interface("GigabitEthernet0/0").await.as_deref(),
            Some("outside")
        );
        // A nameif passed back in resolves to itself.
        assert_eq!(
            asa.zone_for_interface("outside").await.as_deref(),
            Some("outside")
        );
    }
}
