//! Driver for Palo Alto PAN-OS firewalls.

use super::{DeviceDriver, DriverCore, FirewallOps};
use crate::credentials::CredentialSet;
use crate::error::Result;
use crate::model::{
    ConnectionConfig, Device, DeviceInfo, Flow, InterfaceDetail, NatResult, PolicyResult,
    RouteEntry,
};
use crate::parsers::paloalto as parser;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub struct PaloAltoDriver {
    core: DriverCore,
}

impl PaloAltoDriver {
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

    fn virtual_router<'a>(&'a self, context: &'a str) -> &'a str {
        if context.is_empty() {
            &self.core.device.default_context
        } else {
            context
        }
    }
}

/// PAN-OS `test` commands want the IANA protocol number.
fn protocol_number(protocol: &str) -> String {
    match protocol.to_ascii_lowercase().as_str() {
        "tcp" => "6".to_string(),
        "udp" => "17".to_string(),
        "icmp" => "1".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DeviceDriver for PaloAltoDriver {
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
        let vr = self.virtual_router(context).to_string();
        let command = format!(
            "show routing route destination {} virtual-router {}",
            destination, vr
        );
        let output = self.core.command(&command).await?;
        Ok(parser::route_entry(&output, destination, &vr))
    }

    async fn get_routing_table(&mut self, context: &str) -> Result<Vec<RouteEntry>> {
        let vr = self.virtual_router(context).to_string();
        let command = format!("show routing route virtual-router {}", vr);
        let output = self.core.command(&command).await?;
        Ok(parser::routing_table(&output, &vr))
    }

    async fn list_logical_contexts(&mut self) -> Result<Vec<String>> {
        let mut contexts = self
            .core
            .try_command("show routing virtual-router")
            .await
            .map(|o| parser::virtual_router_list(&o))
            .unwrap_or_default();
        let default = self.core.device.default_context.clone();
        if !contexts.iter().any(|c| c == &default) {
            contexts.insert(0, default);
        }
        Ok(contexts)
    }

    async fn interface_context_map(&mut self) -> Result<HashMap<String, String>> {
        // Interface to virtual-router binding is configuration PAN-OS does
        // not expose in one command; every interface is reported under the
        // default virtual router.
        let output = self.core.command("show interface all").await?;
        let interfaces = parser::interface_list(&output);
        let default = self.core.device.default_context.clone();
        Ok(interfaces
            .into_keys()
            .map(|name| (name, default.clone()))
            .collect())
    }

    async fn detect_device_info(&mut self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo {
            hostname: self.core.device.hostname.clone(),
            ..DeviceInfo::default()
        };
        if let Some(output) = self.core.try_command("show system info").await {
            for line in output.lines() {
                let lower = line.trim().to_ascii_lowercase();
                let value = || line.splitn(2, ':').nth(1).unwrap_or("").trim().to_string();
                if lower.starts_with("hostname:") {
                    info.hostname = value();
                } else if lower.starts_with("sw-version:") {
                    info.version = value();
                } else if lower.starts_with("model:") {
                    info.model = value();
                } else if lower.starts_with("serial:") {
                    info.serial = value();
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
impl FirewallOps for PaloAltoDriver {
    async fn zone_for_interface(&mut self, interface: &str) -> Option<String> {
        let command = format!("show interface {}", interface);
        let output = self.core.try_command(&command).await?;
        parser::zone_from_interface(&output)
    }

    async fn lookup_security_policy(
        &mut self,
        flow: &Flow,
        source_zone: &str,
        dest_zone: &str,
    ) -> Option<PolicyResult> {
        let command = format!(
            "test security-policy-match source {} destination {} protocol {} destination-port {} from {} to {}",
            flow.source_ip,
            flow.destination_ip,
            protocol_number(&flow.protocol),
            flow.destination_port,
            source_zone,
            dest_zone,
        );
        let output = self.core.try_command(&command).await?;
        parser::security_policy_match(&output)
    }

    async fn lookup_nat(&mut self, flow: &Flow) -> Option<NatResult> {
        let command = format!(
            "test nat-policy-match source {} destination {} protocol {} destination-port {}",
            flow.source_ip,
            flow.destination_ip,
            protocol_number(&flow.protocol),
            flow.destination_port,
        );
        let output = self.core.try_command(&command).await?;
        parser::nat_policy_match(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, PolicyAction};
    use crate::transport::ReplayTransport;
    use serde_json::Map;

    fn device() -> Arc<Device> {
        Arc::new(Device {
            hostname: "fw1".into(),
            management_ip: "10.0.0.9".parse().unwrap(),
            vendor: "paloalto".into(),
            site: None,
            kind: DeviceKind::Firewall,
            credentials_ref: "default".into(),
            logical_contexts: vec!["default".into()],
            default_context: "default".into(),
            subnets: vec![],
            metadata: Map::new(),
        })
    }

    fn driver(transport: ReplayTransport) -> PaloAltoDriver {
        PaloAltoDriver::new(
            device(),
            CredentialSet {
                username: "netops".into(),
                password: None,
                secret: None,
                ssh_key_file: None,
                api_token: Some("LUFRPT1=".into()),
            },
            ConnectionConfig::default(),
            Box::new(transport),
        )
    }

    #[tokio::test]
    async fn route_lookup_names_the_virtual_router() {
        let transport = ReplayTransport::new("fw1").when(
            "show routing route destination 10.1.1.50 virtual-router default",
            "destination        nexthop        metric  flags   age     interface\n\
             ---------------   -------------  -----   -----   -----   -----------\n\
             0.0.0.0/0         10.0.0.3       0       A S     12345   ethernet1/2\n",
        );
        let log = transport.command_log();
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let route = driver
            .get_route("10.1.1.50".parse().unwrap(), "default")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.outgoing_interface.as_deref(), Some("ethernet1/2"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["show routing route destination 10.1.1.50 virtual-router default"]
        );
    }

    #[tokio::test]
    async fn policy_lookup_translates_protocol_to_number() {
        let transport = ReplayTransport::new("fw1").when(
            "test security-policy-match source 192.168.1.10 destination 203.0.113.10 protocol 6 destination-port 443 from trust to untrust",
            "\"Allow-Web\" {\n        from trust;\n        to untrust;\n        action allow;\n}\n",
        );
        let mut driver = driver(transport);
        driver.connect().await.unwrap();
        let flow = Flow {
            source_ip: "192.168.1.10".parse().unwrap(),
            destination_ip: "203.0.113.10".parse().unwrap(),
            protocol: "tcp".into(),
            destination_port: 443,
        };
        let policy = driver
            .lookup_security_policy(&flow, "trust", "untrust")
            .await
            .unwrap();
        assert_eq!(policy.rule_name, "Allow-Web");
        assert_eq!(policy.action, PolicyAction::Permit);
    }

    #[tokio::test]
    async fn failed_nat_lookup_is_none() {
        let mut driver = driver(ReplayTransport::new("fw1"));
        driver.connect().await.unwrap();
        let flow = Flow {
            source_ip: "192.168.1.10".parse().unwrap(),
            destination_ip: "203.0.113.10".parse().unwrap(),
            protocol: "tcp".into(),
            destination_port: 443,
        };
        assert!(driver.lookup_nat(&flow).await.is_none());
    }

    #[tokio::test]
    async fn exposes_firewall_capability() {
        let mut driver = driver(ReplayTransport::new("fw1"));
        assert!(driver.firewall_ops().is_some());
    }
}
