//! Path tracing orchestrator: walks the control plane device by device,
//! following each hop's best route until the destination is reached or a
//! terminal condition stops the walk.

use crate::credentials::CredentialStore;
use crate::drivers::{self, DeviceDriver};
use crate::error::{Result, TraceError};
use crate::inventory::Inventory;
use crate::model::{
    Device, Flow, InterfaceDetail, NatResult, PathHop, PathStatus, PolicyResult, ResolveResult,
    ResolveStatus, RouteEntry, TracePath, TracerConfig,
};
use crate::transport::TransportFactory;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

/// One trace invocation.
#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub initial_context: Option<String>,
    pub start_device: Option<String>,
    pub protocol: String,
    pub destination_port: u16,
}

impl TraceRequest {
    pub fn new(source_ip: Ipv4Addr, destination_ip: Ipv4Addr) -> Self {
        Self {
            source_ip,
            destination_ip,
            initial_context: None,
            start_device: None,
            protocol: "tcp".to_string(),
            destination_port: 443,
        }
    }
}

/// Everything one device session gathered for a hop.
#[derive(Default)]
struct HopQuery {
    route: Option<RouteEntry>,
    ingress_detail: Option<InterfaceDetail>,
    egress_detail: Option<InterfaceDetail>,
    policy_result: Option<PolicyResult>,
    nat_result: Option<NatResult>,
}

/// The orchestrator. Inventory and credentials are shared read-only, so
/// any number of traces may run concurrently on one tracer; all per-trace
/// state lives on the stack of [`PathTracer::trace`].
pub struct PathTracer {
    inventory: Arc<Inventory>,
    credentials: Arc<CredentialStore>,
    transports: Arc<dyn TransportFactory>,
    config: TracerConfig,
}

impl PathTracer {
    pub fn new(
        inventory: Arc<Inventory>,
        credentials: Arc<CredentialStore>,
        transports: Arc<dyn TransportFactory>,
        config: TracerConfig,
    ) -> Self {
        Self {
            inventory,
            credentials,
            transports,
            config,
        }
    }

    /// Trace the control-plane path for a flow. Always returns a
    /// `TracePath`; internal failures surface as status `error`.
    pub async fn trace(&self, request: &TraceRequest) -> TracePath {
        let started = Instant::now();
        let mut path = TracePath::new(request.source_ip, request.destination_ip);

        tracing::info!(
            source = %request.source_ip,
            destination = %request.destination_ip,
            "starting trace"
        );

        if let Err(e) = self.walk(request, &mut path).await {
            path.status = PathStatus::Error;
            path.error_message = Some(e.to_string());
            tracing::error!(error = %e, "path trace failed");
        }

        path.total_time = started.elapsed();
        tracing::info!(
            status = path.status.as_str(),
            hops = path.hop_count(),
            elapsed_ms = path.total_time.as_millis() as u64,
            "trace finished"
        );
        path
    }

    async fn walk(&self, request: &TraceRequest, path: &mut TracePath) -> Result<()> {
        let mut current_device = match &request.start_device {
            Some(hostname) => self.inventory.by_hostname(hostname).ok_or_else(|| {
                TraceError::Config(format!(
                    "start device {:?} not found in inventory",
                    hostname
                ))
            })?,
            None => {
                let resolved = self.resolve_device(request.source_ip, None);
                match resolved.status {
                    ResolveStatus::NotFound => {
                        path.status = PathStatus::NeedsInput;
                        path.error_message = Some(
                            "source IP not found in inventory; specify a starting device"
                                .to_string(),
                        );
                        path.metadata.insert("candidates".to_string(), json!([]));
                        return Ok(());
                    }
                    ResolveStatus::Ambiguous => {
                        path.status = PathStatus::NeedsInput;
                        path.error_message = Some(format!(
                            "source IP {} matches multiple devices; select a starting device",
                            request.source_ip
                        ));
                        path.metadata.insert(
                            "candidates".to_string(),
                            serialize_candidates(&resolved.candidates),
                        );
                        return Ok(());
                    }
                    _ => match resolved.device {
                        Some(device) => device,
                        None => {
                            return Err(TraceError::Config(
                                "resolver returned no device".to_string(),
                            ))
                        }
                    },
                }
            }
        };

        tracing::info!(device = %current_device.hostname, "starting device resolved");

        let mut current_context = request
            .initial_context
            .clone()
            .unwrap_or_else(|| current_device.default_context.clone());

        let mut working_destination = request.destination_ip;
        let mut previous_egress: Option<String> = None;
        let mut visited: HashSet<(Ipv4Addr, String)> = HashSet::new();
        let mut sequence: u32 = 1;
        let mut resolve_status: Option<ResolveStatus> = None;

        loop {
            let key = (current_device.management_ip, current_context.clone());
            if visited.contains(&key) {
                path.status = PathStatus::LoopDetected;
                path.error_message = Some(format!(
                    "routing loop detected at {} in context {}",
                    current_device.hostname, current_context
                ));
                tracing::error!(device = %current_device.hostname, "routing loop detected");
                break;
            }
            if sequence > self.config.max_hops {
                path.status = PathStatus::MaxHopsExceeded;
                path.error_message =
                    Some(format!("maximum hops ({}) exceeded", self.config.max_hops));
                break;
            }
            visited.insert(key);

            tracing::info!(
                hop = sequence,
                device = %current_device.hostname,
                context = %current_context,
                destination = %working_destination,
                "querying device"
            );

            let hop_started = Instant::now();
            let query = self
                .query_device(
                    &current_device,
                    working_destination,
                    &current_context,
                    previous_egress.as_deref(),
                    request,
                )
                .await?;
            let lookup_time = hop_started.elapsed();

            let route = match query.route {
                Some(route) => route,
                None => {
                    path.add_hop(PathHop {
                        sequence,
                        device: Arc::clone(&current_device),
                        ingress_interface: previous_egress.clone(),
                        egress_interface: None,
                        logical_context: current_context.clone(),
                        route_used: None,
                        lookup_time,
                        notes: Some("No route to destination".to_string()),
                        resolve_status,
                        ingress_detail: None,
                        egress_detail: None,
                        policy_result: None,
                        nat_result: None,
                    });
                    path.status = PathStatus::Incomplete;
                    path.error_message = Some(format!(
                        "no route to {} on {}",
                        working_destination, current_device.hostname
                    ));
                    break;
                }
            };

            tracing::info!(
                destination = %route.destination,
                next_hop = ?route.next_hop,
                protocol = %route.protocol,
                "route found"
            );

            let dnat = query.nat_result.as_ref().and_then(|n| n.dnat.clone());
            path.add_hop(PathHop {
                sequence,
                device: Arc::clone(&current_device),
                ingress_interface: previous_egress.clone(),
                egress_interface: route.outgoing_interface.clone(),
                logical_context: current_context.clone(),
                route_used: Some(route.clone()),
                lookup_time,
                notes: None,
                resolve_status,
                ingress_detail: query.ingress_detail,
                egress_detail: query.egress_detail,
                policy_result: query.policy_result,
                nat_result: query.nat_result,
            });

            previous_egress = route.outgoing_interface.clone();

            // Destination NAT rewrites the destination every later hop
            // routes towards.
            if let Some(dnat) = dnat {
                tracing::info!(
                    from = %working_destination,
                    to = %dnat.translated_ip,
                    rule = %dnat.rule_name,
                    "destination NAT applied"
                );
                working_destination = dnat.translated_ip;
            }

            if route.reaches(working_destination) {
                path.status = PathStatus::Complete;
                tracing::info!(device = %current_device.hostname, "destination reached");
                break;
            }
            if route.is_blackhole() {
                path.status = PathStatus::Blackholed;
                path.error_message = Some(format!(
                    "traffic black-holed at {}",
                    current_device.hostname
                ));
                break;
            }

            let next_hop_ip = match route.next_hop.ip() {
                Some(ip) => ip,
                None => {
                    path.status = PathStatus::Incomplete;
                    path.error_message = Some(format!(
                        "next hop {:?} does not resolve to an address",
                        route.next_hop
                    ));
                    break;
                }
            };

            let resolved = self.resolve_device(next_hop_ip, current_device.site.as_deref());
            let next_device = match resolved.status {
                ResolveStatus::NotFound => {
                    path.status = PathStatus::Incomplete;
                    path.error_message =
                        Some(format!("next hop device not found for {}", next_hop_ip));
                    break;
                }
                ResolveStatus::Ambiguous => {
                    path.status = PathStatus::AmbiguousHop;
                    path.error_message = Some(format!(
                        "next hop {} matches multiple devices; select one to continue",
                        next_hop_ip
                    ));
                    path.metadata
                        .insert("ambiguous_hop_sequence".to_string(), json!(sequence + 1));
                    path.metadata.insert(
                        "candidates".to_string(),
                        serialize_candidates(&resolved.candidates),
                    );
                    break;
                }
                status => match resolved.device {
                    Some(device) => {
                        if status == ResolveStatus::ResolvedBySite {
                            tracing::info!(
                                next_hop = %next_hop_ip,
                                device = %device.hostname,
                                site = device.site.as_deref().unwrap_or("-"),
                                "next hop resolved by site affinity"
                            );
                        }
                        resolve_status = Some(status);
                        device
                    }
                    None => {
                        return Err(TraceError::Config(
                            "resolver returned no device".to_string(),
                        ))
                    }
                },
            };

            // Keep the context when the next device knows it, otherwise
            // fall back to that device's default.
            current_context = if next_device.has_context(&current_context) {
                current_context
            } else {
                next_device.default_context.clone()
            };
            current_device = next_device;
            sequence += 1;
        }

        Ok(())
    }

    /// One scoped device session: connect, gather, disconnect on every
    /// exit path.
    async fn query_device(
        &self,
        device: &Arc<Device>,
        destination: Ipv4Addr,
        context: &str,
        ingress_interface: Option<&str>,
        request: &TraceRequest,
    ) -> Result<HopQuery> {
        let credentials = self
            .credentials
            .get(&device.credentials_ref)
            .cloned()
            .ok_or_else(|| {
                TraceError::Config(format!(
                    "no credentials found for reference {:?}",
                    device.credentials_ref
                ))
            })?;
        let factory = drivers::driver_for(&device.vendor)?;
        let transport = self
            .transports
            .transport(device, &credentials, &self.config.connection);
        let mut driver = factory(
            Arc::clone(device),
            credentials,
            self.config.connection.clone(),
            transport,
        );

        driver.connect().await?;
        let outcome = self
            .gather(
                driver.as_mut(),
                device,
                destination,
                context,
                ingress_interface,
                request,
            )
            .await;
        driver.disconnect().await;
        outcome
    }

    async fn gather(
        &self,
        driver: &mut dyn DeviceDriver,
        device: &Arc<Device>,
        destination: Ipv4Addr,
        context: &str,
        ingress_interface: Option<&str>,
        request: &TraceRequest,
    ) -> Result<HopQuery> {
        let route = match driver.get_route(destination, context).await? {
            Some(route) => route,
            None => return Ok(HopQuery::default()),
        };

        let egress_interface = route.outgoing_interface.clone();

        let mut egress_detail = None;
        if let Some(egress) = &egress_interface {
            egress_detail = driver.get_interface_detail(egress).await;
        }
        let mut ingress_detail = None;
        if let Some(ingress) = ingress_interface {
            ingress_detail = driver.get_interface_detail(ingress).await;
        }

        let mut policy_result = None;
        let mut nat_result = None;
        if device.is_firewall() {
            // The first hop has no recorded ingress; fall back to the
            // interface the device would route the source out of.
            let ingress_for_zone = match ingress_interface {
                Some(interface) => Some(interface.to_string()),
                None => match driver.get_route(request.source_ip, context).await {
                    Ok(Some(route)) => route.outgoing_interface,
                    _ => None,
                },
            };

            if let Some(firewall) = driver.firewall_ops() {
                let mut ingress_zone = None;
                if let Some(interface) = &ingress_for_zone {
                    ingress_zone = firewall.zone_for_interface(interface).await;
                }
                let mut egress_zone = None;
                if let Some(interface) = &egress_interface {
                    egress_zone = firewall.zone_for_interface(interface).await;
                }

                let flow = Flow {
                    source_ip: request.source_ip,
                    destination_ip: destination,
                    protocol: request.protocol.clone(),
                    destination_port: request.destination_port,
                };

                if let (Some(source_zone), Some(dest_zone)) = (&ingress_zone, &egress_zone) {
                    policy_result = firewall
                        .lookup_security_policy(&flow, source_zone, dest_zone)
                        .await;
                } else {
                    tracing::debug!(
                        device = %device.hostname,
                        "zones unresolved, skipping policy lookup"
                    );
                }
                nat_result = firewall.lookup_nat(&flow).await;
            }
        }

        Ok(HopQuery {
            route: Some(route),
            ingress_detail,
            egress_detail,
            policy_result,
            nat_result,
        })
    }

    /// Resolve an IP to an inventory device: management IP first, then
    /// longest-prefix subnet, then site-affinity disambiguation.
    fn resolve_device(&self, ip: Ipv4Addr, site: Option<&str>) -> ResolveResult {
        let mut candidates = self.inventory.by_management_ip(ip);
        if candidates.is_empty() {
            candidates = self.inventory.by_subnet(ip);
        }

        if candidates.is_empty() {
            return ResolveResult {
                device: None,
                status: ResolveStatus::NotFound,
                candidates,
            };
        }
        if candidates.len() == 1 {
            return ResolveResult {
                device: Some(Arc::clone(&candidates[0])),
                status: ResolveStatus::Resolved,
                candidates,
            };
        }

        if let Some(site) = site {
            let same_site: Vec<Arc<Device>> = candidates
                .iter()
                .filter(|c| c.site.as_deref() == Some(site))
                .cloned()
                .collect();
            if same_site.len() == 1 {
                return ResolveResult {
                    device: Some(Arc::clone(&same_site[0])),
                    status: ResolveStatus::ResolvedBySite,
                    candidates,
                };
            }
            if same_site.len() > 1 {
                return ResolveResult {
                    device: None,
                    status: ResolveStatus::Ambiguous,
                    candidates: same_site,
                };
            }
        }

        ResolveResult {
            device: None,
            status: ResolveStatus::Ambiguous,
            candidates,
        }
    }
}

fn serialize_candidates(candidates: &[Arc<Device>]) -> Value {
    Value::Array(
        candidates
            .iter()
            .map(|c| {
                json!({
                    "hostname": c.hostname,
                    "management_ip": c.management_ip,
                    "site": c.site,
                    "vendor": c.vendor,
                })
            })
            .collect(),
    )
}
