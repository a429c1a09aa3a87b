use anyhow::Context;
use clap::{App, Arg};
use pathtrace::model::TracerConfig;
use pathtrace::transport::SshTransportFactory;
use pathtrace::{CredentialStore, Inventory, PathTracer, TracePath, TraceRequest};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::new("pathtrace")
        .about("Multi-vendor control-plane path tracer")
        .arg(
            Arg::with_name("source")
                .long("source")
                .short("s")
                .takes_value(true)
                .required(true)
                .help("source IP address"),
        )
        .arg(
            Arg::with_name("dest")
                .long("dest")
                .short("d")
                .takes_value(true)
                .required(true)
                .help("destination IP address"),
        )
        .arg(
            Arg::with_name("inventory")
                .long("inventory")
                .short("i")
                .takes_value(true)
                .default_value("inventory.yaml")
                .help("path to the inventory document"),
        )
        .arg(
            Arg::with_name("credentials")
                .long("credentials")
                .short("c")
                .takes_value(true)
                .help("path to the credential document (falls back to PATHTRACE_* environment)"),
        )
        .arg(
            Arg::with_name("start-device")
                .long("start-device")
                .takes_value(true)
                .help("hostname to start from instead of resolving the source IP"),
        )
        .arg(
            Arg::with_name("context")
                .long("context")
                .takes_value(true)
                .help("initial VRF / virtual-router / context"),
        )
        .arg(
            Arg::with_name("protocol")
                .long("protocol")
                .takes_value(true)
                .default_value("tcp")
                .help("protocol for firewall policy lookups"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .default_value("443")
                .help("destination port for firewall policy lookups"),
        )
        .arg(
            Arg::with_name("max-hops")
                .long("max-hops")
                .takes_value(true)
                .default_value("30")
                .help("maximum number of hops"),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .possible_values(&["table", "json"])
                .default_value("table")
                .help("output format"),
        )
        .arg(
            Arg::with_name("verbosity")
                .long("verbose")
                .short("v")
                .multiple(true)
                .help("verbosity level"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_max_level(match app.occurrences_of("verbosity") {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        })
        .init();

    let source_ip: Ipv4Addr = app
        .value_of("source")
        .unwrap()
        .parse()
        .context("invalid source IP address")?;
    let destination_ip: Ipv4Addr = app
        .value_of("dest")
        .unwrap()
        .parse()
        .context("invalid destination IP address")?;
    let destination_port: u16 = app
        .value_of("port")
        .unwrap()
        .parse()
        .context("invalid destination port")?;
    let max_hops: u32 = app
        .value_of("max-hops")
        .unwrap()
        .parse()
        .context("invalid hop limit")?;

    let inventory = Inventory::load(Path::new(app.value_of("inventory").unwrap()))
        .context("failed to load inventory")?;
    for warning in inventory.warnings() {
        eprintln!("warning: {}", warning);
    }

    let credentials = CredentialStore::load(app.value_of("credentials").map(Path::new))
        .context("failed to load credentials")?;
    if credentials.is_empty() {
        eprintln!(
            "warning: no credentials loaded; pass --credentials or export PATHTRACE_USER/PATHTRACE_PASS"
        );
    }

    let config = TracerConfig {
        max_hops,
        ..TracerConfig::default()
    };
    let tracer = PathTracer::new(
        Arc::new(inventory),
        Arc::new(credentials),
        Arc::new(SshTransportFactory),
        config,
    );

    let mut request = TraceRequest::new(source_ip, destination_ip);
    request.initial_context = app.value_of("context").map(str::to_string);
    request.start_device = app.value_of("start-device").map(str::to_string);
    request.protocol = app.value_of("protocol").unwrap().to_string();
    request.destination_port = destination_port;

    let path = tracer.trace(&request).await;

    match app.value_of("output") {
        Some("json") => println!("{}", serde_json::to_string_pretty(&path)?),
        _ => print_path_table(&path),
    }

    if !path.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_path_table(path: &TracePath) {
    println!("\nPath Trace: {} -> {}", path.source_ip, path.destination_ip);
    println!("{}", "=".repeat(100));

    if path.hops.is_empty() {
        println!("No hops recorded");
    } else {
        println!(
            "{:<5} {:<20} {:<15} {:<20} {:<20} {:<10}",
            "Hop", "Device", "Context", "Egress Interface", "Next Hop", "Protocol"
        );
        println!("{}", "-".repeat(100));

        for hop in &path.hops {
            let interface = hop.egress_interface.as_deref().unwrap_or("-");
            let (next_hop, protocol) = match &hop.route_used {
                Some(route) => (route.next_hop.to_string(), route.protocol.clone()),
                None => ("-".to_string(), "-".to_string()),
            };
            println!(
                "{:<5} {:<20} {:<15} {:<20} {:<20} {:<10}",
                hop.sequence,
                hop.device.hostname,
                hop.logical_context,
                interface,
                next_hop,
                protocol
            );
        }
    }

    println!("{}", "-".repeat(100));
    println!("Status: {}", path.status.as_str().to_uppercase());
    if let Some(error) = &path.error_message {
        println!("Error: {}", error);
    }
    println!("Total hops: {}", path.hop_count());
    println!("Trace time: {:.2} seconds\n", path.total_time.as_secs_f64());
}
