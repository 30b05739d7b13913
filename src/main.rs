//! `lb-client` command line.
//!
//! Issues one load-balanced request (or just resolves a server) for a service
//! described in a TOML configuration file.

use clap::{Parser, Subcommand};
use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use lb_client::config::{load_config, ClientConfig, ConfigStore};
use lb_client::http::{HttpTransport, LbRequest};
use lb_client::load_balancer::{ServerDirectory, ServerIdentity, StaticServerDirectory};
use lb_client::observability::{logging::init_logging, metrics::init_metrics};
use lb_client::resilience::LoggingListener;
use lb_client::stats::ServerStatsRegistry;
use lb_client::LoadBalancedExecutor;

#[derive(Parser)]
#[command(name = "lb-client")]
#[command(about = "Client-side load-balanced HTTP requests", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra server for the target service (host:port), may be repeated
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Expose Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request to a service
    Request {
        service: String,
        path: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Header as `name:value`, may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short, long)]
        data: Option<String>,
        /// Make a single attempt
        #[arg(long)]
        no_retry: bool,
    },
    /// Resolve one server for a service
    Choose { service: String },
    /// List the servers of a service with their stats
    Servers { service: String },
}

impl Commands {
    fn service(&self) -> &str {
        match self {
            Commands::Request { service, .. } => service,
            Commands::Choose { service } => service,
            Commands::Servers { service } => service,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    init_logging(&config.logging);

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr);
    }

    let stats = Arc::new(ServerStatsRegistry::new(config.circuit_breaker.clone()));
    let directory = Arc::new(StaticServerDirectory::from_config(&config, stats.clone()));

    let service = cli.command.service().to_string();
    if !cli.servers.is_empty() {
        let mut servers = directory.all_servers(&service).await;
        for address in &cli.servers {
            servers.push(ServerIdentity::parse(address)?);
        }
        let rule = config
            .services
            .get(&service)
            .and_then(|s| s.overrides.rule)
            .unwrap_or(config.defaults.rule);
        directory.set_service(&service, servers, rule);
    }

    tracing::debug!(services = ?directory.services(), "Directory ready");

    match cli.command {
        Commands::Request {
            service,
            path,
            method,
            headers,
            data,
            no_retry,
        } => {
            let store = Arc::new(ConfigStore::from_config(config));
            let executor = LoadBalancedExecutor::builder(directory.clone(), Arc::new(HttpTransport::new()))
                .config_store(store)
                .stats(stats.clone())
                .listener(Arc::new(LoggingListener))
                .build();

            let mut request = LbRequest::parse(Method::from_bytes(method.to_uppercase().as_bytes())?, &path)?;
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("invalid header '{}', expected name:value", header))?;
                request = request.with_header(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }
            if let Some(data) = data {
                request = request.with_body(data);
            }
            if no_retry {
                request = request.with_retryable(false);
            }

            let response = executor.execute(&service, request, None).await?;
            eprintln!("{} {}", response.status, response.uri);
            println!("{}", response.text());
        }
        Commands::Choose { service } => match directory.choose(&service).await {
            Some(server) => println!("{}", server.base_url()?),
            None => {
                eprintln!("No server available for service '{}'", service);
                std::process::exit(1);
            }
        },
        Commands::Servers { service } => {
            let servers: Vec<_> = directory
                .all_servers(&service)
                .await
                .into_iter()
                .map(|server| {
                    json!({
                        "address": server.host_port(),
                        "secure": server.secure,
                        "down": directory.is_down(&server),
                        "circuit_tripped": stats.is_circuit_tripped(&server),
                        "active_requests": stats.active_requests(&server),
                    })
                })
                .collect();
            let out = json!({ "service": service, "servers": servers, "stats": stats.snapshot() });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
