use clap::Parser;
use imgpipe_orchestrator::host_pool::parse_host_list;
use imgpipe_orchestrator::server::{init_logging, periodic_logging, startup};
use imgpipe_orchestrator::{Orchestrator, OrchestratorConfig};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "imgpipe-orchestrator")]
#[command(about = "Coordinates resize, filter, watermark and format workers into one image pipeline")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 50055)]
    port: u16,

    /// Comma-separated Resize worker addresses
    #[arg(long, env = "RESIZE_SERVICE_HOSTS", default_value = "localhost:50052")]
    resize_hosts: String,

    /// Comma-separated Filter worker addresses
    #[arg(long, env = "FILTER_SERVICE_HOSTS", default_value = "localhost:50053")]
    filter_hosts: String,

    /// Comma-separated Watermark worker addresses
    #[arg(long, env = "WATERMARK_SERVICE_HOSTS", default_value = "localhost:50054")]
    watermark_hosts: String,

    /// Comma-separated Format worker addresses
    #[arg(long, env = "FORMAT_SERVICE_HOSTS", default_value = "localhost:50056")]
    format_hosts: String,

    /// Endpoint selection policy: round_robin or random
    #[arg(long, default_value = "round_robin")]
    policy: String,

    /// Per worker call timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Seconds between pool counter logs, 0 to disable
    #[arg(long, default_value_t = 30)]
    log_interval: u64,

    #[arg(long, default_value_t = 32)]
    max_inflight_per_endpoint: usize,

    /// Maximum JSON request body in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    max_payload_size: usize,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> OrchestratorConfig {
        OrchestratorConfig {
            host: self.host,
            port: self.port,
            policy: self.policy,
            resize_hosts: parse_host_list(&self.resize_hosts),
            filter_hosts: parse_host_list(&self.filter_hosts),
            watermark_hosts: parse_host_list(&self.watermark_hosts),
            format_hosts: parse_host_list(&self.format_hosts),
            log_interval: self.log_interval,
            timeout: self.timeout,
            max_inflight_per_endpoint: self.max_inflight_per_endpoint,
            max_payload_size: self.max_payload_size,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let config = cli.into_config();

    let orchestrator = match Orchestrator::new(config.clone()) {
        Ok(o) => o,
        Err(e) => {
            log::error!("Failed to build orchestrator: {}", e);
            std::process::exit(1);
        }
    };

    let result = actix_web::rt::System::new().block_on(async move {
        tokio::select! {
            _ = periodic_logging(orchestrator.clone()) => Ok(()),
            res = startup(config, orchestrator) => res,
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down");
                Ok(())
            }
        }
    });
    if let Err(e) = result {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
