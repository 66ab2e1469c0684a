use clap::{Parser, Subcommand};
use consul_sync_types::RegisterType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "consul-sync",
    about = "consul-sync - keeps a service registered in Consul and its dependencies resolved",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "CONSUL_SYNC_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "CONSUL_SYNC_PRODUCTION", help = "Use production service ids")]
    pub production: bool,

    #[arg(
        long,
        default_value = "if-not-registered",
        help = "if-not-registered | if-config-differ | force"
    )]
    pub register_type: RegisterType,

    #[arg(long, help = "Do not register the service, only poll access points")]
    pub no_register: bool,

    #[arg(long, env = "HOST_HOSTNAME", help = "Hostname of the container host")]
    pub host_hostname: Option<String>,

    #[arg(
        long,
        env = "USE_DEFAULT_SERVICE_SOCKET",
        help = "Resolve service sockets to their defaults instead of asking Consul"
    )]
    pub use_default_service_socket: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Keep the service registered and access points fresh (default)")]
    Run,

    #[command(about = "Run one registration pass and exit")]
    Register,

    #[command(about = "Deregister a service and exit")]
    Deregister {
        #[arg(help = "Service id; defaults to the configured service")]
        id: Option<String>,
    },

    #[command(about = "Poll access points once and print them as JSON")]
    AccessPoints,
}
