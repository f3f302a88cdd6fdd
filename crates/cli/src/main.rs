use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "line-relay")]
#[command(about = "Relay LINE image messages to a Dify analysis app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.line-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook server. Credentials come from LINE_CHANNEL_SECRET, LINE_CHANNEL_ACCESS_TOKEN, DIFY_API_KEY and DIFY_API_URL, or the config file.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.line-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the X-Line-Signature for a request body, for replaying webhooks by hand.
    Sign {
        /// Channel secret (default: LINE_CHANNEL_SECRET)
        #[arg(long, env = "LINE_CHANNEL_SECRET", hide_env_values = true)]
        secret: String,

        /// File containing the exact request body
        #[arg(value_name = "FILE")]
        body: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("line-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port, bind }) => {
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { secret, body }) => {
            if let Err(e) = run_sign(&secret, &body) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(b) = bind {
        config.server.bind = b;
    }
    let creds = relay::config::resolve_credentials(&config);
    relay::config::apply_credentials(&mut config, creds)?;
    log::info!(
        "starting gateway on {}:{}",
        config.server.bind,
        config.server.port
    );
    relay::gateway::run_gateway(config).await
}

fn run_sign(secret: &str, body_path: &std::path::Path) -> anyhow::Result<()> {
    use anyhow::Context;
    let body = std::fs::read(body_path)
        .with_context(|| format!("reading body from {}", body_path.display()))?;
    println!("{}", relay::channels::signature::sign_body(secret, &body));
    Ok(())
}
