//! podshim CRI smoke-test client.
//!
//! Issues CRI RPCs against a running shim and prints each response:
//! - `pull [IMAGE]` pulls an image
//! - `run [IMAGE]` creates, starts and stops a container

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use podshim_cri::client::CriClient;

const DEFAULT_ADDRESS: &str = "http://localhost:50052";
const DEFAULT_IMAGE: &str = "quay.io/libpod/alpine_nginx";

/// podshim CRI client
#[derive(Parser)]
#[command(name = "podshim-client", version, about)]
struct Cli {
    /// CRI endpoint.
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull an image
    Pull {
        #[arg(default_value = DEFAULT_IMAGE)]
        image: String,
    },
    /// Create, start and stop a container
    Run {
        #[arg(default_value = DEFAULT_IMAGE)]
        image: String,

        /// Environment variable KEY=VALUE (repeatable)
        #[arg(short, long = "env")]
        envs: Vec<String>,

        /// Stop grace period in seconds (0 = kill now, negative = engine default)
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        stop_timeout: i64,
    },
    /// Print the runtime version
    Version,
}

fn parse_env(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (kv.clone(), String::new()),
        })
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut client = match CriClient::connect(cli.address.clone()).await {
        Ok(client) => client,
        Err(e) => {
            println!("did not connect: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Pull { image } => match client.pull_image(&image).await {
            Ok(image_ref) => println!("Image pulled: {image_ref}"),
            Err(e) => println!("Error making pull image request: {e}"),
        },
        Command::Run {
            image,
            envs,
            stop_timeout,
        } => {
            let envs = parse_env(&envs);

            let container_id = match client.create_container(&image, &envs).await {
                Ok(id) => id,
                Err(e) => {
                    println!("Error creating container: {e}");
                    return;
                }
            };
            println!("Container created: {container_id}");

            if let Err(e) = client.start_container(&container_id).await {
                println!("Error starting container: {e}");
                return;
            }
            println!("Container started: {container_id}");

            if let Err(e) = client.stop_container(&container_id, stop_timeout).await {
                println!("Error stopping container: {e}");
                return;
            }
            println!("Container stopped: {container_id}");
        }
        Command::Version => match client.version().await {
            Ok(v) => println!(
                "{} {} (CRI {})",
                v.runtime_name, v.runtime_version, v.runtime_api_version
            ),
            Err(e) => println!("Error requesting version: {e}"),
        },
    }
}
