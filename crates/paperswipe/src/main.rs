use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use paperswipe::{envfile, server, telemetry};
use paperswipe_core::{normalize, Paper};
use paperswipe_local::{config as workflow_config, WorkflowClient, WorkflowConfig};

#[derive(Parser, Debug)]
#[command(name = "paperswipe")]
#[command(about = "Research paper recommendation relay (HTTP server + CLI)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP relay (`/api/get-papers`, `/api/save-selection`).
    Serve(ServeCmd),
    /// Send one query to the workflow API and print the (normalized) reply.
    Fetch(FetchCmd),
    /// Normalize a saved envelope (file or stdin) and report which strategy matched.
    Normalize(NormalizeCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Address to listen on.
    #[arg(long, env = "PAPERSWIPE_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    /// Research topic to send.
    #[arg(long)]
    query: String,
    /// Print the upstream envelope as received instead of normalizing it.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    raw: bool,
    /// Override the configured request timeout (seconds, at least 1).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_s: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct NormalizeCmd {
    /// Envelope file. Reads stdin when omitted.
    ///
    /// Input that is not JSON is treated as a bare text envelope.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn has_env(k: &str) -> bool {
    std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = envfile::load_from_env();
    let cli = Cli::parse();
    telemetry::init();
    if let Some(outcome) = &env_file {
        outcome.log();
    }

    match cli.command {
        Commands::Serve(args) => {
            let client = WorkflowClient::from_env().context("loading workflow config")?;
            tracing::info!(url = %client.url(), flow_id = %client.config().flow_id, "workflow configured");
            let state = server::AppState::new(Arc::new(client));
            server::serve(args.bind, state).await?;
        }
        Commands::Fetch(args) => {
            let mut cfg = WorkflowConfig::from_env().context("loading workflow config")?;
            if let Some(s) = args.timeout_s {
                cfg.timeout = std::time::Duration::from_secs(s);
            }
            let client = WorkflowClient::new(cfg)?;
            let envelope = client.fetch_text(&args.query).await?;
            let out = if args.raw {
                envelope
            } else {
                normalize(envelope).into_value()
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Normalize(args) => {
            let text = match &args.file {
                Some(p) => std::fs::read_to_string(p)
                    .with_context(|| format!("reading {}", p.display()))?,
                None => {
                    let mut s = String::new();
                    std::io::stdin().read_to_string(&mut s)?;
                    s
                }
            };
            let envelope = serde_json::from_str::<serde_json::Value>(&text)
                .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
            let normalized = normalize(envelope);
            let papers = Paper::list_from(normalized.value());
            let titles: Vec<&str> = papers.iter().filter_map(|p| p.title.as_deref()).collect();
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "normalize",
                "ok": normalized.strategy().is_some(),
                "strategy": normalized.strategy(),
                "papers_count": normalized.papers_len(),
                "titles": titles,
                "result": normalized.value(),
            });
            println!("{v}");
        }
        Commands::Doctor(args) => {
            let key = workflow_config::ENV_API_KEY.iter().any(|k| has_env(k));
            let secret = workflow_config::ENV_API_SECRET.iter().any(|k| has_env(k));
            let flow = workflow_config::ENV_FLOW_ID.iter().any(|k| has_env(k));

            let (config_ok, url, timeout_s, error) = match WorkflowConfig::from_env() {
                Ok(cfg) => match cfg.url() {
                    Ok(u) => (true, Some(u.to_string()), Some(cfg.timeout.as_secs()), None),
                    Err(e) => (false, None, Some(cfg.timeout.as_secs()), Some(e.to_string())),
                },
                Err(e) => (false, None, None, Some(e.to_string())),
            };

            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": config_ok,
                "name": "paperswipe",
                "version": env!("CARGO_PKG_VERSION"),
                "configured": {
                    "api_key": key,
                    "api_secret": secret,
                    "flow_id": flow,
                    "env_file": env_file.as_ref().is_some_and(|o| o.loaded()),
                },
                "upstream": {
                    "url": url,
                    "timeout_s": timeout_s,
                },
                "error": error,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("paperswipe {} (ok={})", env!("CARGO_PKG_VERSION"), config_ok);
                    println!("credentials: api_key={key} api_secret={secret} flow_id={flow}");
                    println!(
                        "upstream: {}",
                        payload["upstream"]["url"].as_str().unwrap_or("(unresolved)")
                    );
                    if let Some(o) = env_file.as_ref().filter(|o| !o.loaded()) {
                        println!("env file: {} could not be read", o.path.display());
                    }
                    if let Some(e) = payload["error"].as_str() {
                        println!("error: {e}");
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "paperswipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("paperswipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }

    Ok(())
}
