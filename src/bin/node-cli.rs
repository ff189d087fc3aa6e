use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "node-cli")]
#[command(about = "Management CLI for the node's local API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Value of settings.httpToken in the node state file
    #[arg(short, long, env = "NODE_TOKEN")]
    token: String,

    /// Sent as X-App-Name on config pushes
    #[arg(long, default_value = "Arch-Manager")]
    client_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node identity
    Status,
    /// Register the remote manager
    SetManager {
        url: String,
        #[arg(default_value = "")]
        token: String,
    },
    /// Forget the remote manager
    ClearManager,
    /// Push a full engine config document
    Apply { file: PathBuf },
    /// Query engine traffic statistics
    Stats {
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
    );

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/", base)).send().await?,
        Commands::SetManager { url, token } => {
            client
                .post(format!("{}/v1/manager", base))
                .headers(headers)
                .json(&json!({ "url": url, "token": token }))
                .send()
                .await?
        }
        Commands::ClearManager => {
            client
                .post(format!("{}/v1/manager", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Apply { file } => {
            let body = std::fs::read(&file)?;
            client
                .post(format!("{}/v1/configs", base))
                .headers(headers)
                .header(CONTENT_TYPE, "application/json")
                .header("X-App-Name", &cli.client_name)
                .body(body)
                .send()
                .await?
        }
        Commands::Stats { reset } => {
            client
                .get(format!("{}/v1/stats", base))
                .headers(headers)
                .query(&[("reset", reset)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: node API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
