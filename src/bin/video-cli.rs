use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "video-cli")]
#[command(about = "Admin CLI for the video resilience service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "VIDEO_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service status summary
    Status,
    /// Circuit breaker, retry budget and per-asset processing state
    Resilience,
    /// Active poll sessions
    Sessions,
    /// Tracked assets
    Assets,
    /// Submit a new asset from a URL and start tracking it
    Submit { input_url: String },
    /// Start polling an asset
    Poll { asset_id: String },
    /// Stop polling an asset
    Unpoll { asset_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Resilience => client.get(format!("{}/admin/resilience", base)),
        Commands::Sessions => client.get(format!("{}/admin/sessions", base)),
        Commands::Assets => client.get(format!("{}/admin/assets", base)),
        Commands::Submit { input_url } => client
            .post(format!("{}/admin/assets", base))
            .json(&json!({ "input_url": input_url })),
        Commands::Poll { asset_id } => client.post(format!("{}/admin/assets/{}/poll", base, asset_id)),
        Commands::Unpoll { asset_id } => client.delete(format!("{}/admin/assets/{}/poll", base, asset_id)),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
