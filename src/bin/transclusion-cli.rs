use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use transclusion::config::{load_config, AppConfig};
use transclusion::observability::logging;
use transclusion::Transcluder;

#[derive(Parser)]
#[command(name = "transclusion-cli")]
#[command(about = "Resolve include directives locally or against a running host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a local document and print the assembled content
    Resolve {
        file: PathBuf,
        /// Request header forwarded to fragments, as "Name: value"
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print resolution stats as JSON on stderr
        #[arg(long)]
        stats: bool,
    },
    /// Post a document to a running host's /verify endpoint
    Verify {
        file: PathBuf,
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Show a running host's fragment cache statistics
    CacheStats {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            file,
            headers,
            config,
            stats,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => AppConfig::default(),
            };
            logging::init_logging(&config.observability.log_level);

            let markup = std::fs::read_to_string(&file)?;
            let transcluder = Transcluder::new(config.transclusion)?;
            let result = transcluder
                .resolve_includes(&markup, &parse_headers(&headers)?)
                .await?;

            println!("{}", result.content());
            if let Some(status) = result.status_code_override() {
                eprintln!("Status override: {status}");
            }
            eprintln!(
                "Cache-Control: {}",
                result.calculate_cache_control_header_value(None)
            );
            for (name, value) in result.response_headers_to_pass() {
                eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            if stats {
                eprintln!("{}", serde_json::to_string_pretty(result.stats())?);
            }
        }
        Commands::Verify { file, url, headers } => {
            let markup = std::fs::read_to_string(&file)?;
            let res = reqwest::Client::new()
                .post(format!("{url}/verify"))
                .headers(parse_headers(&headers)?)
                .body(markup)
                .send()
                .await?;

            println!("{}", res.status());
            for (name, value) in res.headers() {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
            println!();
            println!("{}", res.text().await?);
        }
        Commands::CacheStats { url } => {
            let res = reqwest::get(format!("{url}/cache/stats")).await?;
            if !res.status().is_success() {
                eprintln!("Error: host returned status {}", res.status());
                return Ok(());
            }
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    for header in raw {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("invalid header {header:?}, expected \"Name: value\""))?;
        headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    Ok(headers)
}
