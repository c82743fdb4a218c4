use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "faceauth", about = "faceauth client CLI")]
struct Cli {
    /// Base URL of the faceauthd server
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the embedding for an image (feeds the enrollment flow)
    Embed {
        /// Path to the image file
        image: PathBuf,
    },
    /// Verify an image against the enrolled embeddings
    Verify {
        /// Path to the image file
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Embed { image } => post_image(&cli.server, "generate-embedding", &image).await,
        Commands::Verify { image } => post_image(&cli.server, "verify-face", &image).await,
    }
}

/// POST the file as the `image` multipart field and print the JSON response.
async fn post_image(server: &str, endpoint: &str, path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());

    let form = reqwest::multipart::Form::new()
        .part("image", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

    let url = format!("{}/{}", server.trim_end_matches('/'), endpoint);
    tracing::debug!(%url, "posting image");

    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    let status = response.status();
    let body = response.text().await.context("reading response body")?;
    println!("{body}");

    if !status.is_success() {
        bail!("server answered {status}");
    }
    Ok(())
}
