//! Command line client for the airgap file service.
//!
//! The server address comes from `--server` or `AIRGAP_SERVER_URL`.

use airgap_fs::client::output::{run_list, ListConfig, FILE_NAME};
use airgap_fs::client::{ApiClient, ClientConfig};
use airgap_fs::models::file::{FileId, UploadInfo};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

const LIST_HELP: &str = "\
Filter expressions take the form `key OPERATOR value`:
  predefined keys: provided_id, provided_name, size, created_at, deleted_at
  operators:       EQUAL, CONTAINS, LESS_THAN, GREATER_THAN
  any other key is matched against custom metadata (EQUAL and CONTAINS only)
  created_at and deleted_at accept RFC 3339 or YYYY-MM-DD

Sort expressions take the form `key ASC|DESC` with a predefined key.

Quote values containing spaces: -f \"description CONTAINS 'operator file'\"";

#[derive(Parser)]
#[command(name = "airgap-client", version, about = "Upload and list files on an airgap-fs server")]
struct Cli {
    /// Server base URL, e.g. http://127.0.0.1:8080
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List file metadata
    #[command(after_long_help = LIST_HELP)]
    List {
        /// Filter expression; repeat to combine with AND
        #[arg(short = 'f', long = "filter", value_name = "EXPR")]
        filters: Vec<String>,
        /// Sort expression; applied in the given order
        #[arg(short = 's', long = "sort", value_name = "EXPR")]
        sorts: Vec<String>,
        /// Write files.csv into this directory instead of printing
        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Upload a file
    Upload {
        /// Path to the file to upload
        path: PathBuf,
        /// Identifier the file is stored under
        #[arg(long)]
        id: String,
        /// Display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Compression applied to the content, if any
        #[arg(long, value_name = "TYPE")]
        compression_type: Option<String>,
        /// Custom metadata entry; repeatable
        #[arg(short = 'm', long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    let client = ApiClient::new(&config).context("Failed to create HTTP client")?;

    match cli.command {
        Commands::List {
            filters,
            sorts,
            output_dir,
        } => {
            let list = ListConfig {
                filters,
                sorts,
                output_dir,
            };
            let rows = run_list(&client, &list)
                .await
                .context("Failed to list file metadata")?;
            if let Some(dir) = &list.output_dir {
                eprintln!("{} records written to {}", rows, dir.join(FILE_NAME).display());
            }
        }
        Commands::Upload {
            path,
            id,
            name,
            compression_type,
            metadata,
        } => {
            let name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("Path has no file name; pass --name")?,
            };
            let info = UploadInfo {
                file_id: FileId { id, name },
                size: 0,
                compression: compression_type.is_some(),
                compression_type: compression_type.unwrap_or_default(),
                created_at: None,
                metadata: metadata.into_iter().collect::<BTreeMap<_, _>>(),
            };
            let uploaded = client
                .upload_file(&path, info)
                .await
                .with_context(|| format!("Failed to upload {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&uploaded)?);
        }
    }

    Ok(())
}
