//! Image Vault - CLI
//!
//! Server, batch tools, migration and single-image operations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use image_vault::batch::{self, BatchReport, EncryptOptions};
use image_vault::config::{ConfigOverrides, VaultConfig};
use image_vault::storage::{check_passphrase, ImageQuery};
use image_vault::{migrate, peek_metadata, secure_fs, server, ImageStore};

#[derive(Parser)]
#[command(name = "image-vault")]
#[command(version = image_vault::VERSION)]
#[command(about = "Image Vault - local encrypted image storage")]
struct Cli {
    /// Storage directory (overrides config)
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,

    /// Config file (default ./image_vault.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(short, long)]
        bind: Option<String>,

        /// Static frontend directory
        #[arg(long)]
        public: Option<PathBuf>,
    },

    /// Encrypt every image in a directory
    Encrypt {
        /// Source directory
        dir: PathBuf,

        #[arg(short, long)]
        recursive: bool,

        /// Rename images to "<prefix> <n>.<ext>"
        #[arg(long)]
        prefix: Option<String>,

        #[arg(short, long)]
        album: Option<String>,

        /// Tag to apply (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Save the batch report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Passphrase (prompted when omitted)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Decrypt the vault to plain files
    Decrypt {
        /// Output directory
        #[arg(short, long, default_value = "./decrypted")]
        out: PathBuf,

        #[arg(short, long)]
        album: Option<String>,

        #[arg(long)]
        report: Option<PathBuf>,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// Fold legacy `.enc` + `.json` pairs into single containers
    Migrate {
        /// Decrypt and encode again under a fresh IV
        #[arg(long)]
        reencrypt: bool,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// List images
    List {
        #[arg(short, long)]
        album: Option<String>,

        #[arg(short, long)]
        tag: Option<String>,

        /// Substring of the name or a tag
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Print a container's metadata (no key needed)
    Inspect {
        file: PathBuf,
    },

    /// Replace an image's tags
    Tag {
        id: String,

        tags: Vec<String>,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// Delete an image
    Delete {
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut overrides = ConfigOverrides {
        storage_dir: cli.storage.clone(),
        json_logs: cli.json_logs.then_some(true),
        ..Default::default()
    };
    if let Commands::Serve { port, bind, public } = &cli.command {
        overrides.port = *port;
        overrides.bind_address = bind.clone();
        overrides.public_dir = public.clone();
    }

    let config =
        VaultConfig::load(cli.config.as_deref(), &overrides).context("loading configuration")?;
    init_logging(config.json_logs);

    match cli.command {
        Commands::Serve { .. } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&config))?;
        }

        Commands::Encrypt { dir, recursive, prefix, album, tags, report, key } => {
            let store = ImageStore::open(&config.storage_dir)?;
            let passphrase = read_passphrase(key, true)?;
            check_passphrase(&passphrase, config.min_passphrase_len)?;

            let options = EncryptOptions {
                recursive,
                name_prefix: prefix,
                album,
                tags,
            };
            let result = batch::encrypt_directory(&store, &dir, &passphrase, &options)?;
            print_report("Encrypted", &result);
            save_report(&result, report.as_deref())?;
        }

        Commands::Decrypt { out, album, report, key } => {
            let store = ImageStore::open(&config.storage_dir)?;
            let passphrase = read_passphrase(key, false)?;

            let result = batch::decrypt_all(&store, &passphrase, &out, album.as_deref())?;
            print_report("Decrypted", &result);
            println!("Output: {}", out.display());
            save_report(&result, report.as_deref())?;
        }

        Commands::Migrate { reencrypt, key } => {
            let store = ImageStore::open(&config.storage_dir)?;
            let passphrase = if reencrypt { Some(read_passphrase(key, false)?) } else { None };

            let report = migrate::migrate_store(&store, passphrase.as_deref())?;
            println!("Migrated: {}", report.migrated.len());
            for skipped in &report.skipped {
                println!("  skipped {}/{}: {}", skipped.album, skipped.id, skipped.reason);
            }
            if report.migrated.is_empty() && report.is_clean() {
                println!("No legacy files found");
            }
        }

        Commands::List { album, tag, query } => {
            let store = ImageStore::open(&config.storage_dir)?;
            let page = store.query(&ImageQuery {
                album,
                tag,
                q: query,
                page: Some(1),
                per_page: Some(image_vault::storage::MAX_PER_PAGE),
            })?;

            if page.items.is_empty() {
                println!("No images");
            } else {
                println!("Images ({} of {}):", page.items.len(), page.total);
                println!("{:-<72}", "");
                for image in &page.items {
                    let date = image
                        .encrypted_at
                        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{}  {:<10} {} ({} bytes) [{}] {}",
                        image.id,
                        image.album,
                        image.original_name,
                        image.size,
                        image.tags.join(", "),
                        date
                    );
                }
            }
        }

        Commands::Inspect { file } => {
            let data = secure_fs::read_file(&file)?;
            let meta = peek_metadata(&data)?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }

        Commands::Tag { id, tags, key } => {
            let store = ImageStore::open(&config.storage_dir)?;
            let passphrase = read_passphrase(key, false)?;
            let meta = store.update_tags(&id, &passphrase, &tags)?;
            println!("Tags for {}: [{}]", id, meta.tags().join(", "));
        }

        Commands::Delete { id } => {
            let store = ImageStore::open(&config.storage_dir)?;
            store.delete(&id)?;
            println!("Deleted {}", id);
        }
    }

    Ok(())
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("image_vault=info,tower_http=info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

/// Passphrase from `--key`, else a hidden prompt
fn read_passphrase(given: Option<String>, confirm: bool) -> anyhow::Result<String> {
    if let Some(key) = given {
        return Ok(key);
    }

    let key = rpassword::prompt_password("Passphrase: ")?;
    if key.is_empty() {
        bail!("Decryption key is required");
    }
    if confirm && rpassword::prompt_password("Confirm passphrase: ")? != key {
        bail!("Passphrases do not match");
    }
    Ok(key)
}

fn print_report(verb: &str, report: &BatchReport) {
    println!("{} {} of {} files", verb, report.succeeded, report.total);
    for item in report.results.iter().filter(|i| !i.success) {
        println!("  failed {}: {}", item.source, item.error.as_deref().unwrap_or("unknown error"));
    }
}

fn save_report(report: &BatchReport, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        report.save(path)?;
        println!("Report: {}", path.display());
    }
    Ok(())
}
