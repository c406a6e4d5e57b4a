use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const MIB: u64 = 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    /// Prefix under which resized originals (with width/height) live.
    pub gallery_prefix: String,
    /// Prefix uploads are written to.
    pub upload_prefix: String,
    pub distribution_domain: String,
    pub revalidate: Duration,
    pub max_upload_bytes: u64,
    pub metadata_concurrency: usize,
    /// Client-local file remembering the last photo shown by `show`.
    pub last_viewed_path: PathBuf,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Photo gallery backed by a local blob store")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides GALLERY_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides GALLERY_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Bucket holding the gallery (overrides GALLERY_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the gallery API (default)
    Serve,
    /// Apply the schema, create the bucket and exit
    Migrate,
    /// Upload image files through the upload endpoint and report each outcome
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Fail a file whose upload takes longer than this
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the gallery, marking the photo shown last (once)
    List,
    /// Print one photo's URLs and remember it as the last viewed
    Show { idx: usize },
    /// Store an original under the gallery prefix with its dimensions
    Import {
        file: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        Self::from_args(args, |name| env::var(name).ok())
    }

    /// Merge `args` over values read through `lookup`, then over defaults.
    pub fn from_args(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Command)> {
        // --- Environment fallback ---
        let env_host = lookup("GALLERY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "GALLERY_PORT")?.unwrap_or(3000);
        let env_storage =
            lookup("GALLERY_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = lookup("GALLERY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/gallery.db".into());
        let env_bucket = lookup("GALLERY_BUCKET").unwrap_or_else(|| {
            let domain = lookup("DOMAIN_NAME").unwrap_or_else(|| "local".into());
            format!("asset-bucket-{}", domain)
        });

        let revalidate_secs = parse_var(&lookup, "GALLERY_REVALIDATE_SECS")?.unwrap_or(10);
        let max_upload_mib: u64 = parse_var(&lookup, "GALLERY_MAX_UPLOAD_MIB")?.unwrap_or(20);
        let metadata_concurrency: usize =
            parse_var(&lookup, "GALLERY_METADATA_CONCURRENCY")?.unwrap_or(8);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            gallery_prefix: lookup("GALLERY_PREFIX")
                .unwrap_or_else(|| "assets/gallery/originals".into()),
            upload_prefix: lookup("GALLERY_UPLOAD_PREFIX")
                .unwrap_or_else(|| "assets/uploads/gallery".into()),
            distribution_domain: lookup("DISTRIBUTION_DOMAIN_NAME")
                .unwrap_or_else(|| "localhost".into()),
            revalidate: Duration::from_secs(revalidate_secs),
            max_upload_bytes: max_upload_mib * MIB,
            metadata_concurrency: metadata_concurrency.max(1),
            last_viewed_path: lookup("GALLERY_LAST_VIEWED_FILE")
                .unwrap_or_else(|| "./data/last-viewed.json".into())
                .into(),
        };

        Ok((cfg, args.command.unwrap_or(Command::Serve)))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}
