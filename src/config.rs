use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Bucket holding the images. Requests fail while it is unset.
    pub bucket: Option<String>,
    /// Base URL that signed links are built on.
    pub public_url: String,
    pub signing_secret: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Moderated image feed with a status cache")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_FEED_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_FEED_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides IMAGE_FEED_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_FEED_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Image bucket (overrides IMAGE_FEED_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Public base URL for signed links (overrides IMAGE_FEED_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret for signing URLs (overrides IMAGE_FEED_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("IMAGE_FEED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("IMAGE_FEED_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing IMAGE_FEED_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading IMAGE_FEED_PORT"),
        };
        let env_storage =
            env::var("IMAGE_FEED_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("IMAGE_FEED_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/image_feed.db".into());
        let env_bucket = env::var("IMAGE_FEED_BUCKET").ok();
        let env_public_url = env::var("IMAGE_FEED_PUBLIC_URL").ok();
        let env_secret = env::var("IMAGE_FEED_SIGNING_SECRET").ok();

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let bucket = args
            .bucket
            .or(env_bucket)
            .filter(|b| !b.trim().is_empty());
        let public_url = args
            .public_url
            .or(env_public_url)
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let signing_secret = match args.signing_secret.or(env_secret) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "IMAGE_FEED_SIGNING_SECRET not set; signed URLs will not survive a restart"
                );
                Uuid::new_v4().to_string()
            }
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket,
            public_url,
            signing_secret,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
