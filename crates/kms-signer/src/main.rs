use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use kms_signer::{
    AuthorizedClient, CachedTokenSource, Config, Endpoints, KeyReference, KmsSigner,
    KmsTokenConfig, KmsTokenSource, ObjectRef, Pager, PubSubTopics, RsaSigner, SignedUrlOptions,
    Signer, StorageBuckets, Token, TokenSettings, TokenSource, UrlSigner, fetch,
    config::{DEFAULT_KMS_ENDPOINT, DEFAULT_TOKEN_URI},
    token::{MetadataTokenSource, StaticTokenSource},
};
use tracing::info;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use url::Url;

#[derive(Parser)]
struct Args {
    #[clap(long, env = "PROJECT_ID")]
    project_id: String,
    #[clap(long, env = "KMS_LOCATION_ID", default_value = "us-central1")]
    kms_location_id: String,
    #[clap(long, env = "KMS_KEY_RING")]
    kms_key_ring: String,
    #[clap(long, env = "KMS_KEY")]
    kms_key: String,
    #[clap(long, env = "KMS_KEY_VERSION", default_value = "1")]
    kms_key_version: String,
    #[clap(long, env = "SERVICE_ACCOUNT_EMAIL")]
    service_account_email: String,
    /// `kid` header of minted JWTs.
    #[clap(long, env = "KEY_ID")]
    key_id: Option<String>,

    #[clap(long, env = "BUCKET_NAME", default_value = "")]
    bucket: String,
    #[clap(long, env = "OBJECT_NAME", default_value = "foo.txt")]
    object: String,

    /// Access token used to call KMS. Falls back to the metadata server.
    #[clap(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    /// Sign with a local PKCS#8 RSA key instead of KMS.
    #[clap(long, env = "LOCAL_KEY_FILE")]
    local_key_file: Option<PathBuf>,

    /// Use the signed JWT as the bearer token instead of exchanging it.
    #[clap(long)]
    jwt_access_token: bool,
    #[clap(long, env = "TOKEN_AUDIENCE")]
    audience: Option<String>,

    #[clap(long, env = "KMS_ENDPOINT", default_value = DEFAULT_KMS_ENDPOINT)]
    kms_endpoint: String,
    #[clap(long, env = "TOKEN_URI", default_value = DEFAULT_TOKEN_URI)]
    token_uri: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a V4 signed URL for the configured object.
    SignUrl {
        #[clap(long, default_value = "GET")]
        method: String,
        #[clap(long, default_value = "600")]
        expires_in: i64,
    },
    /// Sign a GET URL and print what it returns.
    Fetch {
        #[clap(long, default_value = "600")]
        expires_in: i64,
    },
    /// Print a bearer token minted with the KMS key.
    Token,
    /// List Pub/Sub topics of the project.
    Topics,
    /// List Storage buckets of the project.
    Buckets,
    /// Sign, fetch, mint a token and list topics and buckets.
    Demo,
}

impl Args {
    fn config(&self) -> Result<Config> {
        let key = KeyReference::new(
            &self.project_id,
            &self.kms_location_id,
            &self.kms_key_ring,
            &self.kms_key,
            &self.kms_key_version,
        )?;
        let config = Config {
            key,
            bucket: self.bucket.clone(),
            object: self.object.clone(),
            service_account_email: self.service_account_email.clone(),
            key_id: self.key_id.clone(),
            endpoints: Endpoints {
                kms: self.kms_endpoint.clone(),
                token_uri: self.token_uri.clone(),
                ..Endpoints::default()
            },
            token: TokenSettings {
                audience: self.audience.clone(),
                use_oauth_token: !self.jwt_access_token,
                ..TokenSettings::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn build_signer(args: &Args, config: &Config) -> Result<Arc<dyn Signer>> {
    if let Some(path) = &args.local_key_file {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let signer = RsaSigner::from_pkcs8_pem(&pem)?;
        info!(path = %path.display(), algorithm = signer.algorithm(), "signing with local key");
        return Ok(Arc::new(signer));
    }

    let credentials: Arc<dyn TokenSource> = match &args.access_token {
        Some(token) => Arc::new(StaticTokenSource::new(Token::bearer(token))),
        None => Arc::new(CachedTokenSource::new(MetadataTokenSource::with_endpoint(
            &config.endpoints.metadata,
        ))),
    };
    info!(key = %config.key, "signing with KMS");
    Ok(Arc::new(
        KmsSigner::new(config.key.clone(), credentials).with_endpoint(&config.endpoints.kms),
    ))
}

fn build_token_source(config: &Config, signer: Arc<dyn Signer>) -> Result<Arc<dyn TokenSource>> {
    let token_config = KmsTokenConfig::from_settings(
        &config.service_account_email,
        config.key_id.clone(),
        &config.endpoints.token_uri,
        &config.token,
    );
    let source = KmsTokenSource::new(token_config, signer)?;
    Ok(Arc::new(CachedTokenSource::new(source)))
}

/// `now + expires_in` seconds, or an error when that is not a valid time.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .with_context(|| format!("--expires-in {expires_in} is out of range"))
}

async fn sign_url(
    config: &Config,
    signer: Arc<dyn Signer>,
    method: &str,
    expires_in: i64,
) -> Result<Url> {
    let options = SignedUrlOptions::new(
        &config.service_account_email,
        method,
        expiry_after(Utc::now(), expires_in)?,
    );
    let url = UrlSigner::new(signer)
        .with_host(&config.endpoints.storage_host)
        .generate(&ObjectRef::new(&config.bucket, &config.object), &options)
        .await
        .context("signing URL")?;
    Ok(url)
}

async fn fetch_signed(config: &Config, signer: Arc<dyn Signer>, expires_in: i64) -> Result<()> {
    let url = sign_url(config, signer, "GET", expires_in).await?;
    info!(%url, "signed URL");
    let body = fetch(&reqwest::Client::new(), &url)
        .await
        .context("fetching signed URL")?;
    info!("SignedURL response:\n{}", String::from_utf8_lossy(&body));
    Ok(())
}

async fn list_topics(config: &Config, client: AuthorizedClient) -> Result<()> {
    let topics = PubSubTopics::new(client, config.key.project()).with_endpoint(&config.endpoints.pubsub);
    let mut pager = Pager::new(topics);
    while let Some(topic) = pager.next().await.context("listing topics")? {
        info!(topic = topic.id(), "topic");
    }
    Ok(())
}

async fn list_buckets(config: &Config, client: AuthorizedClient) -> Result<()> {
    let buckets = StorageBuckets::new(client, config.key.project()).with_endpoint(&config.endpoints.storage);
    let mut pager = Pager::new(buckets);
    while let Some(bucket) = pager.next().await.context("listing buckets")? {
        info!(bucket = %bucket.name, "bucket");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = args.config()?;
    let signer = build_signer(&args, &config)?;

    match &args.command {
        Command::SignUrl { method, expires_in } => {
            let url = sign_url(&config, signer, method, *expires_in).await?;
            println!("{url}");
        }
        Command::Fetch { expires_in } => fetch_signed(&config, signer, *expires_in).await?,
        Command::Token => {
            let token = build_token_source(&config, signer)?.token().await?;
            println!("{}", token.access_token);
        }
        Command::Topics => {
            let client = AuthorizedClient::new(build_token_source(&config, signer)?);
            list_topics(&config, client).await?;
        }
        Command::Buckets => {
            let client = AuthorizedClient::new(build_token_source(&config, signer)?);
            list_buckets(&config, client).await?;
        }
        Command::Demo => {
            fetch_signed(&config, signer.clone(), 600).await?;

            let client = AuthorizedClient::new(build_token_source(&config, signer)?);
            let url = format!(
                "{}/v1/projects/{}/topics",
                config.endpoints.pubsub,
                config.key.project()
            );
            let response = client.get(&url).await.context("calling Pub/Sub")?;
            info!(status = %response.status(), "Pub/Sub response");

            list_topics(&config, client.clone()).await?;
            if config.token.use_oauth_token {
                list_buckets(&config, client).await?;
            } else {
                info!("skipping bucket listing: Cloud Storage does not accept JWT access tokens");
            }
        }
    }

    Ok(())
}
