use clap::{Args, Parser, ValueEnum};
use ipnetwork::IpNetwork;
use std::fmt;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "TOKENWARD_DATABASE_URL")]
    pub database_url: String,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub alerts: AlertConfig,

    #[command(flatten)]
    pub cleanup: CleanupConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Connection attempts at startup before giving up
    #[arg(long = "db-connect-attempts", env = "TOKENWARD_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,

    /// Initial delay between connection attempts
    #[arg(long = "db-connect-min-backoff-ms", env = "TOKENWARD_DB_CONNECT_MIN_BACKOFF_MS", default_value_t = 500)]
    pub connect_min_backoff_ms: u64,

    /// Upper bound for the delay between connection attempts
    #[arg(long = "db-connect-max-backoff-ms", env = "TOKENWARD_DB_CONNECT_MAX_BACKOFF_MS", default_value_t = 8000)]
    pub connect_max_backoff_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "TOKENWARD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "TOKENWARD_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Comma-separated list of CIDRs to trust for X-Forwarded-For IP extraction
    #[arg(
        long,
        env = "TOKENWARD_TRUSTED_PROXIES",
        default_value = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32",
        value_delimiter = ','
    )]
    pub trusted_proxies: Vec<IpNetwork>,

    /// How long to wait for background workers to drain on shutdown
    #[arg(long, env = "TOKENWARD_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Args)]
pub struct AuthConfig {
    /// Secret key for access token signing
    #[arg(long, env = "TOKENWARD_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Argon2 memory cost in KiB for refresh token hashing
    #[arg(long, env = "TOKENWARD_HASH_MEMORY_KIB", default_value_t = argon2::Params::DEFAULT_M_COST)]
    pub hash_memory_kib: u32,

    /// Argon2 iteration count for refresh token hashing
    #[arg(long, env = "TOKENWARD_HASH_ITERATIONS", default_value_t = argon2::Params::DEFAULT_T_COST)]
    pub hash_iterations: u32,

    /// Argon2 degree of parallelism for refresh token hashing
    #[arg(long, env = "TOKENWARD_HASH_PARALLELISM", default_value_t = argon2::Params::DEFAULT_P_COST)]
    pub hash_parallelism: u32,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("hash_memory_kib", &self.hash_memory_kib)
            .field("hash_iterations", &self.hash_iterations)
            .field("hash_parallelism", &self.hash_parallelism)
            .finish()
    }
}

impl AuthConfig {
    /// Builds the Argon2 cost parameters used for every refresh token hash.
    ///
    /// # Errors
    /// Returns an error if the configured costs are outside Argon2's accepted ranges.
    pub fn hash_params(&self) -> anyhow::Result<argon2::Params> {
        argon2::Params::new(self.hash_memory_kib, self.hash_iterations, self.hash_parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid refresh token hash parameters: {e}"))
    }
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed on token issuance and refresh endpoints
    #[arg(long, env = "TOKENWARD_AUTH_RATE_LIMIT_PER_SECOND", default_value_t = 5)]
    pub auth_per_second: u32,

    /// Burst allowance for token issuance and refresh endpoints
    #[arg(long, env = "TOKENWARD_AUTH_RATE_LIMIT_BURST", default_value_t = 10)]
    pub auth_burst: u32,
}

#[derive(Clone, Debug, Args)]
pub struct AlertConfig {
    /// Maximum number of security alerts waiting for delivery
    #[arg(long, env = "TOKENWARD_ALERT_QUEUE_CAPACITY", default_value_t = 256)]
    pub queue_capacity: usize,

    /// Delivery attempts after the first failure before an alert is dropped
    #[arg(long, env = "TOKENWARD_ALERT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Initial retry backoff in milliseconds
    #[arg(long, env = "TOKENWARD_ALERT_MIN_BACKOFF_MS", default_value_t = 100)]
    pub min_backoff_ms: u64,

    /// Maximum retry backoff in milliseconds
    #[arg(long, env = "TOKENWARD_ALERT_MAX_BACKOFF_MS", default_value_t = 5000)]
    pub max_backoff_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct CleanupConfig {
    /// How often to sweep expired refresh tokens (0 disables the sweep)
    #[arg(long, env = "TOKENWARD_CLEANUP_INTERVAL_SECS", default_value_t = 3600)]
    pub interval_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; traces and metrics are only exported when set
    #[arg(long, env = "TOKENWARD_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "TOKENWARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }

    /// Checks settings that clap cannot express on its own.
    ///
    /// # Errors
    /// Returns an error if the signing secret is empty or the hash parameters are invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            anyhow::bail!("TOKENWARD_JWT_SECRET must not be empty");
        }
        self.auth.hash_params()?;
        if self.database.connect_attempts == 0 {
            anyhow::bail!("TOKENWARD_DB_CONNECT_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}
