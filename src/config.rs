use std::env;
use std::path::PathBuf;

/// Process-wide configuration, read once at startup and injected into
/// components. Development defaults keep a local run zero-setup; production
/// deployments override via environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub cors_origin: String,
    /// Where uploaded files are staged before processing.
    pub temp_dir: PathBuf,
    /// Where locally compressed images are written.
    pub output_dir: PathBuf,
    pub users_file: PathBuf,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub pdf_api_url: String,
    pub pdf_api_key: String,
    /// Upper bound on a single remote compression call, in seconds.
    pub remote_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            temp_dir: PathBuf::from(env_or("TEMP_DIR", "public/temp")),
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", "public/compressed")),
            users_file: PathBuf::from(env_or("USERS_FILE", "users.json")),
            access_token_secret: env_or("ACCESS_TOKEN_SECRET", "dev-access-secret"),
            refresh_token_secret: env_or("REFRESH_TOKEN_SECRET", "dev-refresh-secret"),
            access_token_expiry_minutes: env_or("ACCESS_TOKEN_EXPIRY_MINUTES", "60")
                .parse()
                .unwrap_or(60),
            refresh_token_expiry_days: env_or("REFRESH_TOKEN_EXPIRY_DAYS", "10")
                .parse()
                .unwrap_or(10),
            pdf_api_url: env_or("PDF_API_URL", "https://api.pdf.co/v1"),
            pdf_api_key: env_or("PDF_API_KEY", ""),
            remote_timeout_secs: env_or("REMOTE_TIMEOUT_SECS", "120").parse().unwrap_or(120),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
