use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cookie_path: Option<PathBuf>,
    pub api_version: String,
    pub max_concurrent_extractions: usize,
    pub storage: StorageConfig,
}

/// Credentials and addressing for the S3-compatible bucket (Cloudflare R2
/// in production). Left empty, the storage gateway stays disabled and only
/// the read endpoints work.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub public_url: String,
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_CONCURRENT_EXTRACTIONS: usize = 10;

impl Config {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, using environment variables only");
        }

        Self {
            port: read_env("PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            cookie_path: read_env("COOKIE_PATH").map(PathBuf::from),
            api_version: read_env("API_VERSION").unwrap_or_else(|| "v1".to_string()),
            max_concurrent_extractions: read_env("MAX_CONCURRENT_EXTRACTIONS")
                .and_then(|value| value.parse().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_EXTRACTIONS),
            storage: StorageConfig {
                account_id: read_env("R2_ACCOUNT_ID").unwrap_or_default(),
                access_key_id: read_env("R2_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: read_env("R2_SECRET_ACCESS_KEY").unwrap_or_default(),
                bucket: read_env("R2_BUCKET_NAME").unwrap_or_default(),
                endpoint: read_env("R2_ENDPOINT").unwrap_or_default(),
                public_url: read_env("R2_PUBLIC_URL").unwrap_or_default(),
            },
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_disable_storage() {
        let storage = StorageConfig {
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: "media".to_string(),
            endpoint: "https://example.r2.cloudflarestorage.com".to_string(),
            public_url: "https://cdn.example.com".to_string(),
        };
        assert!(!storage.is_configured());

        let storage = StorageConfig {
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            ..storage
        };
        assert!(storage.is_configured());
    }
}
