//! Environment-sourced configuration. Grounded on the teacher's
//! `Config::from_env()` convention: plain struct of scalars, one env
//! var per field, sane defaults so the service boots without a `.env`.

use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub cors_origins: Vec<String>,
    pub provider_base_url: String,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let host = env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVICE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let db_path = env::var("DB_PATH").unwrap_or_else(|_| "vnquote.db".to_string());
        let cors_origins = env::var("CORS_ORIGINS")
            .ok()
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let provider_base_url =
            env::var("PROVIDER_BASE_URL").unwrap_or_else(|_| "http://localhost:9000".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

        Self {
            host,
            port,
            db_path,
            cors_origins,
            provider_base_url,
            log_format,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
