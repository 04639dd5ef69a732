use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_idle_timeout_secs: u64,
    pub limiter_rps: f64,
    pub limiter_burst: u32,
    pub limiter_enabled: bool,
    pub cors_trusted_origins: Vec<String>,
    pub metrics_enabled: bool,
    /// Upper bound on handling a single request
    pub request_timeout_secs: u64,
}

/// Read `name`, falling back to `default` when unset
fn var_or<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = var_or("SERVER_PORT", 4000)?;
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;
        let db_max_connections = var_or("DB_MAX_CONNECTIONS", 25)?;
        let db_min_connections = var_or("DB_MIN_CONNECTIONS", 2)?;
        let db_idle_timeout_secs = var_or("DB_IDLE_TIMEOUT_SECS", 900)?;

        let limiter_rps = var_or("LIMITER_RPS", 2.0)?;
        let limiter_burst = var_or("LIMITER_BURST", 4)?;
        let limiter_enabled = var_or("LIMITER_ENABLED", true)?;

        let cors_trusted_origins = parse_origins(&env::var("CORS_TRUSTED_ORIGINS").unwrap_or_default());

        let metrics_enabled = var_or("METRICS_ENABLED", true)?;
        let request_timeout_secs = var_or("REQUEST_TIMEOUT_SECS", 30)?;

        if db_min_connections > db_max_connections {
            return Err("DB_MIN_CONNECTIONS must not exceed DB_MAX_CONNECTIONS".to_string());
        }
        if request_timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be positive".to_string());
        }
        if limiter_enabled && (limiter_rps <= 0.0 || limiter_burst == 0) {
            return Err("LIMITER_RPS and LIMITER_BURST must be positive".to_string());
        }

        Ok(Config {
            server_host,
            server_port,
            environment,
            database_url,
            db_max_connections,
            db_min_connections,
            db_idle_timeout_secs,
            limiter_rps,
            limiter_burst,
            limiter_enabled,
            cors_trusted_origins,
            metrics_enabled,
            request_timeout_secs,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Split a space or comma separated origin list
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://localhost:3000, https://example.com  http://a.test"),
            vec!["http://localhost:3000", "https://example.com", "http://a.test"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_var_or_uses_default_when_unset() {
        let port: u16 = var_or("MOVIEDB_TEST_UNSET_VARIABLE", 4000).unwrap();
        assert_eq!(port, 4000);
    }
}
