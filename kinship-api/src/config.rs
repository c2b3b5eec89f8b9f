/// Configuration management for the API server
///
/// Loaded from environment variables, with a local `.env` picked up in
/// development.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `API_PRODUCTION`: enables HSTS and hides development-only fields
/// - `CORS_ORIGINS`: comma-separated allowed origins, `*` for any
/// - `PUBLIC_BASE_URL`: used to build emailed links and feed URLs
/// - `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS`
/// - `JWT_SECRET` (required, at least 32 characters)
/// - `FEED_SECRET`: signs calendar feed URLs, defaults to `JWT_SECRET`
/// - `HOLIDAY_API_URL`, `HOLIDAY_API_KEY`, `HOLIDAY_COUNTRY`
/// - `MAIL_API_URL`, `MAIL_API_KEY`, `MAIL_FROM`: without a key, mail is only logged
///
/// # Example
///
/// ```no_run
/// use kinship_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_HOLIDAY_API_URL: &str = "https://calendarific.com/api/v2/holidays";
const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    pub holidays: HolidayConfig,

    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    pub production: bool,

    pub cors_origins: Vec<String>,

    /// Origin of the public site, without trailing slash
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub feed_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolidayConfig {
    pub api_url: String,

    pub api_key: Option<String>,

    /// ISO 3166 country used when a request names none
    pub default_country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: String,

    pub api_key: Option<String>,

    pub from: String,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, numbers do not
    /// parse, or `JWT_SECRET` is shorter than 32 characters.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;
        let production = optional("API_PRODUCTION").map(|v| parse_bool(&v)).unwrap_or(false);
        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()));
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", api_port))
            .trim_end_matches('/')
            .to_string();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let feed_secret = optional("FEED_SECRET").unwrap_or_else(|| jwt_secret.clone());

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                production,
                cors_origins,
                public_base_url,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                feed_secret,
            },
            holidays: HolidayConfig {
                api_url: optional("HOLIDAY_API_URL")
                    .unwrap_or_else(|| DEFAULT_HOLIDAY_API_URL.to_string()),
                api_key: optional("HOLIDAY_API_KEY"),
                default_country: optional("HOLIDAY_COUNTRY").unwrap_or_else(|| "US".to_string()),
            },
            mail: MailConfig {
                api_url: optional("MAIL_API_URL").unwrap_or_else(|| DEFAULT_MAIL_API_URL.to_string()),
                api_key: optional("MAIL_API_KEY"),
                from: optional("MAIL_FROM")
                    .unwrap_or_else(|| "Kinship <noreply@kinship.local>".to_string()),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Absolute URL under the public site
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.api.public_base_url, path.trim_start_matches('/'))
    }

    /// Settings for tests and local tooling
    pub fn for_tests(database_url: &str) -> Self {
        let secret = "test-secret-key-at-least-32-bytes-long".to_string();
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                production: false,
                cors_origins: vec!["*".to_string()],
                public_base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                feed_secret: secret.clone(),
                secret,
            },
            holidays: HolidayConfig {
                api_url: DEFAULT_HOLIDAY_API_URL.to_string(),
                api_key: None,
                default_country: "US".to_string(),
            },
            mail: MailConfig {
                api_url: DEFAULT_MAIL_API_URL.to_string(),
                api_key: None,
                from: "Kinship <noreply@kinship.test>".to_string(),
            },
        }
    }
}
