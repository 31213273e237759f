use std::env;

use serde::Deserialize;

/// One day. Longer windows would suppress legitimate repeats.
pub const MAX_DEDUP_WINDOW_SECONDS: i64 = 86_400;
pub const MAX_EXPIRING_WITHIN_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub activity: ActivityConfig,
    pub pantry: PantryConfig,
    pub shopping: ShoppingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS. `None` allows any origin.
    pub frontend_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (signup / signin)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// bcrypt work factor for stored passwords
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// Identical events from one user inside this window are dropped.
    pub dedup_window_seconds: i64,
    /// How many of the newest records are inspected for duplicates.
    pub dedup_scan_depth: i64,
    /// Records kept per pantry; older ones are pruned on every append.
    pub retention: i64,
}

/// Denominator used when tallying join-request approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MajorityBasis {
    /// Member count captured when the request was created.
    Snapshot,
    /// Member count at the moment of each vote.
    Live,
}

impl MajorityBasis {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "snapshot" => Some(MajorityBasis::Snapshot),
            "live" => Some(MajorityBasis::Live),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PantryConfig {
    /// Fallback pantry for callers without one. Cannot be claimed or deleted.
    pub default_pantry_name: String,
    pub majority_basis: MajorityBasis,
    /// Optional JSON file replacing the embedded category/expiry tables.
    pub inventory_rules_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShoppingConfig {
    /// Items with less than this amount are suggested as running low.
    pub low_stock_threshold: f64,
    /// Items expiring within this many days are suggested for replacement.
    pub expiring_within_days: i64,
    pub max_suggestions: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/pantry.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                busy_timeout_ms: env::var("DATABASE_BUSY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5000),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            auth: AuthConfig {
                bcrypt_cost: env::var("BCRYPT_COST")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|c| (4..=31).contains(c))
                    .unwrap_or(bcrypt::DEFAULT_COST),
            },
            activity: ActivityConfig {
                dedup_window_seconds: env::var("ACTIVITY_DEDUP_WINDOW_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|s| (0..=MAX_DEDUP_WINDOW_SECONDS).contains(s))
                    .unwrap_or(10),
                dedup_scan_depth: env::var("ACTIVITY_DEDUP_SCAN_DEPTH")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                retention: env::var("ACTIVITY_RETENTION")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
            pantry: PantryConfig {
                default_pantry_name: env::var("DEFAULT_PANTRY_NAME")
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "default".to_string()),
                majority_basis: match env::var("JOIN_MAJORITY_BASIS") {
                    Ok(v) => MajorityBasis::from_str(&v)
                        .ok_or_else(|| ConfigError::InvalidValue("JOIN_MAJORITY_BASIS".to_string()))?,
                    Err(_) => MajorityBasis::Snapshot,
                },
                inventory_rules_path: env::var("INVENTORY_RULES_PATH")
                    .ok()
                    .filter(|v| !v.is_empty()),
            },
            shopping: ShoppingConfig {
                low_stock_threshold: env::var("SHOPPING_LOW_STOCK_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|t: &f64| t.is_finite() && *t >= 0.0)
                    .unwrap_or(2.0),
                expiring_within_days: env::var("SHOPPING_EXPIRING_WITHIN_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|d| (0..=MAX_EXPIRING_WITHIN_DAYS).contains(d))
                    .unwrap_or(3),
                max_suggestions: env::var("SHOPPING_MAX_SUGGESTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/pantry.db".to_string(),
                max_connections: 5,
                busy_timeout_ms: 5000,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            auth: AuthConfig {
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            activity: ActivityConfig {
                dedup_window_seconds: 10,
                dedup_scan_depth: 10,
                retention: 100,
            },
            pantry: PantryConfig {
                default_pantry_name: "default".to_string(),
                majority_basis: MajorityBasis::Snapshot,
                inventory_rules_path: None,
            },
            shopping: ShoppingConfig {
                low_stock_threshold: 2.0,
                expiring_within_days: 3,
                max_suggestions: 10,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_basis_parses_case_insensitively() {
        assert_eq!(MajorityBasis::from_str("Snapshot"), Some(MajorityBasis::Snapshot));
        assert_eq!(MajorityBasis::from_str(" live "), Some(MajorityBasis::Live));
        assert_eq!(MajorityBasis::from_str("quorum"), None);
    }
}
