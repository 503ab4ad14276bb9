use serde::Deserialize;
use std::env;

pub use railbook_core::payment::GatewayConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub gateway: GatewayConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Single source of truth for both the booking hold duration and the
    /// seat-lock lease TTL. Two independently tuned numbers here caused
    /// holds and locks to expire out of step.
    pub hold_seconds: u64,
    /// Bounded retries for the expiry handler on transient store errors.
    #[serde(default = "default_expiry_retries")]
    pub expiry_max_retries: u32,
}

fn default_expiry_retries() -> u32 {
    3
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Layered load rooted at `dir`: the checked-in defaults, then the
    /// RUN_MODE file, then uncommitted local overrides, then environment
    /// variables like RAILBOOK__BUSINESS_RULES__HOLD_SECONDS=600.
    pub fn load_from(dir: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            .add_source(
                config::Environment::with_prefix("RAILBOOK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test covering both the file load and the env override, so the
    // process-global variable never races a parallel test.
    #[test]
    fn loads_defaults_and_env_overrides() {
        let dir = format!("{}/../config", env!("CARGO_MANIFEST_DIR"));

        let cfg = Config::load_from(&dir).unwrap();
        assert_eq!(cfg.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.gateway.currency, "VND");
        assert_eq!(cfg.business_rules.hold_seconds, 600);
        assert_eq!(cfg.business_rules.expiry_max_retries, 3);

        env::set_var("RAILBOOK__BUSINESS_RULES__HOLD_SECONDS", "120");
        let cfg = Config::load_from(&dir).unwrap();
        env::remove_var("RAILBOOK__BUSINESS_RULES__HOLD_SECONDS");
        assert_eq!(cfg.business_rules.hold_seconds, 120);
    }
}
