//! Settings loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use crate::application::reconciler::{FailurePolicy, ReconcilerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid settings: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct Settings {
    /// Quiet period before a quantity edit is committed.
    #[validate(range(min = 1, max = 60000))]
    pub debounce_ms: u64,
    pub failure_policy: FailurePolicy,
    #[validate(range(min = 1, max = 65536))]
    pub event_capacity: usize,
    pub nats_url: Option<String>,
    #[validate(length(min = 1))]
    pub nats_subject: String,
    pub seed_path: Option<PathBuf>,
}

impl Settings {
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig { debounce: Duration::from_millis(self.debounce_ms), failure_policy: self.failure_policy }
    }
}

/// Loads settings after reading a `.env` file, if there is one.
pub fn load_settings() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();
    build_settings(|key| std::env::var(key))
}

fn build_settings<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String { lookup(var).unwrap_or_else(|_| default.to_string()) };
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar { var: var.to_string(), reason };

    let debounce_ms = or_default("STOREFRONT_DEBOUNCE_MS", "500")
        .parse::<u64>()
        .map_err(|e| invalid("STOREFRONT_DEBOUNCE_MS", e.to_string()))?;
    let event_capacity = or_default("STOREFRONT_EVENT_CAPACITY", "64")
        .parse::<usize>()
        .map_err(|e| invalid("STOREFRONT_EVENT_CAPACITY", e.to_string()))?;
    let failure_policy = parse_failure_policy(&or_default("STOREFRONT_FAILURE_POLICY", "leave"))
        .ok_or_else(|| invalid("STOREFRONT_FAILURE_POLICY", "expected `leave` or `rollback`".into()))?;

    let settings = Settings {
        debounce_ms,
        failure_policy,
        event_capacity,
        nats_url: lookup("NATS_URL").ok().filter(|url| !url.is_empty()),
        nats_subject: or_default("STOREFRONT_NATS_SUBJECT", "storefront.cart"),
        seed_path: lookup("STOREFRONT_SEED_PATH").ok().map(PathBuf::from),
    };
    settings.validate()?;
    Ok(settings)
}

fn parse_failure_policy(raw: &str) -> Option<FailurePolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "leave" | "leave_and_flag" => Some(FailurePolicy::LeaveAndFlag),
        "rollback" => Some(FailurePolicy::Rollback),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| map.get(key).map(|v| (*v).to_string()).ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let map = HashMap::new();
        let settings = build_settings(lookup_from_map(&map)).unwrap();
        assert_eq!(settings.debounce_ms, 500);
        assert_eq!(settings.failure_policy, FailurePolicy::LeaveAndFlag);
        assert_eq!(settings.nats_subject, "storefront.cart");
        assert_eq!(settings.nats_url, None);
        assert_eq!(settings.reconciler(), ReconcilerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let map = HashMap::from([
            ("STOREFRONT_DEBOUNCE_MS", "250"),
            ("STOREFRONT_FAILURE_POLICY", "Rollback"),
            ("NATS_URL", "nats://localhost:4222"),
            ("STOREFRONT_SEED_PATH", "./cart.json"),
        ]);
        let settings = build_settings(lookup_from_map(&map)).unwrap();
        assert_eq!(settings.reconciler().debounce, Duration::from_millis(250));
        assert_eq!(settings.failure_policy, FailurePolicy::Rollback);
        assert_eq!(settings.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(settings.seed_path, Some(PathBuf::from("./cart.json")));
    }

    #[test]
    fn test_rejects_bad_values() {
        let map = HashMap::from([("STOREFRONT_DEBOUNCE_MS", "soon")]);
        let result = build_settings(lookup_from_map(&map));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "STOREFRONT_DEBOUNCE_MS"));

        let map = HashMap::from([("STOREFRONT_FAILURE_POLICY", "retry")]);
        assert!(matches!(build_settings(lookup_from_map(&map)), Err(ConfigError::InvalidEnvVar { .. })));

        let map = HashMap::from([("STOREFRONT_DEBOUNCE_MS", "0")]);
        assert!(matches!(build_settings(lookup_from_map(&map)), Err(ConfigError::Validation(_))));

        let map = HashMap::from([("STOREFRONT_NATS_SUBJECT", "")]);
        assert!(matches!(build_settings(lookup_from_map(&map)), Err(ConfigError::Validation(_))));
    }
}
