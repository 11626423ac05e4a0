//! Container configuration loading from environment variables.

use crate::deployment::BeanDeployment;
use crate::listener::MessageListener;
use serde::Deserialize;
use std::time::Duration;

/// MDB container configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub container_id: String,
    /// Listener interface deployments must implement. Defaults to the container's
    /// listener type.
    pub message_listener_interface: Option<String>,
    /// Live instances per deployment; `<= 0` means unlimited.
    pub instance_limit: i32,
    /// Reject deployments whose activation properties the activation spec does not understand.
    pub fail_on_unknown_activation_spec: bool,
    /// Pooled instances idle this long are destroyed; `0` disables eviction.
    pub idle_timeout_ms: u64,
    pub eviction_interval_ms: u64,
    /// Pause between endpoint creation attempts in the timed retry loop.
    pub endpoint_retry_backoff_ms: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            container_id: "MdbContainer".to_string(),
            message_listener_interface: None,
            instance_limit: 10,
            fail_on_unknown_activation_spec: true,
            idle_timeout_ms: 0,
            eviction_interval_ms: 60_000,
            endpoint_retry_backoff_ms: 10,
        }
    }
}

impl ContainerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `MDB_CONTAINER_ID`: container id (default: MdbContainer)
    /// - `MDB_MESSAGE_LISTENER_INTERFACE`: required listener interface (default: the listener type's)
    /// - `MDB_INSTANCE_LIMIT`: instances per deployment, `<= 0` unlimited (default: 10)
    /// - `MDB_FAIL_ON_UNKNOWN_ACTIVATION_SPEC`: `true`/`false` (default: true)
    /// - `MDB_IDLE_TIMEOUT_MS`: idle eviction timeout, 0 disables (default: 0)
    /// - `MDB_EVICTION_INTERVAL_MS`: reaper period (default: 60000)
    /// - `MDB_ENDPOINT_RETRY_BACKOFF_MS`: endpoint creation retry pause (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let container_id = std::env::var("MDB_CONTAINER_ID").unwrap_or(defaults.container_id);
        let message_listener_interface = std::env::var("MDB_MESSAGE_LISTENER_INTERFACE").ok();

        let instance_limit = parse_var("MDB_INSTANCE_LIMIT", defaults.instance_limit, "must be an integer")?;
        let fail_on_unknown_activation_spec = parse_var(
            "MDB_FAIL_ON_UNKNOWN_ACTIVATION_SPEC",
            defaults.fail_on_unknown_activation_spec,
            "must be true or false",
        )?;
        let idle_timeout_ms = parse_var(
            "MDB_IDLE_TIMEOUT_MS",
            defaults.idle_timeout_ms,
            "must be a non-negative integer",
        )?;
        let eviction_interval_ms = parse_var(
            "MDB_EVICTION_INTERVAL_MS",
            defaults.eviction_interval_ms,
            "must be a non-negative integer",
        )?;
        let endpoint_retry_backoff_ms = parse_var(
            "MDB_ENDPOINT_RETRY_BACKOFF_MS",
            defaults.endpoint_retry_backoff_ms,
            "must be a non-negative integer",
        )?;

        Ok(Self {
            container_id,
            message_listener_interface,
            instance_limit,
            fail_on_unknown_activation_spec,
            idle_timeout_ms,
            eviction_interval_ms,
            endpoint_retry_backoff_ms,
        })
    }

    /// Effective limit for `deployment`: its `InstanceLimit` property wins over the
    /// container default. `None` means unlimited.
    pub fn instance_limit_for<L: MessageListener>(&self, deployment: &BeanDeployment<L>) -> Option<usize> {
        let limit = deployment.instance_limit().unwrap_or(self.instance_limit);
        usize::try_from(limit).ok().filter(|l| *l > 0)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn endpoint_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.endpoint_retry_backoff_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(name, expected)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BeanRecorder, MockListener};
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 7] = [
        "MDB_CONTAINER_ID",
        "MDB_MESSAGE_LISTENER_INTERFACE",
        "MDB_INSTANCE_LIMIT",
        "MDB_FAIL_ON_UNKNOWN_ACTIVATION_SPEC",
        "MDB_IDLE_TIMEOUT_MS",
        "MDB_EVICTION_INTERVAL_MS",
        "MDB_ENDPOINT_RETRY_BACKOFF_MS",
    ];

    /// Restores the touched variables on drop
    struct EnvGuard {
        vars: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let vars = VARS.iter().map(|k| (*k, env::var(k).ok())).collect();
            for key in VARS {
                env::remove_var(key);
            }
            Self { vars }
        }

        fn set(&self, key: &str, value: &str) {
            env::set_var(key, value);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config, ContainerConfig::default());
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let guard = EnvGuard::clean();
        guard.set("MDB_CONTAINER_ID", "OrdersContainer");
        guard.set("MDB_INSTANCE_LIMIT", "-1");
        guard.set("MDB_FAIL_ON_UNKNOWN_ACTIVATION_SPEC", "false");
        guard.set("MDB_IDLE_TIMEOUT_MS", "5000");
        guard.set("MDB_EVICTION_INTERVAL_MS", "1000");
        guard.set("MDB_ENDPOINT_RETRY_BACKOFF_MS", "25");

        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config.container_id, "OrdersContainer");
        assert_eq!(config.instance_limit, -1);
        assert!(!config.fail_on_unknown_activation_spec);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.eviction_interval(), Duration::from_secs(1));
        assert_eq!(config.endpoint_retry_backoff(), Duration::from_millis(25));
    }

    #[test]
    fn test_config_invalid_instance_limit() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let guard = EnvGuard::clean();
        guard.set("MDB_INSTANCE_LIMIT", "many");

        let err = ContainerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MDB_INSTANCE_LIMIT", _)));
        assert!(err.to_string().contains("MDB_INSTANCE_LIMIT"));
    }

    #[test]
    fn test_instance_limit_resolution() {
        let config = ContainerConfig::default();
        let recorder = BeanRecorder::default();

        let plain = BeanDeployment::<MockListener>::builder("A", "A", recorder.factory()).build();
        assert_eq!(config.instance_limit_for(&plain), Some(10));

        let unlimited = BeanDeployment::<MockListener>::builder("B", "B", recorder.factory())
            .property("InstanceLimit", "0")
            .build();
        assert_eq!(config.instance_limit_for(&unlimited), None);

        let custom = BeanDeployment::<MockListener>::builder("C", "C", recorder.factory())
            .property("instanceLimit", "2")
            .build();
        assert_eq!(config.instance_limit_for(&custom), Some(2));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{"container_id": "Audit", "idle_timeout_ms": 100}"#).unwrap();
        assert_eq!(config.container_id, "Audit");
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(100)));
        assert_eq!(config.instance_limit, 10);
    }
}
