// Configuration module entry point
// Layered configuration (defaults, optional file, environment) and runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{Config, HealthConfig, HttpConfig};

/// Default config file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Prefix for environment overrides, e.g. `CAPTRIVIA_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "CAPTRIVIA";

impl Config {
    /// Load configuration using the path given as first CLI argument,
    /// falling back to "config" (config.toml) in the working directory
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(&config_path(std::env::args()))
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false));
        Self::build(builder)
    }

    /// Apply defaults and environment overrides on top of the given sources
    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.show_headers", false)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.shutdown_timeout", 10)?
            .set_default(
                "http.server_name",
                concat!("captrivia/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if crate::logger::LogLevel::parse(&self.logging.level).is_none() {
            return Err(config::ConfigError::Message(format!(
                "Invalid logging.level '{}': expected error, warn, info or debug",
                self.logging.level
            )));
        }
        if self.server.workers == Some(0) {
            return Err(config::ConfigError::Message(
                "server.workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in defaults only, for tests
    #[cfg(test)]
    pub fn test_defaults() -> Self {
        let builder = config::Config::builder();
        Self::build(builder).expect("default configuration is valid")
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

/// Config file path from process arguments (program name first)
fn config_path(mut args: impl Iterator<Item = String>) -> String {
    args.nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that set `CAPTRIVIA_*` variables or assert on
    /// values those variables could override
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn load_toml(toml: &str) -> Result<Config, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        Config::build(builder)
    }

    #[test]
    fn test_defaults() {
        let _env = env_lock();
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.workers, None);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert!(cfg.http.enable_cors);
        assert_eq!(cfg.http.max_body_size, 1_048_576);
        assert!(cfg.http.server_name.starts_with("captrivia/"));
        assert!(cfg.routes.health.enabled);
        assert_eq!(cfg.routes.health.liveness_path, "/healthz");
        assert_eq!(cfg.performance.shutdown_timeout, 10);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let _env = env_lock();
        let cfg = load_toml(
            r#"
            [server]
            port = 9090
            workers = 2

            [logging]
            level = "debug"
            access_log_format = "json"

            [http]
            enable_cors = false

            [routes.health]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.workers, Some(2));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.access_log_format, "json");
        assert!(!cfg.http.enable_cors);
        assert!(!cfg.routes.health.enabled);
        // Unset keys in a partial table keep their defaults
        assert_eq!(cfg.routes.health.readiness_path, "/readyz");
    }

    #[test]
    fn test_invalid_level_rejected() {
        let err = load_toml("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(load_toml("[server]\nworkers = 0").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let _env = env_lock();
        let mut cfg = load_toml("").unwrap();
        assert_eq!(
            cfg.get_socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );

        cfg.server.host = "not a host".to_string();
        assert!(cfg.get_socket_addr().is_err());
    }

    #[test]
    fn test_env_overrides_file_and_defaults() {
        let _env = env_lock();
        std::env::set_var("CAPTRIVIA_SERVER__PORT", "9123");

        let from_file = load_toml("[server]\nport = 9090\nhost = \"0.0.0.0\"");
        let from_defaults = Config::load_from("/nonexistent/captrivia-config");

        std::env::remove_var("CAPTRIVIA_SERVER__PORT");

        let from_file = from_file.unwrap();
        assert_eq!(from_file.server.port, 9123);
        assert_eq!(from_file.server.host, "0.0.0.0");

        let from_defaults = from_defaults.unwrap();
        assert_eq!(from_defaults.server.port, 9123);
        assert_eq!(from_defaults.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_from_file_on_disk() {
        let _env = env_lock();
        let dir = std::env::temp_dir().join(format!("captrivia-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9191\n\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();

        // Extension is resolved by the loader
        let base = dir.join("server");
        let cfg = Config::load_from(base.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9191);
        assert_eq!(cfg.logging.level, "warn");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_path_from_args() {
        let args = |v: &[&str]| v.iter().map(ToString::to_string).collect::<Vec<_>>().into_iter();
        assert_eq!(config_path(args(&["captrivia"])), DEFAULT_CONFIG_PATH);
        assert_eq!(
            config_path(args(&["captrivia", "/etc/captrivia/prod"])),
            "/etc/captrivia/prod"
        );
    }
}
