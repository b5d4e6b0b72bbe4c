//! Invoker configuration

use serde::{Deserialize, Serialize};

/// Top-level configuration for an [`Invoker`](crate::Invoker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Master switch. When off, every entry point returns the inert envelope.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Integrations (by name) that are never dispatched.
    #[serde(default)]
    pub disabled_integrations: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_integrations: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of plain text.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            timestamps: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl InvokerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CALLTARGET_*` environment variables (`CALLTARGET_ENABLED=false`,
    /// `CALLTARGET_DISABLED_INTEGRATIONS=redis,grpc`,
    /// `CALLTARGET_LOGGING__LEVEL=debug`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&InvokerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CALLTARGET")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("disabled_integrations")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn is_integration_enabled(&self, name: &str) -> bool {
        self.enabled && !self.disabled_integrations.iter().any(|n| n == name)
    }
}
