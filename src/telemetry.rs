//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level`. Production emits JSON lines;
/// everything else uses the human-readable format. Returns false if a
/// subscriber was already installed.
pub fn init_tracing(config: &ServerConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.is_production() {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(environment = ?config.environment, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let config = ServerConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
