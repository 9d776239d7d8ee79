use crate::config::LogConfig;
use crate::error::ServiceResult;

/// Install the global `tracing` subscriber described by `config`.
///
/// Returns `Ok(false)` if a subscriber was already installed, which makes
/// repeated calls harmless.
pub fn init_logging(config: &LogConfig) -> ServiceResult<bool> {
    let level = config.level()?;
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn second_install_is_a_no_op() {
        let config = LogConfig {
            level: "warn".into(),
            ansi: false,
        };
        init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn bad_level_is_a_config_error() {
        let config = LogConfig {
            level: "chatty".into(),
            ansi: false,
        };
        assert!(matches!(init_logging(&config), Err(ServiceError::Config(_))));
    }
}
