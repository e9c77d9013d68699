use crate::config::{Config, ProbeStrategy, ServerSpec};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Validates a single server spec
pub fn validate_server_spec(spec: &ServerSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server with empty name".to_string()));
    }

    if spec.command.trim().is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has empty command",
            spec.name
        )));
    }

    // Whether the command is executable is only known at launch time.

    if let ProbeStrategy::Http { url, timeout_secs } = &spec.health {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            Error::ConfigInvalid(format!(
                "Server '{}' has invalid health URL '{}': {}",
                spec.name, url, e
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' health URL must be http or https, got '{}'",
                spec.name,
                parsed.scheme()
            )));
        }
        if *timeout_secs == Some(0) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' has a zero probe timeout",
                spec.name
            )));
        }
    }

    Ok(())
}

/// Validates the server list: non-empty, unique names, distinct log files
pub fn validate_server_specs(specs: &[ServerSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::ConfigInvalid("No servers configured".to_string()));
    }

    let mut names = HashSet::new();
    let mut log_paths = HashSet::new();

    for spec in specs {
        validate_server_spec(spec)?;

        if !names.insert(spec.name.as_str()) {
            return Err(Error::DuplicateServer(spec.name.clone()));
        }

        if !log_paths.insert(spec.log_path.as_path()) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' shares log file {} with another server",
                spec.name,
                spec.log_path.display()
            )));
        }
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_specs(&config.servers)?;

    if config.monitor.probe_timeout_secs == 0 {
        return Err(Error::ConfigInvalid(
            "monitor.probeTimeoutSecs must be greater than zero".to_string(),
        ));
    }
    if config.monitor.interval_secs == 0 {
        return Err(Error::ConfigInvalid(
            "monitor.intervalSecs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
