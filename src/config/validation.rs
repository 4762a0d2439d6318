use crate::config::types::{ApiConfig, Config, InputConfig, OutputConfig, PipelineConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_storage_config(&config.storage)?;
    validate_input_config(&config.input)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates remote API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Validation("api_key cannot be empty".to_string()));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates document store configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if !is_sql_identifier(&config.collection) {
        return Err(ConfigError::Validation(format!(
            "collection must start with a letter or '_' and contain only alphanumerics and '_', got '{}'",
            config.collection
        )));
    }

    // The run history shares the database with the collection
    if config.collection.eq_ignore_ascii_case("runs") {
        return Err(ConfigError::Validation(
            "collection name 'runs' is reserved".to_string(),
        ));
    }

    Ok(())
}

/// Validates input configuration
fn validate_input_config(config: &InputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation("input path cannot be empty".to_string()));
    }
    Ok(())
}

/// Validates worker pool and throttle settings
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 256 {
        return Err(ConfigError::Validation(format!(
            "pool_size must be between 1 and 256, got {}",
            config.pool_size
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.batch_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "batch_delay_ms must be >= 1".to_string(),
        ));
    }

    if config.cooldown_ms < 1 {
        return Err(ConfigError::Validation("cooldown_ms must be >= 1".to_string()));
    }

    if config.cooldown_ms > config.max_cooldown_ms {
        return Err(ConfigError::Validation(format!(
            "cooldown_ms ({}) cannot exceed max_cooldown_ms ({})",
            config.cooldown_ms, config.max_cooldown_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Collection names end up interpolated into SQL, so only plain identifiers pass
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
