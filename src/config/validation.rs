use crate::error::EngineError;
use crate::protocol::canonical::Vendor;

use super::EngineConfig;

const MAX_RETRIES_CEILING: u32 = 20;
const MAX_CALL_DEPTH_CEILING: u32 = 100;

/// Reject configurations that would misbehave at runtime.
///
/// # Errors
///
/// Returns [`EngineError::Config`] naming the first offending field.
pub fn validate_config(config: &EngineConfig) -> Result<(), EngineError> {
    if config.connect_timeout_secs == 0 {
        return Err(EngineError::Config(
            "connect_timeout_secs must be at least 1".into(),
        ));
    }
    if config.read_timeout_secs == 0 {
        return Err(EngineError::Config(
            "read_timeout_secs must be at least 1".into(),
        ));
    }
    if config.write_timeout_secs == 0 {
        return Err(EngineError::Config(
            "write_timeout_secs must be at least 1".into(),
        ));
    }
    if config.max_retries > MAX_RETRIES_CEILING {
        return Err(EngineError::Config(format!(
            "max_retries must be at most {MAX_RETRIES_CEILING}"
        )));
    }
    if config.max_call_depth == 0 || config.max_call_depth > MAX_CALL_DEPTH_CEILING {
        return Err(EngineError::Config(format!(
            "max_call_depth must be between 1 and {MAX_CALL_DEPTH_CEILING}"
        )));
    }

    let known: Vec<&str> = Vendor::ALL.iter().map(|v| v.as_str()).collect();
    for (name, vendor) in &config.vendors {
        if !known.contains(&name.as_str()) {
            return Err(EngineError::Config(format!(
                "unknown vendor '{name}' in config (known: {})",
                known.join(", ")
            )));
        }
        if let Some(base_url) = vendor.base_url.as_deref() {
            url::Url::parse(base_url).map_err(|err| {
                EngineError::Config(format!("invalid base_url for vendor '{name}': {err}"))
            })?;
        }
    }

    Ok(())
}
