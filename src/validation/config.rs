//! Configuration validation functions

use super::ValidationError;

/// Upper bound for the debounce window; anything longer stops being "short"
pub const MAX_DEBOUNCE_MS: u64 = 5_000;

/// Validate the watcher debounce window in milliseconds
pub fn validate_debounce_ms(debounce_ms: u64) -> Result<(), ValidationError> {
	if debounce_ms == 0 {
		return Err(ValidationError::ConfigError(
			"debounceMs must be greater than 0".to_string(),
		));
	}
	if debounce_ms > MAX_DEBOUNCE_MS {
		return Err(ValidationError::ConfigError(format!(
			"debounceMs too large: {} (max {})",
			debounce_ms, MAX_DEBOUNCE_MS
		)));
	}
	Ok(())
}

/// Validate the number of concurrent apply operations
pub fn validate_parallel_transfers(count: usize) -> Result<(), ValidationError> {
	if count == 0 {
		return Err(ValidationError::ConfigError(
			"parallelTransfers must be at least 1".to_string(),
		));
	}
	if count > 256 {
		return Err(ValidationError::ConfigError(format!(
			"parallelTransfers too high: {}",
			count
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate_debounce_ms() {
		assert!(validate_debounce_ms(50).is_ok());
		assert!(validate_debounce_ms(MAX_DEBOUNCE_MS).is_ok());

		let result = validate_debounce_ms(0);
		assert!(result.unwrap_err().to_string().contains("greater than 0"));
		assert!(validate_debounce_ms(MAX_DEBOUNCE_MS + 1).is_err());
	}

	#[test]
	fn test_validate_parallel_transfers() {
		assert!(validate_parallel_transfers(1).is_ok());
		assert!(validate_parallel_transfers(4).is_ok());
		assert!(validate_parallel_transfers(0).is_err());
		assert!(validate_parallel_transfers(1000).is_err());
	}
}
