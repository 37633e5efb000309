//! `${VAR}` and `${VAR:-fallback}` substitution in raw configuration text.

use crate::ConfigError;
use regex::{Captures, Regex};

/// Largest configuration text accepted for substitution.
const MAX_CONFIG_BYTES: usize = 1024 * 1024;

/// Upper-case variable name with an optional `:-` fallback.
const PLACEHOLDER: &str =
	r"\$\{(?P<name>[A-Z_][A-Z0-9_]{0,127})(?::-(?P<fallback>[^}]{0,256}))?\}";

/// Replaces every placeholder with the named environment variable, or with
/// its fallback when the variable is unset. An unset variable without a
/// fallback is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let placeholder = Regex::new(PLACEHOLDER)
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut unset: Option<String> = None;
	let output = placeholder.replace_all(input, |caps: &Captures| {
		let name = &caps["name"];
		match (std::env::var(name), caps.name("fallback")) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => {
				unset.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match unset {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' is not set and has no default",
			name
		))),
		None => Ok(output.into_owned()),
	}
}
