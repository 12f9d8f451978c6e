//! Environment variable expansion for configuration strings.
//!
//! Supports:
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default

use crate::ConfigError;

/// Expand environment variable references in a string.
///
/// Returns the original string unchanged if no `${}` patterns are present.
/// Bare `$VAR` syntax is not expanded (only `${VAR}` with braces), so shell
/// snippets such as `$HOME` pass through untouched.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Error returned when environment variable lookup fails.
struct LookupError {
    var_name: String,
}
