//! Environment source: `CKPTIO_<KEY>` overrides any file or default value.

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "CKPTIO_";

/// Name of the environment variable that overrides `key`.
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
}

/// Value of the override for `key`, if set and valid unicode.
pub fn env_override(key: &str) -> Option<String> {
    std::env::var(env_var_name(key)).ok()
}
