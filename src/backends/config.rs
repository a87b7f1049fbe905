//! Reading backend settings from `TEST_<BACKEND>_*` environment variables.

use crate::error::ContainerError;

/// Builds the variable name for a backend setting, e.g. `TEST_REDIS_HOST`.
pub fn env_key(kind: &str, field: &str) -> String {
    format!("TEST_{}_{}", kind.to_uppercase(), field)
}

/// Reads one backend's settings through an injectable lookup.
pub struct EnvReader<F> {
    kind: &'static str,
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(kind: &'static str, lookup: F) -> Self {
        Self { kind, lookup }
    }

    /// Raw lookup of an arbitrary, unprefixed variable.
    pub fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    pub fn get(&self, field: &str) -> Option<String> {
        self.raw(&env_key(self.kind, field))
    }

    /// True when `TEST_<KIND>_HOST` is set, meaning no container is launched.
    pub fn has_explicit_host(&self) -> bool {
        self.get("HOST").is_some()
    }

    pub fn string(&self, field: &str, default: &str) -> String {
        self.get(field).unwrap_or_else(|| default.to_string())
    }

    /// Parses a port setting.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::Config` when the variable is not a valid port.
    pub fn port(&self, field: &str, default: u16) -> Result<u16, ContainerError> {
        match self.get(field) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e| {
                ContainerError::Config(format!(
                    "{} must be a port number, got '{}': {}",
                    env_key(self.kind, field),
                    value,
                    e
                ))
            }),
        }
    }
}

/// Lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
pub(crate) fn lookup_from(
    pairs: &[(&str, &str)],
) -> impl Fn(&str) -> Option<String> + 'static {
    let map: std::collections::HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}
