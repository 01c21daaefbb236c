use crate::error::ConfigurationError;
use std::fmt;

/// A host directory bound into the updater container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub source: String,
    pub destination: String,
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.destination)
    }
}

/// Translates `source:dest` strings into binds, preserving order.
pub fn parse_mounts<S: AsRef<str>>(raw_mounts: &[S]) -> Result<Vec<Bind>, ConfigurationError> {
    raw_mounts.iter().map(|m| parse_mount(m.as_ref())).collect()
}

fn parse_mount(mount: &str) -> Result<Bind, ConfigurationError> {
    match mount.split(':').collect::<Vec<&str>>()[..] {
        [source, destination] if !source.is_empty() && !destination.is_empty() => Ok(Bind {
            source: source.to_string(),
            destination: destination.to_string(),
        }),
        _ => Err(ConfigurationError::MalformedMount {
            mount: mount.to_string(),
        }),
    }
}
