use crate::image_reference::ImageReference;
use crate::model::ContainerUpdate;
use crate::secret_string::SecretString;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub updater: UpdaterSettings,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub registries: Vec<Registry>,
}

#[derive(Debug, Deserialize)]
pub struct UpdaterSettings {
    pub image: String,
    pub entrypoint: String,
    #[serde(default)]
    pub mounts: Vec<String>,
}

/// Timeouts in seconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    pub pull: u64,
    pub wait_deadline: u64,
    pub wait_attempt: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            pull: 5 * 60,
            wait_deadline: 10 * 60,
            wait_attempt: 5 * 60,
        }
    }
}

impl Timeouts {
    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull)
    }

    pub fn wait_deadline(&self) -> Duration {
        Duration::from_secs(self.wait_deadline)
    }

    pub fn wait_attempt(&self) -> Duration {
        Duration::from_secs(self.wait_attempt)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    pub hostname: String,
    pub username: Option<String>,
    pub token: SecretString,
}

impl Config {
    /// Registry credentials for the host an image is pulled from.
    pub fn find_registry_for_hostname(&self, hostname: &str) -> Option<&Registry> {
        self.registries
            .iter()
            .find(|registry| registry.hostname.eq_ignore_ascii_case(hostname))
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config: Config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;

    let updater_image = ImageReference::parse(&config.updater.image)
        .with_context(|| format!("Invalid updater image reference {}", config.updater.image))?;
    info!(
        "Updater image {} from registry {} at {}",
        updater_image.repository,
        updater_image.registry,
        updater_image
            .digest
            .as_deref()
            .or(updater_image.tag.as_deref())
            .unwrap_or("latest")
    );
    if config.updater.entrypoint.trim().is_empty() {
        anyhow::bail!("Updater entrypoint must not be empty");
    }
    let timeouts = config.timeouts;
    if timeouts.pull == 0 || timeouts.wait_deadline == 0 || timeouts.wait_attempt == 0 {
        anyhow::bail!("Timeouts must be at least one second, got {:?}", timeouts);
    }

    Ok(config)
}

/// Reads the resolved container updates to apply in this run.
pub fn load_updates<P: AsRef<Path>>(path: P) -> Result<Vec<ContainerUpdate>> {
    info!("Loading container updates from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read updates file: {}", path.as_ref().display()))?;

    let updates: Vec<ContainerUpdate> =
        serde_yaml_ng::from_str(&yaml_str).context("Failed to parse container updates YAML")?;

    if let Some(empty) = updates.iter().find(|update| update.names.is_empty()) {
        anyhow::bail!(
            "Container update for image {} does not name any container",
            empty.image.name_with_tag()
        );
    }

    Ok(updates)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error naming the first missing variable.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|var_name| env::var(var_name).is_err())
    {
        anyhow::bail!("Missing environment variable: {}", missing);
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}
