use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A base image that should be refreshed to `name:tag`.
///
/// Two updates are the same image when name and tag match, regardless of
/// which source images they supersede.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpdate {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub source_image_names: BTreeSet<String>,
}

impl ImageUpdate {
    pub fn name_with_tag(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl PartialEq for ImageUpdate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.tag == other.tag
    }
}

impl Eq for ImageUpdate {}

impl Hash for ImageUpdate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.tag.hash(state);
    }
}

/// One or more containers to recreate on top of `image`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerUpdate {
    pub image: ImageUpdate,
    pub names: Vec<String>,
}

/// Outcome of a rebuild that reached the runtime and got an exit status back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub pulled_images: Vec<String>,
    pub failed_pulls: Vec<String>,
    pub updater_container: Option<String>,
    pub exit_code: Option<i64>,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.failed_pulls.is_empty() && self.exit_code.is_none_or(|code| code == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    Idle,
    PullingImages,
    CreatingUpdater,
    Starting,
    Waiting,
    Completed,
    TimedOut,
}

impl fmt::Display for RebuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildPhase::Idle => "idle",
            RebuildPhase::PullingImages => "pulling-images",
            RebuildPhase::CreatingUpdater => "creating-updater",
            RebuildPhase::Starting => "starting",
            RebuildPhase::Waiting => "waiting",
            RebuildPhase::Completed => "completed",
            RebuildPhase::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Keeps the first occurrence of every item, in input order.
pub fn distinct_in_order<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
