use crate::config::Config;
use crate::error::{ConfigurationError, PullError, RebuildError};
use crate::image_reference::ImageReference;
use crate::model::{ContainerUpdate, ImageUpdate, RebuildPhase, RebuildReport, distinct_in_order};
use crate::mounts::{Bind, parse_mounts};
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::wait::{WaitOutcome, await_exit};
use chrono::Utc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

/// Pulls base images and hands the affected containers to the updater container.
pub struct DockerUpdater<R> {
    runtime: R,
    config: Config,
    binds: Vec<Bind>,
}

impl<R: ContainerRuntime> DockerUpdater<R> {
    /// Fails on malformed mounts, before the runtime is ever called.
    pub fn new(runtime: R, config: Config) -> Result<Self, ConfigurationError> {
        let binds = parse_mounts(&config.updater.mounts)?;
        Ok(Self {
            runtime,
            config,
            binds,
        })
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub async fn update_base_image(&self, update: &ImageUpdate) -> Result<(), PullError> {
        let image = update.name_with_tag();
        info!(
            "Updating base image {} for {:?}",
            image, update.source_image_names
        );

        let registry = match ImageReference::parse(&update.name) {
            Ok(reference) => self.config.find_registry_for_hostname(&reference.registry),
            Err(e) => {
                debug!("Pulling {} anonymously, could not determine its registry: {}", image, e);
                None
            }
        };

        let ceiling = self.config.timeouts.pull();
        match timeout(
            ceiling,
            self.runtime.pull_image(&update.name, &update.tag, registry),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(PullError::Runtime { image, source }),
            Err(_) => Err(PullError::Timeout {
                image,
                seconds: ceiling.as_secs(),
            }),
        }
    }

    pub async fn rebuild_containers(
        &self,
        updates: &[ContainerUpdate],
    ) -> Result<RebuildReport, RebuildError> {
        info!("Rebuilding {} containers", updates.len());
        let mut report = RebuildReport::default();
        if updates.is_empty() {
            return Ok(report);
        }
        let mut phase = RebuildPhase::Idle;

        enter(&mut phase, RebuildPhase::PullingImages);
        for image in distinct_in_order(updates.iter().map(|update| update.image.clone())) {
            match self.update_base_image(&image).await {
                Ok(()) => report.pulled_images.push(image.name_with_tag()),
                Err(e) => {
                    warn!(
                        "Failed to update base image, rebuilding against the cached one: {}",
                        e
                    );
                    report.failed_pulls.push(image.name_with_tag());
                }
            }
        }

        enter(&mut phase, RebuildPhase::CreatingUpdater);
        let spec = ContainerSpec {
            image: self.config.updater.image.clone(),
            binds: self.binds.iter().map(Bind::to_string).collect(),
            cmd: self.updater_command(updates),
        };
        debug!("Creating updater container with command {:?}", spec.cmd);
        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|source| RebuildError::Runtime {
                action: "created",
                source,
            })?;
        info!("Started updater has ID {}", container_id);
        report.updater_container = Some(container_id.clone());

        // The wait deadline counts from the start request, not from its completion
        let wait_deadline = self.config.timeouts.wait_deadline();
        let started = Instant::now();
        let started_wall = Utc::now();

        enter(&mut phase, RebuildPhase::Starting);
        if let Err(source) = self.runtime.start_container(&container_id).await {
            warn!(
                "Updater container {} could not be started and is left behind: {}",
                container_id, source
            );
            return Err(RebuildError::Container {
                container_id,
                action: "started",
                source,
            });
        }

        enter(&mut phase, RebuildPhase::Waiting);
        if let Ok(remaining) = chrono::Duration::from_std(wait_deadline) {
            info!(
                "Waiting for updater container {} until {}",
                container_id,
                (started_wall + remaining).to_rfc3339()
            );
        }
        let outcome = match await_exit(
            &self.runtime,
            &container_id,
            started + wait_deadline,
            self.config.timeouts.wait_attempt(),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(source) => {
                return Err(RebuildError::Container {
                    container_id,
                    action: "awaited",
                    source,
                });
            }
        };

        match outcome {
            WaitOutcome::Exited(code) => {
                if code != 0 {
                    warn!("Rebuild failed with exit code {}", code);
                }
                report.exit_code = Some(code);
                if let Err(source) = self.runtime.remove_container(&container_id).await {
                    return Err(RebuildError::Container {
                        container_id,
                        action: "removed",
                        source,
                    });
                }
                enter(&mut phase, RebuildPhase::Completed);
                Ok(report)
            }
            WaitOutcome::DeadlineElapsed => {
                enter(&mut phase, RebuildPhase::TimedOut);
                error!(
                    "Updater container {} did not exit within {}s, leaving it behind",
                    container_id,
                    wait_deadline.as_secs()
                );
                Err(RebuildError::Timeout { container_id })
            }
        }
    }

    /// `[entrypoint, names...]` with every container name once, in first-seen order.
    fn updater_command(&self, updates: &[ContainerUpdate]) -> Vec<String> {
        let names = distinct_in_order(updates.iter().flat_map(|update| update.names.iter().cloned()));
        std::iter::once(self.config.updater.entrypoint.clone())
            .chain(names)
            .collect()
    }
}

fn enter(phase: &mut RebuildPhase, next: RebuildPhase) {
    debug!("Rebuild {} -> {}", phase, next);
    *phase = next;
}
