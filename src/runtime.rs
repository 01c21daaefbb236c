use crate::config::Registry;
use crate::error::RuntimeError;
use anyhow::Context;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use futures::StreamExt;
use std::pin::pin;
use tracing::{debug, info, warn};

/// What the updater container is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub binds: Vec<String>,
    pub cmd: Vec<String>,
}

/// The slice of a container engine the updater needs.
pub trait ContainerRuntime {
    /// Pulls `name:tag`, resolving once the pull has finished.
    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
        registry: Option<&Registry>,
    ) -> Result<(), RuntimeError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Resolves with the exit code once the container stopped. Non-zero codes are not errors.
    async fn wait_container(&self, container_id: &str) -> Result<i64, RuntimeError>;

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError>;
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Sets up the client from `DOCKER_HOST` or the local socket. Does not contact the daemon.
    pub fn connect() -> anyhow::Result<Self> {
        info!("Initializing Docker client");
        let docker =
            Docker::connect_with_local_defaults().context("Failed to set up Docker client")?;
        Ok(Self { docker })
    }

    pub async fn log_server_version(&self) -> anyhow::Result<()> {
        let version = self
            .docker
            .version()
            .await
            .context("Failed to reach Docker daemon")?;
        info!(
            "Connected to Docker daemon with version {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        );
        Ok(())
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
        registry: Option<&Registry>,
    ) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: name,
            tag,
            ..Default::default()
        };
        let credentials = registry.map(|registry| DockerCredentials {
            username: registry.username.clone(),
            password: Some(registry.token.expose_secret().to_string()),
            serveraddress: Some(registry.hostname.clone()),
            ..Default::default()
        });

        let mut progress = pin!(self.docker.create_image(Some(options), None, credentials));
        while let Some(info) = progress.next().await {
            let info = info.map_err(classify)?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Failed(error));
            }
            if let Some(status) = info.status {
                debug!("Pull {}:{}: {}", name, tag, status);
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(classify)?;
        for warning in &response.warnings {
            warn!("Docker warned while creating container {}: {}", response.id, warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64, RuntimeError> {
        let mut exits = pin!(
            self.docker
                .wait_container(container_id, None::<WaitContainerOptions<String>>)
        );

        match exits.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(classify(err)),
            None => Err(RuntimeError::Transient(format!(
                "wait stream for container {} ended without an exit status",
                container_id
            ))),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(classify)
    }
}

fn classify(err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } if status_code >= 500 => {
            RuntimeError::Transient(format!("daemon responded {}: {}", status_code, message))
        }
        DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }
        | DockerError::RequestTimeoutError => RuntimeError::Transient(err.to_string()),
        _ => RuntimeError::Failed(err.to_string()),
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Pull {
            image: String,
            username: Option<String>,
        },
        Create(ContainerSpec),
        Start(String),
        Wait(String),
        Remove(String),
    }

    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        Exit(i64),
        Transient,
        Fail,
        Hang,
    }

    pub const CONTAINER_ID: &str = "updater-0001";

    /// Records every call; wait and pull behaviour is scripted per test.
    pub struct FakeRuntime {
        calls: Mutex<Vec<Call>>,
        wait_steps: Mutex<VecDeque<Step>>,
        wait_fallback: Step,
        pull_steps: HashMap<String, Step>,
        fail_create: bool,
        fail_start: bool,
        fail_remove: bool,
        start_delay: Duration,
    }

    impl Default for FakeRuntime {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                wait_steps: Mutex::new(VecDeque::new()),
                wait_fallback: Step::Hang,
                pull_steps: HashMap::new(),
                fail_create: false,
                fail_start: false,
                fail_remove: false,
                start_delay: Duration::ZERO,
            }
        }
    }

    impl FakeRuntime {
        /// Scripts consecutive wait results; once exhausted every wait hangs.
        pub fn with_wait_steps(steps: &[Step]) -> Self {
            Self {
                wait_steps: Mutex::new(steps.iter().copied().collect()),
                ..Default::default()
            }
        }

        pub fn wait_fallback(mut self, step: Step) -> Self {
            self.wait_fallback = step;
            self
        }

        pub fn pull_step(mut self, image: &str, step: Step) -> Self {
            self.pull_steps.insert(image.to_string(), step);
            self
        }

        pub fn failing_create(mut self) -> Self {
            self.fail_create = true;
            self
        }

        pub fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        pub fn failing_remove(mut self) -> Self {
            self.fail_remove = true;
            self
        }

        /// Start requests take `delay` before they return.
        pub fn slow_start(mut self, delay: Duration) -> Self {
            self.start_delay = delay;
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|call| matches(call)).count()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        async fn play(step: Step) -> Result<i64, RuntimeError> {
            match step {
                Step::Exit(code) => Ok(code),
                Step::Transient => Err(RuntimeError::Transient("connection reset".to_string())),
                Step::Fail => Err(RuntimeError::Failed("no such container".to_string())),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    impl ContainerRuntime for FakeRuntime {
        async fn pull_image(
            &self,
            name: &str,
            tag: &str,
            registry: Option<&Registry>,
        ) -> Result<(), RuntimeError> {
            let image = format!("{}:{}", name, tag);
            self.record(Call::Pull {
                image: image.clone(),
                username: registry.and_then(|r| r.username.clone()),
            });
            match self.pull_steps.get(&image) {
                Some(step) => Self::play(*step).await.map(|_| ()),
                None => Ok(()),
            }
        }

        async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
            self.record(Call::Create(spec.clone()));
            if self.fail_create {
                return Err(RuntimeError::Failed("image not found".to_string()));
            }
            Ok(CONTAINER_ID.to_string())
        }

        async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
            self.record(Call::Start(container_id.to_string()));
            tokio::time::sleep(self.start_delay).await;
            if self.fail_start {
                return Err(RuntimeError::Failed("port already allocated".to_string()));
            }
            Ok(())
        }

        async fn wait_container(&self, container_id: &str) -> Result<i64, RuntimeError> {
            self.record(Call::Wait(container_id.to_string()));
            let step = self
                .wait_steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.wait_fallback);
            Self::play(step).await
        }

        async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
            self.record(Call::Remove(container_id.to_string()));
            if self.fail_remove {
                return Err(RuntimeError::Failed("removal already in progress".to_string()));
            }
            Ok(())
        }
    }
}
