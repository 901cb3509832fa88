//! Step handler: carries out pipeline operations.
//!
//! Resource lifecycle goes through provider adapters; everything else runs
//! over SSH. Host and app records are read from the record store at the
//! time each step runs, so a step sees the address recorded by the create
//! step before it.

use anyhow::{Context, Result, bail};
use reconcile::{BatchStep, ResourceDescriptor, ResourceKind, StepHandler, StepOutcome};
use serde_json::{Value, json};
use sshkit::RemoteExecutor;
use std::sync::Arc;
use vpskit::{CreateRequest, ProviderAdapter, ProviderRegistry};

use crate::app::{self, AppConfig};
use crate::caddy;
use crate::config::DevboxConfig;
use crate::credential::{self, Credential};
use crate::desired::vhosts_of;
use crate::pipeline::Op;
use crate::scripts;
use crate::store::RecordStore;

const ROOT: &str = "root";

pub struct DevboxHandler {
    registry: ProviderRegistry,
    config: DevboxConfig,
    executor: RemoteExecutor,
    store: Arc<dyn RecordStore>,
    credential: Credential,
    login: String,
}

impl DevboxHandler {
    pub fn new(
        registry: ProviderRegistry,
        config: DevboxConfig,
        executor: RemoteExecutor,
        store: Arc<dyn RecordStore>,
        credential: Credential,
    ) -> Self {
        let login = app::normalize_name(&config.operator.id);
        Self {
            registry,
            config,
            executor,
            store,
            credential,
            login,
        }
    }

    /// Remote login name of the operator
    pub fn login(&self) -> &str {
        &self.login
    }

    fn adapter(&self, provider: &str) -> Result<Box<dyn ProviderAdapter>> {
        let settings = self.config.provider_settings(provider);
        Ok(self.registry.create(provider, &settings)?)
    }

    fn record(&self, id: &str) -> Result<ResourceDescriptor> {
        self.store
            .get(id)
            .with_context(|| format!("No record for {id}"))
    }

    /// Address of a host that exists
    fn address_of(&self, host: &ResourceDescriptor) -> Result<String> {
        let observed = match &host.observed_state {
            Some(observed) if host.exists_remotely() => observed,
            _ => bail!("{} has not been created yet", host.id),
        };
        self.adapter(&host.provider_key)?
            .public_address(observed)
            .with_context(|| format!("No public address recorded for {}", host.id))
    }

    fn run_remote(&self, host_id: &str, user: &str, commands: &[String]) -> Result<StepOutcome> {
        let host = self.record(host_id)?;
        let address = self.address_of(&host)?;
        self.executor
            .run_many(&address, user, &self.credential.private_key, commands)?;
        Ok(StepOutcome::done())
    }

    fn as_root(&self, host_id: &str, command: impl Into<String>) -> Result<StepOutcome> {
        self.run_remote(host_id, ROOT, &[command.into()])
    }

    // ========================================================================
    // Host lifecycle
    // ========================================================================

    fn create_host(&self, id: &str) -> Result<StepOutcome> {
        let resource = self.record(id)?;
        let adapter = self.adapter(&resource.provider_key)?;

        let request = if resource.kind == ResourceKind::Manual {
            let ip = resource
                .config_str("ip")
                .with_context(|| format!("Manual host {id} has no ip"))?;
            CreateRequest::new(id, "").with_address(ip)
        } else {
            let server_type = resource
                .config_str("server_type")
                .with_context(|| format!("VPS {id} has no server_type"))?;
            let handle = adapter.upload_key(
                self.store.as_ref(),
                &credential::key_name(&self.config.operator.id),
                &self.credential.public_key,
            )?;
            CreateRequest::new(id, server_type)
                .with_key(&self.credential.public_key, Some(handle))
        };

        let observed = match adapter.create(resource.known_remote(), &request) {
            Ok(observed) => observed,
            Err(e) => {
                if let Some(server) = e.unfinished_server() {
                    log::warn!(
                        "{id} exists at {} but is not ready; the next apply resumes it",
                        adapter.key()
                    );
                    self.store.set(id, "pending_state", server.clone())?;
                    self.store.save()?;
                }
                return Err(e.into());
            }
        };
        let address = adapter.public_address(&observed);
        self.store.set(id, "observed_state", observed)?;
        self.store.set(id, "pending_state", Value::Null)?;
        self.store.save()?;

        Ok(StepOutcome::Done { detail: address })
    }

    fn delete_host(&self, id: &str) -> Result<StepOutcome> {
        let Some(resource) = self.store.get(id) else {
            return Ok(StepOutcome::Skipped {
                reason: format!("no record for {id}"),
            });
        };

        match resource.known_remote() {
            Some(remote) if !resource.is_externally_managed() => {
                match self.adapter(&resource.provider_key)?.delete(remote) {
                    Ok(()) => {}
                    Err(e) if e.is_ignorable() => {
                        log::warn!("{} already gone at {}: {}", id, resource.provider_key, e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ => log::info!("{} has nothing to delete remotely", id),
        }

        self.store.remove(id);
        self.store.save()?;
        Ok(StepOutcome::done())
    }

    // ========================================================================
    // Apps
    // ========================================================================

    fn create_app(&self, host_id: &str, app_id: &str) -> Result<StepOutcome> {
        let resource = self.record(app_id)?;
        let config = AppConfig::from_descriptor(&resource)?;
        let command = app::run_command(app_id, &config);

        self.run_remote(host_id, &self.login, &[command])?;

        let container = app::normalize_name(app_id);
        self.store.set(
            app_id,
            "observed_state",
            json!({ "container": container, "host": host_id }),
        )?;
        self.store.save()?;
        Ok(StepOutcome::Done {
            detail: Some(container),
        })
    }

    /// Teardown never blocks the host's own deletion
    fn delete_app(&self, host_id: &str, app_id: &str, cleanup: bool) -> Result<StepOutcome> {
        if self.store.get(host_id).is_none_or(|h| !h.exists_remotely()) {
            if !cleanup {
                self.store.remove(app_id);
                self.store.save()?;
            }
            return Ok(StepOutcome::Skipped {
                reason: format!("host {host_id} no longer exists"),
            });
        }

        let command = if cleanup {
            app::cleanup_command(app_id)
        } else {
            app::teardown_command(app_id)
        };

        if let Err(e) = self.run_remote(host_id, &self.login, &[command]) {
            return Ok(StepOutcome::Failed {
                error: format!("{e:#}"),
                blocking: false,
            });
        }

        if !cleanup {
            self.store.remove(app_id);
            self.store.save()?;
        }
        Ok(StepOutcome::done())
    }
}

impl StepHandler<Op> for DevboxHandler {
    fn run_step(&self, step: &BatchStep<Op>) -> Result<StepOutcome> {
        let id = step.resource_id.as_str();
        match &step.operation {
            Op::CreateVps | Op::RegisterHost => self.create_host(id),
            Op::UpdatePackages => self.as_root(id, scripts::UPDATE_PACKAGES),
            Op::UpgradePackages => self.as_root(id, scripts::UPGRADE_PACKAGES),
            Op::HardenSsh => self.as_root(id, scripts::HARDEN_SSH),
            Op::InstallShell => self.as_root(id, scripts::INSTALL_OH_MY_BASH),
            Op::InstallDocker => self.as_root(id, scripts::INSTALL_DOCKER),
            Op::CreateUser => {
                self.as_root(id, scripts::create_user(&self.login, &self.credential.public_key))
            }
            Op::InstallDevEnv => self.as_root(id, scripts::INSTALL_DDEV),
            Op::InstallProxy => self.run_remote(
                id,
                ROOT,
                &caddy::install_commands(&self.config.operator, &self.config.proxy),
            ),
            Op::SyncVhosts => {
                let vhosts = vhosts_of(&self.record(id)?)?;
                self.run_remote(id, ROOT, &caddy::vhost_commands(&vhosts))
            }
            Op::DeleteVps => self.delete_host(id),
            Op::CreateApp(app_id) => self.create_app(id, app_id),
            Op::DeleteApp(app_id) => self.delete_app(id, app_id, false),
            Op::CleanupApp(app_id) => self.delete_app(id, app_id, true),
        }
    }

    fn is_blocking(&self, error: &anyhow::Error) -> bool {
        error
            .downcast_ref::<sshkit::Error>()
            .is_some_and(sshkit::Error::is_blocking)
    }
}
