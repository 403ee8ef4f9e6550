//! # NOS Runtime
//!
//! Assembles the controller's event core:
//!
//! 1. Build the infrastructure and application engines from [`RuntimeConfig`].
//! 2. Register the built-in subscribers (`log`, `apphdlr`, `appint`).
//! 3. Load subscriber descriptors from the registry file, if any.
//! 4. Bind the pull/reply endpoints and activate local subscribers.
//!
//! The binary in `main.rs` drives this until interrupted.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod components;
pub mod config;
pub mod logging;

pub use components::{AlertLog, LogSink};
pub use config::{ConfigError, LoggingConfig, RegistryFile, RuntimeConfig};

use nos_bus::gateway::{APPHDLR, APPINT};
use nos_bus::{AppEngine, EventHandler, Gateway, InfraEngine, TransportError};
use nos_types::{AppEvent, EventClass, InfraEvent, RegistryError, SubscriberConfig};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors assembling or starting the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid {} registry: {source}", .class.tag())]
    Registry {
        class: EventClass,
        #[source]
        source: RegistryError,
    },

    #[error("Cannot start {} endpoints: {source}", .class.tag())]
    Transport {
        class: EventClass,
        #[source]
        source: TransportError,
    },
}

/// Append `builtin` unless a descriptor with the same name is present.
fn with_builtin(mut configs: Vec<SubscriberConfig>, builtin: SubscriberConfig) -> Vec<SubscriberConfig> {
    if !configs.iter().any(|c| c.name == builtin.name) {
        configs.push(builtin);
    }
    configs
}

/// Descriptors for both buses: the registry file plus the built-ins.
pub fn descriptors(
    file: RegistryFile,
) -> (Vec<SubscriberConfig>, Vec<SubscriberConfig>) {
    let infra = with_builtin(file.components, LogSink::subscriber());
    let infra = with_builtin(infra, Gateway::infra_subscriber());
    let app = with_builtin(file.applications, Gateway::app_subscriber());
    (infra, app)
}

/// The running event core.
pub struct NosRuntime {
    config: RuntimeConfig,
    infra: Arc<InfraEngine>,
    app: Arc<AppEngine>,
    log: Arc<LogSink>,
    alerts: Arc<AlertLog>,
}

impl NosRuntime {
    /// Build both engines and load their registries from the configured
    /// registry file, if any.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let file = match &config.registry_file {
            Some(path) => {
                info!("[runtime] Loading subscribers from {}", path.display());
                RegistryFile::load(path)?
            }
            None => RegistryFile::default(),
        };
        Self::with_registry(config, file, Vec::new(), Vec::new())
    }

    /// Build both engines with in-process handlers for local components
    /// and applications, registered before the first reload.
    pub fn with_registry(
        config: RuntimeConfig,
        file: RegistryFile,
        components: Vec<(String, Arc<dyn EventHandler<InfraEvent>>)>,
        applications: Vec<(String, Arc<dyn EventHandler<AppEvent>>)>,
    ) -> Result<Self, RuntimeError> {
        info!("[runtime] Creating NOS event core");

        let alerts = Arc::new(AlertLog::default());
        let infra = Arc::new(InfraEngine::new(config.infra.clone()).with_meta_action(alerts.clone()));
        let app = Arc::new(AppEngine::new(config.app.clone()).with_meta_action(alerts.clone()));

        Gateway::attach(&infra, &app);
        let log = LogSink::attach(&infra);
        for (name, handler) in components {
            infra.register_handler(name, handler);
        }
        for (name, handler) in applications {
            app.register_handler(name, handler);
        }

        let (infra_configs, app_configs) = descriptors(file);

        infra
            .reload(&infra_configs)
            .map_err(|source| RuntimeError::Registry {
                class: EventClass::Infrastructure,
                source,
            })?;
        app.reload(&app_configs)
            .map_err(|source| RuntimeError::Registry {
                class: EventClass::Application,
                source,
            })?;

        Ok(Self {
            config,
            infra,
            app,
            log,
            alerts,
        })
    }

    /// Bind endpoints and activate every enabled local subscriber.
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.infra.start().map_err(|source| RuntimeError::Transport {
            class: EventClass::Infrastructure,
            source,
        })?;
        if let Err(source) = self.app.start() {
            self.infra.shutdown();
            return Err(RuntimeError::Transport {
                class: EventClass::Application,
                source,
            });
        }

        let components = self.infra.start_all();
        let applications = self.app.start_all();

        let infra_ep = self.infra.bound_endpoints();
        let app_ep = self.app.bound_endpoints();
        info!(
            "[runtime] Infrastructure bus: pull {:?}, reply {:?}, {} local components active",
            infra_ep.pull, infra_ep.reply, components
        );
        info!(
            "[runtime] Application bus: pull {:?}, reply {:?}, {} local applications active",
            app_ep.pull, app_ep.reply, applications
        );
        Ok(())
    }

    /// Stop applications first, then the infrastructure below them.
    pub fn shutdown(&self) {
        info!("[runtime] Shutting down");
        self.app.shutdown();
        self.infra.shutdown();
        info!("[runtime] Shutdown complete");
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn infra(&self) -> &Arc<InfraEngine> {
        &self.infra
    }

    #[must_use]
    pub fn app(&self) -> &Arc<AppEngine> {
        &self.app
    }

    #[must_use]
    pub fn log_sink(&self) -> &Arc<LogSink> {
        &self.log
    }

    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertLog> {
        &self.alerts
    }

    /// Names of the built-in subscribers.
    #[must_use]
    pub fn builtins() -> [&'static str; 3] {
        [components::LOG, APPHDLR, APPINT]
    }
}
