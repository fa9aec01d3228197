use std::sync::Arc;

use anyhow::Context;

use crate::{config::Config, logging::Logger, resolver::Resolver};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<Resolver>,
    pub logger: Logger,
}

impl AppState {
    pub fn initialize(config: Config, logger: Logger) -> anyhow::Result<Self> {
        let resolver = Resolver::from_config(&config, logger.clone())
            .context("failed to build resolver")?;
        Ok(Self::with_resolver(config, resolver, logger))
    }

    pub fn with_resolver(config: Config, resolver: Resolver, logger: Logger) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            logger,
        }
    }

    pub async fn ping_store(&self) -> anyhow::Result<()> {
        self.resolver.store().ping().await
    }
}
