// session.rs — The active workspace and the concrete store/provider behind it.

use std::path::PathBuf;

use anyhow::Context;
use wl_review::{DoltHubProvider, GitHubProvider, ReviewProvider};
use wl_store::DoltStore;
use wl_workspace::{
    registry_path, Board, MutationOptions, ProviderType, WorkspaceConfig, WorkspaceRegistry,
};

use super::stderr_progress;

/// Token for the DoltHub REST API.
pub const DOLTHUB_TOKEN_ENV: &str = "DOLTHUB_TOKEN";

pub struct Session {
    registry_path: PathBuf,
    registry: WorkspaceRegistry,
    pub config: WorkspaceConfig,
    pub store: DoltStore,
    provider: Box<dyn ReviewProvider>,
}

impl Session {
    /// Resolve the workspace named by `--commons` (or the only joined one).
    pub fn open(commons: Option<&str>) -> anyhow::Result<Self> {
        let registry_path = registry_path()?;
        let registry = WorkspaceRegistry::load(&registry_path)?;
        let config = registry.resolve(commons)?.clone();
        tracing::debug!(
            "workspace {} ({} mode) at {}",
            config.upstream,
            config.mode,
            config.local_dir.display()
        );
        let store = DoltStore::new(&config.local_dir).with_signing(config.signing);
        let provider = provider_for(config.provider)?;
        Ok(Self {
            registry_path,
            registry,
            config,
            store,
            provider,
        })
    }

    pub fn board(&self, no_push: bool) -> Board<'_> {
        Board::new(&self.store, &self.config)
            .with_provider(Some(self.provider.as_ref()))
            .with_options(MutationOptions {
                no_push,
                ..Default::default()
            })
            .with_progress(stderr_progress)
    }

    /// Record a successful sync in the registry.
    pub fn touch_sync(&mut self) -> anyhow::Result<()> {
        let now = chrono::Utc::now();
        self.registry.touch_sync(&self.config.upstream, now)?;
        self.registry
            .save(&self.registry_path)
            .with_context(|| format!("recording sync of {}", self.config.upstream))?;
        self.config.last_sync = Some(now);
        Ok(())
    }
}

pub fn provider_for(kind: ProviderType) -> anyhow::Result<Box<dyn ReviewProvider>> {
    let provider: Box<dyn ReviewProvider> = match kind {
        ProviderType::Github => Box::new(GitHubProvider::new()),
        ProviderType::Dolthub => {
            let token = std::env::var(DOLTHUB_TOKEN_ENV)
                .ok()
                .filter(|t| !t.is_empty());
            if token.is_none() {
                tracing::debug!("{} not set; DoltHub calls are anonymous", DOLTHUB_TOKEN_ENV);
            }
            Box::new(DoltHubProvider::new(token)?)
        }
    };
    Ok(provider)
}
