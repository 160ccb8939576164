//! Process-wide entry point: one session, three processors

use crate::commands::{CommandContext, CommandRequest};
use crate::config::QueueClientConfig;
use crate::credentials::LoginTarget;
use crate::error::Result;
use crate::processor::{CommandQueues, QueueStatus};
use crate::queue::{EnqueueOutcome, Partition, Priority};
use crate::session::SessionClient;
use log::{info, warn};

/// Session plus processors, as the rest of an application sees them
pub struct QueueService {
    session: SessionClient,
    queues: CommandQueues,
}

impl QueueService {
    pub fn new(ctx: CommandContext) -> Self {
        Self {
            session: ctx.session.clone(),
            queues: CommandQueues::new(ctx),
        }
    }

    /// Wire the production collaborators around the database in `data_dir`
    #[cfg(feature = "database")]
    pub async fn open(config: QueueClientConfig, data_dir: &std::path::Path) -> Result<Self> {
        use crate::database::Database;
        use crate::hasher::Ed2kFileHasher;
        use crate::images::HttpImageDownloader;
        use crate::queue::PersistedQueue;
        use crate::repositories::Repositories;
        use std::sync::Arc;

        config.validate()?;
        let database = Database::new(&data_dir.join("queue.db")).await?;
        let images = HttpImageDownloader::new(
            config.anidb.image_base_url.clone(),
            data_dir.join("images"),
        )?;
        let session = SessionClient::builder(config.clone()).spawn()?;

        let ctx = CommandContext {
            session,
            queue: Arc::new(PersistedQueue::new(Arc::new(database.command_store()))),
            repos: Repositories::from_store(Arc::new(database.entity_store())),
            hasher: Arc::new(Ed2kFileHasher),
            images: Arc::new(images),
            config: Arc::new(config),
        };
        Ok(Self::new(ctx))
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }

    pub fn queues(&self) -> &CommandQueues {
        &self.queues
    }

    /// Start every processor
    pub async fn start(&self) -> Result<()> {
        self.queues.init_all().await
    }

    /// Log in with `target`, or with the configured credentials
    ///
    /// Missing credentials fail here, before any packet is sent.
    pub async fn login(&self, target: Option<LoginTarget>) -> Result<bool> {
        let target = match target {
            Some(target) => target,
            None => self.queues.context().config.anidb.login_target()?,
        };
        target.validate()?;
        let accepted = self.session.login(Some(target)).await?;
        if !accepted {
            warn!("AniDB refused the login");
        }
        Ok(accepted)
    }

    pub async fn force_logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Forget a ban and let the general partition run again
    pub async fn clear_ban(&self) -> Result<()> {
        self.session.clear_ban().await?;
        self.queues.resume(Partition::General);
        info!("Ban cleared by operator");
        Ok(())
    }

    pub async fn enqueue(
        &self,
        request: impl Into<CommandRequest>,
        priority: Option<Priority>,
    ) -> Result<EnqueueOutcome> {
        self.queues.enqueue(request, priority).await
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        self.queues.status().await
    }

    /// Stop every processor, then log out and stop the session actor
    pub async fn dispose(&self) -> Result<()> {
        self.queues.stop_all().await;
        self.session.shutdown().await
    }
}
