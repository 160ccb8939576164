//! Builders for a fully mocked command context

use crate::mocks::{MockAniDbServer, MockFileHasher, MockHttpApi, MockImageDownloader};
use anidb_queue_core::hasher::FileHashes;
use anidb_queue_core::repositories::VideoLocal;
use anidb_queue_core::{
    CommandContext, PersistedQueue, QueueClientConfig, Repositories, Result, SessionClient,
};
use std::path::PathBuf;
use std::sync::Arc;

/// A [`CommandContext`] plus handles on every mock behind it
pub struct TestContext {
    pub ctx: CommandContext,
    pub server: MockAniDbServer,
    pub http: MockHttpApi,
    pub hasher: MockFileHasher,
    pub images: MockImageDownloader,
}

impl TestContext {
    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::new()
    }

    pub fn session(&self) -> &SessionClient {
        &self.ctx.session
    }

    pub fn queue(&self) -> &Arc<PersistedQueue> {
        &self.ctx.queue
    }

    pub fn repos(&self) -> &Repositories {
        &self.ctx.repos
    }

    /// Log in with the configured test account
    pub async fn login(&self) -> Result<bool> {
        let target = self.ctx.config.anidb.login_target()?;
        self.ctx.session.login(Some(target)).await
    }

    /// Save a library file the hasher knows about, with its hashes filled in
    pub async fn add_hashed_video(&self, id: u64, contents: &[u8]) -> Result<VideoLocal> {
        let path = PathBuf::from(format!("/library/video-{id}.mkv"));
        let hashes = self.hasher.add_file(&path, contents);
        let mut video = VideoLocal::new(id, path);
        video.hashes = Some(hashes);
        self.ctx.repos.videos.save_video(&video).await?;
        Ok(video)
    }
}

/// Builder for [`TestContext`]
///
/// ```rust,no_run
/// use anidb_queue_test_utils::TestContext;
///
/// # async fn example() -> anidb_queue_core::Result<()> {
/// let test = TestContext::builder()
///     .configure(|config| config.session.request_timeout_secs = 1)
///     .build()?;
/// test.login().await?;
/// # Ok(())
/// # }
/// ```
pub struct TestContextBuilder {
    config: QueueClientConfig,
    keep_alive: bool,
    queue: Option<Arc<PersistedQueue>>,
    repos: Option<Repositories>,
}

impl TestContextBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueClientConfig::test(),
            keep_alive: false,
            queue: None,
            repos: None,
        }
    }

    pub fn configure(mut self, edit: impl FnOnce(&mut QueueClientConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Run the background keep-alive ticker (off by default)
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Use `queue` instead of a fresh in-memory one
    pub fn queue(mut self, queue: Arc<PersistedQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn repositories(mut self, repos: Repositories) -> Self {
        self.repos = Some(repos);
        self
    }

    /// Spawn the session actor; must run inside a tokio runtime
    pub fn build(self) -> Result<TestContext> {
        let server = MockAniDbServer::new();
        let http = MockHttpApi::new();
        let hasher = MockFileHasher::new();
        let images = MockImageDownloader::new();

        let session = SessionClient::builder(self.config.clone())
            .connector(Arc::new(server.clone()))
            .http_api(Arc::new(http.clone()))
            .keep_alive(self.keep_alive)
            .spawn()?;

        let ctx = CommandContext {
            session,
            queue: self
                .queue
                .unwrap_or_else(|| Arc::new(PersistedQueue::in_memory())),
            repos: self.repos.unwrap_or_else(Repositories::in_memory),
            hasher: Arc::new(hasher.clone()),
            images: Arc::new(images.clone()),
            config: Arc::new(self.config),
        };

        Ok(TestContext {
            ctx,
            server,
            http,
            hasher,
            images,
        })
    }
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes with recognizable values for reply fixtures
pub fn sample_hashes(size: u64, ed2k: &str) -> FileHashes {
    FileHashes {
        size,
        ed2k: ed2k.to_string(),
        crc32: "00000000".to_string(),
        md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        sha1: "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
    }
}
