//! Scripted AniDB HTTP API

use anidb_queue_core::error::ProtocolError;
use anidb_queue_core::http::{AniDbHttpApi, HttpCredentials, HttpRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

/// One request the API received
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub at: Instant,
    pub request: HttpRequest,
    pub authenticated: bool,
}

#[derive(Debug, Clone)]
enum Scripted {
    Body(String),
    NetworkError(String),
}

#[derive(Default)]
struct HttpState {
    scripted: HashMap<String, VecDeque<Scripted>>,
    defaults: HashMap<String, String>,
    calls: Vec<HttpCall>,
}

fn request_key(request: &HttpRequest) -> String {
    match request {
        HttpRequest::Anime { aid } => format!("anime/{aid}"),
        other => other.name().to_string(),
    }
}

/// In-process HTTP API with per-request bodies
///
/// Unscripted requests fail with a network error, so a test notices any
/// request it did not expect.
#[derive(Clone, Default)]
pub struct MockHttpApi {
    state: Arc<Mutex<HttpState>>,
}

impl MockHttpApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HttpState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, request: &HttpRequest, scripted: Scripted) -> &Self {
        self.state()
            .scripted
            .entry(request_key(request))
            .or_default()
            .push_back(scripted);
        self
    }

    /// Answer the next fetch of `request` with `body`
    pub fn respond(&self, request: HttpRequest, body: impl Into<String>) -> &Self {
        self.push(&request, Scripted::Body(body.into()))
    }

    /// Answer every fetch of `request` with `body`
    pub fn respond_always(&self, request: HttpRequest, body: impl Into<String>) -> &Self {
        self.state()
            .defaults
            .insert(request_key(&request), body.into());
        self
    }

    /// Fail the next fetch of `request` at the transport level
    pub fn fail(&self, request: HttpRequest, message: impl Into<String>) -> &Self {
        self.push(&request, Scripted::NetworkError(message.into()))
    }

    pub fn anime(&self, aid: u64, xml: impl Into<String>) -> &Self {
        self.respond(HttpRequest::Anime { aid }, xml)
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.state().calls.clone()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state()
            .calls
            .iter()
            .map(|c| c.request.clone())
            .collect()
    }

    pub fn count(&self, request: &HttpRequest) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.request == *request)
            .count()
    }
}

#[async_trait]
impl AniDbHttpApi for MockHttpApi {
    async fn fetch(
        &self,
        request: &HttpRequest,
        credentials: Option<&HttpCredentials>,
    ) -> anidb_queue_core::Result<String> {
        let key = request_key(request);
        let mut state = self.state();
        state.calls.push(HttpCall {
            at: Instant::now(),
            request: request.clone(),
            authenticated: credentials.is_some(),
        });

        let scripted = state.scripted.get_mut(&key).and_then(|q| q.pop_front());
        match scripted {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::NetworkError(message)) => Err(ProtocolError::network(message).into()),
            None => state
                .defaults
                .get(&key)
                .cloned()
                .ok_or_else(|| ProtocolError::network(format!("no body scripted for {key}")).into()),
        }
    }
}

/// Minimal anime document as the HTTP API returns it
///
/// Lists `episode_count` regular episodes with eids `aid * 1000 + n`.
pub fn anime_xml(aid: u64, title: &str, episode_count: u32) -> String {
    let episodes: String = (1..=episode_count)
        .map(|n| {
            format!(
                "<episode id=\"{}\"><epno type=\"1\">{n}</epno></episode>\n",
                aid * 1000 + u64::from(n)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<anime id="{aid}" restricted="false">
<type>TV Series</type>
<episodecount>{episode_count}</episodecount>
<titles>
<title xml:lang="x-jat" type="main">{title}</title>
</titles>
<picture>{aid}.jpg</picture>
<episodes>
{episodes}</episodes>
</anime>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_bodies_then_defaults() {
        let api = MockHttpApi::new();
        api.anime(1, "<anime id=\"1\"/>");
        api.respond_always(HttpRequest::Votes, "<votes/>");

        let anime = HttpRequest::Anime { aid: 1 };
        assert_eq!(api.fetch(&anime, None).await.unwrap(), "<anime id=\"1\"/>");
        assert!(api.fetch(&anime, None).await.is_err());
        assert_eq!(api.fetch(&HttpRequest::Votes, None).await.unwrap(), "<votes/>");
        assert_eq!(api.fetch(&HttpRequest::Votes, None).await.unwrap(), "<votes/>");

        assert_eq!(api.count(&anime), 2);
        assert_eq!(api.calls().len(), 4);
    }
}
