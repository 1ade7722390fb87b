//! Cross-origin media mitigation.
//!
//! Pixels of media loaded from a foreign origin cannot be read back. Before a
//! container capture starts, every distinct source URL is copied into a
//! same-origin local object:
//!
//! 1. Fetch the URL directly.
//! 2. On failure, fetch it through the configured proxy endpoint
//!    (`<endpoint>?<param>=<url-encoded target>`).
//! 3. On failure again, mark the source unavailable. It is omitted from every
//!    frame; the export continues.
//!
//! Fetched bytes are registered as blob handles and decoded into
//! [`LocalMedia`]. Handles are owned by a [`LocalMediaSet`] and revoked when
//! it drops, on success, error, or cancellation alike.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::{EngineError, EngineResult, ProxyConfig};
use loopforge_timeline::Timeline;
use url::Url;

use crate::host::{AcquireError, MediaKind};

/// Raw bytes of a fetched media resource.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetches media bytes over the network.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> EngineResult<FetchedMedia>;
}

/// [`MediaFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> EngineResult<FetchedMedia> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EngineError::fetch(url, e.to_string()))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::fetch(url, e.to_string()))?;

        Ok(FetchedMedia {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Same-origin fetch proxy: `<endpoint>?<param>=<target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    base: Url,
    param: String,
}

impl ProxyEndpoint {
    pub fn new(endpoint: &str, param: impl Into<String>) -> EngineResult<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| EngineError::config(format!("invalid proxy endpoint {endpoint:?}: {e}")))?;
        Ok(Self {
            base,
            param: param.into(),
        })
    }

    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &ProxyConfig) -> EngineResult<Option<Self>> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config.query_param.clone()))
            .transpose()
    }

    /// Proxy URL for `target`, with the target percent-encoded.
    pub fn url_for(&self, target: &str) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair(&self.param, target);
        url.into()
    }
}

/// A registered local object holding fetched bytes.
#[derive(Debug, Clone)]
pub struct BlobHandle {
    pub url: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

/// Registers and revokes local object handles.
pub trait BlobRegistry: Send + Sync {
    fn register(&self, bytes: Vec<u8>, mime: &str) -> BlobHandle;
    fn revoke(&self, handle: &BlobHandle);
}

/// Process-local [`BlobRegistry`] that tracks live handles.
#[derive(Debug, Default)]
pub struct InMemoryBlobRegistry {
    next_id: AtomicU64,
    live: Mutex<HashSet<String>>,
}

impl InMemoryBlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles registered and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }
}

impl BlobRegistry for InMemoryBlobRegistry {
    fn register(&self, bytes: Vec<u8>, mime: &str) -> BlobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:loopforge/{id}");
        if let Ok(mut live) = self.live.lock() {
            live.insert(url.clone());
        }
        BlobHandle {
            url,
            mime: mime.to_string(),
            bytes: bytes.into(),
        }
    }

    fn revoke(&self, handle: &BlobHandle) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&handle.url);
        }
    }
}

/// A same-origin copy of a media source whose pixels can be read.
#[async_trait]
pub trait LocalMedia: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn natural_size(&self) -> (u32, u32);

    /// Seek to `seconds`, resolving once the seek has completed.
    async fn seek(&self, seconds: f64);

    /// Pixels at the current position.
    fn frame(&self) -> Result<Arc<RgbaImage>, AcquireError>;
}

/// Decodes a blob into [`LocalMedia`].
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    async fn decode(&self, handle: &BlobHandle, kind: MediaKind) -> EngineResult<Arc<dyn LocalMedia>>;
}

/// Decoded still image.
#[derive(Debug)]
pub struct StillMedia {
    image: Arc<RgbaImage>,
}

impl StillMedia {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }
}

#[async_trait]
impl LocalMedia for StillMedia {
    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn natural_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    async fn seek(&self, _seconds: f64) {}

    fn frame(&self) -> Result<Arc<RgbaImage>, AcquireError> {
        Ok(Arc::clone(&self.image))
    }
}

/// Decodes still images with the `image` crate. Video needs a host decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct StillImageDecoder;

#[async_trait]
impl MediaDecoder for StillImageDecoder {
    async fn decode(&self, handle: &BlobHandle, kind: MediaKind) -> EngineResult<Arc<dyn LocalMedia>> {
        match kind {
            MediaKind::Image => {
                let image = image::load_from_memory(&handle.bytes)
                    .map_err(|e| EngineError::decode(format!("{}: {e}", handle.url)))?
                    .to_rgba8();
                Ok(Arc::new(StillMedia::new(image)))
            }
            MediaKind::Video => Err(EngineError::decode(format!(
                "{}: no video decoder configured",
                handle.url
            ))),
        }
    }
}

/// A source URL the capture needs, with its media kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub url: String,
    pub kind: MediaKind,
}

impl SourceRef {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// A source whose kind is guessed from its URL.
    pub fn guess(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = MediaKind::guess_from_url(&url);
        Self { url, kind }
    }

    /// Every distinct source a timeline references. Clip media is video.
    pub fn from_timeline(timeline: &Timeline) -> Vec<SourceRef> {
        let clip_sources: HashSet<&str> = timeline.clips.iter().map(|c| c.media_source.as_str()).collect();
        timeline
            .media_sources()
            .into_iter()
            .map(|url| {
                if clip_sources.contains(url.as_str()) {
                    SourceRef::new(url, MediaKind::Video)
                } else {
                    SourceRef::guess(url)
                }
            })
            .collect()
    }
}

/// Local copies of the sources of one capture. Revokes its handles on drop.
pub struct LocalMediaSet {
    registry: Arc<dyn BlobRegistry>,
    handles: Vec<BlobHandle>,
    media: HashMap<String, Arc<dyn LocalMedia>>,
    unavailable: HashSet<String>,
}

impl LocalMediaSet {
    fn new(registry: Arc<dyn BlobRegistry>) -> Self {
        Self {
            registry,
            handles: Vec::new(),
            media: HashMap::new(),
            unavailable: HashSet::new(),
        }
    }

    /// The local copy of `url`, or `None` when it could not be obtained.
    pub fn get(&self, url: &str) -> Option<&Arc<dyn LocalMedia>> {
        self.media.get(url)
    }

    pub fn is_unavailable(&self, url: &str) -> bool {
        self.unavailable.contains(url)
    }

    pub fn unavailable_count(&self) -> usize {
        self.unavailable.len()
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}

impl Drop for LocalMediaSet {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::debug!(handles = self.handles.len(), "Revoking local media handles");
        for handle in self.handles.drain(..) {
            self.registry.revoke(&handle);
        }
    }
}

impl std::fmt::Debug for LocalMediaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaSet")
            .field("handles", &self.handles.len())
            .field("media", &self.media.keys().collect::<Vec<_>>())
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

/// Copies foreign-origin sources into local, readable media.
#[derive(Clone)]
pub struct OriginResolver {
    fetcher: Arc<dyn MediaFetcher>,
    proxy: Option<ProxyEndpoint>,
    registry: Arc<dyn BlobRegistry>,
    decoder: Arc<dyn MediaDecoder>,
}

impl OriginResolver {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        proxy: Option<ProxyEndpoint>,
        registry: Arc<dyn BlobRegistry>,
        decoder: Arc<dyn MediaDecoder>,
    ) -> Self {
        Self {
            fetcher,
            proxy,
            registry,
            decoder,
        }
    }

    /// HTTP fetching, in-memory handles, and still-image decoding, with the
    /// proxy taken from `config`.
    pub fn http(config: &ProxyConfig) -> EngineResult<Self> {
        Ok(Self::new(
            Arc::new(HttpFetcher::new()),
            ProxyEndpoint::from_config(config)?,
            Arc::new(InMemoryBlobRegistry::new()),
            Arc::new(StillImageDecoder),
        ))
    }

    /// Resolve every distinct source once. Never fails: unreachable sources
    /// are recorded as unavailable.
    pub async fn prepare(&self, sources: &[SourceRef]) -> LocalMediaSet {
        let mut set = LocalMediaSet::new(Arc::clone(&self.registry));
        let mut seen = HashSet::new();

        for source in sources {
            if !seen.insert(source.url.as_str()) {
                continue;
            }

            let Some(fetched) = self.fetch_with_fallback(&source.url).await else {
                tracing::warn!(url = %source.url, "Media source unavailable, omitting from export");
                set.unavailable.insert(source.url.clone());
                continue;
            };

            let mime = fetched
                .content_type
                .unwrap_or_else(|| source.kind.default_mime().to_string());
            let handle = self.registry.register(fetched.bytes, &mime);
            let decoded = self.decoder.decode(&handle, source.kind).await;
            set.handles.push(handle);

            match decoded {
                Ok(media) => {
                    set.media.insert(source.url.clone(), media);
                }
                Err(e) => {
                    tracing::warn!(url = %source.url, error = %e, "Failed to decode media source");
                    set.unavailable.insert(source.url.clone());
                }
            }
        }

        tracing::info!(
            resolved = set.media.len(),
            unavailable = set.unavailable.len(),
            "Prepared local media copies"
        );
        set
    }

    async fn fetch_with_fallback(&self, url: &str) -> Option<FetchedMedia> {
        match self.fetcher.fetch(url).await {
            Ok(media) => return Some(media),
            Err(e) => tracing::debug!(url, error = %e, "Direct fetch failed"),
        }

        let proxy_url = self.proxy.as_ref()?.url_for(url);
        match self.fetcher.fetch(&proxy_url).await {
            Ok(media) => Some(media),
            Err(e) => {
                tracing::debug!(url, proxy_url = %proxy_url, error = %e, "Proxy fetch failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for OriginResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginResolver")
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Serves fixed bytes for known URLs and records every request.
    struct MapFetcher {
        responses: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn new(responses: &[(&str, Vec<u8>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(url, bytes)| (url.to_string(), bytes.clone()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> EngineResult<FetchedMedia> {
            self.requests.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .map(|bytes| FetchedMedia {
                    bytes: bytes.clone(),
                    content_type: Some("image/png".to_string()),
                })
                .ok_or_else(|| EngineError::fetch(url, "404"))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_proxy_url_encodes_target() {
        let proxy = ProxyEndpoint::new("https://app.example.com/api/proxy", "url").unwrap();
        assert_eq!(
            proxy.url_for("https://cdn.example.com/a b.png?x=1&y=2"),
            "https://app.example.com/api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fa+b.png%3Fx%3D1%26y%3D2"
        );
    }

    #[test]
    fn test_proxy_from_config() {
        assert!(ProxyEndpoint::from_config(&ProxyConfig::default()).unwrap().is_none());

        let config = ProxyConfig {
            endpoint: Some("not a url".to_string()),
            query_param: "url".to_string(),
        };
        assert!(ProxyEndpoint::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_falls_back_to_proxy() {
        let proxy = ProxyEndpoint::new("https://app.example.com/proxy", "url").unwrap();
        let proxied = proxy.url_for("https://cdn.example.com/a.png");
        let fetcher = Arc::new(MapFetcher::new(&[(proxied.as_str(), png_bytes())]));
        let registry = Arc::new(InMemoryBlobRegistry::new());
        let resolver = OriginResolver::new(
            fetcher.clone(),
            Some(proxy),
            registry.clone(),
            Arc::new(StillImageDecoder),
        );

        let set = resolver
            .prepare(&[SourceRef::new("https://cdn.example.com/a.png", MediaKind::Image)])
            .await;

        let media = set.get("https://cdn.example.com/a.png").unwrap();
        assert_eq!(media.natural_size(), (2, 2));
        assert_eq!(fetcher.requests.lock().unwrap().len(), 2);
        assert_eq!(registry.live_count(), 1);

        drop(set);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_omitted() {
        let fetcher = Arc::new(MapFetcher::new(&[("https://ok.example.com/b.png", png_bytes())]));
        let registry = Arc::new(InMemoryBlobRegistry::new());
        let resolver = OriginResolver::new(
            fetcher.clone(),
            Some(ProxyEndpoint::new("https://app.example.com/proxy", "url").unwrap()),
            registry.clone(),
            Arc::new(StillImageDecoder),
        );

        let set = resolver
            .prepare(&[
                SourceRef::new("https://dead.example.com/a.png", MediaKind::Image),
                SourceRef::new("https://ok.example.com/b.png", MediaKind::Image),
                SourceRef::new("https://ok.example.com/b.png", MediaKind::Image),
            ])
            .await;

        assert!(set.get("https://dead.example.com/a.png").is_none());
        assert!(set.is_unavailable("https://dead.example.com/a.png"));
        assert_eq!(set.len(), 1);
        // dead: direct + proxy; ok: direct once despite the duplicate.
        assert_eq!(fetcher.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_undecodable_source_still_releases_handle() {
        let fetcher = Arc::new(MapFetcher::new(&[("https://cdn.example.com/v.mp4", vec![0, 1, 2])]));
        let registry = Arc::new(InMemoryBlobRegistry::new());
        let resolver = OriginResolver::new(fetcher, None, registry.clone(), Arc::new(StillImageDecoder));

        let set = resolver
            .prepare(&[SourceRef::new("https://cdn.example.com/v.mp4", MediaKind::Video)])
            .await;
        assert_eq!(set.unavailable_count(), 1);
        assert_eq!(registry.live_count(), 1);
        drop(set);
        assert_eq!(registry.live_count(), 0);
    }
}
