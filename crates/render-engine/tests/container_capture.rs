use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use loopforge_common::{CancelFlag, EngineError, EngineResult};
use loopforge_render_engine::{
    capture_frames, AcquireError, BlobHandle, CaptureOptions, CaptureStrategy, ContainerCapture, ContainerLayout,
    FetchedMedia, FitMode, InMemoryBlobRegistry, LocalMedia, MediaDecoder, MediaFetcher, MediaKind, OriginResolver,
    PlacedMedia, ProxyEndpoint, StillImageDecoder,
};
use loopforge_timeline::{PixelRect, Rgba8Color};

const GOOD_URL: &str = "https://cdn.example.com/good.png";
const DEAD_URL: &str = "https://blocked.example.com/dead.png";
const PROXY: &str = "https://app.example.com/api/proxy";
const GREEN: [u8; 4] = [0, 200, 0, 255];
const BACKGROUND: Rgba8Color = Rgba8Color::rgb(10, 10, 10);

/// Serves one PNG directly; everything else fails, proxied or not.
struct OneSourceFetcher {
    responses: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl OneSourceFetcher {
    fn new() -> Self {
        let image = RgbaImage::from_pixel(4, 4, Rgba(GREEN));
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png).unwrap();

        let mut responses = HashMap::new();
        responses.insert(GOOD_URL.to_string(), png.into_inner());
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaFetcher for OneSourceFetcher {
    async fn fetch(&self, url: &str) -> EngineResult<FetchedMedia> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .map(|bytes| FetchedMedia {
                bytes: bytes.clone(),
                content_type: Some("image/png".to_string()),
            })
            .ok_or_else(|| EngineError::fetch(url, "blocked"))
    }
}

fn item(url: &str, rect: PixelRect) -> PlacedMedia {
    PlacedMedia {
        source_url: url.to_string(),
        kind: MediaKind::Image,
        rect,
        fit: FitMode::Fill,
        current_time: 0.0,
        visible: true,
    }
}

/// 100x50 layout: good source on the left half, dead source on the right.
fn layout() -> ContainerLayout {
    ContainerLayout {
        width: 100.0,
        height: 50.0,
        items: vec![
            item(GOOD_URL, PixelRect::new(0.0, 0.0, 50.0, 50.0)),
            item(DEAD_URL, PixelRect::new(50.0, 0.0, 50.0, 50.0)),
            item(GOOD_URL, PixelRect::new(400.0, 0.0, 50.0, 50.0)),
        ],
    }
}

fn setup() -> (Arc<OneSourceFetcher>, Arc<InMemoryBlobRegistry>, ContainerCapture) {
    let fetcher = Arc::new(OneSourceFetcher::new());
    let registry = Arc::new(InMemoryBlobRegistry::new());
    let resolver = OriginResolver::new(
        fetcher.clone(),
        Some(ProxyEndpoint::new(PROXY, "url").unwrap()),
        registry.clone(),
        Arc::new(StillImageDecoder),
    );
    let capture = ContainerCapture::new(Box::new(|| Some(layout())), resolver);
    (fetcher, registry, capture)
}

#[tokio::test(start_paused = true)]
async fn unreachable_source_leaves_background() {
    let (fetcher, registry, capture) = setup();
    let options = CaptureOptions::new(200, 100).with_background(BACKGROUND);
    let mut seeker = |_frame: u64| {};

    let captured = capture_frames(CaptureStrategy::Container(capture), &mut seeker, 3, &options, None)
        .await
        .unwrap();

    assert_eq!(captured.len(), 3);
    assert_eq!(captured.stats.sources_unavailable, 1);
    for frame in &captured.frames {
        assert_eq!(frame.dimensions(), (200, 100));
        // Layout is scaled 2x on both axes.
        assert_eq!(frame.get_pixel(10, 10).0, GREEN);
        assert_eq!(frame.get_pixel(99, 99).0, GREEN);
        for x in 100..200 {
            for y in 0..100 {
                assert_eq!(frame.get_pixel(x, y).0, BACKGROUND.0, "pixel ({x}, {y})");
            }
        }
    }

    let requests = fetcher.requests.lock().unwrap();
    let proxied = ProxyEndpoint::new(PROXY, "url").unwrap().url_for(DEAD_URL);
    assert!(requests.contains(&DEAD_URL.to_string()));
    assert!(requests.contains(&proxied));
    assert_eq!(requests.iter().filter(|url| url.as_str() == GOOD_URL).count(), 1);

    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn non_uniform_scale_stretches_layout() {
    let (_fetcher, _registry, capture) = setup();
    let options = CaptureOptions::new(100, 200).with_background(BACKGROUND);
    let mut seeker = |_frame: u64| {};

    let captured = capture_frames(CaptureStrategy::Container(capture), &mut seeker, 1, &options, None)
        .await
        .unwrap();
    let frame = &captured.frames[0];

    // X scale 1, Y scale 4: the good tile covers x 0..50, y 0..200.
    assert_eq!(frame.get_pixel(49, 199).0, GREEN);
    assert_eq!(frame.get_pixel(50, 100).0, BACKGROUND.0);
}

#[tokio::test(start_paused = true)]
async fn handles_released_on_cancellation() {
    let (_fetcher, registry, capture) = setup();
    let cancel = CancelFlag::new();
    let options = CaptureOptions::new(100, 50).with_cancel(cancel.clone());
    let observed = Arc::clone(&registry);
    let live_during_capture = Arc::new(Mutex::new(Vec::new()));
    let live_log = Arc::clone(&live_during_capture);
    let mut seeker = move |frame: u64| {
        live_log.lock().unwrap().push(observed.live_count());
        if frame == 2 {
            cancel.cancel();
        }
    };

    let err = capture_frames(CaptureStrategy::Container(capture), &mut seeker, 10, &options, None)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(*live_during_capture.lock().unwrap(), vec![1, 1, 1]);
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn ready_predicate_skips_fixed_delay() {
    let (_fetcher, _registry, capture) = setup();
    let capture = capture.with_ready(Box::new(|| true));
    let mut seeker = |_frame: u64| {};

    let started = tokio::time::Instant::now();
    let captured = capture_frames(
        CaptureStrategy::Container(capture),
        &mut seeker,
        5,
        &CaptureOptions::new(100, 50),
        None,
    )
    .await
    .unwrap();

    assert_eq!(captured.len(), 5);
    assert_eq!(captured.stats.settle_timeouts, 0);
    assert!(started.elapsed() < std::time::Duration::from_millis(100));
}

const STALE: [u8; 4] = [9, 9, 9, 255];
const CLIP_URL: &str = "https://cdn.example.com/clip.mp4";

/// Serves placeholder bytes for any URL.
struct AnyFetcher;

#[async_trait]
impl MediaFetcher for AnyFetcher {
    async fn fetch(&self, _url: &str) -> EngineResult<FetchedMedia> {
        Ok(FetchedMedia {
            bytes: b"mp4".to_vec(),
            content_type: Some("video/mp4".to_string()),
        })
    }
}

/// A decoded video whose seeks never complete.
struct StuckVideo {
    frame: Arc<RgbaImage>,
}

#[async_trait]
impl LocalMedia for StuckVideo {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn natural_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    async fn seek(&self, _seconds: f64) {
        std::future::pending::<()>().await;
    }

    fn frame(&self) -> Result<Arc<RgbaImage>, AcquireError> {
        Ok(Arc::clone(&self.frame))
    }
}

struct StuckVideoDecoder;

#[async_trait]
impl MediaDecoder for StuckVideoDecoder {
    async fn decode(&self, _handle: &BlobHandle, _kind: MediaKind) -> EngineResult<Arc<dyn LocalMedia>> {
        Ok(Arc::new(StuckVideo {
            frame: Arc::new(RgbaImage::from_pixel(4, 4, Rgba(STALE))),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_seek_draws_current_frame() {
    let registry = Arc::new(InMemoryBlobRegistry::new());
    let resolver = OriginResolver::new(Arc::new(AnyFetcher), None, registry.clone(), Arc::new(StuckVideoDecoder));
    let layout = ContainerLayout {
        width: 40.0,
        height: 40.0,
        items: vec![PlacedMedia {
            kind: MediaKind::Video,
            current_time: 1.5,
            ..item(CLIP_URL, PixelRect::new(0.0, 0.0, 40.0, 40.0))
        }],
    };
    let capture = ContainerCapture::new(Box::new(move || Some(layout.clone())), resolver);
    let mut seeker = |_frame: u64| {};

    let captured = capture_frames(
        CaptureStrategy::Container(capture),
        &mut seeker,
        3,
        &CaptureOptions::new(40, 40),
        None,
    )
    .await
    .unwrap();

    assert_eq!(captured.len(), 3);
    assert_eq!(captured.stats.seek_timeouts, 3);
    assert_eq!(captured.stats.skipped, 0);
    for frame in &captured.frames {
        assert_eq!(frame.get_pixel(20, 20).0, STALE);
    }
    assert_eq!(registry.live_count(), 0);
}
