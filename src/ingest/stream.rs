//! Live stream frame source.
//!
//! `StreamSource` reads a network camera continuously. The backend is picked
//! by URL scheme:
//! - `stub://` synthetic frames (tests, dry runs)
//! - `http://` / `https://` MJPEG or JPEG snapshots
//! - `rtsp://` GStreamer decode (feature: rtsp-gstreamer)
//!
//! A failed read is reported to the caller, which decides when to reconnect.
//! `reconnect()` tears the handle down and reopens it in place.

use anyhow::Context;
use anyhow::{anyhow, Result};

use super::mjpeg::HttpMjpegSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a live stream source.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Stream URL (e.g., "http://192.168.1.20:8080/video", "rtsp://camera/stream").
    pub url: String,
    /// Frame width (synthetic frames only).
    pub width: u32,
    /// Frame height (synthetic frames only).
    pub height: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Live stream frame source.
pub struct StreamSource {
    url: String,
    backend: StreamBackend,
}

enum StreamBackend {
    Synthetic(SyntheticStreamSource),
    Http(HttpMjpegSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerStreamSource),
}

impl StreamSource {
    pub fn new(config: StreamConfig) -> Result<Self> {
        let url = config.url.clone();
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_lowercase())
            .ok_or_else(|| anyhow!("stream url '{}' has no scheme", url))?;
        let backend = match scheme.as_str() {
            "stub" => StreamBackend::Synthetic(SyntheticStreamSource::new(config)),
            "http" | "https" => StreamBackend::Http(HttpMjpegSource::new(config.url)),
            "rtsp" | "rtsps" => rtsp_backend(config)?,
            other => {
                return Err(anyhow!(
                    "unsupported stream scheme '{}'; expected http(s), rtsp or stub",
                    other
                ))
            }
        };
        Ok(Self { url, backend })
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn rtsp_backend(config: StreamConfig) -> Result<StreamBackend> {
    Ok(StreamBackend::Gstreamer(GstreamerStreamSource::new(config)?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn rtsp_backend(_config: StreamConfig) -> Result<StreamBackend> {
    anyhow::bail!("RTSP requires the rtsp-gstreamer feature")
}

impl FrameSource for StreamSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            StreamBackend::Synthetic(source) => source.connect(),
            StreamBackend::Http(source) => source.connect(),
            #[cfg(feature = "rtsp-gstreamer")]
            StreamBackend::Gstreamer(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            StreamBackend::Synthetic(source) => source.next_frame().map(Some),
            StreamBackend::Http(source) => source.next_frame(),
            #[cfg(feature = "rtsp-gstreamer")]
            StreamBackend::Gstreamer(source) => source.next_frame(),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        match &mut self.backend {
            StreamBackend::Synthetic(source) => source.connect(),
            StreamBackend::Http(source) => source.connect(),
            #[cfg(feature = "rtsp-gstreamer")]
            StreamBackend::Gstreamer(source) => source.reconnect(),
        }
    }

    fn stats(&self) -> SourceStats {
        let frames_captured = match &self.backend {
            StreamBackend::Synthetic(source) => source.frame_count,
            StreamBackend::Http(source) => source.frames_captured(),
            #[cfg(feature = "rtsp-gstreamer")]
            StreamBackend::Gstreamer(source) => source.frame_count,
        };
        SourceStats {
            frames_captured,
            source: self.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticStreamSource {
    config: StreamConfig,
    frame_count: u64,
}

impl SyntheticStreamSource {
    fn new(config: StreamConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("StreamSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let shade = (self.frame_count % 256) as u8;
        let frame = Frame::filled(
            self.config.width,
            self.config.height,
            self.frame_count,
            shade,
        )?;
        self.frame_count += 1;
        Ok(frame)
    }
}

// ----------------------------------------------------------------------------
// RTSP source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerStreamSource {
    config: StreamConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerStreamSource {
    /// Build `rtspsrc ! decodebin ! videoconvert ! appsink` with RGB caps.
    fn new(config: StreamConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.url
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        log::info!("StreamSource: connected to {} (rtsp)", self.config.url);
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Null)
            .context("reset RTSP pipeline")?;
        self.connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.poll_bus()?;

        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(2_000))
            .ok_or_else(|| anyhow!("RTSP stream stalled"))?;

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        let frame = Frame::from_rgb(pixels, width, height, self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn poll_bus(&mut self) -> Result<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(anyhow!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    return Err(anyhow!("gstreamer reached EOS"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let pixels = copy_rows(map.as_slice(), stride, row_bytes, height as usize)?;
    Ok((pixels, width, height))
}

/// Copy `rows` rows of `row_bytes` each out of a buffer laid out with `stride`.
#[cfg_attr(not(feature = "rtsp-gstreamer"), allow(dead_code))]
fn copy_rows(data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Result<Vec<u8>> {
    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * rows)
            .context("RTSP buffer is shorter than its dimensions")?;
        return Ok(packed.to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }
    Ok(pixels)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> StreamConfig {
        StreamConfig {
            url: "stub://test".to_string(),
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn stream_source_produces_indexed_frames() -> Result<()> {
        let mut source = StreamSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_eq!((first.width, first.height), (32, 24));
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(source.stats().frames_captured, 2);
        assert_eq!(source.describe(), "stub://test");
        Ok(())
    }

    #[test]
    fn reconnect_keeps_synthetic_stream_readable() -> Result<()> {
        let mut source = StreamSource::new(stub_config())?;
        source.connect()?;
        source.reconnect()?;
        assert!(source.next_frame()?.is_some());
        Ok(())
    }

    #[test]
    fn rejects_unsupported_schemes() {
        for url in ["ftp://camera/video", "camera.local/video", "file:///tmp/x.mp4"] {
            let config = StreamConfig {
                url: url.to_string(),
                ..StreamConfig::default()
            };
            assert!(StreamSource::new(config).is_err(), "{url} must be rejected");
        }
    }

    #[test]
    fn http_stream_is_lazy_until_connect() {
        let config = StreamConfig {
            url: "http://127.0.0.1:9/video".to_string(),
            ..StreamConfig::default()
        };
        let mut source = StreamSource::new(config).expect("http backend builds offline");
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn copy_rows_drops_stride_padding() -> Result<()> {
        // Two rows of one RGB pixel, each padded to four bytes.
        let data = [1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(copy_rows(&data, 4, 3, 2)?, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn short_buffer_is_an_error() {
        let packed = [0u8; 5];
        assert!(copy_rows(&packed, 3, 3, 2).is_err());
        let padded = [0u8; 6];
        assert!(copy_rows(&padded, 4, 3, 2).is_err());
    }
}
