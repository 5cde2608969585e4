//! HTTP MJPEG / JPEG snapshot ingestion.
//!
//! Network cameras and phone "IP webcam" apps usually expose either a
//! `multipart/x-mixed-replace` MJPEG stream or a single-JPEG snapshot URL.
//! Both are decoded in memory into RGB frames.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Read;

use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

pub(crate) struct HttpMjpegSource {
    url: String,
    stream: Option<HttpStream>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpMjpegSource {
    pub(crate) fn new(url: String) -> Self {
        Self {
            url,
            stream: None,
            frame_count: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        self.stream = None;
        let response = ureq::get(&self.url)
            .call()
            .with_context(|| format!("connect to http stream {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(reader)));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        log::info!("StreamSource: connected to {} (http)", self.url);
        Ok(())
    }

    /// `Ok(None)` when the server closed the stream.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("http source not connected; call connect() first"))?;
        let jpeg_bytes = match stream {
            HttpStream::Mjpeg(stream) => match stream.read_next_jpeg()? {
                Some(bytes) => bytes,
                None => return Ok(None),
            },
            HttpStream::SingleJpeg => fetch_single_jpeg(&self.url)?,
        };

        let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
        let frame = Frame::from_rgb(pixels, width, height, self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

pub(crate) struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    pub(crate) fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG from the stream, or `None` once the reader is exhausted.
    pub(crate) fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}

/// Byte range of the first complete JPEG (SOI..=EOI) in `buffer`.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::ExtendedColorType;
    use std::io::Cursor;

    fn encode_jpeg(width: u32, height: u32, value: u8) -> Vec<u8> {
        let pixels = vec![value; (width * height * 3) as usize];
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode(&pixels, width, height, ExtendedColorType::Rgb8)
            .expect("encode jpeg");
        out
    }

    fn multipart(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
            body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", part.len()).as_bytes());
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    #[test]
    fn finds_jpeg_bounds() {
        let buf = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x03];
        assert_eq!(find_jpeg_bounds(&buf), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x01]), None);
        assert_eq!(find_jpeg_bounds(&[0x01, 0x02]), None);
    }

    #[test]
    fn reads_frames_from_multipart_stream() -> Result<()> {
        let first = encode_jpeg(8, 6, 40);
        let second = encode_jpeg(4, 4, 200);
        let body = multipart(&[first.clone(), second.clone()]);
        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));

        assert_eq!(stream.read_next_jpeg()?, Some(first));
        let jpeg = stream.read_next_jpeg()?.expect("second frame");
        assert_eq!(jpeg, second);
        assert_eq!(stream.read_next_jpeg()?, None);

        let (pixels, width, height) = decode_jpeg(&jpeg)?;
        assert_eq!((width, height), (4, 4));
        assert_eq!(pixels.len(), 4 * 4 * 3);
        Ok(())
    }

    #[test]
    fn rejects_garbage_jpeg() {
        assert!(decode_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_err());
    }
}
