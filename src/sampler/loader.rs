// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Loading of the shared instrument sample.
//!
//! The sample is fetched once over HTTP, decoded entirely into memory,
//! downmixed to mono and resampled to the output rate, then shared by every
//! voice for the remainder of the session. A failed load can be retried from
//! scratch; there is no partial resume.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use symphonia::core::audio::SampleBuffer as DecoderSampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors produced while loading the instrument sample.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The transfer did not complete successfully.
    #[error("sample transfer failed: {0}")]
    Network(String),

    /// The transferred bytes could not be decoded as audio.
    #[error("sample decode failed: {0}")]
    Decode(String),
}

/// The loader status, observable for diagnostic display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The sample is being fetched or decoded.
    Loading,
    /// The sample is decoded and cached.
    Ready,
    /// The last load attempt failed; a retry may be issued.
    Error(String),
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loading => write!(f, "loading"),
            LoadStatus::Ready => write!(f, "ready"),
            LoadStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// The decoded shared sample: mono f32 frames at the output sample rate.
/// Never mutated after decode.
pub struct SampleBuffer {
    data: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from mono frames.
    pub fn new(data: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer { data, sample_rate }
    }

    /// The mono sample frames.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The sample rate of the frames.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames.
    pub fn frame_count(&self) -> usize {
        self.data.len()
    }

    /// The duration of the sample at its native playback rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.data.len() as f64 / self.sample_rate as f64)
    }

    /// The memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Fetches the raw bytes of the sample asset.
///
/// The seam exists so tests can inject canned bytes or failures without a
/// network; production uses [`HttpFetcher`].
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Transfer timeout for the sample asset.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches the sample over HTTP.
///
/// The blocking client is built inside fetch(), which only ever runs on the
/// blocking pool; reqwest's blocking API must stay off async worker threads.
pub struct HttpFetcher {}

impl HttpFetcher {
    /// Creates a new HTTP fetcher.
    pub fn new() -> HttpFetcher {
        HttpFetcher {}
    }
}

impl Default for HttpFetcher {
    fn default() -> HttpFetcher {
        HttpFetcher::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Network(format!(
                "unexpected status {} fetching {}",
                status, url
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| LoadError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Loads and caches the shared instrument sample.
pub struct SampleLoader {
    /// Fetches the raw asset bytes.
    fetcher: Arc<dyn Fetcher>,
    /// The fixed asset URL. Retries re-fetch the same URL from scratch.
    url: String,
    /// The output device rate the sample is resampled to.
    target_sample_rate: u32,
    /// The decoded sample, cached for the remainder of the session.
    cached: RwLock<Option<Arc<SampleBuffer>>>,
    /// Observable status for diagnostic display.
    status_tx: watch::Sender<LoadStatus>,
}

impl SampleLoader {
    /// Creates a new loader for the given asset URL and output rate.
    pub fn new(fetcher: Arc<dyn Fetcher>, url: &str, target_sample_rate: u32) -> SampleLoader {
        let (status_tx, _) = watch::channel(LoadStatus::Loading);
        SampleLoader {
            fetcher,
            url: url.to_string(),
            target_sample_rate,
            cached: RwLock::new(None),
            status_tx,
        }
    }

    /// The current load status.
    pub fn status(&self) -> LoadStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribes to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status_tx.subscribe()
    }

    /// The cached sample, if ready.
    pub fn buffer(&self) -> Option<Arc<SampleBuffer>> {
        self.cached.read().clone()
    }

    /// Fetches and decodes the sample, caching it on success.
    ///
    /// Safe to call again after a failure; the transfer restarts from
    /// scratch. Once a load succeeds the cached buffer is returned for the
    /// remainder of the session.
    pub async fn load(&self) -> Result<Arc<SampleBuffer>, LoadError> {
        if let Some(buffer) = self.buffer() {
            return Ok(buffer);
        }

        self.status_tx.send_replace(LoadStatus::Loading);
        info!(url = self.url, "Fetching instrument sample.");

        let fetcher = self.fetcher.clone();
        let url = self.url.clone();
        let target_sample_rate = self.target_sample_rate;
        let result = tokio::task::spawn_blocking(move || -> Result<SampleBuffer, LoadError> {
            let bytes = fetcher.fetch(&url)?;
            debug!(bytes = bytes.len(), "Sample transfer complete.");

            let decoded = decode(bytes, &url)?;
            let mono = downmix_mono(&decoded.interleaved, decoded.channels);
            let frames = resample_linear(&mono, decoded.sample_rate, target_sample_rate);
            Ok(SampleBuffer::new(frames, target_sample_rate))
        })
        .await
        .map_err(|e| LoadError::Network(format!("sample load task failed: {}", e)))?;

        match result {
            Ok(buffer) => {
                let buffer = Arc::new(buffer);
                info!(
                    sample_rate = buffer.sample_rate(),
                    duration_ms = buffer.duration().as_millis(),
                    memory_kb = buffer.memory_size() / 1024,
                    "Sample ready."
                );
                *self.cached.write() = Some(buffer.clone());
                self.status_tx.send_replace(LoadStatus::Ready);
                Ok(buffer)
            }
            Err(e) => {
                warn!(err = %e, "Sample load failed.");
                self.status_tx
                    .send_replace(LoadStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }
}

impl fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleLoader")
            .field("url", &self.url)
            .field("status", &self.status())
            .field("target_sample_rate", &self.target_sample_rate)
            .finish()
    }
}

/// Interleaved audio decoded from the fetched bytes.
struct DecodedAudio {
    interleaved: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

/// Decodes the fetched bytes into interleaved f32 frames.
fn decode(bytes: Vec<u8>, origin: &str) -> Result<DecodedAudio, LoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    // A hint from the URL's extension helps the probe but is not required.
    let mut hint = Hint::new();
    if let Some(extension) = origin.rsplit('.').next().filter(|ext| ext.len() <= 4) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LoadError::Decode(format!("unrecognized audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| LoadError::Decode("sample rate not specified".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| LoadError::Decode(format!("unsupported codec: {}", e)))?;

    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut interleaved: Vec<f32> = Vec::new();
    let mut scratch: Option<DecoderSampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            // Some decoders report EOF as a decode error.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(LoadError::Decode(format!("error reading audio: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A malformed packet is skipped; the rest of the stream may
            // still decode.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(LoadError::Decode(format!("error decoding audio: {}", e))),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }
        if scratch.is_none() {
            scratch = Some(DecoderSampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buffer) = scratch.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buffer.samples());
        }
    }

    if interleaved.is_empty() || channels == 0 {
        return Err(LoadError::Decode("no audio frames decoded".to_string()));
    }

    Ok(DecodedAudio {
        interleaved,
        channels,
        sample_rate,
    })
}

/// Averages interleaved channels into mono frames.
fn downmix_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples mono frames with linear interpolation. Good enough for a
/// one-shot pluck; pitch shifting at playback reuses the same interpolation.
fn resample_linear(frames: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return frames.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (frames.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_frames);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let index = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        let s0 = frames.get(index).copied().unwrap_or(0.0);
        let s1 = frames.get(index + 1).copied().unwrap_or(s0);
        output.push(s0 + (s1 - s0) * frac);
    }

    output
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testutil::wav_bytes;

    use super::*;

    struct StaticFetcher {
        bytes: Vec<u8>,
        fetches: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(bytes: Vec<u8>) -> StaticFetcher {
            StaticFetcher {
                bytes,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, _: &str) -> Result<Vec<u8>, LoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }
    }

    /// Fails the first `failures` fetches, then serves the bytes.
    struct FlakyFetcher {
        bytes: Vec<u8>,
        failures: usize,
        attempts: AtomicUsize,
    }

    impl Fetcher for FlakyFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(LoadError::Network(format!(
                    "unexpected status 503 Service Unavailable fetching {}",
                    url
                )));
            }
            Ok(self.bytes.clone())
        }
    }

    #[tokio::test]
    async fn test_load_decodes_and_resamples() {
        let fetcher = Arc::new(StaticFetcher::new(wav_bytes(440.0, 0.1, 44100, 2)));
        let loader = SampleLoader::new(fetcher, "https://example.com/pluck.wav", 48000);
        assert_eq!(loader.status(), LoadStatus::Loading);

        let buffer = loader.load().await.expect("load should succeed");

        assert_eq!(loader.status(), LoadStatus::Ready);
        assert_eq!(buffer.sample_rate(), 48000);
        // 0.1s at 48kHz, mono.
        let expected = (0.1f64 * 48000.0).ceil() as usize;
        assert!(buffer.frame_count().abs_diff(expected) <= 2);
        assert!(buffer.data().iter().any(|sample| sample.abs() > 0.1));
    }

    #[tokio::test]
    async fn test_load_caches_buffer() {
        let fetcher = Arc::new(StaticFetcher::new(wav_bytes(220.0, 0.05, 48000, 1)));
        let loader = SampleLoader::new(fetcher.clone(), "https://example.com/pluck.wav", 48000);

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_is_decode_error() {
        let fetcher = Arc::new(StaticFetcher::new(vec![0u8; 64]));
        let loader = SampleLoader::new(fetcher, "https://example.com/pluck.wav", 48000);

        let result = loader.load().await;

        assert!(matches!(result, Err(LoadError::Decode(_))));
        assert!(matches!(loader.status(), LoadStatus::Error(_)));
        assert!(loader.buffer().is_none());
    }

    #[tokio::test]
    async fn test_retry_transitions_error_to_ready() {
        let fetcher = Arc::new(FlakyFetcher {
            bytes: wav_bytes(330.0, 0.05, 48000, 1),
            failures: 1,
            attempts: AtomicUsize::new(0),
        });
        let loader = SampleLoader::new(fetcher, "https://example.com/pluck.wav", 48000);

        let first = loader.load().await;
        assert!(matches!(first, Err(LoadError::Network(_))));
        assert!(matches!(loader.status(), LoadStatus::Error(_)));

        let second = loader.load().await;
        assert!(second.is_ok());
        assert_eq!(loader.status(), LoadStatus::Ready);
    }

    #[tokio::test]
    async fn test_status_transitions_observable() {
        let fetcher = Arc::new(StaticFetcher::new(wav_bytes(440.0, 0.05, 48000, 1)));
        let loader = SampleLoader::new(fetcher, "https://example.com/pluck.wav", 48000);
        let mut status_rx = loader.subscribe();

        loader.load().await.unwrap();

        status_rx
            .wait_for(|status| *status == LoadStatus::Ready)
            .await
            .expect("status channel should stay open");
    }

    #[test]
    fn test_downmix_mono_averages_channels() {
        let interleaved = vec![1.0, -1.0, 0.5, 0.5, 0.0, 1.0];
        let mono = downmix_mono(&interleaved, 2);
        assert_eq!(mono, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let frames = vec![0.25, -0.25, 0.75];
        assert_eq!(downmix_mono(&frames, 1), frames);
    }

    #[test]
    fn test_resample_identity_when_rates_match() {
        let frames = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&frames, 48000, 48000), frames);
    }

    #[test]
    fn test_resample_changes_frame_count() {
        let frames: Vec<f32> = (0..4410).map(|i| (i as f32 / 100.0).sin()).collect();
        let resampled = resample_linear(&frames, 44100, 48000);
        let expected = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(resampled.len(), expected);
    }
}
