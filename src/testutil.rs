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
use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::sampler::{Fetcher, LoadError, SampleLoader};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Builds an in-memory WAV file holding a sine tone.
pub fn wav_bytes(frequency: f32, duration_seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("failed to create wav writer");
        let frames = (sample_rate as f32 * duration_seconds) as usize;
        for frame in 0..frames {
            let t = frame as f32 / sample_rate as f32;
            let sample = 0.8 * (2.0 * PI * frequency * t).sin();
            for _ in 0..channels {
                writer
                    .write_sample(sample)
                    .expect("failed to write wav sample");
            }
        }
        writer.finalize().expect("failed to finalize wav");
    }

    cursor.into_inner()
}

/// A fetcher that always serves the same canned bytes.
pub struct BytesFetcher(pub Vec<u8>);

impl Fetcher for BytesFetcher {
    fn fetch(&self, _: &str) -> Result<Vec<u8>, LoadError> {
        Ok(self.0.clone())
    }
}

/// A loader whose sample has already loaded.
pub async fn ready_loader(sample_rate: u32) -> Arc<SampleLoader> {
    let loader = Arc::new(SampleLoader::new(
        Arc::new(BytesFetcher(wav_bytes(440.0, 0.05, sample_rate, 1))),
        "https://example.com/pluck.wav",
        sample_rate,
    ));
    loader.load().await.expect("test sample must load");
    loader
}

/// A loader that has never been asked to load; its status stays loading.
pub fn unready_loader(sample_rate: u32) -> Arc<SampleLoader> {
    Arc::new(SampleLoader::new(
        Arc::new(BytesFetcher(Vec::new())),
        "https://example.com/pluck.wav",
        sample_rate,
    ))
}
