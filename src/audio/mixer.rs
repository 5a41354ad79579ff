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

//! Core voice mixing, independent of any audio backend.
//!
//! New voices arrive on a channel so the trigger path never contends with
//! the output callback for the active-voice list. The mixer sums every
//! active voice into each output frame (the mono voice output is written to
//! all device channels) and drops voices once they report finished. There is
//! no voice cap and no backpressure; the per-string debounce upstream is the
//! only throttle.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::sampler::Voice;

/// The sending half of the voice channel, held by the audio sink.
pub type VoiceSender = crossbeam_channel::Sender<Voice>;

/// Mixes active voices into interleaved output buffers.
pub struct VoiceMixer {
    /// Incoming voices from the audio sink.
    voice_rx: crossbeam_channel::Receiver<Voice>,
    /// Voices currently playing.
    active: Mutex<Vec<Voice>>,
    /// Output channel count; every channel receives the same mono mix.
    channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// Total number of voices ever accepted. Diagnostic only.
    voices_started: AtomicU64,
}

impl VoiceMixer {
    /// Creates a mixer and the sender used to hand it new voices.
    pub fn new(channels: u16, sample_rate: u32) -> (VoiceMixer, VoiceSender) {
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        (
            VoiceMixer {
                voice_rx,
                active: Mutex::new(Vec::new()),
                channels,
                sample_rate,
                voices_started: AtomicU64::new(0),
            },
            voice_tx,
        )
    }

    /// The output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The output channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Fills an interleaved output buffer with the sum of all active voices.
    ///
    /// Called from the output callback (or directly by tests). Finished
    /// voices are reclaimed here.
    pub fn fill(&self, output: &mut [f32]) {
        output.fill(0.0);

        let mut active = self.active.lock();
        while let Ok(voice) = self.voice_rx.try_recv() {
            active.push(voice);
            self.voices_started.fetch_add(1, Ordering::Relaxed);
        }

        let channels = self.channels as usize;
        active.retain_mut(|voice| {
            let mut alive = true;
            for frame in output.chunks_mut(channels) {
                match voice.next_frame() {
                    Some(sample) => {
                        for out in frame.iter_mut() {
                            *out += sample;
                        }
                    }
                    None => {
                        alive = false;
                        break;
                    }
                }
            }
            alive
        });
    }

    /// The number of voices currently playing.
    pub fn active_voices(&self) -> usize {
        // Voices that were sent but not yet drained by fill() still count.
        self.active.lock().len() + self.voice_rx.len()
    }

    /// The total number of voices accepted since startup.
    /// Exported for diagnostics and testing.
    #[allow(dead_code)]
    pub fn voices_started(&self) -> u64 {
        self.voices_started.load(Ordering::Relaxed) + self.voice_rx.len() as u64
    }
}

impl std::fmt::Debug for VoiceMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceMixer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::sampler::SampleBuffer;

    use super::*;

    fn constant_buffer(value: f32, frames: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![value; frames], 48000))
    }

    fn voice(buffer: Arc<SampleBuffer>, pitch: f32) -> Voice {
        Voice::new(buffer, pitch, 1.0, Duration::from_secs(60))
    }

    #[test]
    fn test_fill_mixes_voice_into_all_channels() {
        let (mixer, voice_tx) = VoiceMixer::new(2, 48000);
        voice_tx
            .send(voice(constant_buffer(0.5, 1000), 1.0))
            .unwrap();

        let mut output = vec![1.0f32; 8];
        mixer.fill(&mut output);

        // The buffer is zeroed first, then both channels get the mono mix.
        for frame in output.chunks(2) {
            assert!((frame[0] - frame[1]).abs() < 1e-6);
            assert!(frame[0] > 0.4);
        }
        assert_eq!(mixer.active_voices(), 1);
        assert_eq!(mixer.voices_started(), 1);
    }

    #[test]
    fn test_overlapping_voices_sum() {
        let (mixer, voice_tx) = VoiceMixer::new(1, 48000);
        voice_tx
            .send(voice(constant_buffer(0.25, 1000), 1.0))
            .unwrap();
        voice_tx
            .send(voice(constant_buffer(0.25, 1000), 1.0))
            .unwrap();

        let mut output = vec![0.0f32; 4];
        mixer.fill(&mut output);

        for sample in output {
            assert!((sample - 0.5).abs() < 0.01);
        }
    }

    #[test]
    fn test_finished_voices_are_reclaimed() {
        let (mixer, voice_tx) = VoiceMixer::new(1, 48000);
        voice_tx.send(voice(constant_buffer(0.5, 16), 1.0)).unwrap();

        let mut output = vec![0.0f32; 32];
        mixer.fill(&mut output);

        assert_eq!(mixer.active_voices(), 0);
        // The tail past the end of the sample stays silent.
        assert!(output[20].abs() < 1e-6);
    }

    #[test]
    fn test_fill_without_voices_is_silence() {
        let (mixer, _voice_tx) = VoiceMixer::new(2, 48000);

        let mut output = vec![0.7f32; 16];
        mixer.fill(&mut output);

        assert!(output.iter().all(|sample| *sample == 0.0));
    }
}
