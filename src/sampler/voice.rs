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

//! Voices: independent playback instances of the shared sample.
//!
//! A voice reads the buffer at a fractional rate (the pitch multiplier) with
//! linear interpolation and shapes the result with an exponential decay
//! envelope. Voices are fire-and-forget: nothing stops one early, it plays
//! until the sample runs out or the envelope hits its floor, then the mixer
//! reclaims it. Overlapping voices on the same string layer rather than cut.

use std::sync::Arc;
use std::time::Duration;

use super::loader::SampleBuffer;

/// Default initial envelope gain for a triggered voice.
pub const ENVELOPE_INITIAL_GAIN: f32 = 0.8;

/// The envelope floor. Exponential decay must target a strictly positive
/// value; a voice whose gain reaches the floor is finished.
pub const ENVELOPE_FLOOR: f32 = 1e-4;

/// Time for the envelope to decay from its initial gain to the floor.
pub const ENVELOPE_DECAY: Duration = Duration::from_millis(2500);

/// An exponential decay envelope.
struct Envelope {
    gain: f32,
    decay_per_frame: f32,
}

impl Envelope {
    /// Creates an envelope that decays from `initial` to [`ENVELOPE_FLOOR`]
    /// over `decay` at the given sample rate.
    fn exponential(initial: f32, decay: Duration, sample_rate: u32) -> Envelope {
        let frames = (sample_rate as f64 * decay.as_secs_f64()).max(1.0);
        let decay_per_frame = (ENVELOPE_FLOOR as f64 / initial as f64).powf(1.0 / frames) as f32;
        Envelope {
            gain: initial,
            decay_per_frame,
        }
    }

    /// Returns the gain for the current frame and advances the decay.
    fn next(&mut self) -> f32 {
        let gain = self.gain;
        self.gain *= self.decay_per_frame;
        gain
    }

    /// True once the gain has decayed to the floor.
    fn is_exhausted(&self) -> bool {
        self.gain <= ENVELOPE_FLOOR
    }
}

/// One playback instance of the shared sample.
pub struct Voice {
    buffer: Arc<SampleBuffer>,
    /// Fractional read position into the buffer, in frames.
    position: f64,
    /// Frames advanced per output frame; this is the pitch multiplier.
    step: f64,
    envelope: Envelope,
}

impl Voice {
    /// Creates a voice playing `buffer` at the given pitch multiplier.
    ///
    /// `gain` is the initial envelope level; `decay` is the time to reach
    /// the envelope floor. Callers must only pass finite parameters; the
    /// trigger engine rejects non-finite ones before a voice is built.
    pub fn new(buffer: Arc<SampleBuffer>, pitch: f32, gain: f32, decay: Duration) -> Voice {
        let sample_rate = buffer.sample_rate();
        Voice {
            buffer,
            position: 0.0,
            step: pitch as f64,
            envelope: Envelope::exponential(gain, decay, sample_rate),
        }
    }

    /// Produces the next mono output frame, or None once the voice has
    /// finished and should be reclaimed.
    pub fn next_frame(&mut self) -> Option<f32> {
        if self.is_finished() {
            return None;
        }

        let data = self.buffer.data();
        let index = self.position.floor() as usize;
        let frac = (self.position - index as f64) as f32;

        let s0 = data.get(index).copied().unwrap_or(0.0);
        let s1 = data.get(index + 1).copied().unwrap_or(s0);
        let sample = s0 + (s1 - s0) * frac;

        self.position += self.step;
        Some(sample * self.envelope.next())
    }

    /// True once the sample is exhausted or the envelope has hit its floor.
    pub fn is_finished(&self) -> bool {
        self.envelope.is_exhausted() || self.position >= self.buffer.frame_count() as f64
    }
}
