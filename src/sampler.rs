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

//! Sample playback for the instrument.
//!
//! This module provides:
//! - Fetching and decoding the single shared instrument sample
//! - Envelope-shaped, pitch-scaled voices over that sample
//! - Trigger validation (bounds, debounce, finiteness) and event emission

mod engine;
mod loader;
mod voice;

pub use engine::{AudioSink, Trigger, TriggerEngine, MIN_RETRIGGER_INTERVAL, PITCH_SCALE};
pub use loader::{Fetcher, HttpFetcher, LoadError, LoadStatus, SampleBuffer, SampleLoader};
pub use voice::{Voice, ENVELOPE_DECAY, ENVELOPE_FLOOR, ENVELOPE_INITIAL_GAIN};
