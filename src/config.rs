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
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;
use tracing::error;

use crate::audio;
use crate::audio::mixer::VoiceMixer;
use crate::catalog::{Catalog, CatalogError, InstrumentConfig};
use crate::controller::{keyboard, Controller};
use crate::events::EventBus;
use crate::sampler::{AudioSink, HttpFetcher, SampleLoader};
use crate::session::{Session, Tuning};
use crate::shutdown::Shutdown;
use crate::visual::{PresentationSink, PresentationState};

mod error;

pub use error::ConfigError;

/// The fixed sample asset fetched when the setup doesn't name one.
pub const DEFAULT_SAMPLE_URL: &str = "https://assets.mdwn.dev/strummer/string-pluck.wav";

/// A YAML representation of an instrument definition.
#[derive(Deserialize, Clone, Debug)]
pub struct Instrument {
    /// Identifier used for selection.
    id: String,

    /// Human-readable display name.
    name: String,

    /// Per-string playback rate multipliers.
    ratios: Vec<f32>,

    /// Per-string trigger keys.
    keys: Vec<String>,

    /// Descriptive text shown in listings.
    #[serde(default)]
    description: String,
}

impl Instrument {
    /// Validates the definition into an instrument configuration.
    pub fn to_config(&self) -> Result<InstrumentConfig, CatalogError> {
        InstrumentConfig::new(
            &self.id,
            &self.name,
            self.ratios.clone(),
            self.keys.iter().map(String::as_str).collect(),
            &self.description,
        )
    }
}

/// A YAML representation of the tuning overrides. Durations are
/// human-readable strings like "50ms".
#[derive(Deserialize, Clone, Debug, Default)]
pub struct TuningConfig {
    /// The per-string debounce window.
    retrigger_interval: Option<String>,

    /// Initial envelope gain for each voice.
    envelope_gain: Option<f32>,

    /// Time for a voice's envelope to decay to the floor.
    envelope_decay: Option<String>,

    /// How long a string shows as vibrating.
    string_vibrate: Option<String>,

    /// How long the body shows as resonating.
    body_resonance: Option<String>,

    /// Delay before the introductory strum.
    strum_start_delay: Option<String>,

    /// Stagger between strum notes.
    strum_stagger: Option<String>,
}

impl TuningConfig {
    /// Resolves the overrides over the built-in defaults.
    pub fn resolve(&self) -> Result<Tuning, ConfigError> {
        let mut tuning = Tuning::default();
        if let Some(value) = &self.retrigger_interval {
            tuning.retrigger_interval = parse_duration("retrigger_interval", value)?;
        }
        if let Some(gain) = self.envelope_gain {
            tuning.envelope_gain = gain;
        }
        if let Some(value) = &self.envelope_decay {
            tuning.envelope_decay = parse_duration("envelope_decay", value)?;
        }
        if let Some(value) = &self.string_vibrate {
            tuning.string_vibrate = parse_duration("string_vibrate", value)?;
        }
        if let Some(value) = &self.body_resonance {
            tuning.body_resonance = parse_duration("body_resonance", value)?;
        }
        if let Some(value) = &self.strum_start_delay {
            tuning.strum_start_delay = parse_duration("strum_start_delay", value)?;
        }
        if let Some(value) = &self.strum_stagger {
            tuning.strum_stagger = parse_duration("strum_stagger", value)?;
        }
        Ok(tuning)
    }
}

/// Parses a human-readable duration like "50ms".
fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    Ok(DurationString::from_string(value.to_string())
        .map_err(|e| ConfigError::BadDuration {
            field,
            message: e.to_string(),
        })?
        .into())
}

/// A YAML representation of the instrument setup.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Setup {
    /// The audio output device name. None selects the default output.
    audio_device: Option<String>,

    /// The URL of the shared instrument sample.
    sample_url: Option<String>,

    /// An instrument to select automatically once the sample is ready.
    instrument: Option<String>,

    /// Tuning overrides.
    #[serde(default)]
    tuning: TuningConfig,

    /// Extra instrument definitions merged into the built-in catalog.
    #[serde(default)]
    instruments: Vec<Instrument>,
}

impl Setup {
    /// The audio device name, if configured.
    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    /// The sample URL, falling back to the fixed default asset.
    pub fn sample_url(&self) -> &str {
        self.sample_url.as_deref().unwrap_or(DEFAULT_SAMPLE_URL)
    }

    /// The instrument to auto-select, if configured.
    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    /// The resolved tuning.
    pub fn tuning(&self) -> Result<Tuning, ConfigError> {
        self.tuning.resolve()
    }

    /// The built-in catalog extended with the setup's extra instruments.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let mut catalog = Catalog::built_in();
        for instrument in self.instruments.iter() {
            catalog.add(instrument.to_config()?);
        }
        Ok(catalog)
    }
}

/// Parses a setup from a YAML file.
pub fn parse_setup(file: &Path) -> Result<Setup, ConfigError> {
    Ok(serde_yml::from_str(&fs::read_to_string(file)?)?)
}

/// Initializes the full instrument from the given setup and returns the
/// controller, which can be waited on until the player quits.
///
/// Wiring, in order: the output device fixes the mixer format; the loader
/// resamples to the device rate; the trigger event stream feeds the audio
/// sink (voices) and the presentation sink (flags) independently; the
/// keyboard driver feeds the controller, which routes into the session.
pub fn init_session_and_controller(setup: &Setup) -> Result<Controller, Box<dyn Error>> {
    let shutdown = Shutdown::new();
    let events = EventBus::new();

    let device = audio::get_device(setup.audio_device())?;
    let (mixer, voice_tx) = VoiceMixer::new(device.channels(), device.sample_rate());
    device.start(Arc::new(mixer), shutdown.clone())?;

    let loader = Arc::new(SampleLoader::new(
        Arc::new(HttpFetcher::new()),
        setup.sample_url(),
        device.sample_rate(),
    ));

    let tuning = setup.tuning()?;
    let presentation = Arc::new(PresentationState::new(0));
    PresentationSink::new(
        presentation.clone(),
        tuning.string_vibrate,
        tuning.body_resonance,
    )
    .run(events.subscribe());

    // The audio sink needs the decoded buffer; it subscribes now (so no
    // trigger is ever missed) and starts once the loader reports ready.
    {
        let loader = loader.clone();
        let audio_events = events.subscribe();
        let decay = tuning.envelope_decay;
        tokio::spawn(async move {
            let mut status_rx = loader.subscribe();
            let ready = status_rx
                .wait_for(|status| *status == crate::sampler::LoadStatus::Ready)
                .await;
            if ready.is_err() {
                return;
            }
            if let Some(buffer) = loader.buffer() {
                AudioSink::new(buffer, voice_tx, decay).run(audio_events);
            }
        });
    }

    let session = Arc::new(Session::new(
        setup.catalog()?,
        loader.clone(),
        events,
        presentation,
        tuning,
    ));

    // Kick off the initial load, then auto-select if the setup asks for it.
    {
        let loader = loader.clone();
        let session = session.clone();
        let instrument = setup.instrument().map(String::from);
        tokio::spawn(async move {
            if loader.load().await.is_ok() {
                if let Some(id) = instrument {
                    if let Err(e) = session.select_instrument(&id) {
                        error!(err = %e, "Unable to auto-select instrument.");
                    }
                }
            }
        });
    }

    let controller = Controller::new(
        session,
        loader,
        Arc::new(keyboard::Driver::new()),
        shutdown,
    )?;
    Ok(controller)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_setup() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"
audio_device: mock-device
sample_url: https://example.com/custom.wav
instrument: 6-string
tuning:
  retrigger_interval: 75ms
  envelope_gain: 0.5
  strum_stagger: 100ms
instruments:
  - id: 2-string
    name: Diddley Bow Twins
    ratios: [1.0, 1.5]
    keys: [n, m]
"#
        )?;

        let setup = parse_setup(file.path())?;

        assert_eq!(setup.audio_device(), Some("mock-device"));
        assert_eq!(setup.sample_url(), "https://example.com/custom.wav");
        assert_eq!(setup.instrument(), Some("6-string"));

        let tuning = setup.tuning()?;
        assert_eq!(tuning.retrigger_interval, Duration::from_millis(75));
        assert_eq!(tuning.envelope_gain, 0.5);
        assert_eq!(tuning.strum_stagger, Duration::from_millis(100));
        // Unset fields keep their defaults.
        assert_eq!(tuning.strum_start_delay, crate::session::STRUM_START_DELAY);

        let catalog = setup.catalog()?;
        let two = catalog.get("2-string").expect("extra instrument");
        assert_eq!(two.string_count(), 2);
        assert_eq!(two.string_for_key("M"), Some(1));
        Ok(())
    }

    #[test]
    fn test_default_setup() {
        let setup = Setup::default();
        assert_eq!(setup.sample_url(), DEFAULT_SAMPLE_URL);
        assert_eq!(setup.audio_device(), None);
        assert!(setup.tuning().is_ok());
    }

    #[test]
    fn test_bad_duration_is_typed_error() {
        let setup: Setup = serde_yml::from_str(
            r#"
tuning:
  retrigger_interval: not-a-duration
"#,
        )
        .unwrap();

        assert!(matches!(
            setup.tuning(),
            Err(ConfigError::BadDuration {
                field: "retrigger_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_extra_instrument_rejected() {
        let setup: Setup = serde_yml::from_str(
            r#"
instruments:
  - id: broken
    name: Broken
    ratios: [1.0, 2.0]
    keys: [a]
"#,
        )
        .unwrap();

        assert!(matches!(
            setup.catalog(),
            Err(ConfigError::Instrument(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = parse_setup(Path::new("/nonexistent/setup.yaml"));
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
