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
mod artwork;
mod audio;
mod catalog;
mod config;
mod controller;
mod events;
mod sampler;
mod session;
mod shutdown;
#[cfg(test)]
mod testutil;
mod visual;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;

use crate::artwork::ArtworkClient;
use crate::audio::mixer::VoiceMixer;
use crate::catalog::Catalog;
use crate::config::Setup;
use crate::events::EventBus;
use crate::sampler::{AudioSink, HttpFetcher, SampleLoader};
use crate::session::{Session, Tuning};
use crate::shutdown::Shutdown;
use crate::visual::{PresentationSink, PresentationState};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A virtual string instrument."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the built-in instrument configurations.
    Instruments {},
    /// Lists the available audio output devices.
    Devices {},
    /// Plays an instrument's introductory strum, then exits.
    Play {
        /// The instrument to play, e.g. 6-string.
        instrument: String,
        /// The audio output device name. Defaults to the system output.
        #[arg(short, long)]
        device: Option<String>,
        /// The sample URL to fetch.
        #[arg(short, long)]
        sample_url: Option<String>,
    },
    /// Starts the interactive instrument.
    Start {
        /// The path to the setup file.
        setup_path: Option<String>,
    },
    /// Generates marketing artwork from a text prompt.
    Artwork {
        /// The image prompt.
        prompt: String,
        /// Where to write the image.
        #[arg(short, long, default_value = "artwork.png")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Instruments {} => {
            let catalog = Catalog::built_in();

            println!("Instruments:");
            for instrument in catalog.list() {
                println!("- {}", instrument);
                println!("  {}", instrument.description());
                println!("  ratios: {:?}", instrument.ratios());
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            instrument,
            device,
            sample_url,
        } => {
            let shutdown = Shutdown::new();
            let events = EventBus::new();

            let device = audio::get_device(device.as_deref())?;
            let (mixer, voice_tx) = VoiceMixer::new(device.channels(), device.sample_rate());
            device.start(Arc::new(mixer), shutdown.clone())?;

            let url = sample_url.unwrap_or_else(|| config::DEFAULT_SAMPLE_URL.to_string());
            let loader = Arc::new(SampleLoader::new(
                Arc::new(HttpFetcher::new()),
                &url,
                device.sample_rate(),
            ));

            let tuning = Tuning::default();
            let presentation = Arc::new(PresentationState::new(0));
            PresentationSink::new(
                presentation.clone(),
                tuning.string_vibrate,
                tuning.body_resonance,
            )
            .run(events.subscribe());

            let audio_events = events.subscribe();
            let buffer = loader.load().await?;
            AudioSink::new(buffer, voice_tx, tuning.envelope_decay).run(audio_events);

            let session = Session::new(
                Catalog::built_in(),
                loader,
                events,
                presentation,
                tuning.clone(),
            );
            session.select_instrument(&instrument)?;

            // Linger for the strum plus the final voice's decay.
            let strings = session
                .current_instrument()
                .map(|config| config.string_count())
                .unwrap_or(0);
            let wait = tuning.strum_start_delay
                + tuning.strum_stagger * strings.saturating_sub(1) as u32
                + tuning.envelope_decay
                + Duration::from_millis(250);
            info!(instrument, wait_ms = wait.as_millis(), "Strumming.");
            tokio::time::sleep(wait).await;

            shutdown.request();
        }
        Commands::Start { setup_path } => {
            let setup = match setup_path {
                Some(setup_path) => config::parse_setup(Path::new(&setup_path))?,
                None => Setup::default(),
            };

            config::init_session_and_controller(&setup)?.join().await?;
        }
        Commands::Artwork { prompt, output } => {
            let api_key = std::env::var(artwork::API_KEY_ENV)
                .map_err(|_| format!("{} must be set", artwork::API_KEY_ENV))?;

            let bytes = tokio::task::spawn_blocking(move || {
                ArtworkClient::new(artwork::DEFAULT_ENDPOINT, &api_key).generate(&prompt)
            })
            .await??;

            std::fs::write(&output, &bytes)?;
            println!("Wrote {} bytes to {}.", bytes.len(), output);
        }
    }

    Ok(())
}
