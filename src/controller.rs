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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, Level};

use crate::sampler::SampleLoader;
use crate::session::Session;
use crate::shutdown::Shutdown;

pub mod keyboard;

/// Input events routed into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A physical key was pressed. `repeat` is set for OS key repeats,
    /// which never retrigger.
    KeyDown { key: String, repeat: bool },

    /// A physical key was released.
    KeyUp { key: String },

    /// A pointer press on a string's hit region.
    Pluck { string: usize },

    /// A pointer hover onto a string's hit region.
    Hover { string: usize },

    /// Selects an instrument and starts the session.
    Select { instrument: String },

    /// Returns the session to the menu.
    Menu,

    /// Retries the sample load after a failure.
    Retry,

    /// Logs the loader and session status.
    Status,

    /// Ends the session and shuts the instrument down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Routes driver events into a session.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        session: Arc<Session>,
        loader: Arc<SampleLoader>,
        driver: Arc<dyn Driver>,
        shutdown: Shutdown,
    ) -> Result<Controller, Box<dyn Error>> {
        Ok(Controller {
            handle: tokio::spawn(async move {
                Controller::route_events(session, loader, driver, shutdown).await
            }),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies driver events to the session until the driver closes or a
    /// quit event arrives, then requests shutdown.
    async fn route_events(
        session: Arc<Session>,
        loader: Arc<SampleLoader>,
        driver: Arc<dyn Driver>,
        shutdown: Shutdown,
    ) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!("Controller started.");

        loop {
            match events_rx.recv().await {
                Some(Event::Quit) => {
                    info!("Quit received.");
                    break;
                }
                Some(event) => {
                    debug!(event = ?event, "Received input event.");
                    match event {
                        Event::KeyDown { key, repeat } => {
                            session.key_down(&key, repeat);
                        }
                        Event::KeyUp { key } => session.key_up(&key),
                        Event::Pluck { string } => {
                            session.pluck(string);
                        }
                        Event::Hover { string } => {
                            session.hover(string);
                        }
                        Event::Select { instrument } => {
                            if let Err(e) = session.select_instrument(&instrument) {
                                error!(err = %e, "Unable to start the session.");
                            }
                        }
                        Event::Menu => session.return_to_menu(),
                        Event::Retry => {
                            if let Err(e) = loader.load().await {
                                error!(err = %e, "Sample retry failed.");
                            }
                        }
                        Event::Status => info!(
                            load = %loader.status(),
                            state = ?session.state(),
                            instrument = ?session
                                .current_instrument()
                                .map(|instrument| instrument.id().to_string()),
                            active_keys = session.active_keys().len(),
                            vibrating = ?session.presentation().vibrating(),
                            body = session.presentation().body_resonating(),
                            "Session status."
                        ),
                        Event::Quit => unreachable!("handled above"),
                    }
                }
                None => {
                    info!("Controller closing.");
                    if let Err(e) = join_handle.await {
                        error!("Error waiting for event monitor to stop: {}", e);
                    }
                    break;
                }
            }
        }

        shutdown.request();
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Barrier, Mutex};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::catalog::Catalog;
    use crate::events::EventBus;
    use crate::session::{SessionState, Tuning};
    use crate::testutil::{eventually, ready_loader};
    use crate::visual::PresentationState;

    use super::*;

    struct TestDriver {
        current_event: Arc<Mutex<Option<Event>>>,
        barrier: Arc<Barrier>,
    }

    impl TestDriver {
        /// Creates a driver explicitly stepped by next_event.
        fn new() -> TestDriver {
            TestDriver {
                current_event: Arc::new(Mutex::new(None)),
                barrier: Arc::new(Barrier::new(2)),
            }
        }

        /// Hands the next event to the monitor thread. None closes it.
        fn next_event(&self, event: Option<Event>) {
            {
                let mut current_event = self.current_event.lock().expect("failed to get lock");
                *current_event = event;
            }
            // Wait until the thread goes to receive the event.
            self.barrier.wait();
            // Wait until the thread has taken the event.
            self.barrier.wait();
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let barrier = self.barrier.clone();
            let current_event = self.current_event.clone();
            tokio::task::spawn_blocking(move || loop {
                barrier.wait();
                let event = current_event
                    .lock()
                    .expect("failed to get lock")
                    .take();
                barrier.wait();
                match event {
                    Some(event) => assert!(events_tx.blocking_send(event).is_ok()),
                    None => return Ok(()),
                }
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_drives_session() -> Result<(), Box<dyn Error>> {
        let loader = ready_loader(48000).await;
        let events = EventBus::new();
        let session = Arc::new(crate::session::Session::new(
            Catalog::built_in(),
            loader.clone(),
            events,
            Arc::new(PresentationState::new(0)),
            Tuning::default(),
        ));
        let shutdown = Shutdown::new();
        let driver = Arc::new(TestDriver::new());
        let mut controller =
            Controller::new(session.clone(), loader, driver.clone(), shutdown.clone())?;

        driver.next_event(Some(Event::Select {
            instrument: "6-string".to_string(),
        }));
        eventually(
            || session.state() == SessionState::Started,
            "Session never started",
        );

        driver.next_event(Some(Event::KeyDown {
            key: "a".to_string(),
            repeat: false,
        }));
        eventually(
            || session.active_keys() == vec!["a".to_string()],
            "Key never became active",
        );

        driver.next_event(Some(Event::KeyUp {
            key: "a".to_string(),
        }));
        eventually(
            || session.active_keys().is_empty(),
            "Key never released",
        );

        driver.next_event(Some(Event::Menu));
        eventually(
            || session.state() == SessionState::NotStarted,
            "Session never returned to menu",
        );

        // Closing the driver shuts the controller down.
        driver.next_event(None);
        assert!(controller.join().await.is_ok(), "Error waiting for controller");
        assert!(shutdown.is_requested());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit_event_requests_shutdown() -> Result<(), Box<dyn Error>> {
        let loader = ready_loader(48000).await;
        let session = Arc::new(crate::session::Session::new(
            Catalog::built_in(),
            loader.clone(),
            EventBus::new(),
            Arc::new(PresentationState::new(0)),
            Tuning::default(),
        ));
        let shutdown = Shutdown::new();
        let driver = Arc::new(TestDriver::new());
        let mut controller =
            Controller::new(session, loader, driver.clone(), shutdown.clone())?;

        driver.next_event(Some(Event::Quit));

        assert!(controller.join().await.is_ok());
        assert!(shutdown.is_requested());

        // Let the monitor thread exit so the runtime can shut down.
        driver.next_event(None);
        Ok(())
    }
}
