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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const DOWN: &str = "down";
const UP: &str = "up";
const PLUCK: &str = "pluck";
const HOVER: &str = "hover";
const USE: &str = "use";
const MENU: &str = "menu";
const RETRY: &str = "retry";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// Marks a key-down line as an OS key repeat, for surfaces that deliver
/// repeats as distinct lines.
const REPEAT: &str = "repeat";

/// A controller driver that reads input events from stdin.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and routes one input line. Returns false once the reader is
    /// exhausted, after sending a quit event.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} <key>, {} <key>, {} <string>, {} <string>, {} <instrument>, {}, {}, {}, {}): ",
            DOWN, UP, PLUCK, HOVER, USE, MENU, RETRY, STATUS, QUIT,
        )?;
        writer.flush()?;

        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        let mut tokens = input.split_whitespace();
        let event = match tokens.next() {
            Some(command) => match command.to_lowercase().as_str() {
                DOWN => match tokens.next() {
                    Some(key) => Some(Event::KeyDown {
                        key: key.to_string(),
                        repeat: tokens.next() == Some(REPEAT),
                    }),
                    None => {
                        warn!("down requires a key");
                        None
                    }
                },
                UP => match tokens.next() {
                    Some(key) => Some(Event::KeyUp {
                        key: key.to_string(),
                    }),
                    None => {
                        warn!("up requires a key");
                        None
                    }
                },
                PLUCK | HOVER => match tokens.next().map(str::parse::<usize>) {
                    Some(Ok(string)) => {
                        if command.to_lowercase() == PLUCK {
                            Some(Event::Pluck { string })
                        } else {
                            Some(Event::Hover { string })
                        }
                    }
                    _ => {
                        warn!(input = input.trim(), "pluck/hover require a string index");
                        None
                    }
                },
                USE => match tokens.next() {
                    Some(instrument) => Some(Event::Select {
                        instrument: instrument.to_string(),
                    }),
                    None => {
                        warn!("use requires an instrument id");
                        None
                    }
                },
                MENU => Some(Event::Menu),
                RETRY => Some(Event::Retry),
                STATUS => Some(Event::Status),
                QUIT => Some(Event::Quit),
                _ => {
                    warn!(input = input.trim(), "Unrecognized input");
                    None
                }
            },
            None => None,
        };

        if let Some(event) = event {
            events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::*;

    fn get_event(line: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(line.as_bytes());
        let writer = BufWriter::new(Vec::new());
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(
            Some(Event::KeyDown {
                key: "a".to_string(),
                repeat: false
            }),
            get_event("down a")?
        );
        assert_eq!(
            Some(Event::KeyDown {
                key: "a".to_string(),
                repeat: true
            }),
            get_event("down a repeat")?
        );
        assert_eq!(
            Some(Event::KeyUp {
                key: "a".to_string()
            }),
            get_event("up a")?
        );
        assert_eq!(Some(Event::Pluck { string: 2 }), get_event("pluck 2")?);
        assert_eq!(Some(Event::Hover { string: 0 }), get_event("hover 0")?);
        assert_eq!(
            Some(Event::Select {
                instrument: "6-string".to_string()
            }),
            get_event("use 6-string")?
        );
        assert_eq!(Some(Event::Menu), get_event("menu")?);
        assert_eq!(Some(Event::Retry), get_event("retry")?);
        assert_eq!(Some(Event::Status), get_event("status")?);
        assert_eq!(Some(Event::Quit), get_event("quit")?);
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("pluck two")?);
        assert_eq!(None, get_event("down")?);
        Ok(())
    }

    #[test]
    fn test_exhausted_reader_quits() -> Result<(), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new("".as_bytes());
        let writer = BufWriter::new(Vec::new());

        let keep_going = Driver::monitor_io(&sender, reader, writer)?;

        assert!(!keep_going);
        drop(sender);
        assert_eq!(Some(Event::Quit), receiver.blocking_recv());
        Ok(())
    }
}
