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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
};

/// A shutdown handle shared by the output stream thread and the controller.
///
/// This is the only teardown mechanism in the instrument: voices and visual
/// clear timers are fire-and-forget and cannot be cancelled, so shutdown is
/// a whole-process concern, not a per-voice one.
#[derive(Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    gate: Arc<(Mutex<()>, Condvar)>,
}

impl Shutdown {
    /// Creates a new shutdown handle.
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    /// Returns true once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Requests shutdown and wakes every waiter.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let (lock, condvar) = &*self.gate;
        let _guard = lock.lock().expect("Error getting lock");
        condvar.notify_all();
    }

    /// Blocks the calling thread until shutdown is requested.
    pub fn wait(&self) {
        let (lock, condvar) = &*self.gate;
        let mut guard = lock.lock().expect("Error getting lock");
        while !self.is_requested() {
            guard = condvar.wait(guard).expect("Error getting lock");
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_request_wakes_waiter() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());

        let join = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.wait())
        };

        shutdown.request();
        assert!(join.join().is_ok());
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_wait_after_request_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.request();
        shutdown.wait();
    }
}
