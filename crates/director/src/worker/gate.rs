use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::recover_poisoned;

#[derive(Debug, Default)]
struct GateState {
    pause_requested: bool,
    parked: bool,
    killed: bool,
}

/// Pause/resume/kill handshake between the owning thread and the worker.
///
/// Every transition happens under one mutex and every wait re-checks its
/// predicate, so a resume issued before the worker parks is never lost.
#[derive(Debug, Default)]
pub struct PauseGate {
    state: Mutex<GateState>,
    signal: Condvar,
}

impl PauseGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        recover_poisoned(self.state.lock(), "pause_gate")
    }

    /// Asks the worker to park at its next checkpoint. Does not block.
    pub fn request_pause(&self) {
        let mut state = self.lock();
        state.pause_requested = true;
        self.signal.notify_all();
    }

    /// Blocks until the worker has parked. Returns `false` when the worker is
    /// gone or the request was withdrawn before it parked.
    pub fn wait_until_paused(&self) -> bool {
        let mut state = self.lock();
        while state.pause_requested && !state.parked && !state.killed {
            state = recover_poisoned(self.signal.wait(state), "pause_gate");
        }
        state.parked
    }

    pub fn pause(&self) -> bool {
        self.request_pause();
        self.wait_until_paused()
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        state.pause_requested = false;
        self.signal.notify_all();
    }

    pub fn kill(&self) {
        let mut state = self.lock();
        state.killed = true;
        self.signal.notify_all();
    }

    pub fn is_killed(&self) -> bool {
        self.lock().killed
    }

    pub fn is_parked(&self) -> bool {
        self.lock().parked
    }

    /// Worker side. Parks while a pause is requested; `false` once killed.
    pub(crate) fn checkpoint(&self) -> bool {
        let mut state = self.lock();
        while state.pause_requested && !state.killed {
            if !state.parked {
                state.parked = true;
                self.signal.notify_all();
            }
            state = recover_poisoned(self.signal.wait(state), "pause_gate");
        }
        state.parked = false;
        !state.killed
    }

    /// Worker side. Sleeps up to `duration`, waking early on a pause request
    /// or kill; `false` once killed.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.lock();
        while !state.killed && !state.pause_requested {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (next, _) =
                recover_poisoned(self.signal.wait_timeout(state, deadline - now), "pause_gate");
            state = next;
        }
        !state.killed
    }
}

/// Marks the gate killed when the worker leaves its loop, panics included.
pub(crate) struct ExitGuard<'a>(pub(crate) &'a PauseGate);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.killed = true;
        state.parked = false;
        self.0.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn resume_before_worker_parks_is_not_lost() {
        let gate = PauseGate::default();
        gate.request_pause();
        gate.resume();

        assert!(gate.checkpoint());
        assert!(!gate.is_parked());
    }

    #[test]
    fn pause_blocks_until_worker_parks_then_resume_releases_it() {
        let gate = Arc::new(PauseGate::default());
        let worker_gate = Arc::clone(&gate);
        let worker = thread::spawn(move || {
            while worker_gate.checkpoint() {
                if !worker_gate.sleep(Duration::from_millis(1)) {
                    break;
                }
            }
        });

        assert!(gate.pause());
        assert!(gate.is_parked());
        gate.resume();
        gate.kill();

        worker.join().expect("worker thread");
        assert!(!gate.is_parked());
    }

    #[test]
    fn kill_wakes_a_long_sleep() {
        let gate = Arc::new(PauseGate::default());
        let worker_gate = Arc::clone(&gate);
        let started = Instant::now();
        let worker = thread::spawn(move || worker_gate.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        gate.kill();

        assert!(!worker.join().expect("worker thread"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn wait_returns_false_once_worker_exits() {
        let gate = Arc::new(PauseGate::default());
        let worker_gate = Arc::clone(&gate);
        let worker = thread::spawn(move || {
            let _exit = ExitGuard(&worker_gate);
        });
        worker.join().expect("worker thread");

        assert!(!gate.pause());
        assert!(gate.is_killed());
    }
}
