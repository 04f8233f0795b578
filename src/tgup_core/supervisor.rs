use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use super::cancel::CancelToken;
use super::discovery::Discovery;
use super::dispatcher::Dispatcher;
use super::notifier::Notifier;
use super::pause::PauseGate;

/// Owns the cancellation token and the pause gate, and keeps handles to the
/// long-lived pipeline threads so watch mode can join them on shutdown.
pub struct Supervisor {
    cancel: CancelToken,
    pause_gate: Arc<PauseGate>,
    handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(cancel: CancelToken, pause_gate: Arc<PauseGate>) -> Self {
        Self {
            cancel,
            pause_gate,
            handles: Vec::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn pause_gate(&self) -> Arc<PauseGate> {
        self.pause_gate.clone()
    }

    pub fn pause(&self) {
        self.pause_gate.close();
    }

    pub fn resume(&self) {
        self.pause_gate.open();
    }

    pub fn spawn_discovery(&mut self, discovery: Discovery) -> Result<()> {
        let handle = thread::Builder::new()
            .name("tgup-discovery".to_string())
            .spawn(move || discovery.run())
            .context("failed to spawn discovery thread")?;
        self.handles.push(handle);
        Ok(())
    }

    pub fn spawn_dispatcher(&mut self, dispatcher: Dispatcher) -> Result<()> {
        let handle = thread::Builder::new()
            .name("tgup-dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .context("failed to spawn dispatcher thread")?;
        self.handles.push(handle);
        Ok(())
    }

    pub fn spawn_notifier(&mut self, notifier: Notifier) -> Result<()> {
        let handle = thread::Builder::new()
            .name("tgup-notifier".to_string())
            .spawn(move || notifier.run())
            .context("failed to spawn notifier thread")?;
        self.handles.push(handle);
        Ok(())
    }

    /// Block until every pipeline thread has exited (they do so within one
    /// suspension point of the token firing).
    pub fn join(mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                eprintln!("pipeline thread panicked during shutdown");
            }
        }
    }

    pub fn cancel_and_join(self) {
        self.cancel.cancel();
        self.join();
    }
}

/// Wire process signals into the token and the gate:
/// SIGINT/SIGTERM cancel (a second SIGINT forces exit), SIGUSR1 pauses,
/// SIGUSR2 resumes. Handlers only flip atomics; a watcher thread applies
/// them, since condvar notification is not async-signal-safe.
#[cfg(unix)]
pub fn install_signal_handlers(cancel: CancelToken, pause_gate: Arc<PauseGate>) -> Result<()> {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    static SIGINT_COUNT: AtomicU32 = AtomicU32::new(0);
    static PAUSE_REQUESTED: AtomicBool = AtomicBool::new(false);
    static RESUME_REQUESTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_signal(signum: libc::c_int) {
        match signum {
            libc::SIGINT | libc::SIGTERM => {
                SIGINT_COUNT.fetch_add(1, Ordering::SeqCst);
            }
            libc::SIGUSR1 => PAUSE_REQUESTED.store(true, Ordering::SeqCst),
            libc::SIGUSR2 => RESUME_REQUESTED.store(true, Ordering::SeqCst),
            _ => {}
        }
    }

    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: installs a handler that only touches static atomics.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGUSR1, handler);
        libc::signal(libc::SIGUSR2, handler);
    }

    thread::Builder::new()
        .name("tgup-signals".to_string())
        .spawn(move || {
            loop {
                thread::sleep(Duration::from_millis(100));
                let interrupts = SIGINT_COUNT.load(Ordering::SeqCst);
                if interrupts >= 2 {
                    eprintln!("second interrupt, exiting immediately");
                    std::process::exit(130);
                }
                if interrupts >= 1 && !cancel.is_cancelled() {
                    eprintln!("interrupt received, shutting down (press again to force)");
                    cancel.cancel();
                }
                if PAUSE_REQUESTED.swap(false, Ordering::SeqCst) {
                    eprintln!("pause requested, parking discovery and dispatch");
                    pause_gate.close();
                }
                if RESUME_REQUESTED.swap(false, Ordering::SeqCst) {
                    eprintln!("resume requested");
                    pause_gate.open();
                }
            }
        })
        .context("failed to spawn signal watcher thread")?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers(_cancel: CancelToken, _pause_gate: Arc<PauseGate>) -> Result<()> {
    Ok(())
}
