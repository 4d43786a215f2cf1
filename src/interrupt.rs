//! Operator interrupts.
//!
//! The pipeline polls a [`CancelFlag`] between ranking pages, between artist
//! resolutions and before touching the playlist. [`KeyboardWatcher`] flips the
//! flag when Esc, `q` or Ctrl-C is pressed; [`SignalHandler`] flips it on
//! SIGINT or SIGTERM, which covers runs without a terminal.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once the operator asked to stop.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Signals after which the process exits without waiting for the flush.
const FORCE_QUIT_THRESHOLD: u8 = 3;

/// What the process should do after a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// The flag is raised; the run stops at its next check and saves state.
    Stop,
    /// The operator insisted, exit right away.
    ForceQuit,
}

/// Raises a [`CancelFlag`] on SIGINT/SIGTERM.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    flag: CancelFlag,
    received: Arc<AtomicU8>,
}

impl SignalHandler {
    pub fn new(flag: CancelFlag) -> Self {
        SignalHandler {
            flag,
            received: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Route the process's SIGINT and SIGTERM here. Can be done once per process.
    pub fn install(self) -> Result<()> {
        ctrlc::set_handler(move || {
            if self.on_signal() == SignalAction::ForceQuit {
                std::process::exit(130);
            }
        })?;
        Ok(())
    }

    pub fn on_signal(&self) -> SignalAction {
        let count = self.received.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.flag.cancel();
        if count >= FORCE_QUIT_THRESHOLD {
            log::error!("received {} termination signals, exiting without saving", count);
            SignalAction::ForceQuit
        } else {
            log::warn!(
                "termination signal received, finishing current step and saving state ({} more to force quit)",
                FORCE_QUIT_THRESHOLD - count
            );
            SignalAction::Stop
        }
    }
}

fn is_interrupt_key(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Watches the keyboard on a background thread while the terminal is in raw mode.
///
/// Raw mode is left again when the watcher is dropped.
pub struct KeyboardWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardWatcher {
    pub fn spawn(flag: CancelFlag) -> Result<Self> {
        enable_raw_mode()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::SeqCst) {
                if !poll(Duration::from_millis(100)).unwrap_or(false) {
                    continue;
                }
                if let Ok(Event::Key(key)) = read() {
                    if is_interrupt_key(&key) {
                        log::warn!("interrupt requested, finishing current step and saving state");
                        flag.cancel();
                        break;
                    }
                }
            }
        });

        log::info!("press Esc or 'q' to stop early");
        Ok(KeyboardWatcher {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for KeyboardWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        disable_raw_mode().ok();
    }
}
