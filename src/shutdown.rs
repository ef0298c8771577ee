//! Cooperative shutdown shared by the crawler and its worker threads.

use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::Config;

/// Owner side; `trigger` flips every signal cloned from it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    pub fn trigger(&self) {
        // send_replace never fails even when no receiver is left.
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Worker side, usable from plain OS threads.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep up to `duration`, waking early on shutdown. Returns `false` if interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let slice = Duration::from_millis(Config::SHUTDOWN_POLL_MS);
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }
}

/// First Ctrl+C requests a graceful stop. Second Ctrl+C exits immediately.
pub fn install_ctrl_c_handler(shutdown: &Shutdown) -> std::io::Result<()> {
    let tx = shutdown.tx.clone();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Received Ctrl+C, finishing in-flight pages (press again to force quit)");
                    tx.send_replace(true);

                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("\nForce quit requested, exiting immediately...");
                        std::process::exit(1);
                    }
                }
            });
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_sees_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        let clone = signal.clone();
        assert!(!signal.is_triggered());

        shutdown.trigger();
        assert!(signal.is_triggered());
        assert!(clone.is_triggered());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_sleep_completes_without_shutdown() {
        let shutdown = Shutdown::new();
        assert!(shutdown.signal().sleep(Duration::from_millis(20)));
    }

    #[test]
    fn test_sleep_interrupted_from_another_thread() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();

        let start = Instant::now();
        let sleeper = std::thread::spawn(move || signal.sleep(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(50));
        shutdown.trigger();

        assert!(!sleeper.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
