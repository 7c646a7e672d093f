//! Falling-edge detection on input pins
//!
//! Sysfs edge interrupts are unreliable on the threshold comparators (no
//! hysteresis), so edges are found by sampling on a background thread and
//! forwarded over a channel.

use crate::Result;
use crate::gpio::InputPin;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tracks the last level of each pin and reports high-to-low transitions
#[derive(Debug, Default)]
pub struct EdgeDetector {
    last: HashMap<u32, bool>,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, returning true on a falling edge. The first sample
    /// of a pin only establishes its level.
    pub fn update(&mut self, pin: u32, high: bool) -> bool {
        let previous = self.last.insert(pin, high);
        matches!(previous, Some(true)) && !high
    }
}

/// Background thread reporting falling edges on a set of pins
pub struct FallingEdgeWatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FallingEdgeWatcher {
    /// Start sampling `pins` every `interval`, sending `map(pin)` on every
    /// falling edge. The thread ends when stopped or when the receiver goes
    /// away.
    pub fn spawn<T, F>(
        pins: Vec<Box<dyn InputPin>>,
        interval: Duration,
        tx: Sender<T>,
        map: F,
    ) -> Result<Self>
    where
        T: Send + 'static,
        F: Fn(u32) -> T + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("edge-watcher".into())
            .spawn(move || {
                tracing::info!("Edge watcher started on {} pin(s)", pins.len());
                let mut detector = EdgeDetector::new();

                while flag.load(Ordering::Relaxed) {
                    for pin in &pins {
                        let high = match pin.is_high() {
                            Ok(high) => high,
                            Err(e) => {
                                tracing::debug!("Skipping sample: {}", e);
                                continue;
                            }
                        };
                        if detector.update(pin.number(), high) {
                            tracing::debug!("Falling edge on GPIO {}", pin.number());
                            if tx.send(map(pin.number())).is_err() {
                                return;
                            }
                        }
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the watcher thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FallingEdgeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
