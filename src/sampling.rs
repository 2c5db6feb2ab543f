//! Periodic mood sampling.
//!
//! A [`SamplingLoop`] owns a background thread that, once per period, pulls
//! a frame from a [`FrameSource`] and hands it to
//! [`SessionController::on_frame`]. It knows nothing about cameras or UI
//! toolkits, so a controller can be driven headless.

use crate::controller::SessionController;
use crate::mood::{Classifier, MoodChangeEvent};
use log::{debug, info};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default sampling period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(300);

/// Where frames come from: a camera, a detector's output, a test script.
pub trait FrameSource: Send {
    type Frame;

    /// The frame for this tick, `None` if there is nothing new.
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// True once the source will never yield another frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Handle to a running sampling thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct SamplingLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SamplingLoop {
    /// Starts sampling `source` every `period`. `on_change` runs on the
    /// sampling thread for every mood change.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn<C, S, F>(
        controller: Arc<SessionController<C>>,
        mut source: S,
        period: Duration,
        mut on_change: F,
    ) -> io::Result<Self>
    where
        C: Classifier + Send + Sync + 'static,
        S: FrameSource<Frame = C::Frame> + 'static,
        F: FnMut(MoodChangeEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("mood-sampler".to_string())
            .spawn(move || {
                info!("Sampling every {}ms", period.as_millis());
                let mut ticks: u64 = 0;

                while !stop_flag.load(Ordering::SeqCst) {
                    let deadline = Instant::now() + period;

                    if source.is_exhausted() {
                        info!("Frame source exhausted after {ticks} ticks");
                        break;
                    }
                    if let Some(frame) = source.next_frame() {
                        if let Some(event) = controller.on_frame(&frame) {
                            on_change(event);
                        }
                    }
                    ticks += 1;

                    // Parked rather than slept so `stop` can cut the wait short.
                    while !stop_flag.load(Ordering::SeqCst) {
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }
                }
                debug!("Sampling thread exiting");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// True while the sampling thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the thread and waits for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Sampling thread panicked");
            }
        }
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
