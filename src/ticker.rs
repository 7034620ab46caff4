use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// A cancellable repeating task, running a callback in fixed intervals on a named worker thread.
///
/// Intervals are measured from the last due time, not from the end of the last callback
/// invocation, so slow callbacks don't accumulate drift.
pub struct Ticker {
    name: String,
    stop_send: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a new ticker thread which invokes `callback` every `interval`. The first
    /// invocation happens after the first interval elapsed.
    pub fn start<F>(name: &str, interval: Duration, mut callback: F) -> Result<Self, Error>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(Error::ConfigurationError(
                "Ticker interval must not be zero".to_string(),
            ));
        }
        let (stop_send, stop_recv) = bounded::<()>(1);
        let thread = thread::Builder::new().name(name.to_string()).spawn({
            let name = name.to_string();
            move || {
                log::debug!("Ticker '{name}' started");
                let mut next_tick = Instant::now() + interval;
                loop {
                    let timeout = next_tick.saturating_duration_since(Instant::now());
                    match stop_recv.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {
                            callback();
                            next_tick += interval;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Ticker '{name}' stopped");
            }
        })?;
        Ok(Self {
            name: name.to_string(),
            stop_send: Some(stop_send),
            thread: Some(thread),
        })
    }

    /// The ticker thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until the ticker got stopped.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the ticker. When called from outside the ticker's callback, this blocks until an
    /// in-flight callback invocation finished, so no callback runs after this returned.
    /// Calling stop on an already stopped ticker does nothing.
    pub fn stop(&mut self) {
        if let Some(stop_send) = self.stop_send.take() {
            // a full channel already signals stop
            let _ = stop_send.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // can't join ourselves: the thread exits after the callback returned
                return;
            }
            if thread.join().is_err() {
                log::error!("Ticker '{}' thread panicked", self.name);
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn ticks_until_stopped() -> Result<(), Error> {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ticker = Ticker::start("test_ticker", Duration::from_millis(5), {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })?;
        assert_eq!(ticker.name(), "test_ticker");
        assert!(ticker.is_running());

        while counter.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        ticker.stop();
        assert!(!ticker.is_running());

        // no more ticks after stop returned
        let ticks = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), ticks);

        // stopping again is fine
        ticker.stop();
        Ok(())
    }

    #[test]
    fn first_tick_after_interval() -> Result<(), Error> {
        let counter = Arc::new(AtomicUsize::new(0));
        let ticker = Ticker::start("slow_ticker", Duration::from_secs(60), {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })?;
        drop(ticker);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            Ticker::start("zero", Duration::ZERO, || {}),
            Err(Error::ConfigurationError(_))
        ));
    }
}
