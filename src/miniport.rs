/// Miniport event thread
///
/// Drains the per-port login/logout queues and services the reset
/// handshake whenever the terminator signals a port.
use crate::error::EnclosureStatus;
use crate::terminator::Terminator;
use crate::topology::MiniportEvent;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type EventCallback = Box<dyn FnMut(&MiniportEvent) + Send>;

const WAKE_INTERVAL: Duration = Duration::from_millis(50);

pub struct MiniportEventThread {
    terminator: Terminator,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MiniportEventThread {
    pub fn start(terminator: Terminator, callback: Option<EventCallback>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_term = terminator.clone();
        let handle = thread::Builder::new()
            .name("miniport-events".into())
            .spawn(move || event_loop(thread_term, thread_stop, callback))?;
        Ok(Self { terminator, stop, handle: Some(handle) })
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.terminator.wake_event_thread();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("miniport event thread panicked");
            }
        }
    }
}

impl Drop for MiniportEventThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn event_loop(term: Terminator, stop: Arc<AtomicBool>, mut callback: Option<EventCallback>) {
    debug!("miniport event thread running");
    while !stop.load(Ordering::SeqCst) {
        for port in term.wait_for_port_events(WAKE_INTERVAL) {
            let events = term.lock_state().tree.process_port_events(port);
            match events {
                Ok(events) => {
                    for event in &events {
                        debug!("miniport: {:?}", event);
                        if let Some(cb) = callback.as_mut() {
                            cb(event);
                        }
                    }
                }
                // Port destroyed between notify and service
                Err(EnclosureStatus::InvalidHandle(_)) => {}
                Err(e) => warn!("failed to service port {}: {}", port, e),
            }
        }
    }
    debug!("miniport event thread stopped");
}
