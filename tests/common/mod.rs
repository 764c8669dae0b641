#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use terminator::domain::enclosure_type::EnclosureType;
use terminator::domain::eses::SpSide;
use terminator::topology::{DeviceHandle, DeviceState, EnclosureInfo, MiniportEvent, PortInfo};
use terminator::{MiniportEventThread, Terminator, TerminatorConfig};

pub const LIMIT: Duration = Duration::from_secs(5);

/// Board, port and one enclosure with the miniport event thread running.
pub struct Fixture {
    pub term: Terminator,
    pub port: DeviceHandle,
    pub encl: DeviceHandle,
    pub events: Arc<Mutex<Vec<MiniportEvent>>>,
    thread: Option<MiniportEventThread>,
}

impl Fixture {
    pub fn new(encl_type: EnclosureType) -> Self {
        Self::with_side(encl_type, SpSide::A)
    }

    pub fn with_side(encl_type: EnclosureType, side: SpSide) -> Self {
        let config = TerminatorConfig::default()
            .with_side(side)
            .with_logout_timeout(Some(LIMIT));
        let term = Terminator::new(config);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let thread = MiniportEventThread::start(
            term.clone(),
            Some(Box::new(move |event: &MiniportEvent| sink.lock().unwrap().push(*event))),
        )
        .unwrap();

        let board = term.create_board("test").unwrap();
        let port = term.create_port(PortInfo::default());
        term.insert_device(board, port).unwrap();
        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(encl_type, 0, 0))
            .unwrap();
        term.insert_device(port, encl).unwrap();
        term.with_vphy_mut(encl, |v| {
            v.set_activate_interval(Duration::ZERO);
            v.set_reset_interval(Duration::ZERO);
        })
        .unwrap();
        Self { term, port, encl, events, thread: Some(thread) }
    }

    /// Plug edge expanders into the chassis on the given connectors.
    pub fn add_edge_expanders(&self, connectors: &[u32]) -> Vec<DeviceHandle> {
        let encl_type = self.term.lock_state().tree.enclosure(self.encl).unwrap().encl_type;
        let ee_type = encl_type.edge_expander_type().unwrap();
        connectors
            .iter()
            .map(|&conn| {
                let ee = self
                    .term
                    .create_sas_enclosure(EnclosureInfo::new(ee_type, 0, 0).with_connector(conn))
                    .unwrap();
                self.term.insert_device(self.encl, ee).unwrap();
                ee
            })
            .collect()
    }

    pub fn state_of(&self, device: DeviceHandle) -> DeviceState {
        self.term.lock_state().tree.get(device).unwrap().state
    }

    pub fn wait_for_state(&self, device: DeviceHandle, state: DeviceState) -> bool {
        wait_until(|| self.state_of(device) == state)
    }

    pub fn events(&self) -> Vec<MiniportEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn logged_out(&self, device: DeviceHandle) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, MiniportEvent::Logout { device: d, .. } if *d == device))
    }

    pub fn logged_in(&self, device: DeviceHandle) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, MiniportEvent::Login { device: d, .. } if *d == device))
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        // Workers may still need the event thread to finish a logout
        self.term.wait_for_firmware_activations();
        self.term.wait_for_power_cycles();
        if let Some(thread) = self.thread.take() {
            thread.stop();
        }
        self.term.shutdown();
    }
}

pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < LIMIT {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}
