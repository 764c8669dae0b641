/// Port object: I/O, login and logout queues plus the reset handshake flags
use crate::error::{EnclosureStatus, Result};
use crate::topology::tree::{DeviceHandle, DeviceState, DeviceTree, DeviceType};
use log::debug;
use std::collections::VecDeque;

#[derive(Clone, Debug, Default)]
pub struct PortInfo {
    pub miniport_port_index: u32,
    pub backend_number: u32,
    pub io_port_number: u32,
    pub portal_number: u32,
    pub sas_address: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoRequest {
    pub device: DeviceHandle,
    pub opcode: u8,
    pub lba: u64,
    pub blocks: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetEvent {
    Begin,
    Completed,
}

#[derive(Clone, Debug)]
pub struct Port {
    pub info: PortInfo,
    io_queue: VecDeque<IoRequest>,
    login_queue: VecDeque<DeviceHandle>,
    logout_queue: VecDeque<DeviceHandle>,
    reset_begin: bool,
    reset_completed: bool,
}

impl Port {
    pub fn new(info: PortInfo) -> Self {
        Self {
            info,
            io_queue: VecDeque::new(),
            login_queue: VecDeque::new(),
            logout_queue: VecDeque::new(),
            reset_begin: false,
            reset_completed: false,
        }
    }

    pub fn enqueue_io(&mut self, request: IoRequest) {
        self.io_queue.push_back(request);
    }

    pub fn dequeue_io(&mut self) -> Option<IoRequest> {
        self.io_queue.pop_front()
    }

    pub fn io_queue_len(&self) -> usize {
        self.io_queue.len()
    }

    // Duplicates are allowed on both queues
    pub fn push_login(&mut self, device: DeviceHandle) {
        self.login_queue.push_back(device);
    }

    pub fn push_logout(&mut self, device: DeviceHandle) {
        self.logout_queue.push_back(device);
    }

    pub fn front_logout_device(&self) -> Option<DeviceHandle> {
        self.logout_queue.front().copied()
    }

    pub fn pop_logout_device(&mut self) -> Option<DeviceHandle> {
        self.logout_queue.pop_front()
    }

    /// Entry after `current` in the logout queue.
    pub fn get_next_logout_device(&self, current: DeviceHandle) -> Option<DeviceHandle> {
        let pos = self.logout_queue.iter().position(|&d| d == current)?;
        self.logout_queue.get(pos + 1).copied()
    }

    pub fn is_logout_queue_empty(&self) -> bool {
        self.logout_queue.is_empty()
    }

    pub fn is_in_logout_queue(&self, device: DeviceHandle) -> bool {
        self.logout_queue.contains(&device)
    }

    pub fn drain_login_queue(&mut self) -> Vec<DeviceHandle> {
        self.login_queue.drain(..).collect()
    }

    pub fn reset_flag(&self, event: ResetEvent) -> bool {
        match event {
            ResetEvent::Begin => self.reset_begin,
            ResetEvent::Completed => self.reset_completed,
        }
    }

    pub fn set_reset_flag(&mut self, event: ResetEvent, value: bool) {
        match event {
            ResetEvent::Begin => self.reset_begin = value,
            ResetEvent::Completed => self.reset_completed = value,
        }
    }
}

/// What the miniport event pump did for one port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiniportEvent {
    ResetBegin { port: DeviceHandle },
    Logout { port: DeviceHandle, device: DeviceHandle },
    ResetCompleted { port: DeviceHandle },
    Login { port: DeviceHandle, device: DeviceHandle },
}

impl DeviceTree {
    /// Mark `device` and its descendants login pending and queue the login.
    pub fn port_login_device(&mut self, port: DeviceHandle, device: DeviceHandle) -> Result<()> {
        for h in self.subtree(device) {
            let node = self.get_mut(h)?;
            node.login_pending = true;
            node.logout_complete = false;
            node.state = DeviceState::LoginPending;
        }
        self.port_mut(port)?.push_login(device);
        debug!("{} queued for login on {}", device, port);
        Ok(())
    }

    /// Queue `device` for logout, children ahead of their parents.
    ///
    /// A pending login for any queued node is cancelled.
    pub fn port_logout_device(&mut self, port: DeviceHandle, device: DeviceHandle) -> Result<()> {
        let mut order = self.descendants(device);
        order.reverse();
        order.push(device);
        for &h in &order {
            let node = self.get_mut(h)?;
            node.login_pending = false;
            node.logout_complete = false;
            node.state = DeviceState::LogoutPending;
        }
        let port_obj = self.port_mut(port)?;
        for h in order {
            port_obj.push_logout(h);
        }
        debug!("{} queued for logout on {}", device, port);
        Ok(())
    }

    /// Service one port the way the miniport event thread does.
    ///
    /// Order: reset begin, the logout queue, reset completed, then every
    /// attached device still flagged login pending.
    pub fn process_port_events(&mut self, port: DeviceHandle) -> Result<Vec<MiniportEvent>> {
        if self.device_type(port)? != DeviceType::Port {
            return Err(EnclosureStatus::InvalidHandle(port));
        }
        let mut events = Vec::new();

        if self.port(port)?.reset_flag(ResetEvent::Begin) {
            events.push(MiniportEvent::ResetBegin { port });
            self.port_mut(port)?.set_reset_flag(ResetEvent::Begin, false);
        }

        while let Some(device) = self.port(port)?.front_logout_device() {
            // Device may have been destroyed by a bounded wait giving up
            if let Ok(node) = self.get_mut(device) {
                node.logout_complete = true;
                node.state = DeviceState::LogoutComplete;
            }
            events.push(MiniportEvent::Logout { port, device });
            self.port_mut(port)?.pop_logout_device();
        }

        if self.port(port)?.reset_flag(ResetEvent::Completed) {
            events.push(MiniportEvent::ResetCompleted { port });
            self.port_mut(port)?.set_reset_flag(ResetEvent::Completed, false);
        }

        self.port_mut(port)?.drain_login_queue();
        for device in self.descendants(port) {
            let node = self.get_mut(device)?;
            if node.login_pending {
                node.login_pending = false;
                node.state = DeviceState::LoginComplete;
                events.push(MiniportEvent::Login { port, device });
            }
        }
        Ok(events)
    }
}
