/// Terminator: simulated SAS topology service
///
/// `Terminator` is a cheap clonable handle over shared state. All tree,
/// queue and virtual phy mutation happens under one state lock; background
/// workers and the miniport event thread hold their own clones.
mod config;
mod drive;
mod firmware;
mod logout;
mod power;
pub(crate) mod slots;

pub use config::{TerminatorConfig, WaitPolicy};

use crate::domain::eses::SpSide;
use crate::error::{EnclosureStatus, Result};
use crate::topology::{
    BoardInfo, DeviceHandle, DeviceTable, DeviceTree, DeviceType, DriveInfo, EnclosureInfo,
    IoRequest, NodeKind, Port, PortInfo,
};
use crate::virtual_phy::VirtualPhy;
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Everything guarded by the terminator lock
#[derive(Debug, Default)]
pub struct TerminatorState {
    pub tree: DeviceTree,
    pub device_table: DeviceTable,
    pub board: Option<DeviceHandle>,
}

#[derive(Default)]
struct Notifier {
    pending: Mutex<BTreeSet<DeviceHandle>>,
    cond: Condvar,
}

struct Shared {
    config: TerminatorConfig,
    state: Mutex<TerminatorState>,
    notifier: Notifier,
    firmware_workers: Mutex<Vec<JoinHandle<()>>>,
    reset_workers: Mutex<Vec<JoinHandle<()>>>,
    need_update_firmware_rev: AtomicBool,
    need_update_resume_checksum: AtomicBool,
}

#[derive(Clone)]
pub struct Terminator {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking worker must not wedge the whole simulator
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_all(workers: &Mutex<Vec<JoinHandle<()>>>) {
    loop {
        let batch: Vec<_> = lock(workers).drain(..).collect();
        if batch.is_empty() {
            return;
        }
        for handle in batch {
            if handle.join().is_err() {
                log::error!("terminator worker thread panicked");
            }
        }
    }
}

impl Terminator {
    pub fn new(config: TerminatorConfig) -> Self {
        info!(
            "terminator starting: side {:?}, logout wait {:?}",
            config.sp_side, config.logout_wait
        );
        let shared = Shared {
            need_update_firmware_rev: AtomicBool::new(config.need_update_enclosure_firmware_rev),
            need_update_resume_checksum: AtomicBool::new(
                config.need_update_enclosure_resume_prom_checksum,
            ),
            config,
            state: Mutex::new(TerminatorState::default()),
            notifier: Notifier::default(),
            firmware_workers: Mutex::new(Vec::new()),
            reset_workers: Mutex::new(Vec::new()),
        };
        Self { shared: Arc::new(shared) }
    }

    pub fn config(&self) -> &TerminatorConfig {
        &self.shared.config
    }

    /// Lock the terminator state. Callers must not hold it across a wait.
    pub fn lock_state(&self) -> MutexGuard<'_, TerminatorState> {
        lock(&self.shared.state)
    }

    pub fn need_update_enclosure_firmware_rev(&self) -> bool {
        self.shared.need_update_firmware_rev.load(Ordering::SeqCst)
    }

    pub fn set_need_update_enclosure_firmware_rev(&self, value: bool) {
        self.shared.need_update_firmware_rev.store(value, Ordering::SeqCst);
    }

    pub fn need_update_enclosure_resume_prom_checksum(&self) -> bool {
        self.shared.need_update_resume_checksum.load(Ordering::SeqCst)
    }

    pub fn set_need_update_enclosure_resume_prom_checksum(&self, value: bool) {
        self.shared.need_update_resume_checksum.store(value, Ordering::SeqCst);
    }

    // Event thread signalling

    /// Tell the miniport event thread that `port` has queued work.
    pub fn device_state_change_notify(&self, port: DeviceHandle) {
        lock(&self.shared.notifier.pending).insert(port);
        self.shared.notifier.cond.notify_all();
    }

    /// Wake any waiting event thread without queuing work.
    pub fn wake_event_thread(&self) {
        self.shared.notifier.cond.notify_all();
    }

    /// Wait up to `timeout` for notified ports and take them.
    pub fn wait_for_port_events(&self, timeout: Duration) -> Vec<DeviceHandle> {
        let notifier = &self.shared.notifier;
        let mut pending = lock(&notifier.pending);
        if pending.is_empty() {
            pending = notifier
                .cond
                .wait_timeout(pending, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        std::mem::take(&mut *pending).into_iter().collect()
    }

    // Device creation

    pub fn create_board(&self, platform: &str) -> Result<DeviceHandle> {
        let mut st = self.lock_state();
        if let Some(board) = st.board {
            return Err(EnclosureStatus::IllegalRequest(format!(
                "board {} already exists",
                board
            )));
        }
        let board = st.tree.create(NodeKind::Board(BoardInfo {
            platform: platform.to_string(),
            sp_side: self.shared.config.sp_side,
        }));
        st.board = Some(board);
        Ok(board)
    }

    pub fn board(&self) -> Option<DeviceHandle> {
        self.lock_state().board
    }

    pub fn create_port(&self, info: PortInfo) -> DeviceHandle {
        self.lock_state().tree.create(NodeKind::Port(Port::new(info)))
    }

    /// Create a SAS enclosure together with its virtual phy.
    pub fn create_sas_enclosure(&self, info: EnclosureInfo) -> Result<DeviceHandle> {
        let sp_side: SpSide = self.shared.config.sp_side;
        let vphy = Box::new(VirtualPhy::new(info.encl_type, sp_side));
        let mut st = self.lock_state();
        let encl = st.tree.create(NodeKind::Enclosure(EnclosureInfo {
            logical_parent: None,
            ..info
        }));
        let phy = st.tree.create(NodeKind::VirtualPhy(vphy));
        st.tree.attach(encl, phy)?;
        Ok(encl)
    }

    pub fn create_sas_drive(&self, info: DriveInfo) -> DeviceHandle {
        self.lock_state().tree.create(NodeKind::Drive(info))
    }

    /// Attach `child` under `parent`, enforcing slot and connector rules.
    pub fn insert_device(&self, parent: DeviceHandle, child: DeviceHandle) -> Result<()> {
        let mut st = self.lock_state();
        Self::insert_locked(&mut st, parent, child)
    }

    fn insert_locked(st: &mut TerminatorState, parent: DeviceHandle, child: DeviceHandle) -> Result<()> {
        let parent_type = st.tree.device_type(parent)?;
        let child_type = st.tree.device_type(child)?;
        match (parent_type, child_type) {
            (DeviceType::Port, DeviceType::Enclosure) => {
                st.tree.enclosure_mut(child)?.logical_parent = Some(parent);
            }
            (DeviceType::Enclosure, DeviceType::Enclosure) => {
                let max_ids = u32::from(
                    st.tree.enclosure(parent)?.encl_type.capabilities().max_conn_id_count,
                );
                let conn_id = st.tree.enclosure(child)?.connector_id;
                if conn_id < max_ids && st.tree.enclosure_on_connector(parent, conn_id).is_some() {
                    return Err(EnclosureStatus::ConnectorUnavailable(conn_id));
                }
                st.tree.enclosure_mut(child)?.logical_parent = Some(parent);
            }
            (DeviceType::Enclosure, DeviceType::Drive) => {
                let slot = st.tree.drive(child)?.slot;
                if st.tree.drive_in_slot(parent, slot).is_some() {
                    return Err(EnclosureStatus::SlotUnavailable(slot));
                }
            }
            _ => {}
        }
        st.tree.attach(parent, child)?;
        debug!("inserted {:?} {} under {:?} {}", child_type, child, parent_type, parent);
        Ok(())
    }

    /// Register `device` and its descendants with the miniport table and log them in.
    pub fn activate_device(&self, device: DeviceHandle) -> Result<()> {
        let port = {
            let mut st = self.lock_state();
            Self::activate_locked(&mut st, device)?
        };
        self.device_state_change_notify(port);
        Ok(())
    }

    fn activate_locked(st: &mut TerminatorState, device: DeviceHandle) -> Result<DeviceHandle> {
        let port = st.tree.find_port_of(device)?;
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        for h in st.tree.subtree(device) {
            let index = st.device_table.add(port_index, h)?;
            st.tree.get_mut(h)?.device_table_index = Some(index);
        }
        st.tree.port_login_device(port, device)?;
        Ok(port)
    }

    /// Drop `device` and its descendants from the miniport device table.
    fn remove_from_table_locked(st: &mut TerminatorState, port: DeviceHandle, device: DeviceHandle) -> Result<()> {
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        for h in st.tree.subtree(device) {
            if st.tree.get_mut(h)?.device_table_index.take().is_some() {
                st.device_table.remove(port_index, h)?;
            }
        }
        Ok(())
    }

    /// Free a device subtree without any logout handshake.
    pub fn destroy_device(&self, device: DeviceHandle) -> Result<()> {
        let mut st = self.lock_state();
        if let Ok(port) = st.tree.find_port_of(device) {
            Self::remove_from_table_locked(&mut st, port, device)?;
        }
        if st.board == Some(device) {
            st.board = None;
        }
        st.tree.destroy_subtree(device)?;
        Ok(())
    }

    /// Free everything attached below `port`.
    pub fn destroy_all_devices(&self, port: DeviceHandle) -> Result<()> {
        let children = self.lock_state().tree.get(port)?.children.clone();
        for child in children {
            self.destroy_device(child)?;
        }
        Ok(())
    }

    // Miniport device table

    pub fn add_to_device_table(&self, device: DeviceHandle) -> Result<u32> {
        let mut st = self.lock_state();
        let port = st.tree.find_port_of(device)?;
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        let index = st.device_table.add(port_index, device)?;
        st.tree.get_mut(device)?.device_table_index = Some(index);
        Ok(index)
    }

    pub fn get_device_table_index(&self, device: DeviceHandle) -> Result<u32> {
        let st = self.lock_state();
        let port = st.tree.find_port_of(device)?;
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        st.device_table.get_index(port_index, device)
    }

    pub fn set_device_table_index(&self, device: DeviceHandle, index: u32) -> Result<u32> {
        let mut st = self.lock_state();
        let port = st.tree.find_port_of(device)?;
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        let index = st.device_table.set_index(port_index, index, device)?;
        st.tree.get_mut(device)?.device_table_index = Some(index);
        Ok(index)
    }

    pub fn remove_from_device_table(&self, device: DeviceHandle) -> Result<()> {
        let mut st = self.lock_state();
        let port = st.tree.find_port_of(device)?;
        Self::remove_from_table_locked(&mut st, port, device)
    }

    pub fn reserve_device_id(&self, port: DeviceHandle, index: u32) -> Result<()> {
        let mut st = self.lock_state();
        let port_index = st.tree.port(port)?.info.miniport_port_index;
        st.device_table.reserve(port_index, index)
    }

    // I/O queue

    pub fn send_io(&self, request: IoRequest) -> Result<()> {
        let port = {
            let mut st = self.lock_state();
            let port = st.tree.find_port_of(request.device)?;
            st.tree.port_mut(port)?.enqueue_io(request);
            port
        };
        self.device_state_change_notify(port);
        Ok(())
    }

    pub fn dequeue_io(&self, port: DeviceHandle) -> Result<Option<IoRequest>> {
        Ok(self.lock_state().tree.port_mut(port)?.dequeue_io())
    }

    // Virtual phy access

    /// Run `f` against a virtual phy, addressed directly or through its enclosure.
    pub fn with_vphy<R>(&self, target: DeviceHandle, f: impl FnOnce(&VirtualPhy) -> R) -> Result<R> {
        let st = self.lock_state();
        let vphy = Self::resolve_vphy(&st.tree, target)?;
        Ok(f(st.tree.vphy(vphy)?))
    }

    pub fn with_vphy_mut<R>(&self, target: DeviceHandle, f: impl FnOnce(&mut VirtualPhy) -> R) -> Result<R> {
        let mut st = self.lock_state();
        let vphy = Self::resolve_vphy(&st.tree, target)?;
        Ok(f(st.tree.vphy_mut(vphy)?))
    }

    pub(crate) fn resolve_vphy(tree: &DeviceTree, target: DeviceHandle) -> Result<DeviceHandle> {
        match tree.device_type(target)? {
            DeviceType::VirtualPhy => Ok(target),
            DeviceType::Enclosure => tree.vphy_of(target),
            other => Err(EnclosureStatus::ComponentTypeUnsupported(format!(
                "{:?} {} has no virtual phy",
                other, target
            ))),
        }
    }

    /// Resolve a slot-addressed target to (virtual phy, slot local to it).
    ///
    /// An enclosure target takes client-visible slot numbers, which land on
    /// the edge expander owning the bank. A virtual phy target takes its own
    /// local numbering unchanged.
    pub(crate) fn resolve_vphy_slot(tree: &DeviceTree, target: DeviceHandle, slot: u32) -> Result<(DeviceHandle, u32)> {
        if tree.device_type(target)? == DeviceType::Enclosure
            && tree.enclosure(target)?.encl_type.has_edge_expanders()
        {
            let (owner, local) = slots::global_to_local(tree, target, slot)?;
            return Ok((tree.vphy_of(owner)?, local));
        }
        Ok((Self::resolve_vphy(tree, target)?, slot))
    }

    /// Like `with_vphy`, for operations addressed by drive slot.
    pub fn with_slot_vphy<R>(
        &self,
        target: DeviceHandle,
        slot: u32,
        f: impl FnOnce(&VirtualPhy, u32) -> R,
    ) -> Result<R> {
        let st = self.lock_state();
        let (vphy, local) = Self::resolve_vphy_slot(&st.tree, target, slot)?;
        Ok(f(st.tree.vphy(vphy)?, local))
    }

    pub fn with_slot_vphy_mut<R>(
        &self,
        target: DeviceHandle,
        slot: u32,
        f: impl FnOnce(&mut VirtualPhy, u32) -> R,
    ) -> Result<R> {
        let mut st = self.lock_state();
        let (vphy, local) = Self::resolve_vphy_slot(&st.tree, target, slot)?;
        Ok(f(st.tree.vphy_mut(vphy)?, local))
    }

    pub fn vphy_of(&self, encl: DeviceHandle) -> Result<DeviceHandle> {
        self.lock_state().tree.vphy_of(encl)
    }

    /// Join every background worker, then free the topology.
    pub fn shutdown(&self) {
        self.wait_for_firmware_activations();
        self.wait_for_power_cycles();
        let mut st = self.lock_state();
        if let Some(board) = st.board.take() {
            if let Err(e) = st.tree.destroy_subtree(board) {
                log::warn!("failed to free board {}: {}", board, e);
            }
        }
        info!("terminator shut down");
    }
}
