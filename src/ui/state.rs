use crate::domain::enclosure_type::EnclosureType;
use crate::domain::eses::{ComponentType, DownloadStatus, StatusCode, SubenclosureType};
use crate::error::Result;
use crate::terminator::slots::{global_to_local, local_to_global};
use crate::terminator::Terminator;
use crate::topology::{DeviceHandle, DeviceState, DeviceTree, DeviceType, NodeKind};
use crate::virtual_phy::Revision;
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

/// Event log lines kept for the console
const MAX_EVENTS: usize = 200;

/// Operator requests queued by the UI thread and run by the main loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    InsertDrive(u32),
    RemoveDrive(u32),
    PullDrive(u32),
    ReinsertDrive(u32),
    PowerCycleDrive(u32),
    ActivateLccFirmware,
}

#[derive(Clone, Debug)]
pub struct DriveView {
    pub handle: DeviceHandle,
    pub serial: String,
    pub state: DeviceState,
}

/// One client-visible slot as the virtual phy reports it
#[derive(Clone, Debug)]
pub struct SlotView {
    pub slot: u32,
    pub status: StatusCode,
    pub dev_off: bool,
    pub phy_id: u8,
    pub phy_rdy: bool,
    pub insert_count: u8,
    pub drive: Option<DriveView>,
    pub pulled: bool,       // a pulled drive is waiting to go back in
}

#[derive(Clone, Debug)]
pub struct DeviceRow {
    pub handle: DeviceHandle,
    pub device_type: DeviceType,
    pub label: String,
    pub state: DeviceState,
    pub login_pending: bool,
    pub logout_complete: bool,
    pub table_index: Option<u32>,
    pub depth: usize,
}

#[derive(Clone, Debug)]
pub struct FirmwareView {
    pub download_status: DownloadStatus,
    pub gen_code: u32,
    pub lcc_rev: Revision,
    pub pending: usize,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub encl_type: Option<EnclosureType>,
    pub slots: Vec<SlotView>,
    pub devices: Vec<DeviceRow>,
    pub firmware: Option<FirmwareView>,
    pub selected: usize,
    pub events: VecDeque<String>,
    pub commands: Vec<ConsoleCommand>,
    pub last_update: Instant,
    pub should_quit: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            encl_type: None,
            slots: Vec::new(),
            devices: Vec::new(),
            firmware: None,
            selected: 0,
            events: VecDeque::new(),
            commands: Vec::new(),
            last_update: Instant::now(),
            should_quit: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot of `encl` and the port it hangs off.
    pub fn refresh(&mut self, term: &Terminator, encl: DeviceHandle) -> Result<()> {
        let st = term.lock_state();
        let encl_type = st.tree.enclosure(encl)?.encl_type;

        let pulled: BTreeSet<(DeviceHandle, u32)> = st
            .tree
            .handles()
            .into_iter()
            .filter_map(|h| st.tree.drive(h).ok())
            .filter_map(|d| d.pulled_from.map(|owner| (owner, d.slot)))
            .collect();

        let mut slots = Vec::new();
        for slot in 0..encl_type.total_drive_slots() {
            // Banks without an edge expander have no slots to show
            let Ok((owner, local)) = global_to_local(&st.tree, encl, slot) else {
                continue;
            };
            let vphy = st.tree.vphy(st.tree.vphy_of(owner)?)?;
            let (status, phy) = vphy.slot_view(local)?;
            let drive = match st.tree.drive_in_slot(owner, local) {
                Some(h) => Some(DriveView {
                    handle: h,
                    serial: st.tree.drive(h)?.serial.clone(),
                    state: st.tree.get(h)?.state,
                }),
                None => None,
            };
            slots.push(SlotView {
                slot,
                status: status.status,
                dev_off: status.dev_off,
                phy_id: phy.phy_id,
                phy_rdy: phy.phy_rdy,
                insert_count: vphy.insert_count(local)?,
                drive,
                pulled: pulled.contains(&(owner, local)),
            });
        }

        let root = st.tree.find_port_of(encl).unwrap_or(encl);
        let devices = device_rows(&st.tree, root)?;

        let vphy = st.tree.vphy(st.tree.vphy_of(encl)?)?;
        let firmware = FirmwareView {
            download_status: vphy.download_status(),
            gen_code: vphy.gen_code(),
            lcc_rev: vphy.firmware_rev(SubenclosureType::Lcc, vphy.side, ComponentType::ExpanderFw)?,
            pending: vphy.firmware_queue.len(),
        };
        drop(st);

        self.encl_type = Some(encl_type);
        self.slots = slots;
        self.devices = devices;
        self.firmware = Some(firmware);
        if self.selected >= self.slots.len() {
            self.selected = self.slots.len().saturating_sub(1);
        }
        self.last_update = Instant::now();
        Ok(())
    }

    pub fn selected_slot(&self) -> Option<u32> {
        self.slots.get(self.selected).map(|s| s.slot)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.slots.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Queue a command against the selected slot, if there is one.
    pub fn queue_for_selected(&mut self, make: fn(u32) -> ConsoleCommand) {
        if let Some(slot) = self.selected_slot() {
            self.commands.push(make(slot));
        }
    }

    pub fn take_commands(&mut self) -> Vec<ConsoleCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn push_event(&mut self, event: String) {
        self.events.push_back(event);
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn device_rows(tree: &DeviceTree, root: DeviceHandle) -> Result<Vec<DeviceRow>> {
    let mut rows = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((handle, depth)) = stack.pop() {
        let node = tree.get(handle)?;
        let label = match &node.kind {
            NodeKind::Board(info) => format!("board {}", info.platform),
            NodeKind::Port(port) => format!("port {}", port.info.backend_number),
            NodeKind::Enclosure(info) => {
                format!("{} encl {} conn {}", info.encl_type, info.encl_number, info.connector_id)
            }
            NodeKind::VirtualPhy(vphy) => format!("vphy {} side {:?}", vphy.encl_type, vphy.side),
            NodeKind::Drive(info) => {
                let slot = local_to_global(tree, node.parent.unwrap_or(handle), info.slot)
                    .unwrap_or(info.slot);
                format!("drive {} slot {}", info.serial, slot)
            }
        };
        rows.push(DeviceRow {
            handle,
            device_type: node.kind.device_type(),
            label,
            state: node.state,
            login_pending: node.login_pending,
            logout_complete: node.logout_complete,
            table_index: node.device_table_index,
            depth,
        });
        for &child in node.children.iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    Ok(rows)
}
