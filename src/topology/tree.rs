use crate::domain::enclosure_type::EnclosureType;
use crate::domain::eses::SpSide;
use crate::error::{EnclosureStatus, Result};
use crate::topology::port::Port;
use crate::virtual_phy::VirtualPhy;
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// Stable identity of a node in the device tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Board,
    Port,
    Enclosure,
    VirtualPhy,
    Drive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Unknown,
    LoginPending,
    LoginComplete,
    LogoutPending,
    LogoutComplete,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::Unknown
    }
}

#[derive(Clone, Debug)]
pub struct BoardInfo {
    pub platform: String,
    pub sp_side: SpSide,
}

#[derive(Clone, Debug)]
pub struct EnclosureInfo {
    pub encl_type: EnclosureType,
    pub backend_number: u32,
    pub encl_number: u32,
    pub connector_id: u32,                   // connector on the parent enclosure
    pub uid: String,
    pub sas_address: u64,
    pub logical_parent: Option<DeviceHandle>, // Port or Enclosure it was inserted under
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveType {
    Sas,
    SasFlash,
    Sata,
    SataFlash,
}

#[derive(Clone, Debug)]
pub struct DriveInfo {
    pub slot: u32,                 // slot local to the parent enclosure
    pub drive_type: DriveType,
    pub capacity_blocks: u64,
    pub block_size: u32,
    pub sas_address: u64,
    pub serial: String,
    pub mounted: bool,
    pub pulled_from: Option<DeviceHandle>,  // enclosure a pulled drive goes back to
}

impl EnclosureInfo {
    pub fn new(encl_type: EnclosureType, backend_number: u32, encl_number: u32) -> Self {
        Self {
            encl_type,
            backend_number,
            encl_number,
            connector_id: 0,
            uid: format!("{}_{}_{}", encl_type, backend_number, encl_number),
            sas_address: 0x5000_0970_0000_0000 | (u64::from(backend_number) << 16) | u64::from(encl_number) << 8,
            logical_parent: None,
        }
    }

    pub fn with_connector(mut self, connector_id: u32) -> Self {
        self.connector_id = connector_id;
        self.sas_address |= u64::from(connector_id);
        self
    }
}

impl DriveInfo {
    pub fn new(drive_type: DriveType, capacity_blocks: u64, serial: &str) -> Self {
        Self {
            slot: 0,
            drive_type,
            capacity_blocks,
            block_size: 520,
            sas_address: 0,
            serial: serial.to_string(),
            mounted: true,
            pulled_from: None,
        }
    }
}

/// Registered reset behaviour, run by the power cycle thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetAction {
    PowerCycleDrive { slot: u32 },
    PowerCycleLcc,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Board(BoardInfo),
    Port(Port),
    Enclosure(EnclosureInfo),
    VirtualPhy(Box<VirtualPhy>),
    Drive(DriveInfo),
}

impl NodeKind {
    pub fn device_type(&self) -> DeviceType {
        match self {
            NodeKind::Board(_) => DeviceType::Board,
            NodeKind::Port(_) => DeviceType::Port,
            NodeKind::Enclosure(_) => DeviceType::Enclosure,
            NodeKind::VirtualPhy(_) => DeviceType::VirtualPhy,
            NodeKind::Drive(_) => DeviceType::Drive,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<DeviceHandle>,
    pub children: Vec<DeviceHandle>,
    pub state: DeviceState,
    pub login_pending: bool,
    pub logout_complete: bool,
    pub reset_delay_ms: u32,
    pub reset_action: Option<ResetAction>,
    pub device_table_index: Option<u32>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            state: DeviceState::default(),
            login_pending: false,
            logout_complete: false,
            reset_delay_ms: 0,
            reset_action: None,
            device_table_index: None,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    /// Logged in from the point of view of upper layers.
    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, DeviceState::LoginPending | DeviceState::LoginComplete)
    }
}

/// Arena of device nodes keyed by handle
#[derive(Debug, Default)]
pub struct DeviceTree {
    nodes: HashMap<DeviceHandle, Node>,
    next_id: u32,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: NodeKind) -> DeviceHandle {
        let handle = DeviceHandle(self.next_id);
        self.next_id += 1;
        debug!("created {:?} {}", kind.device_type(), handle);
        self.nodes.insert(handle, Node::new(kind));
        handle
    }

    pub fn contains(&self, handle: DeviceHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn get(&self, handle: DeviceHandle) -> Result<&Node> {
        self.nodes.get(&handle).ok_or(EnclosureStatus::InvalidHandle(handle))
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Result<&mut Node> {
        self.nodes.get_mut(&handle).ok_or(EnclosureStatus::InvalidHandle(handle))
    }

    pub fn device_type(&self, handle: DeviceHandle) -> Result<DeviceType> {
        Ok(self.get(handle)?.device_type())
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        let mut handles: Vec<_> = self.nodes.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Attach `child` under `parent` after checking the pair is legal.
    ///
    /// Drives go to the front of the child list so enumeration sees the most
    /// recently inserted drive first; everything else is appended.
    pub fn attach(&mut self, parent: DeviceHandle, child: DeviceHandle) -> Result<()> {
        let parent_type = self.device_type(parent)?;
        let child_node = self.get(child)?;
        let child_type = child_node.device_type();
        if let Some(existing) = child_node.parent {
            return Err(EnclosureStatus::InvalidTopology(format!(
                "{} is already attached to {}",
                child, existing
            )));
        }
        let legal = matches!(
            (parent_type, child_type),
            (DeviceType::Board, DeviceType::Port)
                | (DeviceType::Port, DeviceType::Enclosure)
                | (DeviceType::Enclosure, DeviceType::Enclosure)
                | (DeviceType::Enclosure, DeviceType::VirtualPhy)
                | (DeviceType::Enclosure, DeviceType::Drive)
        );
        if !legal {
            return Err(EnclosureStatus::InvalidTopology(format!(
                "cannot attach {:?} {} to {:?} {}",
                child_type, child, parent_type, parent
            )));
        }
        if parent_type == DeviceType::Port
            && self.children_of_type(parent, DeviceType::Enclosure).is_some()
        {
            return Err(EnclosureStatus::InvalidTopology(format!(
                "port {} already has an enclosure",
                parent
            )));
        }
        if child_type == DeviceType::VirtualPhy
            && self.children_of_type(parent, DeviceType::VirtualPhy).is_some()
        {
            return Err(EnclosureStatus::InvalidTopology(format!(
                "enclosure {} already has a virtual phy",
                parent
            )));
        }

        let parent_node = self.get_mut(parent)?;
        if child_type == DeviceType::Drive {
            parent_node.children.insert(0, child);
        } else {
            parent_node.children.push(child);
        }
        self.get_mut(child)?.parent = Some(parent);
        debug!("attached {} under {}", child, parent);
        Ok(())
    }

    /// Unlink `child` from `parent`; descendants stay attached to `child`.
    pub fn detach(&mut self, parent: DeviceHandle, child: DeviceHandle) -> Result<()> {
        let parent_node = self.get_mut(parent)?;
        let before = parent_node.children.len();
        parent_node.children.retain(|&c| c != child);
        if parent_node.children.len() == before {
            return Err(EnclosureStatus::InvalidTopology(format!(
                "{} is not a child of {}",
                child, parent
            )));
        }
        self.get_mut(child)?.parent = None;
        debug!("detached {} from {}", child, parent);
        Ok(())
    }

    /// Detach a node from whatever parent it has.
    pub fn detach_from_parent(&mut self, child: DeviceHandle) -> Result<()> {
        match self.get(child)?.parent {
            Some(parent) => self.detach(parent, child),
            None => Ok(()),
        }
    }

    pub fn parent_of(&self, handle: DeviceHandle) -> Result<Option<DeviceHandle>> {
        Ok(self.get(handle)?.parent)
    }

    /// Walk up until a Port is found.
    pub fn find_port_of(&self, handle: DeviceHandle) -> Result<DeviceHandle> {
        let mut current = Some(handle);
        while let Some(h) = current {
            let node = self.get(h)?;
            if node.device_type() == DeviceType::Port {
                return Ok(h);
            }
            current = node.parent;
        }
        Err(EnclosureStatus::NoPort(handle))
    }

    /// First child of `parent` with the given type.
    pub fn children_of_type(&self, parent: DeviceHandle, device_type: DeviceType) -> Option<DeviceHandle> {
        self.nodes.get(&parent)?.children.iter().copied().find(|&c| {
            self.nodes
                .get(&c)
                .map_or(false, |n| n.device_type() == device_type)
        })
    }

    pub fn all_children_of_type(&self, parent: DeviceHandle, device_type: DeviceType) -> Vec<DeviceHandle> {
        self.nodes.get(&parent).map_or_else(Vec::new, |node| {
            node.children
                .iter()
                .copied()
                .filter(|c| self.nodes.get(c).map_or(false, |n| n.device_type() == device_type))
                .collect()
        })
    }

    /// Every descendant of `handle`, parents before children.
    pub fn descendants(&self, handle: DeviceHandle) -> Vec<DeviceHandle> {
        let mut out = Vec::new();
        let mut stack: Vec<DeviceHandle> = self
            .nodes
            .get(&handle)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(h) = stack.pop() {
            out.push(h);
            if let Some(node) = self.nodes.get(&h) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// `handle` followed by its descendants.
    pub fn subtree(&self, handle: DeviceHandle) -> Vec<DeviceHandle> {
        let mut out = vec![handle];
        out.extend(self.descendants(handle));
        out
    }

    /// Detach and free `handle` together with its descendants.
    pub fn destroy_subtree(&mut self, handle: DeviceHandle) -> Result<Vec<Node>> {
        self.detach_from_parent(handle)?;
        let doomed = self.subtree(handle);
        let freed = doomed.iter().filter_map(|h| self.nodes.remove(h)).collect();
        debug!("destroyed {} and {} descendants", handle, doomed.len() - 1);
        Ok(freed)
    }

    pub fn login_pending(&self, handle: DeviceHandle) -> Result<bool> {
        Ok(self.get(handle)?.login_pending)
    }

    pub fn set_login_pending(&mut self, handle: DeviceHandle, pending: bool) -> Result<()> {
        self.get_mut(handle)?.login_pending = pending;
        Ok(())
    }

    pub fn logout_complete(&self, handle: DeviceHandle) -> Result<bool> {
        Ok(self.get(handle)?.logout_complete)
    }

    pub fn set_logout_complete(&mut self, handle: DeviceHandle, complete: bool) -> Result<()> {
        self.get_mut(handle)?.logout_complete = complete;
        Ok(())
    }

    pub fn set_state(&mut self, handle: DeviceHandle, state: DeviceState) -> Result<()> {
        self.get_mut(handle)?.state = state;
        Ok(())
    }

    // Typed views

    pub fn port(&self, handle: DeviceHandle) -> Result<&Port> {
        match &self.get(handle)?.kind {
            NodeKind::Port(port) => Ok(port),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn port_mut(&mut self, handle: DeviceHandle) -> Result<&mut Port> {
        match &mut self.get_mut(handle)?.kind {
            NodeKind::Port(port) => Ok(port),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn enclosure(&self, handle: DeviceHandle) -> Result<&EnclosureInfo> {
        match &self.get(handle)?.kind {
            NodeKind::Enclosure(info) => Ok(info),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn enclosure_mut(&mut self, handle: DeviceHandle) -> Result<&mut EnclosureInfo> {
        match &mut self.get_mut(handle)?.kind {
            NodeKind::Enclosure(info) => Ok(info),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn drive(&self, handle: DeviceHandle) -> Result<&DriveInfo> {
        match &self.get(handle)?.kind {
            NodeKind::Drive(info) => Ok(info),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn drive_mut(&mut self, handle: DeviceHandle) -> Result<&mut DriveInfo> {
        match &mut self.get_mut(handle)?.kind {
            NodeKind::Drive(info) => Ok(info),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn vphy(&self, handle: DeviceHandle) -> Result<&VirtualPhy> {
        match &self.get(handle)?.kind {
            NodeKind::VirtualPhy(vphy) => Ok(vphy),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    pub fn vphy_mut(&mut self, handle: DeviceHandle) -> Result<&mut VirtualPhy> {
        match &mut self.get_mut(handle)?.kind {
            NodeKind::VirtualPhy(vphy) => Ok(vphy),
            _ => Err(EnclosureStatus::InvalidHandle(handle)),
        }
    }

    /// The virtual phy owned by an enclosure.
    pub fn vphy_of(&self, encl: DeviceHandle) -> Result<DeviceHandle> {
        self.enclosure(encl)?;
        self.children_of_type(encl, DeviceType::VirtualPhy)
            .ok_or_else(|| EnclosureStatus::ComponentNotFound(format!("virtual phy of {}", encl)))
    }

    /// The enclosure a virtual phy belongs to.
    pub fn enclosure_of_vphy(&self, vphy: DeviceHandle) -> Result<DeviceHandle> {
        self.vphy(vphy)?;
        self.get(vphy)?
            .parent
            .ok_or_else(|| EnclosureStatus::InvalidTopology(format!("{} is detached", vphy)))
    }

    /// Drive currently attached in a local slot of an enclosure.
    pub fn drive_in_slot(&self, encl: DeviceHandle, slot: u32) -> Option<DeviceHandle> {
        self.all_children_of_type(encl, DeviceType::Drive)
            .into_iter()
            .find(|&d| self.drive(d).map_or(false, |info| info.slot == slot))
    }

    /// Child enclosure plugged into connector `conn_id`.
    pub fn enclosure_on_connector(&self, encl: DeviceHandle, conn_id: u32) -> Option<DeviceHandle> {
        self.all_children_of_type(encl, DeviceType::Enclosure)
            .into_iter()
            .find(|&e| self.enclosure(e).map_or(false, |info| info.connector_id == conn_id))
    }
}
