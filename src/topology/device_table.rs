/// Miniport SAS device table
///
/// Gives every logged-in device a small integer index per port. The pair
/// (port index, device table index) is how the event thread addresses a
/// device, so indexes stay stable across login/logout cycles until removed.
use crate::error::{EnclosureStatus, Result};
use crate::topology::tree::DeviceHandle;
use std::collections::{BTreeSet, HashMap};

pub const MAX_DEVICES_PER_PORT: u32 = 1024;
/// Bits of a raw index value that address the table.
pub const INDEX_BIT_MASK: u32 = 0x0000_FFFF;

#[derive(Debug, Default)]
struct PortTable {
    entries: HashMap<u32, DeviceHandle>,
    reserved: BTreeSet<u32>,
}

#[derive(Debug, Default)]
pub struct DeviceTable {
    ports: HashMap<u32, PortTable>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` on `port_index`, reusing its index if it has one.
    pub fn add(&mut self, port_index: u32, device: DeviceHandle) -> Result<u32> {
        if let Ok(index) = self.get_index(port_index, device) {
            return Ok(index);
        }
        let table = self.ports.entry(port_index).or_default();
        let index = (0..MAX_DEVICES_PER_PORT)
            .find(|i| !table.entries.contains_key(i) && !table.reserved.contains(i))
            .ok_or_else(|| {
                EnclosureStatus::InsufficientResource(format!(
                    "device table of port {} is full",
                    port_index
                ))
            })?;
        table.entries.insert(index, device);
        Ok(index)
    }

    pub fn get_index(&self, port_index: u32, device: DeviceHandle) -> Result<u32> {
        self.ports
            .get(&port_index)
            .and_then(|t| t.entries.iter().find(|(_, &d)| d == device).map(|(&i, _)| i))
            .ok_or_else(|| {
                EnclosureStatus::TargetNotFound(format!(
                    "{} in device table of port {}",
                    device, port_index
                ))
            })
    }

    pub fn device_at(&self, port_index: u32, index: u32) -> Option<DeviceHandle> {
        self.ports.get(&port_index)?.entries.get(&(index & INDEX_BIT_MASK)).copied()
    }

    /// Place `device` at a caller-chosen index, releasing any reservation.
    pub fn set_index(&mut self, port_index: u32, raw_index: u32, device: DeviceHandle) -> Result<u32> {
        let index = raw_index & INDEX_BIT_MASK;
        if index >= MAX_DEVICES_PER_PORT {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "device table index {:#x}",
                raw_index
            )));
        }
        let table = self.ports.entry(port_index).or_default();
        if let Some(&holder) = table.entries.get(&index) {
            if holder != device {
                return Err(EnclosureStatus::Busy);
            }
        }
        table.entries.retain(|_, d| *d != device);
        table.reserved.remove(&index);
        table.entries.insert(index, device);
        Ok(index)
    }

    pub fn remove(&mut self, port_index: u32, device: DeviceHandle) -> Result<u32> {
        let index = self.get_index(port_index, device)?;
        if let Some(table) = self.ports.get_mut(&port_index) {
            table.entries.remove(&index);
        }
        Ok(index)
    }

    /// Keep `index` out of automatic allocation.
    pub fn reserve(&mut self, port_index: u32, index: u32) -> Result<()> {
        let index = index & INDEX_BIT_MASK;
        let table = self.ports.entry(port_index).or_default();
        if table.entries.contains_key(&index) {
            return Err(EnclosureStatus::Busy);
        }
        table.reserved.insert(index);
        Ok(())
    }

    pub fn len(&self, port_index: u32) -> usize {
        self.ports.get(&port_index).map_or(0, |t| t.entries.len())
    }
}
