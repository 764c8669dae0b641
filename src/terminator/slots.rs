/// Enclosure slot numbering across edge expanders
///
/// Chassis enclosures with edge expanders present one global slot range to
/// clients. Each edge expander owns the bank that starts at the slot mapped
/// from the connector it is plugged into.
use super::{Terminator, TerminatorState};
use crate::error::{EnclosureStatus, Result};
use crate::topology::{DeviceHandle, DeviceTree, DeviceType};

/// Resolve a client-visible slot to (owning enclosure, local slot).
pub(crate) fn global_to_local(tree: &DeviceTree, encl: DeviceHandle, slot: u32) -> Result<(DeviceHandle, u32)> {
    let info = tree.enclosure(encl)?;
    let encl_type = info.encl_type;
    if !encl_type.has_edge_expanders() {
        if slot >= u32::from(encl_type.capabilities().max_drive_slots) {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "slot {} beyond {} on {}",
                slot,
                encl_type.capabilities().max_drive_slots,
                encl
            )));
        }
        return Ok((encl, slot));
    }
    let caps = encl_type.capabilities();
    let per_bank = u32::from(encl_type.slot_count_per_bank());
    for ee in tree.all_children_of_type(encl, DeviceType::Enclosure) {
        let conn_id = tree.enclosure(ee)?.connector_id;
        let Ok(conn) = u8::try_from(conn_id) else { continue };
        let Ok(start) = caps.conn_id_to_drive_start_slot(conn) else { continue };
        if (start..start + per_bank).contains(&slot) {
            return Ok((ee, slot - start));
        }
    }
    Err(EnclosureStatus::ComponentNotFound(format!(
        "no edge expander of {} owns slot {}",
        encl, slot
    )))
}

/// Inverse of `global_to_local`.
pub(crate) fn local_to_global(tree: &DeviceTree, encl: DeviceHandle, slot: u32) -> Result<u32> {
    let info = tree.enclosure(encl)?;
    if !info.encl_type.is_edge_expander() {
        return Ok(slot);
    }
    let Some(parent) = tree.parent_of(encl)? else {
        return Ok(slot);
    };
    let parent_type = tree.enclosure(parent)?.encl_type;
    if !parent_type.has_edge_expanders() {
        return Ok(slot);
    }
    let conn = u8::try_from(info.connector_id)
        .map_err(|_| EnclosureStatus::InvalidParameter(format!("connector id {}", info.connector_id)))?;
    Ok(parent_type.capabilities().conn_id_to_drive_start_slot(conn)? + slot)
}

/// Top-most enclosure an edge expander reports through.
pub(crate) fn client_enclosure(tree: &DeviceTree, encl: DeviceHandle) -> Result<DeviceHandle> {
    let info = tree.enclosure(encl)?;
    if info.encl_type.is_edge_expander() {
        if let Some(parent) = tree.parent_of(encl)? {
            if tree.enclosure(parent).map_or(false, |p| p.encl_type.has_edge_expanders()) {
                return Ok(parent);
            }
        }
    }
    Ok(encl)
}

impl Terminator {
    /// Translate a client slot on `encl` into the enclosure and slot the
    /// virtual phy state lives under.
    pub fn enclosure_local_slot(&self, encl: DeviceHandle, slot: u32) -> Result<(DeviceHandle, u32)> {
        global_to_local(&self.lock_state().tree, encl, slot)
    }

    /// Translate a slot local to `encl` back to the client-visible number.
    pub fn enclosure_global_slot(&self, encl: DeviceHandle, local_slot: u32) -> Result<u32> {
        local_to_global(&self.lock_state().tree, encl, local_slot)
    }

    /// Connector ids of the edge expanders plugged into a chassis.
    pub fn edge_expander_connector_ids(&self, encl: DeviceHandle) -> Result<Vec<u32>> {
        let st = self.lock_state();
        st.tree.enclosure(encl)?;
        st.tree
            .all_children_of_type(encl, DeviceType::Enclosure)
            .into_iter()
            .map(|ee| st.tree.enclosure(ee).map(|i| i.connector_id))
            .collect()
    }

    /// Enclosure (chassis or edge expander) whose range owns `slot`.
    ///
    /// Probes the chassis first, then each child in turn.
    pub fn find_drive_parent(&self, port: DeviceHandle, encl_number: u32, slot: u32) -> Result<DeviceHandle> {
        let st = self.lock_state();
        let top = find_enclosure(&st, port, encl_number)?;
        let info = st.tree.enclosure(top)?;
        if slot < u32::from(info.encl_type.capabilities().max_drive_slots) {
            return Ok(top);
        }
        for child in st.tree.all_children_of_type(top, DeviceType::Enclosure) {
            let child_info = st.tree.enclosure(child)?;
            if !child_info.encl_type.is_edge_expander() {
                continue;
            }
            let start = local_to_global(&st.tree, child, 0)?;
            let slots = u32::from(child_info.encl_type.capabilities().max_drive_slots);
            if (start..start + slots).contains(&slot) {
                return Ok(child);
            }
        }
        Err(EnclosureStatus::ComponentNotFound(format!(
            "enclosure {} on {} has no slot {}",
            encl_number, port, slot
        )))
    }

    pub fn is_drive_slot_available(&self, encl: DeviceHandle, slot: u32) -> Result<bool> {
        let st = self.lock_state();
        let (owner, local) = global_to_local(&st.tree, encl, slot)?;
        Ok(st.tree.drive_in_slot(owner, local).is_none())
    }

    pub fn is_drive_in_slot_logged_in(&self, encl: DeviceHandle, slot: u32) -> Result<bool> {
        let st = self.lock_state();
        let (owner, local) = global_to_local(&st.tree, encl, slot)?;
        match st.tree.drive_in_slot(owner, local) {
            Some(drive) => Ok(st.tree.get(drive)?.is_logged_in()),
            None => Ok(false),
        }
    }
}

/// Chassis enclosure `encl_number` in the chain hanging off `port`.
fn find_enclosure(st: &TerminatorState, port: DeviceHandle, encl_number: u32) -> Result<DeviceHandle> {
    st.tree.port(port)?;
    st.tree
        .descendants(port)
        .into_iter()
        .find(|&h| {
            st.tree
                .enclosure(h)
                .map_or(false, |i| i.encl_number == encl_number && !i.encl_type.is_edge_expander())
        })
        .ok_or_else(|| {
            EnclosureStatus::TargetNotFound(format!("enclosure {} on {}", encl_number, port))
        })
}
