use super::slots::{client_enclosure, global_to_local, local_to_global};
use super::{Terminator, TerminatorState};
use crate::domain::eses::StatusCode;
use crate::error::{EnclosureStatus, Result};
use crate::topology::{DeviceHandle, DeviceState, DriveInfo, NodeKind};
use log::debug;

impl Terminator {
    /// Insert a SAS drive into client slot `slot` of `encl`.
    ///
    /// The drive only logs in when its slot is powered (device-off clear)
    /// and the mapped phy reports OK.
    pub fn insert_sas_drive(&self, encl: DeviceHandle, slot: u32, info: DriveInfo) -> Result<DeviceHandle> {
        let (drive, port) = {
            let mut st = self.lock_state();
            let (owner, local) = global_to_local(&st.tree, encl, slot)?;
            if st.tree.drive_in_slot(owner, local).is_some() {
                return Err(EnclosureStatus::SlotUnavailable(slot));
            }
            let drive = st.tree.create(NodeKind::Drive(DriveInfo {
                slot: local,
                mounted: true,
                pulled_from: None,
                ..info
            }));
            if let Err(e) = Self::insert_locked(&mut st, owner, drive) {
                st.tree.destroy_subtree(drive)?;
                return Err(e);
            }
            let port = Self::plug_drive_locked(&mut st, owner, drive, local)?;
            (drive, port)
        };
        debug!("inserted drive {} at slot {} of {}", drive, slot, encl);
        if let Some(port) = port {
            self.device_state_change_notify(port);
        }
        Ok(drive)
    }

    /// Mark the slot installed and log the drive in when the phy allows it.
    fn plug_drive_locked(
        st: &mut TerminatorState,
        encl: DeviceHandle,
        drive: DeviceHandle,
        local: u32,
    ) -> Result<Option<DeviceHandle>> {
        let vphy_handle = st.tree.vphy_of(encl)?;
        let vphy = st.tree.vphy_mut(vphy_handle)?;
        let mut slot_status = vphy.drive_slot(local)?;
        slot_status.status = StatusCode::Ok;
        vphy.set_drive_slot(local, slot_status)?;
        vphy.set_insert_count(local, vphy.insert_count(local)?.wrapping_add(1))?;

        let phy_id = vphy.capabilities().drive_slot_to_phy(local, vphy.side)?;
        let mut phy = vphy.phy(phy_id)?;
        if slot_status.dev_off || phy.status != StatusCode::Ok {
            debug!(
                "drive {} stays logged out: dev_off {}, phy {} status {}",
                drive, slot_status.dev_off, phy_id, phy.status
            );
            return Ok(None);
        }
        phy.phy_rdy = true;
        vphy.set_phy(phy_id, phy)?;

        match st.tree.find_port_of(drive) {
            Ok(_) => Self::activate_locked(st, drive).map(Some),
            Err(EnclosureStatus::NoPort(_)) => {
                // Not cabled to a port yet; login happens when the enclosure is activated
                let node = st.tree.get_mut(drive)?;
                node.login_pending = true;
                node.state = DeviceState::LoginPending;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark a slot empty. Returns the slot's device-off bit.
    fn unplug_slot_locked(st: &mut TerminatorState, encl: DeviceHandle, local: u32) -> Result<bool> {
        let vphy_handle = st.tree.vphy_of(encl)?;
        let vphy = st.tree.vphy_mut(vphy_handle)?;
        let mut slot_status = vphy.drive_slot(local)?;
        slot_status.status = StatusCode::NotInstalled;
        vphy.set_drive_slot(local, slot_status)?;

        let phy_id = vphy.capabilities().drive_slot_to_phy(local, vphy.side)?;
        let mut phy = vphy.phy(phy_id)?;
        phy.phy_rdy = false;
        if phy.status != StatusCode::Unavailable {
            phy.status = StatusCode::Ok;
        }
        vphy.set_phy(phy_id, phy)?;
        Ok(slot_status.dev_off)
    }

    /// Take the drive's slot offline and report whether a logout is needed.
    fn take_drive_offline(&self, drive: DeviceHandle) -> Result<Option<(DeviceHandle, bool)>> {
        let mut st = self.lock_state();
        let Some(encl) = st.tree.parent_of(drive)? else {
            return Ok(None);
        };
        let local = st.tree.drive(drive)?.slot;
        let dev_off = Self::unplug_slot_locked(&mut st, encl, local)?;
        let logged_in = st.tree.get(drive)?.is_logged_in();
        Ok(Some((encl, !dev_off && logged_in)))
    }

    /// Remove a drive for good.
    ///
    /// A logged-in drive goes through the logout handshake before it is
    /// freed; any other drive is freed without generating a logout.
    pub fn remove_drive(&self, drive: DeviceHandle) -> Result<()> {
        self.lock_state().tree.drive(drive)?;
        match self.take_drive_offline(drive)? {
            Some((_, true)) => self.remove_device(drive),
            _ => {
                debug!("removing drive {} without logout", drive);
                self.destroy_device(drive)
            }
        }
    }

    /// Pull a drive out of its slot, keeping the node for a later reinsert.
    pub fn pull_drive(&self, drive: DeviceHandle) -> Result<()> {
        self.lock_state().tree.drive(drive)?;
        let Some((encl, needs_logout)) = self.take_drive_offline(drive)? else {
            return Err(EnclosureStatus::IllegalRequest(format!("drive {} is not inserted", drive)));
        };
        if needs_logout {
            self.unmount_device(drive)?;
        } else {
            let mut st = self.lock_state();
            if let Ok(port) = st.tree.find_port_of(drive) {
                Self::remove_from_table_locked(&mut st, port, drive)?;
            }
            st.tree.detach_from_parent(drive)?;
        }
        let mut st = self.lock_state();
        let info = st.tree.drive_mut(drive)?;
        info.pulled_from = Some(encl);
        info.mounted = false;
        debug!("pulled drive {} from {}", drive, encl);
        Ok(())
    }

    /// Put a pulled drive back into the slot it came from.
    pub fn reinsert_drive(&self, drive: DeviceHandle) -> Result<()> {
        let port = {
            let mut st = self.lock_state();
            let info = st.tree.drive(drive)?;
            let local = info.slot;
            let encl = info.pulled_from.ok_or_else(|| {
                EnclosureStatus::IllegalRequest(format!("drive {} was not pulled", drive))
            })?;
            if st.tree.drive_in_slot(encl, local).is_some() {
                return Err(EnclosureStatus::SlotUnavailable(local));
            }
            Self::insert_locked(&mut st, encl, drive)?;
            let info = st.tree.drive_mut(drive)?;
            info.pulled_from = None;
            info.mounted = true;
            Self::plug_drive_locked(&mut st, encl, drive, local)?
        };
        debug!("reinserted drive {}", drive);
        if let Some(port) = port {
            self.device_state_change_notify(port);
        }
        Ok(())
    }

    /// Drive occupying a slot of the enclosure owning `vphy`.
    fn drive_for_vphy_slot(st: &TerminatorState, vphy: DeviceHandle, slot: u32) -> Result<DeviceHandle> {
        let encl = st.tree.enclosure_of_vphy(vphy)?;
        let global = local_to_global(&st.tree, encl, slot)?;
        let client = client_enclosure(&st.tree, encl)?;
        let (owner, local) = global_to_local(&st.tree, client, global)?;
        st.tree.drive_in_slot(owner, local).ok_or_else(|| {
            EnclosureStatus::ComponentNotFound(format!("no drive in slot {} of {}", global, client))
        })
    }

    /// Log out the drive in a virtual phy slot without removing it.
    pub fn vphy_logout_drive_in_slot(&self, vphy: DeviceHandle, slot: u32) -> Result<()> {
        let port = {
            let mut st = self.lock_state();
            let drive = Self::drive_for_vphy_slot(&st, vphy, slot)?;
            let port = st.tree.find_port_of(drive)?;
            Self::remove_from_table_locked(&mut st, port, drive)?;
            st.tree.port_logout_device(port, drive)?;
            port
        };
        self.device_state_change_notify(port);
        Ok(())
    }

    /// Log the drive in a virtual phy slot back in.
    pub fn vphy_login_drive_in_slot(&self, vphy: DeviceHandle, slot: u32) -> Result<()> {
        let port = {
            let mut st = self.lock_state();
            let drive = Self::drive_for_vphy_slot(&st, vphy, slot)?;
            Self::activate_locked(&mut st, drive)?
        };
        self.device_state_change_notify(port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::enclosure_type::EnclosureType;
    use crate::domain::eses::StatusCode;
    use crate::terminator::{Terminator, TerminatorConfig};
    use crate::topology::{DeviceState, DriveInfo, DriveType, EnclosureInfo, PortInfo};

    #[test]
    fn faulted_phy_blocks_login() {
        let term = Terminator::new(TerminatorConfig::default());
        let port = term.create_port(PortInfo::default());
        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(EnclosureType::Viper, 0, 0))
            .unwrap();
        term.insert_device(port, encl).unwrap();
        term.with_vphy_mut(encl, |v| {
            let mut phy = v.phy(21).unwrap();
            phy.status = StatusCode::Critical;
            v.set_phy(21, phy).unwrap();
        })
        .unwrap();

        let drive = term
            .insert_sas_drive(encl, 3, DriveInfo::new(DriveType::Sas, 1 << 20, "FAULT"))
            .unwrap();
        let st = term.lock_state();
        let node = st.tree.get(drive).unwrap();
        assert!(!node.login_pending);
        assert_eq!(node.state, DeviceState::Unknown);
        let vphy = st.tree.vphy_of(encl).unwrap();
        assert_eq!(st.tree.vphy(vphy).unwrap().drive_slot(3).unwrap().status, StatusCode::Ok);
    }

    #[test]
    fn never_logged_in_drive_is_removed_silently() {
        let term = Terminator::new(TerminatorConfig::default());
        let port = term.create_port(PortInfo::default());
        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(EnclosureType::Viper, 0, 0))
            .unwrap();
        term.insert_device(port, encl).unwrap();
        term.with_vphy_mut(encl, |v| {
            let mut slot = v.drive_slot(2).unwrap();
            slot.dev_off = true;
            v.set_drive_slot(2, slot).unwrap();
        })
        .unwrap();
        let drive = term
            .insert_sas_drive(encl, 2, DriveInfo::new(DriveType::Sas, 1 << 20, "OFF"))
            .unwrap();
        // No event thread runs here, so a logout would block forever
        term.remove_drive(drive).unwrap();
        let st = term.lock_state();
        assert!(!st.tree.contains(drive));
        assert!(st.tree.port(port).unwrap().is_logout_queue_empty());
    }
}
