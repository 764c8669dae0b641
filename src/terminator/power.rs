use super::{join_all, lock, Terminator};
use crate::error::{EnclosureStatus, Result};
use crate::topology::{DeviceHandle, ResetAction};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

impl Terminator {
    fn spawn_reset_thread(&self, name: String, job: impl FnOnce(Terminator) -> Result<()> + Send + 'static) -> Result<()> {
        let term = self.clone();
        let label = name.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                if let Err(e) = job(term) {
                    warn!("{} failed: {}", label, e);
                }
            })
            .map_err(|e| EnclosureStatus::InsufficientResource(format!("reset thread: {}", e)))?;
        lock(&self.shared.reset_workers).push(handle);
        Ok(())
    }

    /// Power a drive slot off for `duration_ms`, then back on.
    ///
    /// `target` is a virtual phy with its local slot, or an enclosure with a
    /// client-visible slot. The drive logs out while the slot is off and back
    /// in afterwards. Runs on a reset thread; use `wait_for_power_cycles` to
    /// join it.
    pub fn power_cycle_drive(&self, target: DeviceHandle, slot: u32, duration_ms: u32) -> Result<()> {
        let (vphy, slot) = {
            let mut st = self.lock_state();
            let (vphy, slot) = Self::resolve_vphy_slot(&st.tree, target, slot)?;
            let phy = st.tree.vphy_mut(vphy)?;
            phy.drive_slot(slot)?;
            phy.set_power_down_count(slot, phy.power_down_count(slot)?.wrapping_add(1))?;
            let encl = st.tree.enclosure_of_vphy(vphy)?;
            if let Some(drive) = st.tree.drive_in_slot(encl, slot) {
                let node = st.tree.get_mut(drive)?;
                node.reset_delay_ms = duration_ms;
                node.reset_action = Some(ResetAction::PowerCycleDrive { slot });
            }
            (vphy, slot)
        };
        self.spawn_reset_thread(format!("power-cycle-{}-{}", vphy.id(), slot), move |term| {
            let present = term.set_slot_power(vphy, slot, false)?;
            if present {
                term.vphy_logout_drive_in_slot(vphy, slot)?;
            }
            thread::sleep(Duration::from_millis(u64::from(duration_ms)));
            term.set_slot_power(vphy, slot, true)?;
            if present {
                term.vphy_login_drive_in_slot(vphy, slot)?;
            }
            debug!("power cycle of slot {} on {} done", slot, vphy);
            Ok(())
        })
    }

    /// Flip the device-off bit; returns whether a drive occupies the slot.
    fn set_slot_power(&self, vphy: DeviceHandle, slot: u32, on: bool) -> Result<bool> {
        let mut st = self.lock_state();
        let vphy = Self::resolve_vphy(&st.tree, vphy)?;
        let encl = st.tree.enclosure_of_vphy(vphy)?;
        let present = st.tree.drive_in_slot(encl, slot).is_some();
        let phy = st.tree.vphy_mut(vphy)?;
        let mut status = phy.drive_slot(slot)?;
        status.dev_off = !on;
        phy.set_drive_slot(slot, status)?;
        Ok(present)
    }

    /// Reboot the LCC of an enclosure: log its subtree out, wait, log it in.
    pub fn power_cycle_lcc(&self, vphy: DeviceHandle, duration_ms: u32) -> Result<()> {
        let encl = {
            let mut st = self.lock_state();
            let vphy = Self::resolve_vphy(&st.tree, vphy)?;
            let encl = st.tree.enclosure_of_vphy(vphy)?;
            let node = st.tree.get_mut(encl)?;
            node.reset_delay_ms = duration_ms;
            node.reset_action = Some(ResetAction::PowerCycleLcc);
            encl
        };
        self.spawn_reset_thread(format!("lcc-reset-{}", encl.id()), move |term| {
            let port = term.lock_state().tree.find_port_of(encl)?;
            term.begin_logout(encl)?;
            term.wait_for_logout(port, encl)?;
            thread::sleep(Duration::from_millis(u64::from(duration_ms)));
            term.activate_device(encl)?;
            debug!("lcc power cycle of {} done", encl);
            Ok(())
        })
    }

    /// Join every outstanding power cycle thread.
    pub fn wait_for_power_cycles(&self) {
        join_all(&self.shared.reset_workers);
    }
}
