/// Enclosure firmware download and activation
///
/// Activation runs on a background worker per call. The caller learns the
/// outcome only by polling the virtual phy's download status.
use super::{join_all, lock, Terminator};
use crate::domain::eses::{DownloadStatus, SpSide, SubenclosureType};
use crate::error::{EnclosureStatus, Result};
use crate::topology::DeviceHandle;
use crate::virtual_phy::FirmwareRecord;
use log::{debug, error, info, warn};
use std::thread;

impl Terminator {
    /// Queue a pending revision for the next activate on this virtual phy.
    pub fn enclosure_firmware_download(&self, target: DeviceHandle, record: FirmwareRecord) -> Result<()> {
        self.with_vphy_mut(target, |vphy| vphy.firmware_queue.update(record))?;
        debug!(
            "firmware {} queued for {:?} side {:?} comp {:?} on {}",
            record.new_rev, record.subencl_type, record.side, record.comp_type, target
        );
        Ok(())
    }

    /// Start activating the pending record for (subencl, side, slot).
    ///
    /// Returns once the worker is spawned; download status moves to
    /// `UpdatingNonvol` and back to `None` on success.
    pub fn enclosure_firmware_activate(
        &self,
        target: DeviceHandle,
        subencl_type: SubenclosureType,
        side: SpSide,
        slot: u32,
    ) -> Result<()> {
        // The revision policy in force at activate time applies to this run
        let update_rev = self.need_update_enclosure_firmware_rev();
        let (vphy, record) = {
            let mut st = self.lock_state();
            let vphy = Self::resolve_vphy(&st.tree, target)?;
            let phy = st.tree.vphy_mut(vphy)?;
            let record = phy.firmware_queue.pop(subencl_type, side, slot)?;
            phy.set_download_status(DownloadStatus::UpdatingNonvol);
            (vphy, record)
        };
        info!(
            "activating {:?} firmware {} on {} side {:?}",
            record.comp_type, record.new_rev, vphy, record.side
        );
        let term = self.clone();
        let handle = thread::Builder::new()
            .name(format!("fw-activate-{}", vphy.id()))
            .spawn(move || term.activate_worker(vphy, record, update_rev))
            .map_err(|e| {
                EnclosureStatus::InsufficientResource(format!("activation thread: {}", e))
            })?;
        lock(&self.shared.firmware_workers).push(handle);
        Ok(())
    }

    fn activate_worker(&self, vphy: DeviceHandle, record: FirmwareRecord, update_rev: bool) {
        match self.run_activation(vphy, record, update_rev) {
            Ok(()) => info!("firmware {} active on {}", record.new_rev, vphy),
            Err(e) => {
                error!("firmware activation on {} failed: {}", vphy, e);
                if let Err(e) = self.with_vphy_mut(vphy, |v| v.set_download_status(DownloadStatus::ActivateFailed)) {
                    warn!("cannot report activation failure on {}: {}", vphy, e);
                }
            }
        }
    }

    fn run_activation(&self, vphy: DeviceHandle, record: FirmwareRecord, update_rev: bool) -> Result<()> {
        let (activate_delay, reset_delay) =
            self.with_vphy(vphy, |v| (v.activate_interval(), v.reset_interval()))?;
        thread::sleep(activate_delay);

        let status = self.with_vphy(vphy, |v| v.download_status())?;
        if status.is_error() {
            warn!("activation on {} aborted by injected status {:?}", vphy, status);
            return Ok(());
        }

        // An LCC reboots through a logout/login of the whole enclosure
        let lcc = if record.subencl_type == SubenclosureType::Lcc {
            let (encl, parent) = {
                let st = self.lock_state();
                let encl = st.tree.enclosure_of_vphy(vphy)?;
                let parent = st.tree.enclosure(encl)?.logical_parent.ok_or_else(|| {
                    EnclosureStatus::InvalidTopology(format!("{} has no logical parent", encl))
                })?;
                (encl, parent)
            };
            self.unmount_device(encl).map_err(|e| failed("lcc logout", e))?;
            Some((encl, parent))
        } else {
            None
        };

        thread::sleep(reset_delay);

        self.with_vphy_mut(vphy, |v| -> Result<()> {
            if update_rev {
                v.ver_descs
                    .set(record.subencl_type, record.side, record.comp_type, record.new_rev)
                    .map_err(|e| failed("revision update", e))?;
            }
            v.increment_gen_code();
            Ok(())
        })??;

        if let Some((encl, parent)) = lcc {
            self.insert_device(parent, encl)
                .and_then(|()| self.activate_device(encl))
                .map_err(|e| failed("lcc login", e))?;
        }
        self.with_vphy_mut(vphy, |v| v.set_download_status(DownloadStatus::None))?;
        Ok(())
    }

    /// Join every outstanding activation worker.
    pub fn wait_for_firmware_activations(&self) {
        join_all(&self.shared.firmware_workers);
    }
}

fn failed(step: &str, e: EnclosureStatus) -> EnclosureStatus {
    EnclosureStatus::ActivateFailed(format!("{}: {}", step, e))
}
