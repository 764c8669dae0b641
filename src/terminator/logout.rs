use super::{Terminator, WaitPolicy};
use crate::error::{EnclosureStatus, Result};
use crate::topology::{DeviceHandle, DeviceType, ResetEvent};
use log::{debug, warn};
use std::thread;
use std::time::Instant;

impl Terminator {
    /// Poll until `check` holds, honouring the configured wait policy.
    fn poll_until(&self, what: &str, mut check: impl FnMut(&Self) -> Result<bool>) -> Result<()> {
        let started = Instant::now();
        let poll = self.config().poll_interval;
        loop {
            if check(self)? {
                return Ok(());
            }
            if let WaitPolicy::Bounded(limit) = self.config().logout_wait {
                if started.elapsed() >= limit {
                    warn!("gave up waiting for {} after {:?}", what, limit);
                    return Err(EnclosureStatus::Timeout(what.to_string()));
                }
            }
            if poll.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(poll);
            }
        }
    }

    /// Wait for the event thread to drain `port`'s logout queue and confirm
    /// `device` is logged out.
    pub fn wait_for_logout(&self, port: DeviceHandle, device: DeviceHandle) -> Result<()> {
        self.poll_until(&format!("logout of {}", device), |term| {
            let st = term.lock_state();
            Ok(st.tree.port(port)?.is_logout_queue_empty() && st.tree.logout_complete(device)?)
        })
    }

    /// Remove from the device table and queue the logout. Returns the port.
    pub(super) fn begin_logout(&self, device: DeviceHandle) -> Result<DeviceHandle> {
        let port = {
            let mut st = self.lock_state();
            let port = st.tree.find_port_of(device)?;
            Self::remove_from_table_locked(&mut st, port, device)?;
            st.tree.port_logout_device(port, device)?;
            port
        };
        self.device_state_change_notify(port);
        Ok(port)
    }

    /// Log a device out, wait for confirmation, then free its subtree.
    pub fn remove_device(&self, device: DeviceHandle) -> Result<()> {
        debug!("removing {}", device);
        let port = self.begin_logout(device)?;
        self.wait_for_logout(port, device)?;
        self.lock_state().tree.destroy_subtree(device)?;
        debug!("removed {}", device);
        Ok(())
    }

    /// Log a device out and detach it, keeping the node alive.
    pub fn unmount_device(&self, device: DeviceHandle) -> Result<()> {
        debug!("unmounting {}", device);
        let port = self.begin_logout(device)?;
        self.wait_for_logout(port, device)?;
        self.lock_state().tree.detach_from_parent(device)?;
        Ok(())
    }

    /// Log every device below `port` in.
    pub fn login_all_devices_on_port(&self, port: DeviceHandle) -> Result<()> {
        let children = {
            let st = self.lock_state();
            st.tree.port(port)?;
            st.tree.all_children_of_type(port, DeviceType::Enclosure)
        };
        for child in children {
            self.activate_device(child)?;
        }
        Ok(())
    }

    /// Queue logouts for every device below `port` without waiting.
    pub fn logout_all_devices_on_port(&self, port: DeviceHandle) -> Result<()> {
        let children = {
            let st = self.lock_state();
            st.tree.port(port)?;
            st.tree.all_children_of_type(port, DeviceType::Enclosure)
        };
        for child in children {
            self.begin_logout(child)?;
        }
        Ok(())
    }

    // Reset handshake

    pub fn port_reset_flag(&self, port: DeviceHandle, event: ResetEvent) -> Result<bool> {
        Ok(self.lock_state().tree.port(port)?.reset_flag(event))
    }

    pub fn set_port_reset_flag(&self, port: DeviceHandle, event: ResetEvent) -> Result<()> {
        self.lock_state().tree.port_mut(port)?.set_reset_flag(event, true);
        self.device_state_change_notify(port);
        Ok(())
    }

    pub fn clear_port_reset_flag(&self, port: DeviceHandle, event: ResetEvent) -> Result<()> {
        self.lock_state().tree.port_mut(port)?.set_reset_flag(event, false);
        Ok(())
    }

    /// Block until the event thread has serviced (cleared) a reset flag.
    pub fn wait_on_port_reset_clear(&self, port: DeviceHandle, event: ResetEvent) -> Result<()> {
        self.poll_until(&format!("{:?} reset on {}", event, port), |term| {
            Ok(!term.port_reset_flag(port, event)?)
        })
    }

    /// Simulated bus reset: raise begin, wait, raise completed, wait.
    pub fn reset_port(&self, port: DeviceHandle) -> Result<()> {
        for event in [ResetEvent::Begin, ResetEvent::Completed] {
            self.set_port_reset_flag(port, event)?;
            self.wait_on_port_reset_clear(port, event)?;
        }
        debug!("port {} reset handshake complete", port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::enclosure_type::EnclosureType;
    use crate::error::EnclosureStatus;
    use crate::terminator::{Terminator, TerminatorConfig};
    use crate::topology::{EnclosureInfo, PortInfo, ResetEvent};
    use std::time::Duration;

    #[test]
    fn bounded_wait_times_out_without_event_thread() {
        let config = TerminatorConfig::default().with_logout_timeout(Some(Duration::from_millis(20)));
        let term = Terminator::new(config);
        let port = term.create_port(PortInfo::default());
        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(EnclosureType::Viper, 0, 0))
            .unwrap();
        term.insert_device(port, encl).unwrap();
        term.activate_device(encl).unwrap();

        assert!(matches!(term.remove_device(encl), Err(EnclosureStatus::Timeout(_))));
        // The device survives a timed out removal
        assert!(term.lock_state().tree.contains(encl));

        term.set_port_reset_flag(port, ResetEvent::Begin).unwrap();
        assert!(matches!(term.reset_port(port), Err(EnclosureStatus::Timeout(_))));
    }
}
