use crate::domain::eses::SpSide;
use crate::error::{EnclosureStatus, Result};
use std::time::Duration;

/// How long remove/unmount wait for the event thread to confirm a logout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Poll until the logout completes, however long that takes.
    Unbounded,
    /// Give up with `Timeout` after the given time; the device is left alive.
    Bounded(Duration),
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy::Unbounded
    }
}

#[derive(Clone, Debug)]
pub struct TerminatorConfig {
    pub sp_side: SpSide,                                  // selects slot -> phy tables
    pub logout_wait: WaitPolicy,
    pub poll_interval: Duration,                          // sleep between logout polls
    pub need_update_enclosure_firmware_rev: bool,
    pub need_update_enclosure_resume_prom_checksum: bool,
}

impl Default for TerminatorConfig {
    fn default() -> Self {
        Self {
            sp_side: SpSide::A,
            logout_wait: WaitPolicy::default(),
            poll_interval: Duration::from_millis(1),
            need_update_enclosure_firmware_rev: true,
            need_update_enclosure_resume_prom_checksum: true,
        }
    }
}

impl TerminatorConfig {
    pub fn with_side(mut self, sp_side: SpSide) -> Self {
        self.sp_side = sp_side;
        self
    }

    pub fn with_logout_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.logout_wait = timeout.map_or(WaitPolicy::Unbounded, WaitPolicy::Bounded);
        self
    }

    /// Reject settings the polling loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(EnclosureStatus::ConfigInvalid("poll interval must be non-zero".into()));
        }
        if self.logout_wait == WaitPolicy::Bounded(Duration::ZERO) {
            return Err(EnclosureStatus::ConfigInvalid(
                "a zero logout timeout fails every logout".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_settings_are_validated() {
        assert!(TerminatorConfig::default().validate().is_ok());
        let bounded = TerminatorConfig::default().with_logout_timeout(Some(Duration::from_secs(1)));
        assert!(bounded.validate().is_ok());

        let zero_timeout = TerminatorConfig::default().with_logout_timeout(Some(Duration::ZERO));
        assert!(matches!(zero_timeout.validate(), Err(EnclosureStatus::ConfigInvalid(_))));
        let spinning = TerminatorConfig { poll_interval: Duration::ZERO, ..TerminatorConfig::default() };
        assert!(matches!(spinning.validate(), Err(EnclosureStatus::ConfigInvalid(_))));
    }
}
