/// ESES status element model
///
/// Field layout follows the SES status elements the virtual phy serves.
use crate::error::EnclosureStatus;
use std::fmt;

/// Offset added to the degree value reported by temperature elements.
pub const TEMP_SENSOR_OFFSET: u8 = 42;
pub const DEFAULT_TEMPERATURE: u8 = 22 + TEMP_SENSOR_OFFSET;

/// Revision string width in a version descriptor.
pub const REV_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusCode {
    Unsupported = 0,
    Ok = 1,
    Critical = 2,
    NonCritical = 3,
    Unrecoverable = 4,
    NotInstalled = 5,
    Unknown = 6,
    Unavailable = 7,
}

impl TryFrom<u8> for StatusCode {
    type Error = EnclosureStatus;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => StatusCode::Unsupported,
            1 => StatusCode::Ok,
            2 => StatusCode::Critical,
            3 => StatusCode::NonCritical,
            4 => StatusCode::Unrecoverable,
            5 => StatusCode::NotInstalled,
            6 => StatusCode::Unknown,
            7 => StatusCode::Unavailable,
            other => {
                return Err(EnclosureStatus::DataIllegal(format!(
                    "element status code {:#x}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Unsupported => "UNSUPP",
            StatusCode::Ok => "OK",
            StatusCode::Critical => "CRIT",
            StatusCode::NonCritical => "NONCRIT",
            StatusCode::Unrecoverable => "UNRECOV",
            StatusCode::NotInstalled => "NOT_INST",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Unavailable => "UNAVAIL",
        };
        f.write_str(s)
    }
}

/// Storage processor side. Selects the slot to phy table and addresses
/// per-side subenclosures (LCC A/B, PS A/B).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpSide {
    A = 0,
    B = 1,
}

impl SpSide {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(SpSide::A),
            1 => Some(SpSide::B),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubenclosureType {
    PowerSupply = 0x02,
    Cooling = 0x03,
    Lcc = 0x07,
    Ups = 0x0B,
    Chassis = 0x0E,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    ExpanderFw = 0,
    BootLoaderFw = 1,
    InitString = 2,
    FpgaImage = 3,
    PsFw = 4,
    OtherExpander = 5,
    LccMain = 6,
    SpsFw = 7,
    CoolingFw = 8,
    BbuFw = 9,
    SpsSecondaryFw = 10,
    SpsBatteryFw = 11,
    HardwareVersion = 30,
    OtherFw = 31,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferType {
    Eeprom = 0,
    ActiveTrace = 1,
    SavedTrace = 2,
    EventLog = 3,
    SavedDump = 4,
    ActiveRam = 5,
    Registers = 6,
}

/// Microcode download status reported through the download status page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DownloadStatus {
    None = 0x00,
    InProgress = 0x01,
    UpdatingFlash = 0x02,
    UpdatingNonvol = 0x03,
    ImageInUse = 0x10,
    NeedsActivate = 0x13,
    ActivateInProgress = 0x70,
    ErrorPageField = 0x80,
    ErrorChecksum = 0x81,
    ErrorTimeout = 0x82,
    ErrorImage = 0x83,
    ErrorBackup = 0x84,
    NoImage = 0x85,
    ActivateFailed = 0xF0,
}

impl DownloadStatus {
    /// Error statuses are injected by tests to make activation bail out.
    pub fn is_error(self) -> bool {
        self >= DownloadStatus::ErrorPageField
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => DownloadStatus::None,
            0x01 => DownloadStatus::InProgress,
            0x02 => DownloadStatus::UpdatingFlash,
            0x03 => DownloadStatus::UpdatingNonvol,
            0x10 => DownloadStatus::ImageInUse,
            0x13 => DownloadStatus::NeedsActivate,
            0x70 => DownloadStatus::ActivateInProgress,
            0x80 => DownloadStatus::ErrorPageField,
            0x81 => DownloadStatus::ErrorChecksum,
            0x82 => DownloadStatus::ErrorTimeout,
            0x83 => DownloadStatus::ErrorImage,
            0x84 => DownloadStatus::ErrorBackup,
            0x85 => DownloadStatus::NoImage,
            0xF0 => DownloadStatus::ActivateFailed,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveSlotStatus {
    pub status: StatusCode,
    pub dev_off: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhyStatus {
    pub status: StatusCode,
    pub phy_id: u8,
    pub phy_rdy: bool,
    pub link_rdy: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerSupplyStatus {
    pub status: StatusCode,
    pub rqsted_on: bool,
    pub ac_fail: bool,
    pub dc_fail: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoolingStatus {
    pub status: StatusCode,
    pub rqsted_on: bool,
    pub actual_speed_code: u8,  // 7 = highest
    pub actual_fan_speed: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempSensorStatus {
    pub status: StatusCode,
    pub temp: u8,  // degrees C + TEMP_SENSOR_OFFSET
    pub ot_failure: bool,
    pub ot_warning: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SasConnectorStatus {
    pub status: StatusCode,
    pub conn_type: u8,
    pub conn_physical_link: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnclosureElementStatus {
    pub status: StatusCode,
    pub failure_indicated: bool,
    pub warning_indicated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    NotScheduled,
    ClearedFault,
    CriticalTemperatureFault,
    CriticalCoolingFault,
    PsNotInstalled,
    UnspecifiedHwNotInstalled,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmcEnclosureStatus {
    pub shutdown_reason: ShutdownReason,
    pub partial_shutdown: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct EmcPowerSupplyInfo {
    pub margining_mode: u8,
    pub margining_test_results: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct GeneralInfoDriveSlot {
    pub battery_backed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayStatus {
    pub status: StatusCode,
    pub display_mode: u8,
    pub display_char: u8,
}

impl Default for DriveSlotStatus {
    fn default() -> Self {
        Self { status: StatusCode::NotInstalled, dev_off: false }
    }
}

impl Default for PowerSupplyStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, rqsted_on: true, ac_fail: false, dc_fail: false }
    }
}

impl Default for CoolingStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, rqsted_on: true, actual_speed_code: 7, actual_fan_speed: 0x10 }
    }
}

impl Default for TempSensorStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, temp: DEFAULT_TEMPERATURE, ot_failure: false, ot_warning: false }
    }
}

impl Default for SasConnectorStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, conn_type: 0, conn_physical_link: 0xFF }
    }
}

impl Default for EnclosureElementStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, failure_indicated: false, warning_indicated: false }
    }
}

impl Default for EmcEnclosureStatus {
    fn default() -> Self {
        Self { shutdown_reason: ShutdownReason::NotScheduled, partial_shutdown: false }
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self { status: StatusCode::Ok, display_mode: 0x01, display_char: b'-' }
    }
}

impl PhyStatus {
    pub fn new(phy_id: u8) -> Self {
        Self { status: StatusCode::Ok, phy_id, phy_rdy: true, link_rdy: true }
    }
}
