pub mod connector;
pub mod enclosure_type;
pub mod eses;

pub use connector::{classify_position, map_position_to_range_conn_id, ConnectorClass, ConnectorRange};
pub use enclosure_type::{EnclosureCapabilities, EnclosureType, MAX_DRIVE_SLOTS};
pub use eses::{
    BufferType, ComponentType, CoolingStatus, DisplayStatus, DownloadStatus, DriveSlotStatus,
    EmcEnclosureStatus, EmcPowerSupplyInfo, EnclosureElementStatus, GeneralInfoDriveSlot,
    PhyStatus, PowerSupplyStatus, SasConnectorStatus, ShutdownReason, SpSide, StatusCode,
    SubenclosureType, TempSensorStatus,
};
