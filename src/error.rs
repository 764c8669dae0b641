use crate::topology::DeviceHandle;
use thiserror::Error;

/// Enclosure status taxonomy returned by every terminator operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnclosureStatus {
    // Input validation
    #[error("null buffer supplied")]
    NullBuffer,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("illegal request: {0}")]
    IllegalRequest(String),
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),
    #[error("data illegal: {0}")]
    DataIllegal(String),

    // Resources
    #[error("insufficient resource: {0}")]
    InsufficientResource(String),
    #[error("memory allocation failed")]
    MemAllocFailed,
    #[error("allocated buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    // Target resolution
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error("component not found: {0}")]
    ComponentNotFound(String),
    #[error("component type unsupported: {0}")]
    ComponentTypeUnsupported(String),
    #[error("component type index invalid: {0}")]
    ComponentTypeIndexInvalid(u32),
    #[error("control code unsupported: {0}")]
    CtrlCodeUnsupported(String),

    #[error("device busy")]
    Busy,

    #[error("checksum error in buffer {0}")]
    ChecksumError(u8),

    // Firmware
    #[error("no pending firmware record for {0}")]
    NoPendingRecord(String),
    #[error("firmware activation failed: {0}")]
    ActivateFailed(String),

    // Topology
    #[error("invalid handle {0}")]
    InvalidHandle(DeviceHandle),
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    #[error("device {0} has no port ancestor")]
    NoPort(DeviceHandle),
    #[error("invalid connector position {0}")]
    InvalidConnectorPosition(u32),
    #[error("drive slot {0} is not available")]
    SlotUnavailable(u32),
    #[error("connector id {0} is not available")]
    ConnectorUnavailable(u32),
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

/// Qualifier the upstream packet layer attaches to a failed control operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationQualifier {
    Busy,
    ComponentNotFound,
    Generic,
}

impl EnclosureStatus {
    pub fn qualifier(&self) -> OperationQualifier {
        match self {
            EnclosureStatus::Busy => OperationQualifier::Busy,
            EnclosureStatus::ComponentNotFound(_) | EnclosureStatus::TargetNotFound(_) => {
                OperationQualifier::ComponentNotFound
            }
            _ => OperationQualifier::Generic,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnclosureStatus>;
