pub mod device_table;
pub mod port;
pub mod tree;

pub use device_table::{DeviceTable, INDEX_BIT_MASK};
pub use port::{IoRequest, MiniportEvent, Port, PortInfo, ResetEvent};
pub use tree::{
    BoardInfo, DeviceHandle, DeviceState, DeviceTree, DeviceType, DriveInfo, DriveType,
    EnclosureInfo, Node, NodeKind, ResetAction,
};
