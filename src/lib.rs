pub mod control;
pub mod domain;
pub mod error;
pub mod miniport;
pub mod terminator;
pub mod topology;
pub mod ui;
pub mod virtual_phy;

pub use control::{ControlOp, ControlReply};
pub use error::{EnclosureStatus, OperationQualifier, Result};
pub use miniport::MiniportEventThread;
pub use terminator::{Terminator, TerminatorConfig, WaitPolicy};
