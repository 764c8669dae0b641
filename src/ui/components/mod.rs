pub mod device_table;
pub mod front_panel;
pub mod status_panel;

pub use device_table::render_device_table;
pub use front_panel::render_front_panel;
pub use status_panel::render_status_panel;
