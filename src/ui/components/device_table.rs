use crate::topology::DeviceState;
use crate::ui::state::DeviceRow;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
    Frame,
};

fn state_color(state: DeviceState) -> Color {
    match state {
        DeviceState::LoginComplete => Color::Green,
        DeviceState::LoginPending | DeviceState::LogoutPending => Color::Yellow,
        DeviceState::LogoutComplete => Color::Red,
        DeviceState::Unknown => Color::DarkGray,
    }
}

/// Device tree below the port, one row per node
pub fn render_device_table(frame: &mut Frame, area: Rect, devices: &[DeviceRow]) {
    let block = Block::default()
        .title(" Topology ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let heading = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("Device").style(heading),
        Cell::from("Handle").style(heading),
        Cell::from("State").style(heading),
        Cell::from("Flags").style(heading),
        Cell::from("Index").style(heading),
    ]);

    let rows: Vec<Row> = devices
        .iter()
        .map(|dev| {
            let flags = format!(
                "{}{}",
                if dev.login_pending { "L" } else { "-" },
                if dev.logout_complete { "O" } else { "-" },
            );
            Row::new(vec![
                Cell::from(format!("{}{}", "  ".repeat(dev.depth), dev.label)),
                Cell::from(dev.handle.to_string()),
                Cell::from(format!("{:?}", dev.state)).style(Style::default().fg(state_color(dev.state))),
                Cell::from(flags),
                Cell::from(dev.table_index.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        vec![
            Constraint::Fill(1),     // Device
            Constraint::Length(8),   // Handle
            Constraint::Length(14),  // State
            Constraint::Length(5),   // Flags
            Constraint::Length(6),   // Index
        ],
    )
    .header(header)
    .block(block)
    .column_spacing(1);

    frame.render_widget(table, area);
}
