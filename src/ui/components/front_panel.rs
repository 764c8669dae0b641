use crate::domain::eses::StatusCode;
use crate::topology::DeviceState;
use crate::ui::state::SlotView;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Slots drawn per row before wrapping
const SLOTS_PER_ROW: usize = 30;

/// Each slot column is 3 chars: two borders and one content column
const SLOT_WIDTH: u16 = 3;

/// 4 content lines plus top and bottom border
const SLOT_HEIGHT: u16 = 6;

/// Render the enclosure front panel: one vertical bay per drive slot
pub fn render_front_panel(frame: &mut Frame, area: Rect, title: &str, slots: &[SlotView], selected: usize) {
    let block = Block::default()
        .title(format!(" {} ({} slots) ", title, slots.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if slots.is_empty() {
        frame.render_widget(
            Paragraph::new("no drive slots").style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    }

    let fit = usize::from(inner.width / SLOT_WIDTH).max(1);
    let per_row = SLOTS_PER_ROW.min(fit);
    let rows: Vec<&[SlotView]> = slots.chunks(per_row).collect();

    let mut constraints: Vec<Constraint> = rows.iter().map(|_| Constraint::Length(SLOT_HEIGHT)).collect();
    constraints.push(Constraint::Length(1)); // Legend
    constraints.push(Constraint::Fill(1));
    let row_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (row_idx, row) in rows.iter().enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(
                row.iter()
                    .map(|_| Constraint::Length(SLOT_WIDTH))
                    .chain(std::iter::once(Constraint::Fill(1)))
                    .collect::<Vec<_>>(),
            )
            .split(row_chunks[row_idx]);
        for (col, slot) in row.iter().enumerate() {
            let is_selected = row_idx * per_row + col == selected;
            render_vertical_drive(frame, cols[col], slot, is_selected);
        }
    }

    render_legend(frame, row_chunks[rows.len()]);
}

fn render_legend(frame: &mut Frame, area: Rect) {
    let legend = Line::from(vec![
        Span::styled("■", Style::default().fg(Color::Green)),
        Span::raw(" logged in  "),
        Span::styled("■", Style::default().fg(Color::Yellow)),
        Span::raw(" pending  "),
        Span::styled("■", Style::default().fg(Color::Blue)),
        Span::raw(" powered off  "),
        Span::styled("■", Style::default().fg(Color::Magenta)),
        Span::raw(" pulled  "),
        Span::styled("■", Style::default().fg(Color::Red)),
        Span::raw(" fault  "),
        Span::styled("●", Style::default().fg(Color::Green)),
        Span::raw(" phy ready"),
    ]);
    frame.render_widget(Paragraph::new(legend), area);
}

/// Border color for a slot, worst condition first
fn slot_color(slot: &SlotView) -> Color {
    if matches!(
        slot.status,
        StatusCode::Critical | StatusCode::Unrecoverable | StatusCode::Unavailable
    ) {
        return Color::Red;
    }
    if slot.dev_off {
        return Color::Blue;
    }
    match &slot.drive {
        Some(drive) => match drive.state {
            DeviceState::LoginComplete => Color::Green,
            DeviceState::LoginPending | DeviceState::LogoutPending => Color::Yellow,
            DeviceState::LogoutComplete | DeviceState::Unknown => Color::DarkGray,
        },
        None if slot.pulled => Color::Magenta,
        None => Color::DarkGray,
    }
}

fn render_vertical_drive(frame: &mut Frame, area: Rect, slot: &SlotView, selected: bool) {
    // Two digit label; the bank row already tells slots past 99 apart
    let label = slot.slot % 100;
    let digit1 = format!("{}", label / 10);
    let digit2 = format!("{}", label % 10);

    let color = slot_color(slot);
    let text_color = if slot.drive.is_some() { Color::White } else { Color::DarkGray };
    let (led, led_color) = match (&slot.drive, slot.phy_rdy) {
        (Some(_), true) => ("●", Color::Green),
        (Some(_), false) => ("○", Color::Yellow),
        (None, _) => (" ", Color::DarkGray),
    };
    let off = if slot.dev_off { "⊘" } else { " " };

    let visual = vec![
        Line::from(Span::styled(led, Style::default().fg(led_color))),
        Line::from(Span::styled(digit1, Style::default().fg(text_color))),
        Line::from(Span::styled(digit2, Style::default().fg(text_color))),
        Line::from(Span::styled(off, Style::default().fg(Color::Blue))),
    ];

    let mut border = Style::default().fg(color);
    if selected {
        border = border.add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }
    let paragraph = Paragraph::new(visual).block(Block::default().borders(Borders::ALL).border_style(border));
    frame.render_widget(paragraph, area);
}
