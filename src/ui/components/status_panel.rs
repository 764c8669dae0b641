use crate::domain::eses::DownloadStatus;
use crate::ui::state::FirmwareView;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use std::collections::VecDeque;

/// Firmware status on top, recent console events below
pub fn render_status_panel(frame: &mut Frame, area: Rect, firmware: Option<&FirmwareView>, events: &VecDeque<String>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),  // Firmware
            Constraint::Min(3),     // Events
        ])
        .split(area);

    render_firmware(frame, chunks[0], firmware);
    render_events(frame, chunks[1], events);
}

fn render_firmware(frame: &mut Frame, area: Rect, firmware: Option<&FirmwareView>) {
    let block = Block::default()
        .title(" LCC Firmware ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let lines = match firmware {
        Some(fw) => {
            let status_color = match fw.download_status {
                DownloadStatus::None => Color::Green,
                s if s.is_error() => Color::Red,
                _ => Color::Yellow,
            };
            vec![
                Line::from(vec![
                    Span::raw("Revision:   "),
                    Span::styled(fw.lcc_rev.to_string(), Style::default().add_modifier(Modifier::BOLD)),
                ]),
                Line::from(vec![
                    Span::raw("Download:   "),
                    Span::styled(format!("{:?}", fw.download_status), Style::default().fg(status_color)),
                ]),
                Line::from(format!("Gen code:   {}", fw.gen_code)),
                Line::from(format!("Pending:    {}", fw.pending)),
            ]
        }
        None => vec![Line::from(Span::styled("no enclosure", Style::default().fg(Color::DarkGray)))],
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_events(frame: &mut Frame, area: Rect, events: &VecDeque<String>) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    // Newest last, keep the tail that fits
    let visible = usize::from(area.height.saturating_sub(2));
    let items: Vec<ListItem> = events
        .iter()
        .skip(events.len().saturating_sub(visible))
        .map(|e| ListItem::new(e.as_str()))
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}
