use crate::ui::components::{render_device_table, render_front_panel, render_status_panel};
use crate::ui::state::{AppState, ConsoleCommand};
use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock(state: &Mutex<AppState>) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn run_tui(state: Arc<Mutex<AppState>>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the UI loop
    let result = run_app(&mut terminal, &state);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // The main loop stops once it sees the flag, even if the UI failed
    lock(&state).quit();
    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, state: &Arc<Mutex<AppState>>) -> Result<()> {
    loop {
        // Clone state for rendering
        let current_state = lock(state).clone();

        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),   // Header
                    Constraint::Min(10),     // Front panel
                    Constraint::Fill(1),     // Topology + status
                    Constraint::Length(3),   // Footer
                ])
                .split(frame.size());

            render_header(frame, chunks[0], &current_state);

            let title = current_state
                .encl_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "enclosure".to_string());
            render_front_panel(frame, chunks[1], &title, &current_state.slots, current_state.selected);

            let bottom = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(60),  // Device tree
                    Constraint::Percentage(40),  // Firmware + events
                ])
                .split(chunks[2]);
            render_device_table(frame, bottom[0], &current_state.devices);
            render_status_panel(frame, bottom[1], current_state.firmware.as_ref(), &current_state.events);

            render_footer(frame, chunks[3], &current_state);
        })?;

        // Handle input with timeout to allow for periodic updates
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key_event(key, state) {
                    break;  // User requested quit
                }
            }
        }

        if lock(state).should_quit {
            break;
        }
    }

    Ok(())
}

fn render_header(frame: &mut ratatui::Frame, area: ratatui::layout::Rect, state: &AppState) {
    let elapsed = state.last_update.elapsed();
    let selected = state
        .slots
        .get(state.selected)
        .map(|s| {
            let drive = s.drive.as_ref().map(|d| d.serial.as_str()).unwrap_or("empty");
            format!("slot {} phy {} {} {}", s.slot, s.phy_id, s.status, drive)
        })
        .unwrap_or_default();
    let header_text = Line::from(vec![
        Span::styled(
            "TERMINATOR",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - SAS Enclosure Simulator  "),
        Span::styled(selected, Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(
            format!("Updated: {:.1}s ago", elapsed.as_secs_f64()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

    frame.render_widget(header, area);
}

fn render_footer(frame: &mut ratatui::Frame, area: ratatui::layout::Rect, state: &AppState) {
    let footer_text = Line::from(vec![
        Span::raw("[←/→] slot  [I]nsert  [R]emove  [P]ull  [U]npull  [C]ycle power  [F]irmware  [Q]uit  "),
        Span::styled(
            format!(
                "{} drives, {} devices",
                state.slots.iter().filter(|s| s.drive.is_some()).count(),
                state.devices.len()
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let footer = Paragraph::new(footer_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

    frame.render_widget(footer, area);
}

fn handle_key_event(key: KeyEvent, state: &Arc<Mutex<AppState>>) -> bool {
    let mut state_guard = lock(state);
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            state_guard.quit();
            return true;
        }
        KeyCode::Left => state_guard.select_prev(),
        KeyCode::Right => state_guard.select_next(),
        KeyCode::Char('i') => state_guard.queue_for_selected(ConsoleCommand::InsertDrive),
        KeyCode::Char('r') => state_guard.queue_for_selected(ConsoleCommand::RemoveDrive),
        KeyCode::Char('p') => state_guard.queue_for_selected(ConsoleCommand::PullDrive),
        KeyCode::Char('u') => state_guard.queue_for_selected(ConsoleCommand::ReinsertDrive),
        KeyCode::Char('c') => state_guard.queue_for_selected(ConsoleCommand::PowerCycleDrive),
        KeyCode::Char('f') => state_guard.commands.push(ConsoleCommand::ActivateLccFirmware),
        _ => {}
    }
    false
}
