use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use terminator::domain::enclosure_type::EnclosureType;
use terminator::domain::eses::{ComponentType, SpSide, SubenclosureType};
use terminator::topology::{DeviceHandle, DriveInfo, DriveType, EnclosureInfo, PortInfo};
use terminator::ui::{run_tui, AppState, ConsoleCommand};
use terminator::virtual_phy::{FirmwareRecord, Revision};
use terminator::{MiniportEventThread, Terminator, TerminatorConfig};

/// Drive capacity in 520 byte blocks (~300 GB)
const DRIVE_CAPACITY_BLOCKS: u64 = 0x2000_0000;

#[derive(Parser, Debug)]
#[command(name = "terminator-console")]
#[command(about = "SAS enclosure simulator - drive a virtual enclosure from the terminal")]
#[command(version)]
struct Args {
    /// Enclosure type (viper, derringer, voyager-icm, viking-iosxp, ...)
    #[arg(short, long, default_value = "viper", value_parser = parse_enclosure)]
    enclosure: EnclosureType,

    /// Number of drives inserted at startup, filling slots from 0
    #[arg(short, long, default_value_t = 8)]
    drives: u32,

    /// Storage processor side the virtual phys report
    #[arg(short, long, default_value = "A", value_parser = parse_side)]
    side: SpSide,

    /// Refresh interval in milliseconds
    #[arg(short, long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(50..=10000))]
    refresh: u64,

    /// Run a scripted pass and print a summary instead of the TUI
    #[arg(long)]
    headless: bool,

    /// Firmware activation delay in milliseconds
    #[arg(long, default_value_t = 2000)]
    activate_delay: u64,

    /// Simulated LCC reset time in milliseconds
    #[arg(long, default_value_t = 1000)]
    reset_delay: u64,

    /// Drive power cycle length in milliseconds
    #[arg(long, default_value_t = 1000)]
    power_cycle: u32,

    /// Give up on a logout after this many milliseconds (waits forever if unset)
    #[arg(long)]
    logout_timeout: Option<u64>,
}

fn parse_enclosure(name: &str) -> std::result::Result<EnclosureType, String> {
    EnclosureType::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = EnclosureType::ALL.iter().map(|t| t.name()).collect();
        format!("unknown enclosure {:?}, expected one of: {}", name, known.join(", "))
    })
}

fn parse_side(side: &str) -> std::result::Result<SpSide, String> {
    match side {
        "a" | "A" => Ok(SpSide::A),
        "b" | "B" => Ok(SpSide::B),
        other => Err(format!("unknown side {:?}, expected A or B", other)),
    }
}

fn lock(state: &Mutex<AppState>) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One port, one enclosure and the drives the operator moves around
struct Console {
    term: Terminator,
    encl: DeviceHandle,
    power_cycle_ms: u32,
    next_serial: u32,
    pulled: HashMap<u32, DeviceHandle>,   // client slot -> pulled drive
}

impl Console {
    fn build(term: Terminator, args: &Args) -> Result<Self> {
        let board = term.create_board("terminator-console")?;
        let port = term.create_port(PortInfo::default());
        term.insert_device(board, port)?;

        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(args.enclosure, 0, 0))
            .with_context(|| format!("Failed to create {} enclosure", args.enclosure))?;
        term.insert_device(port, encl)?;
        let mut vphys = vec![encl];

        if let Some(ee_type) = args.enclosure.edge_expander_type() {
            for &conn in args.enclosure.drive_bank_connectors() {
                let ee = term.create_sas_enclosure(
                    EnclosureInfo::new(ee_type, 0, 0).with_connector(u32::from(conn)),
                )?;
                term.insert_device(encl, ee)
                    .with_context(|| format!("Failed to plug {} into connector {}", ee_type, conn))?;
                vphys.push(ee);
            }
        }

        for target in vphys {
            term.with_vphy_mut(target, |v| {
                v.set_activate_interval(Duration::from_millis(args.activate_delay));
                v.set_reset_interval(Duration::from_millis(args.reset_delay));
            })?;
        }
        term.activate_device(encl)?;

        let mut console = Self {
            term,
            encl,
            power_cycle_ms: args.power_cycle,
            next_serial: 0,
            pulled: HashMap::new(),
        };
        let slots = args.enclosure.total_drive_slots();
        for slot in 0..args.drives.min(slots) {
            console.insert(slot)?;
        }
        log::info!(
            "built {} with {} of {} slots populated",
            args.enclosure,
            args.drives.min(slots),
            slots
        );
        Ok(console)
    }

    fn insert(&mut self, slot: u32) -> Result<String> {
        self.next_serial += 1;
        let serial = format!("TRM{:05}", self.next_serial);
        let info = DriveInfo::new(DriveType::Sas, DRIVE_CAPACITY_BLOCKS, &serial);
        let drive = self.term.insert_sas_drive(self.encl, slot, info)?;
        Ok(format!("inserted {} ({}) in slot {}", serial, drive, slot))
    }

    fn drive_in_slot(&self, slot: u32) -> Result<DeviceHandle> {
        let (owner, local) = self.term.enclosure_local_slot(self.encl, slot)?;
        self.term
            .lock_state()
            .tree
            .drive_in_slot(owner, local)
            .ok_or_else(|| anyhow!("slot {} is empty", slot))
    }

    fn run(&mut self, command: ConsoleCommand) -> Result<String> {
        match command {
            ConsoleCommand::InsertDrive(slot) => self.insert(slot),
            ConsoleCommand::RemoveDrive(slot) => {
                let drive = self.drive_in_slot(slot)?;
                self.term.remove_drive(drive)?;
                Ok(format!("removed {} from slot {}", drive, slot))
            }
            ConsoleCommand::PullDrive(slot) => {
                let drive = self.drive_in_slot(slot)?;
                self.term.pull_drive(drive)?;
                self.pulled.insert(slot, drive);
                Ok(format!("pulled {} from slot {}", drive, slot))
            }
            ConsoleCommand::ReinsertDrive(slot) => {
                let drive = self
                    .pulled
                    .remove(&slot)
                    .ok_or_else(|| anyhow!("no drive was pulled from slot {}", slot))?;
                if let Err(e) = self.term.reinsert_drive(drive) {
                    self.pulled.insert(slot, drive);
                    return Err(e.into());
                }
                Ok(format!("reinserted {} in slot {}", drive, slot))
            }
            ConsoleCommand::PowerCycleDrive(slot) => {
                let (owner, local) = self.term.enclosure_local_slot(self.encl, slot)?;
                let vphy = self.term.vphy_of(owner)?;
                self.term.power_cycle_drive(vphy, local, self.power_cycle_ms)?;
                Ok(format!("power cycling slot {} for {}ms", slot, self.power_cycle_ms))
            }
            ConsoleCommand::ActivateLccFirmware => {
                let side = self.term.config().sp_side;
                let gen_code = self.term.with_vphy(self.encl, |v| v.gen_code())?;
                let new_rev: Revision = format!("{:04}A", (gen_code + 1) % 10_000).parse()?;
                let record = FirmwareRecord {
                    subencl_type: SubenclosureType::Lcc,
                    side,
                    comp_type: ComponentType::ExpanderFw,
                    slot: 0,
                    new_rev,
                };
                self.term.enclosure_firmware_download(self.encl, record)?;
                self.term
                    .enclosure_firmware_activate(self.encl, SubenclosureType::Lcc, side, 0)?;
                Ok(format!("activating LCC {:?} firmware {}", side, new_rev))
            }
        }
    }

    /// Poll until every populated slot's drive is logged in.
    fn wait_for_logins(&self, limit: Duration) -> Result<()> {
        let started = Instant::now();
        let slots = self.term.lock_state().tree.enclosure(self.encl)?.encl_type.total_drive_slots();
        loop {
            let mut pending = 0;
            for slot in 0..slots {
                let present = !self.term.is_drive_slot_available(self.encl, slot).unwrap_or(true);
                if present && !self.term.is_drive_in_slot_logged_in(self.encl, slot)? {
                    pending += 1;
                }
            }
            if pending == 0 {
                return Ok(());
            }
            if started.elapsed() >= limit {
                return Err(anyhow!("{} drives still not logged in after {:?}", pending, limit));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Exercise insert, pull, power cycle, firmware and remove once, then report.
fn run_headless(console: &mut Console) -> Result<()> {
    let limit = Duration::from_secs(30);
    console.wait_for_logins(limit)?;

    let mut script = vec![
        ConsoleCommand::PullDrive(0),
        ConsoleCommand::ReinsertDrive(0),
        ConsoleCommand::PowerCycleDrive(1),
        ConsoleCommand::ActivateLccFirmware,
    ];
    let populated = console.next_serial;
    if populated > 0 {
        script.push(ConsoleCommand::RemoveDrive(populated - 1));
    }

    for command in script {
        match console.run(command) {
            Ok(msg) => println!("{}", msg),
            Err(e) => println!("{:?} failed: {:#}", command, e),
        }
        if command == ConsoleCommand::ActivateLccFirmware {
            console.term.wait_for_firmware_activations();
        }
    }
    console.term.wait_for_power_cycles();
    console.wait_for_logins(limit)?;

    let mut state = AppState::new();
    state.refresh(&console.term, console.encl)?;
    println!();
    for slot in state.slots.iter().filter(|s| s.drive.is_some() || s.pulled) {
        let (serial, dev_state) = match &slot.drive {
            Some(d) => (d.serial.as_str(), format!("{:?}", d.state)),
            None => ("-", "pulled".to_string()),
        };
        println!(
            "slot {:3}  phy {:2}  {:8}  {:10}  {}",
            slot.slot, slot.phy_id, slot.status, serial, dev_state
        );
    }
    if let Some(fw) = &state.firmware {
        println!(
            "\nLCC firmware {}  download {:?}  generation {}",
            fw.lcc_rev, fw.download_status, fw.gen_code
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = TerminatorConfig::default()
        .with_side(args.side)
        .with_logout_timeout(args.logout_timeout.map(Duration::from_millis));
    config.validate().context("Invalid terminator configuration")?;
    let term = Terminator::new(config);

    // Create shared application state
    let app_state = Arc::new(Mutex::new(AppState::new()));

    let event_state = Arc::clone(&app_state);
    let headless = args.headless;
    let events = MiniportEventThread::start(
        term.clone(),
        Some(Box::new(move |event| {
            log::info!("miniport: {:?}", event);
            if !headless {
                lock(&event_state).push_event(format!("{:?}", event));
            }
        })),
    )
    .context("Failed to start miniport event thread")?;

    let mut console = Console::build(term.clone(), &args)?;

    if args.headless {
        let result = run_headless(&mut console);
        events.stop();
        term.shutdown();
        return result;
    }

    // Run TUI in a separate thread; terminator work happens here
    let tui_state = Arc::clone(&app_state);
    let tui_handle = std::thread::spawn(move || run_tui(tui_state));

    let refresh = Duration::from_millis(args.refresh);
    let mut last_update: Option<Instant> = None;
    loop {
        // Check if TUI thread has finished (user quit)
        if tui_handle.is_finished() {
            break;
        }

        let commands = lock(&app_state).take_commands();
        for command in commands {
            let line = match console.run(command) {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("{:?} failed: {:#}", command, e);
                    format!("{:?} failed: {:#}", command, e)
                }
            };
            lock(&app_state).push_event(line);
        }

        if last_update.map_or(true, |t| t.elapsed() >= refresh) {
            last_update = Some(Instant::now());
            let mut state = lock(&app_state);
            if let Err(e) = state.refresh(&term, console.encl) {
                log::error!("Error refreshing enclosure view: {}", e);
            }
        }

        // Small sleep to avoid busy waiting
        std::thread::sleep(Duration::from_millis(50));
    }

    // Wait for TUI thread to finish
    let tui_result = tui_handle
        .join()
        .map_err(|_| anyhow!("TUI thread panicked"))?;

    events.stop();
    term.shutdown();
    tui_result
}
