mod common;

use common::{wait_until, Fixture};
use terminator::domain::enclosure_type::EnclosureType;
use terminator::domain::eses::StatusCode;
use terminator::topology::{DeviceState, DriveInfo, DriveType, MiniportEvent, ResetEvent};

fn drive(serial: &str) -> DriveInfo {
    DriveInfo::new(DriveType::Sas, 1 << 20, serial)
}

fn activated(encl_type: EnclosureType) -> Fixture {
    let fx = Fixture::new(encl_type);
    fx.term.activate_device(fx.encl).unwrap();
    assert!(fx.wait_for_state(fx.encl, DeviceState::LoginComplete));
    fx
}

#[test]
fn faulted_phy_keeps_drive_logged_out() {
    let fx = activated(EnclosureType::Viper);
    fx.term
        .with_vphy_mut(fx.encl, |v| {
            let mut phy = v.phy(21).unwrap();
            phy.status = StatusCode::Critical;
            v.set_phy(21, phy).unwrap();
        })
        .unwrap();

    let d = fx.term.insert_sas_drive(fx.encl, 3, drive("FAULTED")).unwrap();
    // Give the event thread a chance to (wrongly) log it in
    fx.term.reset_port(fx.port).unwrap();
    assert!(!fx.logged_in(d));
    assert_eq!(fx.state_of(d), DeviceState::Unknown);
    assert!(!fx.term.is_drive_in_slot_logged_in(fx.encl, 3).unwrap());
    assert!(fx.term.get_device_table_index(d).is_err());
}

#[test]
fn healthy_phy_logs_drive_in() {
    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 3, drive("GOOD")).unwrap();

    let (slot, phy) = fx.term.with_vphy(fx.encl, |v| v.slot_view(3).unwrap()).unwrap();
    assert_eq!(slot.status, StatusCode::Ok);
    assert_eq!(phy.phy_id, 21);
    assert!(phy.phy_rdy);

    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    assert!(fx.logged_in(d));
    assert!(fx.term.is_drive_in_slot_logged_in(fx.encl, 3).unwrap());
    assert!(fx.term.get_device_table_index(d).is_ok());
}

#[test]
fn removing_logged_in_drive_logs_out_first() {
    let fx = activated(EnclosureType::Derringer);
    let d = fx.term.insert_sas_drive(fx.encl, 10, drive("BYE")).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    fx.term.remove_drive(d).unwrap();
    assert!(fx.logged_out(d));
    let st = fx.term.lock_state();
    assert!(!st.tree.contains(d));
    assert!(st.tree.port(fx.port).unwrap().is_logout_queue_empty());
    drop(st);
    assert!(fx.term.is_drive_slot_available(fx.encl, 10).unwrap());
    let (slot, phy) = fx.term.with_vphy(fx.encl, |v| v.slot_view(10).unwrap()).unwrap();
    assert_eq!(slot.status, StatusCode::NotInstalled);
    assert!(!phy.phy_rdy);
    assert_eq!(phy.status, StatusCode::Ok);
}

#[test]
fn unavailable_phy_status_survives_removal() {
    let fx = activated(EnclosureType::Viper);
    let sticky = fx.term.insert_sas_drive(fx.encl, 3, drive("STICKY")).unwrap();
    let cleared = fx.term.insert_sas_drive(fx.encl, 4, drive("CLEARED")).unwrap();
    assert!(fx.wait_for_state(sticky, DeviceState::LoginComplete));
    assert!(fx.wait_for_state(cleared, DeviceState::LoginComplete));

    let set_phy_status = |slot: u32, status: StatusCode| {
        fx.term
            .with_vphy_mut(fx.encl, |v| {
                let (_, mut phy) = v.slot_view(slot).unwrap();
                phy.status = status;
                v.set_phy(phy.phy_id, phy).unwrap();
            })
            .unwrap();
    };
    set_phy_status(3, StatusCode::Unavailable);
    set_phy_status(4, StatusCode::Critical);

    fx.term.remove_drive(sticky).unwrap();
    fx.term.remove_drive(cleared).unwrap();

    let (_, phy) = fx.term.with_vphy(fx.encl, |v| v.slot_view(3).unwrap()).unwrap();
    assert!(!phy.phy_rdy);
    assert_eq!(phy.status, StatusCode::Unavailable);
    let (_, phy) = fx.term.with_vphy(fx.encl, |v| v.slot_view(4).unwrap()).unwrap();
    assert!(!phy.phy_rdy);
    assert_eq!(phy.status, StatusCode::Ok);
}

#[test]
fn removing_unpowered_drive_skips_logout() {
    let fx = activated(EnclosureType::Viper);
    fx.term
        .with_vphy_mut(fx.encl, |v| {
            let mut slot = v.drive_slot(5).unwrap();
            slot.dev_off = true;
            v.set_drive_slot(5, slot).unwrap();
        })
        .unwrap();
    let d = fx.term.insert_sas_drive(fx.encl, 5, drive("DARK")).unwrap();
    fx.term.remove_drive(d).unwrap();

    assert!(!fx.logged_out(d));
    assert!(!fx.logged_in(d));
    assert!(!fx.term.lock_state().tree.contains(d));
}

#[test]
fn occupied_slot_rejects_second_drive() {
    let fx = activated(EnclosureType::Viper);
    fx.term.insert_sas_drive(fx.encl, 0, drive("FIRST")).unwrap();
    assert!(fx.term.insert_sas_drive(fx.encl, 0, drive("SECOND")).is_err());
    assert!(fx.term.insert_sas_drive(fx.encl, 15, drive("NOWHERE")).is_err());
}

#[test]
fn pulled_drive_comes_back_to_its_slot() {
    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 7, drive("ROUNDTRIP")).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    fx.term.pull_drive(d).unwrap();
    assert!(fx.logged_out(d));
    {
        let st = fx.term.lock_state();
        assert!(st.tree.contains(d));
        assert_eq!(st.tree.parent_of(d).unwrap(), None);
        let info = st.tree.drive(d).unwrap();
        assert_eq!(info.pulled_from, Some(fx.encl));
        assert!(!info.mounted);
    }
    assert!(fx.term.is_drive_slot_available(fx.encl, 7).unwrap());
    assert!(fx.term.pull_drive(d).is_err());

    fx.clear_events();
    fx.term.reinsert_drive(d).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    assert!(fx.logged_in(d));
    let inserts = fx.term.with_vphy(fx.encl, |v| v.insert_count(7).unwrap()).unwrap();
    assert_eq!(inserts, 2);
    assert!(fx.term.reinsert_drive(d).is_err());
}

#[test]
fn power_cycle_logs_drive_out_and_back_in() {
    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 2, drive("CYCLE")).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    fx.clear_events();

    let vphy = fx.term.vphy_of(fx.encl).unwrap();
    fx.term.power_cycle_drive(vphy, 2, 10).unwrap();
    fx.term.wait_for_power_cycles();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    let events = fx.events();
    let out = events
        .iter()
        .position(|e| matches!(e, MiniportEvent::Logout { device, .. } if *device == d))
        .unwrap();
    let back = events
        .iter()
        .rposition(|e| matches!(e, MiniportEvent::Login { device, .. } if *device == d))
        .unwrap();
    assert!(out < back);

    let (count, slot) = fx
        .term
        .with_vphy(vphy, |v| (v.power_down_count(2).unwrap(), v.drive_slot(2).unwrap()))
        .unwrap();
    assert_eq!(count, 1);
    assert!(!slot.dev_off);
}

#[test]
fn lcc_power_cycle_relogs_the_enclosure() {
    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 0, drive("RIDE")).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    fx.clear_events();

    fx.term.power_cycle_lcc(fx.encl, 5).unwrap();
    fx.term.wait_for_power_cycles();
    assert!(fx.wait_for_state(fx.encl, DeviceState::LoginComplete));
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    assert!(fx.logged_out(fx.encl));
    assert!(fx.logged_out(d));
    assert!(fx.logged_in(fx.encl));
}

#[test]
fn port_reset_handshake_runs_in_order() {
    let fx = activated(EnclosureType::Viper);
    fx.clear_events();
    fx.term.reset_port(fx.port).unwrap();

    let events = fx.events();
    let begin = events.iter().position(|e| matches!(e, MiniportEvent::ResetBegin { .. }));
    let done = events.iter().position(|e| matches!(e, MiniportEvent::ResetCompleted { .. }));
    assert!(begin.unwrap() < done.unwrap());
    assert!(!fx.term.port_reset_flag(fx.port, ResetEvent::Begin).unwrap());
    assert!(!fx.term.port_reset_flag(fx.port, ResetEvent::Completed).unwrap());
}

#[test]
fn logout_all_then_login_all() {
    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 1, drive("ALL")).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    fx.term.logout_all_devices_on_port(fx.port).unwrap();
    assert!(fx.wait_for_state(fx.encl, DeviceState::LogoutComplete));
    assert!(wait_until(|| fx.state_of(d) == DeviceState::LogoutComplete));

    fx.term.login_all_devices_on_port(fx.port).unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    assert!(fx.wait_for_state(fx.encl, DeviceState::LoginComplete));
}

#[test]
fn io_requests_queue_per_port() {
    use terminator::topology::IoRequest;

    let fx = activated(EnclosureType::Viper);
    let d = fx.term.insert_sas_drive(fx.encl, 4, drive("IO")).unwrap();
    for lba in [0u64, 8] {
        fx.term
            .send_io(IoRequest { device: d, opcode: 0x28, lba, blocks: 8 })
            .unwrap();
    }
    assert_eq!(fx.term.dequeue_io(fx.port).unwrap().unwrap().lba, 0);
    assert_eq!(fx.term.dequeue_io(fx.port).unwrap().unwrap().lba, 8);
    assert!(fx.term.dequeue_io(fx.port).unwrap().is_none());
}
