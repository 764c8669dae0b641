mod common;

use common::Fixture;
use terminator::domain::enclosure_type::EnclosureType;
use terminator::domain::eses::SpSide;
use terminator::topology::{DeviceState, DriveInfo, DriveType, EnclosureInfo};
use terminator::EnclosureStatus;

fn drive(serial: &str) -> DriveInfo {
    DriveInfo::new(DriveType::Sas, 1 << 20, serial)
}

#[test]
fn viper_slot_three_maps_per_side() {
    let a = Fixture::with_side(EnclosureType::Viper, SpSide::A);
    a.term.insert_sas_drive(a.encl, 3, drive("A3")).unwrap();
    let (_, phy) = a.term.with_vphy(a.encl, |v| v.slot_view(3).unwrap()).unwrap();
    assert_eq!(phy.phy_id, 21);
    assert!(phy.phy_rdy);

    let b = Fixture::with_side(EnclosureType::Viper, SpSide::B);
    b.term.insert_sas_drive(b.encl, 3, drive("B3")).unwrap();
    let (_, phy) = b.term.with_vphy(b.encl, |v| v.slot_view(3).unwrap()).unwrap();
    assert_eq!(phy.phy_id, 12);
    assert!(phy.phy_rdy);
}

#[test]
fn voyager_slots_split_across_edge_expanders() {
    let fx = Fixture::new(EnclosureType::VoyagerIcm);
    let ees = fx.add_edge_expanders(&[4, 5]);
    assert_eq!(fx.term.edge_expander_connector_ids(fx.encl).unwrap(), vec![4, 5]);

    for slot in 0..60 {
        let (owner, local) = fx.term.enclosure_local_slot(fx.encl, slot).unwrap();
        let expected = if slot < 30 { ees[0] } else { ees[1] };
        assert_eq!(owner, expected, "slot {}", slot);
        assert_eq!(local, slot % 30);
        assert_eq!(fx.term.enclosure_global_slot(owner, local).unwrap(), slot);
    }
    assert!(matches!(
        fx.term.enclosure_local_slot(fx.encl, 60),
        Err(EnclosureStatus::ComponentNotFound(_))
    ));
}

#[test]
fn viking_drive_lands_under_its_bank() {
    let fx = Fixture::new(EnclosureType::VikingIosxp);
    let ees = fx.add_edge_expanders(&[2, 3, 4, 5]);
    fx.term.activate_device(fx.encl).unwrap();
    assert!(fx.wait_for_state(fx.encl, DeviceState::LoginComplete));

    let d = fx.term.insert_sas_drive(fx.encl, 95, drive("BANK3")).unwrap();
    {
        let st = fx.term.lock_state();
        assert_eq!(st.tree.parent_of(d).unwrap(), Some(ees[3]));
        assert_eq!(st.tree.drive(d).unwrap().slot, 5);
    }
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    assert!(fx.term.is_drive_in_slot_logged_in(fx.encl, 95).unwrap());
    assert!(!fx.term.is_drive_slot_available(fx.encl, 95).unwrap());
    assert!(fx.term.is_drive_slot_available(fx.encl, 94).unwrap());

    // Slot state lives on the edge expander's virtual phy
    let inserted = fx.term.with_vphy(ees[3], |v| v.insert_count(5).unwrap()).unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(fx.term.find_drive_parent(fx.port, 0, 95).unwrap(), ees[3]);
    assert_eq!(fx.term.find_drive_parent(fx.port, 0, 10).unwrap(), ees[0]);

    fx.term.remove_drive(d).unwrap();
    assert!(fx.logged_out(d));
}

#[test]
fn connector_holds_one_edge_expander() {
    let fx = Fixture::new(EnclosureType::NagaIosxp);
    fx.add_edge_expanders(&[4]);
    let dup = fx
        .term
        .create_sas_enclosure(EnclosureInfo::new(EnclosureType::NagaDrvsxp, 0, 1).with_connector(4))
        .unwrap();
    assert_eq!(
        fx.term.insert_device(fx.encl, dup),
        Err(EnclosureStatus::ConnectorUnavailable(4))
    );
    // Bank behind connector 5 is not populated
    assert!(fx.term.insert_sas_drive(fx.encl, 60, drive("MISSING")).is_err());
    assert!(fx.term.insert_sas_drive(fx.encl, 59, drive("LAST")).is_ok());
}

#[test]
fn plain_enclosure_slots_are_identity() {
    let fx = Fixture::new(EnclosureType::Derringer);
    for slot in 0..25 {
        assert_eq!(fx.term.enclosure_local_slot(fx.encl, slot).unwrap(), (fx.encl, slot));
        assert_eq!(fx.term.enclosure_global_slot(fx.encl, slot).unwrap(), slot);
    }
    assert!(fx.term.edge_expander_connector_ids(fx.encl).unwrap().is_empty());
}
