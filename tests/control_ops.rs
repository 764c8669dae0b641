mod common;

use common::{wait_until, Fixture};
use terminator::domain::enclosure_type::EnclosureType;
use terminator::domain::eses::{BufferType, SpSide, StatusCode, SubenclosureType};
use terminator::topology::{DeviceState, DriveInfo, DriveType};
use terminator::virtual_phy::{BufferFilter, ElementKind};
use terminator::{ControlOp, ControlReply, EnclosureStatus, OperationQualifier};

#[test]
fn status_code_injection_through_control_blocks_login() {
    let fx = Fixture::new(EnclosureType::Viper);
    fx.term.activate_device(fx.encl).unwrap();
    fx.term
        .dispatch(ControlOp::SetStatusCode {
            target: fx.encl,
            kind: ElementKind::Phy,
            id: 21,
            code: StatusCode::Critical as u8,
        })
        .unwrap();
    let d = fx
        .term
        .insert_sas_drive(fx.encl, 3, DriveInfo::new(DriveType::Sas, 1 << 20, "CTL"))
        .unwrap();
    assert_eq!(fx.state_of(d), DeviceState::Unknown);

    let reply = fx.term.dispatch(ControlOp::GetPhy { target: fx.encl, phy_id: 21 }).unwrap();
    match reply {
        ControlReply::Phy(phy) => assert_eq!(phy.status, StatusCode::Critical),
        other => panic!("unexpected reply {:?}", other),
    }
}

#[test]
fn power_cycle_through_control() {
    let fx = Fixture::new(EnclosureType::Derringer);
    fx.term.activate_device(fx.encl).unwrap();
    let d = fx
        .term
        .insert_sas_drive(fx.encl, 12, DriveInfo::new(DriveType::SasFlash, 1 << 20, "PWR"))
        .unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    fx.term
        .dispatch(ControlOp::PowerCycleDrive { target: fx.encl, slot: 12, duration_ms: 5 })
        .unwrap();
    fx.term.wait_for_power_cycles();
    assert!(fx.logged_out(d));
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
}

#[test]
fn unmatched_buffer_lookup_reports_component_not_found() {
    let fx = Fixture::new(EnclosureType::Viper);
    let lookup = |filter: BufferFilter| {
        fx.term.dispatch(ControlOp::GetBufferId {
            target: fx.encl,
            subencl_type: SubenclosureType::Lcc,
            side: SpSide::B,
            buf_type: BufferType::Eeprom,
            filter,
        })
    };

    assert!(matches!(lookup(BufferFilter::default()), Ok(ControlReply::BufferId(_))));
    let err = lookup(BufferFilter { buf_index: Some(9), ..BufferFilter::default() }).unwrap_err();
    assert!(matches!(err, EnclosureStatus::ComponentNotFound(_)));
    assert_eq!(err.qualifier(), OperationQualifier::ComponentNotFound);
}

#[test]
fn drive_targets_are_unsupported() {
    let fx = Fixture::new(EnclosureType::Viper);
    let d = fx
        .term
        .insert_sas_drive(fx.encl, 0, DriveInfo::new(DriveType::Sata, 1 << 20, "TGT"))
        .unwrap();
    assert!(matches!(
        fx.term.dispatch(ControlOp::GetGenerationCode { target: d }),
        Err(EnclosureStatus::CtrlCodeUnsupported(_))
    ));
    assert!(matches!(
        fx.term.dispatch(ControlOp::GetSlotCount { target: fx.port }),
        Err(EnclosureStatus::CtrlCodeUnsupported(_))
    ));
}

#[test]
fn chassis_slots_reach_the_owning_edge_expander() {
    let fx = Fixture::new(EnclosureType::VoyagerIcm);
    let ees = fx.add_edge_expanders(&[4, 5]);
    fx.term.activate_device(fx.encl).unwrap();
    let d = fx
        .term
        .insert_sas_drive(fx.encl, 35, DriveInfo::new(DriveType::Sas, 1 << 20, "ICM35"))
        .unwrap();
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));

    assert_eq!(
        fx.term.dispatch(ControlOp::GetSlotCount { target: fx.encl }).unwrap(),
        ControlReply::SlotCount(60)
    );
    match fx.term.dispatch(ControlOp::GetDriveSlot { target: fx.encl, slot: 35 }).unwrap() {
        ControlReply::DriveSlot(status) => assert_eq!(status.status, StatusCode::Ok),
        other => panic!("unexpected reply {:?}", other),
    }
    // Addressed directly, the expander uses its own numbering
    match fx.term.dispatch(ControlOp::GetDriveSlot { target: ees[1], slot: 5 }).unwrap() {
        ControlReply::DriveSlot(status) => assert_eq!(status.status, StatusCode::Ok),
        other => panic!("unexpected reply {:?}", other),
    }

    fx.term
        .dispatch(ControlOp::SetStatusCode {
            target: fx.encl,
            kind: ElementKind::DriveSlot,
            id: 40,
            code: StatusCode::Critical as u8,
        })
        .unwrap();
    let status = fx.term.with_vphy(ees[1], |v| v.drive_slot(10).unwrap()).unwrap();
    assert_eq!(status.status, StatusCode::Critical);

    fx.term
        .dispatch(ControlOp::PowerCycleDrive { target: fx.encl, slot: 35, duration_ms: 5 })
        .unwrap();
    fx.term.wait_for_power_cycles();
    assert!(wait_until(|| fx.logged_out(d)));
    assert!(fx.wait_for_state(d, DeviceState::LoginComplete));
    let cycles = fx.term.with_vphy(ees[1], |v| v.power_down_count(5).unwrap()).unwrap();
    assert_eq!(cycles, 1);

    assert!(matches!(
        fx.term.dispatch(ControlOp::GetDriveSlot { target: fx.encl, slot: 60 }),
        Err(EnclosureStatus::ComponentNotFound(_))
    ));
}
