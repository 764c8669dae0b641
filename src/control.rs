/// Control operation dispatch
///
/// Each operation names a target handle. The target's node type is checked
/// first; enclosure handles are served by their virtual phy. Drive slots on
/// a chassis with edge expanders are routed to the expander owning the bank.
use crate::domain::connector::{map_position_to_range_conn_id, ConnectorClass};
use crate::domain::eses::*;
use crate::error::{EnclosureStatus, Result};
use crate::terminator::Terminator;
use crate::topology::{DeviceHandle, DeviceType};
use crate::virtual_phy::{BufferDescriptor, BufferFilter, ElementKind, FirmwareRecord};

#[derive(Clone, Debug, PartialEq)]
pub enum ControlOp {
    FirmwareDownload { target: DeviceHandle, record: FirmwareRecord },
    FirmwareActivate { target: DeviceHandle, subencl_type: SubenclosureType, side: SpSide, slot: u32 },
    GetDriveSlot { target: DeviceHandle, slot: u32 },
    SetDriveSlot { target: DeviceHandle, slot: u32, status: DriveSlotStatus },
    GetPhy { target: DeviceHandle, phy_id: u8 },
    SetPhy { target: DeviceHandle, phy_id: u8, status: PhyStatus },
    GetPowerSupply { target: DeviceHandle, id: u8 },
    SetPowerSupply { target: DeviceHandle, id: u8, status: PowerSupplyStatus },
    GetCooling { target: DeviceHandle, id: u8 },
    SetCooling { target: DeviceHandle, id: u8, status: CoolingStatus },
    GetTempSensor { target: DeviceHandle, id: u8 },
    SetTempSensor { target: DeviceHandle, id: u8, status: TempSensorStatus },
    GetSasConnector { target: DeviceHandle, id: u8 },
    SetSasConnector { target: DeviceHandle, id: u8, status: SasConnectorStatus },
    GetDisplay { target: DeviceHandle, id: u8 },
    SetDisplay { target: DeviceHandle, id: u8, status: DisplayStatus },
    SetStatusCode { target: DeviceHandle, kind: ElementKind, id: u32, code: u8 },
    ResumeRead { target: DeviceHandle, buf_id: u8, descriptor: BufferDescriptor },
    ResumeWrite { target: DeviceHandle, buf_id: u8, descriptor: BufferDescriptor, data: Vec<u8> },
    GetBufferId {
        target: DeviceHandle,
        subencl_type: SubenclosureType,
        side: SpSide,
        buf_type: BufferType,
        filter: BufferFilter,
    },
    GetUnitAttention { target: DeviceHandle },
    SetUnitAttention { target: DeviceHandle, value: bool },
    PowerCycleDrive { target: DeviceHandle, slot: u32, duration_ms: u32 },
    PowerCycleLcc { target: DeviceHandle, duration_ms: u32 },
    GetDownloadStatus { target: DeviceHandle },
    GetGenerationCode { target: DeviceHandle },
    GetSlotCount { target: DeviceHandle },
    MapConnectorPosition { target: DeviceHandle, position: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControlReply {
    Done,
    DriveSlot(DriveSlotStatus),
    Phy(PhyStatus),
    PowerSupply(PowerSupplyStatus),
    Cooling(CoolingStatus),
    TempSensor(TempSensorStatus),
    SasConnector(SasConnectorStatus),
    Display(DisplayStatus),
    ResumeData { data: Vec<u8>, descriptor: BufferDescriptor },
    Descriptor(BufferDescriptor),
    BufferId(u8),
    UnitAttention(bool),
    DownloadStatus(DownloadStatus),
    GenerationCode(u32),
    SlotCount(u32),
    Connector(ConnectorClass),
}

impl ControlOp {
    pub fn target(&self) -> DeviceHandle {
        use ControlOp::*;
        match self {
            FirmwareDownload { target, .. }
            | FirmwareActivate { target, .. }
            | GetDriveSlot { target, .. }
            | SetDriveSlot { target, .. }
            | GetPhy { target, .. }
            | SetPhy { target, .. }
            | GetPowerSupply { target, .. }
            | SetPowerSupply { target, .. }
            | GetCooling { target, .. }
            | SetCooling { target, .. }
            | GetTempSensor { target, .. }
            | SetTempSensor { target, .. }
            | GetSasConnector { target, .. }
            | SetSasConnector { target, .. }
            | GetDisplay { target, .. }
            | SetDisplay { target, .. }
            | SetStatusCode { target, .. }
            | ResumeRead { target, .. }
            | ResumeWrite { target, .. }
            | GetBufferId { target, .. }
            | GetUnitAttention { target }
            | SetUnitAttention { target, .. }
            | PowerCycleDrive { target, .. }
            | PowerCycleLcc { target, .. }
            | GetDownloadStatus { target }
            | GetGenerationCode { target }
            | GetSlotCount { target }
            | MapConnectorPosition { target, .. } => *target,
        }
    }

    fn is_firmware_op(&self) -> bool {
        matches!(self, ControlOp::FirmwareDownload { .. } | ControlOp::FirmwareActivate { .. })
    }
}

impl Terminator {
    /// Execute one control operation against the terminator.
    pub fn dispatch(&self, op: ControlOp) -> Result<ControlReply> {
        let target = op.target();
        match self.lock_state().tree.device_type(target)? {
            DeviceType::Enclosure | DeviceType::VirtualPhy => {}
            other if op.is_firmware_op() => {
                return Err(EnclosureStatus::ComponentTypeUnsupported(format!(
                    "{:?} firmware update through {}",
                    other, target
                )))
            }
            other => {
                return Err(EnclosureStatus::CtrlCodeUnsupported(format!(
                    "enclosure control on {:?} {}",
                    other, target
                )))
            }
        }

        let checksum = self.need_update_enclosure_resume_prom_checksum();
        use ControlOp::*;
        let reply = match op {
            FirmwareDownload { target, record } => {
                self.enclosure_firmware_download(target, record)?;
                ControlReply::Done
            }
            FirmwareActivate { target, subencl_type, side, slot } => {
                self.enclosure_firmware_activate(target, subencl_type, side, slot)?;
                ControlReply::Done
            }
            GetDriveSlot { target, slot } => {
                ControlReply::DriveSlot(self.with_slot_vphy(target, slot, |v, local| v.drive_slot(local))??)
            }
            SetDriveSlot { target, slot, status } => {
                self.with_slot_vphy_mut(target, slot, |v, local| v.set_drive_slot(local, status))??;
                ControlReply::Done
            }
            GetPhy { target, phy_id } => ControlReply::Phy(self.with_vphy(target, |v| v.phy(phy_id))??),
            SetPhy { target, phy_id, status } => {
                self.with_vphy_mut(target, |v| v.set_phy(phy_id, status))??;
                ControlReply::Done
            }
            GetPowerSupply { target, id } => {
                ControlReply::PowerSupply(self.with_vphy(target, |v| v.power_supply(id))??)
            }
            SetPowerSupply { target, id, status } => {
                self.with_vphy_mut(target, |v| v.set_power_supply(id, status))??;
                ControlReply::Done
            }
            GetCooling { target, id } => ControlReply::Cooling(self.with_vphy(target, |v| v.cooling(id))??),
            SetCooling { target, id, status } => {
                self.with_vphy_mut(target, |v| v.set_cooling(id, status))??;
                ControlReply::Done
            }
            GetTempSensor { target, id } => {
                ControlReply::TempSensor(self.with_vphy(target, |v| v.temp_sensor(id))??)
            }
            SetTempSensor { target, id, status } => {
                self.with_vphy_mut(target, |v| v.set_temp_sensor(id, status))??;
                ControlReply::Done
            }
            GetSasConnector { target, id } => {
                ControlReply::SasConnector(self.with_vphy(target, |v| v.sas_connector(id))??)
            }
            SetSasConnector { target, id, status } => {
                self.with_vphy_mut(target, |v| v.set_sas_connector(id, status))??;
                ControlReply::Done
            }
            GetDisplay { target, id } => ControlReply::Display(self.with_vphy(target, |v| v.display(id))??),
            SetDisplay { target, id, status } => {
                self.with_vphy_mut(target, |v| v.set_display(id, status))??;
                ControlReply::Done
            }
            SetStatusCode { target, kind: ElementKind::DriveSlot, id, code } => {
                self.with_slot_vphy_mut(target, id, |v, local| {
                    v.set_element_status_code(ElementKind::DriveSlot, local, code)
                })??;
                ControlReply::Done
            }
            SetStatusCode { target, kind, id, code } => {
                self.with_vphy_mut(target, |v| v.set_element_status_code(kind, id, code))??;
                ControlReply::Done
            }
            ResumeRead { target, buf_id, descriptor } => {
                let (data, descriptor) =
                    self.with_vphy(target, |v| v.buffers.resume_read(buf_id, descriptor, checksum))??;
                ControlReply::ResumeData { data, descriptor }
            }
            ResumeWrite { target, buf_id, descriptor, data } => {
                let descriptor = self.with_vphy_mut(target, |v| {
                    v.buffers.resume_write(buf_id, descriptor, &data, checksum)
                })??;
                ControlReply::Descriptor(descriptor)
            }
            GetBufferId { target, subencl_type, side, buf_type, filter } => ControlReply::BufferId(
                self.with_vphy(target, |v| v.buffers.find_buf_id(subencl_type, side, buf_type, filter))??,
            ),
            GetUnitAttention { target } => {
                ControlReply::UnitAttention(self.with_vphy(target, |v| v.unit_attention())?)
            }
            SetUnitAttention { target, value } => {
                self.with_vphy_mut(target, |v| v.set_unit_attention(value))?;
                ControlReply::Done
            }
            PowerCycleDrive { target, slot, duration_ms } => {
                self.power_cycle_drive(target, slot, duration_ms)?;
                ControlReply::Done
            }
            PowerCycleLcc { target, duration_ms } => {
                self.power_cycle_lcc(target, duration_ms)?;
                ControlReply::Done
            }
            GetDownloadStatus { target } => {
                ControlReply::DownloadStatus(self.with_vphy(target, |v| v.download_status())?)
            }
            GetGenerationCode { target } => {
                ControlReply::GenerationCode(self.with_vphy(target, |v| v.gen_code())?)
            }
            GetSlotCount { target } => ControlReply::SlotCount(
                self.with_vphy(target, |v| v.encl_type.total_drive_slots())?,
            ),
            MapConnectorPosition { target, position } => ControlReply::Connector(self.with_vphy(target, |v| {
                let max_conns = u32::from(v.capabilities().max_port_conn);
                map_position_to_range_conn_id(v.encl_type, position, max_conns)
            })??),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enclosure_type::EnclosureType;
    use crate::error::OperationQualifier;
    use crate::terminator::TerminatorConfig;
    use crate::topology::{EnclosureInfo, PortInfo};

    fn setup() -> (Terminator, DeviceHandle, DeviceHandle) {
        let term = Terminator::new(TerminatorConfig::default());
        let board = term.create_board("ctl").unwrap();
        let port = term.create_port(PortInfo::default());
        term.insert_device(board, port).unwrap();
        let encl = term
            .create_sas_enclosure(EnclosureInfo::new(EnclosureType::Derringer, 0, 0))
            .unwrap();
        term.insert_device(port, encl).unwrap();
        (term, board, encl)
    }

    #[test]
    fn enclosure_target_reaches_its_virtual_phy() {
        let (term, _, encl) = setup();
        let reply = term.dispatch(ControlOp::GetSlotCount { target: encl }).unwrap();
        assert_eq!(reply, ControlReply::SlotCount(25));
        term.dispatch(ControlOp::SetUnitAttention { target: encl, value: true }).unwrap();
        let vphy = term.vphy_of(encl).unwrap();
        assert_eq!(
            term.dispatch(ControlOp::GetUnitAttention { target: vphy }).unwrap(),
            ControlReply::UnitAttention(true)
        );
    }

    #[test]
    fn board_firmware_is_unsupported() {
        let (term, board, _) = setup();
        let record = FirmwareRecord {
            subencl_type: SubenclosureType::Lcc,
            side: SpSide::A,
            comp_type: ComponentType::ExpanderFw,
            slot: 0,
            new_rev: "0200A".parse().unwrap(),
        };
        let err = term
            .dispatch(ControlOp::FirmwareDownload { target: board, record })
            .unwrap_err();
        assert!(matches!(err, EnclosureStatus::ComponentTypeUnsupported(_)));
    }

    #[test]
    fn missing_buffer_reports_component_not_found() {
        let (term, _, encl) = setup();
        let err = term
            .dispatch(ControlOp::GetBufferId {
                target: encl,
                subencl_type: SubenclosureType::Lcc,
                side: SpSide::A,
                buf_type: BufferType::Registers,
                filter: BufferFilter::default(),
            })
            .unwrap_err();
        assert_eq!(err.qualifier(), OperationQualifier::ComponentNotFound);
    }

    #[test]
    fn resume_roundtrip_returns_callers_descriptor() {
        let (term, _, encl) = setup();
        let descriptor = BufferDescriptor { offset: 8, len: 3 };
        let reply = term
            .dispatch(ControlOp::ResumeWrite {
                target: encl,
                buf_id: 0,
                descriptor,
                data: b"EMC".to_vec(),
            })
            .unwrap();
        assert_eq!(reply, ControlReply::Descriptor(descriptor));
        let reply = term
            .dispatch(ControlOp::ResumeRead { target: encl, buf_id: 0, descriptor })
            .unwrap();
        assert_eq!(reply, ControlReply::ResumeData { data: b"EMC".to_vec(), descriptor });
    }

    #[test]
    fn illegal_status_code_is_rejected() {
        let (term, _, encl) = setup();
        let err = term
            .dispatch(ControlOp::SetStatusCode { target: encl, kind: ElementKind::DriveSlot, id: 0, code: 9 })
            .unwrap_err();
        assert!(matches!(err, EnclosureStatus::DataIllegal(_)));
    }

    #[test]
    fn connector_positions_follow_the_enclosure_family() {
        use crate::domain::connector::ConnectorRange;

        let (term, _, encl) = setup();
        // Derringer has 5 port connectors per range
        let reply = term
            .dispatch(ControlOp::MapConnectorPosition { target: encl, position: 7 })
            .unwrap();
        assert_eq!(
            reply,
            ControlReply::Connector(ConnectorClass { range: ConnectorRange::Upstream, conn_id: 1 })
        );
        let err = term
            .dispatch(ControlOp::MapConnectorPosition { target: encl, position: 30 })
            .unwrap_err();
        assert_eq!(err, EnclosureStatus::InvalidConnectorPosition(30));
    }
}
