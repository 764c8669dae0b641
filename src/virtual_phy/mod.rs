/// Virtual PHY: the ESES status engine owned by every SAS enclosure
///
/// Holds the status elements, buffers, version descriptors and the pending
/// firmware queue. Accessors validate element ids against the enclosure's
/// capability entry; locking is the caller's concern.
pub mod buffers;
pub mod firmware;

pub use buffers::{BufferDescriptor, BufferDescriptorInfo, BufferFilter, BufferInfo, BufferTable};
pub use firmware::{FirmwareQueue, FirmwareRecord, Revision, VersionDescriptor, VersionDescriptors};

use crate::domain::enclosure_type::{EnclosureCapabilities, EnclosureType};
use crate::domain::eses::*;
use crate::error::{EnclosureStatus, Result};
use std::time::Duration;

/// Element kinds whose status code can be set from a raw byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    DriveSlot,
    Phy,
    PowerSupply,
    Cooling,
    TempSensor,
    SasConnector,
    Enclosure,
    ChassisEnclosure,
    Display,
}

#[derive(Clone, Debug)]
pub struct VirtualPhy {
    pub encl_type: EnclosureType,
    pub side: SpSide,
    drive_slots: Vec<DriveSlotStatus>,
    insert_counts: Vec<u8>,
    power_down_counts: Vec<u8>,
    phys: Vec<PhyStatus>,
    power_supplies: Vec<PowerSupplyStatus>,
    emc_ps_info: Vec<EmcPowerSupplyInfo>,
    sas_connectors: Vec<SasConnectorStatus>,
    cooling: Vec<CoolingStatus>,
    temp_sensors: Vec<TempSensorStatus>,
    overall_temp_sensor: TempSensorStatus,
    encl: EnclosureElementStatus,
    chassis_encl: EnclosureElementStatus,
    emc_encl: EmcEnclosureStatus,
    general_info_drive_slots: Vec<GeneralInfoDriveSlot>,
    display: Vec<DisplayStatus>,
    unit_attention: bool,
    pub buffers: BufferTable,
    pub ver_descs: VersionDescriptors,
    pub firmware_queue: FirmwareQueue,
    download_status: DownloadStatus,
    gen_code: u32,
    activate_interval: Duration,
    reset_interval: Duration,
}

fn element<'a, T>(elems: &'a [T], id: usize, what: &str) -> Result<&'a T> {
    elems
        .get(id)
        .ok_or_else(|| EnclosureStatus::ComponentNotFound(format!("{} {}", what, id)))
}

fn element_mut<'a, T>(elems: &'a mut [T], id: usize, what: &str) -> Result<&'a mut T> {
    elems
        .get_mut(id)
        .ok_or_else(|| EnclosureStatus::ComponentNotFound(format!("{} {}", what, id)))
}

impl VirtualPhy {
    pub fn new(encl_type: EnclosureType, side: SpSide) -> Self {
        let caps = encl_type.capabilities();
        let slots = usize::from(caps.max_drive_slots);
        let battery_backed = encl_type == EnclosureType::Fallback;
        Self {
            encl_type,
            side,
            drive_slots: vec![DriveSlotStatus::default(); slots],
            insert_counts: vec![0; slots],
            power_down_counts: vec![0; slots],
            phys: (0..caps.max_phys).map(PhyStatus::new).collect(),
            power_supplies: vec![PowerSupplyStatus::default(); usize::from(caps.max_ps)],
            emc_ps_info: vec![EmcPowerSupplyInfo::default(); usize::from(caps.max_ps)],
            sas_connectors: vec![SasConnectorStatus::default(); usize::from(caps.max_sas_conn_elems())],
            cooling: vec![CoolingStatus::default(); usize::from(caps.max_cooling)],
            temp_sensors: vec![TempSensorStatus::default(); usize::from(caps.max_temp_sensor)],
            overall_temp_sensor: TempSensorStatus::default(),
            encl: EnclosureElementStatus::default(),
            chassis_encl: EnclosureElementStatus::default(),
            emc_encl: EmcEnclosureStatus::default(),
            general_info_drive_slots: vec![GeneralInfoDriveSlot { battery_backed }; slots],
            display: vec![DisplayStatus::default(); usize::from(caps.max_display_chars)],
            unit_attention: false,
            buffers: BufferTable::with_defaults(encl_type),
            ver_descs: VersionDescriptors::default(),
            firmware_queue: FirmwareQueue::default(),
            download_status: DownloadStatus::None,
            gen_code: 0,
            activate_interval: Duration::ZERO,
            reset_interval: Duration::ZERO,
        }
    }

    pub fn capabilities(&self) -> &'static EnclosureCapabilities {
        self.encl_type.capabilities()
    }

    // Drive slots

    pub fn drive_slot(&self, slot: u32) -> Result<DriveSlotStatus> {
        element(&self.drive_slots, slot as usize, "drive slot").copied()
    }

    pub fn set_drive_slot(&mut self, slot: u32, status: DriveSlotStatus) -> Result<()> {
        *element_mut(&mut self.drive_slots, slot as usize, "drive slot")? = status;
        Ok(())
    }

    pub fn insert_count(&self, slot: u32) -> Result<u8> {
        element(&self.insert_counts, slot as usize, "drive slot").copied()
    }

    pub fn set_insert_count(&mut self, slot: u32, count: u8) -> Result<()> {
        *element_mut(&mut self.insert_counts, slot as usize, "drive slot")? = count;
        Ok(())
    }

    pub fn clear_insert_counts(&mut self) {
        self.insert_counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn power_down_count(&self, slot: u32) -> Result<u8> {
        element(&self.power_down_counts, slot as usize, "drive slot").copied()
    }

    pub fn set_power_down_count(&mut self, slot: u32, count: u8) -> Result<()> {
        *element_mut(&mut self.power_down_counts, slot as usize, "drive slot")? = count;
        Ok(())
    }

    pub fn clear_power_down_counts(&mut self) {
        self.power_down_counts.iter_mut().for_each(|c| *c = 0);
    }

    // Phys

    pub fn phy(&self, phy_id: u8) -> Result<PhyStatus> {
        element(&self.phys, usize::from(phy_id), "phy").copied()
    }

    pub fn set_phy(&mut self, phy_id: u8, status: PhyStatus) -> Result<()> {
        *element_mut(&mut self.phys, usize::from(phy_id), "phy")? = status;
        Ok(())
    }

    // Power supplies, cooling, temperature, connectors

    pub fn power_supply(&self, id: u8) -> Result<PowerSupplyStatus> {
        element(&self.power_supplies, usize::from(id), "power supply").copied()
    }

    pub fn set_power_supply(&mut self, id: u8, status: PowerSupplyStatus) -> Result<()> {
        *element_mut(&mut self.power_supplies, usize::from(id), "power supply")? = status;
        Ok(())
    }

    pub fn emc_ps_info(&self, id: u8) -> Result<EmcPowerSupplyInfo> {
        element(&self.emc_ps_info, usize::from(id), "power supply").copied()
    }

    pub fn set_emc_ps_info(&mut self, id: u8, info: EmcPowerSupplyInfo) -> Result<()> {
        *element_mut(&mut self.emc_ps_info, usize::from(id), "power supply")? = info;
        Ok(())
    }

    pub fn cooling(&self, id: u8) -> Result<CoolingStatus> {
        element(&self.cooling, usize::from(id), "cooling").copied()
    }

    pub fn set_cooling(&mut self, id: u8, status: CoolingStatus) -> Result<()> {
        *element_mut(&mut self.cooling, usize::from(id), "cooling")? = status;
        Ok(())
    }

    pub fn temp_sensor(&self, id: u8) -> Result<TempSensorStatus> {
        element(&self.temp_sensors, usize::from(id), "temp sensor").copied()
    }

    pub fn set_temp_sensor(&mut self, id: u8, status: TempSensorStatus) -> Result<()> {
        *element_mut(&mut self.temp_sensors, usize::from(id), "temp sensor")? = status;
        Ok(())
    }

    pub fn overall_temp_sensor(&self) -> TempSensorStatus {
        self.overall_temp_sensor
    }

    pub fn set_overall_temp_sensor(&mut self, status: TempSensorStatus) {
        self.overall_temp_sensor = status;
    }

    pub fn sas_connector(&self, id: u8) -> Result<SasConnectorStatus> {
        element(&self.sas_connectors, usize::from(id), "sas connector").copied()
    }

    pub fn set_sas_connector(&mut self, id: u8, status: SasConnectorStatus) -> Result<()> {
        *element_mut(&mut self.sas_connectors, usize::from(id), "sas connector")? = status;
        Ok(())
    }

    // Enclosure level elements

    pub fn encl(&self) -> EnclosureElementStatus {
        self.encl
    }

    pub fn set_encl(&mut self, status: EnclosureElementStatus) {
        self.encl = status;
    }

    pub fn chassis_encl(&self) -> EnclosureElementStatus {
        self.chassis_encl
    }

    pub fn set_chassis_encl(&mut self, status: EnclosureElementStatus) {
        self.chassis_encl = status;
    }

    pub fn emc_encl(&self) -> EmcEnclosureStatus {
        self.emc_encl
    }

    pub fn set_emc_encl(&mut self, status: EmcEnclosureStatus) {
        self.emc_encl = status;
    }

    pub fn general_info_drive_slot(&self, slot: u32) -> Result<GeneralInfoDriveSlot> {
        element(&self.general_info_drive_slots, slot as usize, "drive slot").copied()
    }

    pub fn set_general_info_drive_slot(&mut self, slot: u32, info: GeneralInfoDriveSlot) -> Result<()> {
        *element_mut(&mut self.general_info_drive_slots, slot as usize, "drive slot")? = info;
        Ok(())
    }

    pub fn display(&self, id: u8) -> Result<DisplayStatus> {
        element(&self.display, usize::from(id), "display character").copied()
    }

    pub fn set_display(&mut self, id: u8, status: DisplayStatus) -> Result<()> {
        *element_mut(&mut self.display, usize::from(id), "display character")? = status;
        Ok(())
    }

    pub fn unit_attention(&self) -> bool {
        self.unit_attention
    }

    pub fn set_unit_attention(&mut self, unit_attention: bool) {
        self.unit_attention = unit_attention;
    }

    /// Set one element's status from a raw ESES code.
    pub fn set_element_status_code(&mut self, kind: ElementKind, id: u32, raw: u8) -> Result<()> {
        let code = StatusCode::try_from(raw)?;
        let idx = id as usize;
        match kind {
            ElementKind::DriveSlot => element_mut(&mut self.drive_slots, idx, "drive slot")?.status = code,
            ElementKind::Phy => element_mut(&mut self.phys, idx, "phy")?.status = code,
            ElementKind::PowerSupply => {
                element_mut(&mut self.power_supplies, idx, "power supply")?.status = code
            }
            ElementKind::Cooling => element_mut(&mut self.cooling, idx, "cooling")?.status = code,
            ElementKind::TempSensor => {
                element_mut(&mut self.temp_sensors, idx, "temp sensor")?.status = code
            }
            ElementKind::SasConnector => {
                element_mut(&mut self.sas_connectors, idx, "sas connector")?.status = code
            }
            ElementKind::Enclosure => self.encl.status = code,
            ElementKind::ChassisEnclosure => self.chassis_encl.status = code,
            ElementKind::Display => element_mut(&mut self.display, idx, "display character")?.status = code,
        }
        Ok(())
    }

    // Firmware state

    pub fn download_status(&self) -> DownloadStatus {
        self.download_status
    }

    pub fn set_download_status(&mut self, status: DownloadStatus) {
        self.download_status = status;
    }

    pub fn gen_code(&self) -> u32 {
        self.gen_code
    }

    /// Bump the configuration page generation code (wraps at 2^32).
    pub fn increment_gen_code(&mut self) {
        self.gen_code = self.gen_code.wrapping_add(1);
    }

    pub fn set_gen_code(&mut self, gen_code: u32) {
        self.gen_code = gen_code;
    }

    pub fn activate_interval(&self) -> Duration {
        self.activate_interval
    }

    pub fn set_activate_interval(&mut self, interval: Duration) {
        self.activate_interval = interval;
    }

    pub fn reset_interval(&self) -> Duration {
        self.reset_interval
    }

    pub fn set_reset_interval(&mut self, interval: Duration) {
        self.reset_interval = interval;
    }

    pub fn firmware_rev(
        &self,
        subencl_type: SubenclosureType,
        side: SpSide,
        comp_type: ComponentType,
    ) -> Result<Revision> {
        self.ver_descs.get(subencl_type, side, comp_type)
    }

    /// Slot status, phy readiness and the phy id the slot maps to.
    pub fn slot_view(&self, slot: u32) -> Result<(DriveSlotStatus, PhyStatus)> {
        let status = self.drive_slot(slot)?;
        let phy_id = self.capabilities().drive_slot_to_phy(slot, self.side)?;
        Ok((status, self.phy(phy_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_status_set() {
        let vphy = VirtualPhy::new(EnclosureType::Viper, SpSide::A);
        assert_eq!(vphy.drive_slot(14).unwrap().status, StatusCode::NotInstalled);
        assert!(vphy.drive_slot(15).is_err());
        let phy = vphy.phy(7).unwrap();
        assert!(phy.phy_rdy && phy.link_rdy);
        assert_eq!(phy.phy_id, 7);
        assert_eq!(vphy.cooling(0).unwrap().actual_speed_code, 7);
        assert_eq!(vphy.temp_sensor(0).unwrap().temp, 64);
        assert_eq!(vphy.overall_temp_sensor().temp, 64);
        assert_eq!(vphy.display(0).unwrap().display_char, b'-');
        assert_eq!(vphy.download_status(), DownloadStatus::None);
        assert_eq!(vphy.gen_code(), 0);
        assert!(!vphy.general_info_drive_slot(0).unwrap().battery_backed);
    }

    #[test]
    fn fallback_slots_are_battery_backed() {
        let vphy = VirtualPhy::new(EnclosureType::Fallback, SpSide::A);
        assert!(vphy.general_info_drive_slot(0).unwrap().battery_backed);
    }

    #[test]
    fn raw_status_codes_are_validated() {
        let mut vphy = VirtualPhy::new(EnclosureType::Viper, SpSide::A);
        vphy.set_element_status_code(ElementKind::Phy, 3, 2).unwrap();
        assert_eq!(vphy.phy(3).unwrap().status, StatusCode::Critical);
        assert!(matches!(
            vphy.set_element_status_code(ElementKind::Phy, 3, 8),
            Err(EnclosureStatus::DataIllegal(_))
        ));
        assert!(matches!(
            vphy.set_element_status_code(ElementKind::Cooling, 40, 1),
            Err(EnclosureStatus::ComponentNotFound(_))
        ));
    }

    #[test]
    fn counters_clear_together() {
        let mut vphy = VirtualPhy::new(EnclosureType::Viper, SpSide::A);
        vphy.set_insert_count(2, 3).unwrap();
        vphy.set_power_down_count(2, 1).unwrap();
        vphy.clear_insert_counts();
        vphy.clear_power_down_counts();
        assert_eq!(vphy.insert_count(2).unwrap(), 0);
        assert_eq!(vphy.power_down_count(2).unwrap(), 0);
    }

    #[test]
    fn gen_code_wraps() {
        let mut vphy = VirtualPhy::new(EnclosureType::Viper, SpSide::A);
        vphy.set_gen_code(u32::MAX);
        vphy.increment_gen_code();
        assert_eq!(vphy.gen_code(), 0);
    }

    #[test]
    fn slot_view_uses_side_table() {
        let vphy = VirtualPhy::new(EnclosureType::Viper, SpSide::B);
        let (_, phy) = vphy.slot_view(3).unwrap();
        assert_eq!(phy.phy_id, 12);
    }
}
