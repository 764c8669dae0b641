/// Firmware revisions and pending download records of a virtual phy
use crate::domain::eses::{ComponentType, SpSide, SubenclosureType, REV_LEN};
use crate::error::{EnclosureStatus, Result};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub const INITIAL_REVISION: Revision = Revision(*b"0000A");

/// Fixed-width revision string carried in a version descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Revision([u8; REV_LEN]);

impl Revision {
    pub fn as_bytes(&self) -> &[u8; REV_LEN] {
        &self.0
    }
}

impl FromStr for Revision {
    type Err = EnclosureStatus;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; REV_LEN] = s.as_bytes().try_into().map_err(|_| {
            EnclosureStatus::InvalidParameter(format!(
                "revision {:?} must be {} bytes",
                s, REV_LEN
            ))
        })?;
        if !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(EnclosureStatus::InvalidParameter(format!("revision {:?}", s)));
        }
        Ok(Revision(bytes))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only ASCII is ever stored
        f.write_str(std::str::from_utf8(&self.0).unwrap_or("?????"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub subencl_type: SubenclosureType,
    pub side: SpSide,
    pub comp_type: ComponentType,
    pub revision: Revision,
}

/// A download waiting for its activate call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirmwareRecord {
    pub subencl_type: SubenclosureType,
    pub side: SpSide,
    pub comp_type: ComponentType,
    pub slot: u32,
    pub new_rev: Revision,
}

impl FirmwareRecord {
    fn same_key(&self, other: &FirmwareRecord) -> bool {
        self.subencl_type == other.subencl_type
            && self.side == other.side
            && self.comp_type == other.comp_type
            && self.slot == other.slot
    }
}

#[derive(Clone, Debug)]
pub struct VersionDescriptors {
    descs: Vec<VersionDescriptor>,
}

impl Default for VersionDescriptors {
    fn default() -> Self {
        let mut descs = Vec::new();
        let lcc_comps = [
            ComponentType::ExpanderFw,
            ComponentType::BootLoaderFw,
            ComponentType::InitString,
            ComponentType::FpgaImage,
            ComponentType::LccMain,
        ];
        for side in [SpSide::A, SpSide::B] {
            for comp_type in lcc_comps {
                descs.push(VersionDescriptor {
                    subencl_type: SubenclosureType::Lcc,
                    side,
                    comp_type,
                    revision: INITIAL_REVISION,
                });
            }
        }
        for side in [SpSide::A, SpSide::B] {
            descs.push(VersionDescriptor {
                subencl_type: SubenclosureType::PowerSupply,
                side,
                comp_type: ComponentType::PsFw,
                revision: INITIAL_REVISION,
            });
        }
        descs.push(VersionDescriptor {
            subencl_type: SubenclosureType::Cooling,
            side: SpSide::A,
            comp_type: ComponentType::CoolingFw,
            revision: INITIAL_REVISION,
        });
        Self { descs }
    }
}

impl VersionDescriptors {
    fn find_mut(
        &mut self,
        subencl_type: SubenclosureType,
        side: SpSide,
        comp_type: ComponentType,
    ) -> Option<&mut VersionDescriptor> {
        self.descs
            .iter_mut()
            .find(|d| d.subencl_type == subencl_type && d.side == side && d.comp_type == comp_type)
    }

    pub fn get(
        &self,
        subencl_type: SubenclosureType,
        side: SpSide,
        comp_type: ComponentType,
    ) -> Result<Revision> {
        self.descs
            .iter()
            .find(|d| d.subencl_type == subencl_type && d.side == side && d.comp_type == comp_type)
            .map(|d| d.revision)
            .ok_or_else(|| self.missing(subencl_type, side, comp_type))
    }

    /// A component type the subenclosure never carries is an invalid index;
    /// one carried only on the other side is simply not found.
    fn missing(&self, subencl_type: SubenclosureType, side: SpSide, comp_type: ComponentType) -> EnclosureStatus {
        if self
            .descs
            .iter()
            .any(|d| d.subencl_type == subencl_type && d.comp_type == comp_type)
        {
            EnclosureStatus::ComponentNotFound(format!(
                "version descriptor {:?}/{:?}/{:?}",
                subencl_type, side, comp_type
            ))
        } else {
            EnclosureStatus::ComponentTypeIndexInvalid(comp_type as u32)
        }
    }

    pub fn set(
        &mut self,
        subencl_type: SubenclosureType,
        side: SpSide,
        comp_type: ComponentType,
        revision: Revision,
    ) -> Result<()> {
        let err = self.missing(subencl_type, side, comp_type);
        let desc = self.find_mut(subencl_type, side, comp_type).ok_or(err)?;
        desc.revision = revision;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionDescriptor> {
        self.descs.iter()
    }
}

/// FIFO of downloads awaiting activation
#[derive(Clone, Debug, Default)]
pub struct FirmwareQueue {
    records: VecDeque<FirmwareRecord>,
}

impl FirmwareQueue {
    /// Replace the revision of a record with the same key, or append.
    pub fn update(&mut self, record: FirmwareRecord) {
        match self.records.iter_mut().find(|r| r.same_key(&record)) {
            Some(existing) => existing.new_rev = record.new_rev,
            None => self.records.push_back(record),
        }
    }

    /// Remove every record for (subencl, side, slot) and return the last one.
    pub fn pop(
        &mut self,
        subencl_type: SubenclosureType,
        side: SpSide,
        slot: u32,
    ) -> Result<FirmwareRecord> {
        let mut found = None;
        self.records.retain(|r| {
            let hit = r.subencl_type == subencl_type && r.side == side && r.slot == slot;
            if hit {
                found = Some(*r);
            }
            !hit
        });
        found.ok_or_else(|| {
            EnclosureStatus::NoPendingRecord(format!(
                "{:?} side {:?} slot {}",
                subencl_type, side, slot
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
