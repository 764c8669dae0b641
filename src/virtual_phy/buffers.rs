/// Buffer-id indexed general purpose buffers served by a virtual phy
///
/// Each buffer id refers to a storage slot; aliasing points a second id at
/// the first id's slot so writes through either are visible to both.
use crate::domain::enclosure_type::EnclosureType;
use crate::domain::eses::{BufferType, SpSide, SubenclosureType};
use crate::error::{EnclosureStatus, Result};
use log::debug;

/// Size of a standard resume PROM image.
pub const RESUME_PROM_SIZE: usize = 1024;
/// PS resume image used by the IOSXP chassis and Tabasco.
pub const SHORT_PS_RESUME_SIZE: usize = 336;
const RESUME_CHECKSUM_SEED: u32 = 0x6473_5245;
/// Largest size a buffer may grow to through resume writes.
pub const MAX_BUFFER_SIZE: usize = 64 * RESUME_PROM_SIZE;

#[derive(Clone, Debug, PartialEq)]
pub struct BufferDescriptorInfo {
    pub buf_id: u8,
    pub subencl_type: SubenclosureType,
    pub side: SpSide,
    pub buf_type: BufferType,
    pub writable: bool,
    pub buf_index: u8,
    pub buf_spec_info: u8,
}

/// Optional filters applied on top of (subenclosure, side, buffer type)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferFilter {
    pub writable: Option<bool>,
    pub buf_index: Option<u8>,
    pub buf_spec_info: Option<u8>,
}

/// Snapshot of one buffer as reported to callers
#[derive(Clone, Debug, PartialEq)]
pub struct BufferInfo {
    pub descriptor: BufferDescriptorInfo,
    pub data: Vec<u8>,
}

/// Describes the caller's region in a resume PROM transfer.
///
/// Everything runs in one address space, so the user/kernel pointer
/// round-trip reduces to handing this value back unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub offset: usize,
    pub len: usize,
}

#[derive(Clone, Debug)]
struct BufferEntry {
    descriptor: BufferDescriptorInfo,
    storage: usize,  // index into BufferTable::storage
}

#[derive(Clone, Debug, Default)]
pub struct BufferTable {
    entries: Vec<BufferEntry>,
    storage: Vec<Vec<u8>>,
}

/// Running checksum over every byte but the trailing 4 (where it is stored).
pub fn resume_checksum(image: &[u8]) -> u32 {
    let body = &image[..image.len().saturating_sub(4)];
    body.iter().fold(RESUME_CHECKSUM_SEED, |acc, &b| acc.rotate_left(1) ^ u32::from(b))
}

fn stamp_checksum(image: &mut [u8]) {
    if image.len() < 4 {
        return;
    }
    let sum = resume_checksum(image);
    let tail = image.len() - 4;
    image[tail..].copy_from_slice(&sum.to_le_bytes());
}

fn stored_checksum(image: &[u8]) -> Option<u32> {
    let tail = image.len().checked_sub(4)?;
    let bytes: [u8; 4] = image[tail..].try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default descriptor set: per-side LCC and PS buffers plus the chassis PROM.
    pub fn with_defaults(encl_type: EnclosureType) -> Self {
        let mut table = Self::new();
        for side in [SpSide::A, SpSide::B] {
            table.add(SubenclosureType::Lcc, side, BufferType::Eeprom, true, 0, RESUME_PROM_SIZE);
            table.add(SubenclosureType::Lcc, side, BufferType::ActiveTrace, false, 0, 0);
            table.add(SubenclosureType::Lcc, side, BufferType::SavedTrace, false, 1, 0);
        }
        let ps_size = if encl_type.has_short_ps_resume() {
            SHORT_PS_RESUME_SIZE
        } else {
            RESUME_PROM_SIZE
        };
        for side in [SpSide::A, SpSide::B] {
            table.add(SubenclosureType::PowerSupply, side, BufferType::Eeprom, true, 0, ps_size);
        }
        table.add(SubenclosureType::Chassis, SpSide::A, BufferType::Eeprom, true, 0, RESUME_PROM_SIZE);
        table
    }

    fn add(
        &mut self,
        subencl_type: SubenclosureType,
        side: SpSide,
        buf_type: BufferType,
        writable: bool,
        buf_index: u8,
        size: usize,
    ) -> u8 {
        let buf_id = self.entries.len() as u8;
        let mut data = vec![0u8; size];
        if buf_type == BufferType::Eeprom {
            stamp_checksum(&mut data);
        }
        self.storage.push(data);
        self.entries.push(BufferEntry {
            descriptor: BufferDescriptorInfo {
                buf_id,
                subencl_type,
                side,
                buf_type,
                writable,
                buf_index,
                buf_spec_info: 0,
            },
            storage: self.storage.len() - 1,
        });
        buf_id
    }

    fn entry(&self, buf_id: u8) -> Result<&BufferEntry> {
        self.entries
            .iter()
            .find(|e| e.descriptor.buf_id == buf_id)
            .ok_or_else(|| EnclosureStatus::ComponentNotFound(format!("buffer id {}", buf_id)))
    }

    /// First descriptor, in table order, matching every supplied criterion.
    pub fn find_buf_id(
        &self,
        subencl_type: SubenclosureType,
        side: SpSide,
        buf_type: BufferType,
        filter: BufferFilter,
    ) -> Result<u8> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .find(|d| {
                d.subencl_type == subencl_type
                    && d.side == side
                    && d.buf_type == buf_type
                    && filter.writable.map_or(true, |w| d.writable == w)
                    && filter.buf_index.map_or(true, |i| d.buf_index == i)
                    && filter.buf_spec_info.map_or(true, |s| d.buf_spec_info == s)
            })
            .map(|d| d.buf_id)
            .ok_or_else(|| {
                EnclosureStatus::ComponentNotFound(format!(
                    "{:?} buffer for {:?} side {:?}",
                    buf_type, subencl_type, side
                ))
            })
    }

    pub fn info(&self, buf_id: u8) -> Result<BufferInfo> {
        let entry = self.entry(buf_id)?;
        Ok(BufferInfo {
            descriptor: entry.descriptor.clone(),
            data: self.storage[entry.storage].clone(),
        })
    }

    pub fn set(&mut self, buf_id: u8, data: &[u8]) -> Result<()> {
        let slot = self.entry(buf_id)?.storage;
        let buf = &mut self.storage[slot];
        buf.clear();
        buf.extend_from_slice(data);
        Ok(())
    }

    pub fn set_by_subencl_info(
        &mut self,
        subencl_type: SubenclosureType,
        side: SpSide,
        buf_type: BufferType,
        filter: BufferFilter,
        data: &[u8],
    ) -> Result<u8> {
        let buf_id = self.find_buf_id(subencl_type, side, buf_type, filter)?;
        self.set(buf_id, data)?;
        Ok(buf_id)
    }

    /// Point `alias_id` at the storage of `buf_id`.
    pub fn alias(&mut self, buf_id: u8, alias_id: u8) -> Result<()> {
        if buf_id == alias_id {
            return Err(EnclosureStatus::InvalidParameter(format!(
                "cannot alias buffer {} to itself",
                buf_id
            )));
        }
        let slot = self.entry(buf_id)?.storage;
        self.entry(alias_id)?;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.descriptor.buf_id == alias_id) {
            entry.storage = slot;
        }
        debug!("buffer {} now shares storage with buffer {}", alias_id, buf_id);
        Ok(())
    }

    /// Read a window of a resume PROM buffer.
    ///
    /// Reads past the end are truncated; an empty window is a null buffer. When `verify` is set an EEPROM image
    /// whose stored checksum does not match is reported as a checksum error.
    pub fn resume_read(
        &self,
        buf_id: u8,
        request: BufferDescriptor,
        verify: bool,
    ) -> Result<(Vec<u8>, BufferDescriptor)> {
        if request.len == 0 {
            return Err(EnclosureStatus::NullBuffer);
        }
        let entry = self.entry(buf_id)?;
        let image = &self.storage[entry.storage];
        if verify
            && entry.descriptor.buf_type == BufferType::Eeprom
            && stored_checksum(image) != Some(resume_checksum(image))
        {
            return Err(EnclosureStatus::ChecksumError(buf_id));
        }
        let start = request.offset.min(image.len());
        let end = request.offset.saturating_add(request.len).min(image.len());
        Ok((image[start..end].to_vec(), request))
    }

    /// Write into a resume PROM buffer, growing it if needed.
    pub fn resume_write(
        &mut self,
        buf_id: u8,
        request: BufferDescriptor,
        data: &[u8],
        restamp_checksum: bool,
    ) -> Result<BufferDescriptor> {
        let entry = self.entry(buf_id)?;
        if !entry.descriptor.writable {
            return Err(EnclosureStatus::IllegalRequest(format!(
                "buffer {} is read only",
                buf_id
            )));
        }
        if request.len == 0 || data.is_empty() {
            return Err(EnclosureStatus::NullBuffer);
        }
        if data.len() < request.len {
            return Err(EnclosureStatus::BufferTooSmall {
                needed: request.len,
                available: data.len(),
            });
        }
        let end = request.offset.checked_add(request.len).ok_or_else(|| {
            EnclosureStatus::InvalidParameter(format!(
                "write of {} bytes at offset {}",
                request.len, request.offset
            ))
        })?;
        if end > MAX_BUFFER_SIZE {
            return Err(EnclosureStatus::MemAllocFailed);
        }
        let is_eeprom = entry.descriptor.buf_type == BufferType::Eeprom;
        let slot = entry.storage;
        let image = &mut self.storage[slot];
        if image.len() < end {
            image.resize(end, 0);
        }
        image[request.offset..end].copy_from_slice(&data[..request.len]);
        if is_eeprom && restamp_checksum {
            stamp_checksum(image);
        }
        Ok(request)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &BufferDescriptorInfo> {
        self.entries.iter().map(|e| &e.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BufferTable {
        BufferTable::with_defaults(EnclosureType::Viper)
    }

    #[test]
    fn lookup_uses_first_match() {
        let t = table();
        let id = t
            .find_buf_id(SubenclosureType::Lcc, SpSide::B, BufferType::Eeprom, BufferFilter::default())
            .unwrap();
        assert_eq!(id, 3);
        let trace = t
            .find_buf_id(
                SubenclosureType::Lcc,
                SpSide::A,
                BufferType::SavedTrace,
                BufferFilter { buf_index: Some(1), ..Default::default() },
            )
            .unwrap();
        assert_eq!(trace, 2);
    }

    #[test]
    fn lookup_without_match_is_component_not_found() {
        let t = table();
        let err = t
            .find_buf_id(
                SubenclosureType::Cooling,
                SpSide::A,
                BufferType::EventLog,
                BufferFilter::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EnclosureStatus::ComponentNotFound(_)));
        let err = t
            .find_buf_id(
                SubenclosureType::Lcc,
                SpSide::A,
                BufferType::ActiveTrace,
                BufferFilter { writable: Some(true), ..Default::default() },
            )
            .unwrap_err();
        assert!(matches!(err, EnclosureStatus::ComponentNotFound(_)));
    }

    #[test]
    fn aliased_buffers_share_writes() {
        let mut t = table();
        t.alias(1, 4).unwrap();
        t.set(4, b"trace").unwrap();
        assert_eq!(t.info(1).unwrap().data, b"trace".to_vec());
        assert!(t.alias(2, 2).is_err());
        assert!(t.set(99, b"x").is_err());
    }

    #[test]
    fn set_by_info_writes_the_matched_buffer() {
        let mut t = table();
        let id = t
            .set_by_subencl_info(
                SubenclosureType::Lcc,
                SpSide::A,
                BufferType::SavedTrace,
                BufferFilter { buf_index: Some(1), ..Default::default() },
                b"saved",
            )
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(t.info(2).unwrap().data, b"saved".to_vec());
        assert!(t
            .set_by_subencl_info(
                SubenclosureType::Cooling,
                SpSide::A,
                BufferType::EventLog,
                BufferFilter::default(),
                b"x",
            )
            .is_err());
    }

    #[test]
    fn resume_write_restamps_checksum() {
        let mut t = table();
        let req = BufferDescriptor { offset: 16, len: 4 };
        assert_eq!(t.resume_write(0, req, b"ABCD", true).unwrap(), req);
        let (data, echoed) = t.resume_read(0, req, true).unwrap();
        assert_eq!(data, b"ABCD".to_vec());
        assert_eq!(echoed, req);

        t.resume_write(0, req, b"WXYZ", false).unwrap();
        assert_eq!(t.resume_read(0, req, true), Err(EnclosureStatus::ChecksumError(0)));
        assert!(t.resume_read(0, req, false).is_ok());
    }

    #[test]
    fn resume_write_rejects_out_of_range_windows() {
        let mut t = table();
        let wrapping = BufferDescriptor { offset: usize::MAX, len: 1 };
        assert!(matches!(
            t.resume_write(0, wrapping, b"X", true),
            Err(EnclosureStatus::InvalidParameter(_))
        ));
        let huge = BufferDescriptor { offset: MAX_BUFFER_SIZE, len: 1 };
        assert_eq!(t.resume_write(0, huge, b"X", true), Err(EnclosureStatus::MemAllocFailed));
        let empty = BufferDescriptor { offset: 0, len: 0 };
        assert_eq!(t.resume_write(0, empty, b"", true), Err(EnclosureStatus::NullBuffer));
        assert_eq!(t.resume_read(0, empty, true), Err(EnclosureStatus::NullBuffer));
        assert_eq!(t.info(0).unwrap().data.len(), RESUME_PROM_SIZE);

        // Growing up to the limit is still allowed
        let tail = BufferDescriptor { offset: MAX_BUFFER_SIZE - 2, len: 2 };
        assert_eq!(t.resume_write(0, tail, b"OK", true).unwrap(), tail);
        assert_eq!(t.info(0).unwrap().data.len(), MAX_BUFFER_SIZE);
    }

    #[test]
    fn short_ps_resume_on_iosxp() {
        let t = BufferTable::with_defaults(EnclosureType::VikingIosxp);
        let id = t
            .find_buf_id(SubenclosureType::PowerSupply, SpSide::A, BufferType::Eeprom, BufferFilter::default())
            .unwrap();
        assert_eq!(t.info(id).unwrap().data.len(), SHORT_PS_RESUME_SIZE);
    }
}
