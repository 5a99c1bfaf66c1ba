//! Partitioning-scheme policy.
//!
//! One closed enum covers every supported table architecture; all
//! behavior differences (minimum search location, alignment boundary,
//! placement hints, structure rules, write-back) are expressed as
//! methods matched on the enum, never via downcasting.

use serde::{Deserialize, Serialize};

use crate::disk::{BlockWrite, Disk};
use crate::error::{RescueError, Result};
use crate::geometry::Chs;
use crate::hints::HintQueue;
use crate::partition::{FsKind, PartStatus, Partition, PartitionList};

/// Supported partition table architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// No table; the whole medium is treated as raw space.
    None,
    /// MBR / PC-Intel.
    #[default]
    I386,
    Gpt,
    Mac,
    Sun,
    Xbox,
    Humax,
}

/// Outcome of a table write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Simulated,
    Written,
}

/// MBR type byte for the extended container.
const MBR_EXTENDED: u8 = 0x05;
/// Extended container whose end lies beyond CHS cylinder 1023.
const MBR_EXTENDED_LBA: u8 = 0x0F;

impl Arch {
    /// Lowest byte offset a partition may start at.
    pub fn min_search_location(&self, disk: &Disk) -> u64 {
        match self {
            Arch::Gpt => 2 * disk.sector_size as u64 + 16384,
            Arch::I386 | Arch::Humax => disk.sector_size as u64,
            Arch::Mac => 4096,
            Arch::Sun => disk.cylinder_size(),
            Arch::Xbox => 0x800,
            Arch::None => 0,
        }
    }

    /// Alignment granularity for partition boundaries.
    pub fn location_boundary(&self, disk: &Disk) -> u64 {
        match self {
            Arch::Mac => 4096,
            Arch::Sun => disk.cylinder_size(),
            _ => disk.sector_size as u64,
        }
    }

    /// Plausibility check for an accepted candidate.
    pub fn is_known(&self, part: &Partition) -> bool {
        match self {
            Arch::None => true,
            _ => part.fs != FsKind::Unknown || part.type_code != 0,
        }
    }

    /// Seed architecture-specific likely offsets: common wrong-geometry
    /// translations, table-type confusions and backup-sector positions.
    /// These are empirical and materially affect recovery success on
    /// misconfigured geometries.
    pub fn placement_hints(&self, disk: &Disk, hints: &mut HintQueue) {
        let ss = disk.sector_size as u64;
        let spt = disk.geometry.sectors_per_head as u64;
        match self {
            Arch::I386 => {
                // Sometimes users choose Intel instead of GPT.
                hints.insert(2 * ss + 16384);
                // Sometimes a Vista-era 2048-sector alignment was in use.
                hints.insert(2048 * 512);
                // Incorrect geometry: 0/1/1.
                hints.insert(32 * ss);
                hints.insert(63 * ss);
                // 1/[01]/1 for common head counts 16, 240, 255.
                for heads in [16u64, 240, 255] {
                    hints.insert(heads * 63 * ss);
                    hints.insert((heads + 1) * 63 * ss);
                    hints.insert(heads * spt * ss);
                    hints.insert((heads + 1) * spt * ss);
                }
                // NTFS backup boot sector in the last one or two cylinders.
                if disk.geometry.cylinders > 1 {
                    let mut last = Chs {
                        cylinder: disk.geometry.cylinders - 1,
                        head: disk.geometry.heads_per_cylinder - 1,
                        sector: disk.geometry.sectors_per_head,
                    };
                    hints.insert(disk.chs_to_offset(&last));
                    if disk.geometry.cylinders > 2 {
                        last.cylinder -= 1;
                        hints.insert(disk.chs_to_offset(&last));
                    }
                }
                // NTFS backup on a 2048-sector-aligned layout near the end.
                if disk.size > ss {
                    let rounded = (disk.size - ss) / (2048 * 512) * (2048 * 512);
                    if rounded > ss {
                        hints.insert(rounded - ss);
                    }
                }
            }
            Arch::Gpt => {
                // NTFS backup implied by the backup GPT header location.
                let entries = 128 * 128u64;
                if disk.size > entries + 1 {
                    let hdr_lba_end = (disk.size - 1 - entries) / ss - 1;
                    if hdr_lba_end > 1 {
                        let rounded = (hdr_lba_end - 1) * ss / (2048 * 512) * (2048 * 512);
                        if rounded > ss {
                            hints.insert(rounded - ss);
                        }
                    }
                }
            }
            Arch::Mac => {
                // Intel Macs sometimes carry GPT where Mac was selected.
                hints.insert(2 * ss + 16384);
            }
            _ => {}
        }
    }

    /// Assign 1-based table slots in offset order. MBR primaries fill
    /// slots 1-4; logical partitions number from 5.
    pub fn init_partition_order(&self, list: &mut PartitionList) {
        let mut slot = 1u32;
        let mut logical = 5u32;
        for part in list.iter_mut() {
            match part.status {
                PartStatus::Deleted => part.order = 0,
                PartStatus::Logical if *self == Arch::I386 => {
                    part.order = logical;
                    logical += 1;
                }
                _ => {
                    part.order = slot;
                    slot += 1;
                }
            }
        }
    }

    /// Promote a consistent, non-overlapping subset of raw detections.
    /// Overlapping candidates stay `Deleted` for the caller to resolve.
    pub fn init_structure(&self, disk: &Disk, list: &mut PartitionList) {
        let cylinder = disk.cylinder_size();
        let head = disk.head_size();
        let mut last_end: Option<u64> = None;
        let mut primaries = 0usize;
        let mut has_logical = false;
        for part in list.iter_mut() {
            if part.size == 0 {
                continue;
            }
            if last_end.is_some_and(|end| part.offset <= end) {
                part.status = PartStatus::Deleted;
                continue;
            }
            if *self == Arch::I386 && part.offset % cylinder == head && part.offset > cylinder {
                // A start on head 1 of a cylinder past the first is the
                // classic logical partition placement; head 1 of
                // cylinder 0 is where primaries historically begin.
                part.status = PartStatus::Logical;
                has_logical = true;
            } else {
                part.status = PartStatus::Primary;
                primaries += 1;
            }
            last_end = Some(part.end());
        }
        if *self == Arch::I386 {
            // One slot is reserved for the extended container when
            // logical partitions are present.
            let max_primaries = if has_logical { 3 } else { 4 };
            if primaries > max_primaries {
                let mut seen = 0usize;
                for part in list.iter_mut() {
                    if part.status == PartStatus::Primary {
                        seen += 1;
                        if seen > max_primaries {
                            part.status = PartStatus::Deleted;
                        }
                    }
                }
            }
        }
    }

    /// Validate the non-deleted entries as a writable table: sorted,
    /// non-overlapping, and within the architecture's slot limits.
    pub fn test_structure(&self, list: &PartitionList) -> Result<()> {
        let active: Vec<&Partition> = list
            .iter()
            .filter(|p| p.status != PartStatus::Deleted)
            .collect();
        for pair in active.windows(2) {
            if pair[1].offset < pair[0].offset {
                return Err(RescueError::InvalidStructure(
                    "partitions out of order".into(),
                ));
            }
        }
        match self {
            Arch::I386 => {
                let primaries: Vec<&&Partition> = active
                    .iter()
                    .filter(|p| {
                        matches!(
                            p.status,
                            PartStatus::Primary | PartStatus::PrimaryBoot | PartStatus::Extended
                        )
                    })
                    .collect();
                if primaries.len() > 4 {
                    return Err(RescueError::InvalidStructure(
                        "more than 4 primary partitions".into(),
                    ));
                }
                let extended: Vec<&&Partition> = active
                    .iter()
                    .filter(|p| p.status == PartStatus::Extended)
                    .collect();
                if extended.len() > 1 {
                    return Err(RescueError::InvalidStructure(
                        "more than one extended partition".into(),
                    ));
                }
                let envelope = extended.first().map(|e| (e.offset, e.end()));
                for (i, a) in active.iter().enumerate() {
                    for b in active.iter().skip(i + 1) {
                        if !a.overlaps(b) {
                            continue;
                        }
                        // Logical partitions live inside the extended
                        // container; any other overlap is fatal.
                        let contained = |p: &Partition| {
                            p.status == PartStatus::Logical
                                && envelope
                                    .is_some_and(|(s, e)| p.offset >= s && p.end() <= e)
                        };
                        let ext_and_logical = (a.status == PartStatus::Extended && contained(b))
                            || (b.status == PartStatus::Extended && contained(a));
                        if !ext_and_logical {
                            return Err(RescueError::InvalidStructure(format!(
                                "partitions at {} and {} overlap",
                                a.offset, b.offset
                            )));
                        }
                    }
                }
            }
            _ => {
                for pair in active.windows(2) {
                    if pair[0].overlaps(pair[1]) {
                        return Err(RescueError::InvalidStructure(format!(
                            "partitions at {} and {} overlap",
                            pair[0].offset, pair[1].offset
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize and optionally write the partition table. Only the MBR
    /// layout is writable; other architectures report the attempt as
    /// unsupported, leaving the medium untouched.
    pub fn write_table(
        &self,
        disk: &Disk,
        list: &PartitionList,
        sink: &mut dyn BlockWrite,
        simulate: bool,
    ) -> Result<WriteStatus> {
        match self {
            Arch::I386 => {
                let sector = build_mbr(disk, list)?;
                if simulate {
                    tracing::info!("simulated MBR write, table not committed");
                    return Ok(WriteStatus::Simulated);
                }
                sink.write_at(&sector, 0).map_err(RescueError::WriteFailure)?;
                tracing::info!("MBR written");
                Ok(WriteStatus::Written)
            }
            other => Err(RescueError::UnsupportedWrite(*other)),
        }
    }
}

/// Default MBR type byte for a filesystem tag.
pub fn mbr_type_for(fs: FsKind) -> u8 {
    match fs {
        FsKind::Fat12 => 0x01,
        FsKind::Fat16 => 0x06,
        FsKind::Fat32 => 0x0C,
        FsKind::Exfat | FsKind::Ntfs => 0x07,
        FsKind::Hfs | FsKind::HfsPlus => 0xAF,
        FsKind::Ext | FsKind::Xfs => 0x83,
        FsKind::Swap => 0x82,
        FsKind::LvmPv => 0x8E,
        FsKind::BsdDisklabel => 0xA5,
        FsKind::MdRaid | FsKind::MdRaid1 => 0xFD,
        FsKind::Iso9660 | FsKind::Unknown => 0x00,
    }
}

/// Build the 512-byte MBR sector from partitions holding slots 1-4.
fn build_mbr(disk: &Disk, list: &PartitionList) -> Result<[u8; 512]> {
    let mut sector = [0u8; 512];
    let ss = disk.sector_size as u64;
    for part in list.iter() {
        let in_table = matches!(
            part.status,
            PartStatus::Primary | PartStatus::PrimaryBoot | PartStatus::Extended
        );
        if !in_table || part.order == 0 || part.order > 4 {
            continue;
        }
        let entry = 446 + (part.order as usize - 1) * 16;
        if sector[entry + 4] != 0 {
            return Err(RescueError::InvalidStructure(format!(
                "duplicate table slot {}",
                part.order
            )));
        }
        sector[entry] = if part.status == PartStatus::PrimaryBoot {
            0x80
        } else {
            0x00
        };
        encode_chs(disk, part.offset, &mut sector[entry + 1..entry + 4]);
        sector[entry + 4] = match part.status {
            PartStatus::Extended => {
                if disk.offset_to_cylinder(part.end()) > 1023 {
                    MBR_EXTENDED_LBA
                } else {
                    MBR_EXTENDED
                }
            }
            _ if part.type_code != 0 => part.type_code,
            _ => mbr_type_for(part.fs),
        };
        encode_chs(disk, part.end(), &mut sector[entry + 5..entry + 8]);
        let lba = u32::try_from(part.offset / ss).unwrap_or(u32::MAX);
        let sectors = u32::try_from(part.size / ss).unwrap_or(u32::MAX);
        sector[entry + 8..entry + 12].copy_from_slice(&lba.to_le_bytes());
        sector[entry + 12..entry + 16].copy_from_slice(&sectors.to_le_bytes());
    }
    sector[510] = 0x55;
    sector[511] = 0xAA;
    Ok(sector)
}

/// Pack a CHS triple into the 3-byte MBR encoding, capping at the
/// 1023/254/63 addressing limit.
fn encode_chs(disk: &Disk, offset: u64, out: &mut [u8]) {
    let chs = disk.offset_to_chs(offset);
    let (c, h, s) = if chs.cylinder > 1023 {
        (1023u64, 254u32, 63u32)
    } else {
        (chs.cylinder, chs.head, chs.sector)
    };
    out[0] = h as u8;
    out[1] = (s as u8 & 0x3F) | ((c >> 2) as u8 & 0xC0);
    out[2] = c as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::CaptureSink;

    fn disk(arch: Arch) -> Disk {
        Disk::new(80 * 1024 * 1024, 80 * 1024 * 1024, 512, 255, 63, arch).unwrap()
    }

    fn part(offset: u64, size: u64, status: PartStatus) -> Partition {
        Partition {
            offset,
            size,
            status,
            fs: FsKind::Ntfs,
            type_code: 0x07,
            ..Partition::new()
        }
    }

    #[test]
    fn min_location_per_arch() {
        let d = disk(Arch::I386);
        assert_eq!(Arch::I386.min_search_location(&d), 512);
        assert_eq!(Arch::Gpt.min_search_location(&d), 2 * 512 + 16384);
        assert_eq!(Arch::Mac.min_search_location(&d), 4096);
        assert_eq!(Arch::Sun.min_search_location(&d), d.cylinder_size());
        assert_eq!(Arch::Xbox.min_search_location(&d), 0x800);
        assert_eq!(Arch::None.min_search_location(&d), 0);
    }

    #[test]
    fn location_boundary_per_arch() {
        let d = disk(Arch::I386);
        assert_eq!(Arch::I386.location_boundary(&d), 512);
        assert_eq!(Arch::Mac.location_boundary(&d), 4096);
        assert_eq!(Arch::Sun.location_boundary(&d), d.cylinder_size());
    }

    #[test]
    fn i386_placement_hints_cover_common_mistakes() {
        let d = disk(Arch::I386);
        let mut q = HintQueue::new();
        Arch::I386.placement_hints(&d, &mut q);
        assert!(q.contains(2 * 512 + 16384));
        assert!(q.contains(2048 * 512));
        assert!(q.contains(63 * 512));
        assert!(q.contains(255 * 63 * 512));
        assert!(q.contains(256 * 63 * 512));
    }

    #[test]
    fn test_structure_rejects_overlap() {
        let mut list = PartitionList::new();
        list.insert(part(1 * 1024 * 1024, 4 * 1024 * 1024, PartStatus::Primary));
        list.insert(part(3 * 1024 * 1024, 4 * 1024 * 1024, PartStatus::Primary));
        assert!(Arch::I386.test_structure(&list).is_err());
        assert!(Arch::Gpt.test_structure(&list).is_err());
    }

    #[test]
    fn test_structure_allows_logical_inside_extended() {
        let mut list = PartitionList::new();
        let mut ext = part(1024 * 1024 - 512, 8 * 1024 * 1024, PartStatus::Extended);
        ext.order = 1;
        list.insert(ext);
        list.insert(part(1024 * 1024, 4 * 1024 * 1024, PartStatus::Logical));
        assert!(Arch::I386.test_structure(&list).is_ok());
    }

    #[test]
    fn test_structure_rejects_five_primaries() {
        let mut list = PartitionList::new();
        for i in 0..5u64 {
            list.insert(part((i + 1) * 4 * 1024 * 1024, 1024 * 1024, PartStatus::Primary));
        }
        assert!(Arch::I386.test_structure(&list).is_err());
    }

    #[test]
    fn init_structure_promotes_non_overlapping() {
        let d = disk(Arch::I386);
        let mut list = PartitionList::new();
        list.insert(part(1024 * 1024, 4 * 1024 * 1024, PartStatus::Deleted));
        list.insert(part(2 * 1024 * 1024, 1024 * 1024, PartStatus::Deleted));
        list.insert(part(8 * 1024 * 1024, 1024 * 1024, PartStatus::Deleted));
        Arch::I386.init_structure(&d, &mut list);
        let statuses: Vec<PartStatus> = list.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![PartStatus::Primary, PartStatus::Deleted, PartStatus::Primary]
        );
    }

    #[test]
    fn mbr_write_and_simulate() {
        let d = disk(Arch::I386);
        let mut list = PartitionList::new();
        let mut p = part(1024 * 1024, 4 * 1024 * 1024, PartStatus::PrimaryBoot);
        p.order = 1;
        list.insert(p);

        let mut sink = CaptureSink::default();
        let status = Arch::I386
            .write_table(&d, &list, &mut sink, true)
            .unwrap();
        assert_eq!(status, WriteStatus::Simulated);
        assert!(sink.writes.is_empty());

        let status = Arch::I386
            .write_table(&d, &list, &mut sink, false)
            .unwrap();
        assert_eq!(status, WriteStatus::Written);
        let (offset, bytes) = &sink.writes[0];
        assert_eq!(*offset, 0);
        assert_eq!(bytes[510], 0x55);
        assert_eq!(bytes[511], 0xAA);
        // Slot 1: bootable NTFS starting at LBA 2048.
        assert_eq!(bytes[446], 0x80);
        assert_eq!(bytes[446 + 4], 0x07);
        assert_eq!(
            u32::from_le_bytes(bytes[446 + 8..446 + 12].try_into().unwrap()),
            2048
        );
    }

    #[test]
    fn non_mbr_write_is_unsupported() {
        let d = disk(Arch::Mac);
        let list = PartitionList::new();
        let mut sink = CaptureSink::default();
        assert!(matches!(
            Arch::Mac.write_table(&d, &list, &mut sink, false),
            Err(RescueError::UnsupportedWrite(Arch::Mac))
        ));
    }
}
