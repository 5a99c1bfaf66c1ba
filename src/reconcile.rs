//! Structure reconciliation: turning raw detections into a coherent,
//! aligned, writable layout.
//!
//! Detections come back sector-precise. Real tables round partition
//! extents out to cylinder or MiB boundaries, so each candidate's end
//! is grown to the next boundary unless that would collide with a
//! neighbor, in which case the sector-precise extent is kept.

use crate::arch::Arch;
use crate::disk::Disk;
use crate::geometry::Chs;
use crate::partition::{FsKind, PartStatus, Partition, PartitionList};

/// Boundary granularity for [`align_structure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignUnit {
    /// Pick automatically: per-partition from the start alignment on
    /// MBR disks, cylinders for Sun, 4 KiB for Mac, sectors otherwise.
    #[default]
    Auto,
    Sector,
    Head,
    Cylinder,
    Mib,
}

impl AlignUnit {
    pub fn bytes(&self, disk: &Disk) -> u64 {
        match self {
            AlignUnit::Auto => match disk.arch {
                Arch::Sun => disk.cylinder_size(),
                Arch::Mac => 4096,
                _ => disk.sector_size as u64,
            },
            AlignUnit::Sector => disk.sector_size as u64,
            AlignUnit::Head => disk.head_size(),
            AlignUnit::Cylinder => disk.cylinder_size(),
            AlignUnit::Mib => 1024 * 1024,
        }
    }
}

/// Boundary a partition at `offset` was most plausibly laid out on:
/// 1 MiB for Vista-era layouts, a cylinder for classic tools (allowing
/// the one-head boot-track shift), a head as a fallback.
fn unit_for_offset(disk: &Disk, offset: u64) -> u64 {
    if offset % (1024 * 1024) == 0 {
        return 1024 * 1024;
    }
    let cylinder = disk.cylinder_size();
    let head = disk.head_size();
    if offset % cylinder == 0 || offset % cylinder == head {
        return cylinder;
    }
    if offset % head == 0 {
        return head;
    }
    disk.sector_size as u64
}

/// Drop deleted entries.
pub fn reduce(list: &mut PartitionList) {
    list.retain(|p| p.status != PartStatus::Deleted);
}

/// Grow partition ends to the next boundary. Filesystem sizes
/// undershoot the table extent, which real tables round out to a
/// cylinder or MiB boundary; starts are detected exactly and stay put.
/// With `AlignUnit::Auto` on an MBR disk the boundary is chosen per
/// partition from its start alignment, so a 1 MiB-aligned partition is
/// not cylinder-rounded. A partition keeps its sector-precise end when
/// growing would run into the next partition or past the end of the
/// disk. Applying the same alignment twice is a no-op.
pub fn align_structure(disk: &Disk, list: &mut PartitionList, unit: AlignUnit) {
    let ss = disk.sector_size as u64;
    let per_offset = unit == AlignUnit::Auto && disk.arch == Arch::I386;
    if !per_offset && unit.bytes(disk) <= ss {
        return;
    }
    let n = list.len();
    for i in 0..n {
        let part = list.get(i).unwrap().clone();
        if part.status == PartStatus::Deleted || part.size == 0 {
            continue;
        }
        let u = if per_offset {
            unit_for_offset(disk, part.offset)
        } else {
            unit.bytes(disk)
        };
        if u <= ss {
            continue;
        }
        let snapped = (part.end() + u) / u * u;
        if snapped == part.end() + 1 || snapped > disk.size {
            continue;
        }
        let blocked = list
            .as_slice()
            .iter()
            .skip(i + 1)
            .filter(|p| p.status != PartStatus::Deleted)
            .any(|p| p.offset < snapped);
        if blocked {
            continue;
        }
        let slot = list.get_mut(i).unwrap();
        tracing::debug!(
            offset = slot.offset,
            from = slot.size,
            to = snapped - slot.offset,
            "partition end grown to alignment boundary"
        );
        slot.size = snapped - slot.offset;
    }
}

/// Synthesize the extended container around the logical partitions.
///
/// Any previously synthesized container is removed first, so the call
/// is safe to repeat on the same list when the envelope policy flips.
/// The minimal variant hugs the logicals, rounded out to the boundary
/// the first logical start implies; the maximal variant expands into
/// the free space between the neighboring primaries. A table whose
/// four slots are already spoken for always gets the maximal envelope.
pub fn synthesize_extended(
    disk: &Disk,
    list: &mut PartitionList,
    max_ext: bool,
) -> Option<Partition> {
    if disk.arch != Arch::I386 {
        return None;
    }
    list.retain(|p| p.status != PartStatus::Extended);

    let logicals: Vec<Partition> = list
        .iter()
        .filter(|p| p.status == PartStatus::Logical)
        .cloned()
        .collect();
    let first = logicals.first()?;
    let last = logicals.last().unwrap();

    let others = list
        .iter()
        .filter(|p| p.status != PartStatus::Logical && p.status != PartStatus::Deleted)
        .count();
    // The logical block occupies one table slot.
    let slots_full = others + 1 == 4;

    let ss = disk.sector_size as u64;
    let head = disk.head_size();
    let mib = 1024 * 1024u64;
    let prev_end = list
        .iter()
        .filter(|p| {
            p.status != PartStatus::Deleted
                && p.status != PartStatus::Logical
                && p.end() < first.offset
        })
        .map(Partition::end)
        .max();
    let next_offset = list
        .iter()
        .filter(|p| {
            p.status != PartStatus::Deleted
                && p.status != PartStatus::Logical
                && p.offset > last.end()
        })
        .map(|p| p.offset)
        .min();
    let mib_layout = first.offset % mib == 0;

    let (start, end_sector) = if max_ext || slots_full {
        let mut start = match prev_end {
            None => {
                let mut start = first.offset.saturating_sub(ss);
                let tmp = if mib_layout { mib } else { head };
                if tmp < start {
                    start = tmp;
                }
                start
            }
            Some(prev) => {
                let mut start = prev + 1;
                // Round up to the boundary the logicals were laid out on.
                let tmp = if mib_layout {
                    (start + mib - 1) / mib * mib
                } else {
                    let chs = Chs {
                        cylinder: disk.offset_to_cylinder(start - 1) + 1,
                        head: 0,
                        sector: 1,
                    };
                    disk.chs_to_offset(&chs)
                };
                if tmp < first.offset && tmp >= prev + 1 {
                    start = tmp;
                }
                start
            }
        };
        if start > first.offset {
            start = first.offset;
        }
        let mut end_sector = match next_offset {
            // Free tail: claim everything up to the end of the disk.
            None => ((last.end() + 1).saturating_sub(ss)).max(disk.size - ss),
            Some(next) => next - ss,
        };
        let tmp = if start % mib == 0 {
            (end_sector / mib * mib).checked_sub(ss)
        } else {
            disk.offset_to_cylinder(end_sector).checked_sub(1).map(|c| {
                disk.chs_to_offset(&Chs {
                    cylinder: c,
                    head: disk.geometry.heads_per_cylinder - 1,
                    sector: disk.geometry.sectors_per_head,
                })
            })
        };
        if let Some(tmp) = tmp {
            if (last.end() + 1).saturating_sub(ss) <= tmp {
                end_sector = tmp;
            }
        }
        (start, end_sector)
    } else {
        let mut start = first.offset.saturating_sub(ss);
        let tmp = if mib_layout {
            start / mib * mib
        } else {
            let cylinder = disk.offset_to_cylinder(start);
            let chs = Chs {
                cylinder,
                // Cylinder 0 holds the table itself.
                head: if cylinder == 0 { 1 } else { 0 },
                sector: 1,
            };
            disk.chs_to_offset(&chs)
        };
        if tmp > 0 && tmp < first.offset && prev_end.map_or(true, |prev| tmp >= prev + 1) {
            start = tmp;
        }
        let mut end_sector = (last.end() + 1).saturating_sub(ss);
        let tmp = if start % mib == 0 {
            ((end_sector + mib - 1) / mib * mib).checked_sub(ss)
        } else {
            let chs = Chs {
                cylinder: disk.offset_to_cylinder(end_sector),
                head: disk.geometry.heads_per_cylinder - 1,
                sector: disk.geometry.sectors_per_head,
            };
            Some(disk.chs_to_offset(&chs))
        };
        if let Some(tmp) = tmp {
            if tmp < disk.size {
                end_sector = tmp;
            }
        }
        (start, end_sector)
    };

    let mut ext = Partition::new();
    ext.offset = start;
    ext.size = end_sector + ss - start;
    ext.status = PartStatus::Extended;
    ext.fs = FsKind::Unknown;
    ext.type_code = if disk.offset_to_cylinder(end_sector) > 1023 {
        0x0F
    } else {
        0x05
    };
    tracing::debug!(
        offset = ext.offset,
        size = ext.size,
        max_ext,
        "extended partition synthesized"
    );
    list.insert(ext.clone());
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn disk() -> Disk {
        Disk::new(64 * 1024 * 1024, 64 * 1024 * 1024, 512, 16, 63, Arch::I386).unwrap()
    }

    fn part(offset: u64, size: u64, status: PartStatus) -> Partition {
        Partition {
            offset,
            size,
            status,
            fs: FsKind::Ext,
            type_code: 0x83,
            ..Partition::new()
        }
    }

    #[test]
    fn reduce_drops_deleted() {
        let mut list = PartitionList::new();
        list.insert(part(1024 * 1024, 1024 * 1024, PartStatus::Primary));
        list.insert(part(4 * 1024 * 1024, 1024 * 1024, PartStatus::Deleted));
        reduce(&mut list);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().offset, 1024 * 1024);
    }

    #[test]
    fn align_grows_end_to_cylinder() {
        let d = disk();
        let cyl = d.cylinder_size();
        let mut list = PartitionList::new();
        // Ends a few sectors short of a cylinder boundary.
        list.insert(part(cyl, 2 * cyl - 5 * 512, PartStatus::Primary));
        align_structure(&d, &mut list, AlignUnit::Cylinder);
        let p = list.get(0).unwrap();
        assert_eq!(p.offset, cyl);
        assert_eq!(p.size, 2 * cyl);
    }

    #[test]
    fn auto_align_picks_the_unit_from_the_start_offset() {
        let d = disk();
        let cyl = d.cylinder_size();
        let mut list = PartitionList::new();
        // Vista layout: MiB-aligned start stays on the MiB grid.
        list.insert(part(1024 * 1024, 1024 * 1024 - 3 * 512, PartStatus::Primary));
        // Classic layout: cylinder-aligned start rounds to cylinders.
        list.insert(part(8 * cyl, cyl - 5 * 512, PartStatus::Primary));
        align_structure(&d, &mut list, AlignUnit::Auto);
        assert_eq!(list.get(0).unwrap().size, 1024 * 1024);
        assert_eq!(list.get(1).unwrap().size, cyl);
    }

    #[test]
    fn align_keeps_extent_when_neighbor_blocks_growth() {
        let d = disk();
        let cyl = d.cylinder_size();
        let mut list = PartitionList::new();
        let first = part(cyl, cyl - 2 * 512, PartStatus::Primary);
        list.insert(first.clone());
        // Occupies the sectors the first would grow into.
        list.insert(part(2 * cyl - 512, cyl, PartStatus::Primary));
        align_structure(&d, &mut list, AlignUnit::Cylinder);
        assert_eq!(list.get(0).unwrap().size, first.size);
    }

    #[test]
    fn minimal_extended_hugs_the_logicals() {
        let d = disk();
        let cyl = d.cylinder_size();
        let head = d.head_size();
        let mut list = PartitionList::new();
        list.insert(part(cyl + head, cyl - head, PartStatus::Logical));
        list.insert(part(3 * cyl + head, cyl - head, PartStatus::Logical));
        let ext = synthesize_extended(&d, &mut list, false).unwrap();
        assert_eq!(ext.offset, cyl);
        assert_eq!(ext.end(), 4 * cyl - 1);
        assert_eq!(ext.status, PartStatus::Extended);
        assert_eq!(ext.type_code, 0x05);
    }

    #[test]
    fn maximal_extended_fills_between_neighbors() {
        let d = disk();
        let cyl = d.cylinder_size();
        let head = d.head_size();
        let mut list = PartitionList::new();
        list.insert(part(0, cyl, PartStatus::Primary));
        list.insert(part(4 * cyl + head, cyl - head, PartStatus::Logical));
        list.insert(part(10 * cyl, 2 * cyl, PartStatus::Primary));
        let ext = synthesize_extended(&d, &mut list, true).unwrap();
        assert_eq!(ext.offset, cyl);
        // The end is rounded down to a cylinder end clear of the
        // following primary.
        assert_eq!(ext.end(), 9 * cyl - 1);
    }

    #[test]
    fn full_table_forces_the_maximal_envelope() {
        let d = disk();
        let cyl = d.cylinder_size();
        let head = d.head_size();
        let mut list = PartitionList::new();
        list.insert(part(0, cyl, PartStatus::Primary));
        list.insert(part(4 * cyl + head, cyl - head, PartStatus::Logical));
        list.insert(part(10 * cyl, cyl, PartStatus::Primary));
        list.insert(part(12 * cyl, cyl, PartStatus::Primary));
        // Three primaries plus the logical block fill all four slots.
        let ext = synthesize_extended(&d, &mut list, false).unwrap();
        assert_eq!(ext.offset, cyl);
        assert_eq!(ext.end(), 9 * cyl - 1);
    }

    #[test]
    fn mib_aligned_logicals_get_a_mib_envelope() {
        let d = disk();
        let mib = 1024 * 1024u64;
        let mut list = PartitionList::new();
        list.insert(part(2 * mib, mib, PartStatus::Logical));
        let ext = synthesize_extended(&d, &mut list, false).unwrap();
        assert_eq!(ext.offset, mib);
        assert_eq!(ext.end(), 3 * mib - 1);
    }

    #[test]
    fn no_logicals_no_extended() {
        let d = disk();
        let mut list = PartitionList::new();
        list.insert(part(1024 * 1024, 1024 * 1024, PartStatus::Primary));
        assert!(synthesize_extended(&d, &mut list, false).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn repeated_synthesis_replaces_the_container() {
        let d = disk();
        let cyl = d.cylinder_size();
        let head = d.head_size();
        let mut list = PartitionList::new();
        list.insert(part(cyl, cyl, PartStatus::Extended));
        list.insert(part(cyl + head, cyl - head, PartStatus::Logical));
        let first = synthesize_extended(&d, &mut list, false).unwrap();
        let second = synthesize_extended(&d, &mut list, false).unwrap();
        assert_eq!(first, second);
        let containers = list
            .iter()
            .filter(|p| p.status == PartStatus::Extended)
            .count();
        assert_eq!(containers, 1);
    }

    #[test]
    fn tiny_offsets_do_not_underflow() {
        let d = disk();
        let mut list = PartitionList::new();
        list.insert(part(100, 100, PartStatus::Logical));
        list.insert(part(300, 100, PartStatus::Logical));
        let ext = synthesize_extended(&d, &mut list, false).unwrap();
        assert_eq!(ext.offset, 0);
    }

    proptest! {
        #[test]
        fn alignment_is_idempotent(
            offsets in proptest::collection::vec(1u64..120_000, 1..6),
        ) {
            let d = disk();
            let mut list = PartitionList::new();
            let mut base = 0u64;
            for len in offsets {
                let p = part(base, len * 512, PartStatus::Primary);
                base = p.end() + 1 + 512;
                list.insert(p);
            }
            let mut once = list.clone();
            align_structure(&d, &mut once, AlignUnit::Cylinder);
            let mut twice = once.clone();
            align_structure(&d, &mut twice, AlignUnit::Cylinder);
            prop_assert_eq!(once.as_slice(), twice.as_slice());
        }
    }
}
