//! Partition candidates and the sorted result list.
//!
//! The scanner produces raw candidates with `Deleted` status; structure
//! initialization promotes a consistent subset to `Primary`/`Logical`.
//! The list is an owned vector kept sorted by offset - insertion and
//! removal happen by value, never by node surgery.

use serde::{Deserialize, Serialize};

/// Role of a partition inside the reconstructed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    /// Detected but not selected for the table.
    Deleted,
    Primary,
    PrimaryBoot,
    Logical,
    /// Synthetic container for logical partitions (MBR only).
    Extended,
    ExtendedInExtended,
}

/// Unified filesystem/content tag, independent of the table architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsKind {
    Fat12,
    Fat16,
    Fat32,
    Exfat,
    Ntfs,
    Hfs,
    HfsPlus,
    Ext,
    Swap,
    BsdDisklabel,
    LvmPv,
    Xfs,
    Iso9660,
    /// Linux MD software RAID member, v0.90 superblock.
    MdRaid,
    /// Linux MD software RAID member, v1.x superblock.
    MdRaid1,
    Unknown,
}

impl FsKind {
    /// RAID members never seed further RAID-member hints.
    pub fn is_raid_member(&self) -> bool {
        matches!(self, FsKind::MdRaid | FsKind::MdRaid1)
    }
}

/// A partition candidate. Offsets and sizes are bytes, absolute from the
/// start of the medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub offset: u64,
    pub size: u64,
    pub status: PartStatus,
    pub fs: FsKind,
    /// Architecture-specific type code (MBR type byte).
    pub type_code: u8,
    /// 1-based table slot, 0 while unordered.
    pub order: u32,
    /// Offset of a usable backup superblock/boot sector inside the
    /// partition, 0 when none was involved in the detection.
    pub sb_offset: u64,
}

impl Partition {
    pub fn new() -> Self {
        Self {
            offset: 0,
            size: 0,
            status: PartStatus::Deleted,
            fs: FsKind::Unknown,
            type_code: 0,
            order: 0,
            sb_offset: 0,
        }
    }

    /// Last byte of the partition. Requires `size > 0`.
    pub fn end(&self) -> u64 {
        self.offset + self.size - 1
    }

    pub fn reset(&mut self) {
        *self = Partition::new();
    }

    pub fn overlaps(&self, other: &Partition) -> bool {
        self.offset <= other.end() && other.offset <= self.end()
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered sequence of partitions, kept sorted ascending by offset
/// (ties broken by size). Duplicate entries are rejected on insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionList {
    parts: Vec<Partition>,
}

impl PartitionList {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Insert keeping sort order. Returns false (and drops the entry)
    /// when an identical candidate is already present.
    pub fn insert(&mut self, part: Partition) -> bool {
        let duplicate = self
            .parts
            .iter()
            .any(|p| p.offset == part.offset && p.size == part.size && p.fs == part.fs);
        if duplicate {
            return false;
        }
        let pos = self
            .parts
            .partition_point(|p| (p.offset, p.size) <= (part.offset, part.size));
        self.parts.insert(pos, part);
        true
    }

    pub fn remove(&mut self, index: usize) -> Partition {
        self.parts.remove(index)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.parts.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Partition> {
        self.parts.iter_mut()
    }

    pub fn as_slice(&self) -> &[Partition] {
        &self.parts
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.parts.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Partition> {
        self.parts.get_mut(index)
    }

    pub fn retain<F: FnMut(&Partition) -> bool>(&mut self, f: F) {
        self.parts.retain(f);
    }

    /// Re-establish the sort order after in-place edits.
    pub fn sort(&mut self) {
        self.parts.sort_by_key(|p| (p.offset, p.size));
    }

    /// Mark the partition at `index` as the only bootable one, demoting
    /// every other `PrimaryBoot` entry to `Primary`.
    pub fn only_one_bootable(&mut self, index: usize) {
        if self
            .parts
            .get(index)
            .map(|p| p.status != PartStatus::PrimaryBoot)
            .unwrap_or(true)
        {
            return;
        }
        for (i, part) in self.parts.iter_mut().enumerate() {
            if i != index && part.status == PartStatus::PrimaryBoot {
                part.status = PartStatus::Primary;
            }
        }
    }
}

impl<'a> IntoIterator for &'a PartitionList {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl FromIterator<Partition> for PartitionList {
    fn from_iter<T: IntoIterator<Item = Partition>>(iter: T) -> Self {
        let mut list = PartitionList::new();
        for p in iter {
            list.insert(p);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(offset: u64, size: u64) -> Partition {
        Partition {
            offset,
            size,
            ..Partition::new()
        }
    }

    #[test]
    fn insert_keeps_ascending_order() {
        let mut list = PartitionList::new();
        list.insert(part(3000, 10));
        list.insert(part(1000, 10));
        list.insert(part(2000, 10));
        let offsets: Vec<u64> = list.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![1000, 2000, 3000]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut list = PartitionList::new();
        assert!(list.insert(part(1000, 10)));
        assert!(!list.insert(part(1000, 10)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn same_offset_different_size_both_kept() {
        let mut list = PartitionList::new();
        assert!(list.insert(part(1000, 10)));
        assert!(list.insert(part(1000, 20)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn only_one_bootable_demotes_others() {
        let mut list = PartitionList::new();
        for off in [1000u64, 2000, 3000] {
            let mut p = part(off, 10);
            p.status = PartStatus::PrimaryBoot;
            list.insert(p);
        }
        list.only_one_bootable(1);
        let boot: Vec<bool> = list
            .iter()
            .map(|p| p.status == PartStatus::PrimaryBoot)
            .collect();
        assert_eq!(boot, vec![false, true, false]);
    }

    #[test]
    fn overlap_detection() {
        let a = part(1000, 100);
        let b = part(1099, 100);
        let c = part(1100, 100);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
