//! Sequential signature scan over the whole medium.
//!
//! The scanner walks a byte cursor from the architecture minimum to the
//! search ceiling, probing eligible locations with the signature chain.
//! Two hint queues can pull the cursor to exact offsets: generic
//! placement hints and RAID-member hypotheses. A control source is
//! polled once per cursor step so a long scan stays interruptible.

use crate::arch::Arch;
use crate::disk::{BlockRead, Disk};
use crate::error::Result;
use crate::hints::HintQueue;
use crate::partition::{FsKind, Partition, PartitionList};
use crate::probe::{ProbeChain, ProbeCtx, ProbeOutcome, SignatureProbe, WINDOW_SIZE};
use crate::probes::md::{md_new_size_sectors, MD_MAX_CHUNK_SIZE, MD_RESERVED_BYTES};
use crate::probes::ntfs::NtfsPrimaryProbe;

/// Operator signal polled once per cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop sequential scanning; pending hints are still visited.
    Stop,
    /// Jump to the next pending hint.
    Skip,
    /// Jump forward by a twentieth of the search space.
    SearchMore,
    /// Abort immediately.
    Quit,
}

pub trait ControlSource {
    fn poll(&mut self) -> Control;
}

/// Control source that never interrupts.
pub struct NoControl;

impl ControlSource for NoControl {
    fn poll(&mut self) -> Control {
        Control::Continue
    }
}

/// Control fed from another thread, typically a key reader.
pub struct ChannelControl {
    rx: crossbeam_channel::Receiver<Control>,
}

impl ChannelControl {
    pub fn new(rx: crossbeam_channel::Receiver<Control>) -> Self {
        Self { rx }
    }
}

impl ControlSource for ChannelControl {
    fn poll(&mut self) -> Control {
        self.rx.try_recv().unwrap_or(Control::Continue)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub cursor: u64,
    pub max: u64,
    pub found: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// 0 skips ahead after each find, 1 scans everything, 2 also probes
    /// every cylinder-start head.
    pub fast_mode: u8,
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub found: PartitionList,
    /// Candidates whose geometry places them past the end of the disk.
    pub bad: PartitionList,
    pub interrupted: bool,
}

struct ScanState {
    found: PartitionList,
    bad: PartitionList,
    hints: HintQueue,
    raid_hints: HintQueue,
    /// Pending fast-forward target past a freshly found partition.
    jump: Option<u64>,
}

impl ScanState {
    /// Vet a probe hit and file it. Accepted candidates seed follow-up
    /// hints for the partitions that usually come right after them.
    fn accept(&mut self, disk: &Disk, opts: &ScanOptions, min: u64, max: u64, part: Partition) {
        if part.size <= 1 || part.offset < min || !disk.arch.is_known(&part) {
            return;
        }
        if !part.fs.is_raid_member() {
            seed_raid_hints(&part, &mut self.raid_hints);
        }
        if part.end() >= max {
            tracing::warn!(
                offset = part.offset,
                size = part.size,
                fs = ?part.fs,
                "partition extends past the end of the disk"
            );
            self.bad.insert(part);
            return;
        }
        let next = part.end() + 1;
        let offset = part.offset;
        let size = part.size;
        let fs = part.fs;
        if !self.found.insert(part) {
            return;
        }
        tracing::info!(offset, size, fs = ?fs, "partition found");
        let head = disk.head_size();
        self.hints.insert(next);
        self.hints.insert(next + head);
        let rounded = (next + head - 1) / head * head;
        self.hints.insert(rounded);
        self.hints.insert(rounded + head);
        if opts.fast_mode == 0 {
            self.jump = Some(self.jump.map_or(next, |j| j.max(next)));
        }
    }

    fn next_hint_after(&self, cursor: u64) -> Option<u64> {
        [self.hints.peek(), self.raid_hints.peek()]
            .into_iter()
            .flatten()
            .filter(|&h| h > cursor)
            .min()
    }
}

/// Queue the 0.90 superblock positions an MD member carrying this
/// partition could have, across member counts 1-6 and chunk-size
/// paddings up to the 4 MiB maximum. RAID members themselves never
/// seed further hypotheses.
pub(crate) fn seed_raid_hints(part: &Partition, queue: &mut HintQueue) {
    for disk_factor in (1..=6u64).rev() {
        for help_factor in 0..=(MD_MAX_CHUNK_SIZE / MD_RESERVED_BYTES + 3) {
            let padded = (part.size / disk_factor + help_factor * MD_RESERVED_BYTES)
                .saturating_sub(1)
                / MD_RESERVED_BYTES
                * MD_RESERVED_BYTES;
            let sb = md_new_size_sectors(padded / 512) * 512;
            queue.insert(part.offset + sb);
        }
    }
}

/// Scan the medium for partition signatures.
///
/// `known` seeds the hint queue with offsets from an existing table so
/// intact partitions are confirmed even when their location would not
/// pass the eligibility gates.
pub fn search_part(
    disk: &Disk,
    medium: &dyn BlockRead,
    chain: &ProbeChain,
    known: &PartitionList,
    opts: &ScanOptions,
    control: &mut dyn ControlSource,
    progress: Option<&dyn Fn(&ScanProgress)>,
) -> Result<ScanOutcome> {
    let ss = disk.sector_size as u64;
    let spt = disk.geometry.sectors_per_head;
    let hpc = disk.geometry.heads_per_cylinder;
    let min = disk.arch.min_search_location(disk);
    let max = disk.search_location_max();

    let mut state = ScanState {
        found: PartitionList::new(),
        bad: PartitionList::new(),
        hints: HintQueue::new(),
        raid_hints: HintQueue::new(),
        jump: None,
    };
    for part in known.iter() {
        state.hints.insert(part.offset);
    }
    disk.arch.placement_hints(disk, &mut state.hints);

    let mut interrupted = false;
    let mut stop_requested = false;
    let mut window = vec![0u8; WINDOW_SIZE];
    let mut cursor = min;

    tracing::info!(min, max, fast_mode = opts.fast_mode, "scan started");

    while cursor < max {
        match control.poll() {
            Control::Continue => {}
            Control::Quit => {
                interrupted = true;
                break;
            }
            Control::Stop => {
                interrupted = true;
                stop_requested = true;
                tracing::info!(cursor, "sequential scan stopped, visiting pending hints");
            }
            Control::Skip => {
                match state.next_hint_after(cursor) {
                    Some(h) => cursor = h,
                    None => break,
                }
                continue;
            }
            Control::SearchMore => {
                let step = ((max / 20).max(1024 * 1024)) / (1024 * 1024) * (1024 * 1024);
                cursor = cursor.saturating_add(step);
                continue;
            }
        }

        let mut search_now = false;
        let mut search_now_raid = false;
        while let Some(h) = state.hints.pop_if_due(cursor) {
            if h == cursor {
                search_now = true;
            }
        }
        while let Some(h) = state.raid_hints.pop_if_due(cursor) {
            if h == cursor {
                search_now_raid = true;
            }
        }

        if stop_requested && !search_now && !search_now_raid {
            match state.next_hint_after(cursor) {
                Some(h) => cursor = h,
                None => break,
            }
            continue;
        }

        if let Some(cb) = progress {
            if cursor % (1024 * 1024) < ss {
                cb(&ScanProgress {
                    cursor,
                    max,
                    found: state.found.len(),
                });
            }
        }

        let n = match medium.read_at(&mut window, cursor) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(offset = cursor, error = %e, "read failed");
                0
            }
        };
        if n < 512 {
            if cursor >= disk.real_size {
                // Nothing readable remains.
                break;
            }
            cursor += ss;
            continue;
        }
        let ctx = ProbeCtx {
            disk,
            medium,
            cursor,
            window: &window[..n],
        };

        let chs = disk.offset_to_chs(cursor);
        let chs_gates = matches!(disk.arch, Arch::I386 | Arch::Humax);
        let boundary = disk.arch.location_boundary(disk);
        let general_gate = if chs_gates {
            (chs.sector == 1 && (chs.head <= 2 || opts.fast_mode > 1))
                || cursor % (2048 * 512) == 0
        } else {
            cursor % boundary == 0
        };

        let mut candidate = Partition::new();

        // RAID members first: their superblock position is hint-driven,
        // a blind sweep only happens at the deepest search level.
        if search_now_raid || opts.fast_mode > 1 {
            if chain.raid.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        // Backup boot sectors at their characteristic in-volume phases.
        let fat_gate = if chs_gates {
            (chs.sector == 7 && (chs.head <= 2 || opts.fast_mode > 1))
                || cursor % (2048 * 512) == 6 * 512
        } else if matches!(disk.arch, Arch::Gpt) {
            cursor % (2048 * 512) == 6 * 512
        } else if matches!(disk.arch, Arch::None) {
            cursor == 6 * 512
        } else {
            cursor % boundary == 6 * 512
        };
        if fat_gate {
            candidate.reset();
            if chain.fat_backup.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        let exfat_gate = if chs_gates {
            (chs.sector == 13 && (chs.head <= 2 || opts.fast_mode > 1))
                || cursor % (2048 * 512) == 12 * ss
        } else if matches!(disk.arch, Arch::Gpt) {
            cursor % (2048 * 512) == 12 * 512
        } else {
            cursor % boundary == 12 * ss
        };
        if exfat_gate {
            candidate.reset();
            if chain.exfat_backup.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        // NTFS and HFS keep their backups in the last sector, which on
        // an aligned layout means the last sector of a cylinder.
        let chs_tail = chs_gates
            && chs.sector == spt
            && (chs.head == hpc - 1 || opts.fast_mode > 1);
        let ntfs_gate = if chs_gates {
            chs_tail || cursor % (2048 * 512) == 2047 * 512
        } else if matches!(disk.arch, Arch::Gpt) {
            cursor % (2048 * 512) == 2047 * 512
        } else {
            cursor > 0 && cursor % boundary == boundary - 512
        };
        if ntfs_gate {
            candidate.reset();
            if chain.ntfs_backup.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        let hfs_gate = if chs_gates {
            chs_tail || cursor % (2048 * 512) == 2047 * 512
        } else {
            cursor > 0 && cursor % boundary == boundary - 512
        };
        if hfs_gate {
            candidate.reset();
            if chain.hfs_backup.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        // ext backup superblocks of group 3, for 1/2/4 KiB blocks. The
        // gate asks whether the implied volume start would itself be an
        // eligible location.
        let ext_gate = (0..=2u32).any(|log| {
            let bs = 1024u64 << log;
            let hd_offset = 3 * bs * 8 * bs + if log == 0 { 1024 } else { 0 };
            if cursor < hd_offset {
                return false;
            }
            let start = cursor - hd_offset;
            if chs_gates {
                let s = disk.offset_to_chs(start);
                (s.sector == 1 && (s.head <= 2 || opts.fast_mode > 1))
                    || start % (2048 * 512) == 0
            } else {
                start % boundary == 0
            }
        });
        if ext_gate {
            candidate.reset();
            if chain.ext_backup.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                state.accept(disk, opts, min, max, candidate.clone());
            }
        }

        if search_now || general_gate {
            for probe in &chain.tables {
                candidate.reset();
                if probe.probe(&ctx, &mut candidate) == ProbeOutcome::Found {
                    if opts.verbose {
                        tracing::debug!(offset = cursor, probe = probe.name(), "signature hit");
                    }
                    state.accept(disk, opts, min, max, candidate.clone());
                }
            }
        }

        // Advance: one sector, or the fast-forward target, but let a
        // nearer hint win either way.
        let mut next = cursor + ss;
        if let Some(j) = state.jump.take() {
            next = next.max(j);
        }
        if let Some(h) = state.next_hint_after(cursor) {
            next = next.min(h);
        }
        cursor = next;
    }

    if opts.fast_mode > 0 && !interrupted {
        widen_ntfs_from_backup(disk, medium, &mut state.found);
    }

    tracing::info!(
        found = state.found.len(),
        bad = state.bad.len(),
        interrupted,
        "scan finished"
    );
    Ok(ScanOutcome {
        found: state.found,
        bad: state.bad,
        interrupted,
    })
}

/// A partition recovered from its backup boot sector may really start a
/// few sectors earlier. Probe up to 32 sectors before each such NTFS
/// candidate for a primary boot sector describing the same volume end.
fn widen_ntfs_from_backup(disk: &Disk, medium: &dyn BlockRead, found: &mut PartitionList) {
    let ss = disk.sector_size as u64;
    let backups: Vec<Partition> = found
        .iter()
        .filter(|p| p.fs == FsKind::Ntfs && p.sb_offset > 0)
        .cloned()
        .collect();
    let mut window = vec![0u8; WINDOW_SIZE];
    for part in backups {
        for k in (1..=32u64).rev() {
            let Some(loc) = part.offset.checked_sub(k * ss) else {
                continue;
            };
            let n = match medium.read_at(&mut window, loc) {
                Ok(n) if n >= 512 => n,
                _ => continue,
            };
            let ctx = ProbeCtx {
                disk,
                medium,
                cursor: loc,
                window: &window[..n],
            };
            let mut candidate = Partition::new();
            if NtfsPrimaryProbe.probe(&ctx, &mut candidate) == ProbeOutcome::Found
                && candidate.end() == part.end()
            {
                if found.insert(candidate) {
                    tracing::info!(
                        offset = loc,
                        sectors_before = k,
                        "NTFS volume widened from backup boot sector"
                    );
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ext::tests::ext_superblock;
    use crate::probes::fat::tests::fat32_boot_sector;
    use crate::probes::md::MD_MAGIC;
    use crate::probes::ntfs::tests::ntfs_boot_sector;

    fn test_disk(size: u64) -> Disk {
        Disk::new(size, size, 512, 255, 63, Arch::I386).unwrap()
    }

    fn scan(
        disk: &Disk,
        medium: &Vec<u8>,
        known: &PartitionList,
        fast_mode: u8,
    ) -> ScanOutcome {
        let chain = ProbeChain::default_chain();
        let opts = ScanOptions {
            fast_mode,
            verbose: false,
        };
        search_part(disk, medium, &chain, known, &opts, &mut NoControl, None).unwrap()
    }

    #[test]
    fn finds_fat32_at_classic_offset() {
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 63 * 512;
        medium[start..start + 512].copy_from_slice(&fat32_boot_sector(8192));

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        assert_eq!(outcome.found.len(), 1);
        let part = outcome.found.get(0).unwrap();
        assert_eq!(part.offset, start as u64);
        assert_eq!(part.size, 8192 * 512);
        assert_eq!(part.fs, FsKind::Fat32);
        assert!(outcome.bad.is_empty());
        assert!(!outcome.interrupted);
    }

    #[test]
    fn known_offset_is_probed_even_off_gate() {
        let size = 4 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        // Sector 1000 is neither cylinder-aligned nor MiB-aligned.
        let start = 1000 * 512;
        medium[start..start + 512].copy_from_slice(&fat32_boot_sector(4096));

        let blind = scan(&disk, &medium, &PartitionList::new(), 1);
        assert!(blind.found.is_empty());

        let mut known = PartitionList::new();
        let mut hint = Partition::new();
        hint.offset = start as u64;
        hint.size = 512;
        known.insert(hint);
        let outcome = scan(&disk, &medium, &known, 1);
        assert_eq!(outcome.found.len(), 1);
        assert_eq!(outcome.found.get(0).unwrap().offset, start as u64);
    }

    #[test]
    fn oversized_candidate_goes_to_bad_list() {
        let size = 4 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 63 * 512;
        // Claims 1 GiB on a 4 MiB disk.
        medium[start..start + 512].copy_from_slice(&ntfs_boot_sector(2 * 1024 * 1024));

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        assert!(outcome.found.is_empty());
        assert_eq!(outcome.bad.len(), 1);
        assert_eq!(outcome.bad.get(0).unwrap().offset, start as u64);
    }

    #[test]
    fn quit_aborts_immediately() {
        let size = 4 * 1024 * 1024u64;
        let disk = test_disk(size);
        let medium = vec![0u8; size as usize];
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Control::Quit).unwrap();
        let chain = ProbeChain::default_chain();
        let outcome = search_part(
            &disk,
            &medium,
            &chain,
            &PartitionList::new(),
            &ScanOptions::default(),
            &mut ChannelControl::new(rx),
            None,
        )
        .unwrap();
        assert!(outcome.interrupted);
        assert!(outcome.found.is_empty());
    }

    #[test]
    fn stop_still_visits_pending_hints() {
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 1000 * 512;
        medium[start..start + 512].copy_from_slice(&fat32_boot_sector(4096));

        let mut known = PartitionList::new();
        let mut hint = Partition::new();
        hint.offset = start as u64;
        hint.size = 512;
        known.insert(hint);

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Control::Stop).unwrap();
        let chain = ProbeChain::default_chain();
        let outcome = search_part(
            &disk,
            &medium,
            &chain,
            &known,
            &ScanOptions {
                fast_mode: 1,
                verbose: false,
            },
            &mut ChannelControl::new(rx),
            None,
        )
        .unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.found.len(), 1);
    }

    #[test]
    fn raid_hints_cover_the_single_member_superblock() {
        let mut part = Partition::new();
        part.offset = 1024 * 1024;
        part.size = 64 * 1024 * 1024;
        let mut queue = HintQueue::new();
        seed_raid_hints(&part, &mut queue);
        // One 64 MiB member: 0.90 superblock at MD_NEW_SIZE_SECTORS of
        // the member size.
        let expect = 1024 * 1024 + md_new_size_sectors(64 * 1024 * 1024 / 512) * 512;
        assert!(queue.contains(expect));
    }

    #[test]
    fn found_volume_seeds_hints_to_its_md_superblock() {
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 63 * 512;
        medium[start..start + 512].copy_from_slice(&fat32_boot_sector(8192));
        // The volume is the content of a single-member 0.90 array; its
        // superblock sits at the divisor-1 hypothesis position.
        let sb_at = start + 7936 * 512;
        medium[sb_at..sb_at + 4].copy_from_slice(&MD_MAGIC.to_le_bytes());
        medium[sb_at + 32..sb_at + 36].copy_from_slice(&4032u32.to_le_bytes());

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        assert_eq!(outcome.found.len(), 2);
        assert!(outcome
            .found
            .iter()
            .any(|p| p.fs == FsKind::MdRaid && p.offset == start as u64));
    }

    #[test]
    fn sub_sector_candidates_are_kept() {
        let disk = test_disk(8 * 1024 * 1024);
        let mut state = ScanState {
            found: PartitionList::new(),
            bad: PartitionList::new(),
            hints: HintQueue::new(),
            raid_hints: HintQueue::new(),
            jump: None,
        };
        let opts = ScanOptions {
            fast_mode: 1,
            verbose: false,
        };
        let mut part = Partition::new();
        part.offset = 63 * 512;
        part.size = 2;
        part.fs = FsKind::Ext;
        state.accept(&disk, &opts, 512, disk.search_location_max(), part);
        assert_eq!(state.found.len(), 1);
    }

    #[test]
    fn md_superblock_needs_a_hint_or_the_deepest_scan() {
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        // 1.2-style superblock 8 sectors into the member, sitting at a
        // location the general scan visits anyway.
        let sb_at = 63 * 512;
        medium[sb_at..sb_at + 4].copy_from_slice(&MD_MAGIC.to_le_bytes());
        medium[sb_at + 4..sb_at + 8].copy_from_slice(&1u32.to_le_bytes());
        medium[sb_at + 80..sb_at + 88].copy_from_slice(&2048u64.to_le_bytes());
        medium[sb_at + 128..sb_at + 136].copy_from_slice(&2048u64.to_le_bytes());
        medium[sb_at + 144..sb_at + 152].copy_from_slice(&8u64.to_le_bytes());

        let shallow = scan(&disk, &medium, &PartitionList::new(), 1);
        assert!(shallow.found.is_empty());

        let deep = scan(&disk, &medium, &PartitionList::new(), 2);
        assert!(deep
            .found
            .iter()
            .any(|p| p.fs == FsKind::MdRaid1 && p.offset == 55 * 512));
    }

    #[test]
    fn gpt_disks_probe_every_sector() {
        let size = 4 * 1024 * 1024u64;
        let disk = Disk::new(size, size, 512, 255, 63, Arch::Gpt).unwrap();
        let mut medium = vec![0u8; size as usize];
        // Sector 40 is past the GPT header area but off the MiB grid.
        let start = 40 * 512;
        medium[start..start + 512].copy_from_slice(&ntfs_boot_sector(2048));

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        assert_eq!(outcome.found.len(), 1);
        assert_eq!(outcome.found.get(0).unwrap().offset, start as u64);
    }

    #[test]
    fn ext_backup_recovers_a_vista_aligned_volume() {
        let size = 32 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 2048 * 512;
        // Group-3 backup superblock of a 1 KiB-block volume.
        let sb = ext_superblock(4096, 0, 3);
        let sb_at = start + (1 + 3 * 8 * 1024) * 1024;
        medium[sb_at..sb_at + 1024].copy_from_slice(&sb);

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        assert_eq!(outcome.found.len(), 1);
        let p = outcome.found.get(0).unwrap();
        assert_eq!(p.offset, start as u64);
        assert_eq!(p.fs, FsKind::Ext);
        assert_eq!(p.size, 4096 * 1024);
    }

    #[test]
    fn duplicate_detection_is_collapsed() {
        // The same FAT32 volume is visible through its primary boot
        // sector and through the backup at sector 6.
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 63 * 512;
        let sector = fat32_boot_sector(8192);
        medium[start..start + 512].copy_from_slice(&sector);
        medium[start + 6 * 512..start + 7 * 512].copy_from_slice(&sector);

        let outcome = scan(&disk, &medium, &PartitionList::new(), 1);
        let fat_parts: Vec<&Partition> = outcome
            .found
            .iter()
            .filter(|p| p.fs == FsKind::Fat32)
            .collect();
        assert_eq!(fat_parts.len(), 1);
    }

    #[test]
    fn fast_forward_skips_inside_found_partition() {
        let size = 8 * 1024 * 1024u64;
        let disk = test_disk(size);
        let mut medium = vec![0u8; size as usize];
        let start = 63 * 512;
        medium[start..start + 512].copy_from_slice(&fat32_boot_sector(8192));
        // A second volume hidden inside the first is skipped in fast
        // mode 0 but found in mode 1. Head 2 passes the eligibility
        // gate without being a seeded placement hint.
        let inner = 126 * 512;
        medium[inner..inner + 512].copy_from_slice(&ntfs_boot_sector(2047));

        let quick = scan(&disk, &medium, &PartitionList::new(), 0);
        assert_eq!(quick.found.len(), 1);
        let thorough = scan(&disk, &medium, &PartitionList::new(), 1);
        assert_eq!(thorough.found.len(), 2);
    }
}
