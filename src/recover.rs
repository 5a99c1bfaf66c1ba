//! Recovery orchestration: scan, reconcile, review, write.
//!
//! The outer loop mirrors how an operator actually works: scan, look at
//! the proposed structure, maybe deepen the search, maybe flip the
//! extended-partition policy, and only then commit a table. All
//! interaction points are behind [`RecoveryHooks`] so the engine runs
//! identically under a CLI, a test, or unattended.

use crate::arch::WriteStatus;
use crate::disk::{BlockRead, BlockWrite, Disk};
use crate::error::{RescueError, Result};
use crate::partition::PartitionList;
use crate::probe::ProbeChain;
use crate::reconcile::{align_structure, reduce, synthesize_extended, AlignUnit};
use crate::scanner::{search_part, ControlSource, ScanOptions, ScanProgress};
use humansize::{format_size, BINARY};

#[derive(Debug, Clone, Copy)]
pub struct RecoveryOptions {
    pub fast_mode: u8,
    pub align: AlignUnit,
    /// Start with the maximal extended-partition envelope.
    pub max_ext: bool,
    pub verbose: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            fast_mode: 1,
            align: AlignUnit::Auto,
            max_ext: false,
            verbose: false,
        }
    }
}

/// What to do with the proposed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Build the table bytes but leave the medium untouched.
    Simulate,
    Write,
    /// Deepen the search and scan again.
    BumpFastMode,
    /// Flip between the minimal and maximal extended envelope.
    ToggleExtended,
    /// Go back to reviewing the structure.
    ReviewAgain,
    Done,
}

/// Interaction seam for the recovery loop.
pub trait RecoveryHooks {
    /// Inspect and possibly edit the proposed structure. Returning
    /// `false` abandons recovery without writing.
    fn review(&mut self, _disk: &Disk, _list: &mut PartitionList) -> Result<bool> {
        Ok(true)
    }

    /// The reviewed structure failed validation. Return `true` to
    /// re-open review with the current list, `false` to abandon
    /// without writing.
    fn revise(&mut self, _err: &RescueError) -> bool {
        false
    }

    /// Decide what to do with the assembled table. `can_toggle` is true
    /// when the minimal and maximal extended envelopes differ.
    fn write_decision(
        &mut self,
        disk: &Disk,
        list: &PartitionList,
        can_toggle: bool,
    ) -> WriteDecision;

    /// Final confirmation before bytes hit the medium.
    fn confirm_write(&mut self) -> bool {
        false
    }
}

/// Unattended hooks: accept the structure as proposed; write only when
/// `commit` is set, otherwise simulate.
pub struct AutoHooks {
    pub commit: bool,
}

impl RecoveryHooks for AutoHooks {
    fn write_decision(
        &mut self,
        _disk: &Disk,
        _list: &PartitionList,
        _can_toggle: bool,
    ) -> WriteDecision {
        if self.commit {
            WriteDecision::Write
        } else {
            WriteDecision::Simulate
        }
    }

    fn confirm_write(&mut self) -> bool {
        self.commit
    }
}

#[derive(Debug)]
pub struct RecoveryOutcome {
    /// The final assembled table, ordered and with the extended
    /// container synthesized.
    pub table: PartitionList,
    /// Candidates rejected for extending past the end of the disk.
    pub bad: PartitionList,
    pub written: Option<WriteStatus>,
    pub interrupted: bool,
    /// Fast mode level the final scan ran at.
    pub fast_mode: u8,
    pub inferred_heads_per_cylinder: Option<u32>,
}

/// Head counts that actually shipped in translation setups.
const HEAD_CANDIDATES: [u32; 7] = [8, 16, 32, 64, 128, 240, 255];

/// Guess the heads-per-cylinder value the partitions were created
/// under, by scoring how many starts and ends fall on the cylinder
/// grid of each candidate geometry. Advisory only.
pub fn infer_heads_per_cylinder(disk: &Disk, list: &PartitionList) -> Option<u32> {
    if list.is_empty() {
        return None;
    }
    let ss = disk.sector_size as u64;
    let spt = disk.geometry.sectors_per_head as u64;
    let head = spt * ss;
    let mut best: Option<(u32, usize)> = None;
    for candidate in HEAD_CANDIDATES {
        let cyl = candidate as u64 * head;
        let score: usize = list
            .iter()
            .map(|p| {
                let mut s = 0;
                // Starts sit on a cylinder boundary, or one head in for
                // the historical boot-track offset.
                if p.offset % cyl == 0 || p.offset % cyl == head {
                    s += 1;
                }
                if (p.end() + 1) % cyl == 0 {
                    s += 1;
                }
                s
            })
            .sum();
        // A layout on a coarse cylinder grid also lands on every finer
        // grid, so ties go to the larger head count.
        if best.map_or(true, |(_, b)| score >= b) {
            best = Some((candidate, score));
        }
    }
    best.filter(|&(_, score)| score > 0).map(|(h, _)| h)
}

fn warn_geometry(disk: &Disk, list: &PartitionList) -> Option<u32> {
    let inferred = infer_heads_per_cylinder(disk, list)?;
    if inferred != disk.geometry.heads_per_cylinder {
        tracing::warn!(
            configured = disk.geometry.heads_per_cylinder,
            inferred,
            "partition layout fits a different head count; check the geometry"
        );
    }
    Some(inferred)
}

fn log_bad_list(disk: &Disk, bad: &PartitionList) {
    let Some(implied) = bad.iter().map(|p| p.offset + p.size).max() else {
        return;
    };
    tracing::warn!(
        configured = %format_size(disk.size, BINARY),
        needed = %format_size(implied, BINARY),
        "the disk seems too small; check the reported size"
    );
    for part in bad.iter() {
        tracing::warn!(
            offset = part.offset,
            size = part.size,
            fs = ?part.fs,
            "partition cannot be recovered at the current disk size"
        );
    }
}

fn report_backup_use(list: &PartitionList) {
    for part in list.iter().filter(|p| p.sb_offset > 0) {
        tracing::info!(
            offset = part.offset,
            fs = ?part.fs,
            backup_at = part.sb_offset,
            "partition recovered via backup sector; the primary copy is likely damaged"
        );
    }
}

/// Run the full recovery loop.
///
/// `known` seeds the scan with offsets from the existing table; `sink`
/// receives the table bytes if the hooks decide to write.
#[allow(clippy::too_many_arguments)]
pub fn interface_recovery(
    disk: &Disk,
    medium: &dyn BlockRead,
    known: &PartitionList,
    opts: &RecoveryOptions,
    control: &mut dyn ControlSource,
    progress: Option<&dyn Fn(&ScanProgress)>,
    hooks: &mut dyn RecoveryHooks,
    sink: &mut dyn BlockWrite,
) -> Result<RecoveryOutcome> {
    let chain = ProbeChain::default_chain();
    let mut fast_mode = opts.fast_mode;
    let mut max_ext = opts.max_ext;

    'search: loop {
        let scan_opts = ScanOptions {
            fast_mode,
            verbose: opts.verbose,
        };
        let outcome = search_part(disk, medium, &chain, known, &scan_opts, control, progress)?;
        let mut list = outcome.found.clone();

        let inferred = warn_geometry(disk, &list);
        log_bad_list(disk, &outcome.bad);
        report_backup_use(&list);
        align_structure(disk, &mut list, opts.align);
        disk.arch.init_structure(disk, &mut list);

        fn finish(
            table: PartitionList,
            bad: &PartitionList,
            written: Option<WriteStatus>,
            interrupted: bool,
            fast_mode: u8,
            inferred: Option<u32>,
        ) -> RecoveryOutcome {
            RecoveryOutcome {
                table,
                bad: bad.clone(),
                written,
                interrupted,
                fast_mode,
                inferred_heads_per_cylinder: inferred,
            }
        }

        loop {
            if !hooks.review(disk, &mut list)? {
                tracing::info!("recovery abandoned during review");
                return Ok(finish(list, &outcome.bad, None, outcome.interrupted, fast_mode, inferred));
            }
            if let Err(e) = disk.arch.test_structure(&list) {
                tracing::warn!(error = %e, "proposed structure is not writable");
                if hooks.revise(&e) {
                    continue;
                }
                return Ok(finish(list, &outcome.bad, None, outcome.interrupted, fast_mode, inferred));
            }

            reduce(&mut list);
            list.sort();

            // Synthesize both envelopes once to learn whether the
            // choice matters at all.
            let can_toggle = {
                let mut narrow = list.clone();
                let mut wide = list.clone();
                let a = synthesize_extended(disk, &mut narrow, false);
                let b = synthesize_extended(disk, &mut wide, true);
                a.is_some() && a != b
            };

            loop {
                let mut table = list.clone();
                synthesize_extended(disk, &mut table, max_ext);
                disk.arch.init_partition_order(&mut table);

                match hooks.write_decision(disk, &table, can_toggle) {
                    WriteDecision::Simulate => {
                        match disk.arch.write_table(disk, &table, sink, true) {
                            Ok(status) => return Ok(finish(table, &outcome.bad, Some(status), outcome.interrupted, fast_mode, inferred)),
                            Err(RescueError::UnsupportedWrite(arch)) => {
                                tracing::warn!(?arch, "table writing is not supported here");
                                return Ok(finish(table, &outcome.bad, None, outcome.interrupted, fast_mode, inferred));
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    WriteDecision::Write => {
                        if !hooks.confirm_write() {
                            tracing::info!("write not confirmed");
                            return Ok(finish(table, &outcome.bad, None, outcome.interrupted, fast_mode, inferred));
                        }
                        let status = disk.arch.write_table(disk, &table, sink, false)?;
                        return Ok(finish(table, &outcome.bad, Some(status), outcome.interrupted, fast_mode, inferred));
                    }
                    WriteDecision::BumpFastMode => {
                        let bumped = (fast_mode + 1).min(2);
                        if bumped == fast_mode {
                            tracing::info!("search depth already at maximum");
                            return Ok(finish(table, &outcome.bad, None, outcome.interrupted, fast_mode, inferred));
                        }
                        fast_mode = bumped;
                        tracing::info!(fast_mode, "scanning again at greater depth");
                        continue 'search;
                    }
                    WriteDecision::ToggleExtended => {
                        max_ext = !max_ext;
                        tracing::info!(max_ext, "extended envelope toggled");
                    }
                    WriteDecision::ReviewAgain => break,
                    WriteDecision::Done => return Ok(finish(table, &outcome.bad, None, outcome.interrupted, fast_mode, inferred)),
                }
            }
        }
    }
}

/// `dmsetup`-compatible linear mapping lines for read-only access to
/// the found partitions without touching the table.
pub fn dmsetup_lines(disk: &Disk, device: &str, list: &PartitionList) -> Vec<String> {
    let ss = disk.sector_size as u64;
    list.iter()
        .filter(|p| p.size >= ss)
        .map(|p| format!("0 {} linear {} {}", p.size / ss, device, p.offset / ss))
        .collect()
}
