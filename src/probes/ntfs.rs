//! NTFS boot sector detection, primary and backup.
//!
//! NTFS stores a copy of its boot sector in the very last sector of the
//! volume, one past the sector count the boot sector itself records.
//! A hit on the backup therefore places the volume start at
//! `cursor + bps - size`.

use crate::partition::{FsKind, Partition};
use crate::probe::{le16, le64, ProbeCtx, ProbeOutcome, SignatureProbe};

/// Parse an NTFS boot sector, returning (bytes per sector, volume size
/// in bytes including the backup sector).
pub(crate) fn parse_boot_sector(buf: &[u8]) -> Option<(u64, u64)> {
    if buf.len() < 512 || buf.get(3..11) != Some(b"NTFS    ") {
        return None;
    }
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return None;
    }
    let bps = le16(buf, 11)? as u64;
    if !bps.is_power_of_two() || !(256..=4096).contains(&bps) {
        return None;
    }
    let total_sectors = le64(buf, 40)?;
    if total_sectors == 0 {
        return None;
    }
    // The recorded count excludes the backup sector.
    Some((bps, (total_sectors + 1) * bps))
}

pub struct NtfsBackupProbe;

impl SignatureProbe for NtfsBackupProbe {
    fn name(&self) -> &'static str {
        "ntfs-backup"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some((bps, size)) = parse_boot_sector(ctx.window) else {
            return ProbeOutcome::Declined;
        };
        let Some(offset) = (ctx.cursor + bps).checked_sub(size) else {
            return ProbeOutcome::Declined;
        };
        part.offset = offset;
        part.size = size;
        part.fs = FsKind::Ntfs;
        part.type_code = 0x07;
        part.sb_offset = size - bps;
        tracing::debug!(offset = part.offset, size = part.size, "NTFS backup boot sector");
        ProbeOutcome::Found
    }
}

/// Primary NTFS boot sector at the probed location; used from the table
/// probe set and by the backup-widening pass.
pub struct NtfsPrimaryProbe;

impl SignatureProbe for NtfsPrimaryProbe {
    fn name(&self) -> &'static str {
        "ntfs"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some((_, size)) = parse_boot_sector(ctx.window) else {
            return ProbeOutcome::Declined;
        };
        part.offset = ctx.cursor;
        part.size = size;
        part.fs = FsKind::Ntfs;
        part.type_code = 0x07;
        ProbeOutcome::Found
    }
}
