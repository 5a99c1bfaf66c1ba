//! exFAT backup boot sector detection.
//!
//! exFAT mirrors its first twelve sectors starting at volume sector 12,
//! so a hit there walks back twelve sectors to the volume start.

use crate::partition::{FsKind, Partition};
use crate::probe::{le64, ProbeCtx, ProbeOutcome, SignatureProbe};

/// Volume-relative sector of the boot-region copy.
pub const EXFAT_BACKUP_SECTOR: u64 = 12;

pub struct ExfatBackupProbe;

impl SignatureProbe for ExfatBackupProbe {
    fn name(&self) -> &'static str {
        "exfat-backup"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if buf.len() < 512 || buf.get(3..11) != Some(b"EXFAT   ") {
            return ProbeOutcome::Declined;
        }
        if buf[510] != 0x55 || buf[511] != 0xAA {
            return ProbeOutcome::Declined;
        }
        let shift = buf[108] as u32;
        if !(9..=12).contains(&shift) {
            return ProbeOutcome::Declined;
        }
        let bps = 1u64 << shift;
        let Some(volume_length) = le64(buf, 72) else {
            return ProbeOutcome::Declined;
        };
        if volume_length == 0 {
            return ProbeOutcome::Declined;
        }
        let backup_span = EXFAT_BACKUP_SECTOR * bps;
        if backup_span > ctx.cursor {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor - backup_span;
        part.size = volume_length * bps;
        part.fs = FsKind::Exfat;
        part.type_code = 0x07;
        part.sb_offset = backup_span;
        tracing::debug!(offset = part.offset, size = part.size, "exFAT backup boot sector");
        ProbeOutcome::Found
    }
}
