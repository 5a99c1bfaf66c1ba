//! FAT32 backup boot sector detection.
//!
//! FAT32 keeps a copy of the boot sector at sector 6 of the volume.
//! When the window lands on that copy, the volume start is six sectors
//! back from the probed location.

use crate::partition::{FsKind, Partition};
use crate::probe::{le16, le32, ProbeCtx, ProbeOutcome, SignatureProbe};

/// Volume-relative sector of the FAT32 boot sector copy.
pub const FAT32_BACKUP_SECTOR: u64 = 6;

pub struct FatBackupProbe;

impl SignatureProbe for FatBackupProbe {
    fn name(&self) -> &'static str {
        "fat32-backup"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if !fat_boot_sector_shape(buf) {
            return ProbeOutcome::Declined;
        }
        if buf.get(82..87) != Some(b"FAT32") {
            return ProbeOutcome::Declined;
        }
        let Some(bps) = le16(buf, 11).map(u64::from) else {
            return ProbeOutcome::Declined;
        };
        if !bps.is_power_of_two() || !(512..=4096).contains(&bps) {
            return ProbeOutcome::Declined;
        }
        let Some(total) = le32(buf, 32).map(u64::from) else {
            return ProbeOutcome::Declined;
        };
        if total == 0 {
            return ProbeOutcome::Declined;
        }
        let backup_span = FAT32_BACKUP_SECTOR * bps;
        if backup_span > ctx.cursor {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor - backup_span;
        part.size = total * bps;
        part.fs = FsKind::Fat32;
        part.type_code = 0x0C;
        part.sb_offset = backup_span;
        tracing::debug!(offset = part.offset, size = part.size, "FAT32 backup boot sector");
        ProbeOutcome::Found
    }
}

/// Common boot-sector plausibility: x86 jump opcode and the 0xAA55 tag.
pub(crate) fn fat_boot_sector_shape(buf: &[u8]) -> bool {
    if buf.len() < 512 {
        return false;
    }
    let jump_ok = buf[0] == 0xEB || buf[0] == 0xE9;
    jump_ok && buf[510] == 0x55 && buf[511] == 0xAA
}
