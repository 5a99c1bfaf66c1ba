//! Linux MD software-RAID member detection.
//!
//! Version 0.90 superblocks sit near the end of the member device at a
//! 64 KiB-aligned position; version 1.x records its own position in the
//! `super_offset` field. Both let us walk back to the member start.

use crate::partition::{FsKind, Partition};
use crate::probe::{be32, le32, le64, ProbeCtx, ProbeOutcome, SignatureProbe};

pub const MD_MAGIC: u32 = 0xa92b_4efc;
/// Space reserved for the superblock at the end of a 0.90 member.
pub const MD_RESERVED_BYTES: u64 = 64 * 1024;
pub const MD_RESERVED_SECTORS: u64 = MD_RESERVED_BYTES / 512;
/// Largest chunk size mdadm accepts.
pub const MD_MAX_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Sector position of a 0.90 superblock on a member of `sectors`
/// sectors: round down to 64 KiB, then step back one reservation.
pub fn md_new_size_sectors(sectors: u64) -> u64 {
    (sectors & !(MD_RESERVED_SECTORS - 1)).saturating_sub(MD_RESERVED_SECTORS)
}

pub struct MdRaidProbe;

impl SignatureProbe for MdRaidProbe {
    fn name(&self) -> &'static str {
        "md-raid"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        let Some(magic) = le32(buf, 0) else {
            return ProbeOutcome::Declined;
        };
        if magic == MD_MAGIC {
            let major = le32(buf, 4).unwrap_or(u32::MAX);
            match major {
                0 => self.recover_0_90(ctx, part, false),
                1 => self.recover_1_x(ctx, part),
                _ => ProbeOutcome::Declined,
            }
        } else if magic.swap_bytes() == MD_MAGIC {
            // Superblock written on a big-endian host.
            if be32(buf, 4) == Some(0) {
                self.recover_0_90(ctx, part, true)
            } else {
                ProbeOutcome::Declined
            }
        } else {
            ProbeOutcome::Declined
        }
    }
}

impl MdRaidProbe {
    fn recover_0_90(
        &self,
        ctx: &ProbeCtx<'_>,
        part: &mut Partition,
        big_endian: bool,
    ) -> ProbeOutcome {
        let read: fn(&[u8], usize) -> Option<u32> = if big_endian { be32 } else { le32 };
        // Per-device data size in KiB.
        let Some(size_kib) = read(ctx.window, 32) else {
            return ProbeOutcome::Declined;
        };
        if size_kib == 0 {
            return ProbeOutcome::Declined;
        }
        let data_bytes = size_kib as u64 * 1024;
        let sb_offset = md_new_size_sectors(data_bytes / 512) * 512;
        if sb_offset > ctx.cursor {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor - sb_offset;
        part.size = sb_offset + MD_RESERVED_BYTES;
        part.fs = FsKind::MdRaid;
        part.type_code = 0xFD;
        tracing::debug!(
            offset = part.offset,
            size = part.size,
            big_endian,
            "md 0.90 superblock"
        );
        ProbeOutcome::Found
    }

    fn recover_1_x(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        let (Some(size), Some(data_offset), Some(super_offset)) =
            (le64(buf, 80), le64(buf, 128), le64(buf, 144))
        else {
            return ProbeOutcome::Declined;
        };
        if size == 0 {
            return ProbeOutcome::Declined;
        }
        let sb_offset = super_offset * 512;
        if sb_offset > ctx.cursor {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor - sb_offset;
        // Metadata 1.0 lives past the data area; 1.1/1.2 before it.
        let member_sectors = (data_offset + size).max(super_offset + 16);
        part.size = member_sectors * 512;
        part.fs = FsKind::MdRaid1;
        part.type_code = 0xFD;
        tracing::debug!(offset = part.offset, size = part.size, "md 1.x superblock");
        ProbeOutcome::Found
    }
}
