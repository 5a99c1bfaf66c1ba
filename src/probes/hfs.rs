//! HFS and HFS+ volume header detection.
//!
//! The primary header (HFS+ volume header, or the classic HFS master
//! directory block) sits 1024 bytes into the volume; an alternate copy
//! sits 1024 bytes before the volume end. A hit on the alternate places
//! the volume end just past the probed header.

use crate::partition::{FsKind, Partition};
use crate::probe::{be16, be32, ProbeCtx, ProbeOutcome, SignatureProbe};

/// Parse an HFS+ (`H+`/`HX`) volume header or a classic HFS (`BD`)
/// master directory block at `at`, returning the volume size in bytes
/// and the filesystem flavor. All fields are big-endian.
pub(crate) fn parse_volume_header(buf: &[u8], at: usize) -> Option<(u64, FsKind)> {
    let sig = buf.get(at..at + 2)?;
    if sig == b"H+" || sig == b"HX" {
        let version = buf.get(at + 3)?;
        if !(4..=5).contains(version) {
            return None;
        }
        let block_size = be32(buf, at + 40)? as u64;
        if !block_size.is_power_of_two() || block_size < 512 {
            return None;
        }
        let total_blocks = be32(buf, at + 44)? as u64;
        if total_blocks == 0 {
            return None;
        }
        return Some((block_size * total_blocks, FsKind::HfsPlus));
    }
    if sig == b"BD" {
        let block_size = be32(buf, at + 20)? as u64;
        if block_size == 0 || block_size % 512 != 0 {
            return None;
        }
        let alloc_blocks = be16(buf, at + 18)? as u64;
        if alloc_blocks == 0 {
            return None;
        }
        let first_alloc_sector = be16(buf, at + 28)? as u64;
        // The two trailing sectors hold the alternate MDB and a spare.
        let size = (first_alloc_sector + alloc_blocks * (block_size / 512) + 2) * 512;
        return Some((size, FsKind::Hfs));
    }
    None
}

pub struct HfsBackupProbe;

impl SignatureProbe for HfsBackupProbe {
    fn name(&self) -> &'static str {
        "hfs-alternate"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some((size, fs)) = parse_volume_header(ctx.window, 0) else {
            return ProbeOutcome::Declined;
        };
        // Alternate header occupies [size - 1024, size - 512).
        let Some(offset) = (ctx.cursor + 1024).checked_sub(size) else {
            return ProbeOutcome::Declined;
        };
        part.offset = offset;
        part.size = size;
        part.fs = fs;
        part.type_code = 0xAF;
        part.sb_offset = size - 1024;
        tracing::debug!(offset = part.offset, size = part.size, "HFS alternate volume header");
        ProbeOutcome::Found
    }
}
