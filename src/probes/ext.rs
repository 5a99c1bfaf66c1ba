//! ext2/3/4 superblock detection.
//!
//! Backup superblocks are stored at the start of selected block groups.
//! The backup records which group it belongs to, so the volume start
//! can be computed from any of them.

use crate::partition::{FsKind, Partition};
use crate::probe::{le16, le32, ProbeCtx, ProbeOutcome, SignatureProbe};

pub const EXT2_MAGIC: u16 = 0xEF53;

pub(crate) struct ExtSuperblock {
    pub blocks_count: u64,
    pub first_data_block: u64,
    pub log_block_size: u32,
    pub blocks_per_group: u64,
    pub block_group_nr: u16,
}

impl ExtSuperblock {
    pub fn block_size(&self) -> u64 {
        1024u64 << self.log_block_size
    }
}

pub(crate) fn parse_superblock(buf: &[u8]) -> Option<ExtSuperblock> {
    if le16(buf, 56)? != EXT2_MAGIC {
        return None;
    }
    let log_block_size = le32(buf, 24)?;
    // Scanning only considers 1, 2 and 4 KiB blocks.
    if log_block_size > 2 {
        return None;
    }
    let sb = ExtSuperblock {
        blocks_count: le32(buf, 4)? as u64,
        first_data_block: le32(buf, 20)? as u64,
        log_block_size,
        blocks_per_group: le32(buf, 32)? as u64,
        block_group_nr: le16(buf, 90)?,
    };
    if sb.blocks_count == 0 || sb.blocks_per_group == 0 {
        return None;
    }
    Some(sb)
}

pub struct ExtBackupProbe;

impl SignatureProbe for ExtBackupProbe {
    fn name(&self) -> &'static str {
        "ext-backup"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some(sb) = parse_superblock(ctx.window) else {
            return ProbeOutcome::Declined;
        };
        if sb.block_group_nr == 0 {
            return ProbeOutcome::Declined;
        }
        let bs = sb.block_size();
        let span = (sb.first_data_block + sb.block_group_nr as u64 * sb.blocks_per_group) * bs;
        let Some(offset) = ctx.cursor.checked_sub(span) else {
            return ProbeOutcome::Declined;
        };
        part.offset = offset;
        part.size = sb.blocks_count * bs;
        part.fs = FsKind::Ext;
        part.type_code = 0x83;
        part.sb_offset = span;
        tracing::debug!(
            offset = part.offset,
            size = part.size,
            group = sb.block_group_nr,
            "ext backup superblock"
        );
        ProbeOutcome::Found
    }
}

/// Primary superblock 1024 bytes into the volume; used from the table
/// probe set.
pub struct ExtPrimaryProbe;

impl SignatureProbe for ExtPrimaryProbe {
    fn name(&self) -> &'static str {
        "ext"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some(at) = ctx.window.get(1024..) else {
            return ProbeOutcome::Declined;
        };
        let Some(sb) = parse_superblock(at) else {
            return ProbeOutcome::Declined;
        };
        if sb.block_group_nr != 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = sb.blocks_count * sb.block_size();
        part.fs = FsKind::Ext;
        part.type_code = 0x83;
        ProbeOutcome::Found
    }
}
