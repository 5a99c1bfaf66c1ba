//! Signature probe seam.
//!
//! A probe inspects a window of raw bytes and, on a match, fills in a
//! partition candidate: start offset, size, filesystem tag and table
//! type code. Probes never allocate and never write; extra reads (for
//! structures outside the window) go through the shared medium handle.

use crate::disk::{BlockRead, Disk};
use crate::partition::Partition;

/// Bytes read per probe window: 16 sectors at the classic sector size.
pub const WINDOW_SIZE: usize = 16 * 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found,
    Declined,
}

/// Everything a probe may look at: the window, where it was read from,
/// and the medium for out-of-window confirmation reads.
pub struct ProbeCtx<'a> {
    pub disk: &'a Disk,
    pub medium: &'a dyn BlockRead,
    /// Absolute offset of `window[0]`.
    pub cursor: u64,
    pub window: &'a [u8],
}

pub trait SignatureProbe {
    fn name(&self) -> &'static str;

    /// Inspect the window. On `Found`, `part` carries the candidate
    /// with its status still `Deleted`; the scanner decides acceptance.
    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome;
}

/// Little-endian field readers, bounds-checked against the window.
pub(crate) fn le16(buf: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes(buf.get(off..off + 2)?.try_into().ok()?))
}

pub(crate) fn le32(buf: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes(buf.get(off..off + 4)?.try_into().ok()?))
}

pub(crate) fn le64(buf: &[u8], off: usize) -> Option<u64> {
    Some(u64::from_le_bytes(buf.get(off..off + 8)?.try_into().ok()?))
}

pub(crate) fn be16(buf: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_be_bytes(buf.get(off..off + 2)?.try_into().ok()?))
}

pub(crate) fn be32(buf: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_be_bytes(buf.get(off..off + 4)?.try_into().ok()?))
}

pub(crate) fn be64(buf: &[u8], off: usize) -> Option<u64> {
    Some(u64::from_be_bytes(buf.get(off..off + 8)?.try_into().ok()?))
}

/// The probe set run at each eligible location, in priority order. The
/// staged probes fire only when the cursor satisfies their placement
/// gate; the table probes run at every location that passed the
/// architecture gate.
pub struct ProbeChain {
    pub raid: Box<dyn SignatureProbe>,
    pub fat_backup: Box<dyn SignatureProbe>,
    pub exfat_backup: Box<dyn SignatureProbe>,
    pub ntfs_backup: Box<dyn SignatureProbe>,
    pub hfs_backup: Box<dyn SignatureProbe>,
    pub ext_backup: Box<dyn SignatureProbe>,
    pub tables: Vec<Box<dyn SignatureProbe>>,
}

impl ProbeChain {
    /// The full built-in chain.
    pub fn default_chain() -> Self {
        use crate::probes::{
            exfat::ExfatBackupProbe, ext::ExtBackupProbe, fat::FatBackupProbe,
            hfs::HfsBackupProbe, md::MdRaidProbe, ntfs::NtfsBackupProbe, table,
        };
        Self {
            raid: Box::new(MdRaidProbe),
            fat_backup: Box::new(FatBackupProbe),
            exfat_backup: Box::new(ExfatBackupProbe),
            ntfs_backup: Box::new(NtfsBackupProbe),
            hfs_backup: Box::new(HfsBackupProbe),
            ext_backup: Box::new(ExtBackupProbe),
            tables: table::default_table_probes(),
        }
    }
}

impl Default for ProbeChain {
    fn default() -> Self {
        Self::default_chain()
    }
}
