//! Primary-structure probes run at every eligible location.
//!
//! Each probe recognizes a filesystem by the structure it keeps at (or
//! near) the volume start. The set is ordered so that the cheapest and
//! most distinctive checks run first.

use crate::partition::{FsKind, Partition};
use crate::probe::{be32, be64, le16, le32, le64, ProbeCtx, ProbeOutcome, SignatureProbe};
use crate::probes::exfat::ExfatBackupProbe;
use crate::probes::ext::ExtPrimaryProbe;
use crate::probes::fat::fat_boot_sector_shape;
use crate::probes::hfs::parse_volume_header;
use crate::probes::ntfs::NtfsPrimaryProbe;

/// The built-in ordering used by [`crate::probe::ProbeChain`].
pub fn default_table_probes() -> Vec<Box<dyn SignatureProbe>> {
    vec![
        Box::new(NtfsPrimaryProbe),
        Box::new(FatPrimaryProbe),
        Box::new(ExfatPrimaryProbe),
        Box::new(ExtPrimaryProbe),
        Box::new(HfsPrimaryProbe),
        Box::new(SwapProbe),
        Box::new(LvmPvProbe),
        Box::new(XfsProbe),
        Box::new(BsdDisklabelProbe),
        Box::new(Iso9660Probe),
    ]
}

/// FAT12/16/32 boot sector at the volume start.
pub struct FatPrimaryProbe;

impl SignatureProbe for FatPrimaryProbe {
    fn name(&self) -> &'static str {
        "fat"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if !fat_boot_sector_shape(buf) {
            return ProbeOutcome::Declined;
        }
        let Some(bps) = le16(buf, 11).map(u64::from) else {
            return ProbeOutcome::Declined;
        };
        if !bps.is_power_of_two() || !(512..=4096).contains(&bps) {
            return ProbeOutcome::Declined;
        }
        let (fs, type_code) = if buf.get(82..87) == Some(b"FAT32") {
            (FsKind::Fat32, 0x0C)
        } else if buf.get(54..59) == Some(b"FAT16") {
            (FsKind::Fat16, 0x06)
        } else if buf.get(54..59) == Some(b"FAT12") {
            (FsKind::Fat12, 0x01)
        } else {
            return ProbeOutcome::Declined;
        };
        let total16 = le16(buf, 19).unwrap_or(0) as u64;
        let total = if total16 != 0 {
            total16
        } else {
            le32(buf, 32).unwrap_or(0) as u64
        };
        if total == 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = total * bps;
        part.fs = fs;
        part.type_code = type_code;
        ProbeOutcome::Found
    }
}

/// exFAT boot sector at the volume start. Reuses the backup parser but
/// anchors the partition at the probed location.
pub struct ExfatPrimaryProbe;

impl SignatureProbe for ExfatPrimaryProbe {
    fn name(&self) -> &'static str {
        "exfat"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        // Probe as if this were the backup, then re-anchor.
        let shifted = ProbeCtx {
            disk: ctx.disk,
            medium: ctx.medium,
            cursor: ctx.cursor + 12 * sector_size_of(ctx.window),
            window: ctx.window,
        };
        if ExfatBackupProbe.probe(&shifted, part) == ProbeOutcome::Declined {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.sb_offset = 0;
        ProbeOutcome::Found
    }
}

fn sector_size_of(window: &[u8]) -> u64 {
    window.get(108).map_or(512, |&shift| 1u64 << shift.clamp(9, 12))
}

/// HFS or HFS+ primary header 1024 bytes in.
pub struct HfsPrimaryProbe;

impl SignatureProbe for HfsPrimaryProbe {
    fn name(&self) -> &'static str {
        "hfs"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let Some((size, fs)) = parse_volume_header(ctx.window, 1024) else {
            return ProbeOutcome::Declined;
        };
        part.offset = ctx.cursor;
        part.size = size;
        part.fs = fs;
        part.type_code = 0xAF;
        ProbeOutcome::Found
    }
}

/// Linux swap area, version 1 header with a 4 KiB page.
pub struct SwapProbe;

const SWAP_PAGE: u64 = 4096;

impl SignatureProbe for SwapProbe {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        let tag_at = SWAP_PAGE as usize - 10;
        let Some(tag) = buf.get(tag_at..tag_at + 10) else {
            return ProbeOutcome::Declined;
        };
        if tag != b"SWAPSPACE2" && tag != b"SWAP-SPACE" {
            return ProbeOutcome::Declined;
        }
        let Some(last_page) = le32(buf, 1028).map(u64::from) else {
            return ProbeOutcome::Declined;
        };
        part.offset = ctx.cursor;
        part.size = if tag == b"SWAPSPACE2" && last_page > 0 {
            (last_page + 1) * SWAP_PAGE
        } else {
            SWAP_PAGE
        };
        part.fs = FsKind::Swap;
        part.type_code = 0x82;
        ProbeOutcome::Found
    }
}

/// LVM2 physical volume label in sector 1.
pub struct LvmPvProbe;

impl SignatureProbe for LvmPvProbe {
    fn name(&self) -> &'static str {
        "lvm2-pv"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if buf.get(512..520) != Some(b"LABELONE") {
            return ProbeOutcome::Declined;
        }
        if buf.get(536..544) != Some(b"LVM2 001") {
            return ProbeOutcome::Declined;
        }
        // label_header is 32 bytes, pv_header starts with a 32-byte uuid.
        let Some(device_size) = le64(buf, 512 + 32 + 32) else {
            return ProbeOutcome::Declined;
        };
        if device_size == 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = device_size;
        part.fs = FsKind::LvmPv;
        part.type_code = 0x8E;
        ProbeOutcome::Found
    }
}

/// XFS superblock at the volume start. Fields are big-endian.
pub struct XfsProbe;

impl SignatureProbe for XfsProbe {
    fn name(&self) -> &'static str {
        "xfs"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if buf.get(0..4) != Some(b"XFSB") {
            return ProbeOutcome::Declined;
        }
        let (Some(block_size), Some(dblocks)) = (be32(buf, 4), be64(buf, 8)) else {
            return ProbeOutcome::Declined;
        };
        let block_size = block_size as u64;
        if !block_size.is_power_of_two() || !(512..=65536).contains(&block_size) || dblocks == 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = block_size * dblocks;
        part.fs = FsKind::Xfs;
        part.type_code = 0x83;
        ProbeOutcome::Found
    }
}

/// BSD disklabel in sector 1 of the slice.
pub struct BsdDisklabelProbe;

const DISKLABEL_MAGIC: u32 = 0x8256_4557;

impl SignatureProbe for BsdDisklabelProbe {
    fn name(&self) -> &'static str {
        "bsd-disklabel"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let buf = ctx.window;
        if le32(buf, 512) != Some(DISKLABEL_MAGIC) || le32(buf, 512 + 132) != Some(DISKLABEL_MAGIC)
        {
            return ProbeOutcome::Declined;
        }
        let (Some(secsize), Some(secperunit)) = (le32(buf, 512 + 40), le32(buf, 512 + 60)) else {
            return ProbeOutcome::Declined;
        };
        if secsize == 0 || secperunit == 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = secsize as u64 * secperunit as u64;
        part.fs = FsKind::BsdDisklabel;
        part.type_code = 0xA5;
        ProbeOutcome::Found
    }
}

/// ISO9660 primary volume descriptor, 32 KiB into the volume. The
/// descriptor is outside the window, so this probe reads it itself.
pub struct Iso9660Probe;

impl SignatureProbe for Iso9660Probe {
    fn name(&self) -> &'static str {
        "iso9660"
    }

    fn probe(&self, ctx: &ProbeCtx<'_>, part: &mut Partition) -> ProbeOutcome {
        let mut pvd = [0u8; 2048];
        let n = match ctx.medium.read_at(&mut pvd, ctx.cursor + 32768) {
            Ok(n) => n,
            Err(_) => return ProbeOutcome::Declined,
        };
        if n < 2048 || pvd[0] != 1 || &pvd[1..6] != b"CD001" {
            return ProbeOutcome::Declined;
        }
        let Some(space) = le32(&pvd, 80).map(u64::from) else {
            return ProbeOutcome::Declined;
        };
        if space == 0 {
            return ProbeOutcome::Declined;
        }
        part.offset = ctx.cursor;
        part.size = space * 2048;
        part.fs = FsKind::Iso9660;
        part.type_code = 0x96;
        ProbeOutcome::Found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::disk::Disk;
    use crate::probes::fat::tests::fat32_boot_sector;

    fn test_disk() -> Disk {
        Disk::new(64 * 1024 * 1024, 64 * 1024 * 1024, 512, 255, 63, Arch::I386).unwrap()
    }

    fn run(probe: &dyn SignatureProbe, medium: &Vec<u8>, cursor: u64, window: &[u8]) -> (ProbeOutcome, Partition) {
        let disk = test_disk();
        let mut part = Partition::new();
        let ctx = ProbeCtx {
            disk: &disk,
            medium,
            cursor,
            window,
        };
        (probe.probe(&ctx, &mut part), part)
    }

    #[test]
    fn fat32_primary_at_cursor() {
        let mut window = vec![0u8; 8192];
        window[..512].copy_from_slice(&fat32_boot_sector(20480));
        let (outcome, part) = run(&FatPrimaryProbe, &Vec::new(), 63 * 512, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.offset, 63 * 512);
        assert_eq!(part.size, 20480 * 512);
        assert_eq!(part.fs, FsKind::Fat32);
    }

    #[test]
    fn fat16_uses_16_bit_total_when_set() {
        let mut window = vec![0u8; 8192];
        window[..512].copy_from_slice(&fat32_boot_sector(0));
        window[82..87].copy_from_slice(b"     ");
        window[54..59].copy_from_slice(b"FAT16");
        window[19..21].copy_from_slice(&32768u16.to_le_bytes());
        let (outcome, part) = run(&FatPrimaryProbe, &Vec::new(), 0, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 32768 * 512);
        assert_eq!(part.fs, FsKind::Fat16);
        assert_eq!(part.type_code, 0x06);
    }

    #[test]
    fn swap_v2_size_from_last_page() {
        let mut window = vec![0u8; 8192];
        window[4096 - 10..4096].copy_from_slice(b"SWAPSPACE2");
        window[1028..1032].copy_from_slice(&1023u32.to_le_bytes());
        let (outcome, part) = run(&SwapProbe, &Vec::new(), 1024 * 1024, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 1024 * 4096);
        assert_eq!(part.type_code, 0x82);
    }

    #[test]
    fn lvm_pv_size_from_header() {
        let mut window = vec![0u8; 8192];
        window[512..520].copy_from_slice(b"LABELONE");
        window[536..544].copy_from_slice(b"LVM2 001");
        window[576..584].copy_from_slice(&(32u64 * 1024 * 1024).to_le_bytes());
        let (outcome, part) = run(&LvmPvProbe, &Vec::new(), 2048 * 512, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 32 * 1024 * 1024);
        assert_eq!(part.fs, FsKind::LvmPv);
    }

    #[test]
    fn xfs_big_endian_fields() {
        let mut window = vec![0u8; 8192];
        window[0..4].copy_from_slice(b"XFSB");
        window[4..8].copy_from_slice(&4096u32.to_be_bytes());
        window[8..16].copy_from_slice(&8192u64.to_be_bytes());
        let (outcome, part) = run(&XfsProbe, &Vec::new(), 0, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 8192 * 4096);
        assert_eq!(part.fs, FsKind::Xfs);
    }

    #[test]
    fn bsd_disklabel_needs_both_magics() {
        let mut window = vec![0u8; 8192];
        window[512..516].copy_from_slice(&DISKLABEL_MAGIC.to_le_bytes());
        window[512 + 40..512 + 44].copy_from_slice(&512u32.to_le_bytes());
        window[512 + 60..512 + 64].copy_from_slice(&65536u32.to_le_bytes());
        let (outcome, _) = run(&BsdDisklabelProbe, &Vec::new(), 0, &window);
        assert_eq!(outcome, ProbeOutcome::Declined);

        window[512 + 132..512 + 136].copy_from_slice(&DISKLABEL_MAGIC.to_le_bytes());
        let (outcome, part) = run(&BsdDisklabelProbe, &Vec::new(), 0, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 65536 * 512);
    }

    #[test]
    fn iso9660_reads_pvd_from_medium() {
        let mut medium = vec![0u8; 64 * 1024];
        let pvd_at = 32768;
        medium[pvd_at] = 1;
        medium[pvd_at + 1..pvd_at + 6].copy_from_slice(b"CD001");
        medium[pvd_at + 80..pvd_at + 84].copy_from_slice(&1200u32.to_le_bytes());
        let window = vec![0u8; 8192];
        let (outcome, part) = run(&Iso9660Probe, &medium, 0, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.size, 1200 * 2048);
        assert_eq!(part.fs, FsKind::Iso9660);
    }

    #[test]
    fn hfsplus_primary_header_at_1024() {
        let mut window = vec![0u8; 8192];
        let header = crate::probes::hfs::tests::hfsplus_volume_header(4096, 8192);
        window[1024..1536].copy_from_slice(&header);
        let (outcome, part) = run(&HfsPrimaryProbe, &Vec::new(), 1024 * 1024, &window);
        assert_eq!(outcome, ProbeOutcome::Found);
        assert_eq!(part.offset, 1024 * 1024);
        assert_eq!(part.size, 4096 * 8192);
    }
}
