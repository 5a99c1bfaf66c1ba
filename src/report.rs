//! Scan reports: JSON on disk, human-readable tables on the terminal.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;
use humansize::{format_size, BINARY};
use serde::{Deserialize, Serialize};

use crate::arch::Arch;
use crate::disk::Disk;
use crate::error::Result;
use crate::partition::{PartStatus, Partition, PartitionList};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSummary {
    pub size: u64,
    pub sector_size: u32,
    pub cylinders: u64,
    pub heads_per_cylinder: u32,
    pub sectors_per_head: u32,
    pub arch: Arch,
}

impl DiskSummary {
    pub fn from_disk(disk: &Disk) -> Self {
        Self {
            size: disk.size,
            sector_size: disk.sector_size,
            cylinders: disk.geometry.cylinders,
            heads_per_cylinder: disk.geometry.heads_per_cylinder,
            sectors_per_head: disk.geometry.sectors_per_head,
            arch: disk.arch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub offset: u64,
    pub size: u64,
    pub status: PartStatus,
    pub fs: String,
    pub type_code: u8,
    pub order: u32,
    /// Offset of the backup structure the detection came from, 0 for a
    /// primary-structure hit.
    pub sb_offset: u64,
    pub chs_start: String,
    pub chs_end: String,
}

impl PartitionRecord {
    pub fn new(disk: &Disk, part: &Partition) -> Self {
        let start = disk.offset_to_chs(part.offset);
        let end = disk.offset_to_chs(part.end());
        Self {
            offset: part.offset,
            size: part.size,
            status: part.status,
            fs: format!("{:?}", part.fs),
            type_code: part.type_code,
            order: part.order,
            sb_offset: part.sb_offset,
            chs_start: format!("{}/{}/{}", start.cylinder, start.head, start.sector),
            chs_end: format!("{}/{}/{}", end.cylinder, end.head, end.sector),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub image: String,
    pub created: DateTime<Utc>,
    pub disk: DiskSummary,
    pub fast_mode: u8,
    pub interrupted: bool,
    pub inferred_heads_per_cylinder: Option<u32>,
    pub duration_ms: u64,
    pub found: Vec<PartitionRecord>,
    pub bad: Vec<PartitionRecord>,
}

impl ScanReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image: &str,
        disk: &Disk,
        found: &PartitionList,
        bad: &PartitionList,
        fast_mode: u8,
        interrupted: bool,
        inferred_heads_per_cylinder: Option<u32>,
        duration_ms: u64,
    ) -> Self {
        Self {
            image: image.to_string(),
            created: Utc::now(),
            disk: DiskSummary::from_disk(disk),
            fast_mode,
            interrupted,
            inferred_heads_per_cylinder,
            duration_ms,
            found: found.iter().map(|p| PartitionRecord::new(disk, p)).collect(),
            bad: bad.iter().map(|p| PartitionRecord::new(disk, p)).collect(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        tracing::info!(path = %path.as_ref().display(), "scan report written");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let report = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(report)
    }

    /// Print the report the way the interactive listing shows it.
    pub fn print_human(&self) {
        println!("{}", "Partition scan results".bold());
        println!(
            "  image: {}  size: {}  geometry: {}/{}/{}",
            self.image,
            format_size(self.disk.size, BINARY),
            self.disk.cylinders,
            self.disk.heads_per_cylinder,
            self.disk.sectors_per_head,
        );
        if let Some(heads) = self.inferred_heads_per_cylinder {
            if heads != self.disk.heads_per_cylinder {
                println!(
                    "  {} layout suggests {} heads per cylinder",
                    "warning:".yellow().bold(),
                    heads
                );
            }
        }
        if self.interrupted {
            println!("  {} scan was interrupted", "warning:".yellow().bold());
        }
        if self.found.is_empty() {
            println!("  {}", "no partitions found".red());
        }
        for rec in &self.found {
            Self::print_record(rec, false);
        }
        for rec in &self.bad {
            Self::print_record(rec, true);
        }
    }

    fn print_record(rec: &PartitionRecord, bad: bool) {
        let label = format!(
            "{:>14}  {:>10}  {:<9} {:<12} {} - {}",
            rec.offset,
            format_size(rec.size, BINARY),
            format!("{:?}", rec.status),
            rec.fs,
            rec.chs_start,
            rec.chs_end,
        );
        if bad {
            println!("  {} {}", label.red(), "(beyond disk limits)".red());
        } else if rec.sb_offset > 0 {
            println!("  {} {}", label, "(from backup)".cyan());
        } else {
            println!("  {label}");
        }
    }
}
