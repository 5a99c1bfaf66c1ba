//! Signature-based partition table recovery engine.
//!
//! - Sequential signature scan with hint queues and CHS-aware
//!   eligibility gates
//! - Probes for primary and backup filesystem structures (FAT, exFAT,
//!   NTFS, HFS+, ext, swap, LVM2, XFS, BSD disklabel, ISO9660, MD RAID)
//! - Structure reconciliation: alignment, extended-partition synthesis,
//!   slot ordering
//! - MBR write-back with simulate mode; everything else stays read-only

pub mod arch;
pub mod cli;
pub mod disk;
pub mod error;
pub mod geometry;
pub mod hints;
pub mod partition;
pub mod probe;
pub mod probes;
pub mod reconcile;
pub mod recover;
pub mod report;
pub mod scanner;

pub use error::{RescueError, Result};
