//! Built-in signature probes.
//!
//! Backup-sector probes live in their own modules; the primary
//! superblock and boot-sector probes run from the shared table in
//! [`table`].

pub mod exfat;
pub mod ext;
pub mod fat;
pub mod hfs;
pub mod md;
pub mod ntfs;
pub mod table;
