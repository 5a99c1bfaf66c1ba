//! CHS (Cylinder/Head/Sector) geometry model.
//!
//! Linear byte offsets and legacy CHS coordinates convert losslessly in
//! both directions; every placement heuristic in the scanner is phrased
//! in terms of these conversions.

use serde::{Deserialize, Serialize};

/// A CHS coordinate. Sectors are 1-based, cylinders and heads 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chs {
    pub cylinder: u64,
    pub head: u32,
    pub sector: u32,
}

/// Disk geometry as reported (or assumed) for the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cylinders: u64,
    pub heads_per_cylinder: u32,
    pub sectors_per_head: u32,
}

impl Geometry {
    /// Bytes per head (one track).
    pub fn head_size(&self, sector_size: u32) -> u64 {
        self.sectors_per_head as u64 * sector_size as u64
    }

    /// Bytes per cylinder.
    pub fn cylinder_size(&self, sector_size: u32) -> u64 {
        self.heads_per_cylinder as u64 * self.head_size(sector_size)
    }
}

/// Convert a linear byte offset to CHS coordinates.
pub fn offset_to_chs(geom: &Geometry, sector_size: u32, offset: u64) -> Chs {
    let mut pos = offset / sector_size as u64;
    let sector = (pos % geom.sectors_per_head as u64) as u32 + 1;
    pos /= geom.sectors_per_head as u64;
    let head = (pos % geom.heads_per_cylinder as u64) as u32;
    let cylinder = pos / geom.heads_per_cylinder as u64;
    Chs {
        cylinder,
        head,
        sector,
    }
}

/// Convert CHS coordinates back to a linear byte offset.
pub fn chs_to_offset(geom: &Geometry, sector_size: u32, chs: &Chs) -> u64 {
    ((chs.cylinder * geom.heads_per_cylinder as u64 + chs.head as u64)
        * geom.sectors_per_head as u64
        + chs.sector as u64
        - 1)
        * sector_size as u64
}

/// Cylinder number of a byte offset.
pub fn offset_to_cylinder(geom: &Geometry, sector_size: u32, offset: u64) -> u64 {
    offset_to_chs(geom, sector_size, offset).cylinder
}
