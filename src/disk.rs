//! Disk description and the raw I/O seam.
//!
//! The engine never touches the medium directly: all reads go through
//! [`BlockRead`], all writes through [`BlockWrite`]. The default medium
//! is a read-only memory-mapped image file; in-memory byte slices also
//! implement [`BlockRead`] so the whole engine runs headless in tests.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::arch::Arch;
use crate::error::{RescueError, Result};
use crate::geometry::{self, Chs, Geometry};

/// Immutable-during-scan description of the storage medium.
#[derive(Debug, Clone)]
pub struct Disk {
    /// Logical size in bytes.
    pub size: u64,
    /// Physically readable size. May differ from `size` for truncated
    /// images or media with a wrong capacity report.
    pub real_size: u64,
    pub sector_size: u32,
    pub geometry: Geometry,
    pub arch: Arch,
}

impl Disk {
    /// Build a disk description, deriving the cylinder count from the
    /// size and the per-cylinder geometry.
    pub fn new(
        size: u64,
        real_size: u64,
        sector_size: u32,
        heads_per_cylinder: u32,
        sectors_per_head: u32,
        arch: Arch,
    ) -> Result<Self> {
        if sector_size == 0 || heads_per_cylinder == 0 || sectors_per_head == 0 {
            return Err(RescueError::BadGeometry(
                "sector size, heads and sectors per head must be non-zero".into(),
            ));
        }
        let cylinder =
            heads_per_cylinder as u64 * sectors_per_head as u64 * sector_size as u64;
        let cylinders = (size / cylinder).max(1);
        Ok(Self {
            size,
            real_size,
            sector_size,
            geometry: Geometry {
                cylinders,
                heads_per_cylinder,
                sectors_per_head,
            },
            arch,
        })
    }

    pub fn head_size(&self) -> u64 {
        self.geometry.head_size(self.sector_size)
    }

    pub fn cylinder_size(&self) -> u64 {
        self.geometry.cylinder_size(self.sector_size)
    }

    pub fn offset_to_chs(&self, offset: u64) -> Chs {
        geometry::offset_to_chs(&self.geometry, self.sector_size, offset)
    }

    pub fn chs_to_offset(&self, chs: &Chs) -> u64 {
        geometry::chs_to_offset(&self.geometry, self.sector_size, chs)
    }

    pub fn offset_to_cylinder(&self, offset: u64) -> u64 {
        geometry::offset_to_cylinder(&self.geometry, self.sector_size, offset)
    }

    /// Upper bound for the scan cursor: the logical size rounded up to a
    /// head boundary, or the real size if that is larger.
    pub fn search_location_max(&self) -> u64 {
        let head = self.head_size();
        let rounded = (self.size + head - 1) / head * head;
        rounded.max(self.real_size)
    }
}

/// Block-granular read access to a disk or image file.
pub trait BlockRead {
    /// Read up to `buf.len()` bytes at `offset`. Short reads happen at
    /// the end of the medium and are not errors.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Readable length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access for the table write-back path. Kept separate from
/// [`BlockRead`] so a scan can never write by construction.
pub trait BlockWrite {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;
}

impl BlockRead for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }
}

impl BlockRead for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }

    fn len(&self) -> u64 {
        Vec::len(self) as u64
    }
}

/// Read-only memory-mapped disk image.
pub struct ImageMedium {
    mmap: Mmap,
    path: String,
}

impl ImageMedium {
    /// Open an image file. The handle is read-only; nothing in the
    /// engine can modify the source through it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RescueError::ImageNotFound(path_ref.display().to_string())
            } else {
                RescueError::Io(e)
            }
        })?;
        // Safety: the mapping is read-only and the file is opened without
        // write access; concurrent truncation of the source is the same
        // hazard any raw-device read has.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path_ref.display().to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl BlockRead for ImageMedium {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.mmap[..].read_at(buf, offset)
    }

    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }
}

impl BlockWrite for File {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }
}

/// In-memory write sink capturing table bytes, used by the simulate path
/// and by tests.
#[derive(Debug, Default)]
pub struct CaptureSink {
    pub writes: Vec<(u64, Vec<u8>)>,
}

impl BlockWrite for CaptureSink {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.writes.push((offset, buf.to_vec()));
        Ok(())
    }
}
