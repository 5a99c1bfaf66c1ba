//! Error taxonomy for the recovery engine.
//!
//! Failed sector reads are never fatal to a scan; they are logged and
//! skipped so everything found before a bad region stays usable. The
//! variants here cover the hard failures: bad input, unwritable
//! structures, and write-back problems.

use std::io;

use thiserror::Error;

use crate::arch::Arch;

#[derive(Debug, Error)]
pub enum RescueError {
    #[error("invalid partition structure: {0}")]
    InvalidStructure(String),

    #[error("partition table writes are not supported for {0:?}")]
    UnsupportedWrite(Arch),

    #[error("failed to write partition table: {0}")]
    WriteFailure(io::Error),

    #[error("invalid disk geometry: {0}")]
    BadGeometry(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RescueError>;
