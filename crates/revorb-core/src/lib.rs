//! Recomputes page granule positions in Ogg Vorbis files.
//!
//! Naive page copying leaves stale granule positions behind, which breaks
//! seeking and duration reporting. This crate re-muxes the stream in a
//! single pass: the three Vorbis headers are transferred unchanged, every
//! audio packet is stamped with a granule position recomputed from its
//! block size, and the result is written into fresh pages.

mod error;
mod repair;
mod vorbis;

pub use error::RepairError;
pub use repair::{repair, RepairOutcome, RepairSummary};
pub use vorbis::VorbisInfo;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Repairs `input` into `output`. The input file is never modified.
pub fn repair_to(input: &Path, output: &Path) -> Result<RepairOutcome, RepairError> {
    let fi = BufReader::new(File::open(input)?);
    let fo = BufWriter::new(File::create(output).map_err(RepairError::OutputOpen)?);
    repair(fi, fo)
}

/// Temporary file used by in-place mode: `<input>.tmp`.
pub fn temp_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Repairs `path` via a temporary file. Only a clean pass replaces the
/// original; any fatal error or recoverable-corruption warning discards the
/// temporary file and leaves the original byte-for-byte untouched.
pub fn repair_in_place(path: &Path) -> Result<RepairOutcome, RepairError> {
    let tmp = temp_path(path);
    let outcome = repair_to(path, &tmp);

    match outcome {
        Ok(RepairOutcome::Repaired(_)) => {
            if let Err(e) = replace(path, &tmp) {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        }
        _ => {
            let _ = fs::remove_file(&tmp);
        }
    }
    outcome
}

fn replace(path: &Path, tmp: &Path) -> Result<(), RepairError> {
    fs::remove_file(path).map_err(RepairError::Replace)?;
    fs::rename(tmp, path).map_err(RepairError::Replace)
}
