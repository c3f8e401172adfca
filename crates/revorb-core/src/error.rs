use std::io;
use thiserror::Error;

/// Fatal conditions of the repair pass.
///
/// Recoverable bitstream corruption during the recomputation loop is not an
/// error; it downgrades the run to
/// [`RepairedWithWarnings`](crate::RepairOutcome::RepairedWithWarnings).
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("Input file is not an Ogg file.")]
    NotOgg,
    #[error("Error in header, probably not a Vorbis file.")]
    NotVorbis,
    #[error("Headers are damaged, file is probably truncated.")]
    TruncatedHeaders,
    #[error("Secondary header is corrupted.")]
    CorruptHeaders,
    #[error("Could not open output file.")]
    OutputOpen(#[source] io::Error),
    #[error("Unable to write page to output: {0}")]
    Write(#[source] io::Error),
    #[error("Could not put the output file back in place: {0}")]
    Replace(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
