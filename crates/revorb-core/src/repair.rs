use std::io::{Read, Seek, Write};

use ogg::{OggReadError, Packet, PacketReader, PacketWriteEndInfo, PacketWriter};
use tracing::warn;

use crate::error::RepairError;
use crate::vorbis::{self, IdentHeader, VorbisInfo, PACKET_TYPE_COMMENT};

/// Consecutive container-level errors tolerated before the recomputation
/// loop gives up on the rest of the stream.
const MAX_CONSECUTIVE_ERRORS: u32 = 64;

/// What a finished repair pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairSummary {
    /// Audio packets re-muxed into the output stream.
    pub packets: u64,
    /// Granule position stamped on the final packet.
    pub final_granule: u64,
    pub sample_rate: u32,
    pub channels: u8,
}

impl RepairSummary {
    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0 {
            self.final_granule as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }
}

/// Outcome of a repair pass that produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Repaired(RepairSummary),
    /// Output was written, but recoverable bitstream corruption was seen
    /// along the way. In-place mode keeps the original file in this case.
    RepairedWithWarnings(RepairSummary),
}

impl RepairOutcome {
    pub fn summary(&self) -> &RepairSummary {
        match self {
            RepairOutcome::Repaired(s) | RepairOutcome::RepairedWithWarnings(s) => s,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, RepairOutcome::Repaired(_))
    }
}

/// Runs the whole pass: transfers the three Vorbis headers, recomputes the
/// granule position of every audio packet from its block size, and re-muxes
/// everything into fresh pages on `output`.
pub fn repair<R: Read + Seek, W: Write>(
    input: R,
    output: W,
) -> Result<RepairOutcome, RepairError> {
    let mut reader = PacketReader::new(input);
    let mut writer = PacketWriter::new(output);

    let (info, serial) = copy_headers(&mut reader, &mut writer)?;
    let outcome = recompute_granules(&mut reader, &mut writer, &info, serial)?;

    writer.into_inner().flush().map_err(RepairError::Write)?;
    Ok(outcome)
}

fn read_secondary_header<R: Read + Seek>(
    reader: &mut PacketReader<R>,
) -> Result<Packet, RepairError> {
    match reader.read_packet() {
        Ok(Some(packet)) => Ok(packet),
        Ok(None) => Err(RepairError::TruncatedHeaders),
        Err(OggReadError::ReadError(e)) => Err(RepairError::Io(e)),
        Err(_) => Err(RepairError::CorruptHeaders),
    }
}

/// Reads the identification, comment and setup packets, decodes the codec
/// state, and writes the three packets unchanged into the output stream.
/// The identification header gets a page of its own and the setup header
/// closes the last header page, as the Vorbis mapping requires.
fn copy_headers<R: Read + Seek, W: Write>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
) -> Result<(VorbisInfo, u32), RepairError> {
    let ident_packet = match reader.read_packet() {
        Ok(Some(packet)) => packet,
        Ok(None) => return Err(RepairError::NotOgg),
        Err(OggReadError::ReadError(e)) => return Err(RepairError::Io(e)),
        Err(_) => return Err(RepairError::NotOgg),
    };
    let serial = ident_packet.stream_serial();
    let ident = IdentHeader::parse(&ident_packet.data)?;

    let comment_packet = read_secondary_header(reader)?;
    if vorbis::packet_kind(&comment_packet.data) != Some(PACKET_TYPE_COMMENT) {
        return Err(RepairError::CorruptHeaders);
    }
    let setup_packet = read_secondary_header(reader)?;
    let info = VorbisInfo::from_headers(ident, &setup_packet.data)?;

    writer
        .write_packet(ident_packet.data, serial, PacketWriteEndInfo::EndPage, 0)
        .map_err(RepairError::Write)?;
    writer
        .write_packet(comment_packet.data, serial, PacketWriteEndInfo::NormalPacket, 0)
        .map_err(RepairError::Write)?;
    writer
        .write_packet(setup_packet.data, serial, PacketWriteEndInfo::EndPage, 0)
        .map_err(RepairError::Write)?;

    Ok((info, serial))
}

/// Consumes the remaining packets, stamping each with the running sample
/// count per the Vorbis overlap-add rule: the increment for consecutive
/// block sizes `b1, b2` is `(b1 + b2) / 4`, and the first audio packet only
/// establishes the initial block size. One packet of lookahead is held so
/// the final packet can be written with the end-of-stream marker no matter
/// how the input stream was terminated.
fn recompute_granules<R: Read + Seek, W: Write>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    info: &VorbisInfo,
    serial: u32,
) -> Result<RepairOutcome, RepairError> {
    let mut granpos = 0u64;
    let mut last_blocksize = 0u32;
    let mut packets = 0u64;
    let mut degraded = false;
    let mut errors_in_a_row = 0u32;
    let mut foreign_warned = false;
    let mut pending: Option<(Vec<u8>, u64)> = None;

    loop {
        let packet = match reader.read_packet() {
            Ok(Some(packet)) => {
                errors_in_a_row = 0;
                packet
            }
            Ok(None) => break,
            Err(OggReadError::ReadError(e)) => return Err(RepairError::Io(e)),
            Err(e) => {
                warn!("corrupted or missing data in bitstream: {e}");
                degraded = true;
                errors_in_a_row += 1;
                if errors_in_a_row >= MAX_CONSECUTIVE_ERRORS {
                    warn!("giving up on resynchronization after {errors_in_a_row} errors");
                    break;
                }
                continue;
            }
        };

        if packet.stream_serial() != serial {
            if !foreign_warned {
                warn!(
                    serial = packet.stream_serial(),
                    "dropping packets of a second logical stream"
                );
                foreign_warned = true;
            }
            degraded = true;
            continue;
        }

        let blocksize = match info.packet_blocksize(&packet.data) {
            Some(blocksize) => blocksize,
            None => {
                warn!("bitstream error, skipping unreadable packet");
                degraded = true;
                continue;
            }
        };
        if last_blocksize != 0 {
            granpos += u64::from((last_blocksize + blocksize) / 4);
        }
        last_blocksize = blocksize;

        if let Some((data, gp)) = pending.take() {
            writer
                .write_packet(data, serial, PacketWriteEndInfo::NormalPacket, gp)
                .map_err(RepairError::Write)?;
        }
        packets += 1;
        pending = Some((packet.data, granpos));
    }

    if let Some((data, gp)) = pending.take() {
        writer
            .write_packet(data, serial, PacketWriteEndInfo::EndStream, gp)
            .map_err(RepairError::Write)?;
    }

    let summary = RepairSummary {
        packets,
        final_granule: granpos,
        sample_rate: info.sample_rate,
        channels: info.channels,
    };
    Ok(if degraded {
        RepairOutcome::RepairedWithWarnings(summary)
    } else {
        RepairOutcome::Repaired(summary)
    })
}
