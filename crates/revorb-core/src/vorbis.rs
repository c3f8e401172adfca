use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::RepairError;

const VORBIS_MAGIC: &[u8; 6] = b"vorbis";

pub(crate) const PACKET_TYPE_IDENT: u8 = 0x01;
pub(crate) const PACKET_TYPE_COMMENT: u8 = 0x03;
pub(crate) const PACKET_TYPE_SETUP: u8 = 0x05;

// Mode count is a 6-bit field, so a setup header carries at most 64 modes.
const MAX_MODES: u32 = 64;

/// Returns the Vorbis header packet type, if the packet carries the
/// `\x0N vorbis` common header.
pub(crate) fn packet_kind(packet: &[u8]) -> Option<u8> {
    if packet.len() >= 7 && &packet[1..7] == VORBIS_MAGIC {
        Some(packet[0])
    } else {
        None
    }
}

/// Number of bits needed to store `x` (Vorbis `ilog`): `ilog(0) == 0`,
/// `ilog(7) == 3`.
fn ilog(x: u32) -> u32 {
    32 - x.leading_zeros()
}

/// Fields of the identification header needed for block size computation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdentHeader {
    pub channels: u8,
    pub sample_rate: u32,
    pub blocksize_0: u32,
    pub blocksize_1: u32,
}

impl IdentHeader {
    pub(crate) fn parse(packet: &[u8]) -> Result<Self, RepairError> {
        if packet_kind(packet) != Some(PACKET_TYPE_IDENT) || packet.len() < 30 {
            return Err(RepairError::NotVorbis);
        }

        let mut cursor = Cursor::new(&packet[7..]);
        let version = cursor.read_u32::<LittleEndian>()?;
        let channels = cursor.read_u8()?;
        let sample_rate = cursor.read_u32::<LittleEndian>()?;
        let _bitrate_maximum = cursor.read_u32::<LittleEndian>()?;
        let _bitrate_nominal = cursor.read_u32::<LittleEndian>()?;
        let _bitrate_minimum = cursor.read_u32::<LittleEndian>()?;
        let blocksizes = cursor.read_u8()?;

        let blocksize_0 = 1u32 << (blocksizes & 0x0F);
        let blocksize_1 = 1u32 << (blocksizes >> 4);

        let valid = version == 0
            && channels > 0
            && sample_rate > 0
            && (64..=8192).contains(&blocksize_0)
            && (64..=8192).contains(&blocksize_1)
            && blocksize_0 <= blocksize_1;
        if !valid {
            return Err(RepairError::NotVorbis);
        }

        Ok(IdentHeader { channels, sample_rate, blocksize_0, blocksize_1 })
    }
}

/// Reads the bits of a Vorbis (LSb-first) bit stream in reverse, starting
/// from the last bit of the buffer. Multi-bit reads accumulate MSb-first,
/// which yields the original field value when a field is read as one unit.
#[derive(Clone, Copy)]
struct ReverseBitReader<'a> {
    data: &'a [u8],
    /// Bits left in front of the cursor; also the absolute position of the
    /// next bit to read, counted from the start of the buffer.
    pos: u64,
}

impl<'a> ReverseBitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        ReverseBitReader { data, pos: data.len() as u64 * 8 }
    }

    fn remaining(&self) -> u64 {
        self.pos
    }

    fn read_bit(&mut self) -> Option<bool> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        let byte = self.data[(self.pos / 8) as usize];
        Some(byte & (1 << (self.pos % 8)) != 0)
    }

    fn read_bits(&mut self, count: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Some(value)
    }

    fn skip(&mut self, count: u64) -> Option<()> {
        if self.pos < count {
            return None;
        }
        self.pos -= count;
        Some(())
    }
}

/// Block flags of the setup header's mode section.
///
/// The mode section sits at the tail of the setup header, just before the
/// framing bit: a 6-bit `mode_count - 1`, then per mode one block flag bit,
/// 16 zero window-type bits, 16 zero transform-type bits and an 8-bit
/// mapping number below 64. Decoding the header forwards would require full
/// codebook parsing, so the section is recovered by scanning backwards from
/// the framing bit instead, validating the zero fields and the count.
#[derive(Debug, Clone)]
struct ModeTable {
    blockflags: Vec<bool>,
}

impl ModeTable {
    fn parse(setup: &[u8]) -> Result<Self, RepairError> {
        let mut rdr = ReverseBitReader::new(setup);

        // Trailing padding is zero; the first set bit from the end is the
        // framing bit.
        loop {
            match rdr.read_bit() {
                Some(true) => break,
                Some(false) => continue,
                None => return Err(RepairError::CorruptHeaders),
            }
        }
        let tail = rdr;

        // Walk mode records backwards until one fails validation. Several
        // positions can look like the start of the section; the outermost
        // consistent count wins.
        let mut probe = tail;
        let mut count = 0u32;
        let mut mode_count = None;
        // 41-bit record plus the 6-bit count field
        while probe.remaining() >= 47 {
            let mapping = probe.read_bits(8);
            let transform_type = probe.read_bits(16);
            let window_type = probe.read_bits(16);
            if mapping.map_or(true, |m| m > 63)
                || transform_type != Some(0)
                || window_type != Some(0)
            {
                break;
            }
            probe.read_bit();
            count += 1;
            if count > MAX_MODES {
                break;
            }
            let mut peek = probe;
            if peek.read_bits(6) == Some(count - 1) {
                mode_count = Some(count);
            }
        }
        let mode_count = mode_count.ok_or(RepairError::CorruptHeaders)?;

        // Second pass from the framing bit collects the block flags, last
        // mode first. Skipping 40 bits steps over mapping, transform type
        // and window type of one record.
        let mut rdr = tail;
        let mut blockflags = vec![false; mode_count as usize];
        for flag in blockflags.iter_mut().rev() {
            rdr.skip(40).ok_or(RepairError::CorruptHeaders)?;
            *flag = rdr.read_bit().ok_or(RepairError::CorruptHeaders)?;
        }

        Ok(ModeTable { blockflags })
    }
}

/// Vorbis stream parameters decoded once from the header packets and held
/// read-only to compute each audio packet's block size.
#[derive(Debug, Clone)]
pub struct VorbisInfo {
    pub channels: u8,
    pub sample_rate: u32,
    pub blocksize_0: u32,
    pub blocksize_1: u32,
    mode_blockflags: Vec<bool>,
    mode_bits: u32,
}

impl VorbisInfo {
    pub(crate) fn from_headers(ident: IdentHeader, setup: &[u8]) -> Result<Self, RepairError> {
        if packet_kind(setup) != Some(PACKET_TYPE_SETUP) {
            return Err(RepairError::CorruptHeaders);
        }
        let modes = ModeTable::parse(setup)?;
        let mode_bits = ilog(modes.blockflags.len() as u32 - 1);

        Ok(VorbisInfo {
            channels: ident.channels,
            sample_rate: ident.sample_rate,
            blocksize_0: ident.blocksize_0,
            blocksize_1: ident.blocksize_1,
            mode_blockflags: modes.blockflags,
            mode_bits,
        })
    }

    /// Samples covered by one audio packet. `None` for packets that cannot
    /// carry audio (empty, header-typed, or an out-of-range mode number).
    pub fn packet_blocksize(&self, packet: &[u8]) -> Option<u32> {
        let first = *packet.first()?;
        if first & 1 != 0 {
            return None;
        }
        let mode = ((first >> 1) as u32) & ((1u32 << self.mode_bits) - 1);
        let long_window = *self.mode_blockflags.get(mode as usize)?;
        Some(if long_window { self.blocksize_1 } else { self.blocksize_0 })
    }
}
