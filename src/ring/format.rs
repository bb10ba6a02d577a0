//! Serialized ring format
//!
//! A ring file is gzip-compressed:
//!
//! ```text
//! b"R1NG" | version: u16 BE (=1) | json_len: u32 BE | json header
//! | replica 0 table | replica 1 table | ...
//! ```
//!
//! The JSON header carries `devs`, `part_shift`, `replica_count` and the
//! `byteorder` of the device id tables. Each table maps partition -> device
//! id; the table for a fractional last replica is shorter than the others.

use super::RingDevice;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"R1NG";
const VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RingHeader {
    devs: Vec<Option<RingDevice>>,
    part_shift: u32,
    replica_count: usize,
    #[serde(default = "default_byteorder")]
    byteorder: String,
    #[serde(default = "default_dev_id_bytes")]
    dev_id_bytes: usize,
}

fn default_byteorder() -> String {
    "big".to_string()
}

fn default_dev_id_bytes() -> usize {
    2
}

/// Decoded ring contents
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RingData {
    pub devs: Vec<Option<RingDevice>>,
    pub part_shift: u32,
    pub replica2part2dev: Vec<Vec<u32>>,
}

impl RingData {
    pub fn partition_count(&self) -> usize {
        1usize << (32 - self.part_shift.min(32))
    }

    /// Decode a gzip-compressed ring file.
    pub fn decode(compressed: &[u8]) -> Result<Self> {
        let mut raw = Vec::new();
        GzDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| Error::Ring(format!("ring file is not valid gzip: {}", e)))?;
        Self::decode_raw(&raw)
    }

    fn decode_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() < 10 || &raw[0..4] != MAGIC {
            return Err(Error::Ring(
                "unsupported ring format (missing R1NG magic; pickled rings are not supported)"
                    .to_string(),
            ));
        }
        let version = u16::from_be_bytes([raw[4], raw[5]]);
        if version != VERSION {
            return Err(Error::Ring(format!("unsupported ring version {}", version)));
        }
        let json_len = u32::from_be_bytes([raw[6], raw[7], raw[8], raw[9]]) as usize;
        let json_end = 10 + json_len;
        if raw.len() < json_end {
            return Err(Error::Ring("ring header is truncated".to_string()));
        }
        let header: RingHeader = serde_json::from_slice(&raw[10..json_end])?;
        if header.part_shift > 32 {
            return Err(Error::Ring(format!("invalid part_shift {}", header.part_shift)));
        }
        let width = header.dev_id_bytes;
        if width != 2 && width != 4 {
            return Err(Error::Ring(format!("invalid dev_id_bytes {}", width)));
        }
        let big_endian = match header.byteorder.as_str() {
            "big" => true,
            "little" => false,
            other => return Err(Error::Ring(format!("invalid byteorder '{}'", other))),
        };

        let partition_count = 1usize << (32 - header.part_shift);
        let mut tables = Vec::with_capacity(header.replica_count);
        let mut rest = &raw[json_end..];
        for _ in 0..header.replica_count {
            let take = rest.len().min(partition_count * width);
            if take % width != 0 {
                return Err(Error::Ring("replica table is truncated".to_string()));
            }
            let (table, remaining) = rest.split_at(take);
            tables.push(decode_table(table, width, big_endian));
            rest = remaining;
        }

        Ok(Self {
            devs: header.devs,
            part_shift: header.part_shift,
            replica2part2dev: tables,
        })
    }

    /// Encode as a gzip-compressed version 1 ring file (big endian, 2-byte ids).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = RingHeader {
            devs: self.devs.clone(),
            part_shift: self.part_shift,
            replica_count: self.replica2part2dev.len(),
            byteorder: default_byteorder(),
            dev_id_bytes: 2,
        };
        let json = serde_json::to_vec(&header)?;

        let mut raw = Vec::new();
        raw.extend_from_slice(MAGIC);
        raw.extend_from_slice(&VERSION.to_be_bytes());
        raw.extend_from_slice(&(json.len() as u32).to_be_bytes());
        raw.extend_from_slice(&json);
        for table in &self.replica2part2dev {
            for dev_id in table {
                let dev_id = u16::try_from(*dev_id).map_err(|_| {
                    Error::Ring(format!("device id {} does not fit in 2 bytes", dev_id))
                })?;
                raw.extend_from_slice(&dev_id.to_be_bytes());
            }
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }
}

fn decode_table(bytes: &[u8], width: usize, big_endian: bool) -> Vec<u32> {
    bytes
        .chunks_exact(width)
        .map(|chunk| match (width, big_endian) {
            (2, true) => u16::from_be_bytes([chunk[0], chunk[1]]) as u32,
            (2, false) => u16::from_le_bytes([chunk[0], chunk[1]]) as u32,
            (_, true) => u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            (_, false) => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u32) -> RingDevice {
        RingDevice {
            id,
            ip: format!("10.0.0.{}", id + 1),
            port: 6202,
            device: format!("sd{}", (b'a' + id as u8) as char),
            region: Some(1),
            zone: Some(id),
        }
    }

    #[test]
    fn test_little_endian_tables() {
        let header = serde_json::json!({
            "devs": [device(0), null, device(2)],
            "part_shift": 31,
            "replica_count": 2,
            "byteorder": "little",
        });
        let json = serde_json::to_vec(&header).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(b"R1NG");
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.extend_from_slice(&(json.len() as u32).to_be_bytes());
        raw.extend_from_slice(&json);
        // replica 0: parts [0, 2]; replica 1 (fractional): part [2]
        for id in [0u16, 2, 2] {
            raw.extend_from_slice(&id.to_le_bytes());
        }

        let data = RingData::decode_raw(&raw).unwrap();
        assert_eq!(data.partition_count(), 2);
        assert_eq!(data.replica2part2dev, vec![vec![0, 2], vec![2]]);
        assert!(data.devs[1].is_none());
    }

    #[test]
    fn test_rejects_pickled_rings() {
        let err = RingData::decode_raw(b"\x80\x02}q\x00(U\x04devsq").unwrap_err();
        assert!(format!("{err}").contains("R1NG"));
    }
}
