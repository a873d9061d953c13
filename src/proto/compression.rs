//! The compression envelope: a zlib-wrapped inner payload, active once the
//! server's `LoginCompression` packet is observed.

use crate::error::{RelayError, Result};
use crate::proto::varint::VarInt;
use flate2::Compression as Flate2Level;
use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};

/// Wraps/unwraps the `VarInt(data_length) || (raw | zlib(raw))` envelope.
pub struct Compression {
    threshold: i32,
    compress: Compress,
    decompress: Decompress,
}

impl Compression {
    /// Creates a new compression handler armed at `threshold`.
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold,
            compress: Compress::new(Flate2Level::default(), true),
            decompress: Decompress::new(true),
        }
    }

    /// Current threshold: packets serializing smaller than this many bytes
    /// skip compression (`data_length = 0`).
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Builds the inner payload (`data_length` prefix + raw-or-zlib body)
    /// for `packet_id || fields` given in `uncompressed`.
    pub fn compress_packet(&mut self, uncompressed: &[u8]) -> Result<Vec<u8>> {
        if (uncompressed.len() as i32) < self.threshold {
            let mut out = Vec::with_capacity(uncompressed.len() + 1);
            VarInt(0).write(&mut out)?;
            out.extend_from_slice(uncompressed);
            return Ok(out);
        }

        let mut compressed = Vec::with_capacity(uncompressed.len());
        self.compress.reset();
        let mut buf = vec![0u8; 1024.max(uncompressed.len() / 2)];
        let mut input_offset = 0;

        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();

            let status = self
                .compress
                .compress(&uncompressed[input_offset..], &mut buf, FlushCompress::Finish)
                .map_err(RelayError::Compression)?;

            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            input_offset += consumed;
            compressed.extend_from_slice(&buf[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if input_offset >= uncompressed.len() && produced == 0 {
                        // Nothing left to feed and no forward progress: the
                        // stream is effectively done even without BufError
                        // ordinarily returning StreamEnd for small inputs.
                        break;
                    }
                }
            }
        }

        if compressed.len() > crate::proto::MAX_COMPRESSED_PACKET_LEN {
            return Err(RelayError::Protocol("compressed packet too large".into()));
        }

        let mut out = Vec::with_capacity(compressed.len() + VarInt::MAX_SIZE);
        VarInt(uncompressed.len() as i32).write(&mut out)?;
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Unwraps the compression envelope from `data` (the bytes immediately
    /// following the frame length prefix), returning `packet_id || fields`.
    pub fn decompress_packet(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = std::io::Cursor::new(data);
        let data_length = VarInt::read(&mut cursor)?;
        let header_len = cursor.position() as usize;
        let body = &data[header_len..];

        if data_length.0 == 0 {
            if body.len() as i32 >= self.threshold {
                return Err(RelayError::Protocol(
                    "packet marked uncompressed but meets compression threshold".into(),
                ));
            }
            return Ok(body.to_vec());
        }

        if data_length.0 < 0 || data_length.0 as usize > crate::proto::MAX_PACKET_SIZE {
            return Err(RelayError::Protocol("invalid data_length".into()));
        }

        self.decompress.reset(true);
        let mut out = vec![0u8; data_length.0 as usize];
        let mut total_out = 0usize;
        let mut input_offset = 0usize;

        loop {
            let before_in = self.decompress.total_in();
            let status = self
                .decompress
                .decompress(&body[input_offset..], &mut out[total_out..], FlushDecompress::Finish)
                .map_err(RelayError::Decompression)?;

            input_offset += (self.decompress.total_in() - before_in) as usize;
            total_out = self.decompress.total_out() as usize;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if total_out >= out.len() {
                        break;
                    }
                }
            }
        }

        if total_out != data_length.0 as usize {
            return Err(RelayError::Protocol(
                "decompressed size does not match data_length".into(),
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_not_compressed() {
        let mut c = Compression::new(256);
        let payload = vec![0xABu8; 100];
        let envelope = c.compress_packet(&payload).unwrap();
        assert_eq!(envelope[0], 0x00);
        assert_eq!(&envelope[1..], &payload[..]);
    }

    #[test]
    fn above_threshold_round_trips() {
        let mut c = Compression::new(256);
        let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let envelope = c.compress_packet(&payload).unwrap();

        let mut decompressor = Compression::new(256);
        let decoded = decompressor.decompress_packet(&envelope).unwrap();
        assert_eq!(decoded, payload);
    }
}
