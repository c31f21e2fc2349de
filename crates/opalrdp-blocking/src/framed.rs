use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use opalrdp_pdu::PduHint;

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Accumulates stream bytes and slices out exact PDUs.
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    pub fn get_inner_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Bytes buffered but not yet consumed.
    pub fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> Framed<S>
where
    S: Read,
{
    /// Accumulates at least `length` bytes and returns exactly `length`,
    /// keeping any leftover buffered.
    pub fn read_exact(&mut self, length: usize) -> io::Result<BytesMut> {
        loop {
            if self.buf.len() >= length {
                return Ok(self.buf.split_to(length));
            }

            if self.read()? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
            }
        }
    }

    /// Ensures at least `n` bytes are buffered without consuming them.
    pub fn fill_to(&mut self, n: usize) -> io::Result<()> {
        while self.buf.len() < n {
            if self.read()? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
            }
        }
        Ok(())
    }

    /// Reads one frame, sized by the provided hint.
    pub fn read_by_hint(&mut self, hint: &dyn PduHint) -> io::Result<Bytes> {
        loop {
            match hint
                .find_size(self.peek())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                Some(length) => return Ok(self.read_exact(length)?.freeze()),
                None => {
                    if self.read()? == 0 {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes"));
                    }
                }
            }
        }
    }

    /// Pulls more bytes from the stream into the buffer.
    fn read(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let len = self.stream.read(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..len]);
        Ok(len)
    }
}

impl<S> Framed<S>
where
    S: Write,
{
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn read_by_hint_slices_tpkt_frames() {
        // two TPKT records back to back
        let stream = Cursor::new(vec![
            0x03, 0x00, 0x00, 0x07, 0xDE, 0xAD, 0xBE, //
            0x03, 0x00, 0x00, 0x05, 0x42,
        ]);
        let mut framed = Framed::new(stream);

        let first = framed.read_by_hint(&opalrdp_pdu::X224_HINT).unwrap();
        assert_eq!(first.as_ref(), &[0x03, 0x00, 0x00, 0x07, 0xDE, 0xAD, 0xBE]);

        let second = framed.read_by_hint(&opalrdp_pdu::X224_HINT).unwrap();
        assert_eq!(second.as_ref(), &[0x03, 0x00, 0x00, 0x05, 0x42]);
    }

    #[test]
    fn eof_mid_frame_is_an_error() {
        let stream = Cursor::new(vec![0x03, 0x00, 0x00, 0x10, 0x01]);
        let mut framed = Framed::new(stream);

        let err = framed.read_by_hint(&opalrdp_pdu::X224_HINT).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn leftover_bytes_stay_buffered() {
        let stream = Cursor::new(vec![0x03, 0x00, 0x00, 0x05, 0x42, 0x03, 0x00]);
        let mut framed = Framed::new(stream);

        framed.read_by_hint(&opalrdp_pdu::X224_HINT).unwrap();
        assert_eq!(framed.peek(), &[0x03, 0x00]);
    }
}
