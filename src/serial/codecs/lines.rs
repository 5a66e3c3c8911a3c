use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::serial::{error::SerialPortError, SerialMessage};

/// Splits a byte stream into lines on a delimiter byte,
/// optionally terminating each written line with one.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// Bytes already scanned for the delimiter.
    cursor: usize,

    /// Ends an incoming line. Not part of the yielded line.
    read_delimiter: u8,

    /// Appended to each outgoing line, if any.
    write_delimiter: Option<u8>,

    /// Longest line accepted, delimiter excluded.
    max_length: usize,

    /// Dropping the rest of an overlong line.
    discarding: bool,
}

/// Default upper bound on a line, far beyond any G-code line or controller report.
pub const MAX_LINE_LENGTH: usize = 4096;

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8, write_delimiter: Option<u8>) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            write_delimiter,
            max_length: MAX_LINE_LENGTH,
            discarding: false,
        }
    }

    /// Reject lines longer than `max_length`.
    ///
    /// An overlong line is reported once as [`SerialPortError::LineTooLong`],
    /// then skipped up to its delimiter.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Wrap into a [StringCodec].
    /// With `lossy`, bad utf8 is replaced rather than being an error.
    pub fn into_string_codec(self, lossy: bool) -> StringCodec {
        StringCodec {
            lossy,
            wrapped: self,
        }
    }
}

impl Default for LinesCodec {
    /// Newline delimited in both directions, the framing both GRBL and its TCP clients use.
    fn default() -> Self {
        Self::new(b'\n', Some(b'\n'))
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Never look further than one byte past a full line.
            let limit = src.len().min(self.max_length.saturating_add(1));
            let scanned = self.cursor.min(limit);

            let found = src[scanned..limit]
                .iter()
                .position(|&byte| byte == self.read_delimiter)
                .map(|offset| scanned + offset);

            match (self.discarding, found) {
                (true, Some(position)) => {
                    src.advance(position + 1);
                    self.discarding = false;
                    self.cursor = 0;
                }
                (true, None) => {
                    src.advance(limit);
                    self.cursor = 0;

                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(position)) => {
                    self.cursor = 0;

                    let line = src.split_to(position);
                    src.advance(1);

                    return Ok(Some(line.to_vec()));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;

                    return Err(SerialPortError::LineTooLong(self.max_length));
                }
                (false, None) => {
                    // Bytes before the cursor hold no delimiter, no need to scan them again.
                    self.cursor = limit;

                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                // An unterminated trailing line is still a line.
                self.cursor = 0;
                Ok(Some(src.split().to_vec()))
            }
        }
    }
}

impl Encoder<Vec<u8>> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);

        if let Some(character) = self.write_delimiter {
            dst.extend_from_slice(&[character]);
        }
        Ok(())
    }
}

/// A [LinesCodec] framing [SerialMessage]s.
#[derive(Debug, Clone)]
pub struct StringCodec {
    lossy: bool,
    wrapped: LinesCodec,
}

impl Default for StringCodec {
    fn default() -> Self {
        LinesCodec::default().into_string_codec(true)
    }
}

impl StringCodec {
    fn to_message(&self, bytes: Vec<u8>) -> Result<SerialMessage, SerialPortError> {
        if self.lossy {
            Ok(SerialMessage::new_lossy(bytes))
        } else {
            Ok(SerialMessage::from(String::from_utf8(bytes)?))
        }
    }
}

impl Decoder for StringCodec {
    type Item = SerialMessage;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.wrapped.decode(src)? {
            Some(bytes) => self.to_message(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.wrapped.decode_eof(src)? {
            Some(bytes) => self.to_message(bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<SerialMessage> for StringCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: SerialMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.wrapped.encode(item.into_bytes(), dst)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_frames_are_buffered() {
        let mut codec = LinesCodec::default();
        let mut buf = BytesMut::from(&b"G1 X1"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"0\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"G1 X10".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"ok".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn trailing_line_without_delimiter_at_eof() {
        let mut codec = LinesCodec::default();
        let mut buf = BytesMut::from(&b"ok\nM9"[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(b"ok".to_vec()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(b"M9".to_vec()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn overlong_line_is_rejected_then_skipped() {
        let mut codec = LinesCodec::default().with_max_length(8);
        let mut buf = BytesMut::from(&b"G1 X10 Y10 Z10"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(SerialPortError::LineTooLong(8))
        ));

        // The rest of the long line is dropped, the next one comes through.
        buf.extend_from_slice(b" F100\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"ok".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn line_of_exactly_max_length_is_fine() {
        let mut codec = LinesCodec::default().with_max_length(6);
        let mut buf = BytesMut::from(&b"G1 X10\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"G1 X10".to_vec()));
    }

    #[test]
    fn encode_appends_newline() {
        let mut codec = StringCodec::default();
        let mut buf = BytesMut::new();

        codec.encode("G0 X0".into(), &mut buf).unwrap();

        assert_eq!(&buf[..], b"G0 X0\n");
    }

    #[test]
    fn lossy_decoding_replaces_bad_utf8() {
        let mut codec = StringCodec::default();
        let mut buf = BytesMut::from(&b"ok\xff\n"[..]);

        let message = codec.decode(&mut buf).unwrap().unwrap();

        assert!(message.as_str().starts_with("ok"));
    }

    #[test]
    fn strict_decoding_rejects_bad_utf8() {
        let mut codec = LinesCodec::default().into_string_codec(false);
        let mut buf = BytesMut::from(&b"ok\xff\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(SerialPortError::Utf8(_))
        ));
    }
}
