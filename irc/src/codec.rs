use std::io;

use bytes::BytesMut;
use proto::{format, parse, Message};
use tokio_util::codec::{Decoder, Encoder};

/// Lines that fail to parse are yielded as errors instead of terminating
/// the stream; the reader skips them.
pub type ParseResult<T = Message, E = parse::Error> = std::result::Result<T, E>;

pub struct Codec;

impl Decoder for Codec {
    type Item = ParseResult;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.windows(2).enumerate().find_map(|(i, b)| {
            if b == [b'\r', b'\n'] {
                Some(i + 2)
            } else if b[0] == b'\n' {
                // Tolerate bare \n line endings
                Some(i + 1)
            } else {
                None
            }
        }) else {
            return Ok(None);
        };

        let mut bytes = Vec::from(src.split_to(pos));
        if !bytes.ends_with(b"\r\n") {
            bytes.truncate(bytes.len() - 1);
            bytes.extend_from_slice(b"\r\n");
        }

        Ok(Some(parse::message_bytes(bytes)))
    }
}

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = format::message(message);

        dst.extend(encoded.into_bytes());

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use proto::Command;
    use tokio_util::codec::Decoder;

    #[test]
    fn splits_on_crlf_and_bare_lf() {
        let mut codec = super::Codec;
        let mut buf = BytesMut::from("PING :one\r\nPING :two\nPIN");

        let one = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(one.command, Command::PING("one".into()));

        let two = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(two.command, Command::PING("two".into()));

        // Incomplete line stays buffered
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"PIN");
    }

    #[test]
    fn malformed_line_yields_error_item() {
        let mut codec = super::Codec;
        let mut buf = BytesMut::from(":only-a-source\r\nPING :ok\r\n");

        assert!(codec.decode(&mut buf).unwrap().unwrap().is_err());
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_ok());
    }
}
