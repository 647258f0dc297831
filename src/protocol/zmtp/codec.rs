use crate::error::ZmqError;
use crate::message::{Msg, MsgFlags};
use crate::protocol::zmtp::command::*;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on how much buffer space one decode step asks for while a
/// frame body is still arriving.
const MAX_RESERVE_CHUNK: usize = 64 * 1024;

/// Codec for ZMTP/3.0 frames.
///
/// A frame is a flags byte, a 1-byte or 8-byte big-endian length and the
/// body. Incoming frames larger than `max_msg_size` fail decoding with
/// `ProtocolViolation`, which tears the connection down.
#[derive(Debug, Default)]
pub struct ZmtpCodec {
  decoding_state: DecodingState,
  max_msg_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadHeader,
  ReadBody(FrameHeader),
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
  flags: u8,
  size: usize,
}

impl ZmtpCodec {
  pub fn new(max_msg_size: Option<usize>) -> Self {
    Self {
      decoding_state: DecodingState::default(),
      max_msg_size,
    }
  }
}

impl Encoder<Msg> for ZmtpCodec {
  type Error = ZmqError;

  fn encode(&mut self, item: Msg, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let data = item.data();
    let size = data.len();

    let mut zmtp_flags = 0u8;
    if item.is_more() {
      zmtp_flags |= ZMTP_FLAG_MORE;
    }
    if item.is_command() {
      zmtp_flags |= ZMTP_FLAG_COMMAND;
    }

    if size <= 255 {
      dst.reserve(2 + size);
      dst.put_u8(zmtp_flags);
      dst.put_u8(size as u8);
    } else {
      zmtp_flags |= ZMTP_FLAG_LONG;
      dst.reserve(9 + size);
      dst.put_u8(zmtp_flags);
      dst.put_u64(size as u64);
    }
    dst.put_slice(data);
    Ok(())
  }
}

impl Decoder for ZmtpCodec {
  type Item = Msg;
  type Error = ZmqError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.decoding_state {
        DecodingState::ReadHeader => {
          if src.is_empty() {
            return Ok(None);
          }
          let flags = src[0];
          let is_long = (flags & ZMTP_FLAG_LONG) != 0;
          let header_len = if is_long { 9 } else { 2 };
          if src.len() < header_len {
            src.reserve(header_len - src.len());
            return Ok(None);
          }

          let mut header = src.split_to(header_len);
          header.advance(1);
          let size = if is_long {
            let raw = header.get_u64();
            usize::try_from(raw)
              .map_err(|_| ZmqError::ProtocolViolation(format!("frame length {} exceeds address space", raw)))?
          } else {
            header[0] as usize
          };

          if size > isize::MAX as usize {
            return Err(ZmqError::ResourceExhausted(format!("frame of {} bytes cannot be buffered", size)));
          }
          let is_command = (flags & ZMTP_FLAG_COMMAND) != 0;
          if let Some(max) = self.max_msg_size {
            if !is_command && size > max {
              return Err(ZmqError::ProtocolViolation(format!(
                "frame of {} bytes exceeds maxmsgsize {}",
                size, max
              )));
            }
          }
          self.decoding_state = DecodingState::ReadBody(FrameHeader { flags, size });
        }

        DecodingState::ReadBody(header) => {
          if src.len() < header.size {
            let want = (header.size - src.len()).min(MAX_RESERVE_CHUNK);
            src.reserve(want);
            return Ok(None);
          }
          let body = src.split_to(header.size).freeze();
          self.decoding_state = DecodingState::ReadHeader;

          let mut msg_flags = MsgFlags::empty();
          if (header.flags & ZMTP_FLAG_MORE) != 0 {
            msg_flags |= MsgFlags::MORE;
          }
          if (header.flags & ZMTP_FLAG_COMMAND) != 0 {
            msg_flags |= MsgFlags::COMMAND;
          }
          let mut msg = Msg::from_bytes(body);
          msg.set_flags(msg_flags);
          return Ok(Some(msg));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn long_frame_uses_eight_byte_length() {
    let mut codec = ZmtpCodec::new(None);
    let mut buf = BytesMut::new();
    let mut msg = Msg::from_vec(vec![7u8; 300]);
    msg.set_more(true);
    codec.encode(msg, &mut buf).unwrap();
    assert_eq!(buf[0], ZMTP_FLAG_MORE | ZMTP_FLAG_LONG);
    assert_eq!(&buf[1..9], &300u64.to_be_bytes());
    assert_eq!(buf.len(), 9 + 300);

    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded.size(), 300);
    assert!(decoded.is_more());
    assert!(buf.is_empty());
  }

  #[test]
  fn partial_input_waits_for_more_bytes() {
    let mut codec = ZmtpCodec::new(None);
    let mut buf = BytesMut::from(&[0x00u8, 0x03, b'a'][..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    buf.extend_from_slice(b"bc");
    let msg = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(msg.data(), b"abc");
    assert!(!msg.is_more());
  }

  #[test]
  fn oversized_frame_is_a_protocol_violation() {
    let mut codec = ZmtpCodec::new(Some(4));
    let mut buf = BytesMut::from(&[0x00u8, 0x05, 1, 2, 3, 4, 5][..]);
    assert!(matches!(codec.decode(&mut buf), Err(ZmqError::ProtocolViolation(_))));
  }

  #[test]
  fn huge_announced_length_does_not_allocate_up_front() {
    let mut codec = ZmtpCodec::new(None);
    let mut buf = BytesMut::from(&[0x02u8, 0x10, 0, 0, 0, 0, 0, 0, 0, 1][..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(buf.capacity() <= 1 + MAX_RESERVE_CHUNK * 2);

    let mut codec = ZmtpCodec::new(None);
    let mut buf = BytesMut::from(&[0x02u8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff][..]);
    assert!(matches!(codec.decode(&mut buf), Err(ZmqError::ResourceExhausted(_))));
  }

  #[test]
  fn body_arriving_in_pieces_completes() {
    let mut codec = ZmtpCodec::new(None);
    let size = MAX_RESERVE_CHUNK * 3;
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[ZMTP_FLAG_LONG]);
    buf.extend_from_slice(&(size as u64).to_be_bytes());
    let payload = vec![5u8; size];
    for chunk in payload.chunks(10_000) {
      assert!(codec.decode(&mut buf).unwrap().is_none());
      buf.extend_from_slice(chunk);
    }
    let msg = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(msg.size(), size);
  }

  #[test]
  fn command_flag_is_preserved() {
    let mut codec = ZmtpCodec::new(None);
    let mut buf = BytesMut::new();
    codec.encode(ZmtpCommand::create_ready(&[]), &mut buf).unwrap();
    assert_eq!(buf[0], ZMTP_FLAG_COMMAND);
    assert!(codec.decode(&mut buf).unwrap().unwrap().is_command());
  }
}
