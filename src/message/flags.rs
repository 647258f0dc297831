use bitflags::bitflags;

bitflags! {
  /// Per-frame flags carried by a `Msg`.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct MsgFlags: u8 {
    /// More frames of the same logical message follow this one.
    const MORE = 0b01;
    /// Internal: the frame is a ZMTP command, never surfaced to callers.
    const COMMAND = 0b10;
  }
}

bitflags! {
  /// Flags accepted by `Socket::send_with_flags`.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct SendFlags: i32 {
    /// Fail with `WouldBlock` instead of suspending.
    const DONTWAIT = 1;
    /// Mark the frame as non-final (equivalent to `Msg::set_more(true)`).
    const SNDMORE = 2;
  }
}

bitflags! {
  /// Flags accepted by `Socket::recv_with_flags`.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct RecvFlags: i32 {
    const DONTWAIT = 1;
  }
}
