//! Wire protocols.

pub mod zmtp;
