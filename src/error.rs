use thiserror::Error;

/// Refused at construction time; the broadcaster itself is never at fault.
///
/// Most of this crate's error surface is behavioral rather than typed (a
/// cancelled-before-delivery subscribe is just a closed sink, not an `Err`);
/// this is the one boundary-misuse case, mirroring the panic
/// `ConvergeN` raises in the original Go implementation for a non-channel
/// argument, but as a recoverable `Result` instead.
#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("argument {index} is not a receive-capable channel")]
    NotAChannel { index: usize },
}
