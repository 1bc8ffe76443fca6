// PTY process ownership
//
// This crate owns the OS-level pseudo-terminal and the shell process
// spawned into it. It exposes the PTY as two channels: an ordered
// output stream that terminates with an exit sentinel, and an input
// sink that never blocks the async caller. Everything above this crate
// works in terms of bytes and channels; nothing above it touches file
// descriptors.

mod process;

pub use process::{PtyProcess, PtySpawnConfig};

/// One chunk of the session's output stream.
///
/// Chunks are delivered in the order the shell produced them. The
/// stream ends with exactly one `Exited` sentinel, after which the
/// child has been reaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Data(Vec<u8>),
    Exited(i32),
}

/// Read buffer size for the output pump
pub const READ_CHUNK_BYTES: usize = 4096;
