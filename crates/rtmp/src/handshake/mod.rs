//! RTMP handshake (simple and complex, RTMP Specification 1.0 - 5.2).

use std::io::{self, Seek};
use std::time::SystemTime;

use bytes::Bytes;

pub mod complex;
mod simple;

pub use self::complex::ComplexHandshakeServer;
pub use self::simple::SimpleHandshakeServer;

/// Size, in bytes, of C1/S1/C2/S2.
pub const RTMP_HANDSHAKE_SIZE: usize = 1536;

/// Size, in bytes, of the time and version fields that prefix C1/S1.
pub const TIME_VERSION_LENGTH: usize = 8;

nutype_enum::nutype_enum! {
    /// The RTMP version byte exchanged in C0/S0.
    pub enum RtmpVersion(u8) {
        /// The only version this server speaks.
        Version3 = 3,
    }
}

/// Handshake progress, shared by both the simple and complex state machines.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServerHandshakeState {
    /// Waiting for C0 and C1.
    ReadC0C1,
    /// S0/S1/S2 have been written, waiting for C2.
    ReadC2,
    /// The handshake is complete.
    Finish,
}

pub(crate) fn current_time() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Drives a server-side handshake, starting with the complex (HMAC-verified)
/// variant and falling back to the simple variant if the client's C1 doesn't
/// carry a recognizable digest.
pub enum HandshakeServer {
    /// Attempting, or having settled on, the complex handshake.
    Complex(ComplexHandshakeServer),
    /// Fell back to the simple handshake because C1 had no valid digest.
    Simple(SimpleHandshakeServer),
}

impl Default for HandshakeServer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl HandshakeServer {
    /// Creates a new handshake driver. When `strict` is `true`, a mismatched
    /// echoed digest in C2 fails the handshake instead of being accepted
    /// as-is; this only affects the complex variant, since the simple
    /// handshake never verifies C2 in the first place.
    pub fn new(strict: bool) -> Self {
        Self::Complex(ComplexHandshakeServer::new(strict))
    }

    /// Returns true once S0/S1/S2 have been sent and C2 has been read.
    pub fn is_finished(&self) -> bool {
        match self {
            HandshakeServer::Complex(h) => h.is_finished(),
            HandshakeServer::Simple(h) => h.is_finished(),
        }
    }

    /// Drives the handshake one step. On the first call (while still reading
    /// C0/C1), if the complex handshake can't make sense of C1, the input is
    /// rewound and the handshake restarts as the simple variant. A failure
    /// on a later call (e.g. a strict C2 mismatch) is returned as-is: the
    /// bytes already consumed can't be un-read at that point.
    pub fn handshake(&mut self, input: &mut io::Cursor<Bytes>, output: &mut Vec<u8>) -> Result<(), crate::error::RtmpError> {
        match self {
            HandshakeServer::Complex(handshaker) if !handshaker.is_finished() && handshaker.is_awaiting_c1() => {
                // C1 is fully buffered before any write happens, so on failure
                // nothing has been written to `output` yet and rewinding the
                // cursor is enough to retry as simple.
                let position = input.position();
                let result = handshaker.handshake(input, output);

                if result.is_err() {
                    let mut simple = SimpleHandshakeServer::default();
                    input.seek(io::SeekFrom::Start(position))?;
                    simple.handshake(input, output)?;
                    *self = HandshakeServer::Simple(simple);
                }

                Ok(())
            }
            HandshakeServer::Complex(handshaker) => handshaker.handshake(input, output),
            HandshakeServer::Simple(handshaker) => handshaker.handshake(input, output),
        }
    }
}
