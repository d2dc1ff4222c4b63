//! Session, stream buffer, and fan-out engine for a live RTMP media server.
//!
//! This crate owns everything above the wire protocol: the publish/play session model, the
//! per-stream ring buffer with GOP indexing and codec-header caching, audio/video timestamp
//! correction, and the player push loop. The wire protocol itself (handshake, chunk framing,
//! AMF0 commands) lives in `scuffle-rtmp`; [`rtmp_adapter`] is the glue between the two.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

pub mod error;
pub mod packet;
pub mod player;
pub mod registry;
pub mod rtmp_adapter;
pub mod session;
pub mod stream;
pub mod time_corrector;
pub mod user;

pub use error::LiveError;
pub use packet::{Packet, PacketExtension, PacketType};
pub use registry::SessionRegistry;
pub use rtmp_adapter::{AppSettingsResolver, RtmpHandler};
pub use session::{AppSettings, Session};
pub use stream::Stream;
pub use user::{PlayerSink, TcUrl, User, UserKind, UserType};
