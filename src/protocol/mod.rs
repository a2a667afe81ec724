//! Wire protocol: message envelopes and the frame codec.
//!
//! ```rust
//! use bytes::BytesMut;
//! use kickoff::protocol::{Envelope, FrameCodec};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut codec = FrameCodec::new();
//! let mut buf = BytesMut::new();
//! codec.encode(&Envelope::InitComplete, &mut buf).unwrap();
//!
//! assert!(FrameCodec::has_complete_frame(&buf));
//! assert_eq!(codec.decode(&mut buf).unwrap(), Some(Envelope::InitComplete));
//! ```

mod codec;
mod envelope;

pub use codec::{FrameCodec, LENGTH_PREFIX_LEN, MAX_PAYLOAD_LEN};
pub use envelope::{Envelope, MessageKind};
