//! pulse-protocol – Frame-Definitionen und Wire-Codec
//!
//! Dieses Crate definiert alle Frames, die zwischen Client und Relay
//! ausgetauscht werden, sowie den laengenpraefixierten JSON-Codec.

pub mod frames;
pub mod wire;

pub use frames::{
    AuthResponseFrame, ChatMessage, ConnectFrame, DeliveryReceiptFrame, ErrorFrame, PingFrame,
    PongFrame, PresenceFrame, ProfileUpdateFrame, ReadReceiptFrame, RelayFrame, TypingFrame,
};
pub use wire::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
