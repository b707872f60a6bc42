//! Protocole slimproto : découpage des trames et messages

pub mod codec;
pub mod messages;

pub use codec::{ClientFrame, SlimCodec, ServerFrame};
pub use messages::{
    ClientMessage, Helo, IrCode, MacAddress, Stat, StreamCommand, audio_path, framebuffer, strm,
};
