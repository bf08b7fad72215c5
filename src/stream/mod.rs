pub mod decoder;
pub mod streamer;
pub mod transport;

pub use decoder::decode_fragments;
pub use streamer::{stream_response, StreamEvent, StreamOutcome};
pub use transport::{ByteStream, ChatTransport, RelayTransport};
