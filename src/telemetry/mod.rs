mod decoder;
mod error;
mod message;
mod wire;

pub use decoder::decode;
pub use error::DecodeError;
pub use message::Message;
