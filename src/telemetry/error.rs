use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unframeable packet")]
    Framing,
    #[error("malformed position field")]
    Position,
    #[error("malformed mic-e encoding")]
    MicE,
}
