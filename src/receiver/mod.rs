//! Receiver supervision: one handle per acquisition window over whichever
//! pipeline produces decoded packet lines.

mod pipeline;
mod simulate;

pub use pipeline::SdrBackend;
pub use simulate::SimulatedBackend;

use std::io;
use std::time::Duration;

/// A live pipeline for one acquisition window.
pub trait Receiver {
    /// False once any part of the pipeline has exited.
    fn is_alive(&self) -> bool;

    /// Wait up to `timeout` for the next decoded packet line.
    fn try_recv(&self, timeout: Duration) -> Option<String>;

    /// Tear the pipeline down and block until it is confirmed terminated.
    /// Idempotent.
    fn stop(&mut self);
}

/// Starts a pipeline tuned to one channel.
pub trait Backend {
    fn start(&self, frequency_hz: u32) -> io::Result<Box<dyn Receiver>>;
}
