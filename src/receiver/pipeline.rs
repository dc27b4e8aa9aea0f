//! The real pipeline: `rtl_fm` demodulating the channel into raw audio,
//! piped into `direwolf` which emits one text line per decoded packet.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::receiver::{Backend, Receiver};

pub struct SdrBackend {
    direwolf_config: String,
    packet_log: String,
}

impl SdrBackend {
    pub fn new() -> Self {
        Self {
            direwolf_config: "sdr.conf".to_string(),
            packet_log: "aprs.log".to_string(),
        }
    }
}

impl Backend for SdrBackend {
    fn start(&self, frequency_hz: u32) -> io::Result<Box<dyn Receiver>> {
        let mut demodulator = Command::new("rtl_fm")
            .args(["-f", &frequency_hz.to_string(), "-p", "0", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let audio = demodulator
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("demodulator stdout was not captured"))?;

        let decoder = Command::new("direwolf")
            .args(["-c", &self.direwolf_config, "-r", "24000", "-D", "1", "-t", "0"])
            .args(["-L", &self.packet_log, "-"])
            .stdin(Stdio::from(audio))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let mut decoder = match decoder {
            Ok(child) => child,
            Err(e) => {
                let _ = demodulator.kill();
                let _ = demodulator.wait();
                return Err(e);
            }
        };
        let lines = decoder
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("decoder stdout was not captured"))?;

        debug!(
            "Pipeline started for {} Hz (rtl_fm pid {}, direwolf pid {})",
            frequency_hz,
            demodulator.id(),
            decoder.id()
        );

        let (tx, rx) = mpsc::channel();
        let drain = thread::spawn(move || drain_packets(lines, tx));

        Ok(Box::new(PipelineReceiver {
            demodulator: Mutex::new(Some(demodulator)),
            decoder: Some(decoder),
            packets: rx,
            drain: Some(drain),
        }))
    }
}

/// Forward decoder output, keeping only packet lines. Direwolf tags each
/// decoded packet with a channel prefix like "[0] "; everything else is
/// diagnostic chatter and is discarded.
fn drain_packets(stdout: ChildStdout, tx: mpsc::Sender<String>) {
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else {
            return;
        };
        let bytes = line.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'[' || !bytes[1].is_ascii_digit() {
            continue;
        }
        let Some((_, packet)) = line.split_once(' ') else {
            continue;
        };
        let packet = packet.trim();
        if packet.is_empty() {
            continue;
        }
        if tx.send(packet.to_string()).is_err() {
            return;
        }
    }
}

struct PipelineReceiver {
    demodulator: Mutex<Option<Child>>,
    decoder: Option<Child>,
    packets: mpsc::Receiver<String>,
    drain: Option<JoinHandle<()>>,
}

impl Receiver for PipelineReceiver {
    fn is_alive(&self) -> bool {
        let mut guard = self.demodulator.lock().unwrap();
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn try_recv(&self, timeout: Duration) -> Option<String> {
        self.packets.recv_timeout(timeout).ok()
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.demodulator.lock().unwrap().take() {
            debug!("Stopping demodulator (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(mut child) = self.decoder.take() {
            debug!("Stopping decoder (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
        // Killing the decoder closes its stdout, which ends the drain thread.
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
    }
}

impl Drop for PipelineReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
