//! Synthetic packet generator for exercising the scheduler and display
//! without an RTL-SDR attached. Emits protocol-valid lines from a small
//! fixed corpus at randomized intervals, with the beacon's altitude and
//! longitude rewritten to vary monotonically over the run.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::receiver::{Backend, Receiver};

const CORPUS: &[&str] = &[
    "KE0FZV-11>APZ41N:!4000.00N/10500.00WO111/000/A=005280/S11T34V2317C00",
    "KE0FZV-11>APRS:/222200h4000.00N/10500.00WO000/000/A=005280 Tracksoar",
    "N2XGL-9>S9UYQU,WIDE1-1,WIDE2-1:`q)up7@>/`\"E{}_1\r",
    "W0RMT-9>SYUYRP,WIDE1-1,WIDE2-1:`q&7p,bk/`\"Fv}_4\r",
    "W0RMT-9>SYUYQW,WIDE1-1,WIDE2-1:`q(cohbk/`\"G$}_4<\r",
    "W0RMT-9>SYUXSQ,WIDE1-1,WIDE2-1:`q*OlS\u{1e}k/`\"F`}145.310MHz email@gmail.com_4\r",
    "KB0TVJ-1>APJYC1,WIDE1-1:@215644h4003.25NI10512.42W&144.390MHz TOFF /A=5190 email@gmail.com\r",
    "KB0TVJ-1>APJYC1,WIDE1-1,WIDE2-1:@221244h4003.25NI10512.42W&144.390MHz TOFF /A=5190 email@gmail.com\r",
    "W0SKY-1>APDW17:;449.750  *111111z3947.30N/10518.19Wr449.750MHz Toff -500 DMR TS1 TG310847 SKYHUBLINK.COM",
    "W0JJG-9>3Y5SQZ,WIDE1-1,WIDE2-1:`q[0mTRk/`\"Ep}_%\r",
    "W7JPJ-9>SYSXSV,K5RHD-10,WIDE1*:`pH1l#%j/`\"G=}_%\r",
    "W0SKY-1>APDW17:;447.425  *111111z4027.08N/10645.12Wr447.425MHz -500 N2SKY YSF DIGITAL SKYHUBLINK.COM",
    "W0SKY-1>APDW17:;447.400  *111111z4118.63N/10527.18Wr447.400MHz -500 KE0DNL WIRES-X SKYHUBLINK.COM",
];

pub struct SimulatedBackend {
    /// Shared across windows so the synthetic flight keeps climbing instead
    /// of restarting at every channel switch.
    epoch: Instant,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Backend for SimulatedBackend {
    fn start(&self, _frequency_hz: u32) -> io::Result<Box<dyn Receiver>> {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let epoch = self.epoch;
        let generator = thread::spawn(move || generate(epoch, tx, flag));
        Ok(Box::new(SimulatedReceiver {
            packets: rx,
            stop,
            generator: Some(generator),
        }))
    }
}

fn generate(epoch: Instant, tx: mpsc::Sender<String>, stop: Arc<AtomicBool>) {
    let mut rng = rand::rng();
    let mut next = Instant::now() + Duration::from_secs(rng.random_range(1..=10));
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
        if Instant::now() < next {
            continue;
        }
        next = Instant::now() + Duration::from_secs(rng.random_range(1..=10));
        let line = CORPUS[rng.random_range(0..CORPUS.len())];
        if tx.send(rewrite(line, epoch.elapsed().as_secs_f64())).is_err() {
            return;
        }
    }
}

/// Rewrite the template so the flight climbs ten feet per second from the
/// launch-site elevation and drifts steadily west.
fn rewrite(line: &str, elapsed_s: f64) -> String {
    let altitude_ft = (elapsed_s * 10.0 + 5_280.0) as i64;
    let rewritten = rewrite_altitude(line, altitude_ft);
    rewritten
        .replace("10500.00", &format_longitude(105.0 + elapsed_s / 20_000.0))
        .trim()
        .to_string()
}

fn rewrite_altitude(line: &str, altitude_ft: i64) -> String {
    let Some(start) = line.find("A=") else {
        return line.to_string();
    };
    let digits = line[start + 2..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return line.to_string();
    }
    let mut rewritten = line.to_string();
    rewritten.replace_range(start + 2..start + 2 + digits, &format!("{:06}", altitude_ft));
    rewritten
}

/// DDDMM.MM format, as transmitted in the position field.
fn format_longitude(degrees: f64) -> String {
    let whole = degrees.trunc();
    let minutes = (degrees - whole) * 60.0;
    format!("{}{:05.2}", whole as i64, minutes)
}

struct SimulatedReceiver {
    packets: mpsc::Receiver<String>,
    stop: Arc<AtomicBool>,
    generator: Option<JoinHandle<()>>,
}

impl Receiver for SimulatedReceiver {
    fn is_alive(&self) -> bool {
        self.generator
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn try_recv(&self, timeout: Duration) -> Option<String> {
        self.packets.recv_timeout(timeout).ok()
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(generator) = self.generator.take() {
            let _ = generator.join();
        }
    }
}
