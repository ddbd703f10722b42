use crate::events::ShimEvent;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

/// Listener for the control stream (standard input of the shim)
///
/// Each received line, empty or not, asks for an immediate collection. The
/// end of the stream means the host wants the shim to exit. The listener
/// only reacts to the stream; it never closes it.
pub struct SignalListener;

impl SignalListener {
    /// Spawn the listener on its own thread
    ///
    /// The thread blocks in `read` and cannot be interrupted, so the run loop
    /// does not join it; it ends on end-of-stream or with the process.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread could not be spawned.
    pub fn spawn(
        input: Box<dyn Read + Send>,
        events: Sender<ShimEvent>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || {
                let requests = Self::listen(BufReader::new(input), &events);
                debug!("Signal listener stopped after {} collect requests", requests);
            })
    }

    /// Read the control stream until it ends, forwarding events
    ///
    /// Sends one `CollectNow` per line and exactly one `Shutdown` at
    /// end-of-stream. A read error is treated as end-of-stream. Returns the
    /// number of collect requests forwarded.
    pub fn listen<R: BufRead>(mut reader: R, events: &Sender<ShimEvent>) -> usize {
        let mut requests = 0;
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    info!("Control stream closed, requesting shutdown");
                    break;
                }
                Ok(_) => {
                    debug!("Collect request received on control stream");
                    if events.send(ShimEvent::CollectNow).is_err() {
                        // Run loop is gone, nobody is left to shut down
                        return requests;
                    }
                    requests += 1;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to read control stream: {}. Requesting shutdown", e);
                    break;
                }
            }
        }

        let _ = events.send(ShimEvent::Shutdown);
        requests
    }
}
