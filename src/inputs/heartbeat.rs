use crate::accumulator::Accumulator;
use crate::config::parse_duration;
use crate::error::PluginError;
use crate::metric::{FieldValue, Fields, Tags};
use crate::plugin::{Capabilities, Input};
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SAMPLE_CONFIG: &str = r#"[inputs.heartbeat]
  ## How often to emit a beat
  # period = "10s"

  ## Extra tags added to every beat
  # [inputs.heartbeat.tags]
  #   service = "backup"
"#;

/// Service input emitting a numbered beat from a background thread
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Heartbeat {
    period: String,
    tags: Tags,
    #[serde(skip)]
    interval: Duration,
    #[serde(skip)]
    worker: Option<Worker>,
}

/// Background beat thread; dropping it stops and joins the thread
#[derive(Debug)]
struct Worker {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn shutdown(&mut self) -> Result<(), PluginError> {
        let _ = self.stop.send(());
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PluginError::failed("heartbeat thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            period: "10s".to_string(),
            tags: Tags::new(),
            interval: Duration::ZERO,
            worker: None,
        }
    }
}

impl Heartbeat {
    fn beat_thread(
        interval: Duration,
        tags: Tags,
        acc: Accumulator,
        stop: mpsc::Receiver<()>,
    ) {
        let mut beat: i64 = 0;
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if acc.is_closed() {
                        debug!("Output closed, heartbeat thread exiting");
                        break;
                    }
                    beat += 1;
                    let mut fields = Fields::new();
                    fields.insert("beat".to_string(), FieldValue::Integer(beat));
                    acc.add_fields("heartbeat", fields, tags.clone(), Utc::now());
                }
                // Stop requested or the plugin was dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Heartbeat thread stopped after {} beats", beat);
    }
}

impl Input for Heartbeat {
    fn description(&self) -> String {
        "Emit a numbered heartbeat on a fixed period".to_string()
    }

    fn sample_config(&self) -> String {
        SAMPLE_CONFIG.to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVICE
    }

    fn init(&mut self) -> Result<(), PluginError> {
        let interval =
            parse_duration(&self.period).map_err(|e| PluginError::failed(e.to_string()))?;
        if interval.is_zero() {
            return Err(PluginError::failed("period must be greater than zero"));
        }
        self.interval = interval;
        Ok(())
    }

    fn start(&mut self, acc: &Accumulator) -> Result<(), PluginError> {
        if self.worker.is_some() {
            return Err(PluginError::failed("heartbeat is already running"));
        }
        if self.interval.is_zero() {
            self.init()?;
        }

        info!("Starting heartbeat every {:?}", self.interval);
        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = self.interval;
        let tags = self.tags.clone();
        let acc = acc.clone();
        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || Self::beat_thread(interval, tags, acc, stop_rx))?;

        self.worker = Some(Worker {
            stop: stop_tx,
            handle: Some(handle),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PluginError> {
        let Some(mut worker) = self.worker.take() else {
            debug!("Heartbeat already stopped");
            return Ok(());
        };

        info!("Stopping heartbeat");
        worker.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_protocol::parse;
    use crate::testutil::SharedBuffer;
    use crate::writer::MetricWriter;

    fn accumulator(buffer: &SharedBuffer) -> Accumulator {
        let (tx, _rx) = mpsc::channel();
        Accumulator::new(MetricWriter::new(Box::new(buffer.clone())), tx)
    }

    fn heartbeat(settings: &str) -> Heartbeat {
        let mut input: Heartbeat = toml::from_str(settings).unwrap();
        input.init().unwrap();
        input
    }

    #[test]
    fn test_beats_are_numbered_in_order() {
        let buffer = SharedBuffer::new();
        let mut input = heartbeat("period = \"10ms\"\n[tags]\nservice = \"backup\"");

        input.start(&accumulator(&buffer)).unwrap();
        let lines = buffer.wait_for_lines(3, Duration::from_secs(10));
        input.stop().unwrap();

        assert!(lines.len() >= 3);
        for (i, line) in lines.iter().take(3).enumerate() {
            let metric = parse(line).unwrap();
            assert_eq!(metric.name(), "heartbeat");
            assert_eq!(metric.fields()["beat"], FieldValue::Integer(i as i64 + 1));
            assert_eq!(metric.tags()["service"], "backup");
        }
    }

    #[test]
    fn test_stop_is_prompt_and_idempotent() {
        let buffer = SharedBuffer::new();
        let mut input = heartbeat("period = \"1h\"");

        input.start(&accumulator(&buffer)).unwrap();
        let begin = std::time::Instant::now();
        input.stop().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(5));
        input.stop().unwrap();

        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_no_beats_after_stop() {
        let buffer = SharedBuffer::new();
        let mut input = heartbeat("period = \"5ms\"");

        input.start(&accumulator(&buffer)).unwrap();
        buffer.wait_for_lines(1, Duration::from_secs(10));
        input.stop().unwrap();

        let count = buffer.lines().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(buffer.lines().len(), count);
    }

    #[test]
    fn test_start_twice_fails() {
        let buffer = SharedBuffer::new();
        let acc = accumulator(&buffer);
        let mut input = heartbeat("period = \"1h\"");

        input.start(&acc).unwrap();
        assert!(input.start(&acc).is_err());
        input.stop().unwrap();
    }

    #[test]
    fn test_init_validates_period() {
        for period in ["soon", "0s", ""] {
            let mut input: Heartbeat = toml::from_str(&format!("period = \"{}\"", period)).unwrap();
            assert!(input.init().is_err(), "period {:?} should be rejected", period);
        }

        let mut input = Heartbeat::default();
        input.init().unwrap();
        assert_eq!(input.interval, Duration::from_secs(10));
    }
}
