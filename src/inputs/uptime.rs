use crate::accumulator::Accumulator;
use crate::error::PluginError;
use crate::metric::{FieldValue, Fields, Tags};
use crate::plugin::{Capabilities, Input};
use chrono::Utc;
use serde::Deserialize;
use std::time::Instant;

const SAMPLE_CONFIG: &str = r#"[inputs.uptime]
  ## Measurement name to report under
  # measurement = "uptime"

  ## Extra tags added to every report
  # [inputs.uptime.tags]
  #   host = "$HOSTNAME"
"#;

/// Polling input reporting how long the plugin has been running
///
/// Each gather emits `uptime_seconds` (float, seconds since `init`) and
/// `gathers` (integer, number of gathers including this one).
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Uptime {
    measurement: String,
    tags: Tags,
    #[serde(skip)]
    started: Option<Instant>,
    #[serde(skip)]
    gathers: i64,
}

impl Default for Uptime {
    fn default() -> Self {
        Self {
            measurement: "uptime".to_string(),
            tags: Tags::new(),
            started: None,
            gathers: 0,
        }
    }
}

impl Input for Uptime {
    fn description(&self) -> String {
        "Report the uptime of the shim process".to_string()
    }

    fn sample_config(&self) -> String {
        SAMPLE_CONFIG.to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::POLLING
    }

    fn init(&mut self) -> Result<(), PluginError> {
        if self.measurement.is_empty() {
            return Err(PluginError::failed("measurement must not be empty"));
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    fn gather(&mut self, acc: &Accumulator) -> Result<(), PluginError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.gathers += 1;

        let mut fields = Fields::new();
        fields.insert(
            "uptime_seconds".to_string(),
            FieldValue::Float(started.elapsed().as_secs_f64()),
        );
        fields.insert("gathers".to_string(), FieldValue::Integer(self.gathers));

        acc.add_fields(&self.measurement, fields, self.tags.clone(), Utc::now());
        Ok(())
    }
}
