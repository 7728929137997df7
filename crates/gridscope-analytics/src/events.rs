//! Environment event extraction.
//!
//! Hazards and scheduled maintenances are injected by the environment, not
//! chosen by the agent, so they are walked separately from the action pass.
//! A timestep with no event record still emits one zero row per line:
//! omitting it would shrink the table and silently undercount per-line
//! aggregate sums downstream. Output height is always `T x n_lines`.

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use gridscope_core::EnvEvent;

/// Build the hazards and maintenances frames, both shaped
/// `[timestep, timestamp, line_id, line_name, value]` with value in {0, 1}.
pub fn extract_event_tables(
    events: &[Option<EnvEvent>],
    line_names: &[String],
    timestamps: &[i64],
) -> Result<(DataFrame, DataFrame)> {
    if events.len() != timestamps.len() {
        bail!(
            "{} environment events for {} timesteps",
            events.len(),
            timestamps.len()
        );
    }
    let n_lines = line_names.len();
    let mut hazards = EventColumns::with_capacity(events.len() * n_lines);
    let mut maintenances = EventColumns::with_capacity(events.len() * n_lines);

    for (t, event) in events.iter().enumerate() {
        if let Some(event) = event {
            if event.hazards.len() != n_lines || event.maintenances.len() != n_lines {
                bail!(
                    "event at timestep {t} has {}/{} line flags for {} lines",
                    event.hazards.len(),
                    event.maintenances.len(),
                    n_lines
                );
            }
        }
        for (line_id, name) in line_names.iter().enumerate() {
            let (hazard, maintenance) = match event {
                Some(event) => (event.hazards[line_id], event.maintenances[line_id]),
                None => (false, false),
            };
            hazards.push(t, timestamps[t], line_id, name, hazard);
            maintenances.push(t, timestamps[t], line_id, name, maintenance);
        }
    }

    Ok((
        hazards.into_frame().context("assembling hazards frame")?,
        maintenances
            .into_frame()
            .context("assembling maintenances frame")?,
    ))
}

struct EventColumns {
    timestep: Vec<i64>,
    timestamp: Vec<i64>,
    line_id: Vec<i64>,
    line_name: Vec<String>,
    value: Vec<i64>,
}

impl EventColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            timestep: Vec::with_capacity(capacity),
            timestamp: Vec::with_capacity(capacity),
            line_id: Vec::with_capacity(capacity),
            line_name: Vec::with_capacity(capacity),
            value: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, t: usize, stamp: i64, line_id: usize, name: &str, flag: bool) {
        self.timestep.push(t as i64);
        self.timestamp.push(stamp);
        self.line_id.push(line_id as i64);
        self.line_name.push(name.to_string());
        self.value.push(i64::from(flag));
    }

    fn into_frame(self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new("timestep", self.timestep),
            Series::new("timestamp", self.timestamp),
            Series::new("line_id", self.line_id),
            Series::new("line_name", self.line_name),
            Series::new("value", self.value),
        ])
    }
}
