//! Per-timestep tabular builder.
//!
//! Walks the aligned (observation, action, reward) sequence once and
//! populates the long-format frames every dashboard view reads: loads,
//! production, line usage rate, flow/voltage at both line ends, and the
//! action/reward table. The observation used at row t is the pre-action
//! observation, the grid state the agent saw before acting; swapping in the
//! post-action observation would silently shift every KPI by one step.

use anyhow::{Context, Result};
use polars::prelude::*;

use gridscope_core::{classify_action, Episode, EpisodeError, TopologyRegistry};

/// Both ends of a power line.
pub const SIDES: [&str; 2] = ["or", "ex"];

/// Physical quantities recorded per line end.
pub const QUANTITIES: [&str; 4] = ["active", "reactive", "current", "voltage"];

/// The five per-timestep frames plus the canonical time axis.
///
/// All frames carry identical `timestamp` values at matching timesteps so
/// presentation code can equi-join them freely.
#[derive(Debug, Clone)]
pub struct EpisodeTable {
    /// `[timestep, timestamp, equipment_id, equipment_name, value]`, one row
    /// per load per timestep.
    pub load: DataFrame,
    /// Same shape as `load`, one row per generator per timestep.
    pub production: DataFrame,
    /// `[timestep, timestamp, equipment_index, value, overflow]`, one row
    /// per line per timestep.
    pub rho: DataFrame,
    /// One row per timestep: reward, cumulative reward, and the action
    /// impact classification.
    pub action_table: DataFrame,
    /// `[timestep, timestamp, side, quantity, line_name, value]`, one row
    /// per line per side per quantity per timestep.
    pub flow_voltage: DataFrame,
    /// Epoch seconds per timestep, length T, strictly increasing.
    pub timestamps: Vec<i64>,
}

impl EpisodeTable {
    /// Single forward pass over the episode, t = 0 .. T-1.
    ///
    /// Interning through `registry` is the only mutation shared across
    /// timesteps; the caller owns the registry so the facade can expose it
    /// afterwards.
    pub fn build(episode: &Episode, registry: &mut TopologyRegistry) -> Result<Self> {
        episode.validate().context("validating episode records")?;
        let meta = &episode.meta;
        let n_steps = episode.n_steps();

        let mut timestamps = Vec::with_capacity(n_steps);
        for (t, obs) in episode.observations.iter().take(n_steps).enumerate() {
            let stamp = obs
                .timestamp()
                .with_context(|| format!("deriving timestamp for timestep {t}"))?;
            if let Some(&prev) = timestamps.last() {
                if stamp <= prev {
                    return Err(EpisodeError::Parse(format!(
                        "timestamps not strictly increasing: timestep {t} has {stamp} after {prev}"
                    ))
                    .into());
                }
            }
            timestamps.push(stamp);
        }

        let mut load = LongColumns::with_capacity(n_steps * meta.n_loads());
        let mut production = LongColumns::with_capacity(n_steps * meta.n_gens());

        let mut rho_timestep: Vec<i64> = Vec::with_capacity(n_steps * meta.n_lines());
        let mut rho_stamp: Vec<i64> = Vec::with_capacity(n_steps * meta.n_lines());
        let mut rho_index: Vec<i64> = Vec::with_capacity(n_steps * meta.n_lines());
        let mut rho_value: Vec<f64> = Vec::with_capacity(n_steps * meta.n_lines());
        let mut rho_overflow: Vec<i64> = Vec::with_capacity(n_steps * meta.n_lines());

        let flow_rows = n_steps * meta.n_lines() * SIDES.len() * QUANTITIES.len();
        let mut flow_timestep: Vec<i64> = Vec::with_capacity(flow_rows);
        let mut flow_stamp: Vec<i64> = Vec::with_capacity(flow_rows);
        let mut flow_side: Vec<&str> = Vec::with_capacity(flow_rows);
        let mut flow_quantity: Vec<&str> = Vec::with_capacity(flow_rows);
        let mut flow_line: Vec<String> = Vec::with_capacity(flow_rows);
        let mut flow_value: Vec<f64> = Vec::with_capacity(flow_rows);

        let mut action_timestep: Vec<i64> = Vec::with_capacity(n_steps);
        let mut action_stamp: Vec<i64> = Vec::with_capacity(n_steps);
        let mut action_reward: Vec<f64> = Vec::with_capacity(n_steps);
        let mut action_cum_reward: Vec<f64> = Vec::with_capacity(n_steps);
        let mut action_lines: Vec<i64> = Vec::with_capacity(n_steps);
        let mut action_subs: Vec<i64> = Vec::with_capacity(n_steps);
        let mut action_redisp: Vec<i64> = Vec::with_capacity(n_steps);
        let mut action_line_desc: Vec<Option<String>> = Vec::with_capacity(n_steps);
        let mut action_sub_desc: Vec<Option<String>> = Vec::with_capacity(n_steps);
        let mut action_signature: Vec<Option<i64>> = Vec::with_capacity(n_steps);
        let mut action_distance: Vec<i64> = Vec::with_capacity(n_steps);

        let mut cum_reward = 0.0;
        for t in 0..n_steps {
            let obs = &episode.observations[t];
            let stamp = timestamps[t];

            for (i, &value) in obs.load_p.iter().enumerate() {
                load.push(t, stamp, i, &meta.load_names[i], value);
            }
            for (i, &value) in obs.prod_p.iter().enumerate() {
                production.push(t, stamp, i, &meta.gen_names[i], value);
            }
            for (i, &value) in obs.rho.iter().enumerate() {
                rho_timestep.push(t as i64);
                rho_stamp.push(stamp);
                rho_index.push(i as i64);
                rho_value.push(value);
                rho_overflow.push(obs.timestep_overflow[i]);
            }

            let per_side: [(&str, [&[f64]; 4]); 2] = [
                (
                    "or",
                    [
                        obs.p_or.as_slice(),
                        obs.q_or.as_slice(),
                        obs.a_or.as_slice(),
                        obs.v_or.as_slice(),
                    ],
                ),
                (
                    "ex",
                    [
                        obs.p_ex.as_slice(),
                        obs.q_ex.as_slice(),
                        obs.a_ex.as_slice(),
                        obs.v_ex.as_slice(),
                    ],
                ),
            ];
            for (side, series) in per_side {
                for (&quantity, values) in QUANTITIES.iter().zip(series) {
                    for (i, &value) in values.iter().enumerate() {
                        flow_timestep.push(t as i64);
                        flow_stamp.push(stamp);
                        flow_side.push(side);
                        flow_quantity.push(quantity);
                        flow_line.push(meta.line_names[i].clone());
                        flow_value.push(value);
                    }
                }
            }

            let impact = classify_action(&episode.actions[t], obs, meta, registry)
                .with_context(|| format!("classifying action at timestep {t}"))?;
            cum_reward += episode.rewards[t];

            action_timestep.push(t as i64);
            action_stamp.push(stamp);
            action_reward.push(episode.rewards[t]);
            action_cum_reward.push(cum_reward);
            action_lines.push(impact.lines_touched as i64);
            action_subs.push(impact.subs_touched as i64);
            action_redisp.push(impact.redisp_touched as i64);
            action_line_desc.push(impact.line_description);
            action_sub_desc.push(impact.sub_description);
            action_signature.push(impact.topology_signature_id.map(|id| id as i64));
            action_distance.push(impact.topological_distance as i64);
        }

        let rho = DataFrame::new(vec![
            Series::new("timestep", rho_timestep),
            Series::new("timestamp", rho_stamp),
            Series::new("equipment_index", rho_index),
            Series::new("value", rho_value),
            Series::new("overflow", rho_overflow),
        ])
        .context("assembling rho frame")?;

        let flow_voltage = DataFrame::new(vec![
            Series::new("timestep", flow_timestep),
            Series::new("timestamp", flow_stamp),
            Series::new("side", flow_side),
            Series::new("quantity", flow_quantity),
            Series::new("line_name", flow_line),
            Series::new("value", flow_value),
        ])
        .context("assembling flow/voltage frame")?;

        let action_table = DataFrame::new(vec![
            Series::new("timestep", action_timestep),
            Series::new("timestamp", action_stamp),
            Series::new("reward", action_reward),
            Series::new("cum_reward", action_cum_reward),
            Series::new("lines_touched", action_lines),
            Series::new("subs_touched", action_subs),
            Series::new("redisp_touched", action_redisp),
            Series::new("line_description", action_line_desc),
            Series::new("sub_description", action_sub_desc),
            Series::new("topology_signature_id", action_signature),
            Series::new("distance", action_distance),
        ])
        .context("assembling action frame")?;

        Ok(Self {
            load: load.into_frame().context("assembling load frame")?,
            production: production
                .into_frame()
                .context("assembling production frame")?,
            rho,
            action_table,
            flow_voltage,
            timestamps,
        })
    }
}

/// Column buffers for the shared load/production long-format shape.
struct LongColumns {
    timestep: Vec<i64>,
    timestamp: Vec<i64>,
    equipment_id: Vec<i64>,
    equipment_name: Vec<String>,
    value: Vec<f64>,
}

impl LongColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            timestep: Vec::with_capacity(capacity),
            timestamp: Vec::with_capacity(capacity),
            equipment_id: Vec::with_capacity(capacity),
            equipment_name: Vec::with_capacity(capacity),
            value: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, t: usize, stamp: i64, equipment: usize, name: &str, value: f64) {
        self.timestep.push(t as i64);
        self.timestamp.push(stamp);
        self.equipment_id.push(equipment as i64);
        self.equipment_name.push(name.to_string());
        self.value.push(value);
    }

    fn into_frame(self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new("timestep", self.timestep),
            Series::new("timestamp", self.timestamp),
            Series::new("equipment_id", self.equipment_id),
            Series::new("equipment_name", self.equipment_name),
            Series::new("value", self.value),
        ])
    }
}
