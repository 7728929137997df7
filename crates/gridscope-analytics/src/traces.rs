//! Derived KPI projections over the built frames.
//!
//! Every function here is a pure function of its frame inputs, so each can
//! be unit-tested against literal frames. Grouping is done with simple
//! BTreeMap bucketing over the typed columns; the frames are long-format
//! and already carry the shared timestamp axis.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use tracing::warn;

/// Quantile levels of the fan-chart bands, in ascending order.
pub const BAND_QUANTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Per-timestep count of overflowing lines plus the offending line indices.
///
/// Shape: `[timestep, timestamp, overflow_count, overflow_lines]` where
/// `overflow_lines` is a comma-joined list of line indices (empty string
/// when no line overflows), kept for hover/explanation use.
pub fn total_overflow_trace(rho: &DataFrame) -> Result<DataFrame> {
    let timesteps = rho.column("timestep")?.i64()?;
    let stamps = rho.column("timestamp")?.i64()?;
    let lines = rho.column("equipment_index")?.i64()?;
    let overflow = rho.column("overflow")?.i64()?;

    struct StepEntry {
        stamp: i64,
        lines: Vec<i64>,
    }
    let mut per_step: BTreeMap<i64, StepEntry> = BTreeMap::new();
    for (((t, stamp), line), counter) in timesteps
        .into_iter()
        .zip(stamps)
        .zip(lines)
        .zip(overflow)
    {
        let (Some(t), Some(stamp), Some(line), Some(counter)) = (t, stamp, line, counter) else {
            bail!("rho frame contains null rows");
        };
        let entry = per_step.entry(t).or_insert(StepEntry {
            stamp,
            lines: Vec::new(),
        });
        if counter != 0 {
            entry.lines.push(line);
        }
    }

    let mut out_timestep: Vec<i64> = Vec::with_capacity(per_step.len());
    let mut out_stamp: Vec<i64> = Vec::with_capacity(per_step.len());
    let mut out_count: Vec<i64> = Vec::with_capacity(per_step.len());
    let mut out_lines: Vec<String> = Vec::with_capacity(per_step.len());
    for (t, entry) in per_step {
        out_timestep.push(t);
        out_stamp.push(entry.stamp);
        out_count.push(entry.lines.len() as i64);
        out_lines.push(
            entry
                .lines
                .iter()
                .map(|line| line.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    DataFrame::new(vec![
        Series::new("timestep", out_timestep),
        Series::new("timestamp", out_stamp),
        Series::new("overflow_count", out_count),
        Series::new("overflow_lines", out_lines),
    ])
    .context("assembling overflow trace")
}

/// Usage-rate quantile bands per timestamp, for fan-chart rendering.
///
/// Shape: `[timestamp, q10, q25, q50, q75, q90, max]`, one row per
/// timestamp, quantiles taken across all lines.
pub fn usage_quantile_bands(rho: &DataFrame) -> Result<DataFrame> {
    let stamps = rho.column("timestamp")?.i64()?;
    let values = rho.column("value")?.f64()?;

    let mut per_stamp: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (stamp, value) in stamps.into_iter().zip(values) {
        let (Some(stamp), Some(value)) = (stamp, value) else {
            bail!("rho frame contains null rows");
        };
        per_stamp.entry(stamp).or_default().push(value);
    }

    quantile_band_frame(per_stamp, "timestamp")
}

/// Typical-day consumption profile.
///
/// Sums load over equipment per timestamp (excluding the loads named in
/// `excluded`, typically interconnection lines), folds the totals into
/// fixed time-of-day buckets of `bucket_minutes`, and reports the quantile
/// band per bucket. Answers "what does a typical day look like"
/// independently of which calendar day.
///
/// Shape: `[minute_of_day, q10, q25, q50, q75, q90, max]`.
pub fn consumption_profile(
    load: &DataFrame,
    excluded: &[String],
    bucket_minutes: i64,
) -> Result<DataFrame> {
    if bucket_minutes <= 0 {
        bail!("bucket size must be positive");
    }
    let stamps = load.column("timestamp")?.i64()?;
    let names = load.column("equipment_name")?.utf8()?;
    let values = load.column("value")?.f64()?;

    let mut per_stamp: BTreeMap<i64, f64> = BTreeMap::new();
    for ((stamp, name), value) in stamps.into_iter().zip(names).zip(values) {
        let (Some(stamp), Some(name), Some(value)) = (stamp, name, value) else {
            bail!("load frame contains null rows");
        };
        if excluded.iter().any(|e| e == name) {
            continue;
        }
        *per_stamp.entry(stamp).or_insert(0.0) += value;
    }

    let mut per_bucket: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (stamp, total) in per_stamp {
        let minute_of_day = stamp.rem_euclid(86_400) / 60;
        let bucket = minute_of_day - minute_of_day % bucket_minutes;
        per_bucket.entry(bucket).or_default().push(total);
    }

    quantile_band_frame(per_bucket, "minute_of_day")
}

/// Total maintenance downtime in minutes.
///
/// Multiplies the uniform timestep duration (taken from the first two
/// timestamps) by the number of maintenance-flagged line-timesteps. The
/// uniformity assumption is checked: a violation logs a warning and the
/// total is still computed from the first step's duration, so it may be
/// wrong for non-uniform episodes.
pub fn maintenance_duration_minutes(maintenances: &DataFrame, timestamps: &[i64]) -> Result<f64> {
    let flagged = maintenances
        .column("value")?
        .i64()?
        .sum()
        .unwrap_or(0);
    if timestamps.len() < 2 {
        // No step duration can be derived from fewer than two steps.
        return Ok(0.0);
    }
    let step_seconds = timestamps[1] - timestamps[0];
    if timestamps
        .windows(2)
        .any(|pair| pair[1] - pair[0] != step_seconds)
    {
        warn!(
            step_seconds,
            "non-uniform timestep durations; maintenance total assumes the first step's duration"
        );
    }
    Ok(step_seconds as f64 / 60.0 * flagged as f64)
}

/// Production share by declared generator type.
///
/// Sums production per generator over the episode, then regroups by type
/// into a two-level hierarchy for sunburst-style display: one row per type
/// (empty parent) followed by one row per generator (parent = its type).
///
/// Shape: `[name, parent, value]`.
pub fn production_type_share(
    production: &DataFrame,
    gen_names: &[String],
    gen_types: &[String],
) -> Result<DataFrame> {
    if gen_names.len() != gen_types.len() {
        bail!(
            "{} generator names for {} type labels",
            gen_names.len(),
            gen_types.len()
        );
    }
    let totals = production
        .clone()
        .lazy()
        .group_by([col("equipment_name")])
        .agg([col("value").sum()])
        .collect()
        .context("summing production by equipment")?;

    let type_of: HashMap<&str, &str> = gen_names
        .iter()
        .map(String::as_str)
        .zip(gen_types.iter().map(String::as_str))
        .collect();

    let names = totals.column("equipment_name")?.utf8()?;
    let sums = totals.column("value")?.f64()?;
    // type -> (type total, [(gen, gen total)]), ordered for determinism
    let mut per_type: BTreeMap<&str, (f64, Vec<(&str, f64)>)> = BTreeMap::new();
    for (name, sum) in names.into_iter().zip(sums) {
        let (Some(name), Some(sum)) = (name, sum) else {
            bail!("production totals contain null rows");
        };
        let Some(&gen_type) = type_of.get(name) else {
            bail!("production frame names unknown generator '{name}'");
        };
        let entry = per_type.entry(gen_type).or_insert((0.0, Vec::new()));
        entry.0 += sum;
        entry.1.push((name, sum));
    }

    let mut out_name: Vec<String> = Vec::new();
    let mut out_parent: Vec<String> = Vec::new();
    let mut out_value: Vec<f64> = Vec::new();
    for (gen_type, (type_total, mut gens)) in per_type {
        out_name.push(gen_type.to_string());
        out_parent.push(String::new());
        out_value.push(type_total);
        gens.sort_by(|a, b| a.0.cmp(b.0));
        for (gen, total) in gens {
            out_name.push(gen.to_string());
            out_parent.push(gen_type.to_string());
            out_value.push(total);
        }
    }

    DataFrame::new(vec![
        Series::new("name", out_name),
        Series::new("parent", out_parent),
        Series::new("value", out_value),
    ])
    .context("assembling production share")
}

fn quantile_band_frame(groups: BTreeMap<i64, Vec<f64>>, key_name: &str) -> Result<DataFrame> {
    let mut keys: Vec<i64> = Vec::with_capacity(groups.len());
    let mut bands: [Vec<f64>; 5] = Default::default();
    let mut maxima: Vec<f64> = Vec::with_capacity(groups.len());

    for (key, mut values) in groups {
        values.sort_by(|a, b| a.total_cmp(b));
        keys.push(key);
        for (band, &q) in bands.iter_mut().zip(BAND_QUANTILES.iter()) {
            band.push(percentile(&values, q));
        }
        maxima.push(*values.last().unwrap_or(&f64::NAN));
    }

    let [q10, q25, q50, q75, q90] = bands;
    DataFrame::new(vec![
        Series::new(key_name, keys),
        Series::new("q10", q10),
        Series::new("q25", q25),
        Series::new("q50", q50),
        Series::new("q75", q75),
        Series::new("q90", q90),
        Series::new("max", maxima),
    ])
    .context("assembling quantile bands")
}

/// Linear-interpolation percentile of an already-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = q * (n - 1) as f64;
            let low = rank.floor() as usize;
            let high = rank.ceil() as usize;
            let weight = rank - low as f64;
            sorted[low] * (1.0 - weight) + sorted[high] * weight
        }
    }
}
