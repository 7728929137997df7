//! # gridscope-core: Episode Data Model
//!
//! Raw per-timestep records produced by the grid simulation runner, plus the
//! two small derivation components every table build depends on: the
//! [`TopologyRegistry`] (topology-signature interning) and the action impact
//! classifier ([`impact`]).
//!
//! ## Design Philosophy
//!
//! The simulator hands over already-materialized in-memory sequences; this
//! crate gives them an explicit, statically-checkable shape:
//! - [`Observation`] - per-equipment physical measurements at one timestep
//! - [`GridAction`] - the agent's internal change vectors at one timestep
//! - [`EnvEvent`] - environment-injected hazard/maintenance flags per line
//! - [`EpisodeMeta`] - static equipment metadata (names, counts, types)
//! - [`Episode`] - the aligned bundle of all of the above
//!
//! Every field is enumerated rather than copied reflectively off the source
//! object, so the dependency contract with the runner is visible in one
//! place.
//!
//! An [`Episode`] is validated once up front: observations must number one
//! more than actions (the terminal observation has no following action), and
//! rewards/events must align with actions. Violations are
//! [`EpisodeError::MisalignedSequence`] and abort the analytics build.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod impact;
pub mod topology;

pub use error::{EpisodeError, EpisodeResult};
pub use impact::{classify_action, ActionImpact};
pub use topology::TopologyRegistry;

/// Per-timestep grid snapshot as observed by the agent before acting.
///
/// Vector fields are indexed by equipment: `load_p` by load, `prod_p` by
/// generator, and the flow/voltage/usage vectors by power line. `topo_vect`
/// is indexed by topology-vector element (line ends, generators, loads),
/// substation by substation, encoding which bus each element sits on
/// (default bus is 1, -1 means disconnected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub load_p: Vec<f64>,
    pub prod_p: Vec<f64>,
    /// Usage rate per line: actual flow over thermal limit, >= 0.
    pub rho: Vec<f64>,
    pub p_or: Vec<f64>,
    pub q_or: Vec<f64>,
    pub a_or: Vec<f64>,
    pub v_or: Vec<f64>,
    pub p_ex: Vec<f64>,
    pub q_ex: Vec<f64>,
    pub a_ex: Vec<f64>,
    pub v_ex: Vec<f64>,
    /// Consecutive-overflow duration counter per line.
    pub timestep_overflow: Vec<i64>,
    pub topo_vect: Vec<i32>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour_of_day: u32,
    pub minute_of_hour: u32,
}

impl Observation {
    /// Epoch seconds for this observation's calendar fields.
    ///
    /// This is the canonical time axis: every table built from the episode
    /// uses the same value at matching row indices so equi-joins across
    /// tables stay valid.
    pub fn timestamp(&self) -> EpisodeResult<i64> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            EpisodeError::Parse(format!(
                "invalid calendar date {:04}-{:02}-{:02}",
                self.year, self.month, self.day
            ))
        })?;
        let datetime = date
            .and_hms_opt(self.hour_of_day, self.minute_of_hour, 0)
            .ok_or_else(|| {
                EpisodeError::Parse(format!(
                    "invalid time of day {:02}:{:02}",
                    self.hour_of_day, self.minute_of_hour
                ))
            })?;
        Ok(datetime.and_utc().timestamp())
    }
}

/// Internal change vectors of one agent action.
///
/// `set_line_status` uses +1/-1/0 for reconnect/disconnect/leave;
/// `switch_line_status` toggles. `set_topo_vect` assigns buses directly,
/// `change_bus_vect` flips the bus of flagged elements. `redispatch` carries
/// per-generator active-power deltas in MW.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridAction {
    pub set_line_status: Vec<i32>,
    pub switch_line_status: Vec<bool>,
    pub set_topo_vect: Vec<i32>,
    pub change_bus_vect: Vec<bool>,
    pub redispatch: Vec<f64>,
}

/// Environment-injected events at one timestep: per-line boolean flags for
/// unplanned hazards and scheduled maintenances forcing a line out of
/// service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvEvent {
    pub hazards: Vec<bool>,
    pub maintenances: Vec<bool>,
}

/// Static episode metadata: equipment names, substation layout, generator
/// types, and episode-level scalars reported by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub agent_name: String,
    pub episode_name: String,
    pub line_names: Vec<String>,
    pub load_names: Vec<String>,
    pub gen_names: Vec<String>,
    pub sub_names: Vec<String>,
    /// Number of topology-vector elements owned by each substation, in
    /// substation order. The sum is the topology vector length.
    pub sub_element_counts: Vec<usize>,
    /// Declared production type per generator (wind, solar, nuclear, ...),
    /// parallel to `gen_names`.
    pub gen_types: Vec<String>,
    /// Loads that model interconnection lines rather than real consumption;
    /// excluded from consumption KPIs. Missing entries mean `false`.
    #[serde(default)]
    pub interconnection_loads: Vec<bool>,
    /// Cumulative reward over the whole episode as reported by the runner.
    pub total_reward: f64,
    /// Number of timesteps the agent survived before the episode ended.
    pub nb_timestep_played: usize,
}

impl EpisodeMeta {
    pub fn n_lines(&self) -> usize {
        self.line_names.len()
    }

    pub fn n_loads(&self) -> usize {
        self.load_names.len()
    }

    pub fn n_gens(&self) -> usize {
        self.gen_names.len()
    }

    pub fn n_subs(&self) -> usize {
        self.sub_names.len()
    }

    /// Length of the topology vector implied by the substation layout.
    pub fn topo_vect_len(&self) -> usize {
        self.sub_element_counts.iter().sum()
    }

    /// Index of the substation owning topology-vector element `element`.
    pub fn sub_of_element(&self, element: usize) -> Option<usize> {
        let mut offset = 0;
        for (sub, &count) in self.sub_element_counts.iter().enumerate() {
            offset += count;
            if element < offset {
                return Some(sub);
            }
        }
        None
    }

    /// True when the load at `index` is flagged as an interconnection line.
    pub fn is_interconnection(&self, index: usize) -> bool {
        self.interconnection_loads.get(index).copied().unwrap_or(false)
    }
}

/// One complete recorded run of an agent against the grid simulator.
///
/// `observations` has length T+1 (the last entry is the terminal
/// post-episode observation), while `actions`, `rewards`, and `events` have
/// length T. The observation paired with `actions[t]` is `observations[t]`,
/// the pre-action grid state the agent saw before acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub meta: EpisodeMeta,
    pub observations: Vec<Observation>,
    pub actions: Vec<GridAction>,
    pub rewards: Vec<f64>,
    pub events: Vec<Option<EnvEvent>>,
}

impl Episode {
    /// Number of played timesteps T.
    pub fn n_steps(&self) -> usize {
        self.actions.len()
    }

    /// Check the T+1/T/T/T length relationship and per-observation vector
    /// dimensions against the static metadata.
    pub fn validate(&self) -> EpisodeResult<()> {
        let n_steps = self.n_steps();
        if self.observations.len() != n_steps + 1 {
            return Err(EpisodeError::MisalignedSequence(format!(
                "{} observations for {} actions; expected {}",
                self.observations.len(),
                n_steps,
                n_steps + 1
            )));
        }
        if self.rewards.len() != n_steps {
            return Err(EpisodeError::MisalignedSequence(format!(
                "{} rewards for {} actions",
                self.rewards.len(),
                n_steps
            )));
        }
        if self.events.len() != n_steps {
            return Err(EpisodeError::MisalignedSequence(format!(
                "{} environment events for {} actions",
                self.events.len(),
                n_steps
            )));
        }
        for (t, obs) in self.observations.iter().enumerate() {
            self.validate_observation(t, obs)?;
        }
        Ok(())
    }

    fn validate_observation(&self, t: usize, obs: &Observation) -> EpisodeResult<()> {
        let meta = &self.meta;
        let per_line: [(&str, usize); 10] = [
            ("rho", obs.rho.len()),
            ("p_or", obs.p_or.len()),
            ("q_or", obs.q_or.len()),
            ("a_or", obs.a_or.len()),
            ("v_or", obs.v_or.len()),
            ("p_ex", obs.p_ex.len()),
            ("q_ex", obs.q_ex.len()),
            ("a_ex", obs.a_ex.len()),
            ("v_ex", obs.v_ex.len()),
            ("timestep_overflow", obs.timestep_overflow.len()),
        ];
        for (field, len) in per_line {
            if len != meta.n_lines() {
                return Err(EpisodeError::MisalignedSequence(format!(
                    "observation {t}: {field} has {len} entries for {} lines",
                    meta.n_lines()
                )));
            }
        }
        if obs.load_p.len() != meta.n_loads() {
            return Err(EpisodeError::MisalignedSequence(format!(
                "observation {t}: load_p has {} entries for {} loads",
                obs.load_p.len(),
                meta.n_loads()
            )));
        }
        if obs.prod_p.len() != meta.n_gens() {
            return Err(EpisodeError::MisalignedSequence(format!(
                "observation {t}: prod_p has {} entries for {} generators",
                obs.prod_p.len(),
                meta.n_gens()
            )));
        }
        if obs.topo_vect.len() != meta.topo_vect_len() {
            return Err(EpisodeError::MisalignedSequence(format!(
                "observation {t}: topo_vect has {} elements, substation layout implies {}",
                obs.topo_vect.len(),
                meta.topo_vect_len()
            )));
        }
        Ok(())
    }
}
