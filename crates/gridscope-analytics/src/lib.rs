//! # gridscope-analytics: Episode Analytics Pipeline
//!
//! Transforms raw per-timestep simulation records into the denormalized
//! long-format frames and derived KPIs every dashboard view reads.
//!
//! ## Pipeline
//!
//! ```text
//! raw episode records
//!     -> topology registry + action classifier + tabular builder   (one pass)
//!     -> environment event extractor                               (one pass)
//!     -> derived trace/KPI layer                                   (over the frames)
//!     -> EpisodeAnalytics facade, cached and read many times
//! ```
//!
//! Construction either completes and produces a valid facade or fails and
//! produces nothing; there is no partial or resumable state. Once built, an
//! [`EpisodeAnalytics`] is read-only and safe to share across concurrent
//! readers.
//!
//! ## Modules
//!
//! - [`tables`] - the single-pass per-timestep tabular builder
//! - [`events`] - hazard/maintenance event extraction
//! - [`traces`] - pure KPI projections over the built frames
//! - [`facade`] - the [`EpisodeAnalytics`] read-only view
//! - Parquet/JSON persistence lives on the facade (`save`/`load_from`)

pub mod events;
pub mod facade;
pub mod persist;
pub mod tables;
pub mod traces;

pub use events::extract_event_tables;
pub use facade::{EpisodeAnalytics, PROFILE_BUCKET_MINUTES};
pub use tables::{EpisodeTable, QUANTITIES, SIDES};
pub use traces::{
    consumption_profile, maintenance_duration_minutes, production_type_share,
    total_overflow_trace, usage_quantile_bands, BAND_QUANTILES,
};

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the unit tests in this crate.

    use gridscope_core::{EnvEvent, Episode, EpisodeMeta, GridAction, Observation};

    /// Metadata for a toy grid: 2 lines, 2 loads, 2 generators, 2
    /// substations with 3 topology elements each.
    pub fn two_sub_meta() -> EpisodeMeta {
        EpisodeMeta {
            agent_name: "do_nothing".into(),
            episode_name: "jan_week_1".into(),
            line_names: vec!["line_0_1".into(), "line_1_2".into()],
            load_names: vec!["load_1".into(), "load_2".into()],
            gen_names: vec!["gen_solar".into(), "gen_nuclear".into()],
            sub_names: vec!["sub_0".into(), "sub_1".into()],
            sub_element_counts: vec![3, 3],
            gen_types: vec!["solar".into(), "nuclear".into()],
            interconnection_loads: vec![],
            total_reward: 2.5,
            nb_timestep_played: 3,
        }
    }

    /// Observation with calm values everywhere, sized for [`two_sub_meta`].
    pub fn observation(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Observation {
        Observation {
            load_p: vec![10.0, 20.0],
            prod_p: vec![15.0, 15.0],
            rho: vec![0.4, 0.6],
            p_or: vec![5.0, 6.0],
            q_or: vec![1.0, 1.5],
            a_or: vec![100.0, 120.0],
            v_or: vec![142.0, 142.0],
            p_ex: vec![-5.0, -6.0],
            q_ex: vec![-1.0, -1.5],
            a_ex: vec![100.0, 120.0],
            v_ex: vec![142.0, 142.0],
            timestep_overflow: vec![0, 0],
            topo_vect: vec![1; 6],
            year,
            month,
            day,
            hour_of_day: hour,
            minute_of_hour: minute,
        }
    }

    pub fn noop_action(meta: &EpisodeMeta) -> GridAction {
        GridAction {
            set_line_status: vec![0; meta.n_lines()],
            switch_line_status: vec![false; meta.n_lines()],
            set_topo_vect: vec![0; meta.topo_vect_len()],
            change_bus_vect: vec![false; meta.topo_vect_len()],
            redispatch: vec![0.0; meta.n_gens()],
        }
    }

    /// Three timesteps on a 5-minute grid with rewards `[1.0, 2.0, -0.5]`,
    /// one hazard at t=0 and one maintenance at t=2, all-noop actions.
    pub fn three_step_episode() -> Episode {
        let meta = two_sub_meta();
        let mut observations = Vec::new();
        for minute in [0u32, 5, 10, 15] {
            let mut obs = observation(2019, 1, 6, 0, minute);
            // vary usage a little so quantile bands are not degenerate
            obs.rho = vec![0.4 + minute as f64 / 100.0, 0.6];
            observations.push(obs);
        }
        let actions = vec![noop_action(&meta); 3];
        let events = vec![
            Some(EnvEvent {
                hazards: vec![true, false],
                maintenances: vec![false, false],
            }),
            None,
            Some(EnvEvent {
                hazards: vec![false, false],
                maintenances: vec![false, true],
            }),
        ];
        Episode {
            meta,
            observations,
            actions,
            rewards: vec![1.0, 2.0, -0.5],
            events,
        }
    }
}
