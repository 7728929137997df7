//! The episode analytics facade.
//!
//! Owns construction ordering: the topology registry and classifier exist
//! before the tabular builder runs, the event extractor is independent, and
//! the derived traces run strictly after the tables are complete. After
//! [`EpisodeAnalytics::build`] returns the object is read-only, so it can be
//! shared across any number of concurrent readers without locking.

use std::collections::HashMap;

use anyhow::{Context, Result};
use polars::prelude::DataFrame;

use gridscope_core::{Episode, EpisodeError, EpisodeMeta, EpisodeResult, TopologyRegistry};

use crate::events::extract_event_tables;
use crate::tables::EpisodeTable;
use crate::traces::{
    consumption_profile, maintenance_duration_minutes, production_type_share,
    total_overflow_trace, usage_quantile_bands,
};

/// Time-of-day bucket width of the consumption profile, in minutes.
pub const PROFILE_BUCKET_MINUTES: i64 = 30;

/// The unified read-only view over one episode, consumed by every dashboard
/// view for one `(agent, episode)` pair.
///
/// Construction is proportional to T x n_equipment and happens exactly
/// once; caching per key is the collaborator's concern, not this type's.
#[derive(Debug, Clone)]
pub struct EpisodeAnalytics {
    pub(crate) meta: EpisodeMeta,
    pub(crate) registry: TopologyRegistry,
    pub(crate) load: DataFrame,
    pub(crate) production: DataFrame,
    pub(crate) rho: DataFrame,
    pub(crate) action_table: DataFrame,
    pub(crate) flow_voltage: DataFrame,
    pub(crate) hazards: DataFrame,
    pub(crate) maintenances: DataFrame,
    pub(crate) overflow: DataFrame,
    pub(crate) usage_bands: DataFrame,
    pub(crate) consumption: DataFrame,
    pub(crate) production_share: DataFrame,
    pub(crate) maintenance_minutes: f64,
    pub(crate) timestamps: Vec<i64>,
    pub(crate) load_ids: HashMap<String, usize>,
    pub(crate) gen_ids: HashMap<String, usize>,
    pub(crate) line_ids: HashMap<String, usize>,
}

impl EpisodeAnalytics {
    /// One build pass over the raw records, then immutable.
    pub fn build(episode: &Episode) -> Result<Self> {
        let mut registry = TopologyRegistry::new();
        let table = EpisodeTable::build(episode, &mut registry)
            .context("building per-timestep tables")?;
        let (hazards, maintenances) = extract_event_tables(
            &episode.events,
            &episode.meta.line_names,
            &table.timestamps,
        )
        .context("extracting environment event tables")?;

        let overflow = total_overflow_trace(&table.rho)?;
        let usage_bands = usage_quantile_bands(&table.rho)?;
        let excluded: Vec<String> = episode
            .meta
            .load_names
            .iter()
            .enumerate()
            .filter(|(i, _)| episode.meta.is_interconnection(*i))
            .map(|(_, name)| name.clone())
            .collect();
        let consumption = consumption_profile(&table.load, &excluded, PROFILE_BUCKET_MINUTES)?;
        let maintenance_minutes = maintenance_duration_minutes(&maintenances, &table.timestamps)?;
        let production_share = production_type_share(
            &table.production,
            &episode.meta.gen_names,
            &episode.meta.gen_types,
        )?;

        Ok(Self {
            load_ids: name_index(&episode.meta.load_names),
            gen_ids: name_index(&episode.meta.gen_names),
            line_ids: name_index(&episode.meta.line_names),
            meta: episode.meta.clone(),
            registry,
            load: table.load,
            production: table.production,
            rho: table.rho,
            action_table: table.action_table,
            flow_voltage: table.flow_voltage,
            hazards,
            maintenances,
            overflow,
            usage_bands,
            consumption,
            production_share,
            maintenance_minutes,
            timestamps: table.timestamps,
        })
    }

    pub fn meta(&self) -> &EpisodeMeta {
        &self.meta
    }

    /// The topology signatures interned while classifying this episode.
    pub fn topology_registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    pub fn load(&self) -> &DataFrame {
        &self.load
    }

    pub fn production(&self) -> &DataFrame {
        &self.production
    }

    pub fn rho(&self) -> &DataFrame {
        &self.rho
    }

    pub fn action_table(&self) -> &DataFrame {
        &self.action_table
    }

    pub fn flow_voltage(&self) -> &DataFrame {
        &self.flow_voltage
    }

    pub fn hazards(&self) -> &DataFrame {
        &self.hazards
    }

    pub fn maintenances(&self) -> &DataFrame {
        &self.maintenances
    }

    pub fn overflow_trace(&self) -> &DataFrame {
        &self.overflow
    }

    pub fn usage_bands(&self) -> &DataFrame {
        &self.usage_bands
    }

    pub fn consumption_profile(&self) -> &DataFrame {
        &self.consumption
    }

    pub fn production_share(&self) -> &DataFrame {
        &self.production_share
    }

    pub fn maintenance_minutes(&self) -> f64 {
        self.maintenance_minutes
    }

    /// Canonical per-timestep time axis, epoch seconds.
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Stable name-to-id lookup for loads; the returned id matches the
    /// `equipment_id` column of the load frame.
    pub fn load_id(&self, name: &str) -> EpisodeResult<usize> {
        lookup(&self.load_ids, name)
    }

    /// Stable name-to-id lookup for generators.
    pub fn gen_id(&self, name: &str) -> EpisodeResult<usize> {
        lookup(&self.gen_ids, name)
    }

    /// Stable name-to-id lookup for lines; matches `equipment_index` in the
    /// rho frame and `line_id` in the event frames.
    pub fn line_id(&self, name: &str) -> EpisodeResult<usize> {
        lookup(&self.line_ids, name)
    }
}

pub(crate) fn name_index(names: &[String]) -> HashMap<String, usize> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.clone(), index))
        .collect()
}

fn lookup(index: &HashMap<String, usize>, name: &str) -> EpisodeResult<usize> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| EpisodeError::UnknownEquipment(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::three_step_episode;

    #[test]
    fn build_populates_every_view() {
        let episode = three_step_episode();
        let analytics = EpisodeAnalytics::build(&episode).unwrap();
        assert_eq!(analytics.action_table().height(), 3);
        assert_eq!(analytics.hazards().height(), 3 * 2);
        assert_eq!(analytics.overflow_trace().height(), 3);
        assert_eq!(analytics.usage_bands().height(), 3);
        assert!(analytics.production_share().height() > 0);
        assert_eq!(analytics.timestamps().len(), 3);
    }

    #[test]
    fn equipment_lookups_are_a_stable_bijection() {
        let episode = three_step_episode();
        let analytics = EpisodeAnalytics::build(&episode).unwrap();
        for (index, name) in episode.meta.load_names.iter().enumerate() {
            assert_eq!(analytics.load_id(name).unwrap(), index);
        }
        assert_eq!(analytics.line_id("line_1_2").unwrap(), 1);
        assert_eq!(analytics.gen_id("gen_nuclear").unwrap(), 1);
    }

    #[test]
    fn unknown_equipment_is_a_recoverable_error() {
        let episode = three_step_episode();
        let analytics = EpisodeAnalytics::build(&episode).unwrap();
        assert!(matches!(
            analytics.load_id("no_such_load"),
            Err(EpisodeError::UnknownEquipment(_))
        ));
        // the facade is still usable afterwards
        assert!(analytics.load_id("load_1").is_ok());
    }

    #[test]
    fn maintenance_minutes_follow_the_event_table() {
        let episode = three_step_episode();
        let analytics = EpisodeAnalytics::build(&episode).unwrap();
        // fixture flags one maintenance line-timestep on a 5-minute grid
        assert!((analytics.maintenance_minutes() - 5.0).abs() < 1e-12);
    }
}
