//! Action impact classification.
//!
//! Derives a compact semantic summary of each timestep's action from its raw
//! change vectors: how many lines were touched, whether a substation was
//! reconfigured, which topology signature the action maps to, and how far
//! the resulting topology sits from the all-default configuration.

use serde::{Deserialize, Serialize};

use crate::{EpisodeError, EpisodeMeta, EpisodeResult, GridAction, Observation, TopologyRegistry};

/// Compact semantic impact of one timestep's action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionImpact {
    /// Count of line status sets plus switches.
    pub lines_touched: u32,
    /// 1 when any bus vector changed, forced to 0 whenever a line action is
    /// also present: a timestep is classified as either a line action or a
    /// substation action, never counted as both.
    pub subs_touched: u32,
    /// Count of nonzero redispatch deltas.
    pub redisp_touched: u32,
    pub line_description: Option<String>,
    pub sub_description: Option<String>,
    pub topology_signature_id: Option<u32>,
    /// Count of topology-vector elements not at default bus 1 in the
    /// resulting topology, i.e. the observed topology with this action's
    /// bus assignments applied.
    pub topological_distance: u32,
}

/// Classify one action against the observation it was taken from.
///
/// Fails with [`EpisodeError::MalformedAction`] when the action's change
/// vectors do not match the metadata dimensions; silent zero impact would
/// corrupt downstream KPI counts.
pub fn classify_action(
    action: &GridAction,
    observation: &Observation,
    meta: &EpisodeMeta,
    registry: &mut TopologyRegistry,
) -> EpisodeResult<ActionImpact> {
    check_dimensions(action, meta)?;

    let mut line_parts = Vec::new();
    for (index, &status) in action.set_line_status.iter().enumerate() {
        match status.cmp(&0) {
            std::cmp::Ordering::Greater => {
                line_parts.push(format!("reconnect {}", meta.line_names[index]));
            }
            std::cmp::Ordering::Less => {
                line_parts.push(format!("disconnect {}", meta.line_names[index]));
            }
            std::cmp::Ordering::Equal => {}
        }
    }
    for (index, &switched) in action.switch_line_status.iter().enumerate() {
        if switched {
            line_parts.push(format!("switch {}", meta.line_names[index]));
        }
    }
    let lines_touched = line_parts.len() as u32;
    let line_description = if line_parts.is_empty() {
        None
    } else {
        Some(line_parts.join(", "))
    };

    let mut touched_subs: Vec<usize> = Vec::new();
    for element in 0..meta.topo_vect_len() {
        let touched = action.set_topo_vect[element] != 0 || action.change_bus_vect[element];
        if touched {
            if let Some(sub) = meta.sub_of_element(element) {
                if touched_subs.last() != Some(&sub) {
                    touched_subs.push(sub);
                }
            }
        }
    }
    // Line actions take precedence in the per-timestep classification.
    let subs_touched = if touched_subs.is_empty() || lines_touched > 0 {
        0
    } else {
        1
    };
    let sub_description = if touched_subs.is_empty() {
        None
    } else {
        Some(
            touched_subs
                .iter()
                .map(|&sub| meta.sub_names[sub].clone())
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    let topology_signature_id = match registry.intern_set(&action.set_topo_vect) {
        Some(id) => Some(id),
        None => registry.intern_change(&action.change_bus_vect),
    };

    let redisp_touched = action
        .redispatch
        .iter()
        .filter(|delta| delta.abs() > 0.0)
        .count() as u32;

    // Resulting topology: the observed vector with this action's bus
    // assignments applied. Set assignments win over change flips.
    let mut resulting = observation.topo_vect.clone();
    for ((bus, &set), &change) in resulting
        .iter_mut()
        .zip(&action.set_topo_vect)
        .zip(&action.change_bus_vect)
    {
        if set != 0 {
            *bus = set;
        } else if change {
            *bus = match *bus {
                1 => 2,
                2 => 1,
                other => other,
            };
        }
    }
    let topological_distance = resulting.iter().filter(|&&bus| bus != 1).count() as u32;

    Ok(ActionImpact {
        lines_touched,
        subs_touched,
        redisp_touched,
        line_description,
        sub_description,
        topology_signature_id,
        topological_distance,
    })
}

fn check_dimensions(action: &GridAction, meta: &EpisodeMeta) -> EpisodeResult<()> {
    let n_lines = meta.n_lines();
    if action.set_line_status.len() != n_lines || action.switch_line_status.len() != n_lines {
        return Err(EpisodeError::MalformedAction(format!(
            "line status vectors sized {}/{} for {} lines",
            action.set_line_status.len(),
            action.switch_line_status.len(),
            n_lines
        )));
    }
    let topo_len = meta.topo_vect_len();
    if action.set_topo_vect.len() != topo_len || action.change_bus_vect.len() != topo_len {
        return Err(EpisodeError::MalformedAction(format!(
            "bus vectors sized {}/{} for a topology vector of {}",
            action.set_topo_vect.len(),
            action.change_bus_vect.len(),
            topo_len
        )));
    }
    if action.redispatch.len() != meta.n_gens() {
        return Err(EpisodeError::MalformedAction(format!(
            "redispatch vector sized {} for {} generators",
            action.redispatch.len(),
            meta.n_gens()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{observation, two_sub_meta};

    fn noop_action(meta: &EpisodeMeta) -> GridAction {
        GridAction {
            set_line_status: vec![0; meta.n_lines()],
            switch_line_status: vec![false; meta.n_lines()],
            set_topo_vect: vec![0; meta.topo_vect_len()],
            change_bus_vect: vec![false; meta.topo_vect_len()],
            redispatch: vec![0.0; meta.n_gens()],
        }
    }

    #[test]
    fn noop_action_has_no_impact() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let impact = classify_action(&noop_action(&meta), &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.lines_touched, 0);
        assert_eq!(impact.subs_touched, 0);
        assert_eq!(impact.topology_signature_id, None);
        assert_eq!(impact.topological_distance, 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn disconnect_is_counted_and_described() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut action = noop_action(&meta);
        action.set_line_status[1] = -1;
        let impact = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.lines_touched, 1);
        assert_eq!(impact.subs_touched, 0);
        let description = impact.line_description.unwrap();
        assert!(description.contains("disconnect"));
        assert!(description.contains("line_1_2"));
    }

    #[test]
    fn bus_change_yields_substation_impact_and_signature() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut action = noop_action(&meta);
        action.change_bus_vect[1] = true;
        action.change_bus_vect[4] = true;
        let impact = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.subs_touched, 1);
        assert!(impact.topology_signature_id.is_some());
        // Both flipped elements leave bus 1 in the resulting topology.
        assert_eq!(impact.topological_distance, 2);
        let description = impact.sub_description.unwrap();
        assert!(description.contains("sub_0"));
        assert!(description.contains("sub_1"));
    }

    #[test]
    fn distance_is_measured_on_the_resulting_topology() {
        let meta = two_sub_meta();
        let mut registry = TopologyRegistry::new();

        // Element 0 already sits on bus 2; setting element 3 to bus 2 adds one.
        let mut obs = observation(2019, 1, 6, 0, 0);
        obs.topo_vect[0] = 2;
        let mut action = noop_action(&meta);
        action.set_topo_vect[3] = 2;
        let impact = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.topological_distance, 2);

        // Changing the moved element flips it back to bus 1.
        let mut revert = noop_action(&meta);
        revert.change_bus_vect[0] = true;
        let impact = classify_action(&revert, &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.topological_distance, 0);

        // A disconnected element stays disconnected and off the default bus.
        obs.topo_vect[0] = -1;
        let impact = classify_action(&noop_action(&meta), &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.topological_distance, 1);
    }

    #[test]
    fn line_action_zeroes_substation_flag() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut action = noop_action(&meta);
        action.switch_line_status[0] = true;
        action.set_topo_vect[3] = 2;
        let impact = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        assert!(impact.lines_touched > 0);
        assert_eq!(impact.subs_touched, 0);
        // The signature is still resolved even though the flag is zeroed.
        assert!(impact.topology_signature_id.is_some());
    }

    #[test]
    fn identical_set_vectors_share_a_signature() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut action = noop_action(&meta);
        action.set_topo_vect = vec![1, 2, 0, 0, 0, 0];
        let first = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        let second = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        let mut other = noop_action(&meta);
        other.set_topo_vect = vec![1, 2, 0, 0, 0, 2];
        let third = classify_action(&other, &obs, &meta, &mut registry).unwrap();
        assert_eq!(first.topology_signature_id, second.topology_signature_id);
        assert_ne!(first.topology_signature_id, third.topology_signature_id);
    }

    #[test]
    fn set_fallback_to_change_registry() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut set_action = noop_action(&meta);
        set_action.set_topo_vect[0] = 2;
        let mut change_action = noop_action(&meta);
        change_action.change_bus_vect[0] = true;
        let from_set = classify_action(&set_action, &obs, &meta, &mut registry).unwrap();
        let from_change = classify_action(&change_action, &obs, &meta, &mut registry).unwrap();
        assert_ne!(
            from_set.topology_signature_id,
            from_change.topology_signature_id
        );
        assert!(registry
            .change_vector(from_change.topology_signature_id.unwrap())
            .is_some());
    }

    #[test]
    fn redispatch_deltas_are_counted() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let mut action = noop_action(&meta);
        action.redispatch = vec![5.0, -5.0];
        let impact = classify_action(&action, &obs, &meta, &mut registry).unwrap();
        assert_eq!(impact.redisp_touched, 2);
        assert_eq!(impact.lines_touched, 0);
    }

    #[test]
    fn undersized_action_is_malformed() {
        let meta = two_sub_meta();
        let obs = observation(2019, 1, 6, 0, 0);
        let mut registry = TopologyRegistry::new();
        let action = GridAction::default();
        let result = classify_action(&action, &obs, &meta, &mut registry);
        assert!(matches!(result, Err(EpisodeError::MalformedAction(_))));
    }
}
