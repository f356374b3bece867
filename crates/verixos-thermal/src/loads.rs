//! Heat-load evaluation (§4.3): combine constant, piecewise-linear and
//! orbital loads into a node-indexed load vector at a given time and state.

use std::collections::HashMap;

use crate::model::{EnvironmentPreset, HeatLoad, HeatLoadKind, Model, OrbitalConfig};
use crate::operator::Operator;
use crate::orbital::surface_flux;

/// Evaluate the total heat load (W) injected at `t_s` into every node that
/// has at least one attached load. Nodes with no load carry no entry.
///
/// Piecewise-linear samples hold the nearest endpoint value outside
/// `[t0, t_last]` (flat extrapolation, resolving Open Question (a)). The
/// environment preset is passed explicitly rather than read from global
/// state (§9: no global mutable state in the core).
pub fn evaluate_loads(
    model: &Model,
    operator: &Operator,
    env: &EnvironmentPreset,
    t_s: f64,
) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();

    for load in &model.heat_loads {
        let watts = evaluate_one(load, model.orbital_config.as_ref(), env, t_s);
        *totals.entry(load.node_id.clone()).or_insert(0.0) += watts;
    }

    // Ensure every state node has an explicit (possibly zero) entry so
    // callers never have to special-case "no load attached".
    for id in operator.state_node_ids() {
        totals.entry(id.clone()).or_insert(0.0);
    }

    totals
}

fn evaluate_one(
    load: &HeatLoad,
    orbit: Option<&OrbitalConfig>,
    env: &EnvironmentPreset,
    t_s: f64,
) -> f64 {
    match &load.kind {
        HeatLoadKind::Constant { watts } => *watts,
        HeatLoadKind::PiecewiseLinear { samples } => interpolate_piecewise_linear(samples, t_s),
        HeatLoadKind::Orbital { surface } => {
            let orbit = match orbit {
                Some(o) => o,
                None => return 0.0,
            };
            let flux = surface_flux(orbit, env, surface, t_s);
            flux.total() * surface.area_m2
        }
    }
}

/// Piecewise-linear interpolation with flat extrapolation at both ends.
fn interpolate_piecewise_linear(samples: &[(f64, f64)], t_s: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    if t_s <= samples[0].0 {
        return samples[0].1;
    }
    if t_s >= samples[samples.len() - 1].0 {
        return samples[samples.len() - 1].1;
    }
    let idx = samples.partition_point(|&(t, _)| t <= t_s).saturating_sub(1);
    let (t0, v0) = samples[idx];
    let (t1, v1) = samples[idx + 1];
    let frac = (t_s - t0) / (t1 - t0);
    v0 + frac * (v1 - v0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piecewise_linear_interpolates_midpoint() {
        let samples = vec![(0.0, 0.0), (10.0, 100.0)];
        assert!((interpolate_piecewise_linear(&samples, 5.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn piecewise_linear_holds_flat_outside_range() {
        let samples = vec![(0.0, 10.0), (10.0, 20.0)];
        assert_eq!(interpolate_piecewise_linear(&samples, -5.0), 10.0);
        assert_eq!(interpolate_piecewise_linear(&samples, 50.0), 20.0);
    }

    #[test]
    fn piecewise_linear_single_point_is_constant() {
        let samples = vec![(0.0, 42.0)];
        assert_eq!(interpolate_piecewise_linear(&samples, -5.0), 42.0);
        assert_eq!(interpolate_piecewise_linear(&samples, 500.0), 42.0);
    }
}
