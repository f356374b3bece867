//! Results aggregation and the serialization contracts of §6.
//!
//! thermal@: `History` is the one structure every driver (transient, steady,
//! sensitivity, failure sweep) eventually produces or consumes. Keeping it
//! here, independent of the stepper, is what lets `ThermalError::Cancelled`
//! and `ThermalError::DeadlineExceeded` carry a partial one without the
//! error module depending on the stepper module.

use chrono::{DateTime, Utc};
use csv::Writer;
use serde::{Deserialize, Serialize};
use verixos::{ConductorId, NodeId};

use crate::error::{Result, ThermalError};
use crate::model::{Model, SimulationConfig};

/// Temperature series for one non-boundary node, sampled on the output grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTemperatureSeries {
    /// Node identifier.
    pub node_id: NodeId,
    /// Sample times in seconds.
    pub times_s: Vec<f64>,
    /// Sample temperatures in Kelvin, aligned with `times_s`.
    pub temperatures_k: Vec<f64>,
}

/// Signed heat-flow series for one conductor, sampled on the output grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorFlowSeries {
    /// Conductor identifier.
    pub conductor_id: ConductorId,
    /// Source node (positive flow direction).
    pub node_from: NodeId,
    /// Destination node.
    pub node_to: NodeId,
    /// Sample times in seconds.
    pub times_s: Vec<f64>,
    /// Signed flow in watts, positive from `node_from` to `node_to`.
    pub flows_w: Vec<f64>,
}

/// Integrated energy accounting for a transient run (§4.7).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnergyBalance {
    /// Total energy absorbed (loads + inbound radiation from boundaries), in joules.
    pub q_in_j: f64,
    /// Total energy radiated to space-like boundaries, in joules.
    pub q_rad_j: f64,
    /// Net change in stored thermal energy across all diffusion nodes, in joules.
    pub delta_e_stored_j: f64,
    /// `|q_in - q_rad - delta_e_stored| / max(q_in, 1 J)`.
    pub relative_error: f64,
}

/// Per-node and per-conductor time series plus the energy balance for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    /// One series per non-boundary node.
    pub node_series: Vec<NodeTemperatureSeries>,
    /// One series per conductor.
    pub conductor_series: Vec<ConductorFlowSeries>,
    /// Energy accounting over the recorded span.
    pub energy_balance: EnergyBalance,
}

impl History {
    /// Look up a node's temperature series by id.
    pub fn node(&self, node_id: &str) -> Option<&NodeTemperatureSeries> {
        self.node_series.iter().find(|s| s.node_id == node_id)
    }

    /// Look up a conductor's flow series by id.
    pub fn conductor(&self, conductor_id: &str) -> Option<&ConductorFlowSeries> {
        self.conductor_series.iter().find(|s| s.conductor_id == conductor_id)
    }
}

/// Result of a transient run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientResult {
    /// Per-node and per-conductor histories, plus the energy balance.
    pub history: History,
    /// Count of accepted adaptive steps.
    pub steps_accepted: u64,
    /// Count of rejected (retried) adaptive steps.
    pub steps_rejected: u64,
    /// Time the run actually reached (equals `config.t_end_s` on a full run).
    pub final_time_s: f64,
}

/// Result of a steady-state solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteadyStateResult {
    /// Converged temperature per node id (including boundary nodes, held fixed).
    pub temperatures_k: std::collections::BTreeMap<NodeId, f64>,
    /// Outer Newton iterations used.
    pub iterations: usize,
    /// Final `||R||_inf`.
    pub residual_norm: f64,
}

/// A model parameter addressed by the sensitivity engine (§4.8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ParameterRef {
    /// A scalar node property (`"capacitance_j_k"`, `"absorptivity"`, `"emissivity"`, `"area_m2"`).
    NodeProperty { node_id: NodeId, property: String },
    /// A conductor's scalar coefficient (`"conductance_w_k"` for linear/contact;
    /// `"emissivity_eff"`/`"area_m2"`/`"view_factor"` for radiation).
    ConductorCoefficient { conductor_id: ConductorId, coefficient: String },
    /// A constant heat load's wattage.
    HeatLoadScalar { heat_load_id: String },
}

/// One row of the sensitivity table (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRow {
    /// The perturbed parameter.
    pub parameter: ParameterRef,
    /// The observed node.
    pub node_id: NodeId,
    /// Central-difference first-order estimate of `dT_final/dp`.
    pub d_t_d_p: f64,
    /// Second-order estimate `d2T/dp2` (scaled, see §4.8).
    pub second_order: f64,
    /// The parameter's baseline value `p0`.
    pub baseline_value: f64,
}

/// Flat sensitivity table across all requested parameters and nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityResult {
    /// One row per (parameter, node) pair.
    pub rows: Vec<SensitivityRow>,
}

/// Pass/warn/fail classification of a failure-case outcome against supplied limits (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    /// Within all supplied limits.
    Pass,
    /// Within limits but inside a configurable margin of a limit.
    Warn,
    /// Outside a supplied limit.
    Fail,
    /// No limits were supplied for this node; reported for visibility only.
    Informational,
}

/// Per-node temperature statistics over a failure-case run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailureStats {
    /// Node identifier.
    pub node_id: NodeId,
    /// Minimum recorded temperature, Kelvin.
    pub t_min_k: f64,
    /// Maximum recorded temperature, Kelvin.
    pub t_max_k: f64,
    /// Time-weighted mean temperature, Kelvin.
    pub t_mean_k: f64,
    /// Status against supplied limits for this node.
    pub status: FailureStatus,
}

/// Outcome of one named failure case (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCaseResult {
    /// Case name, e.g. `"conductor_failure"`.
    pub case_name: String,
    /// Per-node statistics, empty if the sub-run itself failed.
    pub node_stats: Vec<NodeFailureStats>,
    /// Worst status across all nodes (or `Informational` if no limits applied anywhere).
    pub status: FailureStatus,
    /// Set when the sub-run aborted (e.g. `SolverDiverged`); the outer sweep
    /// still proceeds to the next case (§7 propagation rules).
    pub error: Option<String>,
}

/// Aggregate result of a failure-case sweep, in input order (§5 ordering guarantee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSweepResult {
    /// One entry per requested case, in the order requested.
    pub cases: Vec<FailureCaseResult>,
}

// ---------------------------------------------------------------------
// §6 persistent serialization: the `.vxm` model container
// ---------------------------------------------------------------------

const VXM_FORMAT: &str = "verixos-model";
const VXM_VERSION: &str = "1";

/// Caller-supplied metadata carried alongside a model in a `.vxm` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Caller-assigned model id.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
}

/// The `.vxm` container (§6): `{format, version, model, nodes, conductors,
/// heatLoads, simulationConfigs?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VxmFile {
    /// Must equal `"verixos-model"`; import rejects anything else.
    pub format: String,
    /// Container format version.
    pub version: String,
    /// Model-level metadata (not including nodes/conductors/loads).
    pub model: ModelMeta,
    /// The model's nodes.
    pub nodes: Vec<crate::model::Node>,
    /// The model's conductors.
    pub conductors: Vec<crate::model::Conductor>,
    /// The model's heat loads.
    #[serde(rename = "heatLoads")]
    pub heat_loads: Vec<crate::model::HeatLoad>,
    /// Optional orbital configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbital_config: Option<crate::model::OrbitalConfig>,
    /// Saved simulation configs, if any were attached at export time.
    #[serde(rename = "simulationConfigs", default, skip_serializing_if = "Option::is_none")]
    pub simulation_configs: Option<Vec<SimulationConfig>>,
}

/// Export a model (and optional saved simulation configs) to a `.vxm` container value.
pub fn export_model(model: &Model, meta: ModelMeta, simulation_configs: Option<Vec<SimulationConfig>>) -> VxmFile {
    VxmFile {
        format: VXM_FORMAT.to_string(),
        version: VXM_VERSION.to_string(),
        model: meta,
        nodes: model.nodes.clone(),
        conductors: model.conductors.clone(),
        heat_loads: model.heat_loads.clone(),
        orbital_config: model.orbital_config.clone(),
        simulation_configs,
    }
}

/// Serialize a `.vxm` container to its textual (JSON) form.
pub fn to_vxm_string(file: &VxmFile) -> Result<String> {
    serde_json::to_string_pretty(file).map_err(|e| ThermalError::InternalAssertion {
        what: format!("vxm serialization failed: {e}"),
    })
}

/// Parse and validate a `.vxm` container from its textual form.
///
/// Rejects any file whose `format` field is not exactly `"verixos-model"` (§6).
pub fn from_vxm_str(text: &str) -> Result<VxmFile> {
    let file: VxmFile = serde_json::from_str(text)
        .map_err(|e| ThermalError::InvalidModel { reason: format!("malformed .vxm file: {e}") })?;
    if file.format != VXM_FORMAT {
        return Err(ThermalError::InvalidModel {
            reason: format!("unrecognized format '{}', expected '{}'", file.format, VXM_FORMAT),
        });
    }
    Ok(file)
}

/// Reconstruct a [`Model`] from an imported `.vxm` container.
pub fn model_from_vxm(file: &VxmFile) -> Model {
    Model {
        nodes: file.nodes.clone(),
        conductors: file.conductors.clone(),
        heat_loads: file.heat_loads.clone(),
        orbital_config: file.orbital_config.clone(),
    }
}

// ---------------------------------------------------------------------
// §6 results export: results-only vs. full-model-results
// ---------------------------------------------------------------------

/// Run identification and timing carried by both export shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Wall-clock time the export was produced.
    pub generated_at: DateTime<Utc>,
    /// Energy balance for the exported run.
    pub energy_balance: EnergyBalance,
}

/// "results-only" export shape (§6): metadata plus histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsExport {
    /// Run metadata.
    pub run_metadata: RunMetadata,
    /// Per-node temperature histories.
    pub node_histories: Vec<NodeTemperatureSeries>,
    /// Per-conductor flow histories, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conductor_histories: Option<Vec<ConductorFlowSeries>>,
}

/// "full-model-results" export shape (§6): adds a model snapshot and the run's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullModelResultsExport {
    /// Shared results payload.
    #[serde(flatten)]
    pub results: ResultsExport,
    /// Snapshot of the model the run was executed against.
    pub model: Model,
    /// The simulation config the run used.
    pub simulation_config: SimulationConfig,
}

fn results_export(history: &History, include_conductors: bool, now: DateTime<Utc>) -> ResultsExport {
    ResultsExport {
        run_metadata: RunMetadata {
            generated_at: now,
            energy_balance: history.energy_balance,
        },
        node_histories: history.node_series.clone(),
        conductor_histories: include_conductors.then(|| history.conductor_series.clone()),
    }
}

/// Build the "results-only" export shape.
pub fn export_results_only(history: &History, include_conductors: bool, now: DateTime<Utc>) -> ResultsExport {
    results_export(history, include_conductors, now)
}

/// Build the "full-model-results" export shape.
pub fn export_full_model_results(
    history: &History,
    include_conductors: bool,
    model: &Model,
    simulation_config: &SimulationConfig,
    now: DateTime<Utc>,
) -> FullModelResultsExport {
    FullModelResultsExport {
        results: results_export(history, include_conductors, now),
        model: model.clone(),
        simulation_config: simulation_config.clone(),
    }
}

// ---------------------------------------------------------------------
// §6 CSV export
// ---------------------------------------------------------------------

/// Unit system for CSV export (§6: `units=si|imperial`, applied to all numeric columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Kelvin, watts.
    Si,
    /// Degrees Fahrenheit, BTU/h.
    Imperial,
}

fn kelvin_to_display(k: f64, units: Units) -> f64 {
    match units {
        Units::Si => k,
        Units::Imperial => (k - 273.15) * 9.0 / 5.0 + 32.0,
    }
}

fn watts_to_display(w: f64, units: Units) -> f64 {
    match units {
        Units::Si => w,
        Units::Imperial => w * 3.412142,
    }
}

fn temp_unit_label(units: Units) -> &'static str {
    match units {
        Units::Si => "K",
        Units::Imperial => "\u{b0}F",
    }
}

fn flow_unit_label(units: Units) -> &'static str {
    match units {
        Units::Si => "W",
        Units::Imperial => "BTU/h",
    }
}

/// Find node names with a shared name registry. We render the node id itself
/// as the "node name" since the core carries no separate display-name field;
/// callers that want friendlier CSV headers can pass a relabeled history.
fn node_label(node_id: &str) -> &str {
    node_id
}

/// Render a temperature CSV: `Time (s), <node name> (K|°F), ...` (§6).
pub fn temperature_csv(history: &History, units: Units) -> Result<String> {
    let mut header = vec!["Time (s)".to_string()];
    for series in &history.node_series {
        header.push(format!("{} ({})", node_label(&series.node_id), temp_unit_label(units)));
    }

    let mut writer = Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| ThermalError::InternalAssertion { what: format!("csv header: {e}") })?;

    if let Some(first) = history.node_series.first() {
        for row in 0..first.times_s.len() {
            let mut record = vec![format!("{}", first.times_s[row])];
            for series in &history.node_series {
                let value = series.temperatures_k.get(row).copied().unwrap_or(f64::NAN);
                record.push(format!("{}", kelvin_to_display(value, units)));
            }
            writer
                .write_record(&record)
                .map_err(|e| ThermalError::InternalAssertion { what: format!("csv row: {e}") })?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ThermalError::InternalAssertion { what: format!("csv flush: {e}") })?;
    String::from_utf8(bytes).map_err(|e| ThermalError::InternalAssertion { what: format!("csv utf8: {e}") })
}

/// Render a heat-flow CSV: `Time (s), Conductor_<short id> (W|BTU/h), ...` (§6).
pub fn heat_flow_csv(history: &History, units: Units) -> Result<String> {
    let mut header = vec!["Time (s)".to_string()];
    for series in &history.conductor_series {
        let short_id = short_conductor_id(&series.conductor_id);
        header.push(format!("Conductor_{} ({})", short_id, flow_unit_label(units)));
    }

    let mut writer = Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| ThermalError::InternalAssertion { what: format!("csv header: {e}") })?;

    if let Some(first) = history.conductor_series.first() {
        for row in 0..first.times_s.len() {
            let mut record = vec![format!("{}", first.times_s[row])];
            for series in &history.conductor_series {
                let value = series.flows_w.get(row).copied().unwrap_or(f64::NAN);
                record.push(format!("{}", watts_to_display(value, units)));
            }
            writer
                .write_record(&record)
                .map_err(|e| ThermalError::InternalAssertion { what: format!("csv row: {e}") })?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ThermalError::InternalAssertion { what: format!("csv flush: {e}") })?;
    String::from_utf8(bytes).map_err(|e| ThermalError::InternalAssertion { what: format!("csv utf8: {e}") })
}

fn short_conductor_id(id: &str) -> String {
    if id.len() <= 8 {
        id.to_string()
    } else {
        id[..8].to_string()
    }
}
