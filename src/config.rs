use crate::decision::{MissionContext, PriorityWeights};
use crate::mission::TaskKind;
use chrono::TimeDelta;
use serde::Deserialize;

/// Top-level configuration record consumed by the core.
///
/// Loading and parsing (files, env, flags) is the embedder's job; the core
/// only needs the record. All sections carry reference defaults so a partial
/// record deserializes.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GCSConfig {
    pub ooda: OODASection,
    pub constraints: ConstraintSection,
    pub grid_bounds: GridBounds,
    pub mission: Option<MissionSection>,
}

/// Polling cadence and per-phase cycle budgets.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OODASection {
    pub telemetry_rate_hz: f64,
    pub timeout_threshold_sec: f64,
    pub observe_budget_ms: f64,
    pub orient_budget_ms: f64,
    pub decide_budget_ms: f64,
    pub act_budget_ms: f64,
}

impl Default for OODASection {
    fn default() -> Self {
        Self {
            telemetry_rate_hz: 2.0,
            timeout_threshold_sec: 1.5,
            observe_budget_ms: 500.0,
            orient_budget_ms: 500.0,
            decide_budget_ms: 1200.0,
            act_budget_ms: 300.0,
        }
    }
}

/// Physical admissibility constants and anomaly-detector thresholds.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConstraintSection {
    pub battery_safety_reserve_percent: f64,
    /// Battery anomaly threshold, percent consumed per 30 s.
    pub battery_discharge_rate: f64,
    /// Position jump threshold in meters between consecutive samples.
    pub position_discontinuity: f64,
    /// Tolerance around the altitude envelope in meters.
    pub altitude_deviation: f64,
    pub safety_buffer_meters: f64,
}

impl Default for ConstraintSection {
    fn default() -> Self {
        Self {
            battery_safety_reserve_percent: 20.0,
            battery_discharge_rate: 5.0,
            position_discontinuity: 100.0,
            altitude_deviation: 10.0,
            safety_buffer_meters: 50.0,
        }
    }
}

/// Operational rectangle tasks must lie in, unless the assigned vehicle holds
/// the exit-grid permission.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GridBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl GridBounds {
    /// Closed-interval containment check over the ground plane.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x_min <= x && x <= self.x_max && self.y_min <= y && y <= self.y_max
    }
}

impl Default for GridBounds {
    fn default() -> Self { Self { x_min: 0.0, x_max: 3000.0, y_min: 0.0, y_max: 2000.0 } }
}

/// Mission selection with optional weight overrides.
#[derive(Deserialize, Debug, Clone)]
pub struct MissionSection {
    pub kind: TaskKind,
    #[serde(default)]
    pub golden_hour_sec: Option<f64>,
    #[serde(default)]
    pub w_temporal: Option<f64>,
    #[serde(default)]
    pub w_criticality: Option<f64>,
    #[serde(default)]
    pub w_spatial: Option<f64>,
    #[serde(default)]
    pub lambda_unallocated: Option<f64>,
}

impl GCSConfig {
    /// Builds the mission context this configuration selects, defaulting to
    /// surveillance when no mission section is present.
    pub fn mission_context(&self) -> MissionContext {
        let Some(section) = &self.mission else {
            return MissionContext::for_surveillance();
        };
        let mut context = match section.kind {
            TaskKind::Surveillance => MissionContext::for_surveillance(),
            TaskKind::SearchRescue => {
                let golden = section.golden_hour_sec.unwrap_or(3600.0);
                MissionContext::for_search_rescue(TimeDelta::milliseconds(
                    (golden * 1000.0) as i64,
                ))
            }
            TaskKind::Delivery => MissionContext::for_delivery(),
        };
        if let (Some(t), Some(c), Some(s)) =
            (section.w_temporal, section.w_criticality, section.w_spatial)
        {
            context = context.with_weights(PriorityWeights::new(t, c, s));
        }
        if let Some(lambda) = section.lambda_unallocated {
            context = context.with_lambda(lambda);
        }
        context
    }
}
