//! Weapon profile and pattern resolution

use serde::Deserialize;

/// One compensation step: pointer offset plus the delay to the next step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoilStep {
    /// Horizontal displacement
    pub dx: f64,
    /// Vertical displacement
    pub dy: f64,
    /// Timing delay in milliseconds
    pub interval_ms: f64,
}

/// Per-weapon parameters from the weapons document
#[derive(Debug, Clone, Deserialize)]
pub struct WeaponParams {
    /// Stable weapon identifier, also the pattern file stem
    pub id: String,
    /// Display name for UI and announcements
    pub display_name: Option<String>,
    /// Names the telemetry feed uses for this weapon (e.g. "weapon_ak47")
    #[serde(default)]
    pub telemetry_names: Vec<String>,
    /// Expected pattern row count
    pub length: usize,
    /// Compensation multiplier applied to emitted offsets
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Sub-steps each pattern row is split into
    #[serde(default = "default_subdivision")]
    pub subdivision: u32,
    /// Divisor applied to each step interval
    #[serde(default = "default_timing_divisor")]
    pub timing_divisor: f64,
    /// Offset subtracted from each scaled interval (ms)
    #[serde(default)]
    pub timing_offset_ms: f64,
    /// Timing jitter bound (ms), 0 disables
    #[serde(default)]
    pub jitter_timing_ms: f64,
    /// Movement jitter bound (percent), 0 disables
    #[serde(default)]
    pub jitter_movement_pct: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_subdivision() -> u32 {
    1
}

fn default_timing_divisor() -> f64 {
    1.0
}

/// Immutable per-weapon entry in the pattern store.
///
/// `raw` is the validated pattern as loaded (`raw.len() == length`);
/// `resolved` is what the engine steps through after subdivision.
#[derive(Debug, Clone)]
pub struct WeaponProfile {
    pub id: String,
    pub display_name: String,
    pub telemetry_names: Vec<String>,
    pub length: usize,
    pub multiplier: f64,
    pub subdivision: u32,
    pub timing_divisor: f64,
    pub timing_offset_ms: f64,
    pub jitter_timing_ms: f64,
    pub jitter_movement_pct: f64,
    raw: Vec<RecoilStep>,
    resolved: Vec<RecoilStep>,
}

impl WeaponProfile {
    pub fn new(params: WeaponParams, raw: Vec<RecoilStep>) -> Self {
        let resolved = subdivide(&raw, params.subdivision);
        Self {
            display_name: params.display_name.unwrap_or_else(|| params.id.clone()),
            id: params.id,
            telemetry_names: params.telemetry_names,
            length: params.length,
            multiplier: params.multiplier,
            subdivision: params.subdivision,
            timing_divisor: params.timing_divisor,
            timing_offset_ms: params.timing_offset_ms,
            jitter_timing_ms: params.jitter_timing_ms,
            jitter_movement_pct: params.jitter_movement_pct,
            raw,
            resolved,
        }
    }

    /// The pattern as loaded from the data source
    pub fn raw_pattern(&self) -> &[RecoilStep] {
        &self.raw
    }

    /// The subdivided pattern the engine executes
    pub fn resolved_pattern(&self) -> &[RecoilStep] {
        &self.resolved
    }

    /// Step interval after divisor and offset scaling, clamped at zero
    pub fn scaled_interval_ms(&self, step: &RecoilStep) -> f64 {
        (step.interval_ms / self.timing_divisor - self.timing_offset_ms).max(0.0)
    }
}

/// Split each step into `factor` sub-steps of `floor(d / factor)` per axis,
/// redistributing the rounding gap onto the trailing sub-steps of the group
/// so the pattern's total displacement is preserved to within one count.
fn subdivide(pattern: &[RecoilStep], factor: u32) -> Vec<RecoilStep> {
    if pattern.is_empty() || factor <= 1 {
        return pattern.to_vec();
    }

    let n = factor as usize;
    let mut result: Vec<RecoilStep> = Vec::with_capacity(pattern.len() * n);

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_x_original = 0.0;
    let mut sum_y_original = 0.0;

    for (i, step) in pattern.iter().enumerate() {
        let sub_dx = (step.dx / factor as f64).floor();
        let sub_dy = (step.dy / factor as f64).floor();

        for _ in 0..n {
            result.push(RecoilStep {
                dx: sub_dx,
                dy: sub_dy,
                interval_ms: step.interval_ms,
            });
            sum_x += sub_dx;
            sum_y += sub_dy;
        }

        sum_x_original += step.dx;
        sum_y_original += step.dy;

        let gap_x = (sum_x_original - sum_x).round() as i64;
        let gap_y = (sum_y_original - sum_y).round() as i64;

        // Trailing sub-steps of this group absorb the gap, one count each
        for k in 0..gap_x.max(0) as usize {
            let idx = n * (i + 1) - k - 1;
            if let Some(sub) = result.get_mut(idx) {
                sub.dx += 1.0;
                sum_x += 1.0;
            }
        }
        for k in 0..gap_y.max(0) as usize {
            let idx = n * (i + 1) - k - 1;
            if let Some(sub) = result.get_mut(idx) {
                sub.dy += 1.0;
                sum_y += 1.0;
            }
        }
    }

    result
}
