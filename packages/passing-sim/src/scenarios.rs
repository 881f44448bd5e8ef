//! Named traffic presets, selected from the CLI. Each shapes the rider
//! pool and optional gate/trigger behavior; the generation loop in
//! `main.rs` is the same regardless of which preset is chosen.

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub rider_count: usize,
    pub base_speed_kmh: f64,
    pub jitter_stddev_kmh: f64,
    pub include_gate_start: bool,
    pub include_moto: bool,
}

impl ScenarioConfig {
    /// Evenly-paced riders at a typical pursuit speed, no gate or moto —
    /// the steady-state "full lap" shape of spec §8.
    pub fn steady_state(rider_count: usize) -> Self {
        ScenarioConfig {
            rider_count,
            base_speed_kmh: 55.0,
            jitter_stddev_kmh: 1.5,
            include_gate_start: false,
            include_moto: false,
        }
    }

    /// One rider well off pace, isolating a single slow lap.
    pub fn isolated_slow() -> Self {
        ScenarioConfig {
            rider_count: 1,
            base_speed_kmh: 38.5,
            jitter_stddev_kmh: 0.5,
            include_gate_start: false,
            include_moto: false,
        }
    }

    /// Wider speed variance, so sector arrivals interleave out of order
    /// often enough to exercise the reorder buffer.
    pub fn reorder_stress(rider_count: usize) -> Self {
        ScenarioConfig {
            rider_count,
            base_speed_kmh: 50.0,
            jitter_stddev_kmh: 6.0,
            include_gate_start: false,
            include_moto: false,
        }
    }

    /// A standing-start session: a gate passing precedes the riders.
    pub fn gate_start(rider_count: usize) -> Self {
        ScenarioConfig { include_gate_start: true, ..ScenarioConfig::steady_state(rider_count) }
    }

    /// Adds a following moto to an otherwise steady field.
    pub fn with_moto(rider_count: usize) -> Self {
        ScenarioConfig { include_moto: true, ..ScenarioConfig::steady_state(rider_count) }
    }

    pub fn from_name(name: &str, rider_count: usize) -> Option<ScenarioConfig> {
        match name {
            "steady" => Some(ScenarioConfig::steady_state(rider_count)),
            "isolated-slow" => Some(ScenarioConfig::isolated_slow()),
            "reorder-stress" => Some(ScenarioConfig::reorder_stress(rider_count)),
            "gate-start" => Some(ScenarioConfig::gate_start(rider_count)),
            "with-moto" => Some(ScenarioConfig::with_moto(rider_count)),
            _ => None,
        }
    }
}
