use serde::Deserialize;

use crate::costing::TravelMode;

/// The full, flat parameter set one matcher runs with.
///
/// All distances are metres. `sigma_z` is the GPS noise deviation feeding
/// the emission model, `beta` the transition scale, `breakage_distance`
/// the hard cap on admissible inter-measurement road distance.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamBlock {
    pub sigma_z: f64,
    pub beta: f64,
    pub breakage_distance: f64,
    pub max_route_distance_factor: f64,
    pub turn_penalty_factor: f64,
    pub search_radius: f64,
    pub max_search_radius: f64,
    pub interpolation_distance: f64,
}

impl Default for ParamBlock {
    fn default() -> Self {
        Self {
            sigma_z: 4.07,
            beta: 3.0,
            breakage_distance: 2000.0,
            max_route_distance_factor: 3.0,
            turn_penalty_factor: 0.0,
            search_radius: 50.0,
            max_search_radius: 100.0,
            interpolation_distance: 10.0,
        }
    }
}

/// A partial parameter set layered over [`ParamBlock`]: per-mode blocks
/// and per-call preferences both take this shape.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct OverrideBlock {
    pub sigma_z: Option<f64>,
    pub beta: Option<f64>,
    pub breakage_distance: Option<f64>,
    pub max_route_distance_factor: Option<f64>,
    pub turn_penalty_factor: Option<f64>,
    pub search_radius: Option<f64>,
    pub max_search_radius: Option<f64>,
    pub interpolation_distance: Option<f64>,
}

impl ParamBlock {
    /// This block with an override layered on top.
    pub fn overridden(&self, over: &OverrideBlock) -> ParamBlock {
        ParamBlock {
            sigma_z: over.sigma_z.unwrap_or(self.sigma_z),
            beta: over.beta.unwrap_or(self.beta),
            breakage_distance: over.breakage_distance.unwrap_or(self.breakage_distance),
            max_route_distance_factor: over
                .max_route_distance_factor
                .unwrap_or(self.max_route_distance_factor),
            turn_penalty_factor: over.turn_penalty_factor.unwrap_or(self.turn_penalty_factor),
            search_radius: over.search_radius.unwrap_or(self.search_radius),
            max_search_radius: over.max_search_radius.unwrap_or(self.max_search_radius),
            interpolation_distance: over
                .interpolation_distance
                .unwrap_or(self.interpolation_distance),
        }
    }
}

/// Candidate-grid sizing: `size` divides a pseudo-tile into cells and
/// `cache_size` caps how many cells the query cache may hold before the
/// factory's opportunistic clear drops it.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub size: u32,
    pub cache_size: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 500,
            cache_size: 100_000.0,
        }
    }
}

/// Matcher configuration: a default parameter block, per-mode override
/// blocks merged over it, and grid sizing.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Name of the travel mode used when a request names none.
    pub mode: String,

    pub grid: GridConfig,

    pub default: ParamBlock,

    pub auto: OverrideBlock,
    pub bicycle: OverrideBlock,
    pub pedestrian: OverrideBlock,
    pub multimodal: OverrideBlock,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            mode: TravelMode::Auto.name().to_string(),
            grid: GridConfig::default(),
            default: ParamBlock::default(),
            auto: OverrideBlock::default(),
            bicycle: OverrideBlock::default(),
            pedestrian: OverrideBlock::default(),
            multimodal: OverrideBlock::default(),
        }
    }
}

impl MatcherConfig {
    pub fn override_for(&self, mode: TravelMode) -> &OverrideBlock {
        match mode {
            TravelMode::Auto => &self.auto,
            TravelMode::Bicycle => &self.bicycle,
            TravelMode::Pedestrian => &self.pedestrian,
            TravelMode::Multimodal => &self.multimodal,
        }
    }

    /// The effective parameters for one request: defaults, then the mode
    /// block, then per-call preferences.
    pub fn merged(&self, mode: TravelMode, preferences: &OverrideBlock) -> ParamBlock {
        self.default
            .overridden(self.override_for(mode))
            .overridden(preferences)
    }
}

/// Per-call request preferences: an optional mode name plus parameter
/// overrides layered over the merged mode configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Preferences {
    pub mode: Option<String>,

    #[serde(flatten)]
    pub overrides: OverrideBlock,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_block_layers_over_defaults() {
        let config: MatcherConfig = serde_json::from_value(serde_json::json!({
            "mode": "auto",
            "default": { "sigma_z": 5.0, "beta": 3.0 },
            "pedestrian": { "sigma_z": 2.0 }
        }))
        .unwrap();

        let auto = config.merged(TravelMode::Auto, &OverrideBlock::default());
        assert_eq!(auto.sigma_z, 5.0);

        let pedestrian = config.merged(TravelMode::Pedestrian, &OverrideBlock::default());
        assert_eq!(pedestrian.sigma_z, 2.0);
        assert_eq!(pedestrian.beta, 3.0);
    }

    #[test]
    fn preferences_layer_over_mode_blocks() {
        let config: MatcherConfig = serde_json::from_value(serde_json::json!({
            "bicycle": { "beta": 7.0 }
        }))
        .unwrap();

        let preferences: Preferences = serde_json::from_value(serde_json::json!({
            "mode": "bicycle",
            "beta": 9.0
        }))
        .unwrap();

        let merged = config.merged(TravelMode::Bicycle, &preferences.overrides);
        assert_eq!(merged.beta, 9.0);
        assert_eq!(
            merged.breakage_distance,
            ParamBlock::default().breakage_distance
        );
    }

    #[test]
    fn unknown_keys_do_not_silently_become_modes() {
        // Only the four fixed mode blocks exist; anything else is a
        // deserialisation error rather than an ignored section.
        let config = serde_json::from_value::<MatcherConfig>(serde_json::json!({
            "horse": { "beta": 1.0 }
        }));

        assert!(config.is_err());
    }
}
