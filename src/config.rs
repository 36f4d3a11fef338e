use crate::model::{Habitat, Traits};
use crate::utils::{check_num, check_prob};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Habitat bounds shared by all agents.
    pub habitat: Habitat,
    /// Model switches.
    #[serde(default)]
    pub model: ModelConfig,
    /// Traits given to prey founders (and inherited by their offspring).
    #[serde(default)]
    pub prey: Traits,
    /// Traits given to predators.
    #[serde(default)]
    pub predator: Traits,
    /// Initial condition parameters.
    pub init: InitConfig,
    /// Output parameters.
    pub output: OutputConfig,
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Whether predators age and die of old age like prey.
    #[serde(default)]
    pub predators_age: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// Initial number of prey.
    pub n_prey: usize,
    /// Initial number of predators.
    pub n_predator: usize,
    /// Probability that a founder allele is dominant (light).
    pub prob_dominant: f64,
    /// Base seed; a fresh one is drawn for every run when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of ticks between trajectory saves.
    pub ticks_per_save: u64,
    /// Number of saves written per trajectory file.
    pub saves_per_file: usize,
    /// Number of trajectory files written per run.
    pub files_per_run: usize,
    /// Whether each save includes a snapshot of the roster.
    #[serde(default)]
    pub snapshots: bool,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse_toml(&contents)
    }

    pub fn parse_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.habitat.validate().context("invalid habitat")?;
        self.prey
            .validate(&self.habitat)
            .context("invalid prey traits")?;
        self.predator
            .validate(&self.habitat)
            .context("invalid predator traits")?;

        check_num(self.init.n_prey, 1..100_000).context("invalid initial number of prey")?;
        check_num(self.init.n_predator, 1..100_000)
            .context("invalid initial number of predators")?;
        check_prob(self.init.prob_dominant).context("invalid dominant allele probability")?;

        check_num(self.output.ticks_per_save, 1..1_000_000)
            .context("invalid number of ticks per save")?;
        check_num(self.output.saves_per_file, 1..10_000)
            .context("invalid number of saves per file")?;
        check_num(self.output.files_per_run, 1..1_000)
            .context("invalid number of files per run")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[habitat]
xmax = 100
ymax = 100

[init]
n_prey = 40
n_predator = 2
prob_dominant = 0.5

[output]
ticks_per_save = 10
saves_per_file = 4
files_per_run = 1
"#;

    #[test]
    fn minimal_config_uses_default_traits() {
        let cfg = Config::parse_toml(MINIMAL).unwrap();
        assert_eq!(cfg.prey, Traits::default());
        assert_eq!(cfg.predator, Traits::default());
        assert!(!cfg.model.predators_age);
        assert!(!cfg.output.snapshots);
        assert_eq!(cfg.init.seed, None);
    }

    #[test]
    fn trait_sections_override_defaults() {
        let contents = format!(
            "{MINIMAL}\n[model]\npredators_age = true\n\n[prey]\ngestation = 3\nmate_range = 8.0\n\n[predator]\ncatch_radius = 4.5\n"
        );
        let cfg = Config::parse_toml(&contents).unwrap();
        assert!(cfg.model.predators_age);
        assert_eq!(cfg.prey.gestation, 3);
        assert_eq!(cfg.prey.mate_range, 8.0);
        assert_eq!(cfg.prey.age_limit, 50);
        assert_eq!(cfg.predator.catch_radius, 4.5);
    }

    #[test]
    fn degenerate_configs_are_rejected() {
        for (from, to) in [
            ("n_prey = 40", "n_prey = 0"),
            ("n_predator = 2", "n_predator = 0"),
            ("prob_dominant = 0.5", "prob_dominant = 1.5"),
            ("xmax = 100", "xmax = 0"),
            ("xmax = 100", "xmax = 12"),
            ("ticks_per_save = 10", "ticks_per_save = 0"),
        ] {
            let contents = MINIMAL.replace(from, to);
            assert!(Config::parse_toml(&contents).is_err(), "accepted {to}");
        }

        let zero_gestation = format!("{MINIMAL}\n[prey]\ngestation = 0\n");
        assert!(Config::parse_toml(&zero_gestation).is_err());

        let zero_age_limit = format!("{MINIMAL}\n[predator]\nage_limit = 0\n");
        assert!(Config::parse_toml(&zero_age_limit).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let contents = format!("{MINIMAL}\n[prey]\nwingspan = 3\n");
        assert!(Config::parse_toml(&contents).is_err());
    }
}
