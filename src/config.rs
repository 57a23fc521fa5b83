// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::audio::graph::{ChainSettings, FilterSettings};

mod audio;
mod error;
mod timing;

pub use audio::Audio;
pub use error::ConfigError;
pub use timing::{Intervals, Timing};

/// Prefix for environment overrides, e.g. SAMPLEDECK__AUDIO__DEVICE=mock.
const ENV_PREFIX: &str = "SAMPLEDECK";
const ENV_SEPARATOR: &str = "__";

/// The full workstation configuration. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct WorkstationConfig {
    #[serde(default)]
    audio: Audio,
    #[serde(default)]
    view: View,
    #[serde(default)]
    timing: Timing,
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    regions: Regions,
}

/// Waveform view settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct View {
    base_pixels_per_second: Option<f64>,
    zoom: Option<f64>,
}

impl View {
    /// Pixels per second at a zoom of 1 (default: 100).
    pub fn base_pixels_per_second(&self) -> f64 {
        self.base_pixels_per_second
            .filter(|pps| pps.is_finite() && *pps > 0.0)
            .unwrap_or(100.0)
    }

    /// Initial zoom level (default: 1).
    pub fn zoom(&self) -> f64 {
        self.zoom
            .filter(|zoom| zoom.is_finite() && *zoom > 0.0)
            .unwrap_or(1.0)
    }
}

/// Initial signal chain settings for newly loaded tracks.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Defaults {
    gain: Option<f32>,
    lowpass_hz: Option<f32>,
    highpass_hz: Option<f32>,
    filter_enabled: Option<bool>,
}

impl Defaults {
    pub fn chain_settings(&self) -> ChainSettings {
        let fallback = FilterSettings::default();
        ChainSettings {
            gain: self.gain.unwrap_or(1.0).clamp(0.0, 1.0),
            speed_ratio: 1.0,
            filter: FilterSettings {
                lowpass_hz: self.lowpass_hz.unwrap_or(fallback.lowpass_hz),
                highpass_hz: self.highpass_hz.unwrap_or(fallback.highpass_hz),
                enabled: self.filter_enabled.unwrap_or(fallback.enabled),
            },
        }
    }
}

/// Region editing settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Regions {
    snap_to_grid: Option<bool>,
}

impl Regions {
    /// Whether committed boundaries snap to the nearest beat (default: false).
    pub fn snap_to_grid(&self) -> bool {
        self.snap_to_grid.unwrap_or(false)
    }
}

impl WorkstationConfig {
    /// Loads the configuration from an optional YAML file, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<WorkstationConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: WorkstationConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<WorkstationConfig, ConfigError> {
        let config: WorkstationConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.timing.intervals().map(|_| ())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn regions(&self) -> &Regions {
        &self.regions
    }

    /// Replaces the audio section, e.g. from a command line override.
    pub fn with_audio(mut self, audio: Audio) -> WorkstationConfig {
        self.audio = audio;
        self
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::time::Duration;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WorkstationConfig::from_yaml("{}").unwrap();
        assert_eq!("default", config.audio().device());
        assert_eq!(100.0, config.view().base_pixels_per_second());
        assert_eq!(1.0, config.view().zoom());
        assert!(!config.regions().snap_to_grid());
        assert_eq!(ChainSettings::default(), config.defaults().chain_settings());
        assert_eq!(
            Intervals::default(),
            config.timing().intervals().unwrap()
        );
    }

    #[test]
    fn test_full_config() {
        let config = WorkstationConfig::from_yaml(
            r#"
            audio:
              device: mock-output
              sample_rate: 48000
              buffer_size: 256
            view:
              base_pixels_per_second: 50.0
              zoom: 2.5
            timing:
              position_publish_interval: 50ms
              region_commit_debounce: 250ms
            defaults:
              gain: 0.5
              lowpass_hz: 8000
              filter_enabled: true
            regions:
              snap_to_grid: true
            "#,
        )
        .unwrap();

        assert!(config.audio().is_mock());
        assert_eq!(48000, config.audio().sample_rate());
        assert_eq!(256, config.audio().buffer_size());
        assert_eq!(50.0, config.view().base_pixels_per_second());
        assert_eq!(2.5, config.view().zoom());
        assert!(config.regions().snap_to_grid());

        let intervals = config.timing().intervals().unwrap();
        assert_eq!(Duration::from_millis(50), intervals.position_publish);
        assert_eq!(Duration::from_millis(250), intervals.region_commit);
        assert_eq!(Duration::from_millis(16), intervals.frame);

        let settings = config.defaults().chain_settings();
        assert_eq!(0.5, settings.gain);
        assert_eq!(8000.0, settings.filter.lowpass_hz);
        assert_eq!(20.0, settings.filter.highpass_hz);
        assert!(settings.filter.enabled);
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let result = WorkstationConfig::from_yaml(
            r#"
            timing:
              frame_interval: often
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Duration { .. })));
    }

    #[test]
    #[serial]
    fn test_load_file_with_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampledeck.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "audio:\n  device: Speakers\n  sample_rate: 48000").unwrap();

        std::env::set_var("SAMPLEDECK__AUDIO__DEVICE", "mock");
        let config = WorkstationConfig::load(Some(&path));
        std::env::remove_var("SAMPLEDECK__AUDIO__DEVICE");

        let config = config.unwrap();
        assert_eq!("mock", config.audio().device());
        assert_eq!(48000, config.audio().sample_rate());
    }
}
