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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

const DEFAULT_POSITION_PUBLISH_INTERVAL: Duration = Duration::from_millis(33);
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);
const DEFAULT_REGION_COMMIT_DEBOUNCE: Duration = Duration::from_millis(100);
const DEFAULT_PARAM_COMMIT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Timing knobs, written as duration strings such as "33ms".
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Timing {
    /// Minimum time between published position updates.
    position_publish_interval: Option<String>,

    /// Tick interval of the redraw loop.
    frame_interval: Option<String>,

    /// Settling time before a dragged region is committed to the track.
    region_commit_debounce: Option<String>,

    /// Settling time before filter changes reach a live chain.
    param_commit_debounce: Option<String>,
}

/// Resolved timing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub position_publish: Duration,
    pub frame: Duration,
    pub region_commit: Duration,
    pub param_commit: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Intervals {
            position_publish: DEFAULT_POSITION_PUBLISH_INTERVAL,
            frame: DEFAULT_FRAME_INTERVAL,
            region_commit: DEFAULT_REGION_COMMIT_DEBOUNCE,
            param_commit: DEFAULT_PARAM_COMMIT_DEBOUNCE,
        }
    }
}

fn parse(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(Duration::from)
            .map_err(|_| ConfigError::Duration {
                field,
                value: value.clone(),
            }),
        None => Ok(default),
    }
}

impl Timing {
    /// Parses every configured duration.
    pub fn intervals(&self) -> Result<Intervals, ConfigError> {
        Ok(Intervals {
            position_publish: parse(
                "position_publish_interval",
                &self.position_publish_interval,
                DEFAULT_POSITION_PUBLISH_INTERVAL,
            )?,
            frame: parse(
                "frame_interval",
                &self.frame_interval,
                DEFAULT_FRAME_INTERVAL,
            )?,
            region_commit: parse(
                "region_commit_debounce",
                &self.region_commit_debounce,
                DEFAULT_REGION_COMMIT_DEBOUNCE,
            )?,
            param_commit: parse(
                "param_commit_debounce",
                &self.param_commit_debounce,
                DEFAULT_PARAM_COMMIT_DEBOUNCE,
            )?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Intervals::default(), Timing::default().intervals().unwrap());
    }

    #[test]
    fn test_bad_duration() {
        let timing = Timing {
            frame_interval: Some("soon".to_string()),
            ..Timing::default()
        };
        match timing.intervals() {
            Err(ConfigError::Duration { field, value }) => {
                assert_eq!("frame_interval", field);
                assert_eq!("soon", value);
            }
            other => panic!("expected a duration error, got {:?}", other),
        }
    }
}
