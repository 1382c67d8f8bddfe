use std::{fs::read_to_string, io, os::unix::fs::PermissionsExt, path::Path};

use gptp_abnormal::FaultSpec;
use log::warn;
use serde::Deserialize;
use thiserror::Error;

/// User defined scenarios for the menu
///
/// ```toml
/// [[scenario]]
/// title = "missing Announce"
/// state-machines = ["port_announce_information_sm"]
/// comment = "Skip sending Announce from the master side."
///
/// [[scenario.fault]]
/// msgtype = "anno"
/// evttype = "skip"
/// duration = 5.0
/// ```
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default, rename = "scenario")]
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScenarioConfig {
    pub title: String,
    #[serde(default)]
    pub state_machines: Vec<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default, rename = "fault")]
    pub faults: Vec<FaultSpec>,
}

impl ScenarioFile {
    /// Parse scenarios from file
    pub fn from_file(file: impl AsRef<Path>) -> Result<ScenarioFile, ConfigError> {
        let meta = std::fs::metadata(&file)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted scenario file permissions: Others can write.");
        }

        let contents = read_to_string(file)?;
        Ok(toml::de::from_str(&contents)?)
    }

    /// Check that the scenarios are reasonable
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.scenarios.is_empty() {
            warn!("No scenarios configured.");
            ok = false;
        }

        for scenario in &self.scenarios {
            if scenario.faults.is_empty() {
                warn!("Scenario '{}' has no faults.", scenario.title);
                ok = false;
            }

            for fault in &scenario.faults {
                if let Err(error) = fault.resolve() {
                    warn!("Scenario '{}': {error}", scenario.title);
                    ok = false;
                }
            }
        }

        ok
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error while reading scenario file: {0}")]
    Io(#[from] io::Error),
    #[error("scenario toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
