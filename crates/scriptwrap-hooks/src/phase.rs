//! Build lifecycle phases.
//!
//! A hook is configured with one [`Phase`] filter; every facade entry point
//! requests one concrete phase and the script runs only when
//! [`Phase::matches`] says so.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Lifecycle phase a script may be filtered against.
///
/// The serialized names are the persisted `mode` values and are matched
/// case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Before the build steps run; may produce the build [`Environment`](crate::Environment).
    Setup,
    /// After the build steps ran; decides whether teardown succeeded.
    TearDown,
    /// Chance to replace the launcher used for build steps.
    DecorateLauncher,
    /// Chance to replace the build log stream.
    DecorateLogger,
    /// Contribute build variables.
    BuildVariables,
    /// Contribute environment variables through the setup environment.
    EnvironmentVariables,
    /// Wildcard filter matching every concrete phase.
    All,
}

impl Phase {
    /// Whether a hook configured with `self` runs when `requested` fires.
    ///
    /// `requested` must be concrete; the dispatcher rejects [`Phase::All`]
    /// before asking.
    #[must_use]
    pub fn matches(self, requested: Phase) -> bool {
        self == requested || self == Self::All
    }

    /// Whether this is a phase that actually fires (everything but `All`).
    #[must_use]
    pub fn is_concrete(self) -> bool {
        self != Self::All
    }

    /// The six phases that fire during a build, in lifecycle order.
    #[must_use]
    pub fn concrete() -> &'static [Phase] {
        &[
            Self::Setup,
            Self::DecorateLauncher,
            Self::DecorateLogger,
            Self::BuildVariables,
            Self::EnvironmentVariables,
            Self::TearDown,
        ]
    }

    /// Every selectable filter value, `All` included.
    #[must_use]
    pub fn all() -> &'static [Phase] {
        &[
            Self::Setup,
            Self::TearDown,
            Self::DecorateLauncher,
            Self::DecorateLogger,
            Self::BuildVariables,
            Self::EnvironmentVariables,
            Self::All,
        ]
    }

    /// Persisted name, e.g. `TEAR_DOWN`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::TearDown => "TEAR_DOWN",
            Self::DecorateLauncher => "DECORATE_LAUNCHER",
            Self::DecorateLogger => "DECORATE_LOGGER",
            Self::BuildVariables => "BUILD_VARIABLES",
            Self::EnvironmentVariables => "ENVIRONMENT_VARIABLES",
            Self::All => "ALL",
        }
    }

    /// Human-readable label for configuration forms.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::TearDown => "Tear down",
            Self::DecorateLauncher => "Decorate launcher",
            Self::DecorateLogger => "Decorate logger",
            Self::BuildVariables => "Build variables",
            Self::EnvironmentVariables => "Environment variables",
            Self::All => "All",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownPhase(s.to_string()))
    }
}
