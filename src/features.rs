//! Idempotent installation and removal of karaf features.
//!
//! The state of a feature is read from the `feature:list` table, then
//! `feature:install` or `feature:uninstall` is issued only when it differs from
//! the requested one.
use crate::client::{parse_error, Invocation, KarafClient};
use crate::config::DesiredState;
use crate::outcome::FeatureOutcome;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Column separator of the `feature:list` table.
const COLUMN_SEPARATOR: char = '|';

/// Errors raised while managing a feature.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The karaf client could not be run at all.
    #[error("Karaf client error")]
    Client(#[from] anyhow::Error),
    /// The install or uninstall command exited with a non zero code.
    #[error("{reason}")]
    CommandFailed {
        /// Cause extracted from the client output
        reason: String,
        /// The failing command and its output
        invocation: Invocation,
    },
    /// Forced installation was requested. It is not supported and always
    /// fails with the value of the force flag as message.
    #[error("{0}")]
    ForceInstall(String),
}

/// A feature name with an optional version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    /// Feature name
    pub name: String,
    /// Feature version, any version matches when unset
    pub version: Option<String>,
}

impl FeatureRef {
    /// Create a feature reference.
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        FeatureRef {
            name: name.into(),
            version,
        }
    }

    /// `name` or `name/version`, as expected by the karaf feature commands.
    ///
    /// ```
    /// use lib::features::FeatureRef;
    /// assert_eq!(FeatureRef::new("camel-jms", None).qualified_name(), "camel-jms");
    /// assert_eq!(
    ///     FeatureRef::new("camel-jms", Some("2.18.1".into())).qualified_name(),
    ///     "camel-jms/2.18.1"
    /// );
    /// ```
    pub fn qualified_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}/{}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// Whether `record` describes this feature.
    pub fn matches(&self, record: &FeatureRecord) -> bool {
        record.name == self.name
            && self
                .version
                .as_ref()
                .map_or(true, |version| &record.version == version)
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// State column of the `feature:list` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureState {
    /// Installed and running
    Started,
    /// Installed, bundles resolved
    Resolved,
    /// Installed only
    Installed,
    /// The only state meaning the feature is not installed
    Uninstalled,
    /// Any state unknown to this tool, considered installed
    Other(String),
}

impl FeatureState {
    /// Everything but [`FeatureState::Uninstalled`] counts as installed.
    pub fn is_installed(&self) -> bool {
        *self != FeatureState::Uninstalled
    }
}

impl From<&str> for FeatureState {
    fn from(s: &str) -> Self {
        match s {
            "Started" => FeatureState::Started,
            "Resolved" => FeatureState::Resolved,
            "Installed" => FeatureState::Installed,
            "Uninstalled" => FeatureState::Uninstalled,
            other => FeatureState::Other(other.to_owned()),
        }
    }
}

/// One row of the `feature:list` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRecord {
    /// First column
    pub name: String,
    /// Second column, as printed by karaf
    pub version: String,
    /// Fourth column
    pub state: FeatureState,
}

/// Extract the rows of a `feature:list` output.
///
/// Only lines split by `|` in more than two columns are rows. Name, version
/// and state are read from columns 0, 1 and 3, rows too short to hold a
/// state are ignored.
pub fn parse_feature_list(output: &str) -> Vec<FeatureRecord> {
    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split(COLUMN_SEPARATOR).map(str::trim).collect();
            if columns.len() <= 2 {
                return None;
            }
            let state = match columns.get(3) {
                Some(state) => FeatureState::from(*state),
                None => {
                    debug!("No state column in feature row {:?}", line);
                    return None;
                }
            };
            Some(FeatureRecord {
                name: columns[0].to_owned(),
                version: columns[1].to_owned(),
                state,
            })
        })
        .collect()
}

/// Check if `feature` is installed.
///
/// Without a version, any installed version of the feature matches.
pub fn is_feature_installed(
    client: &KarafClient,
    feature: &FeatureRef,
) -> Result<bool, FeatureError> {
    let invocation = client.run_quoted("feature:list")?;
    let installed = parse_feature_list(&invocation.output.stdout)
        .iter()
        .filter(|record| record.state.is_installed())
        .any(|record| feature.matches(record));
    debug!("Feature {} installed: {}", feature, installed);
    Ok(installed)
}

fn run_feature_command(
    client: &KarafClient,
    action: &str,
    feature: &FeatureRef,
) -> Result<Invocation, FeatureError> {
    let invocation = client.run_quoted(&format!("feature:{} {}", action, feature))?;
    if !invocation.output.success() {
        return Err(FeatureError::CommandFailed {
            reason: parse_error(&invocation.output.stdout),
            invocation,
        });
    }
    Ok(invocation)
}

/// Call karaf client to install `feature`.
pub fn install_feature(
    client: &KarafClient,
    feature: &FeatureRef,
) -> Result<Invocation, FeatureError> {
    run_feature_command(client, "install", feature)
}

/// Call karaf client to uninstall `feature`.
pub fn uninstall_feature(
    client: &KarafClient,
    feature: &FeatureRef,
) -> Result<Invocation, FeatureError> {
    run_feature_command(client, "uninstall", feature)
}

/// A feature and the state it shall be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequest {
    /// Feature name and optional version
    pub feature: FeatureRef,
    /// `present` installs, `absent` uninstalls
    pub state: DesiredState,
    /// Reinstall even if already installed (unsupported, see [`FeatureError::ForceInstall`])
    pub force: bool,
}

/// Bring the feature of `request` in the requested state.
pub fn ensure_feature(
    client: &KarafClient,
    request: &FeatureRequest,
) -> Result<FeatureOutcome, FeatureError> {
    let feature = &request.feature;
    let state = request.state;
    if request.force && state == DesiredState::Present {
        return Err(FeatureError::ForceInstall(request.force.to_string()));
    }

    let installed = is_feature_installed(client, feature)?;
    let mut outcome = FeatureOutcome {
        changed: false,
        name: feature.qualified_name(),
        state: state.to_string(),
        invocation: None,
    };
    if installed == (state == DesiredState::Present) {
        info!("Feature {} already {}", feature, state);
        return Ok(outcome);
    }

    let invocation = match state {
        DesiredState::Present => install_feature(client, feature)?,
        DesiredState::Absent => uninstall_feature(client, feature)?,
    };
    info!("Feature {} is now {}", feature, state);
    outcome.changed = true;
    outcome.invocation = Some(invocation);
    Ok(outcome)
}
