//! This module holds structs and helpers for parameters and configuration
use crate::client::DEFAULT_CLIENT_BIN;
use crate::features::{FeatureRef, FeatureRequest};
use crate::properties::PropertySet;
use crate::value::{convert, ScalarValue};
use ::structopt::clap::AppSettings;
use anyhow::{bail, Context, Result};
use directories_next::ProjectDirs;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the settings file looked up in the user configuration directory.
const SETTINGS_FILE_NAME: &str = "karafctl.toml";

/// Invalid request parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A mandatory argument was not given
    #[error("Missing required argument `{0}`")]
    MissingArgument(&'static str),
    /// Unknown `--state` value
    #[error("Invalid state '{0}', expected one of: present, absent")]
    InvalidState(String),
    /// Property argument is neither `key=value` nor `key`
    #[error("Expect property argument as key=value or key (in '{0}')")]
    InvalidProperty(String),
    /// Setting a property without a value
    #[error("Property '{0}' needs a value when state is present")]
    MissingValue(String),
    /// `--version` given but empty
    #[error("Expect a non empty version")]
    EmptyVersion,
    /// The properties file is unreadable or not a flat TOML table
    #[error("Reading properties file {path:?}: {message}")]
    PropertiesFile { path: PathBuf, message: String },
}

/// State requested for properties or features.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// Properties set, feature installed
    #[default]
    Present,
    /// Properties deleted, feature uninstalled
    Absent,
}

impl std::str::FromStr for DesiredState {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(DesiredState::Present),
            "absent" => Ok(DesiredState::Absent),
            _ => Err(ConfigError::InvalidState(s.to_owned())),
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DesiredState::Present => write!(f, "present"),
            DesiredState::Absent => write!(f, "absent"),
        }
    }
}

/// Parse a `key=value` or `key` property argument.
///
/// The value goes through [`convert`], so `-p enabled=false` gives a boolean.
/// ```
/// use lib::config::parse_property_arg;
/// use lib::value::ScalarValue;
/// assert_eq!(
///     parse_property_arg("noAutoStartBundles=false").unwrap(),
///     ("noAutoStartBundles".to_string(), Some(ScalarValue::Bool(false)))
/// );
/// assert_eq!(parse_property_arg("key1").unwrap(), ("key1".to_string(), None));
/// ```
pub fn parse_property_arg(s: &str) -> Result<(String, Option<ScalarValue>), ConfigError> {
    let (key, value) = match s.split_once('=') {
        Some((key, value)) => (key.trim(), Some(convert(value.trim()))),
        None => (s.trim(), None),
    };
    if key.is_empty() {
        return Err(ConfigError::InvalidProperty(s.to_owned()));
    }
    Ok((key.to_owned(), value))
}

/// Read a TOML file whose top level table maps property names to values.
pub fn read_properties_file(path: &Path) -> Result<PropertySet, ConfigError> {
    let error = |message: String| ConfigError::PropertiesFile {
        path: path.to_owned(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
    toml::from_str(&content).map_err(|e| error(e.to_string()))
}

// Courtesy of structopt_flags crate
#[derive(structopt::StructOpt, Debug, Clone, PartialEq, Eq, Default)]
pub struct QuietVerbose {
    /// Increase the output's verbosity level
    ///
    /// Pass many times to increase verbosity level, up to 3.
    #[structopt(
        name = "quietverbose",
        long = "verbose",
        short = "v",
        parse(from_occurrences),
        conflicts_with = "quietquiet",
        global = true
    )]
    verbosity_level: u8,

    /// Decrease the output's verbosity level.
    ///
    /// Used once, it will set error log level.
    /// Used twice, will silent the log completely
    #[structopt(
        name = "quietquiet",
        long = "quiet",
        short = "q",
        parse(from_occurrences),
        conflicts_with = "quietverbose",
        global = true
    )]
    quiet_level: u8,
}

impl Serialize for QuietVerbose {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.get_level_filter())
    }
}

fn de_from_str<'de, D>(deserializer: D) -> Result<QuietVerbose, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let (verbosity_level, quiet_level) = match s.to_ascii_lowercase().as_ref() {
        "off" => (0, 2),
        "error" => (0, 1),
        "warn" => (0, 0),
        "info" => (1, 0),
        "debug" => (2, 0),
        _ => (3, 0),
    };
    Ok(QuietVerbose {
        verbosity_level,
        quiet_level,
    })
}

impl QuietVerbose {
    /// Log level filter matching the `-v`/`-q` occurrences, `Warn` by default.
    pub fn get_level_filter(&self) -> &str {
        let quiet: i8 = if self.quiet_level > 1 {
            2
        } else {
            self.quiet_level as i8
        };
        let verbose: i8 = if self.verbosity_level > 2 {
            3
        } else {
            self.verbosity_level as i8
        };
        match verbose - quiet {
            -2 => "Off",
            -1 => "Error",
            0 => "Warn",
            1 => "Info",
            2 => "Debug",
            _ => "Trace",
        }
    }

    fn is_set(&self) -> bool {
        self.verbosity_level > 0 || self.quiet_level > 0
    }
}

/// Settings shared by all subcommands.
///
/// Merged from built-in defaults, the settings file and the command line (in
/// increasing priority).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// karaf client binary
    pub client_bin: String,
    /// fail when a property mutation command exits with a non zero code
    pub strict: bool,
    /// log level
    #[serde(deserialize_with = "de_from_str")]
    pub verbose: QuietVerbose,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            client_bin: DEFAULT_CLIENT_BIN.into(),
            strict: false,
            verbose: QuietVerbose::default(),
        }
    }
}

/// Settings given on the command line, unset ones are not serialized so that
/// they do not shadow the settings file.
#[derive(Serialize, Debug)]
struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    client_bin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<QuietVerbose>,
}

/// Default settings file, in the user configuration directory.
pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "apache", "karafctl").map(|d| d.config_dir().join(SETTINGS_FILE_NAME))
}

#[derive(structopt::StructOpt, Debug)]
/// Manage a running karaf container through its command line client
///
/// Properties and features are only modified when their current state differs
/// from the requested one. The result is printed as JSON on standard output.
#[structopt(global_settings(&[
    AppSettings::ColoredHelp,
    AppSettings::ColorAuto,
    AppSettings::VersionlessSubcommands
]))]
pub struct Args {
    /// karaf client binary [default: /opt/karaf/bin/client]
    #[structopt(short, long, env = "KARAF_CLIENT_BIN")]
    pub client_bin: Option<String>,

    /// settings file
    ///
    /// Will use karafctl.toml in the user configuration directory if unset.
    #[structopt(long, parse(from_os_str))]
    pub settings: Option<PathBuf>,

    /// fail when a property set or delete command exits with an error
    #[structopt(long)]
    pub strict: bool,

    #[structopt(flatten)]
    pub verbose: QuietVerbose,

    #[structopt(subcommand)]
    pub cmd: Command,
}

/// Subcommands, one per handler.
#[derive(structopt::StructOpt, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set or delete properties of a configuration pid
    Config {
        /// service pid
        #[structopt(short, long)]
        name: String,

        /// present or absent
        #[structopt(short, long, default_value = "present")]
        state: String,

        /// property as key=value (only key is needed with --state absent)
        #[structopt(short = "p", long = "property")]
        properties: Vec<String>,

        /// TOML file of typed property values
        #[structopt(long, parse(from_os_str))]
        properties_file: Option<PathBuf>,

        /// only report whether a change would be made
        #[structopt(long)]
        check: bool,
    },
    /// Install or uninstall a feature
    Feature {
        /// feature name
        #[structopt(short, long)]
        name: String,

        /// feature version, any installed version matches if unset
        #[structopt(long)]
        version: Option<String>,

        /// present or absent
        #[structopt(short, long, default_value = "present")]
        state: String,

        /// force installation (not supported, always fails with state present)
        #[structopt(long)]
        force: bool,
    },
}

/// Validated request, ready for a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Set properties on a pid
    SetProperties {
        /// Configuration pid
        pid: String,
        /// Desired values
        properties: PropertySet,
        /// Only report what would change
        check_mode: bool,
    },
    /// Delete properties of a pid
    DeleteProperties {
        /// Configuration pid
        pid: String,
        /// Properties to remove
        names: BTreeSet<String>,
        /// Only report what would change
        check_mode: bool,
    },
    /// Install or uninstall a feature
    Feature(FeatureRequest),
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            client_bin: self.client_bin.clone(),
            strict: self.strict.then_some(true),
            verbose: self.verbose.is_set().then(|| self.verbose.clone()),
        }
    }

    /// Merge config Default → settings file → command line args
    pub fn settings(&self) -> Result<Settings> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match &self.settings {
            Some(path) => {
                if !path.is_file() {
                    bail!("Settings file {:?} not found", path);
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_settings_path() {
                    debug!("Looking for settings in {:?}", path);
                    figment = figment.merge(Toml::file(path));
                }
            }
        }
        let settings: Settings = figment
            .merge(Serialized::defaults(self.overrides()))
            .extract()
            .context("Reading settings")?;
        Ok(settings)
    }
}

fn required(value: &str, name: &'static str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingArgument(name));
    }
    Ok(value.to_owned())
}

impl Command {
    /// Check parameters and build the matching [`Request`].
    ///
    /// Nothing is run before the parameters are known to be valid.
    pub fn validate(&self) -> Result<Request, ConfigError> {
        match self {
            Command::Config {
                name,
                state,
                properties,
                properties_file,
                check,
            } => {
                let pid = required(name, "name")?;
                let state: DesiredState = state.parse()?;
                let mut wanted: BTreeMap<String, Option<ScalarValue>> = BTreeMap::new();
                if let Some(path) = properties_file {
                    let from_file = read_properties_file(path)?;
                    wanted.extend(from_file.into_iter().map(|(k, v)| (k, Some(v))));
                }
                for arg in properties {
                    let (key, value) = parse_property_arg(arg)?;
                    wanted.insert(key, value);
                }
                if wanted.is_empty() {
                    return Err(ConfigError::MissingArgument("property"));
                }
                match state {
                    DesiredState::Present => {
                        let properties = wanted
                            .into_iter()
                            .map(|(key, value)| match value {
                                Some(value) => Ok((key, value)),
                                None => Err(ConfigError::MissingValue(key)),
                            })
                            .collect::<Result<PropertySet, _>>()?;
                        Ok(Request::SetProperties {
                            pid,
                            properties,
                            check_mode: *check,
                        })
                    }
                    DesiredState::Absent => Ok(Request::DeleteProperties {
                        pid,
                        names: wanted.into_keys().collect(),
                        check_mode: *check,
                    }),
                }
            }
            Command::Feature {
                name,
                version,
                state,
                force,
            } => {
                let name = required(name, "name")?;
                let version = match version {
                    Some(v) if v.trim().is_empty() => return Err(ConfigError::EmptyVersion),
                    Some(v) => Some(v.trim().to_owned()),
                    None => None,
                };
                Ok(Request::Feature(FeatureRequest {
                    feature: FeatureRef::new(name, version),
                    state: state.parse()?,
                    force: *force,
                }))
            }
        }
    }
}


#[cfg(test)]
mod validate_should {
    use super::*;
    use mktemp::Temp;
    use structopt::StructOpt;

    fn command(args: &[&str]) -> Command {
        let mut argv = vec!["karafctl"];
        argv.extend_from_slice(args);
        Args::from_iter(argv).cmd
    }

    #[test]
    fn build_a_set_request() -> Result<()> {
        let request = command(&[
            "config",
            "--name",
            "org.apache.karaf.kar",
            "-p",
            "noAutoStartBundles=false",
        ])
        .validate()?;
        assert_eq!(
            request,
            Request::SetProperties {
                pid: "org.apache.karaf.kar".into(),
                properties: [("noAutoStartBundles".to_string(), ScalarValue::Bool(false))].into(),
                check_mode: false,
            }
        );
        Ok(())
    }

    #[test]
    fn build_a_delete_request_with_or_without_values() -> Result<()> {
        let request = command(&[
            "config", "-n", "pid", "-s", "absent", "-p", "key1", "-p", "key2=x", "--check",
        ])
        .validate()?;
        assert_eq!(
            request,
            Request::DeleteProperties {
                pid: "pid".into(),
                names: ["key1".to_string(), "key2".to_string()].into(),
                check_mode: true,
            }
        );
        Ok(())
    }

    #[test]
    fn require_values_with_state_present() {
        assert_eq!(
            command(&["config", "-n", "pid", "-p", "key1"]).validate(),
            Err(ConfigError::MissingValue("key1".into()))
        );
    }

    #[test]
    fn reject_unknown_states() {
        assert_eq!(
            command(&["config", "-n", "pid", "-s", "latest", "-p", "a=1"]).validate(),
            Err(ConfigError::InvalidState("latest".into()))
        );
        assert_eq!(
            command(&["feature", "-n", "camel", "-s", "Present"]).validate(),
            Err(ConfigError::InvalidState("Present".into()))
        );
    }

    #[test]
    fn require_a_name_and_a_property() {
        assert_eq!(
            command(&["config", "-n", " ", "-p", "a=1"]).validate(),
            Err(ConfigError::MissingArgument("name"))
        );
        assert_eq!(
            command(&["config", "-n", "pid"]).validate(),
            Err(ConfigError::MissingArgument("property"))
        );
    }

    #[test]
    fn read_typed_values_from_a_properties_file() -> Result<()> {
        let temp = Temp::new_file()?;
        let path = temp.to_path_buf();
        fs::write(&path, "enabled = true\nport = 8181\nratio = 0.5\nname = 'true'\n")?;
        let request = command(&[
            "config",
            "-n",
            "pid",
            "--properties-file",
            path.to_str().unwrap(),
            "-p",
            "port=8282",
        ])
        .validate()?;
        let Request::SetProperties { properties, .. } = request else {
            panic!("Expected a set request");
        };
        assert_eq!(properties["enabled"], ScalarValue::Bool(true));
        assert_eq!(properties["port"], ScalarValue::Int(8282));
        assert_eq!(properties["ratio"], ScalarValue::Float(0.5));
        assert_eq!(properties["name"], ScalarValue::String("true".into()));
        Ok(())
    }

    #[test]
    fn report_an_unreadable_properties_file() {
        let res = command(&[
            "config",
            "-n",
            "pid",
            "--properties-file",
            "/nonexistent/props.toml",
        ])
        .validate();
        assert!(matches!(res, Err(ConfigError::PropertiesFile { .. })));
    }

    #[test]
    fn build_a_feature_request() -> Result<()> {
        let request = command(&[
            "feature",
            "-n",
            "camel-jms",
            "--version",
            "2.18.1",
            "--force",
        ])
        .validate()?;
        assert_eq!(
            request,
            Request::Feature(FeatureRequest {
                feature: FeatureRef::new("camel-jms", Some("2.18.1".into())),
                state: DesiredState::Present,
                force: true,
            })
        );
        assert_eq!(
            command(&["feature", "-n", "camel-jms", "--version", ""]).validate(),
            Err(ConfigError::EmptyVersion)
        );
        Ok(())
    }
}

#[cfg(test)]
mod settings_should {
    use super::*;
    use mktemp::Temp;
    use structopt::StructOpt;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["karafctl"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["feature", "-n", "f"]);
        Args::from_iter(argv)
    }

    #[test]
    fn layer_file_then_command_line() -> Result<()> {
        let temp = Temp::new_file()?;
        let path = temp.to_path_buf();
        fs::write(
            &path,
            "client_bin = \"/srv/karaf/bin/client\"\nstrict = true\nverbose = \"debug\"\n",
        )?;
        let path = path.to_str().unwrap();

        let settings = args(&["--settings", path]).settings()?;
        assert_eq!(settings.client_bin, "/srv/karaf/bin/client");
        assert!(settings.strict);
        assert_eq!(settings.verbose.get_level_filter(), "Debug");

        let settings = args(&["--settings", path, "-c", "/usr/bin/client", "-q"]).settings()?;
        assert_eq!(settings.client_bin, "/usr/bin/client");
        assert!(settings.strict);
        assert_eq!(settings.verbose.get_level_filter(), "Error");
        Ok(())
    }

    #[test]
    fn fail_on_a_missing_settings_file() {
        assert!(args(&["--settings", "/nonexistent/karafctl.toml"])
            .settings()
            .is_err());
    }

    #[test]
    fn default_to_warn_level() {
        assert_eq!(QuietVerbose::default().get_level_filter(), "Warn");
        assert_eq!(Settings::default().client_bin, "/opt/karaf/bin/client");
    }
}
