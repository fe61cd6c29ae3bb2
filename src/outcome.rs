//! Result records reported to the caller once a request has been handled.
//!
//! They are serialized as JSON on stdout by the binary.
use crate::client::Invocation;
use crate::features::FeatureError;
use crate::properties::{PropertyError, PropertySet};
use serde::Serialize;

/// Observed and desired values of the properties that need a change.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct PropertyDiff {
    /// Observed values (only for properties currently set)
    pub before: PropertySet,
    /// Desired values (empty for deletions)
    pub after: PropertySet,
}

/// Result of a property set or delete pass.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ConfigOutcome {
    /// `true` when a change was (or, in check mode, would have been) made
    pub changed: bool,
    /// Always empty, kept for callers reading this field
    pub original_message: String,
    /// Short description of what was done
    pub message: String,
    /// Properties which need a change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<PropertyDiff>,
    /// Mutation command, absent when nothing ran
    #[serde(flatten)]
    pub invocation: Option<Invocation>,
}

/// Result of a feature install or uninstall request.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FeatureOutcome {
    /// `true` when the feature was installed or uninstalled
    pub changed: bool,
    /// Qualified feature name (`name` or `name/version`)
    pub name: String,
    /// Requested state, `present` or `absent`
    pub state: String,
    /// Install or uninstall command, absent when nothing ran
    #[serde(flatten)]
    pub invocation: Option<Invocation>,
}

/// Any handler result.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    /// Property set or delete
    Config(ConfigOutcome),
    /// Feature install or uninstall
    Feature(FeatureOutcome),
}

impl Outcome {
    /// Whether the managed container was (or would be) modified.
    pub fn changed(&self) -> bool {
        match self {
            Outcome::Config(o) => o.changed,
            Outcome::Feature(o) => o.changed,
        }
    }
}

/// Record reported when a request fails.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Always `true`
    pub failed: bool,
    /// Error message
    pub msg: String,
    /// Failing command, when the error comes from the karaf client
    #[serde(flatten)]
    pub invocation: Option<Invocation>,
}

impl Failure {
    /// Failure with a message only.
    pub fn new(msg: impl Into<String>) -> Self {
        Failure {
            failed: true,
            msg: msg.into(),
            invocation: None,
        }
    }
}

impl From<&anyhow::Error> for Failure {
    /// Keep the failing command when the error comes from a karaf command.
    fn from(err: &anyhow::Error) -> Self {
        let invocation = match err.downcast_ref::<FeatureError>() {
            Some(FeatureError::CommandFailed { invocation, .. }) => Some(invocation.clone()),
            _ => match err.downcast_ref::<PropertyError>() {
                Some(PropertyError::CommandFailed { invocation, .. }) => Some(invocation.clone()),
                _ => None,
            },
        };
        Failure {
            failed: true,
            msg: format!("{err:#}"),
            invocation,
        }
    }
}

#[cfg(test)]
mod outcome_should {
    use super::*;
    use crate::command::CommandOutput;
    use serde_json::json;

    #[test]
    fn serialize_feature_outcome_with_command_fields() {
        let outcome = FeatureOutcome {
            changed: true,
            name: "camel-jms/2.18.1".into(),
            state: "present".into(),
            invocation: Some(Invocation {
                cmd: "client 'feature:install camel-jms/2.18.1'".into(),
                output: CommandOutput::new(0, "done", ""),
            }),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "changed": true,
                "name": "camel-jms/2.18.1",
                "state": "present",
                "cmd": "client 'feature:install camel-jms/2.18.1'",
                "code": 0,
                "stdout": "done",
                "stderr": "",
            })
        );
    }

    #[test]
    fn serialize_unchanged_config_outcome_without_optional_fields() {
        let outcome = Outcome::Config(ConfigOutcome::default());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"changed": false, "original_message": "", "message": ""})
        );
        assert!(!outcome.changed());
    }

    #[test]
    fn keep_the_failing_command_in_failures() {
        let err = anyhow::Error::new(FeatureError::CommandFailed {
            reason: "No matching features".into(),
            invocation: Invocation {
                cmd: "client 'feature:install foo'".into(),
                output: CommandOutput::new(1, "reason: No matching features", ""),
            },
        });
        let failure = Failure::from(&err);
        assert_eq!(failure.msg, "No matching features");
        assert_eq!(
            failure.invocation.map(|i| i.cmd),
            Some("client 'feature:install foo'".to_string())
        );

        let failure = Failure::from(&anyhow::anyhow!("boom"));
        assert_eq!(failure, Failure::new("boom"));
    }
}
