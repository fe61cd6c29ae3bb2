//! Idempotent management of configuration properties of a karaf service pid.
//!
//! Current values are queried with `config:property-get`, compared with the
//! desired ones, and only the differing properties are written back with
//! `config:property-set` (or removed with `config:property-delete`).
use crate::client::{parse_error, Invocation, KarafClient};
use crate::outcome::{ConfigOutcome, PropertyDiff};
use crate::value::{convert, ScalarValue};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Property names mapped to their values.
pub type PropertySet = BTreeMap<String, ScalarValue>;

/// Errors raised while applying properties.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// The karaf client could not be run at all.
    #[error("Karaf client error")]
    Client(#[from] anyhow::Error),
    /// In strict mode, the mutation command exited with a non zero code.
    #[error("{reason}")]
    CommandFailed {
        /// Cause extracted from the client output
        reason: String,
        /// The failing command and its output
        invocation: Invocation,
    },
}

/// How mutations are carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Compute the changes but do not run any mutation.
    pub check_mode: bool,
    /// Fail when the mutation command exits with a non zero code.
    pub strict: bool,
}

fn property_get_command(pid: &str, name: &str) -> String {
    format!("config:property-get --raw --pid {pid} {name}")
}

fn property_set_command(pid: &str, name: &str, value: &ScalarValue) -> String {
    format!("config:property-set --pid \"{pid}\" {name} {value}")
}

fn property_delete_command(pid: &str, name: &str) -> String {
    format!("config:property-delete --pid \"{pid}\" {name}")
}

/// Parse `name=value` lines, ignoring anything else.
///
/// The line is split on its first `=`, both sides are trimmed and the value
/// goes through [`convert`].
///
/// ```
/// use lib::properties::parse_properties;
/// use lib::value::ScalarValue;
/// let props = parse_properties("Connecting to karaf...\nfoo = 12\n");
/// assert_eq!(props.len(), 1);
/// assert_eq!(props["foo"], ScalarValue::Int(12));
/// ```
pub fn parse_properties(output: &str) -> PropertySet {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| (name.trim().to_owned(), convert(value.trim())))
        .collect()
}

/// Query the current values of `names` on `pid`, in one client invocation.
///
/// Properties which are not set are simply missing from the result.
pub fn read_properties<'a, I>(
    client: &KarafClient,
    pid: &str,
    names: I,
) -> Result<PropertySet, PropertyError>
where
    I: IntoIterator<Item = &'a String>,
{
    let queries: Vec<String> = names
        .into_iter()
        .map(|name| property_get_command(pid, name))
        .collect();
    if queries.is_empty() {
        return Ok(PropertySet::new());
    }
    let invocation = client.run_joined(&queries)?;
    let observed = parse_properties(&invocation.output.stdout);
    debug!("Observed properties on {}: {:?}", pid, observed);
    Ok(observed)
}

/// Names of the `desired` properties missing from `observed` or holding another value.
pub fn diff_properties(desired: &PropertySet, observed: &PropertySet) -> BTreeSet<String> {
    desired
        .iter()
        .filter(|(name, value)| observed.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Names among `names` which are currently set in `observed`.
pub fn diff_delete<'a, I>(names: I, observed: &PropertySet) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .filter(|name| observed.contains_key(*name))
        .cloned()
        .collect()
}

/// Run the mutation `commands`, unless in check mode.
fn apply(
    client: &KarafClient,
    commands: &[String],
    options: ApplyOptions,
) -> Result<Option<Invocation>, PropertyError> {
    if options.check_mode {
        info!("Check mode: {} command(s) not run", commands.len());
        return Ok(None);
    }
    let invocation = client.run_joined(commands)?;
    if !invocation.output.success() {
        if options.strict {
            return Err(PropertyError::CommandFailed {
                reason: parse_error(&invocation.output.stdout),
                invocation,
            });
        }
        warn!(
            "Karaf client exited with code {} (ignored): {}",
            invocation.output.code, invocation.cmd
        );
    }
    Ok(Some(invocation))
}

/// Ensure every property of `desired` is set on `pid` with the given value.
pub fn set_properties(
    client: &KarafClient,
    pid: &str,
    desired: &PropertySet,
    options: ApplyOptions,
) -> Result<ConfigOutcome, PropertyError> {
    let observed = read_properties(client, pid, desired.keys())?;
    let need_change = diff_properties(desired, &observed);
    if need_change.is_empty() {
        info!("All properties of {} are up to date", pid);
        return Ok(ConfigOutcome::default());
    }
    info!("Properties to set on {}: {:?}", pid, need_change);

    let mut diff = PropertyDiff::default();
    let mut commands = Vec::new();
    for name in &need_change {
        let value = &desired[name];
        if let Some(old) = observed.get(name) {
            diff.before.insert(name.clone(), old.clone());
        }
        diff.after.insert(name.clone(), value.clone());
        commands.push(property_set_command(pid, name, value));
    }

    let invocation = apply(client, &commands, options)?;
    Ok(ConfigOutcome {
        changed: true,
        message: format!("set {} on {}", joined(&need_change), pid),
        diff: Some(diff),
        invocation,
        ..Default::default()
    })
}

/// Ensure none of `names` is set on `pid`.
pub fn delete_properties(
    client: &KarafClient,
    pid: &str,
    names: &BTreeSet<String>,
    options: ApplyOptions,
) -> Result<ConfigOutcome, PropertyError> {
    let observed = read_properties(client, pid, names)?;
    let need_delete = diff_delete(names, &observed);
    if need_delete.is_empty() {
        info!("None of {:?} is set on {}", names, pid);
        return Ok(ConfigOutcome::default());
    }
    info!("Properties to delete on {}: {:?}", pid, need_delete);

    let before = observed
        .into_iter()
        .filter(|(name, _)| need_delete.contains(name))
        .collect();
    let commands: Vec<String> = need_delete
        .iter()
        .map(|name| property_delete_command(pid, name))
        .collect();

    let invocation = apply(client, &commands, options)?;
    Ok(ConfigOutcome {
        changed: true,
        message: format!("deleted {} on {}", joined(&need_delete), pid),
        diff: Some(PropertyDiff {
            before,
            after: PropertySet::new(),
        }),
        invocation,
        ..Default::default()
    })
}

fn joined(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod parse_properties_should {
    use super::*;

    #[test]
    fn skip_lines_without_separator() {
        let out = "Logging in as karaf\n\nnoAutoStartBundles=false\nError: something\n";
        let props = parse_properties(out);
        assert_eq!(props.len(), 1);
        assert_eq!(props["noAutoStartBundles"], ScalarValue::Bool(false));
    }

    #[test]
    fn trim_names_and_convert_values() {
        let props = parse_properties(" a = 1 \r\nb=2.5\nc= some text \nd=yes");
        assert_eq!(props["a"], ScalarValue::Int(1));
        assert_eq!(props["b"], ScalarValue::Float(2.5));
        assert_eq!(props["c"], ScalarValue::String("some text".into()));
        assert_eq!(props["d"], ScalarValue::Bool(true));
    }

    #[test]
    fn split_on_the_first_separator() {
        let props = parse_properties("url=http://host/?a=b");
        assert_eq!(props["url"], ScalarValue::String("http://host/?a=b".into()));
    }
}
