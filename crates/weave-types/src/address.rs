//! `name@id` addressing.
//!
//! A *fullname* is `name@id`, where `id` names the owning **process** (many
//! services share one id).  Splitting always happens on the **last** `@`,
//! so a short name may itself contain `@` while the id never does.
//!
//! A string without any `@` is a local short name.  It is never an error:
//! [`promote`] turns it into a fullname using the local process id.

use thiserror::Error;

/// Separator between the short name and the process id.
pub const SEPARATOR: char = '@';

/// Addressing failure.  Only an empty name is rejected; malformed strings
/// without `@` are treated as local short names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("service name must not be empty")]
    EmptyName,
}

/// Compose `name@id`.
pub fn fullname(name: &str, id: &str) -> Result<String, AddressError> {
    if name.is_empty() {
        return Err(AddressError::EmptyName);
    }
    Ok(format!("{name}{SEPARATOR}{id}"))
}

/// Return the process id part of `name`, or `None` for a short name.
///
/// A trailing `@` with nothing after it yields `None` as well.
pub fn id_of(name: &str) -> Option<&str> {
    name.rfind(SEPARATOR)
        .map(|at| &name[at + 1..])
        .filter(|id| !id.is_empty())
}

/// Return the short name part of `name` (everything before the last `@`).
pub fn short_name(name: &str) -> &str {
    match name.rfind(SEPARATOR) {
        Some(at) => &name[..at],
        None => name,
    }
}

/// Promote `name` to a fullname, appending `local_id` when it has no id.
pub fn promote(name: &str, local_id: &str) -> Result<String, AddressError> {
    if name.is_empty() {
        return Err(AddressError::EmptyName);
    }
    match id_of(name) {
        Some(_) => Ok(name.to_string()),
        None => fullname(short_name(name), local_id),
    }
}

/// `true` when `name` addresses a service owned by `local_id`.  Short names
/// are always local.
pub fn is_local(name: &str, local_id: &str) -> bool {
    id_of(name).is_none_or(|id| id == local_id)
}

/// Default callback method for a subscription on `topic_method`.
///
/// | topic | callback |
/// |---|---|
/// | `publishEpoch` | `onEpoch` |
/// | `getRegistry` | `onRegistry` |
/// | `ping` | `onPing` |
pub fn callback_topic_name(topic_method: &str) -> String {
    let stem = topic_method
        .strip_prefix("publish")
        .or_else(|| topic_method.strip_prefix("get"))
        .unwrap_or(topic_method);
    format!("on{}", capitalize(stem))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullname_roundtrips_through_split() {
        for (name, id) in [("alice", "P1"), ("clock01", "rxl-2"), ("ui", "5d1c-uuid")] {
            let full = fullname(name, id).unwrap();
            assert_eq!(id_of(&full), Some(id));
            assert_eq!(short_name(&full), name);
        }
    }

    #[test]
    fn split_uses_last_separator() {
        assert_eq!(id_of("cam@front@P1"), Some("P1"));
        assert_eq!(short_name("cam@front@P1"), "cam@front");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(fullname("", "P1"), Err(AddressError::EmptyName));
        assert_eq!(promote("", "P1"), Err(AddressError::EmptyName));
    }

    #[test]
    fn short_name_has_no_id() {
        assert_eq!(id_of("alice"), None);
        assert_eq!(short_name("alice"), "alice");
        assert_eq!(id_of("alice@"), None);
    }

    #[test]
    fn promote_adds_local_id_only_when_missing() {
        assert_eq!(promote("alice", "P1").unwrap(), "alice@P1");
        assert_eq!(promote("alice@P2", "P1").unwrap(), "alice@P2");
    }

    #[test]
    fn locality() {
        assert!(is_local("alice", "P1"));
        assert!(is_local("alice@P1", "P1"));
        assert!(!is_local("alice@P2", "P1"));
    }

    #[test]
    fn callback_names() {
        assert_eq!(callback_topic_name("publishEpoch"), "onEpoch");
        assert_eq!(callback_topic_name("getRegistry"), "onRegistry");
        assert_eq!(callback_topic_name("ping"), "onPing");
        assert_eq!(callback_topic_name("publish"), "on");
    }
}
