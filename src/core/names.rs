//! Unit, application, and relation naming.

use crate::core::error::{Error, Result};

/// Controller-assigned relation identifier; positive and stable for the
/// relation's lifetime.
pub type RelationId = i64;

/// A unit name of the form `app/N`.
pub type UnitName = String;

/// An application name.
pub type ApplicationName = String;

/// Extracts the application part of a unit name (`wordpress/0` ->
/// `wordpress`).
///
/// # Errors
/// Returns `Error::InvalidName` if the name is not of the `app/N` form.
pub fn unit_application(unit: &str) -> Result<&str> {
    match unit.split_once('/') {
        Some((app, seq))
            if !app.is_empty() && !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Ok(app)
        }
        _ => Err(Error::InvalidName {
            kind: "unit",
            name: unit.to_string(),
        }),
    }
}

/// True if the member name denotes a unit rather than an application.
#[must_use]
pub fn is_unit_name(member: &str) -> bool {
    unit_application(member).is_ok()
}

/// Maps a member name to its on-disk file name (`wordpress/0` ->
/// `wordpress-0`). Application members contain no `/` and pass through.
#[must_use]
pub fn member_file_name(member: &str) -> String {
    member.replace('/', "-")
}

/// Reverses `member_file_name`. A trailing `-N` (N numeric) marks a unit
/// member; anything else is an application member.
#[must_use]
pub fn member_from_file_name(name: &str) -> String {
    if let Some((app, seq)) = name.rsplit_once('-') {
        if !app.is_empty() && !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{app}/{seq}");
        }
    }
    name.to_string()
}
