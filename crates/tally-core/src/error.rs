use thiserror::Error;

/// Validation failures surfaced to the user before any store mutation.
///
/// Everything else in the failure taxonomy is behavior rather than a type:
/// unknown ids are silent no-ops, persistence failures are caught and logged
/// at the gateway, and a denied notification permission only suppresses the
/// desktop channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("category name must not be empty")]
    EmptyName,
}
