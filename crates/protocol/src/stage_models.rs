//! Stage identification models.
//!
//! A stage is one logical processing step of a project (indexing, alignment,
//! variant calling, ...). Stages are identified by a short code that is also
//! used to build the completion marker key stored in the project
//! configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Suffix appended to a stage code to form its completion marker key.
pub const MARKER_SUFFIX: &str = "_date";

/// Short string key identifying a stage, e.g. `align`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, TS)]
#[serde(transparent)]
pub struct StageCode(pub String);

impl StageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Configuration key whose presence marks the stage as completed.
    ///
    /// ```
    /// use gxp_protocol::stage_models::StageCode;
    ///
    /// assert_eq!(StageCode::new("align").marker_key(), "align_date");
    /// ```
    pub fn marker_key(&self) -> String {
        format!("{}{MARKER_SUFFIX}", self.0)
    }
}

impl fmt::Display for StageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Completion status of a stage, derived purely from the project
/// configuration contents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "state", content = "date", rename_all = "camelCase")]
pub enum CompletionStatus {
    /// The marker is present; holds the recorded timestamp.
    Completed(String),

    /// No marker: the stage never ran, or its last run did not succeed.
    Pending,
}

/// Summary of a stage definition, for listing in a UI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StageInfo {
    pub code: StageCode,
    pub title: String,
    /// Names of the parameters that must be supplied.
    pub required: Vec<String>,
    /// Names of the parameters that may be supplied.
    pub optional: Vec<String>,
}
