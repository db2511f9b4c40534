//! CLI output: error mapping from harness errors to stable CLI surface.

use crate::error::HarnessError;
use crate::report::{EXIT_ABORTED, EXIT_CONFIG};

/// Map harness errors to a string for CLI output.
pub fn map_error(e: &HarnessError) -> String {
    format!("error [{}]: {}", e.kind(), e)
}

/// Exit code for an error that prevented a run from starting.
pub fn exit_code_for(e: &HarnessError) -> i32 {
    match e {
        HarnessError::Config(_) | HarnessError::Manifest { .. } => EXIT_CONFIG,
        _ => EXIT_ABORTED,
    }
}
