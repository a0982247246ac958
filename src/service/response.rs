//! Uniform `{success, message?, data?, error?}` envelope returned by every operation

use super::error::ExperimentError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OperationResult<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Machine-readable error code, set on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        OperationResult {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        OperationResult {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    pub fn failure(err: &ExperimentError) -> Self {
        OperationResult {
            success: false,
            message: Some(err.to_string()),
            data: None,
            error: Some(err.code().to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl<T> From<Result<T, ExperimentError>> for OperationResult<T> {
    fn from(result: Result<T, ExperimentError>) -> Self {
        match result {
            Ok(data) => OperationResult::ok(data),
            Err(e) => OperationResult::failure(&e),
        }
    }
}
