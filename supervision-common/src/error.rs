// Copyright 2026 The Supervision Core Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

/// The error taxonomy shared by every public operation in the supervision
/// core. Individual crates may wrap more specific causes (a transport error,
/// a serde error) but always downcast to one of these variants at the
/// crate boundary so callers see one consistent shape.
#[derive(Debug, Error, Clone)]
pub enum SupervisionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("disabled: {0}")]
    Disabled(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("no migrator registered for {plugin_id} {from} -> {to}")]
    MigrationUnavailable {
        plugin_id: String,
        from: String,
        to: String,
    },

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SupervisionResult<T> = Result<T, SupervisionError>;

impl SupervisionError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SupervisionError::Unavailable(_) | SupervisionError::Timeout(_)
        )
    }
}
