//! Terminal responses delivered through the request's response callback.
//!
//! On the wire these keep the message shape clients already parse:
//!
//! ```text
//! {"status":"success","data":"data:image/png;base64,...","taskId":"t1"}
//! {"status":"error","taskId":"t1"}
//! ```

use crate::request::TaskId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        /// Encoded image as a `data:` URL.
        data: String,
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    Error {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
}

impl Response {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Response::Success { task_id, .. } | Response::Error { task_id } => task_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}
