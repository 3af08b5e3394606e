//! Progress and failure notifications emitted while a batch runs.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoType {
    Info,
    Error,
}

/// One notification. `owner` is the schema of the object it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackInfo {
    pub info_type: InfoType,
    pub message: String,
    pub owner: Option<String>,
}

impl FeedbackInfo {
    pub fn info(message: impl Into<String>, owner: Option<&str>) -> Self {
        Self {
            info_type: InfoType::Info,
            message: message.into(),
            owner: owner.map(str::to_string),
        }
    }

    pub fn error(message: impl Into<String>, owner: Option<&str>) -> Self {
        Self {
            info_type: InfoType::Error,
            message: message.into(),
            owner: owner.map(str::to_string),
        }
    }
}

/// Receives notifications; shared across the threads of a parallel batch.
pub trait FeedbackObserver: Send + Sync {
    fn notify(&self, info: &FeedbackInfo);
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl FeedbackObserver for TracingFeedback {
    fn notify(&self, info: &FeedbackInfo) {
        let owner = info.owner.as_deref().unwrap_or_default();
        match info.info_type {
            InfoType::Info => tracing::info!(owner, "{}", info.message),
            InfoType::Error => tracing::error!(owner, "{}", info.message),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingFeedback {
    items: Mutex<Vec<FeedbackInfo>>,
}

impl CollectingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<FeedbackInfo> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> Vec<FeedbackInfo> {
        self.items()
            .into_iter()
            .filter(|i| i.info_type == InfoType::Error)
            .collect()
    }
}

impl FeedbackObserver for CollectingFeedback {
    fn notify(&self, info: &FeedbackInfo) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collecting_feedback_splits_errors() {
        let feedback = CollectingFeedback::new();
        feedback.notify(&FeedbackInfo::info("start", Some("dbo")));
        feedback.notify(&FeedbackInfo::error("failed", None));

        assert_eq!(feedback.items().len(), 2);
        assert_eq!(feedback.errors(), vec![FeedbackInfo::error("failed", None)]);
        assert_eq!(feedback.items()[0].owner.as_deref(), Some("dbo"));
    }
}
