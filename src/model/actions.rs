//! Batch actions over selected list rows.

use super::view::{error_text, ModelView};
use crate::error::AppError;
use crate::response::FlashMessage;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub text: String,
    /// Question shown before running the action.
    pub confirmation: Option<String>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        ActionSpec {
            name: name.into(),
            text: text.into(),
            confirmation: None,
        }
    }

    pub fn confirm(mut self, question: impl Into<String>) -> Self {
        self.confirmation = Some(question.into());
        self
    }
}

#[async_trait]
pub trait ModelAction: Send + Sync {
    fn spec(&self) -> &ActionSpec;

    /// Whether the view offers the action at all.
    fn is_allowed(&self, _view: &ModelView) -> bool {
        true
    }

    /// Run over the selected primary keys; the returned messages are flashed.
    async fn run(&self, view: &ModelView, ids: &[Value]) -> Result<Vec<FlashMessage>, AppError>;
}

/// Built-in `delete` action, offered when the view can delete.
pub struct DeleteAction {
    spec: ActionSpec,
}

impl Default for DeleteAction {
    fn default() -> Self {
        DeleteAction {
            spec: ActionSpec::new("delete", "Delete").confirm("Are you sure you want to delete selected records?"),
        }
    }
}

pub fn deleted_message(count: usize) -> String {
    if count == 1 {
        "Record was successfully deleted.".to_string()
    } else {
        format!("{} records were successfully deleted.", count)
    }
}

#[async_trait]
impl ModelAction for DeleteAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn is_allowed(&self, view: &ModelView) -> bool {
        view.config().can_delete
    }

    async fn run(&self, view: &ModelView, ids: &[Value]) -> Result<Vec<FlashMessage>, AppError> {
        let mut messages = Vec::new();
        let records = match view.backend().get_many(view.entity(), ids).await {
            Ok(records) => records,
            Err(e) if view.reraises(&e) => return Err(e),
            Err(e) => {
                return Ok(vec![FlashMessage::error(format!(
                    "Failed to delete records. {}",
                    error_text(&e)
                ))]);
            }
        };
        let mut count = 0;
        for record in &records {
            match view.delete_model(record).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) if view.reraises(&e) => return Err(e),
                Err(e) => {
                    messages.push(FlashMessage::error(format!(
                        "Failed to delete record. {}",
                        error_text(&e)
                    )));
                }
            }
        }
        messages.insert(0, FlashMessage::success(deleted_message(count)));
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralizes_delete_message() {
        assert_eq!(deleted_message(1), "Record was successfully deleted.");
        assert_eq!(deleted_message(3), "3 records were successfully deleted.");
        assert_eq!(deleted_message(0), "0 records were successfully deleted.");
    }
}
