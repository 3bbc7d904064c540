//! Callbacks around model changes. Every method defaults to a no-op.

use crate::config::Record;
use crate::error::AppError;
use crate::form::BoundForm;
use async_trait::async_trait;

#[async_trait]
pub trait ModelViewHooks: Send + Sync {
    /// Before the record is saved. An error aborts the save and is flashed.
    async fn on_model_change(&self, _form: &BoundForm, _record: &mut Record, _is_created: bool) -> Result<(), AppError> {
        Ok(())
    }

    /// After the record and its inline rows were committed.
    async fn after_model_change(&self, _form: &BoundForm, _record: &Record, _is_created: bool) -> Result<(), AppError> {
        Ok(())
    }

    async fn on_model_delete(&self, _record: &Record) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_model_delete(&self, _record: &Record) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct NoHooks;

impl ModelViewHooks for NoHooks {}
