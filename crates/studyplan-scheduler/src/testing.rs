//! Store wrapper that fails or cancels on a chosen `save`.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{PlannerError, Result};
use crate::memory::MemoryTaskStore;
use crate::store::TaskStore;
use crate::types::{Interval, Task};

pub(crate) struct ScriptedStore {
    pub inner: MemoryTaskStore,
    saves: AtomicUsize,
    /// 1-based `save` call that fails with a database error.
    fail_on_save: Option<usize>,
    /// Cancelled after every successful `save`.
    cancel_after_save: Option<CancellationToken>,
}

impl ScriptedStore {
    pub fn failing_on_save(inner: MemoryTaskStore, nth: usize) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            fail_on_save: Some(nth),
            cancel_after_save: None,
        }
    }

    pub fn cancelling_after_save(inner: MemoryTaskStore, cancel: CancellationToken) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            fail_on_save: None,
            cancel_after_save: Some(cancel),
        }
    }
}

impl TaskStore for ScriptedStore {
    fn insert(&self, task: &Task) -> Result<Task> {
        self.inner.insert(task)
    }

    fn find_by_id(&self, user_id: &str, task_id: &str) -> Result<Option<Task>> {
        self.inner.find_by_id(user_id, task_id)
    }

    fn find_overlapping(
        &self,
        user_id: &str,
        interval: &Interval,
        exclude_task_id: Option<&str>,
    ) -> Result<Vec<Task>> {
        self.inner.find_overlapping(user_id, interval, exclude_task_id)
    }

    fn find_scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        self.inner.find_scheduled_between(user_id, from, until)
    }

    fn find_unscheduled(&self, user_id: &str) -> Result<Vec<Task>> {
        self.inner.find_unscheduled(user_id)
    }

    fn find_missed(&self, user_id: &str, from: DateTime<Utc>) -> Result<Vec<Task>> {
        self.inner.find_missed(user_id, from)
    }

    fn find_for_week(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        self.inner.find_for_week(user_id, from, until)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>> {
        self.inner.list_for_user(user_id)
    }

    fn save(&self, task: &Task) -> Result<Task> {
        let call = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_save == Some(call) {
            return Err(PlannerError::Store(rusqlite::Error::InvalidQuery));
        }
        let saved = self.inner.save(task)?;
        if let Some(cancel) = &self.cancel_after_save {
            cancel.cancel();
        }
        Ok(saved)
    }
}
