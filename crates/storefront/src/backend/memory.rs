//! In-memory backend for tests.
//!
//! Stores rows as JSON objects per table, assigns ids and timestamps on
//! insert, resolves embeds, and publishes every mutation as a
//! [`ChangeEvent`] so it doubles as a [`ChangeFeed`]. Individual operations
//! can be made to fail per table.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use super::query::{Filter, Select, Table};
use super::{Backend, BackendError};
use crate::realtime::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, EVENT_BUFFER, RealtimeError,
    Subscription,
};

/// Backend operations, for failure injection and call tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

/// Shared in-memory tables. Clones see the same rows.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

struct MemoryState {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    failures: Mutex<HashSet<(Table, Operation)>>,
    calls: Mutex<Vec<(Operation, Table)>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Arc::new(MemoryState {
                tables: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                changes,
            }),
        }
    }

    /// Store `rows` as-is, without publishing changes.
    ///
    /// # Errors
    ///
    /// Returns error if a row does not serialize to a JSON object.
    pub fn seed<R: Serialize>(&self, table: Table, rows: &[R]) -> Result<(), BackendError> {
        let rows = rows
            .iter()
            .map(to_object)
            .collect::<Result<Vec<_>, _>>()?;
        lock(&self.state.tables).entry(table).or_default().extend(rows);
        Ok(())
    }

    /// Raw rows of `table`, in insertion order.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.state.tables)
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows of `table`, decoded.
    ///
    /// # Errors
    ///
    /// Returns error if a row does not decode as `T`.
    pub fn rows_as<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>, BackendError> {
        Ok(serde_json::from_value(Value::Array(self.rows(table)))?)
    }

    /// Make every `operation` on `table` fail until [`Self::clear_failures`].
    pub fn fail_on(&self, table: Table, operation: Operation) {
        lock(&self.state.failures).insert((table, operation));
    }

    pub fn clear_failures(&self) {
        lock(&self.state.failures).clear();
    }

    /// Operations attempted so far, including failed ones.
    #[must_use]
    pub fn calls(&self) -> Vec<(Operation, Table)> {
        lock(&self.state.calls).clone()
    }

    /// Number of attempted `operation`s on `table`.
    #[must_use]
    pub fn call_count(&self, operation: Operation, table: Table) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|call| **call == (operation, table))
            .count()
    }

    fn begin(&self, operation: Operation, table: Table) -> Result<(), BackendError> {
        lock(&self.state.calls).push((operation, table));
        if lock(&self.state.failures).contains(&(table, operation)) {
            return Err(BackendError::Api {
                status: 503,
                message: format!("injected {operation:?} failure on {table}"),
            });
        }
        Ok(())
    }

    fn publish(&self, kind: ChangeKind, table: Table, record: Option<Value>, old: Option<Value>) {
        // No receivers is fine.
        let _ = self.state.changes.send(ChangeEvent {
            kind,
            schema: "public".to_string(),
            table: table.as_str().to_string(),
            record,
            old_record: old,
        });
    }

    fn insert_rows(&self, table: Table, rows: Vec<Value>) -> Vec<Value> {
        let now = timestamp();
        let inserted: Vec<Value> = rows
            .into_iter()
            .map(|mut row| {
                if let Some(object) = row.as_object_mut() {
                    object
                        .entry("id")
                        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                    object
                        .entry("created_at")
                        .or_insert_with(|| Value::String(now.clone()));
                    object
                        .entry("updated_at")
                        .or_insert_with(|| Value::String(now.clone()));
                }
                row
            })
            .collect();

        lock(&self.state.tables)
            .entry(table)
            .or_default()
            .extend(inserted.iter().cloned());

        for row in &inserted {
            self.publish(ChangeKind::Insert, table, Some(row.clone()), None);
        }
        inserted
    }

    /// Merge `patch` into every row of `table` selected by `matches`.
    fn patch_rows(
        &self,
        table: Table,
        patch: &Map<String, Value>,
        matches: impl Fn(&Value) -> bool,
    ) -> Vec<Value> {
        let now = timestamp();
        let mut changed = Vec::new();
        {
            let mut tables = lock(&self.state.tables);
            for row in tables.entry(table).or_default().iter_mut() {
                if !matches(row) {
                    continue;
                }
                let old = row.clone();
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in patch {
                        object.insert(key.clone(), value.clone());
                    }
                    object.insert("updated_at".to_string(), Value::String(now.clone()));
                }
                changed.push((old, row.clone()));
            }
        }

        for (old, new) in &changed {
            self.publish(ChangeKind::Update, table, Some(new.clone()), Some(old.clone()));
        }
        changed.into_iter().map(|(_, new)| new).collect()
    }

    fn embed(&self, query: &Select, rows: &mut [Value]) {
        let tables = lock(&self.state.tables);
        for embed in &query.embeds {
            let related = tables.get(&embed.table);
            for row in rows.iter_mut() {
                let target = row.get(embed.foreign_key).cloned();
                let found = related
                    .and_then(|related| {
                        related
                            .iter()
                            .find(|candidate| candidate.get("id") == target.as_ref())
                    })
                    .cloned()
                    .unwrap_or(Value::Null);
                if let Some(object) = row.as_object_mut() {
                    object.insert(embed.alias.to_string(), found);
                }
            }
        }
    }
}

impl Backend for MemoryBackend {
    async fn select<T>(&self, query: &Select) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned + Send,
    {
        self.begin(Operation::Select, query.table)?;

        let mut rows: Vec<Value> = self
            .rows(query.table)
            .into_iter()
            .filter(|row| matches_all(row, &query.filters))
            .collect();

        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(order.column), b.get(order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        self.embed(query, &mut rows);

        Ok(serde_json::from_value(Value::Array(rows))?)
    }

    async fn insert<R, T>(&self, table: Table, rows: &[R]) -> Result<Vec<T>, BackendError>
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        self.begin(Operation::Insert, table)?;
        let rows = rows.iter().map(to_object).collect::<Result<Vec<_>, _>>()?;
        let inserted = self.insert_rows(table, rows);
        Ok(serde_json::from_value(Value::Array(inserted))?)
    }

    async fn update<P>(&self, table: Table, patch: &P, filters: &[Filter]) -> Result<(), BackendError>
    where
        P: Serialize + Sync,
    {
        self.begin(Operation::Update, table)?;
        let patch = to_object(patch)?;
        let patch = patch.as_object().cloned().unwrap_or_default();
        self.patch_rows(table, &patch, |row| matches_all(row, filters));
        Ok(())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<(), BackendError> {
        self.begin(Operation::Delete, table)?;

        let removed: Vec<Value> = {
            let mut tables = lock(&self.state.tables);
            let rows = tables.entry(table).or_default();
            let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(rows)
                .into_iter()
                .partition(|row| matches_all(row, filters));
            *rows = kept;
            removed
        };

        for row in removed {
            self.publish(ChangeKind::Delete, table, None, Some(row));
        }
        Ok(())
    }

    async fn upsert<R, T>(
        &self,
        table: Table,
        rows: &[R],
        on_conflict: &[&str],
    ) -> Result<Vec<T>, BackendError>
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        self.begin(Operation::Upsert, table)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let row = to_object(row)?;
            let key: Vec<(&str, Option<Value>)> = on_conflict
                .iter()
                .map(|column| (*column, row.get(*column).cloned()))
                .collect();
            let conflicts = |existing: &Value| {
                !key.is_empty()
                    && key
                        .iter()
                        .all(|(column, value)| existing.get(*column) == value.as_ref())
            };

            let exists = lock(&self.state.tables)
                .get(&table)
                .is_some_and(|rows| rows.iter().any(|r| conflicts(r)));

            if exists {
                let patch = row.as_object().cloned().unwrap_or_default();
                result.extend(self.patch_rows(table, &patch, conflicts));
            } else {
                result.extend(self.insert_rows(table, vec![row]));
            }
        }

        Ok(serde_json::from_value(Value::Array(result))?)
    }
}

impl ChangeFeed for MemoryBackend {
    async fn subscribe(
        &self,
        subscription: ChangeSubscription,
    ) -> Result<Subscription, RealtimeError> {
        let mut changes = self.state.changes.subscribe();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut close_rx => break,
                    change = changes.recv() => match change {
                        Ok(event) if subscription.matches(&event) => {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(Subscription::new(events_rx, close_tx, task))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_object<R: Serialize + ?Sized>(row: &R) -> Result<Value, BackendError> {
    let value = serde_json::to_value(row)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(BackendError::Api {
            status: 400,
            message: "row must be a JSON object".to_string(),
        })
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        row.get(filter.column).is_some_and(|value| match value {
            Value::String(s) => *s == filter.value,
            other => other.to_string() == filter.value,
        })
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
