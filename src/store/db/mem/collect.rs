use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    RelayflowError, Result,
    store::{DbCollection, PageData, query::Query},
};

use super::DbDocument;

/// Records keyed by id, plus the ids grouped by the document's index key.
#[derive(Debug)]
struct Records<T> {
    items: HashMap<String, (u64, T)>,
    /// index value -> ids in insertion order
    index: HashMap<String, Vec<String>>,
    next: u64,
}

impl<T: DbDocument> Records<T> {
    /// Rows a query has to look at, in insertion order.
    fn candidates(
        &self,
        q: &Query,
    ) -> Vec<&T> {
        if let Some(JsonValue::String(value)) = T::INDEX.and_then(|key| q.filter_value(key)) {
            return self.index.get(value).map(|ids| ids.iter().filter_map(|id| self.items.get(id)).map(|(_, item)| item).collect()).unwrap_or_default();
        }
        let mut all: Vec<&(u64, T)> = self.items.values().collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, item)| item).collect()
    }
}

/// In-memory collection.
#[derive(Debug)]
pub struct Collect<T> {
    name: String,
    records: RwLock<Records<T>>,
}

impl<T> Collect<T>
where
    T: DbDocument + Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: RwLock::new(Records {
                items: HashMap::new(),
                index: HashMap::new(),
                next: 0,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records<T>>> {
        self.records.read().map_err(|e| RelayflowError::Store(format!("{}: {}", self.name, e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records<T>>> {
        self.records.write().map_err(|e| RelayflowError::Store(format!("{}: {}", self.name, e)))
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        Ok(self.read()?.items.contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        self.read()?.items.get(id).map(|(_, item)| item.clone()).ok_or_else(|| RelayflowError::NotFound(format!("{} {}", self.name, id)))
    }

    fn query(
        &self,
        q: &Query,
    ) -> Result<PageData<Self::Item>> {
        let records = self.read()?;

        let mut matched: Vec<(HashMap<String, JsonValue>, &T)> = Vec::new();
        for item in records.candidates(q) {
            let doc = item.doc()?;
            if q.filters().iter().all(|(key, value)| doc.get(key) == Some(value)) {
                matched.push((doc, item));
            }
        }

        // stable sort keeps insertion order for equal keys
        matched.sort_by(|(a, _), (b, _)| {
            for (key, rev) in q.order_by().iter() {
                let ord = compare(a.get(key), b.get(key));
                let ord = if *rev { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let count = matched.len();
        let rows: Vec<T> = matched.into_iter().take(q.limit()).map(|(_, item)| item.clone()).collect();
        trace!(collection = %self.name, count, "query");

        Ok(PageData {
            count,
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut records = self.write()?;
        if records.items.contains_key(data.id()) {
            return Err(RelayflowError::Store(format!("{} {} already exists", self.name, data.id())));
        }
        let seq = records.next;
        records.next += 1;
        if T::INDEX.is_some() {
            records.index.entry(data.index_value().to_string()).or_default().push(data.id().to_string());
        }
        records.items.insert(data.id().to_string(), (seq, data.clone()));
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut records = self.write()?;
        let Some((_, item)) = records.items.get_mut(data.id()) else {
            return Ok(false);
        };
        let previous = item.index_value().to_string();
        *item = data.clone();

        if T::INDEX.is_some() && previous != data.index_value() {
            if let Some(ids) = records.index.get_mut(&previous) {
                ids.retain(|id| id != data.id());
            }
            records.index.entry(data.index_value().to_string()).or_default().push(data.id().to_string());
        }
        Ok(true)
    }
}

/// Orders missing < null < numbers and strings by value; mixed types compare equal.
fn compare(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Null), Some(JsonValue::Null)) => Ordering::Equal,
        (Some(JsonValue::Null), Some(_)) => Ordering::Less,
        (Some(_), Some(JsonValue::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
