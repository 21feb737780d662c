use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state container used before initialize")]
    Uninitialized,
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("state at {path} does not match the expected shape: {message}")]
    Shape { path: String, message: String },
    #[error("cannot set {path}: {segment} is not an object")]
    NotAnObject { path: String, segment: String },
    #[error("state path is empty")]
    EmptyPath,
}

/// Options for [`StateContainer::update`]; every flag defaults to true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Insert keys missing from the top level of the state.
    pub insert_keys: bool,
    /// Insert keys missing below the top level.
    pub insert_values: bool,
    /// Replace values that already exist.
    pub overwrite: bool,
    /// Merge nested objects key by key instead of replacing them whole.
    pub recursive: bool,
    /// Write the result into the live state; otherwise only return it.
    pub inplace: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            insert_keys: true,
            insert_values: true,
            overwrite: true,
            recursive: true,
            inplace: true,
        }
    }
}

/// A mutable record of shape `T` with a frozen initial snapshot, deep merge
/// updates and dot-delimited path access.
#[derive(Debug, Clone)]
pub struct StateContainer<T> {
    snapshot: Option<Value>,
    live: Value,
    _shape: PhantomData<fn() -> T>,
}

impl<T> Default for StateContainer<T> {
    fn default() -> Self {
        Self {
            snapshot: None,
            live: Value::Null,
            _shape: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> StateContainer<T> {
    pub fn with_initial(initial: &T) -> Result<Self, StateError> {
        let mut container = Self::default();
        container.initialize(initial)?;
        Ok(container)
    }

    pub fn initialize(&mut self, initial: &T) -> Result<(), StateError> {
        let snapshot = serde_json::to_value(initial).map_err(StateError::Serialize)?;
        self.live = snapshot.clone();
        self.snapshot = Some(snapshot);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), StateError> {
        let snapshot = self.snapshot.as_ref().ok_or(StateError::Uninitialized)?;
        self.live = snapshot.clone();
        Ok(())
    }

    /// Deep-merges `partial` into the state and returns the merged value. The
    /// merged value must still deserialize as `T`, otherwise nothing changes.
    pub fn update(&mut self, partial: &Value, options: MergeOptions) -> Result<Value, StateError> {
        if self.snapshot.is_none() {
            return Err(StateError::Uninitialized);
        }
        let mut merged = self.live.clone();
        merge_into(&mut merged, partial, options, 0);
        decode::<T>(&merged)?;
        if options.inplace {
            self.live = merged.clone();
        }
        Ok(merged)
    }

    pub fn get_copy(&self) -> Result<T, StateError> {
        if self.snapshot.is_none() {
            return Err(StateError::Uninitialized);
        }
        decode(&self.live)
    }

    pub fn raw(&self) -> &Value {
        &self.live
    }

    pub fn get_at(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.live, |current, segment| current.get(segment))
    }

    pub fn get_at_or(&self, path: &str, default: Value) -> Value {
        self.get_at(path).cloned().unwrap_or(default)
    }

    pub fn has_at(&self, path: &str, value: &Value) -> bool {
        self.get_at(path).is_some_and(|current| current == value)
    }

    /// Writes `value` at `path`, creating intermediate objects as needed.
    pub fn set_at(&mut self, path: &str, value: Value) -> Result<(), StateError> {
        if path.is_empty() {
            return Err(StateError::EmptyPath);
        }
        let mut candidate = self.live.clone();
        let segments = path.split('.').collect::<Vec<_>>();
        let (last, parents) = segments.split_last().ok_or(StateError::EmptyPath)?;

        let mut current = &mut candidate;
        for segment in parents {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => {
                    return Err(StateError::NotAnObject {
                        path: path.to_string(),
                        segment: (*segment).to_string(),
                    })
                }
            };
        }
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(StateError::NotAnObject {
                path: path.to_string(),
                segment: (*last).to_string(),
            });
        };
        map.insert((*last).to_string(), value);

        decode::<T>(&candidate)?;
        self.live = candidate;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, StateError> {
    serde_path_to_error::deserialize(value.clone()).map_err(|error| StateError::Shape {
        path: error.path().to_string(),
        message: error.inner().to_string(),
    })
}

fn merge_into(target: &mut Value, source: &Value, options: MergeOptions, depth: usize) {
    let (target_map, source_map) = match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => (target_map, source_map),
        (target, source) => {
            if options.overwrite {
                *target = source.clone();
            }
            return;
        }
    };

    for (key, incoming) in source_map {
        match target_map.get_mut(key) {
            Some(existing) => {
                if options.recursive && existing.is_object() && incoming.is_object() {
                    merge_into(existing, incoming, options, depth + 1);
                } else if options.overwrite {
                    *existing = incoming.clone();
                }
            }
            None => {
                let may_insert = if depth == 0 {
                    options.insert_keys
                } else {
                    options.insert_values
                };
                if may_insert {
                    target_map.insert(key.clone(), incoming.clone());
                }
            }
        }
    }
}
