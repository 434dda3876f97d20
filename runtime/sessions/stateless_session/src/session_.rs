use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use errors::{ValueDeserializationError, ValueSerializationError};

/// The data attached to a session.
///
/// It is an arbitrary JSON object: its shape is entirely up to your application.
pub type SessionData = serde_json::Map<String, Value>;

/// The current HTTP session.
///
/// # Change tracking
///
/// A session keeps track of whether its data has been modified while processing
/// the current request. Only modified sessions are sealed into a new token
/// and sent back to the client.
///
/// The session is marked as modified when:
///
/// - The whole data object is replaced, via [`Session::replace`] or [`Session::replace_raw`]
/// - A key is inserted, via [`Session::insert`] or [`Session::insert_raw`]
/// - An existing key is removed, via [`Session::remove`] or [`Session::remove_raw`]
/// - The data is mutated in place, via [`Session::update`]
/// - The session is [cleared](Session::clear)
///
/// Changes are tracked at the granularity of method calls: no diffing is performed.
/// Once modified, a session stays modified until the end of the request, even if the
/// data is later restored to its original value.
///
/// Read-only accessors ([`Session::get`], [`Session::get_raw`], [`Session::read`], etc.)
/// never mark the session as modified.
///
/// # Sharing
///
/// `Session` is a handle: cloning it is cheap, and all clones point to the same
/// session data. That's how the session middleware observes the changes made by your
/// request handler.
///
/// The handle has no public fields: the only way to alter the session is through
/// its methods.
///
/// ```rust,compile_fail
/// use stateless_session::Session;
///
/// let session = Session::new(Default::default());
/// session.dirty = false;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Session(Arc<Mutex<TrackedState>>);

#[derive(Debug, Default)]
struct TrackedState {
    data: SessionData,
    dirty: bool,
}

impl TrackedState {
    fn touch(&mut self) -> &mut SessionData {
        self.dirty = true;
        &mut self.data
    }
}

impl Session {
    /// Create a new session handle, wrapping the provided data.
    ///
    /// The session starts unmodified.
    pub fn new(data: SessionData) -> Self {
        Self(Arc::new(Mutex::new(TrackedState { data, dirty: false })))
    }

    fn state(&self) -> MutexGuard<'_, TrackedState> {
        // Accessors never panic while holding the lock, but user closures
        // passed to `read`/`update` might.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the session data has been modified.
    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    /// Returns `true` if there are no values in the session.
    pub fn is_empty(&self) -> bool {
        self.state().data.is_empty()
    }

    /// Returns `true` if there is a value associated with `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state().data.contains_key(key)
    }

    /// A snapshot of the current session data.
    pub fn data(&self) -> SessionData {
        self.state().data.clone()
    }

    /// Get the value associated with `key`.
    ///
    /// If the value is not found, `None` is returned.
    /// If the value is found, but it cannot be deserialized into the expected type, an error is returned.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ValueDeserializationError> {
        self.get_raw(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ValueDeserializationError {
                key: key.to_owned(),
                source: e,
            })
    }

    /// Get the raw JSON value associated with `key`.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.state().data.get(key).cloned()
    }

    /// Inspect a snapshot of the session data.
    ///
    /// It doesn't mark the session as modified.
    /// `f` can freely use the session handle: the session is not locked while it runs.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionData) -> R,
    {
        let snapshot = self.data();
        f(&snapshot)
    }

    /// Set a value for the given key.
    ///
    /// If the key already exists, the old raw value is returned.
    /// If the value cannot be serialized, an error is returned and the session is left untouched.
    pub fn insert<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, ValueSerializationError> {
        let key = key.into();
        let value =
            serde_json::to_value(value).map_err(|e| ValueSerializationError::Value {
                key: key.clone(),
                source: e,
            })?;
        Ok(self.insert_raw(key, value))
    }

    /// Set a raw JSON value for the given key.
    ///
    /// If the key already exists, the old value is returned.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state().touch().insert(key.into(), value)
    }

    /// Remove the value associated with `key`, returning it deserialized.
    ///
    /// If the key doesn't exist, the session is not marked as modified.
    pub fn remove<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ValueDeserializationError> {
        self.remove_raw(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ValueDeserializationError {
                key: key.to_owned(),
                source: e,
            })
    }

    /// Remove the raw value associated with `key`.
    ///
    /// If the key doesn't exist, the session is not marked as modified.
    pub fn remove_raw(&self, key: &str) -> Option<Value> {
        let mut state = self.state();
        if !state.data.contains_key(key) {
            return None;
        }
        state.touch().remove(key)
    }

    /// Replace the whole session data with `value`.
    ///
    /// `value` must serialize to a JSON object.
    /// If it doesn't, an error is returned and the session is left untouched.
    pub fn replace<T: Serialize>(
        &self,
        value: T,
    ) -> Result<SessionData, ValueSerializationError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(data)) => Ok(self.replace_raw(data)),
            Ok(other) => Err(ValueSerializationError::NotAnObject {
                found: json_kind(&other),
            }),
            Err(e) => Err(ValueSerializationError::Data { source: e }),
        }
    }

    /// Replace the whole session data, returning the previous data.
    pub fn replace_raw(&self, data: SessionData) -> SessionData {
        std::mem::replace(self.state().touch(), data)
    }

    /// Mutate the session data in place.
    ///
    /// The session is marked as modified, regardless of what `f` does.
    ///
    /// `f` works on a copy of the session data, which replaces the session data once `f`
    /// returns. The session is not locked while `f` runs: reading through the session
    /// handle inside `f` sees the data as it was before the update, and writes made
    /// through the handle inside `f` are overwritten.
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionData) -> R,
    {
        let mut data = self.data();
        let output = f(&mut data);
        *self.state().touch() = data;
        output
    }

    /// Remove all values from the session.
    ///
    /// The session is marked as modified: an empty token is sent to the client,
    /// replacing the one it currently holds.
    /// Values inserted after `clear` are tracked as usual.
    ///
    /// It returns `true` to signal that the session has been cleared.
    pub fn clear(&self) -> bool {
        *self.state().touch() = SessionData::new();
        true
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Errors that can occur when manipulating the session data.
pub mod errors {
    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    #[error("Failed to deserialize the value associated with `{key}`")]
    /// The error returned by [`Session::get`][crate::Session::get] and
    /// [`Session::remove`][crate::Session::remove].
    pub struct ValueDeserializationError {
        /// The key of the value that we failed to deserialize.
        pub key: String,
        #[source]
        /// The underlying deserialization error.
        pub source: serde_json::Error,
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`Session::insert`][crate::Session::insert] and
    /// [`Session::replace`][crate::Session::replace].
    pub enum ValueSerializationError {
        #[error("Failed to serialize the value associated with `{key}`")]
        Value {
            /// The key of the value that we failed to serialize.
            key: String,
            #[source]
            source: serde_json::Error,
        },
        #[error("Failed to serialize the session data")]
        Data {
            #[source]
            source: serde_json::Error,
        },
        #[error("The session data must be a JSON object, found {found}")]
        NotAnObject { found: &'static str },
    }
}
