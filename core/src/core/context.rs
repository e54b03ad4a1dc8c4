// chainwork/src/core/context.rs

//! Defines `HandlerContext<P, R>`, the mutable state shared by the handlers of
//! one chain run, and `AttributeKey<V>` for typed attribute constants.

use crate::error::{ChainError, ChainResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Opaque value stored in the attribute map.
pub type AttributeValue = Box<dyn Any + Send>;

/// Per-invocation state passed through a chain.
///
/// `P` is the request type, `R` the response type. One context is created per
/// run and is never shared between concurrent runs. Because an asynchronous
/// run moves the context onto a worker thread, the request, response and
/// every attribute value must be `Send`.
///
/// Attributes form a loosely typed blackboard between handlers. Readers name
/// the type they expect; a missing key is reported as `Ok(None)`, a key that
/// holds a value of a different type is an `AttributeTypeMismatch` error.
pub struct HandlerContext<P, R> {
  request: P,
  response: Option<R>,
  attributes: HashMap<String, AttributeValue>,
}

impl<P, R> HandlerContext<P, R> {
  /// Creates a context with no response set.
  pub fn new(request: P) -> Self {
    Self {
      request,
      response: None,
      attributes: HashMap::new(),
    }
  }

  /// Creates a context with a pre-existing response. A chain whose handlers
  /// never set a response returns this value unchanged.
  pub fn with_response(request: P, response: R) -> Self {
    Self {
      request,
      response: Some(response),
      attributes: HashMap::new(),
    }
  }

  pub fn request(&self) -> &P {
    &self.request
  }

  /// Mutable access to the request. Handlers conventionally treat the request
  /// as read-only; nothing enforces it.
  pub fn request_mut(&mut self) -> &mut P {
    &mut self.request
  }

  pub fn response(&self) -> Option<&R> {
    self.response.as_ref()
  }

  pub fn response_mut(&mut self) -> Option<&mut R> {
    self.response.as_mut()
  }

  /// Overwrites the response, returning the previous one.
  pub fn set_response(&mut self, response: R) -> Option<R> {
    self.response.replace(response)
  }

  pub fn take_response(&mut self) -> Option<R> {
    self.response.take()
  }

  // --- Attributes ---

  /// Reads an attribute as `V`.
  ///
  /// Returns `Ok(None)` when the key is absent and `Err(AttributeTypeMismatch)`
  /// when the key is present with a value of another type.
  pub fn get_attribute<V: Any>(&self, key: &str) -> ChainResult<Option<&V>> {
    match self.attributes.get(key) {
      None => Ok(None),
      Some(value) => value
        .downcast_ref::<V>()
        .map(Some)
        .ok_or_else(|| type_mismatch::<V>(key)),
    }
  }

  pub fn get_attribute_mut<V: Any>(&mut self, key: &str) -> ChainResult<Option<&mut V>> {
    match self.attributes.get_mut(key) {
      None => Ok(None),
      Some(value) => value
        .downcast_mut::<V>()
        .map(Some)
        .ok_or_else(|| type_mismatch::<V>(key)),
    }
  }

  /// Stores `value` under `key`, replacing any previous value of any type.
  pub fn set_attribute<V: Any + Send>(&mut self, key: impl Into<String>, value: V) {
    self.attributes.insert(key.into(), Box::new(value));
  }

  /// Removes an attribute regardless of its type, returning the opaque value.
  pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
    self.attributes.remove(key)
  }

  /// Removes an attribute and returns it as `V`.
  ///
  /// On a type mismatch the value is left in place and an error is returned.
  pub fn take_attribute<V: Any>(&mut self, key: &str) -> ChainResult<Option<V>> {
    match self.attributes.get(key) {
      None => return Ok(None),
      Some(value) if !value.is::<V>() => return Err(type_mismatch::<V>(key)),
      Some(_) => {}
    }
    Ok(
      self
        .attributes
        .remove(key)
        .and_then(|value| value.downcast::<V>().ok())
        .map(|boxed| *boxed),
    )
  }

  pub fn contains_attribute(&self, key: &str) -> bool {
    self.attributes.contains_key(key)
  }

  pub fn attribute_keys(&self) -> impl Iterator<Item = &str> {
    self.attributes.keys().map(String::as_str)
  }

  // --- Typed keys ---

  pub fn get<V: Any>(&self, key: &AttributeKey<V>) -> ChainResult<Option<&V>> {
    self.get_attribute::<V>(key.name())
  }

  pub fn set<V: Any + Send>(&mut self, key: &AttributeKey<V>, value: V) {
    self.set_attribute(key.name(), value);
  }

  pub fn take<V: Any>(&mut self, key: &AttributeKey<V>) -> ChainResult<Option<V>> {
    self.take_attribute::<V>(key.name())
  }

  /// Consumes the context, returning request and response.
  pub fn into_parts(self) -> (P, Option<R>) {
    (self.request, self.response)
  }
}

impl<P: Default, R> Default for HandlerContext<P, R> {
  fn default() -> Self {
    Self::new(P::default())
  }
}

impl<P: fmt::Debug, R: fmt::Debug> fmt::Debug for HandlerContext<P, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Attribute values are opaque, only their keys are printed.
    let mut keys: Vec<&str> = self.attribute_keys().collect();
    keys.sort_unstable();
    f.debug_struct("HandlerContext")
      .field("request", &self.request)
      .field("response", &self.response)
      .field("attribute_keys", &keys)
      .finish()
  }
}

fn type_mismatch<V: Any>(key: &str) -> ChainError {
  ChainError::AttributeTypeMismatch {
    key: key.to_string(),
    expected: std::any::type_name::<V>(),
  }
}

/// A named attribute key carrying the type of its value.
///
/// Meant to be declared as constants grouped per domain:
///
/// ```
/// use chainwork::AttributeKey;
///
/// pub struct AuthKeys;
/// impl AuthKeys {
///   pub const USER_ID: AttributeKey<String> = AttributeKey::new("auth.user_id");
///   pub const AUTHENTICATED: AttributeKey<bool> = AttributeKey::new("auth.authenticated");
/// }
/// ```
pub struct AttributeKey<V> {
  name: &'static str,
  _phantom_value: PhantomData<fn() -> V>,
}

impl<V> AttributeKey<V> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      _phantom_value: PhantomData,
    }
  }

  pub const fn name(&self) -> &'static str {
    self.name
  }
}

impl<V> Clone for AttributeKey<V> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<V> Copy for AttributeKey<V> {}

impl<V> fmt::Debug for AttributeKey<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AttributeKey")
      .field("name", &self.name)
      .field("value_type", &std::any::type_name::<V>())
      .finish()
  }
}
