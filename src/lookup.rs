//! Locating a remote object by identifier.
//!
//! Some Keep collections expose `GET /{collection}/{id}`, some only a list
//! endpoint, and a few expose both with the direct route being unreliable.
//! [`Lookup`] tries the direct route first (when there is one), then scans
//! the list, and reports [`ProviderError::NotFound`] only when both miss.

use serde_json::Value;
use tracing::debug;

use crate::client::Transport;
use crate::client::decode::{self, Object};
use crate::error::{ProviderError, snippet};

/// Where to find the full collection.
#[derive(Debug, Clone, Copy)]
pub struct ListSource {
    pub segments: &'static [&'static str],
    /// Keys that may hold the items when the list is wrapped in an object.
    /// A bare JSON array is always accepted.
    pub collections: &'static [&'static str],
}

impl ListSource {
    pub const fn bare(segments: &'static [&'static str]) -> Self {
        Self {
            segments,
            collections: &[],
        }
    }

    fn items<'a>(&self, value: &'a Value) -> Vec<&'a Object> {
        let arrays: Vec<&Vec<Value>> = match value {
            Value::Array(items) => vec![items],
            Value::Object(object) => self
                .collections
                .iter()
                .filter_map(|key| object.get(*key).and_then(Value::as_array))
                .collect(),
            _ => Vec::new(),
        };
        arrays
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lookup {
    pub resource: &'static str,
    /// Collection segment for `GET /{collection}/{id}`.
    pub direct: Option<&'static str>,
    /// Key wrapping the object in a direct response, if any.
    pub envelope: Option<&'static str>,
    pub list: Option<ListSource>,
    pub id_field: &'static str,
}

impl Lookup {
    pub async fn find(&self, transport: &dyn Transport, id: &str) -> Result<Object, ProviderError> {
        if let Some(collection) = self.direct {
            match transport.get(&[collection, id]).await {
                Ok(bytes) => match decode::parse_object(self.resource, &bytes) {
                    Ok(object) => {
                        let object = match self.envelope {
                            Some(key) => decode::unwrap_envelope(object, key),
                            None => object,
                        };
                        if self.matches(&object, id) {
                            return Ok(object);
                        }
                        debug!(
                            resource_id = id,
                            "direct lookup returned a different object; scanning list"
                        );
                    }
                    Err(err) => {
                        debug!(resource_id = id, error = %err, "direct lookup undecodable; scanning list");
                    }
                },
                Err(err) if self.list.is_none() && !err.is_not_found() => return Err(err.into()),
                Err(err) => {
                    debug!(
                        resource_id = id,
                        status = err.status(),
                        body = %snippet(err.body().unwrap_or_default()),
                        "direct lookup failed"
                    );
                }
            }
        }

        if let Some(list) = &self.list {
            let bytes = transport.get(list.segments).await?;
            let value = decode::parse_body(self.resource, &bytes)?;
            let items = list.items(&value);
            debug!(resource_id = id, candidates = items.len(), "scanning list for object");
            if let Some(found) = items.into_iter().find(|item| self.matches(item, id)) {
                return Ok(found.clone());
            }
        }

        Err(ProviderError::not_found(self.resource, id))
    }

    /// Compares identifiers as strings so `5`, `5.0` and `"5"` all match `"5"`.
    fn matches(&self, object: &Object, id: &str) -> bool {
        decode::id_field(object, self.id_field).is_some_and(|found| found == id)
    }
}
