//! Typed CRUD over the center's REST resources

use std::marker::PhantomData;

use anyhow::{bail, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::client::CenterClient;
use super::transport::ApiRequest;

/// A create payload that can report its blank required fields.
pub trait Draft: Serialize + DeserializeOwned {
    fn missing_fields(&self) -> Vec<&'static str>;
}

/// A backend resource served under `PATH`.
pub trait Entity: DeserializeOwned {
    type Draft: Draft;

    /// Singular name for messages ("course").
    const NAME: &'static str;
    /// Plural heading for listings ("Courses").
    const TITLE: &'static str;
    const PATH: &'static str;
    /// Query parameter the list endpoint filters on, if any.
    const PARENT_KEY: Option<&'static str> = None;
    /// The backend uses PATCH for some resources and PUT for others.
    const PARTIAL_UPDATE: bool;

    fn id(&self) -> i64;
    fn summary(&self) -> String;
}

/// Client for one resource type.
pub struct Entities<'a, E> {
    client: &'a CenterClient,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity> Entities<'a, E> {
    pub fn new(client: &'a CenterClient) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    pub async fn list(&self, parent_id: Option<i64>) -> Result<Vec<E>> {
        let mut request = ApiRequest::get(E::PATH);
        if let Some(id) = parent_id {
            let Some(key) = E::PARENT_KEY else {
                bail!("{} cannot be filtered by a parent id", E::TITLE);
            };
            request = request.with_query(key, id);
        }
        Ok(self.client.fetch(request).await?)
    }

    pub async fn create(&self, draft: &E::Draft) -> Result<E> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            bail!("Missing {} field(s): {}", E::NAME, missing.join(", "));
        }

        let request = ApiRequest::post(E::PATH, serde_json::to_value(draft)?);
        Ok(self.client.fetch(request).await?)
    }

    /// Send a partial update. `changes` must be a non-empty JSON object.
    pub async fn update(&self, id: i64, changes: serde_json::Value) -> Result<E> {
        match changes.as_object() {
            Some(fields) if !fields.is_empty() => {}
            _ => bail!("Update for {} {} must be a non-empty JSON object", E::NAME, id),
        }

        let method = if E::PARTIAL_UPDATE {
            Method::PATCH
        } else {
            Method::PUT
        };
        let request = ApiRequest::new(method, item_path::<E>(id)).with_body(changes);
        Ok(self.client.fetch(request).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client.send(ApiRequest::delete(item_path::<E>(id))).await?;
        Ok(())
    }
}

fn item_path<E: Entity>(id: i64) -> String {
    format!("{}/{}", E::PATH, id)
}

/// Names of the blank entries in `fields`.
pub fn blank_fields(fields: &[(&'static str, &str)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect()
}
