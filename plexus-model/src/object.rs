//! Built-in key/value model.
//!
//! Holds a map of string properties. Concurrent writes to the same property
//! resolve by replay order: the mutation merged last wins.

use crate::{Model, ModelContext, ModelMessage, ModelResult, ModelType};
use async_trait::async_trait;
use plexus_types::FeedPosition;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;

/// Mutations understood by [`ObjectModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ObjectMutation {
    Set {
        key: String,
        value: serde_json::Value,
    },
    Unset {
        key: String,
    },
}

/// String-keyed property map replayed from [`ObjectMutation`]s.
#[derive(Debug)]
pub struct ObjectModel {
    context: ModelContext,
    properties: BTreeMap<String, serde_json::Value>,
    version: u64,
}

impl ObjectModel {
    pub fn new(context: ModelContext) -> Self {
        Self {
            context,
            properties: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    /// Number of mutations applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Proposes setting a property.
    pub async fn set(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> ModelResult<FeedPosition> {
        self.context
            .write(&ObjectMutation::Set {
                key: key.into(),
                value,
            })
            .await
    }

    /// Proposes removing a property.
    pub async fn unset(&self, key: impl Into<String>) -> ModelResult<FeedPosition> {
        self.context
            .write(&ObjectMutation::Unset { key: key.into() })
            .await
    }
}

#[async_trait]
impl Model for ObjectModel {
    async fn process_message(&mut self, message: &ModelMessage) -> ModelResult<()> {
        match message.decode::<ObjectMutation>()? {
            ObjectMutation::Set { key, value } => {
                self.properties.insert(key, value);
            }
            ObjectMutation::Unset { key } => {
                self.properties.remove(&key);
            }
        }
        self.version += 1;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ModelType for ObjectModel {
    const KIND: &'static str = "plexus:model/object";

    fn create(context: ModelContext) -> Self {
        Self::new(context)
    }
}
