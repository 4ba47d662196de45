//! Registry of model constructors.

use crate::{Model, ModelContext, ModelError, ModelKind, ModelResult, ModelType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Builds a model for a newly constructed entity.
pub type ModelConstructor = Arc<dyn Fn(ModelContext) -> Box<dyn Model> + Send + Sync>;

/// Maps model kinds to constructors.
///
/// Each kind can be registered once; registering it again fails with
/// [`ModelError::RegistrationConflict`] so every replica resolves a kind to
/// the same model.
#[derive(Default)]
pub struct ModelFactory {
    models: RwLock<HashMap<ModelKind, ModelConstructor>>,
}

impl ModelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for `kind`.
    pub fn register_model<F, M>(&self, kind: impl Into<ModelKind>, constructor: F) -> ModelResult<()>
    where
        F: Fn(ModelContext) -> M + Send + Sync + 'static,
        M: Model,
    {
        let kind = kind.into();
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(&kind) {
            return Err(ModelError::RegistrationConflict(kind));
        }
        let constructor: ModelConstructor =
            Arc::new(move |context| Box::new(constructor(context)) as Box<dyn Model>);
        models.insert(kind, constructor);
        Ok(())
    }

    /// Registers a model that declares its own kind.
    pub fn register<M: ModelType>(&self) -> ModelResult<()> {
        self.register_model(M::KIND, M::create)
    }

    pub fn has_model(&self, kind: &ModelKind) -> bool {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    /// Returns the registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ModelKind> {
        let mut kinds: Vec<_> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    /// Instantiates the model registered for the context's kind.
    pub fn create_model(&self, context: ModelContext) -> ModelResult<Box<dyn Model>> {
        let constructor = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(context.kind())
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(context.kind().clone()))?;
        Ok(constructor(context))
    }
}
