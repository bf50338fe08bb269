// ============================================================================
// File-Manager Resolution
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::SessionError;
use crate::files::FileManager;

/// Granularity at which a [`FileManager`] can be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerScope {
    /// Every model in the given persistence unit.
    Unit(&'static str),
    /// One model type.
    Model(&'static str),
    /// One field of one model. Accepted by the type so that the rejection
    /// can be reported uniformly, registration at this granularity is not
    /// supported.
    Field {
        model: &'static str,
        field: &'static str,
    },
}

/// Precedence-ordered lookup table mapping models and persistence units to
/// the [`FileManager`] responsible for their files. Resolution precedence:
/// model, then unit, then the session default.
pub struct ManagerRegistry {
    default: Arc<FileManager>,
    by_model: HashMap<&'static str, Arc<FileManager>>,
    by_unit: HashMap<&'static str, Arc<FileManager>>,
}

impl ManagerRegistry {
    pub fn new(default: FileManager) -> Self {
        Self {
            default: Arc::new(default),
            by_model: HashMap::new(),
            by_unit: HashMap::new(),
        }
    }

    /// Binds a manager at the given scope. Field-level registration fails
    /// fast, resolution granularity stops at the model level.
    pub fn register(
        &mut self,
        scope: ManagerScope,
        manager: FileManager,
    ) -> Result<(), SessionError> {
        match scope {
            ManagerScope::Model(model) => {
                self.by_model.insert(model, Arc::new(manager));
                Ok(())
            }
            ManagerScope::Unit(unit) => {
                self.by_unit.insert(unit, Arc::new(manager));
                Ok(())
            }
            ManagerScope::Field { model, field } => {
                Err(SessionError::FieldRegistration { model, field })
            }
        }
    }

    pub fn resolve(&self, model: &str, unit: &str) -> Arc<FileManager> {
        self.by_model
            .get(model)
            .or_else(|| self.by_unit.get(unit))
            .unwrap_or(&self.default)
            .clone()
    }

    pub fn default_manager(&self) -> &Arc<FileManager> {
        &self.default
    }
}
