use parking_lot::RwLock;
use pipewatch_core::ServiceStatus;
use serde::{Deserialize, Serialize};

/// A collaborator whose reachability is shown on the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// API backend.
    Backend,
    /// Relational database.
    Database,
    /// Vector database.
    VectorDb,
}

/// Statuses of every [`Service`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceStatuses {
    /// API backend.
    pub backend: ServiceStatus,
    /// Relational database.
    pub database: ServiceStatus,
    /// Vector database.
    pub vector_db: ServiceStatus,
}

/// Externally reported service reachability. Everything starts `unknown`.
#[derive(Default)]
pub struct ServiceBoard {
    statuses: RwLock<ServiceStatuses>,
}

impl ServiceBoard {
    /// All services unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of one service.
    pub fn set(&self, service: Service, status: ServiceStatus) {
        let mut statuses = self.statuses.write();
        match service {
            Service::Backend => statuses.backend = status,
            Service::Database => statuses.database = status,
            Service::VectorDb => statuses.vector_db = status,
        }
    }

    /// Copy of the current statuses.
    pub fn current(&self) -> ServiceStatuses {
        *self.statuses.read()
    }
}
