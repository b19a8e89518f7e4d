// Database abstraction layer for multi-backend support
pub mod backend;
pub mod mysql;
pub mod postgresql;
pub mod sqlite;

pub use backend::{ConnectorBackend, DriverConnection, PoolStatus, QueryOutcome, RecordStream};
pub use mysql::MySqlBackend;
pub use postgresql::PostgresBackend;
pub use sqlite::{SqliteBackend, SqliteHandle};

use std::sync::Arc;

use crate::error::FrameError;
use crate::models::{ConnectorDescriptor, DriverKind};

/// Factory function to create the backend matching a descriptor's driver
pub fn create_backend(
    descriptor: ConnectorDescriptor,
) -> Result<Arc<dyn ConnectorBackend>, FrameError> {
    match descriptor.driver {
        DriverKind::Sqlite => Ok(Arc::new(SqliteBackend::new(descriptor)?)),
        DriverKind::Postgres => Ok(Arc::new(PostgresBackend::new(descriptor)?)),
        DriverKind::MySql => Ok(Arc::new(MySqlBackend::new(descriptor)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionMode;

    #[test]
    fn test_factory_matches_driver() {
        let backend =
            create_backend(ConnectorDescriptor::new("embedded", "sqlite::memory:").unwrap())
                .unwrap();
        assert_eq!(backend.driver(), DriverKind::Sqlite);
        assert_eq!(backend.mode(), ExecutionMode::Blocking);

        let backend = create_backend(
            ConnectorDescriptor::new("primary", "postgresql://localhost/app").unwrap(),
        )
        .unwrap();
        assert_eq!(backend.mode(), ExecutionMode::Reactive);
    }
}
