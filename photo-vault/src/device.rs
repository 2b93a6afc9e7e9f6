//! Per-install device identity used for local-copy affinity

use crate::ledger::LedgerError;
use crate::schema::init_device_schema;
use rusqlite::{params, Connection};

pub trait DeviceIdentity: Send + Sync {
    fn device_id(&self) -> &str;
}

/// Identity generated once per install and stored in SQLite
#[derive(Debug, Clone)]
pub struct PersistedDeviceIdentity {
    device_id: String,
}

impl PersistedDeviceIdentity {
    /// Return the stored id, creating it on first use
    pub fn load_or_create(conn: &Connection) -> Result<Self, LedgerError> {
        init_device_schema(conn)?;

        let candidate = uuid::Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO install_identity (id, device_id) VALUES (1, ?1)",
            params![candidate],
        )?;

        let device_id: String = conn.query_row(
            "SELECT device_id FROM install_identity WHERE id = 1",
            [],
            |row| row.get(0),
        )?;

        if inserted > 0 {
            log::info!("Created device identity {}", device_id);
        } else {
            log::debug!("Loaded device identity {}", device_id);
        }

        Ok(Self { device_id })
    }
}

impl DeviceIdentity for PersistedDeviceIdentity {
    fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Caller-supplied identity, e.g. for a simulated second device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDeviceIdentity(String);

impl FixedDeviceIdentity {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self(device_id.into())
    }
}

impl DeviceIdentity for FixedDeviceIdentity {
    fn device_id(&self) -> &str {
        &self.0
    }
}
