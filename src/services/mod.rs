pub mod client_service;
pub mod photo_service;

pub use client_service::*;
pub use photo_service::*;

#[cfg(test)]
pub(crate) async fn test_vault() -> (tempfile::TempDir, photo_vault::PhotoVault) {
    use photo_vault::{FixedDeviceIdentity, PhotoVault, SqliteLedger, VaultConfig};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig::new(dir.path().join("photos"));
    let vault = PhotoVault::new(
        &config,
        Arc::new(SqliteLedger::open_in_memory().unwrap()),
        Arc::new(FixedDeviceIdentity::new("test-device")),
    )
    .await
    .unwrap();
    (dir, vault)
}
