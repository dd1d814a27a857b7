//! Credential rotation driving connection swaps end to end.

use auth_service::clock::SystemClock;
use auth_service::credentials::{CredentialListener, CredentialRotator};
use auth_service::db::mock::MockConnector;
use auth_service::db::{ConnectionManager, PingPolicy};
use auth_service::secrets::mock::ScriptedSecrets;
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_policy() -> PingPolicy {
    PingPolicy {
        attempts: 2,
        backoff: Duration::from_millis(10),
        timeout: Duration::from_millis(100),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rotation_loop_swaps_connection_and_survives_bad_pair(
) -> Result<(), anyhow::Error> {
    // 10s lease: the loop rotates every 5s.
    let secrets = Arc::new(ScriptedSecrets::new());
    secrets.push_ok("v-auth-a", "pass-a", 10);
    secrets.push_ok("v-auth-b", "pass-b", 10);
    secrets.push_ok("v-auth-c", "revoked", 10);

    let rotator = Arc::new(CredentialRotator::new(
        secrets,
        Duration::from_secs(3600),
        Arc::new(SystemClock),
    ));
    let initial = rotator.initialize().await?;

    let connector = MockConnector::new();
    connector.reject_password("revoked");
    let connections = Arc::new(ConnectionManager::connect(connector, &initial, fast_policy()).await?);

    let cancel = CancellationToken::new();
    let listener: Arc<dyn CredentialListener> = connections.clone();
    let rotation = tokio::spawn(rotator.clone().start_rotation(listener, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(connections.connection().await.username, "v-auth-b");
    assert_eq!(rotator.get_credentials().await?.username, "v-auth-b");

    // Third pair never verifies; the working connection and pair stay live.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connections.connection().await.username, "v-auth-b");
    let current = rotator.get_credentials().await?;
    assert_eq!(current.password.expose_secret(), "pass-b");
    connections.ping_current().await?;

    cancel.cancel();
    rotation.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_readers_block_until_first_fetch() -> Result<(), anyhow::Error> {
    let secrets = Arc::new(ScriptedSecrets::always("v-auth-a", "pass-a", 60));
    let rotator = Arc::new(CredentialRotator::new(
        secrets,
        Duration::from_secs(3600),
        Arc::new(SystemClock),
    ));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rotator = rotator.clone();
            tokio::spawn(async move { rotator.get_credentials().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(readers.iter().all(|r| !r.is_finished()));

    rotator.initialize().await?;
    for reader in readers {
        assert_eq!(reader.await??.username, "v-auth-a");
    }
    Ok(())
}
