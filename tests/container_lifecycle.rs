use fsbc::adapters::{Credential, SimulatedDriver};
use fsbc::core::{ContainerError, ContainerManager, ContainerState};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn manager(driver: &SimulatedDriver, mount_point: &std::path::Path) -> ContainerManager {
    ContainerManager::new(
        Arc::new(driver.clone()),
        mount_point.to_path_buf(),
        Credential::Passphrase("correct horse".to_string()),
    )
}

#[tokio::test]
async fn test_data_survives_remount() {
    let temp = tempdir().unwrap();
    let mount_point = temp.path().join("mnt");
    let driver = SimulatedDriver::new();
    let manager = manager(&driver, &mount_point);

    let container = manager
        .create(temp.path(), "ForensicData_20240101_000000", 100)
        .await
        .unwrap();
    assert_eq!(container.state(), ContainerState::Created);

    let mounted = manager.mount(container).await.unwrap();
    fs::write(mounted.mount_point().join("evidence.bin"), b"\x00\x01").unwrap();
    let detached = mounted.unmount().await.unwrap();
    assert_eq!(detached.state(), ContainerState::Detached);
    assert!(!driver.is_mounted(&mount_point));

    let reopened = manager.open(detached.path());
    assert_eq!(reopened.state(), ContainerState::Created);
    let mounted = manager.mount(reopened).await.unwrap();
    assert_eq!(
        fs::read(mounted.mount_point().join("evidence.bin")).unwrap(),
        b"\x00\x01"
    );
    mounted.unmount().await.unwrap();
}

#[tokio::test]
async fn test_dropping_a_mounted_container_detaches_it() {
    let temp = tempdir().unwrap();
    let mount_point = temp.path().join("mnt");
    let driver = SimulatedDriver::new();
    let manager = manager(&driver, &mount_point);

    let container = manager.create(temp.path(), "case", 100).await.unwrap();
    {
        let _mounted = manager.mount(container).await.unwrap();
        assert!(driver.is_mounted(&mount_point));
    }
    assert!(!driver.is_mounted(&mount_point));
    assert!(!mount_point.exists());
}

#[tokio::test]
async fn test_absent_container_cannot_be_mounted() {
    let temp = tempdir().unwrap();
    let driver = SimulatedDriver::new();
    let manager = manager(&driver, &temp.path().join("mnt"));

    let container = manager.open(&temp.path().join("missing.sparsebundle"));
    assert_eq!(container.state(), ContainerState::Absent);

    let err = manager.mount(container).await.unwrap_err();
    assert!(matches!(err, ContainerError::InvalidTransition { .. }));
}
