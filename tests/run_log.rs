//! Installs the global subscriber, so it lives in its own test binary.

mod common;

use common::Workspace;
use fsbc::adapters::SimulatedDriver;
use fsbc::core::orchestrator::FORENSIC_LOGS_DIR;
use fsbc::core::{Orchestrator, SelectionSet};
use fsbc::logging::{self, LogConfig};
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn test_run_log_is_copied_into_the_container() {
    let ws = Workspace::new();
    let file = ws.source_file("a.txt", b"alpha");
    let config = ws.config();

    let run_log = Arc::new(logging::init(LogConfig::default(), &config.log_directory).unwrap());
    assert!(run_log.path().starts_with(&config.log_directory));

    let ctx = ws
        .context(Arc::new(SimulatedDriver::new()))
        .with_run_log(run_log.clone());
    let summary = Orchestrator::new(ctx)
        .run(&SelectionSet::new([&file]).unwrap(), &ws.destination)
        .await
        .unwrap();
    run_log.finish(summary.is_success());

    let file_name = run_log.path().file_name().unwrap();
    let snapshot = SimulatedDriver::volume_path(&summary.container_path)
        .join(FORENSIC_LOGS_DIR)
        .join(file_name);
    let contents = fs::read_to_string(snapshot).unwrap();
    assert!(contents.contains("Forensic Sparsebundle Creator Started"));
    assert!(contents.contains("Verification report created"));

    // The host-side log keeps growing after the snapshot
    let host = fs::read_to_string(run_log.path()).unwrap();
    assert!(host.contains("Completed Successfully"));
}
