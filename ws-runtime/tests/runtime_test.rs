//! Integration tests for the runtime start/stop lifecycle against the in-memory cluster.

mod common;

use common::{test_config, CheckOutcome, Fixture, EXAMPLE_ENVIRONMENT, WORKSPACE};
use std::sync::Arc;
use std::time::Duration;
use ws_cluster::memory::{ExecBehavior, PodStartup};
use ws_cluster::VolumeClaims;
use ws_cluster::ClusterApi;
use ws_model::events::RuntimeEvent;
use ws_model::objects::{
    IntOrString, ObjectMeta, PersistentVolumeClaim, ResourceKind, POD_PHASE_FAILED,
};
use ws_model::runtime::{MachineStatus, RuntimeStatus, ServerStatus};
use ws_runtime::START_INTERRUPTED;

fn machine_statuses(events: &[RuntimeEvent], machine: &str) -> Vec<MachineStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::Machine(m) if m.machine_name == machine => Some(m.status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_example_environment_starts() {
    let mut fixture = Fixture::new(CheckOutcome::Ready);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    runtime.start().await.expect("start should succeed");
    assert_eq!(runtime.status(), RuntimeStatus::Running);

    let services = fixture.cluster.object_names(ResourceKind::Service, WORKSPACE);
    assert_eq!(services.len(), 1);
    let service = fixture
        .cluster
        .get(ResourceKind::Service, WORKSPACE, &services[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service["spec"]["ports"].as_array().unwrap().len(), 1);
    assert_eq!(service["spec"]["ports"][0]["name"], "server-8080");

    let routes = fixture.cluster.object_names(ResourceKind::Route, WORKSPACE);
    assert_eq!(routes.len(), 1);
    let route = fixture
        .cluster
        .get(ResourceKind::Route, WORKSPACE, &routes[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(route["spec"]["port"]["targetPort"], "server-8080");
    let host = route["spec"]["host"].as_str().unwrap().to_string();

    let machines = runtime.machines();
    let machine = &machines["main/main"];
    assert_eq!(machine.status, MachineStatus::Running);
    let server = &machine.servers["http-server"];
    assert_eq!(server.status, ServerStatus::Running);
    assert_eq!(server.url, format!("http://{}/api", host));

    assert_eq!(
        fixture.cluster.object_names(ResourceKind::PersistentVolumeClaim, WORKSPACE),
        vec!["data".to_string()]
    );
    let execs = fixture.cluster.exec_log();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].command, vec!["sh", "-c", "start-agent"]);

    let events = fixture.drain_events();
    assert_eq!(
        machine_statuses(&events, "main/main"),
        vec![MachineStatus::Starting, MachineStatus::Running]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::Server(s) if s.server_name == "http-server" && s.url == server.url
    )));
}

#[tokio::test]
async fn test_existing_volume_claim_is_not_recreated() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    fixture.cluster.create_namespace(WORKSPACE).await.unwrap();
    VolumeClaims::new(fixture.cluster.clone(), WORKSPACE, WORKSPACE)
        .create(PersistentVolumeClaim {
            metadata: ObjectMeta::named("data"),
            ..Default::default()
        })
        .await
        .unwrap();

    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;
    runtime.start().await.expect("start should succeed");

    assert_eq!(
        fixture
            .cluster
            .object_names(ResourceKind::PersistentVolumeClaim, WORKSPACE)
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_pod_never_running_leaves_nothing() {
    let mut fixture = Fixture::new(CheckOutcome::Ready);
    fixture.cluster.set_pod_startup(PodStartup::Pending);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let err = runtime.start().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "Waiting for pod 'main' reached timeout");
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert_eq!(runtime.status(), RuntimeStatus::Failed);
    assert!(runtime.machines().is_empty());

    let events = fixture.drain_events();
    assert_eq!(
        machine_statuses(&events, "main/main"),
        vec![MachineStatus::Starting, MachineStatus::Failed]
    );
}

#[tokio::test]
async fn test_failed_pod_leaves_nothing() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    fixture.cluster.set_pod_startup(PodStartup::Failed);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let err = runtime.start().await.unwrap_err();
    assert!(err.to_string().contains("failed to start"));
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
}

#[tokio::test]
async fn test_bootstrap_failure_leaves_nothing() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    fixture
        .cluster
        .set_exec_behavior(ExecBehavior::Fail("exit code 1".to_string()));
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let err = runtime.start().await.unwrap_err();
    assert!(err.to_string().contains("org.eclipse.che.ws-agent"));
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert_eq!(runtime.status(), RuntimeStatus::Failed);
}

#[tokio::test]
async fn test_readiness_timeout_leaves_nothing() {
    let fixture = Fixture::new(CheckOutcome::Fail("servers not ready".to_string()));
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let err = runtime.start().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
}

#[tokio::test]
async fn test_interrupted_start() {
    let mut fixture = Fixture::new(CheckOutcome::Hang);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let starting = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.start().await })
    };
    // Wait until the machine exists, then interrupt while servers are being checked
    let first = tokio::time::timeout(Duration::from_secs(5), fixture.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, RuntimeEvent::Machine(_)));
    runtime.interrupt();

    let err = starting.await.unwrap().unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(err.to_string(), START_INTERRUPTED);
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
}

#[tokio::test]
async fn test_parallel_start_aborts_on_first_failure() {
    let mut fixture = Fixture::with_outcomes(
        CheckOutcome::Ready,
        &[
            ("a/app", CheckOutcome::Hang),
            ("b/db", CheckOutcome::Fail("database not ready".to_string())),
        ],
    );
    let runtime = fixture
        .runtime(
            r#"
pods:
  a:
    spec:
      containers:
        - name: app
  b:
    spec:
      containers:
        - name: db
"#,
        )
        .await;

    let err = tokio::time::timeout(Duration::from_secs(5), runtime.start())
        .await
        .expect("start should not wait for the hanging machine")
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "database not ready");
    assert_eq!(runtime.status(), RuntimeStatus::Failed);
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert!(runtime.machines().is_empty());

    let events = fixture.drain_events();
    assert_eq!(
        machine_statuses(&events, "b/db"),
        vec![MachineStatus::Starting, MachineStatus::Failed]
    );
    assert_eq!(
        machine_statuses(&events, "a/app"),
        vec![MachineStatus::Starting]
    );
}

#[tokio::test]
async fn test_pod_failure_while_starting_stops_runtime() {
    let mut fixture = Fixture::new(CheckOutcome::Hang);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;

    let starting = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.start().await })
    };
    let first = tokio::time::timeout(Duration::from_secs(5), fixture.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, RuntimeEvent::Machine(_)));

    fixture
        .cluster
        .set_pod_phase(WORKSPACE, "main", POD_PHASE_FAILED)
        .unwrap();

    let event = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), fixture.events.recv())
            .await
            .unwrap()
            .unwrap();
        if let RuntimeEvent::Runtime(e) = event {
            break e;
        }
    };
    assert!(event.failed);
    assert_eq!(event.status, RuntimeStatus::Stopped);
    assert_eq!(event.previous_status, RuntimeStatus::Running);
    assert_eq!(event.error.as_deref(), Some("Pod 'main' was abnormally stopped"));

    let err = tokio::time::timeout(Duration::from_secs(5), starting)
        .await
        .expect("start should end once the runtime is stopped")
        .unwrap()
        .unwrap_err();
    assert!(!err.is_interrupted());
    assert_eq!(err.to_string(), "Pod 'main' was abnormally stopped");
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert!(runtime.machines().is_empty());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;
    runtime.start().await.unwrap();

    runtime.stop().await.unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert!(runtime.machines().is_empty());

    runtime.stop().await.unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;
    runtime.start().await.unwrap();

    let err = runtime.start().await.unwrap_err();
    assert!(err.to_string().starts_with("Invalid state"));
}

#[tokio::test]
async fn test_abnormal_stop() {
    let mut fixture = Fixture::new(CheckOutcome::Ready);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;
    runtime.start().await.unwrap();
    fixture.drain_events();

    fixture
        .cluster
        .set_pod_phase(WORKSPACE, "main", POD_PHASE_FAILED)
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), fixture.events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RuntimeEvent::Runtime(e) => {
            assert!(e.failed);
            assert_eq!(e.status, RuntimeStatus::Stopped);
            assert_eq!(e.previous_status, RuntimeStatus::Running);
            assert_eq!(e.error.as_deref(), Some("Pod 'main' was abnormally stopped"));
        }
        other => panic!("expected runtime event, got {:?}", other),
    }
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
    assert_eq!(fixture.cluster.object_count(WORKSPACE), 0);
    assert!(runtime.machines().is_empty());

    // A regular stop afterwards has nothing left to do
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_sequential_start_of_two_pods() {
    let config = ws_runtime::RuntimeConfig {
        parallel_machine_start: false,
        ..test_config()
    };
    let fixture = Fixture::with_config(CheckOutcome::Ready, config);
    let runtime = fixture
        .runtime(
            r#"
pods:
  db:
    spec:
      containers:
        - name: postgres
  app:
    spec:
      containers:
        - name: web
        - name: sidecar
machines:
  db/postgres:
    servers:
      postgres:
        port: "5432"
        protocol: tcp
        external: false
  app/web:
    servers:
      web:
        port: "3000"
        protocol: http
"#,
        )
        .await;

    runtime.start().await.unwrap();

    let machines = runtime.machines();
    assert_eq!(machines.len(), 3);
    assert!(machines.values().all(|m| m.status == MachineStatus::Running));
    assert!(machines["app/sidecar"].servers.is_empty());
    assert!(machines["db/postgres"].servers["postgres"]
        .url
        .starts_with("tcp://server"));
    assert!(machines["app/web"].servers["web"].url.starts_with("http://"));
    assert_eq!(
        fixture.cluster.object_names(ResourceKind::Route, WORKSPACE).len(),
        1
    );
}

#[tokio::test]
async fn test_service_targets_declared_port() {
    let fixture = Fixture::new(CheckOutcome::Ready);
    let runtime = fixture.runtime(EXAMPLE_ENVIRONMENT).await;
    runtime.start().await.unwrap();

    let pod = fixture
        .cluster
        .get(ResourceKind::Pod, WORKSPACE, "main")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        pod["spec"]["containers"][0]["ports"][0]["containerPort"],
        8080
    );

    let services = fixture.cluster.object_names(ResourceKind::Service, WORKSPACE);
    let service = fixture
        .cluster
        .get(ResourceKind::Service, WORKSPACE, &services[0])
        .await
        .unwrap()
        .unwrap();
    let target: IntOrString =
        serde_json::from_value(service["spec"]["ports"][0]["targetPort"].clone()).unwrap();
    assert_eq!(target, IntOrString::Int(8080));
}
