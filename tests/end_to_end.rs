//! End-to-end convergence runs against an in-memory cloud and a mocked
//! engine, with tracked state read from a real state file on disk.

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::assert_ok;

use infra_converge::catalog::{Catalog, ResourceDescriptor, ResourceKind, TemplateParams};
use infra_converge::cloud::{CloudQuery, QueryOutcome};
use infra_converge::config::CloudProvider;
use infra_converge::confirm::Confirmer;
use infra_converge::engine::DeclarativeEngine;
use infra_converge::error::{EngineError, ProbeError};
use infra_converge::planner::{ConflictReason, ExecutionOutcome, ReconciliationAction};
use infra_converge::probe::{Prober, RetryPolicy};
use infra_converge::reconciler::{Reconciler, RunMode};
use infra_converge::report::RunStatus;
use infra_converge::state::{LocalStateSource, TrackedStateReader};

mock! {
    Engine {}

    #[async_trait]
    impl DeclarativeEngine for Engine {
        async fn list(&self) -> Result<Vec<String>, EngineError>;
        async fn import(&self, address: &str, native_id: &str) -> Result<(), EngineError>;
        async fn remove(&self, address: &str) -> Result<(), EngineError>;
        async fn apply(&self, auto_approve: bool) -> Result<(), EngineError>;
    }
}

/// A cloud that knows a fixed set of resources by lookup key.
#[derive(Default)]
struct FakeCloud {
    live: HashMap<String, String>,
    hanging: HashSet<String>,
}

impl FakeCloud {
    fn with(mut self, lookup: &str, native_id: &str) -> Self {
        self.live.insert(lookup.to_string(), native_id.to_string());
        self
    }

    fn hanging(mut self, lookup: &str) -> Self {
        self.hanging.insert(lookup.to_string());
        self
    }
}

#[async_trait]
impl CloudQuery for FakeCloud {
    async fn query(&self, _kind: ResourceKind, lookup: &str) -> Result<QueryOutcome, ProbeError> {
        if self.hanging.contains(lookup) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.live.get(lookup).map_or(QueryOutcome::NotFound, |id| {
            QueryOutcome::Found {
                native_id: id.clone(),
                attributes: BTreeMap::new(),
            }
        }))
    }

    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }
}

struct Approve;

impl Confirmer for Approve {
    fn confirm(&self, _prompt: &str) -> io::Result<bool> {
        Ok(true)
    }

    fn confirm_typed(&self, _prompt: &str, _expected: &str) -> io::Result<bool> {
        Ok(false)
    }
}

/// network <- subnet <- vm, declared out of order.
fn catalog() -> Catalog {
    Catalog::new(
        vec![
            ResourceDescriptor::new("vm", ResourceKind::Compute, "{project}-vm")
                .unwrap()
                .with_address("aws_instance.vm")
                .depends_on("subnet"),
            ResourceDescriptor::new("subnet", ResourceKind::Subnet, "{project}-subnet")
                .unwrap()
                .with_address("aws_subnet.main")
                .depends_on("network"),
            ResourceDescriptor::new("network", ResourceKind::Network, "{project}-network")
                .unwrap()
                .with_address("aws_vpc.main"),
        ],
        TemplateParams::new("demo", "dev"),
    )
    .unwrap()
}

fn reconciler(
    cloud: FakeCloud,
    engine: MockEngine,
    dir: &TempDir,
) -> Reconciler<FakeCloud, LocalStateSource, MockEngine> {
    let prober = Prober::new(cloud).with_policy(RetryPolicy::new(
        3,
        Duration::from_millis(10),
        Duration::from_secs(1),
    ));
    Reconciler::new(
        catalog(),
        prober,
        TrackedStateReader::new(LocalStateSource::in_dir(dir.path())),
        engine,
        Box::new(Approve),
    )
}

#[tokio::test]
async fn live_untracked_chain_is_imported_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    let cloud = FakeCloud::default()
        .with("demo-network", "vpc-1")
        .with("demo-subnet", "subnet-1")
        .with("demo-vm", "i-1");

    let mut engine = MockEngine::new();
    let mut seq = mockall::Sequence::new();
    for (address, id) in [
        ("aws_vpc.main", "vpc-1"),
        ("aws_subnet.main", "subnet-1"),
        ("aws_instance.vm", "i-1"),
    ] {
        engine
            .expect_import()
            .with(eq(address), eq(id))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
    }
    engine.expect_apply().never();

    let r = reconciler(cloud, engine, &dir);

    let plan = assert_ok!(r.plan().await);
    let names: Vec<&str> = plan.entries.iter().map(|e| e.logical_name.as_str()).collect();
    assert_eq!(names, vec!["network", "subnet", "vm"]);
    assert!(
        plan.actions()
            .iter()
            .all(|a| matches!(a, ReconciliationAction::Import { .. }))
    );

    let report = assert_ok!(r.run(RunMode::ImportIfMissing).await);
    assert_eq!(report.status, RunStatus::Converged);
    assert_eq!(report.applied, 3);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn drifted_id_is_reported_and_never_imported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("terraform.tfstate"),
        r#"{"version": 4, "serial": 3, "resources": [
          {"mode": "managed", "type": "aws_vpc", "name": "main",
           "instances": [{"attributes": {"id": "vpc-1"}}]},
          {"mode": "managed", "type": "aws_subnet", "name": "main",
           "instances": [{"attributes": {"id": "subnet-1"}}]},
          {"mode": "managed", "type": "aws_instance", "name": "vm",
           "instances": [{"attributes": {"id": "vm-123"}}]}]}"#,
    )
    .unwrap();
    let cloud = FakeCloud::default()
        .with("demo-network", "vpc-1")
        .with("demo-subnet", "subnet-1")
        .with("demo-vm", "vm-456");

    let mut engine = MockEngine::new();
    engine.expect_import().never();
    engine.expect_remove().never();
    engine.expect_apply().never();

    let r = reconciler(cloud, engine, &dir);
    let report = assert_ok!(r.run(RunMode::Apply { auto_approve: true }).await);

    assert_eq!(report.status, RunStatus::NeedsAttention);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].logical_name, "vm");
    assert!(report.conflicts[0].reason.contains("vm-456"));

    let vm = &report.results[2];
    assert_eq!(
        vm.action,
        ReconciliationAction::Conflict {
            name: String::from("vm"),
            reason: ConflictReason::Drift {
                tracked_id: String::from("vm-123"),
                live_id: String::from("vm-456"),
            },
        }
    );
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_isolates_one_resource() {
    let dir = TempDir::new().unwrap();
    let cloud = FakeCloud::default()
        .with("demo-network", "vpc-1")
        .hanging("demo-subnet");

    let mut engine = MockEngine::new();
    engine
        .expect_import()
        .with(eq("aws_vpc.main"), eq("vpc-1"))
        .times(1)
        .returning(|_, _| Ok(()));

    let r = reconciler(cloud, engine, &dir);
    let report = assert_ok!(r.run(RunMode::ImportIfMissing).await);

    assert_eq!(report.status, RunStatus::NeedsAttention);
    assert_eq!(report.applied, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].logical_name, "subnet");
    assert!(report.failures[0].reason.contains("3 attempts"));
    assert!(matches!(report.results[1].outcome, ExecutionOutcome::Failed(_)));
}

#[tokio::test]
async fn resolve_is_declined_without_typed_name() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("terraform.tfstate"),
        r#"{"version": 4, "resources": [
          {"mode": "managed", "type": "aws_vpc", "name": "main",
           "instances": [{"attributes": {"id": "vpc-gone"}}]}]}"#,
    )
    .unwrap();

    let mut engine = MockEngine::new();
    engine.expect_remove().never();

    let r = reconciler(FakeCloud::default(), engine, &dir);
    assert!(r.resolve("network").await.is_err());
}
