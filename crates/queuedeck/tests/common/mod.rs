#![allow(dead_code)]

use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;

use queuedeck::domain::{GroupDescriptor, JobState, QueueDescriptor};
use queuedeck::engine::{MemoryConnector, MemoryEngine};
use queuedeck::repo::MemoryDescriptorRepo;
use queuedeck::ControlPlane;

pub const BILLING: &str = "g-billing";
pub const MAIL: &str = "g-mail";

pub const INVOICES: &str = "q-invoices";
pub const RECEIPTS: &str = "q-receipts";
pub const REFUNDS: &str = "q-refunds";
pub const WELCOME: &str = "q-welcome";

pub struct Fixture {
    pub repo: Arc<MemoryDescriptorRepo>,
    pub connector: MemoryConnector,
    pub control: ControlPlane,
}

impl Fixture {
    pub fn descriptor(&self, queue_id: &str) -> QueueDescriptor {
        let (name, group_id, compliance) = match queue_id {
            INVOICES => ("invoices", BILLING, None),
            RECEIPTS => ("receipts", BILLING, None),
            REFUNDS => ("refunds", BILLING, None),
            WELCOME => ("welcome-mail", MAIL, Some("token, secret")),
            other => panic!("unknown fixture queue {other}"),
        };
        queue(queue_id, name, group_id, compliance)
    }

    pub fn engine(&self, queue_id: &str) -> Arc<MemoryEngine> {
        self.connector
            .engine(&self.descriptor(queue_id))
            .expect("fixture queue has a valid port")
    }

    pub fn seed(&self, queue_id: &str, state: JobState, payload: Value) -> String {
        self.engine(queue_id).seed(state, payload)
    }

    pub fn seed_many(&self, queue_id: &str, state: JobState, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| self.seed(queue_id, state, serde_json::json!({ "n": i })))
            .collect()
    }

    pub fn leases(&self) -> usize {
        self.connector.registry().total_leases()
    }
}

pub fn queue(id: &str, name: &str, group_id: &str, compliance: Option<&str>) -> QueueDescriptor {
    QueueDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        host: "localhost".to_string(),
        port: 6379,
        description: None,
        compliance: compliance.map(str::to_string),
        group_id: group_id.to_string(),
    }
}

pub fn group(id: &str, name: &str) -> GroupDescriptor {
    GroupDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
    }
}

/// Two groups over an in-memory engine:
/// billing (invoices, receipts, refunds) and mail (welcome, with `token`/`secret` hidden).
pub fn setup() -> Fixture {
    let repo = Arc::new(MemoryDescriptorRepo::new());
    let connector = MemoryConnector::new();

    repo.add_group(group(BILLING, "Billing"));
    repo.add_group(group(MAIL, "Mail"));

    let control = ControlPlane::new(repo.clone(), Arc::new(connector.clone()), 2);
    let fixture = Fixture {
        repo,
        connector,
        control,
    };

    for id in [INVOICES, RECEIPTS, REFUNDS, WELCOME] {
        fixture.repo.add_queue(fixture.descriptor(id));
    }
    fixture
}

/// Postgres pool for descriptor repository tests, or `None` when
/// `TEST_DATABASE_URL` is not set.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let url = std::env::var("TEST_DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    sqlx::query("TRUNCATE TABLE queues, groups")
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}
