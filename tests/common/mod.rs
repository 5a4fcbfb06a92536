use std::sync::{Arc, Mutex, Once};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use conclave::{
    Clock, Group, GroupStore, SnapshotStore, StaticDirectory, StoreConfig, Visibility,
};

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Clock that only moves when a test tells it to. Lets tests force timestamp
/// collisions and even run the clock backwards.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 10, 10, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }

    pub fn current(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.current()
    }
}

/// Test harness: a fresh in-memory store on a manual clock, with a small
/// directory of known researchers.
pub struct TestStore {
    pub store: GroupStore,
    pub clock: Arc<ManualClock>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new());
        let directory = StaticDirectory::with_names([
            ("0xRaven", "Raven"),
            ("ByteBandit", "Byte Bandit"),
            ("CryptoCat", "Crypto Cat"),
        ]);
        let store = GroupStore::load(
            config,
            SnapshotStore::memory(),
            clock.clone(),
            Arc::new(directory),
        );
        Self { store, clock }
    }

    pub fn public_group(&self, creator: &str, name: &str) -> Uuid {
        self.store
            .create_group(creator, name, "test group", Visibility::Public)
            .unwrap()
    }

    /// Create a private group and hand back its invite code.
    pub fn private_group(&self, creator: &str, name: &str) -> (Uuid, String) {
        let id = self
            .store
            .create_group(creator, name, "test group", Visibility::Private)
            .unwrap();
        let code = self.store.get_group(id).unwrap().invite_code.unwrap();
        (id, code)
    }
}

/// Assert the structural invariants that must hold after every operation.
pub fn assert_consistent(group: &Group) {
    assert!(!group.members.is_empty(), "members must be non-empty");
    for admin in &group.admins {
        assert!(
            group.is_member(admin),
            "admin {admin} is not a member of {}",
            group.name
        );
    }
    assert!(group.is_member(&group.creator_id), "creator must be a member");
    assert!(group.is_admin(&group.creator_id), "creator must be an admin");
    match group.visibility {
        Visibility::Private => assert!(
            group.invite_code.as_deref().map(|c| !c.is_empty()).unwrap_or(false),
            "private group must carry a non-empty invite code"
        ),
        Visibility::Public => assert!(
            group.invite_code.is_none(),
            "public group must not carry an invite code"
        ),
    }
}
