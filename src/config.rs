use std::env;

/// Runtime knobs for the group store. Every field has a sensible default, so
/// the store can be constructed with no environment at all.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory for the JSON snapshot file. `None` keeps snapshots in memory.
    pub snapshot_dir: Option<String>,

    /// Seconds between background snapshot flushes.
    pub flush_interval_secs: u64,

    /// Length of the random part of generated invite codes.
    pub invite_code_len: usize,

    /// Member cap applied to groups that set no explicit limit of their own.
    pub default_member_limit: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            flush_interval_secs: 5,
            invite_code_len: 6,
            default_member_limit: None,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshot_dir: env::var("CONCLAVE_SNAPSHOT_DIR").ok().filter(|s| !s.is_empty()),
            flush_interval_secs: env::var("CONCLAVE_FLUSH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.flush_interval_secs),
            invite_code_len: env::var("CONCLAVE_INVITE_CODE_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.invite_code_len),
            default_member_limit: env::var("CONCLAVE_DEFAULT_MEMBER_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
