use std::collections::HashMap;

/// Read-only lookup of display names, used when rendering system messages
/// ("Alice has joined the group!").
///
/// The store never mutates user records and performs no referential-integrity
/// check against the directory: any user id is a valid opaque string, and an
/// unknown id simply renders as itself.
pub trait UserDirectory: Send + Sync + 'static {
    fn display_name(&self, user_id: &str) -> Option<String>;

    /// Display name with fallback to the raw id.
    fn resolve(&self, user_id: &str) -> String {
        self.display_name(user_id)
            .unwrap_or_else(|| user_id.to_string())
    }
}

/// Directory backed by a fixed map. The default when no user service is wired in.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(user_id.into(), name.into());
    }
}

impl UserDirectory for StaticDirectory {
    fn display_name(&self, user_id: &str) -> Option<String> {
        self.names.get(user_id).cloned()
    }
}
