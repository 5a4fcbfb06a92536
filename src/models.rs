use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved sender id for store-generated membership notices.
pub const SYSTEM_SENDER: &str = "system";

// ─── Visibility ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    /// Joinable only with the group's invite code.
    Private,
}

// ─── Messages ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
}

/// A chat message inside a group. Messages are append-only: there is no edit
/// or delete operation, and ids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub group_id: Uuid,
    /// Member id, or [`SYSTEM_SENDER`] for membership notices.
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    /// Original filename for `File` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_system(&self) -> bool {
        self.sender_id == SYSTEM_SENDER
    }
}

/// Payload for [`crate::GroupStore::post_message`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub kind: MessageKind,
    pub media_ref: Option<String>,
    pub file_name: Option<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            media_ref: None,
            file_name: None,
        }
    }

    pub fn media(kind: MessageKind, content: impl Into<String>, media_ref: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind,
            media_ref: Some(media_ref.into()),
            file_name: None,
        }
    }
}

// ─── Posts ─────────────────────────────────────────────

/// A long-form group post — a separate channel from chat messages.
/// Like/comment counts are plain counters; there is no nested entity model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub group_id: Uuid,
    pub author_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub like_count: u32,
    pub comment_count: u32,
}

// ─── Appearance ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Terminal,
    Midnight,
    Neon,
}

/// Optional per-group presentation and policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub theme: Theme,
    pub accent_color: Option<String>,
    pub tags: Vec<String>,
    /// Maximum member count; joins and invites beyond this are rejected.
    pub member_limit: Option<u32>,
    pub auto_approve: bool,
    /// When false, `File` messages are rejected.
    pub allow_file_sharing: bool,
    /// Seed for the group's generated avatar.
    pub avatar_seed: Option<String>,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            theme: Theme::Default,
            accent_color: None,
            tags: Vec::new(),
            member_limit: None,
            auto_approve: true,
            allow_file_sharing: true,
            avatar_seed: None,
        }
    }
}

// ─── Groups ────────────────────────────────────────────

/// A named collection of members with chat messages and long-form posts,
/// either publicly joinable or gated by an invite code.
///
/// Structural invariants, upheld by every store operation:
/// - `admins` is a subset of `members`
/// - `creator_id` is always present in both `members` and `admins`
/// - `members` is never empty while the group exists
/// - `invite_code` is `Some` non-empty iff the group is `Private`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Free-form category string ("CTF", "Kernel", ...). Defaults to "General".
    pub topic: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub creator_id: String,
    /// Unique member ids, in join order. Join order matters: it decides who
    /// inherits creatorship when the creator leaves.
    pub members: Vec<String>,
    /// Subset of `members`, in promotion order.
    pub admins: Vec<String>,
    pub messages: Vec<Message>,
    pub posts: Vec<Post>,
    #[serde(default)]
    pub appearance: Appearance,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Debug-build check of the structural invariants listed on [`Group`].
    pub(crate) fn assert_consistent(&self) {
        debug_assert!(!self.members.is_empty(), "group has no members");
        debug_assert!(
            self.admins.iter().all(|a| self.is_member(a)),
            "admins must be a subset of members"
        );
        debug_assert!(
            self.is_member(&self.creator_id) && self.is_admin(&self.creator_id),
            "creator must be a member and an admin"
        );
        match self.visibility {
            Visibility::Private => debug_assert!(
                self.invite_code.as_deref().is_some_and(|c| !c.is_empty()),
                "private group must have an invite code"
            ),
            Visibility::Public => {
                debug_assert!(self.invite_code.is_none(), "public group must not have an invite code")
            }
        }
    }
}

// ─── Updates & filters ─────────────────────────────────

/// Partial update applied by [`crate::GroupStore::update_settings`].
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub topic: Option<String>,
    /// Flipping to `Private` mints a fresh invite code; flipping to `Public`
    /// clears it.
    pub visibility: Option<Visibility>,
    pub appearance: Option<Appearance>,
}

/// Filter for [`crate::GroupStore::list_groups`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    /// Case-insensitive substring match over name, description, topic and tags.
    pub search_text: Option<String>,
    pub visibility: Option<Visibility>,
    /// Only groups this user is a member of.
    pub member_of: Option<String>,
}

impl GroupFilter {
    pub fn matches(&self, group: &Group) -> bool {
        if let Some(visibility) = self.visibility {
            if group.visibility != visibility {
                return false;
            }
        }
        if let Some(member) = &self.member_of {
            if !group.is_member(member) {
                return false;
            }
        }
        if let Some(text) = &self.search_text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() {
                let hit = group.name.to_lowercase().contains(&needle)
                    || group.description.to_lowercase().contains(&needle)
                    || group.topic.to_lowercase().contains(&needle)
                    || group
                        .appearance
                        .tags
                        .iter()
                        .any(|t| t.to_lowercase().contains(&needle));
                if !hit {
                    return false;
                }
            }
        }
        true
    }
}

// ─── Snapshot ──────────────────────────────────────────

/// Full serialized state handed to the snapshot store: every group with its
/// nested messages and posts. No partial or incremental persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupCollection {
    pub groups: Vec<Group>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> Group {
        let now = Utc::now();
        Group {
            id: Uuid::new_v4(),
            name: "Kernel Hardening Lab".into(),
            description: "Discuss patches, mitigations, and exploit analysis.".into(),
            topic: "Kernel".into(),
            visibility: Visibility::Public,
            invite_code: None,
            creator_id: "0xRaven".into(),
            members: vec!["0xRaven".into(), "ByteBandit".into()],
            admins: vec!["0xRaven".into()],
            messages: Vec::new(),
            posts: Vec::new(),
            appearance: Appearance {
                tags: vec!["Kernel".into(), "Mitigations".into()],
                ..Appearance::default()
            },
            created_at: now,
            last_activity: now,
        }
    }

    #[test]
    fn filter_matches_name_case_insensitive() {
        let group = sample_group();
        let filter = GroupFilter {
            search_text: Some("hardening".into()),
            ..GroupFilter::default()
        };
        assert!(filter.matches(&group));
    }

    #[test]
    fn filter_matches_tags() {
        let group = sample_group();
        let filter = GroupFilter {
            search_text: Some("mitigation".into()),
            ..GroupFilter::default()
        };
        assert!(filter.matches(&group));
    }

    #[test]
    fn filter_rejects_wrong_visibility() {
        let group = sample_group();
        let filter = GroupFilter {
            visibility: Some(Visibility::Private),
            ..GroupFilter::default()
        };
        assert!(!filter.matches(&group));
    }

    #[test]
    fn filter_member_of() {
        let group = sample_group();
        let member = GroupFilter {
            member_of: Some("ByteBandit".into()),
            ..GroupFilter::default()
        };
        let stranger = GroupFilter {
            member_of: Some("PhantomDev".into()),
            ..GroupFilter::default()
        };
        assert!(member.matches(&group));
        assert!(!stranger.matches(&group));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(GroupFilter::default().matches(&sample_group()));
    }
}
