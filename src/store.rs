use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use rand::Rng;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::directory::{StaticDirectory, UserDirectory};
use crate::errors::{GroupError, GroupResult};
use crate::models::{
    Group, GroupCollection, GroupFilter, GroupUpdate, Message, MessageKind, NewMessage, Post,
    Visibility, SYSTEM_SENDER,
};
use crate::storage::SnapshotStore;

/// Owns the group collection and exposes every mutating and query operation.
///
/// Operations on the same group serialize through the map's per-entry locks,
/// so the structural invariants on [`Group`] are never observed violated;
/// operations on different groups proceed concurrently. Mutations mark the
/// snapshot dirty and never block on persistence — flushing happens in the
/// background (see [`GroupStore::spawn_flush_task`]) or explicitly via
/// [`GroupStore::flush`].
///
/// Cloning is cheap; clones share the same underlying state.
#[derive(Clone)]
pub struct GroupStore {
    groups: Arc<DashMap<Uuid, Group>>,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn UserDirectory>,
    snapshots: SnapshotStore,
    config: StoreConfig,
    dirty: Arc<AtomicBool>,
}

impl GroupStore {
    /// Build a store, loading whatever the snapshot store last saved.
    pub fn load(
        config: StoreConfig,
        snapshots: SnapshotStore,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let collection = snapshots.load();
        let groups: DashMap<Uuid, Group> = collection
            .groups
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        tracing::info!(groups = groups.len(), "group store loaded");

        Self {
            groups: Arc::new(groups),
            clock,
            directory,
            snapshots,
            config,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fresh store with defaults everywhere: wall clock, empty directory,
    /// in-memory snapshots.
    pub fn in_memory() -> Self {
        Self::load(
            StoreConfig::default(),
            SnapshotStore::memory(),
            Arc::new(SystemClock),
            Arc::new(StaticDirectory::new()),
        )
    }

    /// Store wired from configuration: snapshots go to `snapshot_dir` when
    /// set, otherwise stay in memory. Pairs with [`StoreConfig::from_env`].
    pub fn from_config(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let snapshots = match &config.snapshot_dir {
            Some(dir) => SnapshotStore::local(dir),
            None => SnapshotStore::memory(),
        };
        Self::load(config, snapshots, clock, directory)
    }

    // ─── Mutating operations ───────────────────────────

    /// Create a group with the actor as sole member, admin, and creator.
    /// Private groups get a fresh invite code; every group starts with a
    /// system welcome message.
    pub fn create_group(
        &self,
        actor_id: &str,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> GroupResult<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GroupError::Validation("Group name is required".into()));
        }

        let now = self.clock.now();
        let id = Uuid::new_v4();
        let invite_code = match visibility {
            Visibility::Private => Some(generate_invite_code(self.config.invite_code_len)),
            Visibility::Public => None,
        };

        let mut group = Group {
            id,
            name: name.to_string(),
            description: description.trim().to_string(),
            topic: "General".to_string(),
            visibility,
            invite_code,
            creator_id: actor_id.to_string(),
            members: vec![actor_id.to_string()],
            admins: vec![actor_id.to_string()],
            messages: Vec::new(),
            posts: Vec::new(),
            appearance: Default::default(),
            created_at: now,
            last_activity: now,
        };
        push_system_message(
            &mut group,
            format!("Welcome to {name}! Start chatting and sharing ideas."),
            now,
        );
        group.assert_consistent();

        tracing::info!(group_id = %id, ?visibility, "group created");
        self.groups.insert(id, group);
        self.mark_dirty();
        Ok(id)
    }

    /// Join a group. A no-op success when the actor is already a member (no
    /// duplicate system message). Private groups require the exact invite code.
    pub fn join_group(
        &self,
        actor_id: &str,
        group_id: Uuid,
        code_attempt: Option<&str>,
    ) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if group.is_member(actor_id) {
            return Ok(()); // idempotent
        }
        if group.visibility == Visibility::Private
            && group.invite_code.as_deref() != Some(code_attempt.unwrap_or_default())
        {
            return Err(GroupError::InvalidInviteCode);
        }
        if let Some(limit) = self.member_limit(group) {
            if group.member_count() >= limit as usize {
                return Err(GroupError::GroupFull);
            }
        }

        let now = self.next_timestamp(group);
        group.members.push(actor_id.to_string());
        let name = self.directory.resolve(actor_id);
        push_system_message(group, format!("{name} has joined the group! 🎉"), now);
        group.last_activity = now;
        group.assert_consistent();

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    /// Leave a group, dropping any admin role.
    ///
    /// A departing creator hands creatorship to the earliest remaining admin,
    /// or — when no other admin exists — to the earliest remaining member,
    /// who is promoted. A sole-member creator leaving destroys the group: a
    /// group is never left empty.
    pub fn leave_group(&self, actor_id: &str, group_id: Uuid) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_member(actor_id) {
            return Err(GroupError::NotAMember);
        }

        if group.members.len() == 1 {
            // Sole member leaving destroys the group. Release the entry guard
            // untouched and re-check under the map's removal lock, so a join
            // landing in between keeps the group alive and no observer ever
            // sees an empty member list.
            drop(entry);
            if self
                .groups
                .remove_if(&group_id, |_, g| g.members == [actor_id])
                .is_some()
            {
                tracing::info!(group_id = %group_id, "last member left, group removed");
                self.mark_dirty();
                return Ok(());
            }
            // Someone joined in the window; depart through the normal path.
            return self.leave_group(actor_id, group_id);
        }

        group.members.retain(|m| m != actor_id);
        group.admins.retain(|a| a != actor_id);

        let now = self.next_timestamp(group);
        let name = self.directory.resolve(actor_id);
        push_system_message(group, format!("{name} has left the group."), now);

        if group.creator_id == actor_id {
            let heir = group
                .admins
                .first()
                .cloned()
                .unwrap_or_else(|| group.members[0].clone());
            if !group.is_admin(&heir) {
                group.admins.push(heir.clone());
            }
            group.creator_id = heir.clone();
            let heir_name = self.directory.resolve(&heir);
            push_system_message(group, format!("{heir_name} is now the group owner."), now);
            tracing::info!(group_id = %group_id, heir = %heir, "creatorship transferred");
        }

        group.last_activity = now;
        group.assert_consistent();

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    /// Delete a group and everything it owns (admin only). Irrecoverable.
    pub fn delete_group(&self, actor_id: &str, group_id: Uuid) -> GroupResult<()> {
        if self
            .groups
            .remove_if(&group_id, |_, g| g.is_admin(actor_id))
            .is_some()
        {
            tracing::info!(group_id = %group_id, "group deleted");
            self.mark_dirty();
            Ok(())
        } else if self.groups.contains_key(&group_id) {
            Err(GroupError::NotAuthorized(
                "Only admins can delete the group".into(),
            ))
        } else {
            Err(GroupError::GroupNotFound)
        }
    }

    /// Add users directly to the group (admin only). Users that are already
    /// members are skipped; returns the count actually added, and 0 — still a
    /// success — when everyone already belonged.
    pub fn invite_members(
        &self,
        actor_id: &str,
        group_id: Uuid,
        user_ids: &[String],
    ) -> GroupResult<usize> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_admin(actor_id) {
            return Err(GroupError::NotAuthorized(
                "Only admins can invite members".into(),
            ));
        }

        let mut added: Vec<String> = Vec::new();
        for user_id in user_ids {
            if !group.is_member(user_id) && !added.contains(user_id) {
                added.push(user_id.clone());
            }
        }
        if added.is_empty() {
            return Ok(0);
        }
        if let Some(limit) = self.member_limit(group) {
            if group.member_count() + added.len() > limit as usize {
                return Err(GroupError::GroupFull);
            }
        }

        let now = self.next_timestamp(group);
        group.members.extend(added.iter().cloned());

        let names: Vec<String> = added.iter().map(|id| self.directory.resolve(id)).collect();
        let verb = if names.len() > 1 { "have" } else { "has" };
        push_system_message(
            group,
            format!("{} {verb} joined the group! 🎉", names.join(", ")),
            now,
        );
        group.last_activity = now;
        group.assert_consistent();

        let count = added.len();
        drop(entry);
        self.mark_dirty();
        Ok(count)
    }

    /// Remove a member (admin only). The creator can never be removed; a
    /// target that is not a member is a no-op success, mirroring
    /// [`GroupStore::invite_members`] idempotence.
    pub fn remove_member(
        &self,
        actor_id: &str,
        group_id: Uuid,
        target_user_id: &str,
    ) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_admin(actor_id) {
            return Err(GroupError::NotAuthorized(
                "Only admins can remove members".into(),
            ));
        }
        if target_user_id == group.creator_id {
            return Err(GroupError::CannotRemoveCreator);
        }
        if !group.is_member(target_user_id) {
            return Ok(());
        }

        group.members.retain(|m| m != target_user_id);
        group.admins.retain(|a| a != target_user_id);

        let now = self.next_timestamp(group);
        let name = self.directory.resolve(target_user_id);
        push_system_message(group, format!("{name} was removed from the group."), now);
        group.last_activity = now;
        group.assert_consistent();

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    /// Grant or revoke the admin role (admin only). The target must be a
    /// current member, and the creator's admin role can never be revoked,
    /// regardless of caller.
    pub fn set_admin(
        &self,
        actor_id: &str,
        group_id: Uuid,
        target_user_id: &str,
        is_admin: bool,
    ) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_admin(actor_id) {
            return Err(GroupError::NotAuthorized(
                "Only admins can change member roles".into(),
            ));
        }
        if target_user_id == group.creator_id && !is_admin {
            return Err(GroupError::CannotRemoveCreator);
        }
        if !group.is_member(target_user_id) {
            return Err(GroupError::NotAMember);
        }

        let currently = group.is_admin(target_user_id);
        if is_admin == currently {
            return Ok(()); // idempotent
        }
        if is_admin {
            group.admins.push(target_user_id.to_string());
        } else {
            group.admins.retain(|a| a != target_user_id);
        }

        group.last_activity = self.next_timestamp(group);
        group.assert_consistent();

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    /// Append a chat message (member only). Messages are append-only and
    /// their timestamps never go backwards within a group, even if the clock
    /// does.
    pub fn post_message(
        &self,
        actor_id: &str,
        group_id: Uuid,
        message: NewMessage,
    ) -> GroupResult<Uuid> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_member(actor_id) {
            return Err(GroupError::NotAMember);
        }
        if message.kind == MessageKind::Text && message.content.trim().is_empty() {
            return Err(GroupError::Validation("Message content is required".into()));
        }
        if message.kind != MessageKind::Text && message.media_ref.is_none() {
            return Err(GroupError::Validation("Media reference is required".into()));
        }
        if message.kind == MessageKind::File && !group.appearance.allow_file_sharing {
            return Err(GroupError::Validation(
                "File sharing is disabled in this group".into(),
            ));
        }

        let now = self.next_timestamp(group);
        let id = Uuid::new_v4();
        group.messages.push(Message {
            id,
            group_id,
            sender_id: actor_id.to_string(),
            content: message.content,
            kind: message.kind,
            media_ref: message.media_ref,
            file_name: message.file_name,
            timestamp: now,
        });
        group.last_activity = now;

        drop(entry);
        self.mark_dirty();
        Ok(id)
    }

    /// Publish a long-form group post (member only).
    pub fn create_post(&self, actor_id: &str, group_id: Uuid, content: &str) -> GroupResult<Uuid> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_member(actor_id) {
            return Err(GroupError::NotAMember);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(GroupError::Validation("Post content is required".into()));
        }

        let now = self.next_timestamp(group);
        let id = Uuid::new_v4();
        group.posts.push(Post {
            id,
            group_id,
            author_id: actor_id.to_string(),
            content: content.to_string(),
            timestamp: now,
            like_count: 0,
            comment_count: 0,
        });
        group.last_activity = now;

        drop(entry);
        self.mark_dirty();
        Ok(id)
    }

    /// Delete a post. Author only — admins get no delete rights over other
    /// people's posts.
    pub fn delete_post(&self, actor_id: &str, group_id: Uuid, post_id: Uuid) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        let post = group
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .ok_or(GroupError::PostNotFound)?;
        if post.author_id != actor_id {
            return Err(GroupError::NotAuthorized(
                "Only the author can delete a post".into(),
            ));
        }

        group.posts.retain(|p| p.id != post_id);
        group.last_activity = self.next_timestamp(group);

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    /// Bump a post's like counter (member only). Returns the new count.
    pub fn like_post(&self, actor_id: &str, group_id: Uuid, post_id: Uuid) -> GroupResult<u32> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_member(actor_id) {
            return Err(GroupError::NotAMember);
        }
        let post = group
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(GroupError::PostNotFound)?;
        post.like_count += 1;
        let count = post.like_count;

        drop(entry);
        self.mark_dirty();
        Ok(count)
    }

    /// Apply a partial settings update (admin only). Flipping visibility
    /// keeps the invite-code invariant: Public→Private mints a fresh code,
    /// Private→Public clears it.
    pub fn update_settings(
        &self,
        actor_id: &str,
        group_id: Uuid,
        update: GroupUpdate,
    ) -> GroupResult<()> {
        let mut entry = self.entry(group_id)?;
        let group = entry.value_mut();

        if !group.is_admin(actor_id) {
            return Err(GroupError::NotAuthorized(
                "Only admins can change group settings".into(),
            ));
        }

        if let Some(name) = &update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(GroupError::Validation("Group name is required".into()));
            }
            group.name = name.to_string();
        }
        if let Some(description) = update.description {
            group.description = description.trim().to_string();
        }
        if let Some(topic) = update.topic {
            let topic = topic.trim();
            group.topic = if topic.is_empty() { "General".into() } else { topic.to_string() };
        }
        if let Some(visibility) = update.visibility {
            if visibility != group.visibility {
                group.visibility = visibility;
                group.invite_code = match visibility {
                    Visibility::Private => {
                        Some(generate_invite_code(self.config.invite_code_len))
                    }
                    Visibility::Public => None,
                };
            }
        }
        if let Some(appearance) = update.appearance {
            group.appearance = appearance;
        }

        group.last_activity = self.next_timestamp(group);
        group.assert_consistent();

        drop(entry);
        self.mark_dirty();
        Ok(())
    }

    // ─── Query operations ──────────────────────────────

    /// Groups matching the filter, most recently active first.
    pub fn list_groups(&self, filter: &GroupFilter) -> Vec<Group> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(a.name.cmp(&b.name)));
        groups
    }

    /// Snapshot of one group, including its messages and posts.
    pub fn get_group(&self, group_id: Uuid) -> GroupResult<Group> {
        self.groups
            .get(&group_id)
            .map(|entry| entry.value().clone())
            .ok_or(GroupError::GroupNotFound)
    }

    /// Member ids in join order.
    pub fn list_members(&self, group_id: Uuid) -> GroupResult<Vec<String>> {
        self.groups
            .get(&group_id)
            .map(|entry| entry.value().members.clone())
            .ok_or(GroupError::GroupNotFound)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ─── Persistence ───────────────────────────────────

    /// Serialize the full collection, ordered by creation time for stable
    /// snapshot output.
    pub fn snapshot(&self) -> GroupCollection {
        let mut groups: Vec<Group> = self.groups.iter().map(|e| e.value().clone()).collect();
        groups.sort_by_key(|g| (g.created_at, g.id));
        GroupCollection { groups }
    }

    /// Write the current collection to the snapshot store immediately. On
    /// failure the dirty flag is restored so the background task retries.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.dirty.store(false, Ordering::Relaxed);
        let result = self.snapshots.save(&self.snapshot());
        if result.is_err() {
            self.dirty.store(true, Ordering::Relaxed);
        }
        result
    }

    /// Spawn a background task that flushes the snapshot whenever mutations
    /// have happened since the last flush. Best-effort: a crash between a
    /// mutation and the next tick loses at most that window of writes, never
    /// the in-memory consistency.
    pub fn spawn_flush_task(&self) {
        let store = self.clone();
        let interval = Duration::from_secs(store.config.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if store.dirty.swap(false, Ordering::Relaxed) {
                    if let Err(err) = store.snapshots.save(&store.snapshot()) {
                        tracing::error!(%err, "failed to flush group snapshot");
                        store.dirty.store(true, Ordering::Relaxed);
                    }
                }
            }
        });
    }

    // ─── Internals ─────────────────────────────────────

    fn entry(&self, group_id: Uuid) -> GroupResult<RefMut<'_, Uuid, Group>> {
        self.groups.get_mut(&group_id).ok_or(GroupError::GroupNotFound)
    }

    /// Per-group monotonic timestamp: wall clock, clamped so it never runs
    /// behind the group's last recorded activity. Ties are resolved by
    /// insertion order, which `Vec` append preserves.
    fn next_timestamp(&self, group: &Group) -> DateTime<Utc> {
        self.clock.now().max(group.last_activity)
    }

    fn member_limit(&self, group: &Group) -> Option<u32> {
        group
            .appearance
            .member_limit
            .or(self.config.default_member_limit)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }
}

fn push_system_message(group: &mut Group, content: String, timestamp: DateTime<Utc>) {
    group.messages.push(Message {
        id: Uuid::new_v4(),
        group_id: group.id,
        sender_id: SYSTEM_SENDER.to_string(),
        content,
        kind: MessageKind::Text,
        media_ref: None,
        file_name: None,
        timestamp,
    });
}

/// Random invite code in the original "INV-XXXXXX" shape. The charset skips
/// ambiguous glyphs (0/O, 1/I/L).
fn generate_invite_code(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let code: String = (0..len.max(1))
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();
    format!("INV-{code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_code_shape() {
        let code = generate_invite_code(6);
        assert!(code.starts_with("INV-"));
        assert_eq!(code.len(), "INV-".len() + 6);
        assert!(code[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn invite_codes_differ() {
        // 31^6 values; a collision here would be astronomically unlikely
        assert_ne!(generate_invite_code(6), generate_invite_code(6));
    }
}
