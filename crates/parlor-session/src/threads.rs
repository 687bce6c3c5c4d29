// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread store: the local mirror of server-side threads and their
//! message timelines.
//!
//! Merging is additive. Server snapshots never clear messages already held
//! locally; new messages are deduplicated by id and appended or prepended
//! in arrival order.

use parlor_core::{Agent, Message, MessageId, ThreadId, ThreadState};

use crate::fields::FieldBag;

/// One conversation thread as seen by the session.
#[derive(Debug, Clone)]
pub struct ChatThread {
    pub id: ThreadId,
    pub name: Option<String>,
    pub state: ThreadState,
    /// Message timeline, oldest first.
    pub messages: Vec<Message>,
    /// Pagination cursor from the last recover or load-more response.
    pub scroll_token: Option<String>,
    pub has_more_messages: bool,
    pub assigned_agent: Option<Agent>,
    pub contact_id: Option<String>,
    /// Contact-scoped custom fields for this thread.
    pub fields: FieldBag,
    /// Set when the thread was created before the welcome template arrived;
    /// the template is delivered into this thread once it lands.
    pub awaiting_welcome: bool,
}

impl ChatThread {
    /// A locally created thread, not yet acknowledged by the server.
    pub fn pending(id: ThreadId) -> Self {
        Self {
            id,
            name: None,
            state: ThreadState::Pending,
            messages: Vec::new(),
            scroll_token: None,
            has_more_messages: false,
            assigned_agent: None,
            contact_id: None,
            fields: FieldBag::new(),
            awaiting_welcome: false,
        }
    }

    /// A server-known thread stub, e.g. from a thread list fetch.
    pub fn ready(id: ThreadId, name: Option<String>) -> Self {
        Self {
            name,
            state: ThreadState::Ready,
            ..Self::pending(id)
        }
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Appends messages not already held, preserving their order.
    /// Returns how many were actually added.
    pub fn append_new(&mut self, incoming: impl IntoIterator<Item = Message>) -> usize {
        let mut added = 0;
        for message in incoming {
            if !self.contains(&message.id) {
                self.messages.push(message);
                added += 1;
            }
        }
        added
    }

    /// Prepends older messages not already held, preserving their order.
    /// Returns how many were actually added.
    pub fn prepend_new(&mut self, incoming: impl IntoIterator<Item = Message>) -> usize {
        let fresh: Vec<Message> = incoming
            .into_iter()
            .filter(|m| !self.contains(&m.id))
            .collect();
        let added = fresh.len();
        self.messages.splice(0..0, fresh);
        added
    }

    /// Timestamp of the oldest locally held message.
    pub fn oldest_message_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.messages.iter().map(|m| m.created_at).min()
    }
}

/// All threads known to one session.
#[derive(Debug, Default)]
pub struct ThreadStore {
    threads: Vec<ChatThread>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ThreadId) -> Option<&ChatThread> {
        self.threads.iter().find(|t| &t.id == id)
    }

    pub fn get_mut(&mut self, id: &ThreadId) -> Option<&mut ChatThread> {
        self.threads.iter_mut().find(|t| &t.id == id)
    }

    /// Returns the thread for `id`, inserting a fresh one via `make` when
    /// absent.
    pub fn get_or_insert_with(
        &mut self,
        id: &ThreadId,
        make: impl FnOnce() -> ChatThread,
    ) -> &mut ChatThread {
        let pos = match self.threads.iter().position(|t| &t.id == id) {
            Some(pos) => pos,
            None => {
                self.threads.push(make());
                self.threads.len() - 1
            }
        };
        &mut self.threads[pos]
    }

    pub fn insert(&mut self, thread: ChatThread) {
        if self.get(&thread.id).is_none() {
            self.threads.push(thread);
        }
    }

    pub fn all(&self) -> &[ChatThread] {
        &self.threads
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChatThread> {
        self.threads.iter_mut()
    }

    /// Whether any thread is still open (not archived).
    pub fn has_open_thread(&self) -> bool {
        self.threads.iter().any(|t| t.state != ThreadState::Closed)
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}
