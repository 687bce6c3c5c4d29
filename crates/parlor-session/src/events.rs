// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events surfaced to the host application via [`ChatSession::subscribe`].
//!
//! [`ChatSession::subscribe`]: crate::ChatSession::subscribe

use parlor_core::{Agent, Message, ThreadId};

/// A state change the host application may want to react to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session-level state changed (connection, identity, token).
    ChatUpdated,
    /// One thread's content or metadata changed.
    ThreadUpdated(ThreadId),
    /// The set of threads changed (created, listed, archived).
    ThreadsUpdated,
    /// A new message landed in a thread.
    MessageCreated { thread_id: ThreadId, message: Message },
    /// An agent started or stopped typing in a thread.
    AgentTyping { thread_id: ThreadId, started: bool },
    /// The assigned agent of a thread changed. `None` means unassigned.
    AssigneeChanged {
        thread_id: ThreadId,
        agent: Option<Agent>,
    },
    /// A proactive popup action fired.
    ProactiveAction {
        action_id: String,
        headline: Option<String>,
        body: Option<String>,
    },
    /// The socket dropped without an explicit disconnect.
    UnexpectedDisconnect,
    /// A server-reported error that is not tied to a pending operation.
    Error(String),
}
