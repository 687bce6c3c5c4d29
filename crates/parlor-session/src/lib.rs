// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session engine for the Parlor chat SDK.
//!
//! [`ChatSession`] owns the connection lifecycle (prepare, connect,
//! disconnect, sign-out), the thread operations, and a broadcast stream of
//! [`SessionEvent`]s. Inbound frames are applied by a single dispatcher
//! task per connection, so state mutations are totally ordered.

pub mod events;
pub mod fields;
pub mod reconciler;
pub mod session;
pub mod threads;
pub mod welcome;

mod dispatcher;
mod pending;

pub use events::SessionEvent;
pub use fields::FieldBag;
pub use reconciler::OutboundMessage;
pub use session::ChatSession;
pub use threads::{ChatThread, ThreadStore};
pub use welcome::resolve_template;
