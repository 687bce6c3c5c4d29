// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire protocol for the Parlor chat SDK.
//!
//! Outbound: [`envelope::build_envelope`] turns a (type, payload) pair plus
//! the session identity into the canonical event envelope. Inbound:
//! [`events::decode_event`] decodes raw frames into the closed set of
//! [`events::ServerEvent`] shapes.

pub mod envelope;
pub mod events;
pub mod payloads;

pub use envelope::{build_envelope, Envelope, EnvelopeIdentity, EventType};
pub use events::{decode_event, ServerEvent};
