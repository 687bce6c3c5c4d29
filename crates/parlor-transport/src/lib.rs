// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport layer for the Parlor chat SDK.
//!
//! Provides the WebSocket transport client ([`SocketClient`]), the REST
//! client for configuration/attachment/visitor endpoints ([`RestClient`]),
//! and the generic bounded-attempt retry combinator.

pub mod rest;
pub mod retry;
pub mod socket;

pub use rest::{DeviceFingerprint, RestClient, VisitorUpsert};
pub use retry::{retry, retry_with_backoff};
pub use socket::{socket_url, ChatTransport, SocketClient, SocketEvents, SocketFactory, TungsteniteFactory};
