// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the Parlor workspace.

pub mod mock_socket;

pub use mock_socket::{MockSocketFactory, MockTransport};
