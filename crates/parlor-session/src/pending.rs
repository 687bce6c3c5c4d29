// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlation of outbound requests with inbound server responses.
//!
//! The wire protocol has no request ids on success responses, so each
//! request family keeps its own waiter slot keyed by the thread it targets.
//! Error responses do carry the originating event id as `transactionId`;
//! `event_index` maps event ids back to waiter slots so a server error
//! fails the right caller.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use parlor_core::{ParlorError, ThreadId};

type Waiter<T> = oneshot::Sender<Result<T, ParlorError>>;

/// Identifies a waiter slot. Stored in `event_index` per outbound event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKey {
    Authorize,
    Recover(Option<ThreadId>),
    ThreadList,
    Metadata(ThreadId),
    LoadMore(ThreadId),
    Archive(ThreadId),
}

/// All in-flight request waiters of one session.
#[derive(Debug, Default)]
pub struct Pending {
    pub authorize: Option<Waiter<()>>,
    /// Keyed by the requested thread id; `None` is the implicit sole-thread
    /// recover of single-thread channels. Resolves with the recovered id.
    pub recover: HashMap<Option<ThreadId>, Waiter<ThreadId>>,
    pub thread_list: Option<Waiter<Vec<ThreadId>>>,
    pub metadata: HashMap<ThreadId, Waiter<()>>,
    /// Resolves with the number of newly merged messages.
    pub load_more: HashMap<ThreadId, Waiter<usize>>,
    /// Archive acks carry no thread reference; waiters resolve in FIFO order.
    pub archive: VecDeque<(ThreadId, Waiter<()>)>,
    /// Outbound event id to waiter slot, for `transactionId` correlation.
    pub event_index: HashMap<String, PendingKey>,
}

impl Pending {
    /// Fails the waiter addressed by `key`, if still registered.
    pub fn fail(&mut self, key: &PendingKey, err: ParlorError) {
        match key {
            PendingKey::Authorize => {
                if let Some(tx) = self.authorize.take() {
                    let _ = tx.send(Err(err));
                }
            }
            PendingKey::Recover(thread) => {
                if let Some(tx) = self.recover.remove(thread) {
                    let _ = tx.send(Err(err));
                }
            }
            PendingKey::ThreadList => {
                if let Some(tx) = self.thread_list.take() {
                    let _ = tx.send(Err(err));
                }
            }
            PendingKey::Metadata(thread) => {
                if let Some(tx) = self.metadata.remove(thread) {
                    let _ = tx.send(Err(err));
                }
            }
            PendingKey::LoadMore(thread) => {
                if let Some(tx) = self.load_more.remove(thread) {
                    let _ = tx.send(Err(err));
                }
            }
            PendingKey::Archive(thread) => {
                if let Some(pos) = self.archive.iter().position(|(id, _)| id == thread) {
                    if let Some((_, tx)) = self.archive.remove(pos) {
                        let _ = tx.send(Err(err));
                    }
                }
            }
        }
    }

    /// Drops every waiter with a connection-loss error. Used on disconnect.
    pub fn fail_all(&mut self) {
        if let Some(tx) = self.authorize.take() {
            let _ = tx.send(Err(connection_lost()));
        }
        for (_, tx) in self.recover.drain() {
            let _ = tx.send(Err(connection_lost()));
        }
        if let Some(tx) = self.thread_list.take() {
            let _ = tx.send(Err(connection_lost()));
        }
        for (_, tx) in self.metadata.drain() {
            let _ = tx.send(Err(connection_lost()));
        }
        for (_, tx) in self.load_more.drain() {
            let _ = tx.send(Err(connection_lost()));
        }
        for (_, tx) in self.archive.drain(..) {
            let _ = tx.send(Err(connection_lost()));
        }
        self.event_index.clear();
    }
}

fn connection_lost() -> ParlorError {
    ParlorError::Transport {
        message: "connection closed while awaiting server response".into(),
        source: None,
    }
}

/// Awaits a waiter's paired receiver, mapping a dropped sender to a
/// connection-loss error.
pub async fn await_response<T>(
    rx: oneshot::Receiver<Result<T, ParlorError>>,
) -> Result<T, ParlorError> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(connection_lost()),
    }
}
