// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory socket doubles for session tests: a transport that records
//! sent frames and a factory that lets tests inject inbound frames or
//! simulate a dropped connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use parlor_core::ParlorError;
use parlor_transport::{ChatTransport, SocketEvents, SocketFactory};

const INBOUND_BUFFER: usize = 64;

/// A transport that records every sent frame.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    notify: Notify,
}

impl MockTransport {
    /// All frames sent so far, in order.
    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` frames were sent, then returns them.
    /// Panics on timeout with the frames seen so far.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frames = self.sent.lock().await.clone();
            if frames.len() >= count {
                return frames;
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                panic!(
                    "timed out waiting for {count} sent frames, saw {}: {frames:#?}",
                    frames.len()
                );
            }
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(&self, frame: String) -> Result<(), ParlorError> {
        if self.is_closed() {
            return Err(ParlorError::Transport {
                message: "socket is closed".into(),
                source: None,
            });
        }
        self.sent.lock().await.push(frame);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A socket factory that hands out [`MockTransport`]s and keeps the inbound
/// sender of the most recent connection so tests can inject server frames.
#[derive(Default)]
pub struct MockSocketFactory {
    inbound: Mutex<Option<mpsc::Sender<String>>>,
    transport: Mutex<Option<Arc<MockTransport>>>,
}

impl MockSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects one inbound frame into the live connection.
    pub async fn inject(&self, frame: impl Into<String>) {
        let sender = { self.inbound.lock().await.clone() };
        let sender = sender.expect("no live connection to inject into");
        sender
            .send(frame.into())
            .await
            .expect("inbound channel closed");
    }

    /// Drops the inbound channel, which the session observes as an
    /// unexpected disconnect.
    pub async fn simulate_disconnect(&self) {
        self.inbound.lock().await.take();
    }

    /// The transport of the most recent connection.
    pub async fn transport(&self) -> Arc<MockTransport> {
        self.transport
            .lock()
            .await
            .clone()
            .expect("no connection was made")
    }

    /// Like [`transport`](Self::transport), but returns `None` when no
    /// connection has been made yet.
    pub async fn try_transport(&self) -> Option<Arc<MockTransport>> {
        self.transport.lock().await.clone()
    }
}

#[async_trait]
impl SocketFactory for MockSocketFactory {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Arc<dyn ChatTransport>, SocketEvents), ParlorError> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let cancel = CancellationToken::new();
        let transport = Arc::new(MockTransport::default());

        *self.inbound.lock().await = Some(tx);
        *self.transport.lock().await = Some(Arc::clone(&transport));

        Ok((
            transport as Arc<dyn ChatTransport>,
            SocketEvents { frames: rx, cancel },
        ))
    }
}
