// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat session: connection lifecycle and the outbound send path.
//!
//! All mutable session state lives in [`SessionCore`] behind one async lock.
//! The inbound dispatcher task is the only other writer; public operations
//! take the lock briefly, never across a network await.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use parlor_core::{
    AccessToken, ChatState, CustomerIdentity, DestinationId, Environment, ParlorError,
    SessionConfig, SessionContext, ThreadId, VisitorId,
};
use parlor_protocol::payloads::{
    AccessTokenData, AuthorizeCustomerData, DestinationRef, ExecuteTriggerData, TokenRef,
    TriggerRef,
};
use parlor_protocol::{build_envelope, EnvelopeIdentity, EventType};
use parlor_transport::{
    retry, socket_url, ChatTransport, DeviceFingerprint, RestClient, SocketFactory,
    TungsteniteFactory, VisitorUpsert,
};

use crate::dispatcher;
use crate::events::SessionEvent;
use crate::fields::FieldBag;
use crate::pending::{await_response, Pending, PendingKey};
use crate::threads::{ChatThread, ThreadStore};

/// Capacity of the session event channel. Slow subscribers lag, they do not
/// block the dispatcher.
const EVENT_BUFFER: usize = 64;

/// Attempts for idempotent REST calls during prepare and connect.
const REST_ATTEMPTS: u32 = 3;

/// Mutable state of one session: context, threads, customer-scoped fields.
pub(crate) struct SessionCore {
    pub ctx: SessionContext,
    pub threads: ThreadStore,
    pub customer_fields: FieldBag,
}

/// A live socket connection and its dispatcher task.
pub(crate) struct ConnectionHandle {
    pub transport: Arc<dyn ChatTransport>,
    pub cancel: CancellationToken,
    pub dispatcher: JoinHandle<()>,
}

/// State shared between the session handle and the dispatcher task.
pub(crate) struct Shared {
    pub core: Mutex<SessionCore>,
    pub pending: Mutex<Pending>,
    pub transport: Mutex<Option<ConnectionHandle>>,
    pub events_tx: broadcast::Sender<SessionEvent>,
    pub rest: RestClient,
    pub socket_factory: Arc<dyn SocketFactory>,
}

impl Shared {
    pub fn emit(&self, event: SessionEvent) {
        // Nobody subscribed is fine.
        let _ = self.events_tx.send(event);
    }
}

/// Handle to one chat session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ChatSession {
    pub(crate) shared: Arc<Shared>,
}

impl ChatSession {
    /// Creates a session using the production WebSocket transport.
    pub fn new(config: SessionConfig) -> Result<Self, ParlorError> {
        Self::with_socket_factory(config, Arc::new(TungsteniteFactory))
    }

    /// Creates a session with an injected socket factory. Used by tests.
    pub fn with_socket_factory(
        config: SessionConfig,
        socket_factory: Arc<dyn SocketFactory>,
    ) -> Result<Self, ParlorError> {
        let rest = RestClient::new(config.environment.clone())?;
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(SessionCore {
                    ctx: SessionContext::new(config),
                    threads: ThreadStore::new(),
                    customer_fields: FieldBag::new(),
                }),
                pending: Mutex::new(Pending::default()),
                transport: Mutex::new(None),
                events_tx,
                rest,
                socket_factory,
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Current chat lifecycle state.
    pub async fn state(&self) -> ChatState {
        self.shared.core.lock().await.ctx.chat_state
    }

    /// Snapshot of all known threads.
    pub async fn threads(&self) -> Vec<ChatThread> {
        self.shared.core.lock().await.threads.all().to_vec()
    }

    /// Snapshot of one thread.
    pub async fn thread(&self, id: &ThreadId) -> Option<ChatThread> {
        self.shared.core.lock().await.threads.get(id).cloned()
    }

    /// Fetches the channel configuration, moving `Initial -> Prepared`.
    ///
    /// Idempotent while preparing or prepared; illegal once connecting or
    /// beyond. On fetch failure the session reverts to `Initial`.
    pub async fn prepare(&self) -> Result<(), ParlorError> {
        let (brand_id, channel_id) = {
            let mut core = self.shared.core.lock().await;
            match core.ctx.chat_state {
                ChatState::Initial => {}
                ChatState::Preparing | ChatState::Prepared => return Ok(()),
                actual => {
                    return Err(ParlorError::IllegalChatState {
                        expected: ChatState::Initial,
                        actual,
                    })
                }
            }
            core.ctx.chat_state = ChatState::Preparing;
            (core.ctx.config.brand_id, core.ctx.config.channel_id.clone())
        };

        let fetched = retry(REST_ATTEMPTS, || {
            self.shared.rest.get_channel_configuration(brand_id, &channel_id)
        })
        .await;

        let mut core = self.shared.core.lock().await;
        match fetched {
            Ok(config) => {
                core.ctx.channel_config = Some(config);
                core.ctx.chat_state = ChatState::Prepared;
                drop(core);
                self.shared.emit(SessionEvent::ChatUpdated);
                Ok(())
            }
            Err(e) => {
                core.ctx.chat_state = ChatState::Initial;
                Err(e)
            }
        }
    }

    /// Opens the socket and authorizes the customer, moving
    /// `Prepared|Offline -> Connecting -> Connected`.
    ///
    /// Returns once the server confirms authorization. On any failure the
    /// connection is torn down and the session lands in `Offline`.
    pub async fn connect(&self) -> Result<(), ParlorError> {
        let (environment, config) = {
            let mut core = self.shared.core.lock().await;
            match core.ctx.chat_state {
                ChatState::Prepared | ChatState::Offline => {}
                actual => {
                    return Err(ParlorError::IllegalChatState {
                        expected: ChatState::Prepared,
                        actual,
                    })
                }
            }
            core.ctx.chat_state = ChatState::Connecting;
            // Each connection attempt gets a fresh destination identity.
            core.ctx.destination_id =
                Some(DestinationId(uuid::Uuid::new_v4().to_string()));
            if core.ctx.visitor_id.is_none() {
                core.ctx.visitor_id = Some(VisitorId(uuid::Uuid::new_v4().to_string()));
            }
            (
                core.ctx.config.environment.clone(),
                core.ctx.config.clone(),
            )
        };

        match self.establish(&environment, &config).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.teardown().await;
                let mut core = self.shared.core.lock().await;
                core.ctx.chat_state = ChatState::Offline;
                drop(core);
                self.shared.emit(SessionEvent::ChatUpdated);
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        environment: &Environment,
        config: &SessionConfig,
    ) -> Result<(), ParlorError> {
        // The configuration may have changed since prepare; re-fetch it.
        let channel_config = retry(REST_ATTEMPTS, || {
            self.shared
                .rest
                .get_channel_configuration(config.brand_id, &config.channel_id)
        })
        .await?;
        let auth_enabled = channel_config.is_authorization_enabled;
        {
            let mut core = self.shared.core.lock().await;
            core.ctx.channel_config = Some(channel_config);
        }

        let url = socket_url(environment, config);
        let (transport, events) = self.shared.socket_factory.connect(&url).await?;
        let cancel = events.cancel.clone();
        let dispatcher = tokio::spawn(dispatcher::run(Arc::clone(&self.shared), events));
        {
            let mut guard = self.shared.transport.lock().await;
            if let Some(stale) = guard.take() {
                stale.cancel.cancel();
                stale.dispatcher.abort();
            }
            *guard = Some(ConnectionHandle {
                transport,
                cancel,
                dispatcher,
            });
        }

        let (authorized_tx, authorized_rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            pending.authorize = Some(authorized_tx);
        }

        let (customer, visitor_id, token, had_customer) = {
            let mut core = self.shared.core.lock().await;
            let had_customer = core.ctx.customer.is_some();
            if !had_customer {
                core.ctx.customer = Some(CustomerIdentity::anonymous());
                debug!("minted anonymous customer identity");
            }
            (
                core.ctx.customer.clone(),
                core.ctx.visitor_id.clone(),
                core.ctx.access_token.clone(),
                had_customer,
            )
        };

        if let Some(visitor_id) = &visitor_id {
            let body = VisitorUpsert {
                customer_identity: customer,
                device_fingerprint: DeviceFingerprint {
                    device_token: config.device_token.clone(),
                    application_type: config.app_type.clone(),
                    os: config.os.clone(),
                    sdk_version: config.sdk_version.clone(),
                },
            };
            retry(REST_ATTEMPTS, || {
                self.shared
                    .rest
                    .upsert_visitor(config.brand_id, visitor_id, &body)
            })
            .await?;
        }

        // A fresh identity always authorizes. A returning identity on an
        // authorization channel needs a live token to reconnect; without one
        // the host must run the authorization flow again first. Anonymous
        // channels reconnect with a live token and otherwise re-authorize.
        let live_token = token.filter(|t| !t.is_expired());
        let reconnect = |token: AccessToken| -> Result<(EventType, Option<Value>), ParlorError> {
            Ok((
                EventType::ReconnectCustomer,
                Some(to_data(&AccessTokenData {
                    access_token: TokenRef { token: token.token },
                })?),
            ))
        };
        let authorize = || -> Result<(EventType, Option<Value>), ParlorError> {
            let data = if config.authorization_code.is_some() {
                Some(to_data(&AuthorizeCustomerData {
                    authorization_code: config.authorization_code.clone(),
                    code_verifier: config.code_verifier.clone(),
                })?)
            } else {
                None
            };
            Ok((EventType::AuthorizeCustomer, data))
        };
        let (event_type, data) = if !had_customer {
            authorize()?
        } else if auth_enabled {
            match live_token {
                Some(token) => reconnect(token)?,
                None => return Err(ParlorError::MissingAccessToken),
            }
        } else {
            match live_token {
                Some(token) => reconnect(token)?,
                None => authorize()?,
            }
        };

        self.send_event(event_type, data, Some(PendingKey::Authorize))
            .await?;
        await_response(authorized_rx).await
    }

    /// Tears the connection down, moving `Connected -> Closed`. A no-op in
    /// any other state; the local thread mirror is kept.
    pub async fn disconnect(&self) -> Result<(), ParlorError> {
        {
            let mut core = self.shared.core.lock().await;
            if core.ctx.chat_state != ChatState::Connected {
                return Ok(());
            }
            core.ctx.chat_state = ChatState::Closed;
        }
        self.teardown().await;
        Ok(())
    }

    /// Tears the connection down and erases all identity and local state,
    /// returning the session to `Initial`.
    pub async fn sign_out(&self) -> Result<(), ParlorError> {
        self.teardown().await;
        {
            let mut core = self.shared.core.lock().await;
            core.ctx.clear_identity();
            core.ctx.welcome_template = None;
            core.threads.clear();
            core.customer_fields = FieldBag::new();
            core.ctx.chat_state = ChatState::Initial;
        }
        self.shared.emit(SessionEvent::ChatUpdated);
        Ok(())
    }

    /// Asks the server for a fresh access token using the cached one.
    pub async fn refresh_token(&self) -> Result<(), ParlorError> {
        let token = {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            core.ctx
                .access_token
                .as_ref()
                .map(|t| t.token.clone())
                .ok_or(ParlorError::MissingAccessToken)?
        };
        let data = to_data(&AccessTokenData {
            access_token: TokenRef { token },
        })?;
        self.send_event(EventType::RefreshToken, Some(data), None)
            .await?;
        Ok(())
    }

    /// Executes a proactive trigger by id.
    pub async fn execute_trigger(&self, trigger_id: &str) -> Result<(), ParlorError> {
        let data = {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            if core.ctx.visitor_id.is_none() {
                return Err(ParlorError::MissingVisitorIdentity);
            }
            let customer = core
                .ctx
                .customer
                .clone()
                .ok_or(ParlorError::MissingCustomerIdentity)?;
            let destination = core
                .ctx
                .destination_id
                .clone()
                .ok_or_else(|| ParlorError::MissingParameter("destination id".into()))?;
            ExecuteTriggerData {
                trigger: TriggerRef {
                    id: trigger_id.into(),
                },
                destination: DestinationRef { id: destination.0 },
                consumer_identity: customer,
            }
        };
        self.send_event(EventType::ExecuteTrigger, Some(to_data(&data)?), None)
            .await?;
        Ok(())
    }

    /// Builds and sends one outbound envelope. When `pending_key` is given,
    /// the generated event id is indexed so a server error carrying it as
    /// `transactionId` fails the right waiter.
    pub(crate) async fn send_event(
        &self,
        event_type: EventType,
        data: Option<Value>,
        pending_key: Option<PendingKey>,
    ) -> Result<String, ParlorError> {
        let identity = {
            let core = self.shared.core.lock().await;
            EnvelopeIdentity {
                brand_id: core.ctx.config.brand_id,
                channel_id: core.ctx.config.channel_id.clone(),
                customer: core.ctx.customer.clone(),
                visitor_id: core.ctx.visitor_id.clone(),
            }
        };
        let envelope = build_envelope(&identity, event_type, data)?;

        if let Some(key) = pending_key {
            let mut pending = self.shared.pending.lock().await;
            pending.event_index.insert(envelope.event_id.clone(), key);
        }

        let transport = {
            let guard = self.shared.transport.lock().await;
            guard
                .as_ref()
                .map(|handle| Arc::clone(&handle.transport))
        }
        .ok_or(ParlorError::NotConnected)?;

        debug!(event_type = %event_type, event_id = %envelope.event_id, "sending event");
        transport.send(envelope.frame).await?;
        Ok(envelope.event_id)
    }

    async fn teardown(&self) {
        let handle = { self.shared.transport.lock().await.take() };
        if let Some(handle) = handle {
            handle.cancel.cancel();
            handle.transport.close().await;
            handle.dispatcher.abort();
        }
        self.shared.pending.lock().await.fail_all();
    }
}

/// Serializes an outbound payload to its envelope `data` value.
pub(crate) fn to_data<T: Serialize>(payload: &T) -> Result<Value, ParlorError> {
    serde_json::to_value(payload)
        .map_err(|e| ParlorError::Internal(format!("payload serialization failed: {e}")))
}
