// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The inbound dispatcher task: decodes frames in arrival order, applies
//! them to the session state, resolves pending request waiters, and emits
//! session events.
//!
//! Exactly one dispatcher runs per connection. Decode failures and unknown
//! event types are logged and dropped; they never fail the stream.

use std::sync::Arc;

use tracing::{debug, warn};

use parlor_core::{AccessToken, ChatState, ParlorError, ThreadId, ThreadState};
use parlor_protocol::events::{
    CustomerAuthorizedData, InboxAssigneeChangedData, MessageCreatedData, MessageReadChangedData,
    MoreMessagesLoadedData, OperationErrorDetail, ProactiveActionData, ProactiveActionType,
    ThreadArchivedData, ThreadListFetchedData, ThreadMetadataLoadedData, ThreadRecoveredData,
    ThreadUpdatedData, TokenRefreshedData, TypingData,
};
use parlor_protocol::{decode_event, ServerEvent};
use parlor_transport::SocketEvents;

use crate::events::SessionEvent;
use crate::pending::PendingKey;
use crate::session::{ChatSession, Shared};
use crate::threads::ChatThread;

/// Error codes that invalidate the whole session's authorization.
const AUTH_FAILURE_CODES: [&str; 3] = [
    "ReconnectFailed",
    "ConsumerReconnectFailed",
    "TokenRefreshFailed",
];

pub(crate) async fn run(shared: Arc<Shared>, mut events: SocketEvents) {
    loop {
        tokio::select! {
            _ = events.cancel.cancelled() => break,
            frame = events.frames.recv() => match frame {
                Some(frame) => handle_frame(&shared, &frame).await,
                None => {
                    handle_disconnect(&shared).await;
                    break;
                }
            }
        }
    }
    debug!("dispatcher stopped");
}

async fn handle_frame(shared: &Arc<Shared>, frame: &str) {
    let event = match decode_event(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            return;
        }
    };

    match event {
        ServerEvent::CustomerAuthorized(data) => on_authorized(shared, data).await,
        ServerEvent::TokenRefreshed(data) => on_token_refreshed(shared, data).await,
        ServerEvent::MessageCreated(data) => on_message_created(shared, data).await,
        ServerEvent::ThreadRecovered(data) => on_thread_recovered(shared, data).await,
        ServerEvent::ThreadListFetched(data) => on_thread_list(shared, data).await,
        ServerEvent::ThreadMetadataLoaded(data) => on_thread_metadata(shared, data).await,
        ServerEvent::MoreMessagesLoaded(data) => on_more_messages(shared, data).await,
        ServerEvent::MessageReadChanged(data) => on_read_changed(shared, data).await,
        ServerEvent::InboxAssigneeChanged(data) => on_assignee_changed(shared, data).await,
        ServerEvent::ThreadArchived(data) => on_thread_archived(shared, data).await,
        ServerEvent::ThreadUpdated(data) => on_thread_updated(shared, data).await,
        ServerEvent::AgentTypingStarted(data) => on_typing(shared, data, true).await,
        ServerEvent::AgentTypingEnded(data) => on_typing(shared, data, false).await,
        ServerEvent::FireProactiveAction(data) => on_proactive(shared, data).await,
        ServerEvent::OperationError(detail) => on_operation_error(shared, detail).await,
        ServerEvent::InternalServerError(fault) | ServerEvent::ServerError(fault) => {
            warn!(message = %fault.message, "server reported a failure");
            shared.emit(SessionEvent::Error(fault.message));
        }
        ServerEvent::Unknown { event_type } => {
            warn!(event_type, "dropping unknown event type");
        }
    }
}

async fn handle_disconnect(shared: &Arc<Shared>) {
    let was_live = {
        let mut core = shared.core.lock().await;
        match core.ctx.chat_state {
            ChatState::Connected | ChatState::Connecting => {
                core.ctx.chat_state = ChatState::Offline;
                true
            }
            _ => false,
        }
    };
    shared.pending.lock().await.fail_all();
    if was_live {
        warn!("socket dropped unexpectedly");
        shared.emit(SessionEvent::UnexpectedDisconnect);
        shared.emit(SessionEvent::ChatUpdated);
    }
}

async fn on_authorized(shared: &Arc<Shared>, data: CustomerAuthorizedData) {
    {
        let mut core = shared.core.lock().await;
        core.ctx.customer = Some(data.consumer_identity);
        if let Some(token) = data.access_token {
            core.ctx.access_token = Some(AccessToken::from_expires_in(token.token, token.expires_in));
        }
        core.ctx.chat_state = ChatState::Connected;
    }
    if let Some(tx) = shared.pending.lock().await.authorize.take() {
        let _ = tx.send(Ok(()));
    }
    shared.emit(SessionEvent::ChatUpdated);
}

async fn on_token_refreshed(shared: &Arc<Shared>, data: TokenRefreshedData) {
    let mut core = shared.core.lock().await;
    core.ctx.access_token = Some(AccessToken::from_expires_in(
        data.access_token.token,
        data.access_token.expires_in,
    ));
    drop(core);
    shared.emit(SessionEvent::ChatUpdated);
}

async fn on_message_created(shared: &Arc<Shared>, data: MessageCreatedData) {
    let tid = data.thread.id_on_external_platform.clone();
    let added = {
        let mut guard = shared.core.lock().await;
        let core = &mut *guard;
        if let Some(contact) = &data.contact {
            core.ctx.contact_id = Some(contact.id.clone());
        }
        let thread = core.threads.get_or_insert_with(&tid, || {
            ChatThread::ready(tid.clone(), data.thread.thread_name.clone())
        });
        // The server echo of a first message promotes a pending thread.
        thread.state = ThreadState::Ready;
        if let Some(contact) = &data.contact {
            thread.contact_id = Some(contact.id.clone());
        }
        thread.append_new([data.message.clone()])
    };
    if added > 0 {
        shared.emit(SessionEvent::MessageCreated {
            thread_id: tid.clone(),
            message: data.message,
        });
    }
    shared.emit(SessionEvent::ThreadUpdated(tid));
}

async fn on_thread_recovered(shared: &Arc<Shared>, data: ThreadRecoveredData) {
    let tid = data.thread.id_on_external_platform.clone();
    {
        let mut guard = shared.core.lock().await;
        let core = &mut *guard;
        let (contact_defs, customer_defs) = match core.ctx.channel_config() {
            Ok(config) => (
                config.contact_custom_fields.clone(),
                config.customer_custom_fields.clone(),
            ),
            Err(_) => (vec![], vec![]),
        };
        core.customer_fields
            .merge(data.customer_custom_fields, &customer_defs);
        if let Some(contact) = &data.contact {
            core.ctx.contact_id = Some(contact.id.clone());
        }

        let thread = core.threads.get_or_insert_with(&tid, || {
            ChatThread::ready(tid.clone(), data.thread.thread_name.clone())
        });
        thread.state = ThreadState::Ready;
        if data.thread.thread_name.is_some() {
            thread.name = data.thread.thread_name.clone();
        }
        // Merge, never replace: a recovery snapshot must not erase messages
        // already held locally.
        thread.append_new(data.messages);
        thread.messages.sort_by_key(|m| m.created_at);
        if data.messages_scroll_token.is_some() {
            thread.scroll_token = data.messages_scroll_token;
        }
        thread.has_more_messages = data.can_load_more_messages;
        if data.inbox_assignee.is_some() {
            thread.assigned_agent = data.inbox_assignee;
        }
        if let Some(contact) = &data.contact {
            thread.contact_id = Some(contact.id.clone());
        }
        thread.fields.merge(data.contact_custom_fields, &contact_defs);
    }

    {
        let mut pending = shared.pending.lock().await;
        let waiter = pending
            .recover
            .remove(&Some(tid.clone()))
            .or_else(|| pending.recover.remove(&None));
        if let Some(tx) = waiter {
            let _ = tx.send(Ok(tid.clone()));
        }
    }
    shared.emit(SessionEvent::ThreadUpdated(tid));
}

async fn on_thread_list(shared: &Arc<Shared>, data: ThreadListFetchedData) {
    let mut ids = Vec::with_capacity(data.threads.len());
    {
        let mut core = shared.core.lock().await;
        for tref in data.threads {
            let id = tref.id_on_external_platform;
            core.threads
                .insert(ChatThread::ready(id.clone(), tref.thread_name));
            ids.push(id);
        }
    }
    if let Some(tx) = shared.pending.lock().await.thread_list.take() {
        let _ = tx.send(Ok(ids));
    }
}

async fn on_thread_metadata(shared: &Arc<Shared>, data: ThreadMetadataLoadedData) {
    let tid = match data.last_message.as_ref().map(|m| m.thread_id.clone()) {
        Some(tid) => tid,
        None => {
            // No thread reference in the payload; route to the sole waiter.
            // With several in flight the response cannot be attributed, so
            // every waiter fails rather than leaving one awaiting forever.
            let mut pending = shared.pending.lock().await;
            let waiting: Vec<ThreadId> = pending.metadata.keys().cloned().collect();
            match waiting.as_slice() {
                [tid] => tid.clone(),
                [] => {
                    warn!("unroutable thread metadata event");
                    return;
                }
                _ => {
                    warn!("unroutable thread metadata event, failing pending loads");
                    for tid in waiting {
                        pending.fail(
                            &PendingKey::Metadata(tid),
                            ParlorError::InvalidData(
                                "thread metadata response carried no thread reference".into(),
                            ),
                        );
                    }
                    return;
                }
            }
        }
    };

    {
        let mut core = shared.core.lock().await;
        let thread = core
            .threads
            .get_or_insert_with(&tid, || ChatThread::ready(tid.clone(), None));
        if thread.messages.is_empty() {
            if let Some(message) = data.last_message {
                thread.append_new([message]);
            }
        }
        if data.owner_assignee.is_some() {
            thread.assigned_agent = data.owner_assignee;
        }
    }
    if let Some(tx) = shared.pending.lock().await.metadata.remove(&tid) {
        let _ = tx.send(Ok(()));
    }
}

async fn on_more_messages(shared: &Arc<Shared>, data: MoreMessagesLoadedData) {
    let tid = match data.messages.first().map(|m| m.thread_id.clone()) {
        Some(tid) => tid,
        None => {
            let pending = shared.pending.lock().await;
            let mut keys = pending.load_more.keys();
            match (keys.next().cloned(), keys.next()) {
                (Some(tid), None) => tid,
                _ => {
                    warn!("unroutable more-messages event");
                    return;
                }
            }
        }
    };

    let added = {
        let mut core = shared.core.lock().await;
        let Some(thread) = core.threads.get_mut(&tid) else {
            warn!(thread_id = %tid, "more messages for an unknown thread");
            return;
        };
        let added = thread.prepend_new(data.messages.clone());
        thread.has_more_messages = data.scroll_token.is_some() && !data.messages.is_empty();
        thread.scroll_token = data.scroll_token;
        added
    };
    if let Some(tx) = shared.pending.lock().await.load_more.remove(&tid) {
        let _ = tx.send(Ok(added));
    }
    shared.emit(SessionEvent::ThreadUpdated(tid));
}

async fn on_read_changed(shared: &Arc<Shared>, data: MessageReadChangedData) {
    let tid = data.message.thread_id.clone();
    {
        let mut core = shared.core.lock().await;
        let Some(thread) = core.threads.get_mut(&tid) else {
            return;
        };
        if let Some(message) = thread.messages.iter_mut().find(|m| m.id == data.message.id) {
            message.user_statistics = data.message.user_statistics.clone();
        }
    }
    shared.emit(SessionEvent::ThreadUpdated(tid));
}

async fn on_assignee_changed(shared: &Arc<Shared>, data: InboxAssigneeChangedData) {
    let tid = data.thread.id_on_external_platform.clone();
    {
        let mut core = shared.core.lock().await;
        let Some(thread) = core.threads.get_mut(&tid) else {
            return;
        };
        thread.assigned_agent = data.inbox_assignee.clone();
    }
    shared.emit(SessionEvent::AssigneeChanged {
        thread_id: tid,
        agent: data.inbox_assignee,
    });
}

async fn on_thread_archived(shared: &Arc<Shared>, data: ThreadArchivedData) {
    // Archive acks carry no reliable thread reference; the oldest pending
    // archive waiter owns this ack.
    let waiter = shared.pending.lock().await.archive.pop_front();
    let tid = match (&waiter, data.thread) {
        (Some((tid, _)), _) => Some(tid.clone()),
        (None, Some(tref)) => Some(tref.id_on_external_platform),
        (None, None) => None,
    };

    if let Some(tid) = &tid {
        let mut core = shared.core.lock().await;
        if let Some(thread) = core.threads.get_mut(tid) {
            thread.state = ThreadState::Closed;
        }
    }
    if let Some((_, tx)) = waiter {
        let _ = tx.send(Ok(()));
    }
    if tid.is_some() {
        shared.emit(SessionEvent::ThreadsUpdated);
    }
}

async fn on_thread_updated(shared: &Arc<Shared>, data: ThreadUpdatedData) {
    let tid = data.thread.id_on_external_platform.clone();
    {
        let mut core = shared.core.lock().await;
        let Some(thread) = core.threads.get_mut(&tid) else {
            return;
        };
        if data.thread.thread_name.is_some() {
            thread.name = data.thread.thread_name;
        }
    }
    shared.emit(SessionEvent::ThreadUpdated(tid));
}

async fn on_typing(shared: &Arc<Shared>, data: TypingData, started: bool) {
    shared.emit(SessionEvent::AgentTyping {
        thread_id: data.thread.id_on_external_platform,
        started,
    });
}

async fn on_proactive(shared: &Arc<Shared>, data: ProactiveActionData) {
    match data.action_type {
        ProactiveActionType::WelcomeMessage => {
            let Some(template) = data.data.map(|d| d.content.body_text) else {
                warn!(action_id = %data.action_id, "welcome action without content");
                return;
            };
            let awaiting = {
                let mut core = shared.core.lock().await;
                core.ctx.welcome_template = Some(template.clone());
                core.threads
                    .all()
                    .iter()
                    .find(|t| t.awaiting_welcome)
                    .map(|t| t.id.clone())
            };
            if let Some(tid) = awaiting {
                ChatSession::from_shared(Arc::clone(shared))
                    .deliver_welcome(&tid, &template)
                    .await;
            }
        }
        ProactiveActionType::CustomPopupBox => {
            let (headline, body) = match data.data {
                Some(content) => (
                    content.content.headline_text,
                    Some(content.content.body_text),
                ),
                None => (None, None),
            };
            shared.emit(SessionEvent::ProactiveAction {
                action_id: data.action_id,
                headline,
                body,
            });
        }
    }
}

async fn on_operation_error(shared: &Arc<Shared>, detail: OperationErrorDetail) {
    let make_err = || ParlorError::Server {
        code: detail.error_code.clone(),
        transaction_id: detail.transaction_id.clone(),
        message: detail.error_message.clone(),
    };
    warn!(code = %detail.error_code, transaction_id = ?detail.transaction_id, "server operation error");

    let mut handled = false;
    if let Some(transaction_id) = &detail.transaction_id {
        let mut pending = shared.pending.lock().await;
        if let Some(key) = pending.event_index.remove(transaction_id) {
            pending.fail(&key, make_err());
            handled = true;
        }
    }

    if AUTH_FAILURE_CODES.contains(&detail.error_code.as_str()) {
        {
            let mut core = shared.core.lock().await;
            core.ctx.chat_state = ChatState::Offline;
        }
        shared
            .pending
            .lock()
            .await
            .fail(&PendingKey::Authorize, make_err());
        shared.emit(SessionEvent::Error(detail.error_code.clone()));
        shared.emit(SessionEvent::ChatUpdated);
        return;
    }

    if !handled && detail.error_code == "RecoveringThreadFailed" {
        let mut pending = shared.pending.lock().await;
        let key = {
            let mut keys = pending.recover.keys();
            match (keys.next().cloned(), keys.next()) {
                (Some(key), None) => Some(key),
                _ => None,
            }
        };
        if let Some(key) = key {
            pending.fail(&PendingKey::Recover(key), make_err());
            handled = true;
        }
    }

    if !handled {
        shared.emit(SessionEvent::Error(detail.error_code));
    }
}
