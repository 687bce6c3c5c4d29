// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread operations: create, recover, archive, paginate, send, and the
//! per-thread side channels (read receipts, typing, rename, custom fields).
//!
//! Locking discipline: the session lock is held only to validate state and
//! snapshot what the wire payload needs, never across uploads or sends.

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::warn;

use parlor_core::{
    Attachment, AttachmentUpload, CustomField, Message, MessageContent, MessageId, ParlorError,
    ThreadId, ThreadState, UserStatistics,
};
use parlor_protocol::payloads::{
    LoadMoreMessagesData, RecoverThreadData, SendMessageData, SetCustomFieldsData, ThreadOnlyData,
    ThreadRefOut,
};
use parlor_protocol::EventType;

use crate::events::SessionEvent;
use crate::pending::{await_response, PendingKey};
use crate::session::{to_data, ChatSession};
use crate::threads::ChatThread;
use crate::welcome::resolve_template;

/// A message composed by the host application, before it has a server echo.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub text: String,
    pub attachments: Vec<AttachmentUpload>,
    /// Set when the message is a postback reply (quick-reply button press).
    pub postback: Option<String>,
}

impl OutboundMessage {
    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

enum ArchiveMode {
    Local,
    Remote,
}

impl ChatSession {
    /// Creates a new local thread in the `Pending` state.
    ///
    /// Fails when the channel allows a single thread and one is already
    /// open, or when required pre-chat survey fields are missing from
    /// `custom_fields`. If the welcome template is already known it is
    /// delivered into the new thread immediately; otherwise delivery is
    /// deferred until the template arrives.
    pub async fn create_thread(
        &self,
        custom_fields: Vec<CustomField>,
    ) -> Result<ThreadId, ParlorError> {
        let (id, template) = {
            let mut core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let config = core.ctx.channel_config()?.clone();

            if !config.settings.has_multiple_threads_per_end_user
                && core.threads.has_open_thread()
            {
                return Err(ParlorError::UnsupportedChannelConfig(
                    "channel allows a single thread and one is already open".into(),
                ));
            }

            let missing: Vec<String> = config
                .required_pre_chat_idents()
                .into_iter()
                .filter(|ident| {
                    !custom_fields
                        .iter()
                        .any(|f| f.ident == *ident && !f.value.is_empty())
                })
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(ParlorError::MissingPreChatCustomFields { idents: missing });
            }

            // Pre-chat fields may be defined by the survey alone.
            let mut definitions = config.contact_custom_fields.clone();
            if let Some(survey) = &config.pre_chat_survey {
                definitions.extend(survey.fields.iter().cloned());
            }

            let id = ThreadId::generate();
            let mut thread = ChatThread::pending(id.clone());
            thread.fields.merge(custom_fields, &definitions);

            let template = core.ctx.welcome_template.clone();
            if template.is_none() && config.settings.is_proactive_chat_enabled {
                thread.awaiting_welcome = true;
            }
            core.threads.insert(thread);
            (id, template)
        };

        self.shared.emit(SessionEvent::ThreadsUpdated);
        if let Some(template) = template {
            self.deliver_welcome(&id, &template).await;
        }
        Ok(id)
    }

    /// Loads thread content from the server.
    ///
    /// With a thread id, recovers that thread; a thread that only exists
    /// locally (still `Pending`) needs no server round trip. Without an id,
    /// multi-thread channels fetch the full thread list plus metadata and
    /// single-thread channels recover their sole thread.
    pub async fn load_thread(&self, id: Option<ThreadId>) -> Result<(), ParlorError> {
        enum Action {
            Surfaced,
            Recover(Option<ThreadId>),
            LoadAll,
        }

        let action = {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let multi = core.ctx.multi_thread()?;
            match &id {
                Some(tid) => match core.threads.get(tid) {
                    Some(t) if t.state == ThreadState::Pending => Action::Surfaced,
                    _ => Action::Recover(Some(tid.clone())),
                },
                None if multi => Action::LoadAll,
                None => Action::Recover(None),
            }
        };

        match action {
            Action::Surfaced => Ok(()),
            Action::Recover(target) => self.recover_thread(target).await.map(|_| ()),
            Action::LoadAll => self.load_threads().await,
        }
    }

    async fn recover_thread(
        &self,
        target: Option<ThreadId>,
    ) -> Result<ThreadId, ParlorError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            pending.recover.insert(target.clone(), tx);
        }

        let data = RecoverThreadData {
            thread: target.clone().map(ThreadRefOut::id),
        };
        if let Err(e) = self
            .send_event(
                EventType::RecoverThread,
                Some(to_data(&data)?),
                Some(PendingKey::Recover(target.clone())),
            )
            .await
        {
            self.shared.pending.lock().await.recover.remove(&target);
            return Err(e);
        }
        await_response(rx).await
    }

    /// Fetches the thread list, then the metadata of every listed thread.
    async fn load_threads(&self) -> Result<(), ParlorError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            pending.thread_list = Some(tx);
        }
        if let Err(e) = self
            .send_event(EventType::FetchThreadList, None, Some(PendingKey::ThreadList))
            .await
        {
            self.shared.pending.lock().await.thread_list = None;
            return Err(e);
        }
        let ids = await_response(rx).await?;

        let mut receivers = Vec::with_capacity(ids.len());
        for id in ids {
            let (tx, rx) = oneshot::channel();
            {
                let mut pending = self.shared.pending.lock().await;
                pending.metadata.insert(id.clone(), tx);
            }
            let data = ThreadOnlyData {
                thread: ThreadRefOut::id(id.clone()),
            };
            if let Err(e) = self
                .send_event(
                    EventType::LoadThreadMetadata,
                    Some(to_data(&data)?),
                    Some(PendingKey::Metadata(id.clone())),
                )
                .await
            {
                self.shared.pending.lock().await.metadata.remove(&id);
                return Err(e);
            }
            receivers.push(rx);
        }

        let results = futures::future::join_all(receivers.into_iter().map(await_response)).await;
        for result in results {
            result?;
        }

        self.shared.emit(SessionEvent::ThreadsUpdated);
        Ok(())
    }

    /// Archives a thread.
    ///
    /// A `Pending` thread exists only locally and closes without a server
    /// round trip. A `Ready` thread transitions only once the server
    /// acknowledges the archive.
    pub async fn archive_thread(&self, id: &ThreadId) -> Result<(), ParlorError> {
        let mode = {
            let mut core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            if !core.ctx.multi_thread()? {
                return Err(ParlorError::UnsupportedChannelConfig(
                    "single-thread channels cannot archive threads".into(),
                ));
            }
            let thread = core
                .threads
                .get_mut(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            match thread.state {
                ThreadState::Closed => {
                    return Err(ParlorError::IllegalThreadState {
                        expected: ThreadState::Ready,
                        actual: ThreadState::Closed,
                    })
                }
                ThreadState::Pending => {
                    thread.state = ThreadState::Closed;
                    ArchiveMode::Local
                }
                ThreadState::Ready => ArchiveMode::Remote,
            }
        };

        match mode {
            ArchiveMode::Local => {
                self.shared.emit(SessionEvent::ThreadsUpdated);
                Ok(())
            }
            ArchiveMode::Remote => {
                let (tx, rx) = oneshot::channel();
                {
                    let mut pending = self.shared.pending.lock().await;
                    pending.archive.push_back((id.clone(), tx));
                }
                let data = ThreadOnlyData {
                    thread: ThreadRefOut::id(id.clone()),
                };
                if let Err(e) = self
                    .send_event(
                        EventType::ArchiveThread,
                        Some(to_data(&data)?),
                        Some(PendingKey::Archive(id.clone())),
                    )
                    .await
                {
                    let mut pending = self.shared.pending.lock().await;
                    if let Some(pos) = pending.archive.iter().position(|(tid, _)| tid == id) {
                        pending.archive.remove(pos);
                    }
                    return Err(e);
                }
                await_response(rx).await
            }
        }
    }

    /// Loads the next older page of messages, returning how many new
    /// messages were merged.
    ///
    /// Fails with [`ParlorError::NoMoreMessages`] when the server reported
    /// no further pages, and with [`ParlorError::InvalidOldestDate`] when
    /// the thread holds no messages to paginate from.
    pub async fn load_more_messages(&self, id: &ThreadId) -> Result<usize, ParlorError> {
        let (scroll_token, oldest) = {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let thread = core
                .threads
                .get(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            if !thread.has_more_messages {
                return Err(ParlorError::NoMoreMessages);
            }
            let oldest = thread
                .oldest_message_at()
                .ok_or(ParlorError::InvalidOldestDate)?;
            let token = thread.scroll_token.clone().ok_or(ParlorError::NoMoreMessages)?;
            (token, oldest)
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            pending.load_more.insert(id.clone(), tx);
        }
        let data = LoadMoreMessagesData {
            thread: ThreadRefOut::id(id.clone()),
            scroll_token,
            oldest_message_datetime: oldest,
        };
        if let Err(e) = self
            .send_event(
                EventType::LoadMoreMessages,
                Some(to_data(&data)?),
                Some(PendingKey::LoadMore(id.clone())),
            )
            .await
        {
            self.shared.pending.lock().await.load_more.remove(id);
            return Err(e);
        }
        await_response(rx).await
    }

    /// Sends a message into a thread.
    ///
    /// Attachments are uploaded first, sequentially; any upload failure
    /// aborts the whole send. The message is echoed into the local timeline
    /// immediately; the server echo deduplicates by id.
    pub async fn send_message(
        &self,
        id: &ThreadId,
        outbound: OutboundMessage,
    ) -> Result<MessageId, ParlorError> {
        let (brand_id, channel_id, thread_name, device_token, contact_fields, customer_fields) = {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let thread = core
                .threads
                .get(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            if thread.state == ThreadState::Closed {
                return Err(ParlorError::IllegalThreadState {
                    expected: ThreadState::Ready,
                    actual: ThreadState::Closed,
                });
            }
            (
                core.ctx.config.brand_id,
                core.ctx.config.channel_id.clone(),
                thread.name.clone(),
                core.ctx.config.device_token.clone(),
                thread.fields.values(),
                core.customer_fields.values(),
            )
        };

        let mut attachments = Vec::with_capacity(outbound.attachments.len());
        for upload in &outbound.attachments {
            let url = self
                .shared
                .rest
                .upload_attachment(brand_id, &channel_id, upload)
                .await?;
            attachments.push(Attachment {
                url,
                file_name: upload.file_name.clone(),
                mime_type: upload.mime_type.clone(),
            });
        }

        let message_id = MessageId::generate();
        let content = match outbound.postback {
            Some(postback) => MessageContent::Postback {
                text: outbound.text,
                postback,
            },
            None => MessageContent::Text {
                text: outbound.text,
            },
        };

        let data = SendMessageData {
            thread: ThreadRefOut {
                id_on_external_platform: id.clone(),
                thread_name,
            },
            id_on_external_platform: message_id.clone(),
            message_content: content.clone(),
            attachments: attachments.clone(),
            contact_custom_fields: contact_fields,
            customer_custom_fields: customer_fields,
            device_token,
        };
        self.send_event(EventType::SendMessage, Some(to_data(&data)?), None)
            .await?;

        {
            let mut core = self.shared.core.lock().await;
            let customer = core.ctx.customer.clone();
            if let Some(thread) = core.threads.get_mut(id) {
                thread.append_new([Message {
                    id: message_id.clone(),
                    thread_id: id.clone(),
                    message_content: content,
                    direction: parlor_core::MessageDirection::ToAgent,
                    created_at: Utc::now(),
                    attachments,
                    author_user: None,
                    author_end_user_identity: customer,
                    user_statistics: UserStatistics::default(),
                }]);
            }
        }
        self.shared.emit(SessionEvent::ThreadUpdated(id.clone()));
        Ok(message_id)
    }

    /// Reports that the customer has seen the thread. A no-op for threads
    /// the server does not know about yet.
    pub async fn mark_thread_read(&self, id: &ThreadId) -> Result<(), ParlorError> {
        {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let thread = core
                .threads
                .get(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            match thread.state {
                ThreadState::Pending => return Ok(()),
                ThreadState::Closed => {
                    return Err(ParlorError::IllegalThreadState {
                        expected: ThreadState::Ready,
                        actual: ThreadState::Closed,
                    })
                }
                ThreadState::Ready => {}
            }
        }
        let data = ThreadOnlyData {
            thread: ThreadRefOut::id(id.clone()),
        };
        self.send_event(EventType::MessageSeenByCustomer, Some(to_data(&data)?), None)
            .await?;
        Ok(())
    }

    /// Reports the customer's typing state to the agent. Fire and forget.
    pub async fn report_typing(&self, id: &ThreadId, started: bool) -> Result<(), ParlorError> {
        {
            let core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            if core.threads.get(id).is_none() {
                return Err(ParlorError::InvalidData(format!("unknown thread {id}")));
            }
        }
        let event_type = if started {
            EventType::SenderTypingStarted
        } else {
            EventType::SenderTypingEnded
        };
        let data = ThreadOnlyData {
            thread: ThreadRefOut::id(id.clone()),
        };
        self.send_event(event_type, Some(to_data(&data)?), None).await?;
        Ok(())
    }

    /// Renames a thread. A `Pending` thread renames locally only; the name
    /// reaches the server with its first message.
    pub async fn update_thread_name(
        &self,
        id: &ThreadId,
        name: impl Into<String>,
    ) -> Result<(), ParlorError> {
        let name = name.into();
        let remote = {
            let mut core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let thread = core
                .threads
                .get_mut(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            match thread.state {
                ThreadState::Closed => {
                    return Err(ParlorError::IllegalThreadState {
                        expected: ThreadState::Ready,
                        actual: ThreadState::Closed,
                    })
                }
                ThreadState::Pending => {
                    thread.name = Some(name.clone());
                    false
                }
                ThreadState::Ready => {
                    thread.name = Some(name.clone());
                    true
                }
            }
        };

        if remote {
            let data = ThreadOnlyData {
                thread: ThreadRefOut {
                    id_on_external_platform: id.clone(),
                    thread_name: Some(name),
                },
            };
            self.send_event(EventType::UpdateThread, Some(to_data(&data)?), None)
                .await?;
        }
        self.shared.emit(SessionEvent::ThreadUpdated(id.clone()));
        Ok(())
    }

    /// Sets contact-scoped custom fields on a thread, locally and remotely.
    pub async fn set_contact_custom_fields(
        &self,
        id: &ThreadId,
        fields: Vec<CustomField>,
    ) -> Result<(), ParlorError> {
        {
            let mut core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let definitions = core.ctx.channel_config()?.contact_custom_fields.clone();
            let thread = core
                .threads
                .get_mut(id)
                .ok_or_else(|| ParlorError::InvalidData(format!("unknown thread {id}")))?;
            thread.fields.merge(fields.clone(), &definitions);
        }
        let data = SetCustomFieldsData {
            thread: Some(ThreadRefOut::id(id.clone())),
            custom_fields: fields,
        };
        self.send_event(EventType::SetContactCustomFields, Some(to_data(&data)?), None)
            .await?;
        self.shared.emit(SessionEvent::ThreadUpdated(id.clone()));
        Ok(())
    }

    /// Sets customer-scoped custom fields, locally and remotely.
    pub async fn set_customer_custom_fields(
        &self,
        fields: Vec<CustomField>,
    ) -> Result<(), ParlorError> {
        {
            let mut core = self.shared.core.lock().await;
            core.ctx.require_connected()?;
            let definitions = core.ctx.channel_config()?.customer_custom_fields.clone();
            core.customer_fields.merge(fields.clone(), &definitions);
        }
        let data = SetCustomFieldsData {
            thread: None,
            custom_fields: fields,
        };
        self.send_event(EventType::SetCustomerCustomFields, Some(to_data(&data)?), None)
            .await?;
        self.shared.emit(SessionEvent::ChatUpdated);
        Ok(())
    }

    /// Resolves the welcome template against the thread's fields, sends the
    /// result as the thread's first outbound message, and echoes it into the
    /// local timeline (the server echo deduplicates by id).
    pub(crate) async fn deliver_welcome(&self, id: &ThreadId, template: &str) {
        let (message, data) = {
            let mut core = self.shared.core.lock().await;
            let customer = core.ctx.customer.clone();
            let customer_fields = core.customer_fields.clone();
            let device_token = core.ctx.config.device_token.clone();
            let Some(thread) = core.threads.get_mut(id) else {
                return;
            };
            thread.awaiting_welcome = false;
            let text = resolve_template(
                template,
                &thread.fields,
                &customer_fields,
                customer.as_ref(),
            );
            if text.is_empty() {
                return;
            }
            let content = MessageContent::Text { text };
            let message = Message {
                id: MessageId::generate(),
                thread_id: id.clone(),
                message_content: content.clone(),
                direction: parlor_core::MessageDirection::ToClient,
                created_at: Utc::now(),
                attachments: vec![],
                author_user: None,
                author_end_user_identity: None,
                user_statistics: UserStatistics::default(),
            };
            let data = SendMessageData {
                thread: ThreadRefOut {
                    id_on_external_platform: id.clone(),
                    thread_name: thread.name.clone(),
                },
                id_on_external_platform: message.id.clone(),
                message_content: content,
                attachments: vec![],
                contact_custom_fields: thread.fields.values(),
                customer_custom_fields: customer_fields.values(),
                device_token,
            };
            thread.append_new([message.clone()]);
            (message, data)
        };
        if let Err(e) = self.send_welcome_frame(&data).await {
            warn!(thread = %id, error = %e, "failed to send welcome message");
        }
        self.shared.emit(SessionEvent::MessageCreated {
            thread_id: id.clone(),
            message,
        });
        self.shared.emit(SessionEvent::ThreadUpdated(id.clone()));
    }

    async fn send_welcome_frame(&self, data: &SendMessageData) -> Result<(), ParlorError> {
        self.send_event(EventType::SendMessage, Some(to_data(data)?), None)
            .await?;
        Ok(())
    }
}
