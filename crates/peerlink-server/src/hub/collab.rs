//! Note collaboration handlers.
//!
//! Updates are fanned out to the other members as they arrive. Nothing is
//! merged or reordered here; concurrent edits resolve in the browsers.

use chrono::Utc;
use peerlink_shared::protocol::ServerEvent;
use peerlink_shared::{ConnId, UserId};
use serde_json::Value;
use tracing::{debug, info};

use super::context::ConnectionContext;
use super::Hub;

impl Hub {
    pub(super) async fn note_join(
        &self,
        ctx: &mut ConnectionContext,
        note_slug: String,
        user_id: UserId,
        username: String,
    ) {
        if let Some(previous) = ctx.note_slug.take() {
            if previous != note_slug {
                self.leave_session(&previous, ctx.id).await;
            }
        }

        let (member, everyone) =
            self.inner
                .sessions
                .write()
                .await
                .join(&note_slug, ctx.id, user_id, username);

        info!(
            note = %note_slug,
            conn = %ctx.id,
            members = everyone.len(),
            "Collaborator joined note"
        );
        ctx.note_slug = Some(note_slug);

        // The joiner gets the same announcement as everyone else.
        let event = ServerEvent::NoteUserJoined {
            user_id: member.user_id,
            username: member.username,
            socket_id: ctx.id,
            color: member.color,
            timestamp: Utc::now(),
        };
        self.deliver_many(&everyone, event).await;
    }

    pub(super) async fn note_content_update(
        &self,
        ctx: &ConnectionContext,
        note_slug: String,
        content: Value,
        user_id: UserId,
    ) {
        let Some(targets) = self.inner.sessions.read().await.others(&note_slug, ctx.id) else {
            debug!(note = %note_slug, conn = %ctx.id, "Content update from non-member, dropped");
            return;
        };

        let event = ServerEvent::NoteContentChanged {
            content,
            user_id,
            socket_id: ctx.id,
            timestamp: Utc::now(),
        };
        self.deliver_many(&targets, event).await;
    }

    pub(super) async fn note_cursor_update(
        &self,
        ctx: &ConnectionContext,
        note_slug: String,
        user_id: UserId,
        position: Value,
        selection: Value,
    ) {
        let found = {
            let sessions = self.inner.sessions.read().await;
            sessions
                .others(&note_slug, ctx.id)
                .zip(sessions.member(&note_slug, ctx.id).map(|m| m.color.clone()))
        };
        let Some((targets, color)) = found else {
            return;
        };

        let event = ServerEvent::NoteCursorChanged {
            user_id,
            socket_id: ctx.id,
            position,
            selection,
            color,
        };
        self.deliver_many(&targets, event).await;
    }

    pub(super) async fn note_typing(
        &self,
        ctx: &ConnectionContext,
        note_slug: String,
        user_id: UserId,
        is_typing: bool,
    ) {
        let Some(targets) = self.inner.sessions.read().await.others(&note_slug, ctx.id) else {
            return;
        };

        let event = ServerEvent::NoteUserTyping {
            user_id,
            socket_id: ctx.id,
            is_typing,
        };
        self.deliver_many(&targets, event).await;
    }

    pub(super) async fn note_leave(&self, ctx: &mut ConnectionContext, note_slug: String) {
        self.leave_session(&note_slug, ctx.id).await;
        if ctx.note_slug.as_deref() == Some(note_slug.as_str()) {
            ctx.note_slug = None;
        }
    }

    /// Remove `conn` from a session and tell whoever is left.
    pub(super) async fn leave_session(&self, note_slug: &str, conn: ConnId) {
        let left = self.inner.sessions.write().await.leave(note_slug, conn);
        let Some((member, remaining)) = left else {
            return;
        };

        info!(note = %note_slug, conn = %conn, remaining = remaining.len(), "Collaborator left note");
        self.deliver_many(
            &remaining,
            ServerEvent::NoteUserLeft {
                user_id: member.user_id,
                socket_id: conn,
            },
        )
        .await;
    }
}
