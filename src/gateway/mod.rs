pub mod events;
pub mod ws;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::gateway::events::ServerEvent;

/// Outbound queue depth per session before backpressure kicks in.
pub const OUTBOUND_BUFFER: usize = 32;

/// Delivery to a backed-up session is retried this many times with doubling
/// backoff, then surfaced as failed. Never retried silently beyond the cap.
const SEND_RETRY_LIMIT: u32 = 3;
const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// A typing flag that is not refreshed within this window is expired on the
/// sender's behalf; senders that disconnect mid-keystroke never leave a
/// stuck indicator.
pub const TYPING_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct SessionHandle {
    participant_id: i64,
    sender: mpsc::Sender<ServerEvent>,
}

/// In-memory registry of live sessions, their room memberships, and typing
/// state. Injected through `AppState`; nothing here is process-global, and
/// nothing here survives a disconnect.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    participant_sessions: DashMap<i64, Vec<Uuid>>,
    room_sessions: DashMap<i64, Vec<Uuid>>,
    typing: DashMap<(i64, Uuid), Instant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, participant_id: i64, sender: mpsc::Sender<ServerEvent>) {
        self.sessions.insert(
            session_id,
            SessionHandle {
                participant_id,
                sender,
            },
        );
        self.participant_sessions
            .entry(participant_id)
            .or_default()
            .push(session_id);
        tracing::info!("session {session_id} registered for participant {participant_id}");
    }

    /// Discard the session and everything bound to it. Returns the rooms in
    /// which the session was still flagged as typing so the caller can
    /// broadcast the stop on its behalf.
    pub fn unregister(&self, session_id: &Uuid) -> Vec<i64> {
        let handle = self.sessions.remove(session_id);

        if let Some((_, handle)) = &handle {
            if let Some(mut sessions) = self.participant_sessions.get_mut(&handle.participant_id) {
                sessions.retain(|id| id != session_id);
            }
            self.participant_sessions
                .remove_if(&handle.participant_id, |_, sessions| sessions.is_empty());
        }

        for mut entry in self.room_sessions.iter_mut() {
            entry.value_mut().retain(|id| id != session_id);
        }
        self.room_sessions.retain(|_, sessions| !sessions.is_empty());

        let mut typing_rooms = Vec::new();
        self.typing.retain(|(room_id, typist), _| {
            if typist == session_id {
                typing_rooms.push(*room_id);
                false
            } else {
                true
            }
        });

        tracing::info!("session {session_id} unregistered");
        typing_rooms
    }

    pub fn participant_of(&self, session_id: &Uuid) -> Option<i64> {
        self.sessions.get(session_id).map(|handle| handle.participant_id)
    }

    pub fn join_room(&self, session_id: Uuid, chat_room_id: i64) {
        let mut sessions = self.room_sessions.entry(chat_room_id).or_default();
        if !sessions.contains(&session_id) {
            sessions.push(session_id);
        }
    }

    /// Returns true if the session had been typing in the room, so the
    /// caller can broadcast the implicit stop.
    pub fn leave_room(&self, session_id: &Uuid, chat_room_id: i64) -> bool {
        if let Some(mut sessions) = self.room_sessions.get_mut(&chat_room_id) {
            sessions.retain(|id| id != session_id);
        }
        self.room_sessions
            .remove_if(&chat_room_id, |_, sessions| sessions.is_empty());
        self.typing.remove(&(chat_room_id, *session_id)).is_some()
    }

    pub fn is_member(&self, session_id: &Uuid, chat_room_id: i64) -> bool {
        self.room_sessions
            .get(&chat_room_id)
            .map(|sessions| sessions.contains(session_id))
            .unwrap_or(false)
    }

    /// Returns true only on the transition from idle to typing; refreshes
    /// just bump the expiry instant.
    pub fn typing_start(&self, session_id: Uuid, chat_room_id: i64) -> bool {
        self.typing
            .insert((chat_room_id, session_id), Instant::now())
            .is_none()
    }

    pub fn typing_stop(&self, session_id: &Uuid, chat_room_id: i64) -> bool {
        self.typing.remove(&(chat_room_id, *session_id)).is_some()
    }

    /// Drop typing flags idle past the timeout, returning (room, session)
    /// pairs for the stopped-typing broadcasts.
    pub fn expire_stale_typing(&self, idle_timeout: Duration) -> Vec<(i64, Uuid)> {
        let mut expired = Vec::new();
        self.typing.retain(|(room_id, session_id), refreshed| {
            if refreshed.elapsed() >= idle_timeout {
                expired.push((*room_id, *session_id));
                false
            } else {
                true
            }
        });
        expired
    }

    /// Bounded-retry push to one session. A full queue is retried with
    /// doubling backoff up to the cap, then reported as failed.
    pub async fn send_to_session(&self, session_id: &Uuid, event: ServerEvent) -> bool {
        let Some(sender) = self
            .sessions
            .get(session_id)
            .map(|handle| handle.sender.clone())
        else {
            return false;
        };

        let mut backoff = SEND_RETRY_BACKOFF;
        for attempt in 0..=SEND_RETRY_LIMIT {
            match sender.try_send(event.clone()) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if attempt == SEND_RETRY_LIMIT {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }

        tracing::warn!("dropping event for session {session_id}: outbound queue full");
        false
    }

    /// Fan one event out to every session joined to the room.
    pub async fn broadcast_to_room(
        &self,
        chat_room_id: i64,
        exclude: Option<&Uuid>,
        event: ServerEvent,
    ) -> usize {
        let targets: Vec<Uuid> = self
            .room_sessions
            .get(&chat_room_id)
            .map(|sessions| {
                sessions
                    .iter()
                    .filter(|id| exclude != Some(*id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for session_id in targets {
            if self.send_to_session(&session_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver to every session belonging to the participant (they may be
    /// connected from several devices, or not at all).
    pub async fn send_to_participant(&self, participant_id: i64, event: ServerEvent) -> usize {
        let targets: Vec<Uuid> = self
            .participant_sessions
            .get(&participant_id)
            .map(|sessions| sessions.clone())
            .unwrap_or_default();

        let mut delivered = 0;
        for session_id in targets {
            if self.send_to_session(&session_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Background task that expires typing indicators whose senders went quiet
/// without an explicit stop.
pub async fn run_typing_sweeper(registry: Arc<ConnectionRegistry>) {
    let mut interval = tokio::time::interval(TYPING_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        for (chat_room_id, session_id) in registry.expire_stale_typing(TYPING_IDLE_TIMEOUT) {
            let Some(participant_id) = registry.participant_of(&session_id) else {
                continue;
            };
            tracing::debug!(
                "expiring typing indicator for participant {participant_id} in room {chat_room_id}"
            );
            registry
                .broadcast_to_room(
                    chat_room_id,
                    Some(&session_id),
                    ServerEvent::UserStoppedTyping {
                        chat_room_id: chat_room_id.to_string(),
                        participant_id: participant_id.to_string(),
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        registry: &ConnectionRegistry,
        participant_id: i64,
    ) -> (Uuid, mpsc::Receiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        registry.register(session_id, participant_id, tx);
        (session_id, rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members_and_skips_originator() {
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = connect(&registry, 1);
        let (bob, mut bob_rx) = connect(&registry, 2);
        let (_carol, mut carol_rx) = connect(&registry, 3);

        registry.join_room(alice, 42);
        registry.join_room(bob, 42);

        let delivered = registry
            .broadcast_to_room(
                42,
                Some(&alice),
                ServerEvent::UserTyping {
                    chat_room_id: "42".to_string(),
                    participant_id: "1".to_string(),
                },
            )
            .await;

        assert_eq!(delivered, 1);
        assert!(bob_rx.try_recv().is_ok());
        assert!(alice_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_participant_hits_every_session() {
        let registry = ConnectionRegistry::new();
        let (_phone, mut phone_rx) = connect(&registry, 1);
        let (_laptop, mut laptop_rx) = connect(&registry, 1);
        let (_other, mut other_rx) = connect(&registry, 2);

        let delivered = registry
            .send_to_participant(1, ServerEvent::ChatUpdated)
            .await;

        assert_eq!(delivered, 2);
        assert!(phone_rx.try_recv().is_ok());
        assert!(laptop_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());

        // Nobody connected for participant 3; push just reports zero.
        assert_eq!(
            registry
                .send_to_participant(3, ServerEvent::ChatUpdated)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_unregister_discards_membership_and_typing() {
        let registry = ConnectionRegistry::new();
        let (alice, _alice_rx) = connect(&registry, 1);
        registry.join_room(alice, 42);
        registry.typing_start(alice, 42);

        let typing_rooms = registry.unregister(&alice);
        assert_eq!(typing_rooms, vec![42]);
        assert!(!registry.is_member(&alice, 42));
        assert_eq!(
            registry
                .broadcast_to_room(42, None, ServerEvent::ChatUpdated)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_typing_start_reports_transition_only() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connect(&registry, 1);
        registry.join_room(alice, 42);

        assert!(registry.typing_start(alice, 42));
        // Refresh, not a new transition.
        assert!(!registry.typing_start(alice, 42));
        assert!(registry.typing_stop(&alice, 42));
        // Stop without typing is a no-op.
        assert!(!registry.typing_stop(&alice, 42));
    }

    #[tokio::test]
    async fn test_stale_typing_expires_without_explicit_stop() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connect(&registry, 1);
        registry.join_room(alice, 42);
        registry.typing_start(alice, 42);

        assert!(registry
            .expire_stale_typing(Duration::from_secs(60))
            .is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = registry.expire_stale_typing(Duration::from_millis(10));
        assert_eq!(expired, vec![(42, alice)]);

        // Expired means gone; a later sweep finds nothing.
        assert!(registry
            .expire_stale_typing(Duration::from_millis(0))
            .is_empty());
    }

    #[tokio::test]
    async fn test_send_gives_up_after_bounded_retries() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(session_id, 1, tx);

        assert!(registry.send_to_session(&session_id, ServerEvent::ChatUpdated).await);
        // Queue is now full and nobody is draining it.
        assert!(!registry.send_to_session(&session_id, ServerEvent::ChatUpdated).await);

        // The first event is still there; nothing was silently duplicated.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_room_reports_typing_state() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connect(&registry, 1);
        registry.join_room(alice, 42);
        registry.typing_start(alice, 42);

        assert!(registry.leave_room(&alice, 42));
        assert!(!registry.is_member(&alice, 42));

        registry.join_room(alice, 42);
        assert!(!registry.leave_room(&alice, 42));
    }
}
