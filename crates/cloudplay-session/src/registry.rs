//! The session registry: the set of peers connected to one room.
//!
//! Peers are kept in insertion order. Membership is mutated by whoever
//! handles connects and disconnects, while the fan-out loops iterate it
//! many times per second, so the list sits behind a `RwLock` and readers
//! work on a point-in-time [`snapshot`](SessionRegistry::snapshot). A peer
//! added after a snapshot is taken receives media from the next item on.
//!
//! Every member gets a [`CancellationToken`] that is a child of the
//! room's shutdown token. It fires when the room shuts down or when the
//! peer is removed, whichever comes first; the peer's input task selects
//! on it.

use std::sync::Arc;

use cloudplay_protocol::{PeerId, RoomId};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{PeerSession, SessionError};

struct Member {
    peer: Arc<PeerSession>,
    cancel: CancellationToken,
}

/// Connected peers of a single room.
pub struct SessionRegistry {
    room_id: RoomId,
    members: RwLock<Vec<Member>>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Creates an empty registry whose member tokens derive from `shutdown`.
    pub fn new(room_id: RoomId, shutdown: CancellationToken) -> Self {
        Self {
            room_id,
            members: RwLock::new(Vec::new()),
            shutdown,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Appends `peer` and records this room as its room.
    ///
    /// Returns the member's cancellation token.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyInRoom`] if the peer is already a member.
    /// - [`SessionError::AttachedElsewhere`] if the peer belongs to another room.
    /// - [`SessionError::ShutDown`] once the shutdown token has fired.
    pub async fn add(&self, peer: Arc<PeerSession>) -> Result<CancellationToken, SessionError> {
        let mut members = self.members.write().await;
        // Checked under the lock so nothing slips in after `drain`.
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ShutDown(self.room_id.clone()));
        }
        if members.iter().any(|m| m.peer.id() == peer.id()) {
            return Err(SessionError::AlreadyInRoom(peer.id(), self.room_id.clone()));
        }
        peer.attach(&self.room_id)?;

        let cancel = self.shutdown.child_token();
        tracing::debug!(
            room = %self.room_id.short(),
            peer = %peer.id(),
            members = members.len() + 1,
            "peer added"
        );
        members.push(Member {
            peer,
            cancel: cancel.clone(),
        });
        Ok(cancel)
    }

    /// Removes the first member with `peer_id`, clears its room
    /// association and cancels its token.
    ///
    /// Returns the removed peer, or `None` if it was not a member.
    pub async fn remove(&self, peer_id: PeerId) -> Option<Arc<PeerSession>> {
        let mut members = self.members.write().await;
        let index = members.iter().position(|m| m.peer.id() == peer_id)?;
        let member = members.remove(index);
        drop(members);

        member.cancel.cancel();
        member.peer.detach(&self.room_id);
        tracing::debug!(room = %self.room_id.short(), peer = %peer_id, "peer removed");
        Some(member.peer)
    }

    /// Removes every member, in insertion order.
    pub async fn drain(&self) -> Vec<Arc<PeerSession>> {
        let drained: Vec<Member> = self.members.write().await.drain(..).collect();
        drained
            .into_iter()
            .map(|member| {
                member.cancel.cancel();
                member.peer.detach(&self.room_id);
                member.peer
            })
            .collect()
    }

    pub async fn contains(&self, peer_id: PeerId) -> bool {
        self.members
            .read()
            .await
            .iter()
            .any(|m| m.peer.id() == peer_id)
    }

    pub async fn get(&self, peer_id: PeerId) -> Option<Arc<PeerSession>> {
        self.members
            .read()
            .await
            .iter()
            .find(|m| m.peer.id() == peer_id)
            .map(|m| Arc::clone(&m.peer))
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    /// Returns `true` if any member reports itself connected.
    pub async fn has_active_connection(&self) -> bool {
        self.members
            .read()
            .await
            .iter()
            .any(|m| m.peer.is_connected())
    }

    /// Current members in insertion order.
    pub async fn snapshot(&self) -> Vec<Arc<PeerSession>> {
        self.members
            .read()
            .await
            .iter()
            .map(|m| Arc::clone(&m.peer))
            .collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeerConfig;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(RoomId::new("room-1"), CancellationToken::new())
    }

    fn peer(id: u64) -> Arc<PeerSession> {
        PeerSession::with_id(PeerId(id), &PeerConfig::default()).0
    }

    // =====================================================================
    // add
    // =====================================================================

    #[tokio::test]
    async fn test_add_attaches_peer_to_room() {
        let reg = registry();
        let p = peer(1);

        reg.add(Arc::clone(&p)).await.unwrap();

        assert!(reg.contains(PeerId(1)).await);
        assert_eq!(p.room_id(), Some(RoomId::new("room-1")));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_duplicate_is_rejected() {
        let reg = registry();
        reg.add(peer(1)).await.unwrap();
        let result = reg.add(peer(1)).await;
        assert!(matches!(result, Err(SessionError::AlreadyInRoom(PeerId(1), _))));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_rejected() {
        let shutdown = CancellationToken::new();
        let reg = SessionRegistry::new(RoomId::new("room-1"), shutdown.clone());
        reg.add(peer(1)).await.unwrap();
        shutdown.cancel();
        reg.drain().await;

        let late = peer(2);
        let result = reg.add(Arc::clone(&late)).await;

        assert!(matches!(result, Err(SessionError::ShutDown(_))));
        assert!(reg.is_empty().await);
        assert_eq!(late.room_id(), None);
    }

    #[tokio::test]
    async fn test_add_peer_from_another_room_is_rejected() {
        let a = registry();
        let b = SessionRegistry::new(RoomId::new("room-2"), CancellationToken::new());
        let p = peer(1);

        a.add(Arc::clone(&p)).await.unwrap();
        let result = b.add(Arc::clone(&p)).await;

        assert!(matches!(result, Err(SessionError::AttachedElsewhere { .. })));
        assert!(!b.contains(PeerId(1)).await);
        assert_eq!(p.room_id(), Some(RoomId::new("room-1")));
    }

    // =====================================================================
    // remove
    // =====================================================================

    #[tokio::test]
    async fn test_remove_keeps_order_of_remaining_peers() {
        let reg = registry();
        for id in 1..=4 {
            reg.add(peer(id)).await.unwrap();
        }

        reg.remove(PeerId(2)).await.unwrap();

        let ids: Vec<_> = reg.snapshot().await.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![PeerId(1), PeerId(3), PeerId(4)]);
    }

    #[tokio::test]
    async fn test_remove_clears_association_and_cancels_token() {
        let reg = registry();
        let p = peer(1);
        let token = reg.add(Arc::clone(&p)).await.unwrap();

        let removed = reg.remove(PeerId(1)).await;

        assert!(removed.is_some());
        assert!(token.is_cancelled());
        assert_eq!(p.room_id(), None);
    }

    #[tokio::test]
    async fn test_remove_absent_and_twice_is_noop() {
        let reg = registry();
        assert!(reg.remove(PeerId(42)).await.is_none());

        reg.add(peer(1)).await.unwrap();
        assert!(reg.remove(PeerId(1)).await.is_some());
        assert!(reg.remove(PeerId(1)).await.is_none());
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_is_empty_tracks_adds_minus_removes() {
        let reg = registry();
        assert!(reg.is_empty().await);
        reg.add(peer(1)).await.unwrap();
        reg.add(peer(2)).await.unwrap();
        reg.remove(PeerId(1)).await;
        assert!(!reg.is_empty().await);
        reg.remove(PeerId(2)).await;
        assert!(reg.is_empty().await);
    }

    // =====================================================================
    // queries
    // =====================================================================

    #[tokio::test]
    async fn test_has_active_connection() {
        let reg = registry();
        assert!(!reg.has_active_connection().await);

        let p = peer(1);
        reg.add(Arc::clone(&p)).await.unwrap();
        assert!(reg.has_active_connection().await);

        p.set_connected(false);
        assert!(!reg.has_active_connection().await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_member_tokens() {
        let shutdown = CancellationToken::new();
        let reg = SessionRegistry::new(RoomId::new("room-1"), shutdown.clone());
        let token = reg.add(peer(1)).await.unwrap();

        shutdown.cancel();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_drain_detaches_everyone() {
        let reg = registry();
        let a = peer(1);
        let b = peer(2);
        reg.add(Arc::clone(&a)).await.unwrap();
        reg.add(Arc::clone(&b)).await.unwrap();

        let drained = reg.drain().await;

        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty().await);
        assert_eq!(a.room_id(), None);
        assert_eq!(b.room_id(), None);
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let reg = registry();
        reg.add(peer(1)).await.unwrap();
        let snap = reg.snapshot().await;
        reg.add(peer(2)).await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(reg.snapshot().await.len(), 2);
    }
}
