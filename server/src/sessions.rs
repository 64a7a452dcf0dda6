//! The connection manager: the session registry and the socket bindings.
//!
//! Sessions are the stable identity layer. A session outlives any one
//! socket; the socket is merely the current output channel. Every state
//! change bumps the session's epoch so that timer tasks and stale socket
//! cleanups racing a rebind become no-ops.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use rand::Rng;
use shared::{GameId, LobbyId, ServerMessage, SessionId};
use tokio::sync::mpsc;

/// Bounded per-session outbound queue; overflow drops the socket rather
/// than block the sender.
pub const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug)]
enum SocketState {
    Live { tx: mpsc::Sender<ServerMessage> },
    Absent { since: Instant },
}

#[derive(Debug)]
struct Session {
    user_id: String,
    username: String,
    lobby: Option<LobbyId>,
    game: Option<GameId>,
    socket: SocketState,
    epoch: u64,
    last_seen: Instant,
}

/// What [`SessionRegistry::bind`] resolved a fresh socket to.
#[derive(Debug, Clone)]
pub struct Binding {
    pub session_id: SessionId,
    pub username: String,
    /// Epoch of this socket binding; cleanup paths must present it back.
    pub epoch: u64,
    /// The session existed before this socket.
    pub rebound: bool,
    /// The session was `Absent` and is reconnecting within its grace.
    pub reconnected: bool,
    pub lobby: Option<LobbyId>,
    pub game: Option<GameId>,
}

/// A session that just went `Absent`.
#[derive(Debug, Clone)]
pub struct Absence {
    pub epoch: u64,
    pub lobby: Option<LobbyId>,
    pub game: Option<GameId>,
}

/// A session removed from the registry after its grace expired.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    pub lobby: Option<LobbyId>,
    pub game: Option<GameId>,
}

/// Outcome of a delivery attempt.
#[derive(Debug)]
pub enum SendStatus {
    /// Enqueued to a live socket.
    Delivered,
    /// The session is absent or gone; the message is dropped.
    Dropped,
    /// The queue was full; the socket was dropped and the session marked
    /// `Absent`. The caller starts the reconnect grace.
    Overflow(Absence),
}

pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    by_user: HashMap<String, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Binds an authenticated socket to the user's session, creating one on
    /// first contact. An `Absent` session rebinds (reconnect); a `Live` one
    /// is taken over, closing the older socket (newer wins) as its queue is
    /// dropped.
    pub fn bind(
        &self,
        user_id: &str,
        username: &str,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Binding {
        let mut inner = self.inner.lock().expect("session registry lock");

        if let Some(session_id) = inner.by_user.get(user_id).cloned() {
            let session = inner
                .sessions
                .get_mut(&session_id)
                .expect("user index points at a session");

            let reconnected = match session.socket {
                SocketState::Absent { since } => {
                    tracing::debug!(session = %session_id, absent_for = ?since.elapsed(), "session rebinding");
                    true
                }
                SocketState::Live { .. } => false,
            };

            session.socket = SocketState::Live { tx };
            session.epoch += 1;
            session.last_seen = Instant::now();

            return Binding {
                session_id,
                username: session.username.clone(),
                epoch: session.epoch,
                rebound: true,
                reconnected,
                lobby: session.lobby,
                game: session.game,
            };
        }

        let session_id = loop {
            let candidate = generate_session_id();

            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        inner.by_user.insert(user_id.to_string(), session_id.clone());
        inner.sessions.insert(
            session_id.clone(),
            Session {
                user_id: user_id.to_string(),
                username: username.to_string(),
                lobby: None,
                game: None,
                socket: SocketState::Live {
                    tx,
                },
                epoch: 0,
                last_seen: Instant::now(),
            },
        );

        Binding {
            session_id,
            username: username.to_string(),
            epoch: 0,
            rebound: false,
            reconnected: false,
            lobby: None,
            game: None,
        }
    }

    /// Marks the session `Absent` if the caller's socket is still the bound
    /// one; a stale epoch means a newer socket took over and nothing
    /// happens.
    pub fn mark_absent(&self, session_id: &SessionId, epoch: u64) -> Option<Absence> {
        let mut inner = self.inner.lock().expect("session registry lock");
        let session = inner.sessions.get_mut(session_id)?;

        if session.epoch != epoch || matches!(session.socket, SocketState::Absent { .. }) {
            return None;
        }

        tracing::debug!(session = %session_id, idle_for = ?session.last_seen.elapsed(), "session absent");

        session.socket = SocketState::Absent {
            since: Instant::now(),
        };
        session.epoch += 1;

        Some(Absence {
            epoch: session.epoch,
            lobby: session.lobby,
            game: session.game,
        })
    }

    /// Destroys the session if it is still `Absent` under the given epoch.
    pub fn expire(&self, session_id: &SessionId, epoch: u64) -> Option<ExpiredSession> {
        let mut inner = self.inner.lock().expect("session registry lock");

        let expired = {
            let session = inner.sessions.get(session_id)?;

            if session.epoch != epoch || matches!(session.socket, SocketState::Live { .. }) {
                return None;
            }

            ExpiredSession {
                lobby: session.lobby,
                game: session.game,
            }
        };

        let user_id = inner
            .sessions
            .remove(session_id)
            .map(|session| session.user_id);

        if let Some(user_id) = user_id {
            inner.by_user.remove(&user_id);
        }

        Some(expired)
    }

    /// Enqueues a message for the session without ever blocking. A full
    /// queue drops the socket and reports the new absence for grace
    /// handling.
    pub fn send(&self, session_id: &SessionId, message: &ServerMessage) -> SendStatus {
        let mut inner = self.inner.lock().expect("session registry lock");

        let Some(session) = inner.sessions.get_mut(session_id) else {
            return SendStatus::Dropped;
        };

        let SocketState::Live { tx } = &session.socket else {
            return SendStatus::Dropped;
        };

        match tx.try_send(message.clone()) {
            Ok(()) => SendStatus::Delivered,
            Err(_) => {
                // Slow or dead consumer: drop the socket, keep the session.
                session.socket = SocketState::Absent {
                    since: Instant::now(),
                };
                session.epoch += 1;

                SendStatus::Overflow(Absence {
                    epoch: session.epoch,
                    lobby: session.lobby,
                    game: session.game,
                })
            }
        }
    }

    pub fn set_lobby(&self, session_id: &SessionId, lobby: Option<LobbyId>) {
        let mut inner = self.inner.lock().expect("session registry lock");

        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.lobby = lobby;
        }
    }

    pub fn set_game(&self, session_id: &SessionId, game: Option<GameId>) {
        let mut inner = self.inner.lock().expect("session registry lock");

        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.game = game;
        }
    }

    /// The session's current lobby and game membership.
    pub fn contexts(&self, session_id: &SessionId) -> Option<(Option<LobbyId>, Option<GameId>)> {
        let inner = self.inner.lock().expect("session registry lock");

        inner
            .sessions
            .get(session_id)
            .map(|session| (session.lobby, session.game))
    }

    pub fn username(&self, session_id: &SessionId) -> Option<String> {
        let inner = self.inner.lock().expect("session registry lock");

        inner
            .sessions
            .get(session_id)
            .map(|session| session.username.clone())
    }

    pub fn exists(&self, session_id: &SessionId) -> bool {
        let inner = self.inner.lock().expect("session registry lock");

        inner.sessions.contains_key(session_id)
    }

    /// Records inbound traffic for the heartbeat bookkeeping.
    pub fn touch(&self, session_id: &SessionId) {
        let mut inner = self.inner.lock().expect("session registry lock");

        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.last_seen = Instant::now();
        }
    }

    /// `(total, live, absent)` session counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock().expect("session registry lock");

        let live = inner
            .sessions
            .values()
            .filter(|session| matches!(session.socket, SocketState::Live { .. }))
            .count();
        let total = inner.sessions.len();

        (total, live, total - live)
    }

    pub fn live_count(&self) -> usize {
        self.counts().1
    }
}

fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
