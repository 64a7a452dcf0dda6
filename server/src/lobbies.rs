//! The lobby manager: the partitioned `lobby_id → Lobby` map.
//!
//! The map lock only guards the table itself; each lobby mutates under its
//! own lock, so distinct lobbies progress independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use shared::{Lobby, LobbyError, LobbyId, LobbySettings, LobbyStatus, LobbySummary, PlayerInfo};

pub struct LobbyManager {
    lobbies: Mutex<HashMap<LobbyId, Arc<Mutex<Lobby>>>>,
}

impl LobbyManager {
    pub fn new() -> LobbyManager {
        LobbyManager {
            lobbies: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a lobby with the given host as first member and returns its
    /// id and initial summary.
    pub fn create(
        &self,
        host: PlayerInfo,
        settings: LobbySettings,
    ) -> Result<(LobbyId, LobbySummary), LobbyError> {
        settings.validate()?;

        let mut lobbies = self.lobbies.lock().expect("lobby map lock");

        let lobby_id = loop {
            let candidate = generate_entity_id();

            if !lobbies.contains_key(&candidate) {
                break candidate;
            }
        };

        let lobby = Lobby::new(lobby_id, host, settings);
        let summary = LobbySummary::from(&lobby);

        lobbies.insert(lobby_id, Arc::new(Mutex::new(lobby)));

        Ok((lobby_id, summary))
    }

    pub fn get(&self, lobby_id: LobbyId) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies
            .lock()
            .expect("lobby map lock")
            .get(&lobby_id)
            .cloned()
    }

    pub fn remove(&self, lobby_id: LobbyId) {
        self.lobbies.lock().expect("lobby map lock").remove(&lobby_id);
    }

    /// Summaries of every `Open` lobby.
    pub fn list(&self) -> Vec<LobbySummary> {
        let lobbies = self.lobbies.lock().expect("lobby map lock");

        lobbies
            .values()
            .filter_map(|entry| {
                let lobby = entry.lock().expect("lobby lock");

                (lobby.status == LobbyStatus::Open).then(|| LobbySummary::from(&*lobby))
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.list().len()
    }
}

/// Lobby and game ids are random `u16`s with at least four set bits, so
/// they stay short without ever looking sequential.
pub fn generate_entity_id() -> u16 {
    loop {
        let id = rand::thread_rng().gen_range(u16::MIN..=u16::MAX);

        if id.count_ones() >= 4 {
            return id;
        }
    }
}
