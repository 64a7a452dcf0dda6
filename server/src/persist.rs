//! Advisory JSON snapshots of users, lobbies and games.
//!
//! In-memory state stays authoritative during play; snapshot failures are
//! logged and never block gameplay. A relational store can be swapped in
//! behind these calls.

use std::fs::{self, File};
use std::path::PathBuf;

use serde::Serialize;
use shared::{Game, Lobby};

use crate::auth::UserRecord;

pub struct Snapshots {
    dir: Option<PathBuf>,
}

impl Snapshots {
    /// `location` comes from `DATABASE_URL` and is treated as a directory;
    /// `None` disables snapshotting.
    pub fn new(location: Option<&str>) -> Snapshots {
        Snapshots {
            dir: location.map(PathBuf::from),
        }
    }

    pub fn record_lobby(&self, lobby: &Lobby) {
        self.write("lobbies", &format!("{}.json", lobby.lobby_id), lobby);
    }

    pub fn record_game(&self, game: &Game) {
        self.write("games", &format!("{}.json", game.game_id()), game);
    }

    pub fn record_users(&self, users: &[UserRecord]) {
        self.write("users", "users.json", &users);
    }

    pub fn load_users(&self) -> Vec<UserRecord> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };

        let path = dir.join("users").join("users.json");

        match File::open(&path) {
            Ok(file) => serde_json::from_reader(file).unwrap_or_else(|err| {
                tracing::warn!(?path, %err, "discarding unreadable user snapshot");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    fn write<T: Serialize>(&self, kind: &str, name: &str, value: &T) {
        let Some(dir) = &self.dir else {
            return;
        };

        let dir = dir.join(kind);

        let result = fs::create_dir_all(&dir)
            .map_err(serde_json::Error::io)
            .and_then(|_| File::create(dir.join(name)).map_err(serde_json::Error::io))
            .and_then(|file| serde_json::to_writer(&file, value));

        if let Err(err) = result {
            tracing::warn!(kind, name, %err, "snapshot write failed");
        }
    }
}
