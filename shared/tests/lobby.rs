use shared::{
    LeaveOutcome, Lobby, LobbyError, LobbySettings, LobbyStatus, PlayerCount, PlayerInfo,
};

fn player(name: &str) -> PlayerInfo {
    PlayerInfo {
        session_id: format!("{name}-sid"),
        username: name.to_string(),
    }
}

fn three_seat_settings() -> LobbySettings {
    LobbySettings {
        player_count: PlayerCount::Three,
        turn_timeout_secs: 30,
        allow_reconnect: true,
    }
}

#[test]
fn creator_is_host_and_member() {
    let lobby = Lobby::new(1, player("ada"), three_seat_settings());

    assert_eq!(lobby.host, "ada-sid");
    assert!(lobby.contains(&"ada-sid".to_string()));
    assert_eq!(lobby.max_players(), 3);
    assert_eq!(lobby.status, LobbyStatus::Open);
}

#[test]
fn rejoining_your_own_lobby_is_not_an_error() {
    let mut lobby = Lobby::new(1, player("ada"), three_seat_settings());

    lobby.join(player("ada")).unwrap();

    assert_eq!(lobby.players().len(), 1);
}

#[test]
fn full_lobbies_reject_joins() {
    let mut lobby = Lobby::new(1, player("ada"), three_seat_settings());

    lobby.join(player("bob")).unwrap();
    lobby.join(player("eve")).unwrap();

    assert!(lobby.is_full());
    assert_eq!(lobby.join(player("mal")).unwrap_err(), LobbyError::Full);
}

#[test]
fn host_leaving_promotes_the_earliest_joiner() {
    let mut lobby = Lobby::new(1, player("ada"), three_seat_settings());

    lobby.join(player("bob")).unwrap();
    lobby.join(player("eve")).unwrap();

    let outcome = lobby.leave(&"ada-sid".to_string()).unwrap();

    assert_eq!(outcome, LeaveOutcome::HostChanged("bob-sid".to_string()));
    assert_eq!(lobby.host, "bob-sid");
}

#[test]
fn last_player_leaving_empties_the_lobby() {
    let mut lobby = Lobby::new(1, player("ada"), three_seat_settings());

    assert_eq!(
        lobby.leave(&"ada-sid".to_string()).unwrap(),
        LeaveOutcome::Empty
    );
    assert_eq!(
        lobby.leave(&"ada-sid".to_string()).unwrap_err(),
        LobbyError::NotInLobby
    );
}

#[test]
fn only_the_host_starts_and_only_when_full() {
    let mut lobby = Lobby::new(1, player("ada"), three_seat_settings());

    lobby.join(player("bob")).unwrap();

    assert_eq!(
        lobby.start(&"bob-sid".to_string()).unwrap_err(),
        LobbyError::NotHost
    );
    assert_eq!(
        lobby.start(&"ada-sid".to_string()).unwrap_err(),
        LobbyError::NotEnoughPlayers
    );

    lobby.join(player("eve")).unwrap();

    let seating = lobby.start(&"ada-sid".to_string()).unwrap();

    assert_eq!(seating, vec!["ada-sid", "bob-sid", "eve-sid"]);
    assert_eq!(lobby.status, LobbyStatus::Starting);

    lobby.close();

    assert_eq!(lobby.status, LobbyStatus::Closed);
    assert_eq!(
        lobby.join(player("mal")).unwrap_err(),
        LobbyError::Closed
    );
}

#[test]
fn settings_are_range_checked() {
    let mut settings = three_seat_settings();

    settings.turn_timeout_secs = 9;
    assert_eq!(settings.validate().unwrap_err(), LobbyError::InvalidSettings);

    settings.turn_timeout_secs = 121;
    assert_eq!(settings.validate().unwrap_err(), LobbyError::InvalidSettings);

    settings.turn_timeout_secs = 10;
    assert!(settings.validate().is_ok());
}
