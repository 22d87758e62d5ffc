//! Test utilities & fixtures shared by the integration tests.

#![allow(dead_code)] // each test binary uses a different subset

use std::time::Duration;

use onlypoly::game::{Board, GameRules, GameSession, PlayerId, Tile, TileKind};
use onlypoly::server::{ConnId, ServerHandle};
use serde_json::Value;
use tokio::sync::mpsc;

/// Two-or-more player session, everyone ready, started by the first joiner.
pub fn started_session(board: Board, names: &[&str]) -> (GameSession, Vec<PlayerId>) {
    let mut session = GameSession::with_seed(board, GameRules::default(), 42);
    let ids: Vec<PlayerId> = names
        .iter()
        .map(|n| session.join(n, None, None).expect("join").player_id)
        .collect();
    for id in &ids {
        session.set_ready(id, true).unwrap();
    }
    session.start(&ids[0]).unwrap();
    (session, ids)
}

/// Default board with tiles 6, 7 and 8 regrouped as the three-tile "Blue" group.
/// Tile 7 carries a steep rent table so capped-rent scenarios are easy to set up.
pub fn blue_board() -> Board {
    let mut tiles: Vec<Tile> = Board::default().tiles().to_vec();
    for id in [6, 7, 8] {
        tiles[id] = Tile {
            id,
            name: format!("Blue {id}"),
            kind: TileKind::Property {
                country: "Blue".to_string(),
                price: 100,
                house_price: 50,
                hotel_price: 50,
                mortgage_value: 50,
                rent: if id == 7 {
                    [50, 200, 900, 1200, 1500, 2000]
                } else {
                    [6, 30, 90, 270, 400, 550]
                },
            },
        };
    }
    Board::new(tiles).expect("blue board is well formed")
}

/// One connection to an in-process server.
pub struct Client {
    pub handle: ServerHandle,
    pub conn: ConnId,
    pub rx: mpsc::UnboundedReceiver<String>,
    pub player_id: Option<PlayerId>,
}

impl Client {
    pub fn connect(handle: &ServerHandle) -> Self {
        let (conn, rx) = handle.connect();
        Self {
            handle: handle.clone(),
            conn,
            rx,
            player_id: None,
        }
    }

    pub fn send(&self, frame: Value) {
        self.handle.frame(self.conn, frame.to_string());
    }

    /// Next event of the given type, skipping everything else.
    pub async fn expect(&mut self, kind: &str) -> Value {
        loop {
            let text = tokio::time::timeout(Duration::from_secs(3), self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
                .expect("server closed the connection");
            let value: Value = serde_json::from_str(&text).expect("server sent JSON");
            if value["type"] == kind {
                return value;
            }
        }
    }

    pub async fn join(&mut self, name: &str) -> PlayerId {
        self.send(serde_json::json!({"type": "join_lobby", "name": name}));
        let joined = self.expect("joined").await;
        let id = joined["playerId"].as_str().expect("player id").to_string();
        self.player_id = Some(id.clone());
        id
    }
}
