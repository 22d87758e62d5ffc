//! # Game Server
//!
//! [`GameServer`] is the single writer for a room. It owns the [`GameSession`], the
//! [`AuctionHouse`], the [`TradeDesk`] and the connection registry, and consumes one
//! command queue. Each command (a connection opening, an inbound frame, a connection
//! closing, an auction deadline) is handled to completion before the next one starts,
//! so every game action is atomic with respect to the others.
//!
//! ## Flow of an action
//!
//! 1. The frame is decoded into a [`ClientAction`]; undecodable frames are rejected.
//! 2. The action is applied to the game. A [`Rejection`] goes back to the sender only.
//! 3. Bankruptcy and game-over notices raised by the engine are turned into broadcasts.
//! 4. The new snapshot is handed to the [`SnapshotWriter`]. Critical transitions wait
//!    for the write before anything is broadcast.
//! 5. Events are delivered, followed by a full `state_update` when state changed.
//!
//! The auction timer is a spawned sleep that posts an `AuctionDeadline` command back into
//! the same queue, so resolution never races a bid.

pub mod protocol;
pub mod ws;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::game::{
    AcceptOutcome, AuctionHouse, AuctionResult, AuctionRules, BidOutcome, GameSession, PlayerId,
    Rejection, SessionNotice, SessionSnapshot, Trade, TradeDesk, TradeStatus,
};
use crate::logutil::escape_log;
use crate::storage::SnapshotWriter;
use protocol::{ClientAction, ServerEvent};

pub type ConnId = u64;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub auction: AuctionRules,
    /// Minimum gap between two accepted dice rolls in the room.
    pub roll_cooldown: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            auction: AuctionRules::default(),
            roll_cooldown: Duration::from_millis(1000),
        }
    }
}

enum ServerCommand {
    Connect {
        conn_id: ConnId,
        tx: mpsc::UnboundedSender<String>,
    },
    Frame {
        conn_id: ConnId,
        text: String,
    },
    Action {
        conn_id: ConnId,
        action: ClientAction,
    },
    Disconnect {
        conn_id: ConnId,
    },
    AuctionDeadline {
        auction_id: String,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle used by transports (and tests) to talk to the server task.
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerCommand>,
    next_conn: Arc<AtomicU64>,
}

impl ServerHandle {
    /// Register a new connection. Outbound frames arrive on the returned receiver,
    /// starting with the current state.
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(ServerCommand::Connect { conn_id, tx });
        (conn_id, rx)
    }

    /// Forward a raw text frame from a connection.
    pub fn frame(&self, conn_id: ConnId, text: String) {
        let _ = self.tx.send(ServerCommand::Frame { conn_id, text });
    }

    /// Forward an already decoded action.
    pub fn action(&self, conn_id: ConnId, action: ClientAction) {
        let _ = self.tx.send(ServerCommand::Action { conn_id, action });
    }

    pub fn disconnect(&self, conn_id: ConnId) {
        let _ = self.tx.send(ServerCommand::Disconnect { conn_id });
    }

    /// Current session as it would be persisted.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(ServerCommand::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Persist the final state and stop the server task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ServerCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

enum Audience {
    All,
    Conn(ConnId),
    Players(Vec<PlayerId>),
}

impl Audience {
    fn parties(trade: &Trade) -> Self {
        Audience::Players(vec![
            trade.from_player_id.clone(),
            trade.to_player_id.clone(),
        ])
    }

    fn includes(&self, conn_id: ConnId, conn: &Connection) -> bool {
        match self {
            Audience::All => true,
            Audience::Conn(id) => *id == conn_id,
            Audience::Players(ids) => conn
                .player_id
                .as_ref()
                .map(|p| ids.contains(p))
                .unwrap_or(false),
        }
    }
}

/// Everything an action produced, delivered in one go once persistence is settled.
#[derive(Default)]
struct Outbox {
    messages: Vec<(Audience, String)>,
    changed: bool,
    critical: bool,
    clear_store: bool,
}

impl Outbox {
    fn push(&mut self, to: Audience, event: &ServerEvent<'_>) {
        match event.encode() {
            Ok(text) => self.messages.push((to, text)),
            Err(e) => log::error!("Failed to encode outbound event: {}", e),
        }
    }

    fn critical(&mut self) {
        self.changed = true;
        self.critical = true;
    }
}

struct Connection {
    tx: mpsc::UnboundedSender<String>,
    player_id: Option<PlayerId>,
}

pub struct GameServer {
    session: GameSession,
    auctions: AuctionHouse,
    trades: TradeDesk,
    connections: HashMap<ConnId, Connection>,
    roll_cooldown: Duration,
    last_roll: Option<Instant>,
    writer: Option<SnapshotWriter>,
    tx: mpsc::UnboundedSender<ServerCommand>,
}

/// Spawn the server task for `session` on the current runtime.
pub fn start_server(
    session: GameSession,
    settings: ServerSettings,
    writer: Option<SnapshotWriter>,
) -> ServerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ServerHandle {
        tx: tx.clone(),
        next_conn: Arc::new(AtomicU64::new(0)),
    };
    let server = GameServer {
        session,
        auctions: AuctionHouse::new(settings.auction),
        trades: TradeDesk::new(),
        connections: HashMap::new(),
        roll_cooldown: settings.roll_cooldown,
        last_roll: None,
        writer,
        tx,
    };
    tokio::spawn(server.run(rx));
    handle
}

impl GameServer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ServerCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ServerCommand::Connect { conn_id, tx } => self.connect(conn_id, tx),
                ServerCommand::Frame { conn_id, text } => match ClientAction::parse(&text) {
                    Ok(action) => self.handle_action(conn_id, action).await,
                    Err(reason) => {
                        log::debug!(
                            "Malformed frame from conn {}: {}",
                            conn_id,
                            escape_log(&text)
                        );
                        let mut out = Outbox::default();
                        out.push(
                            Audience::Conn(conn_id),
                            &ServerEvent::rejected("unknown", reason),
                        );
                        self.deliver(out.messages);
                    }
                },
                ServerCommand::Action { conn_id, action } => {
                    self.handle_action(conn_id, action).await
                }
                ServerCommand::Disconnect { conn_id } => self.disconnect(conn_id).await,
                ServerCommand::AuctionDeadline { auction_id } => {
                    self.auction_deadline(&auction_id).await
                }
                ServerCommand::Snapshot(resp) => {
                    let _ = resp.send(self.session.snapshot());
                }
                ServerCommand::Shutdown(done) => {
                    if let Some(writer) = &self.writer {
                        writer.persist_and_wait(self.session.snapshot()).await;
                    }
                    log::info!("Game server stopped");
                    let _ = done.send(());
                    break;
                }
            }
        }
    }

    fn connect(&mut self, conn_id: ConnId, tx: mpsc::UnboundedSender<String>) {
        log::debug!("Connection {} opened", conn_id);
        self.connections.insert(
            conn_id,
            Connection {
                tx,
                player_id: None,
            },
        );
        let mut out = Outbox::default();
        out.push(
            Audience::Conn(conn_id),
            &ServerEvent::StateUpdate(self.session.view()),
        );
        self.deliver(out.messages);
    }

    /// Lobby players leave with their last connection; after the start they stay seated.
    async fn disconnect(&mut self, conn_id: ConnId) {
        let Some(conn) = self.connections.remove(&conn_id) else {
            return;
        };
        log::debug!("Connection {} closed", conn_id);
        let Some(player_id) = conn.player_id else {
            return;
        };
        let still_connected = self
            .connections
            .values()
            .any(|c| c.player_id.as_deref() == Some(player_id.as_str()));
        if self.session.is_started() || still_connected {
            return;
        }
        let mut out = Outbox::default();
        if self.session.leave(&player_id).is_ok() {
            log::info!("Player {} left the lobby", player_id);
            out.changed = true;
        }
        self.commit(out).await;
    }

    async fn handle_action(&mut self, conn_id: ConnId, action: ClientAction) {
        if !self.connections.contains_key(&conn_id) {
            log::debug!("Dropping {} from unknown conn {}", action.kind(), conn_id);
            return;
        }
        let kind = action.kind();
        let mut out = Outbox::default();
        if let Err(reason) = self.apply(conn_id, action, &mut out) {
            log::debug!("{} from conn {} rejected: {}", kind, conn_id, reason);
            out.push(Audience::Conn(conn_id), &ServerEvent::rejected(kind, reason));
        }
        self.collect_notices(&mut out);
        self.commit(out).await;
    }

    fn apply(
        &mut self,
        conn_id: ConnId,
        action: ClientAction,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        if let ClientAction::JoinLobby {
            name,
            color,
            existing_id,
        } = &action
        {
            self.join(conn_id, name, color.as_deref(), existing_id.as_deref(), out);
            return Ok(());
        }

        let pid = self.player_for(conn_id).ok_or(Rejection::NotJoined)?;
        let now = Utc::now();
        match action {
            ClientAction::JoinLobby { .. } => {}
            ClientAction::LeaveLobby => {
                self.session.leave(&pid)?;
                self.unbind(&pid);
                log::info!("Player {} left the lobby", pid);
                out.changed = true;
            }
            ClientAction::SetPlayerColor { color } => match self.session.set_color(&pid, &color) {
                Ok(_) => out.changed = true,
                Err(reason) => out.push(
                    Audience::Conn(conn_id),
                    &ServerEvent::ColorRejected {
                        reason,
                        message: reason.to_string(),
                    },
                ),
            },
            ClientAction::SetReady { ready } => {
                self.session.set_ready(&pid, ready)?;
                out.changed = true;
            }
            ClientAction::StartGame => {
                self.session.start(&pid)?;
                self.auctions.clear();
                self.trades.clear();
                self.last_roll = None;
                log::info!(
                    "Game started by {} with {} players",
                    pid,
                    self.session.player_count()
                );
                out.critical();
            }
            ClientAction::RollDice => {
                if let Some(last) = self.last_roll {
                    if last.elapsed() < self.roll_cooldown {
                        return Err(Rejection::TooFast);
                    }
                }
                let outcome = self.session.roll_and_move(&pid)?;
                self.last_roll = Some(Instant::now());
                log::debug!(
                    "{} rolled {}+{} and landed on {}",
                    pid,
                    outcome.dice.d1,
                    outcome.dice.d2,
                    outcome.tile.id
                );
                out.push(
                    Audience::All,
                    &ServerEvent::DiceRolled {
                        player_id: pid.clone(),
                        dice: outcome.dice,
                        tile: outcome.tile,
                        events: outcome.events,
                    },
                );
                out.changed = true;
            }
            ClientAction::BuyProperty { property_id } => {
                if self.auctions.is_active_for(property_id) {
                    return Err(Rejection::AuctionInProgress);
                }
                self.session.buy_property(&pid, property_id)?;
                out.changed = true;
            }
            ClientAction::StartAuction { property_id } => {
                let auction = self
                    .auctions
                    .start(&mut self.session, &pid, property_id, now)?;
                self.schedule_deadline(&auction.id, now);
                out.push(Audience::All, &ServerEvent::AuctionStarted(auction));
                out.changed = true;
            }
            ClientAction::AuctionBid { step } => {
                match self.auctions.bid(&mut self.session, &pid, step, now)? {
                    BidOutcome::Accepted(auction) => {
                        out.push(Audience::All, &ServerEvent::AuctionUpdated(auction));
                    }
                    BidOutcome::Closed(result) => {
                        out.push(
                            Audience::Conn(conn_id),
                            &ServerEvent::rejected("auction_bid", Rejection::AuctionClosed),
                        );
                        self.finish_auction(result, out);
                    }
                }
            }
            ClientAction::EndTurn => {
                let outcome = self.session.end_turn(&pid)?;
                if let Some(turns_remaining) = outcome.jail_turns_remaining {
                    let player_name = self
                        .session
                        .player(&pid)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    out.push(
                        Audience::All,
                        &ServerEvent::JailTurnSkipped {
                            player_id: pid.clone(),
                            player_name,
                            turns_remaining,
                        },
                    );
                }
                out.changed = true;
            }
            ClientAction::PayJailFine => {
                let amount = self.session.pay_jail_fine(&pid)?;
                out.push(
                    Audience::All,
                    &ServerEvent::JailPaid {
                        player_id: pid.clone(),
                        amount,
                    },
                );
                out.changed = true;
            }
            ClientAction::BuildHouse { property_id } => {
                self.session.build_house(&pid, property_id)?;
                out.changed = true;
            }
            ClientAction::BuildHotel { property_id } => {
                self.session.build_hotel(&pid, property_id)?;
                out.changed = true;
            }
            ClientAction::SellHouse { property_id } => {
                self.session.sell_house(&pid, property_id)?;
                out.changed = true;
            }
            ClientAction::SellHotel { property_id } => {
                self.session.sell_hotel(&pid, property_id)?;
                out.changed = true;
            }
            ClientAction::ProposeTrade(terms) => {
                let trade = self.trades.propose(&self.session, &pid, terms, now)?;
                out.push(Audience::parties(&trade), &ServerEvent::TradeOffer(trade));
            }
            ClientAction::AcceptTrade { trade_id } => {
                match self.trades.accept(&mut self.session, &trade_id, &pid)? {
                    AcceptOutcome::Settled(trade) => {
                        out.push(
                            Audience::parties(&trade),
                            &ServerEvent::TradeUpdated {
                                trade_id: trade.id.clone(),
                                status: TradeStatus::Accepted,
                                reason: None,
                            },
                        );
                        out.critical();
                    }
                    AcceptOutcome::Failed(trade, reason) => {
                        out.push(
                            Audience::parties(&trade),
                            &ServerEvent::TradeUpdated {
                                trade_id: trade.id.clone(),
                                status: TradeStatus::Failed,
                                reason: Some(reason),
                            },
                        );
                    }
                }
            }
            ClientAction::RejectTrade { trade_id } => {
                let trade = self.trades.reject(&trade_id, &pid)?;
                log::info!("Trade {} rejected by {}", trade.id, pid);
                out.push(
                    Audience::parties(&trade),
                    &ServerEvent::TradeUpdated {
                        trade_id: trade.id.clone(),
                        status: TradeStatus::Rejected,
                        reason: None,
                    },
                );
            }
            ClientAction::DeclareBankruptcy => {
                self.session.declare_bankruptcy(&pid)?;
                out.critical();
            }
            ClientAction::ResetGame => {
                self.session.reset(&pid)?;
                self.clear_room();
                out.changed = true;
                out.clear_store = true;
            }
        }
        Ok(())
    }

    fn join(
        &mut self,
        conn_id: ConnId,
        name: &str,
        color: Option<&str>,
        existing_id: Option<&str>,
        out: &mut Outbox,
    ) {
        let reconnecting = existing_id
            .map(|id| self.session.player(id).is_some())
            .unwrap_or(false);
        if self.session.is_started() && !reconnecting && !self.any_player_connected(conn_id) {
            log::info!("Started game has no connected players; resetting before join");
            self.session.reset_all();
            self.clear_room();
            out.critical();
        }

        match self.session.join(name, color, existing_id) {
            Ok(outcome) => {
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    conn.player_id = Some(outcome.player_id.clone());
                }
                log::info!(
                    "{} {} as {}",
                    if outcome.reconnected {
                        "Reconnected"
                    } else {
                        "Joined"
                    },
                    escape_log(name),
                    outcome.player_id
                );
                out.push(
                    Audience::Conn(conn_id),
                    &ServerEvent::Joined {
                        player_id: outcome.player_id,
                        reconnected: outcome.reconnected,
                    },
                );
                if let Some(reason) = outcome.color_rejected {
                    out.push(
                        Audience::Conn(conn_id),
                        &ServerEvent::ColorRejected {
                            reason,
                            message: reason.to_string(),
                        },
                    );
                }
                out.changed = true;
            }
            Err(reason) => {
                log::debug!("Join by {} refused: {}", escape_log(name), reason);
                out.push(
                    Audience::Conn(conn_id),
                    &ServerEvent::JoinError {
                        reason,
                        message: reason.to_string(),
                    },
                );
            }
        }
    }

    async fn auction_deadline(&mut self, auction_id: &str) {
        let now = Utc::now();
        let mut out = Outbox::default();
        match self.auctions.resolve_due(&mut self.session, auction_id, now) {
            Some(result) => self.finish_auction(result, &mut out),
            None => {
                // Fired before the deadline (clock skew); try again.
                let pending = self
                    .auctions
                    .current()
                    .map(|a| a.id == auction_id)
                    .unwrap_or(false);
                if pending {
                    if let Some(delay) = self.auctions.timer_delay(now) {
                        self.spawn_timer(auction_id.to_string(), delay);
                    }
                }
                return;
            }
        }
        self.collect_notices(&mut out);
        self.commit(out).await;
    }

    fn finish_auction(&mut self, result: AuctionResult, out: &mut Outbox) {
        out.push(Audience::All, &ServerEvent::AuctionFinished(result));
        out.critical();
    }

    fn schedule_deadline(&self, auction_id: &str, now: chrono::DateTime<Utc>) {
        if let Some(delay) = self.auctions.timer_delay(now) {
            self.spawn_timer(auction_id.to_string(), delay);
        }
    }

    fn spawn_timer(&self, auction_id: String, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ServerCommand::AuctionDeadline { auction_id });
        });
    }

    fn collect_notices(&mut self, out: &mut Outbox) {
        for notice in self.session.take_notices() {
            out.critical();
            match notice {
                SessionNotice::PlayerBankrupt {
                    player_id,
                    player_name,
                } => {
                    log::info!("Player {} ({}) is bankrupt", escape_log(&player_name), player_id);
                    for trade in self.trades.purge_player(&player_id) {
                        out.push(
                            Audience::parties(&trade),
                            &ServerEvent::TradeUpdated {
                                trade_id: trade.id.clone(),
                                status: TradeStatus::Cancelled,
                                reason: Some(Rejection::PlayerBankrupt),
                            },
                        );
                    }
                    out.push(
                        Audience::All,
                        &ServerEvent::PlayerBankrupt {
                            player_id,
                            player_name,
                        },
                    );
                }
                SessionNotice::GameOver(game_over) => {
                    log::info!(
                        "Game over: {} wins with {}",
                        escape_log(&game_over.winner_name),
                        game_over.winner_money
                    );
                    out.push(Audience::All, &ServerEvent::GameOver(game_over));
                }
            }
        }
    }

    /// Persist, then deliver. Critical changes wait for the write to land first.
    async fn commit(&mut self, mut out: Outbox) {
        if let Some(writer) = &self.writer {
            if out.clear_store {
                if !writer.clear().await {
                    log::warn!("Stored snapshot could not be cleared");
                }
            } else if out.changed {
                let snapshot = self.session.snapshot();
                if out.critical {
                    if !writer.persist_and_wait(snapshot).await {
                        log::warn!("Critical snapshot was not persisted");
                    }
                } else {
                    writer.persist(snapshot);
                }
            }
        }
        if out.changed {
            out.push(Audience::All, &ServerEvent::StateUpdate(self.session.view()));
        }
        self.deliver(out.messages);
    }

    fn deliver(&self, messages: Vec<(Audience, String)>) {
        for (audience, text) in messages {
            for (conn_id, conn) in &self.connections {
                if audience.includes(*conn_id, conn) {
                    let _ = conn.tx.send(text.clone());
                }
            }
        }
    }

    fn player_for(&self, conn_id: ConnId) -> Option<PlayerId> {
        self.connections
            .get(&conn_id)?
            .player_id
            .clone()
            .filter(|id| self.session.player(id).is_some())
    }

    fn any_player_connected(&self, except: ConnId) -> bool {
        self.connections.iter().any(|(id, c)| {
            *id != except
                && c
                    .player_id
                    .as_ref()
                    .map(|p| self.session.player(p).is_some())
                    .unwrap_or(false)
        })
    }

    fn unbind(&mut self, player_id: &str) {
        for conn in self.connections.values_mut() {
            if conn.player_id.as_deref() == Some(player_id) {
                conn.player_id = None;
            }
        }
    }

    /// Drop room-level state that lives outside the session.
    fn clear_room(&mut self) {
        self.auctions.clear();
        self.trades.clear();
        self.last_roll = None;
        for conn in self.connections.values_mut() {
            conn.player_id = None;
        }
    }
}
