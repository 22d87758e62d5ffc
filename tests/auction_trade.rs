mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::started_session;
use onlypoly::game::{
    AcceptOutcome, AuctionHouse, AuctionRules, BidOutcome, Board, Development, Money, Rejection,
    TradeDesk, TradeTerms,
};

#[test]
fn auction_with_two_fifty_steps_sells_for_one_hundred() {
    let (mut s, ids) = started_session(Board::default(), &["Ada", "Bob"]);
    let (ada, bob) = (ids[0].clone(), ids[1].clone());
    let mut house = AuctionHouse::new(AuctionRules::default());
    let t0 = Utc::now();

    let auction = house.start(&mut s, &ada, 6, t0).unwrap();
    assert_eq!(auction.highest_bid, 0);
    assert_eq!(auction.ends_at - t0, ChronoDuration::milliseconds(30_000));
    // Buying the tile in the same turn is refused once the auction is used up.
    assert_eq!(
        s.buy_property(&ada, 6).unwrap_err(),
        Rejection::AuctionAlreadyStarted
    );

    let mut seen: Vec<Money> = Vec::new();
    for (who, at) in [(&bob, 1), (&ada, 2)] {
        match house
            .bid(&mut s, who, 50, t0 + ChronoDuration::seconds(at))
            .unwrap()
        {
            BidOutcome::Accepted(a) => seen.push(a.highest_bid),
            BidOutcome::Closed(_) => panic!("auction closed early"),
        }
    }
    assert_eq!(seen, vec![50, 100]);
    assert_eq!(
        house
            .bid(&mut s, &bob, 25, t0 + ChronoDuration::seconds(3))
            .unwrap_err(),
        Rejection::InvalidBidStep
    );

    // Early timers are ignored.
    assert!(house
        .resolve_due(&mut s, &auction.id, t0 + ChronoDuration::seconds(29))
        .is_none());
    let result = house
        .resolve_due(&mut s, &auction.id, t0 + ChronoDuration::milliseconds(30_050))
        .unwrap();
    assert_eq!(result.winner.as_deref(), Some(ada.as_str()));
    assert_eq!(result.price, 100);
    assert!(!result.auction.active);
    assert_eq!(s.player(&ada).unwrap().money, 1400);
    assert_eq!(
        s.player(&ada).unwrap().owned_properties.get(&6),
        Some(&Development::Land)
    );

    // A duplicate timer is a no-op.
    assert!(house
        .resolve_due(&mut s, &auction.id, t0 + ChronoDuration::seconds(31))
        .is_none());
    assert!(house.current().is_none());
}

fn trade_setup() -> (onlypoly::game::GameSession, TradeDesk, String, String) {
    let (mut s, ids) = started_session(Board::default(), &["Ada", "Bob"]);
    s.assign_property(5, Some(ids[0].as_str()), Development::Land);
    s.assign_property(9, Some(ids[1].as_str()), Development::Land);
    (s, TradeDesk::new(), ids[0].clone(), ids[1].clone())
}

fn cash_and_airport_for_bangalore(to: &str) -> TradeTerms {
    TradeTerms {
        to_player_id: to.to_string(),
        offer_money: 300,
        offer_properties: vec![5],
        request_properties: vec![9],
        ..TradeTerms::default()
    }
}

#[test]
fn trade_settles_when_terms_still_hold() {
    let (mut s, mut desk, ada, bob) = trade_setup();
    let trade = desk
        .propose(&s, &ada, cash_and_airport_for_bangalore(&bob), Utc::now())
        .unwrap();
    assert_eq!(desk.pending_for(&bob).count(), 1);

    match desk.accept(&mut s, &trade.id, &bob).unwrap() {
        AcceptOutcome::Settled(t) => assert_eq!(t.id, trade.id),
        other => panic!("expected settlement, got {other:?}"),
    }
    let (a, b) = (s.player(&ada).unwrap(), s.player(&bob).unwrap());
    assert_eq!(a.money, 1200);
    assert_eq!(b.money, 1800);
    assert!(a.owns(9) && !a.owns(5));
    assert!(b.owns(5) && !b.owns(9));
    assert!(desk.is_empty());
}

#[test]
fn trade_is_discarded_when_proposer_lost_the_deed() {
    let (mut s, mut desk, ada, bob) = trade_setup();
    let trade = desk
        .propose(&s, &ada, cash_and_airport_for_bangalore(&bob), Utc::now())
        .unwrap();
    s.assign_property(5, None, Development::Land);

    match desk.accept(&mut s, &trade.id, &bob).unwrap() {
        AcceptOutcome::Failed(t, reason) => {
            assert_eq!(t.id, trade.id);
            assert_eq!(reason, Rejection::NotOwner);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(s.player(&ada).unwrap().money, 1500);
    assert!(s.player(&bob).unwrap().owns(9));
    assert_eq!(
        desk.accept(&mut s, &trade.id, &bob).unwrap_err(),
        Rejection::TradeNotFound
    );
}

#[test]
fn trade_is_discarded_when_proposer_cannot_pay() {
    let (mut s, mut desk, ada, bob) = trade_setup();
    let trade = desk
        .propose(&s, &ada, cash_and_airport_for_bangalore(&bob), Utc::now())
        .unwrap();
    s.player_mut(&ada).unwrap().money = 299;
    assert!(matches!(
        desk.accept(&mut s, &trade.id, &bob).unwrap(),
        AcceptOutcome::Failed(_, Rejection::InsufficientFunds)
    ));
    assert!(s.player(&ada).unwrap().owns(5));
}

#[test]
fn trade_is_discarded_when_acceptor_gave_away_the_requested_deed() {
    let (mut s, mut desk, ada, bob) = trade_setup();
    let trade = desk
        .propose(&s, &ada, cash_and_airport_for_bangalore(&bob), Utc::now())
        .unwrap();
    // Bob sells Bangalore back to the bank before answering.
    s.assign_property(9, None, Development::Land);

    match desk.accept(&mut s, &trade.id, &bob).unwrap() {
        AcceptOutcome::Failed(t, reason) => {
            assert_eq!(t.id, trade.id);
            assert_eq!(reason, Rejection::NotOwner);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(desk.is_empty());
    let (a, b) = (s.player(&ada).unwrap(), s.player(&bob).unwrap());
    assert_eq!(a.money, 1500);
    assert_eq!(b.money, 1500);
    assert!(a.owns(5) && !a.owns(9));
    assert!(!b.owns(5) && !b.owns(9));
}

#[test]
fn trade_is_discarded_when_acceptor_cannot_cover_requested_cash() {
    let (mut s, mut desk, ada, bob) = trade_setup();
    let terms = TradeTerms {
        to_player_id: bob.clone(),
        request_money: 400,
        offer_properties: vec![5],
        ..TradeTerms::default()
    };
    let trade = desk.propose(&s, &ada, terms, Utc::now()).unwrap();
    s.player_mut(&bob).unwrap().money = 399;

    assert!(matches!(
        desk.accept(&mut s, &trade.id, &bob).unwrap(),
        AcceptOutcome::Failed(_, Rejection::InsufficientFunds)
    ));
    assert!(desk.get(&trade.id).is_none());
    let (a, b) = (s.player(&ada).unwrap(), s.player(&bob).unwrap());
    assert_eq!(a.money, 1500);
    assert_eq!(b.money, 399);
    assert!(a.owns(5) && !b.owns(5));
    assert!(b.owns(9));
}
