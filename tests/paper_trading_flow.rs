mod common;

use common::*;
use coinbot::application::trading::CycleOutcome;
use coinbot::domain::repositories::{OrderRepository, TickLogRepository};
use coinbot::domain::risk::position_sizing::{DEFAULT_MIN_ORDER_SIZE, PositionSizer};
use coinbot::domain::trading::types::{Decision, OrderSide, OrderStatus, TradingMode};
use coinbot::infrastructure::persistence::{SqliteOrderRepository, SqliteTickLogRepository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[tokio::test]
async fn test_breakout_round_trip_in_paper_mode() {
    init_tracing();
    let market = ScriptedMarket::with(breakout_series());
    let exchange = SpyExchange::funded(dec!(10000));
    let app = app(
        config(&[
            "--paper",
            "--strategy",
            "breakout",
            "--risk",
            "0.02",
            "--db",
            "sqlite::memory:",
        ]),
        market.clone(),
        Some(exchange.clone()),
    )
    .await;
    let orders = SqliteOrderRepository::new(app.database.pool.clone());
    let tick_logs = SqliteTickLogRepository::new(app.database.pool.clone());

    // 1. Expansion bar to a new high: enter
    let outcome = app.engine().run_cycle(after_close(20)).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Evaluated {
            candle_ts: BASE + 20 * PERIOD,
            decision: Decision::Enter
        }
    );

    let entry = orders.last_open("BTC-USD").await.unwrap().expect("open position");
    assert_eq!(entry.side, OrderSide::Buy);
    assert_eq!(entry.mode, TradingMode::Paper);
    assert_eq!(entry.status, OrderStatus::Open);
    assert_eq!(entry.price, dec!(124));
    let stop = entry.stop.expect("breakout entries carry a stop");
    assert!(stop < dec!(120), "stop {} should sit an ATR below the prior high", stop);

    // --risk 0.02 of 10000: losing the stop distance costs at most 200
    let expected = PositionSizer::new(dec!(0.02), DEFAULT_MIN_ORDER_SIZE)
        .size(dec!(10000), dec!(124), Some(stop))
        .unwrap();
    assert_eq!(entry.amount, expected);
    let at_risk = entry.amount * (dec!(124) - stop);
    assert!(at_risk <= dec!(200) && at_risk > dec!(199.99), "risked {}", at_risk);

    // 2. Next bar trades through the stop: exit at the stop
    market
        .push(bar(21, dec!(124), dec!(125), dec!(110), dec!(111)))
        .await;
    let outcome = app.engine().run_cycle(after_close(21)).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Evaluated {
            candle_ts: BASE + 21 * PERIOD,
            decision: Decision::Exit
        }
    );

    assert!(orders.last_open("BTC-USD").await.unwrap().is_none());
    let closed = orders.find(&entry.id).await.unwrap().unwrap();
    assert_eq!(closed.status, OrderStatus::Closed);

    let recent = orders.find_recent("BTC-USD", 10).await.unwrap();
    let exit = recent
        .iter()
        .find(|o| o.side == OrderSide::Sell)
        .expect("exit order");
    assert_eq!(exit.status, OrderStatus::Filled);
    assert_eq!(exit.price, stop);
    assert_eq!(exit.pnl, Some((stop - dec!(124)) * entry.amount));

    let logs = tick_logs.find_recent("BTC-USD", 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    let last_log = logs
        .iter()
        .find(|l| l.timestamp == BASE + 21 * PERIOD)
        .unwrap();
    assert_eq!(last_log.decision, Decision::Exit);
    assert_eq!(last_log.pnl, exit.pnl.unwrap());
    assert_eq!(last_log.equity, dec!(10000) + exit.pnl.unwrap());

    // Paper mode never touches the exchange order endpoint
    assert_eq!(exchange.submissions(), 0);
}

#[tokio::test]
async fn test_quiet_market_holds_and_logs_every_candle() {
    let candles: Vec<_> = (0..25)
        .map(|i| bar(i, dec!(100), dec!(101), dec!(99), dec!(100)))
        .collect();
    let market = ScriptedMarket::with(candles);
    let app = app(
        config(&["--paper", "--strategy", "breakout", "--db", "sqlite::memory:"]),
        market,
        None,
    )
    .await;

    let outcome = app.engine().run_cycle(after_close(24)).await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Evaluated {
            decision: Decision::Hold,
            ..
        }
    ));

    let orders = SqliteOrderRepository::new(app.database.pool.clone());
    assert_eq!(orders.count().await.unwrap(), 0);

    let logs = SqliteTickLogRepository::new(app.database.pool.clone())
        .find_recent("BTC-USD", 5)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].state, "consolidation");
    assert_eq!(logs[0].pnl, Decimal::ZERO);
    assert_eq!(logs[0].equity, dec!(10000));
}

#[tokio::test]
async fn test_live_mode_submits_through_exchange() {
    let market = ScriptedMarket::with(breakout_series());
    let exchange = SpyExchange::funded(dec!(10000));
    let app = app(
        config(&["--live", "--strategy", "breakout", "--db", "sqlite::memory:"]),
        market,
        Some(exchange.clone()),
    )
    .await;

    let outcome = app.engine().run_cycle(after_close(20)).await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Evaluated {
            decision: Decision::Enter,
            ..
        }
    ));
    assert_eq!(exchange.submissions(), 1);

    let entry = SqliteOrderRepository::new(app.database.pool.clone())
        .last_open("BTC-USD")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.mode, TradingMode::Live);
    assert_eq!(entry.exchange_id.as_deref(), Some("cb-buy-0"));
}

#[tokio::test]
async fn test_default_ema_crossover_round_trip() {
    // Steady decline keeps EMA20 under EMA50, then a surge crosses it above
    let mut candles: Vec<_> = (0..55)
        .map(|i| {
            let close = Decimal::from(200 - i);
            bar(i, close, close + dec!(1), close - dec!(1), close)
        })
        .collect();
    candles.push(bar(55, dec!(146), dec!(601), dec!(145), dec!(600)));
    let market = ScriptedMarket::with(candles);
    let exchange = SpyExchange::funded(dec!(10000));
    let app = app(
        config(&["--paper", "--db", "sqlite::memory:"]),
        market.clone(),
        Some(exchange.clone()),
    )
    .await;
    assert_eq!(app.engine().strategy_name(), "EmaCrossover");
    let orders = SqliteOrderRepository::new(app.database.pool.clone());

    let outcome = app.engine().run_cycle(after_close(55)).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Evaluated {
            candle_ts: BASE + 55 * PERIOD,
            decision: Decision::Enter
        }
    );

    let entry = orders.last_open("BTC-USD").await.unwrap().expect("open position");
    assert_eq!(entry.price, dec!(600));
    assert_eq!(entry.stop, Some(dec!(588)));
    assert_eq!(entry.take_profit, Some(dec!(612)));
    let expected = PositionSizer::new(dec!(0.01), DEFAULT_MIN_ORDER_SIZE)
        .size(dec!(10000), dec!(600), Some(dec!(588)))
        .unwrap();
    assert_eq!(entry.amount, expected);

    // Close through the take-profit level
    market
        .push(bar(56, dec!(600), dec!(631), dec!(599), dec!(630)))
        .await;
    let outcome = app.engine().run_cycle(after_close(56)).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Evaluated {
            candle_ts: BASE + 56 * PERIOD,
            decision: Decision::Exit
        }
    );

    assert!(orders.last_open("BTC-USD").await.unwrap().is_none());
    let exit = orders
        .find_recent("BTC-USD", 10)
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.side == OrderSide::Sell)
        .expect("exit order");
    assert_eq!(exit.status, OrderStatus::Filled);
    assert_eq!(exit.price, dec!(630));
    assert_eq!(exit.pnl, Some(dec!(30) * entry.amount));
    assert_eq!(exchange.submissions(), 0);
}
