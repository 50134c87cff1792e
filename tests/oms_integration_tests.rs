//! Integration tests for order orchestration and position closing
//!
//! Runs the OMS against an in-memory gateway that records every call.

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::RefCell;

use perp_trader::oms::{
    CloseMode, FillState, OrchestratorConfig, OrderOrchestrator, OrderStage, PositionCloser,
};
use perp_trader::{
    Balances, BotError, Candle, ExchangeGateway, LeveragePolicy, MarketInfo, OrderAck,
    OrderBookTop, OrderIntent, OrderStatus, OrderType, Position, PositionMode, PositionSide,
    Result, Side, Symbol, Timeframe,
};

// =============================================================================
// Test Utilities
// =============================================================================

/// Gateway double with a fixed book and scripted failures
struct MockGateway {
    book: Option<(Decimal, Decimal)>,
    tick_size: Decimal,
    max_leverage: Option<u32>,
    positions: Vec<Position>,
    fail_leverage: bool,
    fail_create_for: Option<String>,
    order_status: Option<OrderAck>,
    candles: Vec<Candle>,
    created: RefCell<Vec<OrderIntent>>,
    leverage_calls: RefCell<Vec<u32>>,
    mode_calls: RefCell<Vec<PositionMode>>,
    canceled: RefCell<Vec<(String, PositionSide)>>,
}

impl MockGateway {
    /// bid 99.95 / ask 100.00, tick 0.01
    fn new() -> Self {
        Self {
            book: Some((dec!(99.95), dec!(100.00))),
            tick_size: dec!(0.01),
            max_leverage: Some(100),
            positions: Vec::new(),
            fail_leverage: false,
            fail_create_for: None,
            order_status: None,
            candles: Vec::new(),
            created: RefCell::new(Vec::new()),
            leverage_calls: RefCell::new(Vec::new()),
            mode_calls: RefCell::new(Vec::new()),
            canceled: RefCell::new(Vec::new()),
        }
    }

    fn created(&self) -> Vec<OrderIntent> {
        self.created.borrow().clone()
    }
}

impl ExchangeGateway for MockGateway {
    fn market(&self, symbol: &Symbol) -> Result<MarketInfo> {
        Ok(MarketInfo {
            symbol: Symbol::new(symbol.exchange_id()),
            tick_size: self.tick_size,
            qty_step: dec!(0.001),
            max_leverage: self.max_leverage,
        })
    }

    fn fetch_balance(&self) -> Result<Balances> {
        let mut balances = Balances::new();
        balances.insert("USDT".to_string(), dec!(100));
        Ok(balances)
    }

    fn fetch_order_book(&self, symbol: &Symbol) -> Result<OrderBookTop> {
        match self.book {
            Some((bid, ask)) => Ok(OrderBookTop {
                symbol: symbol.clone(),
                best_bid: bid,
                best_ask: ask,
                timestamp: Utc::now(),
            }),
            None => Err(BotError::EmptyOrderBook(symbol.to_string())),
        }
    }

    fn fetch_ohlcv(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let skip = self.candles.len().saturating_sub(limit);
        Ok(self.candles[skip..].to_vec())
    }

    fn create_order(&self, intent: &OrderIntent) -> Result<OrderAck> {
        if self.fail_create_for.as_deref() == Some(intent.symbol.exchange_id().as_str()) {
            return Err(BotError::Exchange {
                code: 11001,
                msg: "TE_NO_ENOUGH_AVAILABLE_BALANCE".to_string(),
            });
        }
        let mut created = self.created.borrow_mut();
        created.push(intent.clone());
        Ok(OrderAck {
            order_id: format!("ord-{}", created.len()),
            client_order_id: intent.client_order_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            pos_side: intent.pos_side,
            price: intent.price,
            quantity: intent.amount,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::New,
        })
    }

    fn cancel_order(
        &self,
        _symbol: &Symbol,
        order_id: &str,
        pos_side: PositionSide,
    ) -> Result<()> {
        self.canceled
            .borrow_mut()
            .push((order_id.to_string(), pos_side));
        Ok(())
    }

    fn fetch_order(&self, _symbol: &Symbol, order_id: &str) -> Result<OrderAck> {
        self.order_status
            .clone()
            .filter(|o| o.order_id == order_id)
            .ok_or_else(|| BotError::OrderNotFound(order_id.to_string()))
    }

    fn fetch_open_orders(&self, _symbol: &Symbol) -> Result<Vec<OrderAck>> {
        Ok(self.order_status.clone().into_iter().collect())
    }

    fn set_leverage(&self, _symbol: &Symbol, leverage: u32) -> Result<()> {
        self.leverage_calls.borrow_mut().push(leverage);
        if self.fail_leverage {
            return Err(BotError::Exchange {
                code: 20003,
                msg: "TE_ERR_INVALID_LEVERAGE".to_string(),
            });
        }
        Ok(())
    }

    fn set_position_mode(&self, _symbol: &Symbol, mode: PositionMode) -> Result<()> {
        self.mode_calls.borrow_mut().push(mode);
        Ok(())
    }

    fn fetch_positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.clone())
    }
}

fn position(symbol: &str, side: PositionSide, size: Decimal) -> Position {
    Position {
        symbol: Symbol::new(symbol),
        side,
        size,
        entry_price: dec!(100),
        unrealized_pnl: Decimal::ZERO,
        mode: PositionMode::Hedged,
    }
}

fn btc() -> Symbol {
    Symbol::new("BTC/USDT")
}

// =============================================================================
// Opening Orders
// =============================================================================

#[test]
fn test_open_limit_long_prices_five_ticks_below_ask() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let ack = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap();

    assert_eq!(ack.price, Some(dec!(99.95)));
    let created = gateway.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].order_type, OrderType::Limit);
    assert_eq!(created[0].pos_side, PositionSide::Long);
    assert!(!created[0].reduce_only);
    // Amount is the minimum quantity, never the cost
    assert_eq!(created[0].amount, dec!(0.001));
}

#[test]
fn test_open_limit_tiny_leverage_clamped_to_one() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap();

    assert_eq!(*gateway.leverage_calls.borrow(), vec![1]);
    assert_eq!(*gateway.mode_calls.borrow(), vec![PositionMode::Hedged]);
}

#[test]
fn test_open_limit_short_prices_above_bid() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let ack = orchestrator
        .open_limit(&btc(), Side::Sell, dec!(20), LeveragePolicy::Derived)
        .unwrap();

    assert_eq!(ack.price, Some(dec!(100.00)));
    assert_eq!(ack.side, Side::Sell);
    assert_eq!(ack.pos_side, PositionSide::Short);
}

#[test]
fn test_derived_leverage_from_cost() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    // 0.001 * 99.95 / 0.01 = 9.995 -> 10
    orchestrator
        .open_limit(&btc(), Side::Buy, dec!(0.01), LeveragePolicy::Derived)
        .unwrap();
    assert_eq!(*gateway.leverage_calls.borrow(), vec![10]);
}

#[test]
fn test_fixed_leverage_ignores_cost() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    orchestrator
        .open_limit(&btc(), Side::Buy, dec!(0.01), LeveragePolicy::Fixed(1))
        .unwrap();
    orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Fixed(7))
        .unwrap();
    assert_eq!(*gateway.leverage_calls.borrow(), vec![1, 7]);
}

#[test]
fn test_leverage_above_market_max_fails_in_pricing() {
    let gateway = MockGateway {
        max_leverage: Some(5),
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(0.01), LeveragePolicy::Derived)
        .unwrap_err();

    assert_eq!(failure.stage, OrderStage::Pricing);
    assert!(matches!(
        failure.error,
        BotError::LeverageTooHigh {
            requested: 10,
            max: 5
        }
    ));
    assert!(gateway.created().is_empty());
    assert!(gateway.leverage_calls.borrow().is_empty());
}

#[test]
fn test_empty_book_submits_nothing() {
    let gateway = MockGateway {
        book: None,
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap_err();

    assert_eq!(failure.stage, OrderStage::FetchingBook);
    assert!(matches!(failure.error, BotError::EmptyOrderBook(_)));
    assert!(gateway.created().is_empty());
}

#[test]
fn test_offset_below_zero_fails_in_pricing() {
    // Five ticks under a 0.00003 ask is negative
    let gateway = MockGateway {
        book: Some((dec!(0.00002), dec!(0.00003))),
        tick_size: dec!(0.00001),
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Fixed(3))
        .unwrap_err();

    assert_eq!(failure.stage, OrderStage::Pricing);
    assert!(matches!(failure.error, BotError::InvalidArgument(_)));
    assert!(gateway.created().is_empty());
    assert!(gateway.leverage_calls.borrow().is_empty());
}

#[test]
fn test_invalid_cost_fails_in_pricing() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, Decimal::ZERO, LeveragePolicy::Derived)
        .unwrap_err();
    assert_eq!(failure.stage, OrderStage::Pricing);
    assert!(matches!(failure.error, BotError::InvalidArgument(_)));
}

#[test]
fn test_leverage_failure_aborts_by_default() {
    let gateway = MockGateway {
        fail_leverage: true,
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap_err();

    assert_eq!(failure.stage, OrderStage::SettingLeverage);
    assert!(failure.error.is_gateway());
    assert!(gateway.created().is_empty());
}

#[test]
fn test_leverage_failure_tolerated_when_configured() {
    let gateway = MockGateway {
        fail_leverage: true,
        ..MockGateway::new()
    };
    let config = OrchestratorConfig {
        abort_on_leverage_error: false,
        ..OrchestratorConfig::default()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, config);

    let ack = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap();
    assert_eq!(ack.order_id, "ord-1");
    assert_eq!(gateway.created().len(), 1);
}

#[test]
fn test_submit_failure_reports_stage() {
    let gateway = MockGateway {
        fail_create_for: Some("BTCUSDT".to_string()),
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let failure = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap_err();
    assert_eq!(failure.stage, OrderStage::Submitting);
    assert!(matches!(failure.error, BotError::Exchange { code: 11001, .. }));
}

#[test]
fn test_open_market_has_no_price() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let ack = orchestrator
        .open_market(&btc(), Side::Sell, dec!(0.01), LeveragePolicy::Derived)
        .unwrap();

    assert_eq!(ack.price, None);
    let created = gateway.created();
    assert_eq!(created[0].order_type, OrderType::Market);
    assert_eq!(created[0].pos_side, PositionSide::Short);
    // Short market leverage is derived from the bid: 0.001 * 99.95 / 0.01
    assert_eq!(*gateway.leverage_calls.borrow(), vec![10]);
}

#[test]
fn test_custom_offset_and_quantity() {
    let gateway = MockGateway::new();
    let config = OrchestratorConfig {
        offset_ticks: 1,
        min_order_qty: dec!(0.01),
        ..OrchestratorConfig::default()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, config);

    let ack = orchestrator
        .open_limit(&btc(), Side::Buy, dec!(20), LeveragePolicy::Derived)
        .unwrap();
    assert_eq!(ack.price, Some(dec!(99.99)));
    assert_eq!(ack.quantity, dec!(0.01));
}

// =============================================================================
// Order Inspection
// =============================================================================

#[test]
fn test_monitor_order_fill_partial() {
    let gateway = MockGateway {
        order_status: Some(OrderAck {
            order_id: "abc".to_string(),
            client_order_id: None,
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            pos_side: PositionSide::Long,
            price: Some(dec!(99.95)),
            quantity: dec!(0.003),
            filled_quantity: dec!(0.001),
            status: OrderStatus::PartiallyFilled,
        }),
        ..MockGateway::new()
    };
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    let state = orchestrator.monitor_order_fill(&btc(), "abc").unwrap();
    assert_eq!(
        state,
        FillState::Open {
            filled: dec!(0.001),
            remaining: dec!(0.002)
        }
    );
    assert_eq!(orchestrator.open_orders(&btc()).unwrap().len(), 1);
    assert!(matches!(
        orchestrator.monitor_order_fill(&btc(), "missing"),
        Err(BotError::OrderNotFound(_))
    ));
}

#[test]
fn test_cancel_order_passes_position_side() {
    let gateway = MockGateway::new();
    let orchestrator = OrderOrchestrator::new(&gateway, OrchestratorConfig::default());

    orchestrator
        .cancel_order(&btc(), "ord-9", PositionSide::Short)
        .unwrap();
    assert_eq!(
        *gateway.canceled.borrow(),
        vec![("ord-9".to_string(), PositionSide::Short)]
    );
}

// =============================================================================
// Closing Positions
// =============================================================================

#[test]
fn test_limit_close_skips_flat_and_inverts_sides() {
    let gateway = MockGateway {
        positions: vec![
            position("BTCUSDT", PositionSide::Long, dec!(0.002)),
            position("BTCUSDT", PositionSide::Short, dec!(0.001)),
            position("ETHUSDT", PositionSide::Long, Decimal::ZERO),
        ],
        ..MockGateway::new()
    };

    let outcomes = PositionCloser::new(&gateway)
        .close_positions(CloseMode::Limit, None)
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let created = gateway.created();
    assert_eq!(created[0].side, Side::Sell);
    assert_eq!(created[0].pos_side, PositionSide::Long);
    assert_eq!(created[0].price, Some(dec!(100.00)));
    assert_eq!(created[0].amount, dec!(0.002));
    assert!(created[0].reduce_only);

    assert_eq!(created[1].side, Side::Buy);
    assert_eq!(created[1].pos_side, PositionSide::Short);
    assert_eq!(created[1].price, Some(dec!(99.95)));
    assert!(created[1].reduce_only);
}

#[test]
fn test_market_close_has_no_price() {
    let gateway = MockGateway {
        positions: vec![position("BTCUSDT", PositionSide::Short, dec!(-0.004))],
        book: None,
        ..MockGateway::new()
    };

    let outcomes = PositionCloser::new(&gateway)
        .close_positions(CloseMode::Market, None)
        .unwrap();
    assert_eq!(outcomes.len(), 1);

    let created = gateway.created();
    assert_eq!(created[0].order_type, OrderType::Market);
    assert_eq!(created[0].price, None);
    assert_eq!(created[0].side, Side::Buy);
    assert_eq!(created[0].amount, dec!(0.004));
}

#[test]
fn test_close_filtered_by_symbol() {
    let gateway = MockGateway {
        positions: vec![
            position("BTCUSDT", PositionSide::Long, dec!(0.002)),
            position("ETHUSDT", PositionSide::Long, dec!(0.1)),
        ],
        ..MockGateway::new()
    };

    let outcomes = PositionCloser::new(&gateway)
        .close_positions(CloseMode::Market, Some(&Symbol::new("ETH/USDT:USDT")))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].symbol.as_str(), "ETHUSDT");
}

#[test]
fn test_close_failure_does_not_stop_others() {
    let gateway = MockGateway {
        positions: vec![
            position("BTCUSDT", PositionSide::Long, dec!(0.002)),
            position("ETHUSDT", PositionSide::Short, dec!(0.1)),
        ],
        fail_create_for: Some("BTCUSDT".to_string()),
        ..MockGateway::new()
    };

    let outcomes = PositionCloser::new(&gateway)
        .close_positions(CloseMode::Limit, None)
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert_eq!(gateway.created().len(), 1);
}

#[test]
fn test_one_way_position_closes_in_one_way_mode() {
    let mut merged = position("ETHUSDT", PositionSide::Short, dec!(0.1));
    merged.mode = PositionMode::OneWay;
    let gateway = MockGateway {
        positions: vec![merged],
        ..MockGateway::new()
    };

    PositionCloser::new(&gateway)
        .close_positions(CloseMode::Market, None)
        .unwrap();

    let created = gateway.created();
    assert_eq!(created[0].side, Side::Buy);
    assert_eq!(created[0].pos_mode, PositionMode::OneWay);
    assert!(created[0].reduce_only);
}

#[test]
fn test_limit_close_with_empty_book_is_reported() {
    let gateway = MockGateway {
        positions: vec![position("BTCUSDT", PositionSide::Long, dec!(0.002))],
        book: None,
        ..MockGateway::new()
    };

    let outcomes = PositionCloser::new(&gateway)
        .close_positions(CloseMode::Limit, None)
        .unwrap();
    assert!(matches!(
        outcomes[0].result,
        Err(BotError::EmptyOrderBook(_))
    ));
    assert!(gateway.created().is_empty());
}

// =============================================================================
// Candle Series Through the Gateway
// =============================================================================

#[test]
fn test_candle_series_from_gateway() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles = (0..30)
        .map(|i| {
            let close = 100.0 + i as f64;
            Candle {
                datetime: start + Duration::minutes(i),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect();
    let gateway = MockGateway {
        candles,
        ..MockGateway::new()
    };

    let mut series = gateway
        .candle_series(&btc(), Timeframe::from_minutes(1), 20)
        .unwrap();
    assert_eq!(series.len(), 20);
    assert_eq!(series.candles()[0].close, 110.0);

    series.add_sma(5).unwrap();
    series.add_rsi().unwrap();
    let sma = series.column("sma5").unwrap();
    assert!(sma[3].is_none());
    assert_eq!(sma[4], Some(112.0));

    // Monotonic rise: no losses, RSI pinned at 100
    let rsi = series.column("rsi").unwrap();
    assert_eq!(rsi[14], Some(100.0));
    assert!(rsi[13].is_none());
}
