//! In-process broker that fills every order immediately.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::domain::config::{BrokerSettings, CommissionSettings};
use crate::domain::error::ScizorError;
use crate::domain::order::{Order, OrderSide, OrderStatus};
use crate::ports::broker_port::{AccountInfo, Broker, BrokerPosition};

pub const MOCK_ACCOUNT_ID: &str = "MOCK_ACCOUNT";
pub const DEFAULT_REFERENCE_PRICE: f64 = 100.0;
pub const DEFAULT_MOCK_CASH: f64 = 100_000.0;

pub struct MockBroker {
    connected: bool,
    refuse_connections: bool,
    paper_trading: bool,
    orders: HashMap<String, Order>,
    holdings: BTreeMap<String, i64>,
    reference_prices: HashMap<String, f64>,
    cash: f64,
    commission: CommissionSettings,
    order_counter: u64,
}

impl Default for MockBroker {
    fn default() -> Self {
        MockBroker::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        MockBroker {
            connected: false,
            refuse_connections: false,
            paper_trading: true,
            orders: HashMap::new(),
            holdings: BTreeMap::new(),
            reference_prices: HashMap::new(),
            cash: DEFAULT_MOCK_CASH,
            commission: CommissionSettings {
                rate: 0.0,
                per_share: false,
            },
            order_counter: 0,
        }
    }

    pub fn from_settings(settings: &BrokerSettings, cash: f64, commission: CommissionSettings) -> Self {
        MockBroker {
            paper_trading: settings.paper_trading,
            ..MockBroker::new().with_cash(cash).with_commission(commission)
        }
    }

    pub fn with_cash(mut self, cash: f64) -> Self {
        self.cash = cash;
        self
    }

    pub fn with_commission(mut self, commission: CommissionSettings) -> Self {
        self.commission = commission;
        self
    }

    pub fn with_reference_price(mut self, symbol: &str, price: f64) -> Self {
        self.reference_prices.insert(symbol.to_string(), price);
        self
    }

    /// `connect` answers `Ok(false)`.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holding(&self, symbol: &str) -> i64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn reference_price(&self, symbol: &str) -> f64 {
        self.reference_prices
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_REFERENCE_PRICE)
    }

    fn positions_value(&self) -> f64 {
        self.holdings
            .iter()
            .map(|(symbol, &qty)| qty as f64 * self.reference_price(symbol))
            .sum()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn connect(&mut self) -> Result<bool, ScizorError> {
        if self.refuse_connections {
            return Ok(false);
        }
        self.connected = true;
        info!(paper_trading = self.paper_trading, "connected to mock broker");
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<(), ScizorError> {
        self.connected = false;
        info!("disconnected from mock broker");
        Ok(())
    }

    async fn place_order(&mut self, order: &mut Order) -> Result<String, ScizorError> {
        if !self.connected {
            return Err(ScizorError::NotConnected);
        }
        if order.quantity <= 0 {
            order.status = OrderStatus::Rejected;
            return Err(ScizorError::broker(format!(
                "invalid quantity {} for {}",
                order.quantity, order.symbol
            )));
        }

        self.order_counter += 1;
        let order_id = format!("MOCK_{}", self.order_counter);
        let fill_price = order.price.unwrap_or_else(|| self.reference_price(&order.symbol));

        let held = self.holding(&order.symbol);
        match order.side {
            OrderSide::Buy => {
                let cost = order.quantity as f64 * fill_price;
                self.cash -= cost + self.commission.for_fill(order.quantity, fill_price);
                self.holdings
                    .insert(order.symbol.clone(), held + order.quantity);
            }
            OrderSide::Sell => {
                let sold = order.quantity.min(held);
                let proceeds = sold as f64 * fill_price;
                self.cash += proceeds - self.commission.for_fill(sold, fill_price);
                self.holdings.insert(order.symbol.clone(), held - sold);
            }
        }

        order.order_id = Some(order_id.clone());
        order.status = OrderStatus::Filled;
        self.orders.insert(order_id.clone(), order.clone());

        debug!(
            order_id = %order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            price = fill_price,
            "mock order filled"
        );
        Ok(order_id)
    }

    async fn cancel_order(&mut self, order_id: &str) -> Result<bool, ScizorError> {
        match self.orders.get_mut(order_id) {
            Some(order) => {
                order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Option<Order>, ScizorError> {
        Ok(self.orders.get(order_id).cloned())
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, ScizorError> {
        Ok(self
            .holdings
            .iter()
            .filter(|(_, qty)| **qty > 0)
            .map(|(symbol, &quantity)| BrokerPosition {
                symbol: symbol.clone(),
                quantity,
                market_value: quantity as f64 * self.reference_price(symbol),
                unrealized_pnl: 0.0,
            })
            .collect())
    }

    async fn get_account_info(&self) -> Result<AccountInfo, ScizorError> {
        let positions_value = self.positions_value();
        Ok(AccountInfo {
            account_id: MOCK_ACCOUNT_ID.to_string(),
            cash: self.cash,
            buying_power: self.cash.max(0.0),
            positions_value,
            total_value: self.cash + positions_value,
            paper_trading: self.paper_trading,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
