//! Collaborator traits called from scheduled tasks
//!
//! Implementations are owned by the embedding process and threaded
//! through constructors; the core never instantiates them. Both traits
//! are called synchronously from the scheduler worker, so implementors
//! must stay within their task's declared WCET.

use crate::ipc::messages::{MarketDataMessage, TradingSignalMessage};

/// One option contract described for pricing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionQuote {
    pub underlying_price: f64,
    pub strike_price: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
    /// Years to expiry.
    pub time_to_expiry: f64,
    pub is_call: bool,
}

/// First-order risk sensitivities plus the model price.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Option pricing backend invoked from scheduled tasks only.
pub trait PricingEngine {
    /// Model price for one option.
    fn price(&mut self, option: &OptionQuote) -> f64;

    /// Price plus sensitivities.
    fn greeks(&mut self, option: &OptionQuote) -> Greeks;

    /// Volatility implied by `market_price`; `None` when the solver does
    /// not converge.
    fn implied_vol(&mut self, option: &OptionQuote, market_price: f64) -> Option<f64>;
}

/// Trading strategy driven by the scheduled market-data and signal
/// tasks. Internal state is the strategy's own concern.
pub trait Strategy {
    /// Observe one consumed market-data record.
    fn on_market_data(&mut self, msg: &MarketDataMessage);

    /// Scan current state and append generated signals to `out`.
    fn scan_and_generate_signals(
        &mut self,
        underlying_price: f64,
        chain: &[OptionQuote],
        market: &[MarketDataMessage],
        out: &mut Vec<TradingSignalMessage>,
    );

    /// Observe an execution fill against a previously emitted signal.
    fn on_fill(&mut self, signal: &TradingSignalMessage, price: f64, quantity: i32, ts_ns: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal conforming strategy used to pin down the trait contract.
    struct Recording {
        seen: usize,
        fills: usize,
    }

    impl Strategy for Recording {
        fn on_market_data(&mut self, _msg: &MarketDataMessage) {
            self.seen += 1;
        }

        fn scan_and_generate_signals(
            &mut self,
            underlying_price: f64,
            _chain: &[OptionQuote],
            _market: &[MarketDataMessage],
            out: &mut Vec<TradingSignalMessage>,
        ) {
            if self.seen > 0 && underlying_price > 0.0 {
                let mut sig = TradingSignalMessage::new(1);
                sig.quantity = 1;
                sig.confidence = 0.5;
                out.push(sig);
            }
        }

        fn on_fill(
            &mut self,
            _signal: &TradingSignalMessage,
            _price: f64,
            _quantity: i32,
            _ts_ns: u64,
        ) {
            self.fills += 1;
        }
    }

    #[test]
    fn test_strategy_contract() {
        let mut strategy = Recording { seen: 0, fills: 0 };
        let mut out = Vec::new();

        strategy.scan_and_generate_signals(100.0, &[], &[], &mut out);
        assert!(out.is_empty(), "no data seen, no signals");

        let mut quote = MarketDataMessage::new(1);
        quote.bid = 1.0;
        quote.ask = 2.0;
        quote.underlying_price = 100.0;
        strategy.on_market_data(&quote);

        strategy.scan_and_generate_signals(100.0, &[], &[quote], &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_valid());

        strategy.on_fill(&out[0], 1.5, 1, 1);
        assert_eq!(strategy.fills, 1);
    }
}
