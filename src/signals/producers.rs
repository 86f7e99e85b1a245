// =============================================================================
// Signal Producers — the six named signals built from indicator components
// =============================================================================
//
// Each producer fetches its inputs, reduces them to three weighted components
// and blends them:
//
//   direction = sign(round_half_even(Σ w · component.direction))
//   strength  = Σ w · component.strength × 100 × direction
//
// Confidence starts at a per-signal base and rises when the components agree.
// Producers never decide what a failure means: errors go back to the
// scheduler, which degrades the signal.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::scheduler::Clock;
use super::signal::SignalReading;
use crate::binance::ExchangeClient;
use crate::indicators::depth::{CvdTracker, DepthHistory, DEFAULT_HISTORY};
use crate::indicators::on_chain::OnChainMetrics;
use crate::indicators::open_interest::OpenInterestTracker;
use crate::indicators::order_flow::{Footprint, TradeDelta, WhaleFlow};
use crate::indicators::sentiment::{FundingState, LongShortState};
use crate::indicators::vwap::Vwap;
use crate::indicators::{sign, Component, IndicatorError};
use crate::market_data::MarketSnapshot;
use crate::solana::{ActiveAddressEstimator, ChainClient};
use crate::types::signal_names::{
    BLOCKCHAIN_OI, MARKET_DEPTH, ON_CHAIN, ORDER_FLOW, SCALP, SENTIMENT,
};

const TRADE_LIMIT: u32 = 1000;
const TRADE_WINDOW_MS: i64 = 60_000;
const BOOK_LIMIT: u32 = 100;
const KLINE_INTERVAL: &str = "1m";
const KLINE_LIMIT: u32 = 60;
const LS_PERIOD: &str = "5m";
const ICEBERG_MIN_QTY: f64 = 100.0;
const ICEBERG_REPETITIONS: usize = 3;
const SPOOF_DISAPPEARANCE: f64 = 0.7;

/// Blend weighted components into a signed strength in [-100, 100].
pub fn blend(parts: &[(Component, f64)]) -> f64 {
    let vote: f64 = parts
        .iter()
        .map(|(c, w)| f64::from(c.direction) * w)
        .sum();
    let direction = sign(vote.round_ties_even());
    let magnitude: f64 = parts.iter().map(|(c, w)| c.strength * w).sum();
    magnitude * 100.0 * f64::from(direction)
}

/// Every component points the same non-zero way.
fn all_agree(components: &[Component]) -> bool {
    match components.split_first() {
        Some((first, rest)) => {
            first.direction != 0 && rest.iter().all(|c| c.direction == first.direction)
        }
        None => false,
    }
}

fn pair_agrees(a: Component, b: Component) -> bool {
    a.direction != 0 && a.direction == b.direction
}

// -----------------------------------------------------------------------------
// Confidence rules
// -----------------------------------------------------------------------------

pub fn order_flow_confidence(delta: Component, footprint: Component, whale: Component) -> f64 {
    if all_agree(&[delta, footprint, whale]) {
        0.9
    } else {
        0.7
    }
}

pub fn blockchain_oi_confidence(whale: Component, oi: Component, vwap: Component) -> f64 {
    if all_agree(&[whale, oi, vwap]) {
        0.9
    } else {
        0.7
    }
}

pub fn market_depth_confidence(iceberg: Component, cvd: Component, spoofing: Component) -> f64 {
    if pair_agrees(cvd, iceberg) || pair_agrees(cvd, spoofing) {
        0.85
    } else {
        0.7
    }
}

pub fn sentiment_confidence(ls: Component, funding: Component, footprint: Component) -> f64 {
    if all_agree(&[ls, funding, footprint]) {
        0.95
    } else if pair_agrees(ls, funding) {
        0.85
    } else {
        0.7
    }
}

pub fn on_chain_confidence(tx: Component, tps: Component, addresses: Component) -> f64 {
    if all_agree(&[tx, tps, addresses]) {
        0.9
    } else {
        0.7
    }
}

pub fn scalp_confidence(delta: Component, iceberg: Component, whale: Component) -> f64 {
    if all_agree(&[delta, iceberg, whale]) {
        0.95
    } else if pair_agrees(delta, iceberg) {
        0.8
    } else {
        0.65
    }
}

// -----------------------------------------------------------------------------
// Producers
// -----------------------------------------------------------------------------

/// Where the engine gets readings and market ticks from.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn produce(&self, name: &str) -> Result<SignalReading, IndicatorError>;

    async fn market_snapshot(&self) -> Result<MarketSnapshot, IndicatorError>;
}

/// Upstream clients plus the stateful trackers the producers share.
pub struct SignalProducers {
    spot: Arc<ExchangeClient>,
    futures: Arc<ExchangeClient>,
    chain: Arc<ChainClient>,
    estimator: Arc<dyn ActiveAddressEstimator>,
    clock: Arc<dyn Clock>,
    open_interest: OpenInterestTracker,
    depth: DepthHistory,
    cvd: CvdTracker,
    whale_threshold_sol: u64,
    recent_tx_limit: usize,
}

impl SignalProducers {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spot: Arc<ExchangeClient>,
        futures: Arc<ExchangeClient>,
        chain: Arc<ChainClient>,
        estimator: Arc<dyn ActiveAddressEstimator>,
        clock: Arc<dyn Clock>,
        whale_threshold_sol: u64,
        recent_tx_limit: usize,
    ) -> Self {
        Self {
            spot,
            futures,
            chain,
            estimator,
            clock,
            open_interest: OpenInterestTracker::new(),
            depth: DepthHistory::new(DEFAULT_HISTORY),
            cvd: CvdTracker::new(DEFAULT_HISTORY),
            whale_threshold_sol,
            recent_tx_limit,
        }
    }

    pub fn spot(&self) -> &ExchangeClient {
        &self.spot
    }

    pub fn futures(&self) -> &ExchangeClient {
        &self.futures
    }

    /// Compute the signal called `name`.
    pub async fn produce_named(&self, name: &str) -> Result<SignalReading, IndicatorError> {
        match name {
            ORDER_FLOW => self.order_flow().await,
            BLOCKCHAIN_OI => self.blockchain_oi().await,
            MARKET_DEPTH => self.market_depth().await,
            SENTIMENT => self.sentiment().await,
            ON_CHAIN => self.on_chain().await,
            SCALP => self.scalp().await,
            other => Err(IndicatorError::Unsupported(other.to_string())),
        }
    }

    pub async fn order_flow(&self) -> Result<SignalReading, IndicatorError> {
        let trades = self.spot.recent_trades(TRADE_LIMIT).await?;
        let now_ms = self.now_ms();
        let delta = TradeDelta::compute(&trades, now_ms, TRADE_WINDOW_MS);
        let footprint = Footprint::compute(&trades, now_ms, TRADE_WINDOW_MS);
        let whales = self.whale_flow(delta.price).await?;

        let (d, f, w) = (
            delta.component(),
            footprint.component(),
            whales.flow_component(),
        );
        let reading = SignalReading::new(
            blend(&[(d, 0.4), (f, 0.3), (w, 0.3)]),
            order_flow_confidence(d, f, w),
        );
        Ok(reading
            .with_component("delta", &delta)
            .with_component("footprint", &footprint)
            .with_component("whale_transfers", &whales))
    }

    pub async fn blockchain_oi(&self) -> Result<SignalReading, IndicatorError> {
        let ticker = self.spot.ticker_24h().await?;
        let oi = self.futures.open_interest().await?;
        let candles = self.spot.klines(KLINE_INTERVAL, KLINE_LIMIT).await?;
        let whales = self.whale_flow(ticker.last_price).await?;

        let oi_change = self.open_interest.update(&oi, ticker.last_price);
        let vwap = Vwap::compute(&candles);

        let w = whales.activity_component();
        let o = oi_change.component();
        let v = vwap.as_ref().map(Vwap::component).unwrap_or(Component::NEUTRAL);
        let reading = SignalReading::new(
            blend(&[(w, 0.3), (o, 0.4), (v, 0.3)]),
            blockchain_oi_confidence(w, o, v),
        );
        Ok(reading
            .with_component("whale_transfers", &whales)
            .with_component("open_interest", &oi_change)
            .with_component("vwap", &vwap))
    }

    pub async fn market_depth(&self) -> Result<SignalReading, IndicatorError> {
        let book = self.spot.order_book(BOOK_LIMIT).await?;
        self.depth.record(book);
        let trades = self.spot.recent_trades(TRADE_LIMIT).await?;

        let icebergs = self.depth.icebergs(ICEBERG_MIN_QTY, ICEBERG_REPETITIONS);
        let spoofing = self.depth.spoofing(SPOOF_DISAPPEARANCE);
        let cvd = self.cvd.update(&trades, self.now_ms(), TRADE_WINDOW_MS);

        let (i, c, s) = (icebergs.component(), cvd.component(), spoofing.component());
        let reading = SignalReading::new(
            blend(&[(i, 0.3), (c, 0.4), (s, 0.3)]),
            market_depth_confidence(i, c, s),
        );
        Ok(reading
            .with_component("iceberg", &icebergs)
            .with_component("cvd", &cvd)
            .with_component("spoofing", &spoofing))
    }

    pub async fn sentiment(&self) -> Result<SignalReading, IndicatorError> {
        let rows = self.futures.long_short_ratio(LS_PERIOD, 1).await?;
        let premium = self.futures.premium_index().await?;
        let trades = self.spot.recent_trades(TRADE_LIMIT).await?;

        let ls = LongShortState::from_rows(&rows);
        let funding = FundingState::from_premium(&premium);
        let footprint = Footprint::compute(&trades, self.now_ms(), TRADE_WINDOW_MS);

        let (l, f, p) = (ls.component(), funding.component(), footprint.component());
        let reading = SignalReading::new(
            blend(&[(l, 0.4), (f, 0.3), (p, 0.3)]),
            sentiment_confidence(l, f, p),
        );
        Ok(reading
            .with_component("long_short_ratio", &ls)
            .with_component("funding_rate", &funding)
            .with_component("footprint", &footprint))
    }

    pub async fn on_chain(&self) -> Result<SignalReading, IndicatorError> {
        let sample = self.chain.recent_transactions(self.recent_tx_limit).await?;
        let tps = self.chain.tps().await?;
        let metrics = OnChainMetrics {
            transactions_count: sample.len(),
            tps,
            active_addresses: self.estimator.estimate(&sample),
        };

        let (t, s, a) = (
            metrics.tx_component(),
            metrics.tps_component(),
            metrics.address_component(),
        );
        let reading = SignalReading::new(
            blend(&[(t, 0.3), (s, 0.4), (a, 0.3)]),
            on_chain_confidence(t, s, a),
        );
        Ok(reading
            .with_component("transactions", &metrics.transactions_count)
            .with_component("tps", &metrics.tps)
            .with_component("active_addresses", &metrics.active_addresses))
    }

    pub async fn scalp(&self) -> Result<SignalReading, IndicatorError> {
        let trades = self.spot.recent_trades(TRADE_LIMIT).await?;
        let book = self.spot.order_book(BOOK_LIMIT).await?;
        self.depth.record(book);

        let delta = TradeDelta::compute(&trades, self.now_ms(), TRADE_WINDOW_MS);
        let icebergs = self.depth.icebergs(ICEBERG_MIN_QTY, ICEBERG_REPETITIONS);
        let whales = self.whale_flow(delta.price).await?;

        let (d, i, w) = (
            delta.component(),
            icebergs.component(),
            whales.activity_component(),
        );
        let reading = SignalReading::new(
            blend(&[(d, 0.5), (i, 0.3), (w, 0.2)]),
            scalp_confidence(d, i, w),
        );
        Ok(reading
            .with_component("delta", &delta)
            .with_component("iceberg", &icebergs)
            .with_component("whale_transfers", &whales))
    }

    /// 24h ticker plus whatever futures context is available.  Only the
    /// ticker is required.
    pub async fn snapshot(&self) -> Result<MarketSnapshot, IndicatorError> {
        let ticker = self.spot.ticker_24h().await?;
        let open_interest = optional(self.futures.open_interest().await, "open interest");
        let premium = optional(self.futures.premium_index().await, "premium index");
        let long_short = optional(self.futures.long_short_ratio(LS_PERIOD, 1).await, "long/short ratio")
            .and_then(|rows| rows.into_iter().last());
        Ok(MarketSnapshot::assemble(
            self.clock.now(),
            &ticker,
            open_interest.as_ref(),
            premium.as_ref(),
            long_short.as_ref(),
        ))
    }

    /// VWAP over the last hour of 1m candles, for the console.
    pub async fn vwap(&self) -> Result<Option<Vwap>, IndicatorError> {
        let candles = self.spot.klines(KLINE_INTERVAL, KLINE_LIMIT).await?;
        Ok(Vwap::compute(&candles))
    }

    /// Newest long/short row, for the console.
    pub async fn long_short(&self) -> Result<LongShortState, IndicatorError> {
        let rows = self.futures.long_short_ratio(LS_PERIOD, 1).await?;
        Ok(LongShortState::from_rows(&rows))
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    async fn whale_flow(&self, sol_price: f64) -> Result<WhaleFlow, IndicatorError> {
        let whales = self.chain.whale_transfers(self.whale_threshold_sol).await?;
        let flow = WhaleFlow::summarize(&whales, sol_price);
        debug!(
            transfers = flow.transfers.len(),
            total_usd = flow.total_usd,
            net_flow_usd = flow.net_flow_usd(),
            "whale flow summarised"
        );
        Ok(flow)
    }
}

#[async_trait]
impl SignalSource for SignalProducers {
    async fn produce(&self, name: &str) -> Result<SignalReading, IndicatorError> {
        self.produce_named(name).await
    }

    async fn market_snapshot(&self) -> Result<MarketSnapshot, IndicatorError> {
        self.snapshot().await
    }
}

fn optional<T>(result: Result<T, crate::client::ClientError>, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "{what} unavailable for market snapshot");
            None
        }
    }
}

impl std::fmt::Debug for SignalProducers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalProducers")
            .field("whale_threshold_sol", &self.whale_threshold_sol)
            .field("depth_snapshots", &self.depth.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::ApiFamily;
    use crate::client::resilient::tests::ScriptedTransport;
    use crate::client::{EndpointPool, RetryPolicy};
    use crate::signals::scheduler::ManualClock;
    use crate::solana::{DistinctAddressEstimator, Pacing};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn up(strength: f64) -> Component {
        Component::new(1, strength)
    }

    fn down(strength: f64) -> Component {
        Component::new(-1, strength)
    }

    #[test]
    fn blend_rounds_vote_half_to_even() {
        // 0.4 rounds to zero: no direction, no strength
        assert_eq!(blend(&[(up(1.0), 0.4), (Component::NEUTRAL, 0.6)]), 0.0);
        // 0.5 ties to even (zero)
        assert_eq!(blend(&[(up(1.0), 0.5), (Component::NEUTRAL, 0.5)]), 0.0);
        // 0.6 rounds to one
        let s = blend(&[(up(0.5), 0.6), (Component::NEUTRAL, 0.4)]);
        assert!((s - 30.0).abs() < 1e-9);
    }

    #[test]
    fn blend_strength_is_signed_by_direction() {
        let s = blend(&[(down(1.0), 0.4), (down(0.5), 0.3), (up(1.0), 0.3)]);
        // vote = -0.4; rounds to 0
        assert_eq!(s, 0.0);

        let s = blend(&[(down(1.0), 0.4), (down(0.5), 0.3), (down(0.2), 0.3)]);
        assert!((s - -61.0).abs() < 1e-9);
    }

    #[test]
    fn agreement_rules() {
        let n = Component::NEUTRAL;
        assert_eq!(order_flow_confidence(up(0.1), up(0.2), up(0.3)), 0.9);
        assert_eq!(order_flow_confidence(n, n, n), 0.7);
        assert_eq!(blockchain_oi_confidence(down(1.0), down(1.0), up(1.0)), 0.7);

        assert_eq!(market_depth_confidence(up(1.0), up(1.0), down(1.0)), 0.85);
        assert_eq!(market_depth_confidence(down(1.0), up(1.0), up(1.0)), 0.85);
        assert_eq!(market_depth_confidence(up(1.0), n, up(1.0)), 0.7);

        assert_eq!(sentiment_confidence(down(1.0), down(1.0), up(1.0)), 0.85);
        assert_eq!(sentiment_confidence(down(1.0), down(1.0), down(1.0)), 0.95);
        assert_eq!(sentiment_confidence(n, n, down(1.0)), 0.7);

        assert_eq!(on_chain_confidence(up(1.0), up(1.0), up(1.0)), 0.9);

        assert_eq!(scalp_confidence(n, n, n), 0.65);
        assert_eq!(scalp_confidence(up(1.0), up(1.0), down(1.0)), 0.8);
        assert_eq!(scalp_confidence(up(1.0), up(1.0), up(1.0)), 0.95);
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        spot: Arc<ScriptedTransport>,
        futures: Arc<ScriptedTransport>,
        producers: SignalProducers,
    }

    fn fixture() -> Fixture {
        let spot = Arc::new(ScriptedTransport::new());
        let futures = Arc::new(ScriptedTransport::new());
        let rpc = Arc::new(ScriptedTransport::new());
        let exchange = |family: ApiFamily, transport: Arc<ScriptedTransport>, url: &str| {
            Arc::new(ExchangeClient::new(
                family,
                "SOLUSDT",
                EndpointPool::new([url]).unwrap(),
                RetryPolicy::default(),
                transport,
                None,
            ))
        };
        let producers = SignalProducers::new(
            exchange(ApiFamily::Spot, spot.clone(), "https://spot"),
            exchange(ApiFamily::Futures, futures.clone(), "https://futures"),
            Arc::new(ChainClient::new(
                EndpointPool::new(["https://rpc"]).unwrap(),
                RetryPolicy::default(),
                rpc,
                Pacing::default(),
            )),
            Arc::new(DistinctAddressEstimator::default()),
            ManualClock::new(t0()),
            500,
            25,
        );
        Fixture {
            spot,
            futures,
            producers,
        }
    }

    #[tokio::test]
    async fn sentiment_blends_crowding_funding_and_footprint() {
        let fx = fixture();
        let now = t0().timestamp_millis();

        fx.futures
            .respond(
                200,
                &json!([{
                    "symbol": "SOLUSDT", "longShortRatio": "2.0",
                    "longAccount": "0.6", "shortAccount": "0.3",
                    "timestamp": now - 60_000
                }])
                .to_string(),
            )
            .respond(
                200,
                &json!({
                    "symbol": "SOLUSDT", "markPrice": "145.0", "indexPrice": "145.0",
                    "lastFundingRate": "0.0005", "nextFundingTime": now + 3_600_000
                })
                .to_string(),
            );
        fx.spot.respond(
            200,
            &json!([
                { "id": 1, "price": "145.00", "qty": "150.0", "quoteQty": "21750",
                  "time": now - 2_000, "isBuyerMaker": true },
                { "id": 2, "price": "145.01", "qty": "150.0", "quoteQty": "21751.5",
                  "time": now - 1_000, "isBuyerMaker": true }
            ])
            .to_string(),
        );

        let reading = fx.producers.produce_named(SENTIMENT).await.unwrap();

        // ls: crowded long => -1 @ 0.5, funding 0.05% => -1 @ 0.05,
        // footprint: 300 sold => -1 @ 1.0
        assert!((reading.strength - -51.5).abs() < 1e-6);
        assert_eq!(reading.confidence, 0.95);
        assert_eq!(reading.components["long_short_ratio"]["bias"], "CROWDED_LONG");
        assert_eq!(reading.components.len(), 3);
    }

    #[tokio::test]
    async fn snapshot_tolerates_missing_futures_context() {
        let fx = fixture();
        fx.spot.respond(
            200,
            &json!({
                "symbol": "SOLUSDT", "lastPrice": "145.5", "priceChangePercent": "-1.2",
                "highPrice": "150.0", "lowPrice": "140.0", "volume": "1000.0",
                "quoteVolume": "145500.0"
            })
            .to_string(),
        );
        fx.futures
            .respond(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .respond(
                200,
                &json!({
                    "symbol": "SOLUSDT", "markPrice": "145.4", "indexPrice": "145.3",
                    "lastFundingRate": "0.0001", "nextFundingTime": 0
                })
                .to_string(),
            )
            .respond(200, "[]");

        let snap = fx.producers.snapshot().await.unwrap();
        assert_eq!(snap.timestamp, t0());
        assert_eq!(snap.price, 145.5);
        assert_eq!(snap.open_interest, None);
        assert_eq!(snap.funding_rate, Some(0.0001));
        assert_eq!(snap.long_short_ratio, None);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_exhaustion_surfaces_to_the_caller() {
        let fx = fixture();
        // empty script: every request answers 500
        let err = fx.producers.produce_named(SCALP).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(fx.spot.calls.lock().len(), 4);
    }

    #[tokio::test]
    async fn unknown_signal_is_unsupported() {
        let fx = fixture();
        let err = fx.producers.produce_named("TEA_LEAVES").await.unwrap_err();
        assert!(matches!(err, IndicatorError::Unsupported(name) if name == "TEA_LEAVES"));
    }
}
