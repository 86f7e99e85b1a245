// =============================================================================
// Binance REST Adapter — typed market data over the resilient client
// =============================================================================
//
// One `ExchangeClient` per API family (spot, futures), each with its own
// endpoint pool.  Signed calls get `timestamp` appended immediately before the
// HMAC-SHA256 signature is computed over the URL-encoded query; both are
// regenerated for every attempt, so a retried request is never replayed with
// a stale timestamp.
//
// SECURITY: the secret key is never logged or serialized.  The API key travels
// only as the X-MBX-APIKEY header.
// =============================================================================

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, instrument};

use super::rate_limit::WeightTracker;
use crate::client::{
    is_rate_limit_message, ClientError, Endpoint, EndpointPool, HttpMethod, HttpRequest,
    HttpResponse, RequestEnvelope, ResilientClient, RetryPolicy, Transport, WireFormat,
};
use crate::market_data::{
    Candle, LongShortRatio, OpenInterest, OrderBook, PremiumIndex, Ticker24h, Trade,
};

type HmacSha256 = Hmac<Sha256>;

// -----------------------------------------------------------------------------
// API families
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    Spot,
    Futures,
}

impl ApiFamily {
    pub fn label(self) -> &'static str {
        match self {
            ApiFamily::Spot => "spot",
            ApiFamily::Futures => "futures",
        }
    }

    /// Weight level at which the tracker starts warning (2/3 of the budget).
    fn weight_warn_threshold(self) -> u32 {
        match self {
            ApiFamily::Spot => 800,
            ApiFamily::Futures => 1600,
        }
    }
}

// -----------------------------------------------------------------------------
// Credentials & signing
// -----------------------------------------------------------------------------

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    /// Read `BINANCE_API_KEY` / `BINANCE_API_SECRET`; `None` if either is unset
    /// or empty.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("BINANCE_API_KEY").ok()?;
        let secret = std::env::var("BINANCE_API_SECRET").ok()?;
        if key.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self::new(key, secret))
    }

    /// HMAC-SHA256 hex signature of `payload`.
    pub fn sign(&self, payload: &str) -> Result<String, ClientError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ClientError::Encode(format!("invalid HMAC key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Current UNIX timestamp in milliseconds.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// -----------------------------------------------------------------------------
// Wire format
// -----------------------------------------------------------------------------

/// Query parameters in wire order plus the signing flag.
#[derive(Debug, Clone, Default)]
pub struct RestParams {
    pub query: Vec<(String, String)>,
    pub signed: bool,
}

impl RestParams {
    pub fn public<K: Into<String>, V: ToString>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            query: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
            signed: false,
        }
    }

    pub fn signed<K: Into<String>, V: ToString>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            signed: true,
            ..Self::public(pairs)
        }
    }
}

/// Binance REST request shaping: `GET {base}{path}?{query}`.
pub struct RestFormat {
    credentials: Option<Credentials>,
    weights: Arc<WeightTracker>,
    clock: fn() -> u64,
}

impl RestFormat {
    pub fn new(credentials: Option<Credentials>, weights: Arc<WeightTracker>) -> Self {
        Self {
            credentials,
            weights,
            clock: timestamp_ms,
        }
    }

    /// Replace the millisecond clock used for `timestamp`.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Encode `params` into the final query string, signing when requested.
    pub fn build_query(&self, params: &RestParams) -> Result<(String, Option<&str>), ClientError> {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &params.query {
            ser.append_pair(k, v);
        }
        if !params.signed {
            return Ok((ser.finish(), None));
        }

        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| ClientError::Encode("signed call without API credentials".into()))?;
        ser.append_pair("timestamp", &(self.clock)().to_string());
        let unsigned = ser.finish();
        let signature = creds.sign(&unsigned)?;
        Ok((
            format!("{unsigned}&signature={signature}"),
            Some(creds.api_key.as_str()),
        ))
    }
}

impl WireFormat for RestFormat {
    type Params = RestParams;

    fn encode(
        &self,
        endpoint: &Endpoint,
        envelope: &RequestEnvelope<'_, RestParams>,
    ) -> Result<HttpRequest, ClientError> {
        let (query, api_key) = self.build_query(envelope.params)?;
        let url = if query.is_empty() {
            format!("{}{}", endpoint.url(), envelope.method)
        } else {
            format!("{}{}?{}", endpoint.url(), envelope.method, query)
        };
        let headers = api_key
            .map(|k| vec![("X-MBX-APIKEY".to_string(), k.to_string())])
            .unwrap_or_default();
        Ok(HttpRequest {
            method: HttpMethod::Get,
            url,
            headers,
            body: None,
        })
    }

    fn decode(&self, endpoint: &Endpoint, body: Value) -> Result<Value, ClientError> {
        // Binance error object: {"code": -1003, "msg": "..."}
        if let (Some(code), Some(msg)) = (
            body.get("code").and_then(Value::as_i64),
            body.get("msg").and_then(Value::as_str),
        ) {
            if code < 0 {
                if is_rate_limit_message(msg) {
                    return Err(ClientError::RateLimited {
                        endpoint: endpoint.url().to_string(),
                        message: msg.to_string(),
                        retry_after: None,
                    });
                }
                return Err(ClientError::Upstream {
                    endpoint: endpoint.url().to_string(),
                    status: None,
                    message: format!("code {code}: {msg}"),
                });
            }
        }
        Ok(body)
    }

    fn observe(&self, response: &HttpResponse) {
        self.weights.update_from_headers(&response.headers);
    }
}

// -----------------------------------------------------------------------------
// Exchange client
// -----------------------------------------------------------------------------

/// Typed Binance calls for one symbol on one API family.
pub struct ExchangeClient {
    family: ApiFamily,
    symbol: String,
    weights: Arc<WeightTracker>,
    inner: ResilientClient<RestFormat>,
}

impl ExchangeClient {
    pub fn new(
        family: ApiFamily,
        symbol: impl Into<String>,
        pool: EndpointPool,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
        credentials: Option<Credentials>,
    ) -> Self {
        let weights = Arc::new(WeightTracker::new(
            family.label(),
            family.weight_warn_threshold(),
        ));
        let format = RestFormat::new(credentials, weights.clone());
        Self::with_format(family, symbol, pool, policy, transport, format, weights)
    }

    pub fn with_format(
        family: ApiFamily,
        symbol: impl Into<String>,
        pool: EndpointPool,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
        format: RestFormat,
        weights: Arc<WeightTracker>,
    ) -> Self {
        let source = format!("binance-{}", family.label());
        debug!(family = family.label(), endpoints = pool.len(), "exchange client initialised");
        Self {
            family,
            symbol: symbol.into(),
            weights,
            inner: ResilientClient::new(source, pool, policy, format, transport),
        }
    }

    pub fn family(&self) -> ApiFamily {
        self.family
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn weights(&self) -> &WeightTracker {
        &self.weights
    }

    /// Raw GET against `path`.
    pub async fn get(&self, path: &str, params: RestParams) -> Result<Value, ClientError> {
        self.inner.call(path, &params).await
    }

    // -------------------------------------------------------------------------
    // Spot family
    // -------------------------------------------------------------------------

    /// GET /api/v3/depth
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::order_book")]
    pub async fn order_book(&self, limit: u32) -> Result<OrderBook, ClientError> {
        let body = self
            .get(
                "/api/v3/depth",
                RestParams::public([("symbol", self.symbol.clone()), ("limit", limit.to_string())]),
            )
            .await?;
        OrderBook::from_json(&body).map_err(|e| self.malformed("order book", e))
    }

    /// GET /api/v3/trades
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::recent_trades")]
    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>, ClientError> {
        let body = self
            .get(
                "/api/v3/trades",
                RestParams::public([("symbol", self.symbol.clone()), ("limit", limit.to_string())]),
            )
            .await?;
        self.parse_array(&body, "trades", Trade::from_json)
    }

    /// GET /api/v3/klines
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::klines")]
    pub async fn klines(&self, interval: &str, limit: u32) -> Result<Vec<Candle>, ClientError> {
        let body = self
            .get(
                "/api/v3/klines",
                RestParams::public([
                    ("symbol", self.symbol.clone()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ]),
            )
            .await?;
        let candles = self.parse_array(&body, "klines", Candle::from_kline)?;
        debug!(interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/ticker/24hr
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::ticker_24h")]
    pub async fn ticker_24h(&self) -> Result<Ticker24h, ClientError> {
        let body = self
            .get(
                "/api/v3/ticker/24hr",
                RestParams::public([("symbol", self.symbol.clone())]),
            )
            .await?;
        Ticker24h::from_json(&body).map_err(|e| self.malformed("24h ticker", e))
    }

    // -------------------------------------------------------------------------
    // Futures family
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/premiumIndex (mark price + funding rate)
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::premium_index")]
    pub async fn premium_index(&self) -> Result<PremiumIndex, ClientError> {
        let body = self
            .get(
                "/fapi/v1/premiumIndex",
                RestParams::public([("symbol", self.symbol.clone())]),
            )
            .await?;
        PremiumIndex::from_json(&body).map_err(|e| self.malformed("premium index", e))
    }

    /// GET /fapi/v1/openInterest
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::open_interest")]
    pub async fn open_interest(&self) -> Result<OpenInterest, ClientError> {
        let body = self
            .get(
                "/fapi/v1/openInterest",
                RestParams::public([("symbol", self.symbol.clone())]),
            )
            .await?;
        OpenInterest::from_json(&body).map_err(|e| self.malformed("open interest", e))
    }

    /// GET /futures/data/globalLongShortAccountRatio, newest row last.
    #[instrument(skip(self), fields(symbol = %self.symbol), name = "exchange::long_short_ratio")]
    pub async fn long_short_ratio(
        &self,
        period: &str,
        limit: u32,
    ) -> Result<Vec<LongShortRatio>, ClientError> {
        let body = self
            .get(
                "/futures/data/globalLongShortAccountRatio",
                RestParams::public([
                    ("symbol", self.symbol.clone()),
                    ("period", period.to_string()),
                    ("limit", limit.to_string()),
                ]),
            )
            .await?;
        self.parse_array(&body, "long/short ratio", LongShortRatio::from_json)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn parse_array<T>(
        &self,
        body: &Value,
        what: &str,
        parse: impl Fn(&Value) -> anyhow::Result<T>,
    ) -> Result<Vec<T>, ClientError> {
        let rows = body
            .as_array()
            .ok_or_else(|| self.malformed(what, anyhow::anyhow!("response is not an array")))?;
        rows.iter()
            .map(|row| parse(row).map_err(|e| self.malformed(what, e)))
            .collect()
    }

    fn malformed(&self, what: &str, err: anyhow::Error) -> ClientError {
        ClientError::Upstream {
            endpoint: format!("binance-{}", self.family.label()),
            status: None,
            message: format!("malformed {what}: {err:#}"),
        }
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("family", &self.family)
            .field("symbol", &self.symbol)
            .field("weights", &self.weights)
            .finish()
    }
}
