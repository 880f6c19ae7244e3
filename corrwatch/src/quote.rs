//! Upstream price API
//!
//! [`QuoteSource`] is the capability the poll loop depends on; [`FinnhubClient`] implements it
//! against Finnhub's `/quote` REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{error::FetchError, sample::Symbol};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1/";

/// Finnhub accepts the API key as a header, which keeps it out of request URLs.
const TOKEN_HEADER: &str = "x-finnhub-token";

/// Default timeout for a single quote request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Latest quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub current_price: f64,
    /// Exchange timestamp of the quote, if the upstream provided one.
    pub timestamp: Option<DateTime<Utc>>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
}

/// Source of current prices.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError>;
}

#[async_trait]
impl<Q> QuoteSource for std::sync::Arc<Q>
where
    Q: QuoteSource + ?Sized,
{
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        (**self).fetch_quote(symbol).await
    }
}

/// Finnhub REST client configuration.
#[derive(Clone)]
pub struct FinnhubConfig {
    pub api_key: String,
    pub base_url: Url,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for FinnhubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FinnhubConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set API base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

pub(crate) fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}

/// Finnhub `/quote` response, eg/
/// `{"c":261.74,"h":263.31,"l":260.68,"o":261.07,"pc":259.45,"t":1582641000}`
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(rename = "c")]
    current: Option<f64>,
    #[serde(rename = "h", default)]
    high: Option<f64>,
    #[serde(rename = "l", default)]
    low: Option<f64>,
    #[serde(rename = "o", default)]
    open: Option<f64>,
    #[serde(rename = "pc", default)]
    previous_close: Option<f64>,
    #[serde(rename = "t", default)]
    timestamp: Option<i64>,
}

impl FinnhubQuote {
    /// Validate into a [`Quote`]. Finnhub answers unknown symbols with an all-zero payload, so a
    /// non-positive current price is rejected rather than recorded.
    fn into_quote(self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let current_price = self.current.ok_or_else(|| {
            FetchError::Malformed(format!("{symbol}: missing current price"))
        })?;
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(FetchError::Malformed(format!(
                "{symbol}: current price {current_price} is not positive"
            )));
        }

        let non_zero = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);

        Ok(Quote {
            symbol: symbol.clone(),
            current_price,
            timestamp: self
                .timestamp
                .filter(|t| *t > 0)
                .and_then(|t| Utc.timestamp_opt(t, 0).single()),
            open: non_zero(self.open),
            high: non_zero(self.high),
            low: non_zero(self.low),
            previous_close: non_zero(self.previous_close),
        })
    }
}

/// Parse a raw `/quote` body.
pub fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, FetchError> {
    serde_json::from_str::<FinnhubQuote>(body)
        .map_err(|error| FetchError::Malformed(format!("{symbol}: {error}")))?
        .into_quote(symbol)
}

/// Finnhub REST client.
#[derive(Debug, Clone)]
pub struct FinnhubClient {
    client: Client,
    config: FinnhubConfig,
}

impl FinnhubClient {
    pub fn new(config: FinnhubConfig) -> Result<Self, FetchError> {
        let mut token = header::HeaderValue::from_str(&config.api_key).map_err(|_| {
            FetchError::Malformed("api key is not a valid header value".to_string())
        })?;
        token.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(header::HeaderName::from_static(TOKEN_HEADER), token);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("corrwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn quote_url(&self) -> Result<Url, FetchError> {
        self.config
            .base_url
            .join("quote")
            .map_err(|error| FetchError::Network(format!("invalid base url: {error}")))
    }
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let response = self
            .client
            .get(self.quote_url()?)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(FetchError::ContentType(content_type));
        }

        let body = response.text().await?;
        let quote = parse_quote(symbol, &body)?;
        debug!(%symbol, price = quote.current_price, "quote fetched");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::new("AAPL").unwrap()
    }

    #[test]
    fn test_parse_quote() {
        let body = concat!(
            r#"{"c":261.74,"d":2.29,"dp":0.8826,"h":263.31,"l":260.68,"#,
            r#""o":261.07,"pc":259.45,"t":1582641000}"#,
        );
        let quote = parse_quote(&aapl(), body).unwrap();

        assert_eq!(quote.symbol, aapl());
        assert_eq!(quote.current_price, 261.74);
        assert_eq!(quote.high, Some(263.31));
        assert_eq!(quote.previous_close, Some(259.45));
        assert_eq!(quote.timestamp, Utc.timestamp_opt(1582641000, 0).single());
    }

    #[test]
    fn test_parse_quote_unknown_symbol_is_malformed() {
        let body = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        let error = parse_quote(&aapl(), body).unwrap_err();
        assert!(matches!(error, FetchError::Malformed(_)));
    }

    #[test]
    fn test_parse_quote_invalid_payloads() {
        struct TestCase {
            body: &'static str,
        }

        let tests = vec![
            // TC0: missing current price
            TestCase { body: r#"{"h":1.0}"# },
            // TC1: null current price
            TestCase { body: r#"{"c":null}"# },
            // TC2: not json
            TestCase { body: "<html>rate limited</html>" },
            // TC3: wrong type
            TestCase { body: r#"{"c":"261.74"}"# },
            // TC4: negative price
            TestCase { body: r#"{"c":-1.5}"# },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = parse_quote(&aapl(), test.body);
            assert!(
                matches!(actual, Err(FetchError::Malformed(_))),
                "TC{} failed: {:?}",
                index,
                actual
            );
        }
    }

    #[test]
    fn test_quote_url_joins_base() {
        let config = FinnhubConfig::new("key")
            .with_base_url(Url::parse("http://127.0.0.1:8080/api/v1/").unwrap());
        let client = FinnhubClient::new(config).unwrap();
        assert_eq!(
            client.quote_url().unwrap().as_str(),
            "http://127.0.0.1:8080/api/v1/quote"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_does_not_expose_api_key() {
        let config = FinnhubConfig::new("SUPER_SECRET_KEY")
            .with_base_url(Url::parse("http://127.0.0.1:9/api/v1/").unwrap())
            .with_request_timeout(Duration::from_secs(5));
        let client = FinnhubClient::new(config).unwrap();

        let error = client.fetch_quote(&aapl()).await.unwrap_err();

        assert!(error.is_transient(), "{error:?}");
        assert!(!error.to_string().contains("SUPER_SECRET_KEY"), "{error}");
        assert!(!format!("{error:?}").contains("SUPER_SECRET_KEY"), "{error:?}");
    }

    #[test]
    fn test_api_key_must_be_a_valid_header_value() {
        let error = FinnhubClient::new(FinnhubConfig::new("bad\nkey")).unwrap_err();
        assert!(matches!(error, FetchError::Malformed(_)));
    }

    #[test]
    fn test_config_debug_redacts_api_key() {
        let config = FinnhubConfig::new("super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
