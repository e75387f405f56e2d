//! REST endpoint wrappers
//!
//! Thin, stateless wrappers over [`Client::send`]: build the path, pass query
//! parameters through, return the raw [`ApiResponse`]. Account numbers are
//! the encrypted hashes returned by [`Client::account_linked`].

use reqwest::Method;
use serde_json::Value;
use time::OffsetDateTime;

use crate::client::Client;
use crate::error::Result;
use crate::request::{ApiResponse, Params, TimeFormat, format_list};

/// Optional filters for [`Client::price_history`].
#[derive(Debug, Default, Clone)]
pub struct PriceHistoryQuery {
    pub period_type: Option<String>,
    pub period: Option<u32>,
    pub frequency_type: Option<String>,
    pub frequency: Option<u32>,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
    pub need_extended_hours_data: Option<bool>,
    pub need_previous_close: Option<bool>,
}

impl PriceHistoryQuery {
    fn into_params(self, symbol: &str) -> Params {
        Params::new()
            .set("symbol", symbol)
            .opt("periodType", self.period_type)
            .opt("period", self.period)
            .opt("frequencyType", self.frequency_type)
            .opt("frequency", self.frequency)
            .time("startDate", self.start, TimeFormat::EpochMillis)
            .time("endDate", self.end, TimeFormat::EpochMillis)
            .opt("needExtendedHoursData", self.need_extended_hours_data)
            .opt("needPreviousClose", self.need_previous_close)
    }
}

impl Client {
    // --- Accounts and trading ---

    /// Account numbers paired with the hashes every other account call needs.
    pub async fn account_linked(&self) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", "accountNumbers"],
            Params::new(),
            None,
        )
        .await
    }

    pub async fn account_details_all(&self, fields: Option<&str>) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", ""],
            Params::new().opt("fields", fields),
            None,
        )
        .await
    }

    pub async fn account_details(
        &self,
        account_hash: &str,
        fields: Option<&str>,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", account_hash],
            Params::new().opt("fields", fields),
            None,
        )
        .await
    }

    /// Orders for one account entered between `from` and `to` (max range 1 year).
    pub async fn account_orders(
        &self,
        account_hash: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
        max_results: Option<u32>,
        status: Option<&str>,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", account_hash, "orders"],
            order_window(from, to, max_results, status),
            None,
        )
        .await
    }

    /// Orders across all linked accounts.
    pub async fn account_orders_all(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
        max_results: Option<u32>,
        status: Option<&str>,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "orders"],
            order_window(from, to, max_results, status),
            None,
        )
        .await
    }

    /// Place an order. The new order id comes back in the `Location` header.
    pub async fn order_place(&self, account_hash: &str, order: &Value) -> Result<ApiResponse> {
        self.send(
            Method::POST,
            &["trader", "v1", "accounts", account_hash, "orders"],
            Params::new(),
            Some(order),
        )
        .await
    }

    pub async fn order_details(&self, account_hash: &str, order_id: &str) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", account_hash, "orders", order_id],
            Params::new(),
            None,
        )
        .await
    }

    pub async fn order_cancel(&self, account_hash: &str, order_id: &str) -> Result<ApiResponse> {
        self.send(
            Method::DELETE,
            &["trader", "v1", "accounts", account_hash, "orders", order_id],
            Params::new(),
            None,
        )
        .await
    }

    pub async fn order_replace(
        &self,
        account_hash: &str,
        order_id: &str,
        order: &Value,
    ) -> Result<ApiResponse> {
        self.send(
            Method::PUT,
            &["trader", "v1", "accounts", account_hash, "orders", order_id],
            Params::new(),
            Some(order),
        )
        .await
    }

    pub async fn order_preview(&self, account_hash: &str, order: &Value) -> Result<ApiResponse> {
        self.send(
            Method::POST,
            &["trader", "v1", "accounts", account_hash, "previewOrder"],
            Params::new(),
            Some(order),
        )
        .await
    }

    /// Transactions of the given `types` (e.g. `TRADE`) in a date range.
    pub async fn transactions(
        &self,
        account_hash: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        types: &str,
        symbol: Option<&str>,
    ) -> Result<ApiResponse> {
        let params = Params::new()
            .time("startDate", Some(start), TimeFormat::Iso8601)
            .time("endDate", Some(end), TimeFormat::Iso8601)
            .opt("symbol", symbol)
            .set("types", types);
        self.send(
            Method::GET,
            &["trader", "v1", "accounts", account_hash, "transactions"],
            params,
            None,
        )
        .await
    }

    pub async fn transaction_details(
        &self,
        account_hash: &str,
        transaction_id: &str,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &[
                "trader",
                "v1",
                "accounts",
                account_hash,
                "transactions",
                transaction_id,
            ],
            Params::new(),
            None,
        )
        .await
    }

    pub async fn preferences(&self) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["trader", "v1", "userPreference"],
            Params::new(),
            None,
        )
        .await
    }

    // --- Market data ---

    pub async fn quotes<S: AsRef<str>>(
        &self,
        symbols: &[S],
        fields: Option<&str>,
        indicative: bool,
    ) -> Result<ApiResponse> {
        let params = Params::new()
            .set("symbols", format_list(symbols))
            .opt("fields", fields)
            .set("indicative", indicative);
        self.send(Method::GET, &["marketdata", "v1", "quotes"], params, None)
            .await
    }

    /// Quote for one symbol. Futures (`/ES`) and other symbols are path-encoded.
    pub async fn quote(&self, symbol: &str, fields: Option<&str>) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", symbol, "quotes"],
            Params::new().opt("fields", fields),
            None,
        )
        .await
    }

    /// Option chain for `symbol`; every other filter is passed through as given.
    pub async fn option_chains(&self, symbol: &str, filters: Params) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "chains"],
            Params::new().set("symbol", symbol).extend(filters),
            None,
        )
        .await
    }

    pub async fn option_expiration_chain(&self, symbol: &str) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "expirationchain"],
            Params::new().set("symbol", symbol),
            None,
        )
        .await
    }

    pub async fn price_history(
        &self,
        symbol: &str,
        query: PriceHistoryQuery,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "pricehistory"],
            query.into_params(symbol),
            None,
        )
        .await
    }

    /// Top movers for an index such as `$DJI` or `NYSE`.
    pub async fn movers(
        &self,
        index: &str,
        sort: Option<&str>,
        frequency: Option<u32>,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "movers", index],
            Params::new().opt("sort", sort).opt("frequency", frequency),
            None,
        )
        .await
    }

    pub async fn market_hours<S: AsRef<str>>(
        &self,
        markets: &[S],
        date: Option<OffsetDateTime>,
    ) -> Result<ApiResponse> {
        let params = Params::new()
            .set("markets", format_list(markets))
            .time("date", date, TimeFormat::Date);
        self.send(Method::GET, &["marketdata", "v1", "markets"], params, None)
            .await
    }

    pub async fn market_hour(
        &self,
        market_id: &str,
        date: Option<OffsetDateTime>,
    ) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "markets", market_id],
            Params::new().time("date", date, TimeFormat::Date),
            None,
        )
        .await
    }

    pub async fn instruments(&self, symbol: &str, projection: &str) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "instruments"],
            Params::new()
                .set("symbol", symbol)
                .set("projection", projection),
            None,
        )
        .await
    }

    pub async fn instrument_cusip(&self, cusip: &str) -> Result<ApiResponse> {
        self.send(
            Method::GET,
            &["marketdata", "v1", "instruments", cusip],
            Params::new(),
            None,
        )
        .await
    }
}

fn order_window(
    from: OffsetDateTime,
    to: OffsetDateTime,
    max_results: Option<u32>,
    status: Option<&str>,
) -> Params {
    Params::new()
        .opt("maxResults", max_results)
        .time("fromEnteredTime", Some(from), TimeFormat::Iso8601)
        .time("toEnteredTime", Some(to), TimeFormat::Iso8601)
        .opt("status", status)
}
