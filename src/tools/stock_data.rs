//! Stock data tools
//!
//! Each tool wraps one data-provider query. Record keys are normalized so
//! both `code` and `stock_code` resolve to the provider's `ts_code`.

use crate::models::Envelope;
use crate::provider::{normalize_date, ProviderClient};
use crate::tools::{require_str_arg, Tool};
use crate::Result;
use serde_json::{json, Map, Value};

const BASIC_FIELDS: &str = "ts_code,symbol,name,industry";
const DAILY_FIELDS: &str = "ts_code,trade_date,open,high,low,close,vol,pct_chg";

/// Standardize a provider row so agents can index it with either key style.
fn normalize_stock_record(row: &Map<String, Value>) -> Value {
    let code = row.get("ts_code").cloned().unwrap_or(Value::Null);
    json!({
        "code": code,
        "stock_code": code,
        "name": row.get("name").cloned().unwrap_or(Value::Null),
        "industry": row.get("industry").cloned().unwrap_or(Value::Null),
    })
}

fn contains_ci(haystack: &Value, needle: &str) -> bool {
    haystack
        .as_str()
        .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

pub struct SearchStockTool {
    provider: ProviderClient,
}

impl SearchStockTool {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for SearchStockTool {
    fn name(&self) -> &'static str {
        "search_stock"
    }

    fn signature(&self) -> &'static str {
        "(keyword)"
    }

    fn description(&self) -> &'static str {
        "Search for a stock code by name or code fragment. Example: '平安' -> '000001.SZ'. Returns up to 5 records with 'code', 'name', 'industry'."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let keyword = require_str_arg(args, "keyword")?;

        // The provider has no fuzzy search API, so fetch the listed-stock
        // basics and filter locally.
        let rows = match self
            .provider
            .query(
                "stock_basic",
                json!({"exchange": "", "list_status": "L"}),
                BASIC_FIELDS,
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Ok(Envelope::error(e.to_string())),
        };

        let matches: Vec<Value> = rows
            .iter()
            .filter(|row| {
                row.get("name").map(|v| contains_ci(v, &keyword)).unwrap_or(false)
                    || row
                        .get("ts_code")
                        .map(|v| contains_ci(v, &keyword))
                        .unwrap_or(false)
            })
            .take(5)
            .map(normalize_stock_record)
            .collect();

        if matches.is_empty() {
            return Ok(Envelope::empty(format!(
                "No listed stock matched '{}'. Try a shorter keyword or the exchange-suffixed code.",
                keyword
            )));
        }

        Ok(Envelope::success(Value::Array(matches)))
    }
}

pub struct CurrentPriceTool {
    provider: ProviderClient,
}

impl CurrentPriceTool {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for CurrentPriceTool {
    fn name(&self) -> &'static str {
        "get_current_price"
    }

    fn signature(&self) -> &'static str {
        "(stock_code)"
    }

    fn description(&self) -> &'static str {
        "Get the latest daily close price of a stock. Code format: '000001.SZ' or '600000.SH'."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let stock_code = require_str_arg(args, "stock_code")?;

        let rows = match self
            .provider
            .query(
                "daily",
                json!({"ts_code": stock_code, "limit": 1}),
                DAILY_FIELDS,
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Ok(Envelope::error(e.to_string())),
        };

        let Some(row) = rows.first() else {
            return Ok(Envelope::empty(format!(
                "No price data found for {}. Verify the code with search_stock, or try the previous trading day.",
                stock_code
            )));
        };

        Ok(Envelope::success(json!({
            "code": stock_code,
            "close": row.get("close").cloned().unwrap_or(Value::Null),
            "trade_date": row.get("trade_date").cloned().unwrap_or(Value::Null),
        })))
    }
}

pub struct FundamentalsTool {
    provider: ProviderClient,
}

impl FundamentalsTool {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for FundamentalsTool {
    fn name(&self) -> &'static str {
        "get_fundamentals_data"
    }

    fn signature(&self) -> &'static str {
        "(stock_code)"
    }

    fn description(&self) -> &'static str {
        "Get fundamental data (PE, PB, market cap, revenue, net profit) for a stock."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let stock_code = require_str_arg(args, "stock_code")?;

        let daily = self
            .provider
            .query(
                "daily_basic",
                json!({"ts_code": stock_code, "limit": 1}),
                "ts_code,trade_date,pe,pe_ttm,pb,total_mv",
            )
            .await;

        let income = self
            .provider
            .query(
                "income",
                json!({"ts_code": stock_code, "limit": 1}),
                "total_revenue,n_income_attr_p",
            )
            .await;

        let mut result = Map::new();

        match daily {
            Ok(rows) => {
                if let Some(row) = rows.first() {
                    let pe = row.get("pe").cloned().unwrap_or(Value::Null);
                    let pb = row.get("pb").cloned().unwrap_or(Value::Null);
                    result.insert("pe_ratio".into(), pe.clone());
                    result.insert(
                        "pe_ratio_ttm".into(),
                        row.get("pe_ttm").cloned().unwrap_or(Value::Null),
                    );
                    result.insert("pb_ratio".into(), pb.clone());
                    result.insert(
                        "market_cap".into(),
                        row.get("total_mv").cloned().unwrap_or(Value::Null),
                    );
                    // Aliases: agents often index 'pe' / 'pb' directly.
                    result.insert("pe".into(), pe);
                    result.insert("pb".into(), pb);
                }
            }
            Err(e) => return Ok(Envelope::error(e.to_string())),
        }

        if let Ok(rows) = income {
            if let Some(row) = rows.first() {
                result.insert(
                    "revenue".into(),
                    row.get("total_revenue").cloned().unwrap_or(Value::Null),
                );
                result.insert(
                    "net_profit".into(),
                    row.get("n_income_attr_p").cloned().unwrap_or(Value::Null),
                );
            }
        }

        if result.is_empty() {
            return Ok(Envelope::empty(format!(
                "No fundamentals available for {}. Verify the code with search_stock.",
                stock_code
            )));
        }

        Ok(Envelope::success(Value::Object(result)))
    }
}

pub struct IndustryStocksTool {
    provider: ProviderClient,
}

impl IndustryStocksTool {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for IndustryStocksTool {
    fn name(&self) -> &'static str {
        "get_industry_stocks"
    }

    fn signature(&self) -> &'static str {
        "(industry_name)"
    }

    fn description(&self) -> &'static str {
        "Get listed stocks in an industry. Example: '银行' or '医药'. Returns up to 20 records with 'code', 'name', 'industry'."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let industry = require_str_arg(args, "industry_name")?;

        let rows = match self
            .provider
            .query(
                "stock_basic",
                json!({"exchange": "", "list_status": "L"}),
                BASIC_FIELDS,
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Ok(Envelope::error(e.to_string())),
        };

        let matches: Vec<Value> = rows
            .iter()
            .filter(|row| {
                row.get("industry")
                    .map(|v| contains_ci(v, &industry))
                    .unwrap_or(false)
            })
            .take(20)
            .map(normalize_stock_record)
            .collect();

        if matches.is_empty() {
            return Ok(Envelope::empty(format!(
                "No industry matched '{}'. Try a broader industry name.",
                industry
            )));
        }

        Ok(Envelope::success(Value::Array(matches)))
    }
}

pub struct HistoryDataTool {
    provider: ProviderClient,
}

impl HistoryDataTool {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for HistoryDataTool {
    fn name(&self) -> &'static str {
        "get_history_data"
    }

    fn signature(&self) -> &'static str {
        "(stock_code, start_date, end_date)"
    }

    fn description(&self) -> &'static str {
        "Get historical daily OHLCV data for a stock. Dates in 'YYYYMMDD' form, oldest first."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let stock_code = require_str_arg(args, "stock_code")?;
        let start_date = normalize_date(&require_str_arg(args, "start_date")?);
        let end_date = normalize_date(&require_str_arg(args, "end_date")?);

        let mut rows = match self
            .provider
            .query(
                "daily",
                json!({
                    "ts_code": stock_code,
                    "start_date": start_date,
                    "end_date": end_date,
                }),
                DAILY_FIELDS,
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Ok(Envelope::error(e.to_string())),
        };

        if rows.is_empty() {
            return Ok(Envelope::empty(format!(
                "No trading data for {} between {} and {}. The range may fall on non-trading days.",
                stock_code, start_date, end_date
            )));
        }

        // Provider returns newest first; callers expect ascending dates.
        rows.sort_by(|a, b| {
            let date = |row: &Map<String, Value>| {
                row.get("trade_date")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            date(a).cmp(&date(b))
        });

        let records: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        Ok(Envelope::success(Value::Array(records)))
    }
}
