//! Tool-Response Classifier
//!
//! Tool results reach the client as opaque JSON text. [`classify`] decodes that text
//! into the [`DisplayCard`] the dashboard side panel should render. Decoding never
//! fails: anything unrecognizable becomes [`DisplayCard::Error`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_CARD: &str = "Unknown card type";
const NOT_AVAILABLE: &str = "N/A";

/// Detail view of a single agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetails {
    pub agent_name: String,
    pub mindshare: Option<String>,
    pub market_cap: Option<String>,
    pub price: Option<String>,
    pub holders_count: Option<u64>,
}

impl AgentDetails {
    /// Decodes an agent payload, formatting the money-like fields to two decimals.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            agent_name: string_field(payload, "agentName").unwrap_or_default(),
            mindshare: number_field(payload, "mindshare").map(fixed2),
            market_cap: number_field(payload, "marketCap").map(fixed2),
            price: number_field(payload, "price").map(fixed2),
            holders_count: payload.get("holdersCount").and_then(Value::as_u64),
        }
    }

    /// Plain-text digest appended to a chat prompt. Missing values (and a zero
    /// holder count) read as `N/A`.
    pub fn summary(&self) -> String {
        let or_na = |value: Option<&str>| value.unwrap_or(NOT_AVAILABLE).to_string();
        let name = Some(self.agent_name.as_str()).filter(|name| !name.is_empty());
        let holders = self
            .holders_count
            .filter(|count| *count > 0)
            .map_or_else(|| NOT_AVAILABLE.to_string(), |count| count.to_string());

        format!(
            "Agent Name: {}\nMindshare: {}\nMarket Cap: ${}\nPrice: ${}\nHolders: {}",
            or_na(name),
            or_na(self.mindshare.as_deref()),
            or_na(self.market_cap.as_deref()),
            or_na(self.price.as_deref()),
            holders,
        )
    }
}

/// A row of the paged agents table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentListItem {
    pub name: String,
    pub mindshare: String,
    /// Filled from the row's `mindshareDeltaPercent`, not its market cap.
    pub market_cap: String,
}

impl AgentListItem {
    fn from_row(row: &Value) -> Self {
        Self {
            name: string_field(row, "agentName").unwrap_or_default(),
            mindshare: number_field(row, "mindshare").map_or_else(|| NOT_AVAILABLE.into(), fixed2),
            market_cap: number_field(row, "mindshareDeltaPercent")
                .map_or_else(|| NOT_AVAILABLE.into(), fixed2),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub name: String,
    pub symbol: Option<String>,
    pub price: Option<String>,
}

impl Asset {
    fn from_item(item: &Value) -> Self {
        Self {
            name: string_field(item, "name").unwrap_or_default(),
            symbol: string_field(item, "symbol"),
            price: number_field(item, "price").map(fixed2),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl Provider {
    fn from_item(item: &Value) -> Self {
        Self {
            name: string_field(item, "name").unwrap_or_default(),
            description: string_field(item, "description"),
            url: string_field(item, "url"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateMetrics {
    pub current_rate: f64,
    pub historical_rates: Vec<f64>,
}

/// What the side panel renders. A newly classified tool result replaces the current card.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayCard {
    AgentDetails(AgentDetails),
    AgentsList { items: Vec<AgentListItem> },
    Assets { items: Vec<Asset> },
    Providers { items: Vec<Provider> },
    Metrics(RateMetrics),
    Error { message: String },
}

impl DisplayCard {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Classifies the JSON text of a tool result. Never panics and never fails.
pub fn classify(json_text: &str) -> DisplayCard {
    match serde_json::from_str::<Value>(json_text) {
        Ok(payload) => classify_value(&payload),
        Err(e) => DisplayCard::error(e.to_string()),
    }
}

/// Guard clauses, first match wins:
/// 1. paged listing (`currentPage >= 1`) → agents list
/// 2. non-empty `agentName` → agent details
/// 3. `type` discriminator, or a bare `name` → the matching collection card
/// 4. anything else → unknown card error
pub fn classify_value(payload: &Value) -> DisplayCard {
    if number_field(payload, "currentPage").is_some_and(|page| page >= 1.0) {
        return DisplayCard::AgentsList {
            items: items(payload, "data")
                .iter()
                .map(AgentListItem::from_row)
                .collect(),
        };
    }

    if string_field(payload, "agentName").is_some_and(|name| !name.is_empty()) {
        return DisplayCard::AgentDetails(AgentDetails::from_payload(payload));
    }

    match payload.get("type").and_then(Value::as_str) {
        Some("assets") => {
            return DisplayCard::Assets {
                items: collection(payload).iter().map(Asset::from_item).collect(),
            };
        }
        Some("agents") => {
            return DisplayCard::AgentsList {
                items: collection(payload)
                    .iter()
                    .map(AgentListItem::from_row)
                    .collect(),
            };
        }
        Some("providers") => {
            return DisplayCard::Providers {
                items: collection(payload).iter().map(Provider::from_item).collect(),
            };
        }
        Some("metrics") => {
            if let Some(current_rate) = number_field(payload, "currentRate") {
                return DisplayCard::Metrics(RateMetrics {
                    current_rate,
                    historical_rates: items(payload, "historicalRates")
                        .iter()
                        .filter_map(|point| number(point).or_else(|| number_field(point, "rate")))
                        .collect(),
                });
            }
        }
        _ => {}
    }

    if string_field(payload, "name").is_some() {
        return DisplayCard::Providers {
            items: vec![Provider::from_item(payload)],
        };
    }

    DisplayCard::error(UNKNOWN_CARD)
}

/// Formats `value` with exactly two decimals, rounding half up on its shortest
/// decimal representation (so `1.005` gives `"1.01"`).
pub fn fixed2(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));

    let mut digits: Vec<u8> = int_part.bytes().map(|b| b - b'0').collect();
    let mut frac = frac_part.bytes().map(|b| b - b'0');
    digits.push(frac.next().unwrap_or(0));
    digits.push(frac.next().unwrap_or(0));

    if frac.next().is_some_and(|d| d >= 5) {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - 2;
    let render = |ds: &[u8]| ds.iter().map(|d| char::from(b'0' + d)).collect::<String>();
    let sign = if value.is_sign_negative() && digits.iter().any(|&d| d != 0) {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, render(&digits[..split]), render(&digits[split..]))
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_field(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(number)
}

fn items<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// `items`, falling back to `data`.
fn collection(payload: &Value) -> &[Value] {
    match items(payload, "items") {
        [] => items(payload, "data"),
        found => found,
    }
}
