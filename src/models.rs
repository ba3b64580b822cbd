use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Response Variants ============

/// A single car suggested by the text provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarEntry {
    pub id: String,
    pub name: String,
    /// Whole-unit price. Fractional, negative or out-of-range input is rejected.
    #[serde(deserialize_with = "deserialize_price")]
    pub price: u64,
    pub color: String,
}

/// Structured output of the text provider, discriminated by `responseType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "snake_case")]
pub enum LlmResponse {
    CarRecommendations {
        reply: String,
        cars: Vec<CarEntry>,
    },
    Advice {
        reply: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        advice: Option<Vec<String>>,
    },
    Clarification {
        reply: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        questions: Option<Vec<String>>,
    },
    General {
        reply: String,
    },
}

impl LlmResponse {
    pub fn reply(&self) -> &str {
        match self {
            LlmResponse::CarRecommendations { reply, .. }
            | LlmResponse::Advice { reply, .. }
            | LlmResponse::Clarification { reply, .. }
            | LlmResponse::General { reply } => reply,
        }
    }

    pub fn response_type(&self) -> ResponseType {
        match self {
            LlmResponse::CarRecommendations { .. } => ResponseType::CarRecommendations,
            LlmResponse::Advice { .. } => ResponseType::Advice,
            LlmResponse::Clarification { .. } => ResponseType::Clarification,
            LlmResponse::General { .. } => ResponseType::General,
        }
    }
}

/// The tag values a response may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    CarRecommendations,
    Advice,
    Clarification,
    General,
}

impl ResponseType {
    pub const ALL: [ResponseType; 4] = [
        ResponseType::CarRecommendations,
        ResponseType::Advice,
        ResponseType::Clarification,
        ResponseType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::CarRecommendations => "car_recommendations",
            ResponseType::Advice => "advice",
            ResponseType::Clarification => "clarification",
            ResponseType::General => "general",
        }
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResponseType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown responseType '{}'", s))
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    // 2^64; every integral f64 below it fits in a u64.
    const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= U64_BOUND {
        return Err(de::Error::custom(format!("invalid price {}", value)));
    }
    Ok(value as u64)
}

// ============ Caller-facing Response ============

/// Dealer attached to a recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dealer {
    pub name: String,
    pub email: String,
}

/// A car entry with its assigned dealer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub color: String,
    pub dealer: Dealer,
}

/// Tag-specific part of a [`ChatResponse`]. Only the active tag's field exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "snake_case")]
pub enum ResponsePayload {
    CarRecommendations {
        recommendations: Vec<Recommendation>,
    },
    Advice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        advice: Option<Vec<String>>,
    },
    Clarification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        questions: Option<Vec<String>>,
    },
    General,
}

impl ResponsePayload {
    pub fn response_type(&self) -> ResponseType {
        match self {
            ResponsePayload::CarRecommendations { .. } => ResponseType::CarRecommendations,
            ResponsePayload::Advice { .. } => ResponseType::Advice,
            ResponsePayload::Clarification { .. } => ResponseType::Clarification,
            ResponsePayload::General => ResponseType::General,
        }
    }
}

/// Body returned by `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

// ============ Chat History ============

/// Sentinel user id for requests without a verified identity.
pub const ANONYMOUS_USER: &str = "anonymous";

/// One persisted request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExchange {
    pub id: Uuid,
    pub user_id: String,
    pub user_message: String,
    pub assistant_reply: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(user_id: impl Into<String>, user_message: impl Into<String>, response: &ChatResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            user_message: user_message.into(),
            assistant_reply: response.reply.clone(),
            payload: response.payload.clone(),
            confidence: response.confidence,
            created_at: Utc::now(),
        }
    }

    pub fn response_type(&self) -> ResponseType {
        self.payload.response_type()
    }
}

// ============ Lead Email ============

/// Raw body of `POST /email/send-email`. Validated into a `LeadEmailRequest`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailPayload {
    pub dealer_email: Option<String>,
    pub car_name: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub sender_phone: Option<String>,
    pub message: Option<String>,
}

// ============ Dealer Onboarding ============

/// Raw body of `POST /dealers/onboard`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerOnboardingRequest {
    pub dealership_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    pub staff_capacity: Option<String>,
    pub inventory_range: Option<String>,
    pub db_host: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub db_port: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(format!("unknown application status '{}'", other)),
        }
    }
}

/// Connection details a dealer shares for inventory sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConnection {
    pub host: String,
    pub port: String,
    pub db_name: String,
    pub username: String,
    /// Sealed with the credential cipher; never the plaintext.
    pub password: String,
}

/// Placeholder returned instead of the sealed password.
pub const REDACTED_PASSWORD: &str = "[ENCRYPTED]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerApplication {
    pub id: Uuid,
    pub dealership_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub locations: Vec<String>,
    pub staff_capacity: Option<String>,
    pub inventory_range: Option<String>,
    pub db_connection: DbConnection,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DealerApplication {
    /// Copy safe to return over the API.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.db_connection.password = REDACTED_PASSWORD.to_string();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_car_recommendations() {
        let parsed: LlmResponse = serde_json::from_value(json!({
            "responseType": "car_recommendations",
            "reply": "Try these",
            "cars": [{"id": "c1", "name": "Toyota Camry", "price": 20400000, "color": "silver"}]
        }))
        .unwrap();

        assert_eq!(parsed.response_type(), ResponseType::CarRecommendations);
        assert_eq!(parsed.reply(), "Try these");
    }

    #[test]
    fn test_integral_float_price_accepted() {
        let car: CarEntry = serde_json::from_value(json!({
            "id": "c1", "name": "Kia Rio", "price": 5500000.0, "color": "blue"
        }))
        .unwrap();
        assert_eq!(car.price, 5_500_000);
    }

    #[test]
    fn test_fractional_and_oversized_prices_rejected() {
        for price in [json!(0.6), json!(5500000.5), json!(1e30)] {
            let car = serde_json::from_value::<CarEntry>(json!({
                "id": "c1", "name": "Kia Rio", "price": price, "color": "blue"
            }));
            assert!(car.is_err(), "price {} should be rejected", price);
        }
    }

    #[test]
    fn test_negative_price_rejected() {
        let car = serde_json::from_value::<CarEntry>(json!({
            "id": "c1", "name": "Kia Rio", "price": -1, "color": "blue"
        }));
        assert!(car.is_err());
    }

    #[test]
    fn test_advice_without_list_parses() {
        let parsed: LlmResponse =
            serde_json::from_value(json!({"responseType": "advice", "reply": "Check the tyres"}))
                .unwrap();
        assert_eq!(
            parsed,
            LlmResponse::Advice {
                reply: "Check the tyres".to_string(),
                advice: None
            }
        );
    }

    #[test]
    fn test_chat_response_serializes_only_active_field() {
        let response = ChatResponse {
            reply: "Some advice".to_string(),
            payload: ResponsePayload::Advice {
                advice: Some(vec!["Budget for insurance".to_string()]),
            },
            confidence: 0.9,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["responseType"], "advice");
        assert_eq!(value["advice"][0], "Budget for insurance");
        assert!(value.get("recommendations").is_none());
        assert!(value.get("questions").is_none());
    }

    #[test]
    fn test_general_response_has_no_payload_fields() {
        let response = ChatResponse {
            reply: "Hello".to_string(),
            payload: ResponsePayload::General,
            confidence: 0.9,
        };

        let value = serde_json::to_value(&response).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(value["responseType"], "general");
    }

    #[test]
    fn test_response_type_from_str() {
        assert_eq!(
            "clarification".parse::<ResponseType>().unwrap(),
            ResponseType::Clarification
        );
        assert!("recommendations".parse::<ResponseType>().is_err());
    }

    #[test]
    fn test_db_port_accepts_number() {
        let req: DealerOnboardingRequest =
            serde_json::from_value(json!({"dbPort": 5432})).unwrap();
        assert_eq!(req.db_port.as_deref(), Some("5432"));
    }

    #[test]
    fn test_exchange_round_trips_through_json() {
        let response = ChatResponse {
            reply: "Which budget?".to_string(),
            payload: ResponsePayload::Clarification {
                questions: Some(vec!["What is your budget?".to_string()]),
            },
            confidence: 0.9,
        };
        let exchange = ChatExchange::new("user-1", "I need a car", &response);

        let value = serde_json::to_value(&exchange).unwrap();
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["responseType"], "clarification");

        let back: ChatExchange = serde_json::from_value(value).unwrap();
        assert_eq!(back, exchange);
    }
}
