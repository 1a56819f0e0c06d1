//! Payload shapes exchanged with the backend. The gateway transports these
//! without inspecting them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    pub id: i64,
    pub title: String,
    pub duration: f64,
    pub created_at: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub id: i64,
    pub recording_id: i64,
    pub transcript: String,
    pub clarity_score: f64,
    pub pace_score: f64,
    pub filler_word_count: u32,
    pub tone_analysis: ToneAnalysis,
    pub content_structure: ContentStructure,
    pub feedback: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneAnalysis {
    pub confidence: f64,
    pub enthusiasm: f64,
    pub professionalism: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentStructure {
    pub key_points: Vec<String>,
    pub organization: f64,
    pub coherence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub speaking_level: Option<String>,
    #[serde(default)]
    pub total_recordings: u32,
    #[serde(default)]
    pub total_practice_time: f64,
    #[serde(default)]
    pub last_practice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// Result of the device-side Apple sign-in handshake, forwarded to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppleCredentials {
    pub identity_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FullName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub balance: Decimal,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub application: String,
    pub amount: Decimal,
    pub transaction_type: String,
    pub operation: Option<String>,
    pub status: String,
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub client_secret: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSheetParams {
    pub payment_intent: String,
    pub ephemeral_key: String,
    pub customer: String,
    pub publishable_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct AmountRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}
