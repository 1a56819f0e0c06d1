use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::api::client::{ApiClient, RequestBody};
use crate::api::error::DomainError;
use crate::api::types::{AmountRequest, Balance, PaymentIntent, PaymentSheetParams, Transaction};

pub struct BalanceApi {
    client: Arc<ApiClient>,
}

impl BalanceApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn get_balance(&self) -> Result<Balance, DomainError> {
        self.client
            .get("/billing/balance")
            .await
            .map_err(|e| DomainError::request_failed(e, "Failed to get balance"))
    }

    /// Transactions of the speech application only.
    pub async fn get_transactions(&self) -> Result<Vec<Transaction>, DomainError> {
        self.client
            .get("/billing/transactions?application=speech")
            .await
            .map_err(|e| DomainError::request_failed(e, "Failed to get transactions"))
    }

    pub async fn create_payment_intent(&self, amount: Decimal) -> Result<PaymentIntent, DomainError> {
        debug!("Creating payment intent for {}", amount);
        self.post_amount("/billing/create-payment-intent", amount, "Failed to create payment intent")
            .await
    }

    pub async fn create_payment_sheet(&self, amount: Decimal) -> Result<PaymentSheetParams, DomainError> {
        debug!("Creating payment sheet for {}", amount);
        self.post_amount("/billing/create-payment-sheet", amount, "Failed to create payment sheet")
            .await
    }

    async fn post_amount<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        amount: Decimal,
        default_message: &str,
    ) -> Result<T, DomainError> {
        let body = RequestBody::json(&AmountRequest { amount })
            .map_err(|e| DomainError::request_failed(e, default_message))?;
        self.client
            .post(path, body)
            .await
            .map_err(|e| DomainError::request_failed(e, default_message))
    }
}
