use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::Booking;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Payment,
    Refund,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Credentials and endpoints for the external payment gateway. Deserialized
/// from the app config and handed to the signer; the single definition keeps
/// the config layer and the signing code on the same field set.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub version: String,
    pub merchant_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_locale() -> String {
    "vn".to_string()
}

fn default_currency() -> String {
    "VND".to_string()
}

/// One signed entry in a user's append-only wallet ledger. The wallet
/// invariant: once every entry has settled, balance equals the sum of
/// COMPLETED entry amounts for that user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Signed amount: positive credits the balance, negative debits it.
    pub amount: i64,
    pub txn_type: TransactionType,
    pub status: TransactionStatus,
    /// Booking code for payments/refunds; gateway order ref for deposits.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        txn_type: TransactionType,
        status: TransactionStatus,
        reference: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            txn_type,
            status,
            reference,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of completing a deposit; duplicate gateway callbacks must
/// observe `AlreadyCompleted` and change nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    Completed,
    AlreadyCompleted,
}

/// The booking-confirmation contract both payment rails depend on.
/// Implemented by the booking lifecycle manager and injected by the
/// composition root, so neither rail owns the manager concretely.
#[async_trait]
pub trait BookingConfirmer: Send + Sync {
    /// Idempotent: confirming an already-PAID booking returns it as-is.
    async fn confirm(&self, code: &str) -> Result<Booking, Box<dyn std::error::Error + Send + Sync>>;

    /// Terminal transition used when a rail's confirmation lost a race
    /// after money had moved and the refund has already been applied.
    async fn mark_payment_failed(
        &self,
        code: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Completion side of the top-up flow, implemented by the wallet service
/// and called by the gateway callback dispatcher.
#[async_trait]
pub trait DepositCompleter: Send + Sync {
    async fn complete_deposit(
        &self,
        txn_id: Uuid,
    ) -> Result<DepositOutcome, Box<dyn std::error::Error + Send + Sync>>;
}
