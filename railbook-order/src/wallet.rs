use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use railbook_core::booking::{Booking, BookingStatus};
use railbook_core::payment::{BookingConfirmer, DepositCompleter, DepositOutcome, Transaction};
use railbook_core::repository::{BookingStore, StoreError, WalletStore};
use railbook_core::{CoreError, CoreResult};
use railbook_shared::pii::Masked;

use crate::gateway::GatewaySigner;
use crate::saga::Saga;

/// The wallet payment rail: PIN-guarded balance payments with a
/// deduct-then-confirm-else-refund saga, gateway-backed top-ups, and
/// admin-settled withdrawals. Balance math lives in the store's atomic
/// operations; this service owns ordering and compensation.
pub struct WalletService {
    wallets: Arc<dyn WalletStore>,
    bookings: Arc<dyn BookingStore>,
    confirmer: Arc<dyn BookingConfirmer>,
    signer: Arc<GatewaySigner>,
}

impl WalletService {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        bookings: Arc<dyn BookingStore>,
        confirmer: Arc<dyn BookingConfirmer>,
        signer: Arc<GatewaySigner>,
    ) -> Self {
        Self {
            wallets,
            bookings,
            confirmer,
            signer,
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> CoreResult<i64> {
        self.wallets.balance(user_id).await.map_err(store_err)
    }

    pub async fn ledger(&self, user_id: Uuid) -> CoreResult<Vec<Transaction>> {
        self.wallets.ledger(user_id).await.map_err(store_err)
    }

    /// Set or rotate the payment PIN. First set needs no proof; rotation
    /// demands the current PIN.
    pub async fn set_pin(
        &self,
        user_id: Uuid,
        current: Option<Masked<String>>,
        new_pin: Masked<String>,
    ) -> CoreResult<()> {
        let new_pin = new_pin.into_inner();
        if new_pin.len() != 6 || !new_pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::Validation(
                "PIN must be exactly 6 digits".into(),
            ));
        }

        if let Some(existing) = self.wallets.pin_hash(user_id).await.map_err(store_err)? {
            let current = current
                .map(Masked::into_inner)
                .ok_or_else(|| CoreError::Forbidden("current PIN required".into()))?;
            if !bcrypt::verify(&current, &existing)
                .map_err(|e| CoreError::Infra(format!("PIN verification failed: {e}")))?
            {
                return Err(CoreError::Forbidden("incorrect PIN".into()));
            }
        }

        let hash = bcrypt::hash(&new_pin, bcrypt::DEFAULT_COST)
            .map_err(|e| CoreError::Infra(format!("PIN hashing failed: {e}")))?;
        self.wallets
            .set_pin_hash(user_id, &hash)
            .await
            .map_err(store_err)?;
        info!(user_id = %user_id, "wallet PIN set");
        Ok(())
    }

    async fn verify_pin(&self, user_id: Uuid, pin: &str) -> CoreResult<()> {
        let hash = self
            .wallets
            .pin_hash(user_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::Forbidden("wallet PIN not set".into()))?;
        let ok = bcrypt::verify(pin, &hash)
            .map_err(|e| CoreError::Infra(format!("PIN verification failed: {e}")))?;
        if !ok {
            return Err(CoreError::Forbidden("incorrect PIN".into()));
        }
        Ok(())
    }

    /// Pay a PENDING booking from the wallet balance. Order of operations:
    /// verify PIN, deduct (atomic check-and-debit), then confirm. If the
    /// confirmation loses the seat race, the deduction is refunded and the
    /// booking goes to PAYMENT_FAILED; the caller sees a conflict, never a
    /// silently missing balance.
    pub async fn pay_booking(
        &self,
        user_id: Uuid,
        code: &str,
        pin: Masked<String>,
    ) -> CoreResult<Booking> {
        self.verify_pin(user_id, &pin.into_inner()).await?;

        let booking = self
            .bookings
            .get_by_code(code)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("booking {code}")))?;
        match booking.user_id {
            None => {
                return Err(CoreError::Forbidden(
                    "guest bookings cannot be paid by wallet".into(),
                ))
            }
            Some(owner) if owner != user_id => {
                return Err(CoreError::Forbidden(
                    "booking belongs to another user".into(),
                ))
            }
            Some(_) => {}
        }
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "booking {} is {}",
                booking.code, booking.status
            )));
        }
        if booking.total_price <= 0 {
            return Err(CoreError::Validation("booking has not been priced".into()));
        }

        let amount = booking.total_price;
        self.wallets
            .deduct_payment(user_id, amount, code)
            .await
            .map_err(store_err)?;

        let mut saga = Saga::new();
        {
            let wallets = Arc::clone(&self.wallets);
            let code = code.to_string();
            saga.push("refund-payment", async move {
                wallets.refund(user_id, amount, &code).await.map(|_| ())
            });
        }

        match self.confirmer.confirm(code).await {
            Ok(paid) => {
                saga.commit();
                info!(code = %paid.code, amount, "booking paid from wallet");
                Ok(paid)
            }
            Err(e) => {
                warn!(code, error = %e, "wallet payment confirmation failed, refunding");
                saga.compensate().await;
                if let Err(e) = self.confirmer.mark_payment_failed(code).await {
                    warn!(code, error = %e, "booking not marked payment-failed");
                }
                Err(CoreError::Conflict(
                    "payment failed, amount refunded to wallet".into(),
                ))
            }
        }
    }

    /// Start a gateway top-up: a PENDING ledger entry whose ID becomes the
    /// gateway order ref, plus the signed payment URL. The balance moves
    /// only when the verified callback completes the deposit.
    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        amount: i64,
        client_ip: &str,
    ) -> CoreResult<(Transaction, String)> {
        if amount <= 0 {
            return Err(CoreError::Validation(
                "top-up amount must be positive".into(),
            ));
        }
        let txn = self
            .wallets
            .record_deposit_pending(user_id, amount)
            .await
            .map_err(store_err)?;
        let pay_url = self.signer.build_payment_url(
            &txn.id.to_string(),
            amount,
            "Wallet top-up",
            "topup",
            client_ip,
            None,
            Utc::now(),
        );
        info!(user_id = %user_id, txn_id = %txn.id, amount, "top-up initiated");
        Ok((txn, pay_url))
    }

    /// PIN-guarded withdrawal request: the balance is debited up front and
    /// the entry waits PENDING for admin settlement.
    pub async fn request_withdraw(
        &self,
        user_id: Uuid,
        amount: i64,
        pin: Masked<String>,
    ) -> CoreResult<Transaction> {
        self.verify_pin(user_id, &pin.into_inner()).await?;
        if amount <= 0 {
            return Err(CoreError::Validation(
                "withdraw amount must be positive".into(),
            ));
        }
        let txn = self
            .wallets
            .request_withdraw(user_id, amount)
            .await
            .map_err(store_err)?;
        info!(user_id = %user_id, txn_id = %txn.id, amount, "withdraw requested");
        Ok(txn)
    }

    pub async fn approve_withdraw(&self, txn_id: Uuid) -> CoreResult<Transaction> {
        let txn = self
            .wallets
            .settle_withdraw(txn_id, true)
            .await
            .map_err(store_err)?;
        info!(txn_id = %txn_id, "withdraw approved");
        Ok(txn)
    }

    /// Rejection reverses the up-front debit.
    pub async fn reject_withdraw(&self, txn_id: Uuid) -> CoreResult<Transaction> {
        let txn = self
            .wallets
            .settle_withdraw(txn_id, false)
            .await
            .map_err(store_err)?;
        info!(txn_id = %txn_id, "withdraw rejected, balance restored");
        Ok(txn)
    }
}

#[async_trait]
impl DepositCompleter for WalletService {
    async fn complete_deposit(&self, txn_id: Uuid) -> Result<DepositOutcome, StoreError> {
        self.wallets.complete_deposit(txn_id).await
    }
}

fn store_err(e: StoreError) -> CoreError {
    match e.downcast::<CoreError>() {
        Ok(core) => *core,
        Err(e) => CoreError::Infra(e.to_string()),
    }
}
