use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha512;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use railbook_core::payment::{
    BookingConfirmer, DepositCompleter, DepositOutcome, TransactionType,
};
use railbook_core::repository::{BookingStore, WalletStore};

pub use railbook_core::payment::GatewayConfig;

type HmacSha512 = Hmac<Sha512>;

/// RFC 3986 unreserved characters pass through; everything else is escaped.
/// Both sides of the signature must encode identically, so this set is the
/// single definition used for building and verifying.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds and verifies the gateway's signed redirect URLs: parameters are
/// percent-encoded, sorted by key, joined with `&`, HMAC-SHA512 signed, and
/// the hex signature appended as the final parameter.
pub struct GatewaySigner {
    config: GatewayConfig,
}

impl GatewaySigner {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// The raw (unencoded, unsigned) parameter set for one payment attempt.
    /// `txn_ref` is a booking code for ticket payments or a transaction ID
    /// for wallet top-ups; `amount` is in whole currency units and is scaled
    /// x100 on the wire.
    pub fn build_params(
        &self,
        txn_ref: &str,
        amount: i64,
        order_info: &str,
        order_type: &str,
        client_ip: &str,
        bank_code: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Version".into(), self.config.version.clone());
        params.insert("vnp_Command".into(), "pay".into());
        params.insert("vnp_TmnCode".into(), self.config.merchant_code.clone());
        params.insert("vnp_Locale".into(), self.config.locale.clone());
        params.insert("vnp_CurrCode".into(), self.config.currency.clone());
        params.insert("vnp_TxnRef".into(), txn_ref.into());
        params.insert("vnp_OrderInfo".into(), order_info.into());
        params.insert("vnp_OrderType".into(), order_type.into());
        params.insert("vnp_Amount".into(), (amount * 100).to_string());
        params.insert("vnp_ReturnUrl".into(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".into(), client_ip.into());
        params.insert(
            "vnp_CreateDate".into(),
            created_at.format("%Y%m%d%H%M%S").to_string(),
        );
        if let Some(bank) = bank_code {
            params.insert("vnp_BankCode".into(), bank.into());
        }
        params
    }

    /// Canonical query string: keys already sorted by the BTreeMap, each key
    /// and value percent-encoded, pairs joined with `&`.
    fn canonical_query(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, QUERY_ENCODE),
                    utf8_percent_encode(v, QUERY_ENCODE)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn mac_over(&self, canonical: &str) -> HmacSha512 {
        let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        mac
    }

    /// Lowercase hex HMAC-SHA512 over the canonical query string.
    pub fn sign_params(&self, params: &BTreeMap<String, String>) -> String {
        let mac = self.mac_over(&Self::canonical_query(params));
        hex::encode(mac.finalize().into_bytes())
    }

    /// Full redirect URL with the signature appended as the last parameter.
    #[allow(clippy::too_many_arguments)]
    pub fn build_payment_url(
        &self,
        txn_ref: &str,
        amount: i64,
        order_info: &str,
        order_type: &str,
        client_ip: &str,
        bank_code: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> String {
        let params = self.build_params(
            txn_ref, amount, order_info, order_type, client_ip, bank_code, created_at,
        );
        let query = Self::canonical_query(&params);
        let signature = self.sign_params(&params);
        format!(
            "{}?{}&vnp_SecureHash={}",
            self.config.pay_url, query, signature
        )
    }

    /// Recompute the signature over the received parameters, excluding the
    /// signature fields themselves, and compare. A mismatch means a forged
    /// or corrupted callback and must not trigger any mutation.
    ///
    /// The received hex is decoded (either case) and checked with the MAC's
    /// constant-time comparison, so forgery attempts get no timing oracle.
    pub fn verify_params(&self, params: &BTreeMap<String, String>) -> bool {
        let Some(received) = params.get("vnp_SecureHash") else {
            return false;
        };
        let Ok(received) = hex::decode(received) else {
            return false;
        };
        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.as_str() != "vnp_SecureHash" && k.as_str() != "vnp_SecureHashType")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.mac_over(&Self::canonical_query(&signed))
            .verify_slice(&received)
            .is_ok()
    }
}

/// Acknowledgement returned to the gateway. Always answered, whatever the
/// internal outcome, so the gateway stops retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackAck {
    pub code: &'static str,
    pub message: &'static str,
}

impl CallbackAck {
    pub const OK: CallbackAck = CallbackAck {
        code: "00",
        message: "Confirm Success",
    };
    pub const ORDER_NOT_FOUND: CallbackAck = CallbackAck {
        code: "01",
        message: "Order not found",
    };
    pub const ALREADY_CONFIRMED: CallbackAck = CallbackAck {
        code: "02",
        message: "Order already confirmed",
    };
    pub const INVALID_AMOUNT: CallbackAck = CallbackAck {
        code: "04",
        message: "Invalid amount",
    };
    pub const INVALID_SIGNATURE: CallbackAck = CallbackAck {
        code: "97",
        message: "Invalid signature",
    };
}

/// Dispatches verified gateway callbacks: a transaction-ID ref completes a
/// wallet top-up, a booking-code ref confirms a booking. Depends only on the
/// contracts it calls; the concrete manager and wallet service are injected
/// by the composition root.
pub struct GatewayCallbackHandler {
    signer: Arc<GatewaySigner>,
    bookings: Arc<dyn BookingStore>,
    wallets: Arc<dyn WalletStore>,
    confirmer: Arc<dyn BookingConfirmer>,
    deposits: Arc<dyn DepositCompleter>,
}

impl GatewayCallbackHandler {
    pub fn new(
        signer: Arc<GatewaySigner>,
        bookings: Arc<dyn BookingStore>,
        wallets: Arc<dyn WalletStore>,
        confirmer: Arc<dyn BookingConfirmer>,
        deposits: Arc<dyn DepositCompleter>,
    ) -> Self {
        Self {
            signer,
            bookings,
            wallets,
            confirmer,
            deposits,
        }
    }

    pub async fn handle(&self, params: &BTreeMap<String, String>) -> CallbackAck {
        if !self.signer.verify_params(params) {
            warn!("gateway callback rejected: signature mismatch");
            return CallbackAck::INVALID_SIGNATURE;
        }

        let Some(txn_ref) = params.get("vnp_TxnRef") else {
            return CallbackAck::ORDER_NOT_FOUND;
        };
        let gateway_ok = params.get("vnp_ResponseCode").map(String::as_str) == Some("00");
        let wire_amount: Option<i64> = params.get("vnp_Amount").and_then(|a| a.parse().ok());

        // A transaction-ID ref points at a wallet top-up; anything else is
        // treated as a booking code.
        if let Ok(txn_id) = Uuid::parse_str(txn_ref) {
            match self.wallets.find_transaction(txn_id).await {
                Ok(Some(txn)) if txn.txn_type == TransactionType::Deposit => {
                    return self.handle_deposit(txn_id, txn.amount, gateway_ok, wire_amount).await;
                }
                Ok(_) => return CallbackAck::ORDER_NOT_FOUND,
                Err(e) => {
                    error!(error = %e, "gateway callback: transaction lookup failed");
                    return CallbackAck::OK;
                }
            }
        }

        self.handle_booking(txn_ref, gateway_ok, wire_amount).await
    }

    async fn handle_deposit(
        &self,
        txn_id: Uuid,
        amount: i64,
        gateway_ok: bool,
        wire_amount: Option<i64>,
    ) -> CallbackAck {
        if wire_amount != Some(amount * 100) {
            warn!(txn_id = %txn_id, "gateway callback: top-up amount mismatch");
            return CallbackAck::INVALID_AMOUNT;
        }
        if !gateway_ok {
            // Verified failure: the entry stays PENDING, nothing moves.
            info!(txn_id = %txn_id, "gateway reported top-up failure");
            return CallbackAck::OK;
        }
        match self.deposits.complete_deposit(txn_id).await {
            Ok(DepositOutcome::Completed) => {
                info!(txn_id = %txn_id, "wallet top-up completed");
                CallbackAck::OK
            }
            Ok(DepositOutcome::AlreadyCompleted) => CallbackAck::ALREADY_CONFIRMED,
            Err(e) => {
                // Still acknowledged; the gateway must not retry forever.
                error!(txn_id = %txn_id, error = %e, "top-up completion failed");
                CallbackAck::OK
            }
        }
    }

    async fn handle_booking(
        &self,
        code: &str,
        gateway_ok: bool,
        wire_amount: Option<i64>,
    ) -> CallbackAck {
        let booking = match self.bookings.get_by_code(code).await {
            Ok(Some(b)) => b,
            Ok(None) => return CallbackAck::ORDER_NOT_FOUND,
            Err(e) => {
                error!(code, error = %e, "gateway callback: booking lookup failed");
                return CallbackAck::OK;
            }
        };

        if wire_amount != Some(booking.total_price * 100) {
            warn!(code, "gateway callback: booking amount mismatch");
            return CallbackAck::INVALID_AMOUNT;
        }
        if !gateway_ok {
            // Verified failure: leave the booking PENDING for the expiry
            // scheduler to clean up.
            info!(code, "gateway reported payment failure");
            return CallbackAck::OK;
        }

        match self.confirmer.confirm(code).await {
            Ok(paid) => {
                info!(code = %paid.code, "booking confirmed via gateway");
                CallbackAck::OK
            }
            Err(e) => {
                error!(code, error = %e, "booking confirmation failed");
                CallbackAck::OK
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> GatewaySigner {
        GatewaySigner::new(GatewayConfig {
            version: "2.1.0".into(),
            merchant_code: "RAILBOOK".into(),
            hash_secret: "test-secret".into(),
            pay_url: "https://sandbox.gateway.test/paymentv2/vpcpay.html".into(),
            return_url: "https://railbook.test/payment/return".into(),
            locale: "vn".into(),
            currency: "VND".into(),
        })
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn url_has_sorted_params_and_trailing_signature() {
        let url = signer().build_payment_url(
            "BK260301ABCDEF",
            110_000,
            "Booking BK260301ABCDEF",
            "train-ticket",
            "203.0.113.7",
            None,
            created_at(),
        );
        assert!(url.starts_with("https://sandbox.gateway.test/"));
        // Amount scaled x100, timestamp as YYYYMMDDHHmmss.
        assert!(url.contains("vnp_Amount=11000000"));
        assert!(url.contains("vnp_CreateDate=20260301093000"));
        // Sorted keys: vnp_Amount first, signature last.
        let query = url.split('?').nth(1).unwrap();
        assert!(query.starts_with("vnp_Amount="));
        let last = query.rsplit('&').next().unwrap();
        assert!(last.starts_with("vnp_SecureHash="));
    }

    #[test]
    fn verify_accepts_own_signature() {
        let signer = signer();
        let mut params = signer.build_params(
            "BK260301ABCDEF",
            110_000,
            "Booking BK260301ABCDEF",
            "train-ticket",
            "203.0.113.7",
            Some("NCB"),
            created_at(),
        );
        params.insert("vnp_ResponseCode".into(), "00".into());
        let sig = signer.sign_params(&params);
        params.insert("vnp_SecureHash".into(), sig);
        assert!(signer.verify_params(&params));
    }

    #[test]
    fn verify_rejects_tampered_amount() {
        let signer = signer();
        let mut params =
            signer.build_params("BK1", 110_000, "x", "t", "127.0.0.1", None, created_at());
        let sig = signer.sign_params(&params);
        params.insert("vnp_SecureHash".into(), sig);
        params.insert("vnp_Amount".into(), "100".into());
        assert!(!signer.verify_params(&params));
    }

    #[test]
    fn verify_rejects_missing_signature() {
        let signer = signer();
        let params = signer.build_params("BK1", 1, "x", "t", "127.0.0.1", None, created_at());
        assert!(!signer.verify_params(&params));
    }

    #[test]
    fn verify_accepts_uppercase_hex_signature() {
        let signer = signer();
        let mut params =
            signer.build_params("BK1", 110_000, "x", "t", "127.0.0.1", None, created_at());
        let sig = signer.sign_params(&params).to_uppercase();
        params.insert("vnp_SecureHash".into(), sig);
        assert!(signer.verify_params(&params));
    }

    #[test]
    fn verify_rejects_non_hex_signature() {
        let signer = signer();
        let mut params =
            signer.build_params("BK1", 110_000, "x", "t", "127.0.0.1", None, created_at());
        params.insert("vnp_SecureHash".into(), "not-a-signature".into());
        assert!(!signer.verify_params(&params));
    }

    #[test]
    fn hash_type_field_is_excluded_from_signing() {
        let signer = signer();
        let mut params =
            signer.build_params("BK1", 1, "x", "t", "127.0.0.1", None, created_at());
        let sig = signer.sign_params(&params);
        params.insert("vnp_SecureHash".into(), sig);
        params.insert("vnp_SecureHashType".into(), "HMACSHA512".into());
        assert!(signer.verify_params(&params));
    }

    #[test]
    fn order_info_is_percent_encoded() {
        let signer = signer();
        let url = signer.build_payment_url(
            "BK1",
            1,
            "Booking BK1 / 2 seats",
            "train-ticket",
            "127.0.0.1",
            None,
            created_at(),
        );
        assert!(url.contains("Booking%20BK1%20%2F%202%20seats"));
    }
}
