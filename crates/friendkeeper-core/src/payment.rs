//! Checkout creation and purchase settlement.
//!
//! Checkout is a thin pass-through to the payment provider; the session it
//! creates carries the device identity and SKU as metadata so the completed
//! payment can be attributed back to the right ledger. Settlement must be
//! safe under at-least-once webhook delivery: the ledger credit is keyed by
//! the checkout id, so replays are silently idempotent.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use url::Url;

use crate::error::{CoreError, Result, ValidationError};
use crate::identity::DeviceIdentity;
use crate::ledger::{Balance, CreditLedger, CreditOutcome};
use crate::storage::{Database, PaymentConfig};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A purchasable token pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Product {
    pub sku: &'static str,
    pub tokens: u32,
    pub price_cents: u32,
}

/// Product configuration
pub const PRODUCTS: [Product; 3] = [
    Product {
        sku: "starter",
        tokens: 10,
        price_cents: 499,
    },
    Product {
        sku: "popular",
        tokens: 30,
        price_cents: 999,
    },
    Product {
        sku: "pro",
        tokens: 100,
        price_cents: 2499,
    },
];

/// Look up a product by SKU.
pub fn product(sku: &str) -> Result<Product> {
    PRODUCTS
        .iter()
        .find(|p| p.sku == sku)
        .copied()
        .ok_or_else(|| {
            CoreError::Validation(ValidationError::InvalidValue {
                field: "product_sku",
                message: format!("unknown product '{sku}'"),
            })
        })
}

/// A created checkout session, as returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub checkout_url: String,
    pub checkout_id: String,
}

/// Pending/completed checkout row used for settlement attribution.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub checkout_id: String,
    pub device_id: String,
    pub product_sku: String,
    pub tokens_granted: u32,
    pub status: String,
}

/// Result of processing one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Settled(CreditOutcome),
    /// Event type we don't act on, or a payload missing attribution.
    Ignored,
}

/// Client for the external payment provider.
pub struct PaymentClient {
    api_url: String,
    api_key: String,
    webhook_secret: String,
    client: Client,
}

impl PaymentClient {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            client: Client::new(),
        }
    }

    /// Create a checkout session for a token pack.
    ///
    /// Records a pending session row so the later settlement can attribute
    /// the credit even when the webhook payload is sparse.
    pub async fn create_checkout(
        &self,
        db: &Database,
        identity: &DeviceIdentity,
        product_sku: &str,
        success_url: &str,
    ) -> Result<Checkout> {
        if self.api_key.is_empty() {
            return Err(CoreError::Payment("payment not configured".to_string()));
        }
        let product = product(product_sku)?;
        let success_url = Url::parse(success_url).map_err(|e| {
            CoreError::Validation(ValidationError::InvalidValue {
                field: "success_url",
                message: e.to_string(),
            })
        })?;

        let body = json!({
            "product_id": product.sku,
            "success_url": success_url.as_str(),
            "metadata": {
                "device_id": identity.as_str(),
                "product_sku": product.sku,
            },
        });

        let resp = self
            .client
            .post(format!("{}/v1/checkouts", self.api_url))
            .header("x-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Payment(format!("checkout request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CoreError::Payment(format!(
                "payment provider error (HTTP {})",
                resp.status()
            )));
        }

        let data: serde_json::Value = resp.json().await?;
        let checkout_id = data["id"]
            .as_str()
            .ok_or_else(|| CoreError::Payment("provider response missing id".to_string()))?
            .to_string();
        let checkout_url = data["checkout_url"]
            .as_str()
            .ok_or_else(|| CoreError::Payment("provider response missing checkout_url".to_string()))?
            .to_string();

        record_pending_session(db, &checkout_id, identity, product)?;

        Ok(Checkout {
            checkout_url,
            checkout_id,
        })
    }

    /// Verify a webhook signature (HMAC-SHA256 over the raw body, hex).
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> bool {
        if self.webhook_secret.is_empty() {
            // No secret configured: nothing to verify against.
            return true;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = match HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }

    /// Process one webhook delivery from the payment provider.
    ///
    /// Only `checkout.completed` events settle; everything else is ignored
    /// without error. Replayed deliveries settle idempotently.
    pub fn handle_webhook(
        &self,
        db: &Database,
        ledger: &CreditLedger,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        if !self.webhook_secret.is_empty() {
            let Some(signature) = signature else {
                return Err(CoreError::Payment("missing webhook signature".to_string()));
            };
            if !self.verify_signature(body, signature) {
                return Err(CoreError::Payment("invalid webhook signature".to_string()));
            }
        }

        let payload: serde_json::Value = serde_json::from_slice(body).map_err(|_| {
            CoreError::Validation(ValidationError::InvalidValue {
                field: "body",
                message: "invalid JSON".to_string(),
            })
        })?;

        if payload["event_type"].as_str() != Some("checkout.completed") {
            return Ok(WebhookOutcome::Ignored);
        }

        let object = &payload["object"];
        let Some(checkout_id) = object["id"].as_str() else {
            return Ok(WebhookOutcome::Ignored);
        };
        let metadata = &object["metadata"];
        let Some(device_id) = metadata["device_id"].as_str() else {
            return Ok(WebhookOutcome::Ignored);
        };

        // Amount comes from the pending session when we have it, else from
        // the catalog via the metadata SKU.
        let tokens = match checkout_session(db, checkout_id)? {
            Some(session) => session.tokens_granted,
            None => match metadata["product_sku"].as_str() {
                Some(sku) => product(sku)?.tokens,
                None => return Ok(WebhookOutcome::Ignored),
            },
        };

        let identity = DeviceIdentity::new(device_id.to_string());
        let outcome = reconcile(db, ledger, &identity, checkout_id, tokens)?;
        Ok(WebhookOutcome::Settled(outcome))
    }
}

/// Reconcile a completed purchase into the ledger.
///
/// Idempotent per `purchase_ref`: a duplicate delivery marks nothing twice
/// and leaves the balance unchanged.
pub fn reconcile(
    db: &Database,
    ledger: &CreditLedger,
    identity: &DeviceIdentity,
    purchase_ref: &str,
    token_amount: u32,
) -> Result<CreditOutcome> {
    let (outcome, _) = ledger.credit(identity, token_amount, purchase_ref)?;

    if outcome == CreditOutcome::Credited {
        db.conn().execute(
            "UPDATE checkout_sessions SET status = 'completed', completed_at = ?2
             WHERE checkout_id = ?1",
            params![purchase_ref, Utc::now().to_rfc3339()],
        )?;
    }
    Ok(outcome)
}

/// Poll the ledger until a settlement lands or the attempt budget runs out.
///
/// A client redirected back from checkout may legitimately observe a stale
/// balance while the webhook is still in flight; absence is not failure, so
/// the last (possibly stale) balance is returned after the final attempt.
pub async fn await_settlement(
    ledger: &CreditLedger,
    identity: &DeviceIdentity,
    baseline_total: u32,
    attempts: u32,
    interval: Duration,
) -> Result<Balance> {
    let mut balance = ledger.balance(identity)?;
    for _ in 0..attempts {
        if balance.total() > baseline_total {
            return Ok(balance);
        }
        tokio::time::sleep(interval).await;
        balance = ledger.balance(identity)?;
    }
    Ok(balance)
}

fn record_pending_session(
    db: &Database,
    checkout_id: &str,
    identity: &DeviceIdentity,
    product: Product,
) -> Result<()> {
    db.conn().execute(
        "INSERT OR IGNORE INTO checkout_sessions
            (checkout_id, device_id, product_sku, tokens_granted, amount_cents, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![
            checkout_id,
            identity.as_str(),
            product.sku,
            product.tokens,
            product.price_cents,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Fetch a checkout session row by id.
pub fn checkout_session(db: &Database, checkout_id: &str) -> Result<Option<CheckoutSession>> {
    let session = db
        .conn()
        .query_row(
            "SELECT checkout_id, device_id, product_sku, tokens_granted, status
             FROM checkout_sessions WHERE checkout_id = ?1",
            params![checkout_id],
            |row| {
                Ok(CheckoutSession {
                    checkout_id: row.get(0)?,
                    device_id: row.get(1)?,
                    product_sku: row.get(2)?,
                    tokens_granted: row.get(3)?,
                    status: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn client_with_secret(secret: &str) -> PaymentClient {
        PaymentClient::new(&PaymentConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            api_key: "key".to_string(),
            webhook_secret: secret.to_string(),
        })
    }

    fn completed_event(checkout_id: &str, device_id: &str, sku: &str) -> Vec<u8> {
        json!({
            "event_type": "checkout.completed",
            "object": {
                "id": checkout_id,
                "metadata": {"device_id": device_id, "product_sku": sku},
            },
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn product_lookup() {
        assert_eq!(product("popular").unwrap().tokens, 30);
        assert!(matches!(
            product("mega").unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[test]
    fn signature_round_trip() {
        let client = client_with_secret("whsec_test");
        let body = b"{\"ok\":true}";
        assert!(client.verify_signature(body, &sign("whsec_test", body)));
        assert!(!client.verify_signature(body, &sign("other", body)));
        assert!(!client.verify_signature(body, "not-hex"));
    }

    #[test]
    fn webhook_settles_and_replay_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let client = client_with_secret("whsec_test");
        let identity = DeviceIdentity::new("dev-1".to_string());

        let body = completed_event("co_123", "dev-1", "popular");
        let signature = sign("whsec_test", &body);

        let outcome = client
            .handle_webhook(&db, &ledger, &body, Some(&signature))
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Settled(CreditOutcome::Credited));
        assert_eq!(ledger.balance(&identity).unwrap().tokens_remaining, 30);

        // At-least-once delivery: the retry changes nothing.
        let outcome = client
            .handle_webhook(&db, &ledger, &body, Some(&signature))
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Settled(CreditOutcome::AlreadySettled)
        );
        assert_eq!(ledger.balance(&identity).unwrap().tokens_remaining, 30);
    }

    #[test]
    fn webhook_rejects_bad_signature() {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let client = client_with_secret("whsec_test");

        let body = completed_event("co_123", "dev-1", "popular");
        let err = client
            .handle_webhook(&db, &ledger, &body, Some("deadbeef"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Payment(_)));

        let err = client.handle_webhook(&db, &ledger, &body, None).unwrap_err();
        assert!(matches!(err, CoreError::Payment(_)));
    }

    #[test]
    fn webhook_ignores_other_events_and_sparse_payloads() {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let client = client_with_secret("");

        let body = json!({"event_type": "checkout.created"}).to_string();
        assert_eq!(
            client
                .handle_webhook(&db, &ledger, body.as_bytes(), None)
                .unwrap(),
            WebhookOutcome::Ignored
        );

        let body = json!({
            "event_type": "checkout.completed",
            "object": {"id": "co_1", "metadata": {}},
        })
        .to_string();
        assert_eq!(
            client
                .handle_webhook(&db, &ledger, body.as_bytes(), None)
                .unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[test]
    fn webhook_rejects_invalid_json() {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let client = client_with_secret("");

        let err = client
            .handle_webhook(&db, &ledger, b"not json", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn reconcile_marks_pending_session_completed() {
        let db = Database::open_memory().unwrap();
        let ledger = CreditLedger::open_memory(3).unwrap();
        let identity = DeviceIdentity::new("dev-1".to_string());
        record_pending_session(&db, "co_9", &identity, product("starter").unwrap()).unwrap();

        reconcile(&db, &ledger, &identity, "co_9", 10).unwrap();

        let session = checkout_session(&db, "co_9").unwrap().unwrap();
        assert_eq!(session.status, "completed");
        assert_eq!(session.tokens_granted, 10);
    }

    #[tokio::test]
    async fn create_checkout_records_pending_session() {
        let db = Database::open_memory().unwrap();
        let identity = DeviceIdentity::new("dev-1".to_string());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkouts")
            .match_header("x-api-key", "key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": "co_42", "checkout_url": "https://pay.example/co_42"}).to_string(),
            )
            .create_async()
            .await;

        let client = PaymentClient::new(&PaymentConfig {
            api_url: server.url(),
            api_key: "key".to_string(),
            webhook_secret: String::new(),
        });

        let checkout = client
            .create_checkout(&db, &identity, "starter", "https://app.example/success")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(checkout.checkout_id, "co_42");
        assert_eq!(checkout.checkout_url, "https://pay.example/co_42");

        let session = checkout_session(&db, "co_42").unwrap().unwrap();
        assert_eq!(session.device_id, "dev-1");
        assert_eq!(session.status, "pending");
        assert_eq!(session.tokens_granted, 10);
    }

    #[tokio::test]
    async fn create_checkout_validates_inputs() {
        let db = Database::open_memory().unwrap();
        let identity = DeviceIdentity::new("dev-1".to_string());
        let client = client_with_secret("");

        let err = client
            .create_checkout(&db, &identity, "mega", "https://app.example/success")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = client
            .create_checkout(&db, &identity, "starter", "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let unconfigured = PaymentClient::new(&PaymentConfig::default());
        let err = unconfigured
            .create_checkout(&db, &identity, "starter", "https://app.example/success")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Payment(_)));
    }

    #[tokio::test]
    async fn await_settlement_returns_once_balance_grows() {
        let ledger = CreditLedger::open_memory(0).unwrap();
        let identity = DeviceIdentity::new("dev-1".to_string());
        let baseline = ledger.balance(&identity).unwrap().total();

        ledger.credit(&identity, 30, "co_1").unwrap();
        let balance = await_settlement(&ledger, &identity, baseline, 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(balance.tokens_remaining, 30);
    }

    #[tokio::test]
    async fn await_settlement_yields_stale_balance_after_budget() {
        let ledger = CreditLedger::open_memory(0).unwrap();
        let identity = DeviceIdentity::new("dev-1".to_string());

        let balance = await_settlement(&ledger, &identity, 0, 2, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(balance.total(), 0);
    }
}
