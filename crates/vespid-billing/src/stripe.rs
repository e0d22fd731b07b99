// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal Stripe API client and the price cache.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Price cache TTL.
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(600);

/// Stripe call failures.
#[derive(Debug, thiserror::Error)]
#[error("stripe call failed: {reason}")]
pub struct StripeCallError {
    /// What the client observed.
    pub reason: String,
}

/// A checkout session created on the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Processor-side session id.
    pub id: String,
    /// Redirect URL for the browser.
    pub url: String,
}

/// Thin Stripe REST client (form-encoded, bearer-authenticated).
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    /// Public API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.stripe.com";

    /// Build a client; `base_url: None` targets the public API.
    pub fn new(secret_key: String, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_owned()),
            secret_key,
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<Value, StripeCallError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(10))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|err| StripeCallError {
                reason: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StripeCallError {
                reason: format!("stripe answered {status}"),
            });
        }
        response.json().await.map_err(|err| StripeCallError {
            reason: err.to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<Value, StripeCallError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(10))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| StripeCallError {
                reason: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StripeCallError {
                reason: format!("stripe answered {status}"),
            });
        }
        response.json().await.map_err(|err| StripeCallError {
            reason: err.to_string(),
        })
    }

    /// Create a checkout session for a credit pack.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: &[(&str, String)],
    ) -> Result<CheckoutSession, StripeCallError> {
        let mut form = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("line_items[0][price]".to_owned(), price_id.to_owned()),
            ("line_items[0][quantity]".to_owned(), "1".to_owned()),
            ("success_url".to_owned(), success_url.to_owned()),
            ("cancel_url".to_owned(), cancel_url.to_owned()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        let body = self.post_form("/v1/checkout/sessions", &form).await?;
        match (body["id"].as_str(), body["url"].as_str()) {
            (Some(id), Some(url)) => Ok(CheckoutSession {
                id: id.to_owned(),
                url: url.to_owned(),
            }),
            _ => Err(StripeCallError {
                reason: "checkout session response missing id/url".into(),
            }),
        }
    }

    /// Fetch a price object.
    pub async fn price(&self, price_id: &str) -> Result<Value, StripeCallError> {
        self.get(&format!("/v1/prices/{price_id}")).await
    }
}

// ---------------------------------------------------------------------------
// Price cache
// ---------------------------------------------------------------------------

struct Slot {
    cached: Option<(Instant, Value)>,
}

/// 10-minute TTL cache over price lookups with per-key inflight
/// deduplication: concurrent callers for the same price serialize on the
/// slot lock, so only the first of a burst goes to the network.
#[derive(Default)]
pub struct PriceCache {
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl PriceCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get `price_id`, fetching through `fetch` on miss or expiry.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        price_id: &str,
        fetch: F,
    ) -> Result<Value, StripeCallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, StripeCallError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(price_id.to_owned())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Slot { cached: None }))
                })
                .clone()
        };
        // Holding the slot lock across the fetch is the inflight dedupe.
        let mut slot = slot.lock().await;
        if let Some((at, value)) = &slot.cached {
            if at.elapsed() < PRICE_CACHE_TTL {
                debug!(price_id, "price cache hit");
                return Ok(value.clone());
            }
        }
        let value = fetch().await?;
        slot.cached = Some((Instant::now(), value.clone()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn checkout_session_posts_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header_exists("authorization"))
            .and(body_string_contains("metadata%5BorganizationId%5D"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1", "url": "https://checkout.stripe.com/pay/cs_test_1"
            })))
            .mount(&server)
            .await;
        let client = StripeClient::new("sk_test_x".into(), Some(server.uri()));
        let session = client
            .create_checkout_session(
                "price_1",
                "https://app/success",
                "https://app/cancel",
                &[("organizationId", "org-uuid".to_owned())],
            )
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
    }

    #[tokio::test]
    async fn price_cache_fetches_once_within_ttl() {
        let cache = PriceCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache
                .get_or_fetch("price_1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({ "unit_amount": 500 }))
                })
                .await
                .unwrap();
            assert_eq!(value["unit_amount"], 500);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let cache = Arc::new(PriceCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("price_1", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(serde_json::json!({ "unit_amount": 500 }))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let cache = PriceCache::new();
        let err = cache
            .get_or_fetch("price_1", || async {
                Err(StripeCallError {
                    reason: "down".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(err.reason.contains("down"));
        let value = cache
            .get_or_fetch("price_1", || async {
                Ok(serde_json::json!({ "unit_amount": 100 }))
            })
            .await
            .unwrap();
        assert_eq!(value["unit_amount"], 100);
    }
}
