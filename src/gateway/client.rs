use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::GatewayError;
use crate::ports::{GatewayRail, PaymentIntent, PaymentIntentRequest};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct IntentBody<'a> {
    amount: &'a BigDecimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ReversalBody<'a> {
    amount: &'a BigDecimal,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: Option<String>,
}

/// HTTP client for the card-payment provider. Wraps every call in a circuit
/// breaker and retries retryable failures with doubling backoff before
/// giving up.
#[derive(Clone)]
pub struct CardGatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl CardGatewayClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self::with_circuit_breaker(base_url, api_key, 5, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        api_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        CardGatewayClient {
            client,
            base_url,
            api_key,
            circuit_breaker,
        }
    }

    /// Current circuit breaker state, for health reporting.
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = url.to_string();
        let body = serde_json::to_value(body)
            .map_err(|e| GatewayError::Rejected(format!("unserializable request: {}", e)))?;

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(GatewayError::Unavailable(format!(
                        "provider returned {}",
                        status
                    )));
                }

                Ok(response)
            })
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(
                "provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Retries retryable failures with doubling backoff; terminal outcomes
    /// and an open circuit return immediately.
    async fn post_with_retry<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;

        loop {
            match self.post_json(url, body).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    tracing::warn!(
                        url,
                        attempt,
                        error = %err,
                        "retryable gateway failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn decline_reason(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ProviderError>().await {
            Ok(ProviderError { error: Some(msg) }) => msg,
            _ => format!("provider returned {}", status),
        }
    }
}

#[async_trait]
impl GatewayRail for CardGatewayClient {
    async fn create_intent(
        &self,
        req: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let url = self.endpoint("/v1/payment_intents");
        let body = IntentBody {
            amount: &req.amount,
            currency: &req.currency,
            description: req.description.as_deref(),
            payment_method: req.payment_method.as_deref(),
            metadata: &req.metadata,
        };

        let response = self.post_with_retry(&url, &body).await?;
        let status = response.status();

        if status.is_success() {
            let intent = response
                .json::<IntentResponse>()
                .await
                .map_err(GatewayError::Transport)?;
            return Ok(PaymentIntent {
                external_id: intent.id,
                client_secret: intent.client_secret,
            });
        }

        // 4xx from the provider is a terminal outcome for this payment.
        Err(GatewayError::Declined(Self::decline_reason(response).await))
    }

    async fn reverse(
        &self,
        external_id: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("/v1/payment_intents/{}/reversals", external_id));
        let body = ReversalBody { amount, currency };

        let response = self.post_with_retry(&url, &body).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::Rejected(format!(
                "unknown payment intent: {}",
                external_id
            )));
        }

        Err(GatewayError::Declined(Self::decline_reason(response).await))
    }
}
