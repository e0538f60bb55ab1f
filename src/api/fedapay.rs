use anyhow::Context;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::{app_error::AppError, config::FedaPayConfig, types::PaymentMethod};

const PROVIDER: &str = "FedaPay";
const CURRENCY: &str = "XOF";
const COUNTRY: &str = "BJ";

/// Payment state as reported by the gateway, reduced to what reconciliation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    Succeeded,
    Failed,
    /// The gateway did not answer in time; the caller should poll again.
    Unknown,
}

impl GatewayStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" | "successful" | "transferred" => GatewayStatus::Succeeded,
            "declined" | "canceled" | "cancelled" | "expired" | "refunded" => {
                GatewayStatus::Failed
            }
            _ => GatewayStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTransaction<'a> {
    pub amount: i64,
    pub phone: &'a str,
    pub email: &'a str,
    pub customer_name: &'a str,
    pub order_id: i32,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTransaction {
    pub transaction_id: String,
    pub reference: Option<String>,
    pub status: GatewayStatus,
    pub payment_url: Option<String>,
}

#[derive(Deserialize)]
struct TransactionBody {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// FedaPay answers either with the bare resource or wrapped under its resource name.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped {
        #[serde(rename = "v1/transaction")]
        transaction: TransactionBody,
    },
    Bare(TransactionBody),
}

impl Envelope {
    fn into_inner(self) -> TransactionBody {
        match self {
            Envelope::Wrapped { transaction } => transaction,
            Envelope::Bare(transaction) => transaction,
        }
    }
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Clone)]
pub struct FedaPayClient {
    http: Client,
    base_url: String,
    private_key: String,
    callback_url: Option<String>,
}

impl FedaPayClient {
    pub fn new(http: Client, config: &FedaPayConfig) -> Self {
        Self {
            http,
            base_url: config.api_base_url(),
            private_key: config.private_key.clone(),
            callback_url: config.callback_url.clone(),
        }
    }

    /// Creates a transaction for an order, fetches its payment token and, for mobile
    /// money, pushes the confirmation prompt to the payer's handset.
    pub async fn create_transaction(
        &self,
        req: CreateTransaction<'_>,
    ) -> Result<CreatedTransaction, AppError> {
        tracing::info!(
            order_id = req.order_id,
            amount = req.amount,
            method = %req.method,
            "Creating FedaPay transaction"
        );

        let mut body = json!({
            "description": format!("Commande Fresh Market #{}", req.order_id),
            "amount": req.amount,
            "currency": { "iso": CURRENCY },
            "customer": {
                "firstname": req.customer_name,
                "email": req.email,
                "phone_number": { "number": req.phone, "country": COUNTRY },
            },
            "custom_metadata": { "order_id": req.order_id },
        });
        if let Some(callback_url) = &self.callback_url {
            body["callback_url"] = json!(callback_url);
        }

        let response = self
            .http
            .post(format!("{}/transactions", self.base_url))
            .bearer_auth(&self.private_key)
            .json(&body)
            .send()
            .await
            .map_err(unreachable)?;
        let transaction = read_json::<Envelope>(response).await?.into_inner();

        let token: TokenBody = read_json(
            self.http
                .post(format!(
                    "{}/transactions/{}/token",
                    self.base_url, transaction.id
                ))
                .bearer_auth(&self.private_key)
                .send()
                .await
                .map_err(unreachable)?,
        )
        .await?;

        if let Some(mode) = push_mode(req.method) {
            let response = self
                .http
                .post(format!("{}/{}", self.base_url, mode))
                .bearer_auth(&self.private_key)
                .json(&json!({ "token": token.token }))
                .send()
                .await
                .map_err(unreachable)?;
            read_json::<Value>(response).await?;
        }

        let status = transaction
            .status
            .as_deref()
            .map(GatewayStatus::from_provider)
            .unwrap_or(GatewayStatus::Pending);
        tracing::info!(
            order_id = req.order_id,
            transaction_id = %transaction.id,
            "FedaPay transaction created"
        );

        Ok(CreatedTransaction {
            transaction_id: transaction.id,
            reference: transaction.reference,
            status,
            payment_url: token.url,
        })
    }

    /// Looks up a transaction. A timeout is reported as [`GatewayStatus::Unknown`].
    pub async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayStatus, AppError> {
        let response = match self
            .http
            .get(format!("{}/transactions/{}", self.base_url, transaction_id))
            .bearer_auth(&self.private_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                tracing::warn!(transaction_id, "FedaPay status lookup timed out");
                return Ok(GatewayStatus::Unknown);
            }
            Err(err) => return Err(unreachable(err)),
        };

        let transaction = read_json::<Envelope>(response).await?.into_inner();
        Ok(transaction
            .status
            .as_deref()
            .map(GatewayStatus::from_provider)
            .unwrap_or(GatewayStatus::Pending))
    }
}

fn push_mode(method: PaymentMethod) -> Option<&'static str> {
    match method {
        PaymentMethod::Mtn => Some("mtn_open"),
        PaymentMethod::Moov => Some("moov"),
        PaymentMethod::Card | PaymentMethod::Cash => None,
    }
}

fn unreachable(err: reqwest::Error) -> AppError {
    tracing::warn!(error = %err, "FedaPay request failed");
    AppError::ServiceUnreachable(PROVIDER.into())
}

/// Decodes a successful response, or turns an error response into [`AppError::Upstream`]
/// carrying the provider's own message.
async fn read_json<T: de::DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{PROVIDER} returned {status}"));
        tracing::warn!(%status, %message, "FedaPay rejected the request");
        return Err(AppError::Upstream(message));
    }

    Ok(response
        .json()
        .await
        .with_context(|| format!("Failed to parse {PROVIDER} response"))?)
}

/// Transaction ids are numbers in FedaPay payloads; they are handled as strings here.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a transaction id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_map_to_three_outcomes() {
        assert_eq!(
            GatewayStatus::from_provider("approved"),
            GatewayStatus::Succeeded
        );
        assert_eq!(
            GatewayStatus::from_provider("transferred"),
            GatewayStatus::Succeeded
        );
        assert_eq!(
            GatewayStatus::from_provider("declined"),
            GatewayStatus::Failed
        );
        assert_eq!(GatewayStatus::from_provider("canceled"), GatewayStatus::Failed);
        assert_eq!(GatewayStatus::from_provider("pending"), GatewayStatus::Pending);
        assert_eq!(GatewayStatus::from_provider("whatever"), GatewayStatus::Pending);
    }

    #[test]
    fn envelope_accepts_wrapped_and_bare_bodies() {
        let wrapped: Envelope = serde_json::from_str(
            r#"{"v1/transaction": {"id": 1042, "reference": "trx_abc", "status": "pending"}}"#,
        )
        .unwrap();
        let wrapped = wrapped.into_inner();
        assert_eq!(wrapped.id, "1042");
        assert_eq!(wrapped.reference.as_deref(), Some("trx_abc"));

        let bare: Envelope =
            serde_json::from_str(r#"{"id": "1043", "status": "approved"}"#).unwrap();
        let bare = bare.into_inner();
        assert_eq!(bare.id, "1043");
        assert_eq!(bare.status.as_deref(), Some("approved"));
    }

    #[test]
    fn only_mobile_money_is_pushed() {
        assert_eq!(push_mode(PaymentMethod::Mtn), Some("mtn_open"));
        assert_eq!(push_mode(PaymentMethod::Moov), Some("moov"));
        assert_eq!(push_mode(PaymentMethod::Card), None);
    }
}
