use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{LineItem, ShippingAddress};
use crate::services::status_mapping::parse_status_code;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default parcel used when line items carry no dimensions.
const PARCEL_LENGTH_CM: u32 = 10;
const PARCEL_BREADTH_CM: u32 = 10;
const PARCEL_HEIGHT_CM: u32 = 10;
const PARCEL_WEIGHT_KG: f64 = 0.5;

/// Parses the timestamp formats carriers emit: RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// and `DD MM YYYY HH:MM:SS`. Naive values are taken as UTC.
pub fn parse_carrier_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%d %m %Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// What the carrier needs to book a shipment for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    pub order_id: Uuid,
    pub order_date: DateTime<Utc>,
    pub address: ShippingAddress,
    pub items: Vec<LineItem>,
    pub sub_total: Decimal,
    pub prepaid: bool,
}

/// Identifiers the carrier returned for a booked shipment. The waybill may
/// be assigned later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentHandle {
    pub shipment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbAssignment {
    pub awb_code: String,
    pub courier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingLookup {
    Awb(String),
    Shipment(String),
}

/// Latest carrier-side view of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingSnapshot {
    pub awb_code: Option<String>,
    pub courier: Option<String>,
    pub current_status: Option<String>,
    pub status_code: Option<i64>,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub tracking_url: Option<String>,
}

#[async_trait]
pub trait CarrierGateway: Send + Sync {
    async fn create_shipment(&self, request: &ShipmentRequest)
        -> Result<ShipmentHandle, ServiceError>;

    async fn assign_awb(&self, shipment_id: &str) -> Result<AwbAssignment, ServiceError>;

    async fn fetch_tracking(&self, lookup: &TrackingLookup)
        -> Result<TrackingSnapshot, ServiceError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
struct AdhocOrderItem<'a> {
    name: &'a str,
    sku: &'a str,
    units: u32,
    selling_price: f64,
}

#[derive(Serialize)]
struct AdhocOrder<'a> {
    order_id: String,
    order_date: String,
    pickup_location: &'a str,
    billing_customer_name: &'a str,
    billing_last_name: &'a str,
    billing_address: &'a str,
    billing_address_2: &'a str,
    billing_city: &'a str,
    billing_pincode: &'a str,
    billing_state: &'a str,
    billing_country: &'a str,
    billing_email: &'a str,
    billing_phone: &'a str,
    shipping_is_billing: bool,
    order_items: Vec<AdhocOrderItem<'a>>,
    payment_method: &'a str,
    sub_total: f64,
    length: u32,
    breadth: u32,
    height: u32,
    weight: f64,
}

#[derive(Deserialize)]
struct AdhocOrderResponse {
    #[serde(default)]
    shipment_id: Option<Value>,
    #[serde(default)]
    awb_code: Option<String>,
    #[serde(default)]
    courier_name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Carrier aggregator client. Logs in with account credentials and reuses
/// the bearer token until the carrier answers 401.
pub struct ShipmentClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    pickup_location: String,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for ShipmentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentClient")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("pickup_location", &self.pickup_location)
            .finish_non_exhaustive()
    }
}

/// Renders an id the carrier may send as a number or a string.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_code(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| parse_status_code(&n.to_string())),
        Value::String(s) => parse_status_code(s),
        _ => None,
    }
}

impl ShipmentClient {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        pickup_location: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ConfigurationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            password: password.into(),
            pickup_location: pickup_location.into(),
            token: RwLock::new(None),
        })
    }

    /// `ConfigurationError` when the carrier account is not configured.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let email = cfg.carrier_email.as_deref().map(str::trim).unwrap_or("");
        let password = cfg.carrier_password.as_deref().unwrap_or("");
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::ConfigurationError(
                "Carrier account not configured".to_string(),
            ));
        }
        Self::new(
            cfg.carrier_base_url.clone(),
            email,
            password,
            cfg.carrier_pickup_location.clone(),
            Duration::from_secs(cfg.carrier_timeout_secs),
        )
    }

    async fn token(&self) -> Result<String, ServiceError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }

        debug!("logging in to carrier API");
        let response = self
            .client
            .post(format!("{}/v1/external/auth/login", self.base_url))
            .json(&LoginRequest {
                email: &self.email,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| ServiceError::CarrierError(format!("carrier login failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "carrier login rejected");
            return Err(ServiceError::CarrierError(format!(
                "carrier login failed: {}",
                status
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::CarrierError(format!("carrier login response: {}", e)))?;
        *slot = Some(login.token.clone());
        Ok(login.token)
    }

    /// Sends an authenticated request and returns the decoded JSON body.
    async fn call(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Value, ServiceError> {
        let token = self.token().await?;
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            error!(operation, "carrier unreachable: {}", e);
            ServiceError::CarrierError(format!("{}: {}", operation, e))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Expired token; the next call logs in again.
            *self.token.write().await = None;
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let reason = non_empty(body.get("message")).unwrap_or_else(|| status.to_string());
            warn!(operation, %status, "carrier call failed: {}", reason);
            return Err(ServiceError::CarrierError(format!("{}: {}", operation, reason)));
        }
        Ok(body)
    }

    fn adhoc_order<'a>(&'a self, request: &'a ShipmentRequest) -> AdhocOrder<'a> {
        let address = &request.address;
        let (first_name, last_name) = address
            .name
            .trim()
            .split_once(' ')
            .unwrap_or((address.name.trim(), ""));

        AdhocOrder {
            order_id: request.order_id.to_string(),
            order_date: request.order_date.format("%Y-%m-%d %H:%M").to_string(),
            pickup_location: &self.pickup_location,
            billing_customer_name: first_name,
            billing_last_name: last_name.trim(),
            billing_address: &address.line1,
            billing_address_2: address.line2.as_deref().unwrap_or(""),
            billing_city: &address.city,
            billing_pincode: &address.postal_code,
            billing_state: &address.state,
            billing_country: &address.country,
            billing_email: address.email.as_deref().unwrap_or(""),
            billing_phone: &address.phone,
            shipping_is_billing: true,
            order_items: request
                .items
                .iter()
                .map(|item| AdhocOrderItem {
                    name: &item.name,
                    sku: item.sku.as_deref().unwrap_or(&item.product_id),
                    units: item.quantity,
                    selling_price: item.unit_price.to_f64().unwrap_or_default(),
                })
                .collect(),
            payment_method: if request.prepaid { "Prepaid" } else { "COD" },
            sub_total: request.sub_total.to_f64().unwrap_or_default(),
            length: PARCEL_LENGTH_CM,
            breadth: PARCEL_BREADTH_CM,
            height: PARCEL_HEIGHT_CM,
            weight: PARCEL_WEIGHT_KG,
        }
    }
}

fn snapshot_from(body: &Value) -> Result<TrackingSnapshot, ServiceError> {
    // Shipment-id lookups wrap the payload in an object keyed by the id.
    let data = body.get("tracking_data").or_else(|| {
        body.as_object()
            .and_then(|obj| obj.values().find_map(|v| v.get("tracking_data")))
    });
    let Some(data) = data else {
        return Err(ServiceError::CarrierError(
            "tracking response without tracking_data".to_string(),
        ));
    };

    if let Some(message) = non_empty(data.get("error")) {
        return Err(ServiceError::CarrierError(message));
    }

    let track = data
        .get("shipment_track")
        .and_then(Value::as_array)
        .and_then(|tracks| tracks.first());
    // Activities are listed newest first.
    let latest = data
        .get("shipment_track_activities")
        .and_then(Value::as_array)
        .and_then(|acts| acts.first());

    let date = |v: Option<&Value>| v.and_then(Value::as_str).and_then(parse_carrier_timestamp);

    Ok(TrackingSnapshot {
        awb_code: track.and_then(|t| t.get("awb_code")).and_then(id_string),
        courier: non_empty(track.and_then(|t| t.get("courier_name"))),
        current_status: non_empty(latest.and_then(|a| a.get("activity")))
            .or_else(|| non_empty(track.and_then(|t| t.get("current_status")))),
        status_code: as_code(latest.and_then(|a| a.get("sr-status")))
            .or_else(|| as_code(data.get("shipment_status"))),
        location: non_empty(latest.and_then(|a| a.get("location"))),
        timestamp: date(latest.and_then(|a| a.get("date"))),
        delivered_date: date(track.and_then(|t| t.get("delivered_date"))),
        pickup_date: date(track.and_then(|t| t.get("pickup_date"))),
        tracking_url: non_empty(data.get("track_url")),
    })
}

#[async_trait]
impl CarrierGateway for ShipmentClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentHandle, ServiceError> {
        let url = format!("{}/v1/external/orders/create/adhoc", self.base_url);
        let body = self
            .call(self.client.post(url).json(&self.adhoc_order(request)), "create shipment")
            .await?;

        let created: AdhocOrderResponse = serde_json::from_value(body)
            .map_err(|e| ServiceError::CarrierError(format!("create shipment response: {}", e)))?;
        let Some(shipment_id) = created.shipment_id.as_ref().and_then(id_string) else {
            return Err(ServiceError::CarrierError(
                created
                    .message
                    .unwrap_or_else(|| "carrier returned no shipment id".to_string()),
            ));
        };

        counter!("order_reconciler.shipments.created", 1);
        info!(shipment_id = %shipment_id, "carrier shipment created");

        Ok(ShipmentHandle {
            shipment_id,
            awb_code: created.awb_code.filter(|a| !a.trim().is_empty()),
            courier: created.courier_name.filter(|c| !c.trim().is_empty()),
            tracking_url: None,
        })
    }

    #[instrument(skip(self))]
    async fn assign_awb(&self, shipment_id: &str) -> Result<AwbAssignment, ServiceError> {
        let url = format!("{}/v1/external/courier/assign/awb", self.base_url);
        let body = self
            .call(
                self.client
                    .post(url)
                    .json(&serde_json::json!({ "shipment_id": shipment_id })),
                "assign awb",
            )
            .await?;

        let data = body.pointer("/response/data");
        let awb_code = data
            .and_then(|d| d.get("awb_code"))
            .and_then(id_string)
            .ok_or_else(|| {
                ServiceError::CarrierError(
                    non_empty(body.get("message"))
                        .unwrap_or_else(|| "carrier assigned no waybill".to_string()),
                )
            })?;

        info!(awb = %awb_code, "waybill assigned");
        Ok(AwbAssignment {
            awb_code,
            courier: non_empty(data.and_then(|d| d.get("courier_name"))),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_tracking(
        &self,
        lookup: &TrackingLookup,
    ) -> Result<TrackingSnapshot, ServiceError> {
        let url = match lookup {
            TrackingLookup::Awb(awb) => {
                format!("{}/v1/external/courier/track/awb/{}", self.base_url, awb)
            }
            TrackingLookup::Shipment(id) => {
                format!("{}/v1/external/courier/track/shipment/{}", self.base_url, id)
            }
        };
        let body = self.call(self.client.get(url), "fetch tracking").await?;
        snapshot_from(&body)
    }
}
