use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rand::Rng as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tkstress_core::Session;

use crate::client::HttpClient;
use crate::error::{Error, Result};
use crate::types::{HttpRequest, HttpResponse};

/// Station pairs served by high-speed trains.
pub(crate) const HIGH_SPEED_PAIRS: &[(&str, &str)] = &[
    ("Shang Hai", "Su Zhou"),
    ("Su Zhou", "Shang Hai"),
    ("Nan Jing", "Shang Hai"),
];

/// Station pairs served by conventional trains.
pub(crate) const NORMAL_PAIRS: &[(&str, &str)] =
    &[("Shang Hai", "Nan Jing"), ("Nan Jing", "Shang Hai")];

const DEFAULT_TRAIN: &str = "D1345";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Travel date used in queries, `YYYY-MM-DD`.
    pub travel_date: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:31000".to_string(),
            username: "fdse_microservice".to_string(),
            password: "111111".to_string(),
            travel_date: today(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Order lifecycle states the stress flows care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    NotPaid,
    Paid,
}

impl OrderStatus {
    fn code(self) -> i64 {
        match self {
            Self::NotPaid => 0,
            Self::Paid => 1,
        }
    }
}

/// Everything the consign endpoint needs about an existing order.
#[derive(Debug, Clone)]
pub struct ConsignTarget {
    pub account_id: String,
    pub target_date: String,
    pub order_id: String,
    pub from: String,
    pub to: String,
}

pub(crate) struct Credentials {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    user_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Trip {
    #[serde(rename = "tripId")]
    trip_id: TripId,
}

#[derive(Debug, Deserialize)]
struct TripId {
    #[serde(rename = "type")]
    kind: String,
    number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    id: String,
    #[serde(default)]
    train_number: String,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    id: Option<String>,
}

/// Menu entry offered aboard a train, echoed back verbatim when a
/// booking includes food.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    #[serde(default)]
    pub food_name: String,
    #[serde(default)]
    pub food_price: f64,
    #[serde(default)]
    pub food_type: i64,
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub store_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TripQuery<'a> {
    departure_time: &'a str,
    starting_place: &'a str,
    end_place: &'a str,
}

/// Thin wrapper over the ticketing service REST API. Stateless apart
/// from the connection pool; caller identity comes from the [`Session`]
/// passed to each call.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(mut config: ApiConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::default(),
            config,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn get(&self, session: &Session, url: String) -> HttpRequest {
        self.authorized(session, HttpRequest::get(url))
            .header(http::header::ACCEPT, "application/json")
            .timeout(self.config.timeout)
    }

    fn post_json<B: Serialize>(
        &self,
        session: &Session,
        endpoint: &'static str,
        url: String,
        body: &B,
    ) -> Result<HttpRequest> {
        let body = serde_json::to_vec(body).map_err(|source| Error::Json { endpoint, source })?;
        Ok(self
            .authorized(session, HttpRequest::post(url, Bytes::from(body)))
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::CONTENT_TYPE, "application/json")
            .timeout(self.config.timeout))
    }

    fn authorized(&self, session: &Session, req: HttpRequest) -> HttpRequest {
        match session.token() {
            Some(token) => req.header(http::header::AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        }
    }

    fn user_id(session: &Session) -> Result<String> {
        session
            .user_id()
            .map(|id| id.to_string())
            .ok_or(Error::NotAuthenticated)
    }

    /// Reachability probe against the login page, used by config checks
    /// before any credentials are exchanged.
    pub async fn check_connection(&self) -> Result<()> {
        let req = HttpRequest::get(self.url("/client_login.html")).timeout(self.config.timeout);
        let res = self.http.request(req).await?;
        if res.is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                status: res.status,
                endpoint: "client_login.html",
                detail: res.body_snippet(),
            })
        }
    }

    pub(crate) async fn login(&self) -> Result<Credentials> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,
        }

        let endpoint = "users/login";
        let body = LoginRequest {
            username: &self.config.username,
            password: &self.config.password,
        };
        let body =
            serde_json::to_vec(&body).map_err(|source| Error::Json { endpoint, source })?;
        let req = HttpRequest::post(self.url("/api/v1/users/login"), Bytes::from(body))
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::CONTENT_TYPE, "application/json")
            .timeout(self.config.timeout);

        let res = self.http.request(req).await?;
        let data: Option<LoginData> = decode(endpoint, &res)?;
        match data {
            Some(data) => Ok(Credentials {
                token: data.token,
                user_id: data.user_id,
            }),
            None => Err(Error::Status {
                status: res.status,
                endpoint,
                detail: res.body_snippet(),
            }),
        }
    }

    /// Left-ticket query against the high-speed travel service. Returns
    /// the formatted trip ids (`type` + `number`).
    pub async fn query_high_speed_ticket(
        &self,
        session: &Session,
        place_pair: (&str, &str),
        date: &str,
    ) -> Result<Vec<String>> {
        self.query_trips(session, "/api/v1/travelservice/trips/left", place_pair, date)
            .await
    }

    pub async fn query_normal_ticket(
        &self,
        session: &Session,
        place_pair: (&str, &str),
        date: &str,
    ) -> Result<Vec<String>> {
        self.query_trips(session, "/api/v1/travel2service/trips/left", place_pair, date)
            .await
    }

    /// Variant of the left-ticket query that fans out across travel
    /// services server-side.
    pub async fn query_high_speed_ticket_parallel(
        &self,
        session: &Session,
        place_pair: (&str, &str),
        date: &str,
    ) -> Result<Vec<String>> {
        self.query_trips(
            session,
            "/api/v1/travelservice/trips/left_parallel",
            place_pair,
            date,
        )
        .await
    }

    async fn query_trips(
        &self,
        session: &Session,
        path: &'static str,
        place_pair: (&str, &str),
        date: &str,
    ) -> Result<Vec<String>> {
        let body = TripQuery {
            departure_time: date,
            starting_place: place_pair.0,
            end_place: place_pair.1,
        };
        let req = self.post_json(session, path, self.url(path), &body)?;
        let res = self.http.request(req).await?;
        let trips: Vec<Trip> = decode(path, &res)?.unwrap_or_default();
        Ok(trips
            .into_iter()
            .map(|t| format!("{}{}", t.trip_id.kind, t.trip_id.number))
            .collect())
    }

    pub async fn query_food(
        &self,
        session: &Session,
        place_pair: (&str, &str),
        train_num: &str,
        date: &str,
    ) -> Result<Vec<Food>> {
        let train = if train_num.is_empty() {
            DEFAULT_TRAIN
        } else {
            train_num
        };
        let url = self.url(&format!(
            "/api/v1/foodservice/foods/{date}/{}/{}/{train}",
            place_pair.0, place_pair.1
        ));
        let res = self.http.request(self.get(session, url)).await?;
        Ok(decode("foodservice/foods", &res)?.unwrap_or_default())
    }

    /// Fetches the caller's orders, filtered by status. `other` selects
    /// the conventional-train order service instead of the high-speed
    /// one. Returns `(order id, trip id)` pairs.
    pub async fn query_orders(
        &self,
        session: &Session,
        statuses: &[OrderStatus],
        other: bool,
    ) -> Result<Vec<(String, String)>> {
        let orders = self.refresh_orders(session, other).await?;
        Ok(orders
            .into_iter()
            .filter(|o| statuses.iter().any(|s| s.code() == o.status))
            .map(|o| (o.id, o.train_number))
            .collect())
    }

    /// Like [`query_orders`](Self::query_orders) but keeps the fields
    /// the consign endpoint needs.
    pub async fn query_orders_all_info(
        &self,
        session: &Session,
        other: bool,
    ) -> Result<Vec<ConsignTarget>> {
        let now = now_datetime();
        let orders = self.refresh_orders(session, other).await?;
        Ok(orders
            .into_iter()
            .map(|o| ConsignTarget {
                account_id: o.account_id,
                target_date: now.clone(),
                order_id: o.id,
                from: o.from,
                to: o.to,
            })
            .collect())
    }

    async fn refresh_orders(&self, session: &Session, other: bool) -> Result<Vec<Order>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct OrderQuery<'a> {
            login_id: &'a str,
        }

        let (endpoint, path) = if other {
            (
                "orderOther/refresh",
                "/api/v1/orderOtherService/orderOther/refresh",
            )
        } else {
            ("order/refresh", "/api/v1/orderservice/order/refresh")
        };
        let login_id = Self::user_id(session)?;
        let body = OrderQuery {
            login_id: &login_id,
        };
        let req = self.post_json(session, endpoint, self.url(path), &body)?;
        let res = self.http.request(req).await?;
        Ok(decode(endpoint, &res)?.unwrap_or_default())
    }

    /// Settles an unpaid order. `Ok(false)` means the service answered
    /// 200 but reported no effect.
    pub async fn pay_order(
        &self,
        session: &Session,
        order_id: &str,
        trip_id: &str,
    ) -> Result<bool> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct PaymentRequest<'a> {
            order_id: &'a str,
            trip_id: &'a str,
        }

        let endpoint = "inside_payment";
        let body = PaymentRequest { order_id, trip_id };
        let req = self.post_json(
            session,
            endpoint,
            self.url("/api/v1/inside_pay_service/inside_payment"),
            &body,
        )?;
        let res = self.http.request(req).await?;
        Ok(decode::<serde_json::Value>(endpoint, &res)?.is_some())
    }

    pub async fn cancel_order(&self, session: &Session, order_id: &str) -> Result<bool> {
        let uid = Self::user_id(session)?;
        let url = self.url(&format!("/api/v1/cancelservice/cancel/{order_id}/{uid}"));
        let res = self.http.request(self.get(session, url)).await?;
        Ok(decode::<serde_json::Value>("cancelservice/cancel", &res)?.is_some())
    }

    pub async fn collect_order(&self, session: &Session, order_id: &str) -> Result<bool> {
        let url = self.url(&format!(
            "/api/v1/executeservice/execute/collected/{order_id}"
        ));
        let res = self.http.request(self.get(session, url)).await?;
        Ok(decode::<serde_json::Value>("execute/collected", &res)?.is_some())
    }

    pub async fn put_consign(&self, session: &Session, target: &ConsignTarget) -> Result<bool> {
        let endpoint = "consignservice/consigns";
        let uid = Self::user_id(session)?;
        let weight = (rand::rng().random_range(1.0..10.0) * 10.0_f64).round() / 10.0;
        let name = format!("Consign-{}", unix_seconds());
        let body = serde_json::json!({
            "accountId": target.account_id,
            "handleDate": target.target_date,
            "targetDate": target.target_date,
            "from": target.from,
            "to": target.to,
            "orderId": target.order_id,
            "consignee": uid,
            "phone": "12345678900",
            "weight": weight,
            "id": "",
            "isWithin": false,
            "name": name,
        });
        let req = self.post_json(session, endpoint, self.url("/api/v1/consignservice/consigns"), &body)?;
        let res = self.http.request(req).await?;
        Ok(decode::<serde_json::Value>(endpoint, &res)?.is_some())
    }

    /// Contact ids registered for the logged-in account, needed when
    /// booking a seat.
    pub async fn query_contacts(&self, session: &Session) -> Result<Vec<String>> {
        let uid = Self::user_id(session)?;
        let url = self.url(&format!("/api/v1/contactservice/contacts/account/{uid}"));
        let res = self.http.request(self.get(session, url)).await?;
        let contacts: Vec<Contact> = decode("contactservice/contacts", &res)?.unwrap_or_default();
        Ok(contacts.into_iter().filter_map(|c| c.id).collect())
    }

    pub async fn query_assurances(&self, session: &Session) -> Result<()> {
        let url = self.url("/api/v1/assuranceservice/assurances/types");
        let res = self.http.request(self.get(session, url)).await?;
        decode::<serde_json::Value>("assurances/types", &res)?;
        Ok(())
    }

    /// Books a seat on one of `trip_ids`, optionally attaching food,
    /// assurance and consign extras at random the way a live user mix
    /// would.
    pub async fn preserve(
        &self,
        session: &Session,
        start: &str,
        end: &str,
        trip_ids: &[String],
        high_speed: bool,
        date: &str,
    ) -> Result<bool> {
        let endpoint = "preserveservice/preserve";
        let uid = Self::user_id(session)?;
        let trip_id = match pick(trip_ids) {
            Some(id) => id.clone(),
            None => return Ok(false),
        };

        let mut payload = serde_json::json!({
            "accountId": uid,
            "assurance": "0",
            "contactsId": "",
            "date": date,
            "from": start,
            "to": end,
            "tripId": trip_id,
            "seatType": if rand::rng().random_bool(0.5) { "2" } else { "3" },
        });

        let need_food = rand::rng().random_bool(0.5);
        let need_assurance = rand::rng().random_bool(0.5);

        let mut food_extra = None;
        if need_food {
            let foods = self
                .query_food(session, (start, end), DEFAULT_TRAIN, date)
                .await?;
            food_extra = pick(&foods).map(|food| serde_json::json!(food));
        }
        match food_extra {
            Some(extra) => merge(&mut payload, extra),
            None => merge(&mut payload, serde_json::json!({ "foodType": "0" })),
        }

        if need_assurance {
            merge(&mut payload, serde_json::json!({ "assurance": 1 }));
        }

        let contacts = self.query_contacts(session).await?;
        if let Some(contacts_id) = pick(&contacts) {
            payload["contactsId"] = serde_json::Value::String(contacts_id.clone());
        }

        let path = if high_speed {
            "/api/v1/preserveservice/preserve"
        } else {
            "/api/v1/preserveotherservice/preserveOther"
        };
        let req = self.post_json(session, endpoint, self.url(path), &payload)?;
        let res = self.http.request(req).await?;
        let data: Option<serde_json::Value> = decode(endpoint, &res)?;
        Ok(matches!(&data, Some(serde_json::Value::String(s)) if s == "Success"))
    }

    pub async fn rebook_ticket(
        &self,
        session: &Session,
        order_id: &str,
        old_trip_id: &str,
        new_trip_id: &str,
        date: &str,
    ) -> Result<bool> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RebookRequest<'a> {
            old_trip_id: &'a str,
            order_id: &'a str,
            trip_id: &'a str,
            date: &'a str,
            seat_type: &'a str,
        }

        let endpoint = "rebookservice/rebook";
        let seat_type = if rand::rng().random_bool(0.5) {
            "2"
        } else {
            "3"
        };
        let body = RebookRequest {
            old_trip_id,
            order_id,
            trip_id: new_trip_id,
            date,
            seat_type,
        };
        let req = self.post_json(session, endpoint, self.url("/api/v1/rebookservice/rebook"), &body)?;
        let res = self.http.request(req).await?;
        Ok(decode::<serde_json::Value>(endpoint, &res)?.is_some())
    }
}

/// Non-2xx becomes a status error; 2xx with an absent `data` field
/// decodes to `None` so callers can treat it as an empty result.
fn decode<T: DeserializeOwned>(endpoint: &'static str, res: &HttpResponse) -> Result<Option<T>> {
    if !res.is_success() {
        return Err(Error::Status {
            status: res.status,
            endpoint,
            detail: res.body_snippet(),
        });
    }
    let envelope: Envelope<T> =
        serde_json::from_slice(&res.body).map_err(|source| Error::Json { endpoint, source })?;
    Ok(envelope.data)
}

pub(crate) fn pick<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let idx = rand::rng().random_range(0..items.len());
    items.get(idx)
}

fn merge(payload: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(map), serde_json::Value::Object(extra)) = (payload.as_object_mut(), extra) {
        map.extend(extra);
    }
}

fn today() -> String {
    let stamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
    stamp.chars().take(10).collect()
}

fn now_datetime() -> String {
    let stamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
    stamp.trim_end_matches('Z').replace('T', " ")
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
