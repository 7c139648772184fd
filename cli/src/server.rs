use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, patch, post},
};
use chrono::{Duration, Local, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};

use crate::recipe_page::RecipePageClient;
use crate::weather::WeatherClient;
use hearth_core::auth::{LoginRateLimiter, is_valid_pin_format, verify_pin};
use hearth_core::calendar;
use hearth_core::db::Database;
use hearth_core::grocery::generate_grocery_list;
use hearth_core::ledger::{self, LedgerError};
use hearth_core::models::{
    ALL_DAYS, ChoreCompletion, ChoreDetail, DEFAULT_SECTION, GroceryItem, Ingredient,
    MAX_CHORE_POINTS, Macros, MealPlan, NewChore, NewGroceryItem, NewMealPlan, NewPantryItem,
    NewRecipe, NewUser, PantryItem, Recipe, UpdateChore, UpdateGroceryItem, UpdatePantryItem,
    UpdateRecipe, User, non_blank, normalize_days_of_week, parse_date, validate_meal_type,
};
use hearth_core::recipe_import::parse_recipe_page;
use hearth_core::weather::Weather;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

pub const SESSION_COOKIE: &str = "hearthboard_session";
pub const SESSION_FLAG_COOKIE: &str = "hearthboard_session_valid";
const SESSION_DAYS: i64 = 30;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    weather: Arc<WeatherClient>,
    pages: Arc<RecipePageClient>,
    pin_hash: Option<String>,
    limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    pin: Value,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    name: Option<String>,
    color: Option<String>,
    emoji: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChoresQuery {
    week_offset: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChoreRequest {
    name: Option<String>,
    description: Option<String>,
    points: Option<i64>,
    is_claimable: Option<bool>,
    is_recurring: Option<bool>,
    days_of_week: Option<Vec<i64>>,
    assigned_user_ids: Option<Vec<i64>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::option_option)]
struct UpdateChoreRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    description: Option<Option<String>>,
    points: Option<i64>,
    is_claimable: Option<bool>,
    is_recurring: Option<bool>,
    days_of_week: Option<Vec<i64>>,
    assigned_user_ids: Option<Vec<i64>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteChoreRequest {
    chore_id: Option<i64>,
    user_id: Option<i64>,
    date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionQuery {
    chore_id: Option<String>,
    user_id: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct CreateGroceryRequest {
    name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    section: Option<String>,
    store: Option<String>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateGroceryRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    quantity: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    unit: Option<Option<String>>,
    section: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    store: Option<Option<String>>,
    checked: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearGroceryQuery {
    checked_only: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateGroceryRequest {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePantryRequest {
    name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    expires_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::option_option)]
struct UpdatePantryRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    quantity: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    unit: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    expires_at: Option<Option<String>>,
}

#[derive(Deserialize)]
struct RecipesQuery {
    favorites: Option<String>,
    search: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecipeRequest {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    ingredients: Vec<Ingredient>,
    #[serde(default)]
    steps: Vec<String>,
    prep_time: Option<i64>,
    cook_time: Option<i64>,
    servings: Option<i64>,
    macros: Option<Macros>,
    source_url: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::option_option)]
struct UpdateRecipeRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    description: Option<Option<String>>,
    ingredients: Option<Vec<Ingredient>>,
    steps: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    prep_time: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    cook_time: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    servings: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    macros: Option<Option<Macros>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    source_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    image_url: Option<Option<String>>,
    is_favorite: Option<bool>,
}

#[derive(Deserialize)]
struct ImportRecipeRequest {
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealPlansQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMealPlanRequest {
    date: Option<String>,
    meal_type: Option<String>,
    recipe_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMealPlanQuery {
    date: Option<String>,
    meal_type: Option<String>,
}

#[derive(Deserialize)]
struct WeatherQuery {
    location: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    TooManyRequests(String),
    PayloadTooLarge,
    /// An outside service failed; the message is safe to show.
    Upstream(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            Self::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ChoreNotFound
            | LedgerError::UserNotFound
            | LedgerError::CompletionNotFound => Self::NotFound(err.to_string()),
            LedgerError::NotAssigned => Self::Forbidden(err.to_string()),
            LedgerError::BalanceOutOfRange => Self::BadRequest(err.to_string()),
            LedgerError::Storage(e) => Self::Internal(e.into()),
        }
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn parse_day(value: &str) -> Result<NaiveDate, ApiError> {
    parse_date(value).map_err(|e| bad_request(&e))
}

fn parse_id(value: Option<&str>, field: &str) -> Result<Option<i64>, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {field} '{v}'")))
        })
        .transpose()
}

fn required_name(value: Option<String>, message: &str) -> Result<String, ApiError> {
    non_blank(value).ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// JSON body extractor whose rejections use the API's error shape.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::PayloadTooLarge)
            }
            Err(rejection) => {
                debug!("rejected request body: {rejection}");
                Err(ApiError::BadRequest("Invalid request".to_string()))
            }
        }
    }
}

// --- Sessions ---

fn is_public_path(path: &str) -> bool {
    if path == "/login" || path == "/api/auth/login" || path.starts_with("/static/") {
        return true;
    }
    path.rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// First entry of `X-Forwarded-For`, else `unknown`.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn new_session_token() -> String {
    use rand::Rng;
    use std::fmt::Write;

    let bytes: [u8; 32] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn session_cookies(token: &str, max_age: i64) -> [String; 2] {
    [
        format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}"),
        format!("{SESSION_FLAG_COOKIE}=true; SameSite=Lax; Path=/; Max-Age={max_age}"),
    ]
}

fn with_cookies(mut response: Response, cookies: &[String]) -> Result<Response, ApiError> {
    for cookie in cookies {
        let value = HeaderValue::from_str(cookie).context("invalid Set-Cookie value")?;
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

// --- Middleware ---

async fn session_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let active = cookie_value(request.headers(), SESSION_COOKIE).is_some_and(|token| {
        state
            .db()
            .session_is_active(&token, Utc::now())
            .unwrap_or_else(|e| {
                error!("session lookup failed: {e:#}");
                false
            })
    });

    if active {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "no valid session; redirecting to login");
        Redirect::temporary("/login").into_response()
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response
}

// --- Pages ---

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Hearthboard</title>
</head>
<body>
<main>
<h1>Hearthboard</h1>
<form id="login">
<label for="pin">Family PIN</label>
<input id="pin" name="pin" type="password" inputmode="numeric" maxlength="6" autocomplete="off" autofocus>
<button type="submit">Unlock</button>
<p id="error" role="alert"></p>
</form>
</main>
<script>
document.getElementById("login").addEventListener("submit", async (event) => {
  event.preventDefault();
  const pin = document.getElementById("pin").value;
  const res = await fetch("/api/auth/login", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ pin }),
  });
  if (res.ok) {
    window.location.href = "/";
  } else {
    const body = await res.json().catch(() => ({}));
    document.getElementById("error").textContent = body.error || "Login failed";
  }
});
</script>
</body>
</html>
"#;

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

async fn index() -> Html<String> {
    let now = Local::now();
    let week = calendar::week_range(now.date_naive(), 0)
        .map(|(start, end)| {
            format!(
                "Week of {} to {}",
                start.format("%b %-d"),
                end.format("%b %-d")
            )
        })
        .unwrap_or_default();
    Html(format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Hearthboard</title></head>\
         <body><h1>{}</h1><p>{week}</p></body></html>",
        calendar::greeting(now.hour()),
    ))
}

// --- Auth handlers ---

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers);
    if state.limiter.is_limited(&ip) {
        warn!(%ip, "login attempt while locked out");
        return Err(ApiError::TooManyRequests(
            "Too many failed attempts. Please wait 5 minutes.".to_string(),
        ));
    }

    let req: LoginRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid request".to_string()))?;
    let pin = req
        .pin
        .as_str()
        .filter(|p| is_valid_pin_format(p))
        .ok_or_else(|| ApiError::BadRequest("Invalid PIN format".to_string()))?;

    if !verify_pin(pin, state.pin_hash.as_deref()) {
        state.limiter.record_failure(&ip);
        warn!(
            %ip,
            failures = state.limiter.failure_count(&ip),
            "failed login attempt"
        );
        return Err(ApiError::Unauthorized("Incorrect PIN".to_string()));
    }

    state.limiter.clear(&ip);
    let token = new_session_token();
    {
        let db = state.db();
        let now = Utc::now();
        db.purge_expired_sessions(now)
            .context("failed to purge sessions")?;
        db.create_session(&token, now + Duration::days(SESSION_DAYS))
            .context("failed to create session")?;
    }
    info!(%ip, "login succeeded");

    let max_age = SESSION_DAYS * 24 * 60 * 60;
    with_cookies(success().into_response(), &session_cookies(&token, max_age))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        state
            .db()
            .delete_session(&token)
            .context("failed to delete session")?;
    }
    info!("logged out");
    with_cookies(success().into_response(), &session_cookies("", 0))
}

// --- User handlers ---

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.db().list_users().context("database error")?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let (Some(name), Some(color)) = (non_blank(req.name), non_blank(req.color)) else {
        return Err(ApiError::BadRequest(
            "Name and color are required".to_string(),
        ));
    };
    let user = state
        .db()
        .create_user(&NewUser {
            name,
            color,
            emoji: non_blank(req.emoji),
        })
        .context("failed to create user")?;
    info!(user_id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.db().delete_user(id).context("database error")? {
        info!(user_id = id, "user deleted");
        Ok(success())
    } else {
        Err(ApiError::NotFound("User not found".to_string()))
    }
}

// --- Chore handlers ---

fn check_user_ids(db: &Database, ids: &[i64]) -> Result<Vec<i64>, ApiError> {
    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let missing = db.missing_user_ids(&unique).context("database error")?;
    if missing.is_empty() {
        return Ok(unique);
    }
    let listed: Vec<String> = missing.iter().map(ToString::to_string).collect();
    Err(ApiError::BadRequest(format!(
        "Unknown user id(s): {}",
        listed.join(", ")
    )))
}

fn check_points(points: Option<i64>) -> Result<(), ApiError> {
    if points.is_some_and(|p| !(0..=MAX_CHORE_POINTS).contains(&p)) {
        return Err(ApiError::BadRequest(format!(
            "points must be between 0 and {MAX_CHORE_POINTS}"
        )));
    }
    Ok(())
}

async fn list_chores(
    State(state): State<AppState>,
    Query(params): Query<ChoresQuery>,
) -> Result<Json<Vec<ChoreDetail>>, ApiError> {
    let raw = params.week_offset.as_deref().map(str::trim).unwrap_or("");
    let invalid = || ApiError::BadRequest(format!("Invalid weekOffset '{raw}'"));
    let offset = if raw.is_empty() {
        0
    } else {
        raw.parse::<i64>().map_err(|_| invalid())?
    };
    let (start, end) =
        calendar::week_range(Local::now().date_naive(), offset).ok_or_else(invalid)?;
    let chores = state
        .db()
        .list_chores_for_range(start, end)
        .context("database error")?;
    Ok(Json(chores))
}

async fn create_chore(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateChoreRequest>,
) -> Result<(StatusCode, Json<ChoreDetail>), ApiError> {
    let name = required_name(req.name, "Chore name is required")?;
    check_points(req.points)?;
    let days_of_week = match req.days_of_week {
        Some(days) => normalize_days_of_week(&days).map_err(|e| bad_request(&e))?,
        None => ALL_DAYS.to_vec(),
    };

    let db = state.db();
    let assigned_user_ids = check_user_ids(&db, &req.assigned_user_ids.unwrap_or_default())?;
    let chore = db
        .create_chore(&NewChore {
            name,
            description: non_blank(req.description),
            points: req.points.unwrap_or(1),
            is_claimable: req.is_claimable.unwrap_or(false),
            is_recurring: req.is_recurring.unwrap_or(true),
            days_of_week,
            assigned_user_ids,
        })
        .context("failed to create chore")?;
    info!(chore_id = chore.chore.id, "chore created");
    Ok((StatusCode::CREATED, Json(chore)))
}

async fn get_chore(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChoreDetail>, ApiError> {
    state
        .db()
        .get_chore_detail(id)
        .context("database error")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Chore not found".to_string()))
}

async fn update_chore(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateChoreRequest>,
) -> Result<Json<ChoreDetail>, ApiError> {
    let name = match req.name {
        Some(name) => Some(required_name(Some(name), "Chore name cannot be empty")?),
        None => None,
    };
    check_points(req.points)?;
    let days_of_week = req
        .days_of_week
        .as_deref()
        .map(normalize_days_of_week)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    let db = state.db();
    let assigned_user_ids = req
        .assigned_user_ids
        .as_deref()
        .map(|ids| check_user_ids(&db, ids))
        .transpose()?;

    let update = UpdateChore {
        name,
        description: req.description.map(non_blank),
        points: req.points,
        is_claimable: req.is_claimable,
        is_recurring: req.is_recurring,
        days_of_week,
        assigned_user_ids,
    };
    db.update_chore(id, &update)
        .context("failed to update chore")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Chore not found".to_string()))
}

async fn delete_chore(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.db().delete_chore(id).context("database error")? {
        info!(chore_id = id, "chore deleted");
        Ok(success())
    } else {
        Err(ApiError::NotFound("Chore not found".to_string()))
    }
}

async fn complete_chore(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CompleteChoreRequest>,
) -> Result<(StatusCode, Json<ChoreCompletion>), ApiError> {
    let (Some(chore_id), Some(user_id), Some(date)) =
        (req.chore_id, req.user_id, non_blank(req.date))
    else {
        return Err(ApiError::BadRequest(
            "choreId, userId, and date are required".to_string(),
        ));
    };
    let date = parse_day(&date)?;

    let done = ledger::complete_chore(&state.db(), chore_id, user_id, date)?;
    Ok((StatusCode::CREATED, Json(done.completion)))
}

async fn uncomplete_chore(
    State(state): State<AppState>,
    Query(params): Query<CompletionQuery>,
) -> Result<Json<Value>, ApiError> {
    let chore_id = parse_id(params.chore_id.as_deref(), "choreId")?;
    let user_id = parse_id(params.user_id.as_deref(), "userId")?;
    let (Some(chore_id), Some(user_id), Some(date)) =
        (chore_id, user_id, non_blank(params.date))
    else {
        return Err(ApiError::BadRequest(
            "choreId, userId, and date are required".to_string(),
        ));
    };
    let date = parse_day(&date)?;

    ledger::uncomplete_chore(&state.db(), chore_id, user_id, date)?;
    Ok(success())
}

// --- Grocery handlers ---

async fn list_grocery(State(state): State<AppState>) -> Result<Json<Vec<GroceryItem>>, ApiError> {
    let items = state.db().list_grocery_items().context("database error")?;
    Ok(Json(items))
}

async fn create_grocery(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateGroceryRequest>,
) -> Result<(StatusCode, Json<GroceryItem>), ApiError> {
    let name = required_name(req.name, "Item name is required")?;
    let item = state
        .db()
        .create_grocery_item(&NewGroceryItem {
            name,
            quantity: req.quantity,
            unit: non_blank(req.unit),
            section: non_blank(req.section).unwrap_or_else(|| DEFAULT_SECTION.to_string()),
            store: non_blank(req.store),
        })
        .context("failed to create grocery item")?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn clear_grocery(
    State(state): State<AppState>,
    Query(params): Query<ClearGroceryQuery>,
) -> Result<Json<Value>, ApiError> {
    let checked_only = params.checked_only.as_deref() == Some("true");
    let deleted = state
        .db()
        .clear_grocery_items(checked_only)
        .context("failed to clear grocery list")?;
    info!(deleted, checked_only, "grocery list cleared");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn update_grocery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateGroceryRequest>,
) -> Result<Json<GroceryItem>, ApiError> {
    let name = match req.name {
        Some(name) => Some(required_name(Some(name), "Item name cannot be empty")?),
        None => None,
    };
    let update = UpdateGroceryItem {
        name,
        quantity: req.quantity,
        unit: req.unit.map(non_blank),
        section: req
            .section
            .map(|s| non_blank(Some(s)).unwrap_or_else(|| DEFAULT_SECTION.to_string())),
        store: req.store.map(non_blank),
        checked: req.checked,
    };
    state
        .db()
        .update_grocery_item(id, &update)
        .context("failed to update grocery item")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))
}

async fn delete_grocery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.db().delete_grocery_item(id).context("database error")? {
        Ok(success())
    } else {
        Err(ApiError::NotFound("Item not found".to_string()))
    }
}

async fn generate_grocery(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateGroceryRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(start), Some(end)) = (non_blank(req.start_date), non_blank(req.end_date)) else {
        return Err(ApiError::BadRequest(
            "startDate and endDate are required".to_string(),
        ));
    };
    let (start, end) = (parse_day(&start)?, parse_day(&end)?);
    if start > end {
        return Err(ApiError::BadRequest(
            "startDate must not be after endDate".to_string(),
        ));
    }

    let summary = generate_grocery_list(&state.db(), start, end)
        .context("failed to generate grocery list")?;
    info!(
        added = summary.added,
        failed = summary.failed.len(),
        %start,
        %end,
        "grocery list generated"
    );
    let value = serde_json::to_value(summary).context("failed to serialize summary")?;
    Ok(Json(value))
}

// --- Pantry handlers ---

fn parse_optional_day(value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    non_blank(value).as_deref().map(parse_day).transpose()
}

async fn list_pantry(State(state): State<AppState>) -> Result<Json<Vec<PantryItem>>, ApiError> {
    let items = state.db().list_pantry_items().context("database error")?;
    Ok(Json(items))
}

async fn create_pantry(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreatePantryRequest>,
) -> Result<(StatusCode, Json<PantryItem>), ApiError> {
    let name = required_name(req.name, "Item name is required")?;
    let item = state
        .db()
        .create_pantry_item(&NewPantryItem {
            name,
            quantity: req.quantity,
            unit: non_blank(req.unit),
            expires_at: parse_optional_day(req.expires_at)?,
        })
        .context("failed to create pantry item")?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_pantry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdatePantryRequest>,
) -> Result<Json<PantryItem>, ApiError> {
    let name = match req.name {
        Some(name) => Some(required_name(Some(name), "Item name cannot be empty")?),
        None => None,
    };
    let expires_at = req.expires_at.map(parse_optional_day).transpose()?;
    let update = UpdatePantryItem {
        name,
        quantity: req.quantity,
        unit: req.unit.map(non_blank),
        expires_at,
    };
    state
        .db()
        .update_pantry_item(id, &update)
        .context("failed to update pantry item")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))
}

async fn delete_pantry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.db().delete_pantry_item(id).context("database error")? {
        Ok(success())
    } else {
        Err(ApiError::NotFound("Item not found".to_string()))
    }
}

// --- Recipe handlers ---

async fn list_recipes(
    State(state): State<AppState>,
    Query(params): Query<RecipesQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let favorites_only = params.favorites.as_deref() == Some("true");
    let search = non_blank(params.search);
    let recipes = state
        .db()
        .list_recipes(favorites_only, search.as_deref())
        .context("database error")?;
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let name = required_name(req.name, "Recipe name is required")?;
    let recipe = state
        .db()
        .create_recipe(&NewRecipe {
            name,
            description: non_blank(req.description),
            ingredients: req.ingredients,
            steps: req.steps,
            prep_time: req.prep_time,
            cook_time: req.cook_time,
            servings: req.servings,
            macros: req.macros,
            source_url: non_blank(req.source_url),
            image_url: non_blank(req.image_url),
        })
        .context("failed to create recipe")?;
    info!(recipe_id = recipe.id, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    state
        .db()
        .get_recipe(id)
        .context("database error")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Recipe not found".to_string()))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateRecipeRequest>,
) -> Result<Json<Recipe>, ApiError> {
    let name = match req.name {
        Some(name) => Some(required_name(Some(name), "Recipe name cannot be empty")?),
        None => None,
    };
    let update = UpdateRecipe {
        name,
        description: req.description.map(non_blank),
        ingredients: req.ingredients,
        steps: req.steps,
        prep_time: req.prep_time,
        cook_time: req.cook_time,
        servings: req.servings,
        macros: req.macros,
        source_url: req.source_url.map(non_blank),
        image_url: req.image_url.map(non_blank),
        is_favorite: req.is_favorite,
    };
    state
        .db()
        .update_recipe(id, &update)
        .context("failed to update recipe")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Recipe not found".to_string()))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.db().delete_recipe(id).context("database error")? {
        info!(recipe_id = id, "recipe deleted");
        Ok(success())
    } else {
        Err(ApiError::NotFound("Recipe not found".to_string()))
    }
}

async fn import_recipe(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ImportRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let url = non_blank(req.url).ok_or_else(|| ApiError::BadRequest("URL is required".into()))?;
    let parsed = reqwest::Url::parse(&url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| ApiError::BadRequest("Invalid URL".to_string()))?;

    let html = state.pages.fetch_html(parsed.as_str()).await.map_err(|e| {
        warn!(%url, "recipe fetch failed: {e:#}");
        ApiError::BadRequest("Failed to fetch URL".to_string())
    })?;

    let draft =
        parse_recipe_page(&html, &url).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let recipe = state
        .db()
        .create_recipe(&draft)
        .context("failed to save imported recipe")?;
    info!(recipe_id = recipe.id, %url, "recipe imported");
    Ok((StatusCode::CREATED, Json(recipe)))
}

// --- Meal plan handlers ---

async fn list_meal_plans(
    State(state): State<AppState>,
    Query(params): Query<MealPlansQuery>,
) -> Result<Json<Vec<MealPlan>>, ApiError> {
    let start = parse_optional_day(params.start_date)?;
    let end = parse_optional_day(params.end_date)?;
    let plans = state
        .db()
        .list_meal_plans(start, end)
        .context("database error")?;
    Ok(Json(plans))
}

async fn upsert_meal_plan(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateMealPlanRequest>,
) -> Result<(StatusCode, Json<MealPlan>), ApiError> {
    let (Some(date), Some(meal_type), Some(recipe_id)) =
        (non_blank(req.date), non_blank(req.meal_type), req.recipe_id)
    else {
        return Err(ApiError::BadRequest(
            "Date, mealType, and recipeId are required".to_string(),
        ));
    };
    let date = parse_day(&date)?;
    let meal_type = validate_meal_type(&meal_type).map_err(|e| bad_request(&e))?;

    let db = state.db();
    if db.get_recipe(recipe_id).context("database error")?.is_none() {
        return Err(ApiError::NotFound("Recipe not found".to_string()));
    }
    let plan = db
        .upsert_meal_plan(&NewMealPlan {
            date,
            meal_type,
            recipe_id,
        })
        .context("failed to save meal plan")?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn delete_meal_plan(
    State(state): State<AppState>,
    Query(params): Query<DeleteMealPlanQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(date), Some(meal_type)) = (non_blank(params.date), non_blank(params.meal_type))
    else {
        return Err(ApiError::BadRequest(
            "date and mealType are required".to_string(),
        ));
    };
    let date = parse_day(&date)?;
    let meal_type = validate_meal_type(&meal_type).map_err(|e| bad_request(&e))?;

    let removed = state
        .db()
        .delete_meal_plan(date, &meal_type)
        .context("failed to delete meal plan")?;
    debug!(%date, %meal_type, removed, "meal plan delete");
    Ok(success())
}

// --- Weather ---

async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<Weather>, ApiError> {
    let location = non_blank(params.location);
    let weather = state
        .weather
        .current(location.as_deref())
        .await
        .map_err(|e| {
            error!("weather lookup failed: {e:#}");
            ApiError::Upstream("Failed to fetch weather".to_string())
        })?;
    Ok(Json(weather))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", delete(delete_user))
        .route("/api/chores", get(list_chores).post(create_chore))
        .route(
            "/api/chores/complete",
            post(complete_chore).delete(uncomplete_chore),
        )
        .route(
            "/api/chores/{id}",
            get(get_chore).patch(update_chore).delete(delete_chore),
        )
        .route(
            "/api/grocery",
            get(list_grocery).post(create_grocery).delete(clear_grocery),
        )
        .route("/api/grocery/generate", post(generate_grocery))
        .route(
            "/api/grocery/{id}",
            patch(update_grocery).delete(delete_grocery),
        )
        .route("/api/pantry", get(list_pantry).post(create_pantry))
        .route(
            "/api/pantry/{id}",
            patch(update_pantry).delete(delete_pantry),
        )
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/import", post(import_recipe))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/api/meal-plans",
            get(list_meal_plans)
                .post(upsert_meal_plan)
                .delete(delete_meal_plan),
        )
        .route("/api/weather", get(get_weather))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    pin_hash: Option<String>,
) -> anyhow::Result<()> {
    if pin_hash.is_none() {
        warn!("no family PIN configured; every login will be rejected until one is set");
    }

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        weather: Arc::new(WeatherClient::new()),
        pages: Arc::new(RecipePageClient::new()),
        pin_hash,
        limiter: Arc::new(LoginRateLimiter::default()),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Method;
    use hearth_core::auth::hash_pin;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const PIN: &str = "123456";
    const TOKEN: &str = "test-session-token";

    fn test_state_with(pin_hash: Option<String>, weather: WeatherClient) -> AppState {
        AppState {
            db: Arc::new(Mutex::new(Database::open_in_memory().unwrap())),
            weather: Arc::new(weather),
            pages: Arc::new(RecipePageClient::new()),
            pin_hash,
            limiter: Arc::new(LoginRateLimiter::default()),
        }
    }

    fn test_state() -> AppState {
        test_state_with(Some(hash_pin(PIN)), WeatherClient::new())
    }

    /// State with a live session for [`TOKEN`].
    fn authed_state() -> AppState {
        let state = test_state();
        state
            .db()
            .create_session(TOKEN, Utc::now() + Duration::days(1))
            .unwrap();
        state
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, format!("{SESSION_COOKIE}={TOKEN}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn login_request(pin: &Value, ip: &str) -> axum::http::Request<Body> {
        axum::http::Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(json!({ "pin": pin }).to_string()))
            .unwrap()
    }

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn create_user(app: &Router, name: &str) -> i64 {
        let (status, user) = call(
            app,
            request(
                Method::POST,
                "/api/users",
                Some(json!({ "name": name, "color": "#3366ff" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        user["id"].as_i64().unwrap()
    }

    async fn create_recipe(app: &Router, body: Value) -> i64 {
        let (status, recipe) = call(app, request(Method::POST, "/api/recipes", Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        recipe["id"].as_i64().unwrap()
    }

    fn today() -> String {
        Local::now().date_naive().format("%Y-%m-%d").to_string()
    }

    // --- Session gate ---

    #[tokio::test]
    async fn api_without_session_redirects_to_login() {
        let app = build_router(test_state());

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn unknown_session_token_redirects() {
        let app = build_router(authed_state());

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=forged"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn expired_session_redirects() {
        let state = test_state();
        state
            .db()
            .create_session(TOKEN, Utc::now() - Duration::minutes(1))
            .unwrap();
        let app = build_router(state);

        let (status, _) = call(&app, request(Method::GET, "/api/users", None)).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn public_paths_skip_the_gate() {
        let app = build_router(test_state());

        let response = app
            .clone()
            .oneshot(axum::http::Request::get("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("/api/auth/login"));

        for path in ["/static/app.js", "/favicon.ico"] {
            let response = app
                .clone()
                .oneshot(axum::http::Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = build_router(authed_state());

        let response = app
            .oneshot(request(Method::GET, "/api/users", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    // --- Login ---

    #[tokio::test]
    async fn login_sets_session_cookies() {
        let app = build_router(test_state());

        let response = app
            .clone()
            .oneshot(login_request(&json!(PIN), "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        let session = cookies
            .iter()
            .find(|c| c.starts_with(&format!("{SESSION_COOKIE}=")))
            .unwrap();
        assert!(session.contains("HttpOnly"));
        assert!(session.contains("SameSite=Lax"));
        assert!(session.contains("Max-Age=2592000"));
        assert!(
            cookies
                .iter()
                .any(|c| c.starts_with(&format!("{SESSION_FLAG_COOKIE}=true")))
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({ "success": true }));

        // the issued token opens the API
        let pair = session.split(';').next().unwrap().to_string();
        let response = app
            .oneshot(
                axum::http::Request::get("/api/users")
                    .header(header::COOKIE, pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_pin_is_counted_per_ip() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, json) = call(&app, login_request(&json!("654321"), "10.0.0.9, 1.1.1.1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Incorrect PIN");
        assert_eq!(state.limiter.failure_count("10.0.0.9"), 1);
        assert_eq!(state.limiter.failure_count("1.1.1.1"), 0);
    }

    #[tokio::test]
    async fn sixth_attempt_is_locked_out() {
        let state = test_state();
        let app = build_router(state.clone());

        for _ in 0..5 {
            let (status, _) = call(&app, login_request(&json!("000000"), "10.0.0.2")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, json) = call(&app, login_request(&json!(PIN), "10.0.0.2")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json["error"],
            "Too many failed attempts. Please wait 5 minutes."
        );

        // other clients are unaffected
        let (status, _) = call(&app, login_request(&json!(PIN), "10.0.0.3")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn successful_login_clears_failures() {
        let state = test_state();
        let app = build_router(state.clone());

        for _ in 0..4 {
            call(&app, login_request(&json!("000000"), "10.0.0.4")).await;
        }
        let (status, _) = call(&app, login_request(&json!(PIN), "10.0.0.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.limiter.failure_count("10.0.0.4"), 0);
    }

    #[tokio::test]
    async fn malformed_pins_are_rejected_before_hashing() {
        let state = test_state();
        let app = build_router(state.clone());

        for pin in [json!("123"), json!(123_456), json!(null)] {
            let (status, body) = call(&app, login_request(&pin, "10.0.0.5")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Invalid PIN format");
        }
        assert_eq!(state.limiter.failure_count("10.0.0.5"), 0);

        let (status, body) = call(
            &app,
            axum::http::Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request");
    }

    #[tokio::test]
    async fn login_without_configured_pin_fails() {
        let app = build_router(test_state_with(None, WeatherClient::new()));
        let (status, body) = call(&app, login_request(&json!(PIN), "10.0.0.6")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Incorrect PIN");
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = build_router(authed_state());

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/logout", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .all(|v| v.to_str().unwrap().contains("Max-Age=0"))
        );

        let (status, _) = call(&app, request(Method::GET, "/api/users", None)).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    }

    // --- Users ---

    #[tokio::test]
    async fn user_lifecycle() {
        let app = build_router(authed_state());

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/users", Some(json!({ "name": "Ava" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name and color are required");

        let ava = create_user(&app, "Ava").await;
        create_user(&app, "Ben").await;

        let (_, users) = call(&app, request(Method::GET, "/api/users", None)).await;
        let names: Vec<&str> = users
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Ava", "Ben"]);
        assert_eq!(users[0]["pointsBalance"], 0);

        let (status, _) = call(&app, request(Method::DELETE, &format!("/api/users/{ava}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) =
            call(&app, request(Method::DELETE, &format!("/api/users/{ava}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
    }

    #[tokio::test]
    async fn invalid_json_body_is_bad_request() {
        let app = build_router(authed_state());
        let req = axum::http::Request::post("/api/users")
            .header(header::COOKIE, format!("{SESSION_COOKIE}={TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request");
    }

    // --- Chores ---

    #[tokio::test]
    async fn completing_a_chore_credits_once() {
        let app = build_router(authed_state());
        let user1 = create_user(&app, "Ava").await;
        let user2 = create_user(&app, "Ben").await;

        let (status, chore) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({
                    "name": "Feed the cat",
                    "points": 5,
                    "isClaimable": false,
                    "assignedUserIds": [user1]
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(chore["daysOfWeek"], json!([0, 1, 2, 3, 4, 5, 6]));
        assert_eq!(chore["isRecurring"], true);
        let chore_id = chore["id"].as_i64().unwrap();

        let body = json!({ "choreId": chore_id, "userId": user1, "date": "2024-06-15" });
        let (status, first) = call(
            &app,
            request(Method::POST, "/api/chores/complete", Some(body.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["pointsEarned"], 5);

        let (status, second) =
            call(&app, request(Method::POST, "/api/chores/complete", Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(second["id"], first["id"]);

        let (_, users) = call(&app, request(Method::GET, "/api/users", None)).await;
        assert_eq!(users[0]["pointsBalance"], 5);

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": chore_id, "userId": user2, "date": "2024-06-15" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "User is not assigned to this chore");

        let (_, detail) = call(&app, request(Method::GET, &format!("/api/chores/{chore_id}"), None)).await;
        assert_eq!(detail["completions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_chore_validation() {
        let app = build_router(authed_state());
        let user = create_user(&app, "Ava").await;

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": 1, "userId": user })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "choreId, userId, and date are required");

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": 999, "userId": user, "date": "2024-06-15" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Chore not found");

        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": 1, "userId": user, "date": "06/15/2024" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn uncomplete_restores_balance() {
        let app = build_router(authed_state());
        let user = create_user(&app, "Ava").await;
        let (_, chore) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({ "name": "Dishes", "points": 3, "isClaimable": true })),
            ),
        )
        .await;
        let chore_id = chore["id"].as_i64().unwrap();

        call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": chore_id, "userId": user, "date": "2024-06-15" })),
            ),
        )
        .await;

        let uri = format!("/api/chores/complete?choreId={chore_id}&userId={user}&date=2024-06-15");
        let (status, body) = call(&app, request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, users) = call(&app, request(Method::GET, "/api/users", None)).await;
        assert_eq!(users[0]["pointsBalance"], 0);

        let (status, body) = call(&app, request(Method::DELETE, &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Completion not found");

        let (status, _) = call(
            &app,
            request(Method::DELETE, "/api/chores/complete?choreId=abc&userId=1&date=2024-06-15", None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chore_create_validation() {
        let app = build_router(authed_state());

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/chores", Some(json!({ "name": "  " }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Chore name is required");

        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({ "name": "Trash", "daysOfWeek": [1, 7] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({ "name": "Trash", "assignedUserIds": [42] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown user id(s): 42");

        let (_, chores) = call(&app, request(Method::GET, "/api/chores", None)).await;
        assert!(chores.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chore_points_are_bounded() {
        let app = build_router(authed_state());
        let user = create_user(&app, "Ava").await;

        for points in [json!(-1), json!(i64::MAX), json!(2_147_483_648_i64)] {
            let (status, body) = call(
                &app,
                request(
                    Method::POST,
                    "/api/chores",
                    Some(json!({ "name": "Trash", "points": points })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "points must be between 0 and 2147483647");
        }

        let (status, chore) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({ "name": "Trash", "points": 2_147_483_647_i64, "assignedUserIds": [user] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let chore_id = chore["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            request(
                Method::PATCH,
                &format!("/api/chores/{chore_id}"),
                Some(json!({ "points": i64::MAX })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": chore_id, "userId": user, "date": today() })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, users) = call(&app, request(Method::GET, "/api/users", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users[0]["pointsBalance"], 2_147_483_647_i64);
    }

    #[tokio::test]
    async fn patch_replaces_assignments() {
        let app = build_router(authed_state());
        let ava = create_user(&app, "Ava").await;
        let ben = create_user(&app, "Ben").await;

        let (_, chore) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({
                    "name": "Laundry",
                    "description": "Fold too",
                    "assignedUserIds": [ava, ava],
                    "daysOfWeek": [6, 0, 6]
                })),
            ),
        )
        .await;
        assert_eq!(chore["assignments"].as_array().unwrap().len(), 1);
        assert_eq!(chore["daysOfWeek"], json!([0, 6]));
        let chore_id = chore["id"].as_i64().unwrap();

        let (status, updated) = call(
            &app,
            request(
                Method::PATCH,
                &format!("/api/chores/{chore_id}"),
                Some(json!({ "assignedUserIds": [ben], "description": null, "points": 4 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let assignments = updated["assignments"].as_array().unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0]["userId"], ben);
        assert_eq!(assignments[0]["user"]["name"], "Ben");
        assert_eq!(updated["description"], Value::Null);
        assert_eq!(updated["points"], 4);
        assert_eq!(updated["name"], "Laundry");

        let (status, _) = call(
            &app,
            request(Method::PATCH, "/api/chores/999", Some(json!({ "points": 1 }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, request(Method::DELETE, &format!("/api/chores/{chore_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, request(Method::GET, &format!("/api/chores/{chore_id}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Chore not found");
    }

    #[tokio::test]
    async fn chore_list_filters_completions_by_week() {
        let app = build_router(authed_state());
        let user = create_user(&app, "Ava").await;
        let (_, chore) = call(
            &app,
            request(
                Method::POST,
                "/api/chores",
                Some(json!({ "name": "Bed", "assignedUserIds": [user] })),
            ),
        )
        .await;
        let chore_id = chore["id"].as_i64().unwrap();
        call(
            &app,
            request(
                Method::POST,
                "/api/chores/complete",
                Some(json!({ "choreId": chore_id, "userId": user, "date": today() })),
            ),
        )
        .await;

        let (_, this_week) = call(&app, request(Method::GET, "/api/chores", None)).await;
        assert_eq!(this_week[0]["completions"].as_array().unwrap().len(), 1);

        let (_, next_week) = call(&app, request(Method::GET, "/api/chores?weekOffset=1", None)).await;
        assert!(next_week[0]["completions"].as_array().unwrap().is_empty());

        let (status, _) = call(&app, request(Method::GET, "/api/chores?weekOffset=soon", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chore_list_rejects_week_outside_calendar() {
        let app = build_router(authed_state());
        for offset in ["100000000", "-100000000", "9223372036854775807"] {
            let (status, body) = call(
                &app,
                request(Method::GET, &format!("/api/chores?weekOffset={offset}"), None),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], format!("Invalid weekOffset '{offset}'"));
        }

        // the server keeps answering afterwards
        let (status, _) = call(&app, request(Method::GET, "/api/chores", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    // --- Grocery & pantry ---

    #[tokio::test]
    async fn grocery_items_crud() {
        let app = build_router(authed_state());

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/grocery", Some(json!({ "quantity": 2 }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Item name is required");

        let (status, milk) = call(
            &app,
            request(Method::POST, "/api/grocery", Some(json!({ "name": "Milk", "section": "Dairy" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, tape) = call(
            &app,
            request(Method::POST, "/api/grocery", Some(json!({ "name": "Tape" }))),
        )
        .await;
        assert_eq!(tape["section"], "Other");
        assert_eq!(tape["checked"], false);

        let milk_id = milk["id"].as_i64().unwrap();
        let (status, checked) = call(
            &app,
            request(
                Method::PATCH,
                &format!("/api/grocery/{milk_id}"),
                Some(json!({ "checked": true, "quantity": 2 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checked["checked"], true);
        assert_eq!(checked["quantity"], 2.0);

        let (status, body) = call(
            &app,
            request(Method::PATCH, "/api/grocery/999", Some(json!({ "checked": true }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Item not found");

        let (_, cleared) = call(&app, request(Method::DELETE, "/api/grocery?checkedOnly=true", None)).await;
        assert_eq!(cleared, json!({ "success": true, "deleted": 1 }));

        let (_, items) = call(&app, request(Method::GET, "/api/grocery", None)).await;
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["name"], "Tape");
    }

    #[tokio::test]
    async fn generate_grocery_list_from_plans() {
        let app = build_router(authed_state());
        let recipe_id = create_recipe(
            &app,
            json!({
                "name": "Stir fry",
                "ingredients": [
                    { "name": "Chicken breast", "quantity": "1", "unit": "lb" },
                    { "name": "Frozen peas", "quantity": "1", "unit": "cup" },
                    { "name": "Rice", "quantity": "2", "unit": "cups" }
                ]
            }),
        )
        .await;
        call(
            &app,
            request(
                Method::POST,
                "/api/meal-plans",
                Some(json!({ "date": "2024-06-10", "mealType": "Dinner", "recipeId": recipe_id })),
            ),
        )
        .await;
        call(
            &app,
            request(Method::POST, "/api/pantry", Some(json!({ "name": "rice" }))),
        )
        .await;

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/grocery/generate",
                Some(json!({ "startDate": "2024-06-09" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "startDate and endDate are required");

        let (status, summary) = call(
            &app,
            request(
                Method::POST,
                "/api/grocery/generate",
                Some(json!({ "startDate": "2024-06-09", "endDate": "2024-06-15" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["added"], 2);
        assert_eq!(summary["failed"], json!([]));
        let sections: Vec<&str> = summary["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["section"].as_str().unwrap())
            .collect();
        assert_eq!(sections, vec!["Meat", "Frozen"]);
    }

    #[tokio::test]
    async fn pantry_items_crud() {
        let app = build_router(authed_state());

        let (status, _) = call(
            &app,
            request(
                Method::POST,
                "/api/pantry",
                Some(json!({ "name": "Flour", "expiresAt": "soon" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, flour) = call(
            &app,
            request(
                Method::POST,
                "/api/pantry",
                Some(json!({ "name": "Flour", "expiresAt": "2024-09-01" })),
            ),
        )
        .await;
        call(
            &app,
            request(Method::POST, "/api/pantry", Some(json!({ "name": "Salt" }))),
        )
        .await;
        call(
            &app,
            request(
                Method::POST,
                "/api/pantry",
                Some(json!({ "name": "Yeast", "expiresAt": "2024-07-01" })),
            ),
        )
        .await;

        let (_, items) = call(&app, request(Method::GET, "/api/pantry", None)).await;
        let names: Vec<&str> = items
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Yeast", "Flour", "Salt"]);

        let flour_id = flour["id"].as_i64().unwrap();
        let (status, updated) = call(
            &app,
            request(
                Method::PATCH,
                &format!("/api/pantry/{flour_id}"),
                Some(json!({ "expiresAt": null })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["expiresAt"], Value::Null);

        let (status, _) = call(&app, request(Method::DELETE, &format!("/api/pantry/{flour_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, request(Method::DELETE, &format!("/api/pantry/{flour_id}"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // --- Recipes & meal plans ---

    #[tokio::test]
    async fn recipe_search_and_favorites() {
        let app = build_router(authed_state());

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/recipes", Some(json!({ "steps": ["Boil"] }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Recipe name is required");

        let soup = create_recipe(
            &app,
            json!({ "name": "Tomato Soup", "macros": { "calories": 200, "protein": 5, "carbs": 30, "fat": 6 } }),
        )
        .await;
        create_recipe(&app, json!({ "name": "Pancakes", "description": "Fluffy, with tomato jam" })).await;
        create_recipe(&app, json!({ "name": "Salad" })).await;

        let (_, found) = call(&app, request(Method::GET, "/api/recipes?search=TOMATO", None)).await;
        assert_eq!(found.as_array().unwrap().len(), 2);

        let (status, fav) = call(
            &app,
            request(
                Method::PATCH,
                &format!("/api/recipes/{soup}"),
                Some(json!({ "isFavorite": true, "prepTime": 10 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fav["isFavorite"], true);
        assert_eq!(fav["prepTime"], 10);
        assert_eq!(fav["macros"]["calories"], 200.0);

        let (_, favorites) = call(&app, request(Method::GET, "/api/recipes?favorites=true", None)).await;
        assert_eq!(favorites.as_array().unwrap().len(), 1);
        assert_eq!(favorites[0]["name"], "Tomato Soup");

        let (status, body) = call(&app, request(Method::GET, "/api/recipes/999", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Recipe not found");
    }

    #[tokio::test]
    async fn meal_plan_slots_upsert() {
        let app = build_router(authed_state());
        let oats = create_recipe(&app, json!({ "name": "Oats" })).await;
        let eggs = create_recipe(&app, json!({ "name": "Eggs" })).await;

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/meal-plans",
                Some(json!({ "date": "2024-06-10", "mealType": "brunch", "recipeId": oats })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("brunch"));

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/meal-plans",
                Some(json!({ "date": "2024-06-10", "mealType": "breakfast", "recipeId": 999 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Recipe not found");

        let (status, body) = call(
            &app,
            request(Method::POST, "/api/meal-plans", Some(json!({ "date": "2024-06-10" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Date, mealType, and recipeId are required");

        for recipe_id in [oats, eggs] {
            let (status, _) = call(
                &app,
                request(
                    Method::POST,
                    "/api/meal-plans",
                    Some(json!({ "date": "2024-06-10", "mealType": "Breakfast", "recipeId": recipe_id })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        call(
            &app,
            request(
                Method::POST,
                "/api/meal-plans",
                Some(json!({ "date": "2024-06-20", "mealType": "dinner", "recipeId": oats })),
            ),
        )
        .await;

        let (_, plans) = call(
            &app,
            request(Method::GET, "/api/meal-plans?startDate=2024-06-09&endDate=2024-06-15", None),
        )
        .await;
        let plans = plans.as_array().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["mealType"], "breakfast");
        assert_eq!(plans[0]["recipe"]["name"], "Eggs");

        let (status, _) = call(
            &app,
            request(Method::DELETE, "/api/meal-plans?date=2024-06-10&mealType=breakfast", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, plans) = call(&app, request(Method::GET, "/api/meal-plans", None)).await;
        assert_eq!(plans.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_recipe_from_page() {
        let upstream = Router::new()
            .route(
                "/chili",
                get(|| async {
                    Html(
                        r#"<html><head><script type="application/ld+json">
                        {"@context":"https://schema.org","@graph":[{"@type":"WebPage"},
                         {"@type":"Recipe","name":"Chili","recipeIngredient":["1 lb beef"],
                          "recipeInstructions":[{"@type":"HowToStep","text":"Cook."}],
                          "cookTime":"PT1H30M"}]}
                        </script></head><body></body></html>"#,
                    )
                }),
            )
            .route("/plain", get(|| async { Html("<html><body>No recipe</body></html>") }));
        let base = spawn_upstream(upstream).await;
        let app = build_router(authed_state());

        let (status, body) = call(&app, request(Method::POST, "/api/recipes/import", Some(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");

        let url = format!("{base}/chili");
        let (status, recipe) = call(
            &app,
            request(Method::POST, "/api/recipes/import", Some(json!({ "url": &url }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(recipe["name"], "Chili");
        assert_eq!(recipe["cookTime"], 90);
        assert_eq!(recipe["steps"], json!(["Cook."]));
        assert_eq!(recipe["sourceUrl"], url);

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/recipes/import",
                Some(json!({ "url": format!("{base}/plain") })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No recipe data found on this page");

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/recipes/import",
                Some(json!({ "url": format!("{base}/missing") })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Failed to fetch URL");
    }

    // --- Weather ---

    #[tokio::test]
    async fn weather_is_summarized() {
        let upstream = Router::new().route(
            "/{place}",
            get(|| async {
                Json(json!({
                    "current_condition": [{
                        "temp_F": "72", "temp_C": "22", "weatherCode": "113",
                        "weatherDesc": [{ "value": "Sunny" }]
                    }],
                    "nearest_area": [{ "areaName": [{ "value": "Boise" }] }]
                }))
            }),
        );
        let base = spawn_upstream(upstream).await;
        let state = test_state_with(
            Some(hash_pin(PIN)),
            WeatherClient::with_base_url(&base).unwrap(),
        );
        state
            .db()
            .create_session(TOKEN, Utc::now() + Duration::days(1))
            .unwrap();
        let app = build_router(state);

        let (status, weather) = call(&app, request(Method::GET, "/api/weather?location=Boise", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            weather,
            json!({ "temp": 72, "tempC": 22, "condition": "Sunny", "icon": "☀️", "location": "Boise" })
        );
    }

    #[tokio::test]
    async fn weather_failure_is_500() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let state = test_state_with(
            Some(hash_pin(PIN)),
            WeatherClient::with_base_url(&format!("http://{addr}")).unwrap(),
        );
        state
            .db()
            .create_session(TOKEN, Utc::now() + Duration::days(1))
            .unwrap();
        let app = build_router(state);

        let (status, body) = call(&app, request(Method::GET, "/api/weather", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch weather");
    }

    // --- Plumbing ---

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = build_router(authed_state());

        let big_body = vec![b' '; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/users")
                    .header(header::COOKIE, format!("{SESSION_COOKIE}={TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/.hearthboard/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn public_path_rules() {
        assert!(is_public_path("/login"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/static/css/site.css"));
        assert!(is_public_path("/icons/apple-touch-icon.png"));
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/api/users"));
        assert!(!is_public_path("/api/auth/logout"));
        assert!(!is_public_path("/login/extra"));
    }

    #[test]
    fn cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; hearthboard_session=abc; other=1"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn client_ip_uses_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn session_tokens_are_random_hex() {
        let a = new_session_token();
        let b = new_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
