use std::fmt::Display;
use std::sync::Mutex;

use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::account::{RegistrationRequest, Role, UserDirectory, UserProfile};
use crate::booking::grid::SlotRow;
use crate::booking::{
    local_now, AutoResetConfig, BookingLedger, BookingRecord, Court, PolicyState, ResetPolicy,
    SlotAvailability,
};
use crate::config::AppConfig;
use crate::error::{AccountError, BookingError, BookingResult};

const SESSION_USER: &str = "username";
const ADMIN_HEADER: &str = "X-Admin-Password";

pub struct AppState {
    pub ledger: BookingLedger,
    pub policy: Mutex<ResetPolicy>,
    pub users: UserDirectory,
    pub admin_password: String,
}

impl AppState {
    pub fn new(
        ledger: BookingLedger,
        users: UserDirectory,
        admin_password: String,
    ) -> BookingResult<Self> {
        let policy = ResetPolicy::load(&ledger)?;
        Ok(Self {
            ledger,
            policy: Mutex::new(policy),
            users,
            admin_password,
        })
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct BookingRequest {
    sport: String,
    #[serde(default)]
    court: String,
    #[serde(default)]
    time: String,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize)]
pub struct SportSummary {
    key: String,
    name: String,
    courts: usize,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    sport: String,
    name: String,
    courts: Vec<Court>,
    rows: Vec<SlotRow>,
    availability: Vec<SlotAvailability>,
    booked_today: Option<bool>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    username: String,
    bookings: Vec<BookingRecord>,
}

#[derive(Serialize)]
pub struct AutoResetResponse {
    config: AutoResetConfig,
    armed: bool,
    last_reset_at: Option<NaiveDateTime>,
}

fn error_body(message: impl Display) -> serde_json::Value {
    serde_json::json!({"success": false, "error": message.to_string()})
}

fn booking_error_response(err: &BookingError) -> HttpResponse {
    match err {
        BookingError::MissingSelection
        | BookingError::ConfirmationRequired
        | BookingError::InvalidResetTime(_) => HttpResponse::BadRequest().json(error_body(err)),
        BookingError::InvalidKey(key) => {
            tracing::error!("rejected request with invalid key: {}", key);
            HttpResponse::BadRequest().json(error_body(err))
        }
        BookingError::SlotTaken { .. } | BookingError::AlreadyBookedToday { .. } => {
            HttpResponse::Conflict().json(error_body(err))
        }
        BookingError::Store(e) => {
            tracing::error!("store failure: {}", e);
            HttpResponse::InternalServerError().json(error_body("Storage error"))
        }
    }
}

fn account_error_response(err: &AccountError) -> HttpResponse {
    match err {
        AccountError::Invalid(_) => HttpResponse::BadRequest().json(error_body(err)),
        AccountError::UsernameTaken(_) => HttpResponse::Conflict().json(error_body(err)),
        AccountError::InvalidCredentials => HttpResponse::Unauthorized().json(error_body(err)),
        AccountError::Store(e) => {
            tracing::error!("store failure: {}", e);
            HttpResponse::InternalServerError().json(error_body("Storage error"))
        }
    }
}

fn not_logged_in() -> HttpResponse {
    HttpResponse::Unauthorized().json(error_body("Not logged in"))
}

fn current_user(session: &Session) -> Result<Option<String>> {
    Ok(session.get::<String>(SESSION_USER)?)
}

/// The admin header, or a logged-in user with the admin role.
fn is_admin(req: &HttpRequest, session: &Session, state: &AppState) -> Result<bool> {
    let header_matches = req
        .headers()
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|password| password == state.admin_password)
        .unwrap_or(false);
    if header_matches {
        return Ok(true);
    }

    let username = match current_user(session)? {
        Some(username) => username,
        None => return Ok(false),
    };
    match state.users.user(&username) {
        Ok(user) => Ok(user.map_or(false, |u| u.role == Role::Admin)),
        Err(e) => {
            tracing::error!("could not load user {}: {}", username, e);
            Ok(false)
        }
    }
}

fn reset_failed() -> HttpResponse {
    HttpResponse::InternalServerError().json(error_body("Scheduled reset failed"))
}

/// Apply the daily reset if it came due since the last request.
///
/// On failure the caller must not serve or modify the previous day's state.
fn run_scheduled_reset(state: &AppState) -> std::result::Result<(), HttpResponse> {
    let mut policy = state.policy.lock().map_err(|_| {
        tracing::error!("reset policy lock was poisoned");
        reset_failed()
    })?;
    match policy.tick(&state.ledger, local_now()) {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("scheduled reset failed: {}", e);
            Err(reset_failed())
        }
    }
}

// Catalog endpoints
async fn list_sports(state: web::Data<AppState>) -> Result<HttpResponse> {
    let sports: Vec<SportSummary> = state
        .ledger
        .sports()
        .iter()
        .map(|s| SportSummary {
            key: s.key.clone(),
            name: s.name.clone(),
            courts: s.courts.len(),
        })
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true, "sports": sports})))
}

async fn get_courts(sport: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.ledger.sport(&sport) {
        Ok(sport) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "sport": sport.key,
            "courts": sport.courts,
        }))),
        Err(e) => Ok(booking_error_response(&e)),
    }
}

async fn get_slots(
    sport: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if let Err(resp) = run_scheduled_reset(&state) {
        return Ok(resp);
    }

    let config = match state.ledger.sport(&sport) {
        Ok(config) => config,
        Err(e) => return Ok(booking_error_response(&e)),
    };
    let grid = match state.ledger.grid(&config.key) {
        Ok(grid) => grid,
        Err(e) => return Ok(booking_error_response(&e)),
    };
    let booked_today = match current_user(&session)? {
        Some(username) => match state.ledger.has_booked_today(&config.key, &username) {
            Ok(booked) => Some(booked),
            Err(e) => return Ok(booking_error_response(&e)),
        },
        None => None,
    };

    Ok(HttpResponse::Ok().json(SlotsResponse {
        sport: config.key.clone(),
        name: config.name.clone(),
        courts: config.courts.clone(),
        availability: grid.availability(),
        rows: grid.rows().to_vec(),
        booked_today,
    }))
}

// Account endpoints
async fn register(
    req: web::Json<RegistrationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    match state.users.register(&req) {
        Ok(user) => Ok(HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "user": UserProfile::from(&user),
        }))),
        Err(e) => Ok(account_error_response(&e)),
    }
}

async fn login(
    req: web::Json<LoginRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    match state.users.authenticate(&req.username, &req.password) {
        Ok(user) => {
            session.renew();
            session.insert(SESSION_USER, &user.username)?;
            tracing::info!("{} logged in", user.username);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "user": UserProfile::from(&user),
            })))
        }
        Err(e) => Ok(account_error_response(&e)),
    }
}

async fn logout(session: Session) -> Result<HttpResponse> {
    session.purge();
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
}

async fn me(session: Session, state: web::Data<AppState>) -> Result<HttpResponse> {
    let username = match current_user(&session)? {
        Some(username) => username,
        None => return Ok(not_logged_in()),
    };
    match state.users.user(&username) {
        Ok(Some(user)) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": UserProfile::from(&user),
        }))),
        Ok(None) => {
            session.purge();
            Ok(not_logged_in())
        }
        Err(e) => Ok(account_error_response(&e)),
    }
}

// Booking endpoints
async fn create_booking(
    req: web::Json<BookingRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let username = match current_user(&session)? {
        Some(username) => username,
        None => return Ok(not_logged_in()),
    };
    if let Err(resp) = run_scheduled_reset(&state) {
        return Ok(resp);
    }

    match state
        .ledger
        .try_book(&req.sport, &username, &req.time, &req.court)
    {
        Ok(confirmation) => Ok(HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "booking": confirmation,
        }))),
        Err(e) => Ok(booking_error_response(&e)),
    }
}

async fn booking_history(session: Session, state: web::Data<AppState>) -> Result<HttpResponse> {
    let username = match current_user(&session)? {
        Some(username) => username,
        None => return Ok(not_logged_in()),
    };
    match state.ledger.history(&username) {
        Ok(bookings) => Ok(HttpResponse::Ok().json(HistoryResponse { username, bookings })),
        Err(e) => Ok(booking_error_response(&e)),
    }
}

// Admin endpoints
async fn admin_reset(
    http: HttpRequest,
    session: Session,
    req: web::Json<ResetRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !is_admin(&http, &session, &state)? {
        return Ok(HttpResponse::Unauthorized().json(error_body("Unauthorized")));
    }

    let mut policy = state
        .policy
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("reset policy lock poisoned"))?;
    match policy.manual_reset(&state.ledger, local_now(), req.confirm) {
        Ok(changed) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "All court bookings have been reset",
            "sports_reset": changed,
        }))),
        Err(e) => Ok(booking_error_response(&e)),
    }
}

fn auto_reset_response(policy: &ResetPolicy, config: AutoResetConfig) -> AutoResetResponse {
    AutoResetResponse {
        config,
        armed: matches!(policy.state(), PolicyState::Armed(_)),
        last_reset_at: policy.last_reset_at(),
    }
}

async fn get_auto_reset(
    http: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !is_admin(&http, &session, &state)? {
        return Ok(HttpResponse::Unauthorized().json(error_body("Unauthorized")));
    }

    let config = match ResetPolicy::config(&state.ledger) {
        Ok(config) => config,
        Err(e) => return Ok(booking_error_response(&e)),
    };
    let policy = state
        .policy
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("reset policy lock poisoned"))?;
    Ok(HttpResponse::Ok().json(auto_reset_response(&policy, config)))
}

async fn put_auto_reset(
    http: HttpRequest,
    session: Session,
    req: web::Json<AutoResetConfig>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !is_admin(&http, &session, &state)? {
        return Ok(HttpResponse::Unauthorized().json(error_body("Unauthorized")));
    }

    let config = req.into_inner();
    let mut policy = state
        .policy
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("reset policy lock poisoned"))?;
    match policy.configure(&state.ledger, config.clone(), local_now()) {
        Ok(()) => Ok(HttpResponse::Ok().json(auto_reset_response(&policy, config))),
        Err(e) => Ok(booking_error_response(&e)),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/sports", web::get().to(list_sports))
        .service(web::resource("/api/courts/{sport}").route(web::get().to(get_courts)))
        .service(web::resource("/api/slots/{sport}").route(web::get().to(get_slots)))
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/logout", web::post().to(logout))
        .route("/api/auth/me", web::get().to(me))
        .route("/api/bookings", web::post().to(create_booking))
        .route("/api/bookings/history", web::get().to(booking_history))
        .route("/api/admin/reset", web::post().to(admin_reset))
        .route("/api/admin/auto-reset", web::get().to(get_auto_reset))
        .route("/api/admin/auto-reset", web::put().to(put_auto_reset));
}

/// Cookie signing key from config, or a per-process key if none usable is set.
pub fn session_key(config: &AppConfig) -> Key {
    match config.session_key.as_deref() {
        Some(key) if key.len() >= 64 => Key::from(key.as_bytes()),
        Some(_) => {
            tracing::warn!("SESSION_KEY is shorter than 64 bytes, generating a per-process key");
            Key::generate()
        }
        None => {
            tracing::warn!("SESSION_KEY not set, sessions will not survive a restart");
            Key::generate()
        }
    }
}

fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_secure(secure)
        .build()
}

pub async fn start_server(config: AppConfig, state: AppState) -> std::io::Result<()> {
    let key = session_key(&config);
    let secure = config.secure_cookies;
    let app_state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(session_middleware(key.clone(), secure))
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
