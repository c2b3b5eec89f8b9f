/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use kinship_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = kinship_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{auth::jwt_auth_layer, security::SecurityHeadersLayer},
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post, put},
    Router,
};
use kinship_shared::{
    holidays::HolidayClient,
    mail::{HttpMailer, LogMailer, Mailer},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    pub mailer: Arc<dyn Mailer>,

    pub holidays: HolidayClient,
}

impl AppState {
    /// Builds state with the mailer and holiday client the config asks for
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = match &config.mail.api_key {
            Some(key) => Arc::new(HttpMailer::new(&config.mail.api_url, key)?),
            None => {
                tracing::warn!("MAIL_API_KEY not set, outgoing email will only be logged");
                Arc::new(LogMailer)
            }
        };

        Self::with_mailer(db, config, mailer)
    }

    pub fn with_mailer(db: PgPool, config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let holidays = HolidayClient::new(&config.holidays.api_url, config.holidays.api_key.clone())?;

        Ok(Self {
            db,
            config: Arc::new(config),
            mailer,
            holidays,
        })
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn feed_secret(&self) -> &str {
        &self.config.jwt.feed_secret
    }
}

/// Builds the complete router
///
/// ```text
/// /health                                  public
/// /v1/auth/*                               public (signup, login, refresh, activation, reset)
/// /v1/calendar/events/:file                public single-event .ics
/// /v1/calendar/feed/:token                 public signed personal feed
/// /v1/families, /v1/family/*               bearer (active family)
/// /v1/groups, /v1/group/leave, /v1/invites bearer
/// /v1/events, /v1/events/:id/rsvps         bearer
/// /v1/calendar/feed-url                    bearer
/// /v1/holidays/generate                    bearer, admin
/// /v1/settings/*, /v1/admin/*              bearer
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/activate", post(routes::auth::activate))
        .route("/password-reset", post(routes::auth::request_password_reset))
        .route(
            "/password-reset/confirm",
            post(routes::auth::confirm_password_reset),
        );

    let public_calendar_routes = Router::new()
        .route("/events/:file", get(routes::calendar::event_ics))
        .route("/feed/:token", get(routes::calendar::personal_feed));

    let protected_routes = Router::new()
        // Families and invites
        .route(
            "/families",
            get(routes::families::list_my_families).post(routes::families::create_family),
        )
        .route("/families/:id/switch", post(routes::families::switch_family))
        .route("/family", get(routes::families::current_family))
        .route("/family/members", get(routes::families::list_members))
        .route(
            "/family/invite-code",
            post(routes::families::rotate_family_code),
        )
        .route("/invites/redeem", post(routes::families::redeem_code))
        // Groups
        .route(
            "/groups",
            get(routes::groups::list_groups).post(routes::groups::create_group),
        )
        .route(
            "/groups/:id",
            patch(routes::groups::update_group).delete(routes::groups::delete_group),
        )
        .route("/groups/:id/members", get(routes::groups::list_subtree_members))
        .route("/groups/:id/invite-code", post(routes::groups::rotate_group_code))
        .route("/groups/:id/switch", post(routes::groups::switch_group))
        .route("/group/leave", post(routes::groups::leave_group))
        // Events and RSVPs
        .route(
            "/events",
            get(routes::events::list_events).post(routes::events::create_event),
        )
        .route(
            "/events/:id",
            get(routes::events::get_event)
                .patch(routes::events::update_event)
                .delete(routes::events::delete_event),
        )
        .route("/events/:id/rsvp", put(routes::rsvps::respond))
        .route(
            "/events/:id/rsvps",
            get(routes::rsvps::list_rsvps).post(routes::rsvps::batch_update),
        )
        // Calendar and holidays
        .route("/calendar/feed-url", get(routes::calendar::feed_url))
        .route("/holidays/generate", post(routes::holidays::generate))
        // Settings
        .route("/settings", get(routes::settings::get_settings))
        .route("/settings/profile", patch(routes::settings::update_profile))
        .route("/settings/theme", put(routes::settings::set_theme))
        .route(
            "/settings/notifications",
            put(routes::settings::set_notifications),
        )
        .route("/settings/password", post(routes::settings::change_password))
        .route("/settings/test-email", post(routes::settings::send_test_email))
        .route("/settings/phone", post(routes::settings::start_phone_verification))
        .route("/settings/phone/verify", post(routes::settings::verify_phone))
        // Admin
        .route("/admin/pending", get(routes::admin::list_pending))
        .route("/admin/users/:id/approve", post(routes::admin::approve_user))
        .route("/admin/users/:id/deny", post(routes::admin::deny_user))
        .route("/admin/users/:id/role", put(routes::admin::set_role))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/calendar", public_calendar_routes)
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
