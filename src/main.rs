use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use measures_api::{
    clock::{Clock, SystemClock},
    config::Config,
    db::{self, PgStore, Store},
    middleware::auth::JwtSecret,
    routes,
    services::{email::BulkMailer, metrics, ticker},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let mailer = Arc::new(BulkMailer::from_config(&config));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = AppState {
        db: pool,
        store: store.clone(),
        config: config.clone(),
        mailer: mailer.clone(),
        clock: clock.clone(),
    };

    metrics::start(store.clone());
    if config.scheduler_tick {
        ticker::start(store, mailer, clock);
    }

    // Allow the app base URL and its subdomains; localhost always passes.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        if o == base_url {
            return true;
        }
        if let Some(idx) = base_url.find("://") {
            let after_scheme = &base_url[idx + 3..];
            let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
            let domain = domain.split(':').next().unwrap_or(domain);
            return o.ends_with(&format!(".{domain}"));
        }
        false
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-cron-key"),
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Assignments
        .route("/assignments", get(routes::assignments::list_assignments))
        .route("/assignments/{id}", get(routes::assignments::get_assignment))
        .route("/assignments/{id}/assistance", post(routes::assignments::request_assistance))
        .route("/steps/{id}/toggle", post(routes::assignments::toggle_step))
        // Company inbox
        .route("/notifications", get(routes::notifications::get_inbox))
        .route("/notifications/read-all", post(routes::notifications::mark_all_read))
        .route("/notifications/{id}/read", post(routes::notifications::mark_read))
        // Admin
        .route("/admin/dashboard", get(routes::dashboard::get_dashboard))
        .route("/admin/assignments", post(routes::assignments::assign_measure))
        .route(
            "/admin/assignments/{id}",
            delete(routes::assignments::unassign_measure),
        )
        .route("/admin/assistance", get(routes::assistance::get_queue))
        .route("/admin/assistance/{id}/decide", post(routes::assistance::decide))
        .route(
            "/admin/notifications/{id}/resolve",
            post(routes::assistance::resolve_from_notification),
        )
        .route("/admin/notifications/test-email", post(routes::notifications::send_test_email))
        .route("/admin/reports/send-now", post(routes::cron::send_report_now))
        .route(
            "/admin/settings/notifications",
            get(routes::settings::get_notification_config)
                .put(routes::settings::update_notification_config),
        )
        .route(
            "/admin/settings/system",
            get(routes::settings::get_system_settings).put(routes::settings::update_system_settings),
        )
        // External scheduler (X-Cron-Key)
        .route("/cron/notify-due", post(routes::cron::notify_due))
        .route("/cron/progress-report", post(routes::cron::progress_report))
        .route("/cron/due-reminders", post(routes::cron::due_reminders))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Measures API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
