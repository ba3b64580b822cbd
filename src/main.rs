use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use cargenie_api::{
    auth::FirebaseIdentityVerifier,
    config::Config,
    crypto::SecretBoxCipher,
    db::Database,
    dealer_applications::{DealerApplicationService, PgDealerApplicationStore},
    fallback::FallbackSelector,
    handlers::{self, AppState},
    history::{HistoryRecorder, PgChatHistoryStore},
    llm_client::build_text_generator,
    mailer::build_mail_transport,
    notifications::{NotificationService, NotificationSettings},
    rate_limiter::{RateLimitConfig, RateLimiter},
    response_generator::ResponseGenerator,
    routes,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let Some(origin) = config.cors_origin.as_deref() else {
        return Ok(CorsLayer::permissive());
    };

    let origin: HeaderValue = origin
        .parse()
        .map_err(|_| anyhow::anyhow!("CORS_ORIGIN is not a valid header value"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-admin-token"),
        ])
        .expose_headers(Any))
}

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and schema.
/// - Text provider, mail transport and identity verifier.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Ok if the server runs successfully, or an error if initialization fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cargenie_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let generator = ResponseGenerator::new(build_text_generator(&config)?);

    let notifications = NotificationService::new(
        build_mail_transport(&config)?,
        NotificationSettings {
            mail_from: config.mail_from.clone(),
            test_recipient: config.test_recipient_email.clone(),
            lead_copy: config.lead_copy_email.clone(),
        },
    );

    let cipher = SecretBoxCipher::from_key_material(&config.db_encryption_key)
        .map_err(|e| anyhow::anyhow!("DB_ENCRYPTION_KEY: {}", e))?;

    // Build application state
    let app_state = Arc::new(AppState {
        generator,
        fallback: Arc::new(FallbackSelector::new()),
        history: HistoryRecorder::new(Arc::new(PgChatHistoryStore::new(db.pool.clone()))),
        identity: Arc::new(FirebaseIdentityVerifier::new(config.firebase_api_key.clone())?),
        notifications,
        applications: DealerApplicationService::new(
            Arc::new(PgDealerApplicationStore::new(db.pool.clone())),
            Arc::new(cipher),
        ),
        onboarding_limiter: Arc::new(RateLimiter::new(RateLimitConfig::onboarding())),
        admin_token: config.admin_token.clone(),
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = routes::api_routes(&app_state).layer(
        ServiceBuilder::new()
            // Rate limiting: 10 req/sec per IP, burst of 20 (prevents DDoS)
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
