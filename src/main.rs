use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // brings ApiDoc::openapi() into scope
use utoipa_swagger_ui::SwaggerUi;

use yamdb::auth::JwtKeys;
use yamdb::config::AppConfig;
use yamdb::mailer::LogMailer;
use yamdb::openapi::ApiDoc;
use yamdb::rate_limit::RateLimiterFacade;
use yamdb::repo::Repo;
use yamdb::{AppState, SecurityHeaders};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable one of the `inmem-store` or `postgres-store` features");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is a development convenience; deployments set the environment directly
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    info!("Bootstrapping yamdb");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("<none>"));

    let repo = build_repo(&cfg).await?;
    let state = AppState {
        repo,
        mailer: Arc::new(LogMailer),
        jwt: JwtKeys::new(&cfg.jwt_secret, cfg.jwt_ttl_hours),
        codes: cfg.codes.clone(),
        rate_limiter: Some(RateLimiterFacade::new(cfg.rate_limit.clone())),
    };
    let state = web::Data::new(state);

    let openapi = ApiDoc::openapi();
    let frontend = cfg.frontend_url.clone();
    let hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            // Vite dev server
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .max_age(3600);
        if let Some(front) = frontend.as_deref() {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(hsts))
            .wrap(cors)
            .app_data(state.clone())
            .configure(yamdb::config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.host.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.host, cfg.port);
    server.run().await?;
    Ok(())
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use yamdb::repo::inmem::InMemRepo;
    let repo = match cfg.data_dir.as_ref() {
        Some(dir) => {
            info!("Using in-memory repository with snapshots in {}", dir.display());
            InMemRepo::with_snapshot_dir(dir)
        }
        None => {
            info!("Using in-memory repository backend (no persistence)");
            InMemRepo::new()
        }
    };
    Ok(Arc::new(repo))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;
    use yamdb::repo::pg::PgRepo;

    let url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("failed to run migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}
