use actix_files as fs;

use actix_session::config::PersistentSession;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;

use actix_web::cookie::Key;
use actix_web::{web, App, HttpResponse, HttpServer};

use sqlx::SqlitePool;

mod auth;
mod db;
mod error;
mod handler;
mod model;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://fitreview.db?mode=rwc".to_string());
    let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());

    let db_pool = db::connect(&database_url)
        .await
        .expect("database initialization failed");

    let app_state = AppState { db: db_pool };
    let secret_key = Key::generate();

    log::info!("listening on {ip}:8081");
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(fs::Files::new("/static", "./public"))
            .service(handler::index)
            .service(handler::main_view)
            .service(handler::item)
            .service(handler::add_review)
            .service(handler::signin_page)
            .service(handler::signin)
            .service(handler::signup_page)
            .service(handler::signup)
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(false)
                    .session_lifecycle(PersistentSession::default().session_ttl_extension_policy(
                        actix_session::config::TtlExtensionPolicy::OnEveryRequest,
                    ))
                    .build(),
            )
            .default_service(web::route().to(HttpResponse::NotFound))
    })
    .bind((ip, 8081))?
    .run()
    .await
}
