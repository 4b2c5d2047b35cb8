use axum::{
    Json, Router,
    middleware::from_fn as middleware_from_fn,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_csrf::{CsrfConfig, CsrfToken, Key};
use dotenv::dotenv;
use mongodb::{Client, Database, options::ClientOptions};
use serde_json::json;
use std::{env::var, net::SocketAddr, sync::OnceLock};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod apex;
mod auth;
mod chat;
mod notifications;

use apex::endpoints::*;
use auth::endpoints::*;
use chat::endpoints::*;
use chat::socket::chat_socket_endpoint;

pub(crate) static DB: OnceLock<Database> = OnceLock::new();

async fn csrf_endpoint(token: CsrfToken) -> impl IntoResponse {
    Json(json!({ "csrf_token": token.authenticity_token().unwrap() }))
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let mongodb_uri = var("MONGODB_URI").unwrap();
    let client_options = ClientOptions::parse(mongodb_uri).await.unwrap();
    let client = Client::with_options(client_options).expect("Failed to create Mongo client");

    DB.set(client.database("worklink_main")).unwrap();

    let domain = var("DOMAIN").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .expect("Failed to parse PORT");

    let addr = SocketAddr::from((
        domain
            .parse::<std::net::IpAddr>()
            .expect("Failed to parse DOMAIN"),
        port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    let cookie_key = Key::generate();
    let our_domain = var("DOMAIN").unwrap_or_else(|_| "localhost".to_string());
    let _config = CsrfConfig::default()
        .with_key(Some(cookie_key))
        .with_cookie_domain(Some(our_domain));

    let protected_routes = Router::new()
        .route("/auth/user", get(get_user))
        .route("/auth/logout", post(logout_user))
        .route("/chat/conversations", get(get_conversations_endpoint))
        .route(
            "/chat/{other_user_id}/messages",
            post(send_message_endpoint),
        )
        .route(
            "/chat/conversations/{conversation_id}/messages",
            get(get_messages_endpoint),
        )
        .route(
            "/chat/conversations/{conversation_id}/read",
            post(mark_read_endpoint),
        )
        .route("/chat/messages/{message_id}/pin", put(pin_message_endpoint))
        .route(
            "/chat/messages/{message_id}/unsend",
            post(unsend_message_endpoint),
        )
        .route("/chat/users/{user_id}/presence", get(get_presence_endpoint))
        .route("/chat/socket", get(chat_socket_endpoint))
        .layer(middleware_from_fn(cookie_auth));

    let unprotected_routes = Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user));

    let app = Router::new()
        .merge(protected_routes)
        .merge(unprotected_routes)
        .route("/", get(root_endpoint))
        .route("/auth/csrf_token", get(csrf_endpoint));

    tracing::info!(%addr, "worklink api listening");
    axum::serve(listener, app).await.unwrap();
}
