use axum::{
    Json,
    body::Body,
    http::{
        Request, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use email_address::EmailAddress;
use httpdate::fmt_http_date;
use mongodb::{Collection, bson::doc};
use serde_json::json;
use std::{
    env::var,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use super::{
    delegates::{
        check_account_existence, generate_cookie, hash_password, kill_cookie, retrieve_account,
        touch_last_active, verify_password,
    },
    schemas::{Account, AccountQuery, AuthObject, LoginRequest, RegisterRequest},
};
use crate::{DB, apex::utils::VerboseHTTPError};

const AUTH_COOKIE_NAME: &str = "WORKLINK_AUTHENTICATION";

pub(crate) async fn logout_user(req: Request<Body>) -> impl IntoResponse {
    if let Some(account) = req.extensions().get::<Account>() {
        if kill_cookie(account.auth.cookie.clone()).await {
            let domain = var("DOMAIN").unwrap_or_else(|_| ".worklink.app".to_string());
            let headers = [(
                SET_COOKIE,
                format!(
                    "{}=null; expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; Domain={}; HttpOnly",
                    AUTH_COOKIE_NAME, domain
                ),
            )];
            return (headers, Json(json!({ "status": "ok" }))).into_response();
        }
    }

    VerboseHTTPError::Standard(StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
}

pub(crate) async fn login_user(Json(payload): Json<LoginRequest>) -> impl IntoResponse {
    if payload.username.is_none() && payload.email.is_none() {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Missing credentials".to_string(),
        )
        .into_response();
    }

    if let Some(ref email) = payload.email {
        if !EmailAddress::is_valid(email) {
            return VerboseHTTPError::Standard(
                StatusCode::BAD_REQUEST,
                "Invalid email format".to_string(),
            )
            .into_response();
        }
    }

    let Some(account) =
        retrieve_account(payload.username.as_deref(), payload.email.as_deref()).await
    else {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Invalid username or password".to_string(),
        )
        .into_response();
    };

    if !verify_password(
        payload.password,
        account.salt.clone(),
        account.password.clone(),
    )
    .await
    {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Invalid username or password".to_string(),
        )
        .into_response();
    }

    if !account.enabled {
        return VerboseHTTPError::Standard(
            StatusCode::FORBIDDEN,
            "Account is disabled".to_string(),
        )
        .into_response();
    }

    let Some(auth_object) = generate_cookie(account.username.clone()).await else {
        return VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
        .into_response();
    };

    (
        [(SET_COOKIE, login_cookie_header(&auth_object))],
        Json(json!({ "status": "ok" })),
    )
        .into_response()
}

fn login_cookie_header(auth_object: &AuthObject) -> String {
    let expire_time =
        UNIX_EPOCH + Duration::from_secs(auth_object.cookie_expire.parse::<u64>().unwrap_or(0));
    let formatted_expire_time = fmt_http_date(SystemTime::from(expire_time));
    let domain = var("DOMAIN").unwrap_or_else(|_| ".worklink.app".to_string());

    format!(
        "{}={}; HttpOnly; Path=/; Domain={}; expires={}",
        AUTH_COOKIE_NAME, auth_object.cookie, domain, formatted_expire_time
    )
}

pub(crate) async fn register_user(Json(payload): Json<RegisterRequest>) -> impl IntoResponse {
    if !EmailAddress::is_valid(&payload.email) {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Invalid email format".to_string(),
        )
        .into_response();
    }

    let Some((username_exists, email_exists)) =
        check_account_existence(&payload.username, &payload.email).await
    else {
        return VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
        .into_response();
    };

    if username_exists {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Username already taken".to_string(),
        )
        .into_response();
    }
    if email_exists {
        return VerboseHTTPError::Standard(
            StatusCode::BAD_REQUEST,
            "Email already taken".to_string(),
        )
        .into_response();
    }

    let Some((hashed_password, salt)) = hash_password(payload.password).await else {
        return VerboseHTTPError::Standard(StatusCode::BAD_REQUEST, "Invalid password".to_string())
            .into_response();
    };

    let Some(auth_object) = generate_cookie(payload.username.clone()).await else {
        return VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
        .into_response();
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let account = Account {
        uid: uuid::Uuid::new_v4().to_string(),
        display_name: payload
            .display_name
            .unwrap_or_else(|| payload.username.clone()),
        username: payload.username,
        email: payload.email,
        avatar_url: None,
        password: hashed_password,
        salt,
        auth: auth_object,
        last_active_at: now,
        enabled: true,
    };

    let Some(database) = DB.get() else {
        return VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
        .into_response();
    };

    let collection: Collection<Account> = database.collection("users");

    if collection.insert_one(&account).await.is_err() {
        return VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
        .into_response();
    }

    Json(json!({
        "status": "ok",
        "message": "Account created successfully.",
        "user": AccountQuery::from(&account)
    }))
    .into_response()
}

pub(crate) async fn get_user(req: Request<Body>) -> impl IntoResponse {
    if let Some(account) = req.extensions().get::<Account>() {
        return Json(json!({ "user": AccountQuery::from(account) })).into_response();
    }

    VerboseHTTPError::Standard(StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
}

pub async fn cookie_auth(mut req: Request<Body>, next: Next) -> Result<Response, VerboseHTTPError> {
    let Some(database) = DB.get() else {
        return Err(VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database unavailable".to_string(),
        ));
    };

    let collection: Collection<Account> = database.collection("users");

    if let Some(cookie_header) = req.headers().get(COOKIE).and_then(|h| h.to_str().ok()) {
        if let Some(cookie) = cookie_header.split(';').map(str::trim).find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(AUTH_COOKIE_NAME), Some(value)) => Some(value.to_string()),
                _ => None,
            }
        }) {
            if let Some(account) = collection
                .find_one(doc! { "auth.cookie": &cookie })
                .await
                .ok()
                .flatten()
            {
                if let Ok(expire) = account.auth.cookie_expire.parse::<u64>() {
                    if SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map_or(false, |now| expire > now.as_secs())
                    {
                        touch_last_active(&account.uid).await;
                        req.extensions_mut().insert(account);
                        return Ok(next.run(req).await);
                    }
                }
                kill_cookie(cookie).await;
            }
        }
    }

    Err(VerboseHTTPError::Standard(
        StatusCode::UNAUTHORIZED,
        "Unauthorized".to_string(),
    ))
}
