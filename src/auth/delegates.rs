use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use mongodb::{
    Collection,
    bson::{doc, to_bson},
};
use std::{
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;
use uuid::Uuid;

use super::schemas::{Account, AuthObject};
use crate::DB;

const COLLECTION_USERS: &str = "users";
const COOKIE_LIFETIME_SECS: u64 = 15_552_000;

static ARGON2: LazyLock<Argon2> = LazyLock::new(Argon2::default);

#[inline]
fn is_valid_password(pwd: &str) -> bool {
    let len = pwd.len();
    if len < 8 || len > 32 {
        return false;
    }

    let (upper, lower, digit, symbol) =
        pwd.chars()
            .fold((false, false, false, false), |(u, l, d, s), c| {
                (
                    u || c.is_ascii_uppercase(),
                    l || c.is_ascii_lowercase(),
                    d || c.is_ascii_digit(),
                    s || !c.is_ascii_alphanumeric(),
                )
            });

    upper && lower && digit && symbol
}

pub async fn hash_password(password: String) -> Option<(String, String)> {
    if !is_valid_password(&password) {
        return None;
    }
    let salt = SaltString::generate(&mut OsRng);

    tokio::task::spawn_blocking(move || {
        ARGON2
            .hash_password(password.as_bytes(), &salt)
            .ok()
            .map(|hash| (hash.to_string(), salt.to_string()))
    })
    .await
    .ok()
    .flatten()
}

pub async fn verify_password(
    plaintext_password: String,
    salt: String,
    hashed_password: String,
) -> bool {
    tokio::task::spawn_blocking(move || {
        SaltString::from_b64(&salt)
            .ok()
            .and_then(|salt_string| {
                ARGON2
                    .hash_password(plaintext_password.as_bytes(), &salt_string)
                    .ok()
                    .map(|hash| hash.to_string() == hashed_password)
            })
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

pub async fn generate_cookie(username: String) -> Option<AuthObject> {
    let database = DB.get()?;
    let collection: Collection<Account> = database.collection(COLLECTION_USERS);

    let expire = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs()
        + COOKIE_LIFETIME_SECS;

    let auth_object = AuthObject {
        cookie: Uuid::new_v4().to_string(),
        cookie_expire: expire.to_string(),
    };

    collection
        .update_one(
            doc! { "username": username },
            doc! { "$set": { "auth": to_bson(&auth_object).ok()? } },
        )
        .await
        .ok()?;

    Some(auth_object)
}

pub async fn kill_cookie(cookie: String) -> bool {
    let Some(database) = DB.get() else {
        return false;
    };
    let collection: Collection<Account> = database.collection(COLLECTION_USERS);

    let auth_object = AuthObject {
        cookie: Uuid::new_v4().to_string(),
        cookie_expire: "0".to_string(),
    };

    let Some(auth_bson) = to_bson(&auth_object).ok() else {
        return false;
    };

    collection
        .update_one(
            doc! { "auth.cookie": cookie },
            doc! { "$set": { "auth": auth_bson } },
        )
        .await
        .is_ok()
}

pub async fn check_account_existence(username: &str, email: &str) -> Option<(bool, bool)> {
    let database = DB.get()?;
    let collection: Collection<Account> = database.collection(COLLECTION_USERS);

    let username_exists = collection
        .find_one(doc! { "username": username })
        .await
        .ok()
        .flatten()
        .is_some();

    let email_exists = collection
        .find_one(doc! { "email": email })
        .await
        .ok()
        .flatten()
        .is_some();

    Some((username_exists, email_exists))
}

pub async fn retrieve_account(username: Option<&str>, email: Option<&str>) -> Option<Account> {
    let database = DB.get()?;
    let collection: Collection<Account> = database.collection(COLLECTION_USERS);

    if let Some(username) = username {
        if let Some(account) = collection
            .find_one(doc! { "username": username })
            .await
            .ok()
            .flatten()
        {
            return Some(account);
        }
    }

    if let Some(email) = email {
        if let Some(account) = collection
            .find_one(doc! { "email": email })
            .await
            .ok()
            .flatten()
        {
            return Some(account);
        }
    }

    None
}

// Best effort; presence tolerates a stale stamp.
pub async fn touch_last_active(uid: &str) {
    let Some(database) = DB.get() else {
        return;
    };
    let collection: Collection<Account> = database.collection(COLLECTION_USERS);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    if collection
        .update_one(
            doc! { "uid": uid },
            doc! { "$set": { "last_active_at": now as i64 } },
        )
        .await
        .is_err()
    {
        warn!(uid, "failed to stamp last_active_at");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy_requires_all_character_classes() {
        assert!(is_valid_password("Str0ng!pass"));
        assert!(!is_valid_password("short1!"));
        assert!(!is_valid_password("alllowercase1!"));
        assert!(!is_valid_password("ALLUPPERCASE1!"));
        assert!(!is_valid_password("NoDigits!!"));
        assert!(!is_valid_password("NoSymbols11"));
    }
}
