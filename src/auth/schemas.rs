use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthObject {
    pub cookie: String,
    #[serde(rename = "cookie-expire")]
    pub cookie_expire: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub password: String,
    pub salt: String,
    pub auth: AuthObject,
    // Stamped by the auth middleware on each authenticated request;
    // feeds the presence estimator.
    pub last_active_at: u64,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountQuery {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&Account> for AccountQuery {
    fn from(account: &Account) -> Self {
        Self {
            uid: account.uid.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            avatar_url: account.avatar_url.clone(),
        }
    }
}
