use axum::http::StatusCode;
use reqwest::Client;
use std::env::var;

use super::schemas::*;
use crate::apex::utils::VerboseHTTPError;

pub async fn send_email_internal(
    to_email: &str,
    to_name: Option<&str>,
    subject: &str,
    html_content: &str,
) -> Result<(), VerboseHTTPError> {
    let api_key = var("SENDGRID_API_KEY").map_err(|_| {
        VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Missing SendGrid configuration".to_string(),
        )
    })?;

    let email_request = EmailSendRequest::html(to_email, to_name, subject, html_content);

    let response = Client::new()
        .post(format!("{}/mail/send", SENDGRID_API_BASE_URL))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&email_request)
        .send()
        .await
        .map_err(|_| {
            VerboseHTTPError::Standard(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send email".to_string(),
            )
        })?;

    if !response.status().is_success() {
        return Err(VerboseHTTPError::Standard(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Email service unavailable".to_string(),
        ));
    }

    Ok(())
}
