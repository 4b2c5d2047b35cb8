use serde::{Deserialize, Serialize};

pub const SENDGRID_API_BASE_URL: &str = "https://api.sendgrid.com/v3";

/// SendGrid v3 `POST /mail/send` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmailSendRequest {
    pub personalizations: Vec<EmailPersonalization>,
    pub from: EmailParty,
    pub subject: String,
    pub content: Vec<EmailBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailPersonalization {
    pub to: Vec<EmailParty>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailParty {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailBody {
    #[serde(rename = "type")]
    pub content_type: String,
    pub value: String,
}

impl EmailSendRequest {
    pub fn html(
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        html_content: &str,
    ) -> Self {
        Self {
            personalizations: vec![EmailPersonalization {
                to: vec![EmailParty {
                    email: to_email.to_string(),
                    name: to_name.map(str::to_string),
                }],
            }],
            from: EmailParty {
                email: "comms@worklink.app".to_string(),
                name: Some("Worklink".to_string()),
            },
            subject: subject.to_string(),
            content: vec![EmailBody {
                content_type: "text/html".to_string(),
                value: html_content.to_string(),
            }],
        }
    }
}
