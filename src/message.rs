use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::models::ValidSubmission;

const PHONE_PLACEHOLDER: &str = "No proporcionado";

/// Fully rendered email, independent of any SMTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Display name shown next to the sender address.
    pub from_name: String,
    pub from: String,
    pub reply_to: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub message_id: String,
}

/// Renders a submission into the email delivered to the site owner.
///
/// The authenticated `sender` is always the envelope sender and the
/// recipient. The submitter only appears as display name and `Reply-To`.
pub fn compose(
    submission: &ValidSubmission,
    sender: &str,
    site_name: &str,
    sent_at: DateTime<Local>,
) -> OutboundMessage {
    let phone = submission.phone.as_deref().unwrap_or(PHONE_PLACEHOLDER);
    let timestamp = sent_at.format("%d/%m/%Y %H:%M:%S");

    let html = format!(
        r#"
      <div style="font-family: Arial, sans-serif; padding: 20px;">
        <h2>Nuevo mensaje de contacto</h2>
        <p><strong>📌 Nombre:</strong> {name}</p>
        <p><strong>📧 Email:</strong> {email}</p>
        <p><strong>📱 Teléfono:</strong> {phone}</p>
        <p><strong>💬 Mensaje:</strong></p>
        <p style="background-color: #f5f5f5; padding: 15px; border-radius: 5px;">
          {message}
        </p>
        <hr>
        <p style="color: #666; font-size: 12px;">
          Enviado desde {site} - {timestamp}
        </p>
      </div>
    "#,
        name = escape_html(&submission.name),
        email = escape_html(&submission.email),
        phone = escape_html(phone),
        message = line_breaks(&escape_html(&submission.message)),
        site = escape_html(site_name),
    );

    let text = format!(
        "Nombre: {}\nEmail: {}\nTeléfono: {}\nMensaje: {}",
        submission.name, submission.email, phone, submission.message
    );

    OutboundMessage {
        from_name: submission.name.clone(),
        from: sender.to_string(),
        reply_to: submission.email.clone(),
        to: sender.to_string(),
        subject: format!("📧 Nuevo mensaje de contacto de {}", submission.name),
        html,
        text,
        message_id: new_message_id(sender),
    }
}

fn new_message_id(sender: &str) -> String {
    let domain = sender
        .rsplit_once('@')
        .map_or("localhost", |(_, domain)| domain);
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn line_breaks(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\n', "<br>")
}
