use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use chrono::Utc;

use std::sync::Arc;

use crate::{
    config::Mode,
    dto::{ContactRequest, ContactResponse, HealthResponse},
    service::{DeliveryOutcome, Relay, RelayError},
};

const SENT: &str = "¡Correo enviado exitosamente!";
const SEND_FAILED: &str = "Error al enviar el correo";
const MISCONFIGURED: &str = "Error de configuración del servidor";
const BAD_BODY: &str = "No se pudo leer el formulario";

pub struct AppState {
    pub relay: Relay,
    pub mode: Mode,
}

/// Contact form body, accepted either as JSON or URL-encoded form data.
pub struct ContactForm(pub ContactRequest);

impl<S> FromRequest<S> for ContactForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let parsed = if is_form {
            Form::<ContactRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Json::<ContactRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        };

        parsed.map(Self).map_err(|detail| {
            tracing::debug!("Rejected contact form body: {detail}");
            (
                StatusCode::BAD_REQUEST,
                Json(ContactResponse::failure(BAD_BODY)),
            )
                .into_response()
        })
    }
}

#[debug_handler]
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    ContactForm(payload): ContactForm,
) -> Response {
    tracing::info!("Contact form submission received");

    let result = state.relay.relay(payload.into()).await;
    relay_response(state.mode, result)
}

#[debug_handler]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let body = HealthResponse {
        status: "OK".to_string(),
        environment: state.mode.as_str().to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Maps a relay result to the JSON contract the landing page expects.
/// Error details only leave the server outside production.
fn relay_response(mode: Mode, result: Result<DeliveryOutcome, RelayError>) -> Response {
    let exposed = |detail: String| (!mode.is_production()).then_some(detail);

    match result {
        Ok(DeliveryOutcome::Delivered { .. }) => {
            (StatusCode::OK, Json(ContactResponse::ok(SENT))).into_response()
        }
        Ok(DeliveryOutcome::Failed { kind, detail }) => {
            let body = ContactResponse::failure(SEND_FAILED)
                .with_error(exposed(format!("{kind}: {detail}")));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        Err(RelayError::Validation(e)) => {
            tracing::debug!("Contact form rejected: {e}");
            (
                StatusCode::BAD_REQUEST,
                Json(ContactResponse::failure(e.to_string())),
            )
                .into_response()
        }
        Err(RelayError::Configuration(e)) => {
            tracing::error!("Failed to send email: {e}");
            let body = ContactResponse::failure(MISCONFIGURED).with_error(exposed(e.to_string()));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
