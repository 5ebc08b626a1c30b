use lettre::Address;

use crate::dto::ContactRequest;

/// A contact form submission as received. Nothing here is trusted until
/// [`Submission::validate`] has accepted it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

impl From<ContactRequest> for Submission {
    fn from(request: ContactRequest) -> Self {
        Self {
            name: request.name.unwrap_or_default(),
            email: request.email.unwrap_or_default(),
            phone: request.phone,
            message: request.message.unwrap_or_default(),
        }
    }
}

/// Submission that passed validation, with surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Por favor completa los campos requeridos: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Por favor ingresa un email válido")]
    InvalidEmail,

    #[error("El nombre contiene caracteres no permitidos")]
    InvalidName,
}

impl Submission {
    pub fn validate(self) -> Result<ValidSubmission, ValidationError> {
        // The name ends up in the From and Subject headers, which must stay on one line
        let name = self.name.split_whitespace().collect::<Vec<_>>().join(" ");
        let name = name.as_str();
        let email = self.email.trim();
        let message = self.message.trim();

        let missing: Vec<&'static str> = [("name", name), ("email", email), ("message", message)]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| field)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        if name.chars().any(char::is_control) {
            return Err(ValidationError::InvalidName);
        }

        // Reply-To must also be something the mail library can render
        if !is_plausible_email(email) || email.parse::<Address>().is_err() {
            return Err(ValidationError::InvalidEmail);
        }

        let phone = self
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string);

        Ok(ValidSubmission {
            name: name.to_string(),
            email: email.to_string(),
            phone,
            message: message.to_string(),
        })
    }
}

/// Loose syntactic check: one `@`, something before it, and a dotted
/// domain after it. Anything stricter is left to the SMTP server.
pub fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}
