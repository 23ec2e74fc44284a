//! models/intake_model.rs
//! Cuerpos de los endpoints de intake y su validación.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;
use crate::models::outreach_model::{
    AgentSelector, NewOutreachRecord, OutreachKind, OutreachStatus,
};

/// Largo máximo de un texto que acepta el proveedor, en caracteres.
pub const MAX_MESSAGE_CHARS: usize = 1600;

static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[0-9]{10,15}$").expect("phone number regex is valid"));

/// Cuerpo de `POST /api/outreach/calls`.
///
/// Todos los campos son opcionales para serde; los faltantes se reportan
/// como 400 con nuestro propio mensaje.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCallRequest {
    pub customer_id: Option<i64>,
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub agent_id: Option<String>,
    pub agent_template_id: Option<String>,
    pub initialization_values: Option<serde_json::Value>,
}

/// Cuerpo de `POST /api/outreach/texts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTextRequest {
    pub customer_id: Option<i64>,
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub message_content: Option<String>,
    pub agent_id: Option<String>,
    pub agent_template_id: Option<String>,
    pub initialization_values: Option<serde_json::Value>,
}

/// Respuesta 201 de ambos endpoints de intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutreachResponse {
    pub record_id: String,
    pub status: OutreachStatus,
}

impl CreateCallRequest {
    pub fn validate(self) -> Result<NewOutreachRecord, DispatchError> {
        let customer_id = self.customer_id.filter(|id| *id > 0);
        let to_number = non_empty(self.to_number);
        let from_number = non_empty(self.from_number);

        let (customer_id, to_number, from_number) = match (customer_id, to_number, from_number) {
            (Some(c), Some(t), Some(f)) => (c, t, f),
            _ => {
                return Err(DispatchError::Validation(
                    "Missing required fields: customer_id, to_number, from_number".to_string(),
                ))
            }
        };

        let agent_selector = AgentSelector::from_parts(
            self.agent_id.as_deref(),
            self.agent_template_id.as_deref(),
        )
        .map_err(DispatchError::Validation)?
        .ok_or_else(|| {
            DispatchError::Validation(
                "Either agent_id or agent_template_id must be provided".to_string(),
            )
        })?;

        validate_phone_numbers(&to_number, &from_number)?;
        validate_initialization_values(self.initialization_values.as_ref())?;

        Ok(NewOutreachRecord {
            kind: OutreachKind::Call,
            customer_id,
            to_number,
            from_number,
            message_content: None,
            agent_selector: Some(agent_selector),
            initialization_values: self.initialization_values,
        })
    }
}

impl CreateTextRequest {
    pub fn validate(self) -> Result<NewOutreachRecord, DispatchError> {
        let customer_id = self.customer_id.filter(|id| *id > 0);
        let to_number = non_empty(self.to_number);
        let from_number = non_empty(self.from_number);
        let message_content = non_empty(self.message_content);

        let (customer_id, to_number, from_number, message_content) =
            match (customer_id, to_number, from_number, message_content) {
                (Some(c), Some(t), Some(f), Some(m)) => (c, t, f, m),
                _ => {
                    return Err(DispatchError::Validation(
                        "Missing required fields: customer_id, to_number, from_number, message_content"
                            .to_string(),
                    ))
                }
            };

        let chars = message_content.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(DispatchError::Validation(format!(
                "message_content must be at most {} characters (got {})",
                MAX_MESSAGE_CHARS, chars
            )));
        }

        let agent_selector = AgentSelector::from_parts(
            self.agent_id.as_deref(),
            self.agent_template_id.as_deref(),
        )
        .map_err(DispatchError::Validation)?;

        validate_phone_numbers(&to_number, &from_number)?;
        validate_initialization_values(self.initialization_values.as_ref())?;

        Ok(NewOutreachRecord {
            kind: OutreachKind::Text,
            customer_id,
            to_number,
            from_number,
            message_content: Some(message_content),
            agent_selector,
            initialization_values: self.initialization_values,
        })
    }
}

pub fn is_valid_phone_number(number: &str) -> bool {
    PHONE_NUMBER.is_match(number)
}

fn validate_phone_numbers(to_number: &str, from_number: &str) -> Result<(), DispatchError> {
    if !is_valid_phone_number(to_number) || !is_valid_phone_number(from_number) {
        return Err(DispatchError::Validation(
            "Phone numbers must be in international format (+1234567890)".to_string(),
        ));
    }
    Ok(())
}

fn validate_initialization_values(values: Option<&serde_json::Value>) -> Result<(), DispatchError> {
    match values {
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::Object(_)) => Ok(()),
        Some(_) => Err(DispatchError::Validation(
            "initialization_values must be a JSON object".to_string(),
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
