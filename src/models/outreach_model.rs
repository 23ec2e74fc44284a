//! models/outreach_model.rs
//! Registros de outreach (llamadas y textos) y su máquina de estados.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canal del proveedor por el que sale el registro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutreachKind {
    Call,
    Text,
}

impl OutreachKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachKind::Call => "call",
            OutreachKind::Text => "text",
        }
    }

    /// Estado mientras la llamada al proveedor está en curso.
    pub fn in_flight_status(&self) -> OutreachStatus {
        match self {
            OutreachKind::Call => OutreachStatus::Initiating,
            OutreachKind::Text => OutreachStatus::Sending,
        }
    }

    /// Estado terminal cuando el proveedor aceptó la solicitud.
    pub fn success_status(&self) -> OutreachStatus {
        match self {
            OutreachKind::Call => OutreachStatus::Initiated,
            OutreachKind::Text => OutreachStatus::Sent,
        }
    }

    /// Si `status` pertenece a los estados de este tipo.
    pub fn accepts(&self, status: OutreachStatus) -> bool {
        match status {
            OutreachStatus::Pending | OutreachStatus::Failed => true,
            other => other == self.in_flight_status() || other == self.success_status(),
        }
    }
}

impl fmt::Display for OutreachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutreachKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(OutreachKind::Call),
            "text" => Ok(OutreachKind::Text),
            other => Err(format!("unknown outreach kind '{}'", other)),
        }
    }
}

/// Estado del ciclo de vida. Las llamadas usan `initiating`/`initiated`,
/// los textos `sending`/`sent`; `pending` y `failed` son comunes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutreachStatus {
    Pending,
    Initiating,
    Initiated,
    Sending,
    Sent,
    Failed,
}

impl OutreachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachStatus::Pending => "pending",
            OutreachStatus::Initiating => "initiating",
            OutreachStatus::Initiated => "initiated",
            OutreachStatus::Sending => "sending",
            OutreachStatus::Sent => "sent",
            OutreachStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutreachStatus::Initiated | OutreachStatus::Sent | OutreachStatus::Failed
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, OutreachStatus::Initiating | OutreachStatus::Sending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutreachStatus::Initiated | OutreachStatus::Sent)
    }

    /// Transiciones válidas:
    /// `pending -> in-flight -> (success | failed)`.
    ///
    /// `pending -> failed` no es válida: toda ejecución marca el registro en
    /// vuelo antes de que algo pueda fallarlo.
    pub fn can_transition_to(&self, next: OutreachStatus) -> bool {
        match (self, next) {
            (OutreachStatus::Pending, OutreachStatus::Initiating)
            | (OutreachStatus::Pending, OutreachStatus::Sending) => true,
            (OutreachStatus::Initiating, OutreachStatus::Initiated)
            | (OutreachStatus::Initiating, OutreachStatus::Failed) => true,
            (OutreachStatus::Sending, OutreachStatus::Sent)
            | (OutreachStatus::Sending, OutreachStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutreachStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutreachStatus::Pending),
            "initiating" => Ok(OutreachStatus::Initiating),
            "initiated" => Ok(OutreachStatus::Initiated),
            "sending" => Ok(OutreachStatus::Sending),
            "sent" => Ok(OutreachStatus::Sent),
            "failed" => Ok(OutreachStatus::Failed),
            other => Err(format!("unknown outreach status '{}'", other)),
        }
    }
}

/// Agente del proveedor que atiende la llamada o el texto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSelector {
    Agent(String),
    Template(String),
}

impl AgentSelector {
    /// Arma el selector a partir de las dos columnas opcionales. `Ok(None)`
    /// si faltan ambas, `Err` si vienen las dos.
    pub fn from_parts(
        agent_id: Option<&str>,
        agent_template_id: Option<&str>,
    ) -> Result<Option<Self>, String> {
        let agent_id = agent_id.filter(|s| !s.trim().is_empty());
        let agent_template_id = agent_template_id.filter(|s| !s.trim().is_empty());
        match (agent_id, agent_template_id) {
            (Some(_), Some(_)) => {
                Err("Only one of agent_id or agent_template_id may be provided".to_string())
            }
            (Some(a), None) => Ok(Some(AgentSelector::Agent(a.to_string()))),
            (None, Some(t)) => Ok(Some(AgentSelector::Template(t.to_string()))),
            (None, None) => Ok(None),
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentSelector::Agent(id) => Some(id),
            AgentSelector::Template(_) => None,
        }
    }

    pub fn agent_template_id(&self) -> Option<&str> {
        match self {
            AgentSelector::Agent(_) => None,
            AgentSelector::Template(id) => Some(id),
        }
    }
}

/// Intento de outreach persistido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachRecord {
    pub id: String,
    pub kind: OutreachKind,
    pub customer_id: i64,
    pub to_number: String,
    pub from_number: String,
    pub message_content: Option<String>,
    pub agent_id: Option<String>,
    pub agent_template_id: Option<String>,
    pub initialization_values: Option<serde_json::Value>,
    pub provider_reference_id: Option<String>,
    pub status: OutreachStatus,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutreachRecord {
    pub fn agent_selector(&self) -> Result<Option<AgentSelector>, String> {
        AgentSelector::from_parts(self.agent_id.as_deref(), self.agent_template_id.as_deref())
    }
}

/// Datos validados de un registro nuevo. Los arma el intake y los consume el store.
#[derive(Debug, Clone)]
pub struct NewOutreachRecord {
    pub kind: OutreachKind,
    pub customer_id: i64,
    pub to_number: String,
    pub from_number: String,
    pub message_content: Option<String>,
    pub agent_selector: Option<AgentSelector>,
    pub initialization_values: Option<serde_json::Value>,
}

impl NewOutreachRecord {
    #[allow(dead_code)]
    #[cfg(test)]
    pub fn test_call(to_number: &str) -> Self {
        Self {
            kind: OutreachKind::Call,
            customer_id: 42,
            to_number: to_number.to_string(),
            from_number: "+15550000001".to_string(),
            message_content: None,
            agent_selector: Some(AgentSelector::Agent("agent-1".to_string())),
            initialization_values: None,
        }
    }

    #[allow(dead_code)]
    #[cfg(test)]
    pub fn test_text(to_number: &str, message: &str) -> Self {
        Self {
            kind: OutreachKind::Text,
            customer_id: 42,
            to_number: to_number.to_string(),
            from_number: "+15550000001".to_string(),
            message_content: Some(message.to_string()),
            agent_selector: None,
            initialization_values: None,
        }
    }
}

/// Una escritura atómica de estado. Los constructores atan la referencia o
/// el error al estado que les corresponde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    kind: OutreachKind,
    expected: OutreachStatus,
    status: OutreachStatus,
    provider_reference_id: Option<String>,
    error_detail: Option<String>,
}

impl StatusUpdate {
    /// `pending -> initiating|sending`
    pub fn start(kind: OutreachKind) -> Self {
        Self {
            kind,
            expected: OutreachStatus::Pending,
            status: kind.in_flight_status(),
            provider_reference_id: None,
            error_detail: None,
        }
    }

    /// `initiating|sending -> initiated|sent`
    pub fn succeed(kind: OutreachKind, provider_reference_id: String) -> Self {
        Self {
            kind,
            expected: kind.in_flight_status(),
            status: kind.success_status(),
            provider_reference_id: Some(provider_reference_id),
            error_detail: None,
        }
    }

    /// `initiating|sending -> failed`
    pub fn fail(kind: OutreachKind, error_detail: String) -> Self {
        Self {
            kind,
            expected: kind.in_flight_status(),
            status: OutreachStatus::Failed,
            provider_reference_id: None,
            error_detail: Some(error_detail),
        }
    }

    pub fn kind(&self) -> OutreachKind {
        self.kind
    }

    pub fn expected(&self) -> OutreachStatus {
        self.expected
    }

    pub fn status(&self) -> OutreachStatus {
        self.status
    }

    pub fn provider_reference_id(&self) -> Option<&str> {
        self.provider_reference_id.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

/// Filtros para listar registros.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutreachFilter {
    pub kind: Option<OutreachKind>,
    pub customer_id: Option<i64>,
    pub status: Option<OutreachStatus>,
}

/// Lista paginada de registros.
#[derive(Debug, Clone, Serialize)]
pub struct ListOutreachResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<OutreachRecord>,
}

/// Conteos por clase de estado.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OutreachStats {
    pub total: u64,
    pub pending: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
}
