//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, ChallengeSession, CodeSubmission, EngineStatus, ExecutionReport, Hint, ValidationError};
use crate::scoring::XpBreakdown;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Status,
    StartSession {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    Submit {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
        code: String,
    },
    Execute {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        code: String,
    },
    Realtime {
        #[serde(rename = "challengeId")]
        challenge_id: String,
        code: String,
    },
    Hint {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    EndSession {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Status {
        status: EngineStatus,
    },
    Session {
        session: ChallengeSession,
    },
    SubmitResult {
        submission: CodeSubmission,
        session: ChallengeSession,
        xp: XpBreakdown,
    },
    ExecutionResult {
        report: ExecutionReport,
    },
    Realtime {
        errors: Vec<ValidationError>,
    },
    Hint {
        hint: Option<Hint>,
        remaining: usize,
    },
    SessionEnded {
        ended: bool,
    },
    Error {
        code: String,
        message: String,
    },
}

/// DTO used by both WS and HTTP for challenge delivery. Never includes the
/// reference solution or hint texts.
#[derive(Debug, Serialize)]
pub struct ChallengeOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub concepts: Vec<String>,
    #[serde(rename = "estimatedTime")]
    pub estimated_time: u32,
    #[serde(rename = "xpReward")]
    pub xp_reward: u32,
    #[serde(rename = "hintCount")]
    pub hint_count: usize,
}

/// Convert full `Challenge` (internal) to the public DTO.
pub fn to_out(c: &Challenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        title: c.title.clone(),
        description: c.description.clone(),
        difficulty: c.difficulty.clone(),
        concepts: c.concepts.clone(),
        estimated_time: c.estimated_time,
        xp_reward: c.xp_reward,
        hint_count: c.hints.len(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
}

#[derive(Deserialize)]
pub struct SubmitIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct CodeIn {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitOut {
    pub submission: CodeSubmission,
    pub session: ChallengeSession,
    pub xp: XpBreakdown,
}

#[derive(Debug, Serialize)]
pub struct HintOut {
    /// `None` once every hint is unlocked.
    pub hint: Option<Hint>,
    pub remaining: usize,
}

#[derive(Serialize)]
pub struct RealtimeOut {
    pub errors: Vec<ValidationError>,
}

#[derive(Serialize)]
pub struct EndSessionOut {
    pub ended: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
