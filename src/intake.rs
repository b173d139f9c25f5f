//! Guided intake: a fixed, ordered questionnaire that turns free-text answers
//! into one planning-session record.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use uuid::Uuid;

use crate::gateway::{Gateway, Row, Table};

/// Idle planner conversations are dropped after an hour.
pub const PLANNER_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Live conversations kept at once; the least recently active is dropped
/// to make room.
pub const MAX_PLANNER_SESSIONS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Question {
    pub key: &'static str,
    pub prompt: &'static str,
}

pub static PLANNER_QUESTIONS: [Question; 5] = [
    Question {
        key: "date",
        prompt: "What date (or season) are you thinking of for your session?",
    },
    Question {
        key: "location",
        prompt: "Where would you like the shoot to happen?",
    },
    Question {
        key: "style",
        prompt: "Which style feels most like you: candid, editorial, classic, or something else?",
    },
    Question {
        key: "inspiration",
        prompt: "Share any inspiration you have in mind: moods, places, links.",
    },
    Question {
        key: "notes",
        prompt: "Anything else we should know before we start planning?",
    },
];

const GREETING: &str = "Hi! Let's plan your session together. I'll ask a few quick questions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Asker,
    Responder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Blank answer, or the conversation already finished.
    Ignored,
    Next(Question),
    /// The full record, ready to persist.
    Completed(Row),
}

type CompletionCallback = Box<dyn FnOnce(&Row) + Send + Sync>;

pub struct IntakeFlow {
    email: String,
    messages: Vec<Message>,
    index: usize,
    answers: BTreeMap<&'static str, String>,
    completed: bool,
    on_complete: Option<CompletionCallback>,
}

impl IntakeFlow {
    pub fn new(email: impl Into<String>) -> Self {
        let mut flow = Self {
            email: email.into().trim().to_string(),
            messages: Vec::new(),
            index: 0,
            answers: BTreeMap::new(),
            completed: false,
            on_complete: None,
        };
        flow.ask(GREETING.to_string());
        flow.ask(PLANNER_QUESTIONS[0].prompt.to_string());
        flow
    }

    /// Runs once with the finished record.
    pub fn on_complete(mut self, callback: impl FnOnce(&Row) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn current_question(&self) -> Option<Question> {
        if self.completed {
            None
        } else {
            PLANNER_QUESTIONS.get(self.index).copied()
        }
    }

    fn ask(&mut self, text: String) {
        self.messages.push(Message {
            speaker: Speaker::Asker,
            text,
        });
    }

    pub fn submit_answer(&mut self, text: &str) -> Submission {
        let answer = text.trim();
        if answer.is_empty() || self.completed {
            return Submission::Ignored;
        }
        let Some(question) = PLANNER_QUESTIONS.get(self.index) else {
            return Submission::Ignored;
        };

        self.answers.insert(question.key, answer.to_string());
        self.messages.push(Message {
            speaker: Speaker::Responder,
            text: answer.to_string(),
        });

        if self.index + 1 < PLANNER_QUESTIONS.len() {
            self.index += 1;
            let next = PLANNER_QUESTIONS[self.index];
            self.ask(next.prompt.to_string());
            return Submission::Next(next);
        }

        self.completed = true;
        let record = self.record();
        self.ask(format!(
            "Thank you! We have everything we need and will reach out at {} soon.",
            self.email
        ));
        if let Some(callback) = self.on_complete.take() {
            callback(&record);
        }
        Submission::Completed(record)
    }

    fn record(&self) -> Row {
        let mut row: Row = self
            .answers
            .iter()
            .map(|(key, answer)| (key.to_string(), Value::String(answer.clone())))
            .collect();
        row.insert("email".into(), Value::String(self.email.clone()));
        row.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
        row
    }

    pub fn view(&self, id: Uuid) -> PlannerView {
        PlannerView {
            id,
            messages: self.messages.clone(),
            current_question: self.current_question().map(|q| q.key),
            completed: self.completed,
        }
    }
}

/// Writes the finished record in the background. A failure is logged and
/// the conversation stays as it is.
pub fn spawn_persist(gateway: Arc<dyn Gateway>, record: Row) -> JoinHandle<()> {
    tokio::spawn(async move {
        match gateway.insert(Table::PlanningSessions, vec![record]).await {
            Ok(rows) => {
                let id = rows
                    .first()
                    .and_then(|row| row.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                tracing::info!(session_id = %id, "planning session saved");
            }
            Err(e) => tracing::error!(error = %e, "failed to save planning session"),
        }
    })
}

// ============================================================================
// Server-side planner sessions
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerView {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub current_question: Option<&'static str>,
    pub completed: bool,
}

struct PlannerEntry {
    flow: IntakeFlow,
    last_active: Instant,
}

/// In-memory planner conversations keyed by id.
pub struct PlannerSessions {
    entries: RwLock<HashMap<Uuid, PlannerEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for PlannerSessions {
    fn default() -> Self {
        Self::new(PLANNER_SESSION_TTL)
    }
}

impl PlannerSessions {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, MAX_PLANNER_SESSIONS)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub async fn start(&self, email: &str) -> PlannerView {
        let id = Uuid::new_v4();
        let flow = IntakeFlow::new(email);
        let view = flow.view(id);

        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.last_active.elapsed() < ttl);
        while entries.len() >= self.capacity {
            let Some(stalest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_active)
                .map(|(id, _)| *id)
            else {
                break;
            };
            entries.remove(&stalest);
            tracing::warn!(
                session_id = %stalest,
                "planner session limit reached; dropped the least recently active"
            );
        }
        entries.insert(
            id,
            PlannerEntry {
                flow,
                last_active: Instant::now(),
            },
        );
        view
    }

    /// `None` when the session is unknown or has expired.
    pub async fn answer(&self, id: Uuid, text: &str) -> Option<(Submission, PlannerView)> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        if entry.last_active.elapsed() >= self.ttl {
            entries.remove(&id);
            return None;
        }

        let submission = entry.flow.submit_answer(text);
        entry.last_active = Instant::now();
        Some((submission, entry.flow.view(id)))
    }

    pub async fn view(&self, id: Uuid) -> Option<PlannerView> {
        let entries = self.entries.read().await;
        entries
            .get(&id)
            .filter(|entry| entry.last_active.elapsed() < self.ttl)
            .map(|entry| entry.flow.view(id))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Removes expired conversations, returning how many were dropped.
    pub async fn prune(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.last_active.elapsed() < ttl);
        before - entries.len()
    }
}
