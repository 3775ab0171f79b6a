//! Per-turn metrics for the voice chatbot
//!
//! Tracks capture, completion and translation latencies plus an error log.
//! Every update names its turn, so results from a superseded turn cannot
//! touch the turn in progress.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Maximum number of finished turns to retain in history
const MAX_TURN_HISTORY: usize = 50;

/// Maximum number of errors to retain in history
const MAX_ERROR_HISTORY: usize = 20;

/// Metrics for a finished turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub turn_id: String,
    /// Unix timestamp when the turn started (seconds)
    pub started_at: i64,
    /// From capture start until the transcript was handed to the completion service
    pub capture_duration_ms: u64,
    pub completion_duration_ms: u64,
    /// Zero when translation is disabled
    pub translation_duration_ms: u64,
    /// Length of the assistant reply in characters
    pub reply_length_chars: u64,
    pub total_turn_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_turns: u64,
    pub successful_turns: u64,
    pub failed_turns: u64,
    pub avg_completion_duration_ms: u64,
    pub avg_translation_duration_ms: u64,
    pub avg_total_turn_ms: u64,
    pub last_error: Option<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// "capture", "completion", "translation" or "playback"
    pub error_type: String,
    pub message: String,
    pub turn_id: Option<String>,
}

struct TurnInProgress {
    turn_id: Uuid,
    started_at: Instant,
    started_at_unix: i64,
    capture_duration: Option<Duration>,
    completion_started: Option<Instant>,
    completion_duration: Option<Duration>,
    translation_started: Option<Instant>,
    translation_duration: Option<Duration>,
    reply_length: Option<usize>,
}

impl TurnInProgress {
    fn new(turn_id: Uuid) -> Self {
        Self {
            turn_id,
            started_at: Instant::now(),
            started_at_unix: chrono::Utc::now().timestamp(),
            capture_duration: None,
            completion_started: None,
            completion_duration: None,
            translation_started: None,
            translation_duration: None,
            reply_length: None,
        }
    }

    fn to_metrics(&self, success: bool, error_message: Option<String>) -> TurnMetrics {
        let ms = |d: Option<Duration>| d.map(|d| d.as_millis() as u64).unwrap_or(0);
        TurnMetrics {
            turn_id: self.turn_id.to_string(),
            started_at: self.started_at_unix,
            capture_duration_ms: ms(self.capture_duration),
            completion_duration_ms: ms(self.completion_duration),
            translation_duration_ms: ms(self.translation_duration),
            reply_length_chars: self.reply_length.unwrap_or(0) as u64,
            total_turn_ms: self.started_at.elapsed().as_millis() as u64,
            success,
            error_message,
        }
    }
}

pub struct MetricsCollector {
    /// Finished turns (newest first)
    history: VecDeque<TurnMetrics>,
    /// Errors (newest first)
    errors: VecDeque<ErrorRecord>,
    current_turn: Option<TurnInProgress>,
    total_turns: u64,
    successful_turns: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_TURN_HISTORY),
            errors: VecDeque::with_capacity(MAX_ERROR_HISTORY),
            current_turn: None,
            total_turns: 0,
            successful_turns: 0,
        }
    }

    /// Start tracking a new turn.
    ///
    /// A turn still in progress is recorded as failed.
    pub fn start_turn(&mut self, turn_id: Uuid) {
        if let Some(old) = self.current_turn.take() {
            log::warn!(
                "Metrics: discarding in-progress turn {} to start turn {}",
                old.turn_id,
                turn_id
            );
            let metrics = old.to_metrics(false, Some("Discarded: new turn started".to_string()));
            self.add_to_history(metrics);
        }

        log::debug!("Metrics: starting turn {}", turn_id);
        self.current_turn = Some(TurnInProgress::new(turn_id));
        self.total_turns += 1;
    }

    fn active_mut(&mut self, turn_id: Uuid) -> Option<&mut TurnInProgress> {
        self.current_turn
            .as_mut()
            .filter(|t| t.turn_id == turn_id)
    }

    pub fn completion_started(&mut self, turn_id: Uuid) {
        if let Some(turn) = self.active_mut(turn_id) {
            turn.capture_duration = Some(turn.started_at.elapsed());
            turn.completion_started = Some(Instant::now());
        }
    }

    pub fn completion_finished(&mut self, turn_id: Uuid, reply_len: usize) {
        if let Some(turn) = self.active_mut(turn_id) {
            turn.completion_duration = turn.completion_started.map(|s| s.elapsed());
            turn.reply_length = Some(reply_len);
            log::info!(
                "Metrics: completion for turn {} took {:?}, {} chars",
                turn_id,
                turn.completion_duration,
                reply_len
            );
        }
    }

    pub fn translation_started(&mut self, turn_id: Uuid) {
        if let Some(turn) = self.active_mut(turn_id) {
            turn.translation_started = Some(Instant::now());
        }
    }

    pub fn translation_finished(&mut self, turn_id: Uuid) {
        if let Some(turn) = self.active_mut(turn_id) {
            turn.translation_duration = turn.translation_started.map(|s| s.elapsed());
        }
    }

    /// The turn reached playback.
    pub fn turn_completed(&mut self, turn_id: Uuid) {
        if self.active_mut(turn_id).is_none() {
            return;
        }
        if let Some(turn) = self.current_turn.take() {
            let metrics = turn.to_metrics(true, None);
            log::info!(
                "Metrics: turn {} completed - total {}ms (completion {}ms + translation {}ms)",
                metrics.turn_id,
                metrics.total_turn_ms,
                metrics.completion_duration_ms,
                metrics.translation_duration_ms
            );
            self.add_to_history(metrics);
            self.successful_turns += 1;
        }
    }

    pub fn turn_failed(&mut self, turn_id: Uuid, error_type: &str, error: String) {
        if self.active_mut(turn_id).is_some() {
            if let Some(turn) = self.current_turn.take() {
                let metrics = turn.to_metrics(false, Some(error.clone()));
                log::warn!(
                    "Metrics: turn {} failed after {}ms - {}",
                    metrics.turn_id,
                    metrics.total_turn_ms,
                    error
                );
                self.add_to_history(metrics);
            }
        }
        self.record_error(error_type, error, Some(turn_id.to_string()));
    }

    /// Drop the turn without recording it (user stopped listening).
    pub fn turn_cancelled(&mut self, turn_id: Uuid) {
        if self.active_mut(turn_id).is_some() {
            self.current_turn = None;
            self.total_turns = self.total_turns.saturating_sub(1);
            log::debug!("Metrics: turn {} cancelled", turn_id);
        }
    }

    pub fn record_error(&mut self, error_type: &str, message: String, turn_id: Option<String>) {
        let error = ErrorRecord {
            timestamp: chrono::Utc::now().timestamp(),
            error_type: error_type.to_string(),
            message,
            turn_id,
        };
        log::debug!("Metrics: recording error - {:?}", error);

        self.errors.push_front(error);
        while self.errors.len() > MAX_ERROR_HISTORY {
            self.errors.pop_back();
        }
    }

    pub fn get_summary(&self) -> MetricsSummary {
        let successful: Vec<_> = self.history.iter().filter(|t| t.success).collect();
        let count = successful.len() as u64;

        let (avg_completion, avg_translation, avg_total) = if count > 0 {
            let sum_completion: u64 = successful.iter().map(|t| t.completion_duration_ms).sum();
            let sum_translation: u64 =
                successful.iter().map(|t| t.translation_duration_ms).sum();
            let sum_total: u64 = successful.iter().map(|t| t.total_turn_ms).sum();
            (
                sum_completion / count,
                sum_translation / count,
                sum_total / count,
            )
        } else {
            (0, 0, 0)
        };

        MetricsSummary {
            total_turns: self.total_turns,
            successful_turns: self.successful_turns,
            failed_turns: self.history.iter().filter(|t| !t.success).count() as u64,
            avg_completion_duration_ms: avg_completion,
            avg_translation_duration_ms: avg_translation,
            avg_total_turn_ms: avg_total,
            last_error: self.errors.front().cloned(),
        }
    }

    /// Finished turns (newest first)
    pub fn get_history(&self) -> Vec<TurnMetrics> {
        self.history.iter().cloned().collect()
    }

    /// Errors (newest first)
    pub fn get_errors(&self) -> Vec<ErrorRecord> {
        self.errors.iter().cloned().collect()
    }

    pub fn is_active_turn(&self, turn_id: Uuid) -> bool {
        self.current_turn
            .as_ref()
            .map(|t| t.turn_id == turn_id)
            .unwrap_or(false)
    }

    fn add_to_history(&mut self, metrics: TurnMetrics) {
        self.history.push_front(metrics);
        while self.history.len() > MAX_TURN_HISTORY {
            self.history.pop_back();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
