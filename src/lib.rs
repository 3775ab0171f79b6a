pub mod completion;
pub mod console;
pub mod credentials;
pub mod dictation;
pub mod effects;
pub mod history;
pub mod metrics;
pub mod read_aloud;
pub mod settings;
pub mod speech;
pub mod state_machine;
pub mod translation;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use effects::{ChatEffectRunner, Collaborators, EffectRunner};
use history::DisplayEntry;
use metrics::MetricsCollector;
use settings::AppSettings;
use state_machine::{Effect, Event, Notice, SessionController, State};

/// UI state published after every transition.
/// Uses tagged union format: { "status": "idle" } or { "status": "translating" }
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Listening,
    Thinking,
    Translating,
}

/// Convert internal State to UiState for the front end
pub fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Listening { .. } => UiState::Listening,
        State::AwaitingCompletion { .. } => UiState::Thinking,
        State::AwaitingTranslation { .. } => UiState::Translating,
    }
}

/// Where the control loop publishes what the user should see.
pub trait UiSink: Send + Sync + 'static {
    fn state_changed(&self, state: UiState);
    fn entry_added(&self, entry: &DisplayEntry);
    fn notice(&self, notice: &Notice);
}

/// Holds the event sender for dispatching events into a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Event>,
}

impl SessionHandle {
    /// Send an event to the session controller
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }

    /// Non-blocking variant for callers outside the runtime
    pub fn try_send(&self, event: Event) -> Result<(), mpsc::error::TrySendError<Event>> {
        self.tx.try_send(event)
    }
}

/// Run the session control loop until Exit or every sender is dropped.
/// Returns the controller so callers can inspect the final history.
pub async fn run_session_loop(
    mut session: SessionController,
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    ui: Arc<dyn UiSink>,
) -> SessionController {
    ui.state_changed(state_to_ui(session.state()));
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down session loop");
            if let State::Listening { turn } = session.state() {
                effect_runner.spawn(Effect::StopListening { turn: *turn }, tx.clone());
            }
            break;
        }

        let before = session.state().clone();
        let effects = session.reduce(event);

        if std::mem::discriminant(&before) != std::mem::discriminant(session.state()) {
            log::info!("State transition: {:?} -> {:?}", before, session.state());
        }

        for eff in effects {
            match eff {
                Effect::EmitUi => ui.state_changed(state_to_ui(session.state())),
                Effect::ShowEntry(entry) => ui.entry_added(&entry),
                Effect::Notify(notice) => ui.notice(&notice),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("Session loop ended");
    session
}

/// A running chat session.
pub struct Session {
    pub handle: SessionHandle,
    pub metrics: Arc<Mutex<MetricsCollector>>,
    pub task: JoinHandle<SessionController>,
}

/// Spawn a session on the current runtime and ask for capture permission.
pub fn start_session(
    settings: &AppSettings,
    collaborators: Collaborators,
    ui: Arc<dyn UiSink>,
) -> Session {
    let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
    let translation_enabled = settings.translation.enabled && collaborators.translator.is_some();
    let controller = SessionController::new(settings.persona.clone(), translation_enabled);
    let runner = ChatEffectRunner::new(collaborators, settings, metrics.clone());
    start_session_with(controller, runner, ui, metrics)
}

/// Like [`start_session`], with a caller-supplied controller and runner.
pub fn start_session_with(
    controller: SessionController,
    runner: Arc<dyn EffectRunner>,
    ui: Arc<dyn UiSink>,
    metrics: Arc<Mutex<MetricsCollector>>,
) -> Session {
    let (tx, rx) = mpsc::channel::<Event>(32);

    runner.spawn(Effect::RequestPermission, tx.clone());

    let tx_for_loop = tx.clone();
    let task = tokio::spawn(async move {
        run_session_loop(controller, rx, tx_for_loop, runner, ui).await
    });

    Session {
        handle: SessionHandle { tx },
        metrics,
        task,
    }
}

/// Set up logging. RUST_LOG overrides the default filter.
pub fn init_logging() {
    let default_filter = if cfg!(debug_assertions) {
        "warn,voicebot=debug"
    } else {
        "warn,voicebot=info"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}
