//! The conversation controller — owns the session and runs every cycle.
//!
//! The controller is an actor: one tokio task owns all session state and
//! reacts to [`ControllerCommand`]s from a [`ControllerHandle`] and to reports
//! from the tasks it spawns (the model request, the typing stream, the
//! utterance, the dictation and the follow-up timer). Nothing else touches
//! the state, so it needs no lock.
//!
//! Invariants:
//! - one generation request in flight at most; `submit` while busy is dropped
//! - every finished request clears `busy`, and a user cycle arms exactly one
//!   follow-up (a follow-up cycle never arms another)
//! - one typing stream at a time; a new reply cancels the previous stream

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{GenerationError, SpeechError};
use crate::prompts;
use crate::providers::{Generation, HttpGenerator, TextGenerator};
use crate::render::Renderer;
use crate::scheduler::FollowUpScheduler;
use crate::speech::{CommandRecognizer, CommandSpeech, SilentSpeech, SpeechInput, SpeechOutput};
use crate::types::{CycleKind, MessageId, Phase, SessionSnapshot, Voice};
use crate::typing::{self, TypingOutcome};

/// Messages that can be sent TO the controller.
#[derive(Debug)]
pub enum ControllerCommand {
    Submit(String),
    Stop,
    Dictate,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Utterance lifecycle, reported by the speech task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Finished,
}

/// Reports from spawned work back to the actor.
enum Internal {
    Generated {
        cycle: u64,
        kind: CycleKind,
        message: MessageId,
        result: Result<Generation, GenerationError>,
    },
    TypingDone {
        stream: u64,
        outcome: TypingOutcome,
    },
    Speech {
        utterance: u64,
        event: SpeechEvent,
    },
    Heard(Result<String, SpeechError>),
}

/// Timing and voice knobs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub typing_interval: Duration,
    pub follow_up_delay: Duration,
    pub voice: Voice,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            typing_interval: config.typing_interval(),
            follow_up_delay: config.follow_up_delay(),
            voice: config.voice(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// External capabilities the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub speech_out: Arc<dyn SpeechOutput>,
    pub speech_in: Option<Arc<dyn SpeechInput>>,
    pub renderer: Arc<dyn Renderer>,
}

struct Cycle {
    id: u64,
    kind: CycleKind,
    cancel: CancellationToken,
    request: JoinHandle<()>,
}

struct ActiveStream {
    id: u64,
    message: MessageId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Utterance {
    id: u64,
    task: JoinHandle<()>,
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    pub async fn submit(&self, text: impl Into<String>) {
        self.send(ControllerCommand::Submit(text.into())).await;
    }

    pub async fn stop(&self) {
        self.send(ControllerCommand::Stop).await;
    }

    pub async fn dictate(&self) {
        self.send(ControllerCommand::Dictate).await;
    }

    /// Current session state, or `None` once the controller has shut down.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerCommand::Snapshot(tx)).await;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        self.send(ControllerCommand::Shutdown).await;
    }

    async fn send(&self, command: ControllerCommand) {
        if self.command_tx.send(command).await.is_err() {
            debug!("controller is gone, command dropped");
        }
    }
}

/// The controller. Runs as an independent tokio task.
pub struct Controller {
    settings: Settings,
    generator: Arc<dyn TextGenerator>,
    speech_out: Arc<dyn SpeechOutput>,
    speech_in: Option<Arc<dyn SpeechInput>>,
    renderer: Arc<dyn Renderer>,

    // Session state
    pending_user_text: Option<String>,
    busy: bool,
    cancel_requested: bool,
    cycles: u64,
    cycle: Option<Cycle>,
    typing: Option<ActiveStream>,
    streams: u64,
    speech: Option<Utterance>,
    utterances: u64,
    listener: Option<JoinHandle<()>>,
    follow_up: FollowUpScheduler,

    command_tx: Option<mpsc::Sender<ControllerCommand>>,
    command_rx: Option<mpsc::Receiver<ControllerCommand>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    follow_up_rx: Option<mpsc::UnboundedReceiver<u64>>,
}

impl Controller {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (follow_up, follow_up_rx) = FollowUpScheduler::new(settings.follow_up_delay);

        Self {
            settings,
            generator: collaborators.generator,
            speech_out: collaborators.speech_out,
            speech_in: collaborators.speech_in,
            renderer: collaborators.renderer,
            pending_user_text: None,
            busy: false,
            cancel_requested: false,
            cycles: 0,
            cycle: None,
            typing: None,
            streams: 0,
            speech: None,
            utterances: 0,
            listener: None,
            follow_up,
            command_tx: Some(command_tx),
            command_rx: Some(command_rx),
            internal_tx,
            internal_rx: Some(internal_rx),
            follow_up_rx: Some(follow_up_rx),
        }
    }

    /// Build a controller with the HTTP generator and command-line speech drivers.
    pub fn from_config(config: &Config, renderer: Arc<dyn Renderer>) -> anyhow::Result<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(HttpGenerator::new(config)?);

        let speech_out: Arc<dyn SpeechOutput> = if config.speech.enabled {
            Arc::new(CommandSpeech::new(config.speech.command.clone()))
        } else {
            Arc::new(SilentSpeech)
        };

        let speech_in = config
            .speech
            .recognizer_command
            .clone()
            .map(|cmd| Arc::new(CommandRecognizer::new(cmd)) as Arc<dyn SpeechInput>);

        Ok(Self::new(
            Settings::from_config(config),
            Collaborators {
                generator,
                speech_out,
                speech_in,
                renderer,
            },
        ))
    }

    /// Handles keep the controller alive: once all are dropped, `run` returns.
    pub fn handle(&self) -> ControllerHandle {
        // Only `run` clears the sender, and it consumes the controller.
        let command_tx = self
            .command_tx
            .clone()
            .unwrap_or_else(|| mpsc::channel(1).0);
        ControllerHandle { command_tx }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            busy: self.busy,
            cancel_requested: self.cancel_requested,
            pending_user_text: self.pending_user_text.clone(),
            typing_active: self.typing.is_some(),
            follow_up_armed: self.follow_up.is_armed(),
            listening: self.listener.is_some(),
            cycles: self.cycles,
        }
    }

    fn phase(&self) -> Phase {
        if self.busy {
            Phase::Requesting
        } else if let Some(stream) = &self.typing {
            if stream.cancel.is_cancelled() {
                Phase::Interrupted
            } else {
                Phase::Rendering
            }
        } else {
            Phase::Idle
        }
    }

    fn publish_status(&self) {
        self.renderer.status(&self.snapshot());
    }

    // ── Main loop ──

    pub async fn run(mut self) {
        let (Some(mut command_rx), Some(mut internal_rx), Some(mut follow_up_rx)) = (
            self.command_rx.take(),
            self.internal_rx.take(),
            self.follow_up_rx.take(),
        ) else {
            error!("controller started twice");
            return;
        };
        self.command_tx = None;

        info!("controller ready");
        self.publish_status();

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ControllerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(report) = internal_rx.recv() => self.handle_internal(report),
                Some(generation) = follow_up_rx.recv() => self.on_follow_up_due(generation),
            }
        }

        self.teardown();
        info!("controller stopped");
    }

    fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::Submit(text) => self.submit(&text),
            ControllerCommand::Stop => self.stop(),
            ControllerCommand::Dictate => self.dictate(),
            ControllerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ControllerCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, report: Internal) {
        match report {
            Internal::Generated {
                cycle,
                kind,
                message,
                result,
            } => self.on_generated(cycle, kind, message, result),
            Internal::TypingDone { stream, outcome } => self.on_typing_done(stream, outcome),
            Internal::Speech { utterance, event } => self.on_speech(utterance, event),
            Internal::Heard(result) => self.on_heard(result),
        }
    }

    // ── Operations ──

    fn submit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.busy {
            debug!("busy, dropping submission");
            return;
        }

        self.busy = true;
        self.cancel_requested = false;
        self.follow_up.cancel();
        self.pending_user_text = Some(text.to_string());

        self.renderer.render_outgoing(text);
        let message = self.renderer.render_incoming_placeholder();
        self.start_cycle(CycleKind::User, text.to_string(), message);
        self.publish_status();
    }

    fn stop(&mut self) {
        self.cancel_requested = true;
        if let Some(cycle) = &self.cycle {
            cycle.cancel.cancel();
        }
        if let Some(stream) = &self.typing {
            stream.cancel.cancel();
        }
        if let Some(utterance) = self.speech.take() {
            utterance.task.abort();
        }
        info!("stop requested");
        self.publish_status();
    }

    fn dictate(&mut self) {
        let Some(recognizer) = self.speech_in.clone() else {
            self.renderer.notify(prompts::SPEECH_INPUT_UNAVAILABLE);
            return;
        };
        if self.listener.is_some() {
            debug!("already listening");
            return;
        }

        let locale = self.settings.voice.locale.clone();
        let tx = self.internal_tx.clone();
        self.listener = Some(tokio::spawn(async move {
            // Inner task so a panicking recognizer still reports back.
            let result = match tokio::spawn(async move { recognizer.listen(&locale).await }).await
            {
                Ok(result) => result,
                Err(e) => Err(SpeechError::Task(e.to_string())),
            };
            let _ = tx.send(Internal::Heard(result));
        }));
        self.publish_status();
    }

    // ── Cycle ──

    fn start_cycle(&mut self, kind: CycleKind, prompt: String, message: MessageId) {
        self.cycles += 1;
        let id = self.cycles;
        info!("cycle {} ({:?}) requesting", id, kind);

        let generator = self.generator.clone();
        let tx = self.internal_tx.clone();
        let request = tokio::spawn(async move {
            // Inner task so a panicking generator still reports back.
            let result = match tokio::spawn(async move { generator.generate(&prompt).await }).await
            {
                Ok(result) => result,
                Err(e) => Err(GenerationError::Task(e.to_string())),
            };
            let _ = tx.send(Internal::Generated {
                cycle: id,
                kind,
                message,
                result,
            });
        });

        self.cycle = Some(Cycle {
            id,
            kind,
            cancel: CancellationToken::new(),
            request,
        });
    }

    fn on_generated(
        &mut self,
        cycle_id: u64,
        kind: CycleKind,
        message: MessageId,
        result: Result<Generation, GenerationError>,
    ) {
        let cancel = match &self.cycle {
            Some(cycle) if cycle.id == cycle_id => cycle.cancel.clone(),
            _ => {
                warn!("discarding result of stale cycle {}", cycle_id);
                return;
            }
        };

        let reply = match (kind, result) {
            (_, Ok(Generation::Text(text))) => Some(text),
            (CycleKind::User, Ok(Generation::Empty)) => {
                warn!("cycle {}: empty response", cycle_id);
                self.renderer.set_incoming_text(message, prompts::EMPTY_REPLY);
                None
            }
            (CycleKind::FollowUp, Ok(Generation::Empty)) => {
                warn!("cycle {}: empty follow-up, using default check-in", cycle_id);
                Some(prompts::DEFAULT_CHECK_IN.to_string())
            }
            (CycleKind::User, Err(e)) => {
                error!("API error: {}", e);
                self.renderer.set_incoming_text(message, prompts::CONNECTION_ERROR);
                None
            }
            (CycleKind::FollowUp, Err(e)) => {
                error!("Follow-up API error: {}", e);
                self.renderer.set_incoming_text(message, prompts::FOLLOW_UP_ERROR);
                None
            }
        };

        match reply {
            Some(text) => self.render_reply(message, text, &cancel),
            None => self.renderer.finalize_incoming(message),
        }

        // Cleanup runs for every outcome.
        self.busy = false;
        if kind == CycleKind::User {
            self.follow_up.arm();
        }
        info!("cycle {} done", cycle_id);
        self.publish_status();
    }

    fn render_reply(&mut self, message: MessageId, text: String, cycle_cancel: &CancellationToken) {
        self.renderer.begin_streaming(message);
        if cycle_cancel.is_cancelled() {
            debug!("reply for {} arrived after stop", message);
        } else {
            self.start_speech(text.clone());
        }
        self.start_typing(message, text, cycle_cancel);
    }

    // ── Typing ──

    fn start_typing(&mut self, message: MessageId, text: String, cycle_cancel: &CancellationToken) {
        if let Some(previous) = self.typing.take() {
            debug!("stream {} superseded", previous.id);
            previous.cancel.cancel();
        }

        self.streams += 1;
        let stream = self.streams;
        let cancel = cycle_cancel.child_token();

        let renderer = self.renderer.clone();
        let interval = self.settings.typing_interval;
        let token = cancel.clone();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = typing::type_out(&*renderer, message, &text, interval, &token).await;
            let _ = tx.send(Internal::TypingDone { stream, outcome });
        });

        self.typing = Some(ActiveStream {
            id: stream,
            message,
            cancel,
            task,
        });
    }

    fn on_typing_done(&mut self, stream: u64, outcome: TypingOutcome) {
        match &self.typing {
            Some(active) if active.id == stream => {
                info!("stream {} for {} ended: {:?}", stream, active.message, outcome);
                self.typing = None;
                self.publish_status();
            }
            _ => debug!("superseded stream {} ended: {:?}", stream, outcome),
        }
    }

    // ── Speech ──

    fn start_speech(&mut self, text: String) {
        if let Some(previous) = self.speech.take() {
            previous.task.abort();
        }

        self.utterances += 1;
        let utterance = self.utterances;
        let speech_out = self.speech_out.clone();
        let voice = self.settings.voice.clone();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let _ = tx.send(Internal::Speech {
                utterance,
                event: SpeechEvent::Started,
            });
            if let Err(e) = speech_out.speak(&text, &voice).await {
                warn!("speech output failed: {}", e);
            }
            let _ = tx.send(Internal::Speech {
                utterance,
                event: SpeechEvent::Finished,
            });
        });

        self.speech = Some(Utterance {
            id: utterance,
            task,
        });
    }

    fn on_speech(&mut self, utterance: u64, event: SpeechEvent) {
        debug!("utterance {} {:?}", utterance, event);
        // Lifecycle notifications only reset the stop bookkeeping.
        self.cancel_requested = false;
        if event == SpeechEvent::Finished
            && self.speech.as_ref().is_some_and(|u| u.id == utterance)
        {
            self.speech = None;
        }
    }

    // ── Dictation ──

    fn on_heard(&mut self, result: Result<String, SpeechError>) {
        self.listener = None;
        match result {
            Ok(transcript) => {
                info!("Recognized text: {}", transcript);
                self.renderer.fill_input(&transcript);
                self.submit(&transcript);
            }
            Err(e) => {
                error!("Speech recognition error: {}", e);
                self.renderer.notify(prompts::SPEECH_NOT_RECOGNIZED);
            }
        }
        self.publish_status();
    }

    // ── Follow-up ──

    fn on_follow_up_due(&mut self, generation: u64) {
        if !self.follow_up.take_fired(generation) {
            debug!("ignoring stale follow-up {}", generation);
            return;
        }
        if self.busy {
            debug!("busy, skipping follow-up {}", generation);
            return;
        }
        let Some(user_text) = self.pending_user_text.clone() else {
            return;
        };

        info!("follow-up {} firing", generation);
        self.busy = true;
        let message = self.renderer.render_incoming_placeholder();
        self.start_cycle(CycleKind::FollowUp, prompts::follow_up_prompt(&user_text), message);
        self.publish_status();
    }

    fn teardown(&mut self) {
        self.follow_up.cancel();
        if let Some(cycle) = self.cycle.take() {
            cycle.cancel.cancel();
            cycle.request.abort();
            debug!("cycle {} ({:?}) torn down", cycle.id, cycle.kind);
        }
        if let Some(stream) = self.typing.take() {
            stream.cancel.cancel();
            stream.task.abort();
        }
        if let Some(utterance) = self.speech.take() {
            utterance.task.abort();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Transcript;
    use crate::types::{Direction, RenderState};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // ── Fakes ──

    #[derive(Default)]
    struct FakeGenerator {
        script: Mutex<VecDeque<Result<Generation, GenerationError>>>,
        prompts: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FakeGenerator {
        fn scripted(script: Vec<Result<Generation, GenerationError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Generation::Text("ok".into())))
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        started: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
        duration: Duration,
    }

    #[async_trait]
    impl SpeechOutput for RecordingSpeech {
        async fn speak(&self, text: &str, _voice: &Voice) -> Result<(), SpeechError> {
            self.started.lock().unwrap().push(text.to_string());
            tokio::time::sleep(self.duration).await;
            self.finished.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct FakeRecognizer(Mutex<Option<Result<String, SpeechError>>>);

    #[async_trait]
    impl SpeechInput for FakeRecognizer {
        async fn listen(&self, _locale: &str) -> Result<String, SpeechError> {
            self.0.lock().unwrap().take().unwrap_or(Err(SpeechError::NoMatch))
        }
    }

    struct Rig {
        handle: ControllerHandle,
        transcript: Arc<Transcript>,
        generator: Arc<FakeGenerator>,
        speech: Arc<RecordingSpeech>,
    }

    impl Rig {
        async fn snapshot(&self) -> SessionSnapshot {
            self.handle.snapshot().await.unwrap()
        }

        fn incoming(&self) -> Vec<crate::types::ChatMessage> {
            self.transcript
                .messages()
                .into_iter()
                .filter(|m| m.direction == Direction::Incoming)
                .collect()
        }

        fn outgoing_count(&self) -> usize {
            self.transcript
                .messages()
                .iter()
                .filter(|m| m.direction == Direction::Outgoing)
                .count()
        }
    }

    fn rig_with(
        generator: FakeGenerator,
        speech: RecordingSpeech,
        recognizer: Option<Result<String, SpeechError>>,
    ) -> Rig {
        let transcript = Arc::new(Transcript::new());
        let generator = Arc::new(generator);
        let speech = Arc::new(speech);
        let speech_in = recognizer
            .map(|r| Arc::new(FakeRecognizer(Mutex::new(Some(r)))) as Arc<dyn SpeechInput>);

        let controller = Controller::new(
            Settings {
                typing_interval: Duration::from_millis(30),
                follow_up_delay: Duration::from_secs(60),
                voice: Voice::default(),
            },
            Collaborators {
                generator: generator.clone(),
                speech_out: speech.clone(),
                speech_in,
                renderer: transcript.clone(),
            },
        );
        let handle = controller.handle();
        tokio::spawn(controller.run());

        Rig {
            handle,
            transcript,
            generator,
            speech,
        }
    }

    fn rig(script: Vec<Result<Generation, GenerationError>>) -> Rig {
        rig_with(FakeGenerator::scripted(script), RecordingSpeech::default(), None)
    }

    fn text(s: &str) -> Result<Generation, GenerationError> {
        Ok(Generation::Text(s.to_string()))
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    // ── Scenarios ──

    #[tokio::test(start_paused = true)]
    async fn test_hello_round_trip_then_follow_up() {
        let rig = rig(vec![text("Hi there"), text("How's it going?")]);

        rig.handle.submit("Hello").await;
        settle(1_000).await;

        let incoming = rig.incoming();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].text, "Hi there");
        assert_eq!(incoming[0].render_state, RenderState::Complete);
        assert_eq!(*rig.speech.started.lock().unwrap(), vec!["Hi there"]);

        let snap = rig.snapshot().await;
        assert!(!snap.busy);
        assert!(snap.follow_up_armed);
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.pending_user_text.as_deref(), Some("Hello"));

        settle(60_000).await;
        let prompts = rig.generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], prompts::follow_up_prompt("Hello"));

        settle(1_000).await;
        let incoming = rig.incoming();
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[1].text, "How's it going?");
        assert_eq!(
            rig.speech.started.lock().unwrap().last().map(String::as_str),
            Some("How's it going?")
        );

        // One-shot: nothing re-armed after the follow-up.
        let snap = rig.snapshot().await;
        assert!(!snap.follow_up_armed);
        assert!(!snap.busy);
        settle(300_000).await;
        assert_eq!(rig.generator.prompts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_renders_error_and_arms_follow_up() {
        let rig = rig(vec![Err(GenerationError::Status {
            status: 503,
            body: "unavailable".into(),
        })]);

        rig.handle.submit("X").await;
        settle(10).await;

        let incoming = rig.incoming();
        assert_eq!(incoming[0].text, prompts::CONNECTION_ERROR);
        assert_eq!(incoming[0].render_state, RenderState::Complete);
        assert!(rig.speech.started.lock().unwrap().is_empty());

        let snap = rig.snapshot().await;
        assert!(!snap.busy);
        assert!(snap.follow_up_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_renders_fallback() {
        let rig = rig(vec![Ok(Generation::Empty)]);

        rig.handle.submit("Y").await;
        settle(10).await;

        let incoming = rig.incoming();
        assert_eq!(incoming[0].text, prompts::EMPTY_REPLY);
        assert_eq!(incoming[0].render_state, RenderState::Complete);
        let snap = rig.snapshot().await;
        assert!(!snap.busy);
        assert!(snap.follow_up_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_generator_still_cleans_up() {
        struct Exploding;

        #[async_trait]
        impl TextGenerator for Exploding {
            async fn generate(&self, _prompt: &str) -> Result<Generation, GenerationError> {
                panic!("boom");
            }
        }

        let transcript = Arc::new(Transcript::new());
        let controller = Controller::new(
            Settings::default(),
            Collaborators {
                generator: Arc::new(Exploding),
                speech_out: Arc::new(SilentSpeech),
                speech_in: None,
                renderer: transcript.clone(),
            },
        );
        let handle = controller.handle();
        tokio::spawn(controller.run());

        handle.submit("boom").await;
        settle(10).await;

        let snap = handle.snapshot().await.unwrap();
        assert!(!snap.busy);
        assert!(snap.follow_up_armed);
        assert_eq!(transcript.messages()[1].text, prompts::CONNECTION_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_busy_is_dropped() {
        let rig = rig_with(
            FakeGenerator::scripted(vec![text("first")]).with_delay(Duration::from_secs(1)),
            RecordingSpeech::default(),
            None,
        );

        rig.handle.submit("A").await;
        rig.handle.submit("B").await;

        let snap = rig.snapshot().await;
        assert!(snap.busy);
        assert_eq!(snap.phase, Phase::Requesting);
        assert_eq!(snap.pending_user_text.as_deref(), Some("A"));
        assert_eq!(rig.outgoing_count(), 1);

        settle(2_000).await;
        assert_eq!(rig.generator.prompts(), vec!["A"]);
        assert_eq!(rig.incoming().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_submission_is_ignored() {
        let rig = rig(vec![]);
        rig.handle.submit("   ").await;
        settle(10).await;
        assert!(rig.transcript.messages().is_empty());
        assert!(rig.generator.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_stream_keeps_text_and_next_submit_works() {
        let rig = rig(vec![text("abcdefghijklmnop"), text("next")]);

        rig.handle.submit("Z").await;
        settle(100).await;
        rig.handle.stop().await;

        let snap = rig.snapshot().await;
        assert!(snap.cancel_requested);
        assert!(!snap.busy);
        assert!(snap.follow_up_armed, "stop must not cancel the follow-up");

        let halted = rig.incoming()[0].text.clone();
        assert!(!halted.is_empty());
        assert!("abcdefghijklmnop".starts_with(&halted));
        assert!(halted.len() < "abcdefghijklmnop".len());

        settle(1_000).await;
        let first = &rig.incoming()[0];
        assert_eq!(first.text, halted);
        assert_eq!(first.render_state, RenderState::Complete);
        assert_eq!(rig.snapshot().await.phase, Phase::Idle);

        rig.handle.submit("again").await;
        settle(1_000).await;
        assert_eq!(rig.generator.prompts(), vec!["Z", "again"]);
        assert_eq!(rig.incoming()[1].text, "next");
        assert!(!rig.snapshot().await.cancel_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let rig = rig(vec![]);
        rig.handle.stop().await;

        let snap = rig.snapshot().await;
        assert!(snap.cancel_requested);
        assert!(!snap.busy);
        assert!(!snap.follow_up_armed);
        assert_eq!(snap.phase, Phase::Idle);
        assert!(rig.transcript.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_speech() {
        let rig = rig_with(
            FakeGenerator::scripted(vec![text("a long spoken reply")]),
            RecordingSpeech {
                duration: Duration::from_secs(10),
                ..RecordingSpeech::default()
            },
            None,
        );

        rig.handle.submit("talk").await;
        settle(100).await;
        assert_eq!(rig.speech.started.lock().unwrap().len(), 1);

        rig.handle.stop().await;
        settle(20_000).await;
        assert!(rig.speech.finished.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_request_suppresses_reply() {
        let rig = rig_with(
            FakeGenerator::scripted(vec![text("too late")]).with_delay(Duration::from_secs(1)),
            RecordingSpeech::default(),
            None,
        );

        rig.handle.submit("Q").await;
        rig.handle.stop().await;
        let snap = rig.snapshot().await;
        assert!(snap.busy, "stop does not reset busy");

        settle(2_000).await;
        let incoming = rig.incoming();
        assert!(incoming[0].text.is_empty());
        assert_eq!(incoming[0].render_state, RenderState::Complete);
        assert!(rig.speech.started.lock().unwrap().is_empty());
        let snap = rig.snapshot().await;
        assert!(!snap.busy);
        assert!(snap.follow_up_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_reply_supersedes_running_stream() {
        let long = "x".repeat(100);
        let rig = rig(vec![text(&long), text("short")]);

        rig.handle.submit("first").await;
        settle(100).await;
        rig.handle.submit("second").await;
        settle(1_000).await;

        let incoming = rig.incoming();
        assert_eq!(incoming.len(), 2);
        assert!(incoming[0].text.len() < long.len());
        assert_eq!(incoming[0].render_state, RenderState::Complete);
        assert_eq!(incoming[1].text, "short");

        settle(5_000).await;
        assert!(rig.incoming()[0].text.len() < long.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_submit_replaces_armed_follow_up() {
        let rig = rig(vec![text("one"), text("two"), text("check-in")]);

        rig.handle.submit("A").await;
        settle(30_000).await;
        rig.handle.submit("B").await;
        settle(31_000).await;
        // A's follow-up would have fired by now.
        assert_eq!(rig.generator.prompts(), vec!["A", "B"]);
        assert!(rig.snapshot().await.follow_up_armed);

        settle(30_000).await;
        let prompts = rig.generator.prompts();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[2], prompts::follow_up_prompt("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_fallbacks() {
        let empty = rig(vec![text("hi"), Ok(Generation::Empty)]);
        empty.handle.submit("A").await;
        settle(61_000).await;
        settle(5_000).await;
        assert_eq!(empty.incoming()[1].text, prompts::DEFAULT_CHECK_IN);

        let failing = rig(vec![
            text("hi"),
            Err(GenerationError::Task("gone".into())),
        ]);
        failing.handle.submit("A").await;
        settle(61_000).await;
        let incoming = failing.incoming();
        assert_eq!(incoming[1].text, prompts::FOLLOW_UP_ERROR);
        assert_eq!(incoming[1].render_state, RenderState::Complete);
        assert!(!failing.snapshot().await.follow_up_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictation_submits_transcript() {
        let rig = rig_with(
            FakeGenerator::scripted(vec![text("heard you")]),
            RecordingSpeech::default(),
            Some(Ok("hello from voice".into())),
        );

        rig.handle.dictate().await;
        settle(1_000).await;

        let messages = rig.transcript.messages();
        assert_eq!(messages[0].direction, Direction::Outgoing);
        assert_eq!(messages[0].text, "hello from voice");
        assert_eq!(rig.generator.prompts(), vec!["hello from voice"]);
        assert!(!rig.snapshot().await.listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictation_failure_notifies() {
        let rig = rig_with(
            FakeGenerator::default(),
            RecordingSpeech::default(),
            Some(Err(SpeechError::NoMatch)),
        );
        rig.transcript.fill_input("draft");

        rig.handle.dictate().await;
        settle(10).await;

        assert_eq!(rig.transcript.notices(), vec![prompts::SPEECH_NOT_RECOGNIZED]);
        assert_eq!(rig.transcript.input(), "draft");
        assert!(rig.transcript.messages().is_empty());
        assert!(!rig.snapshot().await.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictation_without_recognizer() {
        let rig = rig(vec![]);
        rig.handle.dictate().await;
        settle(10).await;
        assert_eq!(
            rig.transcript.notices(),
            vec![prompts::SPEECH_INPUT_UNAVAILABLE]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_loop() {
        let rig = rig(vec![text("bye")]);
        rig.handle.submit("A").await;
        settle(10).await;
        rig.handle.shutdown().await;
        settle(10).await;
        assert!(rig.handle.snapshot().await.is_none());

        // The armed follow-up died with the controller.
        settle(120_000).await;
        assert_eq!(rig.generator.prompts(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_moves_through_rendering_and_interrupted() {
        let rig = rig(vec![text("abcdefghijklmnop")]);

        rig.handle.submit("Z").await;
        settle(100).await;
        let snap = rig.snapshot().await;
        assert_eq!(snap.phase, Phase::Rendering);
        assert!(snap.typing_active);
        assert!(!snap.busy);

        rig.handle.stop().await;
        let snap = rig.snapshot().await;
        assert_eq!(snap.phase, Phase::Interrupted);
        assert!(snap.typing_active);

        settle(100).await;
        let snap = rig.snapshot().await;
        assert_eq!(snap.phase, Phase::Idle);
        assert!(!snap.typing_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_lifecycle_clears_cancel_requested() {
        let rig = rig(vec![text("hi"), text("checking in")]);

        rig.handle.submit("A").await;
        settle(1_000).await;
        rig.handle.stop().await;
        assert!(rig.snapshot().await.cancel_requested);

        // Nothing speaks until the follow-up, so the flag stays set.
        settle(58_000).await;
        assert!(rig.snapshot().await.cancel_requested);

        settle(3_000).await;
        assert_eq!(rig.speech.started.lock().unwrap().len(), 2);
        assert_eq!(rig.outgoing_count(), 1);
        assert!(!rig.snapshot().await.cancel_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_recognizer_notifies_and_recovers() {
        struct Exploding;

        #[async_trait]
        impl SpeechInput for Exploding {
            async fn listen(&self, _locale: &str) -> Result<String, SpeechError> {
                panic!("microphone gone");
            }
        }

        let transcript = Arc::new(Transcript::new());
        let controller = Controller::new(
            Settings::default(),
            Collaborators {
                generator: Arc::new(FakeGenerator::default()),
                speech_out: Arc::new(SilentSpeech),
                speech_in: Some(Arc::new(Exploding)),
                renderer: transcript.clone(),
            },
        );
        let handle = controller.handle();
        tokio::spawn(controller.run());

        handle.dictate().await;
        settle(10).await;
        assert_eq!(transcript.notices(), vec![prompts::SPEECH_NOT_RECOGNIZED]);
        assert!(!handle.snapshot().await.unwrap().listening);

        handle.dictate().await;
        settle(10).await;
        assert_eq!(transcript.notices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_every_handle_ends_loop() {
        let generator = Arc::new(FakeGenerator::scripted(vec![text("bye")]));
        let controller = Controller::new(
            Settings::default(),
            Collaborators {
                generator: generator.clone(),
                speech_out: Arc::new(SilentSpeech),
                speech_in: None,
                renderer: Arc::new(Transcript::new()),
            },
        );
        let handle = controller.handle();
        let task = tokio::spawn(controller.run());

        handle.submit("A").await;
        settle(1_000).await;
        drop(handle);
        task.await.unwrap();

        settle(120_000).await;
        assert_eq!(generator.prompts(), vec!["A"]);
    }
}
