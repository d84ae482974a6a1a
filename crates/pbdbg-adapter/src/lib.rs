//! Editor-facing adapter: the stable, small command vocabulary of
//! `spec.md` §4.6/§6. Never touches the transport or frame codec directly
//! — it composes `pbdbg-engine` operations and translates between its
//! `Event`s and the adapter's own request/event vocabulary.
//!
//! Because requests and engine I/O are driven from a single cooperative
//! task (`spec.md` §5), [`Adapter::handle_request`] resolves and returns
//! its response event directly rather than routing it through a
//! correlation-id keyed map of channels — there is never more than one
//! request outstanding at a time, so the map the ambient design sketches
//! would hold at most one entry. See `DESIGN.md`.

mod error;
mod protocol;

pub use error::AdapterError;
pub use protocol::{AdapterEvent, AdapterRequest, CorrelationId};

use pbdbg_engine::{Engine, EngineConfig, Event, StepKind};
use pbdbg_launcher::{DebuggeeOptions, LauncherConfig};
use pbdbg_session::Session;
use pbdbg_transport::TransportConfig;
use tokio::process::Child;

/// Drives zero-or-one live debug sessions on behalf of one editor
/// connection. `Launch` creates the session; every other request requires
/// one to already be active.
pub struct Adapter {
    engine: Option<Engine>,
    child: Option<Child>,
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter {
    pub fn new() -> Self {
        Self { engine: None, child: None }
    }

    /// Build an adapter around an already-handshaken engine, bypassing
    /// `Launch` and the real process launcher. Used by `pbdbg-testkit`'s
    /// fixture-debuggee scenarios, which connect an [`Engine`] to an
    /// in-memory transport pair directly.
    pub fn from_engine(engine: Engine) -> Self {
        Self { engine: Some(engine), child: None }
    }

    /// Handle one request to completion, returning the event the editor
    /// should treat as its response (carrying the same correlation id).
    pub async fn handle_request(&mut self, request: AdapterRequest) -> AdapterEvent {
        let correlation_id = request.correlation_id();
        match self.dispatch(request).await {
            Ok(Some(event)) => event,
            Ok(None) => AdapterEvent::Ack { correlation_id },
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                AdapterEvent::Error {
                    correlation_id: Some(correlation_id),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn dispatch(&mut self, request: AdapterRequest) -> Result<Option<AdapterEvent>, AdapterError> {
        match request {
            AdapterRequest::Launch {
                exe_path,
                args,
                unicode,
                stop_on_entry,
                stop_on_end,
                big_endian,
                ..
            } => {
                let options = DebuggeeOptions::with_overrides(unicode, stop_on_entry, stop_on_end, big_endian);
                self.launch(exe_path, args, options).await?;
                Ok(Some(AdapterEvent::Initialized))
            }
            AdapterRequest::SetBreakpoint { file, line, enabled, .. } => {
                self.engine_mut()?.set_breakpoint(file, line, enabled).await?;
                Ok(None)
            }
            AdapterRequest::Run { .. } => {
                self.engine_mut()?.run().await?;
                Ok(None)
            }
            AdapterRequest::StepInto { .. } => {
                self.engine_mut()?.step(StepKind::Into).await?;
                Ok(None)
            }
            AdapterRequest::StepOver { .. } => {
                self.engine_mut()?.step(StepKind::Over).await?;
                Ok(None)
            }
            AdapterRequest::StepOut { .. } => {
                self.engine_mut()?.step(StepKind::Out).await?;
                Ok(None)
            }
            AdapterRequest::Terminate { .. } => {
                self.engine_mut()?.terminate().await?;
                // The session is over; drop the engine and child handle so
                // the caller stops polling a transport that is now closed.
                self.engine = None;
                self.child = None;
                Ok(None)
            }
        }
    }

    /// Launch the debuggee directly, bypassing the `AdapterRequest::Launch`
    /// JSON round-trip. The CLI host uses this at startup so launch
    /// failures keep their [`AdapterError`] variant for exit-code mapping
    /// (`spec.md` §6) instead of being flattened into an `Error` event's
    /// message string.
    pub async fn launch(&mut self, exe_path: String, args: Vec<String>, options: DebuggeeOptions) -> Result<(), AdapterError> {
        let pipe_id = pbdbg_launcher::generate_pipe_id();
        let listening = pbdbg_transport::prepare(&pipe_id)?;

        let mut launcher_config = LauncherConfig::new(exe_path);
        launcher_config.args = args;
        launcher_config.options = options;

        let child = pbdbg_launcher::spawn(&launcher_config, &pipe_id)?;
        let transport_config = TransportConfig {
            connect_deadline: launcher_config.handshake_deadline,
        };
        let (reader, writer) = listening.accept(&transport_config).await?;

        let session = Session::new(pipe_id, "adapter".into());
        let mut engine = Engine::new(reader, writer, session, EngineConfig::default());
        engine.handshake().await?;

        self.engine = Some(engine);
        self.child = Some(child);
        Ok(())
    }

    fn engine_mut(&mut self) -> Result<&mut Engine, AdapterError> {
        self.engine
            .as_mut()
            .ok_or_else(|| AdapterError::Configuration("no active session; send Launch first".into()))
    }

    /// Await the next broadcast event from the active session's engine
    /// (program output, stop, exit). Pairs with [`Adapter::handle_request`]
    /// in the CLI's `tokio::select!` loop. `None` once there is no session.
    pub async fn next_engine_event(&mut self) -> Option<Result<AdapterEvent, AdapterError>> {
        let engine = self.engine.as_mut()?;
        Some(engine.next_event().await.map(translate).map_err(AdapterError::from))
    }
}

fn translate(event: Event) -> AdapterEvent {
    match event {
        Event::Output { text } => AdapterEvent::Output { channel: "debuggee".into(), text },
        Event::Stopped { file_index, line0 } => AdapterEvent::Stopped {
            reason: "stopped".into(),
            file: file_index,
            line: line0,
        },
        Event::Exited { exit_code } => AdapterEvent::Exited { code: exit_code },
        Event::Error { message } => AdapterEvent::Error { correlation_id: None, message },
        Event::Init { .. } | Event::ExeMode(_) | Event::Unknown { .. } => {
            tracing::debug!(?event, "internal event, not forwarded to the adapter");
            AdapterEvent::Output { channel: "engine".into(), text: String::new() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_launch_is_rejected() {
        let mut adapter = Adapter::new();
        assert!(adapter.engine_mut().is_err());
    }

    #[test]
    fn request_json_round_trips() {
        let request = AdapterRequest::SetBreakpoint {
            correlation_id: 7,
            file: 0,
            line: 9,
            enabled: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: AdapterRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.correlation_id(), 7);
    }

    #[test]
    fn event_json_round_trips() {
        let event = AdapterEvent::Stopped { reason: "breakpoint".into(), file: 0, line: 9 };
        let json = serde_json::to_string(&event).unwrap();
        let back: AdapterEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AdapterEvent::Stopped { file: 0, line: 9, .. }));
    }
}
