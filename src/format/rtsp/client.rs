use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::connection::Transport;
use super::session::{RtspSession, SessionHandle, SessionState};
use crate::pipeline::{Command, Component, Envelope, Pipeline};
use crate::{PipeError, Result};

/// Default size for transport receive buffers
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// How often the session gets a chance to send keepalives and expire requests
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable remote control for a running [`RtspClient`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    session: SessionHandle,
}

impl ClientHandle {
    /// Asks the session to start or resume playback.
    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    /// Asks the session to pause.
    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    /// Asks the session to tear down and close.
    pub async fn teardown(&self) -> Result<()> {
        self.send(Command::Teardown).await
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The session's own handle.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PipeError::Pipeline("client is no longer running".into()))
    }
}

/// Drives a pipeline headed by an [`RtspSession`] over a [`Transport`].
///
/// Bytes read from the transport enter the pipeline forward; whatever the
/// session emits upstream is written back. The loop ends when the session
/// closes, or with the first fatal error.
pub struct RtspClient<T> {
    transport: T,
    pipeline: Pipeline,
    session: SessionHandle,
    commands: mpsc::Receiver<Command>,
    command_tx: mpsc::Sender<Command>,
    buffer_size: usize,
    tick_interval: Duration,
}

impl<T: Transport> RtspClient<T> {
    /// A client that runs `session` over `transport`.
    pub fn new(transport: T, session: RtspSession) -> Self {
        let handle = session.handle();
        let (command_tx, commands) = mpsc::channel(16);
        Self {
            transport,
            pipeline: Pipeline::new().then(session),
            session: handle,
            commands,
            command_tx,
            buffer_size: DEFAULT_BUFFER_SIZE,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Appends a stage after the session and any stages added before it.
    pub fn then<C: Component + 'static>(mut self, component: C) -> Self {
        self.pipeline.push(Box::new(component));
        self
    }

    /// Bytes read from the transport per call.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// How often the pipeline's tick hooks run.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// A handle for sending commands while [`RtspClient::run`] is running.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            commands: self.command_tx.clone(),
            session: self.session.clone(),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The pipeline the client drives.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Mutable access, for splicing stages in or out.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Negotiates, streams until teardown, then closes every stage.
    pub async fn run(&mut self) -> Result<()> {
        if self.state() == SessionState::Init {
            let res = self
                .pipeline
                .push_reverse(Envelope::Control(Command::Play))
                .await;
            self.after_event(res).await?;
        }

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; self.buffer_size];
        let mut commands_open = true;

        while !matches!(self.state(), SessionState::Closed | SessionState::Failed) {
            let res = tokio::select! {
                read = self.transport.read(&mut buf) => match read {
                    Ok(0) if self.session.state() == SessionState::Teardown => {
                        info!("server closed the connection during teardown");
                        break;
                    }
                    Ok(0) => Err(PipeError::Transport("connection closed by peer".into())),
                    Ok(n) => {
                        trace!("read {} bytes", n);
                        self.pipeline
                            .push_forward(Envelope::Raw(Bytes::copy_from_slice(&buf[..n])))
                            .await
                    }
                    Err(e) => Err(e),
                },
                now = ticker.tick() => self.pipeline.tick(now).await,
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        debug!("application command: {:?}", command);
                        self.pipeline.push_reverse(Envelope::Control(command)).await
                    }
                    None => {
                        commands_open = false;
                        Ok(())
                    }
                },
            };
            self.after_event(res).await?;
        }

        if self.state() == SessionState::Failed {
            return Err(PipeError::Session("session failed".into()));
        }
        self.shutdown().await
    }

    /// Writes pending requests, logs soft errors and reacts to end of stream.
    async fn after_event(&mut self, res: Result<()>) -> Result<()> {
        let res = match res {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        };
        for err in self.pipeline.take_errors() {
            warn!("pipeline: {}", err);
        }

        let mut finished = false;
        for envelope in self.pipeline.take_downstream() {
            match envelope {
                Envelope::EndOfStream => finished = true,
                other => trace!("unconsumed {} envelope at the tail", other.message_type()),
            }
        }

        if let Err(e) = res {
            self.flush().await?;
            // The session already failed; this only releases the other stages.
            if let Err(close_err) = self.pipeline.close().await {
                debug!("close after failure: {}", close_err);
            }
            if let Err(close_err) = self.transport.close().await {
                debug!("transport close after failure: {}", close_err);
            }
            return Err(e);
        }

        if finished && matches!(self.state(), SessionState::Playing | SessionState::Setup) {
            info!("all tracks ended; tearing down");
            self.pipeline
                .push_reverse(Envelope::Control(Command::Teardown))
                .await?;
        }
        self.flush().await
    }

    async fn flush(&mut self) -> Result<()> {
        for envelope in self.pipeline.take_upstream() {
            if let Envelope::Raw(data) = envelope {
                self.transport.write_all(&data).await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let res = self.pipeline.close().await;
        // A peer that already hung up cannot take the TEARDOWN.
        if let Err(e) = self.flush().await {
            debug!("flush on shutdown: {}", e);
        }
        self.pipeline.take_downstream();
        if let Err(e) = self.transport.close().await {
            debug!("transport close: {}", e);
        }
        info!("RTSP client stopped");
        res
    }
}
