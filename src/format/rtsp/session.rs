use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::auth::{select_challenge, Authenticator, Credentials, HttpAuthenticator};
use super::parser::{Frame, FrameParser, Response};
use super::request::{Method, Request};
use super::sdp::{resolve_control, DescriptionParser, SdpParser};
use super::stats::ReceptionStats;
use super::transport::TransportInfo;
use crate::av::Track;
use crate::config::{Config, SessionConfig};
use crate::format::rtcp::{get_ntp_timestamp, RTCPPacket};
use crate::format::rtp::RtpView;
use crate::pipeline::{Command, Component, Envelope, Outputs};
use crate::{PipeError, Result};

/// Interleaved channel pairs available on one connection.
const MAX_TRACKS: usize = 128;

/// The `(rtp, rtcp)` channel pair requested for a track.
fn interleave_channels(index: usize) -> Option<(u8, u8)> {
    let rtp = u8::try_from(index.checked_mul(2)?).ok()?;
    Some((rtp, rtp.checked_add(1)?))
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    Init,
    /// OPTIONS sent, DESCRIBE follows
    OptionsSent,
    /// Tracks known, SETUP in progress
    Described,
    /// Every track set up; also the paused state
    Setup,
    /// Media flowing
    Playing,
    /// TEARDOWN sent
    Teardown,
    /// Torn down cleanly
    Closed,
    /// Terminal failure
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A request awaiting its response.
#[derive(Debug, Clone)]
struct PendingRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    sent_at: Instant,
    auth_attempts: u32,
    keepalive: bool,
}

/// Read-only view of one pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    /// Sequence number
    pub cseq: u32,
    /// Method
    pub method: Method,
    /// Sent as a keepalive
    pub keepalive: bool,
}

type PendingTable = Arc<Mutex<HashMap<u32, PendingRequest>>>;

/// Cloneable window onto a session owned by a pipeline.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    pending: PendingTable,
}

impl SessionHandle {
    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Outstanding requests ordered by CSeq.
    pub fn pending(&self) -> Vec<PendingSnapshot> {
        let mut pending: Vec<PendingSnapshot> = self
            .pending
            .lock()
            .iter()
            .map(|(&cseq, p)| PendingSnapshot {
                cseq,
                method: p.method,
                keepalive: p.keepalive,
            })
            .collect();
        pending.sort_by_key(|p| p.cseq);
        pending
    }
}

/// Sans-IO RTSP client session.
///
/// Sits at the head of a pipeline: transport bytes arrive forward as
/// [`Envelope::Raw`] and are split into responses and interleaved media;
/// requests leave in reverse as [`Envelope::Raw`] for the transport to write.
/// Application commands arrive in reverse as [`Envelope::Control`].
pub struct RtspSession {
    url: Url,
    config: SessionConfig,
    credentials: Option<Credentials>,
    authenticator: Box<dyn Authenticator>,
    describer: Box<dyn DescriptionParser>,
    parser: FrameParser,
    state: Arc<Mutex<SessionState>>,
    pending: PendingTable,
    next_cseq: u32,
    session_id: Option<String>,
    session_timeout: Duration,
    challenge: Option<String>,
    keepalive_method: Method,
    keepalive_failures: u32,
    last_request_at: Option<Instant>,
    aggregate_url: String,
    sdp_text: String,
    tracks: Vec<Track>,
    stats: Vec<ReceptionStats>,
    setup_index: usize,
    started: bool,
    local_ssrc: u32,
}

impl RtspSession {
    /// Creates a session for `url`. Credentials embedded in the URL are used
    /// for authentication and stripped from request URIs.
    pub fn new(url: &str, config: SessionConfig) -> Result<Self> {
        let mut url =
            Url::parse(url).map_err(|e| PipeError::Session(format!("invalid URL: {}", e)))?;
        if url.scheme() != "rtsp" {
            return Err(PipeError::Session("URL scheme is not 'rtsp'".into()));
        }
        let credentials = Credentials::from_url(&url);
        // Only fails for URLs that cannot carry credentials, which rtsp:// can.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        let session_timeout = config.default_session_timeout;
        Ok(Self {
            aggregate_url: url.to_string(),
            url,
            config,
            credentials,
            authenticator: Box::new(HttpAuthenticator),
            describer: Box::new(SdpParser),
            parser: FrameParser::new(),
            state: Arc::new(Mutex::new(SessionState::Init)),
            pending: PendingTable::default(),
            next_cseq: 1,
            session_id: None,
            session_timeout,
            challenge: None,
            keepalive_method: Method::Options,
            keepalive_failures: 0,
            last_request_at: None,
            sdp_text: String::new(),
            tracks: Vec::new(),
            stats: Vec::new(),
            setup_index: 0,
            started: false,
            local_ssrc: get_ntp_timestamp() as u32,
        })
    }

    /// Creates a session from the crate configuration; `username` and
    /// `password`, when both set, take precedence over the URL's.
    pub fn from_config(config: &Config) -> Result<Self> {
        let session = Self::new(&config.rtsp_url, config.session.clone())?;
        Ok(match (&config.username, &config.password) {
            (Some(user), Some(pass)) => session.with_credentials(Credentials::new(user, pass)),
            _ => session,
        })
    }

    /// Overrides credentials taken from the URL.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replaces the HTTP Basic/Digest authenticator.
    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Replaces the SDP parser.
    pub fn with_description_parser(mut self, describer: Box<dyn DescriptionParser>) -> Self {
        self.describer = describer;
        self
    }

    /// A handle that outlives moving the session into a pipeline.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: self.state.clone(),
            pending: self.pending.clone(),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Session id from the first SETUP response.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Negotiated tracks, with interleave channels once set up.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Reception statistics of a track.
    pub fn stats(&self, track: usize) -> Option<&ReceptionStats> {
        self.stats.get(track)
    }

    fn set_state(&mut self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != next {
            info!("RTSP session {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Moves to `Failed`, dropping every pending request.
    fn fail(&mut self, err: PipeError) -> PipeError {
        error!("RTSP session failed: {}", err);
        self.pending.lock().clear();
        self.set_state(SessionState::Failed);
        err
    }

    fn send(
        &mut self,
        method: Method,
        uri: &str,
        headers: Vec<(String, String)>,
        auth_attempts: u32,
        keepalive: bool,
        out: &mut Outputs,
    ) -> Result<u32> {
        let cseq = self.next_cseq;
        self.next_cseq += 1;

        let mut request =
            Request::new(method, uri, cseq).with_header("User-Agent", &self.config.user_agent);
        for (name, value) in &headers {
            request = request.with_header(name, value);
        }
        if let Some(ref session) = self.session_id {
            request = request.with_header("Session", session);
        }
        if let (Some(challenge), Some(credentials)) = (&self.challenge, &self.credentials) {
            let authorization = self
                .authenticator
                .authorize(challenge, credentials, method, uri)?;
            request = request.with_header("Authorization", &authorization);
        }

        let wire = request.to_bytes();
        debug!("Sending request:\n{}", String::from_utf8_lossy(&wire));
        out.reverse(Envelope::Raw(wire));

        let now = Instant::now();
        self.last_request_at = Some(now);
        self.pending.lock().insert(
            cseq,
            PendingRequest {
                method,
                uri: uri.to_string(),
                headers,
                sent_at: now,
                auth_attempts,
                keepalive,
            },
        );
        Ok(cseq)
    }

    fn send_options(&mut self, out: &mut Outputs) -> Result<()> {
        let uri = self.url.to_string();
        self.send(Method::Options, &uri, Vec::new(), 0, false, out)?;
        self.set_state(SessionState::OptionsSent);
        Ok(())
    }

    fn send_describe(&mut self, out: &mut Outputs) -> Result<()> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let headers = vec![
            ("Accept".to_string(), "application/sdp".to_string()),
            ("Date".to_string(), date),
        ];
        let uri = self.url.to_string();
        self.send(Method::Describe, &uri, headers, 0, false, out)?;
        Ok(())
    }

    fn send_setup(&mut self, out: &mut Outputs) -> Result<()> {
        let index = self.setup_index;
        let Some(track) = self.tracks.get(index) else {
            return Err(PipeError::Session(format!("no track {} to set up", index)));
        };
        let uri = track
            .control
            .clone()
            .unwrap_or_else(|| self.aggregate_url.clone());
        let Some((rtp_channel, _)) = interleave_channels(index) else {
            return Err(PipeError::Session(format!(
                "no interleaved channels left for track {}",
                index
            )));
        };
        let transport = TransportInfo::new_interleaved(rtp_channel);
        let headers = vec![("Transport".to_string(), transport.to_string())];
        self.send(Method::Setup, &uri, headers, 0, false, out)?;
        Ok(())
    }

    fn send_play(&mut self, out: &mut Outputs) -> Result<()> {
        let mut headers = Vec::new();
        if !self.started {
            headers.push(("Range".to_string(), "npt=0.000-".to_string()));
        }
        let uri = self.aggregate_url.clone();
        self.send(Method::Play, &uri, headers, 0, false, out)?;
        Ok(())
    }

    fn send_teardown(&mut self, out: &mut Outputs) -> Result<()> {
        let uri = self.aggregate_url.clone();
        self.send(Method::Teardown, &uri, Vec::new(), 0, false, out)?;
        self.set_state(SessionState::Teardown);
        Ok(())
    }

    fn handle_command(&mut self, command: Command, out: &mut Outputs) -> Result<()> {
        let state = self.state();
        match (command, state) {
            (_, SessionState::Closed | SessionState::Failed) => Err(PipeError::Session(format!(
                "{:?} issued on a {} session",
                command, state
            ))),
            (Command::Play, SessionState::Init) => self.send_options(out),
            (Command::Play, SessionState::Setup) => self.send_play(out),
            (Command::Play, _) => {
                debug!("play requested while {}; nothing to do", state);
                Ok(())
            }
            (Command::Pause, SessionState::Playing) => {
                let uri = self.aggregate_url.clone();
                self.send(Method::Pause, &uri, Vec::new(), 0, false, out)?;
                Ok(())
            }
            (Command::Pause, _) => {
                warn!("pause requested while {}; ignored", state);
                Ok(())
            }
            (Command::Teardown, SessionState::Teardown) => Ok(()),
            (Command::Teardown, _) if self.session_id.is_some() => self.send_teardown(out),
            (Command::Teardown, _) => {
                self.pending.lock().clear();
                self.set_state(SessionState::Closed);
                Ok(())
            }
        }
    }

    fn handle_response(&mut self, response: Response, out: &mut Outputs) -> Result<()> {
        debug!(
            "Received response: {} {} (CSeq {:?})",
            response.status,
            response.reason,
            response.cseq()
        );
        let cseq = response
            .cseq()
            .ok_or_else(|| PipeError::Protocol("response without CSeq".into()))?;
        let pending = self
            .pending
            .lock()
            .remove(&cseq)
            .ok_or_else(|| PipeError::Protocol(format!("no pending request for CSeq {}", cseq)))?;

        if response.status == 401 {
            return self.handle_unauthorized(&response, pending, out);
        }

        if !response.is_success() {
            let reason = format!(
                "{} failed with status {} {}",
                pending.method, response.status, response.reason
            );
            if pending.keepalive {
                return self.keepalive_failed(&reason);
            }
            if pending.method == Method::Teardown {
                warn!("{}", reason);
                self.set_state(SessionState::Closed);
                return Ok(());
            }
            return Err(self.fail(PipeError::Session(reason)));
        }

        if pending.keepalive {
            self.keepalive_failures = 0;
            return Ok(());
        }

        match pending.method {
            Method::Options => {
                if let Some(public) = response.header("Public") {
                    if public
                        .split(',')
                        .any(|m| m.trim().eq_ignore_ascii_case("GET_PARAMETER"))
                    {
                        self.keepalive_method = Method::GetParameter;
                    }
                }
                if self.state() == SessionState::OptionsSent {
                    self.send_describe(out)?;
                }
                Ok(())
            }
            Method::Describe => self.on_described(&response, out),
            Method::Setup => self.on_setup(&response, out),
            Method::Play => {
                self.started = true;
                self.keepalive_failures = 0;
                self.set_state(SessionState::Playing);
                Ok(())
            }
            Method::Pause => {
                self.set_state(SessionState::Setup);
                Ok(())
            }
            Method::Teardown => {
                self.pending.lock().clear();
                self.set_state(SessionState::Closed);
                Ok(())
            }
            Method::GetParameter => Ok(()),
        }
    }

    fn handle_unauthorized(
        &mut self,
        response: &Response,
        pending: PendingRequest,
        out: &mut Outputs,
    ) -> Result<()> {
        let challenge = select_challenge(response.headers_named("WWW-Authenticate"));
        let retry = pending.auth_attempts < self.config.auth_retries;
        let has_credentials = self.credentials.is_some();

        match (challenge, has_credentials, retry) {
            (Some(challenge), true, true) => {
                debug!("Handling auth challenge: {}", challenge);
                self.challenge = Some(challenge.to_string());
                self.send(
                    pending.method,
                    &pending.uri,
                    pending.headers,
                    pending.auth_attempts + 1,
                    pending.keepalive,
                    out,
                )
                .map(|_| ())
                .map_err(|e| self.fail(e))
            }
            (None, _, _) => Err(self.fail(PipeError::Auth(format!(
                "{} rejected without a supported challenge",
                pending.method
            )))),
            (_, false, _) => Err(self.fail(PipeError::Auth(
                "authentication required but no credentials available".into(),
            ))),
            (_, _, false) => Err(self.fail(PipeError::Auth(format!(
                "{} rejected after {} authenticated attempt(s)",
                pending.method, pending.auth_attempts
            )))),
        }
    }

    fn on_described(&mut self, response: &Response, out: &mut Outputs) -> Result<()> {
        self.sdp_text = String::from_utf8_lossy(&response.body).into_owned();
        debug!("Parsing SDP:\n{}", self.sdp_text);

        let description = match self.describer.parse(&self.sdp_text) {
            Ok(d) => d,
            Err(e) => {
                return Err(self.fail(PipeError::Session(format!(
                    "unusable session description: {}",
                    e
                ))))
            }
        };

        if description.tracks.len() > MAX_TRACKS {
            return Err(self.fail(PipeError::Session(format!(
                "{} media descriptions exceed the {} interleaved channel pairs",
                description.tracks.len(),
                MAX_TRACKS
            ))));
        }

        let base = response
            .header("Content-Base")
            .or_else(|| response.header("Content-Location"))
            .map(str::to_string)
            .unwrap_or_else(|| self.url.to_string());
        self.aggregate_url = match description.control.as_deref() {
            Some(control) => resolve_control(&base, control),
            None => base.clone(),
        };

        self.tracks = description
            .tracks
            .into_iter()
            .map(|mut track| {
                let control = track.control.take().unwrap_or_default();
                track.control = Some(resolve_control(&self.aggregate_url, &control));
                debug!("Media control URL: {:?}", track.control);
                track
            })
            .collect();
        self.stats = self
            .tracks
            .iter()
            .map(|t| ReceptionStats::new(t.clock_rate))
            .collect();
        self.setup_index = 0;
        info!("Found {} media descriptions", self.tracks.len());

        self.set_state(SessionState::Described);
        self.send_setup(out)
    }

    fn on_setup(&mut self, response: &Response, out: &mut Outputs) -> Result<()> {
        if let Some(session) = response.header("Session") {
            let mut parts = session.split(';');
            let id = parts.next().unwrap_or_default().trim();
            if self.session_id.is_none() && !id.is_empty() {
                self.session_id = Some(id.to_string());
            }
            for param in parts {
                if let Some(("timeout", secs)) = param.trim().split_once('=') {
                    if let Ok(secs) = secs.trim().parse::<u64>() {
                        self.session_timeout = Duration::from_secs(secs.max(1));
                    }
                }
            }
        }
        if self.session_id.is_none() {
            return Err(self.fail(PipeError::Session("SETUP response without Session".into())));
        }

        let index = self.setup_index;
        let channels = response
            .header("Transport")
            .and_then(TransportInfo::parse)
            .and_then(|t| t.interleaved)
            .or_else(|| interleave_channels(index));
        let Some(channels) = channels else {
            return Err(self.fail(PipeError::Session(format!(
                "no interleaved channels for track {}",
                index
            ))));
        };
        if let Some(track) = self.tracks.get_mut(index) {
            track.interleaved = Some(channels);
            debug!("track {} interleaved on {}-{}", index, channels.0, channels.1);
        }

        self.setup_index += 1;
        if self.setup_index < self.tracks.len() {
            return self.send_setup(out);
        }

        self.set_state(SessionState::Setup);
        out.forward(Envelope::Sdp {
            text: self.sdp_text.clone(),
            tracks: self.tracks.clone(),
        });
        self.send_play(out)
    }

    fn keepalive_failed(&mut self, reason: &str) -> Result<()> {
        self.keepalive_failures += 1;
        if self.keepalive_failures > self.config.keepalive_retries {
            return Err(self.fail(PipeError::Session(format!(
                "keepalive failed {} times: {}",
                self.keepalive_failures, reason
            ))));
        }
        warn!(
            "keepalive failure {}/{}: {}",
            self.keepalive_failures, self.config.keepalive_retries, reason
        );
        Ok(())
    }

    fn handle_interleaved(&mut self, channel: u8, data: Bytes, out: &mut Outputs) -> Result<()> {
        let track = self
            .tracks
            .iter()
            .position(|t| t.rtp_channel() == Some(channel) || t.rtcp_channel() == Some(channel));
        let now = Instant::now();

        if channel % 2 == 0 {
            let packet = RtpView::parse(data)?;
            let mut ntp_timestamp = None;
            if let Some(stats) = track.and_then(|i| self.stats.get_mut(i)) {
                let gap = stats.update(
                    packet.ssrc(),
                    packet.sequence_number(),
                    packet.timestamp(),
                    packet.payload().len(),
                    now,
                );
                if gap > 0 {
                    debug!("channel {}: {} packet(s) missing", channel, gap);
                }
                ntp_timestamp = stats.wallclock_millis(packet.timestamp());
            }
            out.forward(Envelope::Rtp {
                packet,
                channel,
                ntp_timestamp,
            });
            return Ok(());
        }

        match RTCPPacket::parse_compound(&data) {
            Ok(packets) => {
                for packet in &packets {
                    match packet {
                        RTCPPacket::SenderReport {
                            ntp_timestamp,
                            rtp_timestamp,
                            ..
                        } => {
                            if let Some(stats) = track.and_then(|i| self.stats.get_mut(i)) {
                                stats.on_sender_report(*ntp_timestamp, *rtp_timestamp, now);
                            }
                        }
                        RTCPPacket::Goodbye { sources, reason } => {
                            info!("BYE on channel {} for {:?} ({:?})", channel, sources, reason);
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => out.error(e.into()),
        }
        out.forward(Envelope::Rtcp { data, channel });
        Ok(())
    }

    fn check_timeouts(&mut self, now: Instant) -> Result<()> {
        let expired: Vec<(u32, PendingRequest)> = {
            let mut pending = self.pending.lock();
            let cseqs: Vec<u32> = pending
                .iter()
                .filter(|(_, p)| now.duration_since(p.sent_at) >= self.config.request_timeout)
                .map(|(&cseq, _)| cseq)
                .collect();
            cseqs
                .into_iter()
                .filter_map(|cseq| pending.remove(&cseq).map(|p| (cseq, p)))
                .collect()
        };

        for (cseq, request) in expired {
            let reason = format!("{} (CSeq {}) timed out", request.method, cseq);
            if request.keepalive {
                self.keepalive_failed(&reason)?;
            } else if request.method == Method::Teardown {
                warn!("{}", reason);
                self.set_state(SessionState::Closed);
            } else {
                return Err(self.fail(PipeError::Session(reason)));
            }
        }
        Ok(())
    }

    fn keepalive_due(&self, now: Instant) -> bool {
        if !matches!(self.state(), SessionState::Setup | SessionState::Playing) {
            return false;
        }
        if self.pending.lock().values().any(|p| p.keepalive) {
            return false;
        }
        let timeout = self.session_timeout;
        let interval = timeout
            .saturating_sub(self.config.keepalive_margin)
            .max(timeout / 2);
        self.last_request_at
            .map_or(true, |last| now.duration_since(last) >= interval)
    }

    fn send_keepalive(&mut self, now: Instant, out: &mut Outputs) -> Result<()> {
        let uri = self.aggregate_url.clone();
        let method = self.keepalive_method;
        self.send(method, &uri, Vec::new(), 0, true, out)?;

        for (index, track) in self.tracks.iter().enumerate() {
            let (Some(channel), Some(stats)) = (track.rtcp_channel(), self.stats.get_mut(index))
            else {
                continue;
            };
            let Some(report) = stats.report(now) else {
                continue;
            };
            let rr = RTCPPacket::ReceiverReport {
                ssrc: self.local_ssrc,
                reports: vec![report],
            }
            .to_bytes();
            out.reverse(Envelope::Raw(interleave(channel, &rr)));
        }
        Ok(())
    }
}

/// Wraps a packet in a `$` interleaved frame.
pub fn interleave(channel: u8, packet: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(4 + packet.len());
    frame.put_u8(b'$');
    frame.put_u8(channel);
    frame.put_u16(packet.len() as u16);
    frame.put_slice(packet);
    frame.freeze()
}

#[async_trait]
impl Component for RtspSession {
    fn name(&self) -> &str {
        "rtsp-session"
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        let Envelope::Raw(bytes) = envelope else {
            out.forward(envelope);
            return Ok(());
        };
        self.parser.extend(&bytes);

        loop {
            let result = match self.parser.next_frame() {
                Ok(Some(Frame::Response(response))) => self.handle_response(response, out),
                Ok(Some(Frame::Interleaved { channel, data })) => {
                    self.handle_interleaved(channel, data, out)
                }
                Ok(None) => break,
                Err(e) => Err(e),
            };
            match result {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => out.error(e),
                Ok(()) => {}
            }
        }
        Ok(())
    }

    async fn reverse(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        match envelope {
            Envelope::Control(command) => self.handle_command(command, out),
            other => {
                out.reverse(other);
                Ok(())
            }
        }
    }

    async fn on_tick(&mut self, now: Instant, out: &mut Outputs) -> Result<()> {
        if matches!(self.state(), SessionState::Closed | SessionState::Failed) {
            return Ok(());
        }
        self.check_timeouts(now)?;
        if self.keepalive_due(now) {
            debug!("sending {} keepalive", self.keepalive_method);
            self.send_keepalive(now, out)?;
        }
        Ok(())
    }

    async fn close(&mut self, out: &mut Outputs) -> Result<()> {
        let established = matches!(
            self.state(),
            SessionState::Described | SessionState::Setup | SessionState::Playing
        );
        if established && self.session_id.is_some() {
            self.send_teardown(out)?;
        }
        self.pending.lock().clear();
        self.parser = FrameParser::new();
        self.stats.clear();
        if self.state() != SessionState::Failed {
            self.set_state(SessionState::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
