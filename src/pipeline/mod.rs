//! # Bidirectional stage pipeline
//!
//! A [`Pipeline`] is an ordered chain of [`Component`]s. Envelopes move
//! *forward* from the head (the RTSP session) toward the tail (the sink), and
//! control moves in *reverse* from the tail back to the head.
//!
//! Delivery is push-with-acknowledgement: an envelope reaches a stage only once
//! everything that stage emitted earlier has been consumed downstream, so the
//! deepest queued work always runs first. Each stage owns a FIFO inbox per
//! direction, which is what lets stages be spliced in or out while envelopes
//! are still queued.
//!
//! ```rust
//! use rtspipe::pipeline::{Component, Envelope, Outputs, Pipeline};
//! use rtspipe::Result;
//! use bytes::Bytes;
//!
//! struct Upper;
//!
//! #[async_trait::async_trait]
//! impl Component for Upper {
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     async fn forward(&mut self, env: Envelope, out: &mut Outputs) -> Result<()> {
//!         match env {
//!             Envelope::Raw(b) => out.forward(Envelope::Raw(Bytes::from(b.to_ascii_uppercase()))),
//!             other => out.forward(other),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let mut pipeline = Pipeline::new().then(Upper);
//! pipeline.push_forward(Envelope::Raw(Bytes::from_static(b"abc"))).await.unwrap();
//! match pipeline.take_downstream().pop() {
//!     Some(Envelope::Raw(b)) => assert_eq!(&b[..], b"ABC"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! # });
//! ```

mod envelope;
mod handlers;

pub use envelope::*;
pub use handlers::{Handler, HandlerTable};

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::{PipeError, Result};

/// One processing stage.
///
/// The default implementations pass envelopes through unchanged, so a stage
/// only overrides the direction it cares about.
#[async_trait]
pub trait Component: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Handles an envelope travelling toward the sink.
    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        out.forward(envelope);
        Ok(())
    }

    /// Handles an envelope travelling toward the source.
    async fn reverse(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        out.reverse(envelope);
        Ok(())
    }

    /// Periodic timer, used for keepalives and request timeouts.
    async fn on_tick(&mut self, _now: Instant, _out: &mut Outputs) -> Result<()> {
        Ok(())
    }

    /// Releases per-track state; may emit final envelopes.
    async fn close(&mut self, _out: &mut Outputs) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<C: Component + ?Sized> Component for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn forward(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        (**self).forward(envelope, out).await
    }

    async fn reverse(&mut self, envelope: Envelope, out: &mut Outputs) -> Result<()> {
        (**self).reverse(envelope, out).await
    }

    async fn on_tick(&mut self, now: Instant, out: &mut Outputs) -> Result<()> {
        (**self).on_tick(now, out).await
    }

    async fn close(&mut self, out: &mut Outputs) -> Result<()> {
        (**self).close(out).await
    }
}

/// What a stage emitted while handling one envelope.
#[derive(Debug, Default)]
pub struct Outputs {
    forward: VecDeque<Envelope>,
    reverse: VecDeque<Envelope>,
    errors: Vec<PipeError>,
}

impl Outputs {
    /// Emits toward the sink.
    pub fn forward(&mut self, envelope: Envelope) {
        self.forward.push_back(envelope);
    }

    /// Emits toward the source.
    pub fn reverse(&mut self, envelope: Envelope) {
        self.reverse.push_back(envelope);
    }

    /// Reports an error without aborting the handler.
    pub fn error(&mut self, err: PipeError) {
        self.errors.push(err);
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty() && self.errors.is_empty()
    }

    /// Drains what was emitted forward, oldest first.
    pub fn take_forward(&mut self) -> Vec<Envelope> {
        self.forward.drain(..).collect()
    }

    /// Drains what was emitted in reverse, oldest first.
    pub fn take_reverse(&mut self) -> Vec<Envelope> {
        self.reverse.drain(..).collect()
    }

    /// Drains the reported errors.
    pub fn take_errors(&mut self) -> Vec<PipeError> {
        std::mem::take(&mut self.errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

struct Stage {
    component: Box<dyn Component>,
    fwd_in: VecDeque<Envelope>,
    rev_in: VecDeque<Envelope>,
    handlers: HandlerTable,
    in_flight: bool,
}

impl Stage {
    fn new(component: Box<dyn Component>) -> Self {
        Self {
            component,
            fwd_in: VecDeque::new(),
            rev_in: VecDeque::new(),
            handlers: HandlerTable::default(),
            in_flight: false,
        }
    }
}

/// An ordered chain of stages with per-stage inboxes.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    upstream: VecDeque<Envelope>,
    downstream: VecDeque<Envelope>,
    errors: Vec<PipeError>,
    closed: bool,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires `a`'s forward output to `b` and `b`'s reverse output to `a`.
    pub fn connect<A, B>(a: A, b: B) -> Self
    where
        A: Component + 'static,
        B: Component + 'static,
    {
        Self::new().then(a).then(b)
    }

    /// Appends a stage at the tail, builder style.
    pub fn then<C: Component + 'static>(mut self, component: C) -> Self {
        self.push(Box::new(component));
        self
    }

    /// Appends a stage at the tail.
    pub fn push(&mut self, component: Box<dyn Component>) {
        self.stages.push(Stage::new(component));
    }

    /// Splices a stage in before position `index`.
    ///
    /// Envelopes queued for the stage previously at `index`, and envelopes that
    /// stage sent upstream but that were not yet consumed, now pass through the
    /// new stage first.
    pub fn insert(&mut self, index: usize, component: Box<dyn Component>) -> Result<()> {
        if index > self.stages.len() {
            return Err(PipeError::Pipeline(format!(
                "insert index {} out of range for {} stages",
                index,
                self.stages.len()
            )));
        }
        let mut stage = Stage::new(component);
        if let Some(next) = self.stages.get_mut(index) {
            stage.fwd_in = std::mem::take(&mut next.fwd_in);
        }
        if index > 0 {
            stage.rev_in = std::mem::take(&mut self.stages[index - 1].rev_in);
        }
        debug!("inserting stage {} at {}", stage.component.name(), index);
        self.stages.insert(index, stage);
        Ok(())
    }

    /// Splices the stage at `index` out, handing its queued envelopes onward.
    pub fn remove(&mut self, index: usize) -> Result<Box<dyn Component>> {
        if index >= self.stages.len() {
            return Err(PipeError::Pipeline(format!(
                "remove index {} out of range for {} stages",
                index,
                self.stages.len()
            )));
        }
        let stage = self.stages.remove(index);
        debug!("removed stage {} from {}", stage.component.name(), index);

        match self.stages.get_mut(index) {
            Some(next) => next.fwd_in.extend(stage.fwd_in),
            None => self.downstream.extend(stage.fwd_in),
        }
        if index > 0 {
            self.stages[index - 1].rev_in.extend(stage.rev_in);
        } else {
            self.upstream.extend(stage.rev_in);
        }
        Ok(stage.component)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names, head first.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| s.component.name().to_string())
            .collect()
    }

    /// Installs an observer on a stage, replacing any previous one for `ty`.
    pub fn register_handler(
        &mut self,
        stage: usize,
        ty: MessageType,
        handler: Handler,
    ) -> Result<()> {
        let slot = self.stage_mut(stage)?;
        if slot.handlers.register(ty, handler).is_some() {
            debug!("replaced {} handler on stage {}", ty, stage);
        }
        Ok(())
    }

    /// Removes an observer; fails if none is registered for `ty`.
    pub fn unregister_handler(&mut self, stage: usize, ty: MessageType) -> Result<()> {
        self.stage_mut(stage)?.handlers.unregister(ty).map(|_| ())
    }

    /// Queues an envelope at the head without processing it.
    pub fn enqueue_forward(&mut self, envelope: Envelope) -> Result<()> {
        self.ensure_open()?;
        match self.stages.first_mut() {
            Some(head) => head.fwd_in.push_back(envelope),
            None => self.downstream.push_back(envelope),
        }
        Ok(())
    }

    /// Queues an envelope at the tail without processing it.
    pub fn enqueue_reverse(&mut self, envelope: Envelope) -> Result<()> {
        self.ensure_open()?;
        match self.stages.last_mut() {
            Some(tail) => tail.rev_in.push_back(envelope),
            None => self.upstream.push_back(envelope),
        }
        Ok(())
    }

    /// Feeds an envelope in at the head and runs until the chain is idle.
    pub async fn push_forward(&mut self, envelope: Envelope) -> Result<()> {
        self.enqueue_forward(envelope)?;
        self.run().await
    }

    /// Feeds an envelope in at the tail and runs until the chain is idle.
    pub async fn push_reverse(&mut self, envelope: Envelope) -> Result<()> {
        self.enqueue_reverse(envelope)?;
        self.run().await
    }

    /// Delivers a timer tick to every stage, head first.
    pub async fn tick(&mut self, now: Instant) -> Result<()> {
        self.ensure_open()?;
        let mut fatal = None;
        for i in 0..self.stages.len() {
            let mut out = Outputs::default();
            let res = self.stages[i].component.on_tick(now, &mut out).await;
            if let Some(err) = self.settle(i, out, res) {
                fatal.get_or_insert(err);
            }
        }
        match fatal {
            Some(err) => Err(err),
            None => self.run().await,
        }
    }

    /// Processes queued envelopes until every inbox is empty.
    pub async fn run(&mut self) -> Result<()> {
        while self.step().await? {}
        Ok(())
    }

    /// Delivers one queued envelope. Returns `false` when nothing was queued.
    ///
    /// Reverse traffic nearest the head goes first, then forward traffic
    /// nearest the tail.
    pub async fn step(&mut self) -> Result<bool> {
        let next = self
            .stages
            .iter()
            .position(|s| !s.rev_in.is_empty())
            .map(|i| (i, Direction::Reverse))
            .or_else(|| {
                self.stages
                    .iter()
                    .rposition(|s| !s.fwd_in.is_empty())
                    .map(|i| (i, Direction::Forward))
            });

        let Some((index, direction)) = next else {
            return Ok(false);
        };

        let stage = &mut self.stages[index];
        let envelope = match direction {
            Direction::Forward => stage.fwd_in.pop_front(),
            Direction::Reverse => stage.rev_in.pop_front(),
        };
        let Some(envelope) = envelope else {
            return Ok(false);
        };

        if stage.in_flight {
            panic!(
                "stage {} received an envelope before acknowledging the previous one",
                stage.component.name()
            );
        }
        stage.handlers.dispatch(&envelope);
        stage.in_flight = true;

        let mut out = Outputs::default();
        let res = match direction {
            Direction::Forward => stage.component.forward(envelope, &mut out).await,
            Direction::Reverse => stage.component.reverse(envelope, &mut out).await,
        };
        stage.in_flight = false;

        match self.settle(index, out, res) {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Closes every stage head first, draining what each emits, then drops all
    /// handlers. Further pushes fail.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut fatal = None;
        for i in 0..self.stages.len() {
            let mut out = Outputs::default();
            let res = self.stages[i].component.close(&mut out).await;
            if let Some(err) = self.settle(i, out, res) {
                fatal.get_or_insert(err);
            }
            if let Err(err) = self.run().await {
                fatal.get_or_insert(err);
            }
        }
        for stage in &mut self.stages {
            stage.handlers.clear();
            stage.fwd_in.clear();
            stage.rev_in.clear();
        }
        self.closed = true;
        debug!("pipeline closed");
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether [`Pipeline::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Envelopes that left the head in reverse, oldest first.
    pub fn take_upstream(&mut self) -> Vec<Envelope> {
        self.upstream.drain(..).collect()
    }

    /// Envelopes that left the tail forward, oldest first.
    pub fn take_downstream(&mut self) -> Vec<Envelope> {
        self.downstream.drain(..).collect()
    }

    /// Non-fatal errors reported since the last call.
    pub fn take_errors(&mut self) -> Vec<PipeError> {
        std::mem::take(&mut self.errors)
    }

    fn stage_mut(&mut self, index: usize) -> Result<&mut Stage> {
        let len = self.stages.len();
        self.stages
            .get_mut(index)
            .ok_or_else(|| {
                PipeError::Pipeline(format!("no stage {} in a pipeline of {}", index, len))
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(PipeError::Pipeline("pipeline is closed".into()));
        }
        Ok(())
    }

    /// Routes a stage's outputs to its neighbours and sorts its errors.
    /// Returns the first fatal error, if any.
    fn settle(&mut self, index: usize, out: Outputs, res: Result<()>) -> Option<PipeError> {
        let Outputs {
            forward,
            reverse,
            errors,
        } = out;

        match self.stages.get_mut(index + 1) {
            Some(next) => next.fwd_in.extend(forward),
            None => self.downstream.extend(forward),
        }
        if index > 0 {
            self.stages[index - 1].rev_in.extend(reverse);
        } else {
            self.upstream.extend(reverse);
        }

        let mut fatal = None;
        for err in errors.into_iter().chain(res.err()) {
            if err.is_fatal() {
                fatal.get_or_insert(err);
            } else {
                warn!("{}: {}", self.stages[index].component.name(), err);
                self.errors.push(err);
            }
        }
        fatal
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("closed", &self.closed)
            .finish()
    }
}
