//! Single-shot message sender with a chainable parameter builder.
//!
//! A [`Sender`] is created per performance event: construct it with a
//! destination template, chain parameter setters, then call [`Sender::out`]
//! once. It is not reused after dispatch and needs no teardown. All
//! mutation happens synchronously before the scheduled wait, so the sender
//! is never shared across tasks.

use crate::error::ComposeError;
use crate::message::{compose, ParamValue, ResolvedMessage};
use crate::osc::OscClient;
use crate::pattern::{parse_addresses, parse_numbers};
use crate::scheduler::{spawn_dispatch, DispatchId, DispatchRegistry};
use crate::timing::TempoClock;
use std::sync::Arc;

/// Input accepted by [`Sender::set`]: a number stored verbatim as a scalar,
/// or a pattern string parsed once at set time.
#[derive(Clone, Debug)]
pub enum ParamInput {
    Value(f64),
    Pattern(String),
}

impl From<f64> for ParamInput {
    fn from(value: f64) -> Self {
        ParamInput::Value(value)
    }
}

impl From<f32> for ParamInput {
    fn from(value: f32) -> Self {
        ParamInput::Value(value as f64)
    }
}

impl From<i32> for ParamInput {
    fn from(value: i32) -> Self {
        ParamInput::Value(value as f64)
    }
}

impl From<i64> for ParamInput {
    fn from(value: i64) -> Self {
        ParamInput::Value(value as f64)
    }
}

impl From<&str> for ParamInput {
    fn from(value: &str) -> Self {
        ParamInput::Pattern(value.to_string())
    }
}

impl From<String> for ParamInput {
    fn from(value: String) -> Self {
        ParamInput::Pattern(value)
    }
}

/// Composes and schedules one timed control message.
pub struct Sender {
    clock: Arc<TempoClock>,
    transport: Arc<OscClient>,
    addresses: Vec<String>,
    params: Vec<(String, ParamValue)>,
    trig: Option<ParamValue>,
    after_beats: f64,
    registry: Option<Arc<DispatchRegistry>>,
}

impl Sender {
    /// Create a sender for one performance event.
    ///
    /// The destination template is parsed here, exactly once; an empty
    /// template leaves the sender with no destination and [`Sender::out`]
    /// delivers nothing.
    pub fn new(clock: Arc<TempoClock>, transport: Arc<OscClient>, address: &str) -> Self {
        Self {
            clock,
            transport,
            addresses: parse_addresses(address),
            params: Vec::new(),
            trig: None,
            after_beats: 0.0,
            registry: None,
        }
    }

    /// Attach a registry that observes this sender's dispatches.
    pub fn with_registry(mut self, registry: Arc<DispatchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set or overwrite a named parameter.
    ///
    /// Recognized control names route to their dedicated fields instead of
    /// the outbound mapping: `trig` arms the trigger gate and `after` sets
    /// the beat offset. Every other name is stored in insertion order and
    /// becomes one outbound argument; overwriting keeps the original
    /// position.
    pub fn set(mut self, name: &str, value: impl Into<ParamInput>) -> Self {
        let value = resolve_input(value.into());
        match name {
            "trig" => self.trig = Some(value),
            "after" => {
                if let ParamValue::Scalar(beats) = value {
                    self.after_beats = beats;
                }
            }
            _ => self.upsert(name, value),
        }
        self
    }

    /// Arm the trigger gate; a value of exactly 1 lets the message play.
    pub fn trig(self, value: f64) -> Self {
        self.set("trig", value)
    }

    /// Delay dispatch by the given number of beats from now.
    pub fn after(mut self, beats: f64) -> Self {
        self.after_beats = beats;
        self
    }

    /// Set the `note` parameter.
    pub fn note(self, value: impl Into<ParamInput>) -> Self {
        self.set("note", value)
    }

    /// Set the `speed` parameter.
    pub fn speed(self, value: impl Into<ParamInput>) -> Self {
        self.set("speed", value)
    }

    /// Set the `gain` parameter.
    pub fn gain(self, value: impl Into<ParamInput>) -> Self {
        self.set("gain", value)
    }

    fn upsert(&mut self, name: &str, value: ParamValue) {
        if let Some(slot) = self.params.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.params.push((name.to_string(), value));
        }
    }

    /// Whether dispatch is armed: the trigger gate must be present and be
    /// a scalar equal to exactly 1. A pattern-valued gate never plays.
    pub fn will_play(&self) -> bool {
        matches!(self.trig, Some(ParamValue::Scalar(v)) if v == 1.0)
    }

    /// The parsed destination candidates.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// The stored parameters, in insertion order.
    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    /// The beat-relative dispatch offset.
    pub fn after_beats(&self) -> f64 {
        self.after_beats
    }

    /// Compose this sender's message for the given iteration index.
    ///
    /// Returns `Ok(None)` when the gate is closed or there is no
    /// destination; a conversion failure is scoped to this one message and
    /// leaves the sender untouched.
    pub fn resolve(&self, iter: Option<usize>) -> Result<Option<ResolvedMessage>, ComposeError> {
        if !self.will_play() {
            return Ok(None);
        }
        compose(&self.addresses, &self.params, iter)
    }

    /// Compose and schedule this sender's message `after` beats from now.
    ///
    /// The offset is additive to the current tick — never snapped to a
    /// beat boundary. Delivery is fire-and-forget: the returned id names
    /// the background task, which is never awaited and cannot be
    /// cancelled. Must be called from within a tokio runtime.
    pub fn out(&self, iter: Option<usize>) -> Result<Option<DispatchId>, ComposeError> {
        let message = match self.resolve(iter)? {
            Some(m) => m,
            None => return Ok(None),
        };
        let tick = self.clock.ticks_for(self.after_beats, false);
        Ok(Some(spawn_dispatch(
            Arc::clone(&self.clock),
            Arc::clone(&self.transport),
            self.registry.clone(),
            tick,
            message,
        )))
    }
}

fn resolve_input(input: ParamInput) -> ParamValue {
    match input {
        ParamInput::Value(n) => ParamValue::Scalar(n),
        ParamInput::Pattern(s) => ParamValue::Pattern(parse_numbers(&s)),
    }
}
