use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use coda_core::{CodaError, CodaValue, DataType, ErrorKind, ScriptUnit};
use tracing::debug;

/// Where a caller picks up once a called frame finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub ip: usize,
    pub result_slot: Option<String>,
    pub expected: DataType,
}

#[derive(Debug, Clone)]
pub struct ExecutionFrame {
    pub script: Arc<ScriptUnit>,
    pub ip: usize,
    pub locals: BTreeMap<String, CodaValue>,
    pub pending_return: Option<CodaValue>,
    pub resume: Option<ResumePoint>,
}

/// One active loop: where `Continue` re-checks the condition, where `Break`
/// lands, and which frame owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopContext {
    pub recheck_index: usize,
    pub exit_index: usize,
    pub frame_depth: usize,
}

/// Per-script timing record. Survives between background runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptTimer {
    last_tick: Option<Duration>,
}

impl ScriptTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_tick(&self) -> Option<Duration> {
        self.last_tick
    }

    /// Seconds since the previous tick (0 on the first), then records `now`.
    pub fn tick(&mut self, now: Duration) -> f64 {
        let elapsed = match self.last_tick {
            Some(previous) => now.saturating_sub(previous).as_secs_f64(),
            None => 0.0,
        };
        self.last_tick = Some(match self.last_tick {
            Some(previous) => previous.max(now),
            None => now,
        });
        elapsed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameExit {
    /// The outermost frame ended; the run is over.
    Finished(CodaValue),
    /// Control went back to the caller and the result was delivered.
    Resumed {
        callee: String,
        expected: DataType,
        coerced_from: Option<DataType>,
    },
}

/// Mutable state of one script run.
#[derive(Debug)]
pub struct ExecutionContext {
    identity: String,
    frames: Vec<ExecutionFrame>,
    loops: Vec<LoopContext>,
    timers: BTreeMap<String, ScriptTimer>,
}

impl ExecutionContext {
    pub fn new(
        entry: Arc<ScriptUnit>,
        locals: BTreeMap<String, CodaValue>,
        timer: ScriptTimer,
    ) -> Self {
        let identity = entry.name.clone();
        let timers = BTreeMap::from([(identity.clone(), timer)]);
        Self {
            identity,
            frames: vec![ExecutionFrame {
                script: entry,
                ip: 0,
                locals,
                pending_return: None,
                resume: None,
            }],
            loops: Vec::new(),
            timers,
        }
    }

    /// Carries in timers of earlier runs, keyed by script name.
    pub fn with_timers(mut self, timers: BTreeMap<String, ScriptTimer>) -> Self {
        self.timers.extend(timers);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    pub fn is_finished(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_frame(&self) -> Result<&ExecutionFrame, CodaError> {
        self.frames.last().ok_or_else(no_frame)
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut ExecutionFrame, CodaError> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    pub fn ip(&self) -> Result<usize, CodaError> {
        Ok(self.current_frame()?.ip)
    }

    pub fn set_ip(&mut self, ip: usize) -> Result<(), CodaError> {
        self.current_frame_mut()?.ip = ip;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), CodaError> {
        self.current_frame_mut()?.ip += 1;
        Ok(())
    }

    pub fn locals(&self) -> Result<&BTreeMap<String, CodaValue>, CodaError> {
        Ok(&self.current_frame()?.locals)
    }

    pub fn local(&self, name: &str) -> Option<&CodaValue> {
        self.frames.last().and_then(|frame| frame.locals.get(name))
    }

    pub fn set_local(&mut self, name: &str, value: CodaValue) -> Result<(), CodaError> {
        self.current_frame_mut()?
            .locals
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Innermost loop owned by the current frame.
    pub fn current_loop(&self) -> Option<&LoopContext> {
        let depth = self.frames.len();
        self.loops.last().filter(|context| context.frame_depth == depth)
    }

    /// Registers the loop whose condition sits at `recheck_index`. Re-entering
    /// the loop that is already innermost is a no-op.
    pub fn enter_loop(&mut self, recheck_index: usize, exit_index: usize) -> Result<(), CodaError> {
        let depth = self.frames.len();
        if depth == 0 {
            return Err(no_frame());
        }
        if self
            .current_loop()
            .is_some_and(|context| context.recheck_index == recheck_index)
        {
            return Ok(());
        }
        self.loops.push(LoopContext {
            recheck_index,
            exit_index,
            frame_depth: depth,
        });
        debug!(
            script = %self.identity,
            recheck_index,
            exit_index,
            depth = self.loops.len(),
            "loop entered"
        );
        Ok(())
    }

    /// Drops the innermost loop after its condition turned false.
    pub fn exit_loop(&mut self) -> Result<LoopContext, CodaError> {
        self.pop_loop("leave")
    }

    /// Leaves the innermost loop and jumps past its end.
    pub fn break_loop(&mut self) -> Result<(), CodaError> {
        let context = self.pop_loop("break out of")?;
        self.set_ip(context.exit_index)
    }

    /// Jumps back to the innermost loop's condition.
    pub fn continue_loop(&mut self) -> Result<(), CodaError> {
        let Some(context) = self.current_loop().copied() else {
            return Err(no_loop("continue"));
        };
        self.set_ip(context.recheck_index)
    }

    pub fn push_frame(
        &mut self,
        script: Arc<ScriptUnit>,
        locals: BTreeMap<String, CodaValue>,
        resume: ResumePoint,
    ) {
        debug!(
            caller = %self.frames.last().map(|frame| frame.script.name.as_str()).unwrap_or_default(),
            callee = %script.name,
            depth = self.frames.len() + 1,
            "frame pushed"
        );
        self.frames.push(ExecutionFrame {
            script,
            ip: 0,
            locals,
            pending_return: None,
            resume: Some(resume),
        });
    }

    pub fn set_pending_return(&mut self, value: CodaValue) -> Result<(), CodaError> {
        self.current_frame_mut()?.pending_return = Some(value);
        Ok(())
    }

    /// Pops the current frame together with its loops and hands its pending
    /// return value to the caller, coerced to the caller's expected type.
    pub fn finish_frame(&mut self) -> Result<FrameExit, CodaError> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        let depth = self.frames.len();
        self.loops.retain(|context| context.frame_depth <= depth);

        let value = frame.pending_return.unwrap_or(CodaValue::Invalid);
        let Some(caller) = self.frames.last_mut() else {
            debug!(script = %frame.script.name, "outermost frame finished");
            return Ok(FrameExit::Finished(value));
        };
        let Some(resume) = frame.resume else {
            return Err(CodaError::new(
                ErrorKind::Runtime,
                format!("Frame of \"{}\" has no resume point.", frame.script.name),
            ));
        };

        let found = value.data_type();
        let (delivered, coerced) = value.coerce_or_zero(resume.expected);
        caller.ip = resume.ip;
        if let Some(slot) = resume.result_slot {
            caller.locals.insert(slot, delivered);
        }
        Ok(FrameExit::Resumed {
            callee: frame.script.name.clone(),
            expected: resume.expected,
            coerced_from: (coerced && found != DataType::Invalid).then_some(found),
        })
    }

    /// Seconds since the previous `GetSecondsPassed` of the script that owns
    /// the current frame. A callee keeps its own timer.
    pub fn seconds_passed(&mut self, now: Duration) -> Result<f64, CodaError> {
        let script = self.current_frame()?.script.name.clone();
        Ok(self.timers.entry(script).or_default().tick(now))
    }

    pub fn timer(&self, script: &str) -> Option<&ScriptTimer> {
        self.timers.get(script)
    }

    pub fn into_timers(self) -> BTreeMap<String, ScriptTimer> {
        self.timers
    }

    fn pop_loop(&mut self, verb: &str) -> Result<LoopContext, CodaError> {
        if self.current_loop().is_none() {
            return Err(no_loop(verb));
        }
        self.loops.pop().ok_or_else(|| no_loop(verb))
    }
}

fn no_frame() -> CodaError {
    CodaError::new(ErrorKind::Runtime, "No active execution frame.")
}

fn no_loop(verb: &str) -> CodaError {
    CodaError::new(
        ErrorKind::ContextError,
        format!("Cannot {} a loop outside of a loop body.", verb),
    )
}
