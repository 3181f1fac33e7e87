//! Debuggee lifecycle state machine.

use crate::error::EngineError;

/// Where a debugged process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Configured, nothing started.
    Created,
    /// The engine process is being spawned.
    Starting,
    /// Waiting for the debug socket handshake.
    Attaching,
    /// The debuggee is executing.
    Running,
    /// The debuggee is paused.
    Stopped,
    /// A detach or terminate is in progress.
    Detaching,
    /// The session is over.
    Terminated,
}

/// Tracks the lifecycle of one debugged process.
#[derive(Debug)]
pub struct ProcessLifecycle {
    state: ProcessState,
}

impl ProcessLifecycle {
    /// Create a lifecycle in the [`Created`](ProcessState::Created) state.
    pub fn new() -> Self {
        Self {
            state: ProcessState::Created,
        }
    }

    /// Return the current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the session has an engine connection that can take commands.
    pub fn is_attached(&self) -> bool {
        matches!(self.state, ProcessState::Running | ProcessState::Stopped)
    }

    /// Transition: Created → Starting.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.expect(&[ProcessState::Created], "start")?;
        self.state = ProcessState::Starting;
        Ok(())
    }

    /// Transition: Created | Starting → Attaching.
    pub fn begin_attach(&mut self) -> Result<(), EngineError> {
        self.expect(&[ProcessState::Created, ProcessState::Starting], "attach")?;
        self.state = ProcessState::Attaching;
        Ok(())
    }

    /// Transition: Attaching → Stopped, once the handshake arrives.
    ///
    /// The engine is treated as paused at entry until the host resumes it.
    pub fn attached(&mut self) -> Result<(), EngineError> {
        self.expect(&[ProcessState::Attaching], "complete attach")?;
        self.state = ProcessState::Stopped;
        Ok(())
    }

    /// Transition: Running | Stopped → Stopped, on a break or exception.
    pub fn stopped(&mut self) -> Result<(), EngineError> {
        self.expect(&[ProcessState::Running, ProcessState::Stopped], "stop")?;
        self.state = ProcessState::Stopped;
        Ok(())
    }

    /// Transition: Stopped → Running, on continue or step.
    pub fn resumed(&mut self) -> Result<(), EngineError> {
        self.expect(&[ProcessState::Stopped], "resume")?;
        self.state = ProcessState::Running;
        Ok(())
    }

    /// Transition: Attaching | Running | Stopped → Detaching.
    pub fn begin_detach(&mut self) -> Result<(), EngineError> {
        self.expect(
            &[ProcessState::Attaching, ProcessState::Running, ProcessState::Stopped],
            "detach",
        )?;
        self.state = ProcessState::Detaching;
        Ok(())
    }

    /// Transition: any → Terminated.
    ///
    /// Returns `false` if the session had already terminated.
    pub fn terminated(&mut self) -> bool {
        let changed = self.state != ProcessState::Terminated;
        self.state = ProcessState::Terminated;
        changed
    }

    fn expect(&self, allowed: &[ProcessState], op: &str) -> Result<(), EngineError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(EngineError::InvalidState(format!(
            "cannot {op}: process is in {:?} state",
            self.state
        )))
    }
}

impl Default for ProcessLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_lifecycle_happy_path() {
        let mut life = ProcessLifecycle::new();
        assert_eq!(life.state(), ProcessState::Created);

        life.start().unwrap();
        assert_eq!(life.state(), ProcessState::Starting);
        life.begin_attach().unwrap();
        assert!(!life.is_attached());

        life.attached().unwrap();
        assert_eq!(life.state(), ProcessState::Stopped);
        assert!(life.is_attached());

        life.resumed().unwrap();
        assert_eq!(life.state(), ProcessState::Running);
        life.stopped().unwrap();
        life.stopped().unwrap();
        assert_eq!(life.state(), ProcessState::Stopped);

        life.begin_detach().unwrap();
        assert_eq!(life.state(), ProcessState::Detaching);
        assert!(life.terminated());
        assert_eq!(life.state(), ProcessState::Terminated);
    }

    #[test]
    fn connect_mode_skips_starting() {
        let mut life = ProcessLifecycle::new();
        life.begin_attach().unwrap();
        assert_eq!(life.state(), ProcessState::Attaching);
    }

    #[test]
    fn resume_while_running_is_rejected() {
        let mut life = ProcessLifecycle::new();
        life.begin_attach().unwrap();
        life.attached().unwrap();
        life.resumed().unwrap();
        let err = life.resumed().unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(err.to_string().contains("Running"));
    }

    #[test]
    fn nothing_but_terminate_after_terminated() {
        let mut life = ProcessLifecycle::new();
        assert!(life.terminated());
        assert!(!life.terminated());
        assert!(life.start().is_err());
        assert!(life.begin_attach().is_err());
        assert!(life.begin_detach().is_err());
        assert!(life.stopped().is_err());
    }

    #[test]
    fn detach_twice_is_rejected() {
        let mut life = ProcessLifecycle::new();
        life.begin_attach().unwrap();
        life.begin_detach().unwrap();
        assert!(life.begin_detach().is_err());
    }

    #[test]
    fn break_before_attach_is_rejected() {
        let mut life = ProcessLifecycle::new();
        life.start().unwrap();
        assert!(life.stopped().is_err());
        assert!(life.attached().is_err());
    }
}
