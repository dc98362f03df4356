//! # Profile Runtime
//!
//! Supervises which profile, if any, overrides the semantic stage.
//!
//! ## State Machine
//!
//! ```text
//!            switch ok             first update ok
//! Unloaded ───────────▶ Loaded ─────────────────▶ Active
//!     ▲                    │                         │
//!     │ rollback (no       │ fault                   │ fault
//!     │ history) / unload  ▼                         ▼
//!     └─────────────────── Error ◀───────────────────┘
//! ```
//!
//! A switch builds a fresh engine and only replaces the current one once the
//! new profile has loaded, so a failed switch is invisible to callers.
//! Rollback restores the last known-good profile (one level of history) or
//! falls back to the default pipeline. Every transition that discards a
//! profile raises a reset request so the pipeline drops held state.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::engine::{EngineState, ScriptEngine};
use super::Profile;
use crate::capture::action::ControlAction;
use crate::capture::frame::RawInputFrame;
use crate::mapping::device::OutputDelta;
use crate::mapping::output::RuntimeStatus;

/// Builds a fresh engine for each load.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn ScriptEngine> + Send>;

/// The runtime shared between the frame loop and command sources.
pub type SharedProfileRuntime = Arc<Mutex<ProfileRuntime>>;

/// Externally visible runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Unloaded,
    Loaded,
    Active,
    Error,
}

impl std::fmt::Display for ProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileState::Unloaded => write!(f, "Unloaded"),
            ProfileState::Loaded => write!(f, "Loaded"),
            ProfileState::Active => write!(f, "Active"),
            ProfileState::Error => write!(f, "Error"),
        }
    }
}

/// Result of the semantic stage for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileFrame {
    /// Actions handed to the mapping stage.
    pub actions: Vec<ControlAction>,
    /// Extra keys/axes to assert after mapping.
    pub delta: Option<OutputDelta>,
    pub status: RuntimeStatus,
}

impl ProfileFrame {
    fn default_pipeline(actions: Vec<ControlAction>, status: RuntimeStatus) -> Self {
        Self {
            actions,
            delta: None,
            status,
        }
    }
}

/// Profile supervisor.
pub struct ProfileRuntime {
    factory: EngineFactory,
    engine: Option<Box<dyn ScriptEngine>>,
    current: Option<Profile>,
    previous: Option<Profile>,
    state: ProfileState,
    last_error: Option<String>,
    reset_requested: bool,
}

impl ProfileRuntime {
    #[must_use]
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            engine: None,
            current: None,
            previous: None,
            state: ProfileState::Unloaded,
            last_error: None,
            reset_requested: false,
        }
    }

    /// Wraps the runtime for sharing with other threads.
    #[must_use]
    pub fn shared(self) -> SharedProfileRuntime {
        Arc::new(Mutex::new(self))
    }

    /// Structural check of `profile`; logs the reason on rejection.
    #[must_use]
    pub fn validate(&self, profile: &Profile) -> bool {
        match profile.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejected profile: {}", e);
                false
            }
        }
    }

    /// Validates and loads `profile`, replacing the current one only on success.
    pub fn switch_profile(&mut self, profile: Profile) -> bool {
        if let Err(e) = profile.validate() {
            warn!("Rejected profile: {}", e);
            self.last_error = Some(e.to_string());
            return false;
        }

        let engine = match self.load(&profile) {
            Ok(engine) => engine,
            Err(message) => {
                warn!("Failed to load profile '{}': {}", profile, message);
                self.last_error = Some(message);
                return false;
            }
        };

        self.teardown_engine();
        let outgoing = self.current.take();
        if self.state != ProfileState::Error {
            if let Some(outgoing) = outgoing {
                self.previous = Some(outgoing);
            }
        }

        info!("Switched to profile '{}'", profile);
        self.engine = Some(engine);
        self.current = Some(profile);
        self.state = ProfileState::Loaded;
        self.last_error = None;
        self.reset_requested = true;
        true
    }

    /// Tears down the active profile and returns to the default pipeline.
    pub fn unload_current_profile(&mut self) {
        self.teardown_engine();
        if let Some(profile) = self.current.take() {
            info!("Unloaded profile '{}'", profile);
            if self.state != ProfileState::Error {
                self.previous = Some(profile);
            }
        }
        self.state = ProfileState::Unloaded;
        self.reset_requested = true;
    }

    /// True iff the engine (or the runtime on its behalf) is in an error state.
    #[must_use]
    pub fn need_rollback(&self) -> bool {
        self.state == ProfileState::Error
            || self
                .engine
                .as_ref()
                .is_some_and(|engine| engine.state() == EngineState::Error)
    }

    /// Restores the last known-good profile, or the default pipeline if
    /// there is none. Always ends in a non-error state.
    pub fn rollback_profile(&mut self) -> bool {
        self.teardown_engine();
        let failed = self.current.take();
        self.reset_requested = true;

        if let Some(profile) = self.previous.take() {
            match self.load(&profile) {
                Ok(engine) => {
                    info!(
                        "Rolled back from '{}' to profile '{}'",
                        failed.as_ref().map_or("<none>", Profile::name),
                        profile
                    );
                    self.engine = Some(engine);
                    self.current = Some(profile);
                    self.state = ProfileState::Loaded;
                    return true;
                }
                Err(message) => {
                    warn!("Previous profile '{}' failed to reload: {}", profile, message);
                    self.last_error = Some(message);
                }
            }
        }

        info!("Rolled back to the default pipeline");
        self.state = ProfileState::Unloaded;
        true
    }

    /// Rolls back if needed. Never leaves the runtime in `Error`.
    pub fn auto_rollback(&mut self) {
        if self.need_rollback() {
            warn!(
                "Profile fault detected ({}), rolling back",
                self.last_error().unwrap_or_else(|| "unknown".into())
            );
            self.rollback_profile();
        }
    }

    #[must_use]
    pub fn current_profile(&self) -> Option<&Profile> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn previous_profile(&self) -> Option<&Profile> {
        self.previous.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> ProfileState {
        if self.need_rollback() {
            ProfileState::Error
        } else {
            self.state
        }
    }

    /// Most recent fault or load failure, engine errors first.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.engine
            .as_ref()
            .and_then(|engine| engine.last_error())
            .or_else(|| self.last_error.clone())
    }

    /// Returns and clears the pending held-state reset.
    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    /// Runs the active profile, if any, over the default-processed actions.
    ///
    /// A fault or overrun moves the runtime to `Error` and yields the default
    /// actions unchanged, so no half-applied script result is ever mapped.
    pub fn execute_frame(
        &mut self,
        raw: &RawInputFrame,
        actions: Vec<ControlAction>,
        budget: Duration,
    ) -> ProfileFrame {
        if self.need_rollback() {
            return ProfileFrame::default_pipeline(actions, RuntimeStatus::Warning);
        }
        let Some(engine) = self.engine.as_mut() else {
            return ProfileFrame::default_pipeline(actions, RuntimeStatus::Ok);
        };

        match engine.update(raw, &actions, budget) {
            Ok(output) => {
                if self.state == ProfileState::Loaded {
                    debug!("Profile is active");
                    self.state = ProfileState::Active;
                }
                ProfileFrame {
                    actions: output.actions.unwrap_or(actions),
                    delta: (!output.delta.is_empty()).then_some(output.delta),
                    status: RuntimeStatus::Ok,
                }
            }
            Err(e) => {
                error!("Profile update failed: {}", e);
                self.state = ProfileState::Error;
                self.last_error = Some(e.to_string());
                ProfileFrame::default_pipeline(actions, RuntimeStatus::Warning)
            }
        }
    }

    fn load(&self, profile: &Profile) -> Result<Box<dyn ScriptEngine>, String> {
        let mut engine = (self.factory)();
        let loaded = engine
            .init()
            .and_then(|()| engine.load_script(profile));
        match loaded {
            Ok(()) => Ok(engine),
            Err(e) => {
                engine.shutdown();
                Err(e.to_string())
            }
        }
    }

    fn teardown_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.reset();
            engine.shutdown();
        }
    }
}

impl std::fmt::Debug for ProfileRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRuntime")
            .field("current", &self.current.as_ref().map(Profile::name))
            .field("previous", &self.previous.as_ref().map(Profile::name))
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Drop for ProfileRuntime {
    fn drop(&mut self) {
        self.teardown_engine();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlMapperError;
    use crate::profile::engine::{MockScriptEngine, ScriptOutput};

    const SCRIPT: &str = "fn update(input) { () }";
    const BUDGET: Duration = Duration::from_millis(5);

    /// Engines that fail to load profiles named "broken" and fault on every
    /// update for profiles named "faulty".
    fn mock_factory() -> EngineFactory {
        Box::new(|| {
            let mut mock = MockScriptEngine::new();
            let faulty = Arc::new(Mutex::new(false));
            let faulty_on_load = Arc::clone(&faulty);

            mock.expect_init().returning(|| Ok(()));
            mock.expect_load_script().returning(move |profile| {
                if profile.name() == "broken" {
                    return Err(ControlMapperError::Script("broken".into()));
                }
                *faulty_on_load.lock().unwrap() = profile.name() == "faulty";
                Ok(())
            });
            mock.expect_update().returning(move |_, actions, _| {
                if *faulty.lock().unwrap() {
                    Err(ControlMapperError::EngineFault("boom".into()))
                } else {
                    Ok(ScriptOutput {
                        actions: Some(actions.iter().rev().cloned().collect()),
                        delta: OutputDelta::default(),
                    })
                }
            });
            mock.expect_reset().return_const(());
            mock.expect_shutdown().return_const(());
            mock.expect_state().return_const(EngineState::Loaded);
            mock.expect_last_error().return_const(None::<String>);
            Box::new(mock) as Box<dyn ScriptEngine>
        })
    }

    fn runtime() -> ProfileRuntime {
        ProfileRuntime::new(mock_factory())
    }

    fn profile(name: &str) -> Profile {
        Profile::new(name, "1.0", SCRIPT)
    }

    fn two_actions() -> Vec<ControlAction> {
        vec![
            ControlAction::digital("a", true, 0),
            ControlAction::digital("b", true, 0),
        ]
    }

    // ==================== Switch Tests ====================

    #[test]
    fn test_starts_unloaded() {
        let runtime = runtime();
        assert_eq!(runtime.state(), ProfileState::Unloaded);
        assert!(runtime.current_profile().is_none());
        assert!(!runtime.need_rollback());
    }

    #[test]
    fn test_switch_valid_profile() {
        let mut runtime = runtime();
        assert!(runtime.switch_profile(profile("A")));
        assert_eq!(runtime.current_profile().map(Profile::name), Some("A"));
        assert_eq!(runtime.state(), ProfileState::Loaded);
        assert!(runtime.take_reset_request());
        assert!(!runtime.take_reset_request());
    }

    #[test]
    fn test_switch_to_invalid_keeps_current() {
        let mut runtime = runtime();
        assert!(runtime.switch_profile(profile("A")));

        let invalid = Profile::new("B", "1.0", "fn tick(input) { () }");
        assert!(!runtime.validate(&invalid));
        assert!(!runtime.switch_profile(invalid));
        assert_eq!(runtime.current_profile().map(Profile::name), Some("A"));
        assert_eq!(runtime.state(), ProfileState::Loaded);
        assert!(runtime.last_error().is_some());
    }

    #[test]
    fn test_switch_load_failure_keeps_current() {
        let mut runtime = runtime();
        assert!(runtime.switch_profile(profile("A")));
        let _ = runtime.take_reset_request();

        assert!(!runtime.switch_profile(profile("broken")));
        assert_eq!(runtime.current_profile().map(Profile::name), Some("A"));
        assert!(!runtime.take_reset_request());

        // The original engine is still the one running
        let frame = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert_eq!(frame.actions[0].operation_type(), "b");
    }

    #[test]
    fn test_switch_records_history() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("A"));
        runtime.switch_profile(profile("B"));
        assert_eq!(runtime.previous_profile().map(Profile::name), Some("A"));
    }

    // ==================== Execution Tests ====================

    #[test]
    fn test_no_profile_passes_default_actions() {
        let mut runtime = runtime();
        let frame = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert_eq!(frame.actions, two_actions());
        assert_eq!(frame.status, RuntimeStatus::Ok);
        assert!(frame.delta.is_none());
    }

    #[test]
    fn test_first_update_activates() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("A"));
        let frame = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert_eq!(frame.actions[0].operation_type(), "b");
        assert_eq!(runtime.state(), ProfileState::Active);
    }

    #[test]
    fn test_fault_falls_back_to_default_actions() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("faulty"));

        let frame = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert_eq!(frame.actions, two_actions());
        assert_eq!(frame.status, RuntimeStatus::Warning);
        assert!(runtime.need_rollback());
        assert_eq!(runtime.state(), ProfileState::Error);
        assert!(runtime.last_error().unwrap().contains("boom"));

        // Stays on the default pipeline until rolled back
        let frame = runtime.execute_frame(&RawInputFrame::at(2), two_actions(), BUDGET);
        assert_eq!(frame.actions, two_actions());
        assert_eq!(frame.status, RuntimeStatus::Warning);
    }

    // ==================== Unload Tests ====================

    #[test]
    fn test_unload_clears_current() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("A"));
        let _ = runtime.take_reset_request();

        runtime.unload_current_profile();
        assert!(runtime.current_profile().is_none());
        assert_eq!(runtime.state(), ProfileState::Unloaded);
        assert!(runtime.take_reset_request());

        let frame = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert_eq!(frame.actions, two_actions());
    }

    // ==================== Rollback Tests ====================

    #[test]
    fn test_rollback_restores_previous() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("A"));
        runtime.switch_profile(profile("faulty"));
        let _ = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        assert!(runtime.need_rollback());

        assert!(runtime.rollback_profile());
        assert_eq!(runtime.current_profile().map(Profile::name), Some("A"));
        assert_eq!(runtime.state(), ProfileState::Loaded);
        assert!(runtime.previous_profile().is_none());
    }

    #[test]
    fn test_rollback_without_history_returns_to_default() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("faulty"));
        let _ = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        let _ = runtime.take_reset_request();

        assert!(runtime.rollback_profile());
        assert!(runtime.current_profile().is_none());
        assert_eq!(runtime.state(), ProfileState::Unloaded);
        assert!(runtime.take_reset_request());
    }

    #[test]
    fn test_faulted_profile_is_not_history() {
        let mut runtime = runtime();
        runtime.switch_profile(profile("faulty"));
        let _ = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        runtime.switch_profile(profile("B"));
        assert!(runtime.previous_profile().is_none());
    }

    #[test]
    fn test_auto_rollback_never_leaves_error() {
        let mut runtime = runtime();
        runtime.auto_rollback();
        assert_eq!(runtime.state(), ProfileState::Unloaded);

        runtime.switch_profile(profile("faulty"));
        let _ = runtime.execute_frame(&RawInputFrame::at(1), two_actions(), BUDGET);
        runtime.auto_rollback();
        assert_ne!(runtime.state(), ProfileState::Error);
        assert!(!runtime.need_rollback());
    }

    #[test]
    fn test_shared_runtime_across_threads() {
        let shared = runtime().shared();
        let remote = Arc::clone(&shared);
        std::thread::spawn(move || {
            assert!(remote.lock().unwrap().switch_profile(profile("A")));
        })
        .join()
        .unwrap();
        assert_eq!(
            shared.lock().unwrap().current_profile().map(Profile::name),
            Some("A")
        );
    }
}
