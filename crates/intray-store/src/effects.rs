// ABOUTME: Side effects around storage mutations: lifecycle hooks and tmux status publishing.
// ABOUTME: The collaborators are traits; stores only decide when to call them and how to treat failures.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use intray_core::{NewNotification, Notification, escape_message};

use crate::error::StorageError;

/// tmux user option that carries the number of active notifications.
pub const ACTIVE_COUNT_OPTION: &str = "@intray_active_count";

/// Environment handed to a hook, ordered for stable logging.
pub type HookEnv = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    PreAdd,
    PostAdd,
    PreDismiss,
    PostDismiss,
    PreClear,
    PostClear,
    PreCleanup,
    PostCleanup,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreAdd => "pre-add",
            Self::PostAdd => "post-add",
            Self::PreDismiss => "pre-dismiss",
            Self::PostDismiss => "post-dismiss",
            Self::PreClear => "pre-clear",
            Self::PostClear => "post-clear",
            Self::PreCleanup => "pre-cleanup",
            Self::PostCleanup => "post-cleanup",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a hook returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookFailureMode {
    #[default]
    Abort,
    Warn,
    Ignore,
}

impl FromStr for HookFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "warn" => Ok(Self::Warn),
            "ignore" => Ok(Self::Ignore),
            other => Err(other.to_string()),
        }
    }
}

/// Runs user hook scripts for a lifecycle point.
pub trait HookRunner: Send + Sync {
    fn run(&self, point: HookPoint, env: &HookEnv) -> anyhow::Result<()>;
}

/// Publishes status values to the terminal multiplexer.
pub trait StatusPublisher: Send + Sync {
    fn has_session(&self) -> anyhow::Result<bool>;
    fn set_status_option(&self, name: &str, value: &str) -> anyhow::Result<()>;
}

/// The side-effect collaborators a store calls around each mutation.
/// `Effects::none()` disables both.
#[derive(Clone, Default)]
pub struct Effects {
    hooks: Option<Arc<dyn HookRunner>>,
    status: Option<Arc<dyn StatusPublisher>>,
    failure_mode: HookFailureMode,
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effects")
            .field("hooks", &self.hooks.is_some())
            .field("status", &self.status.is_some())
            .field("failure_mode", &self.failure_mode)
            .finish()
    }
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HookRunner>, failure_mode: HookFailureMode) -> Self {
        self.hooks = Some(hooks);
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusPublisher>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn failure_mode(&self) -> HookFailureMode {
        self.failure_mode
    }

    /// Run a pre-operation hook. Under `Abort` a failure vetoes the
    /// operation with `HookAborted`.
    pub fn run_pre(&self, point: HookPoint, env: &HookEnv) -> Result<(), StorageError> {
        let Some(hooks) = &self.hooks else {
            return Ok(());
        };
        match hooks.run(point, env) {
            Ok(()) => Ok(()),
            Err(e) => match self.failure_mode {
                HookFailureMode::Abort => Err(StorageError::HookAborted {
                    point: point.to_string(),
                    reason: format!("{:#}", e),
                }),
                HookFailureMode::Warn => {
                    tracing::warn!(hook = %point, error = %e, "hook failed, continuing");
                    Ok(())
                }
                HookFailureMode::Ignore => Ok(()),
            },
        }
    }

    /// Run a post-operation hook. The mutation already happened, so a
    /// failure is only logged.
    pub fn run_post(&self, point: HookPoint, env: &HookEnv) {
        let Some(hooks) = &self.hooks else {
            return;
        };
        if let Err(e) = hooks.run(point, env)
            && self.failure_mode != HookFailureMode::Ignore
        {
            tracing::warn!(hook = %point, error = %e, "post hook failed");
        }
    }

    /// Publish the active count when a session is attached. `count` is only
    /// evaluated when there is somewhere to publish it.
    pub fn publish_active_count<F>(&self, count: F)
    where
        F: FnOnce() -> Result<usize, StorageError>,
    {
        let Some(status) = &self.status else {
            return;
        };
        match status.has_session() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(error = %e, "could not query tmux session");
                return;
            }
        }
        let count = match count() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not count active notifications");
                return;
            }
        };
        if let Err(e) = status.set_status_option(ACTIVE_COUNT_OPTION, &count.to_string()) {
            tracing::warn!(error = %e, "failed to publish active count");
        }
    }
}

/// Hook environment for a notification that is about to be created.
pub fn new_notification_env(input: &NewNotification, timestamp: &str) -> HookEnv {
    let mut env = HookEnv::new();
    env.insert("LEVEL", input.level.clone());
    env.insert("MESSAGE", input.message.clone());
    env.insert("ESCAPED_MESSAGE", escape_message(&input.message));
    env.insert("TIMESTAMP", timestamp.to_string());
    env.insert("SESSION", input.session.clone());
    env.insert("WINDOW", input.window.clone());
    env.insert("PANE", input.pane.clone());
    env.insert("PANE_CREATED", input.pane_created.clone());
    env
}

/// Hook environment for a stored notification.
pub fn notification_env(n: &Notification) -> HookEnv {
    let mut env = HookEnv::new();
    env.insert("NOTIFICATION_ID", n.id.to_string());
    env.insert("LEVEL", n.level.as_str().to_string());
    env.insert("MESSAGE", n.message.clone());
    env.insert("ESCAPED_MESSAGE", escape_message(&n.message));
    env.insert("TIMESTAMP", n.timestamp.clone());
    env.insert("SESSION", n.session.clone());
    env.insert("WINDOW", n.window.clone());
    env.insert("PANE", n.pane.clone());
    env.insert("PANE_CREATED", n.pane_created.clone());
    env
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every hook call and fails the configured points.
    #[derive(Default)]
    pub struct RecordingHooks {
        pub calls: Mutex<Vec<(HookPoint, HookEnv)>>,
        pub fail_on: Vec<HookPoint>,
    }

    impl RecordingHooks {
        pub fn failing(points: &[HookPoint]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: points.to_vec(),
            }
        }

        pub fn points(&self) -> Vec<HookPoint> {
            self.calls.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }
    }

    impl HookRunner for RecordingHooks {
        fn run(&self, point: HookPoint, env: &HookEnv) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((point, env.clone()));
            if self.fail_on.contains(&point) {
                anyhow::bail!("hook {} exited with status 1", point);
            }
            Ok(())
        }
    }

    /// Captures published status options.
    #[derive(Default)]
    pub struct RecordingStatus {
        pub attached: bool,
        pub published: Mutex<Vec<(String, String)>>,
    }

    impl RecordingStatus {
        pub fn attached() -> Self {
            Self {
                attached: true,
                published: Mutex::new(Vec::new()),
            }
        }

        pub fn last(&self) -> Option<(String, String)> {
            self.published.lock().unwrap().last().cloned()
        }
    }

    impl StatusPublisher for RecordingStatus {
        fn has_session(&self) -> anyhow::Result<bool> {
            Ok(self.attached)
        }

        fn set_status_option(&self, name: &str, value: &str) -> anyhow::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((name.to_string(), value.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn failure_mode_parses() {
        assert_eq!("abort".parse::<HookFailureMode>().unwrap(), HookFailureMode::Abort);
        assert_eq!(" WARN ".parse::<HookFailureMode>().unwrap(), HookFailureMode::Warn);
        assert_eq!("ignore".parse::<HookFailureMode>().unwrap(), HookFailureMode::Ignore);
        assert!("explode".parse::<HookFailureMode>().is_err());
        assert_eq!(HookFailureMode::default(), HookFailureMode::Abort);
    }

    #[test]
    fn pre_hook_failure_respects_mode() {
        let env = HookEnv::new();
        let hooks = Arc::new(RecordingHooks::failing(&[HookPoint::PreAdd]));

        let abort = Effects::none().with_hooks(hooks.clone(), HookFailureMode::Abort);
        let err = abort.run_pre(HookPoint::PreAdd, &env).unwrap_err();
        assert!(matches!(err, StorageError::HookAborted { ref point, .. } if point == "pre-add"));

        let warn = Effects::none().with_hooks(hooks.clone(), HookFailureMode::Warn);
        assert!(warn.run_pre(HookPoint::PreAdd, &env).is_ok());

        let ignore = Effects::none().with_hooks(hooks.clone(), HookFailureMode::Ignore);
        assert!(ignore.run_pre(HookPoint::PreAdd, &env).is_ok());

        assert_eq!(hooks.points().len(), 3);
    }

    #[test]
    fn no_hooks_means_no_veto() {
        assert!(Effects::none().run_pre(HookPoint::PreClear, &HookEnv::new()).is_ok());
        Effects::none().run_post(HookPoint::PostClear, &HookEnv::new());
    }

    #[test]
    fn publish_only_when_attached() {
        let detached = Arc::new(RecordingStatus::default());
        Effects::none()
            .with_status(detached.clone())
            .publish_active_count(|| panic!("count must not be computed without a session"));
        assert!(detached.last().is_none());

        let attached = Arc::new(RecordingStatus::attached());
        Effects::none()
            .with_status(attached.clone())
            .publish_active_count(|| Ok(4));
        assert_eq!(
            attached.last(),
            Some((ACTIVE_COUNT_OPTION.to_string(), "4".to_string()))
        );
    }

    #[test]
    fn notification_env_carries_escaped_message() {
        let input = NewNotification::new("a\tb", "info").with_location("s", "w", "p");
        let env = new_notification_env(&input, "2026-01-01T00:00:00Z");
        assert_eq!(env["MESSAGE"], "a\tb");
        assert_eq!(env["ESCAPED_MESSAGE"], "a\\tb");
        assert!(!env.contains_key("NOTIFICATION_ID"));

        let n = input.into_notification(9, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(notification_env(&n)["NOTIFICATION_ID"], "9");
    }
}
