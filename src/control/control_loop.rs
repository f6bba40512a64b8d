//! Fixed-rate control loop with statum lifecycle
//!
//! ```text
//! Configured ──► Running ──► Stopped
//! ```
//!
//! Each tick services the pending speed-ramp and mode-cycle requests under a
//! single lock of the shared state, then pushes a changed mode to the
//! authority once the lock is released. Missed ticks are skipped rather than
//! replayed in a burst.

use crate::control::authority::{AuthorityLink, ModeAuthority};
use crate::control::mode::ModeCycle;
use crate::control::state::{SharedControlState, TickOutcome};
use crate::control::ControlError;
use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub control_freq_hz: u32,
    /// Stop the loop on a mode desync instead of logging it
    pub fatal_mode_desync: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            control_freq_hz: 20,
            fatal_mode_desync: false,
        }
    }
}

impl LoopSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.control_freq_hz.max(1)))
    }
}

/// Counters reported periodically and on shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub speed_ramps: u64,
    pub mode_cycles: u64,
    pub mode_desyncs: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Configured,
    Running,
    Stopped,
}

#[machine]
pub struct ControlLoop<S: LoopState> {
    control_state: SharedControlState,
    modes: ModeCycle,
    authority: Option<Arc<dyn ModeAuthority>>,
    settings: LoopSettings,
    stats: LoopStats,
}

impl<S: LoopState> ControlLoop<S> {
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }
}

impl ControlLoop<Configured> {
    pub fn create(
        state: SharedControlState,
        modes: ModeCycle,
        link: &AuthorityLink,
        settings: LoopSettings,
    ) -> Self {
        info!(
            "Configuring control loop at {} Hz, authority {:?}",
            settings.control_freq_hz, link
        );
        if !link.is_connected() {
            warn!("No mode authority: mode cycling disabled for this session");
        }
        Self::new(state, modes, link.authority(), settings, LoopStats::default())
    }

    pub fn start(self) -> ControlLoop<Running> {
        info!("Control loop running");
        self.transition()
    }
}

impl ControlLoop<Running> {
    /// Runs one control tick
    pub async fn tick(&mut self) -> Result<TickOutcome, ControlError> {
        self.stats.ticks += 1;

        let result = {
            let mut state = self.control_state.lock().await;
            state.tick(&self.modes, self.authority.is_some())
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, ControlError::ModeDesync { .. }) {
                    self.stats.mode_desyncs += 1;
                }
                return Err(e);
            }
        };

        if let Some(ceilings) = outcome.speed_ramp {
            self.stats.speed_ramps += 1;
            info!(
                "Speed ceiling raised to linear {:.3}, rotational {:.3}",
                ceilings.linear, ceilings.rotational
            );
        }

        if let (Some(mode), Some(authority)) = (&outcome.mode_change, &self.authority) {
            self.stats.mode_cycles += 1;
            info!("Requesting control mode {}", mode);
            if let Err(e) = authority.push_mode(mode) {
                error!("{}", e);
            }
        }

        Ok(outcome)
    }

    /// Ticks at the configured rate until `shutdown` is cancelled
    pub async fn run_until_shutdown(
        mut self,
        shutdown: CancellationToken,
    ) -> Result<ControlLoop<Stopped>, ControlError> {
        let mut interval = tokio::time::interval(self.settings.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received for control loop");
                    break;
                }

                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(outcome) => debug!("Tick outcome: {:?}", outcome),
                        Err(e @ ControlError::ModeDesync { .. }) if self.settings.fatal_mode_desync => {
                            error!("Stopping control loop: {}", e);
                            return Err(e);
                        }
                        Err(e) => error!("Control tick failed: {}", e),
                    }

                    let now = Local::now();
                    if now - last_stats_time > stats_interval {
                        info!("Control loop stats: {:?}", self.stats);
                        last_stats_time = now;
                    }
                }
            }
        }

        Ok(self.transition())
    }
}

/// Handle for the control loop task
pub struct ControlLoopHandle {
    task: JoinHandle<Result<LoopStats, ControlError>>,
}

impl ControlLoopHandle {
    pub fn spawn(control_loop: ControlLoop<Configured>, shutdown: CancellationToken) -> Self {
        let running = control_loop.start();
        let task = tokio::spawn(async move {
            let stopped = running.run_until_shutdown(shutdown).await?;
            info!("Control loop stopped: {:?}", stopped.stats());
            Ok(stopped.stats().clone())
        });
        Self { task }
    }

    /// Waits for the loop to finish
    pub async fn join(self) -> Result<LoopStats, ControlError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ControlError::TaskError(e.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::{AuthorityUpdate, ControlState};
    use crate::mapping::Ceilings;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingAuthority {
        pushed: StdMutex<Vec<String>>,
    }

    impl ModeAuthority for RecordingAuthority {
        fn push_mode(&self, mode: &str) -> Result<(), ControlError> {
            self.pushed.lock().unwrap().push(mode.to_string());
            Ok(())
        }
    }

    fn modes() -> ModeCycle {
        ModeCycle::new(vec!["A".into(), "B".into(), "C".into()]).unwrap()
    }

    fn shared_state() -> SharedControlState {
        ControlState::new(
            "A".to_string(),
            Ceilings {
                linear: 1.0,
                rotational: 1.0,
            },
            0.25,
        )
        .shared()
    }

    #[tokio::test]
    async fn tick_pushes_next_mode_to_authority() {
        let state = shared_state();
        let authority = Arc::new(RecordingAuthority::default());
        let link = AuthorityLink::Connected(authority.clone());
        let mut running =
            ControlLoop::create(state.clone(), modes(), &link, LoopSettings::default()).start();

        state.lock().await.pending_mode_cycle = true;
        let outcome = running.tick().await.unwrap();

        assert_eq!(outcome.mode_change.as_deref(), Some("B"));
        assert_eq!(state.lock().await.active_mode, "B");
        assert_eq!(*authority.pushed.lock().unwrap(), vec!["B".to_string()]);
        assert_eq!(running.stats().mode_cycles, 1);
    }

    #[tokio::test]
    async fn unavailable_authority_never_cycles() {
        let state = shared_state();
        let mut running = ControlLoop::create(
            state.clone(),
            modes(),
            &AuthorityLink::Unavailable,
            LoopSettings::default(),
        )
        .start();

        state.lock().await.pending_mode_cycle = true;
        for _ in 0..3 {
            let outcome = running.tick().await.unwrap();
            assert_eq!(outcome.mode_change, None);
        }
        assert_eq!(state.lock().await.active_mode, "A");
        assert_eq!(running.stats().mode_cycles, 0);
    }

    #[tokio::test]
    async fn authority_push_wins_over_local_cycle() {
        let state = shared_state();
        let authority = Arc::new(RecordingAuthority::default());
        let link = AuthorityLink::Connected(authority.clone());
        let mut running =
            ControlLoop::create(state.clone(), modes(), &link, LoopSettings::default()).start();

        {
            let mut guard = state.lock().await;
            guard.pending_mode_cycle = true;
            guard.pending_speed_ramp = true;
        }
        running.tick().await.unwrap();

        // Authority answers with its own view after the local cycle
        state.lock().await.apply_authority_update(&AuthorityUpdate {
            max_linear: Some(0.4),
            max_rotational: Some(0.3),
            mode: Some("C".to_string()),
        });

        let guard = state.lock().await;
        assert_eq!(guard.active_mode, "C");
        assert!((guard.max_linear - 0.4).abs() < f64::EPSILON);
        assert!((guard.ceiling_linear - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn concurrent_updates_never_expose_half_ticks() {
        let state = shared_state();
        let authority = Arc::new(RecordingAuthority::default());
        let link = AuthorityLink::Connected(authority);
        let mut running =
            ControlLoop::create(state.clone(), modes(), &link, LoopSettings::default()).start();

        let pusher_state = state.clone();
        let pusher = tokio::spawn(async move {
            for _ in 0..200 {
                pusher_state
                    .lock()
                    .await
                    .apply_authority_update(&AuthorityUpdate {
                        max_linear: Some(1.0),
                        max_rotational: Some(1.0),
                        mode: Some("A".to_string()),
                    });
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..200 {
            {
                let mut guard = state.lock().await;
                guard.pending_mode_cycle = true;
                guard.pending_speed_ramp = true;
            }
            running.tick().await.unwrap();

            // Both requests of a tick are serviced together or not at all
            let guard = state.lock().await;
            assert_eq!(guard.pending_mode_cycle, guard.pending_speed_ramp);
            assert!(modes().contains(&guard.active_mode));
        }
        pusher.await.unwrap();

        state.lock().await.apply_authority_update(&AuthorityUpdate {
            mode: Some("B".to_string()),
            ..AuthorityUpdate::default()
        });
        assert_eq!(state.lock().await.active_mode, "B");
    }

    #[tokio::test]
    async fn fatal_desync_stops_the_loop() {
        let state = shared_state();
        let link = AuthorityLink::Connected(Arc::new(RecordingAuthority::default()));
        let settings = LoopSettings {
            control_freq_hz: 100,
            fatal_mode_desync: true,
        };
        {
            let mut guard = state.lock().await;
            guard.active_mode = "Unknown".to_string();
            guard.pending_mode_cycle = true;
        }

        let handle = ControlLoopHandle::spawn(
            ControlLoop::create(state.clone(), modes(), &link, settings),
            CancellationToken::new(),
        );
        let result = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap();
        assert!(matches!(result, Err(ControlError::ModeDesync { .. })));
    }

    #[tokio::test]
    async fn non_fatal_desync_keeps_running_until_shutdown() {
        let state = shared_state();
        let link = AuthorityLink::Connected(Arc::new(RecordingAuthority::default()));
        let settings = LoopSettings {
            control_freq_hz: 100,
            fatal_mode_desync: false,
        };
        {
            let mut guard = state.lock().await;
            guard.active_mode = "Unknown".to_string();
            guard.pending_mode_cycle = true;
        }

        let shutdown = CancellationToken::new();
        let handle = ControlLoopHandle::spawn(
            ControlLoop::create(state.clone(), modes(), &link, settings),
            shutdown.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.mode_desyncs, 1);
        assert_eq!(state.lock().await.active_mode, "Unknown");
    }
}
