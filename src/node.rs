//! Sample handling for the teleop node
//!
//! Every sample is translated under the state lock so the ceilings it is
//! scaled with and the events it raises belong to the same state snapshot.
//! The command is published after the lock is released.

use crate::bus::CommandSink;
use crate::control::SharedControlState;
use crate::controller::sample::JoystickSample;
use crate::mapping::{InputTranslator, KeyMapping, MappingError, VelocityCommand};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What happened to one sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Unrecognized shape, nothing changed
    Rejected(MappingError),
    /// Translated while publishing is disabled
    Held(VelocityCommand),
    /// Translated and handed to the sink
    Emitted(VelocityCommand),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub samples: u64,
    pub rejected: u64,
    pub emitted: u64,
    pub send_failures: u64,
}

pub struct TeleopNode {
    state: SharedControlState,
    translator: InputTranslator,
    sink: Arc<dyn CommandSink>,
    stats: NodeStats,
}

impl TeleopNode {
    pub fn new(state: SharedControlState, mapping: KeyMapping, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            state,
            translator: InputTranslator::new(mapping),
            sink,
            stats: NodeStats::default(),
        }
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub async fn handle_sample(&mut self, sample: JoystickSample) -> SampleOutcome {
        self.stats.samples += 1;

        let received_at = sample.received_at;
        let (command, enabled) = {
            let mut state = self.state.lock().await;
            let translation = match self.translator.translate(sample, state.ceilings()) {
                Ok(translation) => translation,
                Err(e) => {
                    debug!(
                        "Dropping sample received at {}: {}",
                        received_at.format("%H:%M:%S%.3f"),
                        e
                    );
                    self.stats.rejected += 1;
                    return SampleOutcome::Rejected(e);
                }
            };
            let enabled = state.apply_events(&translation.events);
            (translation.command, enabled)
        };

        if !enabled {
            return SampleOutcome::Held(command);
        }

        match self.sink.send(&command) {
            Ok(()) => self.stats.emitted += 1,
            Err(e) => {
                self.stats.send_failures += 1;
                error!("{}", e);
            }
        }
        SampleOutcome::Emitted(command)
    }

    /// Handles samples until the channel closes or `shutdown` is cancelled
    pub async fn run(
        mut self,
        mut samples: mpsc::Receiver<JoystickSample>,
        shutdown: CancellationToken,
    ) -> NodeStats {
        info!("Teleop node handling samples");
        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received for teleop node");
                    break;
                }

                sample = samples.recv() => {
                    let Some(sample) = sample else {
                        info!("Sample channel closed");
                        break;
                    };
                    let outcome = self.handle_sample(sample).await;
                    debug!("Sample outcome: {:?}", outcome);

                    let now = Local::now();
                    if now - last_stats_time > stats_interval {
                        info!("Teleop node stats: {:?}", self.stats);
                        last_stats_time = now;
                    }
                }
            }
        }

        info!("Teleop node stopped: {:?}", self.stats);
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusError;
    use crate::control::{
        AuthorityLink, ControlError, ControlLoop, ControlState, LoopSettings, ModeAuthority,
        ModeCycle,
    };
    use crate::mapping::Ceilings;
    use std::sync::Mutex as StdMutex;

    const LB: usize = 4;
    const Y: usize = 3;
    const RB: usize = 5;

    #[derive(Default)]
    struct RecordingSink {
        sent: StdMutex<Vec<VelocityCommand>>,
    }

    impl CommandSink for RecordingSink {
        fn send(&self, command: &VelocityCommand) -> Result<(), BusError> {
            self.sent.lock().unwrap().push(*command);
            Ok(())
        }
    }

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
        ModeCycle::new(vec![
            "Joystick".into(),
            "Autonomous".into(),
            "Interface".into(),
        ])
        .unwrap()
    }

    fn shared_state() -> SharedControlState {
        ControlState::new(
            "Joystick".to_string(),
            Ceilings {
                linear: 1.0,
                rotational: 1.0,
            },
            0.25,
        )
        .shared()
    }

    fn xinput(pressed: &[usize], left_y: f32) -> JoystickSample {
        let mut buttons = vec![false; 11];
        for &idx in pressed {
            buttons[idx] = true;
        }
        let mut axes = vec![0.0; 8];
        axes[1] = left_y;
        JoystickSample::new(buttons, axes)
    }

    fn node(state: SharedControlState) -> (TeleopNode, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let node = TeleopNode::new(state, KeyMapping::default_config(), sink.clone());
        (node, sink)
    }

    #[tokio::test]
    async fn disabled_node_holds_commands() {
        let state = shared_state();
        let (mut node, sink) = node(state.clone());

        let outcome = node.handle_sample(xinput(&[], 1.0)).await;
        assert_eq!(
            outcome,
            SampleOutcome::Held(VelocityCommand {
                linear_x: 0.25,
                linear_y: 0.0,
                angular_z: 0.0,
            })
        );
        assert!(sink.sent.lock().unwrap().is_empty());
        assert!(!state.lock().await.publish_enabled);
    }

    #[tokio::test]
    async fn rejected_sample_leaves_state_unchanged() {
        let state = shared_state();
        let (mut node, sink) = node(state.clone());
        let before = state.lock().await.clone();

        let outcome = node
            .handle_sample(JoystickSample::new(vec![true; 11], vec![1.0; 7]))
            .await;

        assert!(matches!(
            outcome,
            SampleOutcome::Rejected(MappingError::UnrecognizedProfile { axis_count: 7 })
        ));
        assert_eq!(*state.lock().await, before);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(node.stats().rejected, 1);
    }

    #[tokio::test]
    async fn held_dead_man_toggles_once() {
        let state = shared_state();
        let (mut node, sink) = node(state.clone());

        node.handle_sample(xinput(&[LB], 0.0)).await;
        node.handle_sample(xinput(&[LB], 0.0)).await;
        node.handle_sample(xinput(&[LB], 0.0)).await;

        assert!(state.lock().await.publish_enabled);
        assert_eq!(sink.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn end_to_end_enable_ramp_and_cycle() {
        let state = shared_state();
        let (mut node, sink) = node(state.clone());
        let authority = Arc::new(RecordingAuthority::default());
        let link = AuthorityLink::Connected(authority.clone());
        let mut control =
            ControlLoop::create(state.clone(), modes(), &link, LoopSettings::default()).start();

        // LB press enables, release keeps it enabled
        assert!(matches!(
            node.handle_sample(xinput(&[LB], 0.0)).await,
            SampleOutcome::Emitted(_)
        ));
        node.handle_sample(xinput(&[], 0.0)).await;
        assert!(state.lock().await.publish_enabled);

        // Full stick at the initial ceiling
        let outcome = node.handle_sample(xinput(&[], 1.0)).await;
        assert_eq!(
            outcome,
            SampleOutcome::Emitted(VelocityCommand {
                linear_x: 0.25,
                linear_y: 0.0,
                angular_z: 0.0,
            })
        );

        // Y then a tick doubles the ceiling
        node.handle_sample(xinput(&[Y], 0.0)).await;
        control.tick().await.unwrap();
        let outcome = node.handle_sample(xinput(&[], 1.0)).await;
        assert_eq!(
            outcome,
            SampleOutcome::Emitted(VelocityCommand {
                linear_x: 0.5,
                linear_y: 0.0,
                angular_z: 0.0,
            })
        );

        // RB then a tick cycles the mode and pushes it
        node.handle_sample(xinput(&[RB], 0.0)).await;
        control.tick().await.unwrap();
        assert_eq!(state.lock().await.active_mode, "Autonomous");
        assert_eq!(
            *authority.pushed.lock().unwrap(),
            vec!["Autonomous".to_string()]
        );

        // Second LB press disables publishing again
        node.handle_sample(xinput(&[LB], 0.0)).await;
        let sent_before = sink.sent.lock().unwrap().len();
        assert!(matches!(
            node.handle_sample(xinput(&[], 1.0)).await,
            SampleOutcome::Held(_)
        ));
        assert_eq!(sink.sent.lock().unwrap().len(), sent_before);
    }

    #[tokio::test]
    async fn run_stops_when_channel_closes() {
        let (teleop, sink) = node(shared_state());
        let (tx, rx) = mpsc::channel(8);

        tx.send(xinput(&[LB], 0.0)).await.unwrap();
        tx.send(xinput(&[], 1.0)).await.unwrap();
        drop(tx);

        let stats = teleop.run(rx, CancellationToken::new()).await;
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.emitted, 2);
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }
}
