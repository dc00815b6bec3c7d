//! Property tests for the connection state machine.
//!
//! Random sequences of application calls, transport events and clock
//! ticks are replayed against a `MockTransport` and a `ManualScheduler`,
//! and after every step the manager must agree with a small reference
//! model of the transition table.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use skylink_connection::{ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStatus};
use skylink_router::{Diagnostics, Registry, Router};
use skylink_timer::ManualScheduler;
use skylink_transport::{CloseCode, MockTransport, TransportEvent};

const MAX_ATTEMPTS: u32 = 3;
const HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
enum Step {
    Connect,
    Disconnect,
    Reconnect,
    Opened,
    ClosedNormal,
    ClosedAbnormal,
    Error,
    /// Runs the clock up to the next pending timer.
    Advance,
    Pong,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Connect),
        Just(Step::Disconnect),
        Just(Step::Reconnect),
        Just(Step::Opened),
        Just(Step::ClosedNormal),
        Just(Step::ClosedAbnormal),
        Just(Step::Error),
        Just(Step::Advance),
        Just(Step::Pong),
    ]
}

/// What the manager should look like after each step.
#[derive(Debug, Default)]
struct Model {
    state: ConnectionState,
    attempts: u32,
    exhausted: bool,
    awaiting_ack: bool,
    reconnect_pending: bool,
}

impl Model {
    fn open(&mut self) {
        self.state = ConnectionState::Connecting;
        self.awaiting_ack = false;
        self.reconnect_pending = false;
    }

    fn restart(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
        self.open();
    }

    fn lost(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.awaiting_ack = false;
        if self.attempts < MAX_ATTEMPTS {
            self.attempts += 1;
            self.reconnect_pending = true;
        } else {
            self.exhausted = true;
            self.reconnect_pending = false;
        }
    }

    fn apply(&mut self, step: Step) {
        use ConnectionState::*;

        match (step, self.state) {
            (Step::Connect, Disconnected) => self.restart(),
            (Step::Connect, _) => {}
            (Step::Disconnect, _) => *self = Model::default(),
            (Step::Reconnect, Connecting) => {}
            (Step::Reconnect, _) => self.restart(),
            (Step::Opened, Connecting) => {
                self.state = Connected;
                self.attempts = 0;
                self.exhausted = false;
                self.awaiting_ack = false;
            }
            // A normal close only ends the session once it was established.
            (Step::ClosedNormal, Connected) => {
                self.state = Disconnected;
                self.awaiting_ack = false;
            }
            (Step::ClosedNormal | Step::ClosedAbnormal | Step::Error, Connecting | Connected) => {
                self.lost()
            }
            (Step::Advance, Disconnected) if self.reconnect_pending => self.open(),
            (Step::Advance, Connected) if self.awaiting_ack => self.lost(),
            (Step::Advance, Connected) => self.awaiting_ack = true,
            (Step::Pong, Connected) => self.awaiting_ack = false,
            _ => {}
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            reconnect_attempts: self.attempts,
            exhausted: self.exhausted,
        }
    }

    fn pending_timers(&self) -> usize {
        usize::from(self.state == ConnectionState::Connected || self.reconnect_pending)
    }
}

struct Rig {
    transport: MockTransport,
    clock: ManualScheduler,
    manager: ConnectionManager,
}

fn rig() -> Rig {
    let transport = MockTransport::new();
    let clock = ManualScheduler::new();
    let router = Arc::new(Router::new(Registry::new(), Diagnostics::default()));
    let manager = ConnectionManager::new(
        ConnectionConfig {
            url: "ws://test/ws".into(),
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: MAX_ATTEMPTS,
            heartbeat_interval: HEARTBEAT,
            reconnect_jitter: Duration::ZERO,
        },
        Arc::new(transport.clone()),
        Arc::new(clock.clone()),
        router,
    );
    Rig {
        transport,
        clock,
        manager,
    }
}

impl Rig {
    fn apply(&self, step: Step) {
        match step {
            Step::Connect => self.manager.connect(),
            Step::Disconnect => self.manager.disconnect(),
            Step::Reconnect => self.manager.reconnect(),
            Step::Opened => {
                self.transport.emit(TransportEvent::Opened);
            }
            Step::ClosedNormal => {
                self.transport.emit(TransportEvent::Closed {
                    code: CloseCode::NORMAL,
                    reason: String::new(),
                });
            }
            Step::ClosedAbnormal => {
                self.transport.emit(TransportEvent::Closed {
                    code: CloseCode::ABNORMAL,
                    reason: String::new(),
                });
            }
            Step::Error => {
                self.transport.emit(TransportEvent::Error("reset".into()));
            }
            Step::Advance => {
                let by = self.clock.next_deadline().unwrap_or(Duration::from_secs(1));
                self.clock.advance(by);
            }
            Step::Pong => {
                self.transport.emit_frame(r#"{"type":"pong"}"#);
            }
        }
    }
}

proptest! {
    #[test]
    fn transitions_follow_the_table(steps in proptest::collection::vec(step(), 1..64)) {
        let rig = rig();
        let mut status_rx = rig.manager.watch_status();
        let mut model = Model::default();

        for (i, step) in steps.into_iter().enumerate() {
            rig.apply(step);
            model.apply(step);

            let status = rig.manager.status();
            prop_assert_eq!(&status, &model.status(), "step {} ({:?})", i, step);
            prop_assert_eq!(rig.clock.pending(), model.pending_timers(), "step {} ({:?})", i, step);

            prop_assert_ne!(status.state, ConnectionState::Closing);
            prop_assert_ne!(status_rx.borrow_and_update().state, ConnectionState::Closing);
            if status.exhausted {
                prop_assert_eq!(status.state, ConnectionState::Disconnected);
                prop_assert_eq!(rig.clock.pending(), 0);
            }
            if status.state == ConnectionState::Connected {
                prop_assert_eq!(status.reconnect_attempts, 0);
            }
        }
    }

    #[test]
    fn disconnect_always_settles(steps in proptest::collection::vec(step(), 0..32)) {
        let rig = rig();
        for step in steps {
            rig.apply(step);
        }
        let opened = rig.transport.open_count();

        rig.manager.disconnect();
        rig.clock.advance(HEARTBEAT * 10);

        prop_assert_eq!(rig.manager.status(), ConnectionStatus::default());
        prop_assert_eq!(rig.clock.pending(), 0);
        prop_assert_eq!(rig.transport.open_count(), opened);
    }
}
