use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::sim::{Event, SimError, Simulator, Time, World};

#[derive(Default)]
struct DummyWorld {
    ticks: usize,
}

impl World for DummyWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks = self.ticks.saturating_add(1);
    }
}

struct Push {
    id: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl Event for Push {
    fn execute(self: Box<Self>, _sim: &mut Simulator, _world: &mut dyn World) {
        let Push { id, log } = *self;
        log.lock().expect("log lock").push(id);
    }
}

struct PushThenScheduleNow {
    id: u32,
    next_id: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl Event for PushThenScheduleNow {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let PushThenScheduleNow { id, next_id, log } = *self;
        log.lock().expect("log lock").push(id);
        sim.schedule_now(Push { id: next_id, log });
    }
}

fn push(id: u32, log: &Arc<Mutex<Vec<u32>>>) -> Push {
    Push {
        id,
        log: Arc::clone(log),
    }
}

#[test]
fn events_fire_in_time_then_insertion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    sim.schedule(Time(10), push(1, &log));
    sim.schedule(Time(5), push(2, &log));
    sim.schedule(Time(10), push(3, &log));

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(&*log.lock().expect("log lock"), &[2, 1, 3]);
    assert_eq!(world.ticks, 3);
    assert_eq!(sim.now(), Time(10));
}

#[test]
fn schedule_now_runs_after_events_already_queued_for_now() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    sim.schedule(Time(1), PushThenScheduleNow {
        id: 1,
        next_id: 3,
        log: Arc::clone(&log),
    });
    sim.schedule(Time(1), push(2, &log));

    sim.run(&mut DummyWorld::default());
    assert_eq!(&*log.lock().expect("log lock"), &[1, 2, 3]);
}

#[test]
fn negative_delay_is_a_configuration_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    let err = sim.schedule_in(Time(-5), push(1, &log));
    assert!(matches!(err, Err(SimError::InvalidDelay { .. })));
}

#[test]
fn cancel_is_lazy_and_idempotent() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    let keep = sim.schedule(Time(1), push(1, &log));
    let gone = sim.schedule(Time(2), push(2, &log));

    assert!(!sim.is_expired(gone));
    assert_eq!(sim.delay_left(gone), Some(Time(2)));

    sim.cancel(gone);
    sim.cancel(gone); // no-op
    assert!(sim.is_expired(gone));
    assert_eq!(sim.delay_left(gone), None);
    assert!(!sim.is_expired(keep));

    sim.run(&mut DummyWorld::default());
    assert_eq!(&*log.lock().expect("log lock"), &[1]);
    // Cancelling an executed event is also a no-op.
    sim.cancel(keep);
}

#[test]
fn run_until_stops_at_horizon_and_advances_clock() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    sim.schedule(Time(5), push(1, &log));
    sim.schedule(Time(50), push(2, &log));

    sim.run_until(Time(10), &mut DummyWorld::default());
    assert_eq!(&*log.lock().expect("log lock"), &[1]);
    assert_eq!(sim.now(), Time(10));

    // The late event is still queued and fires on the next run.
    sim.run(&mut DummyWorld::default());
    assert_eq!(&*log.lock().expect("log lock"), &[1, 2]);
}

#[test]
fn stop_sentinel_halts_the_loop() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    sim.schedule(Time(1), push(1, &log));
    sim.stop_in(Time(2)).expect("stop sentinel");
    sim.schedule(Time(3), push(2, &log));

    sim.run(&mut DummyWorld::default());
    assert_eq!(&*log.lock().expect("log lock"), &[1]);
    assert_eq!(sim.now(), Time(2));
}

#[test]
fn destroy_resets_clock_and_queue() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Simulator::default();
    sim.schedule(Time(7), push(1, &log));
    sim.destroy();
    assert_eq!(sim.now(), Time::ZERO);
    sim.run(&mut DummyWorld::default());
    assert!(log.lock().expect("log lock").is_empty());
}
