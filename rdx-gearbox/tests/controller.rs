use gearbox::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// A clock that moves forward by a fixed step every time it is read, so each
/// tick appears `step - interval` milliseconds late.
struct SteppingClock {
    now: AtomicI64,
    step: i64,
}

impl SteppingClock {
    fn new(step: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(0),
            step,
        })
    }
}

impl Clock for SteppingClock {
    fn now_ms(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test(start_paused = true)]
async fn late_ticks_shift_the_gear_up() {
    let config = GearboxConfig::default().with_interval_ms(1000);
    let controller = Controller::with_clock("late", config, SteppingClock::new(1100)).unwrap();
    let mut events = controller.subscribe();

    assert!(controller.start().await);
    sleep(Duration::from_millis(3500)).await;

    assert_eq!(controller.ticks().await, 3);
    assert_eq!(controller.current_gear().await, 3);
    assert_eq!(controller.performance().await, 100);

    let shifts: Vec<ShiftEvent> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            Event::Shift(shift) => Some(shift),
            _ => None,
        })
        .collect();
    assert_eq!(
        shifts,
        vec![ShiftEvent { from: 1, to: 2 }, ShiftEvent { from: 2, to: 3 }]
    );
}

#[tokio::test(start_paused = true)]
async fn events_arrive_in_tick_order() {
    let config = GearboxConfig::default().with_interval_ms(1000);
    let controller = Controller::with_clock("order", config, SteppingClock::new(1100)).unwrap();
    let mut events = controller.subscribe();

    controller.start().await;
    sleep(Duration::from_millis(2500)).await;

    let kinds: Vec<EventKind> = drain(&mut events).iter().map(Event::kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Status, EventKind::Sampled, EventKind::Shift]
    );
}

#[tokio::test(start_paused = true)]
async fn early_ticks_shift_the_gear_down() {
    let config = GearboxConfig::default()
        .with_initial_gear(5)
        .with_thresholds(Thresholds::decrement(Rule::below(-50)));
    let controller = Controller::with_clock("early", config, SteppingClock::new(900)).unwrap();

    controller.start().await;
    sleep(Duration::from_millis(2500)).await;

    assert_eq!(controller.performance().await, -100);
    assert_eq!(controller.current_gear().await, 4);
}

#[tokio::test(start_paused = true)]
async fn starting_twice_is_a_no_op() {
    let controller = Controller::new("twice", GearboxConfig::default()).unwrap();
    assert_eq!(controller.status().await, Status::Stopped);
    assert!(controller.start().await);
    assert!(!controller.start().await);
    assert_eq!(controller.status().await, Status::Started);

    sleep(Duration::from_millis(2500)).await;
    assert_eq!(controller.ticks().await, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_drops_the_pending_tick_and_restart_waits_a_full_interval() {
    let controller = Controller::new("pause", GearboxConfig::default()).unwrap();
    controller.start().await;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(controller.ticks().await, 1);

    controller.stop().await;
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(controller.ticks().await, 1);

    assert!(controller.start().await);
    sleep(Duration::from_millis(999)).await;
    assert_eq!(controller.ticks().await, 1);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(controller.ticks().await, 2);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(controller.ticks().await, 3);
}

#[tokio::test(start_paused = true)]
async fn quick_restart_leaves_a_single_tick_loop() {
    let controller = Controller::new("restart", GearboxConfig::default()).unwrap();
    controller.start().await;
    sleep(Duration::from_millis(1500)).await;

    controller.stop().await;
    controller.start().await;

    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.ticks().await, 1);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(controller.ticks().await, 2);
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(controller.ticks().await, 3);
}

#[tokio::test(start_paused = true)]
async fn the_first_tick_after_a_restart_measures_the_pause() {
    let controller = Controller::new("resume", GearboxConfig::default()).unwrap();
    controller.start().await;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(controller.current_gear().await, 1);

    controller.stop().await;
    sleep(Duration::from_millis(10_000)).await;
    controller.start().await;
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(controller.ticks().await, 2);
    let drift = controller.performance().await;
    assert!((10_500..=10_502).contains(&drift), "drift was {drift}");
    assert_eq!(controller.current_gear().await, 2);
}

#[tokio::test(start_paused = true)]
async fn a_lagging_subscriber_resumes_with_the_oldest_retained_event() {
    let controller = Controller::new("flood", GearboxConfig::default().with_top(200)).unwrap();
    let mut events = controller.subscribe();
    for _ in 0..100 {
        assert!(controller.shift_up().await);
    }

    let mut received = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(10), next_event(&mut events)).await
    {
        received.push(event);
    }
    assert!(!received.is_empty());
    assert!(received.len() < 100);
    match received.last() {
        Some(Event::Shift(shift)) => assert_eq!(*shift, ShiftEvent { from: 100, to: 101 }),
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn a_panicking_subscriber_does_not_stop_the_schedule() {
    let config = GearboxConfig::default().with_interval_ms(1000);
    let controller = Controller::with_clock("fragile", config, SteppingClock::new(1100)).unwrap();
    controller
        .on(EventKind::Shift, |_, _| panic!("subscriber failure"))
        .await;

    controller.start().await;
    sleep(Duration::from_millis(3500)).await;

    assert_eq!(controller.ticks().await, 3);
    assert_eq!(controller.current_gear().await, 3);
}

#[tokio::test(start_paused = true)]
async fn spawn_respects_autostart() {
    let idle = Controller::spawn("idle", GearboxConfig::default().with_autostart(false))
        .await
        .unwrap();
    assert_eq!(idle.status().await, Status::Stopped);
    assert_eq!(idle.tick_now().await, Tick::Skipped);

    let busy = Controller::spawn("busy", GearboxConfig::default()).await.unwrap();
    assert_eq!(busy.status().await, Status::Started);
    assert_eq!(busy.tick_now().await, Tick::Baseline);
}

#[tokio::test(start_paused = true)]
async fn manual_shifts_and_callbacks_share_the_bus() {
    let controller = Controller::new("manual", GearboxConfig::default().with_top(2)).unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = controller
        .on(EventKind::Shift, move |gearbox, _| {
            sink.lock().unwrap().push(gearbox.current_gear());
        })
        .await;

    assert!(controller.shift_up().await);
    assert!(!controller.shift_up().await);
    assert!(controller.off(id).await);
    assert!(controller.shift_down().await);
    assert!(!controller.shift_down().await);

    assert_eq!(*seen.lock().unwrap(), vec![2]);
    assert!(!controller.trigger(Event::User(UserEvent::new("nobody", ()))).await);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.name, "manual");
    assert_eq!(snapshot.gear, 1);
    assert_eq!(snapshot.top, 2);
}

#[test]
fn invalid_configuration_is_reported() {
    let err = Controller::new("bad", GearboxConfig::default().with_interval_ms(0)).unwrap_err();
    assert!(matches!(err, GearboxError::InvalidConfig(_)));
}
