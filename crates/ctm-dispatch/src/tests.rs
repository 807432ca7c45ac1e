//! Unit tests for ctm-dispatch.

use ctm_core::{ControllerId, DemandId, SensorId, SimTime};

use crate::{Action, ActionKind, DispatchError, Dispatcher, Event, Recipient};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn demand(id: u32, t: u64) -> Event {
    Event::new(SimTime(t), Action::DemandChange { demand: DemandId(id), rate_vps: id as f64 })
}

fn drain(d: &mut Dispatcher) -> Vec<Action> {
    std::iter::from_fn(|| d.pop_next()).map(|e| e.action).collect()
}

// ── Ordering ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod ordering {
    use super::*;

    #[test]
    fn fires_by_timestamp_first() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(demand(0, 2_000)).unwrap();
        d.register_event(demand(1, 1_000)).unwrap();
        let fired = drain(&mut d);
        assert_eq!(fired[0], demand(1, 0).action);
        assert_eq!(fired[1], demand(0, 0).action);
        assert_eq!(d.current_time(), SimTime(2_000));
    }

    #[test]
    fn lower_priority_fires_first_at_same_time() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(Event::new(SimTime(0), Action::ModelUpdate)).unwrap();
        d.register_event(Event::new(SimTime(0), Action::PokeController(ControllerId(0)))).unwrap();
        d.register_event(Event::new(SimTime(0), Action::PokeSensor(SensorId(0)))).unwrap();
        d.register_event(demand(0, 0)).unwrap();
        let kinds: Vec<_> = drain(&mut d).iter().map(|a| a.recipient()).collect();
        assert_eq!(
            kinds,
            vec![
                Recipient::Demand(DemandId(0)),
                Recipient::Sensor(SensorId(0)),
                Recipient::Controller(ControllerId(0)),
                Recipient::Model,
            ]
        );
    }

    #[test]
    fn ties_are_fifo_and_reproducible() {
        let run = || {
            let mut d = Dispatcher::new(SimTime::ZERO);
            for id in [5, 3, 9, 1, 7] {
                d.register_event(demand(id, 1_000)).unwrap();
            }
            drain(&mut d)
        };
        let first = run();
        let ids: Vec<u32> = first
            .iter()
            .map(|a| match a {
                Action::DemandChange { demand, .. } => demand.0,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![5, 3, 9, 1, 7]);
        assert_eq!(first, run());
    }

    #[test]
    fn past_events_are_rejected() {
        let mut d = Dispatcher::new(SimTime(5_000));
        let err = d.register_event(demand(0, 4_999)).unwrap_err();
        assert!(matches!(err, DispatchError::EventInPast { .. }));
        // Same instant is fine.
        d.register_event(demand(0, 5_000)).unwrap();
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod cancellation {
    use super::*;

    #[test]
    fn removes_only_matching_kind_and_recipient() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(demand(0, 1_000)).unwrap();
        d.register_event(demand(0, 2_000)).unwrap();
        d.register_event(demand(1, 1_000)).unwrap();
        d.register_event(Event::new(SimTime(1_000), Action::ModelUpdate)).unwrap();

        let removed =
            d.remove_events_for_recipient(ActionKind::DemandChange, Recipient::Demand(DemandId(0)));
        assert_eq!(removed, 2);
        assert_eq!(d.len(), 2);
        assert_eq!(d.pending_for(Recipient::Demand(DemandId(0))).count(), 0);
        assert_eq!(d.pending_for(Recipient::Demand(DemandId(1))).count(), 1);
    }

    #[test]
    fn wrong_kind_removes_nothing() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(demand(0, 1_000)).unwrap();
        let removed = d.remove_events_for_recipient(ActionKind::Poke, Recipient::Demand(DemandId(0)));
        assert_eq!(removed, 0);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn remove_by_kind() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(demand(0, 1_000)).unwrap();
        d.register_event(demand(1, 1_000)).unwrap();
        d.register_event(Event::new(SimTime(1_000), Action::ModelUpdate)).unwrap();
        assert_eq!(d.remove_events_of_kind(ActionKind::DemandChange), 2);
        assert_eq!(d.len(), 1);
    }
}

// ── Run loop ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod run_loop {
    use super::*;

    #[test]
    fn self_rescheduling_event_runs_until_horizon() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(Event::new(SimTime::ZERO, Action::ModelUpdate)).unwrap();
        let mut times = vec![];
        let fired = d
            .dispatch_until(SimTime(10_000), |d, e| {
                times.push(e.timestamp);
                d.register_event(Event::new(e.timestamp + 2_000, Action::ModelUpdate))
            })
            .unwrap();
        assert_eq!(fired, 5);
        assert_eq!(times, vec![SimTime(0), SimTime(2_000), SimTime(4_000), SimTime(6_000), SimTime(8_000)]);
        assert_eq!(d.current_time(), SimTime(10_000));
        // The event at the horizon is still pending.
        assert_eq!(d.next_time(), Some(SimTime(10_000)));
    }

    #[test]
    fn handler_error_aborts_the_run() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        for t in [1_000, 2_000, 3_000] {
            d.register_event(demand(0, t)).unwrap();
        }
        let mut seen = 0;
        let result: Result<u64, String> = d.dispatch_until(SimTime(10_000), |_, e| {
            seen += 1;
            if e.timestamp == SimTime(2_000) { Err("boom".into()) } else { Ok(()) }
        });
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(seen, 2);
        assert_eq!(d.current_time(), SimTime(2_000));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn reset_clears_queue_and_clock() {
        let mut d = Dispatcher::new(SimTime::ZERO);
        d.register_event(demand(0, 1_000)).unwrap();
        d.pop_next();
        d.reset(SimTime(500));
        assert!(d.is_empty());
        assert_eq!(d.current_time(), SimTime(500));
        assert_eq!(d.fired_count(), 0);
    }
}
