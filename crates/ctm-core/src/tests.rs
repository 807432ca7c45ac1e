//! Unit tests for ctm-core primitives.

#[cfg(test)]
mod ids {
    use crate::{LaneGroupId, LinkId, NodeId};

    #[test]
    fn index_roundtrip() {
        let id = LinkId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(LinkId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn default_is_invalid() {
        assert_eq!(NodeId::default(), NodeId::INVALID);
        assert_eq!(LaneGroupId::INVALID.0, u32::MAX);
    }

    #[test]
    fn display() {
        assert_eq!(LaneGroupId(7).to_string(), "LaneGroupId(7)");
    }
}

#[cfg(test)]
mod time {
    use crate::{SimConfig, SimTime, ValidationLog};

    #[test]
    fn secs_roundtrip_is_exact_at_ms() {
        assert_eq!(SimTime::from_secs(2.0), SimTime(2_000));
        assert_eq!(SimTime::from_secs(0.0015), SimTime(2));
        assert_eq!(SimTime(1_500).as_secs(), 1.5);
    }

    #[test]
    fn negative_secs_clamp_to_zero() {
        assert_eq!(SimTime::from_secs(-3.0), SimTime::ZERO);
    }

    #[test]
    fn repeated_offsets_do_not_drift() {
        let mut t = SimTime::ZERO;
        for _ in 0..1_800 {
            t = t.offset_secs(2.0);
        }
        assert_eq!(t, SimTime::from_secs(3_600.0));
    }

    #[test]
    fn config_end_and_steps() {
        let cfg = SimConfig { start_time_secs: 100.0, duration_secs: 60.0, sim_dt_secs: 4.0 };
        assert_eq!(cfg.start_time(), SimTime(100_000));
        assert_eq!(cfg.end_time(), SimTime(160_000));
        assert_eq!(cfg.step_count(), 15);
    }

    #[test]
    fn step_below_one_tick_is_rejected() {
        for dt in [0.0, -2.0, 0.0004, f64::NAN, f64::INFINITY] {
            let cfg = SimConfig { sim_dt_secs: dt, ..SimConfig::default() };
            let mut log = ValidationLog::new();
            cfg.check_step(&mut log);
            assert_eq!(log.len(), 1, "dt = {dt}");
        }
        let mut log = ValidationLog::new();
        SimConfig { sim_dt_secs: SimConfig::MIN_STEP_SECS, ..SimConfig::default() }.check_step(&mut log);
        assert!(log.is_empty(), "{log}");
    }
}

#[cfg(test)]
mod key {
    use crate::{CommodityId, Key, LinkId, PathId};

    #[test]
    fn path_and_link_keys_never_collide() {
        let a = Key::path(CommodityId(0), PathId(3));
        let b = Key::next_link(CommodityId(0), LinkId(3));
        assert_ne!(a, b);
        assert_eq!(a.path_id(), Some(PathId(3)));
        assert_eq!(a.next_link_id(), None);
        assert_eq!(b.next_link_id(), Some(LinkId(3)));
    }
}

#[cfg(test)]
mod profile {
    use crate::{LookupTable, Profile1D, ValidationLog};

    fn step_profile() -> Profile1D {
        Profile1D::new(60.0, 30.0, vec![900.0, 1_800.0, 600.0])
    }

    #[test]
    fn zero_before_start() {
        assert_eq!(step_profile().value_at(0.0), 0.0);
        assert_eq!(step_profile().value_at(59.999), 0.0);
    }

    #[test]
    fn piecewise_constant_and_held_after_last() {
        let p = step_profile();
        assert_eq!(p.value_at(60.0), 900.0);
        assert_eq!(p.value_at(89.0), 900.0);
        assert_eq!(p.value_at(90.0), 1_800.0);
        assert_eq!(p.value_at(120.0), 600.0);
        assert_eq!(p.value_at(1.0e6), 600.0);
    }

    #[test]
    fn next_change_walks_breakpoints() {
        let p = step_profile();
        assert_eq!(p.next_change_after(0.0), Some((60.0, 900.0)));
        assert_eq!(p.next_change_after(60.0), Some((90.0, 1_800.0)));
        assert_eq!(p.next_change_after(100.0), Some((120.0, 600.0)));
        assert_eq!(p.next_change_after(120.0), None);
    }

    #[test]
    fn parses_csv_samples() {
        let p = Profile1D::from_csv_str(0.0, 10.0, "1, 2,3").unwrap();
        assert_eq!(p.values, vec![1.0, 2.0, 3.0]);
        assert!(Profile1D::from_csv_str(0.0, 10.0, "1,x").is_err());
    }

    #[test]
    fn validation_accumulates() {
        let mut log = ValidationLog::new();
        Profile1D::new(0.0, 0.0, vec![1.0, -2.0]).validate("demand 0", &mut log);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn lookup_interpolates_and_clamps() {
        let t = LookupTable::parse("0,0; 10,100; 20,100").unwrap();
        assert_eq!(t.value_at(-5.0), 0.0);
        assert_eq!(t.value_at(5.0), 50.0);
        assert_eq!(t.value_at(15.0), 100.0);
        assert_eq!(t.value_at(99.0), 100.0);
    }

    #[test]
    fn lookup_scale_x() {
        let mut t = LookupTable::new(vec![(3_600.0, 10.0), (0.0, 0.0)]);
        t.scale_x(2.0 / 3_600.0);
        assert!((t.value_at(1.0) - 5.0).abs() < 1e-12);
    }
}

#[cfg(test)]
mod validation_log {
    use crate::{CoreError, ValidationLog};

    #[test]
    fn empty_log_is_ok() {
        assert!(ValidationLog::new().into_result().is_ok());
    }

    #[test]
    fn non_empty_log_fails_as_a_whole() {
        let mut log = ValidationLog::new();
        log.add_error("first");
        log.add_error("second");
        match log.into_result() {
            Err(CoreError::Validation(l)) => {
                assert_eq!(l.len(), 2);
                let text = l.to_string();
                assert!(text.contains("1) first") && text.contains("2) second"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
