use almanac_service::caldav::period::{Period, PeriodList};

use super::helpers::{utc, window};

fn samples() -> Vec<Vec<Period>> {
    vec![
        vec![],
        vec![window(utc(2, 9, 0), utc(2, 10, 0))],
        vec![
            window(utc(2, 12, 0), utc(2, 13, 0)),
            window(utc(2, 9, 0), utc(2, 10, 0)),
            window(utc(2, 10, 0), utc(2, 11, 0)),
        ],
        vec![
            window(utc(3, 0, 0), utc(5, 0, 0)),
            window(utc(3, 1, 0), utc(3, 2, 0)),
            window(utc(4, 23, 0), utc(6, 0, 0)),
            window(utc(1, 0, 0), utc(1, 0, 0)),
            window(utc(1, 0, 0), utc(1, 0, 0)),
        ],
    ]
}

#[test_log::test]
fn normalization_is_idempotent() {
    for periods in samples() {
        let once = PeriodList::from(periods).normalize();
        assert!(once.is_normalized());
        assert_eq!(once.clone().normalize(), once);
    }
}

#[test_log::test]
fn touching_periods_merge_but_do_not_intersect() {
    let morning = window(utc(2, 9, 0), utc(2, 10, 0));
    let late_morning = window(utc(2, 10, 0), utc(2, 11, 0));
    assert!(!morning.intersects(&late_morning));

    let merged = PeriodList::from(vec![late_morning, morning]).normalize();
    assert_eq!(merged.as_slice(), &[window(utc(2, 9, 0), utc(2, 11, 0))]);
}
