use super::*;

#[test]
fn pagination_enforces_max_bounds() {
    let (start, end, next_cursor) = paginate(100, Some(10), Some(20)).expect("page should work");
    assert_eq!(start, 10);
    assert_eq!(end, 30);
    assert_eq!(next_cursor, Some(30));

    let out_of_range = paginate(5, Some(10), Some(1));
    assert!(out_of_range.is_err());

    let (_, end, next_cursor) = paginate(7, None, None).expect("defaults");
    assert_eq!(end, 7);
    assert_eq!(next_cursor, None);
}

#[test]
fn event_type_filter_parses_known_names_and_rejects_unknown() {
    let filter = parse_event_type_filter(&["household_drawn".to_string()])
        .expect("valid filter")
        .expect("non-empty filter");
    assert!(filter.contains(&EventType::HouseholdDrawn));

    assert!(parse_event_type_filter(&[" menu_graft_completed ".to_string()]).is_ok());
    assert!(parse_event_type_filter(&["no_such_event".to_string()]).is_err());
    assert!(parse_event_type_filter(&[]).expect("empty is fine").is_none());
}

#[test]
fn require_run_rejects_mismatched_run_ids() {
    let mut inner = ServerInner::default();
    assert!(require_run(&inner, "run_x").is_err());

    let mut config = GraftConfig::default();
    config.run_id = "run_active".to_string();
    inner.engine = Some(GraftApi::from_config(config));

    assert!(require_run(&inner, "run_active").is_ok());
    let err = require_run(&inner, "run_other").expect_err("mismatch");
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert!(require_run_mut(&mut inner, "run_active").is_ok());
}
