use super::*;

#[test]
fn from_status_maps_auth_and_not_found() {
    assert!(matches!(ClientError::from_status(StatusCode::UNAUTHORIZED), ClientError::Unauthorized));
    assert!(matches!(ClientError::from_status(StatusCode::NOT_FOUND), ClientError::NotFound));
    assert!(matches!(ClientError::from_status(StatusCode::CONFLICT), ClientError::Status(409)));
}

#[test]
fn status_round_trips_through_classification() {
    for code in [401_u16, 404, 409, 500] {
        let status = StatusCode::from_u16(code).unwrap();
        assert_eq!(ClientError::from_status(status).status(), Some(code));
    }
}

#[test]
fn decode_errors_count_as_transport() {
    let err = serde_json::from_str::<u32>("nope").unwrap_err();
    assert!(ClientError::from(err).is_transport());
    assert!(!ClientError::Status(500).is_transport());
    assert!(!ClientError::Cancelled.is_transport());
    assert!(ClientError::Timeout(std::time::Duration::from_secs(1)).is_transport());
}
