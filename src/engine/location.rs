//! Position ingestion and retrieval.
//!
//! An accepted report is written twice: appended to the order's history and
//! upserted as the courier's latest position. Within one order the latest
//! position is last-write-wins on the report timestamp, so a late-arriving
//! older report still lands in history but never replaces a newer latest
//! position. A report for a different order always replaces it.
//!
//! Lock order: orders, history, latest positions, couriers, rooms. The history
//! row stays locked until the broadcast is queued so that one room sees
//! location events in acceptance order.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::auth::guard::{authorize, Operation};
use crate::engine::lifecycle::get_order;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::CourierAvailability;
use crate::models::events::ServerEvent;
use crate::models::order::{Order, OrderTracking};
use crate::models::position::{LocationUpdate, PositionRecord};
use crate::models::user::Actor;
use crate::state::AppState;

/// Reports stamped further ahead than this are treated as clock errors.
const MAX_FUTURE_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct PositionReport {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

pub fn report_position(
    state: &AppState,
    actor: &Actor,
    report: PositionReport,
) -> Result<PositionRecord, AppError> {
    let result = accept_report(state, actor, report);

    let outcome = match &result {
        Ok(_) => "accepted",
        Err(err) => err.code(),
    };
    state
        .metrics
        .position_reports_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn accept_report(
    state: &AppState,
    actor: &Actor,
    report: PositionReport,
) -> Result<PositionRecord, AppError> {
    let point = GeoPoint::new(report.lat, report.lon)?;

    let now = Utc::now();
    let timestamp = report.timestamp.unwrap_or(now);
    if timestamp > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
        return Err(AppError::Validation(
            "report timestamp is in the future".to_string(),
        ));
    }

    let order = state
        .orders
        .get(&report.order_id)
        .ok_or_else(|| AppError::NotFound("order not found or not assigned to you".to_string()))?;

    authorize(
        actor,
        Operation::ReportPosition {
            order: order.value(),
            courier_id: report.courier_id,
        },
    )?;

    if !order.status.is_active_delivery() {
        return Err(AppError::Conflict(format!(
            "order {} is {}, not in active delivery",
            order.id, order.status
        )));
    }

    let record = PositionRecord {
        id: Uuid::new_v4(),
        courier_id: report.courier_id,
        order_id: report.order_id,
        lat: point.lat,
        lon: point.lon,
        timestamp,
    };

    let mut history = state.history.entry(record.order_id).or_default();
    history.push(record.clone());

    if upsert_latest(&state.latest_positions, &record) {
        if let Some(mut courier) = state.couriers.get_mut(&record.courier_id) {
            courier.location = Some(point);
            courier.updated_at = now;
        }
    }

    state.rooms.publish(
        record.order_id,
        ServerEvent::LocationUpdated(LocationUpdate::from(&record)),
    );
    drop(history);
    drop(order);

    debug!(
        order_id = %record.order_id,
        courier_id = %record.courier_id,
        lat = record.lat,
        lon = record.lon,
        "position accepted"
    );

    Ok(record)
}

/// Atomic keyed upsert on the courier's row. Returns `true` when `record` is
/// now the courier's latest position; an older report for the same order
/// leaves the row as is.
pub fn upsert_latest(latest: &DashMap<Uuid, PositionRecord>, record: &PositionRecord) -> bool {
    match latest.entry(record.courier_id) {
        Entry::Occupied(mut entry) => {
            let stored = entry.get();
            if stored.order_id == record.order_id && stored.timestamp > record.timestamp {
                return false;
            }
            entry.insert(record.clone());
            true
        }
        Entry::Vacant(entry) => {
            entry.insert(record.clone());
            true
        }
    }
}

pub fn current_position(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
) -> Result<PositionRecord, AppError> {
    let order = get_order(state, actor, order_id)?;

    if order.courier_id.is_none() {
        return Err(AppError::NotFound("no courier assigned yet".to_string()));
    }

    latest_for_order(state, &order)
        .ok_or_else(|| AppError::NotFound("no position reported yet".to_string()))
}

/// The order together with its courier's current position, for tracking
/// views that would otherwise need two round trips.
pub fn track_order(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
) -> Result<OrderTracking, AppError> {
    let order = get_order(state, actor, order_id)?;
    let location = latest_for_order(state, &order);

    Ok(OrderTracking { order, location })
}

fn latest_for_order(state: &AppState, order: &Order) -> Option<PositionRecord> {
    let latest = state.latest_positions.get(&order.courier_id?)?;
    (latest.order_id == order.id).then(|| latest.value().clone())
}

/// Most recent records for the order, newest first.
pub fn history(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    limit: Option<usize>,
) -> Result<Vec<PositionRecord>, AppError> {
    get_order(state, actor, order_id)?;
    let limit = state.history_limits.resolve(limit);

    let Some(records) = state.history.get(&order_id) else {
        return Ok(Vec::new());
    };

    // Stable sort: equal timestamps stay in reverse acceptance order.
    let mut recent: Vec<&PositionRecord> = records.iter().rev().collect();
    recent.sort_by_key(|record| Reverse(record.timestamp));

    Ok(recent.into_iter().take(limit).cloned().collect())
}

pub fn courier_availability(
    state: &AppState,
    actor: &Actor,
) -> Result<CourierAvailability, AppError> {
    authorize(actor, Operation::ManageAvailability)?;

    state
        .couriers
        .get(&actor.id)
        .map(|courier| courier.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("courier {} not found", actor.id)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::{
        courier_availability, current_position, history, report_position, track_order,
        PositionReport,
    };
    use crate::auth::identity::register;
    use crate::config::Config;
    use crate::engine::lifecycle::{assign_courier, create_order, update_status};
    use crate::error::AppError;
    use crate::models::events::ServerEvent;
    use crate::models::order::{Order, OrderStatus};
    use crate::models::user::{Actor, Role};
    use crate::state::AppState;

    struct Fixture {
        state: AppState,
        vendor: Actor,
        customer: Actor,
        courier: Actor,
        order: Order,
    }

    fn actor(state: &AppState, name: &str, role: Role) -> Actor {
        let (user, _) = register(state, name, role).unwrap();
        Actor::from(&user)
    }

    /// An order already assigned to `courier`.
    fn fixture() -> Fixture {
        let state = AppState::new(&Config::default());
        let vendor = actor(&state, "Vendor Vic", Role::Vendor);
        let customer = actor(&state, "Customer Cat", Role::Customer);
        let courier = actor(&state, "Courier Kim", Role::Courier);
        let order = create_order(&state, &vendor, customer.id).unwrap();
        let order = assign_courier(&state, &vendor, order.id, courier.id).unwrap();

        Fixture {
            state,
            vendor,
            customer,
            courier,
            order,
        }
    }

    fn report(f: &Fixture, lat: f64, lon: f64, secs: i64) -> PositionReport {
        PositionReport {
            order_id: f.order.id,
            courier_id: f.courier.id,
            lat,
            lon,
            timestamp: Some(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()),
        }
    }

    #[test]
    fn accepted_report_is_visible_to_participants() {
        let f = fixture();
        report_position(&f.state, &f.courier, report(&f, 19.0476, 73.0699, 0)).unwrap();

        for viewer in [&f.vendor, &f.customer, &f.courier] {
            let current = current_position(&f.state, viewer, f.order.id).unwrap();
            assert_eq!((current.lat, current.lon), (19.0476, 73.0699));
        }

        let availability = courier_availability(&f.state, &f.courier).unwrap();
        assert_eq!(availability.location.unwrap().lat, 19.0476);
    }

    #[test]
    fn latest_position_is_chronological_regardless_of_arrival() {
        let f = fixture();
        report_position(&f.state, &f.courier, report(&f, 2.0, 2.0, 2)).unwrap();
        report_position(&f.state, &f.courier, report(&f, 1.0, 1.0, 1)).unwrap();

        let current = current_position(&f.state, &f.customer, f.order.id).unwrap();
        assert_eq!(current.lat, 2.0);

        let records = history(&f.state, &f.customer, f.order.id, None).unwrap();
        let lats: Vec<f64> = records.iter().map(|r| r.lat).collect();
        assert_eq!(lats, vec![2.0, 1.0]);
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let f = fixture();
        for i in 0..5 {
            report_position(&f.state, &f.courier, report(&f, i as f64, 0.0, i)).unwrap();
        }

        let records = history(&f.state, &f.vendor, f.order.id, Some(3)).unwrap();
        let lats: Vec<f64> = records.iter().map(|r| r.lat).collect();
        assert_eq!(lats, vec![4.0, 3.0, 2.0]);

        let capped = history(&f.state, &f.vendor, f.order.id, Some(10_000)).unwrap();
        assert_eq!(capped.len(), 5);
    }

    #[test]
    fn out_of_range_coordinates_are_never_stored() {
        let f = fixture();

        for (lat, lon) in [(91.0, 0.0), (0.0, 181.0), (f64::NAN, 0.0)] {
            assert!(matches!(
                report_position(&f.state, &f.courier, report(&f, lat, lon, 0)),
                Err(AppError::Validation(_))
            ));
        }

        assert!(history(&f.state, &f.vendor, f.order.id, None).unwrap().is_empty());
        assert!(matches!(
            current_position(&f.state, &f.vendor, f.order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn future_timestamps_are_rejected() {
        let f = fixture();
        let mut ahead = report(&f, 1.0, 1.0, 0);
        ahead.timestamp = Some(Utc::now() + Duration::minutes(10));

        assert!(matches!(
            report_position(&f.state, &f.courier, ahead),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn only_the_assigned_courier_reports() {
        let f = fixture();
        let other_courier = actor(&f.state, "Other Courier", Role::Courier);

        let mut foreign = report(&f, 1.0, 1.0, 0);
        foreign.courier_id = other_courier.id;
        assert!(matches!(
            report_position(&f.state, &other_courier, foreign),
            Err(AppError::NotFound(_))
        ));

        assert!(matches!(
            report_position(&f.state, &f.vendor, report(&f, 1.0, 1.0, 0)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn reports_outside_active_delivery_conflict() {
        let f = fixture();
        let pending = create_order(&f.state, &f.vendor, f.customer.id).unwrap();
        let mut on_pending = report(&f, 1.0, 1.0, 0);
        on_pending.order_id = pending.id;
        assert!(report_position(&f.state, &f.courier, on_pending).is_err());

        for next in [OrderStatus::PickedUp, OrderStatus::InTransit, OrderStatus::Delivered] {
            update_status(&f.state, &f.courier, f.order.id, next).unwrap();
        }
        assert!(matches!(
            report_position(&f.state, &f.courier, report(&f, 1.0, 1.0, 0)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn strangers_cannot_read_positions() {
        let f = fixture();
        let stranger = actor(&f.state, "Stranger", Role::Customer);
        report_position(&f.state, &f.courier, report(&f, 1.0, 1.0, 0)).unwrap();

        assert!(matches!(
            current_position(&f.state, &stranger, f.order.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            history(&f.state, &stranger, f.order.id, None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn room_sees_location_updates_in_acceptance_order() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(16);
        f.state.rooms.join(f.order.id, Uuid::new_v4(), tx);

        for i in 0..3 {
            report_position(&f.state, &f.courier, report(&f, i as f64, 0.0, i)).unwrap();
        }

        let lats: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                ServerEvent::LocationUpdated(update) => update.lat,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(lats, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn next_order_position_replaces_a_future_stamped_one() {
        let f = fixture();
        let mut ahead = report(&f, 1.0, 1.0, 0);
        ahead.timestamp = Some(Utc::now() + Duration::seconds(20));
        report_position(&f.state, &f.courier, ahead).unwrap();
        update_status(&f.state, &f.vendor, f.order.id, OrderStatus::Cancelled).unwrap();

        let next = create_order(&f.state, &f.vendor, f.customer.id).unwrap();
        assign_courier(&f.state, &f.vendor, next.id, f.courier.id).unwrap();
        let on_next = PositionReport {
            order_id: next.id,
            courier_id: f.courier.id,
            lat: 2.0,
            lon: 2.0,
            timestamp: None,
        };
        report_position(&f.state, &f.courier, on_next).unwrap();

        let current = current_position(&f.state, &f.customer, next.id).unwrap();
        assert_eq!((current.lat, current.lon), (2.0, 2.0));
        assert!(matches!(
            current_position(&f.state, &f.customer, f.order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn tracking_view_pairs_the_order_with_its_position() {
        let f = fixture();
        let before = track_order(&f.state, &f.customer, f.order.id).unwrap();
        assert_eq!(before.order.status, OrderStatus::Assigned);
        assert!(before.location.is_none());

        report_position(&f.state, &f.courier, report(&f, 3.0, 4.0, 0)).unwrap();
        let after = track_order(&f.state, &f.vendor, f.order.id).unwrap();
        assert_eq!(after.location.map(|r| (r.lat, r.lon)), Some((3.0, 4.0)));

        let stranger = actor(&f.state, "Stranger", Role::Customer);
        assert!(matches!(
            track_order(&f.state, &stranger, f.order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_reports_keep_every_record_and_the_newest_wins() {
        const REPORTS: i64 = 32;
        let Fixture {
            state,
            courier,
            order,
            ..
        } = fixture();
        let state = Arc::new(state);
        let order_id = order.id;

        let handles: Vec<_> = (0..REPORTS)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let report = PositionReport {
                        order_id,
                        courier_id: courier.id,
                        lat: i as f64,
                        lon: 0.0,
                        timestamp: Some(Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap()),
                    };
                    report_position(&state, &courier, report).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let latest = state.latest_positions.get(&courier.id).unwrap().clone();
        assert_eq!(latest.timestamp.timestamp(), 1_700_000_000 + REPORTS - 1);
        assert_eq!(latest.lat, (REPORTS - 1) as f64);

        let records = history(&state, &courier, order_id, Some(100)).unwrap();
        assert_eq!(records.len(), REPORTS as usize);
        assert!(records.windows(2).all(|pair| pair[0].timestamp > pair[1].timestamp));
    }
}
