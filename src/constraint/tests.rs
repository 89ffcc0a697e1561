use super::validator::ConstraintValidator;
use crate::config::GCSConfig;
use crate::fleet::{FleetState, VehicleID, VehiclePermissions};
use crate::mission::{MissionDatabase, TaskKind, TaskOptions};
use crate::util::Vec3D;
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;

fn default_validator() -> ConstraintValidator { ConstraintValidator::new(&GCSConfig::default()) }

/// All-operational fleet at the given positions/batteries/payloads.
fn fleet_of(
    vehicles: &[(VehicleID, [f64; 3], f64, f64)],
    exit_grid: &[VehicleID],
) -> FleetState {
    let mut positions = HashMap::new();
    let mut battery = HashMap::new();
    let mut payloads = HashMap::new();
    let mut permissions = HashMap::new();
    for &(id, pos, soc, payload) in vehicles {
        positions.insert(id, Vec3D::from(pos));
        battery.insert(id, soc);
        payloads.insert(id, payload);
        permissions.insert(
            id,
            VehiclePermissions { may_exit_grid: exit_grid.contains(&id) },
        );
    }
    FleetState::new(
        Utc::now(),
        vehicles.iter().map(|v| v.0).collect(),
        Vec::new(),
        positions,
        battery,
        payloads,
        Vec::new(),
        permissions,
    )
}

#[test]
fn test_grid_boundary_is_inclusive() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    let fleet = fleet_of(&[(1, [100.0, 100.0, 30.0], 100.0, 1.0)], &[]);

    let on_edge = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(3000.0, 2000.0, 30.0),
            50.0,
            TaskOptions::default(),
        ))
        .unwrap();
    assert!(validator.check_grid_boundary(1, &on_edge, &fleet));

    let outside = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(3000.1, 2000.0, 30.0),
            50.0,
            TaskOptions::default(),
        ))
        .unwrap();
    assert!(!validator.check_grid_boundary(1, &outside, &fleet));
}

#[test]
fn test_exit_grid_permission_bypasses_boundary() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    let fleet = fleet_of(
        &[(1, [100.0, 100.0, 30.0], 100.0, 1.0), (4, [100.0, 100.0, 30.0], 100.0, 1.0)],
        &[4],
    );
    let outside = db
        .get_task(db.add_task(
            TaskKind::SearchRescue,
            Vec3D::new(3130.0, 100.0, 30.0),
            90.0,
            TaskOptions::default(),
        ))
        .unwrap();

    assert!(!validator.check_grid_boundary(1, &outside, &fleet));
    assert!(validator.check_grid_boundary(4, &outside, &fleet));
}

#[test]
fn test_energy_gate_respects_safety_reserve() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    // 21% of the 100 Wh pack with a 20% reserve leaves 1 Wh spare, enough
    // for a 75 m round trip at 150 m/Wh
    let fleet = fleet_of(&[(1, [0.0, 0.0, 30.0], 21.0, 1.0)], &[]);

    let near = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(50.0, 0.0, 30.0),
            50.0,
            TaskOptions::default(),
        ))
        .unwrap();
    let far = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(200.0, 0.0, 30.0),
            50.0,
            TaskOptions::default(),
        ))
        .unwrap();

    assert!(validator.check_energy(1, &near, &fleet, &db));
    assert!(!validator.check_energy(1, &far, &fleet, &db));
}

#[test]
fn test_energy_gate_charges_committed_chain() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    // both vehicles at 60% leave 40 Wh over the reserve; vehicle 1 already
    // owes a 5800 m chain (~38.7 Wh), vehicle 2 owes nothing
    let fleet = fleet_of(
        &[(1, [0.0, 0.0, 30.0], 60.0, 1.0), (2, [0.0, 0.0, 30.0], 60.0, 1.0)],
        &[],
    );
    let leg_out = db.add_task(
        TaskKind::Surveillance,
        Vec3D::new(2900.0, 0.0, 30.0),
        50.0,
        TaskOptions::default(),
    );
    let leg_back = db.add_task(
        TaskKind::Surveillance,
        Vec3D::new(0.0, 0.0, 30.0),
        50.0,
        TaskOptions::default(),
    );
    db.assign(leg_out, 1).unwrap();
    db.assign(leg_back, 1).unwrap();

    let candidate = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(500.0, 0.0, 30.0),
            50.0,
            TaskOptions::default(),
        ))
        .unwrap();

    assert!(!validator.check_energy(1, &candidate, &fleet, &db));
    assert!(validator.check_energy(2, &candidate, &fleet, &db));
}

#[test]
fn test_payload_gate_is_exact_at_capacity() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    let fleet = fleet_of(&[(1, [0.0, 0.0, 30.0], 100.0, 0.5)], &[]);

    let exact = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(10.0, 0.0, 30.0),
            50.0,
            TaskOptions { payload_kg: Some(0.5), ..TaskOptions::default() },
        ))
        .unwrap();
    let heavy = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(10.0, 0.0, 30.0),
            50.0,
            TaskOptions { payload_kg: Some(0.5001), ..TaskOptions::default() },
        ))
        .unwrap();

    assert!(validator.check_payload(1, &exact, &fleet));
    assert!(!validator.check_payload(1, &heavy, &fleet));
}

#[test]
fn test_deadline_gate_accounts_for_travel_and_execution() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    let now = Utc::now();
    let fleet = fleet_of(&[(1, [0.0, 0.0, 30.0], 100.0, 1.0)], &[]);

    // 50 m of travel at 10 m/s plus 60 s execution needs 65 s
    let feasible = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(50.0, 0.0, 30.0),
            50.0,
            TaskOptions { deadline: Some(now + TimeDelta::seconds(70)), ..TaskOptions::default() },
        ))
        .unwrap();
    let tight = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(50.0, 0.0, 30.0),
            50.0,
            TaskOptions { deadline: Some(now + TimeDelta::seconds(60)), ..TaskOptions::default() },
        ))
        .unwrap();

    assert!(validator.check_deadline(1, &feasible, &fleet, now));
    assert!(!validator.check_deadline(1, &tight, &fleet, now));
}

#[test]
fn test_check_all_short_circuits_infeasible_pairs() {
    let validator = default_validator();
    let db = MissionDatabase::new();
    let fleet = fleet_of(&[(1, [100.0, 100.0, 30.0], 100.0, 0.3)], &[]);

    let feasible = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(150.0, 100.0, 30.0),
            50.0,
            TaskOptions { payload_kg: Some(0.2), ..TaskOptions::default() },
        ))
        .unwrap();
    assert!(validator.check_all(1, &feasible, &fleet, &db));

    let heavy = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(150.0, 100.0, 30.0),
            50.0,
            TaskOptions { payload_kg: Some(2.0), ..TaskOptions::default() },
        ))
        .unwrap();
    assert!(!validator.check_all(1, &heavy, &fleet, &db));

    let out_of_grid = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(-10.0, 100.0, 30.0),
            50.0,
            TaskOptions { payload_kg: Some(0.2), ..TaskOptions::default() },
        ))
        .unwrap();
    assert!(!validator.check_all(1, &out_of_grid, &fleet, &db));
}

#[test]
fn test_collision_buffer_against_other_operational_vehicles() {
    let validator = default_validator();
    let fleet = fleet_of(
        &[(1, [0.0, 0.0, 30.0], 100.0, 1.0), (2, [200.0, 0.0, 30.0], 100.0, 1.0)],
        &[],
    );

    // route passes 30 m from vehicle 2, inside the 50 m buffer
    let risky = [Vec3D::new(100.0, 0.0, 30.0), Vec3D::new(230.0, 0.0, 30.0)];
    assert!(!validator.check_collision(1, &risky, &fleet));

    let clear = [Vec3D::new(100.0, 200.0, 30.0), Vec3D::new(230.0, 200.0, 30.0)];
    assert!(validator.check_collision(1, &clear, &fleet));

    // a vehicle never conflicts with itself
    let own = [Vec3D::new(0.0, 0.0, 30.0)];
    assert!(validator.check_collision(1, &own, &fleet));
}
