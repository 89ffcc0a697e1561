use super::context::MissionContext;
use super::engine::{OODAEngine, RecoveryStrategy};
use super::objective::{ObjectiveFunction, candidate_wins};
use super::optimizer::AllocationOptimizer;
use crate::config::{GCSConfig, GridBounds, MissionSection};
use crate::constraint::ConstraintValidator;
use crate::fleet::{FleetState, VehicleID, VehiclePermissions};
use crate::mission::{
    MissionDatabase, ReallocationPlan, Task, TaskID, TaskKind, TaskOptions, delivery_run,
    sar_grid, surveillance_grid,
};
use crate::util::Vec3D;
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;

fn fleet_state(
    operational: &[(VehicleID, [f64; 3], f64, f64)],
    failed: &[(VehicleID, [f64; 3])],
    lost: &[TaskID],
    exit_grid: &[VehicleID],
) -> FleetState {
    let mut positions = HashMap::new();
    let mut battery = HashMap::new();
    let mut payloads = HashMap::new();
    let mut permissions = HashMap::new();
    for &(id, pos, soc, payload) in operational {
        positions.insert(id, Vec3D::from(pos));
        battery.insert(id, soc);
        payloads.insert(id, payload);
        permissions
            .insert(id, VehiclePermissions { may_exit_grid: exit_grid.contains(&id) });
    }
    for &(id, pos) in failed {
        positions.insert(id, Vec3D::from(pos));
        battery.insert(id, 0.0);
        payloads.insert(id, 0.0);
        permissions.insert(id, VehiclePermissions::default());
    }
    FleetState::new(
        Utc::now(),
        operational.iter().map(|v| v.0).collect(),
        failed.iter().map(|v| v.0).collect(),
        positions,
        battery,
        payloads,
        lost.to_vec(),
        permissions,
    )
}

fn lost_records(db: &MissionDatabase, ids: &[TaskID]) -> Vec<Task> {
    ids.iter().filter_map(|&id| db.get_task(id)).collect()
}

/// Surveillance grid with the canonical five-vehicle layout; vehicle 3 holds
/// the grid center.
fn surveillance_setup() -> (MissionDatabase, FleetState) {
    let db = MissionDatabase::new();
    db.load_scenario(&surveillance_grid());
    for (task, vehicle) in [(1, 1), (4, 1), (2, 2), (3, 2), (5, 3), (7, 4), (8, 4), (6, 5), (9, 5)]
    {
        db.assign(task, vehicle).unwrap();
    }
    let state = fleet_state(
        &[
            (1, [20.0, 100.0, 30.0], 80.0, 1.0),
            (2, [100.0, 100.0, 30.0], 80.0, 1.0),
            (4, [20.0, 20.0, 30.0], 80.0, 1.0),
            (5, [100.0, 20.0, 30.0], 80.0, 1.0),
        ],
        &[(3, [60.0, 60.0, 30.0])],
        &[5],
        &[],
    );
    (db, state)
}

#[test]
fn test_surveillance_center_failure_fully_reallocated() {
    let (db, state) = surveillance_setup();
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);

    let decision = engine.trigger(&state, &db, &validator);

    assert_eq!(decision.strategy(), RecoveryStrategy::FullReallocation);
    let planned: usize = decision.plan().values().map(Vec::len).sum();
    assert_eq!(planned, 1);
    assert_eq!(decision.metric("recovery_rate"), Some(100.0));
    assert_eq!(decision.metric("tasks_lost"), Some(1.0));

    // the committed pair must satisfy every constraint
    for (&vehicle, task_ids) in decision.plan() {
        for &task_id in task_ids {
            let task = db.get_task(task_id).unwrap();
            assert!(validator.check_all(vehicle, &task, &state, &db));
            assert_eq!(task.assigned_vehicle(), Some(vehicle));
        }
    }
    // equal distances from all four corners resolve to the smallest id
    assert_eq!(decision.plan().get(&1), Some(&vec![5]));
}

#[test]
fn test_sar_gps_loss_reallocates_inside_golden_hour() {
    let db = MissionDatabase::new();
    db.load_scenario(&sar_grid());
    db.assign(3, 2).unwrap();
    db.assign(4, 2).unwrap();

    let state = fleet_state(
        &[
            (1, [20.0, 100.0, 30.0], 80.0, 1.0),
            (3, [60.0, 60.0, 30.0], 80.0, 1.0),
            (4, [100.0, 20.0, 30.0], 80.0, 1.0),
        ],
        &[(2, [100.0, 100.0, 30.0])],
        &[3, 4],
        &[],
    );

    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);
    let context = MissionContext::for_search_rescue(TimeDelta::seconds(3600));
    engine.set_mission_context(context.clone());

    let decision = engine.trigger(&state, &db, &validator);

    assert_eq!(decision.strategy(), RecoveryStrategy::FullReallocation);
    let planned: Vec<TaskID> =
        decision.plan().values().flatten().copied().collect();
    assert_eq!(planned.len(), 2);
    assert!(planned.contains(&3) && planned.contains(&4));

    // reassignments complete well within the golden hour: phi > 1 for both
    let objective = ObjectiveFunction::new(context);
    let now = Utc::now();
    for (&vehicle, task_ids) in decision.plan() {
        for &task_id in task_ids {
            let task = db.get_task(task_id).unwrap();
            assert!(objective.modifier(&task, vehicle, &state, now) > 1.0);
        }
    }
}

#[test]
fn test_delivery_infeasible_payload_escalates_without_partial_commit() {
    let now = Utc::now();
    let db = MissionDatabase::new();
    db.load_scenario(&delivery_run(now));
    // package B (2.0 kg) rides on vehicle 1
    db.assign(2, 1).unwrap();
    db.assign(1, 2).unwrap();
    db.assign(3, 3).unwrap();

    let state = fleet_state(
        &[(2, [30.0, 30.0, 25.0], 70.0, 0.3), (3, [80.0, 60.0, 25.0], 70.0, 0.7)],
        &[(1, [50.0, 50.0, 25.0])],
        &[2],
        &[],
    );

    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);
    engine.set_mission_context(MissionContext::for_delivery());

    let decision = engine.trigger(&state, &db, &validator);

    assert_eq!(decision.strategy(), RecoveryStrategy::OperatorEscalation);
    assert!(decision.plan().is_empty());
    assert_eq!(decision.metric("recovery_rate"), Some(0.0));
    assert_eq!(decision.metric("unallocated_count"), Some(1.0));
    // no partial assignment of the package onto an overloaded vehicle
    let package = db.get_task(2).unwrap();
    assert_eq!(package.assigned_vehicle(), Some(1));
    assert_eq!(db.tasks_of(1), vec![2]);
    assert_eq!(db.tasks_of(2), vec![1]);
    assert_eq!(db.tasks_of(3), vec![3]);
}

#[test]
fn test_out_of_grid_rescue_requires_permission() {
    let mut config = GCSConfig::default();
    config.grid_bounds = GridBounds { x_min: 0.0, x_max: 120.0, y_min: 0.0, y_max: 120.0 };
    config.mission = Some(MissionSection {
        kind: TaskKind::SearchRescue,
        golden_hour_sec: Some(3600.0),
        w_temporal: None,
        w_criticality: None,
        w_spatial: None,
        lambda_unallocated: None,
    });

    let db = MissionDatabase::new();
    let stranded = db.add_task(
        TaskKind::SearchRescue,
        Vec3D::new(130.0, 100.0, 30.0),
        90.0,
        TaskOptions { zone_id: Some(3), ..TaskOptions::default() },
    );
    db.assign(stranded, 1).unwrap();

    let state = fleet_state(
        &[
            (2, [60.0, 60.0, 30.0], 80.0, 1.0),
            (3, [20.0, 20.0, 30.0], 80.0, 1.0),
            (4, [100.0, 100.0, 30.0], 80.0, 1.0),
        ],
        &[(1, [110.0, 100.0, 30.0])],
        &[stranded],
        &[4],
    );

    let validator = ConstraintValidator::new(&config);
    let task = db.get_task(stranded).unwrap();
    assert!(!validator.check_all(2, &task, &state, &db));
    assert!(!validator.check_all(3, &task, &state, &db));
    assert!(validator.check_all(4, &task, &state, &db));

    let engine = OODAEngine::new(&config);
    let decision = engine.trigger(&state, &db, &validator);
    assert_eq!(decision.strategy(), RecoveryStrategy::FullReallocation);
    assert_eq!(decision.plan().get(&4), Some(&vec![stranded]));
    assert_eq!(decision.plan().len(), 1);
}

#[test]
fn test_optimize_without_lost_tasks_is_trivial() {
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let db = MissionDatabase::new();
    let state = fleet_state(&[(1, [10.0, 10.0, 30.0], 80.0, 1.0)], &[], &[], &[]);

    let optimizer = AllocationOptimizer::new(MissionContext::for_surveillance());
    let result = optimizer.optimize(&state, &[], &validator, &db, Utc::now());

    assert!(result.allocation().is_empty());
    assert_eq!(result.coverage_percentage(), 100.0);
    assert_eq!(result.iterations(), 0);
    assert!(result.unallocated_tasks().is_empty());
}

#[test]
fn test_optimize_without_operational_vehicles_strands_everything() {
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let db = MissionDatabase::new();
    db.load_scenario(&surveillance_grid());
    let state = fleet_state(&[], &[(3, [60.0, 60.0, 30.0])], &[5, 2], &[]);

    let optimizer = AllocationOptimizer::new(MissionContext::for_surveillance());
    let lost = lost_records(&db, &[5, 2]);
    let result = optimizer.optimize(&state, &lost, &validator, &db, Utc::now());

    assert!(result.allocation().is_empty());
    assert_eq!(result.coverage_percentage(), 0.0);
    assert_eq!(result.unallocated_tasks(), &[2, 5]);
    assert_eq!(result.iterations(), 0);
}

#[test]
fn test_payload_epsilon_over_capacity_stays_unallocated() {
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let db = MissionDatabase::new();
    let heavy = db.add_task(
        TaskKind::Delivery,
        Vec3D::new(50.0, 50.0, 25.0),
        80.0,
        TaskOptions { payload_kg: Some(1.0 + 1e-6), ..TaskOptions::default() },
    );
    let state = fleet_state(&[(1, [40.0, 40.0, 25.0], 90.0, 1.0)], &[], &[heavy], &[]);

    let optimizer = AllocationOptimizer::new(MissionContext::for_delivery());
    let lost = lost_records(&db, &[heavy]);
    let result = optimizer.optimize(&state, &lost, &validator, &db, Utc::now());
    assert!(result.allocation().is_empty());
    assert_eq!(result.unallocated_tasks(), &[heavy]);

    let engine = OODAEngine::new(&config);
    engine.set_mission_context(MissionContext::for_delivery());
    let decision = engine.trigger(&state, &db, &validator);
    assert_eq!(decision.strategy(), RecoveryStrategy::OperatorEscalation);
}

#[test]
fn test_decide_is_deterministic_on_identical_inputs() {
    let (db, state) = surveillance_setup();
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let now = Utc::now();
    let lost = lost_records(&db, state.lost_tasks());

    let optimizer = AllocationOptimizer::new(MissionContext::for_surveillance());
    let first = optimizer.optimize(&state, &lost, &validator, &db, now);
    let second = optimizer.optimize(&state, &lost, &validator, &db, now);

    assert_eq!(first.allocation(), second.allocation());
    assert!((first.objective_score() - second.objective_score()).abs() < 1e-12);

    // a freshly built optimizer from the same context agrees as well
    let rebuilt = AllocationOptimizer::new(MissionContext::for_surveillance());
    let third = rebuilt.optimize(&state, &lost, &validator, &db, now);
    assert_eq!(first.allocation(), third.allocation());
}

#[test]
fn test_tie_break_prefers_more_coverage_then_lexicographic() {
    let mut fuller = ReallocationPlan::new();
    fuller.insert(1, vec![1, 2]);
    let mut sparser = ReallocationPlan::new();
    sparser.insert(1, vec![1]);
    // equal within tolerance: the allocation with fewer unallocated wins
    assert!(candidate_wins(1.0, &fuller, 1.0 + 5e-10, &sparser));
    assert!(!candidate_wins(1.0, &sparser, 1.0, &fuller));

    let mut smaller = ReallocationPlan::new();
    smaller.insert(1, vec![1, 2]);
    let mut larger = ReallocationPlan::new();
    larger.insert(1, vec![1, 3]);
    assert!(candidate_wins(1.0, &smaller, 1.0, &larger));
    assert!(!candidate_wins(1.0, &larger, 1.0, &smaller));
    // identical sequences are never a strict improvement
    assert!(!candidate_wins(1.0, &smaller, 1.0, &smaller.clone()));

    // a clear score win overrides both tie-breaks
    assert!(candidate_wins(2.0, &sparser, 1.0, &fuller));
}

#[test]
fn test_priority_blends_urgency_criticality_and_distance() {
    let db = MissionDatabase::new();
    let now = Utc::now();
    let urgent = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(100.0, 100.0, 25.0),
            80.0,
            TaskOptions {
                deadline: Some(now + TimeDelta::seconds(30)),
                duration: Some(TimeDelta::seconds(60)),
                payload_kg: Some(0.5),
                ..TaskOptions::default()
            },
        ))
        .unwrap();
    let relaxed = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(100.0, 100.0, 25.0),
            80.0,
            TaskOptions {
                deadline: Some(now + TimeDelta::seconds(600)),
                duration: Some(TimeDelta::seconds(60)),
                payload_kg: Some(0.5),
                ..TaskOptions::default()
            },
        ))
        .unwrap();

    let state = fleet_state(&[(1, [100.0, 90.0, 25.0], 90.0, 1.0)], &[], &[], &[]);
    let objective = ObjectiveFunction::new(MissionContext::for_delivery());

    let p_urgent = objective.task_priority(&urgent, &state, now);
    let p_relaxed = objective.task_priority(&relaxed, &state, now);
    assert!(p_urgent > p_relaxed);
    assert!((0.0..=1.0).contains(&p_urgent));

    // with nobody operational the spatial cost saturates at 1
    let empty = fleet_state(&[], &[(9, [0.0, 0.0, 25.0])], &[], &[]);
    let p_stranded = objective.task_priority(&urgent, &empty, now);
    assert!(p_stranded < p_urgent);
}

#[test]
fn test_delivery_modifier_halves_when_late() {
    let db = MissionDatabase::new();
    let now = Utc::now();
    let reachable = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(110.0, 100.0, 25.0),
            70.0,
            TaskOptions {
                deadline: Some(now + TimeDelta::seconds(300)),
                duration: Some(TimeDelta::seconds(60)),
                payload_kg: Some(0.5),
                ..TaskOptions::default()
            },
        ))
        .unwrap();
    let hopeless = db
        .get_task(db.add_task(
            TaskKind::Delivery,
            Vec3D::new(2000.0, 1500.0, 25.0),
            70.0,
            TaskOptions {
                deadline: Some(now + TimeDelta::seconds(90)),
                duration: Some(TimeDelta::seconds(60)),
                payload_kg: Some(0.5),
                ..TaskOptions::default()
            },
        ))
        .unwrap();

    let state = fleet_state(&[(1, [100.0, 100.0, 25.0], 90.0, 1.0)], &[], &[], &[]);
    let objective = ObjectiveFunction::new(MissionContext::for_delivery());
    assert_eq!(objective.modifier(&reachable, 1, &state, now), 1.0);
    assert_eq!(objective.modifier(&hopeless, 1, &state, now), 0.5);
}

#[test]
fn test_surveillance_modifier_tracks_coverage_gaps() {
    let db = MissionDatabase::new();
    let task = db
        .get_task(db.add_task(
            TaskKind::Surveillance,
            Vec3D::new(60.0, 60.0, 30.0),
            60.0,
            TaskOptions { zone_id: Some(5), ..TaskOptions::default() },
        ))
        .unwrap();
    let state = fleet_state(&[(1, [20.0, 20.0, 30.0], 90.0, 1.0)], &[], &[], &[]);
    let now = Utc::now();

    let mut objective = ObjectiveFunction::new(MissionContext::for_surveillance());
    // untracked zone: no gap, full value
    assert_eq!(objective.modifier(&task, 1, &state, now), 1.0);
    objective.set_coverage_gap(5, 0.5);
    assert!((objective.modifier(&task, 1, &state, now) - 0.9).abs() < 1e-12);
}

#[test]
fn test_objective_penalizes_unallocated_tasks() {
    let db = MissionDatabase::new();
    db.load_scenario(&surveillance_grid());
    let state = fleet_state(&[(1, [20.0, 100.0, 30.0], 80.0, 1.0)], &[], &[], &[]);
    let lost = lost_records(&db, &[5, 6]);
    let context = MissionContext::for_surveillance();
    let objective = ObjectiveFunction::new(context.clone());

    let empty_score =
        objective.score(&ReallocationPlan::new(), &state, &lost, &db, Utc::now());
    assert!((empty_score - (-context.lambda_unallocated() * 2.0)).abs() < 1e-12);

    let mut plan = ReallocationPlan::new();
    plan.insert(1, vec![5]);
    let partial_score = objective.score(&plan, &state, &lost, &db, Utc::now());
    assert!(partial_score > empty_score);
}

#[test]
fn test_engine_phase_timings_sum_to_cycle_time() {
    let (db, state) = surveillance_setup();
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);

    let decision = engine.trigger(&state, &db, &validator);
    let timings = decision.phase_timings();
    assert!(timings.total_ms() <= decision.execution_time_ms() + 1.0);
    assert!(decision.execution_time_ms() - timings.total_ms() < 50.0);
}

#[test]
fn test_engine_aggregates_performance_stats() {
    let (db, state) = surveillance_setup();
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);

    engine.trigger(&state, &db, &validator);
    engine.trigger(&state, &db, &validator);

    let stats = engine.performance_stats();
    assert_eq!(stats.total_cycles, 2);
    assert_eq!(stats.total_tasks_lost, 2);
    assert_eq!(stats.total_tasks_recovered, 2);
    assert_eq!(stats.overall_recovery_rate, 100.0);
    assert!(stats.cycle_ms.is_some());
    assert!(stats.decide_ms.is_some());
    let recovery = stats.recovery_rate.unwrap();
    assert_eq!(recovery.mean, 100.0);
    assert_eq!(recovery.stddev, 0.0);
    assert!(stats.objective_score.is_some());
}

#[test]
fn test_engine_escalates_when_nothing_can_be_done() {
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let db = MissionDatabase::new();
    let engine = OODAEngine::new(&config);

    // lost ids unknown to the database are skipped, leaving nothing to plan
    let state = fleet_state(&[(1, [10.0, 10.0, 30.0], 90.0, 1.0)], &[(2, [0.0, 0.0, 30.0])], &[999], &[]);
    let decision = engine.trigger(&state, &db, &validator);
    assert_eq!(decision.strategy(), RecoveryStrategy::OperatorEscalation);
    assert!(decision.plan().is_empty());
    assert_eq!(decision.metric("operational_uavs"), Some(1.0));
    assert_eq!(decision.metric("failed_uavs"), Some(1.0));
}

#[test]
fn test_decision_metrics_are_complete() {
    let (db, state) = surveillance_setup();
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let engine = OODAEngine::new(&config);

    let decision = engine.trigger(&state, &db, &validator);
    for key in [
        "recovery_rate",
        "coverage_loss",
        "tasks_recovered",
        "tasks_lost",
        "unallocated_count",
        "battery_spare",
        "payload_spare",
        "operational_uavs",
        "failed_uavs",
        "temporal_margin",
        "recoverable_tasks",
        "objective_score",
        "optimization_time_ms",
        "optimization_iterations",
        "optimality_gap_estimate",
        "affected_zones",
    ] {
        assert!(decision.metric(key).is_some(), "missing metric {key}");
    }
    assert_eq!(decision.metric("affected_zones"), Some(1.0));
    assert!((decision.metric("coverage_loss").unwrap() - 100.0 / 9.0).abs() < 1e-9);
}

#[test]
fn test_randomized_fleets_allocate_deterministically() {
    use rand::Rng;
    let config = GCSConfig::default();
    let validator = ConstraintValidator::new(&config);
    let mut rng = rand::rng();

    for round in 0..10 {
        let db = MissionDatabase::new();
        let mut lost_ids = Vec::new();
        for _ in 0..6 {
            let x = rng.random_range(0.0..3000.0);
            let y = rng.random_range(0.0..2000.0);
            let priority = rng.random_range(0.0..100.0);
            lost_ids.push(db.add_task(
                TaskKind::Surveillance,
                Vec3D::new(x, y, 30.0),
                priority,
                TaskOptions::default(),
            ));
        }
        let vehicles: Vec<(VehicleID, [f64; 3], f64, f64)> = (1..=4)
            .map(|id| {
                let pos =
                    [rng.random_range(0.0..3000.0), rng.random_range(0.0..2000.0), 30.0];
                (id, pos, rng.random_range(30.0..100.0), 1.0)
            })
            .collect();
        let state = fleet_state(&vehicles, &[], &lost_ids, &[]);
        let lost = lost_records(&db, &lost_ids);
        let now = Utc::now();

        let optimizer = AllocationOptimizer::new(MissionContext::for_surveillance());
        let first = optimizer.optimize(&state, &lost, &validator, &db, now);
        let second = optimizer.optimize(&state, &lost, &validator, &db, now);
        assert_eq!(first.allocation(), second.allocation(), "round {round} diverged");

        // every planned pair is feasible and the accounting is consistent
        for (&vehicle, task_ids) in first.allocation() {
            for &task_id in task_ids {
                let task = db.get_task(task_id).unwrap();
                assert!(validator.check_all(vehicle, &task, &state, &db));
            }
        }
        let planned: usize = first.allocation().values().map(Vec::len).sum();
        assert_eq!(planned + first.unallocated_tasks().len(), lost.len());
    }
}

#[test]
fn test_mission_context_factories_and_config_overrides() {
    let surveillance = MissionContext::for_surveillance();
    assert_eq!(surveillance.kind(), TaskKind::Surveillance);
    assert!((surveillance.weights().criticality() - 0.5).abs() < 1e-12);

    let sar = MissionContext::for_search_rescue(TimeDelta::seconds(1800));
    assert_eq!(sar.kind(), TaskKind::SearchRescue);
    assert!((sar.lambda_unallocated() - 0.5).abs() < 1e-12);

    let mut config = GCSConfig::default();
    config.mission = Some(MissionSection {
        kind: TaskKind::Delivery,
        golden_hour_sec: None,
        w_temporal: Some(0.1),
        w_criticality: Some(0.7),
        w_spatial: Some(0.2),
        lambda_unallocated: Some(0.9),
    });
    let context = config.mission_context();
    assert_eq!(context.kind(), TaskKind::Delivery);
    assert!((context.weights().temporal() - 0.1).abs() < 1e-12);
    assert!((context.lambda_unallocated() - 0.9).abs() < 1e-12);
}
