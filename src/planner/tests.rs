use super::*;
use crate::assignment::elapsed_minutes;
use crate::conflicts::ConflictKind;
use crate::fleet::ConductorEstado;
use crate::settings::ConsecutivePolicy;
use crate::test_support::{catalog, d, fleet, planner_at, planner_with, request, t};

#[test]
fn test_assign_computes_derived_fields() {
    let mut planner = planner_at("2024-06-01");
    let ruta = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "21:00"))
        .unwrap();

    assert_eq!(ruta.estado, RutaEstado::Programada);
    assert_eq!(ruta.tipo, TipoAsignacion::Manual);
    assert_eq!(ruta.hora_fin, t("01:30"));
    assert!(ruta.termina_dia_siguiente);
    assert_eq!(elapsed_minutes(ruta.hora_inicio, ruta.hora_fin), 270);
    assert_eq!(ruta.semana, IsoSemana { anio: 2024, semana: 24 });
    assert_eq!(ruta.dia_semana, 1);
    assert_eq!(ruta.ingreso_estimado, Decimal::from(150));
    assert!(!ruta.es_consecutiva);
}

#[test]
fn test_end_minus_start_equals_tramo_duration() {
    let mut planner = planner_at("2024-06-01");
    let cases = [
        ("C001", "LIMA-ICA", "04:00", 270),
        ("C002", "LIMA-HUACHO", "22:00", 165),
        ("C003", "ICA-LIMA", "19:45", 270),
    ];
    for (conductor, tramo, hora, minutes) in cases {
        let ruta = planner
            .assign(request(conductor, tramo, "2024-06-10", hora))
            .unwrap();
        assert_eq!(elapsed_minutes(ruta.hora_inicio, ruta.hora_fin), minutes);
        assert_eq!(ruta.duration_minutes(), minutes);
    }
}

#[test]
fn test_route_after_completed_route_is_flagged_consecutive() {
    let mut planner = planner_at("2024-06-03");
    let first = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-03", "06:00"))
        .unwrap();
    planner.completar(&first.id, CompletarRequest::default()).unwrap();

    let second = planner
        .assign(request("C001", "ICA-LIMA", "2024-06-04", "06:00"))
        .unwrap();
    assert!(second.es_consecutiva);

    let conflicts = planner.conflicts(ConflictScope::Dia(d("2024-06-04")));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].motivos, vec![ConflictKind::Consecutiva]);
}

#[test]
fn test_consecutive_blocked_by_policy() {
    let rules = PlanningRules {
        politica_consecutiva: ConsecutivePolicy::Bloquear,
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-03");
    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-03", "06:00"))
        .unwrap();

    let err = planner
        .assign(request("C001", "ICA-LIMA", "2024-06-04", "06:00"))
        .unwrap_err();
    assert!(matches!(err, PlanningError::Eligibility(_)));
}

#[test]
fn test_third_route_same_day_exceeds_daily_cap() {
    let mut planner = planner_at("2024-06-01");
    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "05:00"))
        .unwrap();
    planner
        .assign(request("C001", "ICA-LIMA", "2024-06-10", "11:00"))
        .unwrap();

    let err = planner
        .assign(request("C001", "LIMA-HUACHO", "2024-06-10", "17:00"))
        .unwrap_err();
    match err {
        PlanningError::Eligibility(razon) => assert!(razon.contains("máximo 2 por día"), "{}", razon),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(planner.ledger().active_for("C001", d("2024-06-10")).len(), 2);
}

#[test]
fn test_precheck_reuses_assignment_reason() {
    let mut planner = planner_at("2024-06-01");
    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "05:00"))
        .unwrap();
    planner
        .assign(request("C001", "ICA-LIMA", "2024-06-10", "11:00"))
        .unwrap();

    let req = request("C001", "LIMA-HUACHO", "2024-06-10", "17:00");
    let check = planner.validate(&req);
    let err = planner.assign(req).unwrap_err();
    assert!(!check.puede);
    assert_eq!(check.razon, err.to_string());

    let ok = planner.validate(&request("C002", "LIMA-HUACHO", "2024-06-10", "17:00"));
    assert!(ok.puede);
    assert_eq!(ok.razon, "Conductor disponible");
}

#[test]
fn test_duplicate_slot_is_reported() {
    let rules = PlanningRules {
        max_rutas_por_dia: 3,
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-01");
    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();

    let err = planner
        .assign(request("C001", "LIMA-HUACHO", "2024-06-10", "06:00"))
        .unwrap_err();
    assert!(matches!(err, PlanningError::DuplicateAssignment { .. }));
    assert_eq!(planner.ledger().len(), 1);
}

#[test]
fn test_validation_and_not_found_errors() {
    let mut planner = planner_at("2024-06-01");

    let mut missing_date = request("C001", "LIMA-ICA", "2024-06-10", "06:00");
    missing_date.fecha = None;
    assert!(matches!(planner.assign(missing_date), Err(PlanningError::Validation(_))));

    let missing_tramo = request("C001", "", "2024-06-10", "06:00");
    assert!(matches!(planner.assign(missing_tramo), Err(PlanningError::Validation(_))));

    let unknown_driver = request("C999", "LIMA-ICA", "2024-06-10", "06:00");
    assert!(matches!(planner.assign(unknown_driver), Err(PlanningError::NotFound(_))));

    let unknown_tramo = request("C001", "LIMA-CUSCO", "2024-06-10", "06:00");
    assert!(matches!(planner.assign(unknown_tramo), Err(PlanningError::NotFound(_))));

    assert!(matches!(planner.ruta(&Uuid::new_v4()), Err(PlanningError::NotFound(_))));
    assert!(planner.ledger().is_empty());
}

#[test]
fn test_past_date_is_rejected() {
    let mut planner = planner_at("2024-06-10");
    let err = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-09", "06:00"))
        .unwrap_err();
    assert!(err.to_string().contains("ya pasó"));
}

#[test]
fn test_missing_start_time_takes_next_free_slot() {
    let mut planner = planner_at("2024-06-01");
    let mut req = request("C001", "LIMA-ICA", "2024-06-10", "06:00");
    req.hora_inicio = None;
    let first = planner.assign(req.clone()).unwrap();
    assert_eq!(first.hora_inicio, t("06:00"));

    req.tramo_id = "ICA-LIMA".to_string();
    let second = planner.assign(req).unwrap();
    // 06:00 + 4.5 h + 60 min rest
    assert_eq!(second.hora_inicio, t("11:30"));
}

#[test]
fn test_lifecycle_keeps_identity_fields() {
    let mut planner = planner_at("2024-06-01");
    let created = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();

    let confirmed = planner.confirmar(&created.id).unwrap();
    assert_eq!(confirmed.estado, RutaEstado::Programada);
    assert!(confirmed.confirmada_en.is_some());

    let started = planner.iniciar(&created.id, Some(t("06:10"))).unwrap();
    assert_eq!(started.estado, RutaEstado::EnCurso);
    assert_eq!(started.hora_inicio_real, Some(t("06:10")));

    let completed = planner
        .completar(
            &created.id,
            CompletarRequest {
                hora_inicio_real: None,
                hora_fin_real: Some(t("11:10")),
                ingreso_real: Some(Decimal::from(180)),
            },
        )
        .unwrap();
    assert_eq!(completed.estado, RutaEstado::Completada);
    assert_eq!(completed.hora_inicio_real, Some(t("06:10")));
    assert_eq!(completed.duracion_real_horas, Some(Decimal::from(5)));
    assert_eq!(completed.ingreso_estimado, Decimal::from(180));

    for ruta in [&confirmed, &started, &completed] {
        assert_eq!(ruta.id, created.id);
        assert_eq!(ruta.conductor_id, created.conductor_id);
        assert_eq!(ruta.tramo, created.tramo);
        assert_eq!(ruta.fecha, created.fecha);
        assert_eq!(ruta.hora_inicio, created.hora_inicio);
        assert_eq!(ruta.hora_fin, created.hora_fin);
    }

    let history: Vec<&EventKind> = planner.history(&created.id).iter().map(|r| &r.event.kind).collect();
    assert_eq!(history.len(), 4);
    assert!(matches!(history[0], EventKind::Asignada { .. }));
    assert!(matches!(history[3], EventKind::Completada { .. }));
}

#[test]
fn test_cancel_rules_and_balance_decrement() {
    let mut planner = planner_at("2024-06-01");
    let a = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    let b = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-12", "06:00"))
        .unwrap();
    let semana = IsoSemana::of(d("2024-06-10"));
    assert_eq!(planner.balance("C001", semana).rutas_programadas, 2);

    planner.completar(&a.id, CompletarRequest::default()).unwrap();
    let err = planner.cancelar(&a.id, None).unwrap_err();
    assert!(matches!(
        err,
        PlanningError::StateTransition { from: RutaEstado::Completada, .. }
    ));

    let cancelled = planner.cancelar(&b.id, Some("Bus en taller".to_string())).unwrap();
    assert_eq!(cancelled.estado, RutaEstado::Cancelada);
    assert_eq!(cancelled.motivo_cancelacion.as_deref(), Some("Bus en taller"));

    let balance = planner.balance("C001", semana);
    assert_eq!(balance.rutas_programadas, 0);
    assert_eq!(balance.rutas_completadas, 1);

    // Completing or starting a cancelled route is not allowed either
    assert!(planner.completar(&b.id, CompletarRequest::default()).is_err());
    assert!(planner.iniciar(&b.id, None).is_err());
}

#[test]
fn test_cancel_clears_next_day_consecutive_flag() {
    let mut planner = planner_at("2024-06-01");
    let monday = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    let tuesday = planner
        .assign(request("C001", "ICA-LIMA", "2024-06-11", "06:00"))
        .unwrap();
    assert!(tuesday.es_consecutiva);

    planner.cancelar(&monday.id, None).unwrap();
    assert!(!planner.ruta(&tuesday.id).unwrap().es_consecutiva);
}

#[test]
fn test_assigning_previous_day_flags_existing_route() {
    let mut planner = planner_at("2024-06-01");
    let tuesday = planner
        .assign(request("C001", "ICA-LIMA", "2024-06-11", "06:00"))
        .unwrap();
    assert!(!tuesday.es_consecutiva);

    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    assert!(planner.ruta(&tuesday.id).unwrap().es_consecutiva);
}

#[test]
fn test_reschedule_moves_route_and_both_balances() {
    let mut planner = planner_at("2024-06-01");
    let ruta = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-14", "06:00"))
        .unwrap();
    planner.confirmar(&ruta.id).unwrap();

    let moved = planner
        .reagendar(&ruta.id, d("2024-06-17"), Some(t("08:00")))
        .unwrap();
    assert_eq!(moved.id, ruta.id);
    assert_eq!(moved.estado, RutaEstado::Programada);
    assert_eq!(moved.fecha, d("2024-06-17"));
    assert_eq!(moved.hora_fin, t("12:30"));
    assert_eq!(moved.semana, IsoSemana { anio: 2024, semana: 25 });
    assert!(moved.confirmada_en.is_none());

    assert_eq!(planner.balance("C001", IsoSemana { anio: 2024, semana: 24 }).total(), 0);
    assert_eq!(planner.balance("C001", IsoSemana { anio: 2024, semana: 25 }).total(), 1);
    assert!(planner
        .ledger()
        .slot_taken("C001", d("2024-06-14"), t("06:00"))
        .is_none());
}

#[test]
fn test_reschedule_reopens_cancelled_route_and_rejects_completed() {
    let mut planner = planner_at("2024-06-01");
    let ruta = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    planner.cancelar(&ruta.id, None).unwrap();

    let reopened = planner.reagendar(&ruta.id, d("2024-06-12"), None).unwrap();
    assert_eq!(reopened.estado, RutaEstado::Programada);
    assert!(reopened.motivo_cancelacion.is_none());

    planner.completar(&ruta.id, CompletarRequest::default()).unwrap();
    let err = planner.reagendar(&ruta.id, d("2024-06-13"), None).unwrap_err();
    assert!(matches!(err, PlanningError::StateTransition { .. }));
}

#[test]
fn test_reschedule_onto_own_slot_is_allowed() {
    let mut planner = planner_at("2024-06-01");
    let ruta = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    let moved = planner
        .reagendar(&ruta.id, d("2024-06-10"), Some(t("07:00")))
        .unwrap();
    assert_eq!(moved.hora_inicio, t("07:00"));
    assert_eq!(planner.ledger().active_for("C001", d("2024-06-10")).len(), 1);
}

#[test]
fn test_recompute_is_idempotent() {
    let mut planner = planner_at("2024-06-01");
    for (fecha, hora) in [("2024-06-10", "06:00"), ("2024-06-12", "06:00"), ("2024-06-14", "09:00")] {
        planner.assign(request("C001", "LIMA-ICA", fecha, hora)).unwrap();
    }
    let semana = IsoSemana::of(d("2024-06-10"));
    let first = planner.recompute_balance("C001", semana);
    let second = planner.recompute_balance("C001", semana);
    assert_eq!(first, second);
    assert!(first.objetivo_cumplido);
    assert_eq!(first.ingreso_total, Decimal::from(450));
}

#[test]
fn test_completion_streak_sends_conductor_to_rest() {
    let rules = PlanningRules {
        dias_para_descanso: 2,
        dias_de_descanso: 1,
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-10");
    let a = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();
    let b = planner
        .assign(request("C001", "ICA-LIMA", "2024-06-11", "06:00"))
        .unwrap();
    planner.completar(&a.id, CompletarRequest::default()).unwrap();
    planner.completar(&b.id, CompletarRequest::default()).unwrap();

    let conductor = planner.fleet().get("C001").unwrap();
    assert_eq!(conductor.estado, ConductorEstado::Descanso);
    assert_eq!(conductor.descanso_hasta, Some(d("2024-06-12")));

    let err = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-12", "06:00"))
        .unwrap_err();
    assert!(err.to_string().contains("descanso"));
    assert!(planner
        .assign(request("C001", "LIMA-ICA", "2024-06-13", "06:00"))
        .is_ok());

    let rest_events = planner
        .events()
        .history(&Aggregate::Conductor("C001".to_string()));
    assert_eq!(rest_events.len(), 1);
}

#[test]
fn test_reload_keeps_conductor_rest() {
    let rules = PlanningRules {
        dias_para_descanso: 2,
        dias_de_descanso: 1,
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-10");
    for (tramo, fecha) in [("LIMA-ICA", "2024-06-10"), ("ICA-LIMA", "2024-06-11")] {
        let ruta = planner.assign(request("C001", tramo, fecha, "06:00")).unwrap();
        planner.completar(&ruta.id, CompletarRequest::default()).unwrap();
    }

    planner.reload(catalog(), fleet(5));

    let conductor = planner.fleet().get("C001").unwrap();
    assert_eq!(conductor.estado, ConductorEstado::Descanso);
    let err = planner
        .assign(request("C001", "LIMA-ICA", "2024-06-12", "06:00"))
        .unwrap_err();
    assert!(matches!(err, PlanningError::Eligibility(_)));
    assert!(err.to_string().contains("descanso"));
}

#[test]
fn test_auto_assign_respects_tramo_slots_and_daily_cap() {
    let mut planner = planner_at("2024-06-01");
    let report = planner.auto_assign(d("2024-06-10"));

    assert!(report.success);
    // 5 drivers, 3 tramos with one slot each
    assert_eq!(report.assigned_count, 3);
    assert!(report.assigned_count <= (5 * 2).min(3));
    assert_eq!(report.skipped_count, 2);

    let assigned: Vec<&str> = report.asignadas.iter().map(|r| r.conductor_id.as_str()).collect();
    assert_eq!(assigned, vec!["C001", "C002", "C003"]);
    assert!(report.asignadas.iter().all(|r| r.tipo == TipoAsignacion::Automatica));

    let mut slots = HashSet::new();
    for ruta in &report.asignadas {
        assert!(slots.insert((ruta.conductor_id.clone(), ruta.fecha, ruta.hora_inicio)));
    }
    assert!(report
        .report
        .iter()
        .any(|e| e.conductor_id == "C005" && matches!(e.outcome, AutoAssignOutcome::Omitida { .. })));
}

#[test]
fn test_auto_assign_second_round_uses_other_tramos() {
    let rules = PlanningRules {
        cupos_por_tramo: 2,
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-01");
    let report = planner.auto_assign(d("2024-06-10"));

    assert_eq!(report.assigned_count, 6);
    for conductor in ["C001", "C002", "C003", "C004", "C005"] {
        let rutas = planner.ledger().active_for(conductor, d("2024-06-10"));
        assert!(rutas.len() <= 2);
        if rutas.len() == 2 {
            assert_ne!(rutas[0].tramo, rutas[1].tramo);
            let (first, second) = if rutas[0].hora_inicio < rutas[1].hora_inicio {
                (rutas[0], rutas[1])
            } else {
                (rutas[1], rutas[0])
            };
            assert!(first.interval_relative_to(first.fecha).1 <= second.interval_relative_to(first.fecha).0);
        }
    }
}

#[test]
fn test_auto_assign_prioritises_fewer_completed_and_skips_target_reached() {
    let mut planner = planner_at("2024-06-10");
    // C001 has completed a route this week, C002 already has four routes
    let done = planner
        .assign(request("C001", "LIMA-HUACHO", "2024-06-10", "06:00"))
        .unwrap();
    planner.completar(&done.id, CompletarRequest::default()).unwrap();
    for fecha in ["2024-06-10", "2024-06-12", "2024-06-14", "2024-06-16"] {
        planner.assign(request("C002", "LIMA-ICA", fecha, "14:00")).unwrap();
    }

    // LIMA-ICA is already taken by C002 that day, leaving two slots
    let report = planner.auto_assign(d("2024-06-12"));
    let order: Vec<&str> = report.asignadas.iter().map(|r| r.conductor_id.as_str()).collect();
    assert_eq!(order, vec!["C003", "C004"]);
    assert!(report
        .report
        .iter()
        .any(|e| e.conductor_id == "C001" && matches!(e.outcome, AutoAssignOutcome::Omitida { .. })));

    let skipped = report
        .report
        .iter()
        .find(|e| e.conductor_id == "C002")
        .unwrap();
    match &skipped.outcome {
        AutoAssignOutcome::Omitida { razon } => assert!(razon.contains("Objetivo semanal")),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_auto_assign_flags_consecutive_routes() {
    let mut planner = planner_at("2024-06-09");
    planner
        .assign(request("C001", "LIMA-HUACHO", "2024-06-09", "06:00"))
        .unwrap();

    let report = planner.auto_assign(d("2024-06-10"));
    let c001 = report
        .asignadas
        .iter()
        .find(|r| r.conductor_id == "C001")
        .unwrap();
    assert!(c001.es_consecutiva);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].ruta.conductor_id, "C001");
}

#[test]
fn test_auto_assign_rejects_past_dates_and_empty_catalog() {
    let mut planner = planner_at("2024-06-10");
    let report = planner.auto_assign(d("2024-06-09"));
    assert!(!report.success);
    assert_eq!(report.assigned_count, 0);

    planner.reload(TramoCatalog::new(), crate::test_support::fleet(2));
    let report = planner.auto_assign(d("2024-06-10"));
    assert!(!report.success);
    assert_eq!(report.message, "No hay tramos activos");
}

#[test]
fn test_auto_assign_reports_window_failures_without_aborting() {
    let rules = PlanningRules {
        ventana_fin: t("06:00"),
        hora_inicio_automatica: t("06:00"),
        ..PlanningRules::default()
    };
    let mut planner = planner_with(rules, "2024-06-01");
    // C001 is busy until 10:30; no automatic start fits before 06:00
    planner
        .assign(request("C001", "LIMA-ICA", "2024-06-10", "06:00"))
        .unwrap();

    let report = planner.auto_assign(d("2024-06-10"));
    assert!(report.success);
    // LIMA-ICA is taken, so C002 and C003 get the remaining two tramos
    assert_eq!(report.assigned_count, 2);
    let failed = report
        .report
        .iter()
        .find(|e| e.conductor_id == "C001")
        .unwrap();
    assert!(matches!(failed.outcome, AutoAssignOutcome::Fallida { .. }));
}
