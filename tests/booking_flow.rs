use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use ulid::Ulid;

use roomledger::engine::{Engine, EngineError};
use roomledger::gate::Principal;
use roomledger::model::*;
use roomledger::service::{BookingService, ReservationRequest};

const H: Ms = 3_600_000;
/// 2025-03-03T00:00:00Z
const DAY: Ms = 1_740_960_000_000;

// ── Test infrastructure ──────────────────────────────────────

fn test_data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("roomledger_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

struct World {
    svc: Arc<BookingService>,
    admin: Principal,
    profs: Vec<Principal>,
    student: Principal,
    room: Ulid,
}

async fn principal(engine: &Engine, name: &str, role: Role) -> Principal {
    let id = Ulid::new();
    engine
        .register_user(id, name.into(), format!("{name}@campus.test"), role)
        .await
        .unwrap();
    Principal::from(&engine.confirm_user(id).await.unwrap())
}

async fn build_world(engine: Arc<Engine>) -> World {
    let admin = principal(&engine, "admin", Role::Admin).await;
    let mut profs = Vec::new();
    for i in 0..8 {
        profs.push(principal(&engine, &format!("prof{i}"), Role::Professor).await);
    }
    let student = principal(&engine, "student", Role::Student).await;

    let svc = Arc::new(BookingService::new(engine));
    let building = Ulid::new();
    svc.create_building(&admin, building, "Science".into(), "2 Lab Way".into(), "South".into())
        .await
        .unwrap();
    let room = svc
        .create_room(
            &admin,
            Room {
                id: Ulid::new(),
                building_id: building,
                name: "S-204".into(),
                capacity: 40,
                resources: "whiteboard".into(),
                description: "Seminar room".into(),
            },
        )
        .await
        .unwrap();

    World {
        svc,
        admin,
        profs,
        student,
        room: room.id,
    }
}

fn request(room: Ulid, start: Ms, end: Ms) -> ReservationRequest {
    ReservationRequest {
        id: Ulid::new(),
        room_id: room,
        class_id: None,
        start,
        end,
        purpose: "Seminar".into(),
        estimated_attendees: 12,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn professors_racing_for_one_slot() {
    // Journal-backed: each admission awaits the writer while holding the room.
    let dir = test_data_dir();
    let w = build_world(Arc::new(Engine::open(&dir.join("roomledger.wal")).unwrap())).await;

    let attempts = w.profs.iter().map(|p| {
        let svc = w.svc.clone();
        let p = *p;
        let req = request(w.room, DAY + 10 * H, DAY + 11 * H);
        tokio::spawn(async move { svc.create_reservation(&p, req).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::SlotUnavailable(_))))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, w.profs.len() - 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_slots_all_admitted_concurrently() {
    let dir = test_data_dir();
    let w = build_world(Arc::new(Engine::open(&dir.join("roomledger.wal")).unwrap())).await;

    let attempts = w.profs.iter().enumerate().map(|(i, p)| {
        let svc = w.svc.clone();
        let p = *p;
        let start = DAY + 8 * H + i as Ms * H;
        let req = request(w.room, start, start + H);
        tokio::spawn(async move { svc.create_reservation(&p, req).await })
    });
    for r in join_all(attempts).await {
        r.unwrap().unwrap();
    }

    let view = w.svc.public_reservations().await;
    assert_eq!(view.len(), w.profs.len());
    assert!(view.windows(2).all(|pair| pair[0].start_time <= pair[1].start_time));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = test_data_dir();
    let wal = dir.join("roomledger.wal");

    let (room, prof, reservation, class_id, student) = {
        let engine = Arc::new(Engine::open(&wal).unwrap());
        let w = build_world(engine.clone()).await;
        let prof = w.profs[0];
        let class = w
            .svc
            .create_class(&prof, Ulid::new(), "Optics".into(), String::new(), "Physics".into())
            .await
            .unwrap();
        w.svc.add_student(&prof, class.id, w.student.id).await.unwrap();

        let mut req = request(w.room, DAY + 14 * H, DAY + 16 * H);
        req.class_id = Some(class.id);
        let r = w.svc.create_reservation(&prof, req).await.unwrap();
        engine.compact_log().await.unwrap();

        // Post-compaction writes land in the fresh journal.
        let extra = w
            .svc
            .create_reservation(&prof, request(w.room, DAY + 17 * H, DAY + 18 * H))
            .await
            .unwrap();
        w.svc.cancel_reservation(&w.admin, extra.id).await.unwrap();
        (w.room, prof, r.id, class.id, w.student)
    };

    let svc = BookingService::new(Arc::new(Engine::open(&wal).unwrap()));
    let r = svc.get_reservation(&reservation).await.unwrap();
    assert_eq!(r.user_id, prof.id);
    assert_eq!(r.class_id, Some(class_id));
    assert_eq!(svc.list_classes(&student, None).await.len(), 1);

    let active = svc
        .list_reservations(&ReservationFilter {
            room_id: Some(room),
            status: Some(ReservationStatus::Active),
            ..Default::default()
        })
        .await;
    assert_eq!(active.len(), 1);

    let again = svc
        .create_reservation(&prof, request(room, DAY + 15 * H, DAY + 17 * H))
        .await;
    assert!(matches!(again, Err(EngineError::SlotUnavailable(id)) if id == reservation));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn public_view_serializes_for_display() {
    let w = build_world(Arc::new(Engine::in_memory())).await;
    let prof = w.profs[3];
    w.svc
        .create_reservation(&prof, request(w.room, DAY + 9 * H, DAY + 10 * H))
        .await
        .unwrap();

    let view = w.svc.public_reservations().await;
    let json = serde_json::to_value(&view).unwrap();
    let row = &json[0];
    assert_eq!(row["room_name"], "S-204");
    assert_eq!(row["building_name"], "Science");
    assert_eq!(row["user_name"], "prof3");
    assert_eq!(row["user_email"], "prof3@campus.test");
    assert_eq!(row["start_time"], "2025-03-03T09:00:00.000Z");
    assert_eq!(row["end_time"], "2025-03-03T10:00:00.000Z");
    assert_eq!(row["status"], "ACTIVE");
    assert_eq!(row["estimated_attendees"], 12);
}

#[tokio::test]
async fn unauthorized_delete_beats_every_other_precondition() {
    let w = build_world(Arc::new(Engine::in_memory())).await;
    let owner = w.profs[0];
    let class = w
        .svc
        .create_class(&owner, Ulid::new(), "Optics".into(), String::new(), "Physics".into())
        .await
        .unwrap();

    for intruder in [w.profs[1], w.student] {
        let result = w.svc.delete_class(&intruder, class.id).await;
        assert!(matches!(result, Err(EngineError::Unauthorized)));
    }
    assert!(w.svc.get_class(&class.id).await.is_ok());
}
