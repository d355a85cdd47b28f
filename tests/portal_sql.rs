use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use campus_slots::catalog::SlotCatalog;
use campus_slots::tenant::TenantManager;
use campus_slots::wire;

const PASSWORD: &str = "campus";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("campus_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, SlotCatalog::standard()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, PASSWORD.to_string(), None).await;
            });
        }
    });

    addr
}

/// Connect as `user`; the login name is the actor id.
async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("campus")
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|code| code.code())
}

struct Campus {
    addr: SocketAddr,
    auditorium: Ulid,
    cs_lab: Ulid,
}

/// Register actors and create one shared and one departmental resource.
async fn seed() -> Campus {
    let addr = start_test_server().await;
    let vc = connect(addr, "vc").await;
    vc.batch_execute(
        "INSERT INTO actors (id, department, role) VALUES ('vc', 'University', 'vc');
         INSERT INTO actors (id, department, role) VALUES ('hod-cs', 'CS', 'hod');
         INSERT INTO actors (id, department, role) VALUES ('hod-math', 'Mathematics', 'hod');
         INSERT INTO actors (id, department, role) VALUES ('student-1', 'CS', 'student');",
    )
    .await
    .unwrap();

    let auditorium = Ulid::new();
    vc.batch_execute(&format!(
        r#"INSERT INTO resources (id, name, type, capacity, owning_department, equipment)
           VALUES ('{auditorium}', 'Main Auditorium', 'auditorium', 500, NULL, '["projector"]')"#
    ))
    .await
    .unwrap();

    let cs_lab = Ulid::new();
    let hod_cs = connect(addr, "hod-cs").await;
    hod_cs
        .batch_execute(&format!(
            "INSERT INTO resources (id, name, type, capacity, owning_department, building)
             VALUES ('{cs_lab}', 'CS Lab 1', 'lab', 40, 'CS', 'Block C')"
        ))
        .await
        .unwrap();

    Campus {
        addr,
        auditorium,
        cs_lab,
    }
}

async fn request(client: &Client, resource: Ulid, slot: &str, day: u8) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO booking_requests (id, target_resource_id, time_slot_id, day_of_week, course_name, expected_attendance)
             VALUES ('{id}', '{resource}', '{slot}', {day}, 'Linear Algebra', 35)"
        ))
        .await
        .unwrap();
    id
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn resources_listed_by_scope() {
    let campus = seed().await;
    let client = connect(campus.addr, "hod-math").await;

    assert_eq!(rows(&client, "SELECT * FROM resources").await.len(), 2);

    let shared = rows(&client, "SELECT * FROM resources WHERE shared = true").await;
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].get("id"), Some(campus.auditorium.to_string().as_str()));
    assert_eq!(shared[0].get("owning_department"), None);
    assert_eq!(shared[0].get("equipment"), Some(r#"["projector"]"#));

    let cs = rows(&client, "SELECT * FROM resources WHERE department = 'CS'").await;
    assert_eq!(cs.len(), 1);
    assert_eq!(cs[0].get("building"), Some("Block C"));
    assert_eq!(cs[0].get("type"), Some("lab"));
}

#[tokio::test]
async fn department_booking_round_trip() {
    let campus = seed().await;
    let hod_math = connect(campus.addr, "hod-math").await;
    let hod_cs = connect(campus.addr, "hod-cs").await;

    let id = request(&hod_math, campus.cs_lab, "morning_1", 2).await;

    let queue = rows(&hod_cs, "SELECT * FROM pending_queue").await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].get("id"), Some(id.to_string().as_str()));
    assert_eq!(queue[0].get("time_slot_id"), Some("1"));
    assert_eq!(queue[0].get("status"), Some("pending"));
    assert!(rows(&hod_math, "SELECT * FROM pending_queue").await.is_empty());

    hod_cs
        .batch_execute(&format!(
            "INSERT INTO booking_responses (request_id, action, notes) VALUES ('{id}', 'approve', 'ok')"
        ))
        .await
        .unwrap();

    let cells = rows(
        &hod_math,
        &format!("SELECT * FROM weekly_slots WHERE resource_id = '{}' AND day_of_week = 2", campus.cs_lab),
    )
    .await;
    assert_eq!(cells.len(), 10);
    let first = cells.iter().find(|c| c.get("time_slot_id") == Some("1")).unwrap();
    assert_eq!(first.get("occupied"), Some("t"));
    assert_eq!(first.get("kind"), Some("booking"));
    assert_eq!(first.get("department"), Some("Mathematics"));
    assert_eq!(cells.iter().filter(|c| c.get("occupied") == Some("f")).count(), 9);

    let conflicts = rows(
        &hod_math,
        &format!(
            "SELECT * FROM conflicts WHERE resource_id = '{}' AND time_slot_id = '1' AND day_of_week = 2",
            campus.cs_lab
        ),
    )
    .await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].get("kind"), Some("slot_occupied"));

    let mine = rows(&hod_math, "SELECT * FROM booking_requests WHERE requester_department = 'Mathematics'").await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].get("status"), Some("approved"));
    assert_eq!(mine[0].get("approved_by"), Some("hod-cs"));
}

#[tokio::test]
async fn university_booking_needs_vc() {
    let campus = seed().await;
    let hod_math = connect(campus.addr, "hod-math").await;
    let vc = connect(campus.addr, "vc").await;

    let id = request(&hod_math, campus.auditorium, "3", 4).await;
    vc.batch_execute(&format!(
        "INSERT INTO booking_responses (request_id, action) VALUES ('{id}', 'approve')"
    ))
    .await
    .unwrap();

    let queue = rows(&vc, "SELECT * FROM vc_queue").await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].get("status"), Some("awaiting_vc"));
    assert_eq!(queue[0].get("vc_approved"), None);

    let grid = format!(
        "SELECT * FROM weekly_slots WHERE resource_id = '{}' AND day_of_week = 4",
        campus.auditorium
    );
    assert!(rows(&vc, &grid).await.iter().all(|c| c.get("occupied") == Some("f")));

    vc.batch_execute(&format!(
        "INSERT INTO vc_responses (request_id, approve, notes) VALUES ('{id}', true, 'approved for seminar')"
    ))
    .await
    .unwrap();

    assert!(rows(&vc, "SELECT * FROM vc_queue").await.is_empty());
    let cells = rows(&vc, &grid).await;
    let held = cells.iter().find(|c| c.get("time_slot_id") == Some("3")).unwrap();
    assert_eq!(held.get("occupied"), Some("t"));
    assert_eq!(held.get("course_name"), Some("Linear Algebra"));
}

#[tokio::test]
async fn extended_protocol_parameters() {
    let campus = seed().await;
    let hod_math = connect(campus.addr, "hod-math").await;

    let id = Ulid::new().to_string();
    let resource = campus.cs_lab.to_string();
    let inserted = hod_math
        .execute(
            "INSERT INTO booking_requests (id, target_resource_id, time_slot_id, day_of_week, purpose) VALUES ($1, $2, $3, $4, $5)",
            &[&id, &resource, &"afternoon_1", &"5", &"Guest lecture"],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    hod_math
        .execute("INSERT INTO booking_withdrawals (request_id) VALUES ($1)", &[&id])
        .await
        .unwrap();

    let mine = rows(&hod_math, "SELECT * FROM booking_requests WHERE requester_department = 'Mathematics'").await;
    assert_eq!(mine[0].get("status"), Some("withdrawn"));
    assert_eq!(mine[0].get("purpose"), Some("Guest lecture"));
}

#[tokio::test]
async fn parameter_text_kept_verbatim() {
    let campus = seed().await;
    let hod_math = connect(campus.addr, "hod-math").await;

    let id = Ulid::new().to_string();
    let resource = campus.cs_lab.to_string();
    hod_math
        .execute(
            "INSERT INTO booking_requests (id, target_resource_id, time_slot_id, day_of_week, course_name, purpose, expected_attendance)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[&id, &resource, &"2", &"4", &"Fees $1 each", &"Bob's $2 review'); --", &"30"],
        )
        .await
        .unwrap();

    let mine = rows(&hod_math, "SELECT * FROM booking_requests WHERE requester_department = 'Mathematics'").await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].get("course_name"), Some("Fees $1 each"));
    assert_eq!(mine[0].get("purpose"), Some("Bob's $2 review'); --"));
}

#[tokio::test]
async fn errors_carry_sqlstate() {
    let campus = seed().await;

    let student = connect(campus.addr, "student-1").await;
    let err = student
        .batch_execute(&format!(
            "INSERT INTO booking_requests (id, target_resource_id, time_slot_id, day_of_week, course_name)
             VALUES ('{}', '{}', '1', 1, 'Club meeting')",
            Ulid::new(),
            campus.auditorium
        ))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0001"));

    let err = student.batch_execute("UPDATE resources SET capacity = 1").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    let ghost = connect(campus.addr, "ghost").await;
    let err = ghost.simple_query("SELECT * FROM pending_queue").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0001"));
    let message = err.as_db_error().map(|db| db.message().to_string()).unwrap_or_default();
    assert_eq!(message, "unknown actor: ghost");
}

#[tokio::test]
async fn sessions_and_auto_generate() {
    let campus = seed().await;
    let hod_cs = connect(campus.addr, "hod-cs").await;

    let course = Ulid::new();
    hod_cs
        .batch_execute(&format!(
            "INSERT INTO courses (id, name, department, expected_size, weekly_hours, faculty)
             VALUES ('{course}', 'Operating Systems', 'CS', 30, 3, 'Dr. Iyer')"
        ))
        .await
        .unwrap();

    let generated = rows(&hod_cs, "CALL auto_generate()").await;
    assert_eq!(generated.len(), 3);
    assert!(generated.iter().all(|s| s.get("resource_id") == Some(campus.cs_lab.to_string().as_str())));

    let sessions = rows(&hod_cs, "SELECT * FROM class_sessions WHERE department = 'CS'").await;
    assert_eq!(sessions.len(), 3);

    let err = hod_cs
        .batch_execute(&format!(
            "INSERT INTO class_sessions (id, course_id, resource_id, time_slot_id, day_of_week, faculty)
             VALUES ('{}', '{course}', '{}', '{}', {}, 'Dr. Iyer')",
            Ulid::new(),
            campus.cs_lab,
            sessions[0].get("time_slot_id").unwrap(),
            sessions[0].get("day_of_week").unwrap(),
        ))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0001"));

    hod_cs.batch_execute("DELETE FROM class_sessions").await.unwrap();
    assert!(rows(&hod_cs, "SELECT * FROM class_sessions").await.is_empty());
}

#[tokio::test]
async fn time_slot_catalog() {
    let campus = seed().await;
    let client = connect(campus.addr, "student-1").await;
    let slots = rows(&client, "SELECT * FROM time_slots").await;
    assert_eq!(slots.len(), 10);
    assert_eq!(slots[0].get("id"), Some("1"));
    assert_eq!(slots[0].get("start_time"), Some("08:00"));
}
