use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "campus_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "campus_query_duration_seconds";

/// Counter: conflict reasons reported by the checker. Labels: reason.
pub const CONFLICTS_TOTAL: &str = "campus_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "campus_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "campus_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "campus_connections_rejected_total";

/// Gauge: number of open tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "campus_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "campus_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "campus_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertActor { .. } => "insert_actor",
        Command::InsertResource(_) => "insert_resource",
        Command::DeleteResource { .. } => "delete_resource",
        Command::SelectResources { .. } => "select_resources",
        Command::InsertCourse(_) => "insert_course",
        Command::SelectCourses { .. } => "select_courses",
        Command::InsertSessions(rows) if rows.len() > 1 => "insert_bulk_sessions",
        Command::InsertSessions(_) => "insert_session",
        Command::DeleteSessions { id: Some(_) } => "delete_session",
        Command::DeleteSessions { id: None } => "delete_all_sessions",
        Command::SelectSessions { .. } => "select_sessions",
        Command::InsertTimetable(_) => "insert_timetable",
        Command::InsertTimetableEntries(_) => "insert_timetable_entries",
        Command::SetTimetableActive { .. } => "set_timetable_active",
        Command::SelectTimetableEntries { .. } => "select_timetable_entries",
        Command::InsertBookingRequest(_) => "insert_booking_request",
        Command::RespondToRequest { .. } => "hod_respond",
        Command::VcRespond { .. } => "vc_respond",
        Command::WithdrawRequest { .. } => "withdraw_request",
        Command::DeleteRequest { .. } => "delete_request",
        Command::SelectRequests { .. } => "select_requests",
        Command::SelectVcQueue => "select_vc_queue",
        Command::SelectPendingQueue => "select_pending_queue",
        Command::SelectWeeklySlots { .. } => "select_weekly_slots",
        Command::SelectConflicts { .. } => "select_conflicts",
        Command::SelectTimeSlots => "select_time_slots",
        Command::AutoGenerate => "auto_generate",
    }
}
