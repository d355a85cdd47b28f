use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::messages::data::DataRow;
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::PortalAuthSource;
use crate::engine::{ConflictReason, Engine};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, GridScope, RequestFilter, ResourceFilter};
use crate::tenant::TenantManager;

pub struct CampusHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<CampusQueryParser>,
}

/// Who is connected, and to which institution.
struct Session {
    engine: Arc<Engine>,
    user: Option<String>,
}

impl Session {
    /// The registered actor behind the login user.
    fn actor(&self) -> PgWireResult<Actor> {
        let user = self.user.as_deref().unwrap_or_default();
        self.engine.actor(user).map_err(engine_err)
    }
}

impl CampusHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(CampusQueryParser),
        }
    }

    fn resolve_session<C: ClientInfo>(&self, client: &C) -> PgWireResult<Session> {
        let metadata = client.metadata();
        let db = metadata.get("database").cloned().unwrap_or_else(|| "default".to_string());
        let engine = self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })?;
        Ok(Session {
            engine,
            user: metadata.get("user").cloned(),
        })
    }

    /// Execute one command and record its RED metrics.
    async fn run(&self, session: &Session, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(session, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::debug!(command = label, user = ?session.user, "query failed: {e}");
        }
        result
    }

    async fn execute_command(&self, session: &Session, cmd: Command) -> PgWireResult<Response> {
        let engine = &session.engine;
        match cmd {
            Command::InsertActor { id, department, role } => {
                let caller = session.actor().ok();
                engine
                    .register_actor(caller.as_ref(), Actor::new(&id, &department, role))
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::InsertResource(spec) => {
                engine.create_resource(&session.actor()?, spec).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::DeleteResource { id } => {
                engine.archive_resource(&session.actor()?, id).await.map_err(engine_err)?;
                Ok(deleted(1))
            }
            Command::SelectResources { filter } => {
                let resources = match filter {
                    ResourceFilter::All => engine.get_all_resources(),
                    ResourceFilter::Department(dept) => engine.get_resources_by_department(&dept),
                    ResourceFilter::Shared => engine.get_shared_resources(),
                };
                rows(resources_schema(), resources.iter().map(encode_resource))
            }
            Command::InsertCourse(course) => {
                engine.save_course(&session.actor()?, course).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::SelectCourses { department } => {
                let courses: Vec<Course> = engine
                    .get_courses()
                    .into_iter()
                    .filter(|c| department.as_deref().is_none_or(|d| c.department.eq_ignore_ascii_case(d)))
                    .collect();
                rows(courses_schema(), courses.iter().map(encode_course))
            }
            Command::InsertSessions(mut specs) => {
                let actor = session.actor()?;
                let count = specs.len();
                if count == 1 {
                    let spec = specs.remove(0);
                    engine.create_session(&actor, spec).await.map_err(engine_err)?;
                } else {
                    engine.create_bulk_sessions(&actor, specs).await.map_err(engine_err)?;
                }
                Ok(inserted(count))
            }
            Command::DeleteSessions { id } => {
                let actor = session.actor()?;
                let count = match id {
                    Some(id) => {
                        engine.delete_session(&actor, id).await.map_err(engine_err)?;
                        1
                    }
                    None => engine.delete_all_sessions(&actor).await.map_err(engine_err)?,
                };
                Ok(deleted(count))
            }
            Command::SelectSessions { department } => {
                let sessions = match department {
                    Some(dept) => engine.get_sessions_by_department(&dept),
                    None => engine.get_all_sessions(),
                };
                rows(sessions_schema(), sessions.iter().map(encode_session))
            }
            Command::InsertTimetable(timetable) => {
                engine
                    .publish_timetable(&session.actor()?, timetable, Vec::new())
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::InsertTimetableEntries(entries) => {
                let actor = session.actor()?;
                let count = entries.len();
                for entry in entries {
                    engine.add_timetable_entry(&actor, entry).await.map_err(engine_err)?;
                }
                Ok(inserted(count))
            }
            Command::SetTimetableActive { id, is_active } => {
                engine
                    .set_timetable_active(&session.actor()?, id, is_active)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::SelectTimetableEntries { department } => {
                let entries: Vec<(TimetableEntry, bool)> = match department {
                    Some(dept) => engine
                        .get_timetables_by_department(&dept)
                        .into_iter()
                        .flat_map(|t| {
                            let active = t.timetable.is_active;
                            t.entries.into_iter().map(move |e| (e, active))
                        })
                        .collect(),
                    None => engine.get_all_timetable_entries().into_iter().map(|e| (e, true)).collect(),
                };
                rows(entries_schema(), entries.iter().map(|(e, active)| encode_entry(e, *active)))
            }
            Command::InsertBookingRequest(draft) => {
                engine.create_request(&session.actor()?, draft).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::RespondToRequest { id, decision, notes } => {
                engine
                    .hod_respond(&session.actor()?, id, decision, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::VcRespond { id, approve, notes } => {
                engine
                    .vc_respond(&session.actor()?, id, approve, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::WithdrawRequest { id } => {
                engine.withdraw_request(&session.actor()?, id).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::DeleteRequest { id } => {
                engine.delete_request(&session.actor()?, id).await.map_err(engine_err)?;
                Ok(deleted(1))
            }
            Command::SelectRequests { filter } => {
                let requests = match filter {
                    RequestFilter::All => engine.get_all_requests(),
                    RequestFilter::TargetDepartment(dept) => engine.get_requests_by_target_department(&dept),
                    RequestFilter::RequesterDepartment(dept) => engine.get_requests_by_requester_department(&dept),
                };
                rows(requests_schema(), requests.iter().map(encode_request))
            }
            Command::SelectVcQueue => {
                let requests = engine.get_vc_approval_needed_requests();
                rows(requests_schema(), requests.iter().map(encode_request))
            }
            Command::SelectPendingQueue => {
                let requests = engine.pending_queue(&session.actor()?);
                rows(requests_schema(), requests.iter().map(encode_request))
            }
            Command::SelectWeeklySlots { scope, day } => {
                let viewer = session.actor()?;
                let mut grid = match scope {
                    GridScope::Resource(id) => {
                        engine.get_resource(&id).map_err(engine_err)?;
                        engine.weekly_slots(&[id], &viewer.department)
                    }
                    GridScope::Department(dept) => engine.department_weekly_slots(&dept),
                };
                if let Some(day) = day {
                    grid.retain(|cell| cell.day == day);
                }
                rows(weekly_slots_schema(), grid.iter().map(encode_cell))
            }
            Command::SelectConflicts {
                resource_id,
                time_slot_id,
                day,
                faculty,
            } => {
                let reasons = engine.check_conflicts(resource_id, &time_slot_id, day, faculty.as_deref());
                rows(conflicts_schema(), reasons.iter().map(encode_conflict))
            }
            Command::SelectTimeSlots => {
                let slots = engine.time_slots();
                rows(time_slots_schema(), slots.iter().map(encode_time_slot))
            }
            Command::AutoGenerate => {
                let created = engine.auto_generate(&session.actor()?).await.map_err(engine_err)?;
                rows(sessions_schema(), created.iter().map(encode_session))
            }
        }
    }
}

fn inserted(n: usize) -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(n))
}

fn deleted(n: usize) -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(n))
}

type Encode<'a> = Box<dyn FnOnce(&mut DataRowEncoder) -> PgWireResult<()> + 'a>;

/// Encode every item through `encode` into a query response with `schema`.
fn rows<'a, I>(schema: Vec<FieldInfo>, items: I) -> PgWireResult<Response>
where
    I: Iterator<Item = Encode<'a>>,
{
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = items
        .map(|encode| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(data))))
}

// ── Schemas ──────────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn resources_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("type", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("owning_department", Type::VARCHAR),
        field("building", Type::VARCHAR),
        field("floor", Type::VARCHAR),
        field("location", Type::VARCHAR),
        field("equipment", Type::VARCHAR),
        field("facilities", Type::VARCHAR),
        field("is_active", Type::BOOL),
    ]
}

fn courses_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("department", Type::VARCHAR),
        field("expected_size", Type::INT8),
        field("weekly_hours", Type::INT8),
        field("faculty", Type::VARCHAR),
    ]
}

fn sessions_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("course_id", Type::VARCHAR),
        field("resource_id", Type::VARCHAR),
        field("time_slot_id", Type::VARCHAR),
        field("day_of_week", Type::INT4),
        field("faculty", Type::VARCHAR),
        field("type", Type::VARCHAR),
        field("department", Type::VARCHAR),
    ]
}

fn entries_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("timetable_id", Type::VARCHAR),
        field("subject", Type::VARCHAR),
        field("faculty", Type::VARCHAR),
        field("resource_id", Type::VARCHAR),
        field("day_of_week", Type::INT4),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("is_active", Type::BOOL),
    ]
}

fn requests_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("requester_id", Type::VARCHAR),
        field("requester_department", Type::VARCHAR),
        field("designation", Type::VARCHAR),
        field("target_resource_id", Type::VARCHAR),
        field("target_department", Type::VARCHAR),
        field("time_slot_id", Type::VARCHAR),
        field("day_of_week", Type::INT4),
        field("course_name", Type::VARCHAR),
        field("purpose", Type::VARCHAR),
        field("expected_attendance", Type::INT8),
        field("status", Type::VARCHAR),
        field("approved_by", Type::VARCHAR),
        field("request_date", Type::INT8),
        field("response_date", Type::INT8),
        field("notes", Type::VARCHAR),
        field("vc_approved", Type::BOOL),
    ]
}

fn weekly_slots_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::VARCHAR),
        field("time_slot_id", Type::VARCHAR),
        field("day_of_week", Type::INT4),
        field("occupied", Type::BOOL),
        field("kind", Type::VARCHAR),
        field("source_id", Type::VARCHAR),
        field("course_name", Type::VARCHAR),
        field("department", Type::VARCHAR),
        field("faculty", Type::VARCHAR),
        field("class_size", Type::INT8),
    ]
}

fn conflicts_schema() -> Vec<FieldInfo> {
    vec![field("kind", Type::VARCHAR), field("reason", Type::VARCHAR)]
}

fn time_slots_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
        field("label", Type::VARCHAR),
    ]
}

/// Result columns for a statement, for Describe. Empty for non-queries.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| c.is_whitespace() || c == ';').filter(|w| !w.is_empty()).collect();
    match words.first() {
        Some(&"call") => return sessions_schema(),
        Some(&"select") => {}
        _ => return Vec::new(),
    }
    let table = words
        .iter()
        .position(|w| *w == "from")
        .and_then(|i| words.get(i + 1))
        .copied()
        .unwrap_or_default();
    match table {
        "resources" => resources_schema(),
        "courses" => courses_schema(),
        "class_sessions" => sessions_schema(),
        "timetable_entries" => entries_schema(),
        "booking_requests" | "vc_queue" | "pending_queue" => requests_schema(),
        "weekly_slots" => weekly_slots_schema(),
        "conflicts" => conflicts_schema(),
        "time_slots" => time_slots_schema(),
        _ => Vec::new(),
    }
}

// ── Row encoders ─────────────────────────────────────────────────

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".into())
}

fn encode_resource(r: &Resource) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&r.id.to_string())?;
        enc.encode_field(&r.name)?;
        enc.encode_field(&r.kind.as_str().to_string())?;
        enc.encode_field(&i64::from(r.capacity))?;
        enc.encode_field(&r.owning_department)?;
        enc.encode_field(&r.building)?;
        enc.encode_field(&r.floor)?;
        enc.encode_field(&r.location)?;
        enc.encode_field(&json_list(&r.equipment))?;
        enc.encode_field(&json_list(&r.facilities))?;
        enc.encode_field(&r.is_active)
    })
}

fn encode_course(c: &Course) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&c.id.to_string())?;
        enc.encode_field(&c.name)?;
        enc.encode_field(&c.department)?;
        enc.encode_field(&i64::from(c.expected_size))?;
        enc.encode_field(&i64::from(c.weekly_hours))?;
        enc.encode_field(&c.faculty)
    })
}

fn encode_session(s: &ClassSession) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&s.id.to_string())?;
        enc.encode_field(&s.course_id.to_string())?;
        enc.encode_field(&s.resource_id.to_string())?;
        enc.encode_field(&s.time_slot_id)?;
        enc.encode_field(&i32::from(s.day))?;
        enc.encode_field(&s.faculty)?;
        enc.encode_field(&s.kind.as_str().to_string())?;
        enc.encode_field(&s.department)
    })
}

fn encode_entry(e: &TimetableEntry, is_active: bool) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&e.id.to_string())?;
        enc.encode_field(&e.timetable_id.to_string())?;
        enc.encode_field(&e.subject)?;
        enc.encode_field(&e.faculty)?;
        enc.encode_field(&e.resource_id.to_string())?;
        enc.encode_field(&i32::from(e.day))?;
        enc.encode_field(&e.start.to_string())?;
        enc.encode_field(&e.end.to_string())?;
        enc.encode_field(&is_active)
    })
}

fn encode_request(r: &BookingRequest) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&r.id.to_string())?;
        enc.encode_field(&r.requester_id)?;
        enc.encode_field(&r.requester_department)?;
        enc.encode_field(&r.requester_designation)?;
        enc.encode_field(&r.target_resource_id.to_string())?;
        enc.encode_field(&r.target_department)?;
        enc.encode_field(&r.time_slot_id)?;
        enc.encode_field(&i32::from(r.day))?;
        enc.encode_field(&r.course_name)?;
        enc.encode_field(&r.purpose)?;
        enc.encode_field(&i64::from(r.expected_attendance))?;
        enc.encode_field(&r.state_label().to_string())?;
        enc.encode_field(&r.approved_by)?;
        enc.encode_field(&r.request_date)?;
        enc.encode_field(&r.response_date)?;
        enc.encode_field(&r.notes)?;
        enc.encode_field(&r.vc_approved)
    })
}

fn encode_cell(cell: &WeeklyTimeSlot) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        let occupant = cell.occupied_by.as_ref();
        enc.encode_field(&cell.resource_id.to_string())?;
        enc.encode_field(&cell.time_slot_id)?;
        enc.encode_field(&i32::from(cell.day))?;
        enc.encode_field(&occupant.is_some())?;
        enc.encode_field(&occupant.map(|o| o.kind.as_str().to_string()))?;
        enc.encode_field(&occupant.map(|o| o.source_id.to_string()))?;
        enc.encode_field(&occupant.map(|o| o.course_name.clone()))?;
        enc.encode_field(&occupant.map(|o| o.department.clone()))?;
        enc.encode_field(&occupant.map(|o| o.faculty.clone()))?;
        enc.encode_field(&occupant.and_then(|o| o.class_size).map(i64::from))
    })
}

fn encode_conflict(reason: &ConflictReason) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&reason.kind().to_string())?;
        enc.encode_field(&reason.to_string())
    })
}

fn encode_time_slot(slot: &TimeSlot) -> Encode<'_> {
    Box::new(move |enc: &mut DataRowEncoder| {
        enc.encode_field(&slot.id)?;
        enc.encode_field(&slot.start.to_string())?;
        enc.encode_field(&slot.end.to_string())?;
        enc.encode_field(&slot.label)
    })
}

#[async_trait]
impl SimpleQueryHandler for CampusHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.resolve_session(client)?;
        let commands = sql::parse_batch(query).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.push(self.run(&session, cmd).await?);
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CampusQueryParser;

#[async_trait]
impl QueryParser for CampusQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CampusHandler {
    type Statement = String;
    type QueryParser = CampusQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(&self, client: &mut C, portal: &Portal<Self::Statement>, _max_rows: usize) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.resolve_session(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(&session, cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, schema_for(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute bound parameter values (text format) for `$N` placeholders.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    bind_params(&portal.statement.statement, &params)
}

/// One pass over `sql`: each `$N` outside a quoted literal or identifier
/// becomes the quoted value of parameter N, or `NULL`. Placeholders with no
/// bound value, and all other text, are copied through unchanged.
fn bind_params(sql: &str, params: &[Option<String>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '$' => {
                let mut end = i + 1;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = j + 1;
                    chars.next();
                }
                let bound = sql[i + 1..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| params.get(n));
                match bound {
                    Some(Some(value)) => {
                        out.push('\'');
                        out.push_str(&value.replace('\'', "''"));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push_str(&sql[i..end]),
                }
            }
            None => out.push(c),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CampusFactory {
    handler: Arc<CampusHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<PortalAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CampusFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = PortalAuthSource::new(password);
        Self {
            handler: Arc::new(CampusHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CampusFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(CampusFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), "P0001".into(), e.to_string())))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), "42601".into(), e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM time_slots"), 0);
        assert_eq!(
            count_params("INSERT INTO vc_responses (request_id, approve, notes) VALUES ($1, $3, $2)"),
            3
        );
        assert_eq!(count_params("SELECT '$' FROM conflicts WHERE resource_id = $12"), 12);
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let params = vec![Some("Fees $1 each".to_string()), Some("O'Brien $2".to_string()), None];
        assert_eq!(
            bind_params("VALUES ($1, $2, $3)", &params),
            "VALUES ('Fees $1 each', 'O''Brien $2', NULL)"
        );
    }

    #[test]
    fn placeholders_inside_quotes_stay() {
        let params = vec![Some("x".to_string())];
        assert_eq!(
            bind_params("SELECT '$1', \"$1\" FROM t WHERE a = $1 AND b = 'it''s $1'", &params),
            "SELECT '$1', \"$1\" FROM t WHERE a = 'x' AND b = 'it''s $1'"
        );
        // $10 is its own placeholder, and unbound ones are left alone.
        assert_eq!(bind_params("$10 $1 $ $2", &params), "$10 'x' $ $2");
    }

    #[test]
    fn describe_schemas_by_table() {
        let names = |sql: &str| schema_for(sql).iter().map(|f| f.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names("SELECT * FROM time_slots"), vec!["id", "start_time", "end_time", "label"]);
        assert_eq!(names("select * from vc_queue"), names("SELECT * FROM booking_requests WHERE target_department = $1"));
        assert_eq!(names("SELECT * FROM conflicts WHERE resource_id = $1"), vec!["kind", "reason"]);
        assert!(names("CALL auto_generate()").contains(&"course_id".to_string()));
        assert!(schema_for("INSERT INTO actors (id, department, role) VALUES ($1, $2, $3)").is_empty());
        assert!(schema_for("DELETE FROM class_sessions").is_empty());
    }
}
