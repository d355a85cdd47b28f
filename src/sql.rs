use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{BookingDraft, HodDecision, ResourceSpec, SessionSpec};
use crate::model::*;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceFilter {
    All,
    Department(String),
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestFilter {
    All,
    TargetDepartment(String),
    RequesterDepartment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridScope {
    Resource(Ulid),
    Department(String),
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertActor {
        id: String,
        department: String,
        role: Role,
    },
    InsertResource(ResourceSpec),
    DeleteResource {
        id: Ulid,
    },
    SelectResources {
        filter: ResourceFilter,
    },
    InsertCourse(Course),
    SelectCourses {
        department: Option<String>,
    },
    /// One row is a single session; more rows are an all-or-nothing batch.
    InsertSessions(Vec<SessionSpec>),
    /// `None` deletes every session of the caller's department.
    DeleteSessions {
        id: Option<Ulid>,
    },
    SelectSessions {
        department: Option<String>,
    },
    InsertTimetable(Timetable),
    InsertTimetableEntries(Vec<TimetableEntry>),
    SetTimetableActive {
        id: Ulid,
        is_active: bool,
    },
    SelectTimetableEntries {
        department: Option<String>,
    },
    InsertBookingRequest(BookingDraft),
    RespondToRequest {
        id: Ulid,
        decision: HodDecision,
        notes: Option<String>,
    },
    VcRespond {
        id: Ulid,
        approve: bool,
        notes: Option<String>,
    },
    WithdrawRequest {
        id: Ulid,
    },
    DeleteRequest {
        id: Ulid,
    },
    SelectRequests {
        filter: RequestFilter,
    },
    SelectVcQueue,
    SelectPendingQueue,
    SelectWeeklySlots {
        scope: GridScope,
        day: Option<Day>,
    },
    SelectConflicts {
        resource_id: Ulid,
        time_slot_id: String,
        day: Day,
        faculty: Option<String>,
    },
    SelectTimeSlots,
    AutoGenerate,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let mut commands = parse_batch(sql)?;
    if commands.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }
    Ok(commands.remove(0))
}

/// Parse every `;`-separated statement of a simple-protocol query string.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(procedure) = strip_prefix_ignore_case(trimmed, "CALL ") {
        return Ok(vec![parse_call(procedure.trim())?]);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn parse_call(procedure: &str) -> Result<Command, SqlError> {
    let name = procedure.trim_end_matches("()").trim().to_lowercase();
    match name.as_str() {
        "auto_generate" => Ok(Command::AutoGenerate),
        _ => Err(SqlError::Unsupported(format!("CALL {procedure}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

const ACTOR_COLUMNS: &[&str] = &["id", "department", "role"];
const RESOURCE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "type",
    "capacity",
    "owning_department",
    "building",
    "floor",
    "location",
    "equipment",
    "facilities",
];
const COURSE_COLUMNS: &[&str] = &["id", "name", "department", "expected_size", "weekly_hours", "faculty"];
const SESSION_COLUMNS: &[&str] = &["id", "course_id", "resource_id", "time_slot_id", "day_of_week", "faculty", "type"];
const TIMETABLE_COLUMNS: &[&str] = &["id", "department", "semester", "section", "academic_year", "is_active"];
const ENTRY_COLUMNS: &[&str] = &[
    "id",
    "timetable_id",
    "subject",
    "faculty",
    "resource_id",
    "day_of_week",
    "start_time",
    "end_time",
];
const ACTIVATION_COLUMNS: &[&str] = &["timetable_id", "is_active"];
const REQUEST_COLUMNS: &[&str] = &[
    "id",
    "target_resource_id",
    "time_slot_id",
    "day_of_week",
    "course_name",
    "purpose",
    "expected_attendance",
    "designation",
];
const RESPONSE_COLUMNS: &[&str] = &["request_id", "action", "notes"];
const VC_RESPONSE_COLUMNS: &[&str] = &["request_id", "approve", "notes"];
const WITHDRAWAL_COLUMNS: &[&str] = &["request_id"];

/// One VALUES row addressed by column name.
struct Row<'a> {
    table: &'static str,
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(self.table, column))
    }

    fn string(&self, column: &'static str) -> Result<String, SqlError> {
        parse_string(self.required(column)?)
    }

    fn opt_string(&self, column: &str) -> Result<Option<String>, SqlError> {
        self.get(column).map_or(Ok(None), parse_string_or_null)
    }

    fn ulid(&self, column: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.required(column)?)
    }

    fn u32(&self, column: &'static str) -> Result<u32, SqlError> {
        parse_u32(self.required(column)?)
    }

    fn day(&self, column: &'static str) -> Result<Day, SqlError> {
        parse_day(self.required(column)?)
    }

    fn list(&self, column: &str) -> Result<Vec<String>, SqlError> {
        self.get(column).map_or(Ok(Vec::new()), parse_json_list)
    }
}

fn insert_rows<'a>(
    insert: &'a ast::Insert,
    table: &'static str,
    defaults: &[&str],
) -> Result<Vec<Row<'a>>, SqlError> {
    let columns: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if let Some(unknown) = columns.iter().find(|c| !defaults.contains(&c.as_str())) {
        return Err(SqlError::UnknownColumn(table, unknown.clone()));
    }
    let rows = extract_all_insert_rows(insert)?;
    rows.iter()
        .map(|values| {
            if values.len() != columns.len() {
                return Err(SqlError::WrongArity(table, columns.len(), values.len()));
            }
            Ok(Row {
                table,
                columns: columns.clone(),
                values,
            })
        })
        .collect()
}

/// Exactly one VALUES row.
fn single_row<'a>(insert: &'a ast::Insert, table: &'static str, defaults: &[&str]) -> Result<Row<'a>, SqlError> {
    let mut rows = insert_rows(insert, table, defaults)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    Ok(rows.remove(0))
}

/// Prefix parse errors with the row index for multi-row inserts.
fn in_row<T>(i: usize, result: Result<T, SqlError>) -> Result<T, SqlError> {
    result.map_err(|e| SqlError::Parse(format!("row {i}: {e}")))
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "actors" => {
            let row = single_row(insert, "actors", ACTOR_COLUMNS)?;
            let role = row.string("role")?;
            Ok(Command::InsertActor {
                id: row.string("id")?,
                department: row.string("department")?,
                role: Role::parse(&role).ok_or_else(|| SqlError::Parse(format!("unknown role: {role}")))?,
            })
        }
        "resources" => {
            let row = single_row(insert, "resources", RESOURCE_COLUMNS)?;
            let kind = row.string("type")?;
            Ok(Command::InsertResource(ResourceSpec {
                id: row.ulid("id")?,
                name: row.string("name")?,
                kind: ResourceType::parse(&kind).ok_or_else(|| SqlError::Parse(format!("unknown resource type: {kind}")))?,
                capacity: row.u32("capacity")?,
                owning_department: row.opt_string("owning_department")?,
                building: row.opt_string("building")?,
                floor: row.opt_string("floor")?,
                location: row.opt_string("location")?,
                equipment: row.list("equipment")?,
                facilities: row.list("facilities")?,
            }))
        }
        "courses" => {
            let row = single_row(insert, "courses", COURSE_COLUMNS)?;
            Ok(Command::InsertCourse(Course {
                id: row.ulid("id")?,
                name: row.string("name")?,
                department: row.string("department")?,
                expected_size: row.u32("expected_size")?,
                weekly_hours: row.u32("weekly_hours")?,
                faculty: row.opt_string("faculty")?.unwrap_or_default(),
            }))
        }
        "class_sessions" => {
            let rows = insert_rows(insert, "class_sessions", SESSION_COLUMNS)?;
            let mut sessions = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                sessions.push(in_row(i, session_row(row))?);
            }
            Ok(Command::InsertSessions(sessions))
        }
        "timetables" => {
            let row = single_row(insert, "timetables", TIMETABLE_COLUMNS)?;
            Ok(Command::InsertTimetable(Timetable {
                id: row.ulid("id")?,
                department: row.string("department")?,
                semester: row.string("semester")?,
                section: row.string("section")?,
                academic_year: row.string("academic_year")?,
                is_active: row.get("is_active").map_or(Ok(true), parse_bool)?,
            }))
        }
        "timetable_entries" => {
            let rows = insert_rows(insert, "timetable_entries", ENTRY_COLUMNS)?;
            let mut entries = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                entries.push(in_row(i, entry_row(row))?);
            }
            Ok(Command::InsertTimetableEntries(entries))
        }
        "timetable_activations" => {
            let row = single_row(insert, "timetable_activations", ACTIVATION_COLUMNS)?;
            Ok(Command::SetTimetableActive {
                id: row.ulid("timetable_id")?,
                is_active: parse_bool(row.required("is_active")?)?,
            })
        }
        "booking_requests" => {
            let row = single_row(insert, "booking_requests", REQUEST_COLUMNS)?;
            Ok(Command::InsertBookingRequest(BookingDraft {
                id: row.ulid("id")?,
                target_resource_id: row.ulid("target_resource_id")?,
                time_slot_id: row.string("time_slot_id")?,
                day: row.day("day_of_week")?,
                course_name: row.opt_string("course_name")?.unwrap_or_default(),
                purpose: row.opt_string("purpose")?.unwrap_or_default(),
                expected_attendance: row.get("expected_attendance").map_or(Ok(0), parse_u32)?,
                designation: row.opt_string("designation")?,
            }))
        }
        "booking_responses" => {
            let row = single_row(insert, "booking_responses", RESPONSE_COLUMNS)?;
            let action = row.string("action")?;
            Ok(Command::RespondToRequest {
                id: row.ulid("request_id")?,
                decision: HodDecision::parse(&action)
                    .ok_or_else(|| SqlError::Parse(format!("action must be approve or reject, got {action}")))?,
                notes: row.opt_string("notes")?,
            })
        }
        "vc_responses" => {
            let row = single_row(insert, "vc_responses", VC_RESPONSE_COLUMNS)?;
            Ok(Command::VcRespond {
                id: row.ulid("request_id")?,
                approve: parse_bool(row.required("approve")?)?,
                notes: row.opt_string("notes")?,
            })
        }
        "booking_withdrawals" => {
            let row = single_row(insert, "booking_withdrawals", WITHDRAWAL_COLUMNS)?;
            Ok(Command::WithdrawRequest {
                id: row.ulid("request_id")?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn session_row(row: &Row<'_>) -> Result<SessionSpec, SqlError> {
    let kind = row.opt_string("type")?.unwrap_or_else(|| "theory".into());
    Ok(SessionSpec {
        id: row.ulid("id")?,
        course_id: row.ulid("course_id")?,
        resource_id: row.ulid("resource_id")?,
        time_slot_id: row.string("time_slot_id")?,
        day: row.day("day_of_week")?,
        faculty: row.string("faculty")?,
        kind: SessionType::parse(&kind).ok_or_else(|| SqlError::Parse(format!("unknown session type: {kind}")))?,
    })
}

fn entry_row(row: &Row<'_>) -> Result<TimetableEntry, SqlError> {
    Ok(TimetableEntry {
        id: row.ulid("id")?,
        timetable_id: row.ulid("timetable_id")?,
        subject: row.string("subject")?,
        faculty: row.opt_string("faculty")?.unwrap_or_default(),
        resource_id: row.ulid("resource_id")?,
        day: row.day("day_of_week")?,
        start: parse_time(row.required("start_time")?)?,
        end: parse_time(row.required("end_time")?)?,
    })
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "resources" => Ok(Command::DeleteResource {
            id: extract_where_id(&delete.selection)?,
        }),
        "class_sessions" => {
            let id = match &delete.selection {
                None => None,
                Some(_) => Some(extract_where_id(&delete.selection)?),
            };
            Ok(Command::DeleteSessions { id })
        }
        "booking_requests" => Ok(Command::DeleteRequest {
            id: extract_where_id(&delete.selection)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |column: &str| filters.iter().find(|(c, _)| c == column).map(|(_, e)| *e);
    let department = || filter("department").map(parse_string).transpose();

    match table.as_str() {
        "resources" => {
            let scope = if let Some(dept) = department()? {
                ResourceFilter::Department(dept)
            } else if let Some(shared) = filter("shared") {
                if parse_bool(shared)? {
                    ResourceFilter::Shared
                } else {
                    return Err(SqlError::Unsupported("shared = false; filter by department instead".into()));
                }
            } else {
                ResourceFilter::All
            };
            Ok(Command::SelectResources { filter: scope })
        }
        "courses" => Ok(Command::SelectCourses {
            department: department()?,
        }),
        "class_sessions" => Ok(Command::SelectSessions {
            department: department()?,
        }),
        "timetable_entries" => Ok(Command::SelectTimetableEntries {
            department: department()?,
        }),
        "booking_requests" => {
            let scope = if let Some(dept) = filter("target_department") {
                RequestFilter::TargetDepartment(parse_string(dept)?)
            } else if let Some(dept) = filter("requester_department") {
                RequestFilter::RequesterDepartment(parse_string(dept)?)
            } else {
                RequestFilter::All
            };
            Ok(Command::SelectRequests { filter: scope })
        }
        "vc_queue" => Ok(Command::SelectVcQueue),
        "pending_queue" => Ok(Command::SelectPendingQueue),
        "weekly_slots" => {
            let scope = if let Some(id) = filter("resource_id") {
                GridScope::Resource(parse_ulid(id)?)
            } else if let Some(dept) = department()? {
                GridScope::Department(dept)
            } else {
                return Err(SqlError::MissingFilter("resource_id or department"));
            };
            Ok(Command::SelectWeeklySlots {
                scope,
                day: filter("day_of_week").map(parse_day).transpose()?,
            })
        }
        "conflicts" => Ok(Command::SelectConflicts {
            resource_id: parse_ulid(filter("resource_id").ok_or(SqlError::MissingFilter("resource_id"))?)?,
            time_slot_id: parse_string(filter("time_slot_id").ok_or(SqlError::MissingFilter("time_slot_id"))?)?,
            day: parse_day(filter("day_of_week").ok_or(SqlError::MissingFilter("day_of_week"))?)?,
            faculty: filter("faculty").map(parse_string).transpose()?,
        }),
        "time_slots" => Ok(Command::SelectTimeSlots),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND b = y AND ...` into `(column, value)` pairs.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((column, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    let mut filters = Vec::new();
    collect_eq_filters(sel, &mut filters)?;
    match filters.as_slice() {
        [(column, value)] if column == "id" => parse_ulid(value),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = parse_string(expr)?;
    s.trim().parse().map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_day(expr: &Expr) -> Result<Day, SqlError> {
    let v = parse_i64(expr)?;
    Day::try_from(v).map_err(|_| SqlError::Parse(format!("{v} is not a day of week")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(true),
            "false" | "f" | "0" | "no" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_time(expr: &Expr) -> Result<ClockTime, SqlError> {
    let s = parse_string(expr)?;
    ClockTime::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad time of day: {s}")))
}

/// JSON array of strings, e.g. `'["projector","ac"]'`. NULL is empty.
fn parse_json_list(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match parse_string_or_null(expr)? {
        None => Ok(Vec::new()),
        Some(s) if s.trim().is_empty() => Ok(Vec::new()),
        Some(s) => serde_json::from_str(&s).map_err(|e| SqlError::Parse(format!("expected JSON string array: {e}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str, &'static str),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing column {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    #[test]
    fn parse_insert_actor() {
        let cmd = parse_sql("INSERT INTO actors (id, department, role) VALUES ('hod-math', 'Mathematics', 'HOD')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertActor {
                id: "hod-math".into(),
                department: "Mathematics".into(),
                role: Role::Hod,
            }
        );
    }

    #[test]
    fn parse_insert_resource_with_lists() {
        let sql = format!(
            r#"INSERT INTO resources (id, name, type, capacity, owning_department, equipment) VALUES ('{ID}', 'Main Auditorium', 'auditorium', 500, NULL, '["projector", "sound system"]')"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertResource(spec) => {
                assert_eq!(spec.id.to_string(), ID);
                assert_eq!(spec.kind, ResourceType::Auditorium);
                assert_eq!(spec.capacity, 500);
                assert_eq!(spec.owning_department, None);
                assert_eq!(spec.equipment, vec!["projector".to_string(), "sound system".to_string()]);
                assert!(spec.facilities.is_empty());
                assert_eq!(spec.building, None);
            }
            other => panic!("expected InsertResource, got {other:?}"),
        }
    }

    #[test]
    fn resource_missing_required_column() {
        let sql = format!("INSERT INTO resources (id, name) VALUES ('{ID}', 'Room')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("resources", "type"))));
    }

    #[test]
    fn unknown_column_rejected() {
        let sql = format!("INSERT INTO actors (id, department, role, colour) VALUES ('{ID}', 'CS', 'hod', 'red')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn("actors", _))));
    }

    #[test]
    fn positional_insert_uses_default_columns() {
        let sql = format!("INSERT INTO courses VALUES ('{ID}', 'Topology', 'Mathematics', 40, 3, 'Dr. Rao')");
        match parse_sql(&sql).unwrap() {
            Command::InsertCourse(course) => {
                assert_eq!(course.name, "Topology");
                assert_eq!(course.weekly_hours, 3);
                assert_eq!(course.faculty, "Dr. Rao");
            }
            other => panic!("expected InsertCourse, got {other:?}"),
        }
    }

    #[test]
    fn parse_multi_row_sessions() {
        let sql = format!(
            "INSERT INTO class_sessions (id, course_id, resource_id, time_slot_id, day_of_week, faculty, type) VALUES \
             ('{ID}', '{OTHER}', '{OTHER}', '1', 1, 'Dr. Rao', 'theory'), \
             ('{OTHER}', '{OTHER}', '{OTHER}', 'morning_2', 2, 'Dr. Rao', 'practical')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertSessions(sessions) => {
                assert_eq!(sessions.len(), 2);
                assert_eq!(sessions[1].time_slot_id, "morning_2");
                assert_eq!(sessions[1].kind, SessionType::Practical);
                assert_eq!(sessions[1].day, 2);
            }
            other => panic!("expected InsertSessions, got {other:?}"),
        }
    }

    #[test]
    fn bad_row_reports_index() {
        let sql = format!(
            "INSERT INTO class_sessions (id, course_id, resource_id, time_slot_id, day_of_week, faculty) VALUES \
             ('{ID}', '{OTHER}', '{OTHER}', '1', 1, 'Dr. Rao'), \
             ('not-a-ulid', '{OTHER}', '{OTHER}', '1', 2, 'Dr. Rao')"
        );
        let err = parse_sql(&sql).unwrap_err();
        assert!(err.to_string().starts_with("parse error: row 1:"), "{err}");
    }

    #[test]
    fn parse_timetable_entry_times() {
        let sql = format!(
            "INSERT INTO timetable_entries (id, timetable_id, subject, faculty, resource_id, day_of_week, start_time, end_time) \
             VALUES ('{ID}', '{OTHER}', 'Graph Theory', 'Dr. Das', '{OTHER}', 4, '11:15:00', '12:15')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertTimetableEntries(entries) => {
                assert_eq!(entries[0].start, ClockTime::new(11, 15));
                assert_eq!(entries[0].end, ClockTime::new(12, 15));
            }
            other => panic!("expected InsertTimetableEntries, got {other:?}"),
        }
    }

    #[test]
    fn parse_booking_request_and_workflow_rows() {
        let sql = format!(
            "INSERT INTO booking_requests (id, target_resource_id, time_slot_id, day_of_week, course_name, expected_attendance) \
             VALUES ('{ID}', '{OTHER}', '1', 3, 'Seminar', 200)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBookingRequest(draft) => {
                assert_eq!(draft.day, 3);
                assert_eq!(draft.purpose, "");
                assert_eq!(draft.expected_attendance, 200);
                assert_eq!(draft.designation, None);
            }
            other => panic!("expected InsertBookingRequest, got {other:?}"),
        }

        let sql = format!("INSERT INTO booking_responses (request_id, action, notes) VALUES ('{ID}', 'reject', NULL)");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::RespondToRequest {
                decision: HodDecision::Reject,
                notes: None,
                ..
            }
        ));

        let sql = format!("INSERT INTO vc_responses (request_id, approve, notes) VALUES ('{ID}', true, 'enjoy')");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::VcRespond { approve: true, .. }));

        let sql = format!("INSERT INTO booking_withdrawals (request_id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::WithdrawRequest { .. }));

        let sql = format!("INSERT INTO booking_responses (request_id, action) VALUES ('{ID}', 'maybe')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_deletes() {
        let sql = format!("DELETE FROM resources WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::DeleteResource { .. }));
        assert_eq!(parse_sql("DELETE FROM class_sessions").unwrap(), Command::DeleteSessions { id: None });
        let sql = format!("DELETE FROM class_sessions WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::DeleteSessions { id: Some(_) }));
        assert!(matches!(parse_sql("DELETE FROM booking_requests"), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_resource_selects() {
        assert_eq!(
            parse_sql("SELECT * FROM resources").unwrap(),
            Command::SelectResources { filter: ResourceFilter::All }
        );
        assert_eq!(
            parse_sql("SELECT * FROM resources WHERE department = 'CS'").unwrap(),
            Command::SelectResources {
                filter: ResourceFilter::Department("CS".into())
            }
        );
        assert_eq!(
            parse_sql("SELECT * FROM resources WHERE shared = true").unwrap(),
            Command::SelectResources { filter: ResourceFilter::Shared }
        );
    }

    #[test]
    fn parse_request_selects() {
        assert_eq!(
            parse_sql("SELECT * FROM booking_requests WHERE requester_department = 'Mathematics'").unwrap(),
            Command::SelectRequests {
                filter: RequestFilter::RequesterDepartment("Mathematics".into())
            }
        );
        assert_eq!(parse_sql("SELECT * FROM vc_queue").unwrap(), Command::SelectVcQueue);
        assert_eq!(parse_sql("select * from pending_queue;").unwrap(), Command::SelectPendingQueue);
    }

    #[test]
    fn parse_weekly_slots() {
        let sql = format!("SELECT * FROM weekly_slots WHERE resource_id = '{ID}' AND day_of_week = 3");
        match parse_sql(&sql).unwrap() {
            Command::SelectWeeklySlots { scope, day } => {
                assert_eq!(scope, GridScope::Resource(Ulid::from_string(ID).unwrap()));
                assert_eq!(day, Some(3));
            }
            other => panic!("expected SelectWeeklySlots, got {other:?}"),
        }
        assert!(matches!(
            parse_sql("SELECT * FROM weekly_slots"),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_conflicts() {
        let sql = format!(
            "SELECT * FROM conflicts WHERE resource_id = '{ID}' AND time_slot_id = 'evening_1' AND day_of_week = 5 AND faculty = 'Dr. Das'"
        );
        match parse_sql(&sql).unwrap() {
            Command::SelectConflicts {
                time_slot_id,
                day,
                faculty,
                ..
            } => {
                assert_eq!(time_slot_id, "evening_1");
                assert_eq!(day, 5);
                assert_eq!(faculty.as_deref(), Some("Dr. Das"));
            }
            other => panic!("expected SelectConflicts, got {other:?}"),
        }
        let sql = format!("SELECT * FROM conflicts WHERE resource_id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("time_slot_id"))));
    }

    #[test]
    fn parse_call_auto_generate() {
        assert_eq!(parse_sql("CALL auto_generate()").unwrap(), Command::AutoGenerate);
        assert_eq!(parse_sql("call AUTO_GENERATE();").unwrap(), Command::AutoGenerate);
        assert!(parse_sql("CALL drop_everything()").is_err());
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_batch_of_statements() {
        let cmds = parse_batch(
            "INSERT INTO actors (id, department, role) VALUES ('vc', 'University', 'vc'); \
             SELECT * FROM time_slots;",
        )
        .unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1], Command::SelectTimeSlots);
        assert!(matches!(
            parse_sql("SELECT * FROM vc_queue; SELECT * FROM time_slots"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
