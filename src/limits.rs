pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_ACTORS_PER_TENANT: usize = 100_000;
pub const MAX_RESOURCES_PER_TENANT: usize = 10_000;
pub const MAX_COURSES_PER_TENANT: usize = 50_000;
pub const MAX_SESSIONS_PER_TENANT: usize = 200_000;
pub const MAX_TIMETABLE_ENTRIES_PER_TENANT: usize = 500_000;
pub const MAX_BOOKINGS_PER_TENANT: usize = 500_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 2_048;
pub const MAX_LIST_ITEMS: usize = 64;

/// Rows accepted by one multi-row INSERT into class_sessions.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Larger length prefixes are treated as corruption during replay.
pub const MAX_WAL_ENTRY_BYTES: usize = 16 * 1024 * 1024;
