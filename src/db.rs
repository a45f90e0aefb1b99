use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Sized for the short per-request queries of the case engines; raise via
/// `DATABASE_MAX_POOL_SIZE` when serving a busy protocol desk.
pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(CONNECT_TIMEOUT)
        .build(manager)?;
    Ok(pool)
}
