//! Lookups against the user/department directory. Routing and signing
//! preconditions resolve actors through these helpers; the directory itself
//! is maintained via the `/api/users` and `/api/departments` endpoints.

use diesel::prelude::*;
use diesel::PgConnection;

use crate::error::AppResult;
use crate::models::User;
use crate::schema::{departments, users};

/// Department code of a login, uppercased. `None` when the login is unknown.
pub fn department_of_user(conn: &mut PgConnection, login: &str) -> AppResult<Option<String>> {
    let user: Option<User> = users::table.find(login).first(conn).optional()?;
    Ok(user.map(|u| u.department.to_uppercase()))
}

pub fn department_exists(conn: &mut PgConnection, code: &str) -> AppResult<bool> {
    let found: Option<String> = departments::table
        .filter(departments::code.eq(code))
        .select(departments::code)
        .first(conn)
        .optional()?;
    Ok(found.is_some())
}

/// Resolves the departments of the given signer logins in one query.
/// Unknown logins are simply absent from the map.
pub fn departments_of_users(
    conn: &mut PgConnection,
    logins: &[String],
) -> AppResult<std::collections::HashMap<String, String>> {
    if logins.is_empty() {
        return Ok(Default::default());
    }
    let rows: Vec<User> = users::table
        .filter(users::login.eq_any(logins))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|u| (u.login, u.department.to_uppercase()))
        .collect())
}
