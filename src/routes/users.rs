use axum::extract::{Json, Query, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::directory;
use crate::error::{AppError, AppResult};
use crate::models::{Department, NewUser, User, INITIAL_DEPARTMENT};
use crate::schema::{departments, users};
use crate::state::AppState;

#[derive(Serialize)]
pub struct UserView {
    pub login: String,
    pub department: String,
    pub name: Option<String>,
    pub title: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            login: user.login,
            department: user.department,
            name: user.name,
            title: user.title,
        }
    }
}

#[derive(Deserialize)]
pub struct UserListQuery {
    pub department: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserView>>> {
    let mut conn = state.db()?;

    let mut list_query = users::table.into_boxed();
    if let Some(department) = query.department.as_deref().filter(|s| !s.is_empty()) {
        list_query = list_query.filter(users::department.eq(department.to_uppercase()));
    }
    let rows: Vec<User> = list_query.order(users::login.asc()).load(&mut conn)?;

    Ok(Json(rows.into_iter().map(UserView::from).collect()))
}

#[derive(Deserialize)]
pub struct UpsertUserRequest {
    pub login: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
}

/// Registers a login in the directory or refreshes its profile. New logins
/// without a department start in the intake department.
pub async fn upsert_user(
    State(state): State<AppState>,
    Json(payload): Json<UpsertUserRequest>,
) -> AppResult<Json<UserView>> {
    let login = payload
        .login
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("login is required"))?
        .to_string();
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("name is required"))?
        .to_string();

    let mut conn = state.db()?;

    let department = match payload.department.as_deref().filter(|s| !s.is_empty()) {
        Some(code) => {
            let code = code.to_uppercase();
            if !directory::department_exists(&mut conn, &code)? {
                return Err(AppError::validation("unknown department"));
            }
            Some(code)
        }
        None => None,
    };

    let existing: Option<User> = users::table.find(&login).first(&mut conn).optional()?;
    match existing {
        Some(user) => {
            diesel::update(users::table.find(&login))
                .set((
                    users::name.eq(Some(name)),
                    users::title.eq(payload.title.clone().or(user.title)),
                    users::department.eq(department.unwrap_or(user.department)),
                ))
                .execute(&mut conn)?;
        }
        None => {
            diesel::insert_into(users::table)
                .values(&NewUser {
                    login: login.clone(),
                    department: department.unwrap_or_else(|| INITIAL_DEPARTMENT.to_string()),
                    name: Some(name),
                    title: payload.title.clone(),
                })
                .execute(&mut conn)?;
        }
    }

    let user: User = users::table.find(&login).first(&mut conn)?;
    Ok(Json(user.into()))
}

#[derive(Serialize)]
pub struct DepartmentView {
    pub code: String,
    pub name: String,
}

pub async fn list_departments(State(state): State<AppState>) -> AppResult<Json<Vec<DepartmentView>>> {
    let mut conn = state.db()?;
    let rows: Vec<Department> = departments::table
        .order(departments::code.asc())
        .load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|d| DepartmentView {
                code: d.code,
                name: d.name,
            })
            .collect(),
    ))
}
