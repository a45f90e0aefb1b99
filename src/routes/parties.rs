use axum::extract::{Json, Path, Query, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewParty, Party};
use crate::routes::cases::to_iso;
use crate::schema::parties;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PartyView {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub document_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub access_key: Option<String>,
    pub access_key_active: bool,
    pub created_at: String,
}

impl From<Party> for PartyView {
    fn from(party: Party) -> Self {
        Self {
            id: party.id,
            kind: party.kind,
            name: party.name,
            document_number: party.document_number,
            email: party.email,
            phone: party.phone,
            address: party.address,
            city: party.city,
            state: party.state,
            postal_code: party.postal_code,
            access_key: party.access_key,
            access_key_active: party.access_key_active,
            created_at: to_iso(party.created_at),
        }
    }
}

fn load_party(conn: &mut diesel::PgConnection, id: Uuid) -> AppResult<Party> {
    parties::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("party not found"))
}

#[derive(Deserialize)]
pub struct PartyListQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_parties(
    State(state): State<AppState>,
    Query(query): Query<PartyListQuery>,
) -> AppResult<Json<Vec<PartyView>>> {
    let mut conn = state.db()?;

    let mut list_query = parties::table.into_boxed();
    if let Some(q) = query.q.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{q}%");
        list_query = list_query.filter(
            parties::name
                .ilike(pattern.clone())
                .or(parties::document_number.ilike(pattern)),
        );
    }

    let rows: Vec<Party> = list_query
        .order(parties::name.asc())
        .limit(query.limit.unwrap_or(50).clamp(1, 200))
        .offset(query.offset.unwrap_or(0).max(0))
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(PartyView::from).collect()))
}

pub async fn get_party(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PartyView>> {
    let mut conn = state.db()?;
    Ok(Json(load_party(&mut conn, id)?.into()))
}

#[derive(Deserialize)]
pub struct PartyRequest {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub document_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

pub async fn create_party(
    State(state): State<AppState>,
    Json(payload): Json<PartyRequest>,
) -> AppResult<Json<PartyView>> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("party name is required"))?
        .to_string();

    let new_party = NewParty {
        id: Uuid::new_v4(),
        kind: payload.kind.clone().unwrap_or_else(|| "individual".into()),
        name,
        document_number: payload.document_number.clone(),
        email: payload.email.clone(),
        phone: payload.phone.clone(),
        address: payload.address.clone(),
        city: payload.city.clone(),
        state: payload.state.clone(),
        postal_code: payload.postal_code.clone(),
        access_key: Some(Uuid::new_v4().to_string()),
    };

    let mut conn = state.db()?;
    diesel::insert_into(parties::table)
        .values(&new_party)
        .execute(&mut conn)?;

    Ok(Json(load_party(&mut conn, new_party.id)?.into()))
}

pub async fn update_party(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartyRequest>,
) -> AppResult<Json<PartyView>> {
    let mut conn = state.db()?;
    let party = load_party(&mut conn, id)?;

    diesel::update(parties::table.find(id))
        .set((
            parties::kind.eq(payload.kind.unwrap_or(party.kind)),
            parties::name.eq(payload.name.unwrap_or(party.name)),
            parties::document_number.eq(payload.document_number.or(party.document_number)),
            parties::email.eq(payload.email.or(party.email)),
            parties::phone.eq(payload.phone.or(party.phone)),
            parties::address.eq(payload.address.or(party.address)),
            parties::city.eq(payload.city.or(party.city)),
            parties::state.eq(payload.state.or(party.state)),
            parties::postal_code.eq(payload.postal_code.or(party.postal_code)),
        ))
        .execute(&mut conn)?;

    Ok(Json(load_party(&mut conn, id)?.into()))
}

pub async fn delete_party(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<axum::http::StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(parties::table.find(id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found("party not found"));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Issues a fresh credential key, replacing any previous one and
/// reactivating the credential.
pub async fn rotate_access_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    load_party(&mut conn, id)?;

    let key = Uuid::new_v4().to_string();
    diesel::update(parties::table.find(id))
        .set((
            parties::access_key.eq(Some(key.clone())),
            parties::access_key_active.eq(true),
        ))
        .execute(&mut conn)?;

    Ok(Json(json!({ "access_key": key })))
}

pub async fn revoke_access_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<axum::http::StatusCode> {
    let mut conn = state.db()?;
    let updated = diesel::update(parties::table.find(id))
        .set(parties::access_key_active.eq(false))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found("party not found"));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
