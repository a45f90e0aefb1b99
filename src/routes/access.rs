use axum::extract::{Json, Path, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AccessGrant, CaseParty, GrantType, NewAccessGrant, Party};
use crate::routes::cases::{load_case, to_iso};
use crate::schema::{access_grants, case_parties, parties};
use crate::state::AppState;

#[derive(Serialize)]
pub struct AccessGrantView {
    pub id: Uuid,
    pub grant_type: String,
    pub value: Option<String>,
    pub party_name: Option<String>,
    pub party_document_number: Option<String>,
    pub created_at: String,
}

pub async fn list_grants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<AccessGrantView>>> {
    let mut conn = state.db()?;
    load_case(&mut conn, id)?;

    let grants: Vec<AccessGrant> = access_grants::table
        .filter(access_grants::case_id.eq(id))
        .order(access_grants::created_at.asc())
        .load(&mut conn)?;

    // Party grants hold a case-party link id in `value`; resolve those to
    // the registered party for display.
    let link_ids: Vec<Uuid> = grants
        .iter()
        .filter(|g| GrantType::parse(&g.grant_type) == Some(GrantType::Party))
        .filter_map(|g| g.value.as_deref().and_then(|v| v.parse().ok()))
        .collect();
    let links: Vec<CaseParty> = case_parties::table
        .filter(case_parties::id.eq_any(&link_ids))
        .load(&mut conn)?;
    let party_ids: Vec<Uuid> = links.iter().filter_map(|l| l.party_id).collect();
    let party_rows: Vec<Party> = parties::table
        .filter(parties::id.eq_any(&party_ids))
        .load(&mut conn)?;
    let parties_by_id: std::collections::HashMap<Uuid, Party> =
        party_rows.into_iter().map(|p| (p.id, p)).collect();
    let links_by_id: std::collections::HashMap<Uuid, CaseParty> =
        links.into_iter().map(|l| (l.id, l)).collect();

    let views = grants
        .into_iter()
        .map(|grant| {
            let party = if GrantType::parse(&grant.grant_type) == Some(GrantType::Party) {
                grant
                    .value
                    .as_deref()
                    .and_then(|v| v.parse::<Uuid>().ok())
                    .and_then(|link_id| links_by_id.get(&link_id))
                    .and_then(|link| link.party_id)
                    .and_then(|pid| parties_by_id.get(&pid))
            } else {
                None
            };
            AccessGrantView {
                id: grant.id,
                grant_type: grant.grant_type,
                value: grant.value,
                party_name: party.map(|p| p.name.clone()),
                party_document_number: party.and_then(|p| p.document_number.clone()),
                created_at: to_iso(grant.created_at),
            }
        })
        .collect();

    Ok(Json(views))
}

#[derive(Deserialize)]
pub struct AddGrantRequest {
    pub grant_type: Option<String>,
    pub value: Option<String>,
    pub case_party_id: Option<Uuid>,
}

pub async fn add_grant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddGrantRequest>,
) -> AppResult<Json<Value>> {
    let grant_type = payload
        .grant_type
        .as_deref()
        .and_then(GrantType::parse)
        .ok_or_else(|| AppError::validation("invalid grant type"))?;

    let mut conn = state.db()?;
    load_case(&mut conn, id)?;

    let value = match grant_type {
        GrantType::Department | GrantType::User => {
            let value = payload
                .value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::validation("grant value is required"))?;
            value.to_string()
        }
        GrantType::Party => {
            let link_id = payload
                .case_party_id
                .ok_or_else(|| AppError::validation("case party id is required"))?;
            let link: Option<CaseParty> = case_parties::table
                .find(link_id)
                .first(&mut conn)
                .optional()?;
            match link {
                Some(link) if link.case_id == id => {}
                _ => {
                    return Err(AppError::validation(
                        "case party does not belong to this case",
                    ));
                }
            }
            link_id.to_string()
        }
    };

    let grant = NewAccessGrant {
        id: Uuid::new_v4(),
        case_id: id,
        grant_type: grant_type.as_str().to_string(),
        value: Some(value),
    };
    diesel::insert_into(access_grants::table)
        .values(&grant)
        .execute(&mut conn)?;

    Ok(Json(json!({ "id": grant.id })))
}

pub async fn remove_grant(
    State(state): State<AppState>,
    Path((id, grant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<axum::http::StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(
        access_grants::table
            .filter(access_grants::id.eq(grant_id))
            .filter(access_grants::case_id.eq(id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found("access grant not found"));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
