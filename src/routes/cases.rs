use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::directory;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::models::{
    AccessLevel, Case, CaseParty, CaseStatus, GrantType, NewCase, NewCaseDocument, NewCaseParty,
    NewParty, NewRoutingEvent, Party, Priority, RoutingEvent, INITIAL_DEPARTMENT,
};
use crate::schema::{access_grants, case_parties, cases, parties, routing_events};
use crate::state::AppState;

pub const INITIAL_MOVEMENT_REASON: &str = "Andamento inicial";

pub(super) fn to_iso(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

/// Human-readable sequence number, `YYYYMMDD-HHMMSS-NNN`. The format is an
/// external contract; the trailing suffix is random to keep numbers unique
/// within a second.
fn generate_case_number() -> String {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{stamp}-{suffix:03}")
}

#[derive(Serialize)]
pub struct CaseView {
    pub id: Uuid,
    pub number: String,
    pub subject: String,
    pub access_level: String,
    pub legal_basis: Option<String>,
    pub notes: String,
    pub status: String,
    pub priority: String,
    pub department: String,
    pub assigned_user: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub pending: bool,
    pub pending_origin_department: Option<String>,
    pub pending_dest_department: Option<String>,
    pub created_at: String,
    pub last_movement: String,
    pub interessado: Option<String>,
}

#[derive(Serialize)]
pub struct CasePartyView {
    pub id: Uuid,
    pub party_id: Option<Uuid>,
    pub role: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub document_number: Option<String>,
}

#[derive(Serialize)]
pub struct RoutingEventView {
    pub id: Uuid,
    pub origin_department: String,
    pub dest_department: String,
    pub reason: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub acting_user: Option<String>,
    pub created_at: String,
}

impl From<RoutingEvent> for RoutingEventView {
    fn from(event: RoutingEvent) -> Self {
        Self {
            id: event.id,
            origin_department: event.origin_department,
            dest_department: event.dest_department,
            reason: event.reason,
            priority: event.priority,
            due_date: event.due_date,
            acting_user: event.acting_user,
            created_at: to_iso(event.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct CaseDetailResponse {
    pub case: CaseView,
    pub parties: Vec<CasePartyView>,
}

/// State-machine operations all answer with the updated case plus the
/// event-specific facts of the transition that just ran.
#[derive(Serialize)]
pub struct CaseActionResponse {
    pub case: CaseView,
    pub details: Value,
}

fn last_movement(conn: &mut PgConnection, case: &Case) -> AppResult<NaiveDateTime> {
    use diesel::dsl::max;
    let latest: Option<NaiveDateTime> = routing_events::table
        .filter(routing_events::case_id.eq(case.id))
        .select(max(routing_events::created_at))
        .first(conn)?;
    Ok(latest.unwrap_or(case.created_at))
}

fn first_party_name(conn: &mut PgConnection, case_id: Uuid) -> AppResult<Option<String>> {
    let link: Option<CaseParty> = case_parties::table
        .filter(case_parties::case_id.eq(case_id))
        .order(case_parties::seq.asc())
        .first(conn)
        .optional()?;
    let Some(party_id) = link.and_then(|l| l.party_id) else {
        return Ok(None);
    };
    let party: Option<Party> = parties::table.find(party_id).first(conn).optional()?;
    Ok(party.map(|p| p.name))
}

pub(super) fn case_to_view(conn: &mut PgConnection, case: Case) -> AppResult<CaseView> {
    let last_movement = last_movement(conn, &case)?;
    let interessado = first_party_name(conn, case.id)?;
    Ok(CaseView {
        id: case.id,
        number: case.number,
        subject: case.subject,
        access_level: case.access_level,
        legal_basis: case.legal_basis,
        notes: case.notes,
        status: case.status,
        priority: case.priority,
        department: case.department,
        assigned_user: case.assigned_user,
        due_date: case.due_date,
        pending: case.pending,
        pending_origin_department: case.pending_origin_department,
        pending_dest_department: case.pending_dest_department,
        created_at: to_iso(case.created_at),
        last_movement: to_iso(last_movement),
        interessado,
    })
}

pub(super) fn load_case(conn: &mut PgConnection, id: Uuid) -> AppResult<Case> {
    cases::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("case not found"))
}

fn load_case_party_views(conn: &mut PgConnection, case_id: Uuid) -> AppResult<Vec<CasePartyView>> {
    let links: Vec<CaseParty> = case_parties::table
        .filter(case_parties::case_id.eq(case_id))
        .order(case_parties::seq.asc())
        .load(conn)?;
    let party_ids: Vec<Uuid> = links.iter().filter_map(|l| l.party_id).collect();
    let rows: Vec<Party> = parties::table
        .filter(parties::id.eq_any(&party_ids))
        .load(conn)?;
    let by_id: std::collections::HashMap<Uuid, Party> =
        rows.into_iter().map(|p| (p.id, p)).collect();

    Ok(links
        .into_iter()
        .map(|link| {
            let registered = link.party_id.and_then(|pid| by_id.get(&pid));
            CasePartyView {
                id: link.id,
                party_id: link.party_id,
                role: link.role,
                kind: registered.map(|p| p.kind.clone()),
                name: registered.map(|p| p.name.clone()),
                document_number: registered.and_then(|p| p.document_number.clone()),
            }
        })
        .collect())
}

#[derive(Deserialize)]
pub struct CasePartyInput {
    pub party_id: Option<Uuid>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub document_number: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCaseRequest {
    pub subject: Option<String>,
    pub access_level: Option<String>,
    pub legal_basis: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub parties: Vec<CasePartyInput>,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    pub acting_user: Option<String>,
}

pub async fn create_case(
    State(state): State<AppState>,
    Json(payload): Json<CreateCaseRequest>,
) -> AppResult<Json<CaseView>> {
    let subject = payload
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        // Uncoded in the original contract, so it surfaces as a 500.
        .ok_or_else(|| AppError::new(ErrorKind::Internal, "subject is required"))?
        .to_string();

    let access_level = match payload.access_level.as_deref() {
        None => AccessLevel::Public,
        Some(raw) => AccessLevel::parse(raw)
            .ok_or_else(|| AppError::validation("invalid access level"))?,
    };
    let legal_basis = payload
        .legal_basis
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if !access_level.is_public() && legal_basis.is_none() {
        return Err(AppError::validation(
            "legal basis is required for restricted or confidential cases",
        ));
    }

    let case_id = Uuid::new_v4();
    let number = generate_case_number();
    let acting = payload.acting_user.clone();

    let mut conn = state.db()?;
    conn.transaction::<(), AppError, _>(|conn| {
        let new_case = NewCase {
            id: case_id,
            number: number.clone(),
            subject: subject.clone(),
            access_level: access_level.as_str().to_string(),
            legal_basis: legal_basis.clone(),
            notes: payload.notes.clone().unwrap_or_default(),
            status: CaseStatus::InProgress.as_str().to_string(),
            priority: Priority::Normal.as_str().to_string(),
            department: INITIAL_DEPARTMENT.to_string(),
            assigned_user: acting.clone(),
        };
        diesel::insert_into(cases::table)
            .values(&new_case)
            .execute(conn)?;

        for input in &payload.parties {
            let registered_id = match input.party_id {
                Some(party_id) => {
                    let exists: Option<Uuid> = parties::table
                        .find(party_id)
                        .select(parties::id)
                        .first(conn)
                        .optional()?;
                    exists.ok_or_else(|| AppError::not_found("registered party not found"))?
                }
                None => {
                    let new_party = NewParty {
                        id: Uuid::new_v4(),
                        kind: input.kind.clone().unwrap_or_else(|| "individual".into()),
                        name: input.name.clone().unwrap_or_default(),
                        document_number: input.document_number.clone(),
                        email: None,
                        phone: None,
                        address: None,
                        city: None,
                        state: None,
                        postal_code: None,
                        access_key: None,
                    };
                    diesel::insert_into(parties::table)
                        .values(&new_party)
                        .execute(conn)?;
                    new_party.id
                }
            };
            diesel::insert_into(case_parties::table)
                .values(&NewCaseParty {
                    id: Uuid::new_v4(),
                    case_id,
                    role: input.role.clone(),
                    party_id: Some(registered_id),
                })
                .execute(conn)?;
        }

        for document_id in &payload.document_ids {
            diesel::insert_into(crate::schema::case_documents::table)
                .values(&NewCaseDocument {
                    case_id,
                    document_id: *document_id,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
        }

        diesel::insert_into(routing_events::table)
            .values(&NewRoutingEvent {
                id: Uuid::new_v4(),
                case_id,
                origin_department: INITIAL_DEPARTMENT.to_string(),
                dest_department: INITIAL_DEPARTMENT.to_string(),
                reason: Some(INITIAL_MOVEMENT_REASON.to_string()),
                priority: None,
                due_date: None,
                acting_user: acting.clone(),
            })
            .execute(conn)?;

        Ok(())
    })?;

    info!(case = %number, "case created");

    let case = load_case(&mut conn, case_id)?;
    Ok(Json(case_to_view(&mut conn, case)?))
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CaseDetailResponse>> {
    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;
    let parties = load_case_party_views(&mut conn, id)?;
    Ok(Json(CaseDetailResponse {
        case: case_to_view(&mut conn, case)?,
        parties,
    }))
}

#[derive(Deserialize)]
pub struct UpdateCaseRequest {
    pub subject: Option<String>,
    pub access_level: Option<String>,
    pub notes: Option<String>,
    pub legal_basis: Option<String>,
}

pub async fn update_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCaseRequest>,
) -> AppResult<Json<CaseView>> {
    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    let new_level = match payload.access_level.as_deref() {
        None => None,
        Some(raw) => Some(
            AccessLevel::parse(raw).ok_or_else(|| AppError::validation("invalid access level"))?,
        ),
    };
    if let Some(level) = new_level {
        if !level.is_public() {
            let basis = payload
                .legal_basis
                .as_deref()
                .or(case.legal_basis.as_deref())
                .unwrap_or("");
            if basis.is_empty() {
                return Err(AppError::validation(
                    "legal basis is required for a non-public access level",
                ));
            }
        }
    }

    // Returning to public clears the recorded legal basis.
    let next_legal_basis = match new_level {
        Some(level) if level.is_public() => None,
        _ => payload.legal_basis.clone().or(case.legal_basis.clone()),
    };

    diesel::update(cases::table.find(id))
        .set((
            cases::subject.eq(payload.subject.unwrap_or(case.subject)),
            cases::access_level.eq(new_level
                .map(|l| l.as_str().to_string())
                .unwrap_or(case.access_level)),
            cases::notes.eq(payload.notes.unwrap_or(case.notes)),
            cases::legal_basis.eq(next_legal_basis),
        ))
        .execute(&mut conn)?;

    let case = load_case(&mut conn, id)?;
    Ok(Json(case_to_view(&mut conn, case)?))
}

#[derive(Deserialize)]
pub struct CaseListQuery {
    pub number: Option<String>,
    pub subject: Option<String>,
    pub interested: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub access_level: Option<String>,
    pub department: Option<String>,
    pub pending: Option<bool>,
    pub pending_department: Option<String>,
    #[serde(default)]
    pub only_mine: bool,
    pub user: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
pub struct CaseListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub items: Vec<CaseView>,
}

pub async fn list_cases(
    State(state): State<AppState>,
    Query(query): Query<CaseListQuery>,
) -> AppResult<Json<CaseListResponse>> {
    let mut conn = state.db()?;

    let mut id_query = cases::table.select(cases::id).into_boxed();

    if let Some(number) = query.number.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::number.ilike(format!("%{number}%")));
    }
    if let Some(subject) = query.subject.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::subject.ilike(format!("%{subject}%")));
    }
    if let Some(interested) = query.interested.as_deref().filter(|s| !s.is_empty()) {
        let party_ids: Vec<Uuid> = parties::table
            .filter(parties::name.ilike(format!("%{interested}%")))
            .select(parties::id)
            .load(&mut conn)?;
        let case_ids: Vec<Uuid> = case_parties::table
            .filter(case_parties::party_id.eq_any(party_ids.into_iter().map(Some)))
            .select(case_parties::case_id)
            .load(&mut conn)?;
        id_query = id_query.filter(cases::id.eq_any(case_ids));
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::status.eq(status.to_string()));
    }
    if let Some(priority) = query.priority.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::priority.eq(priority.to_string()));
    }
    if let Some(level) = query.access_level.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::access_level.eq(level.to_string()));
    }
    if let Some(department) = query.department.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::department.eq(department.to_string()));
    }
    if query.pending == Some(true) {
        id_query = id_query.filter(cases::pending.eq(true));
    }
    if let Some(dest) = query.pending_department.as_deref().filter(|s| !s.is_empty()) {
        id_query = id_query.filter(cases::pending_dest_department.eq(dest.to_string()));
    }
    if query.only_mine {
        if let Some(user) = query.user.as_deref().filter(|s| !s.is_empty()) {
            id_query = id_query.filter(cases::assigned_user.eq(user.to_string()));
        }
    }

    let all_ids: Vec<Uuid> = id_query.order(cases::created_at.desc()).load(&mut conn)?;
    let total = all_ids.len() as i64;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, 100);
    let offset = ((page - 1) * page_size) as usize;
    let page_ids: Vec<Uuid> = all_ids
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();

    let rows: Vec<Case> = cases::table
        .filter(cases::id.eq_any(&page_ids))
        .order(cases::created_at.desc())
        .load(&mut conn)?;

    let mut items = Vec::with_capacity(rows.len());
    for case in rows {
        items.push(case_to_view(&mut conn, case)?);
    }

    Ok(Json(CaseListResponse {
        total,
        page,
        page_size,
        items,
    }))
}

#[derive(Deserialize)]
pub struct AssignCaseRequest {
    pub target_user: Option<String>,
    pub acting_user: Option<String>,
}

pub async fn assign_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCaseRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let target = payload
        .target_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("target user is required"))?
        .to_string();
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    let previous = case.assigned_user.clone();
    if let Some(current) = previous.as_deref() {
        if current != acting {
            return Err(AppError::forbidden(
                "you can only assign cases assigned to you or unassigned",
            ));
        }
    }

    let target_department = directory::department_of_user(&mut conn, &target)?
        .ok_or_else(|| AppError::validation("target user not found"))?;
    if !target_department.eq_ignore_ascii_case(&case.department) {
        return Err(AppError::validation(
            "target user does not belong to the case's current department",
        ));
    }

    let level = AccessLevel::parse(&case.access_level).unwrap_or(AccessLevel::Public);
    if !level.is_public() {
        let grants: Vec<crate::models::AccessGrant> = access_grants::table
            .filter(access_grants::case_id.eq(id))
            .load(&mut conn)?;
        let granted = grants.iter().any(|grant| {
            let value = grant.value.as_deref().unwrap_or("");
            match GrantType::parse(&grant.grant_type) {
                Some(GrantType::User) => value.eq_ignore_ascii_case(&target),
                Some(GrantType::Department) => value.eq_ignore_ascii_case(&target_department),
                _ => false,
            }
        });
        if !granted {
            return Err(AppError::forbidden(
                "target has no access grant for this restricted case",
            ));
        }
    }

    let updated = diesel::update(cases::table.find(id))
        .set(cases::assigned_user.eq(Some(target.clone())))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found("case not found"));
    }

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({ "from": previous, "to": target }),
    }))
}

#[derive(Deserialize)]
pub struct RouteCaseRequest {
    pub dest_department: Option<String>,
    pub acting_user: Option<String>,
    pub reason: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

pub async fn route_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RouteCaseRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();
    let dest = payload
        .dest_department
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("destination department is required"))?
        .to_string();
    let priority = match payload.priority.as_deref() {
        None => None,
        Some(raw) => {
            Some(Priority::parse(raw).ok_or_else(|| AppError::validation("invalid priority"))?)
        }
    };

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    if case.assigned_user.as_deref() != Some(acting.as_str()) {
        return Err(AppError::forbidden(
            "you can only route cases assigned to you",
        ));
    }
    if !directory::department_exists(&mut conn, &dest)? {
        return Err(AppError::validation("unknown destination department"));
    }

    let origin = case.department.clone();
    let event_id = Uuid::new_v4();
    let next_priority = priority
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| case.priority.clone());
    let next_due_date = payload.due_date.or(case.due_date);

    conn.transaction::<(), AppError, _>(|conn| {
        diesel::insert_into(routing_events::table)
            .values(&NewRoutingEvent {
                id: event_id,
                case_id: id,
                origin_department: origin.clone(),
                dest_department: dest.clone(),
                reason: payload.reason.clone(),
                priority: priority.map(|p| p.as_str().to_string()),
                due_date: payload.due_date,
                acting_user: Some(acting.clone()),
            })
            .execute(conn)?;

        diesel::update(cases::table.find(id))
            .set((
                cases::status.eq(CaseStatus::Awaiting.as_str()),
                cases::pending.eq(true),
                cases::pending_origin_department.eq(Some(origin.clone())),
                cases::pending_dest_department.eq(Some(dest.clone())),
                cases::assigned_user.eq(None::<String>),
                cases::priority.eq(next_priority.clone()),
                cases::due_date.eq(next_due_date),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    info!(case = %id, %origin, %dest, "case routed");

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({
            "origin": origin,
            "dest": dest,
            "reason": payload.reason,
            "priority": priority,
            "due_date": payload.due_date,
            "event_id": event_id,
        }),
    }))
}

#[derive(Deserialize)]
pub struct ActingUserRequest {
    pub acting_user: Option<String>,
}

pub async fn accept_pendency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActingUserRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    let dest = case.pending_dest_department.clone();
    let Some(dest) = dest.filter(|_| case.pending) else {
        return Err(AppError::validation("case is not pending"));
    };

    let acting_department = directory::department_of_user(&mut conn, &acting)?
        .ok_or_else(|| AppError::validation("acting user not found"))?;
    if !acting_department.eq_ignore_ascii_case(&dest) {
        return Err(AppError::forbidden(
            "acting user does not belong to the pendency's destination department",
        ));
    }

    conn.transaction::<(), AppError, _>(|conn| {
        diesel::update(cases::table.find(id))
            .set((
                cases::pending.eq(false),
                cases::pending_dest_department.eq(None::<String>),
                cases::pending_origin_department.eq(None::<String>),
                cases::department.eq(dest.clone()),
                cases::status.eq(CaseStatus::InProgress.as_str()),
                cases::assigned_user.eq(Some(acting.clone())),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({ "dest": dest }),
    }))
}

#[derive(Deserialize)]
pub struct RefusePendencyRequest {
    pub acting_user: Option<String>,
    pub reason: Option<String>,
}

pub async fn refuse_pendency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefusePendencyRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();
    let reason = payload
        .reason
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("a reason is required to refuse"))?
        .to_string();

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    let (Some(dest), Some(origin)) = (
        case.pending_dest_department.clone().filter(|_| case.pending),
        case.pending_origin_department.clone().filter(|_| case.pending),
    ) else {
        return Err(AppError::validation("case is not pending"));
    };

    let acting_department = directory::department_of_user(&mut conn, &acting)?
        .ok_or_else(|| AppError::validation("acting user not found"))?;
    if !acting_department.eq_ignore_ascii_case(&dest) {
        return Err(AppError::forbidden(
            "acting user does not belong to the pendency's destination department",
        ));
    }

    let event_id = Uuid::new_v4();
    conn.transaction::<(), AppError, _>(|conn| {
        diesel::insert_into(routing_events::table)
            .values(&NewRoutingEvent {
                id: event_id,
                case_id: id,
                origin_department: dest.clone(),
                dest_department: origin.clone(),
                reason: Some(reason.clone()),
                priority: None,
                due_date: None,
                acting_user: Some(acting.clone()),
            })
            .execute(conn)?;

        // Bounce back: the refused pendency returns to where it came from.
        diesel::update(cases::table.find(id))
            .set((
                cases::pending.eq(true),
                cases::pending_dest_department.eq(Some(origin.clone())),
                cases::pending_origin_department.eq(Some(dest.clone())),
                cases::assigned_user.eq(None::<String>),
                cases::status.eq(CaseStatus::Awaiting.as_str()),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    info!(case = %id, from = %dest, back_to = %origin, "pendency refused");

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({
            "origin": origin,
            "dest": dest,
            "reason": reason,
            "event_id": event_id,
        }),
    }))
}

pub async fn archive_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActingUserRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    if case.pending {
        return Err(AppError::validation("a pending case cannot be archived"));
    }
    if CaseStatus::parse(&case.status) == Some(CaseStatus::Archived) {
        return Err(AppError::validation("case is already archived"));
    }
    if case.assigned_user.as_deref() != Some(acting.as_str()) {
        return Err(AppError::forbidden(
            "you can only archive cases assigned to you",
        ));
    }

    diesel::update(cases::table.find(id))
        .set((
            cases::status.eq(CaseStatus::Archived.as_str()),
            cases::assigned_user.eq(None::<String>),
        ))
        .execute(&mut conn)?;

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({ "action": "archive" }),
    }))
}

#[derive(Deserialize)]
pub struct PrioritizeCaseRequest {
    pub priority: Option<String>,
    pub acting_user: Option<String>,
}

pub async fn prioritize_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PrioritizeCaseRequest>,
) -> AppResult<Json<CaseActionResponse>> {
    let priority = payload
        .priority
        .as_deref()
        .and_then(Priority::parse)
        .ok_or_else(|| AppError::validation("invalid priority"))?;
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let case = load_case(&mut conn, id)?;

    if let Some(current) = case.assigned_user.as_deref() {
        if current != acting {
            return Err(AppError::forbidden(
                "you can only prioritize cases assigned to you or unassigned",
            ));
        }
    }

    let updated = diesel::update(cases::table.find(id))
        .set(cases::priority.eq(priority.as_str()))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found("case not found"));
    }

    let case = load_case(&mut conn, id)?;
    Ok(Json(CaseActionResponse {
        case: case_to_view(&mut conn, case)?,
        details: json!({ "priority": priority }),
    }))
}

pub async fn list_routing_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<RoutingEventView>>> {
    let mut conn = state.db()?;
    load_case(&mut conn, id)?;
    let events: Vec<RoutingEvent> = routing_events::table
        .filter(routing_events::case_id.eq(id))
        .order(routing_events::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(events.into_iter().map(RoutingEventView::from).collect()))
}

pub async fn list_case_parties(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<CasePartyView>>> {
    let mut conn = state.db()?;
    load_case(&mut conn, id)?;
    Ok(Json(load_case_party_views(&mut conn, id)?))
}

pub async fn add_case_party(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CasePartyInput>,
) -> AppResult<Json<CasePartyView>> {
    let mut conn = state.db()?;
    load_case(&mut conn, id)?;

    let registered_id = match payload.party_id {
        Some(party_id) => {
            let exists: Option<Uuid> = parties::table
                .find(party_id)
                .select(parties::id)
                .first(&mut conn)
                .optional()?;
            exists.ok_or_else(|| AppError::not_found("registered party not found"))?
        }
        None => {
            let name = payload
                .name
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::validation("party name is required"))?;
            let new_party = NewParty {
                id: Uuid::new_v4(),
                kind: payload.kind.clone().unwrap_or_else(|| "individual".into()),
                name: name.to_string(),
                document_number: payload.document_number.clone(),
                email: None,
                phone: None,
                address: None,
                city: None,
                state: None,
                postal_code: None,
                access_key: None,
            };
            diesel::insert_into(parties::table)
                .values(&new_party)
                .execute(&mut conn)?;
            new_party.id
        }
    };

    let link = NewCaseParty {
        id: Uuid::new_v4(),
        case_id: id,
        role: payload.role.clone(),
        party_id: Some(registered_id),
    };
    diesel::insert_into(case_parties::table)
        .values(&link)
        .execute(&mut conn)?;

    let registered: Party = parties::table.find(registered_id).first(&mut conn)?;
    Ok(Json(CasePartyView {
        id: link.id,
        party_id: Some(registered_id),
        role: link.role,
        kind: Some(registered.kind),
        name: Some(registered.name),
        document_number: registered.document_number,
    }))
}

pub async fn remove_case_party(
    State(state): State<AppState>,
    Path((id, link_id)): Path<(Uuid, Uuid)>,
) -> AppResult<axum::http::StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(
        case_parties::table
            .filter(case_parties::id.eq(link_id))
            .filter(case_parties::case_id.eq(id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found("case party not found"));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
