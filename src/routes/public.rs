use axum::extract::{Json, Path, Query, State};
use base64::Engine as _;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AccessLevel, Case, CaseDocument, CaseParty, Document, DocumentMode, DocumentStatus, Party,
    RoutingEvent, User,
};
use crate::routes::cases::{to_iso, RoutingEventView};
use crate::schema::{case_documents, case_parties, cases, documents, routing_events, users};
use crate::state::AppState;

/// File types served through the public download endpoint.
const DOWNLOADABLE_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp", "svg"];

#[derive(Deserialize)]
pub struct CredentialQuery {
    pub document_number: Option<String>,
    pub key: Option<String>,
}

/// Restricted and confidential cases only open for a linked party that
/// presents its registered document number plus an active credential key.
fn enforce_credential_gate(
    conn: &mut PgConnection,
    case: &Case,
    query: &CredentialQuery,
) -> AppResult<()> {
    let level = AccessLevel::parse(&case.access_level).unwrap_or(AccessLevel::Confidential);
    if level.is_public() {
        return Ok(());
    }

    let (Some(document_number), Some(key)) = (
        query.document_number.as_deref().filter(|s| !s.is_empty()),
        query.key.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::forbidden(
            "credentials are required to consult this case",
        ));
    };

    let links: Vec<CaseParty> = case_parties::table
        .filter(case_parties::case_id.eq(case.id))
        .load(conn)?;
    let party_ids: Vec<Uuid> = links.into_iter().filter_map(|l| l.party_id).collect();
    let rows: Vec<Party> = crate::schema::parties::table
        .filter(crate::schema::parties::id.eq_any(&party_ids))
        .load(conn)?;

    let authorized = rows.iter().any(|party| {
        party.access_key_active
            && party.document_number.as_deref() == Some(document_number)
            && party.access_key.as_deref() == Some(key)
    });
    if !authorized {
        return Err(AppError::forbidden("invalid consultation credentials"));
    }
    Ok(())
}

fn resolve_case(conn: &mut PgConnection, value: &str) -> AppResult<Case> {
    let found: Option<Case> = match Uuid::parse_str(value) {
        Ok(id) => cases::table.find(id).first(conn).optional()?,
        Err(_) => cases::table
            .filter(cases::number.eq(value))
            .first(conn)
            .optional()?,
    };
    found.ok_or_else(|| AppError::not_found("case not found"))
}

#[derive(Serialize)]
pub struct PublicCaseCover {
    pub id: Uuid,
    pub number: String,
    pub subject: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct PublicDocumentView {
    pub id: Uuid,
    pub title: String,
    pub doc_type: Option<String>,
    pub signed_at: Option<String>,
    pub signed_by_name: Option<String>,
    pub signed_by_department: Option<String>,
}

#[derive(Serialize)]
pub struct PublicPartyView {
    pub role: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct PublicCaseResponse {
    pub cover: PublicCaseCover,
    pub events: Vec<RoutingEventView>,
    pub documents: Vec<PublicDocumentView>,
    pub parties: Vec<PublicPartyView>,
}

pub async fn lookup_case(
    State(state): State<AppState>,
    Path(value): Path<String>,
    Query(query): Query<CredentialQuery>,
) -> AppResult<Json<PublicCaseResponse>> {
    let mut conn = state.db()?;
    let case = resolve_case(&mut conn, &value)?;
    enforce_credential_gate(&mut conn, &case, &query)?;

    let events: Vec<RoutingEvent> = routing_events::table
        .filter(routing_events::case_id.eq(case.id))
        .order(routing_events::created_at.desc())
        .load(&mut conn)?;

    let links: Vec<CaseDocument> = case_documents::table
        .filter(case_documents::case_id.eq(case.id))
        .load(&mut conn)?;
    let doc_ids: Vec<Uuid> = links.into_iter().map(|l| l.document_id).collect();
    let docs: Vec<Document> = documents::table
        .filter(documents::id.eq_any(&doc_ids))
        .filter(documents::status.eq(DocumentStatus::Signed.as_str()))
        .order(documents::created_at.asc())
        .load(&mut conn)?;

    let signer_logins: Vec<String> = docs.iter().filter_map(|d| d.signed_by.clone()).collect();
    let signers: Vec<User> = users::table
        .filter(users::login.eq_any(&signer_logins))
        .load(&mut conn)?;
    let signers_by_login: std::collections::HashMap<String, User> =
        signers.into_iter().map(|u| (u.login.clone(), u)).collect();

    let documents = docs
        .into_iter()
        .map(|doc| {
            let signer = doc
                .signed_by
                .as_ref()
                .and_then(|login| signers_by_login.get(login));
            PublicDocumentView {
                id: doc.id,
                title: doc.title,
                doc_type: doc.doc_type,
                signed_at: doc.signed_at.map(to_iso),
                signed_by_name: signer.and_then(|u| u.name.clone()),
                signed_by_department: signer.map(|u| u.department.to_uppercase()),
            }
        })
        .collect();

    let party_links: Vec<CaseParty> = case_parties::table
        .filter(case_parties::case_id.eq(case.id))
        .order(case_parties::seq.asc())
        .load(&mut conn)?;
    let party_ids: Vec<Uuid> = party_links.iter().filter_map(|l| l.party_id).collect();
    let party_rows: Vec<Party> = crate::schema::parties::table
        .filter(crate::schema::parties::id.eq_any(&party_ids))
        .load(&mut conn)?;
    let parties_by_id: std::collections::HashMap<Uuid, String> =
        party_rows.into_iter().map(|p| (p.id, p.name)).collect();
    let parties = party_links
        .into_iter()
        .map(|link| PublicPartyView {
            role: link.role,
            name: link
                .party_id
                .and_then(|pid| parties_by_id.get(&pid).cloned()),
        })
        .collect();

    Ok(Json(PublicCaseResponse {
        cover: PublicCaseCover {
            id: case.id,
            number: case.number,
            subject: case.subject,
            status: case.status,
        },
        events: events.into_iter().map(RoutingEventView::from).collect(),
        documents,
        parties,
    }))
}

#[derive(Serialize)]
pub struct PublicContentResponse {
    pub file_name: String,
    pub content_base64: String,
}

/// Serves the stored content of a signed document through the credential
/// gate of its owning case.
pub async fn document_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CredentialQuery>,
) -> AppResult<Json<PublicContentResponse>> {
    let mut conn = state.db()?;

    let doc: Document = documents::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("document not found"))?;

    let link: Option<CaseDocument> = case_documents::table
        .filter(case_documents::document_id.eq(id))
        .first(&mut conn)
        .optional()?;
    let link = link.ok_or_else(|| AppError::not_found("document is not linked to a case"))?;
    let case: Case = cases::table
        .find(link.case_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("case not found"))?;

    enforce_credential_gate(&mut conn, &case, &query)?;

    if DocumentStatus::parse(&doc.status) != Some(DocumentStatus::Signed) {
        return Err(AppError::forbidden(
            "only signed documents are publicly available",
        ));
    }

    match DocumentMode::parse(&doc.mode) {
        Some(DocumentMode::Editor) => {
            let body = doc
                .body
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::conflict("document has no stored content"))?;
            Ok(Json(PublicContentResponse {
                file_name: format!("{}.txt", doc.title),
                content_base64: base64::engine::general_purpose::STANDARD.encode(body),
            }))
        }
        Some(DocumentMode::Upload) => {
            let content = doc
                .content_base64
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::conflict("document has no stored content"))?;
            let file_name = doc
                .file_name
                .clone()
                .ok_or_else(|| AppError::conflict("document has no stored content"))?;
            let extension = file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase());
            let allowed = extension
                .as_deref()
                .map(|ext| DOWNLOADABLE_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !allowed {
                return Err(AppError::unsupported(
                    "this file type is not publicly downloadable",
                ));
            }
            Ok(Json(PublicContentResponse {
                file_name,
                content_base64: content,
            }))
        }
        None => Err(AppError::conflict("document has an invalid mode")),
    }
}
