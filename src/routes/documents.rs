use axum::extract::{Json, Path, Query, State};
use base64::Engine as _;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::directory;
use crate::error::{AppError, AppResult};
use crate::models::{
    CaseDocument, Document, DocumentMode, DocumentStatus, NewCaseDocument, NewDocument,
};
use crate::routes::cases::{load_case, to_iso};
use crate::schema::{case_documents, documents};
use crate::signing;
use crate::state::AppState;

/// File types a signature can be applied over in upload mode.
const SIGNABLE_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif"];

fn file_extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

#[derive(Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub title: String,
    pub doc_type: Option<String>,
    pub mode: String,
    pub status: String,
    pub file_name: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub signed_by: Option<String>,
    pub signed_at: Option<String>,
    pub created_at: String,
}

impl From<Document> for DocumentView {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            doc_type: doc.doc_type,
            mode: doc.mode,
            status: doc.status,
            file_name: doc.file_name,
            body: doc.body,
            author: doc.author,
            signed_by: doc.signed_by,
            signed_at: doc.signed_at.map(to_iso),
            created_at: to_iso(doc.created_at),
        }
    }
}

fn load_document(conn: &mut PgConnection, id: Uuid) -> AppResult<Document> {
    documents::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("document not found"))
}

#[derive(Deserialize)]
pub struct CreateDocumentRequest {
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub mode: Option<String>,
    pub acting_user: Option<String>,
}

pub async fn create_document(
    State(state): State<AppState>,
    Json(payload): Json<CreateDocumentRequest>,
) -> AppResult<Json<DocumentView>> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("document title is required"))?
        .to_string();
    let mode = match payload.mode.as_deref() {
        None => DocumentMode::Editor,
        Some(raw) => {
            DocumentMode::parse(raw).ok_or_else(|| AppError::validation("invalid document mode"))?
        }
    };

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        title,
        doc_type: payload.doc_type.clone(),
        mode: mode.as_str().to_string(),
        status: DocumentStatus::Draft.as_str().to_string(),
        author: payload.acting_user.clone(),
    };

    let mut conn = state.db()?;
    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;

    let doc = load_document(&mut conn, new_document.id)?;
    Ok(Json(doc.into()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentView>> {
    let mut conn = state.db()?;
    Ok(Json(load_document(&mut conn, id)?.into()))
}

#[derive(Deserialize)]
pub struct CaseDocumentsQuery {
    pub viewer: Option<String>,
}

/// Lists a case's documents in file order. Signed documents are always
/// listed; drafts only show up for viewers of the author's department.
pub async fn list_case_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CaseDocumentsQuery>,
) -> AppResult<Json<Vec<DocumentView>>> {
    let mut conn = state.db()?;
    load_case(&mut conn, id)?;

    let links: Vec<CaseDocument> = case_documents::table
        .filter(case_documents::case_id.eq(id))
        .load(&mut conn)?;
    let doc_ids: Vec<Uuid> = links.into_iter().map(|link| link.document_id).collect();
    let docs: Vec<Document> = documents::table
        .filter(documents::id.eq_any(&doc_ids))
        .order(documents::created_at.asc())
        .load(&mut conn)?;

    let viewer_department = match query.viewer.as_deref().filter(|s| !s.is_empty()) {
        Some(login) => directory::department_of_user(&mut conn, login)?,
        None => None,
    };

    let author_logins: Vec<String> = docs.iter().filter_map(|d| d.author.clone()).collect();
    let author_departments = directory::departments_of_users(&mut conn, &author_logins)?;

    let visible: Vec<DocumentView> = docs
        .into_iter()
        .filter(|doc| {
            if DocumentStatus::parse(&doc.status) == Some(DocumentStatus::Signed) {
                return true;
            }
            let (Some(viewer_dept), Some(author)) = (viewer_department.as_deref(), &doc.author)
            else {
                return false;
            };
            author_departments
                .get(author)
                .map(|dept| dept.eq_ignore_ascii_case(viewer_dept))
                .unwrap_or(false)
        })
        .map(DocumentView::from)
        .collect();

    Ok(Json(visible))
}

#[derive(Deserialize)]
pub struct LinkDocumentRequest {
    pub document_id: Option<Uuid>,
}

pub async fn link_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkDocumentRequest>,
) -> AppResult<Json<Value>> {
    let document_id = payload
        .document_id
        .ok_or_else(|| AppError::validation("document id is required"))?;

    let mut conn = state.db()?;
    load_case(&mut conn, id)?;
    load_document(&mut conn, document_id)?;

    // One case per document: a link elsewhere blocks this one.
    let existing: Option<CaseDocument> = case_documents::table
        .filter(case_documents::document_id.eq(document_id))
        .first(&mut conn)
        .optional()?;
    if let Some(link) = existing {
        if link.case_id != id {
            return Err(AppError::validation(
                "document is already linked to another case",
            ));
        }
    }

    diesel::insert_into(case_documents::table)
        .values(&NewCaseDocument {
            case_id: id,
            document_id,
        })
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    Ok(Json(json!({ "case_id": id, "document_id": document_id })))
}

#[derive(Deserialize)]
pub struct UploadContentRequest {
    pub acting_user: Option<String>,
    pub file_name: Option<String>,
    pub content_base64: Option<String>,
}

/// Replaces a document's content with an uploaded file. Uploading over a
/// signed document revokes the signature and reopens it as a draft.
pub async fn upload_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UploadContentRequest>,
) -> AppResult<Json<Value>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();
    let content = payload.content_base64.as_deref().filter(|s| !s.is_empty());
    if let Some(content) = content {
        base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|_| AppError::validation("file content is not valid base64"))?;
    }
    let file_name = payload
        .file_name
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "arquivo.bin".to_string());

    let mut conn = state.db()?;
    let doc = load_document(&mut conn, id)?;

    let was_signed = DocumentStatus::parse(&doc.status) == Some(DocumentStatus::Signed);
    signing::validate_tree_position(&mut conn, id, &acting, was_signed)?;

    let previous_status = doc.status.clone();
    let previous_signer = doc.signed_by.clone();

    // The acting user takes over authorship of the new content.
    let updated = if was_signed {
        diesel::update(documents::table.find(id))
            .set((
                documents::mode.eq(DocumentMode::Upload.as_str()),
                documents::file_name.eq(Some(file_name)),
                documents::content_base64.eq(content.map(str::to_string)),
                documents::author.eq(Some(acting.clone())),
                documents::status.eq(DocumentStatus::Draft.as_str()),
                documents::signed_by.eq(None::<String>),
                documents::signed_at.eq(None::<chrono::NaiveDateTime>),
            ))
            .execute(&mut conn)?
    } else {
        diesel::update(documents::table.find(id))
            .set((
                documents::mode.eq(DocumentMode::Upload.as_str()),
                documents::file_name.eq(Some(file_name)),
                documents::content_base64.eq(content.map(str::to_string)),
                documents::author.eq(Some(acting.clone())),
            ))
            .execute(&mut conn)?
    };
    if updated == 0 {
        return Err(AppError::not_found("document not found"));
    }

    if was_signed {
        info!(document = %id, "signature revoked by new upload");
    }

    Ok(Json(json!({
        "ok": true,
        "previous_status": previous_status,
        "signed_by": previous_signer,
    })))
}

#[derive(Deserialize)]
pub struct EditorContentRequest {
    pub acting_user: Option<String>,
    pub body: Option<String>,
}

/// Saves editor text into a document. A signed document only accepts edits
/// from its own signer, and keeps its signature.
pub async fn editor_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditorContentRequest>,
) -> AppResult<Json<Value>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let doc = load_document(&mut conn, id)?;

    let is_signed = DocumentStatus::parse(&doc.status) == Some(DocumentStatus::Signed);
    if is_signed && doc.signed_by.as_deref() != Some(acting.as_str()) {
        return Err(AppError::forbidden(
            "only the signer can edit a signed document",
        ));
    }
    signing::validate_tree_position(&mut conn, id, &acting, is_signed)?;

    let updated = diesel::update(documents::table.find(id))
        .set((
            documents::mode.eq(DocumentMode::Editor.as_str()),
            documents::body.eq(payload.body.clone()),
            documents::author.eq(Some(acting.clone())),
        ))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found("document not found"));
    }

    Ok(Json(json!({ "ok": true, "status": doc.status })))
}

#[derive(Deserialize)]
pub struct SignDocumentRequest {
    pub acting_user: Option<String>,
}

pub async fn sign_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignDocumentRequest>,
) -> AppResult<Json<DocumentView>> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let doc = load_document(&mut conn, id)?;

    let mode = DocumentMode::parse(&doc.mode)
        .ok_or_else(|| AppError::validation("document has an invalid mode"))?;
    if mode == DocumentMode::Upload {
        if doc.file_name.is_none() || doc.content_base64.is_none() {
            return Err(AppError::validation(
                "an uploaded document needs a file before signing",
            ));
        }
        let extension = doc.file_name.as_deref().and_then(file_extension);
        let signable = extension
            .as_deref()
            .map(|ext| SIGNABLE_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !signable {
            return Err(AppError::validation(
                "this file type cannot receive a signature",
            ));
        }
    }
    if DocumentStatus::parse(&doc.status) != Some(DocumentStatus::Draft) {
        return Err(AppError::validation("only drafts can be signed"));
    }

    signing::validate_tree_position(&mut conn, id, &acting, true)?;

    diesel::update(documents::table.find(id))
        .set((
            documents::status.eq(DocumentStatus::Signed.as_str()),
            documents::signed_by.eq(Some(acting.clone())),
            documents::signed_at.eq(Some(Utc::now().naive_utc())),
        ))
        .execute(&mut conn)?;

    info!(document = %id, signer = %acting, "document signed");

    let doc = load_document(&mut conn, id)?;
    Ok(Json(doc.into()))
}

#[derive(Deserialize)]
pub struct DeleteDraftRequest {
    pub acting_user: Option<String>,
}

pub async fn delete_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeleteDraftRequest>,
) -> AppResult<axum::http::StatusCode> {
    let acting = payload
        .acting_user
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("acting user is required"))?
        .to_string();

    let mut conn = state.db()?;
    let doc = load_document(&mut conn, id)?;

    if DocumentStatus::parse(&doc.status) == Some(DocumentStatus::Signed) {
        return Err(AppError::validation("a signed document cannot be deleted"));
    }
    if DocumentStatus::parse(&doc.status) != Some(DocumentStatus::Draft) {
        return Err(AppError::validation("only drafts can be deleted"));
    }
    if doc.author.as_deref() != Some(acting.as_str()) {
        return Err(AppError::forbidden(
            "only the author can delete this draft",
        ));
    }

    // Drafts come out regardless of their position in the file; only the
    // case link is required.
    let linked: Option<CaseDocument> = case_documents::table
        .filter(case_documents::document_id.eq(id))
        .first(&mut conn)
        .optional()?;
    if linked.is_none() {
        return Err(AppError::validation("document is not linked to a case"));
    }

    conn.transaction::<(), AppError, _>(|conn| {
        diesel::delete(case_documents::table.filter(case_documents::document_id.eq(id)))
            .execute(conn)?;
        let deleted = diesel::delete(documents::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(AppError::not_found("document not found"));
        }
        Ok(())
    })?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::{file_extension, SIGNABLE_EXTENSIONS};

    #[test]
    fn extension_is_lowercased_tail() {
        assert_eq!(file_extension("parecer.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("scan.final.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(file_extension("anexo"), None);
        assert_eq!(file_extension("anexo."), None);
    }

    #[test]
    fn text_attachments_are_not_signable() {
        assert!(!SIGNABLE_EXTENSIONS.contains(&"txt"));
        assert!(SIGNABLE_EXTENSIONS.contains(&"pdf"));
    }
}
