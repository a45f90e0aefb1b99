//! Document position & signing engine.
//!
//! A case carries an ordered sequence of documents (creation time ascending).
//! Once a department signs a document, every document positioned before that
//! signature is frozen for actors of *other* departments; only the tail of
//! the sequence past the last cross-department signature stays mutable. A
//! department's own signatures never block its actors.

use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::directory;
use crate::error::{AppError, AppResult};
use crate::models::{Case, CaseDocument, Document, DocumentStatus};
use crate::schema::{case_documents, cases, documents};

/// Position-relevant facts about one document in the case sequence.
#[derive(Debug, Clone)]
pub struct DocumentSlot {
    pub id: Uuid,
    pub signed: bool,
    pub signer_department: Option<String>,
}

/// First index from which documents may still be mutated by an actor of
/// `viewer_department`: one past the last document signed by a different
/// department. A signature whose signer cannot be resolved to a department
/// counts as cross-department.
pub fn end_of_tree_start(slots: &[DocumentSlot], viewer_department: &str) -> usize {
    let mut boundary = None;
    for (index, slot) in slots.iter().enumerate() {
        if !slot.signed {
            continue;
        }
        let same_department = slot
            .signer_department
            .as_deref()
            .map(|dept| dept.eq_ignore_ascii_case(viewer_department))
            .unwrap_or(false);
        if !same_department {
            boundary = Some(index);
        }
    }
    boundary.map(|index| index + 1).unwrap_or(0)
}

/// Loads the owning case's document sequence as position slots, creation
/// time ascending.
pub fn load_slots(conn: &mut PgConnection, case_id: Uuid) -> AppResult<Vec<DocumentSlot>> {
    let links: Vec<CaseDocument> = case_documents::table
        .filter(case_documents::case_id.eq(case_id))
        .load(conn)?;
    let doc_ids: Vec<Uuid> = links.into_iter().map(|link| link.document_id).collect();

    let docs: Vec<Document> = documents::table
        .filter(documents::id.eq_any(&doc_ids))
        .order(documents::created_at.asc())
        .load(conn)?;

    let signer_logins: Vec<String> = docs
        .iter()
        .filter_map(|doc| doc.signed_by.clone())
        .collect();
    let signer_departments = directory::departments_of_users(conn, &signer_logins)?;

    Ok(docs
        .into_iter()
        .map(|doc| {
            let signed = DocumentStatus::parse(&doc.status) == Some(DocumentStatus::Signed);
            let signer_department = doc
                .signed_by
                .as_ref()
                .and_then(|login| signer_departments.get(login).cloned());
            DocumentSlot {
                id: doc.id,
                signed,
                signer_department,
            }
        })
        .collect())
}

/// Validates that `document_id` sits at the end of its case's document tree
/// for `acting_user`, optionally requiring the case to be assigned to the
/// actor. Returns the owning case id on success.
pub fn validate_tree_position(
    conn: &mut PgConnection,
    document_id: Uuid,
    acting_user: &str,
    require_assignment: bool,
) -> AppResult<Uuid> {
    let link: Option<CaseDocument> = case_documents::table
        .filter(case_documents::document_id.eq(document_id))
        .first(conn)
        .optional()?;
    let Some(link) = link else {
        return Err(AppError::validation("document is not linked to a case"));
    };

    let case: Option<Case> = cases::table.find(link.case_id).first(conn).optional()?;
    let Some(case) = case else {
        return Err(AppError::validation("document is not linked to a case"));
    };

    if require_assignment {
        match case.assigned_user.as_deref() {
            None | Some("") => {
                return Err(AppError::validation("case is not assigned to any user"));
            }
            Some(assigned) if assigned != acting_user => {
                return Err(AppError::forbidden(
                    "you can only edit documents of a case assigned to you",
                ));
            }
            Some(_) => {}
        }
    }

    let viewer_department =
        directory::department_of_user(conn, acting_user)?.unwrap_or_default();
    let slots = load_slots(conn, case.id)?;

    let index = slots.iter().position(|slot| slot.id == document_id);
    let end_start = end_of_tree_start(&slots, &viewer_department);
    match index {
        Some(index) if index >= end_start => Ok(case.id),
        _ => Err(AppError::forbidden(
            "document can only be edited or signed at the end of the case file",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(signed: bool, signer_department: Option<&str>) -> DocumentSlot {
        DocumentSlot {
            id: Uuid::new_v4(),
            signed,
            signer_department: signer_department.map(str::to_string),
        }
    }

    #[test]
    fn no_signatures_leaves_whole_sequence_open() {
        let slots = vec![slot(false, None), slot(false, None)];
        assert_eq!(end_of_tree_start(&slots, "TI"), 0);
    }

    #[test]
    fn cross_department_signature_freezes_prefix() {
        // [Draft@TI, Signed-by-ADM, Draft@TI] seen from TI: boundary at 1,
        // so only index 2 is still mutable.
        let slots = vec![
            slot(false, None),
            slot(true, Some("ADM")),
            slot(false, None),
        ];
        assert_eq!(end_of_tree_start(&slots, "TI"), 2);
    }

    #[test]
    fn own_department_signatures_do_not_block() {
        let slots = vec![slot(true, Some("TI")), slot(false, None)];
        assert_eq!(end_of_tree_start(&slots, "TI"), 0);
        // The other department is blocked past the TI signature.
        assert_eq!(end_of_tree_start(&slots, "ADM"), 1);
    }

    #[test]
    fn later_cross_signature_moves_the_boundary() {
        let slots = vec![
            slot(true, Some("ADM")),
            slot(false, None),
            slot(true, Some("ADM")),
            slot(false, None),
        ];
        assert_eq!(end_of_tree_start(&slots, "TI"), 3);
    }

    #[test]
    fn unresolvable_signer_counts_as_cross_department() {
        let slots = vec![slot(true, None), slot(false, None)];
        assert_eq!(end_of_tree_start(&slots, "TI"), 1);
    }

    #[test]
    fn department_comparison_ignores_case() {
        let slots = vec![slot(true, Some("ti")), slot(false, None)];
        assert_eq!(end_of_tree_start(&slots, "TI"), 0);
    }
}
