mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn restricted_cases_demand_legal_basis_and_grants() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;
    app.insert_user("carlos", "PROTOCOLO", "Carlos Dias").await?;

    let missing_basis = app
        .post_json(
            "/api/cases",
            &json!({
                "subject": "Sigiloso",
                "access_level": "restricted",
                "acting_user": "ana"
            }),
        )
        .await?;
    assert_eq!(missing_basis.status(), StatusCode::BAD_REQUEST);

    let created = app
        .post_json(
            "/api/cases",
            &json!({
                "subject": "Sigiloso",
                "access_level": "restricted",
                "legal_basis": "Art. 23",
                "acting_user": "ana"
            }),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::OK);
    let case = body_json(created.into_body()).await?;
    let case_id = case["id"].as_str().unwrap().to_string();

    // carlos shares the department but holds no grant.
    let ungated = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "carlos", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(ungated.status(), StatusCode::FORBIDDEN);

    let bad_type = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "group", "value": "x" }),
        )
        .await?;
    assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

    let no_value = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "user" }),
        )
        .await?;
    assert_eq!(no_value.status(), StatusCode::BAD_REQUEST);

    let granted = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "user", "value": "carlos" }),
        )
        .await?;
    assert_eq!(granted.status(), StatusCode::OK);
    let granted = body_json(granted.into_body()).await?;
    let grant_id = granted["id"].as_str().unwrap().to_string();

    let assigned = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "carlos", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(assigned.status(), StatusCode::OK);

    let listed = body_json(
        app.get(&format!("/api/cases/{case_id}/access"))
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["grant_type"], "user");
    assert_eq!(listed[0]["value"], "carlos");

    // Removal is not idempotent: the second delete reports 404.
    let removed = app
        .delete(&format!("/api/cases/{case_id}/access/{grant_id}"))
        .await?;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    let removed_again = app
        .delete(&format!("/api/cases/{case_id}/access/{grant_id}"))
        .await?;
    assert_eq!(removed_again.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn party_grants_resolve_to_case_parties() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;

    let case = body_json(
        app.post_json(
            "/api/cases",
            &json!({
                "subject": "Com partes",
                "access_level": "confidential",
                "legal_basis": "Art. 31",
                "acting_user": "ana",
                "parties": [{ "name": "Maria", "document_number": "111", "role": "Interessado" }]
            }),
        )
        .await?
        .into_body(),
    )
    .await?;
    let case_id = case["id"].as_str().unwrap().to_string();

    let links = body_json(
        app.get(&format!("/api/cases/{case_id}/parties"))
            .await?
            .into_body(),
    )
    .await?;
    let link_id = links[0]["id"].as_str().unwrap().to_string();

    let without_link = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "party" }),
        )
        .await?;
    assert_eq!(without_link.status(), StatusCode::BAD_REQUEST);

    let granted = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "party", "case_party_id": link_id }),
        )
        .await?;
    assert_eq!(granted.status(), StatusCode::OK);

    // A link from another case is rejected.
    let other_case = body_json(
        app.post_json(
            "/api/cases",
            &json!({
                "subject": "Outro",
                "acting_user": "ana",
                "parties": [{ "name": "Jose" }]
            }),
        )
        .await?
        .into_body(),
    )
    .await?;
    let other_id = other_case["id"].as_str().unwrap().to_string();
    let other_links = body_json(
        app.get(&format!("/api/cases/{other_id}/parties"))
            .await?
            .into_body(),
    )
    .await?;
    let foreign_link = other_links[0]["id"].as_str().unwrap();
    let crossed = app
        .post_json(
            &format!("/api/cases/{case_id}/access"),
            &json!({ "grant_type": "party", "case_party_id": foreign_link }),
        )
        .await?;
    assert_eq!(crossed.status(), StatusCode::BAD_REQUEST);

    // Listing denormalizes the registered party behind the link.
    let listed = body_json(
        app.get(&format!("/api/cases/{case_id}/access"))
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["grant_type"], "party");
    assert_eq!(listed[0]["party_name"], "Maria");
    assert_eq!(listed[0]["party_document_number"], "111");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn case_creation_without_subject_is_uncoded() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;

    let response = app
        .post_json("/api/cases", &json!({ "acting_user": "ana" }))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    app.cleanup().await?;
    Ok(())
}
