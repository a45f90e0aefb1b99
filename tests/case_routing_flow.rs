mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn case_lifecycle_route_accept_refuse() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;
    app.insert_user("bia", "JURIDICO", "Bia Lima").await?;

    let created = app
        .post_json(
            "/api/cases",
            &json!({
                "subject": "Pedido de informacao",
                "acting_user": "ana",
                "parties": [
                    { "name": "Maria", "role": "Interessado" },
                    { "name": "Jose", "role": "Testemunha" }
                ]
            }),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::OK);
    let case = body_json(created.into_body()).await?;
    let case_id = case["id"].as_str().unwrap().to_string();

    // Sequence number is YYYYMMDD-HHMMSS-NNN.
    let number = case["number"].as_str().unwrap();
    let segments: Vec<&str> = number.split('-').collect();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].len(), 8);
    assert_eq!(segments[1].len(), 6);
    assert_eq!(segments[2].len(), 3);

    assert_eq!(case["department"], "PROTOCOLO");
    assert_eq!(case["status"], "in_progress");
    assert_eq!(case["assigned_user"], "ana");
    // First linked party in insertion order.
    assert_eq!(case["interessado"], "Maria");

    let events = app.get(&format!("/api/cases/{case_id}/events")).await?;
    assert_eq!(events.status(), StatusCode::OK);
    let events = body_json(events.into_body()).await?;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["origin_department"], "PROTOCOLO");
    assert_eq!(events[0]["dest_department"], "PROTOCOLO");
    assert_eq!(events[0]["reason"], "Andamento inicial");

    let routed = app
        .post_json(
            &format!("/api/cases/{case_id}/route"),
            &json!({
                "dest_department": "JURIDICO",
                "acting_user": "ana",
                "reason": "Analise juridica",
                "priority": "high"
            }),
        )
        .await?;
    assert_eq!(routed.status(), StatusCode::OK);
    let routed = body_json(routed.into_body()).await?;
    assert_eq!(routed["case"]["pending"], true);
    assert_eq!(routed["case"]["status"], "awaiting");
    assert_eq!(routed["case"]["assigned_user"], serde_json::Value::Null);
    assert_eq!(routed["case"]["pending_origin_department"], "PROTOCOLO");
    assert_eq!(routed["case"]["pending_dest_department"], "JURIDICO");
    assert_eq!(routed["case"]["priority"], "high");

    // Unassigned now, so a second route attempt is rejected and writes no
    // event.
    let rerouted = app
        .post_json(
            &format!("/api/cases/{case_id}/route"),
            &json!({ "dest_department": "TI", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(rerouted.status(), StatusCode::FORBIDDEN);
    let events = body_json(
        app.get(&format!("/api/cases/{case_id}/events"))
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(events.as_array().unwrap().len(), 2);

    // The pendency belongs to JURIDICO; a PROTOCOLO user cannot accept it.
    let wrong_accept = app
        .post_json(
            &format!("/api/cases/{case_id}/pendency/accept"),
            &json!({ "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(wrong_accept.status(), StatusCode::FORBIDDEN);

    let accepted = app
        .post_json(
            &format!("/api/cases/{case_id}/pendency/accept"),
            &json!({ "acting_user": "bia" }),
        )
        .await?;
    assert_eq!(accepted.status(), StatusCode::OK);
    let accepted = body_json(accepted.into_body()).await?;
    assert_eq!(accepted["case"]["department"], "JURIDICO");
    assert_eq!(accepted["case"]["status"], "in_progress");
    assert_eq!(accepted["case"]["assigned_user"], "bia");
    assert_eq!(accepted["case"]["pending"], false);

    // Route back and refuse: the pendency bounces to where it came from.
    let back = app
        .post_json(
            &format!("/api/cases/{case_id}/route"),
            &json!({
                "dest_department": "PROTOCOLO",
                "acting_user": "bia",
                "reason": "Devolucao"
            }),
        )
        .await?;
    assert_eq!(back.status(), StatusCode::OK);

    let refuse_without_reason = app
        .post_json(
            &format!("/api/cases/{case_id}/pendency/refuse"),
            &json!({ "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(refuse_without_reason.status(), StatusCode::BAD_REQUEST);

    let refused = app
        .post_json(
            &format!("/api/cases/{case_id}/pendency/refuse"),
            &json!({ "acting_user": "ana", "reason": "Falta documento" }),
        )
        .await?;
    assert_eq!(refused.status(), StatusCode::OK);
    let refused = body_json(refused.into_body()).await?;
    assert_eq!(refused["case"]["pending"], true);
    assert_eq!(refused["case"]["status"], "awaiting");
    assert_eq!(refused["case"]["pending_origin_department"], "PROTOCOLO");
    assert_eq!(refused["case"]["pending_dest_department"], "JURIDICO");

    // A pending case cannot be archived.
    let archive = app
        .post_json(
            &format!("/api/cases/{case_id}/archive"),
            &json!({ "acting_user": "bia" }),
        )
        .await?;
    assert_eq!(archive.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assignment_requires_same_department() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;
    app.insert_user("bia", "JURIDICO", "Bia Lima").await?;
    app.insert_user("carlos", "PROTOCOLO", "Carlos Dias").await?;

    let case = body_json(
        app.post_json(
            "/api/cases",
            &json!({ "subject": "Atribuicao", "acting_user": "ana" }),
        )
        .await?
        .into_body(),
    )
    .await?;
    let case_id = case["id"].as_str().unwrap().to_string();

    // bia sits in another department.
    let cross = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "bia", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(cross.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "nobody", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let ok = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "carlos", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    let ok = body_json(ok.into_body()).await?;
    assert_eq!(ok["case"]["assigned_user"], "carlos");
    assert_eq!(ok["details"]["from"], "ana");
    assert_eq!(ok["details"]["to"], "carlos");

    // ana no longer holds the case.
    let steal = app
        .post_json(
            &format!("/api/cases/{case_id}/assign"),
            &json!({ "target_user": "ana", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(steal.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn archive_and_prioritize_rules() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;
    app.insert_user("bia", "JURIDICO", "Bia Lima").await?;

    let case = body_json(
        app.post_json(
            "/api/cases",
            &json!({ "subject": "Arquivamento", "acting_user": "ana" }),
        )
        .await?
        .into_body(),
    )
    .await?;
    let case_id = case["id"].as_str().unwrap().to_string();

    let bad_priority = app
        .post_json(
            &format!("/api/cases/{case_id}/priority"),
            &json!({ "priority": "critical", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(bad_priority.status(), StatusCode::BAD_REQUEST);

    let prioritized = app
        .post_json(
            &format!("/api/cases/{case_id}/priority"),
            &json!({ "priority": "urgent", "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(prioritized.status(), StatusCode::OK);
    let prioritized = body_json(prioritized.into_body()).await?;
    assert_eq!(prioritized["case"]["priority"], "urgent");

    let wrong_user = app
        .post_json(
            &format!("/api/cases/{case_id}/archive"),
            &json!({ "acting_user": "bia" }),
        )
        .await?;
    assert_eq!(wrong_user.status(), StatusCode::FORBIDDEN);

    let archived = app
        .post_json(
            &format!("/api/cases/{case_id}/archive"),
            &json!({ "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(archived.status(), StatusCode::OK);
    let archived = body_json(archived.into_body()).await?;
    assert_eq!(archived["case"]["status"], "archived");
    assert_eq!(archived["case"]["assigned_user"], serde_json::Value::Null);

    let again = app
        .post_json(
            &format!("/api/cases/{case_id}/archive"),
            &json!({ "acting_user": "ana" }),
        )
        .await?;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_filters_and_pagination() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    app.insert_user("ana", "PROTOCOLO", "Ana Souza").await?;

    for i in 0..3 {
        let created = app
            .post_json(
                "/api/cases",
                &json!({
                    "subject": format!("Requerimento {i}"),
                    "acting_user": "ana",
                    "parties": [{ "name": "Maria" }]
                }),
            )
            .await?;
        assert_eq!(created.status(), StatusCode::OK);
    }

    let page = body_json(
        app.get("/api/cases?page=1&page_size=2")
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let by_subject = body_json(
        app.get("/api/cases?subject=Requerimento%200")
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(by_subject["total"], 1);

    let by_party = body_json(app.get("/api/cases?interested=mar").await?.into_body()).await?;
    assert_eq!(by_party["total"], 3);

    let mine = body_json(
        app.get("/api/cases?only_mine=true&user=ana")
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(mine["total"], 3);

    app.cleanup().await?;
    Ok(())
}
