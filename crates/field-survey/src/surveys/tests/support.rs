use super::common::*;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use crate::surveys::repository::SettingsStore;
use crate::surveys::support::{Faq, OfficeHours, SupportDesk, SupportPatch};

#[test]
fn current_creates_the_record_once() {
    let store = Arc::new(MemorySettings::default());
    let desk = SupportDesk::new(store.clone());

    let first = desk.current().expect("created");
    assert!(first.support_email.is_none());
    assert!(first.faqs.is_empty());
    assert_eq!(store.load().expect("load"), Some(first.clone()));

    let second = desk.current().expect("loaded");
    assert_eq!(second.created_at, first.created_at);
}

#[test]
fn update_applies_only_supplied_fields() {
    let desk = SupportDesk::new(Arc::new(MemorySettings::default()));
    desk.update(
        SupportPatch {
            support_email: Some("help@example.org".to_string()),
            support_phone: Some("1800-000-000".to_string()),
            ..SupportPatch::default()
        },
        "admin-1",
    )
    .expect("first update");

    let updated = desk
        .update(
            SupportPatch {
                office_hours: Some(OfficeHours {
                    monday_to_friday: Some("9am - 6pm".to_string()),
                    ..OfficeHours::default()
                }),
                faqs: Some(vec![Faq {
                    question: "How do I punch in?".to_string(),
                    answer: "Open the app and tap Punch In.".to_string(),
                }]),
                ..SupportPatch::default()
            },
            "admin-2",
        )
        .expect("second update");

    assert_eq!(updated.support_email.as_deref(), Some("help@example.org"));
    assert_eq!(updated.support_phone.as_deref(), Some("1800-000-000"));
    assert_eq!(
        updated.office_hours.monday_to_friday.as_deref(),
        Some("9am - 6pm")
    );
    assert_eq!(updated.faqs.len(), 1);
    assert_eq!(updated.updated_by.as_deref(), Some("admin-2"));
}

#[tokio::test]
async fn help_routes_are_public_to_read_and_admin_to_write() {
    let harness = harness();
    let router = harness.router();

    let read = router
        .clone()
        .oneshot(get_request("/help", None))
        .await
        .expect("route responds");
    assert_eq!(read.status(), StatusCode::OK);
    let body = read_json_body(read).await;
    assert_eq!(body["faqs"], json!([]));

    let forbidden = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/help",
            Some(REVIEWER_TOKEN),
            json!({ "supportEmail": "x@example.org" }),
        ))
        .await
        .expect("route responds");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let updated = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/help",
            Some(ADMIN_TOKEN),
            json!({ "whatsappNumber": "+91 90000 00000" }),
        ))
        .await
        .expect("route responds");
    assert_eq!(updated.status(), StatusCode::OK);
    let body = read_json_body(updated).await;
    assert_eq!(body["help"]["whatsappNumber"], json!("+91 90000 00000"));
    assert_eq!(body["help"]["updatedBy"], json!("admin-1"));

    let reread = router
        .oneshot(get_request("/help", None))
        .await
        .expect("route responds");
    let body = read_json_body(reread).await;
    assert_eq!(body["whatsappNumber"], json!("+91 90000 00000"));
}
