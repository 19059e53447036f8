//! Batch signing against the in-memory row store.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use request_shield::config::SignatureConfig;
use request_shield::signing::{
    KeyPair, MemoryRowStore, RecordSigner, RowFilter, RowStore, SignatureError, SignatureService,
    UpdateOptions,
};

const PRIVATE: &str = include_str!("fixtures/signing_private.pem");
const PUBLIC: &str = include_str!("fixtures/signing_public.pem");

fn config() -> SignatureConfig {
    SignatureConfig {
        is_active: true,
        allowed_tables: vec!["accounts".to_string()],
        signature_fields: BTreeMap::from([(
            "accounts".to_string(),
            vec!["email".to_string(), "balance".to_string()],
        )]),
        ..SignatureConfig::default()
    }
}

fn row(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn setup() -> (Arc<MemoryRowStore>, SignatureService) {
    let store = Arc::new(MemoryRowStore::new());
    for (id, email, balance) in [(1, "a@example.com", 10), (2, "b@example.com", 20), (3, "c@example.com", 30)] {
        store.insert(
            "accounts",
            row(json!({"id": id, "email": email, "balance": balance, "signature": null})),
        );
    }
    let signer = RecordSigner::new(KeyPair::from_pem(PRIVATE, Some(PUBLIC)).unwrap(), &config());
    let service = SignatureService::new(Arc::new(signer), store.clone());
    (store, service)
}

#[test]
fn test_unsigned_rows_fail_verification() {
    let (_, service) = setup();
    let report = service.check_all("accounts").unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.verified, 0);
    assert_eq!(report.list, vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn test_update_all_then_check_all() {
    let (_, service) = setup();
    let updated = service.update_all("accounts", UpdateOptions::default()).unwrap();
    assert_eq!(updated.selected, 3);
    assert_eq!(updated.updated, 3);

    let report = service.check_all("accounts").unwrap();
    assert_eq!(report.verified, 3);
    assert_eq!(report.unverified, 0);
    assert!(report.list.is_empty());
}

#[test]
fn test_tampered_row_is_reported() {
    let (store, service) = setup();
    service.update_all("accounts", UpdateOptions::default()).unwrap();

    let mut balance = serde_json::Map::new();
    balance.insert("balance".to_string(), json!(1_000_000));
    store.update("accounts", &balance, &RowFilter::eq("id", 2)).unwrap();

    let report = service.check_all("accounts").unwrap();
    assert_eq!(report.unverified, 1);
    assert_eq!(report.list, vec![json!(2)]);
    assert_eq!(service.check_one("accounts", &RowFilter::eq("id", 2)).unwrap(), Some(false));
    assert_eq!(service.check_one("accounts", &RowFilter::eq("id", 1)).unwrap(), Some(true));
    assert_eq!(service.check_one("accounts", &RowFilter::eq("id", 9)).unwrap(), None);

    assert!(service.update_one("accounts", &RowFilter::eq("id", 2)).unwrap());
    assert_eq!(service.check_all("accounts").unwrap().verified, 3);
}

#[test]
fn test_update_just_empty_with_limit() {
    let (store, service) = setup();
    service
        .update_one("accounts", &RowFilter::eq("id", 1))
        .unwrap();
    let signed = store.rows("accounts")[0]["signature"].clone();

    let report = service
        .update_all(
            "accounts",
            UpdateOptions {
                just_empty: true,
                limit: Some(1),
            },
        )
        .unwrap();
    assert_eq!(report.selected, 1);

    let rows = store.rows("accounts");
    assert_eq!(rows[0]["signature"], signed);
    assert!(rows[1]["signature"].is_string());
    assert!(rows[2]["signature"].is_null());
}

#[test]
fn test_table_outside_allow_list() {
    let (_, service) = setup();
    assert!(matches!(
        service.check_all("sessions"),
        Err(SignatureError::TableNotAllowed(_))
    ));
}
