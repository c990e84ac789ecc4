use identity_core::db::open_db_in_memory;
use identity_core::{
    ContactRepository, ContactSummary, IdentifyRequest, IdentityError, IdentityService,
    LinkPrecedence, SqliteContactRepository,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn identify(
    service: &IdentityService<SqliteContactRepository<'_>>,
    email: Option<&str>,
    phone: Option<&str>,
) -> ContactSummary {
    service
        .identify(&IdentifyRequest::new(email, phone))
        .unwrap()
        .contact
}

fn contact_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap()
}

fn primary_count(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM contacts WHERE link_precedence = 'primary';",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

fn set_created_at(conn: &Connection, id: i64, created_at: i64) {
    conn.execute(
        "UPDATE contacts SET created_at = ?2 WHERE id = ?1;",
        rusqlite::params![id, created_at],
    )
    .unwrap();
}

#[test]
fn empty_store_creates_new_primary() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());

    let summary = identify(&service, Some("a@x.com"), None);

    assert_eq!(summary.primary_contact_id, 1);
    assert_eq!(summary.emails, vec!["a@x.com"]);
    assert!(summary.phone_numbers.is_empty());
    assert!(summary.secondary_contact_ids.is_empty());

    let stored = service.repository().get_contact(1).unwrap().unwrap();
    assert_eq!(stored.email.as_deref(), Some("a@x.com"));
    assert_eq!(stored.phone_number, None);
    assert_eq!(stored.link_precedence, LinkPrecedence::Primary);
}

#[test]
fn new_phone_on_known_email_creates_linked_secondary() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), Some("123"));

    let summary = identify(&service, Some("a@x.com"), Some("999"));

    assert_eq!(summary.primary_contact_id, 1);
    assert_eq!(summary.secondary_contact_ids, vec![2]);
    assert_eq!(summary.emails, vec!["a@x.com"]);
    assert_eq!(summary.phone_numbers, vec!["123", "999"]);

    let secondary = service.repository().get_contact(2).unwrap().unwrap();
    assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(secondary.linked_id, Some(1));
}

#[test]
fn two_primaries_merge_into_the_older_one() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), None);
    identify(&service, None, Some("999"));
    set_created_at(&conn, 1, 1_000);
    set_created_at(&conn, 2, 2_000);

    let summary = identify(&service, Some("a@x.com"), Some("999"));

    assert_eq!(summary.primary_contact_id, 1);
    assert_eq!(summary.secondary_contact_ids, vec![2]);
    assert_eq!(summary.emails, vec!["a@x.com"]);
    assert_eq!(summary.phone_numbers, vec!["999"]);
    assert_eq!(contact_count(&conn), 2);

    let demoted = service.repository().get_contact(2).unwrap().unwrap();
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.linked_id, Some(1));
    assert_eq!(demoted.created_at, 2_000);
}

#[test]
fn merge_repoints_dependents_of_the_demoted_primary() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), Some("111")); // A = 1
    identify(&service, Some("a@x.com"), Some("222")); // A1 = 2
    identify(&service, Some("b@x.com"), Some("333")); // B = 3
    identify(&service, Some("b@x.com"), Some("444")); // B1 = 4
    for (id, created_at) in [(1, 1_000), (2, 1_500), (3, 2_000), (4, 2_500)] {
        set_created_at(&conn, id, created_at);
    }

    let summary = identify(&service, Some("a@x.com"), Some("333"));

    assert_eq!(summary.primary_contact_id, 1);
    assert_eq!(summary.secondary_contact_ids, vec![2, 3, 4]);
    assert_eq!(summary.emails, vec!["a@x.com", "b@x.com"]);
    assert_eq!(summary.phone_numbers, vec!["111", "222", "333", "444"]);
    assert_eq!(contact_count(&conn), 4);
    assert_eq!(primary_count(&conn), 1);

    let repo = service.repository();
    let b = repo.get_contact(3).unwrap().unwrap();
    assert_eq!(b.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(b.linked_id, Some(1));
    let b1 = repo.get_contact(4).unwrap().unwrap();
    assert_eq!(b1.linked_id, Some(1));
    assert!(repo.list_linked_to(3).unwrap().is_empty());
}

#[test]
fn survivor_is_the_senior_primary_whichever_identifier_matched_it() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), None);
    identify(&service, None, Some("999"));
    set_created_at(&conn, 1, 5_000);
    set_created_at(&conn, 2, 1_000);

    let summary = identify(&service, Some("a@x.com"), Some("999"));

    assert_eq!(summary.primary_contact_id, 2);
    assert_eq!(summary.secondary_contact_ids, vec![1]);
    assert_eq!(summary.phone_numbers, vec!["999"]);
    assert_eq!(summary.emails, vec!["a@x.com"]);
}

#[test]
fn equal_timestamps_elect_the_lower_id() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), None);
    identify(&service, None, Some("999"));
    set_created_at(&conn, 1, 1_000);
    set_created_at(&conn, 2, 1_000);

    let summary = identify(&service, Some("a@x.com"), Some("999"));
    assert_eq!(summary.primary_contact_id, 1);
}

#[test]
fn repeating_an_identical_request_is_idempotent() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), Some("123"));
    let first = identify(&service, Some("b@x.com"), Some("123"));
    let count = contact_count(&conn);

    for _ in 0..3 {
        let again = identify(&service, Some("b@x.com"), Some("123"));
        assert_eq!(again, first);
    }
    assert_eq!(contact_count(&conn), count);
}

#[test]
fn every_single_identifier_of_a_family_resolves_to_its_primary() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), Some("111"));
    identify(&service, Some("b@x.com"), Some("111"));
    identify(&service, Some("b@x.com"), Some("222"));
    let family = identify(&service, None, Some("333"));
    let merged = identify(&service, Some("a@x.com"), Some("333"));
    assert_ne!(family.primary_contact_id, merged.primary_contact_id);
    let count = contact_count(&conn);

    for email in &merged.emails {
        let summary = identify(&service, Some(email.as_str()), None);
        assert_eq!(summary.primary_contact_id, merged.primary_contact_id);
    }
    for phone in &merged.phone_numbers {
        let summary = identify(&service, None, Some(phone.as_str()));
        assert_eq!(summary.primary_contact_id, merged.primary_contact_id);
    }
    assert_eq!(contact_count(&conn), count);
}

#[test]
fn response_lists_are_unique_and_primary_first() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, None, Some("111"));
    identify(&service, Some("a@x.com"), Some("111"));
    identify(&service, Some("a@x.com"), Some("222"));
    let summary = identify(&service, Some("b@x.com"), Some("222"));

    assert_eq!(summary.primary_contact_id, 1);
    assert_eq!(summary.phone_numbers, vec!["111", "222"]);
    assert_eq!(summary.emails, vec!["a@x.com", "b@x.com"]);
    assert_eq!(summary.secondary_contact_ids, vec![2, 3, 4]);
}

#[test]
fn empty_request_is_rejected_without_writes() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());

    let err = service
        .identify(&IdentifyRequest::new(Some("  "), None))
        .unwrap_err();
    assert!(matches!(err, IdentityError::EmptyRequest));
    assert!(!err.is_retryable());
    assert_eq!(contact_count(&conn), 0);
}

#[test]
fn family_of_resolves_from_any_member() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    identify(&service, Some("a@x.com"), Some("111"));
    let expected = identify(&service, Some("a@x.com"), Some("222"));

    for id in [1, 2] {
        let response = service.family_of(id).unwrap().unwrap();
        assert_eq!(response.contact, expected);
    }
    assert!(service.family_of(42).unwrap().is_none());
}

#[test]
fn response_serializes_with_camel_case_keys() {
    let conn = setup();
    let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
    let response = service
        .identify(&IdentifyRequest::new(Some("a@x.com"), Some("123")))
        .unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "contact": {
                "primaryContactId": 1,
                "emails": ["a@x.com"],
                "phoneNumbers": ["123"],
                "secondaryContactIds": []
            }
        })
    );
}
