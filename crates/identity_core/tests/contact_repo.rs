use identity_core::db::open_db_in_memory;
use identity_core::{
    ContactRepository, ContactValidationError, LinkPrecedence, NewContact, RepoError,
    SqliteContactRepository,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn primary(email: Option<&str>, phone: Option<&str>) -> NewContact {
    NewContact::primary(email.map(str::to_owned), phone.map(str::to_owned))
}

fn set_created_at(conn: &Connection, id: i64, created_at: i64) {
    conn.execute(
        "UPDATE contacts SET created_at = ?2 WHERE id = ?1;",
        rusqlite::params![id, created_at],
    )
    .unwrap();
}

#[test]
fn create_assigns_monotonic_ids_and_timestamps() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let first = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    let second = repo.create_contact(&primary(None, Some("123"))).unwrap();

    assert!(second.id > first.id);
    assert!(first.created_at > 0);
    assert_eq!(first.created_at, first.updated_at);
    assert_eq!(first.link_precedence, LinkPrecedence::Primary);
    assert_eq!(first.linked_id, None);
    assert_eq!(first.deleted_at, None);
}

#[test]
fn create_rejects_contact_without_identifiers() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let err = repo.create_contact(&primary(None, None)).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ContactValidationError::MissingIdentifier)
    ));
}

#[test]
fn find_matching_omits_absent_clauses() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let email_only = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    let phone_only = repo.create_contact(&primary(None, Some("123"))).unwrap();

    // A missing phone must not match rows whose phone is NULL.
    let by_email = repo.find_matching(Some("a@x.com"), None).unwrap();
    assert_eq!(by_email.len(), 1);
    assert_eq!(by_email[0].id, email_only.id);

    let by_phone = repo.find_matching(None, Some("123")).unwrap();
    assert_eq!(by_phone.len(), 1);
    assert_eq!(by_phone[0].id, phone_only.id);

    assert!(repo.find_matching(None, None).unwrap().is_empty());
}

#[test]
fn find_matching_is_or_and_ordered_by_creation() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let older = repo.create_contact(&primary(None, Some("123"))).unwrap();
    let newer = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    set_created_at(&conn, older.id, 2_000);
    set_created_at(&conn, newer.id, 1_000);

    let matches = repo.find_matching(Some("a@x.com"), Some("123")).unwrap();
    let ids: Vec<i64> = matches.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[test]
fn tombstoned_contacts_are_invisible_to_reads() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let root = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    let dependent = repo
        .create_contact(&NewContact::secondary(
            Some("b@x.com".to_string()),
            None,
            root.id,
        ))
        .unwrap();
    conn.execute(
        "UPDATE contacts SET deleted_at = 1 WHERE id = ?1;",
        [dependent.id],
    )
    .unwrap();

    assert!(repo.get_contact(dependent.id).unwrap().is_none());
    assert!(repo.find_matching(Some("b@x.com"), None).unwrap().is_empty());
    assert!(repo.list_linked_to(root.id).unwrap().is_empty());
}

#[test]
fn demote_flips_primary_once() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let survivor = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    let absorbed = repo.create_contact(&primary(None, Some("123"))).unwrap();

    repo.demote_to_secondary(absorbed.id, survivor.id).unwrap();
    let demoted = repo.get_contact(absorbed.id).unwrap().unwrap();
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.linked_id, Some(survivor.id));
    assert_eq!(demoted.created_at, absorbed.created_at);

    let err = repo
        .demote_to_secondary(absorbed.id, survivor.id)
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict { id, .. } if id == absorbed.id));

    let err = repo.demote_to_secondary(999, survivor.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(999)));

    let err = repo
        .demote_to_secondary(survivor.id, survivor.id)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ContactValidationError::SelfLink(_))
    ));
}

#[test]
fn relink_moves_every_dependent() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let survivor = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();
    let absorbed = repo.create_contact(&primary(Some("b@x.com"), None)).unwrap();
    for phone in ["1", "2"] {
        repo.create_contact(&NewContact::secondary(
            None,
            Some(phone.to_string()),
            absorbed.id,
        ))
        .unwrap();
    }

    repo.demote_to_secondary(absorbed.id, survivor.id).unwrap();
    let changed = repo.relink_secondaries(absorbed.id, survivor.id).unwrap();
    assert_eq!(changed, 2);

    assert!(repo.list_linked_to(absorbed.id).unwrap().is_empty());
    let family = repo.list_linked_to(survivor.id).unwrap();
    assert_eq!(family.len(), 3);
}

#[test]
fn transaction_rolls_back_on_error() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let result: Result<(), RepoError> = repo.with_transaction(|repo| {
        repo.create_contact(&primary(Some("a@x.com"), None))?;
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(result.is_err());
    assert!(repo.find_matching(Some("a@x.com"), None).unwrap().is_empty());

    let created = repo
        .with_transaction(|repo| repo.create_contact(&primary(Some("a@x.com"), None)))
        .unwrap();
    assert_eq!(
        repo.get_contact(created.id).unwrap().unwrap().email.as_deref(),
        Some("a@x.com")
    );
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteContactRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn read_path_rejects_invalid_persisted_precedence() {
    let conn = setup();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let contact = repo.create_contact(&primary(Some("a@x.com"), None)).unwrap();

    conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
        .unwrap();
    conn.execute(
        "UPDATE contacts SET link_precedence = 'tertiary' WHERE id = ?1;",
        [contact.id],
    )
    .unwrap();

    let err = repo.get_contact(contact.id).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}
