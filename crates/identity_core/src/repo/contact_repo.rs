//! Contact repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the store queries the identity pipeline depends on.
//! - Keep SQL details inside the core persistence boundary.
//! - Wrap a whole identify call in one lockable transaction.
//!
//! # Invariants
//! - Tombstoned rows (`deleted_at IS NOT NULL`) are excluded from every read.
//! - Multi-row reads are ordered `created_at ASC, id ASC`.
//! - Write paths validate link shape before SQL mutations.
//! - Read paths reject invalid persisted rows instead of masking them.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contact persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    /// Row exists but is not in the state the write expects.
    Conflict {
        id: ContactId,
        message: String,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
    /// Non-SQL backend failure (e.g. poisoned in-memory store lock).
    Backend(String),
}

impl RepoError {
    /// Whether the failure is transient (lock-wait timeout) and the whole
    /// identify call may be retried by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::Conflict { id, message } => write!(f, "contact {id} conflict: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "contact repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::Backend(message) => write!(f, "contact store backend failure: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store contract required by identity resolution.
pub trait ContactRepository {
    /// Active contacts whose email equals `email` OR whose phone number equals
    /// `phone_number`. An absent identifier contributes no clause.
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>>;
    /// Loads one active contact.
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    /// Active contacts whose `linked_id` equals `id`.
    fn list_linked_to(&self, id: ContactId) -> RepoResult<Vec<Contact>>;
    /// Inserts a contact and returns the stored row.
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact>;
    /// Flips one active primary into a secondary of `primary_id`.
    fn demote_to_secondary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<()>;
    /// Repoints every contact linked to `from` onto `to`. Returns rows changed.
    fn relink_secondaries(&self, from: ContactId, to: ContactId) -> RepoResult<usize>;
    /// Runs `f` as one atomic unit: commit on `Ok`, rollback on `Err`.
    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed contact repository.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn query_contacts(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }
        Ok(contacts)
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        let mut clauses = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(email) = email {
            clauses.push("email = ?");
            bind_values.push(Value::Text(email.to_string()));
        }
        if let Some(phone_number) = phone_number {
            clauses.push("phone_number = ?");
            bind_values.push(Value::Text(phone_number.to_string()));
        }
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND ({})
             ORDER BY created_at ASC, id ASC;",
            clauses.join(" OR ")
        );
        self.query_contacts(&sql, bind_values)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?
               AND deleted_at IS NULL;"
        );
        Ok(self
            .query_contacts(&sql, vec![Value::Integer(id)])?
            .into_iter()
            .next())
    }

    fn list_linked_to(&self, id: ContactId) -> RepoResult<Vec<Contact>> {
        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE linked_id = ?
               AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC;"
        );
        self.query_contacts(&sql, vec![Value::Integer(id)])
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence.as_str(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_contact(id)?.ok_or(RepoError::NotFound(id))
    }

    fn demote_to_secondary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<()> {
        if id == primary_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET link_precedence = 'secondary',
                     linked_id = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND link_precedence = 'primary'
                   AND deleted_at IS NULL;"
            ),
            params![id, primary_id],
        )?;

        if changed == 0 {
            return match self.get_contact(id)? {
                Some(_) => Err(RepoError::Conflict {
                    id,
                    message: "contact is no longer primary".to_string(),
                }),
                None => Err(RepoError::NotFound(id)),
            };
        }

        Ok(())
    }

    fn relink_secondaries(&self, from: ContactId, to: ContactId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET linked_id = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE linked_id = ?1;"
            ),
            params![from, to],
        )?;
        Ok(changed)
    }

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        // IMMEDIATE takes the write lock before the first read, so concurrent
        // identify calls serialize instead of deciding on stale reads.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| E::from(RepoError::from(err)))?;
        let value = f(self)?;
        tx.commit().map_err(|err| E::from(RepoError::from(err)))?;
        Ok(value)
    }
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let id: ContactId = row.get("id")?;

    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence for id {id}"
        ))
    })?;

    let contact = Contact {
        id,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate()?;
    Ok(contact)
}
