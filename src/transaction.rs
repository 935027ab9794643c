//! Transaction management for the ledger service.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the payload types for creating and updating
//!   transactions
//! - Validation of create/update request bodies and list query parameters
//! - Database functions for storing, querying, updating and deleting
//!   transactions
//! - The JSON route handlers for the `/transactions` path group

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use rusqlite::{
    Connection, Row, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{AppState, Error};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseID = i64;

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from transaction IDs, leading to better
/// compile time errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether a transaction records money leaving or entering an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money was spent, e.g., paying for groceries.
    Spent,
    /// Money was received, e.g., a salary payment.
    Receive,
}

impl TransactionType {
    /// The string stored in the database and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spent => "spent",
            Self::Receive => "receive",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spent" => Ok(Self::Spent),
            "receive" => Ok(Self::Receive),
            _ => Err(Error::InvalidTransactionType),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// An event where money was either spent or received.
///
/// New instances are created by inserting a [NewTransaction] with
/// [create_transaction].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: DatabaseID,
    /// When the transaction happened.
    pub date: Date,
    /// Whether money was spent or received.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The amount of money spent or received in this transaction.
    pub amount: f64,
    /// A free-text label for grouping transactions, e.g., 'Groceries'.
    pub category: String,
    /// The ID of the user that the transaction belongs to.
    #[serde(rename = "userId")]
    pub user_id: UserID,
}

/// A validated transaction that has not been stored yet.
///
/// Produced by [TransactionPayload::into_new_transaction].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// When the transaction happened.
    pub date: Date,
    /// Whether money was spent or received.
    pub transaction_type: TransactionType,
    /// The amount of money spent or received.
    pub amount: f64,
    /// A free-text label for grouping transactions.
    pub category: String,
    /// The ID of the user creating the transaction.
    pub user_id: UserID,
}

/// The validated replacement fields for an existing transaction.
///
/// Does not include the user ID; a transaction cannot change owners after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    /// When the transaction happened.
    pub date: Date,
    /// Whether money was spent or received.
    pub transaction_type: TransactionType,
    /// The amount of money spent or received.
    pub amount: f64,
    /// A free-text label for grouping transactions.
    pub category: String,
}

// ============================================================================
// VALIDATION
// ============================================================================

// Dates are accepted in ISO-8601 form or in day-first form.
const ISO_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
const DAY_FIRST_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month]-[year]");

/// Parse `raw` as a calendar date.
///
/// # Errors
/// Returns an [Error::InvalidDate] if `raw` matches neither accepted format.
pub fn parse_date(raw: &str) -> Result<Date, Error> {
    Date::parse(raw, ISO_DATE_FORMAT)
        .or_else(|_| Date::parse(raw, DAY_FIRST_DATE_FORMAT))
        .map_err(|_| Error::InvalidDate(raw.to_string()))
}

/// The request body for creating or updating a transaction.
///
/// All fields are optional at the deserialization layer; presence is checked
/// by the validation functions below.
#[derive(Debug, Deserialize)]
pub struct TransactionPayload {
    /// The date of the transaction as a string in one of the accepted formats.
    pub date: Option<String>,
    /// The transaction type, either "spent" or "receive".
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// The value of the transaction in dollars.
    pub amount: Option<f64>,
    /// The category to file the transaction under.
    pub category: Option<String>,
    /// The ID of the user creating the transaction.
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

impl TransactionPayload {
    /// Validate the payload for a create request.
    ///
    /// All fields are required, including the user ID.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::MissingFields] if any field is absent or blank,
    /// - [Error::InvalidTransactionType] if the type is not 'spent' or
    ///   'receive',
    /// - or [Error::InvalidDate] if the date cannot be parsed.
    pub fn into_new_transaction(self) -> Result<NewTransaction, Error> {
        let user_id = self.user_id.ok_or(Error::MissingFields)?;
        let update = self.into_update()?;

        Ok(NewTransaction {
            date: update.date,
            transaction_type: update.transaction_type,
            amount: update.amount,
            category: update.category,
            user_id: UserID::new(user_id),
        })
    }

    /// Validate the payload for an update request.
    ///
    /// Update validation mirrors create validation except that the user ID is
    /// ignored: a transaction cannot change owners after creation.
    ///
    /// # Errors
    /// See [TransactionPayload::into_new_transaction].
    pub fn into_update(self) -> Result<TransactionUpdate, Error> {
        let (Some(date), Some(transaction_type), Some(amount), Some(category)) = (
            self.date,
            self.transaction_type,
            self.amount,
            self.category,
        ) else {
            return Err(Error::MissingFields);
        };

        let category = category.trim().to_string();
        if category.is_empty() {
            return Err(Error::MissingFields);
        }

        let transaction_type = transaction_type.parse()?;
        let date = parse_date(&date)?;

        Ok(TransactionUpdate {
            date,
            transaction_type,
            amount,
            category,
        })
    }
}

/// The query parameters accepted by the list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Restrict the listing to the transactions of one user.
    ///
    /// Kept as a raw string; a non-numeric value is rejected by
    /// [parse_user_id] instead of silently matching no rows.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Parse the optional `userId` query parameter.
///
/// # Errors
/// Returns an [Error::InvalidUserId] if the parameter is present but not an
/// integer.
pub fn parse_user_id(raw_user_id: Option<String>) -> Result<Option<UserID>, Error> {
    match raw_user_id {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(|id| Some(UserID::new(id)))
            .map_err(|_| Error::InvalidUserId(raw)),
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// A route handler for creating a new transaction.
///
/// Returns the created transaction, including its assigned ID, on success.
pub async fn create_transaction_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<TransactionPayload>,
) -> Result<Json<Transaction>, Error> {
    let new_transaction = payload.into_new_transaction()?;

    let connection = state.lock_connection()?;
    let transaction = create_transaction(new_transaction, &connection)?;

    Ok(Json(transaction))
}

/// A route handler for listing transactions, optionally scoped to one user.
///
/// An empty result is a successful, empty array.
pub async fn get_transactions_endpoint(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let filter = TransactionFilter {
        user_id: parse_user_id(params.user_id)?,
        ..Default::default()
    };

    let connection = state.lock_connection()?;
    let transactions = query_transactions(filter, &connection)?;

    Ok(Json(transactions))
}

/// A route handler for listing transactions marked as spent.
pub async fn get_spent_transactions_endpoint(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, Error> {
    get_transactions_by_type(TransactionType::Spent, params, &state)
}

/// A route handler for listing transactions marked as received.
pub async fn get_receive_transactions_endpoint(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, Error> {
    get_transactions_by_type(TransactionType::Receive, params, &state)
}

fn get_transactions_by_type(
    transaction_type: TransactionType,
    params: ListParams,
    state: &AppState,
) -> Result<Json<Vec<Transaction>>, Error> {
    let filter = TransactionFilter {
        user_id: parse_user_id(params.user_id)?,
        transaction_type: Some(transaction_type),
        ..Default::default()
    };

    let connection = state.lock_connection()?;
    let transactions = query_transactions(filter, &connection)?;

    Ok(Json(transactions))
}

/// A route handler for listing transactions filed under `category`.
pub async fn get_transactions_by_category_endpoint(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let filter = TransactionFilter {
        user_id: parse_user_id(params.user_id)?,
        category: Some(category),
        ..Default::default()
    };

    let connection = state.lock_connection()?;
    let transactions = query_transactions(filter, &connection)?;

    Ok(Json(transactions))
}

/// A route handler for replacing the mutable fields of a transaction.
///
/// This function will return the status code 404 if no transaction with the
/// requested ID exists.
pub async fn update_transaction_endpoint(
    State(state): State<AppState>,
    Path(id): Path<DatabaseID>,
    Json(payload): Json<TransactionPayload>,
) -> Result<Json<Transaction>, Error> {
    let update = payload.into_update()?;

    let connection = state.lock_connection()?;
    let transaction = update_transaction(id, update, &connection)?;

    Ok(Json(transaction))
}

/// A route handler for deleting a transaction by its ID.
///
/// This function will return the status code 404 if no transaction with the
/// requested ID exists.
pub async fn delete_transaction_endpoint(
    State(state): State<AppState>,
    Path(id): Path<DatabaseID>,
) -> Result<impl IntoResponse, Error> {
    let connection = state.lock_connection()?;
    delete_transaction(id, &connection)?;

    Ok(Json(json!({
        "message": "Transaction deleted",
    })))
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (date, type, amount, category, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, date, type, amount, category, user_id",
        )?
        .query_row(
            (
                new_transaction.date,
                new_transaction.transaction_type,
                new_transaction.amount,
                new_transaction.category,
                new_transaction.user_id.as_i64(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Defines which transactions should be fetched by [query_transactions].
///
/// Each present field adds an equality predicate; absent fields impose no
/// constraint. The default filter matches every transaction.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionFilter {
    /// Include only transactions belonging to this user.
    pub user_id: Option<UserID>,
    /// Include only transactions of this type.
    pub transaction_type: Option<TransactionType>,
    /// Include only transactions filed under this category.
    pub category: Option<String>,
}

/// Query for transactions in the database.
///
/// Matching transactions are returned in insertion order.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn query_transactions(
    filter: TransactionFilter,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut query_string_parts =
        vec!["SELECT id, date, type, amount, category, user_id FROM \"transaction\"".to_string()];
    let mut where_clause_parts = vec![];
    let mut query_parameters = vec![];

    if let Some(user_id) = filter.user_id {
        where_clause_parts.push(format!("user_id = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Integer(user_id.as_i64()));
    }

    if let Some(transaction_type) = filter.transaction_type {
        where_clause_parts.push(format!("type = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(transaction_type.as_str().to_string()));
    }

    if let Some(category) = filter.category {
        where_clause_parts.push(format!("category = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(category));
    }

    if !where_clause_parts.is_empty() {
        query_string_parts.push(String::from("WHERE ") + &where_clause_parts.join(" AND "));
    }

    let query_string = query_string_parts.join(" ");
    let params = params_from_iter(query_parameters.iter());

    connection
        .prepare(&query_string)?
        .query_map(params, map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::SqlError))
        .collect()
}

/// Replace the mutable fields of the transaction with ID `id`.
///
/// The transaction's ID and user ID are not modified.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a valid
///   transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: DatabaseID,
    update: TransactionUpdate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "UPDATE \"transaction\"
             SET date = ?1, type = ?2, amount = ?3, category = ?4
             WHERE id = ?5
             RETURNING id, date, type, amount, category, user_id",
        )?
        .query_row(
            (
                update.date,
                update.transaction_type,
                update.amount,
                update.category,
                id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => error.into(),
        })
}

/// Remove the transaction with ID `id` from the database.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransaction] if `id` does not refer to a valid
///   transaction,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(id: DatabaseID, connection: &Connection) -> Result<(), Error> {
    let rows_deleted = connection.execute("DELETE FROM \"transaction\" WHERE id = ?1", [id])?;

    if rows_deleted == 0 {
        return Err(Error::DeleteMissingTransaction);
    }

    Ok(())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                type TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                user_id INTEGER NOT NULL
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let date = row.get(1)?;
    let transaction_type = row.get(2)?;
    let amount = row.get(3)?;
    let category = row.get(4)?;
    let user_id = UserID::new(row.get(5)?);

    Ok(Transaction {
        id,
        date,
        transaction_type,
        amount,
        category,
        user_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod transaction_type_tests {
    use crate::Error;

    use super::TransactionType;

    #[test]
    fn parse_accepts_both_literals() {
        assert_eq!("spent".parse(), Ok(TransactionType::Spent));
        assert_eq!("receive".parse(), Ok(TransactionType::Receive));
    }

    #[test]
    fn parse_rejects_other_strings() {
        for raw in ["Spent", "RECEIVE", "transfer", ""] {
            let result = raw.parse::<TransactionType>();

            assert_eq!(
                result,
                Err(Error::InvalidTransactionType),
                "want parse of {raw:?} to fail"
            );
        }
    }

    #[test]
    fn serializes_to_lowercase_literal() {
        let json = serde_json::to_string(&TransactionType::Spent).unwrap();

        assert_eq!(json, "\"spent\"");
    }
}

#[cfg(test)]
mod payload_tests {
    use time::macros::date;

    use crate::Error;

    use super::{TransactionPayload, TransactionType, parse_date, parse_user_id};

    fn full_payload() -> TransactionPayload {
        TransactionPayload {
            date: Some("03-11-2023".to_string()),
            transaction_type: Some("spent".to_string()),
            amount: Some(150.75),
            category: Some("Groceries".to_string()),
            user_id: Some(1),
        }
    }

    #[test]
    fn create_validation_succeeds_on_full_payload() {
        let new_transaction = full_payload().into_new_transaction().unwrap();

        assert_eq!(new_transaction.date, date!(2023 - 11 - 03));
        assert_eq!(new_transaction.transaction_type, TransactionType::Spent);
        assert_eq!(new_transaction.amount, 150.75);
        assert_eq!(new_transaction.category, "Groceries");
        assert_eq!(new_transaction.user_id.as_i64(), 1);
    }

    #[test]
    fn create_validation_fails_on_each_missing_field() {
        let payloads = [
            TransactionPayload {
                date: None,
                ..full_payload()
            },
            TransactionPayload {
                transaction_type: None,
                ..full_payload()
            },
            TransactionPayload {
                amount: None,
                ..full_payload()
            },
            TransactionPayload {
                category: None,
                ..full_payload()
            },
            TransactionPayload {
                user_id: None,
                ..full_payload()
            },
        ];

        for payload in payloads {
            let result = payload.into_new_transaction();

            assert_eq!(result, Err(Error::MissingFields));
        }
    }

    #[test]
    fn create_validation_fails_on_blank_category() {
        let payload = TransactionPayload {
            category: Some("   ".to_string()),
            ..full_payload()
        };

        let result = payload.into_new_transaction();

        assert_eq!(result, Err(Error::MissingFields));
    }

    #[test]
    fn create_validation_trims_category() {
        let payload = TransactionPayload {
            category: Some("  Groceries ".to_string()),
            ..full_payload()
        };

        let new_transaction = payload.into_new_transaction().unwrap();

        assert_eq!(new_transaction.category, "Groceries");
    }

    #[test]
    fn create_validation_fails_on_invalid_type() {
        let payload = TransactionPayload {
            transaction_type: Some("transfer".to_string()),
            ..full_payload()
        };

        let result = payload.into_new_transaction();

        assert_eq!(result, Err(Error::InvalidTransactionType));
    }

    #[test]
    fn create_validation_fails_on_unparseable_date() {
        let payload = TransactionPayload {
            date: Some("November 3rd".to_string()),
            ..full_payload()
        };

        let result = payload.into_new_transaction();

        assert_eq!(
            result,
            Err(Error::InvalidDate("November 3rd".to_string()))
        );
    }

    #[test]
    fn update_validation_does_not_require_user_id() {
        let payload = TransactionPayload {
            user_id: None,
            ..full_payload()
        };

        let update = payload.into_update().unwrap();

        assert_eq!(update.date, date!(2023 - 11 - 03));
        assert_eq!(update.transaction_type, TransactionType::Spent);
    }

    #[test]
    fn date_parsing_accepts_both_formats() {
        let want = date!(2023 - 11 - 03);

        assert_eq!(parse_date("2023-11-03"), Ok(want));
        assert_eq!(parse_date("03-11-2023"), Ok(want));
    }

    #[test]
    fn user_id_parsing_allows_absent_parameter() {
        assert_eq!(parse_user_id(None), Ok(None));
    }

    #[test]
    fn user_id_parsing_fails_on_non_numeric_input() {
        let result = parse_user_id(Some("one".to_string()));

        assert_eq!(result, Err(Error::InvalidUserId("one".to_string())));
    }
}
