//! The API endpoint URIs.

/// The route to create a transaction and to list all transactions.
pub const TRANSACTIONS: &str = "/transactions";
/// The route to list transactions marked as spent.
pub const TRANSACTIONS_SPENT: &str = "/transactions/spent";
/// The route to list transactions marked as received.
pub const TRANSACTIONS_RECEIVE: &str = "/transactions/receive";
/// The route to list transactions filtered by category.
pub const TRANSACTIONS_BY_CATEGORY: &str = "/transactions/category/{category}";
/// The route to update or delete a single transaction.
pub const TRANSACTION: &str = "/transactions/{id}";
