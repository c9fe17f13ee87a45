//! Core business logic - framework-agnostic catalog, inventory, borrowing, fee and
//! payment operations.

/// Borrowing engine: checkout and return
pub mod borrowing;
/// Catalog store: inventory-safe book upserts and edits
pub mod catalog;
/// Fee calculator: rental fees and overdue fines
pub mod fees;
/// Inventory ledger: atomic stock changes
pub mod inventory;
/// Overdue scan over active borrowings
pub mod overdue;
/// Payment coordinator: checkout sessions and gateway callbacks
pub mod payment;
