//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod book;
pub mod borrowing;
pub mod borrowing_book;
pub mod payment;

// Re-export specific types to avoid conflicts
pub use book::{Column as BookColumn, Cover, Entity as Book, Model as BookModel};
pub use borrowing::{Column as BorrowingColumn, Entity as Borrowing, Model as BorrowingModel};
pub use borrowing_book::{Column as BorrowingBookColumn, Entity as BorrowingBook};
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentStatus, PaymentType,
};
