//! Database entities module

pub mod dispenser;
pub mod medicine;
pub mod password_reset_token;
pub mod patient;
pub mod prescription;
pub mod user;

pub use dispenser::Entity as Dispenser;
pub use medicine::Entity as Medicine;
pub use password_reset_token::Entity as PasswordResetToken;
pub use patient::Entity as Patient;
pub use prescription::Entity as Prescription;
pub use user::Entity as User;
