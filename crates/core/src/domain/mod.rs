pub mod reimbursement;
pub mod request;
pub mod user;
