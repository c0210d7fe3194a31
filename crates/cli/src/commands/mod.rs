pub mod health;
pub mod offline;
pub mod recommend;
