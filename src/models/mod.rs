pub mod slack;
pub mod ticket;
pub mod webhook;
