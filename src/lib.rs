//! Inbox Triage — polling email classifier.
//!
//! Polls a Gmail inbox on a fixed interval, classifies each new message
//! into one of five categories via the Gemini API, records the result in
//! SQLite, extracts PDF attachments, and posts progress bars to Telegram.

pub mod attachments;
pub mod category;
pub mod classifier;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod notify;
pub mod pipeline;
pub mod store;
