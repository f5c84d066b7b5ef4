// ABOUTME: Core domain types for intray: the Notification record, codec, validation and filters.
// ABOUTME: Storage-agnostic; every backend in intray-store builds on these.

pub mod codec;
pub mod filter;
pub mod notification;
pub mod timestamp;
pub mod validate;

pub use codec::{DecodeError, decode_line, encode_line, escape_message, unescape_message};
pub use filter::{ListFilter, ReadFilter, StateFilter};
pub use notification::{Level, NewNotification, Notification, NotificationState};
pub use validate::ValidationError;
