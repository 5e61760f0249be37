//! Notification configuration, loaded once at monitor start

/// Embedded JSON schema for notification config documents
pub mod schema;

/// Read, validate and deserialise a notification config file
pub mod notification;

pub use notification::NotificationConfig;
