//! Helpers for exercising connections without a database.
//!
//! [`mock::MockSession`] is a scripted driver session: tests describe what each SQL text
//! produces, run statements through a [`Connection`](crate::connection::Connection), and
//! then assert on the recorded driver calls.

pub mod mock;

pub use mock::{MockCall, MockResult, MockScript, MockSession};

use crate::connection::Connection;

/// A connection over `session`, keeping a clone for assertions.
#[must_use]
pub fn mock_connection(session: &MockSession) -> Connection<MockSession> {
    Connection::new(session.clone())
}
