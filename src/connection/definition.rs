use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlBridgeError;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How thoroughly [`Connection::validate`](crate::connection::Connection::validate) checks
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDepth {
    /// Only check whether the session reports itself closed.
    Local,
    /// Also run a trivial query against the database.
    Remote,
}

/// Attributes of a transaction started with
/// [`Connection::begin_transaction_with`](crate::connection::Connection::begin_transaction_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDefinition {
    isolation_level: Option<IsolationLevel>,
    read_only: Option<bool>,
    name: Option<String>,
    lock_wait_timeout: Option<Duration>,
}

impl TransactionDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn get_isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    #[must_use]
    pub fn get_read_only(&self) -> Option<bool> {
        self.read_only
    }

    #[must_use]
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Check the attribute combination without touching the session.
    ///
    /// # Errors
    /// `InvalidArgument` when isolation level and read-only are both set, or none of isolation
    /// level, read-only and name is set. `Unsupported` for a lock wait timeout or an isolation
    /// level other than READ COMMITTED and SERIALIZABLE.
    pub fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.lock_wait_timeout.is_some() {
            return Err(SqlBridgeError::Unsupported(
                "lock wait timeout is not supported".into(),
            ));
        }
        match (self.isolation_level, self.read_only, &self.name) {
            (Some(_), Some(_), _) => Err(SqlBridgeError::InvalidArgument(
                "specifying both isolation level and read only is not supported".into(),
            )),
            (Some(level), None, _) => {
                if matches!(
                    level,
                    IsolationLevel::ReadCommitted | IsolationLevel::Serializable
                ) {
                    Ok(())
                } else {
                    Err(SqlBridgeError::Unsupported(format!(
                        "unsupported isolation level: {level}"
                    )))
                }
            }
            (None, None, None) => Err(SqlBridgeError::InvalidArgument(
                "transaction definition does not specify an isolation level, read only, or name"
                    .into(),
            )),
            (None, _, _) => Ok(()),
        }
    }

    /// Compose the `SET TRANSACTION` directive, quoting the name with `quote`.
    pub(crate) fn compose<Q>(&self, quote: Q) -> Result<String, SqlBridgeError>
    where
        Q: FnOnce(&str) -> Result<String, SqlBridgeError>,
    {
        self.validate()?;
        let mut sql = String::from("SET TRANSACTION");
        if let Some(level) = self.isolation_level {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        } else if let Some(read_only) = self.read_only {
            sql.push_str(if read_only { " READ ONLY" } else { " READ WRITE" });
        }
        if let Some(name) = &self.name {
            sql.push_str(" NAME ");
            sql.push_str(&quote(name)?);
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(literal: &str) -> Result<String, SqlBridgeError> {
        Ok(format!("'{}'", literal.replace('\'', "''")))
    }

    #[test]
    fn composes_isolation_clause() {
        let def = TransactionDefinition::new().isolation_level(IsolationLevel::Serializable);
        assert_eq!(
            def.compose(quote).expect("sql"),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        );
    }

    #[test]
    fn composes_read_write_and_quoted_name() {
        let def = TransactionDefinition::new().read_only(false).name("it's");
        assert_eq!(
            def.compose(quote).expect("sql"),
            "SET TRANSACTION READ WRITE NAME 'it''s'"
        );
    }

    #[test]
    fn name_alone_is_enough() {
        let def = TransactionDefinition::new().name("audit");
        assert_eq!(
            def.compose(quote).expect("sql"),
            "SET TRANSACTION NAME 'audit'"
        );
    }

    #[test]
    fn isolation_and_read_only_conflict() {
        let def = TransactionDefinition::new()
            .isolation_level(IsolationLevel::ReadCommitted)
            .read_only(true);
        assert!(matches!(
            def.validate(),
            Err(SqlBridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_definition_is_rejected() {
        assert!(matches!(
            TransactionDefinition::new().validate(),
            Err(SqlBridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn lock_wait_timeout_is_unsupported() {
        let def = TransactionDefinition::new()
            .name("t")
            .lock_wait_timeout(Duration::from_secs(5));
        assert!(matches!(def.validate(), Err(SqlBridgeError::Unsupported(_))));
    }

    #[test]
    fn repeatable_read_is_unsupported() {
        let def = TransactionDefinition::new().isolation_level(IsolationLevel::RepeatableRead);
        assert!(matches!(def.validate(), Err(SqlBridgeError::Unsupported(_))));
    }
}
