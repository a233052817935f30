use std::fmt;

use crate::error::LockError;

/// Which lease a lock uses and who is asking for it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockIdentity {
    namespace: String,
    name: String,
    holder_id: String,
}

impl LockIdentity {
    /// Validate and build an identity
    ///
    /// `holder_id` must be unique among processes contending for the same
    /// lease, otherwise they will all believe they hold it.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        holder_id: impl Into<String>,
    ) -> Result<Self, LockError> {
        let identity = Self {
            namespace: namespace.into(),
            name: name.into(),
            holder_id: holder_id.into(),
        };
        for (field, value) in [
            ("namespace", &identity.namespace),
            ("name", &identity.name),
            ("id", &identity.holder_id),
        ] {
            if value.is_empty() {
                return Err(LockError::InvalidConfiguration(format!("{} is empty", field)));
            }
        }
        Ok(identity)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespace={} name={} id={}",
            self.namespace, self.name, self.holder_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let identity = LockIdentity::new("default", "backup", "host-a").unwrap();
        assert_eq!(identity.to_string(), "namespace=default name=backup id=host-a");
    }

    #[test]
    fn test_empty_fields_rejected() {
        for (ns, name, id, field) in [
            ("", "l", "i", "namespace"),
            ("n", "", "i", "name"),
            ("n", "l", "", "id"),
        ] {
            let err = LockIdentity::new(ns, name, id).unwrap_err();
            assert!(matches!(err, LockError::InvalidConfiguration(_)));
            assert!(err.to_string().contains(field));
        }
    }
}
