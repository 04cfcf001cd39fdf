//! Error taxonomy shared by the fetch, decode, store and query layers.

use thiserror::Error;

/// Library-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error for every core operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Automation/network failure after exhausting retries.
    #[error("failed to fetch {url} after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("store operation `{operation}` on `{collection}` failed: {source}")]
    Store {
        operation: &'static str,
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("query `{operation}` failed for `{id}`: {reason}")]
    Query {
        operation: &'static str,
        id: String,
        reason: String,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Decode and identity failures will not go away on retry.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Decode(_) | Error::Identity(_) => true,
            Error::Context { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    pub(crate) fn store(
        operation: &'static str,
        collection: impl Into<String>,
        source: impl Into<StoreError>,
    ) -> Self {
        Error::Store {
            operation,
            collection: collection.into(),
            source: source.into(),
        }
    }

    pub(crate) fn query(
        operation: &'static str,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Query {
            operation,
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// An expected structural element of a page was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing element `{selector}`")]
    MissingElement { selector: String },

    #[error("malformed field `{field}`: {value:?}")]
    Malformed { field: &'static str, value: String },

    #[error("unexpected rowspan {rowspan} in pedigree cell")]
    UnexpectedRowspan { rowspan: u32 },
}

impl DecodeError {
    pub(crate) fn missing(selector: impl Into<String>) -> Self {
        DecodeError::MissingElement {
            selector: selector.into(),
        }
    }

    pub(crate) fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        DecodeError::Malformed {
            field,
            value: value.into(),
        }
    }
}

/// An identifier needed for a lookup could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("unknown venue name {0:?}")]
    UnknownVenueName(String),

    #[error("unknown venue code {0:?}")]
    UnknownVenueCode(String),

    #[error("malformed race id {0:?}")]
    MalformedRaceId(String),

    #[error("race number {0} out of range")]
    RaceNumber(u32),
}

/// Document-store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    #[error("bson serialization: {0}")]
    Serialize(#[from] mongodb::bson::ser::Error),

    #[error("bson deserialization: {0}")]
    Deserialize(#[from] mongodb::bson::de::Error),

    #[error("unsupported pipeline: {0}")]
    Unsupported(String),
}

/// Attach a layer's context (record id, field name) to an error.
pub trait Context<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> Context<T> for std::result::Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        let decode: Error = DecodeError::missing("div.RaceList_Item02").into();
        assert!(decode.is_permanent());

        let fetch = Error::Fetch {
            url: "https://example.invalid".into(),
            attempts: 2,
            reason: "timeout".into(),
        };
        assert!(!fetch.is_permanent());
    }

    #[test]
    fn test_context_keeps_classification() {
        let result: std::result::Result<(), IdentityError> =
            Err(IdentityError::UnknownVenueName("どこか".into()));
        let err = result.context("horse 2019104567").unwrap_err();

        assert!(err.is_permanent());
        assert!(err.to_string().starts_with("horse 2019104567: "));
    }
}
