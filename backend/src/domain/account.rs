//! Participant accounts and household composition.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors returned by [`AccountId::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountIdValidationError {
    EmptyId,
    InvalidId,
}

impl fmt::Display for AccountIdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => write!(f, "account id must not be empty"),
            Self::InvalidId => write!(f, "account id must be a valid UUID"),
        }
    }
}

impl std::error::Error for AccountIdValidationError {}

/// Stable participant account identifier stored as a UUID.
///
/// An account identifies one household and exclusively owns its balance and
/// vouchers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(Uuid, String);

impl AccountId {
    /// Validate and construct an [`AccountId`] from borrowed input.
    ///
    /// # Examples
    /// ```
    /// use pantry_backend::domain::AccountId;
    ///
    /// let id = AccountId::new("3fa85f64-5717-4562-b3fc-2c963f66afa6").expect("valid id");
    /// assert_eq!(id.as_ref(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    /// assert!(AccountId::new(" 3fa85f64-5717-4562-b3fc-2c963f66afa6").is_err());
    /// ```
    pub fn new(id: impl AsRef<str>) -> Result<Self, AccountIdValidationError> {
        Self::from_owned(id.as_ref().to_owned())
    }

    /// Construct an [`AccountId`] from an already validated UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, uuid.to_string())
    }

    /// Generate a new random [`AccountId`].
    pub fn random() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    fn from_owned(id: String) -> Result<Self, AccountIdValidationError> {
        if id.is_empty() {
            return Err(AccountIdValidationError::EmptyId);
        }
        if id.trim() != id {
            return Err(AccountIdValidationError::InvalidId);
        }
        let parsed = Uuid::parse_str(&id).map_err(|_| AccountIdValidationError::InvalidId)?;
        Ok(Self(parsed, id))
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        self.1.as_str()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        let AccountId(_, raw) = value;
        raw
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_owned(value)
    }
}

/// Household composition driving limit scope multipliers.
///
/// `infants` is the diaper-count member tally used by `per_infant` limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
}

impl Household {
    /// Construct a household from member counts.
    pub fn new(adults: u32, children: u32, infants: u32) -> Self {
        Self {
            adults,
            children,
            infants,
        }
    }

    /// Total number of members.
    pub fn members(&self) -> u32 {
        self.adults
            .saturating_add(self.children)
            .saturating_add(self.infants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", AccountIdValidationError::EmptyId)]
    #[case("not-a-uuid", AccountIdValidationError::InvalidId)]
    #[case(" 3fa85f64-5717-4562-b3fc-2c963f66afa6", AccountIdValidationError::InvalidId)]
    fn rejects_invalid_ids(#[case] raw: &str, #[case] expected: AccountIdValidationError) {
        assert_eq!(AccountId::new(raw).expect_err("invalid id"), expected);
    }

    #[rstest]
    fn serde_round_trips_through_string() {
        let id = AccountId::random();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: AccountId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[rstest]
    fn members_counts_everyone() {
        assert_eq!(Household::new(2, 3, 1).members(), 6);
        assert_eq!(Household::default().members(), 0);
    }
}
